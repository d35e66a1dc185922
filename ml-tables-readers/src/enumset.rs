//! Categorical encoding
//!
//! An [`Enumset`] maps category text to a dense ordinal, assigned in order
//! of first appearance. Clones share the same table, so every reader of a
//! column sees the same ordinals. A frozen handle refuses to grow the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Dictionary {
    ordinals: HashMap<String, i64>,
    texts: Vec<String>,
}

impl Dictionary {
    fn insert(&mut self, text: &str) -> i64 {
        if let Some(&ordinal) = self.ordinals.get(text) {
            return ordinal;
        }
        let ordinal = i64::try_from(self.texts.len()).unwrap_or(i64::MAX);
        self.ordinals.insert(text.to_string(), ordinal);
        self.texts.push(text.to_string());
        ordinal
    }
}

/// Shared value to ordinal table of one enumeration
#[derive(Debug, Clone, Default)]
pub struct Enumset {
    inner: Arc<Mutex<Dictionary>>,
    frozen: bool,
}

impl Enumset {
    /// Create an empty growing enumeration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a growing enumeration seeded with `values` in order
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        let set = Self::new();
        {
            let mut dict = set.lock();
            for v in values {
                dict.insert(v.as_ref());
            }
        }
        set
    }

    /// Handle on the same table that fails on unseen values
    #[must_use]
    pub fn frozen(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            frozen: true,
        }
    }

    /// Check if this handle refuses new values
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Ordinal of `text`, assigning the next one if it is new
    pub fn enumerate(&self, text: &str) -> Result<i64> {
        let mut dict = self.lock();
        if let Some(&ordinal) = dict.ordinals.get(text) {
            return Ok(ordinal);
        }
        if self.frozen {
            return Err(Error::UnknownCategory(text.to_string()));
        }
        let ordinal = dict.insert(text);
        trace!(text, ordinal, "new category");
        Ok(ordinal)
    }

    /// Ordinal of a known value
    pub fn ordinal(&self, text: &str) -> Option<i64> {
        self.lock().ordinals.get(text).copied()
    }

    /// Text of a known ordinal
    pub fn text(&self, ordinal: i64) -> Option<String> {
        let index = usize::try_from(ordinal).ok()?;
        self.lock().texts.get(index).cloned()
    }

    /// Known values ordered by ordinal
    pub fn values(&self) -> Vec<String> {
        self.lock().texts.clone()
    }

    /// Number of known values
    pub fn len(&self) -> usize {
        self.lock().texts.len()
    }

    /// Check if no value is known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Dictionary> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ordinals_follow_first_appearance() {
        let set = Enumset::new();
        assert_eq!(set.enumerate("red").unwrap(), 0);
        assert_eq!(set.enumerate("green").unwrap(), 1);
        assert_eq!(set.enumerate("red").unwrap(), 0);
        assert_eq!(set.values(), vec!["red", "green"]);
        assert_eq!(set.text(1).as_deref(), Some("green"));
        assert_eq!(set.text(-1), None);
    }

    #[test]
    fn test_frozen_rejects_unseen() {
        let set = Enumset::from_values(&["a", "b"]);
        let frozen = set.frozen();
        assert_eq!(frozen.enumerate("b").unwrap(), 1);
        assert!(matches!(frozen.enumerate("c"), Err(Error::UnknownCategory(c)) if c == "c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_clones_share_table() {
        let set = Enumset::new();
        let handles: Vec<_> = (0..4)
            .map(|k| {
                let set = set.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        set.enumerate(&format!("v{}", (i + k) % 10)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 10);
        let mut ordinals: Vec<i64> = set.values().iter().filter_map(|v| set.ordinal(v)).collect();
        ordinals.sort_unstable();
        assert_eq!(ordinals, (0..10).collect::<Vec<_>>());
    }
}

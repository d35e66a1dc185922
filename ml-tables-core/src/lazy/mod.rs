//! Lazy, replayable, index-addressed streams
//!
//! A [`Lazy`] value is a recipe: calling [`Lazy::realize`] builds a fresh
//! [`Stream`] with its own internal state, so one recipe may be drained any
//! number of times. Nothing runs until a terminal operation pulls indices
//! `0, 1, 2, ...` through the composed stages.
//!
//! A pull yields a [`Pull`]: a row, a filtered placeholder that keeps index
//! alignment, or the end marker. Once a stream returns [`Pull::End`] for some
//! index it returns `End` for every later index as well.

mod batch;
mod collect;
mod combinators;
mod sources;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Outcome of pulling one index
#[derive(Debug, Clone, PartialEq)]
pub enum Pull<T> {
    /// A live row
    Row(T),

    /// A dropped row; the index stays allocated
    Filtered,

    /// No more rows at this or any later index
    End,
}

impl<T> Pull<T> {
    /// Check if this is a live row
    pub fn is_row(&self) -> bool {
        matches!(self, Pull::Row(_))
    }

    /// Map the row, keeping placeholders and the end marker
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Pull<U> {
        match self {
            Pull::Row(t) => Pull::Row(f(t)),
            Pull::Filtered => Pull::Filtered,
            Pull::End => Pull::End,
        }
    }
}

/// A realized stream
///
/// `pull` may be called concurrently for different indices; every index is
/// pulled at most once per realization.
pub trait Stream<T>: Send + Sync {
    /// Compute the outcome for `index`
    fn pull(&self, index: u64) -> Result<Pull<T>>;

    /// Release ordering coordination and background workers
    ///
    /// Called once by the terminal operation after completion or failure.
    fn stop(&self) {}
}

type Recipe<T> = dyn Fn() -> Box<dyn Stream<T>> + Send + Sync;

/// A replayable stream recipe
pub struct Lazy<T> {
    recipe: Arc<Recipe<T>>,
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            recipe: Arc::clone(&self.recipe),
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Lazy<T> {
    /// Create a recipe from a stream factory
    pub fn new<F>(recipe: F) -> Self
    where
        F: Fn() -> Box<dyn Stream<T>> + Send + Sync + 'static,
    {
        Self {
            recipe: Arc::new(recipe),
        }
    }

    /// Build a fresh stream with its own state
    pub fn realize(&self) -> Box<dyn Stream<T>> {
        (self.recipe)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::value::Value;

    #[test]
    fn test_pull_map() {
        assert_eq!(Pull::Row(2).map(|x| x * 3), Pull::Row(6));
        assert_eq!(Pull::<i32>::Filtered.map(|x| x * 3), Pull::Filtered);
        assert!(!Pull::<i32>::End.is_row());
    }

    #[test]
    fn test_recipe_is_replayable() {
        let rows = (0..3)
            .map(|i| Record::from_pairs([("i", Value::Int(i))]).unwrap())
            .collect();
        let lazy = Lazy::from_records(rows);
        assert_eq!(lazy.count().unwrap(), 3);
        assert_eq!(lazy.count().unwrap(), 3);
    }
}

//! One-time resolution cells
//!
//! Mappers and projections work out a lookup table from the first record they
//! see and reuse it afterwards. The table is built under a guarded double
//! check and is immutable once resolved.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;

/// Resolution state of a memoized lookup table
#[derive(Debug)]
pub enum Resolution<T> {
    /// Nothing has been resolved yet
    Unresolved,

    /// Immutable lookup table
    Resolved(Arc<T>),
}

/// A lookup table resolved at most once
#[derive(Debug)]
pub struct Memo<T> {
    state: RwLock<Resolution<T>>,
}

impl<T> Memo<T> {
    /// Create an unresolved cell
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Resolution::Unresolved),
        }
    }

    /// Get the table, resolving it with `resolve` on first use
    ///
    /// A failed resolution leaves the cell unresolved, so the error is
    /// reported again by the next caller.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Resolution::Resolved(table) =
            &*self.state.read().unwrap_or_else(PoisonError::into_inner)
        {
            return Ok(Arc::clone(table));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Resolution::Resolved(table) = &*state {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(resolve()?);
        *state = Resolution::Resolved(Arc::clone(&table));
        Ok(table)
    }

    /// Check if the table has been resolved
    pub fn is_resolved(&self) -> bool {
        matches!(
            &*self.state.read().unwrap_or_else(PoisonError::into_inner),
            Resolution::Resolved(_)
        )
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

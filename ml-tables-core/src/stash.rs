//! Checkpoint stash
//!
//! A ring of anonymous temporary files holding the last `history + 1`
//! iterations of some opaque checkpoint. Writing iteration `n` reuses the
//! slot of iteration `n - history - 1`.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use tracing::debug;

use crate::error::{Error, Result};

/// Ring of temporary checkpoint files
#[derive(Debug)]
pub struct Stash {
    slots: Vec<Option<File>>,
    last: Option<usize>,
}

impl Stash {
    /// Create a stash retaining `history` iterations besides the newest
    pub fn new(history: usize) -> Self {
        Self {
            slots: (0..=history).map(|_| None).collect(),
            last: None,
        }
    }

    /// Number of retained iterations
    pub fn len(&self) -> usize {
        self.last.map_or(0, |last| (last + 1).min(self.slots.len()))
    }

    /// Check if nothing was written yet
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Empty sink for `iteration`, which becomes the newest one
    pub fn output(&mut self, iteration: usize) -> Result<&mut File> {
        let slot = iteration % self.slots.len();
        self.last = Some(iteration);
        let file = match &mut self.slots[slot] {
            Some(file) => {
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file
            }
            empty => empty.insert(tempfile::tempfile()?),
        };
        debug!(iteration, slot, "stash slot opened for writing");
        Ok(file)
    }

    /// Source for a retained `iteration`, positioned at its start
    pub fn reader(&mut self, iteration: usize) -> Result<&mut File> {
        let last = self.last.unwrap_or(0);
        let first = (last + 1).saturating_sub(self.slots.len());
        if self.last.is_none() || iteration > last || iteration < first {
            return Err(Error::StashRange {
                iteration,
                first,
                last,
            });
        }
        let slot = iteration % self.slots.len();
        let Some(file) = self.slots[slot].as_mut() else {
            return Err(Error::StashRange {
                iteration,
                first,
                last,
            });
        };
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn read(stash: &mut Stash, iteration: usize) -> Result<String> {
        let mut s = String::new();
        stash.reader(iteration)?.read_to_string(&mut s)?;
        Ok(s)
    }

    #[test]
    fn test_ring_keeps_history() {
        let mut stash = Stash::new(2);
        assert!(stash.is_empty());
        for i in 0..5 {
            write!(stash.output(i).unwrap(), "model {i}").unwrap();
        }
        assert_eq!(stash.len(), 3);
        assert_eq!(read(&mut stash, 4).unwrap(), "model 4");
        assert_eq!(read(&mut stash, 2).unwrap(), "model 2");
        assert!(matches!(
            read(&mut stash, 1),
            Err(Error::StashRange { first: 2, last: 4, .. })
        ));
        assert!(matches!(read(&mut stash, 5), Err(Error::StashRange { .. })));
    }

    #[test]
    fn test_rewrite_truncates() {
        let mut stash = Stash::new(0);
        write!(stash.output(0).unwrap(), "a long checkpoint").unwrap();
        write!(stash.output(1).unwrap(), "short").unwrap();
        assert_eq!(read(&mut stash, 1).unwrap(), "short");
        assert_eq!(stash.len(), 1);
    }

    #[test]
    fn test_empty_stash_has_nothing() {
        let mut stash = Stash::new(3);
        assert!(stash.reader(0).is_err());
    }
}

//! Batching, flattening and reduction
//!
//! `batch(n)` groups consecutive live rows into tables of `n` rows. A batch
//! is emitted at the index of its last row; the indices of the other rows
//! become filtered placeholders, and a short final batch is emitted at the
//! end marker's index.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::order::OrderGate;
use crate::record::Record;
use crate::schedule::PipelineConfig;
use crate::table::{Table, TableBuilder};

use super::{Lazy, Pull, Stream};

/// Largest per-column reservation made for one batch
const MAX_BATCH_RESERVE: usize = 1024;

struct Batches {
    size: usize,
    builder: TableBuilder,
    ended: bool,
}

impl Batches {
    fn new(size: usize) -> Self {
        Self {
            size,
            builder: TableBuilder::new(size.min(MAX_BATCH_RESERVE)),
            ended: false,
        }
    }

    fn take(&mut self) -> Table {
        let full = std::mem::replace(
            &mut self.builder,
            TableBuilder::new(self.size.min(MAX_BATCH_RESERVE)),
        );
        full.finish()
    }

    fn step(&mut self, pulled: Pull<Record>) -> Result<Pull<Table>> {
        if self.ended {
            return Ok(Pull::End);
        }
        match pulled {
            Pull::Row(row) => {
                self.builder.push(row)?;
                if self.builder.len() >= self.size {
                    Ok(Pull::Row(self.take()))
                } else {
                    Ok(Pull::Filtered)
                }
            }
            Pull::Filtered => Ok(Pull::Filtered),
            Pull::End => {
                self.ended = true;
                if self.builder.is_empty() {
                    Ok(Pull::End)
                } else {
                    Ok(Pull::Row(self.take()))
                }
            }
        }
    }
}

impl Lazy<Record> {
    /// Group consecutive live rows into tables of `n` rows
    pub fn batch(&self, n: usize) -> Lazy<Table> {
        if n == 0 {
            return Lazy::from_error(|| Error::InvalidArgument("batch size must be positive".into()));
        }
        self.gated(move || {
            let step = |batches: &mut Batches, _: u64, pulled: Pull<Record>| batches.step(pulled);
            (Batches::new(n), step)
        })
    }

    /// Batch with the configured batch size
    pub fn batch_with(&self, config: &PipelineConfig) -> Lazy<Table> {
        self.batch(config.batch_size)
    }

    /// Transform every batch of `n` rows and flatten the results
    pub fn batch_transform<F>(&self, n: usize, f: F) -> Lazy<Record>
    where
        F: Fn(Table) -> Result<Table> + Send + Sync + 'static,
    {
        self.batch(n).transform(f).flat()
    }

    /// Reduce every batch of `n` rows to at most one record
    pub fn batch_reduce<F>(&self, n: usize, f: F) -> Lazy<Record>
    where
        F: Fn(&Table) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        self.batch(n).reduce(f)
    }

    /// Reduce the whole stream to at most one record
    pub fn reduce<F>(&self, f: F) -> Lazy<Record>
    where
        F: Fn(&Table) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        self.batch(usize::MAX).reduce(f)
    }
}

impl Lazy<Table> {
    /// Apply `f` to every batch
    pub fn transform<F>(&self, f: F) -> Lazy<Table>
    where
        F: Fn(Table) -> Result<Table> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move || {
            let f = Arc::clone(&f);
            move |_: u64, table: Table| f(table).map(Pull::Row)
        })
    }

    /// Reduce every batch to at most one record
    pub fn reduce<F>(&self, f: F) -> Lazy<Record>
    where
        F: Fn(&Table) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move || {
            let f = Arc::clone(&f);
            move |_: u64, table: Table| Ok(f(&table)?.map_or(Pull::Filtered, Pull::Row))
        })
    }

    /// Stream the rows of every batch in order
    pub fn flat(&self) -> Lazy<Record> {
        let upstream = self.clone();
        Lazy::new(move || {
            Box::new(Flat {
                upstream: upstream.realize(),
                gate: OrderGate::new(),
                state: Mutex::new(FlatState::default()),
            })
        })
    }
}

#[derive(Default)]
struct FlatState {
    cursor: u64,
    pending: VecDeque<Record>,
    ended: bool,
}

/// Row stream over a batch stream; upstream is pulled on demand in order
struct Flat {
    upstream: Box<dyn Stream<Table>>,
    gate: OrderGate,
    state: Mutex<FlatState>,
}

impl Stream<Record> for Flat {
    fn pull(&self, index: u64) -> Result<Pull<Record>> {
        let Some(_turn) = self.gate.enter(index) else {
            return Ok(Pull::End);
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(row) = state.pending.pop_front() {
                return Ok(Pull::Row(row));
            }
            if state.ended {
                return Ok(Pull::End);
            }
            let cursor = state.cursor;
            state.cursor += 1;
            match self.upstream.pull(cursor) {
                Ok(Pull::Row(table)) => {
                    for i in 0..table.len() {
                        let row = table.row(i)?;
                        state.pending.push_back(row);
                    }
                }
                Ok(Pull::Filtered) => {}
                Ok(Pull::End) => state.ended = true,
                Err(e) => {
                    state.ended = true;
                    return Err(e);
                }
            }
        }
    }

    fn stop(&self) {
        self.gate.stop();
        self.upstream.stop();
    }
}

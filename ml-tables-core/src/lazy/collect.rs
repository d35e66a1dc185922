//! Terminal operations
//!
//! Terminals realize a recipe, pull indices `0, 1, 2, ...` until the end
//! marker or the first error, and then stop the realized stream. The
//! `*_or_abort` forms panic on error and exist for callers that explicitly
//! opt out of error handling.

use std::time::Instant;

use tracing::debug;

use crate::error::Result;
use crate::record::Record;
use crate::schedule::PipelineConfig;
use crate::table::{Table, TableBuilder};

use super::{Lazy, Pull};

impl<T: Send + 'static> Lazy<T> {
    /// Feed every live row to `sink`, stopping at the first error
    pub fn drain<F>(&self, mut sink: F) -> Result<()>
    where
        F: FnMut(T) -> Result<()>,
    {
        let started = Instant::now();
        let stream = self.realize();
        let (mut rows, mut filtered) = (0u64, 0u64);
        let mut index = 0;
        let outcome = loop {
            match stream.pull(index) {
                Ok(Pull::Row(row)) => {
                    rows += 1;
                    if let Err(e) = sink(row) {
                        break Err(e);
                    }
                }
                Ok(Pull::Filtered) => filtered += 1,
                Ok(Pull::End) => break Ok(()),
                Err(e) => break Err(e),
            }
            index += 1;
        };
        stream.stop();
        debug!(
            rows,
            filtered,
            failed = outcome.is_err(),
            elapsed_ms = started.elapsed().as_millis(),
            "drain finished"
        );
        outcome
    }

    /// Feed every live row to an infallible `f`
    pub fn foreach<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(T),
    {
        self.drain(|row| {
            f(row);
            Ok(())
        })
    }

    /// Count live rows
    pub fn count(&self) -> Result<usize> {
        let mut n = 0;
        self.drain(|_| {
            n += 1;
            Ok(())
        })?;
        Ok(n)
    }

    /// Like [`Lazy::drain`], panicking on error
    pub fn drain_or_abort<F>(&self, sink: F)
    where
        F: FnMut(T) -> Result<()>,
    {
        if let Err(e) = self.drain(sink) {
            panic!("pipeline failed: {e}");
        }
    }

    /// Like [`Lazy::count`], panicking on error
    pub fn count_or_abort(&self) -> usize {
        match self.count() {
            Ok(n) => n,
            Err(e) => panic!("pipeline failed: {e}"),
        }
    }
}

impl Lazy<Record> {
    /// Materialize the stream into a table
    pub fn collect(&self) -> Result<Table> {
        self.collect_with(&PipelineConfig::default())
    }

    /// Materialize with an explicit configuration
    ///
    /// The first live row fixes the schema; a later row with other names or
    /// types fails with a schema mismatch.
    pub fn collect_with(&self, config: &PipelineConfig) -> Result<Table> {
        let mut builder = TableBuilder::new(config.collect_capacity);
        self.drain(|row| builder.push(row))?;
        Ok(builder.finish())
    }

    /// Like [`Lazy::collect`], panicking on error
    pub fn collect_or_abort(&self) -> Table {
        match self.collect() {
            Ok(t) => t,
            Err(e) => panic!("pipeline failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::Value;

    fn row(i: i64) -> Record {
        Record::from_pairs([("i", Value::Int(i))]).unwrap()
    }

    #[test]
    fn test_collect_skips_filtered() {
        let lazy = Lazy::from_fn(|index| {
            Ok(match index {
                1 => Pull::Filtered,
                0 | 2 => Pull::Row(row(index as i64)),
                _ => Pull::End,
            })
        });
        let t = lazy.collect().unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("i").unwrap().ints().unwrap(), &[0, 2]);
    }

    #[test]
    fn test_drain_stops_on_sink_error() {
        let lazy = Lazy::from_records((0..10).map(row).collect());
        let mut seen = 0;
        let err = lazy
            .drain(|r| {
                seen += 1;
                if r.int("i")? == 3 {
                    return Err(Error::InvalidArgument("stop".into()));
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(seen, 4);
    }

    #[test]
    fn test_collect_fails_on_schema_drift() {
        let lazy = Lazy::from_records(vec![row(1), row(2).set("extra", true)]);
        assert!(matches!(lazy.collect(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    #[should_panic(expected = "pipeline failed")]
    fn test_collect_or_abort_panics() {
        Lazy::<Record>::from_error(|| Error::Mapping("x".into())).collect_or_abort();
    }

    #[test]
    fn test_count_or_abort() {
        assert_eq!(Lazy::from_records(vec![row(1)]).count_or_abort(), 1);
    }
}

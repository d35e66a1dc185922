//! Row combinators
//!
//! Stateless stages run entirely on the pulling thread. Stages whose output
//! depends on the sequence of rows (random flags, folds, truncation, chain
//! boundaries) compute their upstream result first and then run their step
//! under an [`OrderGate`], so they behave identically whether or not the
//! stream is pulled in parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mapper::{Shape, Transformer, Unwrapper, Wrapper};
use crate::memo::Memo;
use crate::order::OrderGate;
use crate::pattern::Pattern;
use crate::record::{OnlyFilter, Record};
use crate::value::{DataType, Value};

use super::{Lazy, Pull, Stream};

type Step<T, U> = dyn Fn(u64, T) -> Result<Pull<U>> + Send + Sync;
type GatedStep<S, T, U> = dyn Fn(&mut S, u64, Pull<T>) -> Result<Pull<U>> + Send + Sync;

/// Per-row stage with no cross-row state
struct Stateless<T, U> {
    upstream: Box<dyn Stream<T>>,
    step: Box<Step<T, U>>,
}

impl<T, U> Stream<U> for Stateless<T, U> {
    fn pull(&self, index: u64) -> Result<Pull<U>> {
        match self.upstream.pull(index)? {
            Pull::Row(row) => (self.step)(index, row),
            Pull::Filtered => Ok(Pull::Filtered),
            Pull::End => Ok(Pull::End),
        }
    }

    fn stop(&self) {
        self.upstream.stop();
    }
}

/// Stage whose step runs in strict index order
struct Gated<S, T, U> {
    upstream: Box<dyn Stream<T>>,
    gate: OrderGate,
    state: Mutex<S>,
    step: Box<GatedStep<S, T, U>>,
}

impl<S: Send, T, U> Stream<U> for Gated<S, T, U> {
    fn pull(&self, index: u64) -> Result<Pull<U>> {
        let pulled = self.upstream.pull(index);
        let Some(_turn) = self.gate.enter(index) else {
            return Ok(Pull::End);
        };
        let pulled = pulled?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (self.step)(&mut state, index, pulled)
    }

    fn stop(&self) {
        self.gate.stop();
        self.upstream.stop();
    }
}

/// Truncation after `n` live rows
struct First<T> {
    upstream: Box<dyn Stream<T>>,
    gate: OrderGate,
    seen: Mutex<usize>,
    done: AtomicBool,
    n: usize,
}

impl<T> Stream<T> for First<T> {
    fn pull(&self, index: u64) -> Result<Pull<T>> {
        if self.done.load(Ordering::Acquire) {
            return Ok(Pull::End);
        }
        let pulled = self.upstream.pull(index);
        let Some(_turn) = self.gate.enter(index) else {
            return Ok(Pull::End);
        };
        match pulled? {
            Pull::Row(row) => {
                let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
                *seen += 1;
                if *seen >= self.n {
                    debug!(rows = *seen, index, "first satisfied");
                    self.done.store(true, Ordering::Release);
                    self.gate.stop();
                }
                Ok(Pull::Row(row))
            }
            other => Ok(other),
        }
    }

    fn stop(&self) {
        self.gate.stop();
        self.upstream.stop();
    }
}

impl<T: Send + 'static> Lazy<T> {
    /// Add a per-row stage; `make` builds the step for each realization
    pub(crate) fn stage<U, M, F>(&self, make: M) -> Lazy<U>
    where
        U: Send + 'static,
        M: Fn() -> F + Send + Sync + 'static,
        F: Fn(u64, T) -> Result<Pull<U>> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Lazy::new(move || {
            Box::new(Stateless {
                upstream: upstream.realize(),
                step: Box::new(make()),
            })
        })
    }

    /// Add an index-ordered stage; `make` builds fresh state and step
    pub(crate) fn gated<U, S, M, F>(&self, make: M) -> Lazy<U>
    where
        U: Send + 'static,
        S: Send + 'static,
        M: Fn() -> (S, F) + Send + Sync + 'static,
        F: Fn(&mut S, u64, Pull<T>) -> Result<Pull<U>> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Lazy::new(move || {
            let (state, step) = make();
            Box::new(Gated {
                upstream: upstream.realize(),
                gate: OrderGate::new(),
                state: Mutex::new(state),
                step: Box::new(step),
            })
        })
    }

    /// Keep at most `n` live rows, then stop pulling upstream
    pub fn first(&self, n: usize) -> Lazy<T> {
        if n == 0 {
            return Lazy::empty();
        }
        let upstream = self.clone();
        Lazy::new(move || {
            Box::new(First {
                upstream: upstream.realize(),
                gate: OrderGate::new(),
                seen: Mutex::new(0),
                done: AtomicBool::new(false),
                n,
            })
        })
    }
}

/// Deterministic per-index generator
fn index_rng(seed: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

impl Lazy<Record> {
    /// Apply a raw row transform; `None` drops the row
    pub fn transform<F>(&self, f: F) -> Lazy<Record>
    where
        F: Fn(Record) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move || {
            let f = Arc::clone(&f);
            move |_: u64, row: Record| Ok(f(row)?.map_or(Pull::Filtered, Pull::Row))
        })
    }

    /// Unwrap each row into `A`, apply `f`, wrap the result as the new row
    pub fn map<A, B, F>(&self, f: F) -> Lazy<Record>
    where
        A: Shape,
        B: Shape,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move || {
            let f = Arc::clone(&f);
            let unwrapper = Unwrapper::<A>::new();
            let wrapper = Wrapper::<B>::new();
            move |_: u64, row: Record| Ok(Pull::Row(wrapper.wrap(&f(unwrapper.unwrap(&row)?))))
        })
    }

    /// Reshape each row to the fields of `A`
    pub fn project<A>(&self) -> Lazy<Record>
    where
        A: Shape,
    {
        self.map(|a: A| a)
    }

    /// Unwrap each row into `A`, apply `f`, overlay the result onto the row
    pub fn update<A, B, F>(&self, f: F) -> Lazy<Record>
    where
        A: Shape,
        B: Shape,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move || {
            let f = Arc::clone(&f);
            let unwrapper = Unwrapper::<A>::new();
            let transformer = Transformer::<B>::new();
            move |_: u64, row: Record| {
                let value = f(unwrapper.unwrap(&row)?);
                Ok(Pull::Row(transformer.transform(&value, &row)?))
            }
        })
    }

    /// Drop rows whose `A` view fails `pred`
    pub fn filter<A, F>(&self, pred: F) -> Lazy<Record>
    where
        A: Shape,
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let pred = Arc::new(pred);
        self.stage(move || {
            let pred = Arc::clone(&pred);
            let unwrapper = Unwrapper::<A>::new();
            move |_: u64, row: Record| {
                Ok(if pred(&unwrapper.unwrap(&row)?) {
                    Pull::Row(row)
                } else {
                    Pull::Filtered
                })
            }
        })
    }

    /// Keep each row with probability `prob`, decided by `(seed, index)` only
    pub fn rand(&self, seed: u64, prob: f64) -> Lazy<Record> {
        self.stage(move || {
            move |index: u64, row: Record| {
                let keep = index_rng(seed, index).gen::<f64>() < prob;
                Ok(if keep { Pull::Row(row) } else { Pull::Filtered })
            }
        })
    }

    /// Complement of [`Lazy::rand`] for the same arguments
    pub fn rand_skip(&self, seed: u64, prob: f64) -> Lazy<Record> {
        self.stage(move || {
            move |index: u64, row: Record| {
                let keep = index_rng(seed, index).gen::<f64>() >= prob;
                Ok(if keep { Pull::Row(row) } else { Pull::Filtered })
            }
        })
    }

    /// Add a boolean column drawn with probability `prob` from one sequence
    ///
    /// The draw for a row depends on every earlier live row.
    pub fn random_flag(&self, column: &str, seed: u64, prob: f64) -> Lazy<Record> {
        let column = column.to_string();
        self.gated(move || {
            let column = column.clone();
            let step = move |rng: &mut StdRng, _: u64, pulled: Pull<Record>| {
                Ok(pulled.map(|row| {
                    let flag = rng.gen::<f64>() < prob;
                    row.put(&column, Value::Bool(flag), false)
                }))
            };
            (StdRng::seed_from_u64(seed), step)
        })
    }

    /// Flag rows belonging to fold `k` of `kfold`
    ///
    /// Every `kfold` consecutive live rows receive a fresh Fisher-Yates
    /// permutation of the fold numbers, so each fold gets one row per cycle.
    pub fn kfold(&self, seed: u64, kfold: usize, k: usize, column: &str) -> Lazy<Record> {
        if kfold == 0 || k >= kfold {
            return Lazy::from_error(move || {
                Error::InvalidArgument(format!("fold {k} is out of {kfold} folds"))
            });
        }
        let column = column.to_string();
        self.gated(move || {
            let column = column.clone();
            let state = Folds {
                rng: StdRng::seed_from_u64(seed),
                order: (0..kfold).collect(),
                seen: 0,
            };
            let step = move |folds: &mut Folds, _: u64, pulled: Pull<Record>| {
                Ok(pulled.map(|row| {
                    let fold = folds.next();
                    row.put(&column, Value::Bool(fold == k), false)
                }))
            };
            (state, step)
        })
    }

    /// Copy column `column` under the name `alias`, null flag included
    pub fn alias(&self, column: &str, alias: &str) -> Lazy<Record> {
        let (column, alias) = (column.to_string(), alias.to_string());
        self.stage(move || {
            let (column, alias) = (column.clone(), alias.clone());
            move |_: u64, row: Record| {
                let value = row.value(&column)?.clone();
                let na = row.is_na(&column)?;
                Ok(Pull::Row(row.put(&alias, value, na)))
            }
        })
    }

    /// Set a boolean column to `true`
    pub fn set_true(&self, column: &str) -> Lazy<Record> {
        self.constant_flag(column, true)
    }

    /// Set a boolean column to `false`
    pub fn set_false(&self, column: &str) -> Lazy<Record> {
        self.constant_flag(column, false)
    }

    /// Keep rows whose boolean column is set
    ///
    /// A missing value or an absent column counts as not set.
    pub fn if_flag(&self, column: &str) -> Lazy<Record> {
        self.flag_filter(column, true)
    }

    /// Keep rows whose boolean column is not set
    pub fn if_not_flag(&self, column: &str) -> Lazy<Record> {
        self.flag_filter(column, false)
    }

    /// Keep only the columns matching any of `patterns`
    ///
    /// The projection is resolved from the first live row and reused.
    pub fn only<S: AsRef<str>>(&self, patterns: &[S]) -> Lazy<Record> {
        let patterns = match Pattern::all(patterns) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                let message = match e {
                    Error::InvalidArgument(message) => message,
                    other => other.to_string(),
                };
                return Lazy::from_error(move || Error::InvalidArgument(message.clone()));
            }
        };
        self.stage(move || {
            let patterns = Arc::clone(&patterns);
            let projection = Memo::new();
            move |_: u64, row: Record| {
                let only = projection.get_or_resolve(|| Ok(OnlyFilter::new(row.names(), &patterns)))?;
                Ok(Pull::Row(only.apply(&row)))
            }
        })
    }

    /// Round floating columns half away from zero
    pub fn round(&self, precision: i32) -> Lazy<Record> {
        self.stage(move || move |_: u64, row: Record| Ok(Pull::Row(row.round(precision))))
    }

    /// Append `other` after this stream
    ///
    /// The first live row of `other` must have the column names and types
    /// of the first live row of this stream.
    pub fn chain(&self, other: &Lazy<Record>) -> Lazy<Record> {
        let (a, b) = (self.clone(), other.clone());
        Lazy::new(move || {
            Box::new(Chain {
                a: a.realize(),
                b: b.realize(),
                gate: OrderGate::new(),
                state: Mutex::new(ChainState::default()),
            })
        })
    }

    fn constant_flag(&self, column: &str, flag: bool) -> Lazy<Record> {
        let column = column.to_string();
        self.stage(move || {
            let column = column.clone();
            move |_: u64, row: Record| Ok(Pull::Row(row.put(&column, Value::Bool(flag), false)))
        })
    }

    fn flag_filter(&self, column: &str, keep: bool) -> Lazy<Record> {
        let column = column.to_string();
        self.stage(move || {
            let column = column.clone();
            move |_: u64, row: Record| {
                let set = match row.pos(&column) {
                    Some(j) => !row.is_na_at(j) && row.flag(&column)?,
                    None => false,
                };
                Ok(if set == keep { Pull::Row(row) } else { Pull::Filtered })
            }
        })
    }
}

/// Fold assignment state
struct Folds {
    rng: StdRng,
    order: Vec<usize>,
    seen: usize,
}

impl Folds {
    fn next(&mut self) -> usize {
        let at = self.seen % self.order.len();
        if at == 0 {
            self.order.shuffle(&mut self.rng);
        }
        self.seen += 1;
        self.order[at]
    }
}

type Schema = Vec<(String, DataType)>;

fn schema_of(row: &Record) -> Schema {
    row.names()
        .iter()
        .cloned()
        .zip(row.values().iter().map(Value::data_type))
        .collect()
}

#[derive(Debug, Default)]
struct ChainState {
    boundary: Option<u64>,
    schema: Option<Schema>,
    checked: bool,
}

/// Concatenation of two record streams
struct Chain {
    a: Box<dyn Stream<Record>>,
    b: Box<dyn Stream<Record>>,
    gate: OrderGate,
    state: Mutex<ChainState>,
}

enum Early {
    A(Result<Pull<Record>>),
    B(Result<Pull<Record>>),
}

impl Chain {
    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Stream<Record> for Chain {
    fn pull(&self, index: u64) -> Result<Pull<Record>> {
        let boundary = self.lock().boundary;
        let early = match boundary {
            Some(at) => Early::B(self.b.pull(index - at)),
            None => Early::A(self.a.pull(index)),
        };
        let Some(_turn) = self.gate.enter(index) else {
            return Ok(Pull::End);
        };
        let mut state = self.lock();
        let (from_b, pulled) = match early {
            Early::B(pulled) => (true, pulled?),
            Early::A(pulled) => match pulled? {
                Pull::End => {
                    let at = *state.boundary.get_or_insert_with(|| {
                        debug!(index, "chain switched to second stream");
                        index
                    });
                    self.a.stop();
                    (true, self.b.pull(index - at)?)
                }
                other => (false, other),
            },
        };
        if let Pull::Row(row) = &pulled {
            if !from_b {
                if state.schema.is_none() {
                    state.schema = Some(schema_of(row));
                }
            } else if !state.checked {
                state.checked = true;
                if let Some(expected) = &state.schema {
                    let got = schema_of(row);
                    if &got != expected {
                        return Err(Error::SchemaMismatch(format!(
                            "cannot chain {} columns {got:?} after {} columns {expected:?}",
                            got.len(),
                            expected.len()
                        )));
                    }
                }
            }
        }
        Ok(pulled)
    }

    fn stop(&self) {
        self.gate.stop();
        self.a.stop();
        self.b.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::shape! {
        #[derive(Debug, Clone)]
        struct Xy {
            x: i64,
            y: f64,
        }
    }

    crate::shape! {
        #[derive(Debug, Clone)]
        struct Sum {
            sum: f64,
        }
    }

    fn rows(n: i64) -> Lazy<Record> {
        #[allow(clippy::cast_precision_loss)]
        Lazy::from_shapes((0..n).map(|x| Xy { x, y: x as f64 / 2.0 }).collect())
    }

    fn xs(lazy: &Lazy<Record>) -> Vec<i64> {
        let mut out = Vec::new();
        lazy.foreach(|r| out.push(r.int("x").unwrap())).unwrap();
        out
    }

    #[test]
    fn test_map_and_update() {
        let mapped = rows(3).map(|p: Xy| Sum { sum: p.x as f64 + p.y }).collect().unwrap();
        assert_eq!(mapped.names(), &["sum"]);
        assert_eq!(mapped.column("sum").unwrap().floats().unwrap(), &[0.0, 1.5, 3.0]);

        let updated = rows(2).update(|p: Xy| Sum { sum: p.y }).collect().unwrap();
        assert_eq!(updated.names(), &["x", "y", "sum"]);
    }

    #[test]
    fn test_filter_keeps_index_alignment() {
        let even = rows(6).filter(|p: &Xy| p.x % 2 == 0);
        let stream = even.realize();
        assert!(stream.pull(0).unwrap().is_row());
        assert_eq!(stream.pull(1).unwrap(), Pull::Filtered);
        assert_eq!(xs(&even), vec![0, 2, 4]);
    }

    #[test]
    fn test_rand_and_rand_skip_partition() {
        let kept = xs(&rows(200).rand(7, 0.3));
        let skipped = xs(&rows(200).rand_skip(7, 0.3));
        assert_eq!(kept.len() + skipped.len(), 200);
        assert!(kept.iter().all(|x| !skipped.contains(x)));
        assert_eq!(kept, xs(&rows(200).rand(7, 0.3)));
    }

    #[test]
    fn test_random_flag_is_deterministic() {
        let a = rows(50).random_flag("test", 3, 0.5).collect().unwrap();
        let b = rows(50).random_flag("test", 3, 0.5).collect().unwrap();
        assert_eq!(a.column("test").unwrap().flags().unwrap(), b.column("test").unwrap().flags().unwrap());
    }

    #[test]
    fn test_kfold_rejects_bad_fold() {
        assert!(matches!(rows(3).kfold(1, 3, 3, "f").count(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_first_truncates() {
        assert_eq!(xs(&rows(10).first(3)), vec![0, 1, 2]);
        assert_eq!(rows(10).first(0).count().unwrap(), 0);
        assert_eq!(rows(2).first(5).count().unwrap(), 2);
    }

    #[test]
    fn test_flags_alias_and_only() {
        let t = rows(4)
            .set_true("train")
            .alias("x", "id")
            .only(&["id", "train"])
            .collect()
            .unwrap();
        assert_eq!(t.names(), &["train", "id"]);
        assert_eq!(rows(4).set_false("train").if_flag("train").count().unwrap(), 0);
        assert_eq!(rows(4).set_false("train").if_not_flag("train").count().unwrap(), 4);
    }

    #[test]
    fn test_flag_filters_on_absent_column() {
        assert_eq!(rows(5).if_flag("test").count().unwrap(), 0);
        assert_eq!(xs(&rows(5).if_not_flag("test")), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_flag_filters_on_null_flag() {
        let flagged = rows(4).transform(|r| {
            let x = r.int("x")?;
            Ok(Some(r.set_na("test", x == 1, x == 3)))
        });
        assert_eq!(xs(&flagged.if_flag("test")), vec![1]);
        assert_eq!(xs(&flagged.if_not_flag("test")), vec![0, 2, 3]);
    }

    #[test]
    fn test_chain_concatenates() {
        assert_eq!(xs(&rows(2).chain(&rows(3))), vec![0, 1, 0, 1, 2]);
        assert_eq!(xs(&Lazy::<Record>::empty().chain(&rows(2))), vec![0, 1]);
    }

    #[test]
    fn test_chain_rejects_other_schema() {
        let other = rows(2).map(|p: Xy| Sum { sum: p.y });
        let err = rows(2).chain(&other).count().unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[test]
    fn test_transform_drops_none() {
        let odd = rows(5).transform(|r| Ok((r.int("x")? % 2 == 1).then_some(r)));
        assert_eq!(xs(&odd), vec![1, 3]);
    }
}

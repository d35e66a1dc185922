//! Order-preserving parallel pulls
//!
//! `parallel(n)` pulls the upstream stream on `n` worker threads. Workers
//! take indices in increasing order, at most a window ahead of the lowest
//! index not yet delivered, and send their results over a channel. Callers
//! get exactly the result of the index they ask for, so output order is the
//! same as with a sequential drain.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lazy::{Lazy, Pull, Stream};
use crate::schedule::PipelineConfig;

type Delivery<T> = (u64, Result<Pull<T>>);

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct DispatchState {
    /// Next index to hand to a worker
    next: u64,
    /// Lowest index not yet delivered
    floor: u64,
    /// Delivered indices above `floor`
    delivered: BTreeSet<u64>,
    /// Lowest index that produced the end marker or an error
    end_at: Option<u64>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Dispatch {
    state: Mutex<DispatchState>,
    wake: Condvar,
}

impl Dispatch {
    /// Next index for a worker, or `None` once stopped
    fn take(&self, window: u64) -> Option<u64> {
        let mut state = lock(&self.state);
        loop {
            if state.stopped {
                return None;
            }
            let past_end = state.end_at.is_some_and(|end| state.next > end);
            if !past_end && state.next < state.floor + window {
                let index = state.next;
                state.next += 1;
                return Some(index);
            }
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish_at(&self, index: u64) {
        let mut state = lock(&self.state);
        state.end_at = Some(state.end_at.map_or(index, |end| end.min(index)));
        self.wake.notify_all();
    }

    fn deliver(&self, index: u64) {
        let mut state = lock(&self.state);
        if index == state.floor {
            state.floor += 1;
            loop {
                let floor = state.floor;
                if !state.delivered.remove(&floor) {
                    break;
                }
                state.floor += 1;
            }
        } else if index > state.floor {
            state.delivered.insert(index);
        }
        self.wake.notify_all();
    }

    fn is_past_end(&self, index: u64) -> bool {
        lock(&self.state).end_at.is_some_and(|end| index > end)
    }

    fn stop(&self) {
        lock(&self.state).stopped = true;
        self.wake.notify_all();
    }
}

struct Reorder<T> {
    buffer: BTreeMap<u64, Result<Pull<T>>>,
    receiving: bool,
}

/// Stream pulled by a pool of worker threads
struct Parallel<T> {
    upstream: Arc<dyn Stream<T>>,
    workers: usize,
    window: u64,
    dispatch: Arc<Dispatch>,
    reorder: Mutex<Reorder<T>>,
    arrived: Condvar,
    rx: Receiver<Delivery<T>>,
    tx: Mutex<Option<Sender<Delivery<T>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> Parallel<T> {
    fn new(upstream: Box<dyn Stream<T>>, workers: usize, window: u64) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            upstream: Arc::from(upstream),
            workers,
            window,
            dispatch: Arc::new(Dispatch::default()),
            reorder: Mutex::new(Reorder {
                buffer: BTreeMap::new(),
                receiving: false,
            }),
            arrived: Condvar::new(),
            rx,
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers on first use
    fn start(&self) -> Result<()> {
        let Some(tx) = lock(&self.tx).take() else {
            return Ok(());
        };
        let mut handles = lock(&self.handles);
        for k in 0..self.workers {
            let upstream = Arc::clone(&self.upstream);
            let dispatch = Arc::clone(&self.dispatch);
            let tx = tx.clone();
            let window = self.window;
            let spawned = thread::Builder::new()
                .name(format!("ml-tables-worker-{k}"))
                .spawn(move || work(upstream.as_ref(), &dispatch, window, &tx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.dispatch.stop();
                    return Err(Error::Io(e));
                }
            }
        }
        debug!(workers = self.workers, window = self.window, "parallel workers started");
        Ok(())
    }
}

fn work<T>(upstream: &dyn Stream<T>, dispatch: &Dispatch, window: u64, tx: &Sender<Delivery<T>>) {
    while let Some(index) = dispatch.take(window) {
        let pulled = panic::catch_unwind(AssertUnwindSafe(|| upstream.pull(index)))
            .unwrap_or_else(|_| Err(Error::Upstream(anyhow!("worker panicked at index {index}"))));
        if matches!(pulled, Ok(Pull::End) | Err(_)) {
            dispatch.finish_at(index);
        }
        if tx.send((index, pulled)).is_err() {
            break;
        }
    }
}

impl<T: Send + 'static> Stream<T> for Parallel<T> {
    fn pull(&self, index: u64) -> Result<Pull<T>> {
        self.start()?;
        let mut reorder = lock(&self.reorder);
        loop {
            if !reorder.receiving {
                while let Ok((i, pulled)) = self.rx.try_recv() {
                    reorder.buffer.insert(i, pulled);
                }
            }
            if let Some(pulled) = reorder.buffer.remove(&index) {
                drop(reorder);
                self.dispatch.deliver(index);
                return pulled;
            }
            if self.dispatch.is_past_end(index) {
                drop(reorder);
                self.dispatch.deliver(index);
                return Ok(Pull::End);
            }
            if reorder.receiving {
                reorder = self.arrived.wait(reorder).unwrap_or_else(PoisonError::into_inner);
                continue;
            }

            reorder.receiving = true;
            drop(reorder);
            let received = self.rx.recv();
            reorder = lock(&self.reorder);
            reorder.receiving = false;
            self.arrived.notify_all();
            match received {
                Ok((i, pulled)) => {
                    reorder.buffer.insert(i, pulled);
                }
                Err(_) => return Ok(Pull::End),
            }
        }
    }

    fn stop(&self) {
        self.dispatch.stop();
        self.upstream.stop();
    }
}

impl<T> Drop for Parallel<T> {
    fn drop(&mut self) {
        self.dispatch.stop();
        self.upstream.stop();
        let handles = std::mem::take(&mut *lock(&self.handles));
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("parallel worker exited abnormally");
            }
        }
        debug!("parallel workers stopped");
    }
}

impl<T: Send + 'static> Lazy<T> {
    /// Pull this stream on `concurrency` worker threads
    ///
    /// `0` uses one worker per CPU and `1` leaves the stream sequential.
    /// Delivery order is unchanged.
    pub fn parallel(&self, concurrency: usize) -> Lazy<T> {
        self.parallel_with(concurrency, &PipelineConfig::default())
    }

    /// Like [`Lazy::parallel`] with explicit worker and window settings
    pub fn parallel_with(&self, concurrency: usize, config: &PipelineConfig) -> Lazy<T> {
        let workers = config.concurrency(concurrency);
        if workers <= 1 {
            return self.clone();
        }
        let window = config.window(workers);
        let upstream = self.clone();
        Lazy::new(move || Box::new(Parallel::new(upstream.realize(), workers, window)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn numbers(n: u64) -> Lazy<u64> {
        Lazy::from_fn(move |i| {
            if i % 3 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(if i < n { Pull::Row(i) } else { Pull::End })
        })
    }

    fn drained(lazy: &Lazy<u64>) -> Vec<u64> {
        let mut out = Vec::new();
        lazy.foreach(|x| out.push(x)).unwrap();
        out
    }

    #[test]
    fn test_parallel_preserves_order() {
        assert_eq!(drained(&numbers(100).parallel(4)), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_one_is_sequential() {
        assert_eq!(drained(&numbers(10).parallel(1)), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_surfaces_first_error() {
        let failing = Lazy::from_fn(|i| {
            if i == 5 {
                Err(Error::InvalidArgument("five".into()))
            } else {
                Ok(Pull::Row(i))
            }
        });
        let mut seen = Vec::new();
        let err = failing.parallel(3).drain(|x| {
            seen.push(x);
            Ok(())
        });
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_window_bounds_lookahead() {
        let pulled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&pulled);
        let config = PipelineConfig {
            worker_threads: 2,
            window_factor: 2,
            ..PipelineConfig::default()
        };
        let lazy = Lazy::from_fn(move |i| {
            counter.fetch_max(i, Ordering::SeqCst);
            Ok(if i < 1000 { Pull::Row(i) } else { Pull::End })
        })
        .parallel_with(2, &config)
        .first(3);
        assert_eq!(lazy.count().unwrap(), 3);
        assert!(pulled.load(Ordering::SeqCst) < 3 + config.window(2));
    }

    #[test]
    fn test_nested_parallel() {
        let lazy = numbers(64).parallel(2).parallel(4);
        assert_eq!(drained(&lazy), (0..64).collect::<Vec<_>>());
    }
}

//! Index-order coordination for stateful stream stages
//!
//! Rows of one stream may be produced concurrently and finish in any order.
//! A stage whose state depends on the row sequence computes its upstream
//! result first, then enters an [`OrderGate`] and runs its stateful step
//! only once every lower index has passed.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

#[derive(Debug, Default)]
struct GateState {
    next: u64,
    stopped: bool,
}

/// Serializes a stateful step in index order
#[derive(Debug, Default)]
pub struct OrderGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

impl OrderGate {
    /// Create a gate expecting index 0 first
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until it is `index`'s turn
    ///
    /// Returns `None` if the gate was stopped while waiting. Every index
    /// must enter exactly once, and the returned guard advances the gate
    /// when dropped.
    pub fn enter(&self, index: u64) -> Option<Turn<'_>> {
        let mut state = self.lock();
        while !state.stopped && state.next < index {
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.stopped {
            return None;
        }
        if state.next > index {
            warn!(index, next = state.next, "index entered the order gate twice");
            return None;
        }
        Some(Turn { gate: self })
    }

    /// Release every waiter; later callers get no turn
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.turn.notify_all();
    }

    /// Check if the gate was stopped
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Next index expected to enter
    pub fn next(&self) -> u64 {
        self.lock().next
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The right to run one index's stateful step
#[derive(Debug)]
pub struct Turn<'a> {
    gate: &'a OrderGate,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.gate.lock().next += 1;
        self.gate.turn.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequential_never_blocks() {
        let gate = OrderGate::new();
        for i in 0..5 {
            assert!(gate.enter(i).is_some());
        }
        assert_eq!(gate.next(), 5);
    }

    #[test]
    fn test_out_of_order_arrivals_run_in_order() {
        let gate = Arc::new(OrderGate::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..16u64)
            .rev()
            .map(|i| {
                let gate = Arc::clone(&gate);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    let _turn = gate.enter(i).unwrap();
                    seen.lock().unwrap().push(i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_releases_waiters() {
        let gate = Arc::new(OrderGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.enter(3).is_none())
        };
        gate.stop();
        assert!(waiter.join().unwrap());
        assert!(gate.is_stopped());
        assert!(gate.enter(0).is_none());
    }
}

use std::sync::{Arc, Condvar, Mutex, PoisonError};
#[cfg(test)]
use std::time::{Duration, Instant};

/// Why a slot was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The ceiling is reached.
    Full,
    /// The tracker was closed for shutdown.
    Closed,
}

#[derive(Debug, Default)]
struct Slots {
    count: usize,
    closed: bool,
}

/// Count of workers that have started and not yet finished.
#[derive(Debug, Default)]
pub struct InflightTracker {
    slots: Mutex<Slots>,
    idle: Condvar,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot if fewer than `max` are in use. Check and increment happen
    /// under one lock.
    pub fn try_acquire(self: &Arc<Self>, max: usize) -> Result<InflightGuard, Rejected> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.closed {
            return Err(Rejected::Closed);
        }
        if slots.count >= max {
            return Err(Rejected::Full);
        }
        slots.count += 1;
        Ok(InflightGuard {
            tracker: Arc::clone(self),
        })
    }

    /// Take a slot regardless of the current count.
    pub fn acquire(self: &Arc<Self>) -> Result<InflightGuard, Rejected> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.closed {
            return Err(Rejected::Closed);
        }
        slots.count += 1;
        Ok(InflightGuard {
            tracker: Arc::clone(self),
        })
    }

    /// Refuse all further slots. Running workers are unaffected.
    pub fn close(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    pub fn current(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count
    }

    /// Block until no worker is in flight.
    pub fn wait_idle(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        while slots.count > 0 {
            slots = self
                .idle
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until idle or `timeout` elapses. Returns whether idle was reached.
    #[cfg(test)]
    fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        while slots.count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slots = self
                .idle
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn release(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.count = slots.count.saturating_sub(1);
        if slots.count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Releases its slot on drop, including during unwinding.
#[derive(Debug)]
pub struct InflightGuard {
    tracker: Arc<InflightTracker>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn try_acquire_respects_ceiling() {
        let tracker = Arc::new(InflightTracker::new());
        let a = tracker.try_acquire(2).unwrap();
        let _b = tracker.try_acquire(2).unwrap();
        assert_eq!(tracker.try_acquire(2).unwrap_err(), Rejected::Full);
        assert_eq!(tracker.current(), 2);

        drop(a);
        assert_eq!(tracker.current(), 1);
        assert!(tracker.try_acquire(2).is_ok());
    }

    #[test]
    fn acquire_ignores_ceiling() {
        let tracker = Arc::new(InflightTracker::new());
        let _a = tracker.try_acquire(1).unwrap();
        let _b = tracker.acquire().unwrap();
        assert_eq!(tracker.current(), 2);
    }

    #[test]
    fn closed_tracker_refuses_new_slots() {
        let tracker = Arc::new(InflightTracker::new());
        let running = tracker.acquire().unwrap();
        tracker.close();

        assert!(tracker.is_closed());
        assert_eq!(tracker.try_acquire(8).unwrap_err(), Rejected::Closed);
        assert_eq!(tracker.acquire().unwrap_err(), Rejected::Closed);
        assert_eq!(tracker.current(), 1);

        drop(running);
        assert!(tracker.wait_idle_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn guard_released_on_panic() {
        let tracker = Arc::new(InflightTracker::new());
        let worker = {
            let guard = tracker.acquire().unwrap();
            thread::spawn(move || {
                let _guard = guard;
                panic!("worker failed");
            })
        };
        assert!(worker.join().is_err());
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn wait_idle_blocks_until_release() {
        let tracker = Arc::new(InflightTracker::new());
        let guard = tracker.acquire().unwrap();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.wait_idle())
        };

        assert!(!tracker.wait_idle_timeout(Duration::from_millis(20)));
        drop(guard);
        waiter.join().unwrap();
        assert!(tracker.wait_idle_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn concurrent_try_acquire_never_exceeds_max() {
        let tracker = Arc::new(InflightTracker::new());
        let max = 4;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..200 {
                        if let Ok(guard) = tracker.try_acquire(max) {
                            assert!(tracker.current() <= max);
                            drop(guard);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.current(), 0);
    }
}

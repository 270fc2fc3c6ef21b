//! Rendezvous primitives between the message handlers and the mode loop.
//!
//! Both shapes are single-consumer: the mode loop waits, handler tasks
//! signal. Missed-wakeup safety relies on `Notify`'s stored permit, so a
//! signal landing between the consumer's check and its park is never lost.

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Fires once every expected source has signalled exactly once.
pub struct EachUnit {
    state: Mutex<EachState>,
    notify: Notify,
}

struct EachState {
    seen: Vec<bool>,
    count: usize,
}

impl EachUnit {
    /// Creates a unit expecting one signal from each of `n` sources.
    pub fn new(n: usize) -> Self {
        Self {
            state: Mutex::new(EachState {
                seen: vec![false; n],
                count: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Records a signal from `source`; repeated signals from the same
    /// source within one round are collapsed.
    pub fn input(&self, source: usize) {
        let mut state = self.state.lock();
        let Some(slot) = state.seen.get_mut(source) else {
            return;
        };
        if !*slot {
            *slot = true;
            state.count += 1;
            if state.count == state.seen.len() {
                self.notify.notify_one();
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        let state = self.state.lock();
        state.count == state.seen.len()
    }

    /// Waits until every source has signalled.
    pub async fn wait(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Waits until every source has signalled, then opens the next round.
    pub async fn wait_and_reset(&self) {
        loop {
            {
                let mut state = self.state.lock();
                if state.count == state.seen.len() {
                    state.seen.fill(false);
                    state.count = 0;
                    return;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Opens the next round, discarding partial arrivals.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.seen.fill(false);
        state.count = 0;
    }
}

/// Fires once at least one signal has arrived from any source.
pub struct AnyUnit {
    count: Mutex<u64>,
    bound: u64,
    notify: Notify,
}

impl AnyUnit {
    /// Creates a unit whose pending-signal counter saturates at `bound`.
    pub fn new(bound: u64) -> Self {
        Self {
            count: Mutex::new(0),
            bound,
            notify: Notify::new(),
        }
    }

    /// Records one signal.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count = (*count + 1).min(self.bound);
        self.notify.notify_one();
    }

    pub fn pending(&self) -> u64 {
        *self.count.lock()
    }

    /// Waits until at least one signal is pending.
    pub async fn wait(&self) {
        loop {
            if *self.count.lock() > 0 {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Waits until at least one signal is pending, then drains the counter.
    pub async fn wait_and_reset(&self) {
        loop {
            {
                let mut count = self.count.lock();
                if *count > 0 {
                    *count = 0;
                    return;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn reset(&self) {
        *self.count.lock() = 0;
    }
}

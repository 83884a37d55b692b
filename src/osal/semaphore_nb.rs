//! Non-blocking counting semaphore (component design §4.5).
//!
//! `Wait` never parks a host thread: it either decrements immediately or
//! hands the caller's callback to a FIFO queue that later `Post` calls
//! drain, invoking each callback inline in the context of the releasing
//! `Post`. Unused by TFC — there is nothing to block on, so this module has
//! no `cfg(feature = "tfc")` branches.

use std::collections::VecDeque;

use parking_lot::Mutex as InnerLock;

use crate::panic::panic_msg;

type Callback = Box<dyn FnMut() + Send>;

struct State {
    count: u64,
    callbacks: VecDeque<Callback>,
}

pub struct NonBlockingSemaphore {
    state: InnerLock<State>,
}

impl NonBlockingSemaphore {
    pub fn new(initial: u64) -> Self {
        NonBlockingSemaphore { state: InnerLock::new(State { count: initial, callbacks: VecDeque::new() }) }
    }

    /// Decrements and returns `true` if a token is free; otherwise queues
    /// `callback` and returns `false`.
    pub fn wait(&self, callback: impl FnMut() + Send + 'static) -> bool {
        let mut guard = self.state.lock();
        if guard.count > 0 {
            guard.count -= 1;
            true
        } else {
            guard.callbacks.push_back(Box::new(callback));
            false
        }
    }

    /// Increments, or invokes and dequeues the oldest queued callback.
    /// Invoking an overflowing counter (no waiters, counter already at
    /// `u64::MAX`) is a programming error.
    pub fn post(&self) {
        let callback = {
            let mut guard = self.state.lock();
            match guard.callbacks.pop_front() {
                Some(cb) => Some(cb),
                None => {
                    guard.count = guard
                        .count
                        .checked_add(1)
                        .unwrap_or_else(|| panic_msg("NonBlockingSemaphore::post: counter overflow"));
                    None
                }
            }
        };

        if let Some(mut cb) = callback {
            cb();
        }
    }

    #[cfg(test)]
    fn pending_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }
}

impl Drop for NonBlockingSemaphore {
    fn drop(&mut self) {
        if !self.state.lock().callbacks.is_empty() {
            panic_msg("NonBlockingSemaphore dropped with callbacks still queued");
        }
    }
}

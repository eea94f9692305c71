//! Matches responses to the callers waiting for them.
//!
//! The monitor thread posts every response under its request id; callers
//! block until their id shows up or their deadline passes. Responses that
//! nobody claims (late arrivals after a timeout) are swept once they are
//! older than the configured TTL.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{LinkError, Result};

struct Entry<T> {
    value: T,
    posted_at: Instant,
}

struct State<T> {
    responses: HashMap<u8, Entry<T>>,
    closed: bool,
}

/// Thread-safe map from request id to the response that arrived for it.
pub struct Correlator<T> {
    state: Mutex<State<T>>,
    arrived: Condvar,
    ttl: Duration,
}

impl<T> Correlator<T> {
    /// Create a correlator that drops unclaimed responses after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                responses: HashMap::new(),
                closed: false,
            }),
            arrived: Condvar::new(),
            ttl,
        }
    }

    /// Deliver a response. Replaces an unclaimed response with the same id
    /// and wakes every waiter. Never blocks on waiters.
    pub fn post(&self, id: u8, value: T) {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!(id, "dropping response posted after close");
            return;
        }

        self.sweep(&mut state);
        let entry = Entry {
            value,
            posted_at: Instant::now(),
        };
        if state.responses.insert(id, entry).is_some() {
            tracing::debug!(id, "replaced unclaimed response");
        }
        drop(state);

        self.arrived.notify_all();
    }

    /// Wait for the response to `id`.
    ///
    /// `None` waits until the response arrives or the correlator is closed.
    /// Wakeups for other ids never end the wait early.
    pub fn await_response(&self, id: u8, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.lock();
        self.sweep(&mut state);

        loop {
            if let Some(entry) = state.responses.remove(&id) {
                return Ok(entry.value);
            }
            if state.closed {
                return Err(LinkError::LinkDown);
            }

            match deadline {
                None => {
                    state = self
                        .arrived
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LinkError::NoResponse {
                            id,
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                    let (guard, _) = self
                        .arrived
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
    }

    /// Drop an unclaimed response, e.g. a late answer to an earlier request
    /// whose id is about to be reused.
    pub fn discard(&self, id: u8) -> bool {
        self.lock().responses.remove(&id).is_some()
    }

    /// Stop accepting responses and fail every current and future waiter
    /// with [`LinkError::LinkDown`].
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.responses.clear();
        drop(state);

        self.arrived.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of responses posted but not yet claimed.
    pub fn pending(&self) -> usize {
        self.lock().responses.len()
    }

    fn sweep(&self, state: &mut State<T>) {
        let before = state.responses.len();
        let ttl = self.ttl;
        state
            .responses
            .retain(|_, entry| entry.posted_at.elapsed() <= ttl);

        let swept = before - state.responses.len();
        if swept > 0 {
            tracing::debug!(swept, "evicted stale responses");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

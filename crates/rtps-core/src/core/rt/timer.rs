// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant event scheduler.
//!
//! One background thread per participant drives every timed activity:
//! heartbeats, deadline and lifespan checks, participant announcements,
//! lease checks, discovery-server sync and flow-control retries.
//!
//! # Architecture
//!
//! ```text
//!   TimerHandle::restart() --+
//!                            v
//!   +-------------------------------------------+
//!   | BinaryHeap<(deadline, generation, id)>    |   min-heap by deadline
//!   +-------------------------------------------+
//!                            |
//!                            v  (scheduler thread)
//!   pop earliest -> skip stale generation -> run callback -> re-arm?
//! ```
//!
//! Re-arming or cancelling a timer bumps its generation, so stale heap
//! entries are skipped instead of being searched and removed.
//!
//! # Cancellation
//!
//! [`TimerHandle::cancel`] is synchronous: when the callback of that timer is
//! running on the scheduler thread, the caller blocks until it returns. An
//! entity that cancels its timers before tearing down state therefore never
//! sees a callback run against half-destroyed data. Calling `cancel` from
//! inside a callback does not block.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// What the scheduler does with a timer once its callback returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Leave the timer idle (unless the callback re-armed it).
    Stop,
    /// Re-arm with the current interval.
    Restart,
    /// Re-arm to fire after the given delay, keeping the interval.
    RestartIn(Duration),
}

/// Timer callback. Runs on the scheduler thread without any scheduler lock held.
pub type TimerCallback = Box<dyn FnMut() -> TimerAction + Send>;

type TimerId = u64;

struct TimerEntry {
    interval: Duration,
    callback: Option<TimerCallback>,
    generation: u64,
    armed_at: Option<Instant>,
}

struct State {
    queue: BinaryHeap<Reverse<(Instant, u64, TimerId)>>,
    timers: HashMap<TimerId, TimerEntry>,
    running: Option<TimerId>,
    next_id: TimerId,
    stopped: bool,
    thread_id: Option<ThreadId>,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

impl Inner {
    fn arm(&self, state: &mut State, id: TimerId, delay: Duration) {
        let Some(entry) = state.timers.get_mut(&id) else {
            return;
        };
        // Infinite intervals never fire
        let Some(deadline) = Instant::now().checked_add(delay) else {
            entry.generation += 1;
            entry.armed_at = None;
            return;
        };
        entry.generation += 1;
        entry.armed_at = Some(deadline);
        let generation = entry.generation;
        state.queue.push(Reverse((deadline, generation, id)));
        self.cond.notify_all();
    }

    fn wait_not_running(&self, state: &mut parking_lot::MutexGuard<'_, State>, id: TimerId) {
        if state.thread_id == Some(thread::current().id()) {
            return;
        }
        while state.running == Some(id) {
            self.cond.wait(state);
        }
    }
}

/// Single-threaded timer scheduler.
///
/// Dropping the scheduler stops the thread and joins it.
pub struct TimerScheduler {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerScheduler {
    /// Spawn the scheduler thread.
    pub fn start(name: &str) -> std::io::Result<Self> {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                queue: BinaryHeap::new(),
                timers: HashMap::new(),
                running: None,
                next_id: 1,
                stopped: false,
                thread_id: None,
            }),
            cond: Condvar::new(),
        });

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run_loop(&thread_inner))?;

        Ok(Self {
            inner,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Register a timer; it stays idle until [`TimerHandle::restart`].
    pub fn create_timer<F>(&self, interval: Duration, callback: F) -> TimerHandle
    where
        F: FnMut() -> TimerAction + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.timers.insert(
            id,
            TimerEntry {
                interval,
                callback: Some(Box::new(callback)),
                generation: 0,
                armed_at: None,
            },
        );
        TimerHandle {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of registered timers (armed or idle).
    pub fn timer_count(&self) -> usize {
        self.inner.state.lock().timers.len()
    }

    /// Stop the scheduler thread. Pending timers never fire afterwards.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            self.inner.cond.notify_all();
            if state.thread_id == Some(thread::current().id()) {
                return;
            }
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn run_loop(inner: &Inner) {
        let mut state = inner.state.lock();
        state.thread_id = Some(thread::current().id());

        loop {
            if state.stopped {
                break;
            }

            let Some(Reverse((deadline, generation, id))) = state.queue.peek().copied() else {
                inner.cond.wait(&mut state);
                continue;
            };

            let current = state
                .timers
                .get(&id)
                .map(|e| e.generation == generation && e.armed_at.is_some())
                .unwrap_or(false);
            if !current {
                state.queue.pop();
                continue;
            }

            if deadline > Instant::now() {
                let _ = inner.cond.wait_until(&mut state, deadline);
                continue;
            }

            state.queue.pop();
            let callback = state.timers.get_mut(&id).and_then(|entry| {
                entry.armed_at = None;
                entry.callback.take()
            });
            let Some(mut callback) = callback else {
                continue;
            };
            state.running = Some(id);
            let gen_before = state.timers.get(&id).map(|e| e.generation).unwrap_or(0);

            let action = parking_lot::MutexGuard::unlocked(&mut state, || callback());

            state.running = None;
            let mut rearm = None;
            if let Some(entry) = state.timers.get_mut(&id) {
                entry.callback = Some(callback);
                // A restart or cancel issued during the callback wins
                if entry.generation == gen_before {
                    rearm = match action {
                        TimerAction::Stop => None,
                        TimerAction::Restart => Some(entry.interval),
                        TimerAction::RestartIn(d) => Some(d),
                    };
                }
            }
            if let Some(delay) = rearm {
                inner.arm(&mut state, id, delay);
            }
            inner.cond.notify_all();
        }

        log::debug!("[timer] scheduler thread exiting");
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle to one timer. Dropping it cancels and unregisters the timer.
pub struct TimerHandle {
    id: TimerId,
    inner: Arc<Inner>,
}

impl TimerHandle {
    /// Arm the timer to fire after its interval, replacing any pending firing.
    pub fn restart(&self) {
        let mut state = self.inner.state.lock();
        let interval = match state.timers.get(&self.id) {
            Some(e) => e.interval,
            None => return,
        };
        self.inner.arm(&mut state, self.id, interval);
    }

    /// Arm the timer to fire after `delay` (interval unchanged).
    pub fn restart_in(&self, delay: Duration) {
        let mut state = self.inner.state.lock();
        self.inner.arm(&mut state, self.id, delay);
    }

    /// Change the interval; takes effect on the next `restart`.
    pub fn update_interval(&self, interval: Duration) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.timers.get_mut(&self.id) {
            entry.interval = interval;
        }
    }

    pub fn interval(&self) -> Duration {
        let state = self.inner.state.lock();
        state
            .timers
            .get(&self.id)
            .map(|e| e.interval)
            .unwrap_or_default()
    }

    /// Disarm the timer, waiting for an in-flight callback to complete.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.timers.get_mut(&self.id) {
            entry.generation += 1;
            entry.armed_at = None;
        }
        self.inner.wait_not_running(&mut state, self.id);
    }

    pub fn is_armed(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .timers
            .get(&self.id)
            .map(|e| e.armed_at.is_some())
            .unwrap_or(false)
    }

    /// Time left until the timer fires, `None` when idle.
    pub fn remaining(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        state
            .timers
            .get(&self.id)
            .and_then(|e| e.armed_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.timers.get_mut(&self.id) {
            entry.generation += 1;
            entry.armed_at = None;
        }
        self.inner.wait_not_running(&mut state, self.id);
        state.timers.remove(&self.id);
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

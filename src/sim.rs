/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! [`SimEnv`]: a deterministic in-memory [`WindowEnv`].
//!
//! Stands in for a real windowing substrate the way stub pages stand in for
//! a real login server: tests (and downstream consumers' tests) script popup
//! blocking, user closes, inbound messages and the passage of time, all
//! offline and without a browser.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::env::{ListenerId, MessageCallback, TimerCallback, TimerId, WindowEnv};
use crate::types::{MessageEvent, ScreenMetrics};

/// Handle to a simulated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimHandle(u64);

/// Record of a spawned simulated window.
#[derive(Debug, Clone, Serialize)]
pub struct SimWindow {
    /// Destination the window was opened with, verbatim.
    pub destination: String,
    /// Browsing-context name.
    pub name: String,
    /// Feature string the controller computed.
    pub features: String,
    /// Closed-flag, settable by tests to simulate a user close.
    pub closed: bool,
}

struct SimTimer {
    interval: Duration,
    due: Duration,
    cancelled: Rc<Cell<bool>>,
    callback: Rc<RefCell<TimerCallback>>,
}

struct SimListener {
    removed: Rc<Cell<bool>>,
    callback: Rc<RefCell<MessageCallback<SimHandle>>>,
}

struct SimState {
    metrics: ScreenMetrics,
    block_popups: bool,
    now: Duration,
    next_id: u64,
    windows: BTreeMap<u64, SimWindow>,
    timers: BTreeMap<u64, SimTimer>,
    listeners: BTreeMap<u64, SimListener>,
}

/// Deterministic in-memory windowing environment with a virtual clock.
pub struct SimEnv {
    state: RefCell<SimState>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment with default [`ScreenMetrics`] and popups allowed.
    pub fn new() -> Self {
        Self::with_metrics(ScreenMetrics::default())
    }

    /// Environment reporting the given screen metrics.
    pub fn with_metrics(metrics: ScreenMetrics) -> Self {
        Self {
            state: RefCell::new(SimState {
                metrics,
                block_popups: false,
                now: Duration::ZERO,
                next_id: 1,
                windows: BTreeMap::new(),
                timers: BTreeMap::new(),
                listeners: BTreeMap::new(),
            }),
        }
    }

    /// Make subsequent `open_window` calls fail, like a popup blocker.
    pub fn block_popups(&self, blocked: bool) {
        self.state.borrow_mut().block_popups = blocked;
    }

    /// Handle of the most recently spawned window.
    pub fn last_opened(&self) -> Option<SimHandle> {
        self.state
            .borrow()
            .windows
            .keys()
            .next_back()
            .copied()
            .map(SimHandle)
    }

    /// Snapshot of one window's record.
    pub fn window(&self, handle: &SimHandle) -> Option<SimWindow> {
        self.state.borrow().windows.get(&handle.0).cloned()
    }

    /// Snapshot of every window ever spawned, in spawn order.
    pub fn windows(&self) -> Vec<SimWindow> {
        self.state.borrow().windows.values().cloned().collect()
    }

    /// Number of timers currently registered and not cancelled.
    pub fn timer_count(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of message listeners currently subscribed.
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Deliver a message on the shared bus, as if `source` had posted it.
    ///
    /// Every subscribed listener sees it; origin filtering is the
    /// listeners' job, exactly as on a real message bus.
    pub fn post_message(&self, source: SimHandle, data: Value) {
        let event = MessageEvent { source, data };
        let ready: Vec<(Rc<Cell<bool>>, Rc<RefCell<MessageCallback<SimHandle>>>)> = self
            .state
            .borrow()
            .listeners
            .values()
            .map(|l| (Rc::clone(&l.removed), Rc::clone(&l.callback)))
            .collect();
        // Invoke outside the state borrow: a listener may unsubscribe itself
        // or cancel timers while handling the event.
        for (removed, callback) in ready {
            if !removed.get() {
                (callback.borrow_mut())(&event);
            }
        }
    }

    /// Advance the virtual clock, firing due timers in due-time order.
    ///
    /// A timer with interval `i` registered at time `t` fires at `t + i`,
    /// `t + 2i`, ... up to the new clock value; cancellation from inside a
    /// callback suppresses all later firings.
    pub fn advance(&self, delta: Duration) {
        let target = self.state.borrow().now + delta;
        loop {
            let next_due = self
                .state
                .borrow()
                .timers
                .values()
                .filter(|t| !t.cancelled.get())
                .map(|t| t.due)
                .min();
            let Some(due) = next_due else { break };
            if due > target {
                break;
            }
            let ready: Vec<(Rc<Cell<bool>>, Rc<RefCell<TimerCallback>>)> = {
                let mut state = self.state.borrow_mut();
                state.now = due;
                state
                    .timers
                    .values_mut()
                    .filter(|t| !t.cancelled.get() && t.due <= due)
                    .map(|t| {
                        t.due += t.interval;
                        (Rc::clone(&t.cancelled), Rc::clone(&t.callback))
                    })
                    .collect()
            };
            for (cancelled, callback) in ready {
                if !cancelled.get() {
                    (callback.borrow_mut())();
                }
            }
        }
        self.state.borrow_mut().now = target;
    }
}

impl WindowEnv for SimEnv {
    type Handle = SimHandle;

    fn screen_metrics(&self) -> ScreenMetrics {
        self.state.borrow().metrics
    }

    fn open_window(&self, destination: &str, name: &str, features: &str) -> Option<SimHandle> {
        let mut state = self.state.borrow_mut();
        if state.block_popups {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.windows.insert(
            id,
            SimWindow {
                destination: destination.to_string(),
                name: name.to_string(),
                features: features.to_string(),
                closed: false,
            },
        );
        Some(SimHandle(id))
    }

    fn is_window_closed(&self, handle: &SimHandle) -> bool {
        self.state
            .borrow()
            .windows
            .get(&handle.0)
            .is_none_or(|w| w.closed)
    }

    fn close_window(&self, handle: &SimHandle) {
        if let Some(window) = self.state.borrow_mut().windows.get_mut(&handle.0) {
            window.closed = true;
        }
    }

    fn start_timer(&self, interval: Duration, callback: TimerCallback) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        // A zero interval would spin `advance` forever.
        let interval = interval.max(Duration::from_millis(1));
        let due = state.now + interval;
        state.timers.insert(
            id,
            SimTimer {
                interval,
                due,
                cancelled: Rc::new(Cell::new(false)),
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        TimerId(id)
    }

    fn cancel_timer(&self, id: TimerId) {
        if let Some(timer) = self.state.borrow_mut().timers.remove(&id.0) {
            timer.cancelled.set(true);
        }
    }

    fn add_message_listener(&self, callback: MessageCallback<SimHandle>) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(
            id,
            SimListener {
                removed: Rc::new(Cell::new(false)),
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        ListenerId(id)
    }

    fn remove_message_listener(&self, id: ListenerId) {
        if let Some(listener) = self.state.borrow_mut().listeners.remove(&id.0) {
            listener.removed.set(true);
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The [`WindowEnv`] trait: everything the controller needs from its host
//! windowing environment.

use std::time::Duration;

use crate::types::{MessageEvent, ScreenMetrics};

/// Token identifying a recurring timer registered with the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Token identifying a message listener registered with the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked on every timer tick.
pub type TimerCallback = Box<dyn FnMut()>;

/// Callback invoked on every inbound cross-window message.
pub type MessageCallback<H> = Box<dyn FnMut(&MessageEvent<H>)>;

/// Host windowing environment.
///
/// The controller requires three window capabilities (spawn, liveness query,
/// message subscription) plus two ambient ones (screen metrics for centering,
/// interval timers for the watcher). Each is independent and swappable, so
/// tests can run against [`SimEnv`](crate::SimEnv) and production code
/// against a real windowing substrate.
///
/// All methods take `&self`: the execution model is single-threaded
/// cooperative, and implementations are expected to use interior mutability.
pub trait WindowEnv {
    /// Opaque reference to a spawned window, used for liveness checks,
    /// closing, and message-origin matching.
    type Handle: Clone + PartialEq;

    /// Read the current screen and viewport metrics.
    fn screen_metrics(&self) -> ScreenMetrics;

    /// Spawn a window. Returns `None` when the host refuses (popup blocker).
    ///
    /// `destination` may be a relative URI, resolved against the host
    /// document; it is passed through verbatim.
    fn open_window(&self, destination: &str, name: &str, features: &str) -> Option<Self::Handle>;

    /// Whether the window's closed-flag is set.
    ///
    /// Implementations must expose this directly rather than probing document
    /// access, which throws under cross-origin isolation and is not a
    /// reliable liveness signal.
    fn is_window_closed(&self, handle: &Self::Handle) -> bool;

    /// Request the window be closed. Must tolerate an already-closed window.
    fn close_window(&self, handle: &Self::Handle);

    /// Register a recurring timer firing every `interval`.
    fn start_timer(&self, interval: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a recurring timer. Later ticks of the cancelled timer must not
    /// be delivered, even if already due.
    fn cancel_timer(&self, id: TimerId);

    /// Subscribe to the shared cross-window message bus.
    fn add_message_listener(&self, callback: MessageCallback<Self::Handle>) -> ListenerId;

    /// Remove a single subscription; other listeners are unaffected.
    fn remove_message_listener(&self, id: ListenerId);
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shared public types used across all layers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// A single window-presentation flag, serialized into the feature string
/// passed to the host when spawning a popup.
///
/// Booleans serialize as `yes`/`no` per the `window.open` convention; numbers
/// and text serialize as their plain display form.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Flag(true) => write!(f, "yes"),
            FeatureValue::Flag(false) => write!(f, "no"),
            FeatureValue::Number(n) => write!(f, "{n}"),
            FeatureValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Options for configuring a popup controller.
#[derive(Debug, Clone)]
pub struct PopupOptions {
    /// Popup content width in pixels. Defaults to the viewport content width.
    pub width: Option<u32>,
    /// Popup content height in pixels. Defaults to the viewport content height.
    pub height: Option<u32>,
    /// Extra window-presentation flags merged into the feature string.
    pub window_options: BTreeMap<String, FeatureValue>,
    /// Interval at which the watcher polls the popup for closure (default: 100 ms).
    ///
    /// There is no close event across independent windows, so polling is the
    /// only way to detect that the user closed the popup.
    pub watcher_delay: Duration,
    /// Target browsing-context name. If `None`, a collision-resistant name is
    /// generated at construction so repeated opens do not reuse a context.
    pub window_name: Option<String>,
}

impl Default for PopupOptions {
    fn default() -> Self {
        let mut window_options = BTreeMap::new();
        window_options.insert("scrollbars".to_string(), FeatureValue::Flag(true));
        Self {
            width: None,
            height: None,
            window_options,
            watcher_delay: Duration::from_millis(100),
            window_name: None,
        }
    }
}

/// Screen and viewport metrics read from the host environment, used to center
/// the popup (accounting for multi-monitor offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenMetrics {
    /// Content width of the host viewport in pixels.
    pub viewport_width: u32,
    /// Content height of the host viewport in pixels.
    pub viewport_height: u32,
    /// Horizontal offset of the host window on the (virtual) screen.
    pub screen_x: i32,
    /// Vertical offset of the host window on the (virtual) screen.
    pub screen_y: i32,
}

impl Default for ScreenMetrics {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            screen_x: 0,
            screen_y: 0,
        }
    }
}

/// An inbound cross-window message: the handle of the window that sent it,
/// plus its payload.
#[derive(Debug, Clone)]
pub struct MessageEvent<H> {
    /// Handle of the originating window, compared against the controller's
    /// own handle for origin filtering.
    pub source: H,
    /// Application payload. By convention a mapping carrying either an
    /// `error` field or arbitrary result data.
    pub data: Value,
}

/// Programming errors: caller misuse of the controller state machine.
///
/// These are surfaced synchronously at the call site and never delivered
/// through the asynchronous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `open()` or `set_destination()` was called while the popup is open.
    AlreadyOpen,
    /// `close()` was called while the popup is closed.
    AlreadyClosed,
    /// The watcher was started while already running.
    WatcherAlreadyRunning,
    /// The watcher was stopped while already stopped.
    WatcherAlreadyStopped,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::AlreadyOpen => write!(f, "window is already open"),
            StateError::AlreadyClosed => write!(f, "window is already closed"),
            StateError::WatcherAlreadyRunning => write!(f, "watcher is already running"),
            StateError::WatcherAlreadyStopped => write!(f, "watcher is already stopped"),
        }
    }
}

impl std::error::Error for StateError {}

/// Runtime outcomes delivered through the asynchronous result's rejection
/// channel, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectReason {
    /// The host refused to spawn the window (popup blocker, etc.).
    Blocked,
    /// The window disappeared or was closed before a message settled the result.
    Closed,
    /// An application-supplied `error` value relayed from the popup's payload.
    App(Value),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Blocked => write!(f, "blocked"),
            RejectReason::Closed => write!(f, "closed"),
            RejectReason::App(value) => write!(f, "{value}"),
        }
    }
}

impl std::error::Error for RejectReason {}

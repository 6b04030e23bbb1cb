/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A promise-based wrapper around popup windows.
//!
//! [`PopupController`] owns the lifecycle of one popup: it opens the window,
//! polls a watcher to detect closure (no close event exists across
//! independent windows), filters inbound cross-window messages by source
//! handle, and settles an asynchronous result exactly once — with the
//! message payload, an application `error` value, `closed`, or `blocked`.
//!
//! The windowing substrate and the promise primitive are both pluggable:
//! hosts implement [`WindowEnv`] for their platform and pick a
//! [`PromiseProvider`] ([`CellProvider`] and [`ChannelProvider`] are
//! included; the trait adapts any producer/consumer-style primitive).
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use popup_window::{
//!     CellProvider, PopupController, PopupOptions, RejectReason, SimEnv, WindowEnv,
//! };
//!
//! let env = Rc::new(SimEnv::new());
//! let mut popup = PopupController::new(
//!     Rc::clone(&env),
//!     CellProvider,
//!     "https://id.example/authorize",
//!     PopupOptions::default(),
//! );
//!
//! let outcome = popup.open().unwrap();
//!
//! // The user closes the window; the watcher notices on its next tick.
//! let handle = env.last_opened().unwrap();
//! env.close_window(&handle);
//! env.advance(Duration::from_millis(100));
//!
//! assert_eq!(outcome.take(), Some(Err(RejectReason::Closed)));
//! assert!(!popup.is_open());
//! ```
//!
//! A popup normally settles the request itself by posting a message back:
//!
//! ```
//! use std::rc::Rc;
//!
//! use popup_window::{CellProvider, PopupController, PopupOptions, SimEnv};
//! use serde_json::json;
//!
//! let env = Rc::new(SimEnv::new());
//! let mut popup = PopupController::new(
//!     Rc::clone(&env),
//!     CellProvider,
//!     "./login.html",
//!     PopupOptions::default(),
//! );
//! let outcome = popup.open().unwrap();
//!
//! let handle = env.last_opened().unwrap();
//! env.post_message(handle, json!({"token": "abc123"}));
//!
//! assert_eq!(outcome.take(), Some(Ok(json!({"token": "abc123"}))));
//! assert!(!popup.is_open());
//! ```

mod controller;
mod env;
mod settle;
mod sim;
mod types;

pub use controller::{MessageHandler, PopupController, RequestContext, default_message_handler};
pub use env::{ListenerId, MessageCallback, TimerCallback, TimerId, WindowEnv};
pub use settle::{
    CellProvider, ChannelProvider, Deferred, Outcome, OutcomeCell, PromiseProvider, RejectFn,
    ResolveFn,
};
pub use sim::{SimEnv, SimHandle, SimWindow};
pub use types::{
    FeatureValue, MessageEvent, PopupOptions, RejectReason, ScreenMetrics, StateError,
};

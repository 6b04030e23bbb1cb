/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The popup lifecycle state machine.
//!
//! One [`PopupController`] owns one popup window at a time: it spawns the
//! window, starts a polling watcher to detect closure, filters inbound
//! messages by their source handle, and guarantees the asynchronous result
//! settles at most once, releasing the timer and the listener on every exit
//! path.
//!
//! Three event sources race to settle a request: a watcher tick that finds
//! the window gone, an inbound message matching the window handle, and an
//! explicit `close()` call. Whichever runs first executes the full teardown
//! within its own activation; the open flag plus a per-request generation
//! token make later firings of stale timers and stale listeners no-ops.

use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde_json::Value;

use crate::env::{ListenerId, TimerId, WindowEnv};
use crate::settle::{Deferred, PromiseProvider, RejectFn, ResolveFn};
use crate::types::{MessageEvent, PopupOptions, RejectReason, ScreenMetrics, StateError};

/// Handler invoked for every message that passed origin filtering.
///
/// The default policy is [`default_message_handler`]. A custom handler must
/// still eventually settle the result and call [`RequestContext::close`], or
/// the watcher keeps running until the controller is closed externally.
pub type MessageHandler<H> = Box<dyn FnMut(&mut RequestContext<'_>, &MessageEvent<H>)>;

/// Settlement surface handed to message handlers.
///
/// `close()` is deferred until the handler returns, so teardown never runs
/// reentrantly inside a dispatch.
pub struct RequestContext<'a> {
    resolve: Option<&'a mut ResolveFn>,
    reject: Option<&'a mut RejectFn>,
    close_requested: bool,
}

impl RequestContext<'_> {
    /// Resolve the pending result with a payload.
    pub fn resolve(&mut self, value: Value) {
        if let Some(resolve) = self.resolve.as_mut() {
            resolve(value);
        }
    }

    /// Reject the pending result.
    pub fn reject(&mut self, reason: RejectReason) {
        if let Some(reject) = self.reject.as_mut() {
            reject(reason);
        }
    }

    /// Request teardown once the handler returns.
    pub fn close(&mut self) {
        self.close_requested = true;
    }
}

/// Default message-handling policy: a payload carrying a truthy `error`
/// field rejects with that value; anything else resolves with the whole
/// payload. Either way the popup is closed afterwards.
pub fn default_message_handler<H>(ctx: &mut RequestContext<'_>, event: &MessageEvent<H>) {
    match event.data.get("error") {
        Some(error) if is_truthy(error) => ctx.reject(RejectReason::App(error.clone())),
        _ => ctx.resolve(event.data.clone()),
    }
    ctx.close();
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Mutable lifecycle state, shared with the timer and listener callbacks.
struct Inner<E: WindowEnv> {
    destination: String,
    options: PopupOptions,
    window_name: String,
    open: bool,
    /// Active-request token, bumped on every `open()`. Callbacks registered
    /// for an earlier request must no-op.
    generation: u64,
    window: Option<E::Handle>,
    watcher: Option<TimerId>,
    watcher_running: bool,
    listener: Option<ListenerId>,
    resolve: Option<ResolveFn>,
    reject: Option<RejectFn>,
    handler: Option<MessageHandler<E::Handle>>,
}

/// Owns the full lifecycle of one popup window.
///
/// A controller is reusable: it transitions `closed -> open -> closed` any
/// number of times, each `open()` producing a fresh asynchronous result from
/// the configured provider.
///
/// Not `Send`: the execution model is single-threaded cooperative, matching
/// the host environments this targets.
pub struct PopupController<E: WindowEnv, P: PromiseProvider> {
    env: Rc<E>,
    provider: P,
    inner: Rc<RefCell<Inner<E>>>,
}

impl<E: WindowEnv + 'static, P: PromiseProvider> PopupController<E, P> {
    /// Create a controller in the closed state.
    ///
    /// If `options.window_name` is `None`, a collision-resistant name is
    /// generated now and reused for every subsequent `open()`.
    pub fn new(
        env: Rc<E>,
        provider: P,
        destination: impl Into<String>,
        options: PopupOptions,
    ) -> Self {
        let window_name = options
            .window_name
            .clone()
            .unwrap_or_else(generate_window_name);
        Self {
            env,
            provider,
            inner: Rc::new(RefCell::new(Inner {
                destination: destination.into(),
                options,
                window_name,
                open: false,
                generation: 0,
                window: None,
                watcher: None,
                watcher_running: false,
                listener: None,
                resolve: None,
                reject: None,
                handler: None,
            })),
        }
    }

    /// Replace the default message-handling policy.
    #[must_use]
    pub fn with_message_handler(self, handler: MessageHandler<E::Handle>) -> Self {
        self.inner.borrow_mut().handler = Some(handler);
        self
    }

    /// Convenience for open-and-forget flows: construct a controller, open
    /// it, and return only the pending result.
    ///
    /// The watcher and listener keep the request alive, so it still settles
    /// (at the latest when the user closes the window) even though the
    /// controller value is gone. Use the full constructor when the window
    /// must be closable programmatically.
    pub fn open_once(
        env: Rc<E>,
        provider: P,
        destination: impl Into<String>,
        options: PopupOptions,
    ) -> Result<P::Result, StateError> {
        let mut controller = Self::new(env, provider, destination, options);
        controller.open()
    }

    /// Open the popup window and return the pending asynchronous result.
    ///
    /// The result is later rejected with [`RejectReason::Closed`] if the
    /// window is closed before a message settles it, or settled per the
    /// message-handling policy. If the host refuses to spawn the window the
    /// result is rejected with [`RejectReason::Blocked`] before this call
    /// returns, no watcher or listener is registered, and the controller
    /// reverts to the closed state.
    ///
    /// Calling this while already open is a programming error.
    pub fn open(&mut self) -> Result<P::Result, StateError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.open {
                return Err(StateError::AlreadyOpen);
            }
            inner.open = true;
            inner.generation += 1;
        }
        let Deferred {
            result,
            resolve,
            reject,
        } = self.provider.deferred();
        let metrics = self.env.screen_metrics();
        let (destination, window_name, features, generation) = {
            let mut inner = self.inner.borrow_mut();
            inner.resolve = Some(resolve);
            inner.reject = Some(reject);
            (
                inner.destination.clone(),
                inner.window_name.clone(),
                feature_string(&inner.options, metrics),
                inner.generation,
            )
        };
        debug!("opening popup {window_name} -> {destination} [{features}]");
        match self.env.open_window(&destination, &window_name, &features) {
            None => {
                warn!("popup {window_name} was blocked by the host");
                let mut inner = self.inner.borrow_mut();
                if let Some(reject) = inner.reject.as_mut() {
                    reject(RejectReason::Blocked);
                }
                inner.resolve = None;
                inner.reject = None;
                inner.open = false;
            }
            Some(handle) => {
                self.inner.borrow_mut().window = Some(handle);
                self.register_listener(generation);
                self.start_watcher(generation)?;
            }
        }
        Ok(result)
    }

    /// Close the popup window, rejecting the result with
    /// [`RejectReason::Closed`] unless it already settled.
    ///
    /// Calling this while closed is a programming error.
    pub fn close(&mut self) -> Result<(), StateError> {
        teardown(&*self.env, &self.inner)
    }

    /// Whether the popup is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    /// The destination the next `open()` will load.
    pub fn destination(&self) -> String {
        self.inner.borrow().destination.clone()
    }

    /// The browsing-context name used for spawned windows.
    pub fn window_name(&self) -> String {
        self.inner.borrow().window_name.clone()
    }

    /// Replace the destination for the next `open()` call.
    ///
    /// Only legal while closed; returns the controller for chaining.
    pub fn set_destination(
        &mut self,
        destination: impl Into<String>,
    ) -> Result<&mut Self, StateError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.open {
                return Err(StateError::AlreadyOpen);
            }
            inner.destination = destination.into();
        }
        Ok(self)
    }

    fn register_listener(&self, generation: u64) {
        let env = Rc::downgrade(&self.env);
        let inner = Rc::clone(&self.inner);
        let id = self.env.add_message_listener(Box::new(move |event| {
            if let Some(env) = env.upgrade() {
                dispatch_message(&*env, &inner, generation, event);
            }
        }));
        self.inner.borrow_mut().listener = Some(id);
    }

    fn start_watcher(&self, generation: u64) -> Result<(), StateError> {
        let delay = {
            let inner = self.inner.borrow();
            if inner.watcher_running {
                return Err(StateError::WatcherAlreadyRunning);
            }
            inner.options.watcher_delay
        };
        let env = Rc::downgrade(&self.env);
        let inner = Rc::clone(&self.inner);
        let id = self.env.start_timer(
            delay,
            Box::new(move || {
                if let Some(env) = env.upgrade() {
                    watcher_tick(&*env, &inner, generation);
                }
            }),
        );
        let mut inner = self.inner.borrow_mut();
        inner.watcher = Some(id);
        inner.watcher_running = true;
        Ok(())
    }
}

/// One watcher tick: trigger teardown when the window is no longer alive.
///
/// Stale ticks (watcher stopped, or a newer request active) no-op.
fn watcher_tick<E: WindowEnv>(env: &E, inner_rc: &Rc<RefCell<Inner<E>>>, generation: u64) {
    let alive = {
        let inner = inner_rc.borrow();
        if !inner.open || !inner.watcher_running || inner.generation != generation {
            return;
        }
        inner
            .window
            .as_ref()
            .is_some_and(|window| !env.is_window_closed(window))
    };
    if !alive {
        debug!("watcher detected closed popup window");
        let _ = teardown(env, inner_rc);
    }
}

/// Dispatch one inbound message: drop it unless its source is this
/// controller's window, otherwise run the message-handling policy and then
/// any teardown it requested.
fn dispatch_message<E: WindowEnv>(
    env: &E,
    inner_rc: &Rc<RefCell<Inner<E>>>,
    generation: u64,
    event: &MessageEvent<E::Handle>,
) {
    let close_requested = {
        let mut guard = inner_rc.borrow_mut();
        let inner = &mut *guard;
        if !inner.open || inner.generation != generation {
            return;
        }
        let from_own_window = inner
            .window
            .as_ref()
            .is_some_and(|window| *window == event.source);
        if !from_own_window {
            return;
        }
        let handler = inner.handler.take();
        let mut ctx = RequestContext {
            resolve: inner.resolve.as_mut(),
            reject: inner.reject.as_mut(),
            close_requested: false,
        };
        match handler {
            Some(mut custom) => {
                custom(&mut ctx, event);
                let requested = ctx.close_requested;
                inner.handler = Some(custom);
                requested
            }
            None => {
                default_message_handler(&mut ctx, event);
                ctx.close_requested
            }
        }
    };
    if close_requested {
        let _ = teardown(env, inner_rc);
    }
}

/// The single teardown path, shared by `close()`, the watcher and the
/// message handlers. Every step runs regardless of which event triggered it:
/// stop the watcher, remove the listener, close the window if still alive,
/// reject with `Closed` (ignored if already settled), release the handle.
fn teardown<E: WindowEnv>(env: &E, inner_rc: &Rc<RefCell<Inner<E>>>) -> Result<(), StateError> {
    let mut inner = inner_rc.borrow_mut();
    if !inner.open {
        return Err(StateError::AlreadyClosed);
    }
    stop_watcher(env, &mut inner)?;
    if let Some(listener) = inner.listener.take() {
        env.remove_message_listener(listener);
    }
    if let Some(window) = inner.window.as_ref() {
        if !env.is_window_closed(window) {
            env.close_window(window);
        }
    }
    if let Some(reject) = inner.reject.as_mut() {
        reject(RejectReason::Closed);
    }
    inner.window = None;
    inner.resolve = None;
    inner.reject = None;
    inner.open = false;
    debug!("popup {} closed", inner.window_name);
    Ok(())
}

fn stop_watcher<E: WindowEnv>(env: &E, inner: &mut Inner<E>) -> Result<(), StateError> {
    if !inner.watcher_running {
        return Err(StateError::WatcherAlreadyStopped);
    }
    inner.watcher_running = false;
    if let Some(timer) = inner.watcher.take() {
        env.cancel_timer(timer);
    }
    Ok(())
}

/// Serialize window options and the centered placement into a feature string.
///
/// Placement solves `left = viewport/2 - width/2 + screen offset` (and
/// symmetrically for `top`), so the popup is centered even on a secondary
/// monitor.
fn feature_string(options: &PopupOptions, metrics: ScreenMetrics) -> String {
    let width = options.width.unwrap_or(metrics.viewport_width);
    let height = options.height.unwrap_or(metrics.viewport_height);
    let left = metrics.viewport_width as i32 / 2 - width as i32 / 2 + metrics.screen_x;
    let top = metrics.viewport_height as i32 / 2 - height as i32 / 2 + metrics.screen_y;
    let mut features: Vec<String> = options
        .window_options
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    features.push(format!("width={width}"));
    features.push(format!("height={height}"));
    features.push(format!("top={top}"));
    features.push(format!("left={left}"));
    features.join(", ")
}

/// Generate a browsing-context name unlikely to collide across opens or
/// processes: wall-clock millis, a per-call random component, and a
/// process-local counter.
fn generate_window_name() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let random = RandomState::new().build_hasher().finish();
    let serial = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("popup-window-{timestamp}-{random:016x}-{serial}")
}

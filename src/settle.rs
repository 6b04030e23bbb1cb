/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The pluggable asynchronous-result seam.
//!
//! The controller has no built-in promise type. A [`PromiseProvider`] is
//! wired in at construction and produces, per `open()` call, a [`Deferred`]:
//! a consumer half handed back to the caller and a resolve/reject producer
//! pair kept by the controller. Providers must ignore settlement after the
//! first, so the documented reject-after-resolve teardown sequence is benign.
//!
//! Two adapters are included: [`CellProvider`] for cooperative
//! single-threaded polling, and [`ChannelProvider`] wrapping `std::sync::mpsc`
//! for callers that want a blocking receiver.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc;

use serde_json::Value;

use crate::types::RejectReason;

/// The settled value of a request: resolved payload or rejection reason.
pub type Outcome = Result<Value, RejectReason>;

/// Producer half: resolve the pending result with a payload.
pub type ResolveFn = Box<dyn FnMut(Value)>;

/// Producer half: reject the pending result with a reason.
pub type RejectFn = Box<dyn FnMut(RejectReason)>;

/// A fresh asynchronous result: the consumer half plus its two producers.
pub struct Deferred<R> {
    /// Consumer half, returned to the caller of `open()`.
    pub result: R,
    /// Settles the result with a payload. Ignored once settled.
    pub resolve: ResolveFn,
    /// Settles the result with a rejection reason. Ignored once settled.
    pub reject: RejectFn,
}

/// Factory for asynchronous results, supplied by the host application.
pub trait PromiseProvider {
    /// Consumer half handed back to callers of `open()`.
    type Result;

    /// Produce a fresh, unsettled result with its producer pair.
    fn deferred(&self) -> Deferred<Self::Result>;
}

/// Shared settlement cell: the consumer half produced by [`CellProvider`].
///
/// Stays `None` until the first settlement; later settlements are ignored.
#[derive(Debug, Clone, Default)]
pub struct OutcomeCell(Rc<RefCell<Option<Outcome>>>);

impl OutcomeCell {
    /// Whether the result has settled.
    pub fn is_settled(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Clone of the settled outcome, if any.
    pub fn peek(&self) -> Option<Outcome> {
        self.0.borrow().clone()
    }

    /// Take the settled outcome, leaving the cell unsettled.
    pub fn take(&self) -> Option<Outcome> {
        self.0.borrow_mut().take()
    }

    fn settle(&self, outcome: Outcome) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

/// Provider backed by a shared [`OutcomeCell`], for single-threaded
/// cooperative hosts that poll for the outcome.
pub struct CellProvider;

impl PromiseProvider for CellProvider {
    type Result = OutcomeCell;

    fn deferred(&self) -> Deferred<OutcomeCell> {
        let cell = OutcomeCell::default();
        let resolve_cell = cell.clone();
        let reject_cell = cell.clone();
        Deferred {
            result: cell,
            resolve: Box::new(move |value| resolve_cell.settle(Ok(value))),
            reject: Box::new(move |reason| reject_cell.settle(Err(reason))),
        }
    }
}

/// Provider backed by `std::sync::mpsc`: the consumer half is a receiver
/// that yields exactly one [`Outcome`].
pub struct ChannelProvider;

impl PromiseProvider for ChannelProvider {
    type Result = mpsc::Receiver<Outcome>;

    fn deferred(&self) -> Deferred<mpsc::Receiver<Outcome>> {
        let (tx, rx) = mpsc::channel();
        let reject_tx = tx.clone();
        let settled = Rc::new(Cell::new(false));
        let reject_settled = Rc::clone(&settled);
        Deferred {
            result: rx,
            resolve: Box::new(move |value| {
                if !settled.replace(true) {
                    let _ = tx.send(Ok(value));
                }
            }),
            reject: Box::new(move |reason| {
                if !reject_settled.replace(true) {
                    let _ = reject_tx.send(Err(reason));
                }
            }),
        }
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Ball device collaborators and the outgoing eject controller.
//!
//! The controller only talks to the physical world through the traits in
//! this module: a ball counter that knows how many balls the device holds
//! and tracks each eject attempt, an ejector that fires the coil, the
//! target device that receives the ball, and a stop control.

use std::future::Future;
use std::pin::Pin;

use crate::signal::Signal;

pub mod controller;
pub mod error;
pub mod handle;
pub mod incoming;
pub mod outgoing;
pub mod request;

#[cfg(test)]
pub(crate) mod mock;

pub use incoming::IncomingBall;

/// Alias to reduce type complexity in collaborator traits.
pub type DeviceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ball count bookkeeping of the ejecting device.
pub trait BallCounter: Send + Sync {
    /// Current number of balls in the device, once it is known.
    fn ball_count(&self) -> DeviceFuture<'_, u32>;

    /// Resolves once the device holds at least one ball.
    fn wait_for_ball(&self) -> DeviceFuture<'_, ()>;

    /// Mark the start of an eject attempt.
    fn start_eject(&self) -> Box<dyn EjectProcess>;
}

/// Counter-side view of one eject attempt.
///
/// The terminal calls consume the handle, so an attempt is finished at most
/// once.
pub trait EjectProcess: Send {
    fn is_jammed(&self) -> bool;

    /// Resolved when the ball left the device.
    fn ball_left(&self) -> Signal;

    /// Resolved when the ball came back into the device.
    fn ball_returned(&self) -> Signal;

    fn is_ball_returned(&self) -> bool {
        self.ball_returned().is_resolved()
    }

    /// The attempt failed; the ball is still (or again) in the device.
    fn eject_failed(self: Box<Self>);

    /// The attempt succeeded; the ball arrived at the target.
    fn eject_done(self: Box<Self>);
}

/// Physical actuator firing one eject.
pub trait Ejector: Send + Sync {
    /// Fire and forget. The ball-left signal is the only feedback.
    fn eject_one_ball(&self, jammed: bool, eject_try: u32);
}

/// Device receiving an ejected ball.
pub trait EjectTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Called before every eject attempt; may delay the eject until the
    /// target is ready.
    fn prepare_eject<'a>(&'a self, _source: &'a str) -> DeviceFuture<'a, ()> {
        Box::pin(std::future::ready(()))
    }

    /// Register a ball on its way. The target resolves `ball.confirm` when
    /// the ball arrives.
    fn add_incoming_ball(&self, ball: IncomingBall);
}

/// Device-wide control used when the eject retry budget is exhausted.
pub trait DeviceControl: Send + Sync {
    /// Disable further ejects until an operator intervenes.
    fn stop(&self);
}

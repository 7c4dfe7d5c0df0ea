// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Eject event notification system.
//!
//! This module provides typed notifications for the outgoing eject
//! controller, so that the surrounding machine can react to failed ejects,
//! stopped devices and lost balls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::machine::OutgoingState;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Why an eject attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjectFailure {
    /// The ball did not leave within the eject timeout.
    BallDidNotLeave,
    /// The ball came back before the target confirmed it.
    BallReturned,
}

/// Trait for components that want to receive eject events.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about.
pub trait EjectListener: Send + Sync {
    /// Called when the device starts working on a request.
    fn on_request_started(&self, _device: &str, _request: Uuid) {}

    /// Called right before the ejector fires.
    fn on_eject_attempt(&self, _device: &str, _request: Uuid, _eject_try: u32) {}

    /// Called when the ball left the device.
    fn on_ball_left(&self, _device: &str, _request: Uuid) {}

    /// Called when the ball disappeared before the eject; no try is charged.
    fn on_eject_aborted(&self, _device: &str, _request: Uuid, _eject_try: u32) {}

    /// Called after a failed attempt.
    fn on_eject_failed(
        &self,
        _device: &str,
        _request: Uuid,
        _eject_try: u32,
        _reason: EjectFailure,
    ) {
    }

    /// Called when the target confirmed the ball.
    fn on_eject_confirmed(&self, _device: &str, _request: Uuid, _failed_tries: u32) {}

    /// Called when the retry budget is exhausted and the device stopped.
    fn on_device_stopped(&self, _device: &str, _failed_tries: u32) {}

    /// Called when a ball could not be accounted for.
    fn on_ball_lost(&self, _device: &str, _request: Uuid) {}

    /// Called when the controller state machine transitions.
    fn on_state_change(&self, _device: &str, _old: &OutgoingState, _new: &OutgoingState) {}
}

/// Manages registered listeners and dispatches events.
#[derive(Clone)]
pub struct EjectEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn EjectListener>)>,
}

impl Default for EjectEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EjectEventEmitter {
    /// Create a new event emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&mut self, listener: Arc<dyn EjectListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    /// Unregister a listener by its ID.
    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn each(&self, f: impl Fn(&dyn EjectListener)) {
        for (_, listener) in &self.listeners {
            f(listener.as_ref());
        }
    }

    pub fn notify_request_started(&self, device: &str, request: Uuid) {
        self.each(|l| l.on_request_started(device, request));
    }

    pub fn notify_eject_attempt(&self, device: &str, request: Uuid, eject_try: u32) {
        self.each(|l| l.on_eject_attempt(device, request, eject_try));
    }

    pub fn notify_ball_left(&self, device: &str, request: Uuid) {
        self.each(|l| l.on_ball_left(device, request));
    }

    pub fn notify_eject_aborted(&self, device: &str, request: Uuid, eject_try: u32) {
        self.each(|l| l.on_eject_aborted(device, request, eject_try));
    }

    pub fn notify_eject_failed(
        &self,
        device: &str,
        request: Uuid,
        eject_try: u32,
        reason: EjectFailure,
    ) {
        self.each(|l| l.on_eject_failed(device, request, eject_try, reason));
    }

    pub fn notify_eject_confirmed(&self, device: &str, request: Uuid, failed_tries: u32) {
        self.each(|l| l.on_eject_confirmed(device, request, failed_tries));
    }

    pub fn notify_device_stopped(&self, device: &str, failed_tries: u32) {
        self.each(|l| l.on_device_stopped(device, failed_tries));
    }

    pub fn notify_ball_lost(&self, device: &str, request: Uuid) {
        self.each(|l| l.on_ball_lost(device, request));
    }

    pub fn notify_state_change(&self, device: &str, old: &OutgoingState, new: &OutgoingState) {
        self.each(|l| l.on_state_change(device, old, new));
    }
}

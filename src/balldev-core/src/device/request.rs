// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::device::error::EjectResult;
use crate::device::EjectTarget;
use crate::signal::Signal;

/// Request to move one ball to one target.
pub struct EjectRequest {
    pub id: Uuid,
    pub target: Arc<dyn EjectTarget>,
    /// Passive eject, e.g. a manual plunger.
    pub mechanical: bool,
    /// Failed tries allowed before the device is stopped.
    /// `None` or `Some(0)` means unlimited.
    pub max_tries: Option<u32>,
    /// Budget for the ball-left wait and for the primary confirmation wait.
    pub eject_timeout: Duration,
    /// Resolved by the target once it received the ball.
    pub confirm: Signal,
    /// Final outcome of the request.
    pub respond_to: Option<oneshot::Sender<EjectResult<EjectReport>>>,
}

impl EjectRequest {
    pub fn new(target: Arc<dyn EjectTarget>, eject_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            mechanical: false,
            max_tries: None,
            eject_timeout,
            confirm: Signal::new(),
            respond_to: None,
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    pub fn with_mechanical(mut self, mechanical: bool) -> Self {
        self.mechanical = mechanical;
        self
    }

    /// Attach an outcome channel and return its receiving end.
    pub fn with_response(mut self) -> (Self, oneshot::Receiver<EjectResult<EjectReport>>) {
        let (tx, rx) = oneshot::channel();
        self.respond_to = Some(tx);
        (self, rx)
    }

    pub(crate) fn respond(&mut self, result: EjectResult<EjectReport>) {
        if let Some(tx) = self.respond_to.take() {
            let _ = tx.send(result);
        }
    }
}

impl fmt::Debug for EjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EjectRequest")
            .field("id", &self.id)
            .field("target", &self.target.name())
            .field("mechanical", &self.mechanical)
            .field("max_tries", &self.max_tries)
            .field("eject_timeout", &self.eject_timeout)
            .field("confirm", &self.confirm)
            .finish()
    }
}

/// Successful outcome of an eject request.
#[derive(Debug, Clone, Serialize)]
pub struct EjectReport {
    pub request: Uuid,
    pub source: String,
    pub target: String,
    /// Failed tries before the confirmed one.
    pub failed_tries: u32,
}

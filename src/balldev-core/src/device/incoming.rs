// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use uuid::Uuid;

use crate::signal::Signal;

/// A ball announced to its target by the ejecting device.
#[derive(Debug, Clone)]
pub struct IncomingBall {
    /// Name of the ejecting device.
    pub source: String,
    /// Eject request this ball belongs to.
    pub request: Uuid,
    /// Resolved when it is no longer plausible the ball will arrive.
    /// Informational for the target; the source does not time itself on it.
    pub timeout: Signal,
    /// Shared with the eject request. The target resolves it on arrival.
    pub confirm: Signal,
}

impl IncomingBall {
    pub fn new(source: impl Into<String>, request: Uuid, confirm: Signal) -> Self {
        Self {
            source: source.into(),
            request,
            timeout: Signal::new(),
            confirm,
        }
    }

    /// Confirm arrival. Returns false if the ball was already confirmed.
    pub fn confirm(&self) -> bool {
        self.confirm.resolve()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirm.is_resolved()
    }
}

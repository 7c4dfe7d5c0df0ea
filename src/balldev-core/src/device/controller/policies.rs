// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Eject policies for retries and timeouts.
//!
//! This module provides the give-up rule applied after failed eject
//! attempts and the device-level timing defaults used by the controller.

use std::sync::Arc;
use std::time::Duration;

use crate::device::request::EjectRequest;
use crate::device::EjectTarget;

/// Safety net for the late confirmation race.
pub const DEFAULT_LATE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Policy deciding whether another eject try is allowed.
pub trait RetryPolicy: Send + Sync {
    /// `failed_tries` is the number of failed attempts so far.
    fn should_retry(&self, failed_tries: u32) -> bool;

    /// Upper bound on physical attempts, `None` when unlimited.
    fn max_attempts(&self) -> Option<u32>;
}

/// Try budget of one eject request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryBudget {
    Unlimited,
    /// Failed tries allowed; the device gives up once the count exceeds it.
    Limited(u32),
}

impl TryBudget {
    /// `None` and `Some(0)` both mean unlimited.
    pub fn from_max_tries(max_tries: Option<u32>) -> Self {
        match max_tries {
            None | Some(0) => Self::Unlimited,
            Some(n) => Self::Limited(n),
        }
    }
}

impl RetryPolicy for TryBudget {
    fn should_retry(&self, failed_tries: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => failed_tries <= *max,
        }
    }

    fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(max) => Some(max.saturating_add(1)),
        }
    }
}

/// Device-level eject timing and retry defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EjectPolicy {
    /// Deadline of the late confirmation race after the primary
    /// confirmation wait timed out.
    pub late_confirm_timeout: Duration,
    /// Eject timeout for requests created from this policy.
    pub eject_timeout: Duration,
    /// Retry bound for requests created from this policy.
    pub max_tries: Option<u32>,
}

impl EjectPolicy {
    pub fn new(eject_timeout: Duration, max_tries: Option<u32>) -> Self {
        Self {
            late_confirm_timeout: DEFAULT_LATE_CONFIRM_TIMEOUT,
            eject_timeout,
            max_tries,
        }
    }

    pub fn with_late_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.late_confirm_timeout = timeout;
        self
    }

    /// Build a request to `target` with this policy's timeout and retry bound.
    pub fn request_to(&self, target: Arc<dyn EjectTarget>) -> EjectRequest {
        let request = EjectRequest::new(target, self.eject_timeout);
        match self.max_tries {
            Some(max_tries) => request.with_max_tries(max_tries),
            None => request,
        }
    }
}

impl Default for EjectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), None)
    }
}

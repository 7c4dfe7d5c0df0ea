// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Terminal error of an eject request.
#[derive(Debug, Clone, Error, Serialize)]
pub enum EjectError {
    /// Neither the target nor the source could account for the ball within
    /// the late confirmation window.
    #[error("ball lost: {device} ejected for request {request}, never confirmed or returned")]
    BallLost { device: String, request: Uuid },

    /// Retry budget exhausted; the device was stopped.
    #[error("device {device} stopped after {tries} failed eject(s)")]
    DeviceStopped { device: String, tries: u32 },

    /// The device task ended on an earlier fault and will not eject again.
    #[error("device {device} is faulted")]
    DeviceFaulted { device: String },

    /// The outgoing task is no longer running.
    #[error("eject queue for {0} is closed")]
    QueueClosed(String),
}

pub type EjectResult<T> = Result<T, EjectError>;

impl EjectError {
    /// True for errors that need operator attention before the device can
    /// eject again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BallLost { .. } | Self::DeviceFaulted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EjectError::DeviceStopped {
            device: "trough".to_string(),
            tries: 3,
        };
        assert_eq!(err.to_string(), "device trough stopped after 3 failed eject(s)");
        assert!(!err.is_fatal());

        let lost = EjectError::BallLost {
            device: "plunger".to_string(),
            request: Uuid::nil(),
        };
        assert!(lost.to_string().starts_with("ball lost: plunger"));
        assert!(lost.is_fatal());
    }
}

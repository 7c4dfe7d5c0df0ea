// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Outgoing eject state machine.
//!
//! Tracks which phase of an eject the device is in so the rest of the
//! machine can observe it. The async controller in `outgoing` drives the
//! transitions; this type only decides which transitions are legal.

use std::fmt;

use serde::Serialize;

/// Events that can trigger state transitions.
#[derive(Debug, Clone)]
pub enum OutgoingEvent {
    /// A request was taken from the queue.
    RequestAccepted,
    /// The device holds a ball.
    BallAvailable,
    /// The target is ready and the ball is still there.
    Prepared,
    /// The ball vanished while preparing; no try is charged.
    EjectAborted,
    /// The ball left the device.
    BallLeft,
    /// Primary confirmation wait timed out without the ball returning.
    ConfirmTimedOut,
    /// Target confirmed the ball.
    Confirmed,
    /// The attempt failed.
    EjectFailed,
    /// Retry budget exhausted.
    GaveUp,
    /// Ball unaccounted for after the late confirmation window.
    BallLost(String),
}

/// The current state of the outgoing controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "data")]
pub enum OutgoingState {
    /// Waiting for an eject request
    #[default]
    Idle,
    /// Waiting until the device holds a ball
    WaitingForBall { eject_try: u32 },
    /// Target is preparing for the eject
    Preparing { eject_try: u32 },
    /// Ejector fired, waiting for the ball to leave
    Ejecting { eject_try: u32 },
    /// Ball left, waiting for the target to confirm it
    WaitingForConfirm { eject_try: u32 },
    /// Confirmation overdue, racing a late confirmation against a return
    WaitingForLateConfirm { eject_try: u32 },
    /// Retry budget exhausted, device disabled
    Stopped { failed_tries: u32 },
    /// A ball was lost, operator intervention required
    Faulted { error: String },
}

impl fmt::Display for OutgoingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::WaitingForBall { .. } => write!(f, "WaitingForBall"),
            Self::Preparing { .. } => write!(f, "Preparing"),
            Self::Ejecting { eject_try } => write!(f, "Ejecting(try {})", eject_try),
            Self::WaitingForConfirm { .. } => write!(f, "WaitingForConfirm"),
            Self::WaitingForLateConfirm { .. } => write!(f, "WaitingForLateConfirm"),
            Self::Stopped { failed_tries } => write!(f, "Stopped({} failed)", failed_tries),
            Self::Faulted { error } => write!(f, "Faulted({})", error),
        }
    }
}

impl OutgoingState {
    /// Check if a request is in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::Stopped { .. } | Self::Faulted { .. }
        )
    }

    /// Check if the device refuses further ejects.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Faulted { .. })
    }

    /// Check if the ball is out of the device and not yet accounted for.
    pub fn ball_in_flight(&self) -> bool {
        matches!(
            self,
            Self::WaitingForConfirm { .. } | Self::WaitingForLateConfirm { .. }
        )
    }
}

/// State machine guarding outgoing eject transitions.
#[derive(Debug, Clone)]
pub struct OutgoingStateMachine {
    state: OutgoingState,
    transition_count: u64,
}

impl Default for OutgoingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl OutgoingStateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            state: OutgoingState::Idle,
            transition_count: 0,
        }
    }

    pub fn state(&self) -> &OutgoingState {
        &self.state
    }

    /// Get the number of state transitions that have occurred.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Process an event and potentially transition to a new state.
    /// Returns true if a transition occurred.
    pub fn process_event(&mut self, event: OutgoingEvent) -> bool {
        match self.next_state(event) {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: OutgoingEvent) -> Option<OutgoingState> {
        use OutgoingState::*;

        match (&self.state, event) {
            (Idle, OutgoingEvent::RequestAccepted) => Some(WaitingForBall { eject_try: 0 }),

            (WaitingForBall { eject_try }, OutgoingEvent::BallAvailable) => Some(Preparing {
                eject_try: *eject_try,
            }),
            (WaitingForBall { eject_try }, OutgoingEvent::GaveUp) => Some(Stopped {
                failed_tries: *eject_try,
            }),

            (Preparing { eject_try }, OutgoingEvent::Prepared) => Some(Ejecting {
                eject_try: *eject_try,
            }),
            (Preparing { eject_try }, OutgoingEvent::EjectAborted) => Some(WaitingForBall {
                eject_try: *eject_try,
            }),

            (Ejecting { eject_try }, OutgoingEvent::BallLeft) => Some(WaitingForConfirm {
                eject_try: *eject_try,
            }),

            (WaitingForConfirm { eject_try }, OutgoingEvent::ConfirmTimedOut) => {
                Some(WaitingForLateConfirm {
                    eject_try: *eject_try,
                })
            }

            (WaitingForConfirm { .. } | WaitingForLateConfirm { .. }, OutgoingEvent::Confirmed) => {
                Some(Idle)
            }

            (
                Ejecting { eject_try }
                | WaitingForConfirm { eject_try }
                | WaitingForLateConfirm { eject_try },
                OutgoingEvent::EjectFailed,
            ) => Some(WaitingForBall {
                eject_try: eject_try.saturating_add(1),
            }),

            (WaitingForLateConfirm { .. }, OutgoingEvent::BallLost(error)) => {
                Some(Faulted { error })
            }

            // Invalid transition - stay in current state
            _ => None,
        }
    }
}

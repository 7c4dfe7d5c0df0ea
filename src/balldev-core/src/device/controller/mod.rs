// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Outgoing eject controller components.
//!
//! This module contains the state tracking, event notification and policy
//! pieces used by the outgoing eject task.

pub mod events;
pub mod machine;
pub mod policies;

pub use events::{EjectEventEmitter, EjectFailure, EjectListener, ListenerId};
pub use machine::{OutgoingEvent, OutgoingState, OutgoingStateMachine};
pub use policies::{EjectPolicy, RetryPolicy, TryBudget, DEFAULT_LATE_CONFIRM_TIMEOUT};

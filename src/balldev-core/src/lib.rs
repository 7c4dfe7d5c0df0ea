// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod device;
pub mod signal;
pub mod wait;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use device::controller::{
    EjectEventEmitter, EjectFailure, EjectListener, EjectPolicy, OutgoingState, TryBudget,
};
pub use device::error::{EjectError, EjectResult};
pub use device::handle::{spawn_outgoing_task, OutgoingHandle};
pub use device::incoming::IncomingBall;
pub use device::outgoing::{run_outgoing_task, OutgoingTaskConfig};
pub use device::request::{EjectReport, EjectRequest};
pub use device::{BallCounter, DeviceControl, DeviceFuture, EjectProcess, EjectTarget, Ejector};
pub use signal::Signal;
pub use wait::{first, Losers, Pending, TimedOut, Wait, Winner};

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin handle giving callers access to one device's outgoing task.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::device::controller::OutgoingState;
use crate::device::error::{EjectError, EjectResult};
use crate::device::outgoing::{run_outgoing_task, OutgoingTaskConfig};
use crate::device::request::EjectRequest;

/// A handle to a single running outgoing task.
#[derive(Debug, Clone)]
pub struct OutgoingHandle {
    /// Name of the ejecting device.
    pub device: String,
    /// Queue of the outgoing task.
    pub eject_tx: mpsc::UnboundedSender<EjectRequest>,
    /// Watch the controller state.
    pub state_rx: watch::Receiver<OutgoingState>,
}

impl OutgoingHandle {
    /// Append a request to the device's eject queue without waiting.
    pub fn enqueue_eject(&self, request: EjectRequest) -> EjectResult<()> {
        self.eject_tx
            .send(request)
            .map_err(|_| EjectError::QueueClosed(self.device.clone()))
    }

    pub fn state(&self) -> OutgoingState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the controller reaches a state matching `f`.
    pub async fn wait_for_state(
        &mut self,
        f: impl FnMut(&OutgoingState) -> bool,
    ) -> EjectResult<OutgoingState> {
        self.state_rx
            .wait_for(f)
            .await
            .map(|state| state.clone())
            .map_err(|_| EjectError::QueueClosed(self.device.clone()))
    }
}

/// Spawn the outgoing task for one device.
pub fn spawn_outgoing_task(
    config: OutgoingTaskConfig,
) -> (OutgoingHandle, JoinHandle<EjectResult<()>>) {
    let (eject_tx, eject_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(OutgoingState::default());
    let handle = OutgoingHandle {
        device: config.device.clone(),
        eject_tx,
        state_rx,
    };
    let task = tokio::spawn(run_outgoing_task(config, eject_rx, state_tx));
    (handle, task)
}

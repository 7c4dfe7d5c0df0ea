// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Outgoing ball task.
//!
//! One task per ball device takes eject requests from an unbounded queue
//! and works on exactly one of them at a time: wait for a ball, let the
//! target prepare, fire the ejector, wait for the ball to leave, then wait
//! for the target to confirm it. Failed attempts are retried until the
//! request's try budget is exhausted, at which point the device is stopped.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::device::controller::{
    EjectEventEmitter, EjectFailure, EjectPolicy, OutgoingEvent, OutgoingState,
    OutgoingStateMachine, RetryPolicy, TryBudget,
};
use crate::device::error::{EjectError, EjectResult};
use crate::device::request::{EjectReport, EjectRequest};
use crate::device::{BallCounter, DeviceControl, EjectProcess, Ejector, IncomingBall};
use crate::signal::Signal;
use crate::wait::{first, Losers, Wait};

/// Positions in the late confirmation race. A confirmation wins ties.
const EJECT_CONFIRMED: usize = 0;
const BALL_RETURNED: usize = 1;

/// Configuration for the outgoing task.
pub struct OutgoingTaskConfig {
    /// Name of the ejecting device, used as `IncomingBall::source`.
    pub device: String,
    pub counter: Arc<dyn BallCounter>,
    pub ejector: Arc<dyn Ejector>,
    pub control: Arc<dyn DeviceControl>,
    pub policy: EjectPolicy,
    pub emitter: EjectEventEmitter,
}

/// Result of one physical attempt that did not lose the ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Confirmed,
    Failed(EjectFailure),
}

struct OutgoingBalls {
    config: OutgoingTaskConfig,
    machine: OutgoingStateMachine,
    state_tx: watch::Sender<OutgoingState>,
}

/// Run the outgoing task until the queue closes or a ball is lost.
///
/// A lost ball ends the task with [`EjectError::BallLost`]; requests still
/// queued at that point are answered with [`EjectError::DeviceFaulted`].
pub async fn run_outgoing_task(
    config: OutgoingTaskConfig,
    mut rx: mpsc::UnboundedReceiver<EjectRequest>,
    state_tx: watch::Sender<OutgoingState>,
) -> EjectResult<()> {
    let mut outgoing = OutgoingBalls {
        config,
        machine: OutgoingStateMachine::new(),
        state_tx,
    };
    outgoing.state_tx.send_replace(outgoing.machine.state().clone());
    info!("Outgoing eject task for {} ready", outgoing.config.device);

    while let Some(mut request) = rx.recv().await {
        if let OutgoingState::Stopped { failed_tries } = outgoing.machine.state() {
            let err = EjectError::DeviceStopped {
                device: outgoing.config.device.clone(),
                tries: *failed_tries,
            };
            warn!("{}: rejecting eject request {}: {}", outgoing.config.device, request.id, err);
            request.respond(Err(err));
            continue;
        }

        debug!(
            "{}: got eject request {} to {}",
            outgoing.config.device,
            request.id,
            request.target.name()
        );
        let result = outgoing.ejecting(&request).await;
        match result {
            Ok(report) => request.respond(Ok(report)),
            Err(err) if err.is_fatal() => {
                request.respond(Err(err.clone()));
                outgoing.reject_pending(&mut rx);
                return Err(err);
            }
            Err(err) => request.respond(Err(err)),
        }
    }

    info!(
        "Outgoing eject task for {} shutting down (queue closed) after {} transitions",
        outgoing.config.device,
        outgoing.machine.transition_count()
    );
    Ok(())
}

impl OutgoingBalls {
    fn transition(&mut self, event: OutgoingEvent) {
        let old_state = self.machine.state().clone();
        if self.machine.process_event(event.clone()) {
            let new_state = self.machine.state().clone();
            debug!("{}: {} -> {}", self.config.device, old_state, new_state);
            self.config
                .emitter
                .notify_state_change(&self.config.device, &old_state, &new_state);
            self.state_tx.send_replace(new_state);
        } else {
            warn!(
                "{}: ignoring {:?} in state {}",
                self.config.device, event, old_state
            );
        }
    }

    /// Eject loop for one request: retry until confirmed or out of tries.
    async fn ejecting(&mut self, request: &EjectRequest) -> EjectResult<EjectReport> {
        let device = self.config.device.clone();
        let budget = TryBudget::from_max_tries(request.max_tries);
        self.config.emitter.notify_request_started(&device, request.id);
        self.transition(OutgoingEvent::RequestAccepted);
        match budget.max_attempts() {
            Some(attempts) => debug!(
                "{}: request {} allows {} attempt(s)",
                device, request.id, attempts
            ),
            None => debug!("{}: request {} retries without limit", device, request.id),
        }
        if request.mechanical {
            debug!("{}: request {} is a mechanical eject", device, request.id);
        }

        let mut eject_try: u32 = 0;
        loop {
            debug!("{}: wait for ball", device);
            self.config.counter.wait_for_ball().await;
            self.transition(OutgoingEvent::BallAvailable);

            request.target.prepare_eject(&device).await;

            if self.config.counter.ball_count().await == 0 {
                self.abort_eject(request, eject_try);
                continue;
            }
            self.transition(OutgoingEvent::Prepared);

            debug!(
                "{}: ejecting ball to {} (try {})",
                device,
                request.target.name(),
                eject_try
            );
            let attempt = self.eject_ball(request, eject_try).await?;
            match attempt {
                Attempt::Confirmed => {
                    info!(
                        "{}: eject to {} confirmed after {} failed tries",
                        device,
                        request.target.name(),
                        eject_try
                    );
                    self.config
                        .emitter
                        .notify_eject_confirmed(&device, request.id, eject_try);
                    return Ok(EjectReport {
                        request: request.id,
                        source: device,
                        target: request.target.name().to_string(),
                        failed_tries: eject_try,
                    });
                }
                Attempt::Failed(reason) => self.failed_eject(request, eject_try, reason),
            }

            eject_try += 1;
            if !budget.should_retry(eject_try) {
                self.stop_device(eject_try);
                return Err(EjectError::DeviceStopped {
                    device,
                    tries: eject_try,
                });
            }
        }
    }

    /// The ball vanished between "ball available" and the eject; no try is
    /// charged for it.
    fn abort_eject(&mut self, request: &EjectRequest, eject_try: u32) {
        warn!(
            "{}: ball gone before eject of request {}; waiting for another",
            self.config.device, request.id
        );
        self.transition(OutgoingEvent::EjectAborted);
        self.config
            .emitter
            .notify_eject_aborted(&self.config.device, request.id, eject_try);
    }

    fn failed_eject(&mut self, request: &EjectRequest, eject_try: u32, reason: EjectFailure) {
        warn!(
            "{}: eject try {} to {} failed: {:?}",
            self.config.device,
            eject_try,
            request.target.name(),
            reason
        );
        self.config
            .emitter
            .notify_eject_failed(&self.config.device, request.id, eject_try, reason);
    }

    fn stop_device(&mut self, failed_tries: u32) {
        error!(
            "{}: giving up after {} failed ejects, stopping device",
            self.config.device, failed_tries
        );
        self.config.control.stop();
        self.transition(OutgoingEvent::GaveUp);
        self.config
            .emitter
            .notify_device_stopped(&self.config.device, failed_tries);
    }

    /// One physical attempt: fire, wait for the ball to leave, then wait for
    /// the target.
    async fn eject_ball(&mut self, request: &EjectRequest, eject_try: u32) -> EjectResult<Attempt> {
        let process = self.config.counter.start_eject();
        self.config
            .emitter
            .notify_eject_attempt(&self.config.device, request.id, eject_try);

        debug!("{}: wait for ball to leave device", self.config.device);
        self.config
            .ejector
            .eject_one_ball(process.is_jammed(), eject_try);

        let left = first(
            vec![process.ball_left().wait()],
            request.eject_timeout,
            Losers::Cancel,
        )
        .await;
        if left.is_err() {
            process.eject_failed();
            self.transition(OutgoingEvent::EjectFailed);
            return Ok(Attempt::Failed(EjectFailure::BallDidNotLeave));
        }

        debug!("{}: ball left", self.config.device);
        self.transition(OutgoingEvent::BallLeft);
        self.config
            .emitter
            .notify_ball_left(&self.config.device, request.id);
        let arrival_timeout = self.add_incoming_ball_to_target(request);
        let attempt = self.handle_confirm(request, process).await;
        if !matches!(attempt, Ok(Attempt::Confirmed)) {
            // The target should not expect this ball anymore.
            arrival_timeout.resolve();
        }
        attempt
    }

    fn add_incoming_ball_to_target(&self, request: &EjectRequest) -> Signal {
        let ball = IncomingBall::new(
            self.config.device.clone(),
            request.id,
            request.confirm.clone(),
        );
        let timeout = ball.timeout.clone();
        request.target.add_incoming_ball(ball);
        timeout
    }

    async fn handle_confirm(
        &mut self,
        request: &EjectRequest,
        process: Box<dyn EjectProcess>,
    ) -> EjectResult<Attempt> {
        debug!("{}: wait for confirm", self.config.device);
        let confirm = first(
            vec![request.confirm.wait()],
            request.eject_timeout,
            Losers::Keep,
        )
        .await;
        let mut timed_out = match confirm {
            Ok(_) => {
                debug!("{}: got eject confirm", self.config.device);
                return Ok(self.confirmed(process));
            }
            Err(timed_out) => timed_out,
        };

        debug!("{}: got timeout before confirm", self.config.device);
        if request.confirm.is_resolved() {
            return Ok(self.confirmed(process));
        }
        if process.is_ball_returned() {
            process.eject_failed();
            self.transition(OutgoingEvent::EjectFailed);
            return Ok(Attempt::Failed(EjectFailure::BallReturned));
        }

        self.transition(OutgoingEvent::ConfirmTimedOut);
        let confirm_wait = timed_out
            .take(0)
            .unwrap_or_else(|| request.confirm.wait());
        self.handle_late_confirm_or_missing(request, process, confirm_wait)
            .await
    }

    fn confirmed(&mut self, process: Box<dyn EjectProcess>) -> Attempt {
        process.eject_done();
        self.transition(OutgoingEvent::Confirmed);
        Attempt::Confirmed
    }

    async fn handle_late_confirm_or_missing(
        &mut self,
        request: &EjectRequest,
        process: Box<dyn EjectProcess>,
        confirm_wait: Wait<'static, ()>,
    ) -> EjectResult<Attempt> {
        let late_confirm_timeout = self.config.policy.late_confirm_timeout;
        debug!(
            "{}: waiting up to {:?} for a late confirm or the ball to return",
            self.config.device, late_confirm_timeout
        );

        // Order matches EJECT_CONFIRMED / BALL_RETURNED.
        let waits = vec![confirm_wait, process.ball_returned().wait()];
        let race = first(waits, late_confirm_timeout, Losers::Cancel).await;
        match race {
            Ok(winner) => match winner.index {
                EJECT_CONFIRMED => {
                    info!("{}: got late eject confirm", self.config.device);
                    Ok(self.confirmed(process))
                }
                BALL_RETURNED if request.confirm.is_resolved() => {
                    info!(
                        "{}: ball returned but target confirmed it",
                        self.config.device
                    );
                    Ok(self.confirmed(process))
                }
                BALL_RETURNED => {
                    process.eject_failed();
                    self.transition(OutgoingEvent::EjectFailed);
                    Ok(Attempt::Failed(EjectFailure::BallReturned))
                }
                index => unreachable!("late confirm race has two waits, got {}", index),
            },
            Err(_) => {
                let err = EjectError::BallLost {
                    device: self.config.device.clone(),
                    request: request.id,
                };
                error!("{}: {}", self.config.device, err);
                self.transition(OutgoingEvent::BallLost(err.to_string()));
                self.config
                    .emitter
                    .notify_ball_lost(&self.config.device, request.id);
                Err(err)
            }
        }
    }

    fn reject_pending(&self, rx: &mut mpsc::UnboundedReceiver<EjectRequest>) {
        rx.close();
        while let Ok(mut request) = rx.try_recv() {
            request.respond(Err(EjectError::DeviceFaulted {
                device: self.config.device.clone(),
            }));
        }
    }
}

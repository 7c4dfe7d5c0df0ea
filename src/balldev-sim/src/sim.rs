// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-memory ball devices for development and testing.
//!
//! A `SimDevice` plays every collaborator of the outgoing task: it counts
//! its balls, fires ejects, receives balls from other devices and can be
//! stopped. Configured failures are consumed in order: balls that do not
//! leave, then balls that fall back, then balls that vanish.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use balldev_app::normalize_name;
use balldev_core::{
    BallCounter, DeviceControl, DeviceFuture, EjectProcess, EjectTarget, Ejector, IncomingBall,
    Signal,
};

use crate::config::{DeviceConfig, SimConfig};

/// Time between firing the coil and the ball leaving the device.
const EJECT_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stuck,
    Bounce,
    Lost,
    Arrive,
}

#[derive(Debug, Default)]
struct Faults {
    fail_ejects: u32,
    bounce_backs: u32,
    lost_balls: u32,
}

impl Faults {
    fn next_outcome(&mut self) -> Outcome {
        if take_one(&mut self.fail_ejects) {
            Outcome::Stuck
        } else if take_one(&mut self.bounce_backs) {
            Outcome::Bounce
        } else if take_one(&mut self.lost_balls) {
            Outcome::Lost
        } else {
            Outcome::Arrive
        }
    }
}

fn take_one(count: &mut u32) -> bool {
    if *count == 0 {
        return false;
    }
    *count -= 1;
    true
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SimDevice {
    name: String,
    balls: Arc<watch::Sender<u32>>,
    travel_time: Duration,
    jammed: bool,
    faults: Mutex<Faults>,
    target: OnceLock<Arc<SimDevice>>,
    current: Mutex<Option<(Signal, Signal)>>,
    incoming: Mutex<VecDeque<IncomingBall>>,
    stopped: AtomicBool,
}

impl SimDevice {
    pub fn new(config: &DeviceConfig) -> Arc<Self> {
        let (balls, _) = watch::channel(config.balls);
        Arc::new(Self {
            name: config.id.clone(),
            balls: Arc::new(balls),
            travel_time: config.travel_time(),
            jammed: config.jammed,
            faults: Mutex::new(Faults {
                fail_ejects: config.fail_ejects,
                bounce_backs: config.bounce_backs,
                lost_balls: config.lost_balls,
            }),
            target: OnceLock::new(),
            current: Mutex::new(None),
            incoming: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn balls(&self) -> u32 {
        *self.balls.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Target device wired from the config, if any.
    pub fn target(&self) -> Option<Arc<SimDevice>> {
        self.target.get().cloned()
    }

    fn put_ball(&self) {
        self.balls.send_modify(|count| *count += 1);
    }

    /// A ball physically entered this device.
    fn receive_ball(&self) {
        self.put_ball();
        let mut incoming = lock(&self.incoming);
        incoming.retain(|ball| !ball.timeout.is_resolved() && !ball.is_confirmed());
        match incoming.pop_front() {
            Some(ball) => {
                info!("{}: received ball from {}", self.name, ball.source);
                ball.confirm();
            }
            None => warn!("{}: unexpected ball entered", self.name),
        }
    }
}

struct SimProcess {
    left: Signal,
    returned: Signal,
    jammed: bool,
}

impl EjectProcess for SimProcess {
    fn is_jammed(&self) -> bool {
        self.jammed
    }

    fn ball_left(&self) -> Signal {
        self.left.clone()
    }

    fn ball_returned(&self) -> Signal {
        self.returned.clone()
    }

    fn eject_failed(self: Box<Self>) {
        debug!("eject process finished: failed");
    }

    fn eject_done(self: Box<Self>) {
        debug!("eject process finished: done");
    }
}

impl BallCounter for SimDevice {
    fn ball_count(&self) -> DeviceFuture<'_, u32> {
        let count = self.balls();
        Box::pin(std::future::ready(count))
    }

    fn wait_for_ball(&self) -> DeviceFuture<'_, ()> {
        let mut rx = self.balls.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|count| *count > 0).await;
        })
    }

    fn start_eject(&self) -> Box<dyn EjectProcess> {
        let left = Signal::new();
        let returned = Signal::new();
        *lock(&self.current) = Some((left.clone(), returned.clone()));
        Box::new(SimProcess {
            left,
            returned,
            jammed: self.jammed,
        })
    }
}

impl Ejector for SimDevice {
    fn eject_one_ball(&self, jammed: bool, eject_try: u32) {
        let Some((left, returned)) = lock(&self.current).take() else {
            warn!("{}: eject fired without an eject process", self.name);
            return;
        };
        let outcome = lock(&self.faults).next_outcome();
        info!(
            "{}: firing ejector (try {}, jammed {}): {:?}",
            self.name, eject_try, jammed, outcome
        );
        if outcome == Outcome::Stuck {
            return;
        }

        let balls = self.balls.clone();
        let target = self.target();
        let travel_time = self.travel_time;
        let name = self.name.clone();
        tokio::spawn(async move {
            tokio::time::sleep(EJECT_DELAY).await;
            balls.send_modify(|count| *count = count.saturating_sub(1));
            left.resolve();
            match outcome {
                Outcome::Bounce => {
                    tokio::time::sleep(travel_time / 2).await;
                    balls.send_modify(|count| *count += 1);
                    returned.resolve();
                    debug!("{}: ball fell back", name);
                }
                Outcome::Arrive => {
                    tokio::time::sleep(travel_time).await;
                    if let Some(target) = target {
                        target.receive_ball();
                    }
                }
                Outcome::Lost | Outcome::Stuck => {}
            }
        });
    }
}

impl EjectTarget for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_incoming_ball(&self, ball: IncomingBall) {
        debug!("{}: expecting ball from {}", self.name, ball.source);
        lock(&self.incoming).push_back(ball);
    }
}

impl DeviceControl for SimDevice {
    fn stop(&self) {
        warn!("{}: device stopped", self.name);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Build all configured devices and wire their targets.
pub fn build_devices(config: &SimConfig) -> HashMap<String, Arc<SimDevice>> {
    let devices: HashMap<String, Arc<SimDevice>> = config
        .devices
        .iter()
        .map(|d| (normalize_name(&d.id), SimDevice::new(d)))
        .collect();

    for device in &config.devices {
        let Some(target) = device.target.as_deref() else {
            continue;
        };
        if let (Some(source), Some(target)) = (
            devices.get(&normalize_name(&device.id)),
            devices.get(&normalize_name(target)),
        ) {
            let _ = source.target.set(target.clone());
        }
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use balldev_core::{
        spawn_outgoing_task, EjectError, EjectEventEmitter, EjectPolicy, OutgoingTaskConfig,
    };

    fn config(toml_str: &str) -> SimConfig {
        let config: SimConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        config
    }

    fn spawn(
        device: &Arc<SimDevice>,
        policy: EjectPolicy,
    ) -> (
        balldev_core::OutgoingHandle,
        tokio::task::JoinHandle<balldev_core::EjectResult<()>>,
    ) {
        spawn_outgoing_task(OutgoingTaskConfig {
            device: device.name.clone(),
            counter: device.clone(),
            ejector: device.clone(),
            control: device.clone(),
            policy,
            emitter: EjectEventEmitter::new(),
        })
    }

    const TWO_DEVICES: &str = r#"
[[devices]]
id = "trough"
target = "plunger"
balls = 2
max_tries = 2
"#;

    fn with_faults(faults: &str) -> SimConfig {
        config(&format!(
            "{}{}\n[[devices]]\nid = \"plunger\"\n",
            TWO_DEVICES, faults
        ))
    }

    #[test]
    fn test_build_devices_wires_targets() {
        let devices = build_devices(&with_faults(""));
        let trough = &devices["trough"];
        assert_eq!(trough.balls(), 2);
        assert_eq!(trough.target().map(|t| t.name.clone()), Some("plunger".to_string()));
        assert!(devices["plunger"].target().is_none());
    }

    #[test]
    fn test_receive_skips_stale_incoming_balls() {
        let devices = build_devices(&with_faults(""));
        let plunger = devices["plunger"].clone();

        let abandoned = IncomingBall::new("trough", uuid::Uuid::nil(), Signal::new());
        abandoned.timeout.resolve();
        let confirmed = IncomingBall::new("trough", uuid::Uuid::nil(), Signal::new());
        confirmed.confirm();
        let expected = IncomingBall::new("trough", uuid::Uuid::new_v4(), Signal::new());
        plunger.add_incoming_ball(abandoned.clone());
        plunger.add_incoming_ball(confirmed);
        plunger.add_incoming_ball(expected.clone());

        plunger.receive_ball();
        assert!(expected.is_confirmed());
        assert!(!abandoned.is_confirmed());
        assert_eq!(plunger.balls(), 1);
        assert!(lock(&plunger.incoming).is_empty());
    }

    #[test]
    fn test_faults_consumed_in_order() {
        let mut faults = Faults {
            fail_ejects: 1,
            bounce_backs: 1,
            lost_balls: 1,
        };
        assert_eq!(faults.next_outcome(), Outcome::Stuck);
        assert_eq!(faults.next_outcome(), Outcome::Bounce);
        assert_eq!(faults.next_outcome(), Outcome::Lost);
        assert_eq!(faults.next_outcome(), Outcome::Arrive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ball_moves_to_target() {
        let cfg = with_faults("");
        let devices = build_devices(&cfg);
        let trough = devices["trough"].clone();
        let plunger = devices["plunger"].clone();
        let policy = cfg.devices[0].policy();
        let (handle, _task) = spawn(&trough, policy.clone());

        let (request, rx) = policy.request_to(plunger.clone()).with_response();
        handle.enqueue_eject(request).unwrap();
        let report = rx.await.unwrap().unwrap();
        assert_eq!(report.failed_tries, 0);
        assert_eq!(report.target, "plunger");
        assert_eq!(trough.balls(), 1);
        assert_eq!(plunger.balls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_and_bounced_balls_are_retried() {
        let cfg = with_faults("fail_ejects = 1\nbounce_backs = 1\n");
        let devices = build_devices(&cfg);
        let trough = devices["trough"].clone();
        let plunger = devices["plunger"].clone();
        let policy = cfg.devices[0].policy();
        let (handle, _task) = spawn(&trough, policy.clone());

        let (request, rx) = policy.request_to(plunger.clone()).with_response();
        handle.enqueue_eject(request).unwrap();
        let report = rx.await.unwrap().unwrap();
        assert_eq!(report.failed_tries, 2);
        assert_eq!(trough.balls(), 1);
        assert_eq!(plunger.balls(), 1);
        assert!(!trough.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_stops_when_out_of_tries() {
        let cfg = with_faults("fail_ejects = 5\n");
        let devices = build_devices(&cfg);
        let trough = devices["trough"].clone();
        let plunger = devices["plunger"].clone();
        let policy = cfg.devices[0].policy();
        let (handle, _task) = spawn(&trough, policy.clone());

        let (request, rx) = policy.request_to(plunger.clone()).with_response();
        handle.enqueue_eject(request).unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, EjectError::DeviceStopped { tries: 3, .. }));
        assert!(trough.is_stopped());
        assert_eq!(trough.balls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_ball_faults_source() {
        let cfg = with_faults("lost_balls = 1\n");
        let devices = build_devices(&cfg);
        let trough = devices["trough"].clone();
        let plunger = devices["plunger"].clone();
        let policy = cfg.devices[0].policy();
        let (handle, task) = spawn(&trough, policy.clone());

        let (request, rx) = policy.request_to(plunger.clone()).with_response();
        handle.enqueue_eject(request).unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, EjectError::BallLost { .. }));
        assert!(task.await.unwrap().is_err());
        assert_eq!(trough.balls(), 1);
        assert_eq!(plunger.balls(), 0);
        assert!(!trough.is_stopped());
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scripted collaborators for controller tests.
//!
//! One `MockDevice` plays every role: ball counter, ejector, stop control
//! and eject target. Each fired eject consumes one `Script` describing when
//! the ball leaves, comes back, and gets confirmed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::device::{
    BallCounter, DeviceControl, DeviceFuture, EjectProcess, EjectTarget, Ejector, IncomingBall,
};
use crate::signal::Signal;

/// Timing of one physical eject, measured from the moment the ejector fires.
/// `confirm_after` is measured from the incoming ball registration.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Script {
    pub left_after: Option<Duration>,
    pub returned_after: Option<Duration>,
    pub confirm_after: Option<Duration>,
}

impl Script {
    pub fn success() -> Self {
        Self {
            left_after: Some(Duration::from_secs(1)),
            returned_after: None,
            confirm_after: Some(Duration::from_secs(1)),
        }
    }

    /// Ball never leaves.
    pub fn stuck() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub done: AtomicU32,
    pub failed: AtomicU32,
    pub stops: AtomicU32,
    pub prepares: AtomicU32,
    pub confirms: AtomicU32,
}

impl Counters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockDevice {
    pub counters: Arc<Counters>,
    pub ejects: Mutex<Vec<(bool, u32)>>,
    pub incoming: Mutex<Vec<IncomingBall>>,
    balls: Arc<watch::Sender<u32>>,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    current: Mutex<Option<(Signal, Signal)>>,
    active: Mutex<Option<Script>>,
    steal_on_prepare: AtomicU32,
    jammed: AtomicBool,
}

impl MockDevice {
    /// Device holding one ball; every eject follows `fallback` unless a
    /// script was queued.
    pub fn new(fallback: Script) -> Arc<Self> {
        let (balls, _) = watch::channel(1);
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            ejects: Mutex::new(Vec::new()),
            incoming: Mutex::new(Vec::new()),
            balls: Arc::new(balls),
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            current: Mutex::new(None),
            active: Mutex::new(None),
            steal_on_prepare: AtomicU32::new(0),
            jammed: AtomicBool::new(false),
        })
    }

    pub fn queue_script(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    pub fn set_balls(&self, count: u32) {
        self.balls.send_replace(count);
    }

    pub fn set_jammed(&self, jammed: bool) {
        self.jammed.store(jammed, Ordering::SeqCst);
    }

    /// The next `count` prepare calls take the ball away and put it back a
    /// second later.
    pub fn steal_on_prepare(&self, count: u32) {
        self.steal_on_prepare.store(count, Ordering::SeqCst);
    }

    pub fn eject_tries(&self) -> Vec<u32> {
        lock(&self.ejects).iter().map(|(_, t)| *t).collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn resolve_after(signal: Signal, delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.resolve();
        });
    }
}

struct MockProcess {
    left: Signal,
    returned: Signal,
    jammed: bool,
    counters: Arc<Counters>,
}

impl EjectProcess for MockProcess {
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
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn eject_done(self: Box<Self>) {
        self.counters.done.fetch_add(1, Ordering::SeqCst);
    }
}

impl BallCounter for MockDevice {
    fn ball_count(&self) -> DeviceFuture<'_, u32> {
        let count = *self.balls.borrow();
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
        Box::new(MockProcess {
            left,
            returned,
            jammed: self.jammed.load(Ordering::SeqCst),
            counters: self.counters.clone(),
        })
    }
}

impl Ejector for MockDevice {
    fn eject_one_ball(&self, jammed: bool, eject_try: u32) {
        lock(&self.ejects).push((jammed, eject_try));
        let script = lock(&self.scripts).pop_front().unwrap_or(self.fallback);
        *lock(&self.active) = Some(script);
        if let Some((left, returned)) = lock(&self.current).take() {
            resolve_after(left, script.left_after);
            resolve_after(returned, script.returned_after);
        }
    }
}

impl EjectTarget for MockDevice {
    fn name(&self) -> &str {
        "target"
    }

    fn prepare_eject<'a>(&'a self, _source: &'a str) -> DeviceFuture<'a, ()> {
        self.counters.prepares.fetch_add(1, Ordering::SeqCst);
        let steal = self
            .steal_on_prepare
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if steal {
            self.balls.send_replace(0);
            let balls = self.balls.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                balls.send_replace(1);
            });
        }
        Box::pin(std::future::ready(()))
    }

    fn add_incoming_ball(&self, ball: IncomingBall) {
        lock(&self.incoming).push(ball.clone());
        let active = *lock(&self.active);
        let delay = active.and_then(|s| s.confirm_after);
        if let Some(delay) = delay {
            let counters = self.counters.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if ball.confirm() {
                    counters.confirms.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    }
}

impl DeviceControl for MockDevice {
    fn stop(&self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
    }
}

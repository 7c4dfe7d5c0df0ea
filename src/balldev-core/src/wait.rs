// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Race a set of waits against a deadline.
//!
//! [`first`] is the single building block for every timed suspension in the
//! eject controller. With [`Losers::Cancel`] the waits that did not win are
//! dropped as soon as the race is decided, so none of them can run to
//! completion afterwards. With [`Losers::Keep`] they are handed back to the
//! caller still pending, both alongside the winner and inside the timeout
//! error, and can be raced again later.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future;
use tracing::trace;

/// Boxed wait that can take part in a race.
pub type Wait<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What happens to the waits that did not win.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Losers {
    /// Drop them once the race is decided.
    #[default]
    Cancel,
    /// Return them to the caller, still pending.
    Keep,
}

/// A wait that has not completed yet, tagged with its position in the
/// original input.
pub struct Pending<'a, T> {
    pub index: usize,
    pub wait: Wait<'a, T>,
}

impl<T> fmt::Debug for Pending<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("index", &self.index).finish()
    }
}

/// The wait that completed first.
pub struct Winner<'a, T> {
    /// Position of the winning wait in the input.
    pub index: usize,
    pub value: T,
    /// Waits still pending. Always empty with [`Losers::Cancel`].
    pub pending: Vec<Pending<'a, T>>,
}

impl<T: fmt::Debug> fmt::Debug for Winner<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Winner")
            .field("index", &self.index)
            .field("value", &self.value)
            .field("pending", &self.pending)
            .finish()
    }
}

/// The deadline elapsed before any wait completed.
pub struct TimedOut<'a, T> {
    /// Waits still pending. Always empty with [`Losers::Cancel`].
    pub pending: Vec<Pending<'a, T>>,
}

impl<'a, T> TimedOut<'a, T> {
    /// Take back the pending wait that was at `index` in the input.
    pub fn take(&mut self, index: usize) -> Option<Wait<'a, T>> {
        let pos = self.pending.iter().position(|p| p.index == index)?;
        Some(self.pending.swap_remove(pos).wait)
    }
}

impl<T> fmt::Debug for TimedOut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedOut")
            .field("pending", &self.pending)
            .finish()
    }
}

impl<T> fmt::Display for TimedOut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out with {} wait(s) pending", self.pending.len())
    }
}

/// Wait until the first of `waits` completes or `timeout` elapses.
///
/// Waits earlier in the input win ties. An empty set behaves as a plain
/// delay ending in [`TimedOut`].
pub async fn first<'a, T>(
    waits: Vec<Wait<'a, T>>,
    timeout: Duration,
    losers: Losers,
) -> Result<Winner<'a, T>, TimedOut<'a, T>> {
    let mut pending: Vec<Pending<'a, T>> = waits
        .into_iter()
        .enumerate()
        .map(|(index, wait)| Pending { index, wait })
        .collect();

    if pending.is_empty() {
        tokio::time::sleep(timeout).await;
        trace!("timed out after {:?} with nothing to wait for", timeout);
        return Err(TimedOut { pending });
    }

    // Positions reported by select_all match `pending`.
    let race = future::select_all(pending.iter_mut().map(|entry| entry.wait.as_mut()));
    let outcome = tokio::time::timeout(timeout, race)
        .await
        .map(|(value, pos, _)| (pos, value));
    match outcome {
        Ok((pos, value)) => {
            let index = pending.remove(pos).index;
            trace!("wait {} of {} won", index, pending.len() + 1);
            if losers == Losers::Cancel {
                pending.clear();
            }
            Ok(Winner {
                index,
                value,
                pending,
            })
        }
        Err(_) => {
            trace!("timed out after {:?}", timeout);
            if losers == Losers::Cancel {
                pending.clear();
            }
            Err(TimedOut { pending })
        }
    }
}

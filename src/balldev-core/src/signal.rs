// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Write-once broadcast signal.
//!
//! A [`Signal`] starts pending and can be resolved exactly once. Any number
//! of clones may wait on it; waiting never consumes the signal, so a wait
//! that lost a race can be started again (or kept alive) and still observe
//! a later resolution.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::wait::Wait;

#[derive(Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Create a new pending signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the signal.
    /// Returns true if this call resolved it, false if it was already resolved.
    pub fn resolve(&self) -> bool {
        self.tx.send_if_modified(|resolved| {
            if *resolved {
                false
            } else {
                *resolved = true;
                true
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        *self.tx.borrow()
    }

    /// Future completing once the signal is resolved.
    ///
    /// Completes immediately if the signal is already resolved. The future
    /// holds its own subscription, so it stays valid independently of the
    /// `Signal` value it was created from.
    pub fn wait(&self) -> Wait<'static, ()> {
        let mut rx = self.tx.subscribe();
        Box::pin(async move {
            if rx.wait_for(|resolved| *resolved).await.is_err() {
                // Every handle is gone; nothing can resolve it anymore.
                std::future::pending::<()>().await;
            }
        })
    }

    /// True if both handles refer to the same underlying signal.
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

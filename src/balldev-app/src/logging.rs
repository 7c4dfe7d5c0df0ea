// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Parse a configured level. Falls back to INFO if level is None or invalid.
pub fn parse_level(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Initialize logging with optional level from config.
///
/// A non-empty `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(log_level: Option<&str>) {
    let level = parse_level(log_level);
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(level.to_string()));

    let _ = FmtSubscriber::builder()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for balldev-sim.
//!
//! Config is loaded from the `[balldev-sim]` section of `balldev.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./balldev.toml`
//! 3. `~/.config/balldev/balldev.toml`
//! 4. `/etc/balldev/balldev.toml`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use balldev_app::{normalize_name, ConfigError, ConfigFile};
use balldev_core::EjectPolicy;
use serde::{Deserialize, Serialize};

/// Top-level simulator configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Simulated ball devices
    #[serde(rename = "devices", default)]
    pub devices: Vec<DeviceConfig>,
    /// Eject requests queued at startup
    #[serde(rename = "ejects", default)]
    pub ejects: Vec<EjectConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// One simulated ball device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identifier, referenced by `target` and `[[ejects]].source`.
    pub id: String,
    /// Device receiving balls ejected from this one. Devices without a
    /// target only receive balls.
    pub target: Option<String>,
    /// Balls held at startup
    pub balls: u32,
    /// Deadline for the ball to leave and for the target to confirm it
    pub eject_timeout_ms: u64,
    /// Failed tries allowed before the device stops (0 = unlimited)
    pub max_tries: Option<u32>,
    /// Deadline of the late confirmation race
    pub late_confirm_timeout_ms: u64,
    /// Time a ball needs to reach the target after leaving
    pub travel_time_ms: u64,
    /// Number of ejects where the ball does not leave
    pub fail_ejects: u32,
    /// Number of ejects where the ball leaves and falls back
    pub bounce_backs: u32,
    /// Number of ejects where the ball leaves and never arrives
    pub lost_balls: u32,
    /// Report the device as jammed to the ejector
    pub jammed: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            target: None,
            balls: 0,
            eject_timeout_ms: 10_000,
            max_tries: None,
            late_confirm_timeout_ms: 60_000,
            travel_time_ms: 1_000,
            fail_ejects: 0,
            bounce_backs: 0,
            lost_balls: 0,
            jammed: false,
        }
    }
}

impl DeviceConfig {
    pub fn policy(&self) -> EjectPolicy {
        EjectPolicy::new(Duration::from_millis(self.eject_timeout_ms), self.max_tries)
            .with_late_confirm_timeout(Duration::from_millis(self.late_confirm_timeout_ms))
    }

    pub fn travel_time(&self) -> Duration {
        Duration::from_millis(self.travel_time_ms)
    }
}

/// Ejects queued on one source device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EjectConfig {
    /// Ejecting device id
    pub source: String,
    /// Number of balls to eject
    pub count: u32,
}

impl Default for EjectConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            count: 1,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err("[[devices]].id must not be empty".to_string());
            }
            if !seen.insert(normalize_name(&device.id)) {
                return Err(format!("duplicate device id '{}'", device.id));
            }
            if device.eject_timeout_ms == 0 {
                return Err(format!(
                    "[[devices]] '{}': eject_timeout_ms must be > 0",
                    device.id
                ));
            }
            if device.late_confirm_timeout_ms == 0 {
                return Err(format!(
                    "[[devices]] '{}': late_confirm_timeout_ms must be > 0",
                    device.id
                ));
            }
        }

        for device in &self.devices {
            let Some(target) = device.target.as_deref() else {
                continue;
            };
            if self.device(target).is_none() {
                return Err(format!(
                    "[[devices]] '{}': unknown target '{}'",
                    device.id, target
                ));
            }
            if normalize_name(target) == normalize_name(&device.id) {
                return Err(format!(
                    "[[devices]] '{}': device cannot eject to itself",
                    device.id
                ));
            }
        }

        for eject in &self.ejects {
            let Some(source) = self.device(&eject.source) else {
                return Err(format!("[[ejects]]: unknown source '{}'", eject.source));
            };
            if source.target.is_none() {
                return Err(format!(
                    "[[ejects]]: source '{}' has no target",
                    eject.source
                ));
            }
            if eject.count == 0 {
                return Err(format!("[[ejects]] '{}': count must be > 0", eject.source));
            }
        }
        Ok(())
    }

    /// Look up a device by (normalized) id.
    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        let id = normalize_name(id);
        self.devices.iter().find(|d| normalize_name(&d.id) == id)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Generate an example configuration wrapped under the `[balldev-sim]`
    /// section header, suitable for use in a combined `balldev.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "balldev-sim")]
            inner: SimConfig,
        }
        let example = SimConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            devices: vec![
                DeviceConfig {
                    id: "trough".to_string(),
                    target: Some("plunger".to_string()),
                    balls: 3,
                    max_tries: Some(3),
                    fail_ejects: 1,
                    ..DeviceConfig::default()
                },
                DeviceConfig {
                    id: "plunger".to_string(),
                    target: Some("playfield".to_string()),
                    max_tries: Some(3),
                    bounce_backs: 1,
                    travel_time_ms: 2_000,
                    ..DeviceConfig::default()
                },
                DeviceConfig {
                    id: "playfield".to_string(),
                    ..DeviceConfig::default()
                },
            ],
            ejects: vec![
                EjectConfig {
                    source: "trough".to_string(),
                    count: 2,
                },
                EjectConfig {
                    source: "plunger".to_string(),
                    count: 2,
                },
            ],
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for SimConfig {
    fn section_key() -> &'static str {
        "balldev-sim"
    }
}

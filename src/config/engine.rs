// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::lighting::engine::{
    DEFAULT_LAYER_GRACE_PERIOD, DEFAULT_LOCK_WARN_THRESHOLD, DEFAULT_STALE_TRANSITION_TIMEOUT,
    DEFAULT_TICK_RATE, DEFAULT_VALIDATION_INTERVAL,
};
use crate::lighting::EngineSettings;

/// A YAML representation of the engine tuning knobs. Every field is optional.
#[derive(Deserialize, Clone, Default)]
pub(crate) struct Engine {
    /// Ticks per second.
    tick_rate: Option<u32>,
    /// How long an empty layer lingers before it's collected.
    layer_grace_period: Option<String>,
    /// How long past its duration an interpolation may run before it's purged.
    stale_transition_timeout: Option<String>,
    validation_interval: Option<String>,
    /// Average lock hold time above which warnings are logged.
    lock_warn_threshold: Option<String>,
}

impl Engine {
    /// Converts the configuration into engine settings.
    pub(crate) fn settings(&self) -> Result<EngineSettings, ConfigError> {
        let tick_rate = self.tick_rate.unwrap_or(DEFAULT_TICK_RATE);
        if tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }

        Ok(EngineSettings {
            tick_rate,
            layer_grace_period: duration(
                "layer_grace_period",
                &self.layer_grace_period,
                DEFAULT_LAYER_GRACE_PERIOD,
            )?,
            stale_transition_timeout: duration(
                "stale_transition_timeout",
                &self.stale_transition_timeout,
                DEFAULT_STALE_TRANSITION_TIMEOUT,
            )?,
            validation_interval: duration(
                "validation_interval",
                &self.validation_interval,
                DEFAULT_VALIDATION_INTERVAL,
            )?,
            lock_warn_threshold: duration(
                "lock_warn_threshold",
                &self.lock_warn_threshold,
                DEFAULT_LOCK_WARN_THRESHOLD,
            )?,
        })
    }
}

/// Parses a human duration like "250ms", falling back to the default if unset.
fn duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    value.as_ref().map_or(Ok(default), |value| {
        DurationString::from_string(value.clone())
            .map(Duration::from)
            .map_err(|_| ConfigError::Duration {
                field,
                value: value.clone(),
            })
    })
}

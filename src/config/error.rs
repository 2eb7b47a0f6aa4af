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
/// Typed error for config load/parse failures so callers can distinguish
/// e.g. file-not-found from invalid values without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid duration {value:?} for {field}")]
    Duration { field: &'static str, value: String },
    #[error("tick_rate must be greater than zero")]
    ZeroTickRate,
    #[error("light {0} is defined more than once")]
    DuplicateLight(String),
    #[error("group {group} refers to unknown light {light}")]
    UnknownGroupMember { group: String, light: String },
    #[error(transparent)]
    Dmx(#[from] crate::dmx::DmxError),
}

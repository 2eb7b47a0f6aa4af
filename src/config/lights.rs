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
use serde::Deserialize;

use super::error::ConfigError;
use crate::dmx::{ChannelLayout, PatchEntry};
use crate::lighting::TrackedLight;

/// The layout assumed when a light's patch doesn't name one.
pub const DEFAULT_CHANNEL_LAYOUT: ChannelLayout = ChannelLayout::Rgbi;

/// A YAML representation of a single light.
#[derive(Deserialize, Clone)]
pub(crate) struct Light {
    id: String,
    /// Ordinal position. Defaults to the light's index in the list.
    position: Option<u32>,
    /// Home pan and tilt for moving heads.
    pan: Option<i32>,
    tilt: Option<i32>,
    /// Groups this light belongs to.
    groups: Option<Vec<String>>,
    /// Where the light is patched. Unpatched lights still take part in
    /// effects, they just aren't sent anywhere.
    dmx: Option<LightPatch>,
}

/// A YAML representation of a light's DMX address.
#[derive(Deserialize, Clone)]
pub(crate) struct LightPatch {
    universe: u32,
    address: u16,
    layout: Option<String>,
}

impl Light {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn groups(&self) -> &[String] {
        self.groups.as_deref().unwrap_or_default()
    }

    /// Converts the configuration into a tracked light.
    pub(crate) fn tracked(&self, index: usize) -> TrackedLight {
        let position = self
            .position
            .unwrap_or_else(|| u32::try_from(index).unwrap_or(u32::MAX));
        TrackedLight::new(self.id.clone(), position).with_home(self.pan, self.tilt)
    }

    /// Converts the configured DMX address, if any, into a patch entry.
    pub(crate) fn patch_entry(&self) -> Result<Option<PatchEntry>, ConfigError> {
        let Some(patch) = &self.dmx else {
            return Ok(None);
        };
        let layout = match &patch.layout {
            Some(layout) => layout.parse()?,
            None => DEFAULT_CHANNEL_LAYOUT,
        };
        Ok(Some(PatchEntry {
            universe: patch.universe,
            address: patch.address,
            layout,
        }))
    }
}

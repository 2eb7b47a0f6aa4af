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
//! YAML configuration of the lighting rig: engine tuning, the lights and
//! their groups, and DMX output.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::dmx::Patch;
use crate::lighting::inventory::LightInventory;
use crate::lighting::EngineSettings;

mod dmx;
mod engine;
mod error;
mod lights;

pub use dmx::{DEFAULT_FRAME_BUFFER, DEFAULT_OLA_PORT};
pub use error::ConfigError;
pub use lights::DEFAULT_CHANNEL_LAYOUT;

/// The configuration for a lighting rig.
#[derive(Deserialize)]
pub struct Rig {
    /// Engine tuning.
    engine: Option<engine::Engine>,
    /// The lights, in any order.
    lights: Vec<lights::Light>,
    /// Named groups of light ids, in addition to the groups lights declare.
    groups: Option<HashMap<String, Vec<String>>>,
    /// DMX output.
    dmx: Option<dmx::Dmx>,
}

impl Rig {
    /// Parse a rig from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Rig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Rig>()?)
    }

    /// Parse a rig from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Rig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Rig>()?)
    }

    /// Gets the engine settings.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        self.engine.clone().unwrap_or_default().settings()
    }

    /// Builds the light inventory. Light ids must be unique and every group
    /// member must be a known light.
    pub fn inventory(&self) -> Result<LightInventory, ConfigError> {
        let mut ids = BTreeSet::new();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        let mut tracked = Vec::with_capacity(self.lights.len());

        for (index, light) in self.lights.iter().enumerate() {
            if !ids.insert(light.id()) {
                return Err(ConfigError::DuplicateLight(light.id().to_string()));
            }
            for group in light.groups() {
                groups
                    .entry(group.to_lowercase())
                    .or_default()
                    .push(light.id().to_string());
            }
            tracked.push(light.tracked(index));
        }

        for (group, members) in self.groups.iter().flatten() {
            if let Some(unknown) = members.iter().find(|id| !ids.contains(id.as_str())) {
                return Err(ConfigError::UnknownGroupMember {
                    group: group.clone(),
                    light: unknown.clone(),
                });
            }
            let entry = groups.entry(group.to_lowercase()).or_default();
            for member in members {
                if !entry.contains(member) {
                    entry.push(member.clone());
                }
            }
        }

        Ok(LightInventory::new(tracked, groups))
    }

    /// Builds the DMX patch from every light that declares an address.
    pub fn patch(&self) -> Result<Patch, ConfigError> {
        let mut patch = Patch::new();
        for light in &self.lights {
            if let Some(entry) = light.patch_entry()? {
                patch.insert(light.id(), entry)?;
            }
        }
        Ok(patch)
    }

    /// Gets the OLA port.
    pub fn ola_port(&self) -> u16 {
        self.dmx.clone().unwrap_or_default().ola_port()
    }

    /// Gets how many frames may queue for the DMX output thread.
    pub fn frame_buffer(&self) -> usize {
        self.dmx.clone().unwrap_or_default().frame_buffer()
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::dmx::{ChannelLayout, DmxError, PatchEntry};

    const RIG: &str = r#"
engine:
  tick_rate: 40
  layer_grace_period: 1s
lights:
  - id: left
    position: 2
    groups: [front]
    dmx: { universe: 1, address: 1, layout: rgb }
  - id: right
    position: 1
    pan: -100
    tilt: 200
    groups: [front, movers]
    dmx: { universe: 1, address: 4, layout: rgbi-pt }
  - id: back
    dmx: { universe: 2, address: 10 }
  - id: spare
groups:
  wash: [back, left]
dmx:
  ola_port: 9100
"#;

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rig.yaml");
        fs::write(&path, RIG).unwrap();

        let rig = Rig::deserialize(&path).unwrap();
        let settings = rig.engine_settings().unwrap();
        assert_eq!(settings.tick_rate, 40);
        assert_eq!(settings.layer_grace_period, Duration::from_secs(1));
        assert_eq!(rig.ola_port(), 9100);
        assert_eq!(rig.frame_buffer(), DEFAULT_FRAME_BUFFER);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Rig::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_inventory() {
        let inventory = Rig::from_yaml(RIG).unwrap().inventory().unwrap();

        // "back" and "spare" default to their list index, and ties sort by id.
        assert_eq!(inventory.ids(), vec!["right", "back", "left", "spare"]);
        let right = inventory.get("right").unwrap();
        assert_eq!((right.pan, right.tilt), (Some(-100), Some(200)));

        let ids = |selector: &str| -> Vec<String> {
            inventory.select(selector).into_iter().map(|l| l.id).collect()
        };
        assert_eq!(ids("front"), vec!["right", "left"]);
        assert_eq!(ids("movers"), vec!["right"]);
        assert_eq!(ids("wash"), vec!["back", "left"]);
    }

    #[test]
    fn test_inventory_errors() {
        let duplicate = Rig::from_yaml("lights: [{ id: a }, { id: a }]").unwrap();
        assert!(matches!(
            duplicate.inventory(),
            Err(ConfigError::DuplicateLight(id)) if id == "a"
        ));

        let unknown = Rig::from_yaml("lights: [{ id: a }]\ngroups:\n  g: [a, b]").unwrap();
        assert!(matches!(
            unknown.inventory(),
            Err(ConfigError::UnknownGroupMember { light, .. }) if light == "b"
        ));
    }

    #[test]
    fn test_patch() {
        let patch = Rig::from_yaml(RIG).unwrap().patch().unwrap();
        assert_eq!(patch.len(), 3);
        assert_eq!(
            patch.get("right"),
            Some(&PatchEntry {
                universe: 1,
                address: 4,
                layout: ChannelLayout::RgbiPanTilt,
            })
        );
        assert_eq!(patch.get("back").unwrap().layout, DEFAULT_CHANNEL_LAYOUT);
        assert!(patch.get("spare").is_none());
    }

    #[test]
    fn test_patch_errors() {
        let overlap = Rig::from_yaml(
            r#"
lights:
  - { id: a, dmx: { universe: 1, address: 1 } }
  - { id: b, dmx: { universe: 1, address: 3 } }
"#,
        )
        .unwrap();
        assert!(matches!(
            overlap.patch(),
            Err(ConfigError::Dmx(DmxError::Overlap { .. }))
        ));

        let layout =
            Rig::from_yaml("lights: [{ id: a, dmx: { universe: 1, address: 1, layout: cmy } }]")
                .unwrap();
        assert!(matches!(
            layout.patch(),
            Err(ConfigError::Dmx(DmxError::UnknownLayout(_)))
        ));
    }
}

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
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ola::DmxBuffer;

use super::{DmxError, UNIVERSE_SIZE};
use crate::lighting::color::PAN_TILT_LIMIT;
use crate::lighting::{LightId, Rgbio};

/// How a fixture lays out its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Red, green, blue. Intensity is folded into the color channels.
    Rgb,
    /// Red, green, blue, then a dimmer channel.
    Rgbi,
    /// Dimmer channel first, then red, green, blue.
    Irgb,
    /// Red, green, blue, dimmer, then 16 bit pan and tilt (coarse, fine).
    RgbiPanTilt,
}

impl ChannelLayout {
    /// The number of consecutive channels the fixture occupies.
    pub fn width(&self) -> u16 {
        match self {
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgbi | ChannelLayout::Irgb => 4,
            ChannelLayout::RgbiPanTilt => 8,
        }
    }

    /// Encodes a color into channel values in layout order.
    pub fn encode(&self, color: &Rgbio) -> Vec<u8> {
        match self {
            ChannelLayout::Rgb => {
                let scale = |channel: u8| {
                    (f64::from(channel) * f64::from(color.intensity) / 255.0).round() as u8
                };
                vec![scale(color.red), scale(color.green), scale(color.blue)]
            }
            ChannelLayout::Rgbi => vec![color.red, color.green, color.blue, color.intensity],
            ChannelLayout::Irgb => vec![color.intensity, color.red, color.green, color.blue],
            ChannelLayout::RgbiPanTilt => {
                let [pan_coarse, pan_fine] = wide(color.pan);
                let [tilt_coarse, tilt_fine] = wide(color.tilt);
                vec![
                    color.red,
                    color.green,
                    color.blue,
                    color.intensity,
                    pan_coarse,
                    pan_fine,
                    tilt_coarse,
                    tilt_fine,
                ]
            }
        }
    }
}

/// Maps a signed pan/tilt value onto a 16 bit channel pair. Unset is center.
fn wide(value: Option<i32>) -> [u8; 2] {
    let value = value.unwrap_or(0).clamp(-PAN_TILT_LIMIT, PAN_TILT_LIMIT);
    // The clamp keeps this inside 1..=65535.
    ((value + 32768) as u16).to_be_bytes()
}

impl FromStr for ChannelLayout {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelLayout::Rgb),
            "rgbi" => Ok(ChannelLayout::Rgbi),
            "irgb" => Ok(ChannelLayout::Irgb),
            "rgbi-pt" => Ok(ChannelLayout::RgbiPanTilt),
            other => Err(DmxError::UnknownLayout(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelLayout::Rgb => "rgb",
            ChannelLayout::Rgbi => "rgbi",
            ChannelLayout::Irgb => "irgb",
            ChannelLayout::RgbiPanTilt => "rgbi-pt",
        };
        write!(f, "{}", name)
    }
}

/// Where a light lives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchEntry {
    pub universe: u32,
    /// First channel, 1-based like a fixture's DIP switches.
    pub address: u16,
    pub layout: ChannelLayout,
}

impl PatchEntry {
    /// Zero based channel range occupied by this entry.
    fn channels(&self) -> std::ops::Range<usize> {
        let start = usize::from(self.address) - 1;
        start..start + usize::from(self.layout.width())
    }
}

/// The mapping from lights to DMX addresses.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    entries: BTreeMap<LightId, PatchEntry>,
}

impl Patch {
    pub fn new() -> Patch {
        Patch::default()
    }

    /// Patches a light, replacing any earlier entry for it. Entries must fit
    /// inside the universe and may not overlap another light.
    pub fn insert(
        &mut self,
        light: impl Into<LightId>,
        entry: PatchEntry,
    ) -> Result<(), DmxError> {
        let light = light.into();
        let width = entry.layout.width();
        let last = u32::from(entry.address) + u32::from(width) - 1;
        if entry.address == 0 || last > u32::from(UNIVERSE_SIZE) {
            return Err(DmxError::AddressOutOfRange {
                light,
                address: entry.address,
                width,
            });
        }

        let range = entry.channels();
        let overlapping = self.entries.iter().find(|(other, existing)| {
            **other != light
                && existing.universe == entry.universe
                && existing.channels().start < range.end
                && range.start < existing.channels().end
        });
        if let Some((other, _)) = overlapping {
            return Err(DmxError::Overlap {
                first: other.clone(),
                second: light,
                universe: entry.universe,
            });
        }

        self.entries.insert(light, entry);
        Ok(())
    }

    pub fn get(&self, light: &str) -> Option<&PatchEntry> {
        self.entries.get(light)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every universe at least one light is patched into.
    pub fn universes(&self) -> BTreeSet<u32> {
        self.entries.values().map(|entry| entry.universe).collect()
    }

    /// Renders colors into one buffer per patched universe. Patched lights
    /// without a color are written as zero. Colors for unpatched
    /// lights are ignored.
    pub fn render(&self, colors: &BTreeMap<LightId, Rgbio>) -> BTreeMap<u32, DmxBuffer> {
        let mut buffers: BTreeMap<u32, DmxBuffer> = self
            .universes()
            .into_iter()
            .map(|universe| (universe, DmxBuffer::new()))
            .collect();

        for (light, entry) in &self.entries {
            let Some(buffer) = buffers.get_mut(&entry.universe) else {
                continue;
            };
            let values = match colors.get(light) {
                Some(color) => entry.layout.encode(color),
                None => vec![0; usize::from(entry.layout.width())],
            };
            for (channel, value) in entry.channels().zip(values) {
                buffer.set_channel(channel, value);
            }
        }

        buffers
    }
}

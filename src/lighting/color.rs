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

use tracing::warn;

/// Pan and tilt are clamped to a signed range of this magnitude.
pub const PAN_TILT_LIMIT: i32 = 32767;

/// Blend mode for folding a layer into the colors beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BlendMode {
    /// Replace - the layer replaces everything beneath it, scaled by opacity
    #[default]
    Replace,
    /// Add - add the layer's channels to the ones beneath it
    Add,
    /// Multiply - multiply channels together (good for dimming)
    Multiply,
    /// Overlay - multiply in the shadows, screen in the highlights
    Overlay,
}

impl BlendMode {
    /// Parses a blend mode name. Unrecognized names are coerced to `Replace`.
    pub fn from_name(name: &str) -> BlendMode {
        match name.trim().to_ascii_lowercase().as_str() {
            "replace" => BlendMode::Replace,
            "add" => BlendMode::Add,
            "multiply" => BlendMode::Multiply,
            "overlay" => BlendMode::Overlay,
            other => {
                warn!(blend_mode = other, "Unknown blend mode, using replace");
                BlendMode::Replace
            }
        }
    }
}

/// Color state of a single light on a single layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgbio {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub intensity: u8,
    pub opacity: f64, // 0.0 to 1.0
    pub blend_mode: BlendMode,
    pub pan: Option<i32>,
    pub tilt: Option<i32>,
}

impl Default for Rgbio {
    fn default() -> Self {
        Self::transparent()
    }
}

impl Rgbio {
    /// An opaque color that replaces whatever is beneath it.
    pub fn new(red: u8, green: u8, blue: u8, intensity: u8) -> Self {
        Self {
            red,
            green,
            blue,
            intensity,
            opacity: 1.0,
            blend_mode: BlendMode::Replace,
            pan: None,
            tilt: None,
        }
    }

    /// Opaque black. This is what lights show when nothing else is running.
    pub fn black() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Fully transparent black, the identity for compositing.
    pub fn transparent() -> Self {
        Self {
            opacity: 0.0,
            ..Self::black()
        }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = clamp_opacity(opacity);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_pan_tilt(mut self, pan: Option<i32>, tilt: Option<i32>) -> Self {
        self.pan = pan.map(clamp_pan_tilt);
        self.tilt = tilt.map(clamp_pan_tilt);
        self
    }

    /// Opaque black that keeps this color's pan and tilt.
    pub fn blacked_out(&self) -> Self {
        Self::black().with_pan_tilt(self.pan, self.tilt)
    }

    /// Parses a `#rrggbb` hex string into an opaque, full intensity color.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }

        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b, u8::MAX))
    }

    /// Looks up a named color, falling back to hex parsing.
    pub fn from_name(name: &str) -> Option<Self> {
        let (r, g, b) = match name.trim().to_lowercase().as_str() {
            "red" => (255, 0, 0),
            "green" => (0, 255, 0),
            "blue" => (0, 0, 255),
            "white" => (255, 255, 255),
            "black" => return Some(Self::black()),
            "yellow" => (255, 255, 0),
            "cyan" => (0, 255, 255),
            "magenta" => (255, 0, 255),
            "orange" => (255, 165, 0),
            "purple" => (128, 0, 128),
            other => return Self::from_hex(other),
        };
        Some(Self::new(r, g, b, u8::MAX))
    }

    /// Returns true if the red, green, blue and intensity channels match.
    pub fn same_channels(&self, other: &Rgbio) -> bool {
        self.red == other.red
            && self.green == other.green
            && self.blue == other.blue
            && self.intensity == other.intensity
    }

    /// Clamps opacity, pan and tilt back into range. Returns the sanitized
    /// color and whether anything had to change.
    pub fn sanitized(&self) -> (Rgbio, bool) {
        let mut fixed = *self;
        fixed.opacity = clamp_opacity(self.opacity);
        fixed.pan = self.pan.map(clamp_pan_tilt);
        fixed.tilt = self.tilt.map(clamp_pan_tilt);
        // NaN never compares equal, so compare the raw bits for opacity.
        let changed = fixed.opacity.to_bits() != self.opacity.to_bits()
            || fixed.pan != self.pan
            || fixed.tilt != self.tilt;
        (fixed, changed)
    }

    /// Interpolates from `self` toward `target`. Channels are rounded and
    /// clamped; opacity, blend mode, pan and tilt come from the target.
    pub fn lerp(&self, target: &Rgbio, t: f64) -> Rgbio {
        let t = if t.is_nan() { 1.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| clamp_channel(f64::from(a) + (f64::from(b) - f64::from(a)) * t);

        Rgbio {
            red: mix(self.red, target.red),
            green: mix(self.green, target.green),
            blue: mix(self.blue, target.blue),
            intensity: mix(self.intensity, target.intensity),
            opacity: clamp_opacity(target.opacity),
            blend_mode: target.blend_mode,
            pan: target.pan.map(clamp_pan_tilt),
            tilt: target.tilt.map(clamp_pan_tilt),
        }
    }

    /// Folds `layer` on top of `self` using the layer's blend mode.
    pub fn blend(&self, layer: &Rgbio) -> Rgbio {
        let opacity = clamp_opacity(layer.opacity);

        let mut blended = match layer.blend_mode {
            BlendMode::Replace => {
                if opacity <= 0.0 {
                    return *self;
                }
                // Opacity scales the brightness of a full replacement.
                let scale = |l: u8| clamp_channel(f64::from(l) * opacity);
                Rgbio {
                    red: scale(layer.red),
                    green: scale(layer.green),
                    blue: scale(layer.blue),
                    intensity: scale(layer.intensity),
                    opacity,
                    ..*self
                }
            }
            BlendMode::Add => self.combine(layer, opacity, |c, l| c + (l * opacity).round()),
            BlendMode::Multiply => self.combine(layer, opacity, |c, l| c * l * opacity / 255.0),
            BlendMode::Overlay => self.combine(layer, opacity, |c, l| {
                let base = c / 255.0;
                let top = l / 255.0;
                let overlaid = if base < 0.5 {
                    2.0 * base * top
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - top)
                };
                c + (overlaid * 255.0 - c) * opacity
            }),
        };

        if layer.pan.is_some() {
            blended.pan = layer.pan.map(clamp_pan_tilt);
        }
        if layer.tilt.is_some() {
            blended.tilt = layer.tilt.map(clamp_pan_tilt);
        }
        blended
    }

    fn combine<F>(&self, layer: &Rgbio, opacity: f64, op: F) -> Rgbio
    where
        F: Fn(f64, f64) -> f64,
    {
        let channel = |c: u8, l: u8| clamp_channel(op(f64::from(c), f64::from(l)));
        Rgbio {
            red: channel(self.red, layer.red),
            green: channel(self.green, layer.green),
            blue: channel(self.blue, layer.blue),
            intensity: channel(self.intensity, layer.intensity),
            opacity: clamp_opacity(self.opacity).max(opacity),
            ..*self
        }
    }
}

#[inline]
pub fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub fn clamp_opacity(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[inline]
pub fn clamp_pan_tilt(value: i32) -> i32 {
    value.clamp(-PAN_TILT_LIMIT, PAN_TILT_LIMIT)
}

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

use std::f64::consts::PI;

use tracing::warn;

/// Easing curves applied to interpolation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Easing {
    #[default]
    Linear,
    /// Quadratic ease in (slow start)
    EaseIn,
    /// Quadratic ease out (slow finish)
    EaseOut,
    /// Smooth ease in and out using a half cosine
    EaseInOut,
    /// Fast start that settles logarithmically
    Logarithmic,
}

impl Easing {
    /// Parses an easing name. Unknown names fall back to linear.
    pub fn from_name(name: &str) -> Easing {
        let normalized = name
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '_' || c == ' ', "-");
        match normalized.as_str() {
            "linear" => Easing::Linear,
            "ease-in" | "easein" | "exponential" => Easing::EaseIn,
            "ease-out" | "easeout" => Easing::EaseOut,
            "ease-in-out" | "easeinout" | "sine" => Easing::EaseInOut,
            "logarithmic" | "log" => Easing::Logarithmic,
            other => {
                warn!(easing = other, "Unknown easing, using linear");
                Easing::Linear
            }
        }
    }

    /// Maps linear progress (0.0 to 1.0) onto this curve.
    pub fn apply(&self, progress: f64) -> f64 {
        let t = if progress.is_nan() {
            1.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t).powi(2),
            Easing::EaseInOut => (1.0 - (t * PI).cos()) / 2.0,
            // log(1 + 9x) / log(10) maps [0,1] onto [0,1]
            Easing::Logarithmic => (1.0 + 9.0 * t).log10(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL: [Easing; 5] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
        Easing::Logarithmic,
    ];

    #[test]
    fn test_endpoints_are_fixed() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-9, "{:?} at 0", easing);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9, "{:?} at 1", easing);
        }
    }

    #[test]
    fn test_out_of_range_progress_is_clamped() {
        for easing in ALL {
            assert!((0.0..=1.0).contains(&easing.apply(-4.0)));
            assert!((0.0..=1.0).contains(&easing.apply(12.0)));
            assert_eq!(easing.apply(f64::NAN), easing.apply(1.0));
        }
    }

    #[test]
    fn test_curves_are_monotonic() {
        for easing in ALL {
            let mut last = 0.0;
            for step in 0..=100 {
                let value = easing.apply(f64::from(step) / 100.0);
                assert!(value + 1e-12 >= last, "{:?} decreased at {}", easing, step);
                last = value;
            }
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Easing::from_name("ease_in_out"), Easing::EaseInOut);
        assert_eq!(Easing::from_name("Ease-Out"), Easing::EaseOut);
        assert_eq!(Easing::from_name("sine"), Easing::EaseInOut);
        assert_eq!(Easing::from_name("bounce"), Easing::Linear);
    }
}

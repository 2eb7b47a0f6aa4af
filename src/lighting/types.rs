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

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::color::Rgbio;
use super::easing::Easing;

/// Stable identifier of a tracked light.
pub type LightId = String;

/// Layer number. Layers are blended in ascending order.
pub type Layer = u8;

/// The base layer. Never garbage collected.
pub const BASE_LAYER: Layer = 0;
/// Standard effect layers.
pub const STANDARD_LAYERS: std::ops::RangeInclusive<Layer> = 1..=99;
/// High priority "flash" layers.
pub const FLASH_LAYERS: std::ops::RangeInclusive<Layer> = 100..=199;
/// The system-wide blackout override.
pub const BLACKOUT_LAYER: Layer = 200;
/// The strobe layer sits above everything, including blackout.
pub const STROBE_LAYER: Layer = 255;

/// True for the layers between blackout and strobe, which effects may not use.
pub fn is_reserved_layer(layer: Layer) -> bool {
    !(layer == BASE_LAYER
        || STANDARD_LAYERS.contains(&layer)
        || FLASH_LAYERS.contains(&layer)
        || layer == BLACKOUT_LAYER
        || layer == STROBE_LAYER)
}

/// A light known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedLight {
    pub id: LightId,
    /// Ordinal position, used for sorting and selection.
    pub position: u32,
    /// Home pan, used when a transform doesn't specify one.
    pub pan: Option<i32>,
    /// Home tilt, used when a transform doesn't specify one.
    pub tilt: Option<i32>,
}

impl TrackedLight {
    pub fn new(id: impl Into<LightId>, position: u32) -> Self {
        Self {
            id: id.into(),
            position,
            pan: None,
            tilt: None,
        }
    }

    pub fn with_home(mut self, pan: Option<i32>, tilt: Option<i32>) -> Self {
        self.pan = pan;
        self.tilt = tilt;
        self
    }
}

/// External events produced by the game engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameEvent {
    Beat,
    Measure,
    Keyframe,
    DrumRed,
    DrumYellow,
    DrumBlue,
    DrumGreen,
    DrumKick,
    /// Any event name the engine doesn't know about.
    Other(String),
}

impl GameEvent {
    /// Builds an event from a name. Known names map to their variant and
    /// anything else becomes a normalized `Other`.
    pub fn named(name: &str) -> GameEvent {
        match name.trim().to_ascii_lowercase().as_str() {
            "beat" => GameEvent::Beat,
            "measure" => GameEvent::Measure,
            "keyframe" => GameEvent::Keyframe,
            "drum-red" => GameEvent::DrumRed,
            "drum-yellow" => GameEvent::DrumYellow,
            "drum-blue" => GameEvent::DrumBlue,
            "drum-green" => GameEvent::DrumGreen,
            "drum-kick" => GameEvent::DrumKick,
            other => GameEvent::Other(other.to_string()),
        }
    }

    /// Compares events by name, so an `Other` built by hand still matches
    /// the same event parsed from a string.
    pub fn same_as(&self, other: &GameEvent) -> bool {
        match (self, other) {
            (GameEvent::Other(a), GameEvent::Other(b)) => {
                a.trim().eq_ignore_ascii_case(b.trim())
            }
            (GameEvent::Other(name), known) | (known, GameEvent::Other(name)) => {
                GameEvent::named(name) == *known
            }
            _ => self == other,
        }
    }
}

impl FromStr for GameEvent {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GameEvent::named(s))
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameEvent::Beat => "beat",
            GameEvent::Measure => "measure",
            GameEvent::Keyframe => "keyframe",
            GameEvent::DrumRed => "drum-red",
            GameEvent::DrumYellow => "drum-yellow",
            GameEvent::DrumBlue => "drum-blue",
            GameEvent::DrumGreen => "drum-green",
            GameEvent::DrumKick => "drum-kick",
            GameEvent::Other(name) => name,
        };
        write!(f, "{}", name)
    }
}

/// A gate that must open before a transition starts or after it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WaitCondition {
    #[default]
    None,
    Delay(Duration),
    Event(GameEvent),
}

impl WaitCondition {
    /// True if this gate opens on its own after a known amount of time.
    pub fn is_time_based(&self) -> bool {
        !matches!(self, WaitCondition::Event(_))
    }

    /// The fixed delay of a time based gate. Event gates report zero.
    pub fn delay(&self) -> Duration {
        match self {
            WaitCondition::Delay(delay) => *delay,
            _ => Duration::ZERO,
        }
    }

    /// True if this gate is waiting on the given event.
    pub fn matches(&self, event: &GameEvent) -> bool {
        matches!(self, WaitCondition::Event(expected) if expected.same_as(event))
    }
}

/// The color change a transition performs.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub color: Rgbio,
    pub easing: Easing,
    pub duration: Duration,
}

/// One timed color change plus its entry and exit gates.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub lights: Vec<TrackedLight>,
    pub layer: Layer,
    pub wait_for: WaitCondition,
    pub transform: Transform,
    pub wait_until: WaitCondition,
}

impl Transition {
    /// A linear, ungated transition.
    pub fn new(lights: Vec<TrackedLight>, layer: Layer, color: Rgbio, duration: Duration) -> Self {
        Self {
            lights,
            layer,
            wait_for: WaitCondition::None,
            transform: Transform {
                color,
                easing: Easing::Linear,
                duration,
            },
            wait_until: WaitCondition::None,
        }
    }

    pub fn with_wait_for(mut self, wait_for: WaitCondition) -> Self {
        self.wait_for = wait_for;
        self
    }

    pub fn with_wait_until(mut self, wait_until: WaitCondition) -> Self {
        self.wait_until = wait_until;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.transform.easing = easing;
        self
    }
}

/// A named, reusable bundle of transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub id: String,
    pub description: String,
    pub transitions: Vec<Transition>,
}

impl Effect {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            transitions: Vec::new(),
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Every layer this effect touches.
    pub fn layers(&self) -> BTreeSet<Layer> {
        self.transitions.iter().map(|t| t.layer).collect()
    }

    /// Every light this effect touches, in order of first appearance.
    pub fn lights(&self) -> Vec<&TrackedLight> {
        let mut seen = BTreeSet::new();
        self.transitions
            .iter()
            .flat_map(|t| t.lights.iter())
            .filter(|light| seen.insert(light.id.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_game_event_names() {
        for name in ["beat", "measure", "keyframe", "drum-red", "drum-kick"] {
            let event: GameEvent = name.parse().unwrap();
            assert_eq!(event.to_string(), name);
        }
        assert_eq!(
            "Star-Power".parse::<GameEvent>().unwrap(),
            GameEvent::Other("star-power".to_string())
        );
    }

    #[test]
    fn test_hand_built_events_match_parsed_ones() {
        let gate = WaitCondition::Event(GameEvent::Other("Drum-Open".to_string()));
        assert!(gate.matches(&"drum-open".parse().unwrap()));
        assert!(gate.matches(&GameEvent::named(" DRUM-OPEN ")));
        assert!(!gate.matches(&GameEvent::named("drum-close")));

        // An `Other` spelling a known event is that event.
        let beat = WaitCondition::Event(GameEvent::Other("Beat".to_string()));
        assert!(beat.matches(&GameEvent::Beat));
        assert!(WaitCondition::Event(GameEvent::Beat).matches(&GameEvent::Other("beat".into())));
        assert_eq!(GameEvent::named("Star-Power"), GameEvent::Other("star-power".into()));
    }

    #[test]
    fn test_wait_condition() {
        assert!(WaitCondition::None.is_time_based());
        assert!(WaitCondition::Delay(Duration::from_millis(5)).is_time_based());
        assert!(!WaitCondition::Event(GameEvent::Beat).is_time_based());
        assert!(WaitCondition::Event(GameEvent::Beat).matches(&GameEvent::Beat));
        assert!(!WaitCondition::Event(GameEvent::Beat).matches(&GameEvent::Measure));
        assert!(!WaitCondition::None.matches(&GameEvent::Beat));
    }

    #[test]
    fn test_effect_lights_in_first_appearance_order() {
        let a = TrackedLight::new("a", 2);
        let b = TrackedLight::new("b", 0);
        let effect = Effect::new("chase", "")
            .with_transition(Transition::new(
                vec![b.clone(), a.clone()],
                1,
                Rgbio::black(),
                Duration::ZERO,
            ))
            .with_transition(Transition::new(
                vec![a.clone()],
                3,
                Rgbio::black(),
                Duration::ZERO,
            ));

        let ids: Vec<&str> = effect.lights().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(effect.layers().into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }
}

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

//! Absolute cycle timing for looped effects.
//!
//! The first time an effect name starts, its cycle length and per-light phase
//! step are recorded, either from the caller or by walking each light's
//! transition chain. Effects with an event-gated wait anywhere have no
//! determinable cycle and are recorded as such.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::lighting::instance::CycleTiming;
use crate::lighting::types::Effect;

/// Caller-supplied cycle information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleHint {
    pub cycle_duration: Duration,
    pub per_light_offset: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleEntry {
    pub cycle_start: Instant,
    pub cycle_duration: Duration,
    pub per_light_offset: Duration,
}

impl CycleEntry {
    /// Timing for the light at `index` in the effect's light order.
    pub fn for_light(&self, index: usize) -> CycleTiming {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        CycleTiming {
            cycle_start: self.cycle_start,
            cycle_duration: self.cycle_duration,
            phase_offset: self.per_light_offset.saturating_mul(index),
        }
    }
}

#[derive(Debug, Default)]
pub struct TimingRegistry {
    entries: HashMap<String, Option<CycleEntry>>,
}

impl TimingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cycle entry for `name`, recording one on first use.
    pub fn resolve(
        &mut self,
        name: &str,
        effect: &Effect,
        hint: Option<CycleHint>,
        now: Instant,
    ) -> Option<CycleEntry> {
        *self.entries.entry(name.to_string()).or_insert_with(|| {
            let derived = hint.or_else(|| derive_cycle(effect));
            debug!(name, ?derived, "Recorded cycle timing");
            derived.map(|hint| CycleEntry {
                cycle_start: now,
                cycle_duration: hint.cycle_duration,
                per_light_offset: hint.per_light_offset,
            })
        })
    }

    pub fn get(&self, name: &str) -> Option<CycleEntry> {
        self.entries.get(name).copied().flatten()
    }

    /// Shifts the recorded cycle start by `delta_ms`.
    pub fn nudge(&mut self, name: &str, delta_ms: i64) -> Option<CycleEntry> {
        let entry = self.entries.get_mut(name)?.as_mut()?;
        let delta = Duration::from_millis(delta_ms.unsigned_abs());
        let shifted = if delta_ms >= 0 {
            entry.cycle_start.checked_add(delta)
        } else {
            entry.cycle_start.checked_sub(delta)
        }?;
        entry.cycle_start = shifted;
        Some(*entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Works out the cycle of an effect from its transitions. Only possible when
/// every wait is time based.
pub fn derive_cycle(effect: &Effect) -> Option<CycleHint> {
    let time_based = effect
        .transitions
        .iter()
        .all(|t| t.wait_for.is_time_based() && t.wait_until.is_time_based());
    if !time_based {
        return None;
    }

    let lights = effect.lights();
    let chain_length = |light: &str| -> Duration {
        effect
            .transitions
            .iter()
            .filter(|t| t.lights.iter().any(|l| l.id == light))
            .map(|t| t.wait_for.delay() + t.transform.duration + t.wait_until.delay())
            .sum()
    };
    let leading_delay = |light: &str| -> Duration {
        effect
            .transitions
            .iter()
            .find(|t| t.lights.iter().any(|l| l.id == light))
            .map(|t| t.wait_for.delay())
            .unwrap_or_default()
    };

    let cycle_duration = lights
        .iter()
        .map(|light| chain_length(&light.id))
        .max()
        .unwrap_or_default();
    let per_light_offset = match lights.as_slice() {
        [first, second, ..] => leading_delay(&second.id).saturating_sub(leading_delay(&first.id)),
        _ => Duration::ZERO,
    };

    Some(CycleHint {
        cycle_duration,
        per_light_offset,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lighting::color::Rgbio;
    use crate::lighting::types::{GameEvent, TrackedLight, Transition, WaitCondition};

    fn chase(step: Duration) -> Effect {
        let lights: Vec<TrackedLight> = (0..4)
            .map(|i| TrackedLight::new(format!("l{}", i), i))
            .collect();
        let mut effect = Effect::new("chase", "four light chase");
        for (i, light) in lights.iter().enumerate() {
            let before = step * i as u32;
            let after = step * (3 - i as u32);
            effect = effect.with_transition(
                Transition::new(
                    vec![light.clone()],
                    1,
                    Rgbio::new(255, 255, 255, 255),
                    step,
                )
                .with_wait_for(WaitCondition::Delay(before))
                .with_wait_until(WaitCondition::Delay(after)),
            );
        }
        effect
    }

    #[test]
    fn test_derives_cycle_for_time_based_chase() {
        let step = Duration::from_millis(100);
        let hint = derive_cycle(&chase(step)).unwrap();
        assert_eq!(hint.cycle_duration, Duration::from_millis(400));
        assert_eq!(hint.per_light_offset, step);
    }

    #[test]
    fn test_event_waits_disable_timing() {
        let light = TrackedLight::new("a", 0);
        let effect = Effect::new("beat", "").with_transition(
            Transition::new(vec![light], 1, Rgbio::black(), Duration::ZERO)
                .with_wait_for(WaitCondition::Event(GameEvent::Beat)),
        );
        assert_eq!(derive_cycle(&effect), None);

        let mut registry = TimingRegistry::new();
        assert_eq!(registry.resolve("beat", &effect, None, Instant::now()), None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.nudge("beat", 10), None);
    }

    #[test]
    fn test_first_resolution_wins_and_nudges_apply() {
        let start = Instant::now();
        let effect = chase(Duration::from_millis(50));
        let mut registry = TimingRegistry::new();

        let first = registry.resolve("chase", &effect, None, start).unwrap();
        let later = start + Duration::from_secs(1);
        let second = registry.resolve("chase", &effect, None, later).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.for_light(3).phase_offset, Duration::from_millis(150));

        let nudged = registry.nudge("chase", 25).unwrap();
        assert_eq!(nudged.cycle_start, start + Duration::from_millis(25));
        let nudged = registry.nudge("chase", -50).unwrap();
        assert_eq!(nudged.cycle_start + Duration::from_millis(25), start);
    }

    #[test]
    fn test_hints_override_derivation() {
        let hint = CycleHint {
            cycle_duration: Duration::from_secs(2),
            per_light_offset: Duration::from_millis(250),
        };
        let mut registry = TimingRegistry::new();
        let entry = registry
            .resolve("chase", &chase(Duration::from_millis(10)), Some(hint), Instant::now())
            .unwrap();
        assert_eq!(entry.cycle_duration, Duration::from_secs(2));
        assert_eq!(entry.per_light_offset, Duration::from_millis(250));
    }
}

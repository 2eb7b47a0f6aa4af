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

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::color::Rgbio;
use super::types::{Effect, Layer, LightId, TrackedLight, Transform, Transition, WaitCondition};

/// One transition as seen by a single light.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionStep {
    pub wait_for: WaitCondition,
    pub transform: Transform,
    pub wait_until: WaitCondition,
}

impl TransitionStep {
    /// Copies a transition for one light, filling in the light's home pan and
    /// tilt where the transform leaves them unset.
    pub fn for_light(transition: &Transition, light: &TrackedLight) -> Self {
        let mut transform = transition.transform.clone();
        if transform.color.pan.is_none() && light.pan.is_some() {
            transform.color = transform.color.with_pan_tilt(light.pan, transform.color.tilt);
        }
        if transform.color.tilt.is_none() && light.tilt.is_some() {
            transform.color = transform.color.with_pan_tilt(transform.color.pan, light.tilt);
        }

        Self {
            wait_for: transition.wait_for.clone(),
            transform,
            wait_until: transition.wait_until.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Idle,
    WaitingFor,
    Transitioning,
    WaitingUntil,
}

/// Absolute cycle timing for looped multi-light effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub cycle_start: Instant,
    pub cycle_duration: Duration,
    pub phase_offset: Duration,
}

impl CycleTiming {
    /// Where this light sits in its cycle at `now`.
    pub fn phase_at(&self, now: Instant) -> Duration {
        if self.cycle_duration.is_zero() {
            return Duration::ZERO;
        }
        let elapsed = now.saturating_duration_since(self.cycle_start) + self.phase_offset;
        let cycle = self.cycle_duration.as_nanos();
        Duration::from_nanos((elapsed.as_nanos() % cycle) as u64)
    }
}

/// A running effect on one (layer, light) slot.
#[derive(Debug, Clone)]
pub struct EffectInstance {
    pub name: String,
    pub effect: Arc<Effect>,
    pub light: LightId,
    pub layer: Layer,
    steps: Vec<TransitionStep>,
    index: usize,
    pub state: InstanceState,
    pub transition_started: Option<Instant>,
    pub deadline: Option<Instant>,
    pub persistent: bool,
    pub last_end_state: Option<Rgbio>,
    pub cycle: Option<CycleTiming>,
}

impl EffectInstance {
    /// Flattens the effect's transitions for `light` on `layer`.
    pub fn new(
        name: impl Into<String>,
        effect: Arc<Effect>,
        light: &TrackedLight,
        layer: Layer,
        persistent: bool,
    ) -> Self {
        let steps = effect
            .transitions
            .iter()
            .filter(|t| t.layer == layer && t.lights.iter().any(|l| l.id == light.id))
            .map(|t| TransitionStep::for_light(t, light))
            .collect();

        Self {
            name: name.into(),
            effect,
            light: light.id.clone(),
            layer,
            steps,
            index: 0,
            state: InstanceState::Idle,
            transition_started: None,
            deadline: None,
            persistent,
            last_end_state: None,
            cycle: None,
        }
    }

    pub fn with_cycle(mut self, cycle: Option<CycleTiming>) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn steps(&self) -> &[TransitionStep] {
        &self.steps
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current_step(&self) -> Option<&TransitionStep> {
        self.steps.get(self.index)
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.steps.len()
    }

    /// Moves on to the next transition. The index only ever grows.
    pub fn advance_index(&mut self) {
        if !self.is_complete() {
            self.index += 1;
        }
        self.state = InstanceState::Idle;
        self.deadline = None;
        self.transition_started = None;
    }

    /// A fresh copy used when a persistent instance loops.
    pub fn restarted(&self) -> Self {
        Self {
            name: self.name.clone(),
            effect: self.effect.clone(),
            light: self.light.clone(),
            layer: self.layer,
            steps: self.steps.clone(),
            index: 0,
            state: InstanceState::Idle,
            transition_started: None,
            deadline: None,
            persistent: self.persistent,
            last_end_state: None,
            cycle: self.cycle,
        }
    }
}

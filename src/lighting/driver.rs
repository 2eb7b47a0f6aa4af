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

use std::time::Instant;

use tracing::{debug, trace, warn};

use super::color::Rgbio;
use super::compositor::Compositor;
use super::instance::{EffectInstance, InstanceState};
use super::registry::{LayerRegistry, Slot};
use super::types::{GameEvent, WaitCondition, BASE_LAYER};

/// Upper bound on state changes for one slot in one pass. Only a looping
/// effect with no time in it can reach this.
const MAX_STEPS_PER_PASS: usize = 64;

/// Advances effect instances through their state machines. Borrowed for the
/// length of a single pass over the registry and compositor.
pub struct Driver<'a> {
    registry: &'a mut LayerRegistry,
    compositor: &'a mut Compositor,
    now: Instant,
}

/// What an instance is waiting on, resolved against the current time.
enum Gate {
    /// Open since the given moment.
    Open(Instant),
    Closed,
}

/// What a delivered event does to a waiting instance.
enum Release {
    Begin,
    Advance,
}

impl<'a> Driver<'a> {
    pub fn new(registry: &'a mut LayerRegistry, compositor: &'a mut Compositor, now: Instant) -> Self {
        Self {
            registry,
            compositor,
            now,
        }
    }

    /// Installs an instance on its slot and runs it as far as it can go now.
    pub fn start(&mut self, slot: Slot, mut instance: EffectInstance) {
        instance.state = InstanceState::Idle;
        self.registry.insert_active(slot.clone(), instance);
        self.process(&slot);
    }

    /// Advances every active instance.
    pub fn tick(&mut self) {
        for slot in self.registry.active_slots() {
            self.process(&slot);
        }
    }

    /// Releases every instance waiting on `event`. Returns how many moved.
    pub fn deliver(&mut self, event: &GameEvent) -> usize {
        let mut released = 0;
        for slot in self.registry.active_slots() {
            let Some(release) = self.release_for(&slot, event) else {
                continue;
            };
            match release {
                Release::Begin => self.begin_transition(&slot, self.now),
                Release::Advance => self.advance(&slot),
            }
            released += 1;
            self.process(&slot);
        }

        if released > 0 {
            debug!(%event, released, "Delivered event");
        }
        released
    }

    fn release_for(&self, slot: &Slot, event: &GameEvent) -> Option<Release> {
        let instance = self.registry.active(slot)?;
        let step = instance.current_step()?;
        match instance.state {
            InstanceState::WaitingFor if step.wait_for.matches(event) => Some(Release::Begin),
            InstanceState::WaitingUntil if step.wait_until.matches(event) => Some(Release::Advance),
            _ => None,
        }
    }

    fn process(&mut self, slot: &Slot) {
        for _ in 0..MAX_STEPS_PER_PASS {
            if !self.step(slot) {
                return;
            }
        }
        warn!(
            layer = slot.layer,
            light = slot.light.as_str(),
            "Effect made no progress in time, deferring to the next tick"
        );
    }

    /// Makes one state change if one is due. Returns false when the instance
    /// has to wait.
    fn step(&mut self, slot: &Slot) -> bool {
        let Some(instance) = self.registry.active(slot) else {
            return false;
        };
        let state = instance.state;
        let complete = instance.is_complete();
        let gate = self.gate(instance.deadline);

        match (state, gate) {
            (InstanceState::Idle, _) if complete => self.complete(slot),
            (InstanceState::Idle, _) => self.enter_wait_for(slot),
            (InstanceState::WaitingFor, Gate::Open(at)) => self.begin_transition(slot, at),
            (InstanceState::Transitioning, Gate::Open(at)) => self.enter_wait_until(slot, at),
            (InstanceState::WaitingUntil, Gate::Open(_)) => self.advance(slot),
            (_, Gate::Closed) => return false,
        }
        true
    }

    fn gate(&self, deadline: Option<Instant>) -> Gate {
        match deadline {
            Some(deadline) if deadline <= self.now => Gate::Open(deadline),
            _ => Gate::Closed,
        }
    }

    /// Arms the wait-for gate of the current step. Event gates have no
    /// deadline and wait for `deliver`.
    fn enter_wait_for(&mut self, slot: &Slot) {
        let now = self.now;
        let Some(instance) = self.registry.active_mut(slot) else {
            return;
        };
        let base = instance.deadline.unwrap_or(now);
        instance.deadline = instance
            .current_step()
            .and_then(|step| arm(&step.wait_for, base));
        instance.state = InstanceState::WaitingFor;
    }

    /// Hands the current step to the compositor. `at` is when the wait-for
    /// gate opened, so timing does not drift with the tick rate.
    fn begin_transition(&mut self, slot: &Slot, at: Instant) {
        let Some(instance) = self.registry.active(slot) else {
            return;
        };
        let Some(step) = instance.current_step() else {
            return;
        };
        let transform = step.transform.clone();

        let start = instance
            .last_end_state
            .or_else(|| self.registry.snapshot(slot))
            .or_else(|| self.compositor.layer_color(&slot.light, slot.layer))
            .unwrap_or_else(Rgbio::transparent);

        if !self.compositor.begin(
            &slot.light,
            slot.layer,
            Some(start),
            transform.color,
            transform.duration,
            transform.easing,
            at,
        ) {
            debug!(
                layer = slot.layer,
                light = slot.light.as_str(),
                "Compositor busy, transition runs without output"
            );
        }

        if let Some(instance) = self.registry.active_mut(slot) {
            trace!(
                name = instance.name.as_str(),
                layer = slot.layer,
                light = slot.light.as_str(),
                "Transition started"
            );
            instance.state = InstanceState::Transitioning;
            instance.transition_started = Some(at);
            instance.deadline = Some(at + transform.duration);
        }
    }

    fn enter_wait_until(&mut self, slot: &Slot, at: Instant) {
        let Some(instance) = self.registry.active_mut(slot) else {
            return;
        };
        let Some(step) = instance.current_step() else {
            return;
        };
        let target = step.transform.color;
        let deadline = arm(&step.wait_until, at);

        instance.last_end_state = Some(target);
        instance.deadline = deadline;
        instance.state = InstanceState::WaitingUntil;
    }

    fn advance(&mut self, slot: &Slot) {
        let now = self.now;
        let Some(instance) = self.registry.active_mut(slot) else {
            return;
        };
        // Keep the time the gate opened so the next wait-for counts from it.
        let opened = instance.deadline.filter(|deadline| *deadline <= now);
        instance.advance_index();
        instance.deadline = opened;
        if instance.is_complete() {
            self.complete(slot);
        }
    }

    /// Retires a finished instance: snapshot its final color, loop it if it
    /// is persistent, then start whatever is queued behind it.
    fn complete(&mut self, slot: &Slot) {
        let Some(finished) = self.registry.take_active(slot) else {
            return;
        };
        trace!(
            name = finished.name.as_str(),
            layer = slot.layer,
            light = slot.light.as_str(),
            "Effect complete"
        );

        if let Some(color) = finished.last_end_state {
            self.registry.set_snapshot(slot.clone(), color);
        }

        if finished.persistent && self.registry.queued(slot).is_none() {
            self.registry.set_queued(slot.clone(), finished.restarted());
        }

        match self.registry.take_queued(slot) {
            Some(next) => {
                let mut next = next;
                next.state = InstanceState::Idle;
                if next.persistent && next.name == finished.name {
                    // Carry the loop point over so the next pass lines up.
                    next.deadline = finished.deadline.filter(|deadline| *deadline <= self.now);
                }
                self.registry.insert_active(slot.clone(), next);
            }
            None if slot.layer != BASE_LAYER => {
                self.compositor.remove(&slot.light, slot.layer);
                self.registry.clear_snapshot(slot);
            }
            None => {}
        }
    }
}

/// The deadline for a wait gate that starts at `base`, or None if it waits on
/// an event.
fn arm(condition: &WaitCondition, base: Instant) -> Option<Instant> {
    match condition {
        WaitCondition::None => Some(base),
        WaitCondition::Delay(delay) => Some(base + *delay),
        WaitCondition::Event(_) => None,
    }
}

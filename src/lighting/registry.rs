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

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tracing::debug;

use super::color::Rgbio;
use super::instance::EffectInstance;
use super::types::{Layer, LightId, BASE_LAYER};

/// The light id that stands for every light on a layer.
pub const ALL_LIGHTS: &str = "all";

/// A (layer, light) pair. Ordered by layer first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub layer: Layer,
    pub light: LightId,
}

impl Slot {
    pub fn new(layer: Layer, light: impl Into<LightId>) -> Self {
        Self {
            layer,
            light: light.into(),
        }
    }

    fn matches(&self, layer: Layer, light: &str) -> bool {
        self.layer == layer && (light == ALL_LIGHTS || self.light == light)
    }
}

/// Bookkeeping for active and queued effect instances. No timing logic lives
/// here: callers pass in `now` where it matters.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    active: BTreeMap<Slot, EffectInstance>,
    queued: BTreeMap<Slot, EffectInstance>,
    last_used: BTreeMap<Layer, Instant>,
    snapshots: HashMap<Slot, Rgbio>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self, slot: &Slot) -> Option<&EffectInstance> {
        self.active.get(slot)
    }

    pub fn active_mut(&mut self, slot: &Slot) -> Option<&mut EffectInstance> {
        self.active.get_mut(slot)
    }

    /// Installs an instance, returning whatever it displaced.
    pub fn insert_active(&mut self, slot: Slot, instance: EffectInstance) -> Option<EffectInstance> {
        self.active.insert(slot, instance)
    }

    pub fn take_active(&mut self, slot: &Slot) -> Option<EffectInstance> {
        self.active.remove(slot)
    }

    pub fn queued(&self, slot: &Slot) -> Option<&EffectInstance> {
        self.queued.get(slot)
    }

    /// Sets the next instance for a slot. There is only ever one; the previous
    /// queued instance is returned.
    pub fn set_queued(&mut self, slot: Slot, instance: EffectInstance) -> Option<EffectInstance> {
        self.queued.insert(slot, instance)
    }

    pub fn take_queued(&mut self, slot: &Slot) -> Option<EffectInstance> {
        self.queued.remove(slot)
    }

    /// Removes active and queued instances for a light on a layer, or for the
    /// whole layer when `light` is `"all"`. Returns the slots that had an
    /// active instance.
    pub fn remove(&mut self, layer: Layer, light: &str) -> Vec<Slot> {
        let removed: Vec<Slot> = self
            .active
            .keys()
            .filter(|slot| slot.matches(layer, light))
            .cloned()
            .collect();
        for slot in &removed {
            self.active.remove(slot);
        }
        self.queued.retain(|slot, _| !slot.matches(layer, light));
        removed
    }

    /// Removes every instance called `name` on `layer`, active or queued.
    /// Returns the slots that had an active instance removed.
    pub fn remove_named(&mut self, layer: Layer, name: &str) -> Vec<Slot> {
        let removed: Vec<Slot> = self
            .active
            .iter()
            .filter(|(slot, instance)| slot.layer == layer && instance.name == name)
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in &removed {
            self.active.remove(slot);
        }
        self.queued
            .retain(|slot, instance| !(slot.layer == layer && instance.name == name));
        removed
    }

    pub fn active_slots(&self) -> Vec<Slot> {
        self.active.keys().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    /// True if an instance with this name is active on any layer.
    pub fn is_name_active(&self, name: &str) -> bool {
        self.active.values().any(|instance| instance.name == name)
    }

    /// Active effect names on a light, by layer.
    pub fn active_for_light(&self, light: &str) -> Vec<(Layer, String)> {
        self.active
            .iter()
            .filter(|(slot, _)| slot.light == light)
            .map(|(slot, instance)| (slot.layer, instance.name.clone()))
            .collect()
    }

    pub fn is_layer_free_for_light(&self, layer: Layer, light: &str) -> bool {
        let slot = Slot::new(layer, light);
        !self.active.contains_key(&slot) && !self.queued.contains_key(&slot)
    }

    /// Mutable access to every active or queued instance with this name.
    pub fn instances_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut EffectInstance> + 'a {
        self.active
            .values_mut()
            .chain(self.queued.values_mut())
            .filter(move |instance| instance.name == name)
    }

    pub fn touch(&mut self, layer: Layer, now: Instant) {
        self.last_used.insert(layer, now);
    }

    pub fn snapshot(&self, slot: &Slot) -> Option<Rgbio> {
        self.snapshots.get(slot).copied()
    }

    pub fn set_snapshot(&mut self, slot: Slot, color: Rgbio) {
        self.snapshots.insert(slot, color);
    }

    pub fn clear_snapshot(&mut self, slot: &Slot) {
        self.snapshots.remove(slot);
    }

    /// Drops layers that have sat empty for longer than `grace`. The base
    /// layer is never dropped. Returns the layers that went away.
    pub fn sweep(&mut self, now: Instant, grace: Duration) -> Vec<Layer> {
        let occupied: BTreeSet<Layer> = self
            .active
            .keys()
            .chain(self.queued.keys())
            .map(|slot| slot.layer)
            .collect();

        let expired: Vec<Layer> = self
            .last_used
            .iter()
            .filter(|(layer, last_used)| {
                **layer != BASE_LAYER
                    && !occupied.contains(*layer)
                    && now.saturating_duration_since(**last_used) > grace
            })
            .map(|(layer, _)| *layer)
            .collect();

        for layer in &expired {
            debug!(layer, "Dropping idle layer");
            self.last_used.remove(layer);
            self.snapshots.retain(|slot, _| slot.layer != *layer);
        }
        expired
    }

    /// Layers with a usage record.
    pub fn tracked_layers(&self) -> Vec<Layer> {
        self.last_used.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.queued.clear();
        self.last_used.clear();
        self.snapshots.clear();
    }

    /// Forgets everything about a light.
    pub fn remove_light(&mut self, light: &str) -> usize {
        let before = self.active.len() + self.queued.len();
        self.active.retain(|slot, _| slot.light != light);
        self.queued.retain(|slot, _| slot.light != light);
        self.snapshots.retain(|slot, _| slot.light != light);
        before - self.active.len() - self.queued.len()
    }
}

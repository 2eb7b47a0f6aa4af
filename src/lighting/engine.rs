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

//! The effect coordinator: the public surface for adding, replacing and
//! removing effects, and the owner of all engine state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::color::Rgbio;
use super::compositor::{Compositor, CompositorSettings};
use super::driver::Driver;
use super::instance::{CycleTiming, EffectInstance};
use super::registry::{LayerRegistry, Slot};
use super::sink::LightSink;
use super::types::{
    is_reserved_layer, Effect, Layer, TrackedLight, Transition, BASE_LAYER, BLACKOUT_LAYER,
};

mod blackout;
mod events;
mod scheduler;
mod timing;


pub use blackout::BlackoutOutcome;
pub use scheduler::TimerId;
pub use timing::{derive_cycle, CycleEntry, CycleHint};

use blackout::BlackoutController;
use scheduler::Scheduler;
use timing::TimingRegistry;

/// Name used for effects created by `set_state`.
pub const SET_STATE_EFFECT: &str = "setState";

pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_LAYER_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_VALIDATION_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_LOCK_WARN_THRESHOLD: Duration = Duration::from_millis(20);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Ticks per second.
    pub tick_rate: u32,
    /// How long an empty layer is kept before it is dropped.
    pub layer_grace_period: Duration,
    /// How long past its duration an interpolation may run before it is
    /// purged as stuck.
    pub stale_transition_timeout: Duration,
    pub validation_interval: Duration,
    /// Average lock hold time above which warnings are logged.
    pub lock_warn_threshold: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            layer_grace_period: DEFAULT_LAYER_GRACE_PERIOD,
            stale_transition_timeout: DEFAULT_STALE_TRANSITION_TIMEOUT,
            validation_interval: DEFAULT_VALIDATION_INTERVAL,
            lock_warn_threshold: DEFAULT_LOCK_WARN_THRESHOLD,
        }
    }
}

impl EngineSettings {
    /// Time between ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

/// How an effect is applied.
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Delay before the effect is applied.
    pub offset: Duration,
    /// Loop the effect by re-queueing it whenever it completes.
    pub persistent: bool,
    /// Cycle timing to record instead of deriving it.
    pub cycle: Option<CycleHint>,
}

impl EffectOptions {
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_cycle(mut self, cycle: CycleHint) -> Self {
        self.cycle = Some(cycle);
        self
    }
}

/// The result of an add or set call. Misuse is reported here rather than as
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Scheduled to apply later; the timer can be cancelled.
    Deferred(TimerId),
    Rejected,
}

impl ApplyOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyOutcome::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    Add,
    Set,
    AddUnblocked,
    SetUnblocked,
}

impl ApplyMode {
    fn replaces(self) -> bool {
        matches!(self, ApplyMode::Set | ApplyMode::SetUnblocked)
    }

    fn unblocked(self) -> bool {
        matches!(self, ApplyMode::AddUnblocked | ApplyMode::SetUnblocked)
    }
}

#[derive(Debug)]
struct PendingApply {
    mode: ApplyMode,
    name: String,
    effect: Arc<Effect>,
    options: EffectOptions,
}

/// Owns every piece of effect state. Not thread safe by itself; see
/// `LightingEngine` for the shared handle.
pub struct EffectEngine {
    compositor: Compositor,
    registry: LayerRegistry,
    timing: TimingRegistry,
    scheduler: Scheduler<PendingApply>,
    blackout: BlackoutController,
    /// The effect that last took the base layer through a set call.
    base_owner: Option<String>,
    current_time: Instant,
    settings: EngineSettings,
}

impl EffectEngine {
    pub fn new(sink: Box<dyn LightSink>, settings: EngineSettings) -> Self {
        let compositor = Compositor::new(
            sink,
            CompositorSettings {
                validation_interval: settings.validation_interval,
                stale_timeout: settings.stale_transition_timeout,
            },
        );

        Self {
            compositor,
            registry: LayerRegistry::new(),
            timing: TimingRegistry::new(),
            scheduler: Scheduler::new(),
            blackout: BlackoutController::new(),
            base_owner: None,
            current_time: Instant::now(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current engine time. Only moves when the engine ticks.
    pub fn now(&self) -> Instant {
        self.current_time
    }

    /// Adds an effect on top of whatever is running. Instances with the same
    /// name queue behind the running ones; other names are evicted.
    pub fn add_effect(
        &mut self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.apply(ApplyMode::Add, name, Arc::new(effect), options)
    }

    /// Clears everything, then adds the effect. Repeating a set for the
    /// effect that already owns the base layer only queues it.
    pub fn set_effect(
        &mut self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.apply(ApplyMode::Set, name, Arc::new(effect), options)
    }

    /// Like `add_effect`, but refuses if an effect with this name is active on
    /// any layer.
    pub fn add_effect_unblocked(
        &mut self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.apply(ApplyMode::AddUnblocked, name, Arc::new(effect), options)
    }

    /// Like `set_effect`, but refuses if an effect with this name is active on
    /// any layer.
    pub fn set_effect_unblocked(
        &mut self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.apply(ApplyMode::SetUnblocked, name, Arc::new(effect), options)
    }

    fn apply(
        &mut self,
        mode: ApplyMode,
        name: &str,
        effect: Arc<Effect>,
        options: EffectOptions,
    ) -> ApplyOutcome {
        if effect.transitions.is_empty() {
            warn!(name, "Effect has no transitions, ignoring");
            return ApplyOutcome::Rejected;
        }
        if let Some(layer) = effect.layers().into_iter().find(|l| is_reserved_layer(*l)) {
            warn!(name, layer, "Effect uses a reserved layer, ignoring");
            return ApplyOutcome::Rejected;
        }

        if !options.offset.is_zero() {
            let at = self.current_time + options.offset;
            let offset = options.offset;
            let id = self.scheduler.schedule(
                at,
                PendingApply {
                    mode,
                    name: name.to_string(),
                    effect,
                    options: EffectOptions {
                        offset: Duration::ZERO,
                        ..options
                    },
                },
            );
            debug!(name, ?offset, ?id, "Deferred effect");
            return ApplyOutcome::Deferred(id);
        }

        if self.compositor.is_clearing() && !self.compositor.retry_clear() {
            warn!(name, "Lights are still clearing, rejecting effect");
            return ApplyOutcome::Rejected;
        }

        if mode.unblocked() && self.registry.is_name_active(name) {
            debug!(name, "Effect already active, not applying");
            return ApplyOutcome::Rejected;
        }

        if mode.replaces() {
            if self.base_owner.as_deref() == Some(name) {
                debug!(name, "Effect already owns the base layer, queueing");
            } else {
                self.clear_effect_state();
                if !self.compositor.clear_all() {
                    warn!(name, "Failed to clear lights, rejecting effect");
                    return ApplyOutcome::Rejected;
                }
                self.base_owner = None;
            }
        }

        self.start_effect(name, &effect, &options);

        if mode.replaces() && effect.layers().contains(&BASE_LAYER) {
            self.base_owner = Some(name.to_string());
        }
        ApplyOutcome::Applied
    }

    fn start_effect(&mut self, name: &str, effect: &Arc<Effect>, options: &EffectOptions) {
        let layers = effect.layers();
        if self.blackout.is_active() && layers.iter().any(|layer| *layer < BLACKOUT_LAYER) {
            info!(name, "Effect below the blackout layer, cancelling blackout");
            self.blackout.cancel(&mut self.compositor);
        }

        let now = self.current_time;
        let cycle = self.timing.resolve(name, effect, options.cycle, now);
        let lights: Vec<TrackedLight> = effect.lights().into_iter().cloned().collect();

        for layer in &layers {
            for (index, light) in lights.iter().enumerate() {
                let instance =
                    EffectInstance::new(name, effect.clone(), light, *layer, options.persistent)
                        .with_cycle(cycle.map(|entry| entry.for_light(index)));
                if instance.steps().is_empty() {
                    continue;
                }

                let slot = Slot::new(*layer, light.id.clone());
                let running = self.registry.active(&slot).map(|active| active.name == name);
                match running {
                    Some(true) => {
                        self.registry.set_queued(slot, instance);
                    }
                    Some(false) => {
                        self.registry.take_active(&slot);
                        self.registry.take_queued(&slot);
                        Driver::new(&mut self.registry, &mut self.compositor, now)
                            .start(slot, instance);
                    }
                    None => {
                        Driver::new(&mut self.registry, &mut self.compositor, now)
                            .start(slot, instance);
                    }
                }
            }
            self.registry.touch(*layer, now);
        }

        debug!(name, layers = layers.len(), lights = lights.len(), "Effect started");
    }

    fn clear_effect_state(&mut self) {
        self.registry.clear();
        self.timing.clear();
    }

    /// Removes every instance of `name` on `layer`. Returns false if there was
    /// nothing to remove.
    pub fn remove_effect(&mut self, name: &str, layer: Layer) -> bool {
        let removed = self.registry.remove_named(layer, name);
        for slot in &removed {
            self.compositor.remove(&slot.light, slot.layer);
            self.registry.clear_snapshot(slot);
        }
        if !removed.is_empty() {
            debug!(name, layer, lights = removed.len(), "Removed effect");
        }
        !removed.is_empty()
    }

    /// Drops every effect, pending application and blackout, and sends all
    /// lights to black.
    pub fn remove_all_effects(&mut self) {
        self.blackout.cancel(&mut self.compositor);
        let pending = self.scheduler.clear();
        self.clear_effect_state();
        self.base_owner = None;
        if !self.compositor.clear_all() {
            warn!("Clear not published yet, retrying on the next tick");
        }
        info!(pending, "Removed all effects");
    }

    /// Fades the given lights to `color` on the base layer.
    pub fn set_state(
        &mut self,
        lights: &[TrackedLight],
        color: Rgbio,
        duration: Duration,
    ) -> ApplyOutcome {
        if lights.is_empty() {
            warn!("No lights given for state change, ignoring");
            return ApplyOutcome::Rejected;
        }
        let effect = Effect::new(SET_STATE_EFFECT, "Direct light state").with_transition(
            Transition::new(lights.to_vec(), BASE_LAYER, color, duration),
        );
        self.apply(
            ApplyMode::Add,
            SET_STATE_EFFECT,
            Arc::new(effect),
            EffectOptions::default(),
        )
    }

    /// Takes every light to black. The receiver resolves when the blackout
    /// completes or is cancelled.
    pub fn blackout(&mut self, duration: Duration) -> oneshot::Receiver<BlackoutOutcome> {
        let now = self.current_time;
        let (receiver, completed) =
            self.blackout
                .start(duration, now, &mut self.compositor, &mut self.registry);
        if completed {
            self.base_owner = None;
        }
        receiver
    }

    pub fn cancel_blackout(&mut self) -> bool {
        self.blackout.cancel(&mut self.compositor)
    }

    pub fn is_blackout_active(&self) -> bool {
        self.blackout.is_active()
    }

    /// Advances the engine by `dt` and publishes the result.
    pub fn tick(&mut self, dt: Duration) {
        self.current_time += dt;
        let now = self.current_time;

        if self.compositor.is_clearing() {
            self.compositor.retry_clear();
        }

        if !self.scheduler.is_empty() {
            for (id, pending) in self.scheduler.take_due(now) {
                debug!(?id, name = pending.name.as_str(), "Applying deferred effect");
                self.apply(pending.mode, &pending.name, pending.effect, pending.options);
            }
        }

        Driver::new(&mut self.registry, &mut self.compositor, now).tick();
        self.compositor.advance(now);

        if self.blackout.poll(now, &mut self.compositor, &mut self.registry) {
            self.base_owner = None;
        }

        let grace = self.settings.layer_grace_period;
        for layer in self.registry.sweep(now, grace) {
            self.compositor.remove_layer(layer);
        }

        self.compositor.validate_if_due(now);
    }

    /// Drops a light from every layer and sends it to black.
    pub fn remove_light(&mut self, light: &str) {
        let removed = self.registry.remove_light(light);
        self.compositor.remove_light(light);
        info!(light, removed, "Removed light");
    }

    /// Cancels a deferred add or set. Returns false if it already ran.
    pub fn cancel_scheduled(&mut self, id: TimerId) -> bool {
        self.scheduler.cancel(id).is_some()
    }

    pub fn pending_scheduled(&self) -> usize {
        self.scheduler.len()
    }

    /// The recorded cycle timing for an effect, if it has one.
    pub fn cycle_timing(&self, name: &str) -> Option<CycleEntry> {
        self.timing.get(name)
    }

    /// Shifts the cycle start of an effect by `delta_ms`, carrying the change
    /// to all of its instances.
    pub fn nudge_cycle_start(&mut self, name: &str, delta_ms: i64) -> bool {
        let Some(entry) = self.timing.nudge(name, delta_ms) else {
            return false;
        };
        for instance in self.registry.instances_named_mut(name) {
            if let Some(cycle) = instance.cycle.as_mut() {
                cycle.cycle_start = entry.cycle_start;
            }
        }
        debug!(name, delta_ms, "Nudged cycle start");
        true
    }

    /// Active effect names on a light, by layer.
    pub fn active_effects_for_light(&self, light: &str) -> Vec<(Layer, String)> {
        self.registry.active_for_light(light)
    }

    pub fn is_layer_free_for_light(&self, layer: Layer, light: &str) -> bool {
        self.registry.is_layer_free_for_light(layer, light)
    }

    /// Name of the effect queued behind the active one on a slot.
    pub fn queued_effect(&self, layer: Layer, light: &str) -> Option<String> {
        self.registry
            .queued(&Slot::new(layer, light))
            .map(|instance| instance.name.clone())
    }

    pub fn active_instance_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Cycle timing attached to the active instance on a slot.
    pub fn instance_cycle(&self, layer: Layer, light: &str) -> Option<CycleTiming> {
        self.registry
            .active(&Slot::new(layer, light))
            .and_then(|instance| instance.cycle)
    }

    pub fn merged_color(&self, light: &str) -> Option<Rgbio> {
        self.compositor.merged_color(light)
    }

    pub fn layer_color(&self, light: &str, layer: Layer) -> Option<Rgbio> {
        self.compositor.layer_color(light, layer)
    }

    /// Layers with compositor state on a light.
    pub fn occupied_layers(&self, light: &str) -> Vec<Layer> {
        self.compositor.occupied_layers(light)
    }

    /// Layers the registry is tracking for idle cleanup.
    pub fn tracked_layers(&self) -> BTreeSet<Layer> {
        self.registry.tracked_layers().into_iter().collect()
    }

    /// Wipes all effect state and sends every light to black.
    pub fn emergency_reset(&mut self, reason: &str) {
        self.blackout.cancel(&mut self.compositor);
        self.scheduler.clear();
        self.clear_effect_state();
        self.base_owner = None;
        self.compositor.emergency_reset(reason);
    }
}

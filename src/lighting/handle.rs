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
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{error, info};

use super::color::Rgbio;
use super::engine::{
    ApplyOutcome, BlackoutOutcome, EffectEngine, EffectOptions, EngineSettings, TimerId,
};
use super::sink::LightSink;
use super::types::{Effect, GameEvent, Layer, TrackedLight};
use crate::sync::{CancelHandle, InstrumentedMutex, LockStats};

/// A shareable handle to the effect engine. Every call takes the engine lock,
/// so mutations never interleave with a tick pass or with each other.
#[derive(Clone)]
pub struct LightingEngine {
    engine: Arc<InstrumentedMutex<EffectEngine>>,
}

impl LightingEngine {
    pub fn new(sink: Box<dyn LightSink>, settings: EngineSettings) -> Self {
        let budget = settings.lock_warn_threshold;
        Self {
            engine: Arc::new(InstrumentedMutex::new(
                "lighting-engine",
                EffectEngine::new(sink, settings),
                budget,
            )),
        }
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut EffectEngine) -> R) -> R {
        f(&mut self.engine.lock())
    }

    pub fn add_effect(&self, name: &str, effect: Effect, options: EffectOptions) -> ApplyOutcome {
        self.engine.lock().add_effect(name, effect, options)
    }

    pub fn set_effect(&self, name: &str, effect: Effect, options: EffectOptions) -> ApplyOutcome {
        self.engine.lock().set_effect(name, effect, options)
    }

    pub fn add_effect_unblocked(
        &self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.engine.lock().add_effect_unblocked(name, effect, options)
    }

    pub fn set_effect_unblocked(
        &self,
        name: &str,
        effect: Effect,
        options: EffectOptions,
    ) -> ApplyOutcome {
        self.engine.lock().set_effect_unblocked(name, effect, options)
    }

    pub fn remove_effect(&self, name: &str, layer: Layer) -> bool {
        self.engine.lock().remove_effect(name, layer)
    }

    pub fn remove_all_effects(&self) {
        self.engine.lock().remove_all_effects()
    }

    pub fn set_state(
        &self,
        lights: &[TrackedLight],
        color: Rgbio,
        duration: Duration,
    ) -> ApplyOutcome {
        self.engine.lock().set_state(lights, color, duration)
    }

    pub fn blackout(&self, duration: Duration) -> oneshot::Receiver<BlackoutOutcome> {
        self.engine.lock().blackout(duration)
    }

    /// Starts a blackout and waits for it to finish. The tick loop has to be
    /// running for a fade to make progress.
    pub async fn blackout_and_wait(&self, duration: Duration) -> BlackoutOutcome {
        let done = self.blackout(duration);
        // A dropped sender means the engine went away mid fade.
        done.await.unwrap_or(BlackoutOutcome::Cancelled)
    }

    pub fn cancel_blackout(&self) -> bool {
        self.engine.lock().cancel_blackout()
    }

    pub fn is_blackout_active(&self) -> bool {
        self.engine.lock().is_blackout_active()
    }

    pub fn dispatch(&self, event: GameEvent) -> usize {
        self.engine.lock().dispatch(event)
    }

    pub fn on_beat(&self) -> usize {
        self.dispatch(GameEvent::Beat)
    }

    pub fn on_measure(&self) -> usize {
        self.dispatch(GameEvent::Measure)
    }

    pub fn on_keyframe(&self) -> usize {
        self.dispatch(GameEvent::Keyframe)
    }

    pub fn on_note(&self, note: GameEvent) -> usize {
        self.dispatch(note)
    }

    pub fn remove_light(&self, light: &str) {
        self.engine.lock().remove_light(light)
    }

    pub fn cancel_scheduled(&self, id: TimerId) -> bool {
        self.engine.lock().cancel_scheduled(id)
    }

    pub fn nudge_cycle_start(&self, name: &str, delta_ms: i64) -> bool {
        self.engine.lock().nudge_cycle_start(name, delta_ms)
    }

    pub fn active_effects_for_light(&self, light: &str) -> Vec<(Layer, String)> {
        self.engine.lock().active_effects_for_light(light)
    }

    pub fn is_layer_free_for_light(&self, layer: Layer, light: &str) -> bool {
        self.engine.lock().is_layer_free_for_light(layer, light)
    }

    pub fn lock_stats(&self) -> LockStats {
        self.engine.stats()
    }

    /// Advances the engine by one tick. A panic inside the pass resets every
    /// light to black instead of leaving half-applied state on the hardware.
    pub fn tick(&self, dt: Duration) {
        let mut engine = self.engine.lock();
        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.tick(dt)));
        if let Err(panic) = result {
            let reason = panic_message(panic.as_ref());
            error!(reason = reason.as_str(), "Tick pass panicked");
            // The reset talks to the same sink, which may be what panicked.
            let reset =
                panic::catch_unwind(AssertUnwindSafe(|| engine.emergency_reset(&reason)));
            if let Err(panic) = reset {
                error!(
                    reason = panic_message(panic.as_ref()).as_str(),
                    "Emergency reset panicked, retrying on the next tick"
                );
            }
        }
    }

    /// Starts the thread that ticks the engine at its configured rate until
    /// `cancel` fires.
    pub fn start_tick_loop(&self, cancel: CancelHandle) -> io::Result<JoinHandle<()>> {
        let engine = self.clone();
        let interval = self.engine.lock().settings().tick_interval();

        thread::Builder::new()
            .name("lighting-tick".to_string())
            .spawn(move || {
                info!(?interval, "Lighting tick loop started");
                let mut last = Instant::now();
                let mut next = last + interval;

                while !cancel.is_cancelled() {
                    spin_sleep::sleep(next.saturating_duration_since(Instant::now()));
                    let now = Instant::now();
                    engine.tick(now.duration_since(last));
                    last = now;

                    next += interval;
                    if next < now {
                        // Fell behind; skip ahead rather than bursting.
                        next = now + interval;
                    }
                }
                info!("Lighting tick loop stopped");
            })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

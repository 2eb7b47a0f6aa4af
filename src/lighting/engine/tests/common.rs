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
use std::time::Duration;

use crate::lighting::color::Rgbio;
use crate::lighting::engine::{EffectEngine, EngineSettings};
use crate::lighting::sink::MemorySink;
use crate::lighting::types::{Effect, Layer, TrackedLight, Transition};

pub(crate) struct Harness {
    pub engine: EffectEngine,
    pub sink: MemorySink,
}

impl Harness {
    /// Advances the engine by `total` milliseconds in `step` sized ticks.
    pub fn run(&mut self, total: u64, step: u64) {
        let mut elapsed = 0;
        while elapsed < total {
            let dt = step.min(total - elapsed);
            self.engine.tick(Duration::from_millis(dt));
            elapsed += dt;
        }
    }

    pub fn tick(&mut self) {
        self.engine.tick(Duration::from_millis(16));
    }
}

pub(crate) fn harness(ids: &[&str]) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();
    let sink = MemorySink::new(ids.iter().map(|id| id.to_string()).collect());
    let engine = EffectEngine::new(Box::new(sink.clone()), EngineSettings::default());
    Harness { engine, sink }
}

pub(crate) fn light(id: &str) -> TrackedLight {
    TrackedLight::new(id, 0)
}

pub(crate) fn lights(ids: &[&str]) -> Vec<TrackedLight> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| TrackedLight::new(*id, i as u32))
        .collect()
}

pub(crate) fn red() -> Rgbio {
    Rgbio::new(255, 0, 0, 255)
}

pub(crate) fn green() -> Rgbio {
    Rgbio::new(0, 255, 0, 255)
}

pub(crate) fn blue() -> Rgbio {
    Rgbio::new(0, 0, 255, 255)
}

/// A single transition effect on one layer.
pub(crate) fn simple(
    name: &str,
    targets: &[TrackedLight],
    layer: Layer,
    color: Rgbio,
    ms: u64,
) -> Effect {
    Effect::new(name, "test effect").with_transition(Transition::new(
        targets.to_vec(),
        layer,
        color,
        Duration::from_millis(ms),
    ))
}

/// An effect that settles on `color` and then holds it for a long time.
pub(crate) fn holding(name: &str, targets: &[TrackedLight], layer: Layer, color: Rgbio) -> Effect {
    Effect::new(name, "held color").with_transition(
        Transition::new(targets.to_vec(), layer, color, Duration::ZERO).with_wait_until(
            crate::lighting::types::WaitCondition::Delay(Duration::from_secs(60)),
        ),
    )
}

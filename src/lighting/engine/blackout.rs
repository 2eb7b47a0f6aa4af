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
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::lighting::color::{BlendMode, Rgbio};
use crate::lighting::compositor::Compositor;
use crate::lighting::easing::Easing;
use crate::lighting::registry::LayerRegistry;
use crate::lighting::types::{LightId, BLACKOUT_LAYER};

/// How a blackout request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlackoutOutcome {
    /// Every light reached black and all effects were cleared.
    Completed,
    /// The blackout was cancelled before it finished.
    Cancelled,
    /// Another blackout was already running. Nothing changed.
    AlreadyActive,
}

#[derive(Debug)]
enum State {
    Inactive,
    BlackingOut {
        deadline: Instant,
        notify: Option<oneshot::Sender<BlackoutOutcome>>,
    },
}

/// The system wide override that takes every light to black on the blackout
/// layer, then clears everything beneath it.
#[derive(Debug)]
pub struct BlackoutController {
    state: State,
}

impl Default for BlackoutController {
    fn default() -> Self {
        Self {
            state: State::Inactive,
        }
    }
}

impl BlackoutController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::BlackingOut { .. })
    }

    /// Starts a blackout. The receiver resolves once it completes or is
    /// cancelled. The returned flag is true when the blackout finished before
    /// this call returned.
    pub fn start(
        &mut self,
        duration: Duration,
        now: Instant,
        compositor: &mut Compositor,
        registry: &mut LayerRegistry,
    ) -> (oneshot::Receiver<BlackoutOutcome>, bool) {
        let (sender, receiver) = oneshot::channel();

        if self.is_active() {
            warn!("Blackout already in progress, ignoring");
            let _ = sender.send(BlackoutOutcome::AlreadyActive);
            return (receiver, false);
        }

        if duration.is_zero() {
            finish(compositor, registry);
            info!("Blackout complete");
            let _ = sender.send(BlackoutOutcome::Completed);
            return (receiver, true);
        }

        let lights = compositor.known_light_ids();
        for light in &lights {
            let current = compositor
                .merged_color(light)
                .unwrap_or_else(Rgbio::black)
                .with_opacity(1.0)
                .with_blend_mode(BlendMode::Replace);
            compositor.begin(
                light,
                BLACKOUT_LAYER,
                Some(current),
                current.blacked_out(),
                duration,
                Easing::Linear,
                now,
            );
        }

        info!(lights = lights.len(), ?duration, "Blackout started");
        self.state = State::BlackingOut {
            deadline: now + duration,
            notify: Some(sender),
        };
        (receiver, false)
    }

    /// Finishes the blackout once its fade is done. Returns true if it
    /// completed on this call.
    pub fn poll(
        &mut self,
        now: Instant,
        compositor: &mut Compositor,
        registry: &mut LayerRegistry,
    ) -> bool {
        let State::BlackingOut { deadline, notify } = &mut self.state else {
            return false;
        };
        if now < *deadline || compositor.interpolations_on_layer(BLACKOUT_LAYER) > 0 {
            return false;
        }

        let notify = notify.take();
        self.state = State::Inactive;
        finish(compositor, registry);
        info!("Blackout complete");
        if let Some(notify) = notify {
            let _ = notify.send(BlackoutOutcome::Completed);
        }
        true
    }

    /// Drops the blackout layer so lower layers show again. Returns false if
    /// no blackout was running.
    pub fn cancel(&mut self, compositor: &mut Compositor) -> bool {
        let State::BlackingOut { notify, .. } = std::mem::replace(&mut self.state, State::Inactive)
        else {
            return false;
        };

        compositor.remove_layer(BLACKOUT_LAYER);
        info!("Blackout cancelled");
        if let Some(notify) = notify {
            let _ = notify.send(BlackoutOutcome::Cancelled);
        }
        true
    }
}

/// Evicts every effect and leaves each light black on the base layer, keeping
/// whatever pan and tilt it had.
fn finish(compositor: &mut Compositor, registry: &mut LayerRegistry) {
    registry.clear();
    let colors: Vec<(LightId, Rgbio)> = compositor
        .known_light_ids()
        .into_iter()
        .map(|light| {
            let black = compositor
                .merged_color(&light)
                .map(|color| color.blacked_out())
                .unwrap_or_else(Rgbio::black);
            (light, black)
        })
        .collect();
    compositor.reset_to_base(colors);
}

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

//! Per-light, per-layer color state with interpolation and blending.
//!
//! Every light keeps a map of layer to its current color. Interpolations move
//! a layer's color toward a target over time; each tick the occupied layers of
//! every touched light are folded in ascending layer order and the merged
//! color is handed to the light sink.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::color::Rgbio;
use super::easing::Easing;
use super::sink::LightSink;
use super::types::{Layer, LightId, BASE_LAYER};

/// Interpolations at or past this progress are retired after the pass.
const RETIRE_PROGRESS: f64 = 0.999;

/// Publish failures are logged on the first occurrence and then this often.
const PUBLISH_WARN_EVERY: u64 = 100;

/// Faults inside the tick pass. These never escape the compositor; they are
/// answered with an emergency reset.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("interpolation progress for {light} on layer {layer} is not finite")]
    NonFiniteProgress { light: LightId, layer: Layer },
    #[error("interpolation for {light} on layer {layer} has no layer state")]
    MissingLayer { light: LightId, layer: Layer },
}

#[derive(Debug, Clone, Copy)]
pub struct CompositorSettings {
    /// How often stored state is checked for corruption.
    pub validation_interval: Duration,
    /// How long past its duration an interpolation may linger before it is
    /// considered stuck.
    pub stale_timeout: Duration,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            validation_interval: Duration::from_secs(3),
            stale_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct Interpolation {
    start: Rgbio,
    end: Rgbio,
    duration: Duration,
    easing: Easing,
    started_at: Instant,
}

impl Interpolation {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub struct Compositor {
    layers: HashMap<LightId, BTreeMap<Layer, Rgbio>>,
    interpolations: HashMap<LightId, BTreeMap<Layer, Interpolation>>,
    merged: HashMap<LightId, Rgbio>,
    dirty: BTreeSet<LightId>,
    clearing: bool,
    last_validation: Option<Instant>,
    publish_failures: u64,
    settings: CompositorSettings,
    sink: Box<dyn LightSink>,
}

impl Compositor {
    pub fn new(sink: Box<dyn LightSink>, settings: CompositorSettings) -> Self {
        Self {
            layers: HashMap::new(),
            interpolations: HashMap::new(),
            merged: HashMap::new(),
            dirty: BTreeSet::new(),
            clearing: false,
            last_validation: None,
            publish_failures: 0,
            settings,
            sink,
        }
    }

    /// True while a global clear has not been published yet.
    pub fn is_clearing(&self) -> bool {
        self.clearing
    }

    /// Starts moving a layer toward `end`. Without an explicit start the
    /// layer's current value is used, or transparent if it has none. The start
    /// becomes the layer's value right away so nothing jumps.
    ///
    /// Returns false if the compositor is in the middle of a clear.
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        &mut self,
        light: &str,
        layer: Layer,
        start: Option<Rgbio>,
        end: Rgbio,
        duration: Duration,
        easing: Easing,
        now: Instant,
    ) -> bool {
        if self.clearing {
            debug!(light, layer, "Rejecting interpolation while clearing");
            return false;
        }

        let start = start
            .or_else(|| self.layer_color(light, layer))
            .unwrap_or_else(Rgbio::transparent);

        self.layers
            .entry(light.to_string())
            .or_default()
            .insert(layer, start);
        self.interpolations.entry(light.to_string()).or_default().insert(
            layer,
            Interpolation {
                start,
                end,
                duration,
                easing,
                started_at: now,
            },
        );
        self.dirty.insert(light.to_string());
        true
    }

    /// Sets a layer's color without interpolating, cancelling any running
    /// interpolation on it.
    pub fn set_immediate(&mut self, light: &str, layer: Layer, color: Rgbio) -> bool {
        if self.clearing {
            return false;
        }
        if let Some(interpolations) = self.interpolations.get_mut(light) {
            interpolations.remove(&layer);
        }
        self.layers
            .entry(light.to_string())
            .or_default()
            .insert(layer, color);
        self.dirty.insert(light.to_string());
        true
    }

    /// Runs one interpolation pass and publishes every touched light. A fault
    /// in the pass triggers an emergency reset.
    pub fn advance(&mut self, now: Instant) {
        if let Err(e) = self.try_advance(now) {
            self.emergency_reset(&e.to_string());
        }
    }

    fn try_advance(&mut self, now: Instant) -> Result<(), CompositorError> {
        let mut retired = Vec::new();

        for (light, interpolations) in &self.interpolations {
            for (layer, interpolation) in interpolations {
                let progress = interpolation.progress(now);
                if !progress.is_finite() {
                    return Err(CompositorError::NonFiniteProgress {
                        light: light.clone(),
                        layer: *layer,
                    });
                }

                let eased = interpolation.easing.apply(progress);
                let value = interpolation.start.lerp(&interpolation.end, eased);
                let slot = self
                    .layers
                    .get_mut(light)
                    .and_then(|layers| layers.get_mut(layer))
                    .ok_or_else(|| CompositorError::MissingLayer {
                        light: light.clone(),
                        layer: *layer,
                    })?;
                *slot = value;
                self.dirty.insert(light.clone());

                if progress >= RETIRE_PROGRESS {
                    retired.push((light.clone(), *layer));
                }
            }
        }

        for (light, layer) in retired {
            if let Some(interpolation) = self
                .interpolations
                .get_mut(&light)
                .and_then(|interpolations| interpolations.remove(&layer))
            {
                if let Some(value) = self
                    .layers
                    .get_mut(&light)
                    .and_then(|layers| layers.get_mut(&layer))
                {
                    *value = interpolation.end;
                }
            }
        }
        self.interpolations
            .retain(|_, interpolations| !interpolations.is_empty());

        self.flush();
        Ok(())
    }

    /// Recomputes merged colors for every touched light and publishes them.
    /// Publishes even when nothing changed, so a sink still holding a frame
    /// it couldn't hand off gets another chance to send it.
    pub fn flush(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        for light in dirty {
            let merged = self.compute_merged(&light);
            self.merged.insert(light.clone(), merged);
            self.sink.set_color(&light, merged);
        }
        self.publish();
    }

    fn compute_merged(&self, light: &str) -> Rgbio {
        match self.layers.get(light) {
            Some(layers) if !layers.is_empty() => layers
                .values()
                .fold(Rgbio::transparent(), |current, layer| current.blend(layer)),
            // Nothing left on the light, so make sure the hardware goes dark.
            _ => Rgbio::black(),
        }
    }

    fn publish(&mut self) -> bool {
        match self.sink.publish() {
            Ok(()) => {
                self.publish_failures = 0;
                true
            }
            Err(e) => {
                if self.publish_failures % PUBLISH_WARN_EVERY == 0 {
                    warn!(err = %e, failures = self.publish_failures + 1, "Failed to publish light state");
                }
                self.publish_failures += 1;
                false
            }
        }
    }

    /// Drops one layer from a light and republishes the light immediately.
    pub fn remove(&mut self, light: &str, layer: Layer) {
        if let Some(layers) = self.layers.get_mut(light) {
            layers.remove(&layer);
        }
        if let Some(interpolations) = self.interpolations.get_mut(light) {
            interpolations.remove(&layer);
        }
        self.dirty.insert(light.to_string());
        self.flush();
    }

    /// Drops a layer from every light.
    pub fn remove_layer(&mut self, layer: Layer) {
        let lights: Vec<LightId> = self
            .layers
            .iter()
            .filter(|(_, layers)| layers.contains_key(&layer))
            .map(|(light, _)| light.clone())
            .collect();
        for light in &lights {
            if let Some(layers) = self.layers.get_mut(light) {
                layers.remove(&layer);
            }
        }
        for interpolations in self.interpolations.values_mut() {
            interpolations.remove(&layer);
        }
        self.interpolations
            .retain(|_, interpolations| !interpolations.is_empty());
        self.dirty.extend(lights);
        self.flush();
    }

    /// Forgets a light entirely after sending it to black.
    pub fn remove_light(&mut self, light: &str) {
        self.layers.remove(light);
        self.interpolations.remove(light);
        self.merged.remove(light);
        self.dirty.remove(light);
        self.sink.set_color(light, Rgbio::black());
        self.publish();
    }

    /// Wipes all state and sends every known light to opaque black. New
    /// interpolations are refused until the black frame has been published.
    /// Returns true once the clear is complete.
    pub fn clear_all(&mut self) -> bool {
        self.clearing = true;
        let lights = self.known_light_ids();
        self.wipe();

        for light in &lights {
            self.merged.insert(light.clone(), Rgbio::black());
            self.sink.set_color(light, Rgbio::black());
        }

        if self.publish() {
            self.clearing = false;
            debug!(lights = lights.len(), "Cleared all light state");
            true
        } else {
            warn!("Clear not published, will retry");
            false
        }
    }

    /// Finishes a clear whose publish failed earlier.
    pub fn retry_clear(&mut self) -> bool {
        if !self.clearing {
            return true;
        }
        self.clear_all()
    }

    /// Sends every known light to black and wipes all state. Used when the
    /// tick pass hits something it cannot reason about.
    pub fn emergency_reset(&mut self, reason: &str) {
        error!(reason, "Emergency reset of all lights");
        let lights = self.known_light_ids();
        self.wipe();
        self.clearing = false;
        // Stays dirty until sent, so a later flush finishes an interrupted reset.
        self.dirty.extend(lights.iter().cloned());
        for light in &lights {
            self.merged.insert(light.clone(), Rgbio::black());
            self.sink.set_color(light, Rgbio::black());
        }
        self.dirty.clear();
        if !self.publish() {
            error!("Failed to publish emergency reset");
        }
    }

    /// Replaces all state with a single base layer color per light.
    pub fn reset_to_base(&mut self, colors: Vec<(LightId, Rgbio)>) {
        self.wipe();
        for (light, color) in colors {
            self.layers
                .entry(light.clone())
                .or_default()
                .insert(BASE_LAYER, color);
            self.dirty.insert(light);
        }
        self.flush();
    }

    fn wipe(&mut self) {
        self.layers.clear();
        self.interpolations.clear();
        self.merged.clear();
        self.dirty.clear();
    }

    /// Checks stored state for corruption if the validation interval has
    /// passed. Everything found is corrected in place.
    pub fn validate_if_due(&mut self, now: Instant) {
        match self.last_validation {
            Some(last) if now.saturating_duration_since(last) < self.settings.validation_interval => {
                return;
            }
            None => {
                self.last_validation = Some(now);
                return;
            }
            _ => {}
        }
        self.last_validation = Some(now);
        self.validate(now);
    }

    /// Returns the number of problems corrected.
    pub fn validate(&mut self, now: Instant) -> usize {
        let mut corrected = 0;

        for (light, layers) in self.layers.iter_mut() {
            for (layer, color) in layers.iter_mut() {
                let (fixed, changed) = color.sanitized();
                if changed {
                    warn!(light = light.as_str(), layer, "Clamped out of range layer state");
                    *color = fixed;
                    self.dirty.insert(light.clone());
                    corrected += 1;
                }
            }
        }

        let stale_timeout = self.settings.stale_timeout;
        for (light, interpolations) in self.interpolations.iter_mut() {
            interpolations.retain(|layer, interpolation| {
                let age = now.saturating_duration_since(interpolation.started_at);
                let stale = age > interpolation.duration + stale_timeout;
                if stale {
                    warn!(light = light.as_str(), layer, ?age, "Purging stuck interpolation");
                    corrected += 1;
                }
                !stale
            });
        }
        self.interpolations
            .retain(|_, interpolations| !interpolations.is_empty());

        let lights: Vec<LightId> = self.merged.keys().cloned().collect();
        for light in lights {
            let expected = self.compute_merged(&light);
            if self.merged.get(&light) != Some(&expected) {
                warn!(light = light.as_str(), "Merged color out of sync, recomputing");
                self.dirty.insert(light);
                corrected += 1;
            }
        }

        self.flush();
        corrected
    }

    pub fn layer_color(&self, light: &str, layer: Layer) -> Option<Rgbio> {
        self.layers
            .get(light)
            .and_then(|layers| layers.get(&layer))
            .copied()
    }

    pub fn merged_color(&self, light: &str) -> Option<Rgbio> {
        self.merged.get(light).copied()
    }

    pub fn has_interpolation(&self, light: &str, layer: Layer) -> bool {
        self.interpolations
            .get(light)
            .is_some_and(|interpolations| interpolations.contains_key(&layer))
    }

    /// Number of lights still interpolating on a layer.
    pub fn interpolations_on_layer(&self, layer: Layer) -> usize {
        self.interpolations
            .values()
            .filter(|interpolations| interpolations.contains_key(&layer))
            .count()
    }

    pub fn occupied_layers(&self, light: &str) -> Vec<Layer> {
        self.layers
            .get(light)
            .map(|layers| layers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every light id seen by the compositor or tracked by the sink.
    pub fn known_light_ids(&self) -> Vec<LightId> {
        let mut ids: BTreeSet<LightId> = self.layers.keys().cloned().collect();
        ids.extend(self.interpolations.keys().cloned());
        ids.extend(self.merged.keys().cloned());
        ids.extend(self.sink.tracked_light_ids());
        ids.into_iter().collect()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_layer(&mut self, light: &str, layer: Layer, color: Rgbio) {
        self.layers
            .entry(light.to_string())
            .or_default()
            .insert(layer, color);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lighting::color::BlendMode;
    use crate::lighting::sink::{ChannelSink, MemorySink};

    fn compositor() -> (Compositor, MemorySink) {
        let sink = MemorySink::new(vec!["a".to_string(), "b".to_string()]);
        let compositor = Compositor::new(Box::new(sink.clone()), CompositorSettings::default());
        (compositor, sink)
    }

    #[test]
    fn test_zero_duration_completes_on_first_pass() {
        let (mut compositor, sink) = compositor();
        let now = Instant::now();
        let red = Rgbio::new(255, 0, 0, 255);

        assert!(compositor.begin("a", 0, None, red, Duration::ZERO, Easing::Linear, now));
        compositor.advance(now);
        assert_eq!(sink.color("a"), Some(red));
        assert!(!compositor.has_interpolation("a", 0));
    }

    #[test]
    fn test_progress_is_clamped_and_eased() {
        let (mut compositor, sink) = compositor();
        let now = Instant::now();
        let white = Rgbio::new(200, 200, 200, 200);

        compositor.begin(
            "a",
            0,
            Some(Rgbio::black()),
            white,
            Duration::from_millis(100),
            Easing::EaseIn,
            now,
        );
        compositor.advance(now + Duration::from_millis(50));
        // 0.5 squared
        assert_eq!(sink.color("a").unwrap().red, 50);

        compositor.advance(now + Duration::from_millis(500));
        assert_eq!(sink.color("a"), Some(white));
        assert!(!compositor.has_interpolation("a", 0));
    }

    #[test]
    fn test_begin_starts_from_live_value() {
        let (mut compositor, _) = compositor();
        let now = Instant::now();

        compositor.set_immediate("a", 3, Rgbio::new(100, 0, 0, 0));
        compositor.begin(
            "a",
            3,
            None,
            Rgbio::new(200, 0, 0, 0),
            Duration::from_millis(100),
            Easing::Linear,
            now,
        );
        assert_eq!(compositor.layer_color("a", 3).unwrap().red, 100);
        compositor.advance(now + Duration::from_millis(50));
        assert_eq!(compositor.layer_color("a", 3).unwrap().red, 150);
    }

    #[test]
    fn test_layers_fold_in_ascending_order() {
        let (mut compositor, sink) = compositor();

        compositor.set_immediate("a", 0, Rgbio::new(0, 255, 0, 255));
        compositor.set_immediate(
            "a",
            5,
            Rgbio::new(255, 0, 0, 0)
                .with_opacity(0.5)
                .with_blend_mode(BlendMode::Add),
        );
        compositor.flush();

        let merged = sink.color("a").unwrap();
        assert_eq!((merged.red, merged.green, merged.blue), (128, 255, 0));
    }

    #[test]
    fn test_removing_last_layer_publishes_black() {
        let (mut compositor, sink) = compositor();

        compositor.set_immediate("a", 4, Rgbio::new(10, 20, 30, 40));
        compositor.flush();
        let before = sink.publish_count();

        compositor.remove("a", 4);
        assert_eq!(sink.publish_count(), before + 1);
        assert_eq!(sink.color("a"), Some(Rgbio::black()));
        assert!(compositor.occupied_layers("a").is_empty());
    }

    #[test]
    fn test_idle_passes_deliver_frames_the_sink_held_back() {
        let (sink, frames) = ChannelSink::new(vec!["a".to_string()], 1);
        let mut compositor = Compositor::new(Box::new(sink), CompositorSettings::default());
        let now = Instant::now();

        compositor.set_immediate("a", 0, Rgbio::new(10, 0, 0, 255));
        compositor.flush();
        // The channel is full, so this state can't be sent yet.
        compositor.set_immediate("a", 0, Rgbio::new(200, 0, 0, 255));
        compositor.flush();

        assert_eq!(frames.try_recv().unwrap().colors["a"].red, 10);
        assert!(frames.try_recv().is_err());

        // Nothing changes from here on, but the newest state still goes out.
        compositor.advance(now + Duration::from_millis(16));
        assert_eq!(frames.try_recv().unwrap().colors["a"].red, 200);

        // And once delivered, idle passes don't repeat it.
        compositor.advance(now + Duration::from_millis(32));
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn test_clear_blocks_begin_until_published() {
        let (mut compositor, sink) = compositor();
        let now = Instant::now();

        compositor.set_immediate("a", 1, Rgbio::new(255, 255, 255, 255));
        compositor.flush();

        sink.set_failing(true);
        assert!(!compositor.clear_all());
        assert!(compositor.is_clearing());
        assert!(!compositor.begin("a", 1, None, Rgbio::black(), Duration::ZERO, Easing::Linear, now));

        sink.set_failing(false);
        assert!(compositor.retry_clear());
        assert!(!compositor.is_clearing());
        assert_eq!(sink.color("a"), Some(Rgbio::black()));
        assert_eq!(sink.color("b"), Some(Rgbio::black()));
    }

    #[test]
    fn test_validation_repairs_corruption() {
        let (mut compositor, sink) = compositor();
        let now = Instant::now();

        let mut broken = Rgbio::new(1, 2, 3, 4);
        broken.opacity = 7.0;
        compositor.corrupt_layer("a", 2, broken);
        compositor.begin(
            "b",
            9,
            None,
            Rgbio::new(9, 9, 9, 9),
            Duration::from_secs(1),
            Easing::Linear,
            now,
        );

        let corrected = compositor.validate(now + Duration::from_secs(7));
        assert_eq!(corrected, 2);
        assert_eq!(compositor.layer_color("a", 2).unwrap().opacity, 1.0);
        assert!(!compositor.has_interpolation("b", 9));
        assert_eq!(sink.color("a").unwrap().red, 1);
    }

    #[test]
    fn test_emergency_reset_blacks_out_everything() {
        let (mut compositor, sink) = compositor();

        compositor.set_immediate("a", 0, Rgbio::new(255, 255, 255, 255));
        compositor.set_immediate("c", 7, Rgbio::new(255, 255, 255, 255));
        compositor.flush();

        compositor.emergency_reset("test");
        for light in ["a", "b", "c"] {
            assert_eq!(sink.color(light), Some(Rgbio::black()), "{}", light);
        }
        assert!(compositor.occupied_layers("a").is_empty());
    }
}

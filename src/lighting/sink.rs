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

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

use super::color::Rgbio;
use super::types::LightId;

/// Errors raised while publishing light state.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("output consumer disconnected")]
    Disconnected,
    #[error("publish failed: {0}")]
    Publish(String),
}

/// The boundary to whatever turns colors into hardware output.
pub trait LightSink: Send {
    /// Stages the color for a light. Nothing is sent until `publish`.
    fn set_color(&mut self, light: &str, color: Rgbio);

    /// Publishes everything staged since the last publish.
    fn publish(&mut self) -> Result<(), SinkError>;

    /// Every light this sink knows about, whether or not it has been written.
    fn tracked_light_ids(&self) -> Vec<LightId>;
}

/// A complete snapshot of published light state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub colors: BTreeMap<LightId, Rgbio>,
}

#[derive(Default)]
struct MemoryState {
    tracked: Vec<LightId>,
    pending: BTreeMap<LightId, Rgbio>,
    published: BTreeMap<LightId, Rgbio>,
    publish_count: u64,
    failing: bool,
}

/// An in-memory sink. Clones share state, so a test or a debug tool can keep
/// one handle while the engine owns the other.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new(tracked: Vec<LightId>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                tracked,
                ..Default::default()
            })),
        }
    }

    /// The last published color for a light.
    pub fn color(&self, light: &str) -> Option<Rgbio> {
        self.state.lock().published.get(light).copied()
    }

    pub fn published(&self) -> BTreeMap<LightId, Rgbio> {
        self.state.lock().published.clone()
    }

    pub fn publish_count(&self) -> u64 {
        self.state.lock().publish_count
    }

    /// Makes every subsequent publish fail until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl LightSink for MemorySink {
    fn set_color(&mut self, light: &str, color: Rgbio) {
        self.state.lock().pending.insert(light.to_string(), color);
    }

    fn publish(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(SinkError::Publish("memory sink set to fail".to_string()));
        }
        let pending = std::mem::take(&mut state.pending);
        state.published.extend(pending);
        state.publish_count += 1;
        Ok(())
    }

    fn tracked_light_ids(&self) -> Vec<LightId> {
        self.state.lock().tracked.clone()
    }
}

/// Hands frames to an output thread over a bounded channel. Publishing never
/// blocks: when the consumer falls behind the frame is dropped, and since
/// every frame carries the full state the next one catches it up.
pub struct ChannelSink {
    tracked: Vec<LightId>,
    state: BTreeMap<LightId, Rgbio>,
    dirty: bool,
    sequence: u64,
    dropped: u64,
    sender: Sender<Frame>,
}

impl ChannelSink {
    pub fn new(tracked: Vec<LightId>, capacity: usize) -> (Self, Receiver<Frame>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (
            Self {
                tracked,
                state: BTreeMap::new(),
                dirty: false,
                sequence: 0,
                dropped: 0,
                sender,
            },
            receiver,
        )
    }

    /// Number of frames dropped because the consumer was behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

impl LightSink for ChannelSink {
    fn set_color(&mut self, light: &str, color: Rgbio) {
        if self.state.get(light) != Some(&color) {
            self.state.insert(light.to_string(), color);
            self.dirty = true;
        }
    }

    fn publish(&mut self) -> Result<(), SinkError> {
        if !self.dirty {
            return Ok(());
        }

        self.sequence += 1;
        let frame = Frame {
            sequence: self.sequence,
            colors: self.state.clone(),
        };
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                // Stay dirty so the next publish carries this state.
                self.dropped += 1;
                debug!(sequence = self.sequence, "Output behind, dropping frame");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Disconnected),
        }
    }

    fn tracked_light_ids(&self) -> Vec<LightId> {
        let mut ids = self.tracked.clone();
        for id in self.state.keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_memory_sink_only_exposes_published_colors() {
        let mut sink = MemorySink::new(vec!["a".to_string()]);
        let observer = sink.clone();

        sink.set_color("a", Rgbio::new(1, 2, 3, 4));
        assert_eq!(observer.color("a"), None);

        sink.publish().unwrap();
        assert_eq!(observer.color("a"), Some(Rgbio::new(1, 2, 3, 4)));
        assert_eq!(observer.publish_count(), 1);

        observer.set_failing(true);
        assert!(sink.publish().is_err());
        assert_eq!(observer.publish_count(), 1);
    }

    #[test]
    fn test_channel_sink_drops_frames_instead_of_blocking() {
        let (mut sink, receiver) = ChannelSink::new(vec![], 1);

        sink.set_color("a", Rgbio::new(10, 0, 0, 0));
        sink.publish().unwrap();
        sink.set_color("a", Rgbio::new(20, 0, 0, 0));
        sink.publish().unwrap();
        assert_eq!(sink.dropped_frames(), 1);

        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame.colors["a"].red, 10);

        // The dropped state goes out with the next publish.
        sink.publish().unwrap();
        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame.colors["a"].red, 20);
        assert_eq!(sink.tracked_light_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_channel_sink_reports_disconnect() {
        let (mut sink, receiver) = ChannelSink::new(vec![], 4);
        drop(receiver);
        sink.set_color("a", Rgbio::black());
        assert!(matches!(sink.publish(), Err(SinkError::Disconnected)));
    }
}

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
use tracing::trace;

use super::EffectEngine;
use crate::lighting::driver::Driver;
use crate::lighting::types::GameEvent;

impl EffectEngine {
    /// Releases every instance gated on `event`, in both wait-for and
    /// wait-until position. Returns how many instances moved.
    pub fn dispatch(&mut self, event: GameEvent) -> usize {
        let now = self.current_time;
        let released = Driver::new(&mut self.registry, &mut self.compositor, now).deliver(&event);
        // Publish new transition starts now rather than on the next tick.
        self.compositor.flush();
        trace!(%event, released, "Dispatched event");
        released
    }

    pub fn on_beat(&mut self) -> usize {
        self.dispatch(GameEvent::Beat)
    }

    pub fn on_measure(&mut self) -> usize {
        self.dispatch(GameEvent::Measure)
    }

    pub fn on_keyframe(&mut self) -> usize {
        self.dispatch(GameEvent::Keyframe)
    }

    /// Note hits from the game (drum pads, kick, and so on).
    pub fn on_note(&mut self, note: GameEvent) -> usize {
        self.dispatch(note)
    }
}

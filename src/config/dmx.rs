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
use serde::Deserialize;

/// The port OLA listens on by default.
pub const DEFAULT_OLA_PORT: u16 = 9010;
/// How many frames may queue up between the engine and the output thread.
pub const DEFAULT_FRAME_BUFFER: usize = 4;

/// A YAML representation of the DMX output configuration.
#[derive(Deserialize, Clone, Default)]
pub(crate) struct Dmx {
    ola_port: Option<u16>,
    frame_buffer: Option<usize>,
}

impl Dmx {
    /// Gets the OLA port.
    pub(crate) fn ola_port(&self) -> u16 {
        self.ola_port.unwrap_or(DEFAULT_OLA_PORT)
    }

    /// Gets the frame buffer size. Never zero.
    pub(crate) fn frame_buffer(&self) -> usize {
        self.frame_buffer.unwrap_or(DEFAULT_FRAME_BUFFER).max(1)
    }
}

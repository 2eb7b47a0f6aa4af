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

//! Real-time stage lighting driven by rhythm-game events.
//!
//! The heart of the crate is the [`lighting`] module: a layered effect engine
//! that owns per-light animation state, advances it on a fixed tick, blends
//! overlapping layers into a single color per light and publishes the result
//! to a [`lighting::sink::LightSink`].

pub mod config;
pub mod dmx;
pub mod lighting;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

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

//! DMX output: maps published light colors onto DMX universes and sends them
//! through OLA.

mod ola_client;
mod output;
mod patch;

pub use ola_client::{connect, OlaClient, RealOlaClient};
pub use output::spawn_output;
pub use patch::{ChannelLayout, Patch, PatchEntry};

/// The number of channels in a DMX universe.
pub const UNIVERSE_SIZE: u16 = 512;

#[derive(Debug, thiserror::Error)]
pub enum DmxError {
    #[error("unable to connect to OLA on port {port}")]
    Connect { port: u16 },
    #[error("unknown channel layout {0:?}")]
    UnknownLayout(String),
    #[error("light {light} at address {address} needs {width} channels and does not fit in a universe")]
    AddressOutOfRange {
        light: String,
        address: u16,
        width: u16,
    },
    #[error("lights {first} and {second} overlap in universe {universe}")]
    Overlap {
        first: String,
        second: String,
        universe: u32,
    },
}

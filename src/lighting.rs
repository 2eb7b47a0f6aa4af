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

pub mod color;
pub mod compositor;
pub mod driver;
pub mod easing;
pub mod engine;
pub mod handle;
pub mod instance;
pub mod inventory;
pub mod registry;
pub mod sink;
pub mod types;

// Re-export the main types for convenience
pub use color::{BlendMode, Rgbio};
pub use easing::Easing;
pub use engine::{
    ApplyOutcome, BlackoutOutcome, EffectEngine, EffectOptions, EngineSettings,
};
pub use handle::LightingEngine;
pub use types::{
    Effect, GameEvent, Layer, LightId, TrackedLight, Transform, Transition, WaitCondition,
};

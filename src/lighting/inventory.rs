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

//! Resolves symbolic selectors into ordered light lists.
//!
//! Supported selectors: `all`, `even`, `odd`, `half-N`, `third-N`,
//! `quarter-N`, a group name, or a single light id. Lists always come back in
//! position order. Odd and even count from one, so `odd` starts with the
//! first light.

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::str::FromStr;

use tracing::warn;

use super::types::{LightId, TrackedLight};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Even,
    Odd,
    /// The `index`th of `parts` equal slices, counting from one.
    Part { parts: usize, index: usize },
    /// A group name or a light id.
    Named(String),
}

impl FromStr for Selector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Selector::from_name(s))
    }
}

impl Selector {
    pub fn from_name(s: &str) -> Selector {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => Selector::All,
            "even" => Selector::Even,
            "odd" => Selector::Odd,
            _ => match s.split_once('-') {
                Some((fraction, index)) => match (parts_for(fraction), index.parse::<usize>()) {
                    (Some(parts), Ok(index)) => Selector::Part { parts, index },
                    _ => Selector::Named(s),
                },
                None => Selector::Named(s),
            },
        }
    }
}

fn parts_for(fraction: &str) -> Option<usize> {
    match fraction {
        "half" => Some(2),
        "third" => Some(3),
        "quarter" => Some(4),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightInventory {
    lights: Vec<TrackedLight>,
    groups: HashMap<String, Vec<LightId>>,
}

impl LightInventory {
    pub fn new(mut lights: Vec<TrackedLight>, groups: HashMap<String, Vec<LightId>>) -> Self {
        lights.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        let groups = groups
            .into_iter()
            .map(|(name, members)| (name.to_lowercase(), members))
            .collect();
        Self { lights, groups }
    }

    /// Every light, in position order.
    pub fn lights(&self) -> &[TrackedLight] {
        &self.lights
    }

    pub fn ids(&self) -> Vec<LightId> {
        self.lights.iter().map(|light| light.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedLight> {
        self.lights.iter().find(|light| light.id == id)
    }

    /// Resolves a selector. Unknown names resolve to nothing, with a warning.
    pub fn select(&self, selector: &str) -> Vec<TrackedLight> {
        self.resolve(&Selector::from_name(selector))
    }

    /// Resolves several selectors into one list without duplicates.
    pub fn select_many(&self, selectors: &[&str]) -> Vec<TrackedLight> {
        let wanted: BTreeSet<LightId> = selectors
            .iter()
            .flat_map(|selector| self.select(selector))
            .map(|light| light.id)
            .collect();
        self.lights
            .iter()
            .filter(|light| wanted.contains(&light.id))
            .cloned()
            .collect()
    }

    pub fn resolve(&self, selector: &Selector) -> Vec<TrackedLight> {
        match selector {
            Selector::All => self.lights.clone(),
            Selector::Odd => self.every_other(0),
            Selector::Even => self.every_other(1),
            Selector::Part { parts, index } => self.part(*parts, *index),
            Selector::Named(name) => self.named(name),
        }
    }

    fn every_other(&self, offset: usize) -> Vec<TrackedLight> {
        self.lights
            .iter()
            .skip(offset)
            .step_by(2)
            .cloned()
            .collect()
    }

    fn part(&self, parts: usize, index: usize) -> Vec<TrackedLight> {
        if index == 0 || index > parts {
            warn!(parts, index, "Selector slice out of range");
            return Vec::new();
        }
        let count = self.lights.len();
        let start = count * (index - 1) / parts;
        let end = count * index / parts;
        self.lights[start..end].to_vec()
    }

    fn named(&self, name: &str) -> Vec<TrackedLight> {
        if let Some(members) = self.groups.get(name) {
            return self
                .lights
                .iter()
                .filter(|light| members.iter().any(|member| member.eq_ignore_ascii_case(&light.id)))
                .cloned()
                .collect();
        }

        match self.lights.iter().find(|light| light.id.eq_ignore_ascii_case(name)) {
            Some(light) => vec![light.clone()],
            None => {
                warn!(selector = name, "No lights match selector");
                Vec::new()
            }
        }
    }
}

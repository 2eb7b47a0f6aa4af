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
use crate::lighting::engine::tests::common::{blue, harness, light, lights, red};
use crate::lighting::engine::EffectOptions;
use crate::lighting::types::{Effect, GameEvent, Transition, WaitCondition};

fn on_event(name: &str, event: GameEvent, color: Rgbio) -> Effect {
    Effect::new(name, "event gated").with_transition(
        Transition::new(vec![light("L1")], 3, color, Duration::ZERO)
            .with_wait_for(WaitCondition::Event(event))
            .with_wait_until(WaitCondition::Event(GameEvent::Measure)),
    )
}

#[test]
fn test_beat_releases_wait_for() {
    let mut h = harness(&["L1"]);
    h.engine
        .add_effect("beat", on_event("beat", GameEvent::Beat, red()), EffectOptions::default());
    h.run(100, 10);
    assert_eq!(h.engine.layer_color("L1", 3), None);

    assert_eq!(h.engine.on_keyframe(), 0);
    assert_eq!(h.engine.on_beat(), 1);
    h.tick();
    assert_eq!(h.sink.color("L1"), Some(red()));
}

#[test]
fn test_measure_releases_wait_until() {
    let mut h = harness(&["L1"]);
    h.engine
        .add_effect("beat", on_event("beat", GameEvent::Beat, red()), EffectOptions::default());
    h.engine.on_beat();
    h.tick();
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(3, "beat".to_string())]);

    // Waiting until the measure, so more beats do nothing.
    assert_eq!(h.engine.on_beat(), 0);
    assert_eq!(h.engine.on_measure(), 1);
    assert!(h.engine.is_layer_free_for_light(3, "L1"));
    assert_eq!(h.sink.color("L1"), Some(Rgbio::black()));
}

#[test]
fn test_note_hits_are_events() {
    let mut h = harness(&["L1"]);
    h.engine.add_effect(
        "kick",
        on_event("kick", GameEvent::DrumKick, blue()),
        EffectOptions::default(),
    );

    assert_eq!(h.engine.on_note(GameEvent::DrumRed), 0);
    assert_eq!(h.engine.on_note(GameEvent::DrumKick), 1);
    assert_eq!(h.engine.on_note("star-power".parse().unwrap()), 0);
}

#[test]
fn test_unknown_event_names_still_match() {
    let mut h = harness(&["L1"]);
    let custom: GameEvent = "Star-Power".parse().unwrap();
    h.engine
        .add_effect("sp", on_event("sp", custom.clone(), red()), EffectOptions::default());
    assert_eq!(h.engine.dispatch(custom), 1);
}

#[test]
fn test_one_event_moves_each_light() {
    let mut h = harness(&["L1", "L2", "L3"]);
    let all = lights(&["L1", "L2", "L3"]);
    let effect = Effect::new("all", "").with_transition(
        Transition::new(all, 2, red(), Duration::from_millis(100))
            .with_wait_for(WaitCondition::Event(GameEvent::Beat)),
    );
    h.engine.add_effect("all", effect, EffectOptions::default());

    assert_eq!(h.engine.on_beat(), 3);
    h.run(100, 10);
    for id in ["L1", "L2", "L3"] {
        assert!(h.engine.is_layer_free_for_light(2, id));
    }
}

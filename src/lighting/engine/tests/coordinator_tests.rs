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
use crate::lighting::engine::tests::common::{blue, green, harness, holding, light, lights, red, simple};
use crate::lighting::engine::{ApplyOutcome, EffectOptions, SET_STATE_EFFECT};
use crate::lighting::types::Effect;

#[test]
fn test_same_name_queues_behind_running_instance() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    h.engine
        .add_effect("chase", simple("chase", &l1, 2, red(), 200), EffectOptions::default());
    h.run(50, 10);
    h.engine
        .add_effect("chase", simple("chase", &l1, 2, blue(), 200), EffectOptions::default());

    assert_eq!(h.engine.queued_effect(2, "L1"), Some("chase".to_string()));
    // The running instance keeps going toward red.
    h.run(50, 10);
    let color = h.engine.layer_color("L1", 2).unwrap();
    assert!(color.red > 0 && color.blue == 0);

    // Then the queued one takes over from red.
    h.run(110, 10);
    assert_eq!(h.engine.queued_effect(2, "L1"), None);
    let color = h.engine.layer_color("L1", 2).unwrap();
    assert!(color.blue > 0 && color.red < 255);
}

#[test]
fn test_reserved_layers_are_rejected() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    let outcome = h.engine.add_effect(
        "odd",
        simple("odd", &l1, 230, red(), 100),
        EffectOptions::default(),
    );
    assert_eq!(outcome, ApplyOutcome::Rejected);
    assert_eq!(h.engine.active_instance_count(), 0);

    // The strobe layer above them is fine.
    let outcome = h.engine.add_effect(
        "strobe",
        simple("strobe", &l1, 255, red(), 100),
        EffectOptions::default(),
    );
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(255, "strobe".to_string())]);
}

#[test]
fn test_different_name_evicts_and_drops_queue() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    h.engine
        .add_effect("a", simple("a", &l1, 2, red(), 200), EffectOptions::default());
    h.engine
        .add_effect("a", simple("a", &l1, 2, red(), 200), EffectOptions::default());
    assert_eq!(h.engine.queued_effect(2, "L1"), Some("a".to_string()));

    h.engine
        .add_effect("b", simple("b", &l1, 2, blue(), 200), EffectOptions::default());
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(2, "b".to_string())]);
    assert_eq!(h.engine.queued_effect(2, "L1"), None);
}

#[test]
fn test_at_most_one_queued_per_slot() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    for _ in 0..5 {
        h.engine
            .add_effect("a", simple("a", &l1, 2, red(), 200), EffectOptions::default());
    }
    assert_eq!(h.engine.active_instance_count(), 1);
    assert_eq!(h.engine.queued_effect(2, "L1"), Some("a".to_string()));
}

#[test]
fn test_empty_effect_is_rejected() {
    let mut h = harness(&["L1"]);
    let outcome = h
        .engine
        .add_effect("empty", Effect::new("empty", "nothing"), EffectOptions::default());
    assert_eq!(outcome, ApplyOutcome::Rejected);
    assert_eq!(h.engine.active_instance_count(), 0);
}

#[test]
fn test_set_clears_other_effects() {
    let mut h = harness(&["L1", "L2"]);
    let all = lights(&["L1", "L2"]);

    h.engine
        .add_effect("upper", holding("upper", &all, 7, red()), EffectOptions::default());
    h.tick();

    h.engine
        .set_effect("base", holding("base", &all[..1], 0, green()), EffectOptions::default());
    assert!(h.engine.active_effects_for_light("L2").is_empty());
    assert_eq!(h.engine.layer_color("L2", 7), None);
    assert_eq!(h.sink.color("L2"), Some(Rgbio::black()));

    h.tick();
    assert_eq!(h.sink.color("L1"), Some(green()));
}

#[test]
fn test_repeated_set_of_base_owner_queues() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    h.engine
        .set_effect("base", holding("base", &l1, 0, green()), EffectOptions::default());
    h.engine
        .add_effect("accent", holding("accent", &l1, 3, red()), EffectOptions::default());
    h.tick();

    h.engine
        .set_effect("base", holding("base", &l1, 0, green()), EffectOptions::default());
    assert_eq!(h.engine.queued_effect(0, "L1"), Some("base".to_string()));
    assert!(h
        .engine
        .active_effects_for_light("L1")
        .contains(&(3, "accent".to_string())));

    // A different set still clears everything.
    h.engine
        .set_effect("other", holding("other", &l1, 0, blue()), EffectOptions::default());
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(0, "other".to_string())]);
    assert_eq!(h.engine.queued_effect(0, "L1"), None);
}

#[test]
fn test_unblocked_set_refuses_running_name() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    h.engine
        .add_effect("busy", holding("busy", &l1, 4, red()), EffectOptions::default());
    let outcome = h
        .engine
        .set_effect_unblocked("busy", holding("busy", &l1, 0, blue()), EffectOptions::default());
    assert!(outcome.is_rejected());
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(4, "busy".to_string())]);

    let outcome = h
        .engine
        .set_effect_unblocked("calm", holding("calm", &l1, 0, blue()), EffectOptions::default());
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(0, "calm".to_string())]);
}

#[test]
fn test_offset_defers_and_can_be_cancelled() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    let outcome = h.engine.add_effect(
        "later",
        holding("later", &l1, 2, red()),
        EffectOptions::default().with_offset(Duration::from_millis(100)),
    );
    let ApplyOutcome::Deferred(_) = outcome else {
        panic!("expected a deferred application, got {:?}", outcome);
    };
    h.run(90, 10);
    assert!(h.engine.is_layer_free_for_light(2, "L1"));
    h.run(10, 10);
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(2, "later".to_string())]);

    let outcome = h.engine.add_effect(
        "never",
        holding("never", &l1, 3, red()),
        EffectOptions::default().with_offset(Duration::from_millis(100)),
    );
    let ApplyOutcome::Deferred(id) = outcome else {
        panic!("expected a deferred application, got {:?}", outcome);
    };
    assert!(h.engine.cancel_scheduled(id));
    assert!(!h.engine.cancel_scheduled(id));
    h.run(200, 10);
    assert!(h.engine.is_layer_free_for_light(3, "L1"));
}

#[test]
fn test_remove_effect_only_touches_name_and_layer() {
    let mut h = harness(&["L1"]);
    let l1 = [light("L1")];

    h.engine
        .add_effect("a", holding("a", &l1, 2, red()), EffectOptions::default());
    h.engine
        .add_effect("a", holding("a", &l1, 3, red()), EffectOptions::default());
    h.tick();

    assert!(h.engine.remove_effect("a", 2));
    assert!(!h.engine.remove_effect("a", 2));
    assert!(!h.engine.remove_effect("b", 3));
    assert_eq!(h.engine.active_effects_for_light("L1"), vec![(3, "a".to_string())]);
    assert_eq!(h.engine.layer_color("L1", 2), None);
    assert_eq!(h.sink.color("L1"), Some(red()));
}

#[test]
fn test_set_state_fades_base_layer() {
    let mut h = harness(&["L1", "L2"]);
    let all = lights(&["L1", "L2"]);

    let outcome = h
        .engine
        .set_state(&all, blue(), Duration::from_millis(100));
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert!(h
        .engine
        .active_effects_for_light("L2")
        .contains(&(0, SET_STATE_EFFECT.to_string())));

    h.run(100, 10);
    assert_eq!(h.sink.color("L1"), Some(blue()));
    assert_eq!(h.sink.color("L2"), Some(blue()));
    // Base layer state stays after the effect finishes.
    assert_eq!(h.engine.layer_color("L1", 0), Some(blue()));

    assert!(h.engine.set_state(&[], red(), Duration::ZERO).is_rejected());
}

#[test]
fn test_remove_light() {
    let mut h = harness(&["L1", "L2"]);
    let all = lights(&["L1", "L2"]);

    h.engine
        .add_effect("wash", holding("wash", &all, 1, red()), EffectOptions::default());
    h.tick();

    h.engine.remove_light("L1");
    assert!(h.engine.active_effects_for_light("L1").is_empty());
    assert!(h.engine.occupied_layers("L1").is_empty());
    assert_eq!(h.sink.color("L1"), Some(Rgbio::black()));
    assert_eq!(h.engine.active_effects_for_light("L2"), vec![(1, "wash".to_string())]);
}

//! End-to-end scenario 1 (silence) and the universal "every sample is
//! finite and in range" invariant from the testable-properties list.

mod common;

use common::{render_held_note, single_sine_preset};
use dx7_synth::Synth;

#[test]
fn no_events_renders_silence() {
    let mut synth = Synth::new(16, 1);
    let mut out = vec![0.0f32; 1024];
    synth.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn every_sample_finite_and_clipped() {
    let preset = single_sine_preset(99);
    let samples = render_held_note(preset, 69, 127, 4096);
    for &s in &samples {
        assert!(s.is_finite());
        assert!((-1.0..=1.0).contains(&s));
    }
}

#[test]
fn note_on_makes_a_voice_active_for_at_least_one_render() {
    let mut synth = Synth::new(16, 1);
    synth.load_preset(single_sine_preset(99));
    synth.note_on(69, 100);
    assert_eq!(synth.active_voice_count(), 1);
    let mut out = vec![0.0f32; 256];
    synth.render(&mut out);
    assert_eq!(synth.active_voice_count(), 1);
}

#[test]
fn all_six_operators_silent_renders_silence() {
    let preset = single_sine_preset(0);
    let samples = render_held_note(preset, 69, 127, 2048);
    assert!(samples.iter().all(|&s| s == 0.0));
}

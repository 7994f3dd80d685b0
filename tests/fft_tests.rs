//! FFT-based end-to-end scenarios: dominant frequency of a plain sine
//! voice (scenario 2) and LFO vibrato's instantaneous frequency sweep
//! (scenario 6).

mod common;

use common::{all_carrier_preset, dominant_frequency_hz, render_held_note};
use dx7_synth::preset::{LfoPreset, OperatorPreset, Preset};
use dx7_synth::{Synth, SAMPLE_RATE};

#[test]
fn single_sine_carrier_dominant_frequency_is_440hz() {
    let preset = all_carrier_preset(99);
    // A window of exactly SAMPLE_RATE samples gives an FFT bin width of
    // 1Hz with zero spectral leakage for an on-the-grid 440Hz tone, so
    // the dominant bin lands exactly at 440 rather than needing
    // interpolation across a few bins.
    let samples = render_held_note(preset, 69, 127, SAMPLE_RATE as usize);

    let freq = dominant_frequency_hz(&samples, SAMPLE_RATE);
    assert!(
        (freq - 440.0).abs() <= 1.0,
        "expected ~440Hz, got {freq}Hz"
    );
}

#[test]
fn rms_is_stable_across_successive_blocks_after_attack() {
    let preset = all_carrier_preset(99);
    let mut synth = Synth::new(1, 1);
    synth.load_preset(preset);
    synth.note_on(69, 127);

    // Discard the first 512 samples (attack settling), per scenario 2.
    let mut warmup = vec![0.0f32; 512];
    synth.render(&mut warmup);

    let rms = |buf: &[f32]| -> f32 {
        (buf.iter().map(|&s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
    };

    let mut block_a = vec![0.0f32; 1024];
    synth.render(&mut block_a);
    let mut block_b = vec![0.0f32; 1024];
    synth.render(&mut block_b);

    let rms_a = rms(&block_a);
    let rms_b = rms(&block_b);
    assert!(rms_a > 0.0);
    assert!(
        (rms_a - rms_b).abs() / rms_a < 0.01,
        "RMS drifted more than 1%: {rms_a} vs {rms_b}"
    );
}

#[test]
fn feedback_operator_as_carrier_does_not_explode() {
    // Algorithm 32 (index 31): all operators are carriers, and operator 6
    // (index 5) is the feedback operator with only a self-edge.
    let mut preset = all_carrier_preset(99);
    preset.algorithm = 31;
    preset.feedback = 7;

    let samples = render_held_note(preset, 69, 127, 4096);

    let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    assert!(peak <= 1.0, "feedback output exceeded clip range: {peak}");

    let below_99_count = samples.iter().filter(|&&s| s.abs() < 0.99).count();
    assert!(
        below_99_count as f32 / samples.len() as f32 >= 0.9,
        "feedback carrier stayed pinned near full scale too often"
    );
}

#[test]
fn lfo_vibrato_sweeps_plus_minus_one_octave() {
    let mut operators: [OperatorPreset; 6] = std::array::from_fn(|_| OperatorPreset::default());
    operators[0].output_level = 99;
    operators[0].level1 = 99;
    operators[0].level2 = 99;
    operators[0].level3 = 99;
    operators[0].level4 = 0;
    for op in operators.iter_mut().skip(1) {
        op.output_level = 0;
    }
    let preset = Preset {
        name: "VIBRATO".to_string(),
        algorithm: 31,
        feedback: 0,
        lfo: LfoPreset {
            waveform: 4, // sine
            speed: 35,   // ~0.6 Hz
            delay: 0,
            pmd: 99,
            amd: 0,
            key_sync: true,
        },
        operators,
    };

    let mut synth = Synth::new(1, 1);
    synth.load_preset(preset);
    synth.note_on(69, 100);

    let total = 88_200usize;
    let mut out = vec![0.0f32; total];
    for block in out.chunks_mut(1024) {
        synth.render(block);
    }

    // Slide a short FFT window across the render and track the
    // instantaneous dominant frequency; its peak-to-peak swing should
    // cover roughly 220Hz (one octave down) to 880Hz (one octave up).
    let window = 2048;
    let hop = 512;
    let mut min_freq = f32::MAX;
    let mut max_freq = f32::MIN;
    let mut pos = 0;
    while pos + window <= out.len() {
        let freq = dominant_frequency_hz(&out[pos..pos + window], SAMPLE_RATE);
        min_freq = min_freq.min(freq);
        max_freq = max_freq.max(freq);
        pos += hop;
    }

    assert!(min_freq < 300.0, "expected a dip well below 440Hz, got {min_freq}Hz");
    assert!(max_freq > 600.0, "expected a peak well above 440Hz, got {max_freq}Hz");
}

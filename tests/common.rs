use dx7_synth::preset::{LfoPreset, OperatorPreset, Preset};
use dx7_synth::Synth;
use num_complex::Complex32;
use rustfft::FftPlanner;

/// Algorithm 32 (index 31): every operator is a carrier, no modulation.
/// Useful as a "plain sine" fixture for frequency/amplitude assertions
/// that don't want FM sidebands in the way.
pub fn all_carrier_preset(output_level: u8) -> Preset {
    let mut operators: [OperatorPreset; 6] = std::array::from_fn(|_| OperatorPreset::default());
    for op in operators.iter_mut() {
        op.output_level = output_level;
        op.level1 = 99;
        op.level2 = 99;
        op.level3 = 99;
        op.level4 = 0;
        op.rate1 = 99;
        op.rate2 = 99;
        op.rate3 = 99;
        op.rate4 = 99;
    }
    Preset {
        name: "ALL CARRIERS".to_string(),
        algorithm: 31,
        feedback: 0,
        lfo: LfoPreset::default(),
        operators,
    }
}

/// Same as [`all_carrier_preset`] but with only operator 0 audible (the
/// rest at output level 0), for a single clean sine tone.
pub fn single_sine_preset(output_level: u8) -> Preset {
    let mut preset = all_carrier_preset(output_level);
    for op in preset.operators.iter_mut().skip(1) {
        op.output_level = 0;
    }
    preset
}

/// Render `n` samples from a freshly constructed single-voice `Synth`
/// with `preset` loaded, playing `note` at `velocity` for the whole
/// duration (no note_off). Rendered in fixed-size chunks so `n` can
/// exceed a single `Synth`'s block-size cap.
pub fn render_held_note(preset: Preset, note: u8, velocity: u8, n: usize) -> Vec<f32> {
    const CHUNK: usize = 1024;
    let mut synth = Synth::new(1, 1);
    synth.load_preset(preset);
    synth.note_on(note, velocity);

    let mut out = vec![0.0f32; n];
    for block in out.chunks_mut(CHUNK) {
        synth.render(block);
    }
    out
}

/// FFT magnitude spectrum's peak-frequency bin, in Hz, for a real-valued
/// signal sampled at `sample_rate`. Callers should feed in a window long
/// enough to resolve the frequency of interest.
pub fn dominant_frequency_hz(samples: &[f32], sample_rate: f32) -> f32 {
    let n = samples.len();
    let mut buffer: Vec<Complex32> = samples.iter().map(|&s| Complex32::new(s, 0.0)).collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let mut best_bin = 1;
    let mut best_mag = 0.0f32;
    // Only the first half is meaningful for a real input; skip DC (bin 0).
    for (bin, value) in buffer.iter().enumerate().take(n / 2).skip(1) {
        let mag = value.norm();
        if mag > best_mag {
            best_mag = mag;
            best_bin = bin;
        }
    }
    best_bin as f32 * sample_rate / n as f32
}

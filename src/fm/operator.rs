//! A single FM operator: sine oscillator, envelope, level scaling.
//!
//! An operator's output is used either as a carrier (summed into the
//! audible mix) or as a modulator (its output is phase-modulation input,
//! in radians, to another operator). Which role it plays on a given note
//! is determined by the [`crate::fm::algorithm::Topology`], not by the
//! operator itself.

use crate::fm::envelope::Envelope;

const MAX_MODULATION_INDEX: f32 = 13.0;

fn output_level_to_amplitude(level: u8) -> f32 {
    let level = level.min(99);
    if level == 0 {
        return 0.0;
    }
    let db = (99 - level) as f32 * 0.75;
    10f32.powf(-db / 20.0)
}

fn output_level_to_mod_index(level: u8) -> f32 {
    output_level_to_amplitude(level) * MAX_MODULATION_INDEX
}

/// Coarse/fine ratio, per DX7 convention: coarse 0 means a half-octave-down
/// sub ratio rather than literal zero.
fn compute_frequency_ratio(coarse: u8, fine: u8) -> f32 {
    let coarse = coarse.min(31);
    let fine = fine.min(99) as f32;
    let base = if coarse == 0 { 0.5 } else { coarse as f32 };
    base * (1.0 + fine * 0.01)
}

const DETUNE_CENTS_PER_STEP: f32 = 1.018;

fn detune_multiplier(detune: i8) -> f32 {
    let detune = detune.clamp(-7, 7) as f32;
    2f32.powf(detune * DETUNE_CENTS_PER_STEP / 1200.0)
}

fn velocity_scale(velocity: u8, sensitivity: u8) -> f32 {
    let sensitivity = sensitivity.min(7);
    if sensitivity == 0 {
        return 1.0;
    }
    let velocity = velocity.min(127) as f32;
    let vel_norm = velocity / 127.0;
    let floor = 1.0 - (sensitivity as f32 / 7.0);
    floor + (1.0 - floor) * vel_norm
}

/// Curve shape used on each side of a keyboard-level-scaling breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingCurve {
    NegativeLinear,
    NegativeExponential,
    PositiveExponential,
    PositiveLinear,
}

impl ScalingCurve {
    /// Decode a raw curve id (0..3); out-of-range values fall back to
    /// `NegativeLinear`, matching the DX7's own curve 0.
    pub fn from_raw(id: u8) -> Self {
        match id {
            0 => ScalingCurve::NegativeLinear,
            1 => ScalingCurve::NegativeExponential,
            2 => ScalingCurve::PositiveExponential,
            3 => ScalingCurve::PositiveLinear,
            _ => ScalingCurve::NegativeLinear,
        }
    }
}

/// Per-operator keyboard level scaling: attenuates or boosts output level
/// as a function of distance from a breakpoint note.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardScaling {
    pub breakpoint: u8,
    pub left_depth: u8,
    pub right_depth: u8,
    pub left_curve: ScalingCurve,
    pub right_curve: ScalingCurve,
}

impl Default for KeyboardScaling {
    fn default() -> Self {
        KeyboardScaling {
            breakpoint: 60,
            left_depth: 0,
            right_depth: 0,
            left_curve: ScalingCurve::NegativeLinear,
            right_curve: ScalingCurve::NegativeLinear,
        }
    }
}

impl KeyboardScaling {
    /// Linear amplitude multiplier for a MIDI note relative to the
    /// breakpoint. 1.0 at the breakpoint itself.
    pub fn scale_factor(&self, note: u8) -> f32 {
        let distance = note as i32 - self.breakpoint as i32;
        let (depth, curve, dist_abs) = match distance.cmp(&0) {
            std::cmp::Ordering::Less => (self.left_depth, self.left_curve, -distance),
            std::cmp::Ordering::Greater => (self.right_depth, self.right_curve, distance),
            std::cmp::Ordering::Equal => return 1.0,
        };
        if depth == 0 {
            return 1.0;
        }
        let norm = (dist_abs as f32 / 48.0).min(1.0);
        let max_db = depth as f32 * 0.75;
        let db_offset = match curve {
            ScalingCurve::NegativeLinear => -max_db * norm,
            ScalingCurve::NegativeExponential => -max_db * norm * norm,
            ScalingCurve::PositiveExponential => max_db * norm * norm,
            ScalingCurve::PositiveLinear => max_db * norm,
        };
        10f32.powf(db_offset / 20.0)
    }
}

fn key_rate_scaling(rate: u8, note: u8, krs: u8) -> u8 {
    let krs = krs.min(7);
    if krs == 0 {
        return rate.min(99);
    }
    let adjustment = krs as f32 * (note as i32 - 36).max(0) as f32 / 36.0;
    ((rate as f32 + adjustment).round() as i32).clamp(0, 99) as u8
}

/// Whether an operator's frequency tracks the played note or is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OscillatorMode {
    Ratio,
    Fixed,
}

/// Static (non-envelope) parameters of one operator, as decoded from a
/// [`crate::preset::Preset`].
#[derive(Clone, Copy, Debug)]
pub struct OperatorParams {
    pub osc_mode: OscillatorMode,
    pub coarse: u8,
    pub fine: u8,
    pub detune: i8,
    pub output_level: u8,
    pub rates: [u8; 4],
    pub levels: [u8; 4],
    pub velocity_sensitivity: u8,
    pub key_rate_scaling: u8,
    pub kls: KeyboardScaling,
}

impl Default for OperatorParams {
    fn default() -> Self {
        OperatorParams {
            osc_mode: OscillatorMode::Ratio,
            coarse: 1,
            fine: 0,
            detune: 0,
            output_level: 99,
            rates: [99, 99, 99, 99],
            levels: [99, 99, 99, 0],
            velocity_sensitivity: 0,
            key_rate_scaling: 0,
            kls: KeyboardScaling::default(),
        }
    }
}

/// A single operator: phase accumulator, envelope, and cached per-note
/// amplitude/modulation-index values.
#[derive(Clone, Debug)]
pub struct Operator {
    params: OperatorParams,
    envelope: Envelope,
    phase: f32,
    freq_hz: f32,
    amplitude: f32,
    mod_index: f32,
    sample_rate: f32,
}

impl Operator {
    /// Build an operator from static parameters at the given sample rate,
    /// with an idle envelope.
    pub fn new(params: OperatorParams, sample_rate: f32) -> Self {
        let envelope = Envelope::new(params.rates, params.levels, sample_rate);
        Operator {
            params,
            envelope,
            phase: 0.0,
            freq_hz: 440.0,
            amplitude: 0.0,
            mod_index: 0.0,
            sample_rate,
        }
    }

    /// Replace this operator's parameters, rebuilding its (idle) envelope.
    /// Does not touch phase; callers gate_on afterward to reinitialize it.
    pub fn load_params(&mut self, params: OperatorParams) {
        self.envelope = Envelope::new(params.rates, params.levels, self.sample_rate);
        self.params = params;
    }

    /// Trigger the operator for a newly-gated note.
    pub fn gate_on(&mut self, note: u8, velocity: u8, base_freq_hz: f32) {
        let p = &self.params;

        self.freq_hz = match p.osc_mode {
            OscillatorMode::Ratio => {
                let ratio = compute_frequency_ratio(p.coarse, p.fine);
                base_freq_hz * ratio * detune_multiplier(p.detune)
            }
            OscillatorMode::Fixed => {
                let fixed_base = 10f32.powi(p.coarse.min(3) as i32);
                fixed_base * (1.0 + p.fine as f32 * 0.01) * detune_multiplier(p.detune)
            }
        };

        let vel_scale = velocity_scale(velocity, p.velocity_sensitivity);
        let kls_scale = p.kls.scale_factor(note);

        let base_amp = output_level_to_amplitude(p.output_level);
        self.amplitude = base_amp * vel_scale * kls_scale;
        self.mod_index = output_level_to_mod_index(p.output_level) * vel_scale * kls_scale;

        self.phase = 0.0;

        let adjusted_rates = [
            key_rate_scaling(p.rates[0], note, p.key_rate_scaling),
            key_rate_scaling(p.rates[1], note, p.key_rate_scaling),
            key_rate_scaling(p.rates[2], note, p.key_rate_scaling),
            key_rate_scaling(p.rates[3], note, p.key_rate_scaling),
        ];
        self.envelope.set_rates(adjusted_rates);
        self.envelope.gate_on();
    }

    /// Begin release.
    pub fn gate_off(&mut self) {
        self.envelope.gate_off();
    }

    /// True while the envelope has not reached idle.
    pub fn is_active(&self) -> bool {
        !self.envelope.is_idle()
    }

    /// Carrier-role amplitude cached at gate_on.
    pub fn carrier_amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Modulator-role modulation index (radians) cached at gate_on.
    pub fn modulation_index(&self) -> f32 {
        self.mod_index
    }

    /// Render `out.len()` samples into `out`. `modulation`, if given, is
    /// added (in radians) to this operator's phase before the sine is
    /// taken. `freq_ratio`, if given, multiplies the per-sample phase
    /// increment (pitch bend / LFO vibrato). `as_carrier` selects whether
    /// the output is scaled by carrier amplitude or by modulation index.
    pub fn render(
        &mut self,
        out: &mut [f32],
        modulation: Option<&[f32]>,
        as_carrier: bool,
        freq_ratio: Option<&[f32]>,
        env_scratch: &mut [f32],
    ) {
        let n = out.len();
        self.envelope.render(&mut env_scratch[..n]);

        let base_inc = 2.0 * std::f32::consts::PI * self.freq_hz / self.sample_rate;
        let scale = if as_carrier {
            self.amplitude
        } else {
            self.mod_index
        };

        let mut phase = self.phase;
        for i in 0..n {
            let inc = match freq_ratio {
                Some(fr) => base_inc * fr[i],
                None => base_inc,
            };
            let mut p = phase;
            if let Some(modulation) = modulation {
                p += modulation[i];
            }
            out[i] = p.sin() * env_scratch[i] * scale;
            phase = (phase + inc) % (2.0 * std::f32::consts::PI);
        }
        self.phase = phase;
    }

    /// Render with self-feedback: sample-by-sample, each output feeding a
    /// two-sample state that phase-modulates the next sample. Only used
    /// for the topology's designated feedback operator when the feedback
    /// level is non-zero.
    ///
    /// Always scales the final output by the operator's modulation index,
    /// never by its carrier amplitude, even when the feedback operator is
    /// also a carrier: the caller (the algorithm renderer) rescales by
    /// `carrier_amp / mod_index` in that case, so this function doesn't
    /// need to know which role it's playing.
    pub fn render_with_feedback(
        &mut self,
        out: &mut [f32],
        feedback_level: f32,
        feedback_state: &mut [f32; 2],
        freq_ratio: Option<&[f32]>,
        env_scratch: &mut [f32],
    ) {
        let n = out.len();
        self.envelope.render(&mut env_scratch[..n]);

        let base_inc = 2.0 * std::f32::consts::PI * self.freq_hz / self.sample_rate;
        let mut phase = self.phase;
        let [mut fb0, mut fb1] = *feedback_state;

        for i in 0..n {
            let fb = feedback_level * (fb0 + fb1) * 0.5;
            let sample = (phase + fb).sin();
            out[i] = sample;
            fb0 = fb1;
            fb1 = sample;
            let inc = match freq_ratio {
                Some(fr) => base_inc * fr[i],
                None => base_inc,
            };
            phase = (phase + inc) % (2.0 * std::f32::consts::PI);
        }

        *feedback_state = [fb0, fb1];
        self.phase = phase;

        for i in 0..n {
            out[i] *= env_scratch[i] * self.mod_index;
        }
    }

    /// Hard-stop: idle envelope, zero phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.envelope.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_level_endpoints() {
        assert_eq!(output_level_to_amplitude(0), 0.0);
        assert!((output_level_to_amplitude(99) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mod_index_capped_near_thirteen() {
        let idx = output_level_to_mod_index(99);
        assert!((idx - 13.0).abs() < 1e-3);
    }

    #[test]
    fn coarse_zero_is_half_ratio() {
        assert_eq!(compute_frequency_ratio(0, 0), 0.5);
        assert_eq!(compute_frequency_ratio(2, 0), 2.0);
    }

    #[test]
    fn velocity_sensitivity_zero_ignores_velocity() {
        assert_eq!(velocity_scale(1, 0), 1.0);
        assert_eq!(velocity_scale(127, 0), 1.0);
    }

    #[test]
    fn kls_at_breakpoint_is_unity() {
        let kls = KeyboardScaling {
            breakpoint: 60,
            left_depth: 50,
            right_depth: 50,
            left_curve: ScalingCurve::NegativeLinear,
            right_curve: ScalingCurve::PositiveLinear,
        };
        assert_eq!(kls.scale_factor(60), 1.0);
    }

    #[test]
    fn key_rate_scaling_raises_rate_above_c2() {
        assert_eq!(key_rate_scaling(50, 36, 7), 50);
        assert!(key_rate_scaling(50, 96, 7) > 50);
    }

    #[test]
    fn render_keeps_phase_in_range() {
        let mut op = Operator::new(OperatorParams::default(), crate::SAMPLE_RATE);
        op.gate_on(69, 100, 440.0);
        let mut out = [0.0; 1024];
        let mut env = [0.0; 1024];
        op.render(&mut out, None, true, None, &mut env);
        assert!(op.phase >= 0.0 && op.phase < 2.0 * std::f32::consts::PI);
    }

    #[test]
    fn feedback_stays_bounded() {
        let mut op = Operator::new(OperatorParams::default(), crate::SAMPLE_RATE);
        op.gate_on(69, 100, 440.0);
        let mut out = [0.0; 512];
        let mut env = [0.0; 512];
        let mut fb = [0.0; 2];
        op.render_with_feedback(&mut out, std::f32::consts::FRAC_PI_4, &mut fb, None, &mut env);
        for &s in out.iter() {
            assert!(s.is_finite());
            assert!(s.abs() <= 1.5);
        }
    }
}

//! Low-frequency oscillator: vibrato (pitch) and tremolo (amplitude).
//!
//! One LFO is shared by all six operators in a voice. It produces two
//! per-sample output streams: a bipolar pitch-modulation signal and a
//! unipolar amplitude-modulation (attenuation) signal, both optionally
//! faded in over a configurable delay after gate_on.

use crate::fm::rng::VoiceRng;

/// LFO waveform shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    /// Zero at phase 0, +1 at 0.25, 0 at 0.5, -1 at 0.75.
    Triangle,
    /// Ramps from +1 down to -1 across one cycle.
    SawDown,
    /// Ramps from -1 up to +1 across one cycle.
    SawUp,
    /// +1 for the first half of the cycle, -1 for the second.
    Square,
    Sine,
    /// Latches a new uniform random value each time phase wraps.
    SampleAndHold,
}

impl Waveform {
    /// Decode a raw DX7 waveform id (0..5), defaulting unknown values to
    /// [`Waveform::Triangle`] as the DX7's own id 0.
    pub fn from_raw(id: u8) -> Self {
        match id {
            0 => Waveform::Triangle,
            1 => Waveform::SawDown,
            2 => Waveform::SawUp,
            3 => Waveform::Square,
            4 => Waveform::Sine,
            _ => Waveform::SampleAndHold,
        }
    }
}

fn speed_to_hz(speed: u8) -> f32 {
    0.062 * (speed as f32 * 0.0684).exp()
}

fn delay_to_seconds(delay: u8) -> f32 {
    if delay == 0 {
        0.0
    } else {
        (delay as f32) * (delay as f32) * 0.0005
    }
}

/// The low-frequency oscillator.
#[derive(Clone, Debug)]
pub struct Lfo {
    waveform: Waveform,
    pmd: u8,
    amd: u8,
    key_sync: bool,
    freq_hz: f32,
    delay_samples: u32,
    sample_rate: f32,

    phase: f32,
    sample_counter: u64,
    sh_value: f32,
    sh_last_phase: f32,
}

impl Lfo {
    /// Build an LFO from raw DX7 parameters at the given sample rate.
    /// Speed/delay/pmd/amd are clamped to 0..99.
    pub fn new(
        waveform_id: u8,
        speed: u8,
        delay: u8,
        pmd: u8,
        amd: u8,
        key_sync: bool,
        sample_rate: f32,
    ) -> Self {
        let speed = speed.min(99);
        let delay = delay.min(99);
        let delay_time = delay_to_seconds(delay);
        Lfo {
            waveform: Waveform::from_raw(waveform_id),
            pmd: pmd.min(99),
            amd: amd.min(99),
            key_sync,
            freq_hz: speed_to_hz(speed),
            delay_samples: (delay_time * sample_rate).round() as u32,
            sample_rate,
            phase: 0.0,
            sample_counter: 0,
            sh_value: 0.0,
            sh_last_phase: 0.0,
        }
    }

    /// Reset runtime state for a new note. Phase resets to 0 only if
    /// key-sync is enabled; the sample counter and S&H state always reset.
    pub fn gate_on(&mut self) {
        if self.key_sync {
            self.phase = 0.0;
        }
        self.sample_counter = 0;
        self.sh_value = 0.0;
        self.sh_last_phase = 0.0;
    }

    /// Hard reset to the initial, never-gated state.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.sample_counter = 0;
        self.sh_value = 0.0;
        self.sh_last_phase = 0.0;
    }

    /// Render one block, writing bipolar pitch modulation into
    /// `pitch_mod` and unipolar amplitude attenuation into `amp_mod`.
    /// `extra_pmd` is the mod-wheel's additional pitch depth, in [0, 1].
    pub fn render(
        &mut self,
        pitch_mod: &mut [f32],
        amp_mod: &mut [f32],
        extra_pmd: f32,
        rng: &mut VoiceRng,
    ) {
        debug_assert_eq!(pitch_mod.len(), amp_mod.len());
        let n = pitch_mod.len();
        let phase_inc = self.freq_hz / self.sample_rate;

        let effective_pmd = (self.pmd as f32 + extra_pmd * 99.0).min(99.0);
        let pmd_scale = effective_pmd / 99.0;
        let amd_scale = self.amd as f32 / 99.0;

        let mut phase = self.phase;
        let mut last_phase = self.sh_last_phase;
        let mut sh_value = self.sh_value;

        for i in 0..n {
            let raw = match self.waveform {
                Waveform::Sine => (2.0 * std::f32::consts::PI * phase).sin(),
                Waveform::Triangle => -(2.0 * (2.0 * phase - 1.0).abs() - 1.0),
                Waveform::SawDown => 1.0 - 2.0 * phase,
                Waveform::SawUp => 2.0 * phase - 1.0,
                Waveform::Square => {
                    if phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveform::SampleAndHold => {
                    if phase < last_phase - 0.5 {
                        sh_value = rng.next_bipolar();
                    }
                    sh_value
                }
            };
            last_phase = phase;

            let fade = if self.delay_samples > 0 {
                let t = self.sample_counter + i as u64;
                (t as f32 / self.delay_samples as f32).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let faded = raw * fade;

            pitch_mod[i] = faded * pmd_scale;
            amp_mod[i] = 1.0 - amd_scale * (1.0 - faded) * 0.5;

            phase = (phase + phase_inc) % 1.0;
        }

        self.phase = phase;
        self.sh_last_phase = last_phase;
        self.sh_value = sh_value;
        self.sample_counter += n as u64;
    }
}

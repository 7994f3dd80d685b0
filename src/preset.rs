//! The on-disk/in-memory patch format: a loosely-typed, `serde`-serializable
//! record decoded into the strongly-typed parameters a [`crate::fm::Voice`]
//! consumes.
//!
//! Every field decodes through clamping rather than failing: an
//! out-of-range or missing field is clamped (or defaulted) and a
//! `log::warn!` is emitted, so a hand-edited JSON/TOML preset file never
//! fails to load.

use crate::fm::operator::{KeyboardScaling, OperatorParams, OscillatorMode, ScalingCurve};
use crate::NUM_ALGORITHMS;
use serde::{Deserialize, Serialize};

fn clamp_u8(value: u8, max: u8, field: &str) -> u8 {
    if value > max {
        log::warn!("preset field `{field}` = {value} out of range 0..{max}, clamping");
        max
    } else {
        value
    }
}

fn clamp_i8(value: i8, min: i8, max: i8, field: &str) -> i8 {
    if value < min || value > max {
        log::warn!("preset field `{field}` = {value} out of range {min}..{max}, clamping");
        value.clamp(min, max)
    } else {
        value
    }
}

/// Raw LFO parameters as they appear in a preset file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LfoPreset {
    #[serde(default)]
    pub waveform: u8,
    #[serde(default = "default_lfo_speed")]
    pub speed: u8,
    #[serde(default)]
    pub delay: u8,
    #[serde(default)]
    pub pmd: u8,
    #[serde(default)]
    pub amd: u8,
    #[serde(default = "default_true")]
    pub key_sync: bool,
}

fn default_lfo_speed() -> u8 {
    35
}

fn default_true() -> bool {
    true
}

impl Default for LfoPreset {
    fn default() -> Self {
        LfoPreset {
            waveform: 0,
            speed: default_lfo_speed(),
            delay: 0,
            pmd: 0,
            amd: 0,
            key_sync: true,
        }
    }
}

impl LfoPreset {
    fn clamped(self) -> Self {
        LfoPreset {
            waveform: clamp_u8(self.waveform, 5, "lfo.waveform"),
            speed: clamp_u8(self.speed, 99, "lfo.speed"),
            delay: clamp_u8(self.delay, 99, "lfo.delay"),
            pmd: clamp_u8(self.pmd, 99, "lfo.pmd"),
            amd: clamp_u8(self.amd, 99, "lfo.amd"),
            key_sync: self.key_sync,
        }
    }
}

/// Raw keyboard-level-scaling parameters as they appear in a preset file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct KeyboardScalingPreset {
    #[serde(default = "default_breakpoint")]
    pub kls_breakpoint: u8,
    #[serde(default)]
    pub kls_left_depth: u8,
    #[serde(default)]
    pub kls_right_depth: u8,
    #[serde(default)]
    pub kls_left_curve: u8,
    #[serde(default)]
    pub kls_right_curve: u8,
}

fn default_breakpoint() -> u8 {
    60
}

impl Default for KeyboardScalingPreset {
    fn default() -> Self {
        KeyboardScalingPreset {
            kls_breakpoint: default_breakpoint(),
            kls_left_depth: 0,
            kls_right_depth: 0,
            kls_left_curve: 0,
            kls_right_curve: 0,
        }
    }
}

/// Raw per-operator parameters as they appear in a preset file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OperatorPreset {
    #[serde(default)]
    pub osc_mode: u8,
    #[serde(default = "default_coarse")]
    pub coarse: u8,
    #[serde(default)]
    pub fine: u8,
    #[serde(default)]
    pub detune: i8,
    #[serde(default)]
    pub output_level: u8,
    #[serde(default = "default_rate")]
    pub rate1: u8,
    #[serde(default = "default_rate")]
    pub rate2: u8,
    #[serde(default = "default_rate")]
    pub rate3: u8,
    #[serde(default = "default_rate")]
    pub rate4: u8,
    #[serde(default = "default_rate")]
    pub level1: u8,
    #[serde(default = "default_rate")]
    pub level2: u8,
    #[serde(default)]
    pub level3: u8,
    #[serde(default)]
    pub level4: u8,
    #[serde(default)]
    pub velocity_sensitivity: u8,
    #[serde(default)]
    pub key_rate_scaling: u8,
    #[serde(flatten)]
    pub kls: KeyboardScalingPreset,
}

fn default_coarse() -> u8 {
    1
}

fn default_rate() -> u8 {
    99
}

impl Default for OperatorPreset {
    /// A silent operator: ratio mode, coarse 1, output level 0.
    fn default() -> Self {
        OperatorPreset {
            osc_mode: 0,
            coarse: default_coarse(),
            fine: 0,
            detune: 0,
            output_level: 0,
            rate1: 99,
            rate2: 99,
            rate3: 99,
            rate4: 99,
            level1: 99,
            level2: 99,
            level3: 0,
            level4: 0,
            velocity_sensitivity: 0,
            key_rate_scaling: 0,
            kls: KeyboardScalingPreset::default(),
        }
    }
}

impl OperatorPreset {
    /// The DX7 INIT VOICE operator 1: full-level carrier, simple sine.
    fn init_carrier() -> Self {
        OperatorPreset {
            output_level: 99,
            level3: 99,
            ..OperatorPreset::default()
        }
    }

    fn clamped(self) -> Self {
        OperatorPreset {
            osc_mode: clamp_u8(self.osc_mode, 1, "operator.osc_mode"),
            coarse: clamp_u8(self.coarse, 31, "operator.coarse"),
            fine: clamp_u8(self.fine, 99, "operator.fine"),
            detune: clamp_i8(self.detune, -7, 7, "operator.detune"),
            output_level: clamp_u8(self.output_level, 99, "operator.output_level"),
            rate1: clamp_u8(self.rate1, 99, "operator.rate1"),
            rate2: clamp_u8(self.rate2, 99, "operator.rate2"),
            rate3: clamp_u8(self.rate3, 99, "operator.rate3"),
            rate4: clamp_u8(self.rate4, 99, "operator.rate4"),
            level1: clamp_u8(self.level1, 99, "operator.level1"),
            level2: clamp_u8(self.level2, 99, "operator.level2"),
            level3: clamp_u8(self.level3, 99, "operator.level3"),
            level4: clamp_u8(self.level4, 99, "operator.level4"),
            velocity_sensitivity: clamp_u8(
                self.velocity_sensitivity,
                7,
                "operator.velocity_sensitivity",
            ),
            key_rate_scaling: clamp_u8(self.key_rate_scaling, 7, "operator.key_rate_scaling"),
            kls: KeyboardScalingPreset {
                kls_breakpoint: self.kls.kls_breakpoint.min(127),
                kls_left_depth: clamp_u8(self.kls.kls_left_depth, 99, "operator.kls_left_depth"),
                kls_right_depth: clamp_u8(
                    self.kls.kls_right_depth,
                    99,
                    "operator.kls_right_depth",
                ),
                kls_left_curve: clamp_u8(self.kls.kls_left_curve, 3, "operator.kls_left_curve"),
                kls_right_curve: clamp_u8(self.kls.kls_right_curve, 3, "operator.kls_right_curve"),
            },
        }
    }

    /// Decode into the strongly-typed parameters a live [`Operator`]
    /// consumes. Input is assumed already clamped (via [`Preset::from_raw`]).
    ///
    /// [`Operator`]: crate::fm::operator::Operator
    pub fn to_operator_params(&self) -> OperatorParams {
        OperatorParams {
            osc_mode: if self.osc_mode == 0 {
                OscillatorMode::Ratio
            } else {
                OscillatorMode::Fixed
            },
            coarse: self.coarse,
            fine: self.fine,
            detune: self.detune,
            output_level: self.output_level,
            rates: [self.rate1, self.rate2, self.rate3, self.rate4],
            levels: [self.level1, self.level2, self.level3, self.level4],
            velocity_sensitivity: self.velocity_sensitivity,
            key_rate_scaling: self.key_rate_scaling,
            kls: KeyboardScaling {
                breakpoint: self.kls.kls_breakpoint,
                left_depth: self.kls.kls_left_depth,
                right_depth: self.kls.kls_right_depth,
                left_curve: ScalingCurve::from_raw(self.kls.kls_left_curve),
                right_curve: ScalingCurve::from_raw(self.kls.kls_right_curve),
            },
        }
    }
}

/// A complete voice patch: name, algorithm, feedback, LFO, and six
/// operators. Serializable to/from JSON or TOML via `serde`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub algorithm: u8,
    #[serde(default)]
    pub feedback: u8,
    #[serde(default)]
    pub lfo: LfoPreset,
    #[serde(default = "default_operators")]
    pub operators: [OperatorPreset; 6],
}

fn default_name() -> String {
    "INIT VOICE".to_string()
}

fn default_operators() -> [OperatorPreset; 6] {
    std::array::from_fn(|i| {
        if i == 0 {
            OperatorPreset::init_carrier()
        } else {
            OperatorPreset::default()
        }
    })
}

impl Default for Preset {
    /// The DX7 INIT VOICE: algorithm 1 (index 0), a single full-level
    /// sine carrier on operator 1, the rest silent.
    fn default() -> Self {
        Preset {
            name: default_name(),
            algorithm: 0,
            feedback: 0,
            lfo: LfoPreset::default(),
            operators: default_operators(),
        }
    }
}

impl Preset {
    /// Clamp every field to its valid range, logging a `warn!` for each
    /// field that was out of range. Never fails.
    pub fn from_raw(mut preset: Preset) -> Self {
        preset.algorithm %= NUM_ALGORITHMS as u8;
        if preset.feedback > 7 {
            log::warn!("preset field `feedback` = {} out of range 0..7, clamping", preset.feedback);
            preset.feedback = 7;
        }
        preset.lfo = preset.lfo.clamped();
        preset.operators = preset.operators.map(OperatorPreset::clamped);
        preset
    }
}

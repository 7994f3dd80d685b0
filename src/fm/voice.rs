//! A single polyphonic voice: six operators, one LFO, an algorithm
//! selection, feedback state, and real-time controller state for one
//! currently-or-recently-playing note.

use crate::fm::algorithm::{render_algorithm, AlgorithmPlan, RenderScratch, ALGORITHMS};
use crate::fm::lfo::Lfo;
use crate::fm::operator::Operator;
use crate::fm::rng::VoiceRng;
use crate::preset::Preset;
use crate::{NUM_ALGORITHMS, NUM_OPERATORS};

fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

/// One playing (or recently-released) note.
///
/// Scratch buffers needed by the algorithm renderer (`RenderScratch`) are
/// owned here and reused block-to-block, so `render` never allocates.
pub struct Voice {
    operators: [Operator; NUM_OPERATORS],
    lfo: Lfo,
    algorithm: u8,
    feedback: u8,
    plan: AlgorithmPlan,
    feedback_states: [[f32; 2]; NUM_OPERATORS],
    op_enabled: [bool; NUM_OPERATORS],

    note: i16,
    velocity: u8,
    active: bool,
    gate: bool,
    age: u64,

    pitch_bend_ratio: f32,
    mod_wheel: f32,

    rng: VoiceRng,
    scratch: RenderScratch,
    pitch_mod_buf: Vec<f32>,
    amp_mod_buf: Vec<f32>,
    freq_ratio_buf: Vec<f32>,
    sample_rate: f32,
}

impl Voice {
    /// Build an idle voice, pre-sized for blocks of up to
    /// `max_block_size`, rendering at `sample_rate` Hz, with the DX7 INIT
    /// VOICE preset loaded and a per-voice RNG seeded from `rng_seed`.
    pub fn new(max_block_size: usize, rng_seed: u32, sample_rate: f32) -> Self {
        let mut voice = Voice {
            operators: std::array::from_fn(|_| Operator::new(Default::default(), sample_rate)),
            lfo: Lfo::new(0, 35, 0, 0, 0, true, sample_rate),
            algorithm: 0,
            feedback: 0,
            plan: ALGORITHMS[0].plan(),
            feedback_states: [[0.0; 2]; NUM_OPERATORS],
            op_enabled: [true; NUM_OPERATORS],
            note: -1,
            velocity: 0,
            active: false,
            gate: false,
            age: 0,
            pitch_bend_ratio: 1.0,
            mod_wheel: 0.0,
            rng: VoiceRng::new(rng_seed),
            scratch: RenderScratch::new(max_block_size),
            pitch_mod_buf: vec![0.0; max_block_size],
            amp_mod_buf: vec![0.0; max_block_size],
            freq_ratio_buf: vec![0.0; max_block_size],
            sample_rate,
        };
        voice.load_preset(&Preset::default());
        voice
    }

    /// Replace operators, LFO, algorithm, and feedback amount from a
    /// preset. Does not touch gate state or phase; callers typically
    /// reload immediately before gate_on.
    pub fn load_preset(&mut self, preset: &Preset) {
        self.algorithm = preset.algorithm % NUM_ALGORITHMS as u8;
        self.feedback = preset.feedback.min(7);
        self.plan = ALGORITHMS[self.algorithm as usize].plan();
        self.lfo = Lfo::new(
            preset.lfo.waveform,
            preset.lfo.speed,
            preset.lfo.delay,
            preset.lfo.pmd,
            preset.lfo.amd,
            preset.lfo.key_sync,
            self.sample_rate,
        );
        for (op, op_preset) in self.operators.iter_mut().zip(preset.operators.iter()) {
            op.load_params(op_preset.to_operator_params());
        }
    }

    /// Trigger the voice for a new note: resets phase/envelope/feedback
    /// state on every operator and the LFO, and marks the voice active.
    pub fn gate_on(&mut self, note: u8, velocity: u8) {
        self.note = note as i16;
        self.velocity = velocity;
        self.active = true;
        self.gate = true;
        self.age = 0;

        let base_freq = midi_note_to_freq(note);
        self.feedback_states = [[0.0; 2]; NUM_OPERATORS];

        for op in self.operators.iter_mut() {
            op.gate_on(note, velocity, base_freq);
        }
        self.lfo.gate_on();
    }

    /// Begin release: every operator's envelope enters its release stage.
    /// The voice remains active until all carrier envelopes idle.
    pub fn gate_off(&mut self) {
        self.gate = false;
        for op in self.operators.iter_mut() {
            op.gate_off();
        }
    }

    /// Set pitch bend as a frequency multiplier (1.0 = center).
    pub fn set_pitch_bend(&mut self, ratio: f32) {
        self.pitch_bend_ratio = ratio;
    }

    /// Set mod wheel depth, clamped to [0, 1].
    pub fn set_mod_wheel(&mut self, value: f32) {
        self.mod_wheel = value.clamp(0.0, 1.0);
    }

    /// Globally mute/unmute one operator (0..5), regardless of its role
    /// in the current algorithm.
    pub fn set_operator_enabled(&mut self, op_index: usize, enabled: bool) {
        if op_index < NUM_OPERATORS {
            self.op_enabled[op_index] = enabled;
        }
    }

    /// Render `out.len()` samples. Writes silence and leaves state
    /// untouched if the voice is not active.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.active {
            out.fill(0.0);
            return;
        }
        self.age += 1;
        let n = out.len();

        let pitch_mod = &mut self.pitch_mod_buf[..n];
        let amp_mod = &mut self.amp_mod_buf[..n];
        self.lfo.render(pitch_mod, amp_mod, self.mod_wheel, &mut self.rng);

        let freq_ratio = &mut self.freq_ratio_buf[..n];
        for i in 0..n {
            let pm_semitones = pitch_mod[i] * 12.0;
            freq_ratio[i] = self.pitch_bend_ratio * 2f32.powf(pm_semitones / 12.0);
        }

        let topology = &ALGORITHMS[self.algorithm as usize];
        render_algorithm(
            topology,
            &self.plan,
            &mut self.operators,
            self.feedback,
            &mut self.feedback_states,
            &mut self.scratch,
            out,
            Some(freq_ratio),
            Some(amp_mod),
            self.op_enabled,
        );

        if !self.gate && !self.carriers_active() {
            self.active = false;
        }
    }

    fn carriers_active(&self) -> bool {
        let topology = &ALGORITHMS[self.algorithm as usize];
        (0..NUM_OPERATORS).any(|i| topology.carriers & (1 << i) != 0 && self.operators[i].is_active())
    }

    /// True while held, or while any carrier operator's envelope has not
    /// yet reached idle.
    pub fn is_active(&self) -> bool {
        if self.gate {
            return true;
        }
        self.carriers_active()
    }

    /// Raw "still producing" flag as last updated by `render`. Distinct
    /// from [`Voice::is_active`], which recomputes from current envelope
    /// state; this is the cheap flag `Synth::render` checks before
    /// bothering to call `render` on a voice at all.
    pub fn active(&self) -> bool {
        self.active
    }

    /// The MIDI note currently assigned to this voice, or `None` if idle.
    pub fn note(&self) -> Option<u8> {
        if self.note < 0 {
            None
        } else {
            Some(self.note as u8)
        }
    }

    /// Render cycles since gate_on; used for voice-stealing priority.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// True while the note is held (gate not yet released).
    pub fn is_gated(&self) -> bool {
        self.gate
    }

    /// Hard-stop: idle every operator and the LFO, clear note assignment.
    pub fn reset(&mut self) {
        self.note = -1;
        self.velocity = 0;
        self.active = false;
        self.gate = false;
        self.age = 0;
        for op in self.operators.iter_mut() {
            op.reset();
        }
        self.lfo.reset();
        self.feedback_states = [[0.0; 2]; NUM_OPERATORS];
    }
}

//! The polyphonic synth: a fixed voice pool, note allocation, and the
//! control-to-audio command queue.

use crate::fm::voice::Voice;
use crate::preset::Preset;
use crate::{DEFAULT_POLYPHONY, MAX_BLOCK_SIZE, SAMPLE_RATE};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// An intent from the control thread, drained by `Synth::render` before
/// any voice is touched, so that within one rendered block the voice
/// configuration never mutates underneath the renderer.
#[derive(Clone, Debug)]
pub enum SynthCommand {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
    Panic,
    PitchBend { ratio: f32 },
    ModWheel { value: f32 },
    OperatorEnable { op_index: usize, enabled: bool },
    LoadPreset(Box<Preset>),
    MasterGain { gain: f32 },
}

/// A handle the control thread uses to publish intents into a running
/// `Synth`'s audio thread. Cloning shares the same bounded channel.
#[derive(Clone)]
pub struct SynthHandle {
    sender: Sender<SynthCommand>,
}

impl SynthHandle {
    /// Enqueue a command to be applied at the start of the next render.
    /// Never blocks the caller on the audio thread; returns `Err` only if
    /// the `Synth` itself has been dropped.
    pub fn send(&self, command: SynthCommand) -> Result<(), mpsc::SendError<SynthCommand>> {
        self.sender.send(command)
    }
}

/// Fixed pool of voices, a note-to-voice map, master gain, and the
/// command queue that serializes control-thread writes against the
/// audio-thread render path. `mix_buf` is pre-sized to `max_block_size`
/// and reused every `render` call, so mixing voices together never
/// allocates.
pub struct Synth {
    voices: Vec<Voice>,
    note_to_voice: Vec<Option<usize>>, // indexed by MIDI note 0..127
    current_preset: Preset,
    master_gain: f32,
    command_rx: Receiver<SynthCommand>,
    command_tx: Sender<SynthCommand>,
    mix_buf: Vec<f32>,
    max_block_size: usize,
}

impl Synth {
    /// Build a synth with `polyphony` voices at the default block size cap
    /// and the default sample rate ([`SAMPLE_RATE`]), seeding each voice's
    /// sample-and-hold RNG deterministically from `rng_seed` (voice `i` is
    /// seeded with `rng_seed.wrapping_add(i)`).
    pub fn new(polyphony: usize, rng_seed: u32) -> Self {
        Self::with_block_size(polyphony, rng_seed, MAX_BLOCK_SIZE)
    }

    /// Like [`Synth::new`] but with an explicit scratch-buffer size cap;
    /// `render` panics if asked for a larger block. Renders at the default
    /// sample rate ([`SAMPLE_RATE`]).
    pub fn with_block_size(polyphony: usize, rng_seed: u32, max_block_size: usize) -> Self {
        Self::with_config(polyphony, rng_seed, max_block_size, SAMPLE_RATE)
    }

    /// Like [`Synth::with_block_size`] but rendering at an explicit
    /// `sample_rate` (Hz) instead of the default, threaded through every
    /// voice's operators, envelopes, and LFO.
    pub fn with_config(
        polyphony: usize,
        rng_seed: u32,
        max_block_size: usize,
        sample_rate: f32,
    ) -> Self {
        let voices = (0..polyphony)
            .map(|i| Voice::new(max_block_size, rng_seed.wrapping_add(i as u32), sample_rate))
            .collect();
        let (command_tx, command_rx) = mpsc::channel();
        Synth {
            voices,
            note_to_voice: vec![None; 128],
            current_preset: Preset::default(),
            master_gain: 0.8,
            command_rx,
            command_tx,
            mix_buf: vec![0.0; max_block_size],
            max_block_size,
        }
    }

    /// Default 16-voice polyphony at the default sample rate.
    pub fn default_polyphony() -> Self {
        Self::new(DEFAULT_POLYPHONY, 0x2463_7b11)
    }

    /// A cloneable handle the control thread can use to enqueue commands.
    pub fn handle(&self) -> SynthHandle {
        SynthHandle {
            sender: self.command_tx.clone(),
        }
    }

    /// Number of voices in the pool.
    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Load a preset into every voice immediately and remember it as the
    /// current preset, so a freshly-stolen voice is reloaded with it too.
    pub fn load_preset(&mut self, preset: Preset) {
        self.current_preset = preset;
        for voice in self.voices.iter_mut() {
            voice.load_preset(&self.current_preset);
        }
    }

    /// Trigger a note. Velocity 0 is treated as note-off. If the note is
    /// already sounding, its existing voice is released first. Voice
    /// selection follows the three-tier policy: any idle voice; else the
    /// released (gate off, still decaying) voice with the greatest age;
    /// else the held voice with the greatest age (steal). Notes outside
    /// the 0..127 MIDI range are silently ignored rather than panicking.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        if note as usize >= self.note_to_voice.len() {
            log::warn!("note_on: MIDI note {note} out of range, ignoring");
            return;
        }

        if let Some(old_idx) = self.note_to_voice[note as usize].take() {
            self.voices[old_idx].gate_off();
        }

        let voice_idx = self.allocate_voice();

        if let Some(old_note) = self.voices[voice_idx].note() {
            if self.note_to_voice[old_note as usize] == Some(voice_idx) {
                self.note_to_voice[old_note as usize] = None;
                log::debug!("stealing voice {voice_idx} from note {old_note} for note {note}");
            }
        }

        self.note_to_voice[note as usize] = Some(voice_idx);
        self.voices[voice_idx].load_preset(&self.current_preset);
        self.voices[voice_idx].gate_on(note, velocity);
        log::trace!("note_on {note} velocity {velocity} -> voice {voice_idx}");
    }

    /// Release a note. A no-op if the note isn't currently mapped, or if
    /// it's outside the 0..127 MIDI range.
    pub fn note_off(&mut self, note: u8) {
        if note as usize >= self.note_to_voice.len() {
            return;
        }
        if let Some(idx) = self.note_to_voice[note as usize].take() {
            self.voices[idx].gate_off();
        }
    }

    /// Release every sounding note and clear the note map.
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.gate_off();
        }
        self.note_to_voice.fill(None);
    }

    /// Hard-stop every voice and clear the note map.
    pub fn panic(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.reset();
        }
        self.note_to_voice.fill(None);
    }

    /// Broadcast pitch bend (as a frequency multiplier) to every voice.
    pub fn set_pitch_bend(&mut self, ratio: f32) {
        for voice in self.voices.iter_mut() {
            voice.set_pitch_bend(ratio);
        }
    }

    /// Broadcast mod wheel depth (0..1) to every voice.
    pub fn set_mod_wheel(&mut self, value: f32) {
        for voice in self.voices.iter_mut() {
            voice.set_mod_wheel(value);
        }
    }

    /// Set the post-mix master gain, clamped to [0, 1]. Defaults to 0.8
    /// (a little headroom below full scale); scenarios that need exact
    /// unity output call this explicitly.
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(0.0, 1.0);
    }

    /// Current master gain.
    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Globally mute/unmute an operator across every voice.
    pub fn set_operator_enabled(&mut self, op_index: usize, enabled: bool) {
        for voice in self.voices.iter_mut() {
            voice.set_operator_enabled(op_index, enabled);
        }
    }

    /// Drain every queued `SynthCommand` and apply it, then render
    /// `out.len()` samples: sum every voice still sounding, apply master
    /// gain, and clip to [-1, 1]. Panics if `out` is larger than the
    /// block size this `Synth` was built with, same as a single voice's
    /// scratch buffers would.
    pub fn render(&mut self, out: &mut [f32]) {
        self.drain_commands();

        let n = out.len();
        assert!(
            n <= self.max_block_size,
            "block exceeds the size this Synth was constructed for"
        );

        out.fill(0.0);
        let voice_buf = &mut self.mix_buf[..n];
        for voice in self.voices.iter_mut() {
            if voice.active() || voice.is_active() {
                voice.render(voice_buf);
                for (o, v) in out.iter_mut().zip(voice_buf.iter()) {
                    *o += v;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * self.master_gain).clamp(-1.0, 1.0);
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.apply_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply_command(&mut self, command: SynthCommand) {
        match command {
            SynthCommand::NoteOn { note, velocity } => self.note_on(note, velocity),
            SynthCommand::NoteOff { note } => self.note_off(note),
            SynthCommand::AllNotesOff => self.all_notes_off(),
            SynthCommand::Panic => self.panic(),
            SynthCommand::PitchBend { ratio } => self.set_pitch_bend(ratio),
            SynthCommand::ModWheel { value } => self.set_mod_wheel(value),
            SynthCommand::OperatorEnable { op_index, enabled } => {
                self.set_operator_enabled(op_index, enabled)
            }
            SynthCommand::LoadPreset(preset) => self.load_preset(*preset),
            SynthCommand::MasterGain { gain } => self.set_master_gain(gain),
        }
    }

    /// Number of voices currently sounding.
    pub fn active_voice_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.active() || v.is_active())
            .count()
    }

    fn allocate_voice(&self) -> usize {
        for (i, voice) in self.voices.iter().enumerate() {
            if !voice.active() && !voice.is_active() {
                return i;
            }
        }

        let mut best_released: Option<(usize, u64)> = None;
        let mut best_held: Option<(usize, u64)> = None;

        for (i, voice) in self.voices.iter().enumerate() {
            if voice.is_gated() {
                if best_held.map_or(true, |(_, age)| voice.age() > age) {
                    best_held = Some((i, voice.age()));
                }
            } else if best_released.map_or(true, |(_, age)| voice.age() > age) {
                best_released = Some((i, voice.age()));
            }
        }

        best_released.or(best_held).map(|(i, _)| i).unwrap_or(0)
    }
}

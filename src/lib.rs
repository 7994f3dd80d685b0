//! Six-operator FM synthesis engine in the style of the Yamaha DX7.
//!
//! The crate is organized around the signal path described in the module
//! docs of [`fm`]: an [`fm::envelope::Envelope`] feeds an
//! [`fm::operator::Operator`], operators are wired together by one of 32
//! fixed [`fm::algorithm::Topology`] values inside an [`fm::voice::Voice`],
//! and a [`fm::synth::Synth`] multiplexes a fixed pool of voices over
//! incoming note events. [`Preset`] is the on-disk/in-memory patch format
//! that parameterizes a voice.

#![warn(missing_docs)]

pub mod fm;
pub mod preset;
pub mod wav;

/// Default audio sample rate, in Hz, used by [`fm::synth::Synth::new`]/
/// [`fm::synth::Synth::with_block_size`] and every test helper that doesn't
/// care about the rate. [`fm::synth::Synth::with_config`] (and the
/// `dx7synth` CLI's `--sample-rate` flag) can override it; the value is
/// threaded down into every [`fm::voice::Voice`], [`fm::operator::Operator`],
/// [`fm::lfo::Lfo`], and [`fm::envelope::Envelope`] rather than assumed.
pub const SAMPLE_RATE: f32 = 44_100.0;

/// Default polyphony (number of simultaneous voices) of a [`fm::synth::Synth`].
pub const DEFAULT_POLYPHONY: usize = 16;

/// Number of FM operators per voice.
pub const NUM_OPERATORS: usize = 6;

/// Number of fixed algorithm topologies.
pub const NUM_ALGORITHMS: usize = 32;

/// Upper bound on the block size a [`fm::synth::Synth`] will be asked to
/// render in one call; scratch buffers are pre-sized to this so the audio
/// thread never allocates. `Synth::with_block_size` can raise this per
/// instance for callers that know they need larger blocks.
pub const MAX_BLOCK_SIZE: usize = 4096;

pub use fm::synth::Synth;
pub use preset::Preset;

//! The FM synthesis engine: envelopes, operators, the LFO, algorithm
//! topologies, voices, and the polyphonic synth that drives them.
//!
//! Signal path, leaf to root: an [`envelope::Envelope`] shapes the
//! amplitude of an [`operator::Operator`]; six operators are wired
//! together by one of the 32 fixed [`algorithm::Topology`] values inside a
//! [`voice::Voice`]; a [`synth::Synth`] owns a fixed pool of voices and
//! maps incoming note events onto them.

pub mod algorithm;
pub mod envelope;
pub mod lfo;
pub mod operator;
pub mod rng;
pub mod synth;
pub mod voice;

pub use algorithm::Topology;
pub use envelope::Envelope;
pub use lfo::Lfo;
pub use operator::Operator;
pub use synth::Synth;
pub use voice::Voice;

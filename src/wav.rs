//! Mono 16-bit PCM WAV output, with silence-detection truncation for
//! manual exercise and test-vector generation.

use anyhow::{anyhow, Result};
use hound::{WavSpec, WavWriter};

/// Writes rendered samples to a mono 16-bit PCM WAV file, tracking how
/// many trailing near-zero samples have been written so a caller can stop
/// rendering once the tail has gone silent rather than writing a fixed,
/// possibly much longer, duration.
pub struct WavOutput {
    writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>>,
    spec: WavSpec,
    silence_samples: usize,
    silence_threshold_samples: usize,
    silence_threshold_amplitude: f32,
}

impl WavOutput {
    /// Create a new WAV output file.
    ///
    /// `silence_duration_us` is the trailing-silence duration, in
    /// microseconds, after which [`WavOutput::write_samples`] reports the
    /// silence threshold exceeded.
    pub fn new(filename: &str, sample_rate: u32, silence_duration_us: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(filename, spec)
            .map_err(|e| anyhow!("failed to create WAV file '{filename}': {e}"))?;

        let silence_threshold_samples =
            ((silence_duration_us as u64 * sample_rate as u64) / 1_000_000) as usize;

        Ok(Self {
            writer: Some(writer),
            spec,
            silence_samples: 0,
            silence_threshold_samples,
            silence_threshold_amplitude: 1.0 / 32768.0,
        })
    }

    /// Write samples (in [-1, 1]) to the file as 16-bit PCM.
    ///
    /// Returns `true` once trailing silence has exceeded the configured
    /// threshold; the caller may use this to stop rendering early.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<bool> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("WAV writer is closed"))?;

        for &sample in samples {
            let pcm_sample = if sample.is_finite() {
                (sample.clamp(-1.0, 1.0) * 32767.0) as i16
            } else {
                0
            };

            writer
                .write_sample(pcm_sample)
                .map_err(|e| anyhow!("failed to write WAV sample: {e}"))?;

            if sample.abs() <= self.silence_threshold_amplitude {
                self.silence_samples += 1;
            } else {
                self.silence_samples = 0;
            }

            if self.silence_samples >= self.silence_threshold_samples {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Finalize and close the WAV file.
    pub fn finalize(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| anyhow!("failed to finalize WAV file: {e}"))?;
        }
        Ok(())
    }

    /// Configured sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Configured silence threshold, in samples.
    pub fn silence_threshold_samples(&self) -> usize {
        self.silence_threshold_samples
    }

    /// Current run-length of trailing near-zero samples.
    pub fn current_silence_samples(&self) -> usize {
        self.silence_samples
    }

    /// Reset the trailing-silence counter without closing the file.
    pub fn reset_silence_detection(&mut self) {
        self.silence_samples = 0;
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn creation_reports_configured_thresholds() {
        let temp_file = "/tmp/dx7_wav_test_creation.wav";
        let _ = fs::remove_file(temp_file);

        let wav_output = WavOutput::new(temp_file, 44100, 100_000).unwrap();
        assert_eq!(wav_output.sample_rate(), 44100);
        assert_eq!(wav_output.silence_threshold_samples(), 4410);

        wav_output.finalize().unwrap();
        assert!(std::path::Path::new(temp_file).exists());
        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn silence_detection_trips_after_threshold() {
        let temp_file = "/tmp/dx7_wav_test_silence.wav";
        let _ = fs::remove_file(temp_file);

        let mut wav_output = WavOutput::new(temp_file, 44100, 1000).unwrap();

        let loud_samples = [0.5; 100];
        assert!(!wav_output.write_samples(&loud_samples).unwrap());

        let silent_samples = [0.0; 100];
        assert!(wav_output.write_samples(&silent_samples).unwrap());

        wav_output.finalize().unwrap();
        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn non_finite_samples_are_written_as_silence() {
        let temp_file = "/tmp/dx7_wav_test_nan.wav";
        let _ = fs::remove_file(temp_file);

        let mut wav_output = WavOutput::new(temp_file, 44100, 100_000).unwrap();
        let samples = [f32::NAN, f32::INFINITY, 0.0];
        wav_output.write_samples(&samples).unwrap();
        wav_output.finalize().unwrap();
        let _ = fs::remove_file(temp_file);
    }
}

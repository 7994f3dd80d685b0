use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::Path;

use dx7_synth::fm::synth::Synth;
use dx7_synth::preset::Preset;
use dx7_synth::wav::WavOutput;

/// DX7 Test Vector CLI Tool
///
/// Loads a JSON preset, plays a single note through the synthesis engine,
/// and renders the result to a mono WAV file, stopping early once the
/// tail has decayed to silence.
#[derive(Parser, Clone)]
#[command(name = "dx7synth")]
#[command(about = "Render a DX7-style preset to a WAV test vector")]
#[command(version)]
struct Args {
    /// Preset file (JSON, see the `Preset` format)
    #[arg(help = "Path to preset file (.json)")]
    preset_file: String,

    /// MIDI note number to play (0-127)
    #[arg(help = "MIDI note number (0-127, where 60 = Middle C, 69 = A4)")]
    midi_note: u8,

    /// Maximum note length in seconds
    #[arg(help = "Maximum note length in seconds")]
    note_length: f64,

    /// Output WAV filename
    #[arg(help = "Output WAV file path")]
    output_file: String,

    /// Sample rate in Hz
    #[arg(short, long, default_value = "44100", help = "Sample rate in Hz")]
    sample_rate: u32,

    /// Silence threshold in microseconds
    #[arg(
        short = 't',
        long = "silence-threshold",
        default_value = "100000",
        help = "Silence threshold in microseconds (default: 100ms)"
    )]
    silence_threshold_us: u32,

    /// MIDI velocity (1-127)
    #[arg(long, default_value = "100", help = "MIDI velocity (1-127)")]
    velocity: u8,

    /// Render block size, in samples
    #[arg(long, default_value = "256", help = "Render block size in samples")]
    block_size: usize,

    /// Verbose output
    #[arg(short = 'v', long, help = "Verbose output")]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    validate_args(&args)?;

    if args.verbose {
        println!("dx7synth - DX7-style FM synthesis test vector generator");
        println!("Preset file: {}", args.preset_file);
        println!(
            "MIDI note: {} ({})",
            args.midi_note,
            note_name(args.midi_note)
        );
        println!("Velocity: {}", args.velocity);
        println!("Max length: {:.2}s", args.note_length);
        println!("Sample rate: {}Hz", args.sample_rate);
        println!("Silence threshold: {}us", args.silence_threshold_us);
        println!("Output file: {}", args.output_file);
        println!();
    }

    let raw = std::fs::read_to_string(&args.preset_file)
        .map_err(|e| anyhow!("failed to read preset file '{}': {e}", args.preset_file))?;
    let preset: Preset = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("failed to parse preset JSON '{}': {e}", args.preset_file))?;
    let preset = Preset::from_raw(preset);

    if args.verbose {
        println!("Loaded preset \"{}\"", preset.name);
        println!(
            "Algorithm {} feedback {}",
            preset.algorithm + 1,
            preset.feedback
        );
        println!();
    }

    // A single voice is enough to render one note; the CLI does not need
    // the full polyphony pool the real-time engine uses.
    let mut synth = Synth::with_config(
        1,
        0x5EED,
        args.block_size.max(1),
        args.sample_rate as f32,
    );
    synth.load_preset(preset);
    synth.note_on(args.midi_note, args.velocity);

    let mut wav_output = WavOutput::new(
        &args.output_file,
        args.sample_rate,
        args.silence_threshold_us,
    )?;

    let max_samples = (args.note_length * args.sample_rate as f64) as usize;
    let mut block = vec![0.0f32; args.block_size.max(1)];
    let mut total_written = 0usize;
    let mut silence_detected = false;
    let mut gated_off = false;

    while total_written < max_samples {
        let remaining = max_samples - total_written;
        let n = block.len().min(remaining);
        synth.render(&mut block[..n]);
        silence_detected = wav_output.write_samples(&block[..n])?;
        total_written += n;

        // Release the note a moment before the hard cap so a well-formed
        // preset has a chance to reach its release tail naturally.
        if !gated_off && max_samples > 0 && total_written >= max_samples * 3 / 4 {
            synth.note_off(args.midi_note);
            gated_off = true;
        }

        if silence_detected {
            if args.verbose {
                println!(
                    "Silence threshold reached after {} samples ({:.3}s)",
                    total_written,
                    total_written as f64 / args.sample_rate as f64
                );
            }
            break;
        }
    }

    wav_output.finalize()?;

    if args.verbose {
        println!("Successfully wrote {total_written} samples to '{}'", args.output_file);
        if !silence_detected && total_written >= max_samples {
            println!("Note: reached maximum length without detecting silence");
        }
    }

    println!(
        "Generated test vector: {} -> {}",
        args.preset_file, args.output_file
    );

    Ok(())
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<()> {
    if !Path::new(&args.preset_file).exists() {
        return Err(anyhow!("preset file '{}' not found", args.preset_file));
    }
    if args.velocity == 0 || args.velocity > 127 {
        return Err(anyhow!(
            "invalid velocity: {} (must be 1-127)",
            args.velocity
        ));
    }
    if args.midi_note > 127 {
        return Err(anyhow!(
            "invalid midi note: {} (must be 0-127)",
            args.midi_note
        ));
    }
    if args.note_length <= 0.0 {
        return Err(anyhow!(
            "invalid note length: {} (must be positive)",
            args.note_length
        ));
    }
    Ok(())
}

fn note_name(midi_note: u8) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (midi_note / 12) as i32 - 1;
    let note = midi_note % 12;
    format!("{}{}", NOTE_NAMES[note as usize], octave)
}

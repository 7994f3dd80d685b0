//! Integration-level coverage of the preset format (SS6.2): JSON decoding,
//! field clamping, and plugging a hand-authored preset straight into a
//! `Synth`.

use dx7_synth::preset::Preset;
use dx7_synth::Synth;

#[test]
fn hand_authored_json_preset_drives_a_voice() {
    let json = r#"{
        "name": "Test Bell",
        "algorithm": 4,
        "feedback": 3,
        "lfo": { "waveform": 0, "speed": 35, "delay": 0, "pmd": 0, "amd": 0, "key_sync": true },
        "operators": [
            { "osc_mode": 0, "coarse": 1, "fine": 0, "detune": 0, "output_level": 90,
              "rate1": 99, "rate2": 80, "rate3": 60, "rate4": 50,
              "level1": 99, "level2": 90, "level3": 60, "level4": 0,
              "velocity_sensitivity": 3, "key_rate_scaling": 2,
              "kls_breakpoint": 60, "kls_left_depth": 0, "kls_right_depth": 0,
              "kls_left_curve": 0, "kls_right_curve": 0 },
            {}, {}, {}, {}, {}
        ]
    }"#;

    let preset: Preset = serde_json::from_str(json).expect("valid preset JSON");
    let preset = Preset::from_raw(preset);
    assert_eq!(preset.name, "Test Bell");

    let mut synth = Synth::new(4, 1);
    synth.load_preset(preset);
    synth.note_on(60, 90);

    let mut out = vec![0.0f32; 1024];
    synth.render(&mut out);
    assert!(out.iter().any(|&s| s != 0.0));
    assert!(out.iter().all(|s| s.is_finite()));
}

#[test]
fn out_of_range_fields_clamp_instead_of_failing() {
    let mut preset = Preset::default();
    preset.algorithm = 255;
    preset.feedback = 255;
    preset.operators[0].output_level = 255;
    preset.operators[0].detune = 127;

    let clamped = Preset::from_raw(preset);
    assert_eq!(clamped.algorithm, 255 % 32);
    assert_eq!(clamped.feedback, 7);
    assert_eq!(clamped.operators[0].output_level, 99);
    assert_eq!(clamped.operators[0].detune, 7);
}

#[test]
fn missing_optional_fields_fall_back_to_documented_defaults() {
    let json = r#"{"operators": [{}, {}, {}, {}, {}, {}]}"#;
    let preset: Preset = serde_json::from_str(json).expect("defaults fill in");
    assert_eq!(preset.name, "INIT VOICE");
    assert_eq!(preset.lfo.speed, 35);
    assert_eq!(preset.operators[0].coarse, 1);
}

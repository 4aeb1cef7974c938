use midly::{Format, Smf, Timing};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tessconf::TessConfig;
use tessitura::commands::{convert, normalize_value, validate_value, Targets};
use tessitura::EncoderParams;

fn riff() -> Value {
    json!({
        "title": "Riff",
        "bpm": 100,
        "tracks": {
            "lead": [
                {"pitch": "E4", "time": 0, "duration": 1},
                {"pitch": "G4", "time": 1, "duration": 1},
                {"pitch": "A4", "time": 2, "duration": 2}
            ],
            "bass": [
                {"pitch": "E2", "time": 0, "duration": 4}
            ]
        }
    })
}

#[test]
fn converts_to_all_three_formats() {
    let dir = tempfile::tempdir().unwrap();
    let targets = Targets {
        midi: Some(dir.path().join("riff.mid")),
        abc: Some(dir.path().join("riff.abc")),
        script: Some(dir.path().join("riff.scd")),
    };

    let summary = convert(&riff(), &targets, &EncoderParams::default()).unwrap();
    assert_eq!(summary.written.len(), 3);

    let bytes = std::fs::read(dir.path().join("riff.mid")).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.tracks.len(), 3);

    let abc = std::fs::read_to_string(dir.path().join("riff.abc")).unwrap();
    assert!(abc.starts_with("X:1\nT:Riff\n"), "{abc}");
    assert!(abc.contains("Q:1/4=100"));

    let script = std::fs::read_to_string(dir.path().join("riff.scd")).unwrap();
    assert!(script.contains("s.waitForBoot {"));
    assert!(script.contains("TempoClock.default.tempo = 100 / 60;"));
}

#[test]
fn only_requested_outputs_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let targets = Targets {
        abc: Some(dir.path().join("only.abc")),
        ..Targets::default()
    };

    let summary = convert(&riff(), &targets, &EncoderParams::default()).unwrap();
    assert_eq!(summary.written, vec![dir.path().join("only.abc")]);
    assert!(!dir.path().join("only.mid").exists());
}

#[test]
fn config_drives_encoder_params() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TessConfig::default();
    config.midi.ticks_per_beat = 96;
    config.notation.reference = 7;

    let targets = Targets {
        midi: Some(dir.path().join("a.mid")),
        abc: Some(dir.path().join("a.abc")),
        ..Targets::default()
    };
    convert(&riff(), &targets, &EncoderParams::from(&config)).unwrap();

    let bytes = std::fs::read(dir.path().join("a.mid")).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    let Timing::Metrical(ticks) = smf.header.timing else {
        panic!("expected metrical timing");
    };
    assert_eq!(ticks.as_int(), 96);

    let abc = std::fs::read_to_string(dir.path().join("a.abc")).unwrap();
    assert!(abc.starts_with("X:7\n"));
}

#[test]
fn invalid_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let targets = Targets {
        midi: Some(dir.path().join("bad.mid")),
        ..Targets::default()
    };

    let err = convert(&json!({"notes": []}), &targets, &EncoderParams::default()).unwrap_err();
    assert!(format!("{err:#}").contains("composition is invalid"), "{err:#}");
    assert!(!dir.path().join("bad.mid").exists());
}

#[test]
fn no_targets_is_an_error() {
    let err = convert(&riff(), &Targets::default(), &EncoderParams::default()).unwrap_err();
    assert!(err.to_string().contains("nothing to do"));
}

#[test]
fn normalize_is_idempotent() {
    let once = normalize_value(&riff()).unwrap();
    let reparsed: Value = serde_json::from_str(&once).unwrap();
    let twice = normalize_value(&reparsed).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn validate_reports_structure() {
    assert!(validate_value(&riff()).success);

    let report = validate_value(&json!({"notes": []}));
    assert!(!report.success);
    assert!(report.errors.iter().any(|e| e.contains("sequences")));
}

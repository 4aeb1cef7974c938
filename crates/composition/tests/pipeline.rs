use composition::{
    normalize, prepare, resolve_tempo_at, resolve_time, Level, PipelineError, TempoPoint,
    TimeExpr,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn normalize_twice_is_normalize_once() {
    let inputs = [
        json!({
            "tempo": 90,
            "tracks": {
                "lead": [{"pitch": "C4", "start": 0, "length": 1}],
                "bass": {"notes": [{"note": 36, "time": 0, "dur": 4}], "channel": 1}
            }
        }),
        json!({
            "bpm": 140,
            "parts": [
                {"name": "keys", "instrument": "piano", "events": [{"pitch": "E4", "time": 0, "duration": 0.5}]}
            ]
        }),
        json!([{"pitch": "G4", "start": 0, "length": 2}]),
    ];

    for input in inputs {
        let once = normalize(&input);
        let twice = normalize(&once.to_value());
        assert_eq!(once, twice);
    }
}

#[test]
fn time_expressions_resolve_to_seconds() {
    assert_eq!(resolve_time(&TimeExpr::Seconds(5.0), 93.0), 5.0);
    assert_eq!(resolve_time(&"1:0".into(), 120.0), 2.0);
    assert_eq!(resolve_time(&"4n".into(), 120.0), 0.5);
}

#[test]
fn tempo_lookup_is_a_step_function() {
    let map = vec![
        TempoPoint { time: 0.0.into(), bpm: 120.0 },
        TempoPoint { time: 4.0.into(), bpm: 90.0 },
        TempoPoint { time: 8.0.into(), bpm: 150.0 },
    ];
    assert_eq!(resolve_tempo_at(&map, 120.0, 5.0), 90.0);
    assert_eq!(resolve_tempo_at(&map, 120.0, 8.0), 150.0);
}

#[test]
fn structural_errors_stop_the_pipeline() {
    let err = prepare(&json!({"notes": []})).unwrap_err();
    let PipelineError::Invalid(report) = err;
    assert!(!report.success);
    assert!(!report.errors.is_empty());
}

#[test]
fn range_warnings_survive_into_resolution() {
    let resolved = prepare(&json!({
        "bpm": 500,
        "tracks": {"lead": [{"pitch": "C4", "start": 0, "length": 1}]}
    }))
    .unwrap();

    assert_eq!(resolved.bpm, 500.0);
    assert!(resolved
        .diagnostics
        .iter()
        .any(|d| d.level == Level::Warning && d.message.contains("bpm")));
}

#[test]
fn canonical_times_survive_a_fractional_pitch() {
    let resolved = prepare(&json!({
        "formatId": composition::FORMAT_ID,
        "version": composition::FORMAT_VERSION,
        "bpm": 120,
        "audioGraph": [{"id": "lead", "type": "synth"}],
        "sequences": [{"label": "lead", "synthRef": "lead", "notes": [
            {"note": 61.5, "time": 1.0, "duration": 0.5},
            {"note": 60, "time": 2.0, "duration": 0.5}
        ]}]
    }))
    .unwrap();

    let notes = &resolved.sequences[0].notes;
    assert_eq!(notes[0].start, 1.0);
    assert_eq!(notes[0].duration, 0.5);
    assert_eq!(notes[0].microtuning, Some(-50.0));
    assert_eq!(notes[1].start, 2.0);
}

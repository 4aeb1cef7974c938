//! Canonical composition model and the stages that prepare it for encoding.
//!
//! Input JSON of several shapes is normalized into a [`Composition`], checked
//! by [`validate`], and resolved into a [`ResolvedComposition`] whose notes,
//! automation and annotations carry absolute times in seconds. Encoders only
//! ever see the resolved form.
//!
//! # Example
//!
//! ```
//! use composition::prepare;
//! use serde_json::json;
//!
//! let input = json!({
//!     "bpm": 120,
//!     "tracks": {
//!         "melody": [
//!             {"pitch": "C4", "start": 0, "length": 1},
//!             {"pitch": "E4", "start": 1, "length": 1}
//!         ]
//!     }
//! });
//!
//! let resolved = prepare(&input).expect("valid composition");
//! assert_eq!(resolved.sequences[0].notes[1].start, 0.5);
//! ```

pub mod controllers;
pub mod diagnostics;
pub mod key;
pub mod meter;
pub mod model;
pub mod normalize;
pub mod pitch;
pub mod resolve;
pub mod timing;
pub mod validate;

pub use controllers::{ControllerEntry, ControllerMap};
pub use diagnostics::{Diagnostic, Diagnostics, Level, Outcome};
pub use key::{KeySignature, Mode};
pub use meter::TimeSignature;
pub use model::*;
pub use normalize::normalize;
pub use pitch::{Accidental, NoteName, SpelledPitch, DEFAULT_PITCH};
pub use resolve::{
    resolve, AnnotationKind, Curve, Device, KeyAt, MeterAt, Repeat, ResolvedAnnotation,
    ResolvedAutomation, ResolvedComposition, ResolvedModulation, ResolvedNote, ResolvedSequence,
    Route, DEFAULT_VELOCITY, MAX_LOOP_PASSES, MIN_LOOP_PERIOD,
};
pub use timing::{
    parse_time, resolve_tempo_at, resolve_time, resolve_time_in, TempoMap, TempoSegment,
    TimeContext, TimeValue,
};
pub use validate::{validate, ValidationReport};

/// Format identifier carried by every canonical document
pub const FORMAT_ID: &str = "tessitura.composition";

/// Current canonical format version
pub const FORMAT_VERSION: &str = "1.0";

/// Tempo used when a composition does not set one
pub const DEFAULT_BPM: f64 = 120.0;

/// Errors from the preparation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("composition is invalid: {0}")]
    Invalid(ValidationReport),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Normalize, validate and resolve raw input
pub fn prepare(input: &serde_json::Value) -> Result<ResolvedComposition> {
    prepare_composition(&normalize(input))
}

/// Validate and resolve an already-normalized composition.
///
/// Validation warnings are carried into the resolved diagnostics.
pub fn prepare_composition(composition: &Composition) -> Result<ResolvedComposition> {
    let report = validate(composition);
    if !report.success {
        tracing::warn!(errors = report.errors.len(), "composition failed validation");
        return Err(PipelineError::Invalid(report));
    }

    let mut resolved = resolve(composition);
    let warnings = report.warnings.into_iter().map(Diagnostic::warning);
    resolved.diagnostics.splice(0..0, warnings);
    Ok(resolved)
}

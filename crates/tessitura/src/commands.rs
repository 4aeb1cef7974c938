//! Subcommand implementations.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use composition::{normalize, prepare, validate, Diagnostic, Level, Outcome, ValidationReport};
use serde_json::Value;
use tracing::{debug, info};

use crate::EncoderParams;

/// Read a JSON document from `path`, or from stdin when `path` is `-`
pub fn read_input(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading composition from stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading composition from {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Canonical JSON for any accepted input shape
pub fn normalize_value(input: &Value) -> Result<String> {
    let composition = normalize(input);
    serde_json::to_string_pretty(&composition).context("serializing canonical composition")
}

pub fn validate_value(input: &Value) -> ValidationReport {
    validate(&normalize(input))
}

/// Where each encoder's output goes; unset encoders do not run
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub midi: Option<PathBuf>,
    pub abc: Option<PathBuf>,
    pub script: Option<PathBuf>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        self.midi.is_none() && self.abc.is_none() && self.script.is_none()
    }
}

/// Diagnostic together with the stage that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct Reported {
    pub stage: &'static str,
    pub diagnostic: Diagnostic,
}

impl std::fmt::Display for Reported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.diagnostic.level {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        };
        write!(f, "{}: {}: {}", self.stage, level, self.diagnostic)
    }
}

#[derive(Debug, Default)]
pub struct ConvertSummary {
    pub written: Vec<PathBuf>,
    pub diagnostics: Vec<Reported>,
}

/// Prepare `input` once and run the requested encoders side by side
pub fn convert(input: &Value, targets: &Targets, params: &EncoderParams) -> Result<ConvertSummary> {
    if targets.is_empty() {
        bail!("nothing to do: pass --midi, --abc or --sc");
    }
    let resolved = prepare(input).context("cannot convert composition")?;
    debug!(sequences = resolved.sequences.len(), "composition prepared");

    let (midi, abc, script) = std::thread::scope(|s| {
        let midi = targets
            .midi
            .as_ref()
            .map(|_| s.spawn(|| midi_writer::encode(&resolved, &params.midi)));
        let abc = targets
            .abc
            .as_ref()
            .map(|_| s.spawn(|| abc::encode(&resolved, &params.abc)));
        let script = targets
            .script
            .as_ref()
            .map(|_| s.spawn(|| sclang::encode(&resolved, &params.script)));
        (
            midi.map(|h| h.join().map_err(|_| anyhow!("MIDI encoder panicked"))),
            abc.map(|h| h.join().map_err(|_| anyhow!("ABC encoder panicked"))),
            script.map(|h| h.join().map_err(|_| anyhow!("SuperCollider encoder panicked"))),
        )
    });

    let mut summary = ConvertSummary::default();
    summary.diagnostics.extend(resolved.diagnostics.iter().map(|d| Reported {
        stage: "resolve",
        diagnostic: d.clone(),
    }));

    if let (Some(path), Some(outcome)) = (&targets.midi, midi.transpose()?) {
        write_output(&mut summary, "midi", path, outcome, |bytes| bytes)?;
    }
    if let (Some(path), Some(outcome)) = (&targets.abc, abc.transpose()?) {
        write_output(&mut summary, "abc", path, outcome, String::into_bytes)?;
    }
    if let (Some(path), Some(outcome)) = (&targets.script, script.transpose()?) {
        write_output(&mut summary, "sc", path, outcome, String::into_bytes)?;
    }

    Ok(summary)
}

fn write_output<T>(
    summary: &mut ConvertSummary,
    stage: &'static str,
    path: &Path,
    outcome: Outcome<T>,
    into_bytes: impl FnOnce(T) -> Vec<u8>,
) -> Result<()> {
    summary
        .diagnostics
        .extend(outcome.diagnostics.into_iter().map(|diagnostic| Reported {
            stage,
            diagnostic,
        }));
    let bytes = into_bytes(outcome.value);
    std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "{} output written", stage);
    summary.written.push(path.to_path_buf());
    Ok(())
}

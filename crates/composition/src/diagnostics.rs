//! Diagnostics (errors, warnings, notes) produced while resolving and encoding.
//!
//! Nothing in the pipeline is fatal once a composition has validated, so every
//! fallback is recorded here and handed back with the value it affected.
//! Each recorded diagnostic is also emitted as a `tracing` event; callers pick
//! the subscriber.

use serde::{Deserialize, Serialize};

/// A single diagnostic attached to a location in the composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    /// Dotted path into the composition, e.g. `sequences[0].notes[3].time`
    pub path: Option<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            level: Level::Error,
            message: message.into(),
            path: None,
            suggestion: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            level: Level::Warning,
            message: message.into(),
            path: None,
            suggestion: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Diagnostic {
            level: Level::Info,
            message: message.into(),
            path: None,
            suggestion: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// The affected value could not be produced at all
    Error,
    /// A default or substitute was used in place of the input
    Warning,
    /// Informational, output is still faithful
    Info,
}

/// Collector for diagnostics during a single pass
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { items: Vec::new() }
    }

    /// Record a warning at `path`
    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(message).with_path(path);
        tracing::warn!(path = ?diagnostic.path, "{}", diagnostic.message);
        self.items.push(diagnostic);
    }

    /// Record an informational note at `path`
    pub fn info(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic::info(message).with_path(path);
        tracing::debug!(path = ?diagnostic.path, "{}", diagnostic.message);
        self.items.push(diagnostic);
    }

    /// Record an already-built diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Error => tracing::error!(path = ?diagnostic.path, "{}", diagnostic.message),
            Level::Warning => tracing::warn!(path = ?diagnostic.path, "{}", diagnostic.message),
            Level::Info => tracing::debug!(path = ?diagnostic.path, "{}", diagnostic.message),
        }
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// A value together with the diagnostics produced while building it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Outcome { value, diagnostics }
    }

    pub fn ok(value: T) -> Self {
        Outcome {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == Level::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == Level::Error)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}

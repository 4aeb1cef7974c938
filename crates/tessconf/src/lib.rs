//! Configuration loading for the tessitura encoders.
//!
//! Every setting has a compiled default, so running with no config files at
//! all is the normal case. Files only need the keys they change.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tessconf::TessConfig;
//!
//! let config = TessConfig::load().expect("Failed to load config");
//! println!("ticks per beat: {}", config.midi.ticks_per_beat);
//! println!("ABC bars per line: {}", config.notation.bars_per_line);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/tessitura/config.toml` (system)
//! 2. `~/.config/tessitura/config.toml` (user)
//! 3. `./tessitura.toml` (local override) or the `--config` path
//! 4. Environment variables (`TESSITURA_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [midi]
//! ticks_per_beat = 960
//!
//! [notation]
//! bars_per_line = 8
//!
//! [script]
//! server = "~server"
//! default_quant = 1.0
//!
//! [controllers]
//! brightness = 74
//!
//! [controllers.fmSynth]
//! harmonicity = 20
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{LoggingConfig, MidiConfig, NotationConfig, ScriptConfig};

use composition::{ControllerEntry, ControllerMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Config file {0} does not exist")]
    NotFound(PathBuf),

    #[error("Invalid value in config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Complete tessitura configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TessConfig {
    pub logging: LoggingConfig,
    pub midi: MidiConfig,
    pub notation: NotationConfig,
    pub script: ScriptConfig,
    /// Parameter name to CC table used for MIDI automation.
    pub controllers: ControllerMap,
}

impl TessConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` in place of `./tessitura.toml`.
    ///
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }

        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();
        for path in loader::discover_config_files_with_override(config_path) {
            loader::merge_tables(&mut merged, loader::load_table(&path)?);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config: TessConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.clone(),
                message: e.to_string(),
            })?;
        if !MidiConfig::valid_ticks(config.midi.ticks_per_beat) {
            return Err(ConfigError::Invalid {
                path: origin,
                message: format!(
                    "midi.ticks_per_beat = {} is outside 1..={}",
                    config.midi.ticks_per_beat,
                    MidiConfig::MAX_TICKS_PER_BEAT
                ),
            });
        }

        // file entries extend the built-in controller table
        let mut controllers = ControllerMap::default();
        controllers.merge(&config.controllers);
        config.controllers = controllers;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# tessitura configuration\n\n");

        output.push_str("[logging]\n");
        output.push_str(&format!("level = {}\n", quoted(&self.logging.level)));

        output.push_str("\n[midi]\n");
        output.push_str(&format!("ticks_per_beat = {}\n", self.midi.ticks_per_beat));
        output.push_str(&format!("default_pitch = {}\n", self.midi.default_pitch));

        output.push_str("\n[notation]\n");
        output.push_str(&format!("reference = {}\n", self.notation.reference));
        output.push_str(&format!("bars_per_line = {}\n", self.notation.bars_per_line));
        output.push_str(&format!("source = {}\n", quoted(&self.notation.source)));

        output.push_str("\n[script]\n");
        output.push_str(&format!("server = {}\n", quoted(&self.script.server)));
        if let Some(quant) = self.script.default_quant {
            output.push_str(&format!("default_quant = {:?}\n", quant));
        }

        output.push_str("\n[controllers]\n");
        let entries = self.controllers.entries();
        for (name, entry) in entries {
            if let ControllerEntry::Cc(cc) = entry {
                output.push_str(&format!("{} = {}\n", key(name), cc));
            }
        }
        for (kind, entry) in entries {
            if let ControllerEntry::Table(table) = entry {
                output.push_str(&format!("\n[controllers.{}]\n", key(kind)));
                for (name, cc) in table {
                    output.push_str(&format!("{} = {}\n", key(name), cc));
                }
            }
        }

        output
    }
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

/// Bare keys stay bare, anything else is quoted
fn key(s: &str) -> String {
    let bare = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        s.to_string()
    } else {
        quoted(s)
    }
}

//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, MidiConfig, TessConfig};
use std::env;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/tessitura/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("tessitura/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("tessitura.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw table, checking that it deserializes.
pub fn load_table(path: &Path) -> Result<Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<Table, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let table: Table = contents
        .parse()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;
    Value::Table(table.clone())
        .try_into::<TessConfig>()
        .map_err(|e| parse_error(e.to_string()))?;
    Ok(table)
}

/// Merge `overlay` into `base`; nested tables merge key by key, anything
/// else in `overlay` replaces what `base` had.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(mine)), Value::Table(theirs)) => merge_tables(mine, theirs),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut TessConfig, sources: &mut ConfigSources) {
    apply_overrides(config, sources, |key| env::var(key).ok());
}

/// Apply overrides read through `lookup`; unparseable numbers are ignored.
pub fn apply_overrides(
    config: &mut TessConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut applied = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = lookup("TESSITURA_LOG_LEVEL") {
        config.logging.level = v;
        applied("TESSITURA_LOG_LEVEL");
    }
    // RUST_LOG wins, as it does for every other tool
    if let Some(v) = lookup("RUST_LOG") {
        config.logging.level = v;
        applied("RUST_LOG");
    }

    if let Some(ticks) = lookup("TESSITURA_TICKS_PER_BEAT")
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|t| MidiConfig::valid_ticks(*t))
    {
        config.midi.ticks_per_beat = ticks;
        applied("TESSITURA_TICKS_PER_BEAT");
    }
    if let Some(pitch) = lookup("TESSITURA_DEFAULT_PITCH")
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|p| *p <= 127)
    {
        config.midi.default_pitch = pitch;
        applied("TESSITURA_DEFAULT_PITCH");
    }

    if let Some(bars) = lookup("TESSITURA_BARS_PER_LINE").and_then(|v| v.parse().ok()) {
        config.notation.bars_per_line = bars;
        applied("TESSITURA_BARS_PER_LINE");
    }
    if let Some(v) = lookup("TESSITURA_SC_SERVER") {
        config.script.server = v;
        applied("TESSITURA_SC_SERVER");
    }
}

//! Parameter name to MIDI CC mapping.
//!
//! Automation targets such as `lead.cutoff` are turned into control changes
//! through this table. Top-level entries apply to every synth kind; a table
//! keyed by a kind name (`fmSynth = { modulationIndex = 1 }`) overrides them
//! for that kind only. The table is plain data so callers can load it from
//! configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::NodeKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControllerEntry {
    Cc(u8),
    Table(BTreeMap<String, u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerMap {
    entries: BTreeMap<String, ControllerEntry>,
}

impl Default for ControllerMap {
    fn default() -> Self {
        let mut map = ControllerMap::empty();
        for (param, cc) in [
            ("volume", 7),
            ("pan", 10),
            ("expression", 11),
            ("modulation", 1),
            ("cutoff", 74),
            ("frequency", 74),
            ("resonance", 71),
            ("q", 71),
            ("attack", 73),
            ("release", 72),
            ("reverb", 91),
            ("chorus", 93),
            ("detune", 94),
        ] {
            map.set(param, cc);
        }
        map.set_for(&NodeKind::FmSynth, "modulationIndex", 1);
        map.set_for(&NodeKind::FmSynth, "harmonicity", 75);
        map.set_for(&NodeKind::AmSynth, "harmonicity", 75);
        map.set_for(&NodeKind::DuoSynth, "vibratoAmount", 76);
        map.set_for(&NodeKind::DuoSynth, "vibratoRate", 77);
        map
    }
}

impl ControllerMap {
    pub fn empty() -> Self {
        ControllerMap {
            entries: BTreeMap::new(),
        }
    }

    /// Map `param` to `cc` for every kind
    pub fn set(&mut self, param: &str, cc: u8) {
        self.entries
            .insert(param.to_string(), ControllerEntry::Cc(cc));
    }

    /// Map `param` to `cc` for one node kind
    pub fn set_for(&mut self, kind: &NodeKind, param: &str, cc: u8) {
        let entry = self
            .entries
            .entry(kind.as_str().to_string())
            .or_insert_with(|| ControllerEntry::Table(BTreeMap::new()));
        if !matches!(entry, ControllerEntry::Table(_)) {
            *entry = ControllerEntry::Table(BTreeMap::new());
        }
        if let ControllerEntry::Table(table) = entry {
            table.insert(param.to_string(), cc);
        }
    }

    /// CC number for a parameter on a node of `kind`.
    ///
    /// `param` may be a dotted path; only the last segment is matched.
    /// Names compare case-insensitively.
    pub fn lookup(&self, kind: &NodeKind, param: &str) -> Option<u8> {
        let param = param.rsplit('.').next().unwrap_or(param);

        let per_kind = self.entries.iter().find_map(|(k, v)| match v {
            ControllerEntry::Table(table) if NodeKind::parse(k) == *kind => {
                find_ci(table, param)
            }
            _ => None,
        });

        per_kind.or_else(|| {
            self.entries.iter().find_map(|(k, v)| match v {
                ControllerEntry::Cc(cc) if k.eq_ignore_ascii_case(param) => Some(*cc),
                _ => None,
            })
        })
    }

    /// Overlay `other` on top of this map; per-kind tables merge key by key
    pub fn merge(&mut self, other: &ControllerMap) {
        for (key, entry) in &other.entries {
            match (self.entries.get_mut(key), entry) {
                (Some(ControllerEntry::Table(mine)), ControllerEntry::Table(theirs)) => {
                    mine.extend(theirs.iter().map(|(k, v)| (k.clone(), *v)));
                }
                _ => {
                    self.entries.insert(key.clone(), entry.clone());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, ControllerEntry> {
        &self.entries
    }
}

fn find_ci(table: &BTreeMap<String, u8>, param: &str) -> Option<u8> {
    table
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(param))
        .map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lookup() {
        let map = ControllerMap::default();
        assert_eq!(map.lookup(&NodeKind::Synth, "volume"), Some(7));
        assert_eq!(map.lookup(&NodeKind::Synth, "lead.filter.cutoff"), Some(74));
        assert_eq!(map.lookup(&NodeKind::Synth, "Pan"), Some(10));
        assert_eq!(map.lookup(&NodeKind::Synth, "wobble"), None);
    }

    #[test]
    fn test_per_kind_override() {
        let map = ControllerMap::default();
        assert_eq!(map.lookup(&NodeKind::FmSynth, "modulationIndex"), Some(1));
        assert_eq!(map.lookup(&NodeKind::Synth, "modulationIndex"), None);
        assert_eq!(map.lookup(&NodeKind::DuoSynth, "vibratoRate"), Some(77));
        // falls back to the shared table
        assert_eq!(map.lookup(&NodeKind::FmSynth, "volume"), Some(7));
    }

    #[test]
    fn test_merge_overlays_tables() {
        let mut map = ControllerMap::default();
        let mut custom = ControllerMap::empty();
        custom.set("cutoff", 16);
        custom.set_for(&NodeKind::FmSynth, "harmonicity", 20);
        map.merge(&custom);

        assert_eq!(map.lookup(&NodeKind::Synth, "cutoff"), Some(16));
        assert_eq!(map.lookup(&NodeKind::FmSynth, "harmonicity"), Some(20));
        assert_eq!(map.lookup(&NodeKind::FmSynth, "modulationIndex"), Some(1));
    }

    #[test]
    fn test_deserializes_from_json_shape() {
        let map: ControllerMap = serde_json::from_value(serde_json::json!({
            "brightness": 74,
            "amSynth": {"harmonicity": 12}
        }))
        .unwrap();
        assert_eq!(map.lookup(&NodeKind::Synth, "brightness"), Some(74));
        assert_eq!(map.lookup(&NodeKind::AmSynth, "harmonicity"), Some(12));
    }
}

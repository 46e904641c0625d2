// config.rs — Synthesis configuration: hardware inventory and pipelining knobs
//
// Maps each hardware opcode to the number of unit instances available per
// block. Memory-port opcodes (`mem_<port>`) fall back to the generic `mem`
// entry when not listed individually. A count of zero means "not available".
//
// Preconditions: none.
// Postconditions: `instances_for` never returns `Some(0)`.
// Failure modes: unreadable or malformed JSON → `ConfigError`.
// Side effects: `load` reads one file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::DEFAULT_STREAMS;

/// Opcodes present in the default inventory.
pub const DEFAULT_OPCODES: &[&str] = &[
    "add", "sub", "mul", "rem", "and", "or", "xor", "shl", "lshr", "ashr", "cmp", "select",
    "cast", "gep", "call", "alloca", "control",
];

/// Generic memory-port opcode.
pub const MEM_OPCODE: &str = "mem";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("stream count must be at least 1")]
    NoStreams,
}

/// Address pipelining options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub enabled: bool,
    /// Index distance of the prefetched access.
    pub offset: i64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            enabled: true,
            offset: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Hardware opcode → instance count.
    pub units: BTreeMap<String, u32>,
    /// Issue streams per instance.
    pub streams: usize,
    pub pipelining: PipelineOptions,
}

impl Default for SynthConfig {
    /// One unit per opcode and two memory ports.
    fn default() -> Self {
        let mut units: BTreeMap<String, u32> =
            DEFAULT_OPCODES.iter().map(|op| (op.to_string(), 1)).collect();
        units.insert(MEM_OPCODE.to_string(), 2);
        SynthConfig {
            units,
            streams: DEFAULT_STREAMS,
            pipelining: PipelineOptions::default(),
        }
    }
}

impl SynthConfig {
    /// A configuration with no units at all.
    pub fn empty() -> Self {
        SynthConfig {
            units: BTreeMap::new(),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, opcode: &str, count: u32) -> Self {
        self.units.insert(opcode.to_string(), count);
        self
    }

    pub fn without_pipelining(mut self) -> Self {
        self.pipelining.enabled = false;
        self
    }

    /// Instance count for `opcode`, `None` when it has no units.
    pub fn instances_for(&self, opcode: &str) -> Option<u32> {
        let count = match self.units.get(opcode) {
            Some(count) => *count,
            None if opcode.starts_with("mem_") => *self.units.get(MEM_OPCODE)?,
            None => return None,
        };
        (count > 0).then_some(count)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SynthConfig = serde_json::from_str(text)?;
        if config.streams == 0 {
            return Err(ConfigError::NoStreams);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Canonical JSON form, used for provenance hashing.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inventory() {
        let cfg = SynthConfig::default();
        assert_eq!(cfg.instances_for("add"), Some(1));
        assert_eq!(cfg.instances_for("mem"), Some(2));
        assert_eq!(cfg.instances_for("mem_A"), Some(2));
        assert_eq!(cfg.instances_for("fdiv"), None);
        assert_eq!(cfg.streams, 2);
        assert!(cfg.pipelining.enabled);
    }

    #[test]
    fn zero_count_means_unavailable() {
        let cfg = SynthConfig::empty().with_unit("mul", 0);
        assert_eq!(cfg.instances_for("mul"), None);
    }

    #[test]
    fn port_specific_entry_wins() {
        let cfg = SynthConfig::default().with_unit("mem_B", 1);
        assert_eq!(cfg.instances_for("mem_B"), Some(1));
        assert_eq!(cfg.instances_for("mem_C"), Some(2));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SynthConfig::from_json(r#"{ "units": { "add": 2 } }"#).unwrap();
        assert_eq!(cfg.instances_for("add"), Some(2));
        assert_eq!(cfg.instances_for("mul"), None);
        assert_eq!(cfg.streams, 2);
        assert_eq!(cfg.pipelining.offset, 1);
    }

    #[test]
    fn zero_streams_rejected() {
        let err = SynthConfig::from_json(r#"{ "streams": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::NoStreams));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SynthConfig::load(Path::new("/nonexistent/hlsc.json")).unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/hlsc.json"));
    }
}

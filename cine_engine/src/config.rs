use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::script::GameVariant;

/// Engine settings read from an optional JSON file; missing keys keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub variant: GameVariant,
    /// Seeds the bounded-random operand.
    pub rng_seed: u64,
    /// Procedure enqueued at boot and after every procedure reload.
    pub boot_script: u16,
    pub max_ticks: u32,
    /// Per-quantum instruction cap; `None` lets an instance run until it
    /// yields.
    pub instruction_budget: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            variant: GameVariant::default(),
            rng_seed: 0,
            boot_script: 1,
            max_ticks: 100,
            instruction_budget: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config json: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_yields_defaults() {
        let config = EngineConfig::from_json_file(None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.boot_script, 1);
        assert_eq!(config.max_ticks, 100);
    }

    #[test]
    fn partial_file_overrides_named_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "variant": "operation-stealth", "rng_seed": 42, "instruction_budget": 5000 }}"#
        )
        .unwrap();
        let config = EngineConfig::from_json_file(Some(file.path())).unwrap();
        assert_eq!(config.variant, GameVariant::OperationStealth);
        assert_eq!(config.rng_seed, 42);
        assert_eq!(config.instruction_budget, Some(5000));
        assert_eq!(config.boot_script, 1);
    }

    #[test]
    fn malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"variant\": \"dune\" }}").unwrap();
        let err = EngineConfig::from_json_file(Some(file.path())).unwrap_err();
        assert!(format!("{err}").contains("failed to parse engine config json"));
    }
}

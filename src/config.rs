use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What happens when a firing would push an output place over its capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Output capacity is part of the guard: such a transition is not enabled.
    #[default]
    Gate,
    /// The guard only looks at input places; `fire` fails with
    /// `CapacityExceeded` and leaves the marking untouched.
    Reject,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub capacity_policy: CapacityPolicy,
    /// Whether the fluent `connect_place(..).to(..)` form may declare nodes
    /// that do not exist yet.
    #[serde(default = "default_auto_create")]
    pub auto_create: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity_policy: CapacityPolicy::default(),
            auto_create: default_auto_create(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("no engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        log::info!("loaded engine config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn default_auto_create() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.capacity_policy, CapacityPolicy::Gate);
        assert!(config.auto_create);
    }

    #[test]
    fn parses_every_field() {
        let config = EngineConfig::from_toml_str(
            r#"
            capacity_policy = "reject"
            auto_create = false
            "#,
        )
        .unwrap();
        assert_eq!(config.capacity_policy, CapacityPolicy::Reject);
        assert!(!config.auto_create);
    }

    #[test]
    fn unknown_policy_is_an_error() {
        assert!(EngineConfig::from_toml_str(r#"capacity_policy = "clamp""#).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("ptnet-config-that-does-not-exist.toml");
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn reads_config_from_disk() {
        let path = std::env::temp_dir().join(format!("ptnet-config-{}.toml", std::process::id()));
        fs::write(&path, "auto_create = false\n").unwrap();
        let config = EngineConfig::load_from_file(&path);
        let _ = fs::remove_file(&path);
        let config = config.unwrap();
        assert!(!config.auto_create);
        assert_eq!(config.capacity_policy, CapacityPolicy::Gate);
    }
}

//! Engine configuration with an explicit load/save lifecycle.
//!
//! The engine receives an [`EngineConfig`] by value at construction and only
//! reads from it afterwards.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::utils::{EngineError, EngineResult, OutputSettings};

const MIB: u64 = 1024 * 1024;

/// Which collaborator performs `Upscale` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum UpscalerConfig {
    /// Lanczos3 resampling, optional denoise blur
    #[default]
    Resample,
    /// External `waifu2x-converter-cpp` compatible binary
    Waifu2x { binary: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Default memory budget offered to a batch run
    pub memory_budget_bytes: u64,
    /// Default worker count requested for a batch run
    pub parallelism: usize,
    /// Byte budget of the shared result cache; 0 disables caching
    pub cache_budget_bytes: u64,
    /// Capacity of the progress broadcast channel
    pub event_capacity: usize,
    pub output: OutputSettings,
    pub upscaler: UpscalerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: 1024 * MIB,
            parallelism: num_cpus::get(),
            cache_budget_bytes: 256 * MIB,
            event_capacity: 1024,
            output: OutputSettings::default(),
            upscaler: UpscalerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            EngineError::config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load config from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> EngineResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Persist configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.parallelism == 0 {
            return Err(EngineError::config("Parallelism cannot be 0"));
        }
        if self.memory_budget_bytes == 0 {
            return Err(EngineError::config("Memory budget cannot be 0 bytes"));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::config("Event capacity cannot be 0"));
        }
        if let UpscalerConfig::Waifu2x { binary } = &self.upscaler {
            if binary.as_os_str().is_empty() {
                return Err(EngineError::config("Waifu2x backend requires a binary path"));
            }
        }
        if self.cache_budget_bytes > self.memory_budget_bytes {
            warn!(
                "Cache budget ({} MiB) exceeds the default memory budget ({} MiB)",
                self.cache_budget_bytes / MIB,
                self.memory_budget_bytes / MIB
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::NamingScheme;

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"parallelism": 2, "output": {"naming": {"scheme": "sequential"}}}"#)
                .unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.output.naming, NamingScheme::Sequential);
        assert_eq!(config.output.directory, PathBuf::from("output"));
        assert_eq!(config.cache_budget_bytes, 256 * MIB);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let config = EngineConfig {
            parallelism: 3,
            upscaler: UpscalerConfig::Waifu2x { binary: PathBuf::from("/usr/bin/waifu2x") },
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let config = EngineConfig { parallelism: 0, ..EngineConfig::default() };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }
}

// config.rs — process-wide engine configuration.
//
// `EngineConfig::default()` reproduces every default named in spec §6 so
// the engine runs sensibly with zero configuration; `from_file`/`from_str`
// load a TOML override and validate ranges before handing back a config,
// the same "validate once at the boundary" shape the teacher's config
// loaders use.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CieError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalsConfig {
    pub timeout_hours: u32,
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self { timeout_hours: 24 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry_max: u32,
    pub retry_base_seconds: u64,
    pub retry_cap_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_max: 8,
            retry_base_seconds: 30,
            retry_cap_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub max_depth_default: u32,
    pub max_depth_device_blast: u32,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_depth_default: 2,
            max_depth_device_blast: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub clip_min: u8,
    pub clip_max: u8,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            clip_min: 0,
            clip_max: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub core_device_k: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { core_device_k: 2 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub maintenance_window_grace_minutes: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            maintenance_window_grace_minutes: 5,
        }
    }
}

/// Process-wide settings enumerated in spec §6, grouped the way the TOML
/// document groups them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub approvals: ApprovalsConfig,
    pub sync: SyncConfig,
    pub impact: ImpactConfig,
    pub risk: RiskConfig,
    pub graph: GraphConfig,
    pub execution: ExecutionConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CieError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CieError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&raw)
    }

    pub fn from_str(raw: &str) -> Result<Self, CieError> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|err| CieError::Validation(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CieError> {
        if self.approvals.timeout_hours == 0 {
            return Err(CieError::Validation(
                "approvals.timeout_hours must be >= 1".to_string(),
            ));
        }
        if self.sync.retry_max == 0 {
            return Err(CieError::Validation(
                "sync.retry_max must be >= 1".to_string(),
            ));
        }
        if self.sync.retry_base_seconds == 0 || self.sync.retry_cap_seconds < self.sync.retry_base_seconds {
            return Err(CieError::Validation(
                "sync.retry_cap_seconds must be >= sync.retry_base_seconds > 0".to_string(),
            ));
        }
        if self.impact.max_depth_default == 0 || self.impact.max_depth_device_blast == 0 {
            return Err(CieError::Validation(
                "impact depth bounds must be >= 1".to_string(),
            ));
        }
        if self.risk.clip_min >= self.risk.clip_max {
            return Err(CieError::Validation(
                "risk.clip_min must be < risk.clip_max".to_string(),
            ));
        }
        if self.graph.core_device_k == 0 {
            return Err(CieError::Validation(
                "graph.core_device_k must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

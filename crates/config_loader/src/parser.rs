//! Blueprint decoding

use std::path::Path;

use contracts::{ContractError, SimulationBlueprint};

/// Blueprint file format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{} has no extension, expected .toml or .json",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }

    /// Decode without validating
    pub fn decode(self, content: &str) -> Result<SimulationBlueprint, ContractError> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| ContractError::config_decode("TOML", e)),
            Self::Json => {
                serde_json::from_str(content).map_err(|e| ContractError::config_decode("JSON", e))
            }
        }
    }
}

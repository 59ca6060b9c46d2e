//! `config.yaml` at the script root

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DlSyncError, Result};
use crate::model::Script;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Extra dependencies the extractor cannot infer, keyed by full object name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyOverride {
    pub script: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Deployment settings read from `config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Full object names never deployed or verified
    pub script_exclusion: Vec<String>,
    /// Tables whose rows are exported along with their DDL
    pub config_tables: Vec<String>,
    /// Keep deploying after an execution error and report all failures at the end
    pub continue_on_failure: bool,
    pub dependency_override: Vec<DependencyOverride>,
}

impl Config {
    /// Load `config.yaml` from `script_root`; a missing file yields defaults
    pub fn load(script_root: &Path) -> Result<Self> {
        let path = script_root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!("No {} found under {}, using defaults", CONFIG_FILE_NAME, script_root.display());
            return Ok(Self::default());
        }
        info!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| DlSyncError::ConfigReadError {
            path: path.clone(),
            source: e,
        })?;
        Self::from_yaml(&content, &path)
    }

    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| DlSyncError::ConfigParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn is_script_excluded(&self, script: &Script) -> bool {
        let full_name = script.full_object_name();
        self.script_exclusion
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(&full_name))
    }
}

//! Connection properties, profile selection and script parameters,
//! all sourced from the environment and the script root.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{DlSyncError, Result};

pub const DEFAULT_PROFILE: &str = "dev";
pub const PROFILE_KEY: &str = "profile";

/// Environment keys read into [`ConnectionProperties`]
pub const CONNECTION_KEYS: [&str; 8] = [
    "user",
    "password",
    "account",
    "warehouse",
    "db",
    "schema",
    "role",
    "authenticator",
];

/// Target database connection settings
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionProperties {
    pub account: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub warehouse: Option<String>,
    pub db: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub authenticator: Option<String>,
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("warehouse", &self.warehouse)
            .field("db", &self.db)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("authenticator", &self.authenticator)
            .finish()
    }
}

impl ConnectionProperties {
    /// Build from any key lookup; `account` is mandatory.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        for key in CONNECTION_KEYS {
            if key != "authenticator" && get(key).is_none() {
                warn!("Connection property {} not found", key);
            }
        }

        let account = get("account")
            .ok_or_else(|| DlSyncError::configuration("connection property 'account' is required"))?;

        Ok(Self {
            account,
            user: get("user"),
            password: get("password"),
            warehouse: get("warehouse"),
            db: get("db"),
            schema: get("schema"),
            role: get("role"),
            authenticator: get("authenticator"),
        })
    }
}

/// Active profile: `profile` environment value lowercased, or `dev`
pub fn profile_from_lookup<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(PROFILE_KEY)
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.trim().to_lowercase())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

pub fn parameter_file_name(profile: &str) -> String {
    format!("parameter-{}.properties", profile)
}

/// Parse `key=value` / `key: value` lines, skipping `#` and `!` comments
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Load `parameter-<profile>.properties` from `script_root`.
///
/// Environment values override keys already present in the file; keys
/// that only exist in the environment are ignored. A missing file yields
/// no parameters.
pub fn load_parameters<F>(script_root: &Path, profile: &str, lookup: F) -> Result<BTreeMap<String, String>>
where
    F: Fn(&str) -> Option<String>,
{
    let path = script_root.join(parameter_file_name(profile));
    if !path.exists() {
        warn!("Parameter file {} not found, no parameters loaded", path.display());
        return Ok(BTreeMap::new());
    }
    debug!("Loading property file from {}", path.display());
    let content = std::fs::read_to_string(&path).map_err(|e| DlSyncError::ConfigReadError {
        path: path.clone(),
        source: e,
    })?;

    let mut parameters = parse_properties(&content);
    for (key, value) in parameters.iter_mut() {
        if let Some(overridden) = lookup(key) {
            *value = overridden;
        }
    }
    info!("Initialized with parameters: {:?}", parameters.keys().collect::<Vec<_>>());
    Ok(parameters)
}

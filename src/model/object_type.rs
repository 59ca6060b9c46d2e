//! Database object kinds managed by dlsync

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an object lives: directly in the account, or inside a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectLevel {
    Account,
    Schema,
}

/// Kind of database object a script defines
///
/// The variant name doubles as the script directory name (`TABLES`,
/// `FILE_FORMATS`, ...), while [`ScriptObjectType::singular`] is the
/// keyword used in DDL (`TABLE`, `FILE FORMAT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptObjectType {
    Tables,
    DynamicTables,
    Streams,
    Sequences,
    Stages,
    Tasks,
    Alerts,
    Views,
    SemanticViews,
    Functions,
    Procedures,
    FileFormats,
    Pipes,
    MaskingPolicies,
    RowAccessPolicies,
    Streamlits,
    CortexSearchServices,
    Agents,
    Databases,
    Schemas,
    Roles,
    Warehouses,
    Integrations,
    NetworkPolicies,
    ResourceMonitors,
}

impl ScriptObjectType {
    pub const ALL: [ScriptObjectType; 25] = [
        ScriptObjectType::Tables,
        ScriptObjectType::DynamicTables,
        ScriptObjectType::Streams,
        ScriptObjectType::Sequences,
        ScriptObjectType::Stages,
        ScriptObjectType::Tasks,
        ScriptObjectType::Alerts,
        ScriptObjectType::Views,
        ScriptObjectType::SemanticViews,
        ScriptObjectType::Functions,
        ScriptObjectType::Procedures,
        ScriptObjectType::FileFormats,
        ScriptObjectType::Pipes,
        ScriptObjectType::MaskingPolicies,
        ScriptObjectType::RowAccessPolicies,
        ScriptObjectType::Streamlits,
        ScriptObjectType::CortexSearchServices,
        ScriptObjectType::Agents,
        ScriptObjectType::Databases,
        ScriptObjectType::Schemas,
        ScriptObjectType::Roles,
        ScriptObjectType::Warehouses,
        ScriptObjectType::Integrations,
        ScriptObjectType::NetworkPolicies,
        ScriptObjectType::ResourceMonitors,
    ];

    /// DDL keyword for this object type
    pub fn singular(&self) -> &'static str {
        match self {
            ScriptObjectType::Tables => "TABLE",
            ScriptObjectType::DynamicTables => "DYNAMIC TABLE",
            ScriptObjectType::Streams => "STREAM",
            ScriptObjectType::Sequences => "SEQUENCE",
            ScriptObjectType::Stages => "STAGE",
            ScriptObjectType::Tasks => "TASK",
            ScriptObjectType::Alerts => "ALERT",
            ScriptObjectType::Views => "VIEW",
            ScriptObjectType::SemanticViews => "SEMANTIC VIEW",
            ScriptObjectType::Functions => "FUNCTION",
            ScriptObjectType::Procedures => "PROCEDURE",
            ScriptObjectType::FileFormats => "FILE FORMAT",
            ScriptObjectType::Pipes => "PIPE",
            ScriptObjectType::MaskingPolicies => "MASKING POLICY",
            ScriptObjectType::RowAccessPolicies => "ROW ACCESS POLICY",
            ScriptObjectType::Streamlits => "STREAMLIT",
            ScriptObjectType::CortexSearchServices => "CORTEX SEARCH SERVICE",
            ScriptObjectType::Agents => "AGENT",
            ScriptObjectType::Databases => "DATABASE",
            ScriptObjectType::Schemas => "SCHEMA",
            ScriptObjectType::Roles => "ROLE",
            ScriptObjectType::Warehouses => "WAREHOUSE",
            ScriptObjectType::Integrations => "INTEGRATION",
            ScriptObjectType::NetworkPolicies => "NETWORK POLICY",
            ScriptObjectType::ResourceMonitors => "RESOURCE MONITOR",
        }
    }

    /// Directory name scripts of this type are stored under
    pub fn directory_name(&self) -> &'static str {
        match self {
            ScriptObjectType::Tables => "TABLES",
            ScriptObjectType::DynamicTables => "DYNAMIC_TABLES",
            ScriptObjectType::Streams => "STREAMS",
            ScriptObjectType::Sequences => "SEQUENCES",
            ScriptObjectType::Stages => "STAGES",
            ScriptObjectType::Tasks => "TASKS",
            ScriptObjectType::Alerts => "ALERTS",
            ScriptObjectType::Views => "VIEWS",
            ScriptObjectType::SemanticViews => "SEMANTIC_VIEWS",
            ScriptObjectType::Functions => "FUNCTIONS",
            ScriptObjectType::Procedures => "PROCEDURES",
            ScriptObjectType::FileFormats => "FILE_FORMATS",
            ScriptObjectType::Pipes => "PIPES",
            ScriptObjectType::MaskingPolicies => "MASKING_POLICIES",
            ScriptObjectType::RowAccessPolicies => "ROW_ACCESS_POLICIES",
            ScriptObjectType::Streamlits => "STREAMLITS",
            ScriptObjectType::CortexSearchServices => "CORTEX_SEARCH_SERVICES",
            ScriptObjectType::Agents => "AGENTS",
            ScriptObjectType::Databases => "DATABASES",
            ScriptObjectType::Schemas => "SCHEMAS",
            ScriptObjectType::Roles => "ROLES",
            ScriptObjectType::Warehouses => "WAREHOUSES",
            ScriptObjectType::Integrations => "INTEGRATIONS",
            ScriptObjectType::NetworkPolicies => "NETWORK_POLICIES",
            ScriptObjectType::ResourceMonitors => "RESOURCE_MONITORS",
        }
    }

    pub fn level(&self) -> ObjectLevel {
        match self {
            ScriptObjectType::Databases
            | ScriptObjectType::Schemas
            | ScriptObjectType::Roles
            | ScriptObjectType::Warehouses
            | ScriptObjectType::Integrations
            | ScriptObjectType::NetworkPolicies
            | ScriptObjectType::ResourceMonitors => ObjectLevel::Account,
            _ => ObjectLevel::Schema,
        }
    }

    /// Whether scripts of this type are versioned migrations rather than
    /// definitions replaced in place on every deploy.
    pub fn is_migration(&self) -> bool {
        matches!(
            self,
            ScriptObjectType::Tables
                | ScriptObjectType::DynamicTables
                | ScriptObjectType::Streams
                | ScriptObjectType::Sequences
                | ScriptObjectType::Stages
                | ScriptObjectType::Tasks
                | ScriptObjectType::Alerts
                | ScriptObjectType::Databases
                | ScriptObjectType::Schemas
                | ScriptObjectType::Roles
        )
    }

    /// Look up a type by its directory name (case-insensitive)
    pub fn from_directory(name: &str) -> Option<ScriptObjectType> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.directory_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ScriptObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory_name())
    }
}

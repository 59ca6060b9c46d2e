//! Lineage edges and change-sync bookkeeping types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::object_type::ScriptObjectType;

/// A "depends-on" edge between two objects, keyed by full object name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScriptDependency {
    pub object_name: String,
    pub object_type: ScriptObjectType,
    pub dependency_name: String,
    pub dependency_type: ScriptObjectType,
}

impl fmt::Display for ScriptDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.object_name, self.dependency_name)
    }
}

/// Kind of run recorded in the change history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Deploy,
    Rollback,
    Verify,
    CreateScript,
    CreateLineage,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Deploy => "DEPLOY",
            ChangeType::Rollback => "ROLLBACK",
            ChangeType::Verify => "VERIFY",
            ChangeType::CreateScript => "CREATE_SCRIPT",
            ChangeType::CreateLineage => "CREATE_LINEAGE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    Success,
    Error,
}

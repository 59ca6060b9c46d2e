//! Persistence and execution boundary

mod ledger;

pub use ledger::{ChangeSyncRecord, Ledger, LedgerRepository, ScriptRecord};

use std::collections::HashSet;

use crate::error::Result;
use crate::model::{ChangeType, Script, ScriptDependency, ScriptKey, Status};

/// Everything the orchestration needs from the target database: applying
/// scripts, remembering what was applied, and reading objects back.
pub trait ChangeRepository {
    /// Refresh deployment history; returns the key of every deployed script
    fn load_script_hash(&mut self) -> Result<HashSet<ScriptKey>>;

    /// True when `script` was never deployed or its hash differs from the
    /// deployed one
    fn is_script_changed(&self, script: &Script) -> bool;

    /// True when this exact migration version has already been deployed
    fn is_script_version_deployed(&self, script: &Script) -> bool;

    /// Rebuild deployed migration versions for the given keys; keys of
    /// declarative scripts are ignored
    fn deployed_migration_scripts(&self, keys: &HashSet<ScriptKey>) -> Result<Vec<Script>>;

    /// Apply `script` (unless `only_hashes`) and record its hash
    fn create_script_object(&mut self, script: &Script, only_hashes: bool) -> Result<()>;

    /// Run the rollback SQL of a migration and forget its version
    fn execute_rollback(&mut self, script: &Script) -> Result<()>;

    /// Run the verify SQL of a migration
    fn execute_verify(&mut self, script: &Script) -> Result<bool>;

    /// Check that a declarative object in the database matches `script`
    fn verify_script(&mut self, script: &Script) -> Result<bool>;

    fn database_name(&self) -> Result<String>;

    fn schemas_in_database(&self, database: &str) -> Result<Vec<String>>;

    /// Declarative objects currently defined in `schema`
    fn state_scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>>;

    /// Every object currently defined in `schema`
    fn scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>>;

    /// Append the data of a configuration table to its script
    fn add_config(&mut self, script: &mut Script) -> Result<()>;

    fn insert_change_sync(&mut self, change_type: ChangeType, status: Status, log: &str) -> Result<()>;

    fn update_change_sync(
        &mut self,
        change_type: ChangeType,
        status: Status,
        log: &str,
        change_count: Option<u64>,
    ) -> Result<()>;

    fn insert_dependency_list(&mut self, dependencies: &[ScriptDependency]) -> Result<()>;
}

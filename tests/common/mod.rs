//! Common test utilities for dlsync tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use dlsync::error::{DlSyncError, Result};
use dlsync::model::{ChangeType, Script, ScriptDependency, ScriptKey, ScriptObjectType, Status};
use dlsync::repo::ChangeRepository;
use dlsync::source::ScriptSource;

pub const TEST_DB: &str = "TEST_DB";
pub const TEST_SCHEMA: &str = "TEST_SCHEMA";

pub fn schema_script(object_type: ScriptObjectType, name: &str, content: &str) -> Script {
    Script::schema(None, TEST_DB, TEST_SCHEMA, name, object_type, content)
}

pub fn view(name: &str, content: &str) -> Script {
    schema_script(ScriptObjectType::Views, name, content)
}

/// One version of a migration-type object in the test schema
pub fn migration(
    object_type: ScriptObjectType,
    name: &str,
    version: u64,
    content: &str,
    rollback: Option<&str>,
) -> Script {
    let parent = schema_script(object_type, name, "");
    Script::migration(
        Arc::new(parent),
        content,
        version,
        Some("tester".to_string()),
        rollback.map(str::to_string),
        Some(format!("select count(*) from {}", name)),
    )
}

/// Scripts held in memory; exported scripts are collected
#[derive(Default)]
pub struct MemorySource {
    pub scripts: Vec<Script>,
    pub written: RefCell<Vec<Script>>,
}

impl MemorySource {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            written: RefCell::new(Vec::new()),
        }
    }
}

impl ScriptSource for MemorySource {
    fn get_all_scripts(&self) -> Result<Vec<Script>> {
        Ok(self.scripts.clone())
    }

    fn create_script_files(&self, scripts: &[Script]) -> Result<()> {
        self.written.borrow_mut().extend_from_slice(scripts);
        Ok(())
    }
}

/// A recorded change-sync event
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub change_type: ChangeType,
    pub status: Status,
    pub log: String,
    pub change_count: Option<u64>,
}

/// Repository double recording every call; ids in `fail_on` fail to
/// execute and fail verification.
#[derive(Default)]
pub struct MemoryRepo {
    pub deployed: BTreeMap<ScriptKey, Script>,
    pub executed: Vec<(String, String, bool)>,
    pub rolled_back: Vec<(String, Option<String>)>,
    pub fail_on: HashSet<String>,
    pub syncs: Vec<SyncEvent>,
    pub lineage: Vec<ScriptDependency>,
    pub database: String,
    pub db_scripts: BTreeMap<String, Vec<Script>>,
    pub config_added: Vec<String>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self {
            database: TEST_DB.to_string(),
            ..Self::default()
        }
    }

    pub fn with_deployed(mut self, scripts: &[Script]) -> Self {
        for script in scripts {
            self.deployed.insert(script.key(), script.clone());
        }
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.fail_on.insert(id.to_string());
        self
    }

    /// The deployed script with `id`, whatever its type
    pub fn deployed_by_id(&self, id: &str) -> Option<&Script> {
        self.deployed.values().find(|s| s.id() == id)
    }

    pub fn executed_ids(&self) -> Vec<String> {
        self.executed.iter().map(|(id, _, _)| id.clone()).collect()
    }

    pub fn last_sync(&self) -> Option<&SyncEvent> {
        self.syncs.last()
    }
}

impl ChangeRepository for MemoryRepo {
    fn load_script_hash(&mut self) -> Result<HashSet<ScriptKey>> {
        Ok(self.deployed.keys().cloned().collect())
    }

    fn is_script_changed(&self, script: &Script) -> bool {
        self.deployed
            .get(&script.key())
            .map_or(true, |deployed| deployed.hash() != script.hash())
    }

    fn is_script_version_deployed(&self, script: &Script) -> bool {
        script.version().is_some() && self.deployed.contains_key(&script.key())
    }

    fn deployed_migration_scripts(&self, keys: &HashSet<ScriptKey>) -> Result<Vec<Script>> {
        Ok(self
            .deployed
            .values()
            .filter(|s| s.version().is_some() && keys.contains(&s.key()))
            .cloned()
            .collect())
    }

    fn create_script_object(&mut self, script: &Script, only_hashes: bool) -> Result<()> {
        let id = script.id();
        if self.fail_on.contains(&id) {
            return Err(DlSyncError::execution(id, "object already exists"));
        }
        self.executed
            .push((id.clone(), script.content().to_string(), only_hashes));
        self.deployed.insert(script.key(), script.clone());
        Ok(())
    }

    fn execute_rollback(&mut self, script: &Script) -> Result<()> {
        let id = script.id();
        self.rolled_back
            .push((id.clone(), script.rollback().map(str::to_string)));
        self.deployed.remove(&script.key());
        Ok(())
    }

    fn execute_verify(&mut self, script: &Script) -> Result<bool> {
        Ok(self
            .deployed
            .get(&script.key())
            .is_some_and(|d| d.hash() == script.hash()))
    }

    fn verify_script(&mut self, script: &Script) -> Result<bool> {
        Ok(!self.fail_on.contains(&script.id()))
    }

    fn database_name(&self) -> Result<String> {
        Ok(self.database.clone())
    }

    fn schemas_in_database(&self, _database: &str) -> Result<Vec<String>> {
        Ok(self.db_scripts.keys().cloned().collect())
    }

    fn state_scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>> {
        Ok(self
            .db_scripts
            .get(schema)
            .map(|scripts| scripts.iter().filter(|s| !s.is_migration()).cloned().collect())
            .unwrap_or_default())
    }

    fn scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>> {
        Ok(self.db_scripts.get(schema).cloned().unwrap_or_default())
    }

    fn add_config(&mut self, script: &mut Script) -> Result<()> {
        let full_name = script.full_object_name();
        let content = format!("{}\ninsert into {} values (1);", script.content(), full_name);
        script.set_content(&content);
        self.config_added.push(full_name);
        Ok(())
    }

    fn insert_change_sync(&mut self, change_type: ChangeType, status: Status, log: &str) -> Result<()> {
        self.syncs.push(SyncEvent {
            change_type,
            status,
            log: log.to_string(),
            change_count: None,
        });
        Ok(())
    }

    fn update_change_sync(
        &mut self,
        change_type: ChangeType,
        status: Status,
        log: &str,
        change_count: Option<u64>,
    ) -> Result<()> {
        self.syncs.push(SyncEvent {
            change_type,
            status,
            log: log.to_string(),
            change_count,
        });
        Ok(())
    }

    fn insert_dependency_list(&mut self, dependencies: &[ScriptDependency]) -> Result<()> {
        self.lineage = dependencies.to_vec();
        Ok(())
    }
}

/// Script root in a temporary directory
pub struct ScriptTree {
    /// Kept to prevent temp directory cleanup until ScriptTree is dropped
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl ScriptTree {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn main_dir(&self) -> PathBuf {
        self.root.join("main")
    }

    /// Write `<root>/main/<relative>`
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.main_dir().join(relative);
        write_file(&path, content);
        path
    }

    /// Write a file directly under the root (config, parameters)
    pub fn write_root(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        write_file(&path, content);
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root.join(relative)).expect("Failed to read file")
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directory");
    }
    std::fs::write(path, content).expect("Failed to write file");
}

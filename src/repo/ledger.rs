//! File-backed change repository
//!
//! The ledger is a JSON document recording deployed script versions,
//! change-sync events and lineage. SQL that would be executed against the
//! database is appended to a plan file instead, which makes every run
//! reviewable and repeatable without a live connection.
//!
//! Script records are keyed by object type and id, so objects of different
//! types sharing a name are tracked separately. Each deployed or rolled back
//! script is appended to a journal next to the ledger; the journal is folded
//! into the ledger document whenever a change sync or lineage is recorded.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ChangeRepository;
use crate::error::{DlSyncError, Result};
use crate::model::{ChangeType, Script, ScriptDependency, ScriptKey, ScriptObjectType, Status};
use crate::parser::remove_sql_comments;
use crate::util::{content_hash, starts_with_ci};

/// Statements that change table data rather than structure
const DATA_STATEMENTS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE", "TRUNCATE"];

/// One deployed script (a declarative object or a single migration version)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub id: String,
    pub object_name: String,
    pub object_type: ScriptObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    pub hash: String,
    pub content: String,
    #[serde(default)]
    pub change_sync_id: Option<Uuid>,
    pub updated_ts: DateTime<Utc>,
}

impl ScriptRecord {
    pub fn key(&self) -> ScriptKey {
        ScriptKey {
            object_type: self.object_type,
            id: self.id.clone(),
        }
    }
}

/// Ledger map key for a script: `<TYPE DIRECTORY>:<id>`
pub fn record_key(key: &ScriptKey) -> String {
    format!("{}:{}", key.object_type.directory_name(), key.id)
}

/// Full object name and type of a deployed object
type ObjectKey = (String, ScriptObjectType);

/// One run of a change operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSyncRecord {
    pub id: Uuid,
    pub change_type: ChangeType,
    pub status: Status,
    pub log: String,
    #[serde(default)]
    pub change_count: Option<u64>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Serialized ledger document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ledger {
    /// Deployed scripts by [`record_key`]
    pub scripts: BTreeMap<String, ScriptRecord>,
    pub change_syncs: Vec<ChangeSyncRecord>,
    pub dependencies: Vec<ScriptDependency>,
}

/// A script record change not yet folded into the ledger document
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Upsert { record: ScriptRecord },
    Remove { key: String },
}

impl JournalEntry {
    fn apply(self, ledger: &mut Ledger) {
        match self {
            JournalEntry::Upsert { record } => {
                ledger.scripts.insert(record_key(&record.key()), record);
            }
            JournalEntry::Remove { key } => {
                ledger.scripts.remove(&key);
            }
        }
    }
}

/// [`ChangeRepository`] backed by a JSON ledger and an SQL plan file
#[derive(Debug)]
pub struct LedgerRepository {
    ledger_path: PathBuf,
    journal_path: PathBuf,
    plan_path: Option<PathBuf>,
    database: Option<String>,
    ledger: Ledger,
    current_sync: Option<Uuid>,
}

fn is_data_change(content: &str) -> bool {
    let body = remove_sql_comments(content);
    let body = body.trim_start();
    DATA_STATEMENTS.iter().any(|s| starts_with_ci(body, s))
}

/// Split `DB.SCHEMA.NAME` into its parts
fn split_full_name(full_name: &str) -> Option<(&str, &str, &str)> {
    let mut parts = full_name.splitn(3, '.');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

impl LedgerRepository {
    /// Open the ledger at `ledger_path`, starting empty if it does not exist
    pub fn open(
        ledger_path: impl Into<PathBuf>,
        plan_path: Option<PathBuf>,
        database: Option<String>,
    ) -> Result<Self> {
        let ledger_path = ledger_path.into();
        let mut ledger: Ledger = if ledger_path.exists() {
            let content =
                std::fs::read_to_string(&ledger_path).map_err(|e| DlSyncError::LedgerIoError {
                    path: ledger_path.clone(),
                    source: e,
                })?;
            serde_json::from_str(&content).map_err(|e| DlSyncError::LedgerFormatError {
                path: ledger_path.clone(),
                source: e,
            })?
        } else {
            debug!("Starting new ledger at {}", ledger_path.display());
            Ledger::default()
        };
        // Records written by older versions were keyed by id alone
        ledger.scripts = std::mem::take(&mut ledger.scripts)
            .into_values()
            .map(|record| (record_key(&record.key()), record))
            .collect();

        let journal_path = ledger_path.with_extension("journal");
        if journal_path.exists() {
            let replayed = replay_journal(&mut ledger, &journal_path)?;
            debug!("Replayed {} journal entries from {}", replayed, journal_path.display());
        }

        Ok(Self {
            ledger_path,
            journal_path,
            plan_path,
            database: database.map(|d| d.to_uppercase()),
            ledger,
            current_sync: None,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    fn create_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DlSyncError::LedgerIoError {
                path: self.ledger_path.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Apply `entry` and make it durable without rewriting the ledger
    fn journal(&mut self, entry: JournalEntry) -> Result<()> {
        let io_error = |e| DlSyncError::LedgerIoError {
            path: self.journal_path.clone(),
            source: e,
        };
        let line = serde_json::to_string(&entry).map_err(|e| DlSyncError::LedgerFormatError {
            path: self.journal_path.clone(),
            source: e,
        })?;
        self.create_parent_dir()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .map_err(io_error)?;
        writeln!(file, "{}", line).map_err(io_error)?;
        entry.apply(&mut self.ledger);
        Ok(())
    }

    /// Write the whole ledger through a temporary file and drop the journal
    fn save(&self) -> Result<()> {
        let io_error = |e| DlSyncError::LedgerIoError {
            path: self.ledger_path.clone(),
            source: e,
        };
        self.create_parent_dir()?;
        let json = serde_json::to_string_pretty(&self.ledger).map_err(|e| {
            DlSyncError::LedgerFormatError {
                path: self.ledger_path.clone(),
                source: e,
            }
        })?;
        let staging = self.ledger_path.with_extension("json.tmp");
        std::fs::write(&staging, json).map_err(io_error)?;
        std::fs::rename(&staging, &self.ledger_path).map_err(io_error)?;
        match std::fs::remove_file(&self.journal_path) {
            Err(e) if e.kind() != IoErrorKind::NotFound => Err(DlSyncError::LedgerIoError {
                path: self.journal_path.clone(),
                source: e,
            }),
            _ => Ok(()),
        }
    }

    /// Append `sql` to the plan file on behalf of `object`
    fn execute(&self, action: &str, object: &str, sql: &str) -> Result<()> {
        let Some(plan_path) = &self.plan_path else {
            debug!("{} {}: no plan file configured", action, object);
            return Ok(());
        };
        if let Some(parent) = plan_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DlSyncError::execution(object, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(plan_path)
            .map_err(|e| DlSyncError::execution(object, e))?;
        writeln!(file, "-- {} {} {}\n{}\n", Utc::now().to_rfc3339(), action, object, sql.trim())
            .map_err(|e| DlSyncError::execution(object, e))
    }

    fn record_for(&self, script: &Script) -> Option<&ScriptRecord> {
        self.ledger.scripts.get(&record_key(&script.key()))
    }

    /// Deployed records of objects in `schema`, grouped by full object name
    /// and type
    fn objects_in_schema(&self, schema: &str) -> Result<BTreeMap<ObjectKey, Vec<&ScriptRecord>>> {
        let prefix = format!("{}.{}.", self.database_name()?, schema.to_uppercase());
        let mut objects: BTreeMap<ObjectKey, Vec<&ScriptRecord>> = BTreeMap::new();
        for record in self.ledger.scripts.values() {
            if record.object_name.starts_with(&prefix) {
                objects
                    .entry((record.object_name.clone(), record.object_type))
                    .or_default()
                    .push(record);
            }
        }
        for records in objects.values_mut() {
            records.sort_by_key(|r| r.version);
        }
        Ok(objects)
    }

    fn schema_script(full_name: &str, object_type: ScriptObjectType, content: &str) -> Option<Script> {
        let (database, schema, name) = split_full_name(full_name)?;
        Some(Script::schema(None, database, schema, name, object_type, content))
    }
}

fn replay_journal(ledger: &mut Ledger, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| DlSyncError::LedgerIoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut replayed = 0;
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let entry: JournalEntry =
            serde_json::from_str(line).map_err(|e| DlSyncError::LedgerFormatError {
                path: path.to_path_buf(),
                source: e,
            })?;
        entry.apply(ledger);
        replayed += 1;
    }
    Ok(replayed)
}

impl ChangeRepository for LedgerRepository {
    fn load_script_hash(&mut self) -> Result<HashSet<ScriptKey>> {
        info!("Loaded {} deployed script hashes", self.ledger.scripts.len());
        Ok(self.ledger.scripts.values().map(ScriptRecord::key).collect())
    }

    fn is_script_changed(&self, script: &Script) -> bool {
        self.record_for(script)
            .map_or(true, |record| record.hash != script.hash())
    }

    fn is_script_version_deployed(&self, script: &Script) -> bool {
        script.version().is_some() && self.record_for(script).is_some()
    }

    fn deployed_migration_scripts(&self, keys: &HashSet<ScriptKey>) -> Result<Vec<Script>> {
        let keys: BTreeSet<&ScriptKey> = keys.iter().collect();
        let mut scripts = Vec::new();
        for key in keys {
            let Some(record) = self.ledger.scripts.get(&record_key(key)) else {
                continue;
            };
            let Some(version) = record.version else {
                continue;
            };
            let script = Script::migration_from_full_name(
                &record.object_name,
                record.object_type,
                &record.content,
                version,
                record.author.clone(),
                record.rollback.clone(),
                record.verify.clone(),
            )?
            .with_hash(record.hash.clone());
            scripts.push(script);
        }
        Ok(scripts)
    }

    fn create_script_object(&mut self, script: &Script, only_hashes: bool) -> Result<()> {
        let id = script.id();
        if !only_hashes {
            self.execute("DEPLOY", &id, script.content())?;
        }
        let record = ScriptRecord {
            id: id.clone(),
            object_name: script.full_object_name(),
            object_type: script.object_type(),
            version: script.version(),
            author: script.author().map(str::to_string),
            rollback: script.rollback().map(str::to_string),
            verify: script.verify().map(str::to_string),
            hash: script.hash().to_string(),
            content: script.content().to_string(),
            change_sync_id: self.current_sync,
            updated_ts: Utc::now(),
        };
        self.journal(JournalEntry::Upsert { record })
    }

    fn execute_rollback(&mut self, script: &Script) -> Result<()> {
        let id = script.id();
        match script.rollback().filter(|r| !r.trim().is_empty()) {
            Some(rollback) => self.execute("ROLLBACK", &id, rollback)?,
            None => warn!("No rollback script found for {}", id),
        }
        self.journal(JournalEntry::Remove {
            key: record_key(&script.key()),
        })
    }

    fn execute_verify(&mut self, script: &Script) -> Result<bool> {
        let id = script.id();
        if let Some(verify) = script.verify().filter(|v| !v.trim().is_empty()) {
            self.execute("VERIFY", &id, verify)?;
        }
        Ok(self
            .record_for(script)
            .is_some_and(|record| record.hash == script.hash()))
    }

    fn verify_script(&mut self, script: &Script) -> Result<bool> {
        Ok(self
            .record_for(script)
            .is_some_and(|record| record.hash == content_hash(script.content())))
    }

    fn database_name(&self) -> Result<String> {
        self.database
            .clone()
            .ok_or_else(|| DlSyncError::configuration("connection property 'db' is required"))
    }

    fn schemas_in_database(&self, database: &str) -> Result<Vec<String>> {
        let database = database.to_uppercase();
        let schemas: BTreeSet<String> = self
            .ledger
            .scripts
            .values()
            .filter_map(|r| split_full_name(&r.object_name))
            .filter(|(db, _, _)| *db == database)
            .map(|(_, schema, _)| schema.to_string())
            .collect();
        Ok(schemas.into_iter().collect())
    }

    fn state_scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>> {
        Ok(self
            .objects_in_schema(schema)?
            .into_iter()
            .filter_map(|((name, object_type), records)| {
                let record = records.last()?;
                if object_type.is_migration() {
                    return None;
                }
                Self::schema_script(&name, object_type, &record.content)
            })
            .collect())
    }

    fn scripts_in_schema(&self, schema: &str) -> Result<Vec<Script>> {
        let mut scripts = Vec::new();
        for ((name, object_type), records) in self.objects_in_schema(schema)? {
            let Some(latest) = records.last() else {
                continue;
            };
            let content = if object_type.is_migration() {
                records
                    .iter()
                    .filter(|r| !is_data_change(&r.content))
                    .map(|r| r.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                latest.content.clone()
            };
            if let Some(script) = Self::schema_script(&name, object_type, &content) {
                scripts.push(script);
            }
        }
        Ok(scripts)
    }

    fn add_config(&mut self, script: &mut Script) -> Result<()> {
        let full_name = script.full_object_name();
        let object_type = script.object_type();
        let mut data: Vec<&ScriptRecord> = self
            .ledger
            .scripts
            .values()
            .filter(|r| {
                r.object_name == full_name
                    && r.object_type == object_type
                    && is_data_change(&r.content)
            })
            .collect();
        if data.is_empty() {
            return Ok(());
        }
        data.sort_by_key(|r| r.version);
        debug!("Adding {} data versions to config table {}", data.len(), full_name);

        let mut content = script.content().to_string();
        for record in data {
            content.push('\n');
            content.push_str(&record.content);
        }
        script.set_content(&content);
        Ok(())
    }

    fn insert_change_sync(&mut self, change_type: ChangeType, status: Status, log: &str) -> Result<()> {
        let id = Uuid::new_v4();
        self.ledger.change_syncs.push(ChangeSyncRecord {
            id,
            change_type,
            status,
            log: log.to_string(),
            change_count: None,
            start_time: Utc::now(),
            end_time: None,
        });
        self.current_sync = Some(id);
        self.save()
    }

    fn update_change_sync(
        &mut self,
        change_type: ChangeType,
        status: Status,
        log: &str,
        change_count: Option<u64>,
    ) -> Result<()> {
        let now = Utc::now();
        let current = self.current_sync.and_then(|id| {
            self.ledger
                .change_syncs
                .iter_mut()
                .find(|sync| sync.id == id)
        });
        match current {
            Some(sync) => {
                sync.status = status;
                sync.log = log.to_string();
                sync.change_count = change_count;
                sync.end_time = Some(now);
            }
            None => self.ledger.change_syncs.push(ChangeSyncRecord {
                id: Uuid::new_v4(),
                change_type,
                status,
                log: log.to_string(),
                change_count,
                start_time: now,
                end_time: Some(now),
            }),
        }
        self.save()
    }

    fn insert_dependency_list(&mut self, dependencies: &[ScriptDependency]) -> Result<()> {
        info!("Recording {} lineage edges", dependencies.len());
        self.ledger.dependencies = dependencies.to_vec();
        self.save()
    }
}

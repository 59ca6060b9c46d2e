//! Script model: account-level, schema-level and migration scripts

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::object_type::{ObjectLevel, ScriptObjectType};
use crate::error::{DlSyncError, Result};
use crate::parser::Migration;
use crate::util::content_hash;

/// Identity of a script inside graphs and sets: object type plus id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptKey {
    pub object_type: ScriptObjectType,
    pub id: String,
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Version information carried by a migration script
#[derive(Debug, Clone)]
pub struct MigrationDetails {
    /// The account or schema script this version belongs to
    pub parent: Arc<Script>,
    pub version: u64,
    pub author: Option<String>,
    pub rollback: Option<String>,
    pub verify: Option<String>,
}

/// Variant-specific part of a script
#[derive(Debug, Clone)]
pub enum ScriptKind {
    /// Object living directly in the account (roles, warehouses, ...)
    Account,
    /// Object inside a database schema
    Schema {
        database_name: String,
        schema_name: String,
    },
    /// One version of a migration-type object
    Migration(MigrationDetails),
}

/// A named database object definition
#[derive(Debug, Clone)]
pub struct Script {
    script_path: Option<PathBuf>,
    object_name: String,
    object_type: ScriptObjectType,
    content: String,
    hash: String,
    migrations: Option<Vec<Script>>,
    kind: ScriptKind,
}

impl Script {
    fn new(
        script_path: Option<PathBuf>,
        object_name: &str,
        object_type: ScriptObjectType,
        content: &str,
        kind: ScriptKind,
    ) -> Self {
        let content = content.trim().to_string();
        let hash = content_hash(&content);
        Self {
            script_path,
            object_name: object_name.to_uppercase(),
            object_type,
            content,
            hash,
            migrations: None,
            kind,
        }
    }

    /// Create an account-level script
    pub fn account(
        script_path: Option<PathBuf>,
        object_name: &str,
        object_type: ScriptObjectType,
        content: &str,
    ) -> Self {
        Self::new(script_path, object_name, object_type, content, ScriptKind::Account)
    }

    /// Create a schema-level script
    pub fn schema(
        script_path: Option<PathBuf>,
        database_name: &str,
        schema_name: &str,
        object_name: &str,
        object_type: ScriptObjectType,
        content: &str,
    ) -> Self {
        let kind = ScriptKind::Schema {
            database_name: database_name.to_uppercase(),
            schema_name: schema_name.to_uppercase(),
        };
        Self::new(script_path, object_name, object_type, content, kind)
    }

    /// Create one version of `parent`
    pub fn migration(
        parent: Arc<Script>,
        content: &str,
        version: u64,
        author: Option<String>,
        rollback: Option<String>,
        verify: Option<String>,
    ) -> Self {
        let script_path = parent.script_path.clone();
        let object_name = parent.object_name.clone();
        let object_type = parent.object_type;
        let kind = ScriptKind::Migration(MigrationDetails {
            parent,
            version,
            author,
            rollback,
            verify,
        });
        Self::new(script_path, &object_name, object_type, content, kind)
    }

    /// Rebuild a migration from its fully qualified object name, as stored
    /// by a change repository.
    pub fn migration_from_full_name(
        full_object_name: &str,
        object_type: ScriptObjectType,
        content: &str,
        version: u64,
        author: Option<String>,
        rollback: Option<String>,
        verify: Option<String>,
    ) -> Result<Self> {
        let parent = match object_type.level() {
            ObjectLevel::Account => Script::account(None, full_object_name, object_type, content),
            ObjectLevel::Schema => {
                let parts: Vec<&str> = full_object_name.split('.').collect();
                if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
                    return Err(DlSyncError::InvalidObjectName {
                        name: full_object_name.to_string(),
                    });
                }
                Script::schema(None, parts[0], parts[1], parts[2], object_type, content)
            }
        };
        Ok(Script::migration(
            Arc::new(parent),
            content,
            version,
            author,
            rollback,
            verify,
        ))
    }

    /// Attach parsed migration blocks to this script.
    ///
    /// Fails when the object type is not versioned or when two blocks share
    /// the same version number.
    pub fn with_migrations(mut self, migrations: &[Migration]) -> Result<Self> {
        if !self.is_migration() {
            return Err(DlSyncError::NotMigrationScript { id: self.id() });
        }
        let parent = Arc::new(self.clone());
        let mut seen = HashSet::with_capacity(migrations.len());
        let mut scripts = Vec::with_capacity(migrations.len());
        for migration in migrations {
            if !seen.insert(migration.version) {
                return Err(DlSyncError::DuplicateMigrationVersion {
                    object: self.full_object_name(),
                    version: migration.version,
                });
            }
            scripts.push(Script::migration(
                Arc::clone(&parent),
                &migration.content,
                migration.version,
                migration.author.clone(),
                migration.rollback.clone(),
                migration.verify.clone(),
            ));
        }
        self.migrations = Some(scripts);
        Ok(self)
    }

    /// Override the content hash, e.g. with a hash loaded from history
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn id(&self) -> String {
        match &self.kind {
            ScriptKind::Account | ScriptKind::Schema { .. } => self.full_object_name(),
            ScriptKind::Migration(m) => format!("{}:{}", m.parent.full_object_name(), m.version),
        }
    }

    pub fn full_object_name(&self) -> String {
        match &self.kind {
            ScriptKind::Account => self.object_name.clone(),
            ScriptKind::Schema {
                database_name,
                schema_name,
            } => format!("{}.{}.{}", database_name, schema_name, self.object_name),
            ScriptKind::Migration(m) => m.parent.full_object_name(),
        }
    }

    /// Qualify a possibly partial dotted name the way the database would
    /// resolve it from inside this script.
    pub fn resolve_object_reference(&self, partial_name: &str) -> Result<String> {
        match &self.kind {
            ScriptKind::Account => Ok(partial_name.to_uppercase()),
            ScriptKind::Schema {
                database_name,
                schema_name,
            } => {
                let parts: Vec<&str> = partial_name.split('.').collect();
                let qualified = match parts.as_slice() {
                    [name] => format!("{}.{}.{}", database_name, schema_name, name),
                    [schema, name] => format!("{}.{}.{}", database_name, schema, name),
                    [database, schema, name] => format!("{}.{}.{}", database, schema, name),
                    _ => {
                        return Err(DlSyncError::UnresolvableReference {
                            reference: partial_name.to_string(),
                            script: self.id(),
                        })
                    }
                };
                Ok(qualified.to_uppercase())
            }
            ScriptKind::Migration(m) => m.parent.resolve_object_reference(partial_name),
        }
    }

    pub fn key(&self) -> ScriptKey {
        ScriptKey {
            object_type: self.object_type,
            id: self.id(),
        }
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn object_type(&self) -> ScriptObjectType {
        self.object_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the content; the hash keeps describing the authored text.
    pub fn set_content(&mut self, content: &str) {
        self.content = content.trim().to_string();
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether the object type is versioned
    pub fn is_migration(&self) -> bool {
        self.object_type.is_migration()
    }

    pub fn as_migration(&self) -> Option<&MigrationDetails> {
        match &self.kind {
            ScriptKind::Migration(m) => Some(m),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<u64> {
        self.as_migration().map(|m| m.version)
    }

    pub fn author(&self) -> Option<&str> {
        self.as_migration().and_then(|m| m.author.as_deref())
    }

    pub fn rollback(&self) -> Option<&str> {
        self.as_migration().and_then(|m| m.rollback.as_deref())
    }

    pub fn verify(&self) -> Option<&str> {
        self.as_migration().and_then(|m| m.verify.as_deref())
    }

    pub fn set_rollback(&mut self, rollback: Option<String>) {
        if let ScriptKind::Migration(m) = &mut self.kind {
            m.rollback = rollback;
        }
    }

    pub fn set_verify(&mut self, verify: Option<String>) {
        if let ScriptKind::Migration(m) = &mut self.kind {
            m.verify = verify;
        }
    }

    pub fn database_name(&self) -> Option<&str> {
        match &self.kind {
            ScriptKind::Account => None,
            ScriptKind::Schema { database_name, .. } => Some(database_name),
            ScriptKind::Migration(m) => m.parent.database_name(),
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        match &self.kind {
            ScriptKind::Account => None,
            ScriptKind::Schema { schema_name, .. } => Some(schema_name),
            ScriptKind::Migration(m) => m.parent.schema_name(),
        }
    }

    /// Parsed versions of a migration-type script
    pub fn migrations(&self) -> Result<&[Script]> {
        if !self.is_migration() {
            return Err(DlSyncError::NotMigrationScript { id: self.id() });
        }
        Ok(self.migrations.as_deref().unwrap_or(&[]))
    }

    /// Expand a migration-type script into its individual versions;
    /// declarative scripts and single versions come back unchanged.
    pub fn into_deployable(self) -> Vec<Script> {
        match self.migrations {
            Some(migrations) if self.object_type.is_migration() => migrations,
            _ => vec![self],
        }
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.object_type == other.object_type && self.id() == other.id()
    }
}

impl Eq for Script {}

impl Hash for Script {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

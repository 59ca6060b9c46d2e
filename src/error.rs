//! Error types for dlsync

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DlSyncError>;

/// Broad classification of a [`DlSyncError`], used by callers to choose
/// between aborting and continuing, and by the CLI to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authoring mistakes in scripts or names; never retried
    Validation,
    /// The dependency graph cannot be linearized
    CyclicDependency,
    /// Failure reported by the execution/persistence layer
    Execution,
    /// Malformed configuration or connection properties
    Configuration,
    /// Reading or writing files
    Io,
}

/// A node left unsorted by the topological sort, with the dependencies
/// it was still waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsortedNode {
    pub id: String,
    pub dependencies: Vec<String>,
}

impl fmt::Display for UnsortedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [{}]", self.id, self.dependencies.join(", "))
    }
}

fn format_unsorted(nodes: &[UnsortedNode]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while parsing, scheduling or deploying scripts
#[derive(Error, Debug)]
pub enum DlSyncError {
    #[error("Duplicate version {version} for script {object} found. Duplicate version number is not allowed in the same script file.")]
    DuplicateMigrationVersion { object: String, version: u64 },

    #[error("Migration type script changed. Script for the object {id} has changed from previous deployments.")]
    ModifiedMigration { id: String },

    #[error("Unknown script type of directory: {0}")]
    UnknownObjectTypeDirectory(String),

    #[error("Unknown object type found in DDL: {0}")]
    UnknownDdlObjectType(String),

    #[error("Unable to resolve object reference {reference} from script {script}")]
    UnresolvableReference { reference: String, script: String },

    #[error("Invalid fully qualified object name: {name}")]
    InvalidObjectName { name: String },

    #[error("Invalid migration header in line: {line}")]
    InvalidMigrationHeader { line: String },

    #[error("Migrations are only available for migration type script: {id}")]
    NotMigrationScript { id: String },

    #[error("Script path does not follow the script root layout: {path}")]
    InvalidScriptPath { path: PathBuf },

    #[error("Cyclic dependency detected, {} scripts could not be sorted: {}", .unsorted.len(), format_unsorted(.unsorted))]
    CyclicDependency { unsorted: Vec<UnsortedNode> },

    #[error("Failed to execute script {object}")]
    Execution {
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{} scripts failed to deploy: {}", .failed.len(), .failed.join(", "))]
    DeployFailures { failed: Vec<String> },

    #[error("{failed} scripts failed to verify.")]
    VerificationFailed { failed: usize },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to read script file: {path}")]
    ScriptReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write script file: {path}")]
    ScriptWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path for script provided: {path}")]
    ScriptRootNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {path}")]
    ConfigReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file: {path}")]
    ConfigParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Ledger I/O error: {path}")]
    LedgerIoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger is corrupted: {path}")]
    LedgerFormatError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DlSyncError {
    /// Wrap an arbitrary execution failure for `object`
    pub fn execution(
        object: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DlSyncError::Execution {
            object: object.into(),
            source: source.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        DlSyncError::Configuration {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DlSyncError::DuplicateMigrationVersion { .. }
            | DlSyncError::ModifiedMigration { .. }
            | DlSyncError::UnknownObjectTypeDirectory(_)
            | DlSyncError::UnknownDdlObjectType(_)
            | DlSyncError::UnresolvableReference { .. }
            | DlSyncError::InvalidObjectName { .. }
            | DlSyncError::InvalidMigrationHeader { .. }
            | DlSyncError::NotMigrationScript { .. }
            | DlSyncError::InvalidScriptPath { .. } => ErrorKind::Validation,
            DlSyncError::CyclicDependency { .. } => ErrorKind::CyclicDependency,
            DlSyncError::Execution { .. }
            | DlSyncError::DeployFailures { .. }
            | DlSyncError::VerificationFailed { .. } => ErrorKind::Execution,
            DlSyncError::Configuration { .. } | DlSyncError::ConfigParseError { .. } => {
                ErrorKind::Configuration
            }
            DlSyncError::ScriptReadError { .. }
            | DlSyncError::ScriptWriteError { .. }
            | DlSyncError::ScriptRootNotFound { .. }
            | DlSyncError::ConfigReadError { .. }
            | DlSyncError::LedgerIoError { .. }
            | DlSyncError::LedgerFormatError { .. } => ErrorKind::Io,
        }
    }
}

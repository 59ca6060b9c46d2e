//! dlsync: dependency-aware deployment of database object scripts
//!
//! Scripts are authored once per object under a script root. dlsync infers
//! the order they must run in from the references inside the SQL, skips
//! objects that did not change, and keeps per-object migration history.

pub mod config;
pub mod dependency;
pub mod error;
pub mod manager;
pub mod model;
pub mod parser;
pub mod repo;
pub mod source;
pub mod util;

use std::path::PathBuf;

use tracing::info;

pub use error::{DlSyncError, ErrorKind, Result};
pub use manager::ChangeManager;

use config::{load_parameters, profile_from_lookup, Config, ConnectionProperties};
use parser::ParameterInjector;
use repo::LedgerRepository;
use source::FileScriptSource;

/// Directory under the script root holding the default ledger and plan
pub const STATE_DIR: &str = ".dlsync";

/// Change operation to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Deploy { only_hashes: bool },
    Rollback,
    Verify,
    CreateScript { schemas: Option<Vec<String>> },
    CreateLineage,
}

/// Options for a single dlsync run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root of the script tree (`main/` is used when present)
    pub script_root: PathBuf,
    /// Parameter profile; read from the environment when not set
    pub profile: Option<String>,
    /// Ledger file (defaults to `<script_root>/.dlsync/ledger.json`)
    pub ledger_path: Option<PathBuf>,
    /// Plan file SQL is written to (defaults to `<script_root>/.dlsync/plan.sql`)
    pub plan_path: Option<PathBuf>,
    pub operation: Operation,
}

/// Run an operation with connection properties and parameters taken from
/// the process environment.
pub fn run(options: RunOptions) -> Result<usize> {
    run_with_lookup(options, |key| std::env::var(key).ok())
}

/// Run an operation resolving environment values through `lookup`
pub fn run_with_lookup<F>(options: RunOptions, lookup: F) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let script_root = options.script_root;
    let config = Config::load(&script_root)?;
    let profile = options
        .profile
        .map(|p| p.to_lowercase())
        .unwrap_or_else(|| profile_from_lookup(&lookup));
    info!("Using profile {}", profile);

    let connection = ConnectionProperties::from_lookup(&lookup)?;
    let parameters = load_parameters(&script_root, &profile, &lookup)?;

    let state_dir = script_root.join(STATE_DIR);
    let ledger_path = options
        .ledger_path
        .unwrap_or_else(|| state_dir.join("ledger.json"));
    let plan_path = options
        .plan_path
        .unwrap_or_else(|| state_dir.join("plan.sql"));

    let source = FileScriptSource::new(&script_root);
    let repo = LedgerRepository::open(ledger_path, Some(plan_path), connection.db.clone())?;
    let mut manager = ChangeManager::new(config, source, repo, ParameterInjector::new(parameters));

    match options.operation {
        Operation::Deploy { only_hashes } => manager.deploy(only_hashes),
        Operation::Rollback => manager.rollback(),
        Operation::Verify => manager.verify(),
        Operation::CreateScript { schemas } => manager.create_all_scripts_from_db(schemas),
        Operation::CreateLineage => manager.create_lineage(),
    }
}

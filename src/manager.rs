//! Change orchestration: deploy, rollback, verify, export and lineage

use std::collections::{BTreeMap, HashSet};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::dependency::DependencyGraph;
use crate::error::{DlSyncError, ErrorKind, Result};
use crate::model::{ChangeType, Script, ScriptKey, Status};
use crate::parser::ParameterInjector;
use crate::repo::ChangeRepository;
use crate::source::ScriptSource;

/// Drives every change operation from a script source into a repository.
///
/// Each operation is bracketed by an in-progress change-sync event and
/// exactly one terminal success or error event.
pub struct ChangeManager<S, R> {
    config: Config,
    source: S,
    repo: R,
    injector: ParameterInjector,
}

impl<S: ScriptSource, R: ChangeRepository> ChangeManager<S, R> {
    pub fn new(config: Config, source: S, repo: R, injector: ParameterInjector) -> Self {
        Self {
            config,
            source,
            repo,
            injector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    fn graph(&self) -> DependencyGraph {
        DependencyGraph::with_overrides(self.config.dependency_override.clone())
    }

    fn start_sync(&mut self, change_type: ChangeType) -> Result<()> {
        self.repo
            .insert_change_sync(change_type, Status::InProgress, &format!("{} started.", change_type))
    }

    fn end_sync_success(&mut self, change_type: ChangeType, count: usize) -> Result<()> {
        let log = format!("Successfully completed {} with {} changes.", change_type, count);
        info!("{}", log);
        self.repo
            .update_change_sync(change_type, Status::Success, &log, Some(count as u64))
    }

    fn end_sync_error(&mut self, change_type: ChangeType, message: &str) -> Result<()> {
        error!("{} failed: {}", change_type, message);
        self.repo
            .update_change_sync(change_type, Status::Error, message, None)
    }

    fn synced<F>(&mut self, change_type: ChangeType, operation: F) -> Result<usize>
    where
        F: FnOnce(&mut Self) -> Result<usize>,
    {
        self.start_sync(change_type)?;
        match operation(self) {
            Ok(count) => {
                self.end_sync_success(change_type, count)?;
                Ok(count)
            }
            Err(err) => {
                if let Err(sync_err) = self.end_sync_error(change_type, &err.to_string()) {
                    warn!("Unable to record {} failure: {}", change_type, sync_err);
                }
                Err(err)
            }
        }
    }

    /// A deployed migration version must never change
    fn validate_script(&self, script: &Script) -> Result<()> {
        if script.version().is_some() && self.repo.is_script_version_deployed(script) {
            error!("Migration type script changed. Script for the object {} has changed from previous deployments.", script.id());
            return Err(DlSyncError::ModifiedMigration { id: script.id() });
        }
        Ok(())
    }

    /// Deploy every changed, non-excluded script in dependency order.
    ///
    /// With `only_hashes` nothing is executed; hashes are recorded as if
    /// the scripts had been deployed. Returns the number of scheduled
    /// scripts.
    pub fn deploy(&mut self, only_hashes: bool) -> Result<usize> {
        self.synced(ChangeType::Deploy, |manager| manager.run_deploy(only_hashes))
    }

    fn run_deploy(&mut self, only_hashes: bool) -> Result<usize> {
        info!(
            "Started Deploying {}",
            if only_hashes { "only hashes" } else { "scripts" }
        );
        self.repo.load_script_hash()?;
        let scripts: Vec<Script> = self
            .source
            .get_all_scripts()?
            .into_iter()
            .filter(|script| !self.config.is_script_excluded(script))
            .filter(|script| self.repo.is_script_changed(script))
            .collect();

        let mut graph = self.graph();
        graph.add_nodes(scripts);
        let sorted = graph.topological_sort()?;

        let total = sorted.len();
        let mut failed = Vec::new();
        for (i, mut script) in sorted.into_iter().enumerate() {
            info!("{} of {}: Deploying object: {}", i + 1, total, script.id());
            self.injector.inject_parameters(&mut script);
            self.validate_script(&script)?;
            if let Err(err) = self.repo.create_script_object(&script, only_hashes) {
                if self.config.continue_on_failure && err.kind() == ErrorKind::Execution {
                    error!("Error deploying {}: {}", script.id(), err);
                    failed.push(script.id());
                } else {
                    return Err(err);
                }
            }
        }

        if !failed.is_empty() {
            return Err(DlSyncError::DeployFailures { failed });
        }
        Ok(total)
    }

    /// Roll back deployed migrations whose versions no longer exist in the
    /// source, dependents first.
    pub fn rollback(&mut self) -> Result<usize> {
        self.synced(ChangeType::Rollback, Self::run_rollback)
    }

    fn run_rollback(&mut self) -> Result<usize> {
        info!("Starting ROLLBACK scripts.");
        let deployed = self.repo.load_script_hash()?;
        let source_keys: HashSet<ScriptKey> = self
            .source
            .get_all_scripts()?
            .iter()
            .map(Script::key)
            .collect();
        let removed: HashSet<ScriptKey> = deployed.difference(&source_keys).cloned().collect();
        let migrations = self.repo.deployed_migration_scripts(&removed)?;

        let mut graph = self.graph();
        graph.add_nodes(migrations);
        let sorted = graph.topological_sort()?;

        let total = sorted.len();
        for (i, mut script) in sorted.into_iter().rev().enumerate() {
            info!("{} of {}: Rolling back object: {}", i + 1, total, script.id());
            self.injector.inject_parameters_all(&mut script);
            self.repo.execute_rollback(&script)?;
        }
        Ok(total)
    }

    /// Verify the latest version of every migration object and every
    /// declarative object found in the database.
    pub fn verify(&mut self) -> Result<usize> {
        self.synced(ChangeType::Verify, Self::run_verify)
    }

    fn run_verify(&mut self) -> Result<usize> {
        info!("Started verify scripts.");
        self.repo.load_script_hash()?;

        let mut latest: BTreeMap<String, Script> = BTreeMap::new();
        for script in self.source.get_all_scripts()? {
            if script.version().is_none() || self.config.is_script_excluded(&script) {
                continue;
            }
            let name = script.full_object_name();
            let newer = latest
                .get(&name)
                .map_or(true, |current| script.version() > current.version());
            if newer {
                latest.insert(name, script);
            }
        }

        let mut verified = 0;
        let mut failed = 0;
        for mut script in latest.into_values() {
            self.injector.inject_parameters_all(&mut script);
            verified += 1;
            match self.repo.execute_verify(&script) {
                Ok(true) => info!("Verified object: {}", script.id()),
                Ok(false) => {
                    error!("Script verification failed for {}", script.id());
                    failed += 1;
                }
                Err(err) => {
                    error!("Script verification failed for {}: {}", script.id(), err);
                    failed += 1;
                }
            }
        }

        let database = self.repo.database_name()?;
        for schema in self.repo.schemas_in_database(&database)? {
            for mut script in self.repo.state_scripts_in_schema(&schema)? {
                if self.config.is_script_excluded(&script) {
                    continue;
                }
                self.injector.parametrize_script(&mut script);
                verified += 1;
                match self.repo.verify_script(&script) {
                    Ok(true) => info!("Verified object: {}", script.id()),
                    Ok(false) => {
                        error!("Script verification failed for {}", script.id());
                        failed += 1;
                    }
                    Err(err) => {
                        error!("Script verification failed for {}: {}", script.id(), err);
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 {
            return Err(DlSyncError::VerificationFailed { failed });
        }
        Ok(verified)
    }

    /// Export objects of the given schemas (all schemas of the database
    /// when `None`) as script files.
    pub fn create_all_scripts_from_db(&mut self, schemas: Option<Vec<String>>) -> Result<usize> {
        self.synced(ChangeType::CreateScript, |manager| {
            manager.run_create_scripts(schemas)
        })
    }

    fn run_create_scripts(&mut self, schemas: Option<Vec<String>>) -> Result<usize> {
        let config_tables: HashSet<String> = self
            .injector
            .inject_into_names(&self.config.config_tables)
            .into_iter()
            .collect();
        let schemas = match schemas {
            Some(schemas) => schemas,
            None => {
                let database = self.repo.database_name()?;
                self.repo.schemas_in_database(&database)?
            }
        };

        let mut scripts = Vec::new();
        for schema in schemas {
            let schema_scripts = self.repo.scripts_in_schema(&schema)?;
            info!("Found {} scripts in schema {}", schema_scripts.len(), schema);
            for mut script in schema_scripts {
                if config_tables.contains(&script.full_object_name()) {
                    self.repo.add_config(&mut script)?;
                }
                self.injector.parametrize_script(&mut script);
                scripts.push(script);
            }
        }

        self.source.create_script_files(&scripts)?;
        Ok(scripts.len())
    }

    /// Record lineage edges between every source script
    pub fn create_lineage(&mut self) -> Result<usize> {
        self.synced(ChangeType::CreateLineage, Self::run_create_lineage)
    }

    fn run_create_lineage(&mut self) -> Result<usize> {
        let scripts = self.source.get_all_scripts()?;
        let mut graph = self.graph();
        graph.add_nodes(scripts);
        let dependencies = graph.dependency_list();
        self.repo.insert_dependency_list(&dependencies)?;
        Ok(dependencies.len())
    }
}

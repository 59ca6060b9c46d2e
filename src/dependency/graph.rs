//! Dependency DAG and topological scheduling

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, error, info, warn};

use super::extractor::DependencyExtractor;
use crate::config::DependencyOverride;
use crate::error::{DlSyncError, Result, UnsortedNode};
use crate::model::{Script, ScriptDependency, ScriptKey};

/// Directed graph of `dependency -> dependents` edges over scripts
#[derive(Debug, Default)]
pub struct DependencyGraph {
    extractor: DependencyExtractor,
    overrides: Vec<DependencyOverride>,
    nodes: HashMap<ScriptKey, Script>,
    /// dependency -> dependents
    dag: HashMap<ScriptKey, BTreeSet<ScriptKey>>,
    /// node -> the nodes it waits on
    dependencies: HashMap<ScriptKey, BTreeSet<ScriptKey>>,
    /// Nodes with no dependencies, in insertion order
    roots: Vec<ScriptKey>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph that also honors explicitly configured dependencies
    pub fn with_overrides(overrides: Vec<DependencyOverride>) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependencies recorded for `key`
    pub fn dependencies_of(&self, key: &ScriptKey) -> Option<&BTreeSet<ScriptKey>> {
        self.dependencies.get(key)
    }

    /// Add scripts to the graph and compute their dependencies.
    ///
    /// Scripts already in the graph are ignored. New scripts are processed
    /// in key order, so the resulting schedule depends only on the set of
    /// scripts and not on the order they were supplied in.
    pub fn add_nodes(&mut self, scripts: Vec<Script>) {
        let mut scripts: Vec<Script> = scripts
            .into_iter()
            .filter(|s| !self.nodes.contains_key(&s.key()))
            .collect();
        scripts.sort_by_key(|s| s.key());
        scripts.dedup_by_key(|s| s.key());

        info!("Building dependency graph of {} scripts.", scripts.len());
        self.extractor.add_scripts(&scripts);
        for script in &scripts {
            self.nodes.insert(script.key(), script.clone());
        }

        for script in &scripts {
            let key = script.key();
            let mut dependencies: BTreeSet<ScriptKey> = self
                .extractor
                .extract_script_dependencies(script)
                .into_iter()
                .map(Script::key)
                .collect();
            dependencies.extend(self.override_dependencies(script));
            dependencies.remove(&key);

            for dependency in &dependencies {
                self.dag
                    .entry(dependency.clone())
                    .or_default()
                    .insert(key.clone());
            }
            if dependencies.is_empty() {
                self.roots.push(key.clone());
            }
            self.dependencies.insert(key, dependencies);
        }
        debug!("Using the following dependency graph: {:?}", self.dag);
    }

    /// Configured dependencies of `script`, restricted to nodes in the graph
    fn override_dependencies(&self, script: &Script) -> Vec<ScriptKey> {
        let full_name = script.full_object_name();
        let mut keys = Vec::new();
        for entry in self
            .overrides
            .iter()
            .filter(|o| o.script.eq_ignore_ascii_case(&full_name))
        {
            for name in &entry.dependencies {
                let resolved = match script.resolve_object_reference(name) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        warn!("Ignoring dependency override: {}", err);
                        continue;
                    }
                };
                keys.extend(
                    self.nodes
                        .values()
                        .filter(|n| n.full_object_name() == resolved)
                        .map(Script::key),
                );
            }
        }
        keys
    }

    /// Order every node so that dependencies come before dependents.
    ///
    /// Kahn's algorithm with a LIFO frontier; the graph itself is left
    /// untouched so the sort can be repeated.
    pub fn topological_sort(&self) -> Result<Vec<Script>> {
        info!("Sorting scripts based on dependency ...");
        let mut in_degree: HashMap<&ScriptKey, usize> = self
            .dependencies
            .iter()
            .map(|(key, deps)| (key, deps.len()))
            .collect();
        let mut frontier: Vec<&ScriptKey> = self.roots.iter().collect();
        let mut sorted: Vec<&ScriptKey> = Vec::with_capacity(self.nodes.len());

        while let Some(key) = frontier.pop() {
            sorted.push(key);
            let Some(dependents) = self.dag.get(key) else {
                continue;
            };
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push(dependent);
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            error!(
                "DAG graph error, input script size ({}) is different than sequenced script size ({})",
                self.nodes.len(),
                sorted.len()
            );
            let done: HashSet<&ScriptKey> = sorted.into_iter().collect();
            let remaining: BTreeSet<&ScriptKey> =
                self.nodes.keys().filter(|k| !done.contains(k)).collect();
            let unsorted = remaining
                .into_iter()
                .map(|key| UnsortedNode {
                    id: key.id.clone(),
                    dependencies: self
                        .dependencies
                        .get(key)
                        .map(|deps| deps.iter().map(|d| d.id.clone()).collect())
                        .unwrap_or_default(),
                })
                .collect();
            return Err(DlSyncError::CyclicDependency { unsorted });
        }

        let scripts: Vec<Script> = sorted
            .into_iter()
            .filter_map(|key| self.nodes.get(key).cloned())
            .collect();
        debug!(
            "Sorted scripts: {:?}",
            scripts.iter().map(|s| s.id()).collect::<Vec<_>>()
        );
        Ok(scripts)
    }

    /// Lineage edges between distinct objects, de-duplicated
    pub fn dependency_list(&self) -> Vec<ScriptDependency> {
        let mut edges = BTreeSet::new();
        for (dependency_key, dependents) in &self.dag {
            let Some(dependency) = self.nodes.get(dependency_key) else {
                continue;
            };
            let dependency_name = dependency.full_object_name();
            for dependent_key in dependents {
                let Some(node) = self.nodes.get(dependent_key) else {
                    continue;
                };
                let object_name = node.full_object_name();
                if object_name == dependency_name {
                    continue;
                }
                edges.insert(ScriptDependency {
                    object_name,
                    object_type: node.object_type(),
                    dependency_name: dependency_name.clone(),
                    dependency_type: dependency.object_type(),
                });
            }
        }
        edges.into_iter().collect()
    }
}

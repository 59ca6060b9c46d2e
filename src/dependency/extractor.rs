//! Lexical dependency inference between scripts

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::model::Script;
use crate::parser::ReferenceScan;
use crate::util::unquote;

/// Minimum corpus size to benefit from a parallel candidate scan.
/// Below this threshold, sequential processing is faster due to rayon overhead.
const PARALLEL_THRESHOLD: usize = 64;

/// Finds, for a script, which other scripts of the corpus it references.
#[derive(Debug, Default)]
pub struct DependencyExtractor {
    scripts: Vec<Script>,
}

impl DependencyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append scripts to the corpus dependencies are searched in
    pub fn add_scripts(&mut self, scripts: &[Script]) {
        self.scripts.extend_from_slice(scripts);
    }

    /// Every corpus script `script` depends on.
    ///
    /// A script with another full object name is a dependency when one of
    /// the identifiers in `script` resolves to it. A migration additionally
    /// depends on all lower versions of the same object.
    pub fn extract_script_dependencies(&self, script: &Script) -> HashSet<&Script> {
        let scan = ReferenceScan::new(script.content());
        let full_name = script.full_object_name();

        let is_dependency = |candidate: &&Script| {
            candidate.full_object_name() != full_name && is_dependency_of(candidate, script, &scan)
        };

        let mut dependencies: HashSet<&Script> = if self.scripts.len() >= PARALLEL_THRESHOLD {
            self.scripts.par_iter().filter(&is_dependency).collect()
        } else {
            self.scripts.iter().filter(&is_dependency).collect()
        };

        if let Some(version) = script.version() {
            dependencies.extend(self.scripts.iter().filter(|s| {
                s.object_type() == script.object_type()
                    && s.full_object_name() == full_name
                    && s.version().is_some_and(|v| v < version)
            }));
        }

        debug!(
            "For the object {} found the following dependencies: {:?}",
            script.id(),
            dependencies.iter().map(|d| d.id()).collect::<Vec<_>>()
        );
        dependencies
    }
}

fn is_dependency_of(dependency: &Script, target: &Script, scan: &ReferenceScan) -> bool {
    let identifiers = scan.identifiers_for(dependency.object_name());
    if identifiers.is_empty() {
        return false;
    }
    let dependency_name = unquote(&dependency.full_object_name());
    identifiers
        .iter()
        .any(|identifier| match target.resolve_object_reference(identifier) {
            Ok(resolved) => unquote(&resolved) == dependency_name,
            Err(err) => {
                warn!("Skipping reference: {}", err);
                false
            }
        })
}

//! Dependency inference and scheduling

mod extractor;
mod graph;

pub use extractor::DependencyExtractor;
pub use graph::DependencyGraph;

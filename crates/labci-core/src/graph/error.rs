//! Error types for dependency-graph construction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while scanning packages or exporting the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A package is not a node of the graph.
    #[error("package not found in graph: {package}")]
    PackageNotFound { package: String },

    /// The graph contains a cycle where an ordering was requested.
    #[error("dependency cycle detected involving packages: {packages:?}")]
    DependencyCycle { packages: Vec<String> },

    /// A downstream declaration file is not a list of package names.
    #[error("invalid downstream declaration {path}: {source}")]
    Declaration {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

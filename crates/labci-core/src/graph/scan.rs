//! Builds a [`DependencyGraph`] from a directory of sibling packages.
//!
//! Every immediate subdirectory carrying the CI marker file is a package.
//! Its downstream declaration file, when present, is a YAML list of the
//! packages to rebuild after it:
//!
//! ```yaml
//! - beta
//! - gamma
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::LabConfig;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::DependencyGraph;

/// Scan `packages_root` and build the cascade graph.
///
/// Declared dependents become nodes even when they have no directory or
/// marker of their own.
pub fn scan_packages(packages_root: &Path, config: &LabConfig) -> GraphResult<DependencyGraph> {
    let entries = fs::read_dir(packages_root).map_err(|source| GraphError::Io {
        path: packages_root.to_path_buf(),
        source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| GraphError::Io {
            path: packages_root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut graph = DependencyGraph::new();
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            warn!(dir = %dir.display(), "skipping package directory with non UTF-8 name");
            continue;
        };
        if !dir.join(&config.ci_marker).exists() {
            debug!(package = name, "no CI marker, not a package");
            continue;
        }
        graph.add_package(name);
        for dependent in read_downstream_dependencies(&dir, config)? {
            graph.add_edge(name, &dependent);
        }
    }

    debug!(
        packages = graph.package_count(),
        edges = graph.edges().len(),
        "scanned package graph"
    );
    Ok(graph)
}

/// Dependents declared by the package in `package_dir`, in declaration
/// order without duplicates. An absent or empty declaration means none.
pub fn read_downstream_dependencies(
    package_dir: &Path,
    config: &LabConfig,
) -> GraphResult<Vec<String>> {
    let path = package_dir.join(&config.downstream_file);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(GraphError::Io { path, source }),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let declared: Option<Vec<String>> =
        serde_yaml::from_str(&content).map_err(|source| GraphError::Declaration {
            path: path.clone(),
            source,
        })?;

    let mut dependents: Vec<String> = Vec::new();
    for name in declared.unwrap_or_default() {
        let name = name.trim().to_string();
        if !name.is_empty() && !dependents.contains(&name) {
            dependents.push(name);
        }
    }
    Ok(dependents)
}

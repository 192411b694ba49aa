//! Package dependency graph for build cascades.
//!
//! Packages are nodes. An edge `A → B` means "B declared A as an upstream
//! dependency", so a build of A should consider triggering a build of B.
//!
//! The CI system needs this graph to be acyclic, but the graph does not
//! enforce it: [`DependencyGraph::is_acyclic`] reports and callers decide.

pub mod error;
pub mod render;
pub mod scan;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use error::{GraphError, GraphResult};
pub use scan::{read_downstream_dependencies, scan_packages};

/// Directed graph over package names.
///
/// Outgoing edges keep the order in which dependents were declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// `package → [dependent, ...]` in declaration order.
    downstream: BTreeMap<String, Vec<String>>,
    /// `dependent → {package, ...}`
    upstream: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package. Idempotent.
    pub fn add_package(&mut self, name: &str) {
        if self.nodes.insert(name.to_string()) {
            self.downstream.entry(name.to_string()).or_default();
            self.upstream.entry(name.to_string()).or_default();
        }
    }

    /// Add `package → dependent`, registering either end if needed.
    ///
    /// Duplicate edges are ignored. Cycles are accepted; see
    /// [`is_acyclic`](Self::is_acyclic).
    pub fn add_edge(&mut self, package: &str, dependent: &str) {
        self.add_package(package);
        self.add_package(dependent);
        let out = self.downstream.entry(package.to_string()).or_default();
        if !out.iter().any(|d| d == dependent) {
            out.push(dependent.to_string());
        }
        self.upstream
            .entry(dependent.to_string())
            .or_default()
            .insert(package.to_string());
    }

    pub fn contains(&self, package: &str) -> bool {
        self.nodes.contains(package)
    }

    /// Package names in sorted order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn package_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every edge as `(package, dependent)`.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.downstream
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from.as_str(), to.as_str())))
            .collect()
    }

    /// Direct dependents of `package`, in declaration order.
    pub fn dependents_of(&self, package: &str) -> GraphResult<&[String]> {
        self.downstream
            .get(package)
            .map(Vec::as_slice)
            .ok_or_else(|| GraphError::PackageNotFound {
                package: package.to_string(),
            })
    }

    /// Packages `package` depends on.
    pub fn dependencies_of(&self, package: &str) -> GraphResult<Vec<&str>> {
        self.upstream
            .get(package)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .ok_or_else(|| GraphError::PackageNotFound {
                package: package.to_string(),
            })
    }

    /// True iff the graph has no directed cycle.
    pub fn is_acyclic(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// A cycle, as a path whose first and last entries are the same package.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();
        for start in &self.nodes {
            if !marks.contains_key(start.as_str()) {
                if let Some(cycle) = self.dfs_cycle(start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Visiting);
        path.push(node);

        if let Some(dependents) = self.downstream.get(node) {
            for dep in dependents {
                match marks.get(dep.as_str()) {
                    Some(Mark::Visiting) => {
                        let start = path.iter().position(|p| *p == dep.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|p| p.to_string()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = self.dfs_cycle(dep, marks, path) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    /// Packages with every package before its dependents.
    ///
    /// Uses Kahn's algorithm; ties are broken alphabetically so the order is
    /// deterministic. Returns [`GraphError::DependencyCycle`] on a cycle.
    pub fn topological_order(&self) -> GraphResult<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|id| (id.as_str(), 0)).collect();
        for dependents in self.downstream.values() {
            for d in dependents {
                *in_degree.entry(d.as_str()).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            sorted.push(node.to_string());
            if let Some(dependents) = self.downstream.get(node) {
                for dep in dependents {
                    if let Some(deg) = in_degree.get_mut(dep.as_str()) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert(dep.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let stuck = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            return Err(GraphError::DependencyCycle { packages: stuck });
        }
        Ok(sorted)
    }
}

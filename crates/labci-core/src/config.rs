//! File-layout and dispatch configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::{ContextError, ContextResult};

/// How the cascade walks the dependents of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One dependent at a time, in declaration order.
    #[default]
    Sequential,
    /// All dependents at once; outcomes are still reported in declaration order.
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(DispatchMode::Sequential),
            "concurrent" => Ok(DispatchMode::Concurrent),
            other => Err(format!("unknown dispatch mode: {other}")),
        }
    }
}

/// Where packages keep their CI files and test reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Path, relative to a package directory, whose presence marks a CI-enabled package.
    pub ci_marker: PathBuf,
    /// Path, relative to a package directory, of the downstream declaration (YAML list).
    pub downstream_file: PathBuf,
    /// Directory holding test reports, relative to the package directory.
    pub report_dir: PathBuf,
    /// Report filename glob; the wildcard part is the variant tag.
    pub report_pattern: String,
    /// Branch built when triggering a dependent.
    pub default_branch: String,
    pub dispatch_mode: DispatchMode,
}

impl Default for LabConfig {
    fn default() -> Self {
        LabConfig {
            ci_marker: PathBuf::from(".circleci/config.yml"),
            downstream_file: PathBuf::from(".circleci/downstream_dependencies.yml"),
            report_dir: PathBuf::from("tests/reports"),
            report_pattern: "*.xml".to_string(),
            default_branch: "master".to_string(),
            dispatch_mode: DispatchMode::Sequential,
        }
    }
}

impl LabConfig {
    /// Defaults overridden by `LABCI_*` environment variables.
    pub fn from_env() -> ContextResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ContextResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = LabConfig::default();

        if let Some(v) = get("LABCI_CI_MARKER") {
            config.ci_marker = PathBuf::from(v);
        }
        if let Some(v) = get("LABCI_DOWNSTREAM_FILE") {
            config.downstream_file = PathBuf::from(v);
        }
        if let Some(v) = get("LABCI_REPORT_DIR") {
            config.report_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LABCI_REPORT_PATTERN") {
            config.report_pattern = v;
        }
        if let Some(v) = get("LABCI_DEFAULT_BRANCH") {
            config.default_branch = v;
        }
        if let Some(v) = get("LABCI_DISPATCH_MODE") {
            config.dispatch_mode = v.parse().map_err(|_| ContextError::Invalid {
                var: "LABCI_DISPATCH_MODE",
                value: v.clone(),
            })?;
        }
        Ok(config)
    }
}

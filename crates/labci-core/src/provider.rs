//! CI provider interface consumed by the classifier and the cascade.
//!
//! The core only knows the typed shapes below. Transport, authentication and
//! retry policy live in the concrete client (see the `labci-circleci` crate).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Build statuses that count as "the build was green".
pub const PASSING_STATUSES: [&str; 2] = ["success", "fixed"];

/// Parameters attached to a build that was started by a cascade.
///
/// Identifies the origin of the cascade: the package and build number that
/// started the chain, preserved across hops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerParams {
    /// Origin package name.
    pub upstream_package: String,
    /// Origin build number.
    pub upstream_build_number: u64,
}

impl TriggerParams {
    pub fn new(upstream_package: impl Into<String>, upstream_build_number: u64) -> Self {
        Self {
            upstream_package: upstream_package.into(),
            upstream_build_number,
        }
    }
}

/// Commit metadata attached to a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: Option<String>,
    pub subject: Option<String>,
    pub author_name: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

/// One historical build of a package, as reported by the CI provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build_number: u64,
    /// Provider status string, e.g. `success`, `failed`, `fixed`.
    pub status: String,
    /// `None` while the build is still queued.
    pub start_time: Option<DateTime<Utc>>,
    /// Present when this build was itself started by a cascade.
    pub trigger_params: Option<TriggerParams>,
    pub branch: Option<String>,
    /// Commits built, most relevant first.
    pub commits: Vec<CommitInfo>,
}

impl BuildRecord {
    /// Minimal record with the given number and status.
    pub fn new(build_number: u64, status: impl Into<String>) -> Self {
        Self {
            build_number,
            status: status.into(),
            start_time: None,
            trigger_params: None,
            branch: None,
            commits: Vec::new(),
        }
    }

    /// True when the status is one of [`PASSING_STATUSES`].
    pub fn is_passing(&self) -> bool {
        PASSING_STATUSES.contains(&self.status.as_str())
    }

    /// Commit time of the first commit that carries one.
    pub fn commit_time(&self) -> Option<DateTime<Utc>> {
        self.commits.iter().find_map(|c| c.committed_at)
    }
}

/// Acknowledgement returned by the provider for a trigger request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAck {
    pub package: String,
    /// Number assigned to the new build, when the provider reports one.
    pub build_number: Option<u64>,
}

/// Errors raised by a CI provider client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CiProviderError {
    /// The provider answered with a non-2xx status.
    #[error("CI provider returned HTTP {status} for {endpoint}: {body}")]
    Http {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed CI provider response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },

    /// The request never produced a response.
    #[error("CI provider transport error: {0}")]
    Transport(String),

    /// The requested build does not exist.
    #[error("build {package}#{build_number} not found")]
    BuildNotFound { package: String, build_number: u64 },
}

pub type CiProviderResult<T> = std::result::Result<T, CiProviderError>;

/// Injectable CI provider.
///
/// Implement this trait to plug in a real CI REST API or a test double.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Fetch one build of `package`.
    async fn get_build(&self, package: &str, build_number: u64) -> CiProviderResult<BuildRecord>;

    /// Recent builds of `package`, most recent first.
    async fn get_recent_builds(&self, package: &str) -> CiProviderResult<Vec<BuildRecord>>;

    /// Ask the provider to build `branch` of `package`.
    async fn trigger_build(
        &self,
        package: &str,
        branch: &str,
        params: &TriggerParams,
    ) -> CiProviderResult<TriggerAck>;
}

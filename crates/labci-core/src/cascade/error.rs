//! Error types for downstream build cascades.

use thiserror::Error;

use crate::provider::CiProviderError;

/// Errors produced while deciding or issuing downstream triggers.
///
/// `OriginBuild` and `MissingCommitTime` abort the whole cascade. The
/// per-dependent variants are collected in
/// [`CascadeOutcome::failures`](crate::cascade::CascadeOutcome::failures)
/// while the remaining dependents are still evaluated.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// The origin build could not be fetched.
    #[error("failed to fetch origin build {package}#{build_number}: {source}")]
    OriginBuild {
        package: String,
        build_number: u64,
        #[source]
        source: CiProviderError,
    },

    /// The origin build carries no commit timestamp to compare against.
    #[error("origin build {package}#{build_number} has no commit timestamp")]
    MissingCommitTime { package: String, build_number: u64 },

    /// The dependent's build history could not be fetched.
    #[error("failed to fetch build history of {dependent}: {source}")]
    History {
        dependent: String,
        #[source]
        source: CiProviderError,
    },

    /// The trigger request for the dependent failed.
    #[error("failed to trigger build of {dependent}: {source}")]
    Trigger {
        dependent: String,
        #[source]
        source: CiProviderError,
    },

    /// A concurrent evaluation task did not complete.
    #[error("evaluation task for {dependent} did not complete: {detail}")]
    Task { dependent: String, detail: String },
}

pub type CascadeResult<T> = std::result::Result<T, CascadeError>;

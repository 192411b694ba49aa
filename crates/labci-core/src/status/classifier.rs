//! Build status classification relative to build history.
//!
//! [`StatusClassifier`] compares a build's [`TestResults`] with the status of
//! the previous build, as reported by the CI provider, and produces a
//! [`StatusVector`] for the notifier.

use std::sync::Arc;

use thiserror::Error;

use crate::context::BuildContext;
use crate::obs;
use crate::provider::{CiProvider, CiProviderError};
use crate::results::TestResults;
use crate::status::vector::StatusVector;

/// The prior-build lookup failed; no status is synthesized.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("failed to fetch prior build {package}#{build_number}: {source}")]
    PriorBuild {
        package: String,
        build_number: u64,
        #[source]
        source: CiProviderError,
    },
}

pub type ClassificationResult<T> = std::result::Result<T, ClassificationError>;

/// Everything known about a finished build before it is compared to history.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub results: TestResults,
    /// Installing the package failed.
    pub install_error: bool,
    /// The test runner itself failed.
    pub test_error: bool,
    /// Any other pipeline step failed.
    pub other_error: bool,
}

impl BuildOutcome {
    pub fn from_results(results: TestResults) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    /// A pipeline step failed and no test results exist to explain it.
    pub fn is_other_error(&self) -> bool {
        (self.install_error || self.test_error || self.other_error) && self.results.is_empty()
    }
}

/// Classifies builds against the CI provider's record of the prior build.
pub struct StatusClassifier {
    provider: Arc<dyn CiProvider>,
}

impl StatusClassifier {
    pub fn new(provider: Arc<dyn CiProvider>) -> Self {
        Self { provider }
    }

    /// Classify the build described by `ctx`.
    ///
    /// A dry run returns [`StatusVector::none`] without contacting the
    /// provider. An "other" error skips the prior-build lookup. A failed
    /// lookup is returned as [`ClassificationError::PriorBuild`].
    pub async fn classify(
        &self,
        outcome: &BuildOutcome,
        ctx: &BuildContext,
    ) -> ClassificationResult<StatusVector> {
        if ctx.dry_run {
            return Ok(StatusVector::none());
        }

        if outcome.is_other_error() {
            let status = StatusVector::other_error();
            obs::emit_build_classified(ctx, &status);
            return Ok(status);
        }

        let passed = outcome.results.passed();
        let mut status = StatusVector::none();

        if ctx.is_first_build() {
            status.is_fixed = passed;
            status.is_new_error = !passed;
        } else {
            let prior_number = ctx.build_number - 1;
            let prior = self
                .provider
                .get_build(&ctx.package, prior_number)
                .await
                .map_err(|source| ClassificationError::PriorBuild {
                    package: ctx.package.clone(),
                    build_number: prior_number,
                    source,
                })?;
            let prior_passing = prior.is_passing();

            if passed {
                status.is_fixed = !prior_passing;
            } else {
                status.is_old_error = !prior_passing;
                status.is_new_error = prior_passing;
            }
        }

        status.is_new_downstream_error = ctx.upstream.is_some()
            && status.is_new_error
            && !ctx.is_first_build()
            && !status.is_other_error;

        obs::emit_build_classified(ctx, &status);
        Ok(status)
    }
}

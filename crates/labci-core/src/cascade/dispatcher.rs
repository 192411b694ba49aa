//! Downstream cascade dispatch.
//!
//! After a clean build, [`CascadeDispatcher`] walks the declared dependents
//! of the package, checks each one's recent build history for evidence that
//! it is already queued or built for this cascade, and triggers the rest.
//!
//! The cascade keeps the identity of its origin (the package and build that
//! started the chain) across hops, so a loop anywhere in the lab is caught,
//! not just one hop back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::cascade::error::{CascadeError, CascadeResult};
use crate::config::DispatchMode;
use crate::context::BuildContext;
use crate::obs;
use crate::provider::{BuildRecord, CiProvider, TriggerParams};
use crate::results::TestResults;

/// Why a dependent was considered already queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The dependent is the origin package and this record is the origin build.
    OriginBuild { build_number: u64 },
    /// A build of the dependent was already started by this cascade.
    SameOrigin { build_number: u64 },
    /// A build of the dependent has not started yet.
    Queued { build_number: u64 },
    /// A build of the dependent started at or after the origin commit.
    UpToDate { build_number: u64 },
}

/// Result of one cascade pass.
#[derive(Debug, Default)]
pub struct CascadeOutcome {
    /// Dependents a trigger was issued for, in declaration order.
    pub triggered: Vec<String>,
    /// Dependents left alone, in declaration order.
    pub skipped: Vec<(String, SkipReason)>,
    /// Dependents whose evaluation failed, in declaration order.
    pub failures: Vec<(String, CascadeError)>,
}

impl CascadeOutcome {
    /// `true` when no dependent failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
enum Decision {
    Triggered,
    Skipped(SkipReason),
}

/// Decide whether `history` shows `dependent` is already queued for the
/// cascade started by `origin`. Returns the first matching reason.
///
/// `current_build` is the number of the build running the cascade;
/// `watermark` is the origin commit's timestamp.
pub fn already_queued(
    dependent: &str,
    history: &[BuildRecord],
    origin: &TriggerParams,
    current_build: u64,
    watermark: DateTime<Utc>,
) -> Option<SkipReason> {
    history.iter().find_map(|record| {
        let build_number = record.build_number;
        if dependent == origin.upstream_package
            && build_number == origin.upstream_build_number
            && build_number != current_build
        {
            return Some(SkipReason::OriginBuild { build_number });
        }
        if record.trigger_params.as_ref() == Some(origin) {
            return Some(SkipReason::SameOrigin { build_number });
        }
        match record.start_time {
            None => Some(SkipReason::Queued { build_number }),
            Some(started) if started >= watermark => Some(SkipReason::UpToDate { build_number }),
            Some(_) => None,
        }
    })
}

/// Triggers builds of downstream packages through a [`CiProvider`].
pub struct CascadeDispatcher {
    provider: Arc<dyn CiProvider>,
    branch: String,
    mode: DispatchMode,
}

impl CascadeDispatcher {
    /// Dispatcher triggering `branch` of each dependent, one at a time.
    pub fn new(provider: Arc<dyn CiProvider>, branch: impl Into<String>) -> Self {
        Self {
            provider,
            branch: branch.into(),
            mode: DispatchMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run the cascade for the build in `ctx`.
    ///
    /// Returns an empty outcome without any provider call for a dry run or
    /// when `results` contain an Error or Failure case. Failing to establish
    /// the origin commit time aborts with an error; failures for individual
    /// dependents are collected in [`CascadeOutcome::failures`].
    pub async fn trigger(
        &self,
        ctx: &BuildContext,
        results: &TestResults,
        dependents: &[String],
    ) -> CascadeResult<CascadeOutcome> {
        if ctx.dry_run || !results.passed() || dependents.is_empty() {
            return Ok(CascadeOutcome::default());
        }

        let origin = ctx.origin();
        let origin_build = self
            .provider
            .get_build(&origin.upstream_package, origin.upstream_build_number)
            .await
            .map_err(|source| CascadeError::OriginBuild {
                package: origin.upstream_package.clone(),
                build_number: origin.upstream_build_number,
                source,
            })?;
        let watermark = origin_build
            .commit_time()
            .ok_or_else(|| CascadeError::MissingCommitTime {
                package: origin.upstream_package.clone(),
                build_number: origin.upstream_build_number,
            })?;

        let decisions = match self.mode {
            DispatchMode::Sequential => {
                let mut decisions = Vec::with_capacity(dependents.len());
                for dependent in dependents {
                    let decision = evaluate(
                        Arc::clone(&self.provider),
                        dependent.clone(),
                        self.branch.clone(),
                        origin.clone(),
                        ctx.build_number,
                        watermark,
                    )
                    .await;
                    decisions.push(decision);
                }
                decisions
            }
            DispatchMode::Concurrent => {
                self.evaluate_concurrently(dependents, &origin, ctx.build_number, watermark)
                    .await
            }
        };

        let mut outcome = CascadeOutcome::default();
        for (dependent, decision) in dependents.iter().zip(decisions) {
            match decision {
                Ok(Decision::Triggered) => {
                    obs::emit_dependent_triggered(dependent, &origin);
                    outcome.triggered.push(dependent.clone());
                }
                Ok(Decision::Skipped(reason)) => {
                    obs::emit_dependent_skipped(dependent, &reason);
                    outcome.skipped.push((dependent.clone(), reason));
                }
                Err(err) => {
                    obs::emit_dependent_failed(dependent, &err);
                    outcome.failures.push((dependent.clone(), err));
                }
            }
        }
        Ok(outcome)
    }

    /// One task per dependent; every outcome is kept and returned in the
    /// order of `dependents`.
    async fn evaluate_concurrently(
        &self,
        dependents: &[String],
        origin: &TriggerParams,
        current_build: u64,
        watermark: DateTime<Utc>,
    ) -> Vec<CascadeResult<Decision>> {
        let mut join_set = JoinSet::new();
        for (idx, dependent) in dependents.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.provider);
            let branch = self.branch.clone();
            let origin = origin.clone();
            join_set.spawn(async move {
                let decision =
                    evaluate(provider, dependent, branch, origin, current_build, watermark).await;
                (idx, decision)
            });
        }

        let mut slots: Vec<Option<CascadeResult<Decision>>> =
            (0..dependents.len()).map(|_| None).collect();
        let mut join_errors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, decision)) => slots[idx] = Some(decision),
                Err(e) => join_errors.push(e.to_string()),
            }
        }

        slots
            .into_iter()
            .zip(dependents)
            .map(|(slot, dependent)| {
                slot.unwrap_or_else(|| {
                    Err(CascadeError::Task {
                        dependent: dependent.clone(),
                        detail: join_errors
                            .first()
                            .cloned()
                            .unwrap_or_else(|| "task produced no result".to_string()),
                    })
                })
            })
            .collect()
    }
}

/// Fetch one dependent's history and trigger it unless it is already queued.
async fn evaluate(
    provider: Arc<dyn CiProvider>,
    dependent: String,
    branch: String,
    origin: TriggerParams,
    current_build: u64,
    watermark: DateTime<Utc>,
) -> CascadeResult<Decision> {
    let history = provider
        .get_recent_builds(&dependent)
        .await
        .map_err(|source| CascadeError::History {
            dependent: dependent.clone(),
            source,
        })?;

    if let Some(reason) = already_queued(&dependent, &history, &origin, current_build, watermark) {
        return Ok(Decision::Skipped(reason));
    }

    provider
        .trigger_build(&dependent, &branch, &origin)
        .await
        .map_err(|source| CascadeError::Trigger {
            dependent: dependent.clone(),
            source,
        })?;
    Ok(Decision::Triggered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn watermark() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn started(build_number: u64, at: DateTime<Utc>) -> BuildRecord {
        let mut r = BuildRecord::new(build_number, "success");
        r.start_time = Some(at);
        r
    }

    #[test]
    fn test_old_unrelated_build_is_not_queued() {
        let history = vec![started(3, watermark() - Duration::hours(1))];
        let origin = TriggerParams::new("alpha", 10);
        assert_eq!(
            already_queued("beta", &history, &origin, 10, watermark()),
            None
        );
    }

    #[test]
    fn test_same_origin_is_queued() {
        let mut record = started(3, watermark() - Duration::hours(1));
        record.trigger_params = Some(TriggerParams::new("alpha", 10));
        let origin = TriggerParams::new("alpha", 10);
        assert_eq!(
            already_queued("beta", &[record], &origin, 10, watermark()),
            Some(SkipReason::SameOrigin { build_number: 3 })
        );
    }

    #[test]
    fn test_different_origin_build_does_not_count() {
        let mut record = started(3, watermark() - Duration::hours(1));
        record.trigger_params = Some(TriggerParams::new("alpha", 9));
        let origin = TriggerParams::new("alpha", 10);
        assert_eq!(
            already_queued("beta", &[record], &origin, 10, watermark()),
            None
        );
    }

    #[test]
    fn test_start_time_at_watermark_counts_as_built() {
        let origin = TriggerParams::new("alpha", 10);
        assert_eq!(
            already_queued("beta", &[started(4, watermark())], &origin, 10, watermark()),
            Some(SkipReason::UpToDate { build_number: 4 })
        );
        assert_eq!(
            already_queued(
                "beta",
                &[started(4, watermark() + Duration::seconds(1))],
                &origin,
                10,
                watermark()
            ),
            Some(SkipReason::UpToDate { build_number: 4 })
        );
    }

    #[test]
    fn test_unstarted_build_is_queued() {
        let origin = TriggerParams::new("alpha", 10);
        assert_eq!(
            already_queued(
                "beta",
                &[BuildRecord::new(5, "queued")],
                &origin,
                10,
                watermark()
            ),
            Some(SkipReason::Queued { build_number: 5 })
        );
    }

    #[test]
    fn test_cascade_back_to_origin_build_is_caught() {
        // alpha#10 -> beta -> alpha: alpha's history holds the origin build.
        let origin = TriggerParams::new("alpha", 10);
        let history = vec![started(10, watermark() - Duration::hours(2))];
        assert_eq!(
            already_queued("alpha", &history, &origin, 4, watermark()),
            Some(SkipReason::OriginBuild { build_number: 10 })
        );
        // The origin build itself running the check does not count.
        assert_eq!(
            already_queued("alpha", &history, &origin, 10, watermark()),
            None
        );
    }

    #[test]
    fn test_any_record_in_history_can_match() {
        let origin = TriggerParams::new("alpha", 10);
        let mut tagged = started(2, watermark() - Duration::days(3));
        tagged.trigger_params = Some(origin.clone());
        let history = vec![started(3, watermark() - Duration::days(1)), tagged];
        assert_eq!(
            already_queued("beta", &history, &origin, 10, watermark()),
            Some(SkipReason::SameOrigin { build_number: 2 })
        );
    }
}

//! Integration tests for the downstream cascade with MemoryCiProvider.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use labci_core::fakes::{MemoryCiProvider, ProviderCall};
use labci_core::results::{Outcome, OutcomeDetail};
use labci_core::{
    BuildContext, BuildRecord, CascadeDispatcher, CascadeError, CiProviderError, CommitInfo,
    DispatchMode,
    SkipReason, TestCaseResult, TestResults, TriggerParams,
};

fn committed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
}

fn origin_build(number: u64) -> BuildRecord {
    let mut record = BuildRecord::new(number, "success");
    record.start_time = Some(committed_at() + Duration::minutes(1));
    record.commits = vec![CommitInfo {
        sha: Some("0a1b2c".to_string()),
        committed_at: Some(committed_at()),
        ..CommitInfo::default()
    }];
    record
}

fn started(number: u64, at: DateTime<Utc>) -> BuildRecord {
    let mut record = BuildRecord::new(number, "success");
    record.start_time = Some(at);
    record
}

fn clean_results() -> TestResults {
    TestResults::from_cases(vec![
        TestCaseResult::passed("alpha.tests", "test_a", "3.6", 0.2),
        TestCaseResult::passed("alpha.tests", "test_b", "3.6", 0.3),
    ])
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// alpha#10 passes; beta is stale, gamma already carries alpha#10's trigger.
fn lab() -> Arc<MemoryCiProvider> {
    let provider = Arc::new(MemoryCiProvider::new());
    provider.add_build("alpha", origin_build(10));
    provider.add_build("beta", started(21, committed_at() - Duration::hours(3)));
    let mut gamma = started(7, committed_at() - Duration::hours(5));
    gamma.trigger_params = Some(TriggerParams::new("alpha", 10));
    provider.add_build("gamma", gamma);
    provider
}

#[tokio::test]
async fn test_end_to_end_triggers_only_stale_dependent() {
    let provider = lab();
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");
    let ctx = BuildContext::new("alpha", 10, "master");

    let outcome = dispatcher
        .trigger(&ctx, &clean_results(), &names(&["beta", "gamma"]))
        .await
        .expect("cascade");

    assert_eq!(outcome.triggered, vec!["beta".to_string()]);
    assert_eq!(
        outcome.skipped,
        vec![(
            "gamma".to_string(),
            SkipReason::SameOrigin { build_number: 7 }
        )]
    );
    assert!(outcome.is_success());

    let triggers: Vec<ProviderCall> = provider
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ProviderCall::TriggerBuild { .. }))
        .collect();
    assert_eq!(
        triggers,
        vec![ProviderCall::TriggerBuild {
            package: "beta".to_string(),
            branch: "master".to_string(),
            params: TriggerParams::new("alpha", 10),
        }]
    );
}

#[tokio::test]
async fn test_repeated_cascade_never_retriggers() {
    let provider = lab();
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");
    let ctx = BuildContext::new("alpha", 10, "master");
    let dependents = names(&["beta", "gamma"]);

    let first = dispatcher
        .trigger(&ctx, &clean_results(), &dependents)
        .await
        .unwrap();
    assert_eq!(first.triggered, vec!["beta".to_string()]);

    for _ in 0..3 {
        let again = dispatcher
            .trigger(&ctx, &clean_results(), &dependents)
            .await
            .unwrap();
        assert!(again.triggered.is_empty());
        assert_eq!(again.skipped.len(), 2);
    }
    assert_eq!(provider.triggered_packages(), vec!["beta".to_string()]);
}

#[tokio::test]
async fn test_broken_build_never_cascades() {
    let provider = lab();
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");
    let ctx = BuildContext::new("alpha", 10, "master");
    let mut results = clean_results();
    results.push(
        TestCaseResult::passed("alpha.tests", "test_c", "3.6", 0.1)
            .with_outcome(Outcome::Failure(OutcomeDetail::default())),
    );

    let outcome = dispatcher
        .trigger(&ctx, &results, &names(&["beta", "gamma"]))
        .await
        .unwrap();
    assert!(outcome.triggered.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_dry_run_makes_no_calls() {
    let provider = lab();
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");
    let ctx = BuildContext::new("alpha", 10, "master").with_dry_run(true);
    let outcome = dispatcher
        .trigger(&ctx, &clean_results(), &names(&["beta"]))
        .await
        .unwrap();
    assert!(outcome.triggered.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_fresh_dependent_is_not_triggered() {
    let provider = Arc::new(MemoryCiProvider::new());
    provider.add_build("alpha", origin_build(10));
    provider.add_build("beta", started(30, committed_at() + Duration::minutes(10)));
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");

    let outcome = dispatcher
        .trigger(
            &BuildContext::new("alpha", 10, "master"),
            &clean_results(),
            &names(&["beta"]),
        )
        .await
        .unwrap();
    assert!(outcome.triggered.is_empty());
    assert_eq!(
        outcome.skipped[0].1,
        SkipReason::UpToDate { build_number: 30 }
    );
}

#[tokio::test]
async fn test_failure_on_one_dependent_does_not_stop_others() {
    let provider = lab();
    provider.add_build("delta", started(2, committed_at() - Duration::days(1)));
    provider.fail_package("beta");
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");

    let outcome = dispatcher
        .trigger(
            &BuildContext::new("alpha", 10, "master"),
            &clean_results(),
            &names(&["beta", "gamma", "delta"]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.triggered, vec!["delta".to_string()]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "beta");
    assert!(matches!(
        outcome.failures[0].1,
        CascadeError::History { .. }
    ));
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_trigger_failure_is_isolated_to_its_dependent() {
    let provider = lab();
    provider.add_build("delta", started(2, committed_at() - Duration::days(1)));
    provider.fail_triggers("delta");

    for mode in [DispatchMode::Sequential, DispatchMode::Concurrent] {
        let dispatcher = CascadeDispatcher::new(provider.clone(), "master").with_mode(mode);
        let outcome = dispatcher
            .trigger(
                &BuildContext::new("alpha", 10, "master"),
                &clean_results(),
                &names(&["beta", "delta", "epsilon"]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 1, "{mode:?}");
        assert_eq!(outcome.failures[0].0, "delta");
        assert!(matches!(
            &outcome.failures[0].1,
            CascadeError::Trigger { dependent, source: CiProviderError::Http { status: 500, .. } }
                if dependent == "delta"
        ));
        assert!(!outcome.is_success());
        if mode == DispatchMode::Sequential {
            assert_eq!(outcome.triggered, names(&["beta", "epsilon"]));
        } else {
            // beta and epsilon now carry alpha#10's queued builds.
            assert!(outcome.triggered.is_empty());
            assert_eq!(outcome.skipped.len(), 2);
        }
    }

    assert_eq!(
        provider.triggered_packages(),
        names(&["beta", "delta", "epsilon", "delta"])
    );
}

#[tokio::test]
async fn test_origin_is_preserved_across_hops() {
    // beta#22 was triggered by alpha#10 and now cascades to gamma and alpha.
    let provider = lab();
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");
    let ctx = BuildContext::new("beta", 22, "master").with_upstream("alpha", 10);

    let outcome = dispatcher
        .trigger(&ctx, &clean_results(), &names(&["gamma", "alpha"]))
        .await
        .unwrap();

    assert!(outcome.triggered.is_empty());
    assert_eq!(
        outcome.skipped,
        vec![
            (
                "gamma".to_string(),
                SkipReason::SameOrigin { build_number: 7 }
            ),
            (
                "alpha".to_string(),
                SkipReason::OriginBuild { build_number: 10 }
            ),
        ]
    );
    assert!(provider.calls().contains(&ProviderCall::GetBuild {
        package: "alpha".to_string(),
        build_number: 10,
    }));
}

#[tokio::test]
async fn test_origin_without_commit_time_aborts() {
    let provider = Arc::new(MemoryCiProvider::new());
    provider.add_build("alpha", BuildRecord::new(10, "success"));
    let dispatcher = CascadeDispatcher::new(provider.clone(), "master");

    let err = dispatcher
        .trigger(
            &BuildContext::new("alpha", 10, "master"),
            &clean_results(),
            &names(&["beta"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CascadeError::MissingCommitTime { .. }));
    assert!(provider.triggered_packages().is_empty());
}

#[tokio::test]
async fn test_concurrent_mode_matches_sequential() {
    let provider = lab();
    provider.add_build("delta", started(2, committed_at() - Duration::days(1)));
    provider.fail_package("epsilon");
    let dispatcher =
        CascadeDispatcher::new(provider.clone(), "master").with_mode(DispatchMode::Concurrent);

    let outcome = dispatcher
        .trigger(
            &BuildContext::new("alpha", 10, "master"),
            &clean_results(),
            &names(&["beta", "gamma", "delta", "epsilon"]),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.triggered,
        vec!["beta".to_string(), "delta".to_string()]
    );
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "epsilon");
}

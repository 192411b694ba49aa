//! Recorded CircleCI responses fed through the core's queued-build check.

use chrono::{TimeZone, Utc};
use labci_circleci::wire::{ApiBuild, WireError};
use labci_core::{already_queued, BuildRecord, SkipReason, TriggerParams};

/// `GET project/github/lab/beta?limit=30`, trimmed to the fields of interest.
const BETA_HISTORY: &str = r#"[
  {
    "build_num": 44,
    "status": "not_running",
    "lifecycle": "queued",
    "start_time": null,
    "branch": "master",
    "build_parameters": {"UPSTREAM_REPONAME": "gamma", "UPSTREAM_BUILD_NUM": "3"},
    "all_commit_details": []
  },
  {
    "build_num": 43,
    "status": "success",
    "start_time": "2024-06-03T08:00:00.000Z",
    "branch": "master",
    "build_parameters": {"UPSTREAM_REPONAME": "alpha", "UPSTREAM_BUILD_NUM": 10},
    "all_commit_details": [
      {"commit": "c0ffee", "committer_date": "2024-06-01T10:00:00Z"}
    ]
  },
  {
    "build_num": 42,
    "status": "failed",
    "start_time": "2024-06-02T16:45:03.120Z",
    "branch": "master",
    "build_parameters": null,
    "all_commit_details": null
  }
]"#;

fn history() -> Vec<BuildRecord> {
    let builds: Vec<ApiBuild> = serde_json::from_str(BETA_HISTORY).unwrap();
    builds
        .into_iter()
        .map(|b| BuildRecord::try_from(b).unwrap())
        .collect()
}

#[test]
fn test_history_converts_in_provider_order() {
    let records = history();
    let numbers: Vec<u64> = records.iter().map(|r| r.build_number).collect();
    assert_eq!(numbers, vec![44, 43, 42]);
    assert_eq!(records[0].start_time, None);
    assert_eq!(records[1].trigger_params, Some(TriggerParams::new("alpha", 10)));
    assert!(records[2].commits.is_empty());
}

#[test]
fn test_odd_start_time_fails_instead_of_reading_as_queued() {
    // A finished build whose start time uses a space separator.
    let json = r#"{"build_num": 5, "status": "success", "start_time": "2024-06-01 08:00:00"}"#;
    let build: ApiBuild = serde_json::from_str(json).unwrap();
    assert!(matches!(
        BuildRecord::try_from(build),
        Err(WireError::InvalidTimestamp { build_num: 5, .. })
    ));
}

#[test]
fn test_queued_build_blocks_a_new_trigger() {
    let watermark = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
    let origin = TriggerParams::new("delta", 7);
    assert_eq!(
        already_queued("beta", &history(), &origin, 7, watermark),
        Some(SkipReason::Queued { build_number: 44 })
    );
}

#[test]
fn test_stale_history_allows_a_trigger() {
    let watermark = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
    let origin = TriggerParams::new("delta", 7);
    let settled: Vec<BuildRecord> = history().into_iter().skip(1).collect();
    assert_eq!(already_queued("beta", &settled, &origin, 7, watermark), None);

    let same_origin = TriggerParams::new("alpha", 10);
    assert_eq!(
        already_queued("beta", &settled, &same_origin, 10, watermark),
        Some(SkipReason::SameOrigin { build_number: 43 })
    );
}

//! CircleCI v1.1 JSON shapes and their conversion into core build records.
//!
//! Only the fields the cascade and the classifier read are modelled; every
//! other field in a response is ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use labci_core::provider::{BuildRecord, CommitInfo, TriggerParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Build parameter naming the origin package of a cascade.
pub const PARAM_UPSTREAM_REPONAME: &str = "UPSTREAM_REPONAME";
/// Build parameter naming the origin build number of a cascade.
pub const PARAM_UPSTREAM_BUILD_NUM: &str = "UPSTREAM_BUILD_NUM";

/// One build as returned by the single-build and project-history endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiBuild {
    pub build_num: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub build_parameters: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub all_commit_details: Option<Vec<ApiCommit>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommit {
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub committer_date: Option<String>,
}

/// Body of a trigger request.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerRequest {
    pub build_parameters: BTreeMap<&'static str, String>,
}

impl From<&TriggerParams> for TriggerRequest {
    fn from(params: &TriggerParams) -> Self {
        let mut build_parameters = BTreeMap::new();
        build_parameters.insert(PARAM_UPSTREAM_REPONAME, params.upstream_package.clone());
        build_parameters.insert(
            PARAM_UPSTREAM_BUILD_NUM,
            params.upstream_build_number.to_string(),
        );
        TriggerRequest { build_parameters }
    }
}

/// The part of a trigger response labci reads.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub build_num: Option<u64>,
}

impl ApiBuild {
    /// Upstream trigger parameters, when both are present and well-formed.
    pub fn trigger_params(&self) -> Option<TriggerParams> {
        let params = self.build_parameters.as_ref()?;
        let package = params
            .get(PARAM_UPSTREAM_REPONAME)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        let build_number = match params.get(PARAM_UPSTREAM_BUILD_NUM)? {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(TriggerParams::new(package, build_number))
    }
}

/// A field present in a response that cannot become part of a [`BuildRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("build {build_num} has no status")]
    MissingStatus { build_num: u64 },

    #[error("build {build_num}: {field} is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp {
        build_num: u64,
        field: &'static str,
        value: String,
    },
}

impl TryFrom<ApiBuild> for BuildRecord {
    type Error = WireError;

    fn try_from(build: ApiBuild) -> Result<Self, WireError> {
        let build_num = build.build_num;
        let trigger_params = build.trigger_params();
        let status = build
            .status
            .filter(|s| !s.trim().is_empty())
            .ok_or(WireError::MissingStatus { build_num })?;
        let start_time = parse_time(build.start_time.as_deref())
            .map_err(|value| WireError::InvalidTimestamp {
                build_num,
                field: "start_time",
                value,
            })?;
        let commits = build
            .all_commit_details
            .unwrap_or_default()
            .into_iter()
            .map(|commit| commit_info(build_num, commit))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BuildRecord {
            build_number: build_num,
            status,
            start_time,
            trigger_params,
            branch: build.branch,
            commits,
        })
    }
}

fn commit_info(build_num: u64, commit: ApiCommit) -> Result<CommitInfo, WireError> {
    let committed_at = parse_time(commit.committer_date.as_deref()).map_err(|value| {
        WireError::InvalidTimestamp {
            build_num,
            field: "committer_date",
            value,
        }
    })?;
    Ok(CommitInfo {
        committed_at,
        sha: commit.commit,
        subject: commit.subject,
        author_name: commit.author_name,
    })
}

/// RFC 3339 timestamp in any offset, normalised to UTC. Only `null` or an
/// absent field is `None`; any other unparseable value is handed back.
fn parse_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|_| raw.to_string())
}

//! Build context: who is building, which build, and what triggered it.
//!
//! Read once at process start and passed by reference into the classifier
//! and the cascade. Nothing below this module reads the environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::TriggerParams;

pub const ENV_PACKAGE: &str = "CIRCLE_PROJECT_REPONAME";
pub const ENV_BUILD_NUMBER: &str = "CIRCLE_BUILD_NUM";
pub const ENV_BRANCH: &str = "CIRCLE_BRANCH";
pub const ENV_UPSTREAM_PACKAGE: &str = "UPSTREAM_REPONAME";
pub const ENV_UPSTREAM_BUILD_NUMBER: &str = "UPSTREAM_BUILD_NUM";
pub const ENV_DRY_RUN: &str = "LABCI_DRY_RUN";

/// Errors raised while assembling a [`BuildContext`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    /// Only one half of the upstream trigger identity was provided.
    #[error("upstream trigger is incomplete: {present} is set but {absent} is not")]
    IncompleteUpstream {
        present: &'static str,
        absent: &'static str,
    },
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Immutable inputs describing the build being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub package: String,
    pub build_number: u64,
    pub branch: String,
    /// Set when this build was itself started by a cascade.
    pub upstream: Option<TriggerParams>,
    /// Validate mechanics without contacting the CI provider.
    pub dry_run: bool,
}

impl BuildContext {
    pub fn new(package: impl Into<String>, build_number: u64, branch: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            build_number,
            branch: branch.into(),
            upstream: None,
            dry_run: false,
        }
    }

    pub fn with_upstream(mut self, package: impl Into<String>, build_number: u64) -> Self {
        self.upstream = Some(TriggerParams::new(package, build_number));
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read the context from the process environment.
    pub fn from_env() -> ContextResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the context through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ContextResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let package = get(ENV_PACKAGE).ok_or(ContextError::Missing(ENV_PACKAGE))?;
        let raw_build = get(ENV_BUILD_NUMBER).ok_or(ContextError::Missing(ENV_BUILD_NUMBER))?;
        let build_number = parse_build_number(ENV_BUILD_NUMBER, &raw_build)?;
        let branch = get(ENV_BRANCH).unwrap_or_else(|| "master".to_string());

        let upstream = match (get(ENV_UPSTREAM_PACKAGE), get(ENV_UPSTREAM_BUILD_NUMBER)) {
            (Some(name), Some(num)) => Some(TriggerParams::new(
                name,
                parse_build_number(ENV_UPSTREAM_BUILD_NUMBER, &num)?,
            )),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ContextError::IncompleteUpstream {
                    present: ENV_UPSTREAM_PACKAGE,
                    absent: ENV_UPSTREAM_BUILD_NUMBER,
                })
            }
            (None, Some(_)) => {
                return Err(ContextError::IncompleteUpstream {
                    present: ENV_UPSTREAM_BUILD_NUMBER,
                    absent: ENV_UPSTREAM_PACKAGE,
                })
            }
        };

        let dry_run = match get(ENV_DRY_RUN) {
            None => false,
            Some(v) => parse_flag(ENV_DRY_RUN, &v)?,
        };

        Ok(Self {
            package,
            build_number,
            branch,
            upstream,
            dry_run,
        })
    }

    /// The (package, build) pair that started the cascade this build is
    /// part of: the upstream trigger if any, otherwise this build.
    pub fn origin(&self) -> TriggerParams {
        self.upstream
            .clone()
            .unwrap_or_else(|| TriggerParams::new(self.package.clone(), self.build_number))
    }

    /// First build ever observed for the package.
    pub fn is_first_build(&self) -> bool {
        self.build_number <= 1
    }
}

fn parse_build_number(var: &'static str, raw: &str) -> ContextResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| ContextError::Invalid {
        var,
        value: raw.to_string(),
    })
}

pub(crate) fn parse_flag(var: &'static str, raw: &str) -> ContextResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ContextError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_without_upstream() {
        let ctx = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "alpha"),
            (ENV_BUILD_NUMBER, "10"),
            (ENV_BRANCH, "dev"),
        ]))
        .unwrap();
        assert_eq!(ctx.package, "alpha");
        assert_eq!(ctx.build_number, 10);
        assert_eq!(ctx.branch, "dev");
        assert!(ctx.upstream.is_none());
        assert!(!ctx.dry_run);
        assert_eq!(ctx.origin(), TriggerParams::new("alpha", 10));
    }

    #[test]
    fn test_origin_prefers_upstream() {
        let ctx = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "beta"),
            (ENV_BUILD_NUMBER, "4"),
            (ENV_UPSTREAM_PACKAGE, "alpha"),
            (ENV_UPSTREAM_BUILD_NUMBER, "10"),
        ]))
        .unwrap();
        assert_eq!(ctx.branch, "master");
        assert_eq!(ctx.origin(), TriggerParams::new("alpha", 10));
    }

    #[test]
    fn test_missing_build_number() {
        let err = BuildContext::from_lookup(lookup(&[(ENV_PACKAGE, "alpha")])).unwrap_err();
        assert_eq!(err, ContextError::Missing(ENV_BUILD_NUMBER));
    }

    #[test]
    fn test_invalid_build_number() {
        let err = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "alpha"),
            (ENV_BUILD_NUMBER, "ten"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ContextError::Invalid { .. }));
    }

    #[test]
    fn test_half_upstream_is_rejected() {
        let err = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "beta"),
            (ENV_BUILD_NUMBER, "4"),
            (ENV_UPSTREAM_PACKAGE, "alpha"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ContextError::IncompleteUpstream { .. }));
    }

    #[test]
    fn test_empty_upstream_counts_as_unset() {
        let ctx = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "beta"),
            (ENV_BUILD_NUMBER, "4"),
            (ENV_UPSTREAM_PACKAGE, ""),
            (ENV_UPSTREAM_BUILD_NUMBER, ""),
        ]))
        .unwrap();
        assert!(ctx.upstream.is_none());
    }

    #[test]
    fn test_dry_run_flag() {
        let ctx = BuildContext::from_lookup(lookup(&[
            (ENV_PACKAGE, "alpha"),
            (ENV_BUILD_NUMBER, "1"),
            (ENV_DRY_RUN, "true"),
        ]))
        .unwrap();
        assert!(ctx.dry_run);
        assert!(ctx.is_first_build());
    }
}

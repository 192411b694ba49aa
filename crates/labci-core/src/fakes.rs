//! In-memory fakes for the CI provider (testing only)
//!
//! Provides `MemoryCiProvider`, which satisfies the [`CiProvider`] contract
//! without any network access and records every call made against it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::*;

/// A call observed by [`MemoryCiProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    GetBuild {
        package: String,
        build_number: u64,
    },
    GetRecentBuilds {
        package: String,
    },
    TriggerBuild {
        package: String,
        branch: String,
        params: TriggerParams,
    },
}

/// In-memory CI provider backed by per-package build lists.
///
/// A successful trigger prepends a queued record (no start time) carrying
/// the trigger parameters to the package's history, the way a real provider
/// would list a freshly queued build.
#[derive(Debug, Default)]
pub struct MemoryCiProvider {
    builds: Mutex<HashMap<String, Vec<BuildRecord>>>,
    failing: Mutex<HashSet<String>>,
    failing_triggers: Mutex<HashSet<String>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl MemoryCiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a build of `package`. History is kept most recent first.
    pub fn add_build(&self, package: &str, record: BuildRecord) {
        let mut builds = self.builds.lock().unwrap();
        let list = builds.entry(package.to_string()).or_default();
        list.push(record);
        list.sort_by(|a, b| b.build_number.cmp(&a.build_number));
    }

    /// Make every call concerning `package` fail with an HTTP 500.
    pub fn fail_package(&self, package: &str) {
        self.failing.lock().unwrap().insert(package.to_string());
    }

    /// Make only trigger requests for `package` fail with an HTTP 500.
    /// History and single-build lookups keep answering.
    pub fn fail_triggers(&self, package: &str) {
        self.failing_triggers
            .lock()
            .unwrap()
            .insert(package.to_string());
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Packages that received a trigger request, in call order.
    pub fn triggered_packages(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::TriggerBuild { package, .. } => Some(package.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failing(&self, package: &str, endpoint: String) -> CiProviderResult<()> {
        if self.failing.lock().unwrap().contains(package) {
            return Err(server_error(endpoint));
        }
        Ok(())
    }
}

fn server_error(endpoint: String) -> CiProviderError {
    CiProviderError::Http {
        status: 500,
        endpoint,
        body: "internal server error".to_string(),
    }
}

#[async_trait]
impl CiProvider for MemoryCiProvider {
    async fn get_build(&self, package: &str, build_number: u64) -> CiProviderResult<BuildRecord> {
        self.record(ProviderCall::GetBuild {
            package: package.to_string(),
            build_number,
        });
        self.check_failing(package, format!("{package}/{build_number}"))?;
        let builds = self.builds.lock().unwrap();
        builds
            .get(package)
            .and_then(|list| list.iter().find(|b| b.build_number == build_number))
            .cloned()
            .ok_or_else(|| CiProviderError::BuildNotFound {
                package: package.to_string(),
                build_number,
            })
    }

    async fn get_recent_builds(&self, package: &str) -> CiProviderResult<Vec<BuildRecord>> {
        self.record(ProviderCall::GetRecentBuilds {
            package: package.to_string(),
        });
        self.check_failing(package, package.to_string())?;
        Ok(self
            .builds
            .lock()
            .unwrap()
            .get(package)
            .cloned()
            .unwrap_or_default())
    }

    async fn trigger_build(
        &self,
        package: &str,
        branch: &str,
        params: &TriggerParams,
    ) -> CiProviderResult<TriggerAck> {
        self.record(ProviderCall::TriggerBuild {
            package: package.to_string(),
            branch: branch.to_string(),
            params: params.clone(),
        });
        let endpoint = format!("{package}/tree/{branch}");
        if self.failing_triggers.lock().unwrap().contains(package) {
            return Err(server_error(endpoint));
        }
        self.check_failing(package, endpoint)?;

        let mut builds = self.builds.lock().unwrap();
        let list = builds.entry(package.to_string()).or_default();
        let build_number = list.iter().map(|b| b.build_number).max().unwrap_or(0) + 1;
        let mut queued = BuildRecord::new(build_number, "queued");
        queued.branch = Some(branch.to_string());
        queued.trigger_params = Some(params.clone());
        list.insert(0, queued);

        Ok(TriggerAck {
            package: package.to_string(),
            build_number: Some(build_number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let provider = MemoryCiProvider::new();
        provider.add_build("alpha", BuildRecord::new(1, "success"));
        provider.add_build("alpha", BuildRecord::new(3, "failed"));
        provider.add_build("alpha", BuildRecord::new(2, "success"));
        let history = provider.get_recent_builds("alpha").await.unwrap();
        let numbers: Vec<u64> = history.iter().map(|b| b.build_number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_trigger_queues_a_build() {
        let provider = MemoryCiProvider::new();
        provider.add_build("beta", BuildRecord::new(4, "success"));
        let ack = provider
            .trigger_build("beta", "master", &TriggerParams::new("alpha", 10))
            .await
            .unwrap();
        assert_eq!(ack.build_number, Some(5));
        let history = provider.get_recent_builds("beta").await.unwrap();
        assert_eq!(history[0].start_time, None);
        assert_eq!(
            history[0].trigger_params,
            Some(TriggerParams::new("alpha", 10))
        );
        assert_eq!(provider.triggered_packages(), vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_build_and_failing_package() {
        let provider = MemoryCiProvider::new();
        assert!(matches!(
            provider.get_build("alpha", 9).await,
            Err(CiProviderError::BuildNotFound { .. })
        ));
        provider.fail_package("alpha");
        assert!(matches!(
            provider.get_recent_builds("alpha").await,
            Err(CiProviderError::Http { status: 500, .. })
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_triggers_leave_history_readable() {
        let provider = MemoryCiProvider::new();
        provider.add_build("beta", BuildRecord::new(4, "success"));
        provider.fail_triggers("beta");

        assert_eq!(provider.get_recent_builds("beta").await.unwrap().len(), 1);
        assert!(matches!(
            provider
                .trigger_build("beta", "master", &TriggerParams::new("alpha", 10))
                .await,
            Err(CiProviderError::Http { status: 500, .. })
        ));
        // The rejected trigger queues nothing.
        assert_eq!(provider.get_recent_builds("beta").await.unwrap().len(), 1);
    }
}

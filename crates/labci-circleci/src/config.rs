//! CircleCI client configuration

use serde::{Deserialize, Serialize};

use crate::error::{CircleCiError, Result};

pub const DEFAULT_API_URL: &str = "https://circleci.com/api/v1.1";
pub const DEFAULT_VCS_TYPE: &str = "github";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECENT_LIMIT: u32 = 30;

pub const ENV_API_URL: &str = "CIRCLECI_API_URL";
pub const ENV_VCS_TYPE: &str = "CIRCLECI_VCS_TYPE";
pub const ENV_ORGANIZATION: &str = "CIRCLE_PROJECT_USERNAME";
pub const ENV_TOKEN: &str = "CIRCLECI_API_TOKEN";
pub const ENV_TIMEOUT: &str = "CIRCLECI_TIMEOUT_SECS";

/// Connection settings for the CircleCI v1.1 REST API.
#[derive(Clone, Serialize, Deserialize)]
pub struct CircleCiConfig {
    /// API base URL, without a trailing `/project`.
    pub api_url: String,
    /// VCS segment of project paths (`github`, `bitbucket`).
    pub vcs_type: String,
    /// Organisation or user owning every package repository.
    pub organization: String,
    /// API token sent in the `Circle-Token` header.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Number of builds fetched by a history lookup.
    pub recent_limit: u32,
}

// Hand-written so the token never reaches logs.
impl std::fmt::Debug for CircleCiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircleCiConfig")
            .field("api_url", &self.api_url)
            .field("vcs_type", &self.vcs_type)
            .field("organization", &self.organization)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("recent_limit", &self.recent_limit)
            .finish()
    }
}

impl CircleCiConfig {
    /// Config for `organization` with default endpoint and limits.
    pub fn new(organization: &str) -> Self {
        CircleCiConfig {
            api_url: DEFAULT_API_URL.to_string(),
            vcs_type: DEFAULT_VCS_TYPE.to_string(),
            organization: organization.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Create a new config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CircleCiConfig::from_env`] with an injected lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let organization =
            get(ENV_ORGANIZATION).ok_or(CircleCiError::MissingSetting(ENV_ORGANIZATION))?;
        let mut config = CircleCiConfig::new(&organization);
        if let Some(url) = get(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(vcs) = get(ENV_VCS_TYPE) {
            config.vcs_type = vcs;
        }
        config.token = get(ENV_TOKEN);
        if let Some(raw) = get(ENV_TIMEOUT) {
            config.timeout_secs = raw.parse().map_err(|_| CircleCiError::InvalidSetting {
                setting: ENV_TIMEOUT,
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }
}

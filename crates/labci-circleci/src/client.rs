//! [`CiProvider`] implementation over the CircleCI v1.1 REST API.

use std::time::Duration;

use async_trait::async_trait;
use labci_core::provider::{
    BuildRecord, CiProvider, CiProviderError, CiProviderResult, TriggerAck, TriggerParams,
};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::CircleCiConfig;
use crate::error::{CircleCiError, Result};
use crate::wire::{ApiBuild, TriggerRequest, TriggerResponse, WireError};

const TOKEN_HEADER: &str = "Circle-Token";
/// Longest slice of an error body kept in [`CiProviderError::Http`].
const BODY_EXCERPT_LEN: usize = 512;

/// CircleCI client. One project per package, all under one organisation.
pub struct CircleCiClient {
    config: CircleCiConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl CircleCiClient {
    pub fn new(config: CircleCiConfig) -> Result<Self> {
        let base = Url::parse(config.api_url.trim_end_matches('/')).map_err(|e| {
            CircleCiError::InvalidUrl {
                url: config.api_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(CircleCiError::InvalidUrl {
                url: config.api_url.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("labci/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(CircleCiClient {
            config,
            base,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(CircleCiConfig::from_env()?)
    }

    pub fn config(&self) -> &CircleCiConfig {
        &self.config
    }

    /// `{api}/project/{vcs}/{org}/{package}` followed by `extra` segments.
    pub fn project_url(&self, package: &str, extra: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend([
                    "project",
                    self.config.vcs_type.as_str(),
                    self.config.organization.as_str(),
                    package,
                ])
                .extend(extra);
        }
        url
    }

    pub fn build_url(&self, package: &str, build_number: u64) -> Url {
        self.project_url(package, &[build_number.to_string().as_str()])
    }

    pub fn recent_builds_url(&self, package: &str) -> Url {
        let mut url = self.project_url(package, &[]);
        url.query_pairs_mut()
            .append_pair("limit", &self.config.recent_limit.to_string());
        url
    }

    pub fn trigger_url(&self, package: &str, branch: &str) -> Url {
        self.project_url(package, &["tree", branch])
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match &self.config.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &Url,
    ) -> CiProviderResult<(StatusCode, Option<T>)> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| CiProviderError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CiProviderError::Transport(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Ok((status, None));
        }
        if !status.is_success() {
            return Err(CiProviderError::Http {
                status: status.as_u16(),
                endpoint: endpoint.path().to_string(),
                body: excerpt(&body),
            });
        }
        let decoded = serde_json::from_str(&body).map_err(|e| CiProviderError::Malformed {
            endpoint: endpoint.path().to_string(),
            detail: e.to_string(),
        })?;
        Ok((status, Some(decoded)))
    }
}

#[async_trait]
impl CiProvider for CircleCiClient {
    async fn get_build(&self, package: &str, build_number: u64) -> CiProviderResult<BuildRecord> {
        let url = self.build_url(package, build_number);
        debug!(package, build_number, "fetching build");
        match self
            .send::<ApiBuild>(self.http_client.get(url.clone()), &url)
            .await?
        {
            (_, Some(build)) => BuildRecord::try_from(build).map_err(|e| malformed(&url, e)),
            (_, None) => Err(CiProviderError::BuildNotFound {
                package: package.to_string(),
                build_number,
            }),
        }
    }

    async fn get_recent_builds(&self, package: &str) -> CiProviderResult<Vec<BuildRecord>> {
        let url = self.recent_builds_url(package);
        debug!(package, limit = self.config.recent_limit, "fetching recent builds");
        match self
            .send::<Vec<ApiBuild>>(self.http_client.get(url.clone()), &url)
            .await?
        {
            (_, Some(builds)) => builds
                .into_iter()
                .map(BuildRecord::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| malformed(&url, e)),
            (status, None) => Err(CiProviderError::Http {
                status: status.as_u16(),
                endpoint: url.path().to_string(),
                body: format!("project {package} not found"),
            }),
        }
    }

    async fn trigger_build(
        &self,
        package: &str,
        branch: &str,
        params: &TriggerParams,
    ) -> CiProviderResult<TriggerAck> {
        let url = self.trigger_url(package, branch);
        let request = self
            .http_client
            .post(url.clone())
            .json(&TriggerRequest::from(params));
        match self.send::<TriggerResponse>(request, &url).await? {
            (_, Some(ack)) => {
                info!(
                    package,
                    branch,
                    build_number = ?ack.build_num,
                    "triggered build"
                );
                Ok(TriggerAck {
                    package: package.to_string(),
                    build_number: ack.build_num,
                })
            }
            (status, None) => Err(CiProviderError::Http {
                status: status.as_u16(),
                endpoint: url.path().to_string(),
                body: format!("project {package} not found"),
            }),
        }
    }
}

fn malformed(endpoint: &Url, err: WireError) -> CiProviderError {
    CiProviderError::Malformed {
        endpoint: endpoint.path().to_string(),
        detail: err.to_string(),
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CircleCiClient {
        CircleCiClient::new(CircleCiConfig::new("lab")).unwrap()
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            client().build_url("alpha", 10).as_str(),
            "https://circleci.com/api/v1.1/project/github/lab/alpha/10"
        );
    }

    #[test]
    fn test_recent_builds_url_is_bounded() {
        let url = client().recent_builds_url("alpha");
        assert_eq!(url.path(), "/api/v1.1/project/github/lab/alpha");
        assert_eq!(url.query(), Some("limit=30"));
    }

    #[test]
    fn test_trigger_url_escapes_branch() {
        let url = client().trigger_url("beta", "feature/io");
        assert_eq!(url.path(), "/api/v1.1/project/github/lab/beta/tree/feature%2Fio");
    }

    #[test]
    fn test_trailing_slash_in_api_url() {
        let config = CircleCiConfig::new("lab").with_api_url("http://localhost:9000/api/v1.1/");
        let client = CircleCiClient::new(config).unwrap();
        assert_eq!(
            client.build_url("alpha", 2).as_str(),
            "http://localhost:9000/api/v1.1/project/github/lab/alpha/2"
        );
    }

    #[test]
    fn test_invalid_api_url_is_rejected() {
        let config = CircleCiConfig::new("lab").with_api_url("not a url");
        assert!(matches!(
            CircleCiClient::new(config),
            Err(CircleCiError::InvalidUrl { .. })
        ));
        let config = CircleCiConfig::new("lab").with_api_url("mailto:ci@lab.example.org");
        assert!(matches!(
            CircleCiClient::new(config),
            Err(CircleCiError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_excerpt_truncates_long_bodies() {
        let long = "x".repeat(BODY_EXCERPT_LEN + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), BODY_EXCERPT_LEN + 3);
        assert_eq!(excerpt("  short \n"), "short");
    }

    #[test]
    fn test_wire_rejection_is_malformed() {
        let url = client().build_url("beta", 5);
        let err = malformed(&url, WireError::MissingStatus { build_num: 5 });
        assert_eq!(
            err,
            CiProviderError::Malformed {
                endpoint: "/api/v1.1/project/github/lab/beta/5".to_string(),
                detail: "build 5 has no status".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let config = CircleCiConfig::new("lab").with_api_url("http://127.0.0.1:9/api/v1.1");
        let client = CircleCiClient::new(config).unwrap();
        let err = client.get_recent_builds("alpha").await.unwrap_err();
        assert!(matches!(err, CiProviderError::Transport(_)));
    }
}

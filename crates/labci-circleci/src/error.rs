//! Error types for labci-circleci

use thiserror::Error;

/// Errors raised while setting up a CircleCI client.
#[derive(Error, Debug)]
pub enum CircleCiError {
    /// A required setting is absent.
    #[error("missing CircleCI setting: {0}")]
    MissingSetting(&'static str),

    /// The API base URL cannot be used to build endpoint paths.
    #[error("invalid CircleCI API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A setting has a value that cannot be used.
    #[error("invalid value for {setting}: {value:?}")]
    InvalidSetting { setting: &'static str, value: String },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for CircleCiError {
    fn from(err: reqwest::Error) -> Self {
        CircleCiError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CircleCiError>;

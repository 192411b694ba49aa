//! Error types for report parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading structured test reports.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The markup itself could not be parsed.
    #[error("malformed report markup at byte {position}: {detail}")]
    Markup { position: u64, detail: String },

    /// The report ended while elements were still open.
    #[error("report ended inside <{element}>")]
    Truncated { element: String },

    /// A test case lacks a required attribute.
    #[error("test case is missing required attribute '{attribute}'")]
    MissingAttribute { attribute: &'static str },

    /// An attribute value could not be interpreted.
    #[error("invalid value {value:?} for attribute '{attribute}'")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    /// The report glob is unusable.
    #[error("invalid report pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Markup {
            position: 0,
            detail: err.to_string(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Markup {
            position: 0,
            detail: err.to_string(),
        }
    }
}

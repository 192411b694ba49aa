//! CircleCI provider for labci
//!
//! Implements [`labci_core::CiProvider`] against the CircleCI v1.1 REST API:
//!
//! - `GET  project/:vcs/:org/:package/:build_num`: one build
//! - `GET  project/:vcs/:org/:package?limit=N`: recent builds, newest first
//! - `POST project/:vcs/:org/:package/tree/:branch`: trigger a build with
//!   `UPSTREAM_REPONAME` / `UPSTREAM_BUILD_NUM` build parameters
//!
//! # Example
//!
//! ```ignore
//! let client = CircleCiClient::from_env()?;
//! let record = client.get_build("alpha", 10).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod wire;

pub use client::CircleCiClient;
pub use config::CircleCiConfig;
pub use error::{CircleCiError, Result};

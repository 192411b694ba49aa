//! labci Core Library
//!
//! Build-result classification and downstream cascade logic for lab CI
//! workflows:
//!
//! - [`results`]: parse JUnit-style reports into a uniform result model
//! - [`status`]: classify a build against the prior build's status
//! - [`graph`]: package dependency graph, cycle detection, DOT export
//! - [`cascade`]: decide and issue downstream build triggers
//!
//! External services are reached only through the [`provider::CiProvider`]
//! trait.

pub mod cascade;
pub mod config;
pub mod context;
pub mod fakes;
pub mod graph;
pub mod obs;
pub mod provider;
pub mod results;
pub mod status;
pub mod telemetry;

pub use cascade::{already_queued, CascadeDispatcher, CascadeError, CascadeOutcome, SkipReason};
pub use config::{DispatchMode, LabConfig};
pub use context::{BuildContext, ContextError};
pub use graph::{read_downstream_dependencies, scan_packages, DependencyGraph, GraphError};
pub use obs::BuildSpan;
pub use provider::{
    BuildRecord, CiProvider, CiProviderError, CiProviderResult, CommitInfo, TriggerAck,
    TriggerParams,
};
pub use results::{
    parse_reports, OutcomeKind, ParseError, ParsedReports, ReportPattern, TestCaseResult,
    TestResults,
};
pub use status::{
    BuildOutcome, ClassificationError, Notification, StatusClassifier, StatusVector,
};
pub use telemetry::init_tracing;

/// labci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Structured observability hooks for build evaluation.
//!
//! This module provides:
//! - Build-scoped tracing spans via the `BuildSpan` RAII guard
//! - Emission functions for key events: report parsing, classification, cascade decisions
//!
//! Filter with `RUST_LOG`; pass `--json` to the CLI for JSON lines.

use std::path::Path;

use tracing::{info, warn};

use crate::cascade::{CascadeError, SkipReason};
use crate::context::BuildContext;
use crate::provider::TriggerParams;
use crate::results::ParseError;
use crate::status::StatusVector;

/// RAII guard that enters a build-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = BuildSpan::enter(&ctx);
/// // every event below is tagged with package and build_number
/// ```
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    pub fn enter(ctx: &BuildContext) -> Self {
        let span = tracing::info_span!(
            "labci.build",
            package = %ctx.package,
            build_number = ctx.build_number,
            dry_run = ctx.dry_run,
        );
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_report_parsed(path: &Path, variant: &str, cases: usize) {
    info!(event = "report.parsed", path = %path.display(), variant = %variant, cases = cases);
}

/// Warning: a report was skipped because it could not be parsed.
pub fn emit_report_parse_failed(path: &Path, error: &ParseError) {
    warn!(event = "report.parse_failed", path = %path.display(), error = %error);
}

pub fn emit_build_classified(ctx: &BuildContext, status: &StatusVector) {
    info!(
        event = "build.classified",
        package = %ctx.package,
        build_number = ctx.build_number,
        is_fixed = status.is_fixed,
        is_old_error = status.is_old_error,
        is_new_error = status.is_new_error,
        is_other_error = status.is_other_error,
        is_new_downstream_error = status.is_new_downstream_error,
    );
}

pub fn emit_dependent_triggered(dependent: &str, origin: &TriggerParams) {
    info!(
        event = "cascade.triggered",
        dependent = %dependent,
        origin_package = %origin.upstream_package,
        origin_build_number = origin.upstream_build_number,
    );
}

pub fn emit_dependent_skipped(dependent: &str, reason: &SkipReason) {
    info!(event = "cascade.skipped", dependent = %dependent, reason = ?reason);
}

pub fn emit_dependent_failed(dependent: &str, error: &CascadeError) {
    warn!(event = "cascade.failed", dependent = %dependent, error = %error);
}

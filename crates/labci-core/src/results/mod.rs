//! Test results: the in-memory model and the report parser that fills it.
//!
//! - [`model::TestResults`] / [`model::TestCaseResult`]: uniform result model
//! - [`parser::parse_reports`]: aggregate every report matching a glob
//! - [`pattern::ReportPattern`]: report filename globs and variant tags

pub mod error;
pub mod model;
pub mod parser;
pub mod pattern;

pub use error::{ParseError, ParseResult};
pub use model::{
    Outcome, OutcomeDetail, OutcomeKind, ResultsSummary, TestCaseResult, TestResults,
};
pub use parser::{parse_report, parse_report_file, parse_reports, ParsedReports};
pub use pattern::ReportPattern;

//! In-memory model of one build's test outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    Skipped,
    Error,
    Failure,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Passed,
        OutcomeKind::Skipped,
        OutcomeKind::Error,
        OutcomeKind::Failure,
    ];

    /// Error and Failure break a build; Passed and Skipped do not.
    pub fn is_broken(self) -> bool {
        matches!(self, OutcomeKind::Error | OutcomeKind::Failure)
    }
}

/// Details carried by a non-passed case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDetail {
    /// Category reported by the runner, e.g. the exception type.
    pub subtype: Option<String>,
    /// Short message.
    pub message: Option<String>,
    /// Long-form trace or reason.
    pub details: Option<String>,
}

/// Outcome plus the detail that only exists when the case did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Skipped(OutcomeDetail),
    Error(OutcomeDetail),
    Failure(OutcomeDetail),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Passed => OutcomeKind::Passed,
            Outcome::Skipped(_) => OutcomeKind::Skipped,
            Outcome::Error(_) => OutcomeKind::Error,
            Outcome::Failure(_) => OutcomeKind::Failure,
        }
    }

    pub fn detail(&self) -> Option<&OutcomeDetail> {
        match self {
            Outcome::Passed => None,
            Outcome::Skipped(d) | Outcome::Error(d) | Outcome::Failure(d) => Some(d),
        }
    }

    /// Build a non-passed outcome of `kind`. A `Passed` kind drops the detail.
    pub fn with_detail(kind: OutcomeKind, detail: OutcomeDetail) -> Self {
        match kind {
            OutcomeKind::Passed => Outcome::Passed,
            OutcomeKind::Skipped => Outcome::Skipped(detail),
            OutcomeKind::Error => Outcome::Error(detail),
            OutcomeKind::Failure => Outcome::Failure(detail),
        }
    }
}

/// One test case's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Qualifying class or suite name.
    pub classname: String,
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Runtime variant the case ran under, e.g. an interpreter version.
    pub variant: String,
    /// Seconds.
    pub duration: f64,
    pub outcome: Outcome,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl TestCaseResult {
    /// A passed case with no optional fields set.
    pub fn passed(
        classname: impl Into<String>,
        name: impl Into<String>,
        variant: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            classname: classname.into(),
            name: name.into(),
            file: None,
            line: None,
            variant: variant.into(),
            duration,
            outcome: Outcome::Passed,
            stdout: None,
            stderr: None,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }

    /// `classname.name`, the identity most runners print.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.classname, self.name)
    }
}

/// Every case of one build, across all parsed report files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    cases: Vec<TestCaseResult>,
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cases(cases: Vec<TestCaseResult>) -> Self {
        Self { cases }
    }

    pub fn push(&mut self, case: TestCaseResult) {
        self.cases.push(case);
    }

    pub fn extend(&mut self, other: TestResults) {
        self.cases.extend(other.cases);
    }

    pub fn cases(&self) -> &[TestCaseResult] {
        &self.cases
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.cases.iter().filter(|c| c.kind() == kind).count()
    }

    /// Count of every kind, including kinds with zero cases.
    pub fn counts_by_kind(&self) -> BTreeMap<OutcomeKind, usize> {
        let mut counts: BTreeMap<OutcomeKind, usize> =
            OutcomeKind::ALL.iter().map(|k| (*k, 0)).collect();
        for case in &self.cases {
            *counts.entry(case.kind()).or_default() += 1;
        }
        counts
    }

    /// No Error and no Failure case.
    pub fn passed(&self) -> bool {
        !self.cases.iter().any(|c| c.kind().is_broken())
    }

    /// Distinct variants in first-seen order.
    pub fn variants(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for case in &self.cases {
            if !seen.contains(&case.variant.as_str()) {
                seen.push(case.variant.as_str());
            }
        }
        seen
    }

    /// Cases that ran under `variant`.
    pub fn for_variant(&self, variant: &str) -> TestResults {
        TestResults::from_cases(
            self.cases
                .iter()
                .filter(|c| c.variant == variant)
                .cloned()
                .collect(),
        )
    }

    pub fn summary(&self) -> ResultsSummary {
        ResultsSummary {
            total: self.total(),
            passed: self.count(OutcomeKind::Passed),
            skipped: self.count(OutcomeKind::Skipped),
            errors: self.count(OutcomeKind::Error),
            failures: self.count(OutcomeKind::Failure),
            duration: self.cases.iter().map(|c| c.duration).sum(),
        }
    }
}

/// Serialisable count summary of a [`TestResults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failures: usize,
    /// Sum of case durations in seconds.
    pub duration: f64,
}

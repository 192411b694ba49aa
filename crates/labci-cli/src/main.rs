//! labci - post-build hook for lab CI workflows
//!
//! ## Commands
//!
//! - `classify`: parse test reports and classify the build against the prior build
//! - `cascade`: trigger builds of downstream packages after a clean build
//! - `post-build`: `classify`, then `cascade`
//! - `graph`: scan a directory of packages and check the cascade graph for cycles
//!
//! The build context is read from the CI environment (`CIRCLE_PROJECT_REPONAME`,
//! `CIRCLE_BUILD_NUM`, `CIRCLE_BRANCH`, `UPSTREAM_REPONAME`, `UPSTREAM_BUILD_NUM`).
//! The exit code is non-zero when classification or any part of the cascade
//! fails, after the partial results have been printed.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use labci_circleci::CircleCiClient;
use labci_core::results::ResultsSummary;
use labci_core::{
    parse_reports, read_downstream_dependencies, scan_packages, BuildContext, BuildOutcome,
    BuildSpan, CascadeDispatcher, CiProvider, LabConfig, Notification, ParsedReports,
    ReportPattern, SkipReason, StatusClassifier, StatusVector,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "labci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build classification and downstream cascades for lab CI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Classify and cascade without contacting the CI provider
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse test reports and classify the build against the prior build
    Classify {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Trigger builds of downstream packages after a clean build
    Cascade {
        /// Package checkout (default: current directory)
        #[arg(long, default_value = ".")]
        package_dir: PathBuf,
    },

    /// Classify the build, then cascade to downstream packages
    PostBuild {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Scan a directory of packages and check the cascade graph
    Graph {
        /// Directory holding one subdirectory per package
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Write the graph in Graphviz DOT format to this file
        #[arg(long)]
        dot: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
    /// Package checkout (default: current directory)
    #[arg(long, default_value = ".")]
    package_dir: PathBuf,

    /// Installing the package failed
    #[arg(long)]
    install_error: bool,

    /// The test runner failed
    #[arg(long)]
    test_error: bool,

    /// Another pipeline step failed
    #[arg(long)]
    other_error: bool,
}

impl BuildArgs {
    fn outcome(&self, parsed: &ParsedReports) -> BuildOutcome {
        BuildOutcome {
            results: parsed.results.clone(),
            install_error: self.install_error,
            test_error: self.test_error,
            other_error: self.other_error,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    labci_core::init_tracing(cli.json, level);

    let config = LabConfig::from_env().context("invalid labci configuration")?;

    match cli.command {
        Commands::Graph { root, dot } => {
            let report = cmd_graph(&root, &config, dot.as_deref())?;
            print_graph(&report, cli.json)?;
            if let Some(cycle) = report.cycle {
                bail!("dependency cycle: {}", cycle.join(" -> "));
            }
            Ok(())
        }
        Commands::Classify { build } => {
            let ctx = build_context(cli.dry_run)?;
            let _span = BuildSpan::enter(&ctx);
            let provider = provider()?;
            let parsed = load_results(&build.package_dir, &config)?;
            let report = cmd_classify(provider, &ctx, &build, &parsed).await?;
            print_json_or(&report, cli.json, || render_classify(&report))
        }
        Commands::Cascade { package_dir } => {
            let ctx = build_context(cli.dry_run)?;
            let _span = BuildSpan::enter(&ctx);
            let provider = provider()?;
            let parsed = load_results(&package_dir, &config)?;
            let report = cmd_cascade(provider, &ctx, &config, &package_dir, &parsed).await?;
            print_json_or(&report, cli.json, || render_cascade(&report))?;
            report.ensure_success()
        }
        Commands::PostBuild { build } => {
            let ctx = build_context(cli.dry_run)?;
            let _span = BuildSpan::enter(&ctx);
            let provider = provider()?;
            let parsed = load_results(&build.package_dir, &config)?;
            let report = cmd_post_build(provider, &ctx, &config, &build, &parsed).await?;
            print_json_or(&report, cli.json, || render_post_build(&report))?;
            report.ensure_success()
        }
    }
}

fn build_context(dry_run: bool) -> Result<BuildContext> {
    let ctx = BuildContext::from_env()
        .context("failed to read the build context from the CI environment")?;
    Ok(if dry_run { ctx.with_dry_run(true) } else { ctx })
}

fn provider() -> Result<Arc<dyn CiProvider>> {
    let client =
        CircleCiClient::from_env().context("failed to configure the CircleCI client")?;
    Ok(Arc::new(client))
}

/// Parse every report of the package; unreadable reports are logged and listed.
fn load_results(package_dir: &Path, config: &LabConfig) -> Result<ParsedReports> {
    let pattern = ReportPattern::new(&config.report_pattern)
        .with_context(|| format!("invalid report pattern: {}", config.report_pattern))?;
    let report_dir = package_dir.join(&config.report_dir);
    let parsed = parse_reports(&report_dir, &pattern)
        .with_context(|| format!("failed to read test reports in {}", report_dir.display()))?;
    info!(
        files = parsed.files_matched,
        cases = parsed.results.total(),
        skipped_files = parsed.failures.len(),
        "loaded test reports"
    );
    Ok(parsed)
}

#[derive(Debug, Serialize)]
struct ReportFailure {
    path: PathBuf,
    error: String,
}

#[derive(Debug, Serialize)]
struct ClassifyReport {
    package: String,
    build_number: u64,
    summary: ResultsSummary,
    report_failures: Vec<ReportFailure>,
    status: StatusVector,
    notifications: Vec<Notification>,
}

async fn cmd_classify(
    provider: Arc<dyn CiProvider>,
    ctx: &BuildContext,
    build: &BuildArgs,
    parsed: &ParsedReports,
) -> Result<ClassifyReport> {
    let outcome = build.outcome(parsed);
    let status = StatusClassifier::new(provider)
        .classify(&outcome, ctx)
        .await
        .with_context(|| format!("failed to classify {}#{}", ctx.package, ctx.build_number))?;

    Ok(ClassifyReport {
        package: ctx.package.clone(),
        build_number: ctx.build_number,
        summary: parsed.results.summary(),
        report_failures: parsed
            .failures
            .iter()
            .map(|(path, err)| ReportFailure {
                path: path.clone(),
                error: err.to_string(),
            })
            .collect(),
        status,
        notifications: status.notifications(),
    })
}

#[derive(Debug, Serialize)]
struct SkippedDependent {
    dependent: String,
    #[serde(flatten)]
    reason: SkipReason,
}

#[derive(Debug, Serialize)]
struct FailedDependent {
    dependent: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct CascadeReport {
    origin_package: String,
    origin_build_number: u64,
    dependents: Vec<String>,
    triggered: Vec<String>,
    skipped: Vec<SkippedDependent>,
    failures: Vec<FailedDependent>,
}

impl CascadeReport {
    fn ensure_success(&self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.failures.iter().map(|f| f.dependent.as_str()).collect();
        bail!("cascade failed for: {}", names.join(", "))
    }
}

async fn cmd_cascade(
    provider: Arc<dyn CiProvider>,
    ctx: &BuildContext,
    config: &LabConfig,
    package_dir: &Path,
    parsed: &ParsedReports,
) -> Result<CascadeReport> {
    let dependents = read_downstream_dependencies(package_dir, config)
        .context("failed to read downstream dependencies")?;
    let origin = ctx.origin();

    let outcome = CascadeDispatcher::new(provider, config.default_branch.clone())
        .with_mode(config.dispatch_mode)
        .trigger(ctx, &parsed.results, &dependents)
        .await
        .with_context(|| {
            format!(
                "cascade from {}#{} aborted",
                origin.upstream_package, origin.upstream_build_number
            )
        })?;

    for (dependent, err) in &outcome.failures {
        warn!(dependent = %dependent, error = %err, "dependent not triggered");
    }

    Ok(CascadeReport {
        origin_package: origin.upstream_package,
        origin_build_number: origin.upstream_build_number,
        dependents,
        triggered: outcome.triggered,
        skipped: outcome
            .skipped
            .into_iter()
            .map(|(dependent, reason)| SkippedDependent { dependent, reason })
            .collect(),
        failures: outcome
            .failures
            .into_iter()
            .map(|(dependent, err)| FailedDependent {
                dependent,
                error: err.to_string(),
            })
            .collect(),
    })
}

const NO_RESULTS_FAILURE: &str = "a build step failed before any test results were written";

#[derive(Debug, Serialize)]
struct PostBuildReport {
    classification: Option<ClassifyReport>,
    classification_error: Option<String>,
    /// Set when the build broke outside the test suite; no cascade is run.
    build_error: Option<String>,
    cascade: Option<CascadeReport>,
    cascade_error: Option<String>,
}

impl PostBuildReport {
    fn ensure_success(&self) -> Result<()> {
        if let Some(err) = &self.classification_error {
            bail!("classification failed: {err}");
        }
        if let Some(err) = &self.build_error {
            bail!("{err}");
        }
        if let Some(err) = &self.cascade_error {
            bail!("{err}");
        }
        match &self.cascade {
            Some(cascade) => cascade.ensure_success(),
            None => Ok(()),
        }
    }
}

/// A failed classification is reported but does not stop the cascade. A build
/// that broke before writing any test results is never cascaded from.
async fn cmd_post_build(
    provider: Arc<dyn CiProvider>,
    ctx: &BuildContext,
    config: &LabConfig,
    build: &BuildArgs,
    parsed: &ParsedReports,
) -> Result<PostBuildReport> {
    let (classification, classification_error) =
        match cmd_classify(Arc::clone(&provider), ctx, build, parsed).await {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(format!("{err:#}"))),
        };

    if build.outcome(parsed).is_other_error() {
        warn!(
            install_error = build.install_error,
            test_error = build.test_error,
            other_error = build.other_error,
            "no test results after a failed build step, not cascading"
        );
        return Ok(PostBuildReport {
            classification,
            classification_error,
            build_error: Some(NO_RESULTS_FAILURE.to_string()),
            cascade: None,
            cascade_error: None,
        });
    }

    let (cascade, cascade_error) =
        match cmd_cascade(provider, ctx, config, &build.package_dir, parsed).await {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(format!("{err:#}"))),
        };
    Ok(PostBuildReport {
        classification,
        classification_error,
        build_error: None,
        cascade,
        cascade_error,
    })
}

#[derive(Debug, Serialize)]
struct GraphReport {
    packages: Vec<String>,
    edges: Vec<(String, String)>,
    order: Option<Vec<String>>,
    cycle: Option<Vec<String>>,
    dot: Option<PathBuf>,
}

fn cmd_graph(root: &Path, config: &LabConfig, dot: Option<&Path>) -> Result<GraphReport> {
    let graph = scan_packages(root, config)
        .with_context(|| format!("failed to scan packages under {}", root.display()))?;
    if let Some(path) = dot {
        graph
            .write_dot(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    let cycle = graph.find_cycle();
    Ok(GraphReport {
        packages: graph.packages().map(str::to_string).collect(),
        edges: graph
            .edges()
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
        order: graph.topological_order().ok(),
        cycle,
        dot: dot.map(Path::to_path_buf),
    })
}

fn print_json_or<T: Serialize>(value: &T, json: bool, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn print_graph(report: &GraphReport, json: bool) -> Result<()> {
    print_json_or(report, json, || render_graph(report))
}

fn render_classify(report: &ClassifyReport) -> String {
    let mut out = format!(
        "{}#{}: {} cases ({} passed, {} skipped, {} errors, {} failures)",
        report.package,
        report.build_number,
        report.summary.total,
        report.summary.passed,
        report.summary.skipped,
        report.summary.errors,
        report.summary.failures
    );
    for failure in &report.report_failures {
        out.push_str(&format!(
            "\n  unreadable report {}: {}",
            failure.path.display(),
            failure.error
        ));
    }
    if report.notifications.is_empty() {
        out.push_str("\nStatus: nothing to report");
    } else {
        let names: Vec<String> = report
            .notifications
            .iter()
            .map(|n| format!("{n:?}"))
            .collect();
        out.push_str(&format!("\nStatus: {}", names.join(", ")));
    }
    out
}

fn render_cascade(report: &CascadeReport) -> String {
    let mut out = format!(
        "Cascade from {}#{} to {} dependent(s)",
        report.origin_package,
        report.origin_build_number,
        report.dependents.len()
    );
    for dependent in &report.triggered {
        out.push_str(&format!("\n  + {dependent} triggered"));
    }
    for skipped in &report.skipped {
        out.push_str(&format!("\n  = {} skipped ({:?})", skipped.dependent, skipped.reason));
    }
    for failed in &report.failures {
        out.push_str(&format!("\n  ! {} failed: {}", failed.dependent, failed.error));
    }
    out
}

fn render_post_build(report: &PostBuildReport) -> String {
    let mut sections = Vec::new();
    match (&report.classification, &report.classification_error) {
        (Some(classification), _) => sections.push(render_classify(classification)),
        (None, Some(err)) => sections.push(format!("Classification failed: {err}")),
        (None, None) => {}
    }
    if let Some(err) = &report.build_error {
        sections.push(format!("Build failed: {err}; no cascade"));
    }
    match (&report.cascade, &report.cascade_error) {
        (Some(cascade), _) => sections.push(render_cascade(cascade)),
        (None, Some(err)) => sections.push(format!("Cascade failed: {err}")),
        (None, None) => {}
    }
    sections.join("\n\n")
}

fn render_graph(report: &GraphReport) -> String {
    let mut out = format!(
        "{} package(s), {} edge(s)",
        report.packages.len(),
        report.edges.len()
    );
    for (from, to) in &report.edges {
        out.push_str(&format!("\n  {from} -> {to}"));
    }
    match (&report.order, &report.cycle) {
        (_, Some(cycle)) => out.push_str(&format!("\nCycle: {}", cycle.join(" -> "))),
        (Some(order), None) => out.push_str(&format!("\nBuild order: {}", order.join(", "))),
        (None, None) => {}
    }
    if let Some(path) = &report.dot {
        out.push_str(&format!("\nDOT written to {}", path.display()));
    }
    out
}

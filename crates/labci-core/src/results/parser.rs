//! JUnit-style XML report parsing.
//!
//! Each report holds one top-level `<testsuite>` (optionally wrapped in
//! `<testsuites>`) with zero or more `<testcase>` elements. A case's outcome
//! comes from its first marker child by precedence
//! `skipped` > `error` > `failure`; a case without markers passed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::obs;
use crate::results::error::{ParseError, ParseResult};
use crate::results::model::{Outcome, OutcomeDetail, OutcomeKind, TestCaseResult, TestResults};
use crate::results::pattern::ReportPattern;

/// Outcome of parsing every report matched by a pattern.
#[derive(Debug, Default)]
pub struct ParsedReports {
    /// Cases from every report that parsed.
    pub results: TestResults,
    /// Report files that were skipped and why.
    pub failures: Vec<(PathBuf, ParseError)>,
    /// Number of files matched by the pattern.
    pub files_matched: usize,
}

impl ParsedReports {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parse every file in `dir` whose name matches `pattern` and aggregate the
/// cases into one [`TestResults`].
///
/// A missing directory or a pattern with no matches yields empty results.
/// A report that fails to parse is skipped with a warning and recorded in
/// [`ParsedReports::failures`]; other reports are still parsed.
pub fn parse_reports(dir: &Path, pattern: &ReportPattern) -> ParseResult<ParsedReports> {
    let mut parsed = ParsedReports::default();
    for (path, variant) in matching_reports(dir, pattern)? {
        parsed.files_matched += 1;
        match parse_report_file(&path, &variant) {
            Ok(results) => {
                obs::emit_report_parsed(&path, &variant, results.total());
                parsed.results.extend(results);
            }
            Err(err) => {
                obs::emit_report_parse_failed(&path, &err);
                parsed.failures.push((path, err));
            }
        }
    }
    Ok(parsed)
}

/// Report files in `dir` matching `pattern`, with their variant tags, sorted
/// by file name.
pub fn matching_reports(dir: &Path, pattern: &ReportPattern) -> ParseResult<Vec<(PathBuf, String)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "report directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ParseError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ParseError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(variant) = pattern.variant_of(name) {
            found.push((path.clone(), variant));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Parse a single report file, tagging every case with `variant`.
pub fn parse_report_file(path: &Path, variant: &str) -> ParseResult<TestResults> {
    let xml = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_report(&xml, variant)
}

/// Where text content is currently being collected.
#[derive(Debug, Clone, Copy)]
enum Sink {
    Marker(usize),
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct Marker {
    kind: OutcomeKind,
    detail: OutcomeDetail,
    text: String,
}

#[derive(Debug)]
struct CaseBuilder {
    classname: String,
    name: String,
    file: Option<String>,
    line: Option<u32>,
    duration: f64,
    markers: Vec<Marker>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl CaseBuilder {
    fn from_element(e: &BytesStart<'_>) -> ParseResult<Self> {
        let mut classname = None;
        let mut name = None;
        let mut time = None;
        let mut file = None;
        let mut line = None;

        for attr in e.attributes() {
            let attr = attr?;
            let value = attr.unescape_value()?.into_owned();
            match attr.key.as_ref() {
                b"classname" => classname = Some(value),
                b"name" => name = Some(value),
                b"time" => time = Some(value),
                b"file" => file = Some(value),
                b"line" => line = Some(parse_line(&value)?),
                _ => {}
            }
        }

        let classname = classname.ok_or(ParseError::MissingAttribute {
            attribute: "classname",
        })?;
        let name = name.ok_or(ParseError::MissingAttribute { attribute: "name" })?;
        let time = time.ok_or(ParseError::MissingAttribute { attribute: "time" })?;

        Ok(Self {
            classname,
            name,
            file,
            line,
            duration: parse_duration(&time)?,
            markers: Vec::new(),
            stdout: None,
            stderr: None,
        })
    }

    fn push_marker(&mut self, kind: OutcomeKind, e: &BytesStart<'_>) -> ParseResult<usize> {
        let mut detail = OutcomeDetail::default();
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"type" => detail.subtype = Some(attr.unescape_value()?.into_owned()),
                b"message" => detail.message = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        self.markers.push(Marker {
            kind,
            detail,
            text: String::new(),
        });
        Ok(self.markers.len() - 1)
    }

    fn append(&mut self, sink: Sink, text: &str) {
        match sink {
            Sink::Marker(idx) => self.markers[idx].text.push_str(text),
            Sink::Stdout => self.stdout.get_or_insert_with(String::new).push_str(text),
            Sink::Stderr => self.stderr.get_or_insert_with(String::new).push_str(text),
        }
    }

    fn finish(self, variant: &str) -> TestCaseResult {
        let mut markers = self.markers;
        let position = [OutcomeKind::Skipped, OutcomeKind::Error, OutcomeKind::Failure]
            .into_iter()
            .find_map(|kind| markers.iter().position(|m| m.kind == kind));
        let chosen = position.map(|idx| markers.swap_remove(idx));

        let outcome = match chosen {
            None => Outcome::Passed,
            Some(marker) => {
                let mut detail = marker.detail;
                if !marker.text.is_empty() {
                    detail.details = Some(marker.text);
                }
                Outcome::with_detail(marker.kind, detail)
            }
        };

        TestCaseResult {
            classname: self.classname,
            name: self.name,
            file: self.file,
            line: self.line,
            variant: variant.to_string(),
            duration: self.duration,
            outcome,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

fn marker_kind(name: &[u8]) -> Option<OutcomeKind> {
    match name {
        b"skipped" => Some(OutcomeKind::Skipped),
        b"error" => Some(OutcomeKind::Error),
        b"failure" => Some(OutcomeKind::Failure),
        _ => None,
    }
}

fn parse_duration(raw: &str) -> ParseResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ParseError::InvalidAttribute {
            attribute: "time",
            value: raw.to_string(),
        }),
    }
}

/// Line numbers are sometimes written as floats (`12.0`); truncate them.
fn parse_line(raw: &str) -> ParseResult<u32> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<u32>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v <= f64::from(u32::MAX) => Ok(v.trunc() as u32),
        _ => Err(ParseError::InvalidAttribute {
            attribute: "line",
            value: raw.to_string(),
        }),
    }
}

/// Parse one report document, tagging every case with `variant`.
pub fn parse_report(xml: &str, variant: &str) -> ParseResult<TestResults> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut results = TestResults::new();
    let mut open: Vec<String> = Vec::new();
    let mut case: Option<CaseBuilder> = None;
    let mut sink: Option<(Sink, usize)> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Markup {
            position: reader.buffer_position() as u64,
            detail: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                open.push(String::from_utf8_lossy(name).into_owned());
                let depth = open.len();
                if name == b"testcase" {
                    case = Some(CaseBuilder::from_element(&e)?);
                } else if let (Some(builder), None) = (case.as_mut(), sink) {
                    if let Some(kind) = marker_kind(name) {
                        let idx = builder.push_marker(kind, &e)?;
                        sink = Some((Sink::Marker(idx), depth));
                    } else if name == b"system-out" {
                        sink = Some((Sink::Stdout, depth));
                    } else if name == b"system-err" {
                        sink = Some((Sink::Stderr, depth));
                    }
                }
            }
            Event::Empty(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"testcase" {
                    results.push(CaseBuilder::from_element(&e)?.finish(variant));
                } else if let (Some(builder), None) = (case.as_mut(), sink) {
                    if let Some(kind) = marker_kind(name) {
                        builder.push_marker(kind, &e)?;
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(builder), Some((target, _))) = (case.as_mut(), sink) {
                    builder.append(target, &t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let (Some(builder), Some((target, _))) = (case.as_mut(), sink) {
                    builder.append(target, &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(e) => {
                let depth = open.len();
                if matches!(sink, Some((_, d)) if d == depth) {
                    sink = None;
                }
                if e.local_name().as_ref() == b"testcase" {
                    if let Some(builder) = case.take() {
                        results.push(builder.finish(variant));
                    }
                }
                open.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(element) = open.pop() {
        return Err(ParseError::Truncated { element });
    }
    Ok(results)
}

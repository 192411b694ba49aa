//! Report filename globs and variant-tag extraction.
//!
//! A pattern such as `results.*.xml` matches one report per runtime variant;
//! the text standing in for the wildcards (`3.6.5` in `results.3.6.5.xml`)
//! is the variant tag.

use regex::Regex;

use crate::results::error::{ParseError, ParseResult};

/// A compiled filename glob supporting `*` and `?`.
#[derive(Debug, Clone)]
pub struct ReportPattern {
    raw: String,
    matcher: Regex,
    prefix: String,
    suffix: String,
}

impl ReportPattern {
    pub fn new(pattern: &str) -> ParseResult<Self> {
        if pattern.is_empty() {
            return Err(ParseError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }
        if pattern.contains('/') || pattern.contains('\\') {
            return Err(ParseError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern must be a bare file name".to_string(),
            });
        }

        let mut source = String::from("^");
        let mut literal = String::new();
        for ch in pattern.chars() {
            match ch {
                '*' | '?' => {
                    source.push_str(&regex::escape(&literal));
                    literal.clear();
                    source.push_str(if ch == '*' { ".*" } else { "." });
                }
                other => literal.push(other),
            }
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');

        let matcher = Regex::new(&source).map_err(|e| ParseError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let is_wild = |c: char| c == '*' || c == '?';
        let (prefix, suffix) = match (pattern.find(is_wild), pattern.rfind(is_wild)) {
            (Some(first), Some(last)) => (
                pattern[..first].to_string(),
                pattern[last + 1..].to_string(),
            ),
            _ => (pattern.to_string(), String::new()),
        };

        Ok(Self {
            raw: pattern.to_string(),
            matcher,
            prefix,
            suffix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }

    /// Variant tag of a matching file name; `None` when it does not match.
    pub fn variant_of(&self, file_name: &str) -> Option<String> {
        if !self.matches(file_name) {
            return None;
        }
        let rest = file_name.strip_prefix(self.prefix.as_str())?;
        let tag = rest.strip_suffix(self.suffix.as_str())?;
        Some(tag.to_string())
    }
}

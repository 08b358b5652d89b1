//! Case transcripts: the uppercased record of echoed commands and server
//! responses, and the line-by-line comparison against stored fixtures.

use crate::error::{ObtestError, Result};
use camino::Utf8Path;
use std::fs;
use tracing::{debug, info};

/// Ordered transcript text, normalized to uppercase at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    buffer: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text as-is apart from case normalization.
    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(&text.to_uppercase());
    }

    /// Append text followed by a newline.
    pub fn write_line(&mut self, text: &str) {
        self.write(text);
        self.buffer.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Write the transcript to `path`, replacing any previous file.
    pub fn persist(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.buffer.as_bytes())?;
        debug!("transcript written to {}", path);
        Ok(())
    }
}

/// Outcome of comparing two transcripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonResult {
    Match,
    LineCount { expected: usize, actual: usize },
    Line {
        number: usize,
        expected: String,
        actual: String,
    },
}

impl ComparisonResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ComparisonResult::Match)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            ComparisonResult::Match => Ok(()),
            ComparisonResult::LineCount { expected, actual } => Err(ObtestError::CompareMismatch(
                format!("expected {expected} lines, got {actual}"),
            )),
            ComparisonResult::Line {
                number,
                expected,
                actual,
            } => Err(ObtestError::CompareMismatch(format!(
                "line {number}: expected {:?}, got {:?}",
                expected.trim_end_matches('\n'),
                actual.trim_end_matches('\n')
            ))),
        }
    }
}

/// Compare transcripts line by line, ignoring letter case.
///
/// Lines keep their terminators, so a missing final newline counts as a
/// difference and an extra trailing blank line changes the line count.
pub fn compare(expected: &str, actual: &str) -> ComparisonResult {
    let expected_lines: Vec<&str> = expected.split_inclusive('\n').collect();
    let actual_lines: Vec<&str> = actual.split_inclusive('\n').collect();

    if expected_lines.len() != actual_lines.len() {
        return ComparisonResult::LineCount {
            expected: expected_lines.len(),
            actual: actual_lines.len(),
        };
    }

    for (index, (want, got)) in expected_lines.iter().zip(&actual_lines).enumerate() {
        if want.to_uppercase() != got.to_uppercase() {
            return ComparisonResult::Line {
                number: index + 1,
                expected: (*want).to_owned(),
                actual: (*got).to_owned(),
            };
        }
    }

    ComparisonResult::Match
}

/// Compare an actual transcript file against its expected fixture.
pub fn compare_files(actual: &Utf8Path, expected: &Utf8Path) -> Result<()> {
    let actual_text = fs::read_to_string(actual)?;
    let expected_text = fs::read_to_string(expected)?;

    let result = compare(&expected_text, &actual_text);
    if !result.is_ok() {
        info!("actual={}, expected={}, {:?}", actual, expected, result);
    }
    result.into_result()
}

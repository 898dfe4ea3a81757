//! Core data models for Pushgate
//!
//! These models represent the results returned by the remote analyzer
//! and the units of work the gate schedules.

use serde::{Deserialize, Serialize};

use crate::lang::Language;

/// One reported code-quality issue at a specific line.
///
/// Constructed only by the remote analysis client when deserializing a
/// terminal analysis result; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule or violation identifier (e.g. `python-security/eval-usage`)
    pub rule: String,
    /// Source line, 1-based
    pub line: u32,
    /// Number of lines the violation spans, when the analyzer reports one
    pub line_count: Option<u32>,
    /// Human-readable description
    pub description: String,
    /// Severity, lower is more severe
    pub severity: u32,
    /// Category tag (e.g. "Design", "Security")
    pub category: String,
    /// Originating tool or rule engine
    pub tool: String,
    /// Rule documentation URL, when available
    pub rule_url: Option<String>,
    /// Language of the analyzed file
    pub language: String,
}

/// One unit of analysis work: a changed file and its language.
///
/// Produced by filtering the diff's file set through the language
/// classifier. Each task maps to exactly one analysis invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Path relative to the repository root
    pub path: String,
    pub language: Language,
}

impl FileTask {
    pub fn new(path: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            language,
        }
    }
}

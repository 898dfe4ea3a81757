//! Gate controller
//!
//! Wires the diff mapper, language classifier, orchestrator, and filter
//! pipeline into the end-to-end push-check decision:
//!
//! `Start -> ResolveBaseRevision -> ComputeDiff -> ClassifyFiles ->
//!  Analyze -> Filter -> Report -> {Pass, Fail}`
//!
//! Progress and violation output go through an explicit reporter
//! collaborator, so tests capture structured events instead of parsing
//! process output.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{self, AnalysisError, DEFAULT_WORKERS};
use crate::client::{AnalysisService, ClientError};
use crate::diff::{self, DiffError};
use crate::filter;
use crate::git::{GitClient, GitError, ZERO_SHA};
use crate::lang;
use crate::models::{FileTask, Violation};
use crate::ruleset::{self, RULESET_FILE};

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error("no {RULESET_FILE} found at the repository root (searched for {0})")]
    MissingRulesetFile(std::path::PathBuf),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl GateError {
    /// Process exit code: 2 for configuration/setup problems, 1 for
    /// everything else fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            GateError::Diff(DiffError::DiffUnavailable(_)) => 2,
            GateError::MissingRulesetFile(_) => 2,
            _ => 1,
        }
    }
}

/// Terminal result of a push check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Analysis ran and found nothing reportable.
    Pass,
    /// Valid "nothing to do": identical revisions, or a new branch with
    /// no resolvable ancestor.
    Skip,
    /// Reportable violations were found on touched lines.
    Fail { total: usize },
}

impl GateOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            GateOutcome::Pass | GateOutcome::Skip => 0,
            GateOutcome::Fail { .. } => 1,
        }
    }
}

/// Reporting collaborator for human-facing gate output.
pub trait GateReporter {
    /// Progress and skip messages.
    fn notice(&self, message: &str);
    /// One offending violation.
    fn violation(&self, path: &str, violation: &Violation);
    /// Final count of reportable violations, printed after the list.
    fn summary(&self, total: usize);
}

/// Prints notices to stdout and offending violations to stderr, the way
/// a pre-push hook is expected to.
pub struct ConsoleReporter;

impl GateReporter for ConsoleReporter {
    fn notice(&self, message: &str) {
        println!("{message}");
    }

    fn violation(&self, path: &str, violation: &Violation) {
        eprintln!("{path}:{} {}", violation.line, violation.description);
    }

    fn summary(&self, total: usize) {
        eprintln!("*** {total} violations found ***");
    }
}

/// Options for one push check, straight from the CLI surface.
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Revision of the remote ref being pushed over (may be the
    /// all-zero sentinel for a new branch).
    pub remote_sha: String,
    /// Revision being pushed.
    pub local_sha: String,
    /// Wall-clock budget for the whole analysis phase.
    pub max_timeout: Duration,
    pub excluded_categories: BTreeSet<String>,
    pub excluded_severities: BTreeSet<u32>,
    /// Bounded worker-pool size.
    pub workers: usize,
}

impl GateOptions {
    pub fn new(remote_sha: impl Into<String>, local_sha: impl Into<String>) -> Self {
        Self {
            remote_sha: remote_sha.into(),
            local_sha: local_sha.into(),
            max_timeout: Duration::from_secs(60),
            excluded_categories: BTreeSet::new(),
            excluded_severities: BTreeSet::new(),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// The push gate: owns the full lifecycle of one push-check run.
pub struct Gate<'r> {
    git: GitClient,
    analyzer: Arc<dyn AnalysisService>,
    reporter: &'r dyn GateReporter,
}

impl<'r> Gate<'r> {
    pub fn new(
        git: GitClient,
        analyzer: Arc<dyn AnalysisService>,
        reporter: &'r dyn GateReporter,
    ) -> Self {
        Self {
            git,
            analyzer,
            reporter,
        }
    }

    /// Run the push check end to end.
    pub fn check_push(&self, options: &GateOptions) -> Result<GateOutcome, GateError> {
        // ResolveBaseRevision: the all-zero sentinel means a new
        // branch; try the closest ancestor with the main branch.
        let mut base = options.remote_sha.clone();
        if base == ZERO_SHA {
            self.reporter
                .notice("push seems to originate from a new branch, trying to find an ancestor commit");
            match self.git.find_closest_sha() {
                Some(sha) => {
                    self.reporter
                        .notice(&format!("using ancestor {sha} as the comparison base"));
                    base = sha;
                }
                None => {
                    self.reporter
                        .notice("no ancestor commit found, nothing to compare against");
                    return Ok(GateOutcome::Skip);
                }
            }
        }

        if base == options.local_sha {
            self.reporter.notice(&format!(
                "remote and local revisions are identical ({base}), skipping verification"
            ));
            return Ok(GateOutcome::Skip);
        }

        // ComputeDiff
        let added = diff::compute_added_lines(&self.git, &base, &options.local_sha)?;

        // Setup: ruleset config must exist at the repository root.
        let root = self.git.root_directory()?;
        let ruleset_path = root.join(RULESET_FILE);
        if !ruleset_path.is_file() {
            return Err(GateError::MissingRulesetFile(ruleset_path));
        }
        let ruleset_names = ruleset::rulesets_from_config(&ruleset_path);
        info!("using rulesets {ruleset_names:?}");
        let rule_count = self.analyzer.load_rulesets(&ruleset_names)?;
        debug!("loaded {rule_count} rules");

        // ClassifyFiles: never fails, unanalyzable files are dropped.
        let classified = lang::classify(added.keys().map(String::as_str));
        if classified.is_empty() {
            self.reporter.notice("No file to analyze");
        } else {
            let names: Vec<&str> = classified.keys().map(String::as_str).collect();
            self.reporter.notice(&format!(
                "Analyzing {} files: {}",
                classified.len(),
                names.join(",")
            ));
        }
        let tasks: Vec<FileTask> = classified
            .into_iter()
            .map(|(path, language)| FileTask::new(path, language))
            .collect();

        // Analyze
        let results = analysis::analyze_all(
            &self.analyzer,
            &root,
            tasks,
            options.workers,
            options.max_timeout,
        )?;

        // Filter: exclusion rules first, the added-line restriction
        // always last.
        let no_lines = BTreeSet::new();
        let mut total = 0;
        let mut reportable: BTreeMap<String, Vec<Violation>> = BTreeMap::new();
        for (path, violations) in results {
            let kept = filter::exclude_by_rule(
                violations,
                &options.excluded_categories,
                &options.excluded_severities,
            );
            let kept = filter::restrict_to_lines(kept, added.get(&path).unwrap_or(&no_lines));
            if !kept.is_empty() {
                total += kept.len();
                reportable.insert(path, kept);
            }
        }

        // Report
        if total == 0 {
            self.reporter.notice("no violations found");
            return Ok(GateOutcome::Pass);
        }
        for (path, violations) in &reportable {
            for violation in violations {
                self.reporter.violation(path, violation);
            }
        }
        self.reporter.summary(total);
        Ok(GateOutcome::Fail { total })
    }
}

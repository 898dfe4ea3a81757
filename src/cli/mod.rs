//! CLI definition and entrypoint for the push gate
//!
//! Intended to run from a pre-push hook, which hands over the local and
//! remote revisions of the ref being pushed. Exit codes: 0 pass/skip,
//! 1 violations found or generic failure, 2 configuration error.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::client::AnalyzerClient;
use crate::gate::{ConsoleReporter, Gate, GateOptions};
use crate::git::GitClient;

/// Parse and validate the worker-pool size (1-16)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 16 {
        Err("workers cannot exceed 16".to_string())
    } else {
        Ok(n)
    }
}

/// Pushgate - block pushes that introduce new violations
///
/// Checks that the code being pushed does not add violations on the
/// lines it touches. Requires a pushgate.yml file at the repository
/// root listing the rulesets to apply.
#[derive(Parser, Debug)]
#[command(name = "pushgate")]
#[command(
    version,
    about = "Push-time violation gate: fails a push only when the analyzer finds new violations on lines you touched",
    after_help = "\
Examples:
  pushgate --local-sha <sha1> --remote-sha <sha2>
  pushgate --local-sha <sha1> --remote-sha <sha2> --exclude-categories Documentation
  pushgate --local-sha <sha1> --remote-sha <sha2> --exclude-severities 3,4 --max-timeout-sec 120

Make sure your API token is defined using PUSHGATE_API_TOKEN."
)]
pub struct Cli {
    /// Revision of the remote ref being pushed over (all zeros for a new branch)
    #[arg(long)]
    pub remote_sha: String,

    /// Revision of the local ref being pushed
    #[arg(long)]
    pub local_sha: String,

    /// Maximum time to wait for the analysis, in seconds
    #[arg(long, default_value = "60")]
    pub max_timeout_sec: u64,

    /// Violation categories to ignore (comma separated, e.g. Design,Documentation)
    #[arg(long, value_delimiter = ',')]
    pub exclude_categories: Vec<String>,

    /// Violation severities to ignore (comma separated integers, e.g. 3,4)
    #[arg(long, value_delimiter = ',')]
    pub exclude_severities: Vec<u32>,

    /// Number of parallel analyses (1-16)
    #[arg(long, default_value = "4", value_parser = parse_workers)]
    pub workers: usize,
}

impl Cli {
    fn gate_options(&self) -> GateOptions {
        GateOptions {
            remote_sha: self.remote_sha.clone(),
            local_sha: self.local_sha.clone(),
            max_timeout: Duration::from_secs(self.max_timeout_sec),
            excluded_categories: self.exclude_categories.iter().cloned().collect(),
            excluded_severities: self.exclude_severities.iter().copied().collect::<BTreeSet<u32>>(),
            workers: self.workers,
        }
    }
}

/// Run the push check and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    // Credentials are read once, before any work begins.
    let client = match AnalyzerClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let workdir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("cannot determine the working directory: {e}");
            return 1;
        }
    };

    // Fail fast when git is not installed.
    let git = match GitClient::new(workdir) {
        Ok(git) => git,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let reporter = ConsoleReporter;
    let gate = Gate::new(git, Arc::new(client), &reporter);
    match gate.check_push(&cli.gate_options()) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

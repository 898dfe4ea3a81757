//! Bounded-concurrency analysis orchestration
//!
//! Fans the changed files out to the remote analyzer over a fixed-size
//! worker pool and joins the results under a single wall-clock deadline.
//! Per-file failures (unreadable file, transport error) are logged and
//! contribute an empty result; an expired deadline abandons the whole
//! run, because a gate must never report "pass" on an incomplete result
//! set. Cancellation is advisory: an analysis already in flight may
//! still finish, but its result is discarded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::AnalysisService;
use crate::models::{FileTask, Violation};

/// Default number of concurrent in-flight analyses.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("analysis stopped after {completed}/{total} files")]
    Incomplete { completed: usize, total: usize },
}

/// Analyze every task, returning one entry per task keyed by path.
///
/// Fails wholesale with [`AnalysisError::DeadlineExceeded`] when the
/// deadline passes before all tasks complete.
pub fn analyze_all(
    analyzer: &Arc<dyn AnalysisService>,
    root: &Path,
    tasks: Vec<FileTask>,
    workers: usize,
    timeout: Duration,
) -> Result<BTreeMap<String, Vec<Violation>>, AnalysisError> {
    let deadline = Instant::now() + timeout;
    let total = tasks.len();
    let mut results = BTreeMap::new();
    if total == 0 {
        return Ok(results);
    }

    let workers = workers.max(1).min(total);
    let (task_tx, task_rx) = bounded::<FileTask>(total);
    let (result_tx, result_rx) = bounded::<(String, Vec<Violation>)>(total);
    let cancelled = Arc::new(AtomicBool::new(false));

    // Queue everything up front; capacity matches the task count so
    // this never blocks.
    for task in tasks {
        if task_tx.send(task).is_err() {
            break;
        }
    }
    drop(task_tx);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let analyzer = Arc::clone(analyzer);
        let cancelled = Arc::clone(&cancelled);
        let root = root.to_path_buf();
        handles.push(thread::spawn(move || {
            for task in task_rx {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let violations = analyze_one(analyzer.as_ref(), &root, &task);
                if result_tx.send((task.path, violations)).is_err() {
                    // Receiver gone: the deadline expired, stop working.
                    break;
                }
            }
        }));
    }
    drop(task_rx);
    drop(result_tx);

    for _ in 0..total {
        match result_rx.recv_deadline(deadline) {
            Ok((path, violations)) => {
                results.insert(path, violations);
            }
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Relaxed);
                debug!(
                    "deadline hit with {}/{total} files analyzed, abandoning the run",
                    results.len()
                );
                // Workers are left to wind down on their own; dropping
                // result_rx makes their next send fail.
                return Err(AnalysisError::DeadlineExceeded(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Every sender is gone before all results arrived: a
                // worker died mid-task. A partial map must never be
                // reported as a clean run.
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(AnalysisError::Incomplete {
                    completed: results.len(),
                    total,
                });
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(results)
}

/// Analyze a single file; all per-file failures become empty results.
fn analyze_one(analyzer: &dyn AnalysisService, root: &Path, task: &FileTask) -> Vec<Violation> {
    let absolute: PathBuf = root.join(&task.path);
    let content = match fs::read_to_string(&absolute) {
        Ok(content) => content,
        Err(e) => {
            warn!("cannot open file {}: {e}", absolute.display());
            return Vec::new();
        }
    };
    match analyzer.analyze(&task.path, task.language, &content) {
        Ok(violations) => violations,
        Err(e) => {
            warn!("analysis of {} failed: {e}", task.path);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::lang::Language;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct StubService {
        delay: Option<Duration>,
        violations_per_file: usize,
        calls: AtomicUsize,
    }

    impl StubService {
        fn new(delay: Option<Duration>, violations_per_file: usize) -> Self {
            Self {
                delay,
                violations_per_file,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AnalysisService for StubService {
        fn load_rulesets(&self, _names: &[String]) -> Result<usize, ClientError> {
            Ok(0)
        }

        fn analyze(
            &self,
            path: &str,
            language: Language,
            _content: &str,
        ) -> Result<Vec<Violation>, ClientError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            Ok((0..self.violations_per_file)
                .map(|i| Violation {
                    rule: "stub/rule".to_string(),
                    line: i as u32 + 1,
                    line_count: None,
                    description: format!("issue in {path}"),
                    severity: 3,
                    category: "Design".to_string(),
                    tool: "stub".to_string(),
                    rule_url: None,
                    language: language.as_str().to_string(),
                })
                .collect())
        }
    }

    fn make_tasks(dir: &TempDir, count: usize) -> Vec<FileTask> {
        (0..count)
            .map(|i| {
                let name = format!("file_{i}.py");
                fs::write(dir.path().join(&name), "x = 1\n").unwrap();
                FileTask::new(name, Language::Python)
            })
            .collect()
    }

    #[test]
    fn one_result_per_task() {
        let dir = TempDir::new().unwrap();
        let tasks = make_tasks(&dir, 6);
        let analyzer: Arc<dyn AnalysisService> = Arc::new(StubService::new(None, 2));

        let results =
            analyze_all(&analyzer, dir.path(), tasks, 4, Duration::from_secs(10)).unwrap();
        assert_eq!(results.len(), 6);
        assert!(results.values().all(|v| v.len() == 2));
    }

    #[test]
    fn empty_task_set_completes_immediately() {
        let dir = TempDir::new().unwrap();
        let analyzer: Arc<dyn AnalysisService> = Arc::new(StubService::new(None, 0));
        let results =
            analyze_all(&analyzer, dir.path(), Vec::new(), 4, Duration::from_millis(1)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn missing_file_contributes_empty_result() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![FileTask::new("does_not_exist.py", Language::Python)];
        let analyzer: Arc<dyn AnalysisService> = Arc::new(StubService::new(None, 2));

        let results =
            analyze_all(&analyzer, dir.path(), tasks, 4, Duration::from_secs(10)).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results["does_not_exist.py"].is_empty());
    }

    #[test]
    fn deadline_exceeded_abandons_the_run() {
        let dir = TempDir::new().unwrap();
        let tasks = make_tasks(&dir, 4);
        let analyzer: Arc<dyn AnalysisService> =
            Arc::new(StubService::new(Some(Duration::from_millis(500)), 1));

        let err = analyze_all(&analyzer, dir.path(), tasks, 2, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DeadlineExceeded(_)));
    }

    struct PanickingService {
        panic_on: &'static str,
    }

    impl AnalysisService for PanickingService {
        fn load_rulesets(&self, _names: &[String]) -> Result<usize, ClientError> {
            Ok(0)
        }

        fn analyze(
            &self,
            path: &str,
            _language: Language,
            _content: &str,
        ) -> Result<Vec<Violation>, ClientError> {
            assert_ne!(path, self.panic_on, "injected service bug");
            Ok(Vec::new())
        }
    }

    #[test]
    fn dead_worker_never_yields_a_partial_ok() {
        let dir = TempDir::new().unwrap();
        let tasks = make_tasks(&dir, 3);
        let analyzer: Arc<dyn AnalysisService> = Arc::new(PanickingService {
            panic_on: "file_1.py",
        });

        let err = analyze_all(&analyzer, dir.path(), tasks, 1, Duration::from_secs(10))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Incomplete { completed, total: 3 } if completed < 3
        ));
    }

    #[test]
    fn pool_is_bounded() {
        let dir = TempDir::new().unwrap();
        let tasks = make_tasks(&dir, 8);
        let analyzer: Arc<dyn AnalysisService> =
            Arc::new(StubService::new(Some(Duration::from_millis(30)), 0));

        // With a pool of 2 and 8 files at ~30ms each, a serial floor of
        // 4 batches must hold.
        let start = Instant::now();
        let results =
            analyze_all(&analyzer, dir.path(), tasks, 2, Duration::from_secs(10)).unwrap();
        assert_eq!(results.len(), 8);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}

//! Diff mapper
//!
//! Parses the unified diff between two revisions into a per-file set of
//! target-side line numbers that were newly inserted. Only files the
//! diff classifies as added or modified appear in the output; a file
//! whose hunks contain no insertions (pure deletions, renames with no
//! content change) contributes no key at all.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::git::{GitClient, GitError, ZERO_SHA};

/// File path (relative to the repository root) to the set of line
/// numbers inserted in the target revision.
pub type AddedLines = BTreeMap<String, BTreeSet<u32>>;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("refusing to diff against the all-zero revision; resolve an ancestor first")]
    InvalidRevision,
    #[error("git is not available: {0}")]
    VcsUnavailable(GitError),
    #[error("cannot obtain the diff: {0}")]
    DiffUnavailable(String),
}

/// Compute the added-lines mapping between two revisions.
///
/// The all-zero sentinel is rejected outright: callers must resolve a
/// real ancestor first.
pub fn compute_added_lines(
    git: &GitClient,
    old_revision: &str,
    new_revision: &str,
) -> Result<AddedLines, DiffError> {
    if old_revision == ZERO_SHA || new_revision == ZERO_SHA {
        return Err(DiffError::InvalidRevision);
    }
    let diff_text = git.diff(old_revision, new_revision).map_err(|e| match e {
        GitError::BinaryMissing => DiffError::VcsUnavailable(e),
        GitError::CommandFailed { .. } => DiffError::DiffUnavailable(e.to_string()),
    })?;
    Ok(added_lines(&diff_text))
}

struct HunkState {
    remaining_old: u64,
    remaining_new: u64,
    target_line: u32,
}

fn hunk_header_regex() -> &'static Regex {
    static HUNK_HEADER: OnceLock<Regex> = OnceLock::new();
    HUNK_HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk regex")
    })
}

fn parse_hunk_header(line: &str) -> Option<HunkState> {
    let caps = hunk_header_regex().captures(line)?;
    let remaining_old = caps
        .get(2)
        .map_or(1, |m| m.as_str().parse().unwrap_or(1));
    let target_line: u32 = caps.get(3)?.as_str().parse().ok()?;
    let remaining_new = caps
        .get(4)
        .map_or(1, |m| m.as_str().parse().unwrap_or(1));
    Some(HunkState {
        remaining_old,
        remaining_new,
        target_line,
    })
}

/// Undo git's C-style path quoting, applied when a path contains
/// spaces, quotes, control characters, or non-ASCII bytes
/// (`"b/pa th"`, `"b/caf\303\251.py"`).
fn unquote_path(path: &str) -> Cow<'_, str> {
    let inner = match path.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        Some(inner) => inner,
        None => return Cow::Borrowed(path),
    };
    let raw = inner.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 == raw.len() {
            bytes.push(raw[i]);
            i += 1;
            continue;
        }
        i += 1;
        match raw[i] {
            b'n' => {
                bytes.push(b'\n');
                i += 1;
            }
            b't' => {
                bytes.push(b'\t');
                i += 1;
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 && i < raw.len() && raw[i].is_ascii_digit() && raw[i] <= b'7' {
                    value = value * 8 + u32::from(raw[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                bytes.push(value as u8);
            }
            // `\"`, `\\`, and anything else stay literal.
            other => {
                bytes.push(other);
                i += 1;
            }
        }
    }
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse unified diff text into the added-lines mapping.
///
/// Hunk bodies are consumed by the line counts from the hunk header, so
/// content lines that happen to look like diff headers (`+++ x` from an
/// inserted `++ x`) cannot derail the parse.
pub fn added_lines(diff: &str) -> AddedLines {
    let mut map = AddedLines::new();
    // Target path of the current file section; None for deleted files
    // and outside any file section.
    let mut current: Option<String> = None;
    let mut hunk: Option<HunkState> = None;

    for line in diff.lines() {
        if let Some(state) = hunk.as_mut() {
            match line.as_bytes().first().copied().unwrap_or(b' ') {
                b'+' => {
                    if let Some(path) = &current {
                        map.entry(path.clone())
                            .or_default()
                            .insert(state.target_line);
                    }
                    state.target_line += 1;
                    state.remaining_new = state.remaining_new.saturating_sub(1);
                }
                b'-' => {
                    state.remaining_old = state.remaining_old.saturating_sub(1);
                }
                // "\ No newline at end of file"
                b'\\' => {}
                _ => {
                    state.target_line += 1;
                    state.remaining_old = state.remaining_old.saturating_sub(1);
                    state.remaining_new = state.remaining_new.saturating_sub(1);
                }
            }
            if state.remaining_old == 0 && state.remaining_new == 0 {
                hunk = None;
            }
            continue;
        }

        if line.starts_with("diff --git ") {
            current = None;
        } else if let Some(target) = line.strip_prefix("+++ ") {
            current = match target {
                "/dev/null" => None,
                path => {
                    let path = unquote_path(path);
                    Some(path.strip_prefix("b/").unwrap_or(&path).to_string())
                }
            };
        } else if let Some(state) = parse_hunk_header(line) {
            hunk = Some(state);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(numbers: &[u32]) -> BTreeSet<u32> {
        numbers.iter().copied().collect()
    }

    #[test]
    fn modified_file_records_only_insertions() {
        let diff = "\
diff --git a/foo.py b/foo.py
index 111..222 100644
--- a/foo.py
+++ b/foo.py
@@ -8,5 +8,6 @@ def main():
 context one
 context two
+inserted at ten
 context three
-removed line
+replaces the removed line
 context four
";
        let map = added_lines(diff);
        assert_eq!(map.len(), 1);
        assert_eq!(map["foo.py"], lines(&[10, 12]));
    }

    #[test]
    fn new_file_records_every_line() {
        let diff = "\
diff --git a/bar.rs b/bar.rs
new file mode 100644
index 000..111
--- /dev/null
+++ b/bar.rs
@@ -0,0 +1,3 @@
+fn main() {
+    println!(\"hi\");
+}
";
        let map = added_lines(diff);
        assert_eq!(map["bar.rs"], lines(&[1, 2, 3]));
    }

    #[test]
    fn deleted_file_is_excluded() {
        let diff = "\
diff --git a/gone.py b/gone.py
deleted file mode 100644
index 111..000
--- a/gone.py
+++ /dev/null
@@ -1,2 +0,0 @@
-first
-second
";
        assert!(added_lines(diff).is_empty());
    }

    #[test]
    fn deletion_only_modification_has_no_key() {
        let diff = "\
diff --git a/foo.py b/foo.py
index 111..222 100644
--- a/foo.py
+++ b/foo.py
@@ -4,3 +4,2 @@
 keep
-drop
 keep too
";
        assert!(added_lines(diff).is_empty());
    }

    #[test]
    fn rename_without_content_change_has_no_key() {
        let diff = "\
diff --git a/old.py b/new.py
similarity index 100%
rename from old.py
rename to new.py
";
        assert!(added_lines(diff).is_empty());
    }

    #[test]
    fn inserted_content_that_looks_like_a_header_is_counted_as_content() {
        let diff = "\
diff --git a/tricky.c b/tricky.c
index 111..222 100644
--- a/tricky.c
+++ b/tricky.c
@@ -1,2 +1,3 @@
 int a;
+++ b/not-a-header
 int b;
";
        let map = added_lines(diff);
        assert_eq!(map["tricky.c"], lines(&[2]));
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let diff = "\
diff --git \"a/pa th.py\" \"b/pa th.py\"
index 111..222 100644
--- \"a/pa th.py\"
+++ \"b/pa th.py\"
@@ -1 +1,2 @@
 a
+b
diff --git \"a/caf\\303\\251.py\" \"b/caf\\303\\251.py\"
index 333..444 100644
--- \"a/caf\\303\\251.py\"
+++ \"b/caf\\303\\251.py\"
@@ -1 +1,2 @@
 x
+y
";
        let map = added_lines(diff);
        assert_eq!(map["pa th.py"], lines(&[2]));
        assert_eq!(map["caf\u{e9}.py"], lines(&[2]));
    }

    #[test]
    fn multiple_files_and_hunks() {
        let diff = "\
diff --git a/one.go b/one.go
index 1..2 100644
--- a/one.go
+++ b/one.go
@@ -1,2 +1,3 @@
 a
+b
 c
@@ -10,2 +11,3 @@
 d
+e
 f
diff --git a/two.go b/two.go
index 3..4 100644
--- a/two.go
+++ b/two.go
@@ -5 +5,2 @@
 x
+y
";
        let map = added_lines(diff);
        assert_eq!(map["one.go"], lines(&[2, 12]));
        assert_eq!(map["two.go"], lines(&[6]));
    }

    #[test]
    fn zero_sha_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = GitClient::new(dir.path()).unwrap();
        let err = compute_added_lines(&git, ZERO_SHA, "HEAD").unwrap_err();
        assert!(matches!(err, DiffError::InvalidRevision));
    }
}

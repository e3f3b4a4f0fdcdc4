use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;

use crate::command::{CommandRunner, Output};
use crate::model::RestoredFile;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Command(#[from] crate::command::CommandError),
    #[error("unexpected git output: {0}")]
    Unexpected(String),
    #[error("{program} failed (exit {exit_code:?}, timed_out={timed_out}): {stderr}")]
    ProcessFailed {
        program: String,
        exit_code: Option<i32>,
        timed_out: bool,
        stderr: String,
    },
}

pub(crate) fn require_success(program: &str, output: Output) -> Result<Output, GitError> {
    if output.success() {
        Ok(output)
    } else {
        Err(GitError::ProcessFailed {
            program: program.to_string(),
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stderr: output.stderr_string(),
        })
    }
}

/// Walk every commit in `repo_path` (or the trailing `commit_depth`
/// commits, if `Some` and nonzero) and materialize the pre-deletion
/// contents of every file a commit's diff against one of its parents
/// marks as deleted (`git diff --name-status`, status `D`).
///
/// Deduplicates by `(parent_sha, original_path)` so the same blob isn't
/// restored twice if it's deleted identically relative to more than one
/// parent (merge commits) or rediscovered on a later pass.
pub async fn restore_deleted_files(
    repo_path: &Path,
    commit_depth: u64,
    runner: &CommandRunner,
) -> Result<Vec<RestoredFile>, GitError> {
    let mut rev_list_args = vec!["rev-list".to_string()];
    if commit_depth > 0 {
        rev_list_args.push("--max-count".to_string());
        rev_list_args.push(commit_depth.to_string());
        rev_list_args.push("HEAD".to_string());
    } else {
        rev_list_args.push("--all".to_string());
    }
    let rev_list_args: Vec<&str> = rev_list_args.iter().map(String::as_str).collect();

    let out = runner.run("git", &rev_list_args, Some(repo_path), &HashMap::new(), 300).await?;
    let out = require_success("git rev-list", out)?;
    let commits: Vec<String> = out
        .stdout_string()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut restored = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for commit in commits {
        // A single commit's parent/diff lookup failing never aborts the
        // walk; log and move on to the next commit.
        let parents = match parents_of(repo_path, &commit, runner).await {
            Ok(parents) => parents,
            Err(err) => {
                tracing::warn!(commit, error = %err, "failed to list parents of commit, skipping");
                continue;
            }
        };
        for parent in parents {
            let deleted_paths = match deleted_paths_between(repo_path, &parent, &commit, runner).await {
                Ok(paths) => paths,
                Err(err) => {
                    tracing::warn!(commit, parent, error = %err, "failed to diff commit against parent, skipping");
                    continue;
                }
            };
            for path in deleted_paths {
                let key = (parent.clone(), path.clone());
                if seen.contains(&key) {
                    continue;
                }
                seen.insert(key);

                match show_blob(repo_path, &parent, &path, runner).await {
                    Ok(bytes) => restored.push(RestoredFile {
                        commit: commit.clone(),
                        parent: parent.clone(),
                        original_path: path,
                        bytes,
                    }),
                    // The blob genuinely not existing at that parent/path
                    // (e.g. a rename `git diff` reported as a delete) is
                    // expected often enough to just skip rather than fail
                    // the whole walk.
                    Err(_) => continue,
                }
            }
        }
    }

    Ok(restored)
}

async fn parents_of(repo_path: &Path, commit: &str, runner: &CommandRunner) -> Result<Vec<String>, GitError> {
    let out = runner
        .run("git", &["log", "--pretty=%P", "-n", "1", commit], Some(repo_path), &HashMap::new(), 60)
        .await?;
    let out = require_success("git log", out)?;
    Ok(out
        .stdout_string()
        .split_whitespace()
        .map(String::from)
        .collect())
}

async fn deleted_paths_between(
    repo_path: &Path,
    parent: &str,
    commit: &str,
    runner: &CommandRunner,
) -> Result<Vec<String>, GitError> {
    let out = runner
        .run("git", &["diff", "--name-status", parent, commit], Some(repo_path), &HashMap::new(), 60)
        .await?;
    let out = require_success("git diff", out)?;
    let mut paths = Vec::new();
    for line in out.stdout_string().lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else { continue };
        if status.starts_with('D') {
            if let Some(path) = fields.next() {
                paths.push(path.to_string());
            }
        }
    }
    Ok(paths)
}

async fn show_blob(
    repo_path: &Path,
    commit_ish: &str,
    path: &str,
    runner: &CommandRunner,
) -> Result<Vec<u8>, GitError> {
    let spec = format!("{commit_ish}:{path}");
    let out = runner.run("git", &["show", &spec], Some(repo_path), &HashMap::new(), 60).await?;
    let out = require_success("git show", out)?;
    Ok(out.stdout)
}

/// Disk-safe filename for a restored file: path separators collapse to
/// `_` so nested directory structure can't escape the output directory.
pub fn safe_restored_filename(original_path: &str) -> String {
    original_path
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    async fn init_repo_with_deleted_file() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &'static [&'static str]| {
            let dir = dir.path().to_path_buf();
            async move {
                Command::new("git")
                    .args(args)
                    .current_dir(&dir)
                    .output()
                    .await
                    .unwrap()
            }
        };
        run(&["init", "-q"]).await;
        run(&["config", "user.email", "test@example.com"]).await;
        run(&["config", "user.name", "test"]).await;
        std::fs::write(dir.path().join("secret.txt"), b"api_key=abc123").unwrap();
        run(&["add", "secret.txt"]).await;
        run(&["commit", "-q", "-m", "add secret"]).await;
        run(&["rm", "-q", "secret.txt"]).await;
        run(&["commit", "-q", "-m", "remove secret"]).await;
        dir
    }

    #[tokio::test]
    async fn recovers_bytes_of_deleted_file() {
        let dir = init_repo_with_deleted_file().await;
        let runner = CommandRunner::new();
        let restored = restore_deleted_files(dir.path(), 0, &runner).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].original_path, "secret.txt");
        assert_eq!(restored[0].bytes, b"api_key=abc123");
    }

    #[test]
    fn safe_restored_filename_collapses_separators() {
        assert_eq!(safe_restored_filename("a/b\\c"), "a_b_c");
    }
}

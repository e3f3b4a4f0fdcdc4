use std::collections::HashMap;
use std::path::Path;

use crate::command::CommandRunner;
use crate::git::history::{require_success, GitError};
use crate::model::DanglingBlob;

/// Unpack every pack file in `repo_path/.git/objects/pack` and run
/// `git fsck --unreachable --dangling` to find blobs reachable from no
/// branch, tag, or reflog, then recover their bytes with `git cat-file`.
///
/// Unpacking first matters: `git fsck` alone won't surface objects still
/// sealed inside a pack even if nothing in the pack's index reaches
/// them, since the dangling check walks loose + packed objects but the
/// objects of interest here are the ones a `git gc` already tried to
/// collect into packs pending removal.
pub async fn extract_dangling_blobs(
    repo_path: &Path,
    runner: &CommandRunner,
) -> Result<Vec<DanglingBlob>, GitError> {
    unpack_all_packs(repo_path, runner).await?;

    let fsck_out = runner
        .run(
            "git",
            &["fsck", "--full", "--unreachable", "--dangling", "--no-reflogs"],
            Some(repo_path),
            &HashMap::new(),
            300,
        )
        .await?;
    let fsck_out = require_success("git fsck", fsck_out)?;

    let mut blobs = Vec::new();
    for line in fsck_out.stdout_string().lines() {
        let Some(sha) = parse_unreachable_blob_line(line) else {
            continue;
        };
        match runner.run("git", &["cat-file", "-p", &sha], Some(repo_path), &HashMap::new(), 60).await {
            Ok(out) if out.success() => blobs.push(DanglingBlob { sha, bytes: out.stdout }),
            // A blob fsck reported but cat-file can't materialize (corrupt
            // pack entry, already pruned) is skipped rather than failing
            // the whole extraction.
            Ok(_) | Err(_) => continue,
        }
    }
    Ok(blobs)
}

async fn unpack_all_packs(repo_path: &Path, runner: &CommandRunner) -> Result<(), GitError> {
    let pack_dir = repo_path.join(".git").join("objects").join("pack");
    let Ok(entries) = std::fs::read_dir(&pack_dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pack") {
            continue;
        }
        let shell_cmd = format!("git unpack-objects -r < {:?}", path);
        let out = runner.run("sh", &["-c", &shell_cmd], Some(repo_path), &HashMap::new(), 300).await?;
        require_success("git unpack-objects", out)?;
    }
    Ok(())
}

/// Parses a line like `dangling blob deadbeef...` or
/// `unreachable blob deadbeef...` out of `git fsck` output.
fn parse_unreachable_blob_line(line: &str) -> Option<String> {
    if !line.contains("blob") {
        return None;
    }
    if !(line.contains("unreachable") || line.contains("dangling")) {
        return None;
    }
    line.split_whitespace().last().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fsck_dangling_blob_lines() {
        let sha = parse_unreachable_blob_line("dangling blob 1234567890abcdef1234567890abcdef12345678");
        assert_eq!(sha.as_deref(), Some("1234567890abcdef1234567890abcdef12345678"));

        let sha = parse_unreachable_blob_line("unreachable blob deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
        assert_eq!(sha.as_deref(), Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"));
    }

    #[test]
    fn ignores_non_blob_lines() {
        assert!(parse_unreachable_blob_line("dangling commit abc123").is_none());
        assert!(parse_unreachable_blob_line("notice: HEAD points to an unborn branch").is_none());
    }

    #[tokio::test]
    async fn finds_blob_made_dangling_by_amend() {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &'static [&'static str]| {
            let dir = dir.path().to_path_buf();
            async move {
                tokio::process::Command::new("git")
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
        std::fs::write(dir.path().join("secret.txt"), b"api_key=zyx999").unwrap();
        run(&["add", "secret.txt"]).await;
        run(&["commit", "-q", "-m", "add secret"]).await;
        run(&["commit", "-q", "--amend", "-m", "rewritten", "--allow-empty"]).await;
        std::fs::remove_file(dir.path().join("secret.txt")).ok();
        run(&["add", "-A"]).await;
        run(&["commit", "-q", "-m", "cleanup", "--allow-empty"]).await;

        let runner = CommandRunner::new();
        let blobs = extract_dangling_blobs(dir.path(), &runner).await.unwrap();
        assert!(blobs.iter().any(|b| b.bytes == b"api_key=zyx999"));
    }
}

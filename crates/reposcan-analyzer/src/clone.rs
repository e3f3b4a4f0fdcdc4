//! Bounded-retry cloning with exponential backoff and jitter.
//!
//! `base_delay = retry_delay * 2^(attempt - 1)`, plus jitter uniform in
//! `[0, retry_delay * 0.25)`, sleeping between attempts but not after
//! the last one.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use reposcan_core::command::CommandRunner;

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("clone of {url} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Clone `url` into `dest` (which must not already exist), retrying up
/// to `max_attempts` times with exponential backoff plus jitter between
/// attempts, timing each attempt out at `clone_timeout_secs`.
pub async fn clone_repo_with_retries(
    runner: &CommandRunner,
    url: &str,
    dest: &Path,
    max_attempts: u32,
    base_retry_delay_secs: u64,
    clone_timeout_secs: u64,
    proxy_env: &HashMap<String, String>,
) -> Result<(), CloneError> {
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        let dest_str = dest.to_string_lossy().into_owned();
        let result = runner
            .run(
                "git",
                &["clone", "--filter=blob:none", "--progress", url, &dest_str],
                None,
                proxy_env,
                clone_timeout_secs,
            )
            .await;

        let failure = match result {
            Ok(output) if output.success() => None,
            Ok(output) if output.timed_out => Some(format!("clone timed out after {clone_timeout_secs}s")),
            Ok(output) => Some(format!("git clone exited with {:?}: {}", output.exit_code, output.stderr_string())),
            Err(err) => Some(err.to_string()),
        };

        match failure {
            None => return Ok(()),
            Some(message) => {
                tracing::warn!(attempt, url, error = %message, "clone attempt failed");
                let _ = tokio::fs::remove_dir_all(dest).await;
                last_error = Some(message);
                if attempt < max_attempts {
                    let base_delay = base_retry_delay_secs as f64 * 2f64.powi(attempt as i32 - 1);
                    let jitter_max = base_retry_delay_secs as f64 * 0.25;
                    let jitter: f64 = rand::thread_rng().gen_range(0.0..jitter_max.max(0.001));
                    tokio::time::sleep(std::time::Duration::from_secs_f64(base_delay + jitter)).await;
                }
            }
        }
    }

    Err(CloneError::ExhaustedRetries {
        url: url.to_string(),
        attempts: max_attempts,
        last_error: last_error.expect("loop ran at least once"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_into_fresh_destination() {
        let src = tempfile::tempdir().unwrap();
        let run = |args: &'static [&'static str], dir: &std::path::Path| {
            let dir = dir.to_path_buf();
            async move {
                tokio::process::Command::new("git")
                    .args(args)
                    .current_dir(&dir)
                    .output()
                    .await
                    .unwrap()
            }
        };
        run(&["init", "-q"], src.path()).await;
        run(&["config", "user.email", "test@example.com"], src.path()).await;
        run(&["config", "user.name", "test"], src.path()).await;
        std::fs::write(src.path().join("f.txt"), b"hi").unwrap();
        run(&["add", "f.txt"], src.path()).await;
        run(&["commit", "-q", "-m", "init"], src.path()).await;

        let dest_parent = tempfile::tempdir().unwrap();
        let dest = dest_parent.path().join("clone");
        let runner = CommandRunner::new();
        let url = format!("file://{}", src.path().display());
        clone_repo_with_retries(&runner, &url, &dest, 3, 1, 60, &HashMap::new())
            .await
            .unwrap();
        assert!(dest.join("f.txt").exists());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let dest_parent = tempfile::tempdir().unwrap();
        let dest = dest_parent.path().join("clone");
        let runner = CommandRunner::new();
        let err = clone_repo_with_retries(
            &runner,
            "file:///nonexistent/repo/path/xyz",
            &dest,
            2,
            0,
            5,
            &HashMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CloneError::ExhaustedRetries { attempts: 2, .. }));
    }
}

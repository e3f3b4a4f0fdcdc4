use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured outcome of a finished (or timed-out) process. Never carries
/// a nonzero exit or a timeout as an `Err` — only a spawn/wait I/O
/// failure does. Callers branch on `exit_code`/`timed_out` themselves.
#[derive(Debug, Clone)]
pub struct Output {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl Output {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs external processes with a hard wall-clock timeout and, on Unix,
/// kills the whole process group on timeout so a scanner's own children
/// (TruffleHog shells out too) don't outlive it.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `program` with `args` in `cwd`, merging `extra_env` on top of
    /// the inherited environment, enforcing `timeout_secs`. Always
    /// returns `Ok(Output)` for anything that actually ran, whatever its
    /// exit code — git and trufflehog both use nonzero-but-OK exit codes
    /// in places, so the caller is the one who knows which codes mean
    /// failure. Only a spawn or wait I/O failure becomes `Err`.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        extra_env: &HashMap<String, String>,
        timeout_secs: u64,
    ) -> Result<Output, CommandError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(extra_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                // New process group so a timeout can kill the whole tree
                // (git/trufflehog subprocesses included) via killpg.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id();

        let wait_result = timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;

        match wait_result {
            Ok(Ok(output)) => Ok(Output {
                exit_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
                timed_out: false,
            }),
            Ok(Err(source)) => Err(CommandError::Wait {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                kill_process_group(pid);
                Ok(Output {
                    exit_code: None,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // Negative pid addresses the whole group created by setsid above.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_and_captures_stdout() {
        let runner = CommandRunner::new();
        let out = runner.run("echo", &["hello"], None, &HashMap::new(), 5).await.unwrap();
        assert_eq!(out.stdout_string().trim(), "hello");
        assert!(out.success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_returned_as_a_value_not_an_error() {
        let runner = CommandRunner::new();
        let out = runner
            .run("sh", &["-c", "exit 7"], None, &HashMap::new(), 5)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(7));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn timeout_kills_long_running_process_and_sets_timed_out() {
        let runner = CommandRunner::new();
        let out = runner.run("sleep", &["5"], None, &HashMap::new(), 1).await.unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn extra_env_is_visible_to_child() {
        let runner = CommandRunner::new();
        let mut env = HashMap::new();
        env.insert("REPOSCAN_TEST_VAR".to_string(), "xyz".to_string());
        let out = runner.run("sh", &["-c", "echo $REPOSCAN_TEST_VAR"], None, &env, 5).await.unwrap();
        assert_eq!(out.stdout_string().trim(), "xyz");
    }
}

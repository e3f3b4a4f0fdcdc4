use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reposcan_core::command::CommandRunner;
use reposcan_core::model::{Finding, SourceType};

use super::{Scanner, ScannerError};

/// Wraps the `trufflehog` CLI. `LocalRepo` sources are scanned with
/// `trufflehog git file://{path}` so the whole commit history is
/// walked in one pass; restored-file and dangling-blob directories
/// (which are flat, not a repo) are scanned with `trufflehog filesystem`.
pub struct TruffleHogScanner {
    runner: CommandRunner,
    timeout_secs: u64,
    scan_commit_depth: u64,
}

impl TruffleHogScanner {
    pub fn new(runner: CommandRunner, timeout_secs: u64, scan_commit_depth: u64) -> Self {
        Self {
            runner,
            timeout_secs,
            scan_commit_depth,
        }
    }
}

#[async_trait]
impl Scanner for TruffleHogScanner {
    async fn scan(
        &self,
        root: &Path,
        source_type: SourceType,
        org: &str,
        repo: &str,
        run_id: uuid::Uuid,
    ) -> Result<Vec<Finding>, ScannerError> {
        let abs_path = root.canonicalize()?;

        let mut args: Vec<String> = vec!["--json".to_string(), "--no-update".to_string()];
        match source_type {
            SourceType::LocalRepo => {
                args.insert(0, "git".to_string());
                args.push(format!("file://{}", abs_path.display()));
                if self.scan_commit_depth > 0 {
                    args.push("--max-depth".to_string());
                    args.push(self.scan_commit_depth.to_string());
                }
            }
            SourceType::RestoredFiles | SourceType::DanglingBlobs => {
                args.insert(0, "filesystem".to_string());
                args.push(abs_path.display().to_string());
            }
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self.runner.run("trufflehog", &arg_refs, None, &HashMap::new(), self.timeout_secs).await?;
        if output.timed_out {
            return Err(ScannerError::Process("trufflehog timed out".to_string()));
        }
        // Both 0 (clean) and 1 (verified/unverified results found) are
        // expected outcomes, not errors.
        if !matches!(output.exit_code, Some(0) | Some(1)) {
            return Err(ScannerError::Process(format!(
                "trufflehog exited with {:?}: {}",
                output.exit_code,
                output.stderr_string()
            )));
        }

        let mut findings = Vec::new();
        for line in output.stdout_string().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            findings.push(parse_trufflehog_result(&value, source_type, org, repo, run_id));
        }
        Ok(findings.into_iter().flatten().collect())
    }

    fn name(&self) -> &'static str {
        "trufflehog"
    }
}

fn parse_trufflehog_result(
    value: &serde_json::Value,
    source_type: SourceType,
    org: &str,
    repo: &str,
    run_id: uuid::Uuid,
) -> Option<Finding> {
    let detector = value
        .pointer("/DetectorName")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let matched_text = value
        .pointer("/Raw")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let file_path = value
        .pointer("/SourceMetadata/Data/Filesystem/file")
        .or_else(|| value.pointer("/SourceMetadata/Data/Git/file"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let verified = value.pointer("/Verified").and_then(|v| v.as_bool()).unwrap_or(false);

    Some(Finding {
        run_id,
        org: org.to_string(),
        repo: repo.to_string(),
        file_path,
        source_type,
        detector,
        matched_text,
        start_offset: 0,
        end_offset: 0,
        severity: if verified { "verified".to_string() } else { "unverified".to_string() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_trufflehog_json_line() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"DetectorName":"AWS","Raw":"AKIA...","Verified":true,
               "SourceMetadata":{"Data":{"Filesystem":{"file":"secret.txt"}}}}"#,
        )
        .unwrap();
        let finding = parse_trufflehog_result(&value, SourceType::LocalRepo, "acme", "foo", uuid::Uuid::nil()).unwrap();
        assert_eq!(finding.detector, "AWS");
        assert_eq!(finding.severity, "verified");
        assert_eq!(finding.file_path, "secret.txt");
    }
}

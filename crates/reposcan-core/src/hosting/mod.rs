//! Thin wrapper around the `gh` CLI: repo listing, search, and metadata
//! lookups used by the discovery worker and the recon supplement.
//!
//! Shells out to the real `gh` binary rather than hitting the
//! REST/GraphQL API directly, relying on the user's existing
//! `gh auth login`.

use std::collections::HashMap;

use crate::command::{CommandError, CommandRunner, Output};
use crate::model::RepoMetadata;

#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("failed to parse gh output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gh {args} failed (exit {exit_code:?}, timed_out={timed_out}): {stderr}")]
    GhFailed {
        args: String,
        exit_code: Option<i32>,
        timed_out: bool,
        stderr: String,
    },
}

fn require_success(args: &[&str], output: Output) -> Result<Output, HostingError> {
    if output.success() {
        Ok(output)
    } else {
        Err(HostingError::GhFailed {
            args: args.join(" "),
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stderr: output.stderr_string(),
        })
    }
}

/// `gh`-backed hosting API client. Holds no state beyond the command
/// runner; every call is a fresh `gh` invocation.
#[derive(Debug, Default, Clone)]
pub struct GhClient {
    runner: CommandRunner,
}

impl GhClient {
    pub fn new() -> Self {
        Self {
            runner: CommandRunner::new(),
        }
    }

    /// `gh repo list {org} -L {limit} --json nameWithOwner --jq
    /// '.[].nameWithOwner'`. Returns `org/repo` strings.
    pub async fn list_org_repos(&self, org: &str, limit: usize) -> Result<Vec<String>, HostingError> {
        let limit_str = limit.to_string();
        let args = [
            "repo",
            "list",
            org,
            "-L",
            &limit_str,
            "--json",
            "nameWithOwner",
            "--jq",
            ".[].nameWithOwner",
        ];
        let out = self.runner.run("gh", &args, None, &HashMap::new(), 120).await?;
        let out = require_success(&args, out)?;
        Ok(lines(&out.stdout_string()))
    }

    /// `gh search repos --limit {limit} --json nameWithOwner --jq
    /// '.items[].nameWithOwner' {query}`.
    pub async fn search_repos(&self, query: &str, limit: usize) -> Result<Vec<String>, HostingError> {
        let limit_str = limit.to_string();
        let args = [
            "search",
            "repos",
            "--limit",
            &limit_str,
            "--json",
            "nameWithOwner",
            "--jq",
            ".items[].nameWithOwner",
            query,
        ];
        let out = self.runner.run("gh", &args, None, &HashMap::new(), 120).await?;
        let out = require_success(&args, out)?;
        Ok(lines(&out.stdout_string()))
    }

    /// `gh repo view {full_name} --json diskUsage,pushedAt,isFork`.
    /// Callers that fail to fetch metadata should fail open (admit the
    /// repo rather than drop it).
    pub async fn repo_metadata(&self, full_name: &str) -> Result<RepoMetadata, HostingError> {
        let args = ["repo", "view", full_name, "--json", "diskUsage,pushedAt,isFork"];
        let out = self.runner.run("gh", &args, None, &HashMap::new(), 60).await?;
        let out = require_success(&args, out)?;
        Ok(serde_json::from_str(&out.stdout_string())?)
    }

    /// `gh api graphql` org recon query, used by the discovery recon
    /// supplement (not part of the core discover-and-enqueue path).
    pub async fn org_graphql(&self, org_login: &str, query: &str) -> Result<serde_json::Value, HostingError> {
        let field_arg = format!("orgLogin={org_login}");
        let raw_field_arg = format!("query={query}");
        let args = ["api", "graphql", "-f", &field_arg, "--raw-field", &raw_field_arg];
        let out = self.runner.run("gh", &args, None, &HashMap::new(), 60).await?;
        let out = require_success(&args, out)?;
        Ok(serde_json::from_str(&out.stdout_string())?)
    }
}

fn lines(s: &str) -> Vec<String> {
    s.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_filters_blank_entries() {
        let out = lines("acme/foo\n\nacme/bar\n");
        assert_eq!(out, vec!["acme/foo".to_string(), "acme/bar".to_string()]);
    }
}

//! Organization recon: a read-only summary of an org's repos (stars,
//! forks, primary-language proportions, commit counts) used to scope a
//! discovery run before committing to it. `gh api graphql` with a query
//! fetching the org's repo connection, summarized and written out as
//! JSON.

use std::collections::HashMap;

use reposcan_core::hosting::{GhClient, HostingError};
use serde::Serialize;

const ORG_RECON_QUERY: &str = r#"
query($orgLogin: String!, $cursor: String) {
  organization(login: $orgLogin) {
    repositories(first: 50, after: $cursor, isFork: false) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        stargazerCount
        forkCount
        primaryLanguage { name }
        defaultBranchRef {
          target {
            ... on Commit { history { totalCount } }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Clone, Serialize)]
pub struct OrgReconSummary {
    pub org: String,
    pub repo_count: usize,
    pub total_stars: u64,
    pub total_forks: u64,
    pub total_commits: u64,
    /// Primary language name -> fraction of repos using it, in `[0, 1]`.
    pub language_proportions: HashMap<String, f64>,
}

/// Fetch and summarize up to `max_repos` non-fork repos in `org`.
/// Paginates with `endCursor` until the page is exhausted, stopping
/// early once `max_repos` is hit.
pub async fn recon_org(gh: &GhClient, org: &str, max_repos: usize) -> Result<OrgReconSummary, HostingError> {
    let mut repo_count = 0usize;
    let mut total_stars = 0u64;
    let mut total_forks = 0u64;
    let mut total_commits = 0u64;
    let mut language_counts: HashMap<String, u64> = HashMap::new();
    let mut cursor: Option<String> = None;

    loop {
        let query = ORG_RECON_QUERY.replace(
            "$cursor",
            &cursor.as_deref().map(|c| format!("\"{c}\"")).unwrap_or_else(|| "null".to_string()),
        );
        let response = gh.org_graphql(org, &query).await?;

        let nodes = response
            .pointer("/data/organization/repositories/nodes")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for node in &nodes {
            if repo_count >= max_repos {
                break;
            }
            repo_count += 1;
            total_stars += node.get("stargazerCount").and_then(|v| v.as_u64()).unwrap_or(0);
            total_forks += node.get("forkCount").and_then(|v| v.as_u64()).unwrap_or(0);
            total_commits += node
                .pointer("/defaultBranchRef/target/history/totalCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if let Some(lang) = node.pointer("/primaryLanguage/name").and_then(|v| v.as_str()) {
                *language_counts.entry(lang.to_string()).or_insert(0) += 1;
            }
        }

        if repo_count >= max_repos {
            break;
        }

        let has_next = response
            .pointer("/data/organization/repositories/pageInfo/hasNextPage")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !has_next {
            break;
        }
        cursor = response
            .pointer("/data/organization/repositories/pageInfo/endCursor")
            .and_then(|v| v.as_str())
            .map(String::from);
        if cursor.is_none() {
            break;
        }
    }

    let language_proportions = language_counts
        .into_iter()
        .map(|(lang, count)| (lang, count as f64 / repo_count.max(1) as f64))
        .collect();

    Ok(OrgReconSummary {
        org: org.to_string(),
        repo_count,
        total_stars,
        total_forks,
        total_commits,
        language_proportions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_proportions_sum_to_one_when_every_repo_has_a_language() {
        let mut language_counts = HashMap::new();
        language_counts.insert("Rust".to_string(), 3u64);
        language_counts.insert("Python".to_string(), 1u64);
        let repo_count = 4usize;
        let proportions: HashMap<String, f64> = language_counts
            .into_iter()
            .map(|(lang, count)| (lang, count as f64 / repo_count as f64))
            .collect();
        let sum: f64 = proportions.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

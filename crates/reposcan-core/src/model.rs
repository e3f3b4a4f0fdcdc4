//! Core data model shared across the pipeline.
//!
//! `RepoRef` is the only identifier that crosses component boundaries;
//! everything else here is either a job payload or a record produced by
//! one stage and consumed by the next.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of a repository: `(org, repo)`. Immutable once formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub org: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
        }
    }

    /// Parse an `org/repo` string. Returns `None` if there is no `/`,
    /// or if either side is empty.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (org, repo) = full_name.split_once('/')?;
        if org.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self::new(org, repo))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }

    /// Clone HTTPS URL for the hosted repository.
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.org, self.repo)
    }

    /// OS-safe path segment: every non-alphanumeric byte becomes `_`.
    ///
    /// Applied independently to org and repo so a traversal attempt in
    /// either (`../`, embedded `/`, null bytes, unicode slash lookalikes)
    /// collapses to underscores rather than escaping `CLONE_ROOT`.
    pub fn safe_org(&self) -> String {
        safe_segment(&self.org)
    }

    pub fn safe_repo(&self) -> String {
        safe_segment(&self.repo)
    }

    /// `{root}/{safe_org}/{safe_repo}`.
    pub fn safe_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(self.safe_org()).join(self.safe_repo())
    }
}

/// Replace every non-ASCII-alphanumeric character with `_`.
///
/// Operates byte-by-byte on ASCII alphanumerics only, so multi-byte
/// UTF-8 sequences (including unicode slash lookalikes) are shredded
/// into `_` rather than passed through, which keeps the result confined
/// to `[A-Za-z0-9_]`.
pub fn safe_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// One discovery job: expand an org list or a search query into repos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DiscoveryJob {
    OrgList { orgs: Vec<String> },
    Search { query: String, limit: usize },
}

/// One analysis job: scan a single repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub repo: RepoRef,
    /// Set by the analyzer itself on admission-denied re-enqueue, purely
    /// for operator visibility in logs; never used for control flow.
    pub attempt_hint: Option<u32>,
}

impl AnalysisJob {
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            attempt_hint: None,
        }
    }
}

/// Metadata fetched from the hosting API, used only during discovery
/// filtering. Not persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoMetadata {
    #[serde(rename = "diskUsage")]
    pub disk_usage_kb: Option<u64>,
    #[serde(rename = "pushedAt")]
    pub pushed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "isFork")]
    pub is_fork: bool,
}

/// A file restored from git history just before it was deleted.
#[derive(Debug, Clone)]
pub struct RestoredFile {
    pub commit: String,
    pub parent: String,
    pub original_path: String,
    pub bytes: Vec<u8>,
}

/// A blob reachable from no branch, tag, or reflog.
#[derive(Debug, Clone)]
pub struct DanglingBlob {
    pub sha: String,
    pub bytes: Vec<u8>,
}

/// Which byte stream produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    LocalRepo,
    RestoredFiles,
    DanglingBlobs,
}

impl SourceType {
    /// Label used in scanner invocations and output filenames.
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::LocalRepo => "local_repo",
            SourceType::RestoredFiles => "restored_files",
            SourceType::DanglingBlobs => "dangling_blobs",
        }
    }
}

/// One credential-leak finding, appended to a per-scanner results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub run_id: uuid::Uuid,
    pub org: String,
    pub repo: String,
    pub file_path: String,
    pub source_type: SourceType,
    pub detector: String,
    #[serde(rename = "match")]
    pub matched_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub severity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_org_repo() {
        let r = RepoRef::parse("acme/foo").unwrap();
        assert_eq!(r.org, "acme");
        assert_eq!(r.repo, "foo");
        assert_eq!(r.full_name(), "acme/foo");
    }

    #[test]
    fn rejects_missing_slash_or_empty_sides() {
        assert!(RepoRef::parse("acme").is_none());
        assert!(RepoRef::parse("/foo").is_none());
        assert!(RepoRef::parse("acme/").is_none());
    }

    #[test]
    fn safe_path_never_escapes_root() {
        let r = RepoRef::new("../../etc", "passwd\0/../x");
        let safe = r.safe_path(std::path::Path::new("/clone_root"));
        let s = safe.to_string_lossy();
        assert!(s.starts_with("/clone_root/"));
        assert!(!s.contains(".."));
        for segment in [r.safe_org(), r.safe_repo()] {
            assert!(segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn safe_segment_shreds_unicode_slash_lookalikes() {
        // U+2044 FRACTION SLASH and U+FF0F FULLWIDTH SOLIDUS are not ASCII
        // alphanumerics, so every byte of their UTF-8 encoding becomes `_`.
        let shredded = safe_segment("a\u{2044}b\u{ff0f}c");
        assert!(!shredded.contains('/'));
        assert!(shredded.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}

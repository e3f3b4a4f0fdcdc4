//! Application settings, modeled on the layered `Settings` used throughout
//! the rest of the pipeline: a `Default` impl for local/dev use, overridable
//! by environment variables, with a helper that creates the on-disk output
//! tree the rest of the system assumes exists.

use std::path::PathBuf;

/// Default base directory name under the user's data directory.
const DEFAULT_BASE_OUTPUT_DIR: &str = "reposcan_output";

/// Application settings for one reposcan process (submitter, discovery
/// worker, or analyzer worker — all three share this struct).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of all on-disk output: cloned repos, restored files, dangling
    /// blobs, and scanner result directories live under here.
    pub base_output_dir: PathBuf,

    /// Redis connection URL for the queue/semaphore/cache backends.
    /// `None` means use the in-memory backends (single-process only).
    pub redis_url: Option<String>,

    /// Cluster-wide cap on simultaneously in-flight analyses.
    pub global_max_concurrent_pipelines: i64,
    /// Extra headroom the submitter tolerates over the hard cap before
    /// it starts throttling (spec §4.5 admission-wait loop).
    pub admission_headroom: i64,

    /// How long a repo stays in the processed cache before it is
    /// eligible for re-analysis.
    pub cache_ttl_secs: u64,

    /// Delay (seconds) an analyzer waits before re-enqueuing a job whose
    /// admission was denied. Jitter of `[0, 30)` is added on top.
    pub analyzer_requeue_delay_secs: u64,

    /// Maximum clone attempts before giving up.
    pub max_clone_attempts: u32,
    /// Base delay (seconds) between clone retries; doubled per attempt.
    pub clone_retry_delay_secs: u64,
    /// Hard timeout for one `git clone` attempt.
    pub repo_clone_timeout_secs: u64,

    /// How many trailing commits to walk for deleted-file recovery and
    /// to bound scanner depth. `0` means walk/scan full history.
    pub scan_commit_depth: u64,

    /// Timeout for one scanner invocation.
    pub scanner_timeout_secs: u64,
    /// Files above this size are skipped by the regex heuristic scanner.
    /// `0` disables the size check.
    pub max_file_size_to_scan_bytes: u64,
    /// Extensions the regex heuristic scanner never reads (binary noise).
    pub denylist_extensions: Vec<String>,

    /// Maximum repos listed per org during discovery.
    pub max_repos_per_org: usize,
    /// Age filter: skip repos not pushed to within this many days. `0`
    /// disables the filter.
    pub max_repo_age_days: i64,
    /// Size filter: skip repos larger than this many KB on disk. `0`
    /// disables the filter.
    pub max_repo_size_kb: u64,

    /// Git proxy environment, injected into clone/history-walk commands
    /// without mutating the parent process's environment.
    pub git_http_proxy: Option<String>,
    pub git_https_proxy: Option<String>,
    pub git_proxy_command: Option<String>,

    /// Submitter batching and pacing knobs (spec §4.5).
    pub submit_batch_size: usize,
    pub submit_check_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let base_output_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_BASE_OUTPUT_DIR);

        Self {
            base_output_dir,
            redis_url: None,
            global_max_concurrent_pipelines: 10,
            admission_headroom: 5,
            cache_ttl_secs: 24 * 3600,
            analyzer_requeue_delay_secs: 120,
            max_clone_attempts: 3,
            clone_retry_delay_secs: 60,
            repo_clone_timeout_secs: 1800,
            scan_commit_depth: 0,
            scanner_timeout_secs: 1800,
            max_file_size_to_scan_bytes: 10 * 1024 * 1024,
            denylist_extensions: [
                ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".pdf", ".zip", ".tar", ".gz",
                ".mp4", ".mp3", ".woff", ".woff2", ".ttf", ".eot", ".so", ".dylib", ".dll",
                ".exe", ".bin",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_repos_per_org: 200,
            max_repo_age_days: 0,
            max_repo_size_kb: 0,
            git_http_proxy: None,
            git_https_proxy: None,
            git_proxy_command: None,
            submit_batch_size: 20,
            submit_check_interval_secs: 30,
        }
    }
}

impl Settings {
    /// Overlay environment variables onto defaults (or a config-file
    /// derived base). Unset variables leave the existing value in place.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("GLOBAL_MAX_CONCURRENT_PIPELINES") {
            if let Ok(n) = v.parse() {
                self.global_max_concurrent_pipelines = n;
            }
        }
        if let Ok(v) = std::env::var("ANALYZER_REQUEUE_DELAY_SECONDS") {
            if let Ok(n) = v.parse() {
                self.analyzer_requeue_delay_secs = n;
            }
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("BASE_OUTPUT_DIR") {
            self.base_output_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SCAN_COMMIT_DEPTH") {
            if let Ok(n) = v.parse() {
                self.scan_commit_depth = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_REPO_AGE_DAYS") {
            if let Ok(n) = v.parse() {
                self.max_repo_age_days = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_REPO_SIZE_KB") {
            if let Ok(n) = v.parse() {
                self.max_repo_size_kb = n;
            }
        }
        self.git_http_proxy = std::env::var("GIT_HTTP_PROXY").ok();
        self.git_https_proxy = std::env::var("GIT_HTTPS_PROXY").ok();
        self.git_proxy_command = std::env::var("GIT_PROXY_COMMAND").ok();
        self
    }

    /// Load a TOML config file on top of the defaults, then apply
    /// environment overrides (env wins).
    pub fn load(config_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let base = match config_path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)?;
                let file_settings: PartialSettings = toml::from_str(&text)?;
                file_settings.apply_to(Self::default())
            }
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    pub fn cloned_repos_dir(&self) -> PathBuf {
        self.base_output_dir.join("cloned_repos")
    }

    pub fn restored_files_dir(&self) -> PathBuf {
        self.base_output_dir.join("restored_files")
    }

    pub fn dangling_blobs_dir(&self) -> PathBuf {
        self.base_output_dir.join("dangling_blobs")
    }

    pub fn trufflehog_results_dir(&self) -> PathBuf {
        self.base_output_dir.join("trufflehog_findings")
    }

    pub fn custom_regex_results_dir(&self) -> PathBuf {
        self.base_output_dir.join("custom_regex_findings")
    }

    /// Create every output sub-root (`exist_ok`-style: fine if already
    /// there).
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.cloned_repos_dir(),
            self.restored_files_dir(),
            self.dangling_blobs_dir(),
            self.trufflehog_results_dir(),
            self.custom_regex_results_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Subset of `Settings` accepted from a TOML config file. Every field is
/// optional so a config file only needs to mention what it overrides.
#[derive(Debug, Default, serde::Deserialize)]
struct PartialSettings {
    base_output_dir: Option<PathBuf>,
    redis_url: Option<String>,
    global_max_concurrent_pipelines: Option<i64>,
    admission_headroom: Option<i64>,
    cache_ttl_secs: Option<u64>,
    analyzer_requeue_delay_secs: Option<u64>,
    max_clone_attempts: Option<u32>,
    clone_retry_delay_secs: Option<u64>,
    repo_clone_timeout_secs: Option<u64>,
    scan_commit_depth: Option<u64>,
    scanner_timeout_secs: Option<u64>,
    max_file_size_to_scan_bytes: Option<u64>,
    max_repos_per_org: Option<usize>,
    max_repo_age_days: Option<i64>,
    max_repo_size_kb: Option<u64>,
    submit_batch_size: Option<usize>,
    submit_check_interval_secs: Option<u64>,
}

impl PartialSettings {
    fn apply_to(self, mut base: Settings) -> Settings {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    base.$field = v;
                }
            };
        }
        overlay!(base_output_dir);
        overlay!(redis_url);
        overlay!(global_max_concurrent_pipelines);
        overlay!(admission_headroom);
        overlay!(cache_ttl_secs);
        overlay!(analyzer_requeue_delay_secs);
        overlay!(max_clone_attempts);
        overlay!(clone_retry_delay_secs);
        overlay!(repo_clone_timeout_secs);
        overlay!(scan_commit_depth);
        overlay!(scanner_timeout_secs);
        overlay!(max_file_size_to_scan_bytes);
        overlay!(max_repos_per_org);
        overlay!(max_repo_age_days);
        overlay!(max_repo_size_kb);
        overlay!(submit_batch_size);
        overlay!(submit_check_interval_secs);
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.global_max_concurrent_pipelines, 10);
        assert_eq!(s.max_clone_attempts, 3);
    }

    #[test]
    fn ensure_directories_creates_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = Settings::default();
        s.base_output_dir = tmp.path().join("out");
        s.ensure_directories().unwrap();
        assert!(s.cloned_repos_dir().is_dir());
        assert!(s.dangling_blobs_dir().is_dir());
    }
}

// src/config/boamp.rs
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

use crate::ingest::dedup::DedupPolicy;
use crate::ingest::fetcher::{
    FetchTuning, RetryPolicy, DEFAULT_PAGE_SIZE, SOURCE_MAX_PAGE_SIZE,
};
use crate::ingest::providers::boamp::DEFAULT_BASE_URL;

pub const DEFAULT_CONFIG_PATH: &str = "config/boamp.toml";
pub const ENV_CONFIG_PATH: &str = "BOAMP_CONFIG_PATH";
pub const ENV_BASE_URL: &str = "BOAMP_BASE_URL";

fn default_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    format!("boamp-ingest/{}", env!("CARGO_PKG_VERSION"))
}
fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoampConfig {
    pub fetch: FetchConfig,
    pub dedup: DedupConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    /// Clamped to 1..=100.
    pub page_size: u32,
    /// Unset means "until the source is exhausted".
    pub max_pages: Option<u32>,
    pub min_request_interval_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            min_request_interval_ms: 250,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    pub fn tuning(&self) -> FetchTuning {
        FetchTuning {
            page_size: self.page_size,
            max_pages: self.max_pages,
            min_request_interval: Duration::from_millis(self.min_request_interval_ms),
            retry: self.retry.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub policy: DedupPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Budget for one `/tenders` ingestion run; the run is cancelled past it.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BoampConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: BoampConfig = toml::from_str(s).context("parsing boamp config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading boamp config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// $BOAMP_CONFIG_PATH, then `config/boamp.toml`, else defaults.
    /// $BOAMP_BASE_URL overrides the endpoint in every case.
    pub fn load_default() -> anyhow::Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            BoampConfig::default()
        };

        if let Ok(url) = env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                cfg.fetch.base_url = url.trim().to_string();
            }
        }
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        let f = &mut self.fetch;
        f.page_size = f.page_size.clamp(1, SOURCE_MAX_PAGE_SIZE);
        if f.base_url.trim().is_empty() {
            f.base_url = DEFAULT_BASE_URL.to_string();
        }
        if f.user_agent.trim().is_empty() {
            f.user_agent = default_user_agent();
        }
        if f.timeout_secs == 0 {
            f.timeout_secs = default_timeout_secs();
        }

        let r = &mut f.retry;
        r.max_attempts = r.max_attempts.max(1);
        if r.max_delay_ms < r.base_delay_ms {
            // keep a valid interval
            std::mem::swap(&mut r.base_delay_ms, &mut r.max_delay_ms);
        }
        if !r.backoff_multiplier.is_finite() || r.backoff_multiplier < 1.0 {
            r.backoff_multiplier = RetryPolicy::default().backoff_multiplier;
        }

        if self.api.request_timeout_secs == 0 {
            self.api.request_timeout_secs = default_request_timeout_secs();
        }
    }
}

// src/ingest/providers/boamp.rs
//! BOAMP open-data records endpoint (Opendatasoft explore API v2.1).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::boamp::FetchConfig;
use crate::ingest::error::PageError;
use crate::ingest::types::{PageRequest, PageSource, RawPage};

pub const DEFAULT_BASE_URL: &str =
    "https://boamp-datadila.opendatasoft.com/api/explore/v2.1/catalog/datasets/boamp/records";

/// Newest first, id as tie-breaker so pages stay stable between requests.
const ORDER_BY: &str = "dateparution desc, idweb";

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    total_count: Option<u64>,
    results: Vec<serde_json::Value>,
}

pub struct BoampHttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl BoampHttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("building BOAMP http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(cfg: &FetchConfig) -> Result<Self> {
        Self::new(
            cfg.base_url.clone(),
            Duration::from_secs(cfg.timeout_secs),
            &cfg.user_agent,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PageSource for BoampHttpSource {
    async fn fetch_page(&self, req: &PageRequest) -> Result<RawPage, PageError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&query_params(req))
            .send()
            .await
            .map_err(|e| PageError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, OffsetDateTime::now_utc()));
            return Err(PageError::Status {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| PageError::Network(e.to_string()))?;
        parse_page(&body)
    }

    fn name(&self) -> &'static str {
        "BOAMP"
    }
}

pub fn query_params(req: &PageRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("limit", req.limit.to_string()),
        ("offset", req.offset.to_string()),
        ("order_by", ORDER_BY.to_string()),
    ];
    if let Some(w) = where_clause(req.since, req.until) {
        params.push(("where", w));
    }
    params
}

/// ODSQL filter on the publication date window, inclusive on both ends.
pub fn where_clause(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(d) = since {
        parts.push(format!("dateparution >= date'{}'", d.format("%Y-%m-%d")));
    }
    if let Some(d) = until {
        parts.push(format!("dateparution <= date'{}'", d.format("%Y-%m-%d")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

pub fn parse_page(body: &[u8]) -> Result<RawPage, PageError> {
    let resp: RecordsResponse =
        serde_json::from_slice(body).map_err(|e| PageError::Decode(e.to_string()))?;
    let mut page = RawPage::from_values(resp.results);
    page.total_count = resp.total_count;
    Ok(page)
}

/// `Retry-After` as delta-seconds or an HTTP date. Dates in the past mean "now".
pub fn parse_retry_after(value: &str, now: OffsetDateTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = OffsetDateTime::parse(value, &Rfc2822).ok()?;
    let delta = (at - now).whole_seconds();
    Some(Duration::from_secs(u64::try_from(delta).unwrap_or(0)))
}

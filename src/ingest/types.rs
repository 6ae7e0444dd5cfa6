// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::error::PageError;

/// One notice exactly as the bulletin returned it. Only the normalizer looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawNoticeRecord(pub serde_json::Value);

/// One page of raw records plus whatever pagination metadata the source reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub records: Vec<RawNoticeRecord>,
    pub total_count: Option<u64>,
}

impl RawPage {
    pub fn from_values(values: Vec<serde_json::Value>) -> Self {
        Self {
            records: values.into_iter().map(RawNoticeRecord).collect(),
            total_count: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_count = Some(total);
        self
    }
}

/// Parameters of a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u32,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

/// Caller-facing query for one ingestion run. Unset fields fall back to the fetch config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TenderQuery {
    #[serde(default)]
    pub since: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// Transport for one page of notices. The fetcher owns pagination, retries and pacing.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, req: &PageRequest) -> Result<RawPage, PageError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
}

/// A Common Procurement Vocabulary code. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CpvCode(String);

impl CpvCode {
    /// Trims the input; blank input means "no code".
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            None
        } else {
            Some(Self(t.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two characters (the CPV division), if the code is long enough.
    pub fn division(&self) -> Option<&str> {
        self.0.get(..2)
    }
}

/// A normalized but not yet classified notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub buyer: Buyer,
    pub cpv: Option<CpvCode>,
    pub publication_date: Option<String>,
    pub response_deadline: Option<String>,
    pub notice_kind: Option<String>,
    pub url: Option<String>,
    pub revised_at: Option<DateTime<Utc>>,
}

/// Canonical, classified tender. Read-only once built; only the classifier constructs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tender {
    id: String,
    title: String,
    buyer: Buyer,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpv: Option<CpvCode>,
    is_defense_equipment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    publication_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revised_at: Option<DateTime<Utc>>,
}

impl Tender {
    pub(crate) fn from_notice(notice: Notice, is_defense_equipment: bool) -> Self {
        Self {
            id: notice.id,
            title: notice.title,
            buyer: notice.buyer,
            cpv: notice.cpv,
            is_defense_equipment,
            publication_date: notice.publication_date,
            response_deadline: notice.response_deadline,
            notice_kind: notice.notice_kind,
            url: notice.url,
            revised_at: notice.revised_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn buyer(&self) -> &Buyer {
        &self.buyer
    }
    pub fn cpv(&self) -> Option<&CpvCode> {
        self.cpv.as_ref()
    }
    pub fn is_defense_equipment(&self) -> bool {
        self.is_defense_equipment
    }
    pub fn publication_date(&self) -> Option<&str> {
        self.publication_date.as_deref()
    }
    pub fn response_deadline(&self) -> Option<&str> {
        self.response_deadline.as_deref()
    }
    pub fn notice_kind(&self) -> Option<&str> {
        self.notice_kind.as_deref()
    }
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
    pub fn revised_at(&self) -> Option<DateTime<Utc>> {
        self.revised_at
    }
}

/// Side-channel summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub pages: u32,
    pub records: u64,
    pub dropped: u64,
    pub duplicates: u64,
    pub replaced: u64,
    pub defense: u64,
    pub elapsed_ms: u64,
}

/// Completed result of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub tenders: Vec<Tender>,
    pub report: IngestReport,
}

// src/ingest/error.rs
//! Error taxonomy of an ingestion run.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single page request, before the retry policy is applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("HTTP status {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("undecodable page body: {0}")]
    Decode(String),
}

impl PageError {
    /// Network failures, 5xx and 429 are transient; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            PageError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            PageError::Network(_) => true,
            PageError::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PageError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PageError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Fatal fetch failure. Aborts the whole run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "fetching page at offset {offset} failed after {attempts} attempt(s), last status {}: {cause}",
    display_status(.status)
)]
pub struct FetchError {
    pub offset: u64,
    pub status: Option<u16>,
    pub attempts: u32,
    #[source]
    pub cause: PageError,
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// Per-record failure. The record is dropped and the run continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("notice has no identifier")]
    MissingId,

    #[error("notice {id} has no title")]
    MissingTitle { id: String },

    #[error("notice is malformed: {0}")]
    Malformed(String),
}

/// Outcome of a run that did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("ingestion run cancelled")]
    Cancelled,
}

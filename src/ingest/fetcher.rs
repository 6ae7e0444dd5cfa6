// src/ingest/fetcher.rs
//! Paginated, paced retrieval of raw notice pages.
//!
//! [`Pager`] is the synchronous pagination state machine; [`Fetcher`] drives it against a
//! [`PageSource`], sleeping for backoff and pacing and honouring cancellation.

use std::time::Duration;

use futures::Stream;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ingest::error::{FetchError, IngestError, PageError};
use crate::ingest::types::{PageRequest, PageSource, RawNoticeRecord, RawPage, TenderQuery};

/// Largest `limit` the open-data records endpoint accepts.
pub const SOURCE_MAX_PAGE_SIZE: u32 = 100;
/// The endpoint refuses requests with `offset + limit` above this.
pub const SOURCE_RESULT_WINDOW: u64 = 10_000;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Bounded exponential backoff for transient page failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Backoff after `attempt` failed attempts (1-based): `base * multiplier^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        let ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Wait before the next attempt. A server hint wins when it is longer than the backoff;
    /// the result never exceeds the cap.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        let cap = Duration::from_millis(self.max_delay_ms);
        retry_after
            .map_or(backoff, |hint| hint.max(backoff))
            .min(cap)
    }
}

/// Pagination and pacing knobs resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTuning {
    pub page_size: u32,
    pub max_pages: Option<u32>,
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchTuning {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            min_request_interval: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    EmptyPage,
    ShortPage,
    TotalReached,
    PageLimit,
    ResultWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PagerState {
    /// Next step is request number `attempt` (1-based) for the page at `offset`.
    Requesting { offset: u64, attempt: u32 },
    /// `attempt` attempts failed; wait `delay` before the next one.
    AwaitingBackoff {
        offset: u64,
        attempt: u32,
        delay: Duration,
    },
    Exhausted { reason: ExhaustReason },
    Failed(FetchError),
}

/// Pagination state machine. Pure: callers report outcomes, the pager decides what is next.
#[derive(Debug, Clone)]
pub struct Pager {
    state: PagerState,
    page_size: u32,
    max_pages: Option<u32>,
    retry: RetryPolicy,
    pages_done: u32,
    last_status: Option<u16>,
}

impl Pager {
    pub fn new(page_size: u32, max_pages: Option<u32>, retry: RetryPolicy) -> Self {
        let state = if max_pages == Some(0) {
            PagerState::Exhausted {
                reason: ExhaustReason::PageLimit,
            }
        } else {
            PagerState::Requesting {
                offset: 0,
                attempt: 1,
            }
        };
        Self {
            state,
            page_size: page_size.clamp(1, SOURCE_MAX_PAGE_SIZE),
            max_pages,
            retry,
            pages_done: 0,
            last_status: None,
        }
    }

    pub fn state(&self) -> &PagerState {
        &self.state
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn pages_done(&self) -> u32 {
        self.pages_done
    }

    /// Request to issue in the `Requesting` state.
    pub fn request(&self, query: &TenderQuery) -> Option<PageRequest> {
        match self.state {
            PagerState::Requesting { offset, .. } => Some(PageRequest {
                offset,
                limit: self.page_size,
                since: query.since,
                until: query.until,
            }),
            _ => None,
        }
    }

    pub fn on_page(&mut self, page: &RawPage) {
        let PagerState::Requesting { offset, .. } = self.state else {
            return;
        };
        self.pages_done += 1;
        self.last_status = None;

        let n = page.records.len() as u64;
        let next = offset + n;
        let reason = if n == 0 {
            Some(ExhaustReason::EmptyPage)
        } else if let Some(total) = page.total_count {
            (next >= total).then_some(ExhaustReason::TotalReached)
        } else {
            (n < u64::from(self.page_size)).then_some(ExhaustReason::ShortPage)
        };
        let reason = reason.or_else(|| {
            if self.max_pages.is_some_and(|m| self.pages_done >= m) {
                Some(ExhaustReason::PageLimit)
            } else if next + u64::from(self.page_size) > SOURCE_RESULT_WINDOW {
                Some(ExhaustReason::ResultWindow)
            } else {
                None
            }
        });

        self.state = match reason {
            Some(reason) => PagerState::Exhausted { reason },
            None => PagerState::Requesting {
                offset: next,
                attempt: 1,
            },
        };
    }

    pub fn on_error(&mut self, err: PageError) {
        let PagerState::Requesting { offset, attempt } = self.state else {
            return;
        };
        if let Some(status) = err.status() {
            self.last_status = Some(status);
        }
        if err.is_retryable() && attempt < self.retry.max_attempts {
            let delay = self.retry.delay_for(attempt, err.retry_after());
            self.state = PagerState::AwaitingBackoff {
                offset,
                attempt,
                delay,
            };
        } else {
            self.state = PagerState::Failed(FetchError {
                offset,
                status: err.status().or(self.last_status),
                attempts: attempt,
                cause: err,
            });
        }
    }

    pub fn on_backoff_elapsed(&mut self) {
        if let PagerState::AwaitingBackoff {
            offset, attempt, ..
        } = self.state
        {
            self.state = PagerState::Requesting {
                offset,
                attempt: attempt + 1,
            };
        }
    }
}

/// One successfully fetched page, tagged with its position in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub index: u32,
    pub offset: u64,
    pub records: Vec<RawNoticeRecord>,
}

/// Drives a [`Pager`] against a [`PageSource`]. Single-use: one fetcher per run.
pub struct Fetcher<'a> {
    source: &'a dyn PageSource,
    query: TenderQuery,
    pager: Pager,
    min_interval: Duration,
    last_request: Option<Instant>,
    cancel: CancellationToken,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        source: &'a dyn PageSource,
        query: TenderQuery,
        tuning: &FetchTuning,
        cancel: CancellationToken,
    ) -> Self {
        let pager = Pager::new(
            query.page_size.unwrap_or(tuning.page_size),
            query.max_pages.or(tuning.max_pages),
            tuning.retry.clone(),
        );
        Self {
            source,
            query,
            pager,
            min_interval: tuning.min_request_interval,
            last_request: None,
            cancel,
        }
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Next batch of raw records, `Ok(None)` once the source is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<FetchedPage>, IngestError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            match self.pager.state().clone() {
                PagerState::Exhausted { reason } => {
                    tracing::debug!(
                        target: "ingest",
                        source = self.source.name(),
                        pages = self.pager.pages_done(),
                        ?reason,
                        "pagination exhausted"
                    );
                    return Ok(None);
                }
                PagerState::Failed(err) => {
                    counter!("ingest_fetch_errors_total").increment(1);
                    return Err(err.into());
                }
                PagerState::AwaitingBackoff {
                    offset,
                    attempt,
                    delay,
                } => {
                    counter!("ingest_fetch_retries_total").increment(1);
                    tracing::warn!(
                        target: "ingest",
                        source = self.source.name(),
                        offset,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "page request failed, backing off"
                    );
                    self.sleep(delay).await?;
                    self.pager.on_backoff_elapsed();
                }
                PagerState::Requesting { offset, .. } => {
                    let Some(req) = self.pager.request(&self.query) else {
                        continue;
                    };
                    self.pace().await?;

                    let t0 = Instant::now();
                    let res = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
                        res = self.source.fetch_page(&req) => res,
                    };
                    histogram!("ingest_page_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

                    match res {
                        Ok(page) => {
                            self.pager.on_page(&page);
                            counter!("ingest_pages_total").increment(1);
                            if page.records.is_empty() {
                                continue;
                            }
                            return Ok(Some(FetchedPage {
                                index: self.pager.pages_done() - 1,
                                offset,
                                records: page.records,
                            }));
                        }
                        Err(e) => {
                            tracing::debug!(target: "ingest", offset, error = %e, "page request error");
                            self.pager.on_error(e);
                        }
                    }
                }
            }
        }
    }

    /// Lazy stream of batches; ends after exhaustion or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<FetchedPage, IngestError>> + 'a {
        futures::stream::try_unfold(self, |mut fetcher| async move {
            let next = fetcher.next_batch().await?;
            Ok::<_, IngestError>(next.map(|page| (page, fetcher)))
        })
    }

    async fn pace(&mut self) -> Result<(), IngestError> {
        if let Some(last) = self.last_request {
            let since = last.elapsed();
            if since < self.min_interval {
                self.sleep(self.min_interval - since).await?;
            }
        }
        self.last_request = Some(Instant::now());
        Ok(())
    }

    async fn sleep(&self, d: Duration) -> Result<(), IngestError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            _ = tokio::time::sleep(d) => Ok(()),
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::ingest::error::IngestError;
use crate::ingest::types::{IngestReport, Tender, TenderQuery};
use crate::ingest::{fetch_defense_tenders_from_api, Ingestor};

#[derive(Clone)]
pub struct AppState {
    ingestor: Arc<Ingestor>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(ingestor: Ingestor, request_timeout: Duration) -> Self {
        Self {
            ingestor: Arc::new(ingestor),
            request_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/tenders", get(list_tenders))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, serde::Deserialize)]
struct TendersParams {
    #[serde(default)]
    defense_only: bool,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    since: Option<NaiveDate>,
    #[serde(default)]
    until: Option<NaiveDate>,
    #[serde(default)]
    max_pages: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

#[derive(serde::Serialize)]
struct TendersResp {
    /// Tenders in this response, after filtering and slicing.
    count: usize,
    /// Tenders produced by the run.
    total: usize,
    defense_count: usize,
    report: IngestReport,
    tenders: Vec<Tender>,
}

#[derive(serde::Serialize)]
struct ErrorResp {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

/// Runs one ingestion per request. The run is cancelled once the request budget is spent.
async fn list_tenders(State(state): State<AppState>, Query(p): Query<TendersParams>) -> Response {
    let query = TenderQuery {
        since: p.since,
        until: p.until,
        page_size: p.page_size,
        max_pages: p.max_pages,
    };

    let cancel = CancellationToken::new();
    // Cancels the token when the handler returns or is dropped, which also ends the watchdog.
    let _guard = cancel.clone().drop_guard();
    tokio::spawn(budget_watchdog(cancel.clone(), state.request_timeout));
    let result = fetch_defense_tenders_from_api(&state.ingestor, Some(&query), &cancel).await;

    match result {
        Ok(outcome) => {
            let total = outcome.tenders.len();
            let mut tenders: Vec<Tender> = outcome
                .tenders
                .into_iter()
                .filter(|t| !p.defense_only || t.is_defense_equipment())
                .collect();
            if let Some(limit) = p.limit {
                tenders.truncate(limit);
            }
            let defense_count = tenders.iter().filter(|t| t.is_defense_equipment()).count();
            Json(TendersResp {
                count: tenders.len(),
                total,
                defense_count,
                report: outcome.report,
                tenders,
            })
            .into_response()
        }
        Err(IngestError::Fetch(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResp {
                error: e.to_string(),
                offset: Some(e.offset),
                status: e.status,
            }),
        )
            .into_response(),
        Err(IngestError::Cancelled) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ErrorResp {
                error: format!(
                    "ingestion cancelled after {}s request budget",
                    state.request_timeout.as_secs()
                ),
                offset: None,
                status: None,
            }),
        )
            .into_response(),
    }
}

/// Cancels the run once `budget` is spent; returns early when the run is already over.
async fn budget_watchdog(cancel: CancellationToken, budget: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(budget) => cancel.cancel(),
    }
}

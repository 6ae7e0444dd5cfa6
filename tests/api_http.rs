// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /tenders (full run, defense_only + limit, fetch failure, request budget)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use boamp_ingest::api::{self, AppState};
use boamp_ingest::ingest::classify::{BuyerAllowlist, Classifier};
use boamp_ingest::ingest::dedup::DedupPolicy;
use boamp_ingest::ingest::error::PageError;
use boamp_ingest::ingest::fetcher::{FetchTuning, RetryPolicy};
use boamp_ingest::ingest::providers::scripted::ScriptedSource;
use boamp_ingest::ingest::types::{PageRequest, PageSource, RawPage};
use boamp_ingest::Ingestor;

const BODY_LIMIT: usize = 1024 * 1024;

fn tuning() -> FetchTuning {
    FetchTuning {
        page_size: 2,
        max_pages: None,
        min_request_interval: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        },
    }
}

fn app_with(source: Arc<dyn PageSource>, budget: Duration) -> Router {
    let ingestor = Ingestor::new(
        source,
        Classifier::new(Arc::new(BuyerAllowlist::new(["Marine nationale"]))),
        tuning(),
        DedupPolicy::FirstSeenWins,
    );
    api::router(AppState::new(ingestor, budget))
}

fn scripted_app() -> Router {
    let src = ScriptedSource::from_pages(vec![
        vec![
            json!({ "idweb": "1", "objet": "Munitions", "cpv": "35330000", "nomacheteur": "SIMu" }),
            json!({ "idweb": "2", "objet": "Cantine", "cpv": "55520000", "nomacheteur": "Lycée Jean Moulin" }),
        ],
        vec![
            json!({ "idweb": "3", "objet": "Pièces navales", "nomacheteur": "MARINE NATIONALE - Toulon" }),
            json!({ "idweb": "1", "objet": "Munitions (modif)", "cpv": "35330000" }),
        ],
    ]);
    app_with(Arc::new(src), Duration::from_secs(10))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json body");
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = scripted_app().oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "ok");
}

#[tokio::test]
async fn tenders_returns_classified_deduplicated_list() {
    let (status, v) = get_json(scripted_app(), "/tenders").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(v["count"], 3);
    assert_eq!(v["total"], 3);
    assert_eq!(v["defense_count"], 2);
    assert_eq!(v["report"]["duplicates"], 1);

    let tenders = v["tenders"].as_array().expect("tenders array");
    let ids: Vec<_> = tenders.iter().map(|t| t["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    // contract for UI consumers
    let first = &tenders[0];
    assert_eq!(first["title"], "Munitions");
    assert_eq!(first["cpv"], "35330000");
    assert_eq!(first["isDefenseEquipment"], true);
    assert_eq!(first["buyer"]["name"], "SIMu");
    assert_eq!(tenders[1]["isDefenseEquipment"], false);
}

#[tokio::test]
async fn tenders_defense_only_and_limit() {
    let (status, v) = get_json(scripted_app(), "/tenders?defense_only=true&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["count"], 1);
    assert_eq!(v["total"], 3);
    let tenders = v["tenders"].as_array().unwrap();
    assert_eq!(tenders[0]["id"], "1");
    assert!(tenders
        .iter()
        .all(|t| t["isDefenseEquipment"].as_bool() == Some(true)));
}

#[tokio::test]
async fn fetch_failure_maps_to_bad_gateway() {
    let src = ScriptedSource::new(vec![
        Ok(RawPage::from_values(vec![
            json!({ "idweb": "1", "objet": "a" }),
            json!({ "idweb": "2", "objet": "b" }),
        ])),
        Err(PageError::Status {
            status: 500,
            retry_after: None,
        }),
    ]);
    let (status, v) = get_json(app_with(Arc::new(src), Duration::from_secs(10)), "/tenders").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(v["offset"], 2);
    assert_eq!(v["status"], 500);
    assert!(v.get("tenders").is_none(), "no partial results on failure");
}

/// Never answers.
struct StalledSource;

#[async_trait]
impl PageSource for StalledSource {
    async fn fetch_page(&self, _req: &PageRequest) -> Result<RawPage, PageError> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "Stalled"
    }
}

#[tokio::test]
async fn exhausted_request_budget_maps_to_gateway_timeout() {
    let app = app_with(Arc::new(StalledSource), Duration::from_millis(50));
    let (status, v) = get_json(app, "/tenders").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(v["error"].as_str().unwrap().contains("cancelled"));
}

#[tokio::test]
async fn invalid_query_is_rejected() {
    let req = Request::builder()
        .uri("/tenders?since=not-a-date")
        .body(Body::empty())
        .unwrap();
    let resp = scripted_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// src/ingest/mod.rs
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod providers;
pub mod types;

use std::sync::Arc;

use futures::TryStreamExt;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::boamp::BoampConfig;
use crate::ingest::classify::{BuyerAllowlist, Classifier};
use crate::ingest::dedup::{DedupPolicy, Deduplicator};
use crate::ingest::error::IngestError;
use crate::ingest::fetcher::{FetchTuning, Fetcher};
use crate::ingest::normalize::normalize;
use crate::ingest::providers::boamp::BoampHttpSource;
use crate::ingest::types::{IngestOutcome, IngestReport, PageSource, TenderQuery};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_pages_total", "Pages fetched from the bulletin.");
        describe_counter!("ingest_records_total", "Raw notice records received.");
        describe_counter!(
            "ingest_dropped_total",
            "Records dropped because they failed normalization."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Records collapsed into an already seen notice id."
        );
        describe_counter!(
            "ingest_defense_total",
            "Tenders classified as defense equipment."
        );
        describe_counter!(
            "ingest_fetch_retries_total",
            "Page requests retried after a transient failure."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Runs aborted by a fatal fetch error."
        );
        describe_counter!("ingest_runs_total", "Completed ingestion runs.");
        describe_histogram!("ingest_page_fetch_ms", "Page request time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when an ingestion run last completed."
        );
    });
}

/// Fetcher → normalizer → classifier → deduplicator, wired once and run per call.
pub struct Ingestor {
    source: Arc<dyn PageSource>,
    classifier: Classifier,
    tuning: FetchTuning,
    policy: DedupPolicy,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn PageSource>,
        classifier: Classifier,
        tuning: FetchTuning,
        policy: DedupPolicy,
    ) -> Self {
        Self {
            source,
            classifier,
            tuning,
            policy,
        }
    }

    /// Production wiring: BOAMP HTTP source plus the given allowlist.
    pub fn from_config(cfg: &BoampConfig, allowlist: BuyerAllowlist) -> anyhow::Result<Self> {
        let source = BoampHttpSource::from_config(&cfg.fetch)?;
        Ok(Self::new(
            Arc::new(source),
            Classifier::new(Arc::new(allowlist)),
            cfg.fetch.tuning(),
            cfg.dedup.policy,
        ))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run the whole pipeline. Nothing is returned until the source is exhausted;
    /// a fetch failure or cancellation discards everything gathered so far.
    pub async fn run(
        &self,
        query: &TenderQuery,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, IngestError> {
        ensure_metrics_described();
        let started = Instant::now();

        let fetcher = Fetcher::new(
            self.source.as_ref(),
            query.clone(),
            &self.tuning,
            cancel.clone(),
        );
        let mut pages = std::pin::pin!(fetcher.into_stream());
        let mut dedup = Deduplicator::new(self.policy);
        let mut report = IngestReport::default();

        loop {
            let page = match pages.try_next().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    match &e {
                        IngestError::Cancelled => tracing::info!(
                            target: "ingest",
                            source = self.source.name(),
                            pages = report.pages,
                            "ingestion run cancelled, discarding partial results"
                        ),
                        IngestError::Fetch(err) => tracing::warn!(
                            target: "ingest",
                            source = self.source.name(),
                            offset = err.offset,
                            status = ?err.status,
                            attempts = err.attempts,
                            error = %err,
                            "ingestion run failed, discarding partial results"
                        ),
                    }
                    return Err(e);
                }
            };

            report.pages += 1;
            for (position, raw) in page.records.iter().enumerate() {
                report.records += 1;
                match normalize(raw) {
                    Ok(notice) => {
                        dedup.insert(self.classifier.label(notice));
                    }
                    Err(e) => {
                        report.dropped += 1;
                        tracing::warn!(
                            target: "ingest",
                            page = page.index,
                            position,
                            error = %e,
                            "dropping notice that failed normalization"
                        );
                    }
                }
            }
        }

        report.duplicates = dedup.duplicates();
        report.replaced = dedup.replaced();
        let tenders = dedup.into_tenders();
        report.defense = tenders.iter().filter(|t| t.is_defense_equipment()).count() as u64;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        // Telemetry
        counter!("ingest_records_total").increment(report.records);
        counter!("ingest_dropped_total").increment(report.dropped);
        counter!("ingest_dedup_total").increment(report.duplicates);
        counter!("ingest_defense_total").increment(report.defense);
        counter!("ingest_runs_total").increment(1);
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        gauge!("ingest_pipeline_last_run_ts").set(now as f64);

        tracing::info!(
            target: "ingest",
            source = self.source.name(),
            pages = report.pages,
            kept = tenders.len(),
            defense = report.defense,
            dropped = report.dropped,
            duplicates = report.duplicates,
            elapsed_ms = report.elapsed_ms,
            "ingestion run finished"
        );

        Ok(IngestOutcome { tenders, report })
    }
}

/// Entry point for UI/CLI callers: one full, fresh run of the pipeline.
pub async fn fetch_defense_tenders_from_api(
    ingestor: &Ingestor,
    query: Option<&TenderQuery>,
    cancel: &CancellationToken,
) -> Result<IngestOutcome, IngestError> {
    let default_query = TenderQuery::default();
    ingestor
        .run(query.unwrap_or(&default_query), cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::providers::scripted::ScriptedSource;
    use serde_json::json;

    fn ingestor(source: ScriptedSource, page_size: u32) -> Ingestor {
        Ingestor::new(
            Arc::new(source),
            Classifier::new(Arc::new(BuyerAllowlist::new(["Ministère des Armées"]))),
            FetchTuning {
                page_size,
                ..Default::default()
            },
            DedupPolicy::FirstSeenWins,
        )
    }

    #[tokio::test]
    async fn report_counts_dropped_and_duplicates() {
        let src = ScriptedSource::from_pages(vec![
            vec![
                json!({"idweb": "1", "objet": "A", "nomacheteur": "Ministère des armées"}),
                json!({"objet": "no id"}),
            ],
            vec![
                json!({"idweb": "1", "objet": "A again"}),
                json!({"idweb": "2", "objet": "B", "cpv": "45000000"}),
            ],
        ]);
        let out = ingestor(src, 2)
            .run(&TenderQuery::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.tenders.len(), 2);
        assert_eq!(out.report.pages, 2); // trailing empty page is not a batch
        assert_eq!(out.report.records, 4);
        assert_eq!(out.report.dropped, 1);
        assert_eq!(out.report.duplicates, 1);
        assert_eq!(out.report.defense, 1);
        assert!(out.tenders[0].is_defense_equipment());
        assert!(!out.tenders[1].is_defense_equipment());
    }

    #[tokio::test]
    async fn every_run_starts_from_an_empty_index() {
        let src = ScriptedSource::from_pages(vec![
            vec![json!({"idweb": "1", "objet": "A"})],
            vec![json!({"idweb": "1", "objet": "A"})],
        ]);
        let ing = ingestor(src, 10);
        let cancel = CancellationToken::new();
        let first = ing.run(&TenderQuery::default(), &cancel).await.unwrap();
        let second = ing.run(&TenderQuery::default(), &cancel).await.unwrap();
        assert_eq!(first.tenders.len(), 1);
        assert_eq!(second.tenders.len(), 1);
        assert_eq!(second.report.duplicates, 0);
    }
}

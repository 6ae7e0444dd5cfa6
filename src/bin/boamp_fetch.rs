//! One-shot ingestion: `boamp-fetch [max_pages]`. Prints tenders as JSON on stdout.
//! Ctrl-C cancels the run; nothing is printed for a cancelled or failed run.

use anyhow::Context;
use boamp_ingest::config::boamp::BoampConfig;
use boamp_ingest::ingest::config::load_allowlist_default;
use boamp_ingest::{fetch_defense_tenders_from_api, Ingestor, TenderQuery};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    boamp_ingest::init_tracing();

    let max_pages = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u32>())
        .transpose()
        .context("max_pages must be a non-negative integer")?;

    let cfg = BoampConfig::load_default()?;
    let allowlist = load_allowlist_default()?;
    let ingestor = Ingestor::from_config(&cfg, allowlist)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let query = TenderQuery {
        max_pages,
        ..Default::default()
    };
    let outcome = fetch_defense_tenders_from_api(&ingestor, Some(&query), &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.tenders)?);
    tracing::info!(
        total = outcome.tenders.len(),
        defense = outcome.report.defense,
        dropped = outcome.report.dropped,
        "boamp-fetch done"
    );
    Ok(())
}

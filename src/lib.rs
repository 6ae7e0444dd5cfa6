// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::ingest::error::{FetchError, IngestError, NormalizationError};
pub use crate::ingest::types::{Buyer, CpvCode, IngestOutcome, IngestReport, Tender, TenderQuery};
pub use crate::ingest::{fetch_defense_tenders_from_api, Ingestor};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a compact `tracing` subscriber honouring `RUST_LOG`.
/// Default filter: `boamp_ingest=info,ingest=info,warn`. A subscriber installed by the host
/// runtime takes precedence; this is then a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("boamp_ingest=info,ingest=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

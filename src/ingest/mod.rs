pub mod document;
pub mod normalizer;

use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::ingest::document::{build, MISSING, NULL_SENTINEL};
use crate::ingest::normalizer::normalize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Derive ids from source URLs so re-ingesting a file overwrites
    /// instead of duplicating.
    pub stable_ids: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { stable_ids: true }
    }
}

/// Outcome counters for one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub indexed: usize,
    pub skipped: usize,
}

/// Drives raw records through normalize → build → one batch upsert.
/// Malformed records are skipped and logged, never fatal; index
/// failures abort the run.
pub struct Ingestor {
    index: Arc<dyn VectorIndex>,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(index: Arc<dyn VectorIndex>, options: IngestOptions) -> Self {
        Self { index, options }
    }

    /// Reads a JSON file holding a top-level array of raw records and
    /// ingests it.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let raw = tokio::fs::read_to_string(path).await?;
        let parsed: Value = serde_json::from_str(&raw)?;

        let Some(records) = parsed.as_array() else {
            return Err(Error::Validation(format!(
                "{} does not contain a JSON array of records",
                path.display()
            )));
        };

        info!("Ingesting {} records from {}", records.len(), path.display());
        self.ingest_records(records).await
    }

    /// Normalizes and builds each record, then submits everything that
    /// survived as a single batch upsert.
    pub async fn ingest_records(&self, records: &[Value]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut batch = Vec::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            match normalize(record) {
                Ok(doc) => {
                    let mut indexed = build(&doc);
                    if self.options.stable_ids {
                        if let Some(id) = stable_document_id(&doc.source_url) {
                            indexed.id = id;
                        }
                    }
                    batch.push(indexed);
                }
                Err(e) => {
                    warn!("Skipping record {position} ({}): {e}", record_label(record));
                    report.skipped += 1;
                }
            }
        }

        if batch.is_empty() {
            info!("Nothing to index ({} records skipped)", report.skipped);
            return Ok(report);
        }

        let ids = self.index.upsert(batch).await?;
        report.indexed = ids.len();

        info!(
            "Indexed {} documents ({} skipped)",
            report.indexed, report.skipped
        );
        Ok(report)
    }
}

/// Identity for idempotent re-ingestion: a UUID derived from the source
/// URL, so the same recipe lands on the same point. Records without a
/// usable source URL keep their random id.
pub fn stable_document_id(source_url: &str) -> Option<Uuid> {
    if source_url.is_empty() || source_url == MISSING || source_url == NULL_SENTINEL {
        return None;
    }
    Some(Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes()))
}

fn record_label(record: &Value) -> String {
    record
        .get("recipe_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unnamed")
        .to_string()
}

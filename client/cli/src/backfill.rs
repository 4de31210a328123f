//! One-time content-hash backfill for documents indexed before hashing existed.

use crate::api::{ApiClient, HashBatch};
use crate::error::ApiError;
use std::time::Duration;

pub const BACKFILL_BATCH_SIZE: u32 = 1000;
pub const BACKFILL_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub batches: u32,
    pub updated: u64,
    pub failure: Option<ApiError>,
}

impl BackfillReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Call the populate-hashes endpoint until it reports nothing left.
/// Not cancellable; the first error ends the run.
pub async fn run_backfill<F>(
    api: &ApiClient,
    token: &str,
    delay: Duration,
    mut on_batch: F,
) -> BackfillReport
where
    F: FnMut(u32, &HashBatch, u64),
{
    let mut report = BackfillReport::default();
    loop {
        let batch = match api.populate_hashes(token, BACKFILL_BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(batch = report.batches + 1, error = %e, "hash backfill failed");
                report.failure = Some(e);
                break;
            }
        };
        report.batches += 1;
        report.updated += batch.updated;
        tracing::debug!(
            batch = report.batches,
            updated = batch.updated,
            pending = batch.pending,
            "hash batch"
        );
        on_batch(report.batches, &batch, report.updated);

        if !batch.has_more {
            break;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    report
}

//! Batched index sync: repeat the sync call until the server reports no
//! more work or the user asks to stop.

use crate::api::{ApiClient, MovedFile, SyncBatch};
use crate::error::ApiError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BATCH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl SyncState {
    /// Completed and stopped runs both leave the index in a state worth
    /// reloading filters from.
    pub fn should_reload(self) -> bool {
        matches!(self, SyncState::Completed | SyncState::Stopped)
    }
}

/// Cooperative stop flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncTotals {
    pub new_files: u64,
    pub moved_files: u64,
    pub removed_orphans: u64,
    pub time_seconds: f64,
}

impl SyncTotals {
    fn add(&mut self, batch: &SyncBatch) {
        self.new_files += batch.new_files;
        self.moved_files += batch.moved_files;
        self.removed_orphans += batch.removed_orphans;
        self.time_seconds += batch.time_seconds;
    }
}

#[derive(Debug)]
pub struct SyncReport {
    pub state: SyncState,
    pub batches: u32,
    pub totals: SyncTotals,
    /// Moved pairs from the first batch only.
    pub moved_details: Vec<MovedFile>,
    pub failure: Option<ApiError>,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub batch_size: u32,
    pub batch_delay: Duration,
}

/// Run the sync loop. `on_batch` sees every batch with its 1-based number
/// and the totals so far.
pub async fn run_sync<F>(
    api: &ApiClient,
    token: &str,
    options: &SyncOptions,
    stop: &StopHandle,
    mut on_batch: F,
) -> SyncReport
where
    F: FnMut(u32, &SyncBatch, &SyncTotals),
{
    let mut report = SyncReport {
        state: SyncState::Running,
        batches: 0,
        totals: SyncTotals::default(),
        moved_details: Vec::new(),
        failure: None,
    };

    while report.state == SyncState::Running {
        let batch = match api.sync_index(token, options.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(batch = report.batches + 1, error = %e, "sync failed");
                report.state = SyncState::Failed;
                report.failure = Some(e);
                break;
            }
        };

        report.batches += 1;
        report.totals.add(&batch);
        if report.batches == 1 {
            report.moved_details = batch.moved_details.clone();
        }
        tracing::debug!(
            batch = report.batches,
            new = batch.new_files,
            moved = batch.moved_files,
            removed = batch.removed_orphans,
            pending = batch.pending_new,
            "sync batch"
        );
        on_batch(report.batches, &batch, &report.totals);

        if !batch.has_more {
            report.state = SyncState::Completed;
        } else if stop.is_stopped() {
            report.state = SyncState::Stopped;
        } else if !options.batch_delay.is_zero() {
            tokio::time::sleep(options.batch_delay).await;
        }
    }

    tracing::info!(
        state = ?report.state,
        batches = report.batches,
        new = report.totals.new_files,
        "sync finished"
    );
    report
}

//! Chunked PDF upload.
//!
//! The selection is capped at [`MAX_UPLOAD_FILES`] and sent in chunks of
//! [`UPLOAD_CHUNK_SIZE`], one request at a time. The transport only reports
//! progress for the whole request, so every file in a chunk shows the same
//! percentage.

use crate::api::{ApiClient, PendingFile};
use crate::error::ApiError;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_UPLOAD_FILES: usize = 200;
pub const UPLOAD_CHUNK_SIZE: usize = 20;
pub const CHUNK_DELAY: Duration = Duration::from_millis(200);

pub fn is_pdf(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Files accepted for upload, plus what was left out.
#[derive(Debug, Default, PartialEq)]
pub struct UploadSelection {
    pub files: Vec<PendingFile>,
    /// PDFs dropped because the cap was reached.
    pub rejected: usize,
    pub skipped_non_pdf: usize,
}

impl UploadSelection {
    /// Expand directories recursively and keep the PDFs, in argument order.
    pub fn from_paths(paths: &[PathBuf]) -> std::io::Result<Self> {
        let mut candidates = Vec::new();
        for path in paths {
            if path.is_dir() {
                let walker = walkdir::WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file());
                for entry in walker {
                    candidates.push(entry.into_path());
                }
            } else {
                candidates.push(path.clone());
            }
        }

        let mut selection = Self::default();
        let mut pdfs = Vec::new();
        for candidate in candidates {
            if is_pdf(&candidate) {
                pdfs.push(candidate);
            } else {
                selection.skipped_non_pdf += 1;
            }
        }
        let accepted = pdfs.len().min(MAX_UPLOAD_FILES);
        selection.rejected = pdfs.len() - accepted;
        for path in pdfs.into_iter().take(accepted) {
            selection.files.push(PendingFile::from_path(&path)?);
        }
        Ok(selection)
    }

    /// Drop a file from the selection by name. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.files.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The files being sent, each with its last reported progress.
pub struct UploadBatch {
    pub files: Vec<PendingFile>,
    progress: Arc<Vec<AtomicU8>>,
}

impl UploadBatch {
    pub fn new(files: Vec<PendingFile>) -> Self {
        let progress = Arc::new(files.iter().map(|_| AtomicU8::new(0)).collect());
        Self { files, progress }
    }

    pub fn progress(&self, index: usize) -> u8 {
        self.progress
            .get(index)
            .map(|p| p.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Index ranges of the chunks, in submission order.
    pub fn chunk_ranges(&self, chunk_size: usize) -> Vec<Range<usize>> {
        let size = chunk_size.max(1);
        (0..self.files.len())
            .step_by(size)
            .map(|start| start..(start + size).min(self.files.len()))
            .collect()
    }
}

/// Receives upload events; the CLI draws progress bars from these.
pub trait UploadObserver: Send + Sync {
    fn chunk_started(&self, _index: usize, _files: Range<usize>) {}
    fn progress(&self, _files: Range<usize>, _percent: u8) {}
    fn chunk_finished(&self, _index: usize, _report: &UploadReport) {}
}

pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub folder: String,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            folder: String::new(),
            chunk_size: UPLOAD_CHUNK_SIZE,
            chunk_delay: CHUNK_DELAY,
        }
    }
}

/// Running tallies. Kept even when a chunk fails.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: u64,
    pub indexed: u64,
    pub errors: u64,
    pub chunks_sent: usize,
    pub chunks_total: usize,
    pub failure: Option<ApiError>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.chunks_sent == self.chunks_total
    }
}

/// Send every chunk in order. A chunk is never sent before the previous
/// response has been tallied; the first failed chunk ends the run.
pub async fn run_upload(
    api: &ApiClient,
    token: &str,
    batch: &UploadBatch,
    options: &UploadOptions,
    observer: Arc<dyn UploadObserver>,
) -> UploadReport {
    let chunks = batch.chunk_ranges(options.chunk_size);
    let mut report = UploadReport {
        chunks_total: chunks.len(),
        ..Default::default()
    };

    for (index, range) in chunks.iter().cloned().enumerate() {
        observer.chunk_started(index, range.clone());

        let progress = batch.progress.clone();
        let sink = observer.clone();
        let files = range.clone();
        let result = api
            .upload_files(token, &batch.files[range.clone()], &options.folder, move |percent| {
                for slot in &progress[files.clone()] {
                    slot.store(percent, Ordering::Relaxed);
                }
                sink.progress(files.clone(), percent);
            })
            .await;

        match result {
            Ok(resp) => {
                report.uploaded += resp.uploaded.len() as u64;
                report.indexed += resp.uploaded.iter().filter(|u| u.indexed).count() as u64;
                report.errors += resp.errors.len() as u64;
                report.chunks_sent += 1;
                tracing::debug!(
                    chunk = index + 1,
                    of = chunks.len(),
                    uploaded = report.uploaded,
                    errors = report.errors,
                    "chunk uploaded"
                );
                observer.chunk_finished(index, &report);
            }
            Err(e) => {
                tracing::warn!(chunk = index + 1, error = %e, "upload stopped");
                report.failure = Some(e);
                break;
            }
        }

        if index + 1 < chunks.len() && !options.chunk_delay.is_zero() {
            tokio::time::sleep(options.chunk_delay).await;
        }
    }

    report
}

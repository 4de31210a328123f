//! Terminal progress bars for the batch workflows.

use crate::api::{HashBatch, PendingFile, SyncBatch};
use crate::render;
use crate::sync::SyncTotals;
use crate::upload::{UploadObserver, UploadReport};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::ops::Range;
use std::sync::Mutex;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// One bar per file of the chunk in flight, plus an overall chunk counter.
pub struct UploadBars {
    multi: MultiProgress,
    overall: ProgressBar,
    names: Vec<String>,
    current: Mutex<Vec<ProgressBar>>,
}

impl UploadBars {
    pub fn new(files: &[PendingFile], chunks: usize) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(chunks as u64));
        overall.set_style(style("{prefix:>8} [{bar:30}] {pos}/{len} chunks  {msg}"));
        overall.set_prefix("upload");
        Self {
            multi,
            overall,
            names: files
                .iter()
                .map(|f| format!("{} ({})", f.name, render::format_size(f.size)))
                .collect(),
            current: Mutex::new(Vec::new()),
        }
    }

    /// Clear every bar, including those of a chunk that never finished.
    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            for bar in current.drain(..) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
        self.overall.finish_and_clear();
    }
}

impl UploadObserver for UploadBars {
    fn chunk_started(&self, _index: usize, files: Range<usize>) {
        let bars = files
            .map(|i| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(style("  {bar:20} {pos:>3}% {msg}"));
                bar.set_message(self.names.get(i).cloned().unwrap_or_default());
                bar
            })
            .collect();
        if let Ok(mut current) = self.current.lock() {
            *current = bars;
        }
    }

    fn progress(&self, _files: Range<usize>, percent: u8) {
        if let Ok(current) = self.current.lock() {
            for bar in current.iter() {
                bar.set_position(percent as u64);
            }
        }
    }

    fn chunk_finished(&self, _index: usize, report: &UploadReport) {
        if let Ok(mut current) = self.current.lock() {
            for bar in current.drain(..) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
        self.overall.inc(1);
        self.overall.set_message(format!(
            "{} uploaded, {} errors",
            report.uploaded, report.errors
        ));
    }
}

/// Single percentage bar driven by the server's `progress_percent`.
pub struct BatchBar {
    bar: ProgressBar,
}

impl BatchBar {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(style("{prefix:>8} [{bar:30}] {pos:>3}%  {msg}"));
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    pub fn sync_batch(&self, number: u32, batch: &SyncBatch, totals: &SyncTotals) {
        self.bar.set_position(batch.progress_percent.clamp(0.0, 100.0) as u64);
        self.bar.set_message(format!(
            "{}  ({} new so far)",
            render::sync_info(number, batch.pending_new),
            totals.new_files
        ));
    }

    pub fn hash_batch(&self, number: u32, batch: &HashBatch, updated: u64) {
        self.bar.set_position(batch.progress_percent.clamp(0.0, 100.0) as u64);
        self.bar.set_message(format!(
            "batch {} | {} updated | {} pending",
            number, updated, batch.pending
        ));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pending(name: &str) -> PendingFile {
        PendingFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size: 2048,
        }
    }

    #[test]
    fn test_finish_clears_bars_of_unfinished_chunk() {
        let bars = UploadBars::new(&[pending("a.pdf"), pending("b.pdf")], 1);
        bars.chunk_started(0, 0..2);
        bars.progress(0..2, 40);
        assert_eq!(bars.current.lock().unwrap().len(), 2);

        bars.finish();
        assert!(bars.current.lock().unwrap().is_empty());
        assert!(bars.overall.is_finished());
        assert_eq!(bars.names[0], "a.pdf (2.0 KB)");
    }
}

//! Plain-text views of fetched data. Nothing here talks to the network.

use crate::api::{BulkSearchResponse, FileListPage, FilterVocabulary, FolderListing, SearchResult};
use crate::backfill::BackfillReport;
use crate::files::page_window;
use crate::sync::{SyncReport, SyncState};
use crate::upload::UploadReport;
use crate::vocabulary::month_name;
use std::fmt::Write;

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn result_line(index: usize, result: &SearchResult) -> String {
    let meta = &result.metadata;
    let mut tags = Vec::new();
    if !meta.year.is_empty() {
        tags.push(meta.year.clone());
    }
    if !meta.month.is_empty() {
        tags.push(month_name(&meta.month));
    }
    for value in [&meta.bank, &meta.legal_entity, &meta.document_type] {
        if !value.is_empty() {
            tags.push(value.clone());
        }
    }
    format!(
        "{:>4}. {}  [{}]  {:.1} KB",
        index + 1,
        result.display_name(),
        tags.join(" · "),
        result.size_kb
    )
}

pub fn results(total: u64, items: &[SearchResult], summary: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(summary) = summary {
        let _ = writeln!(out, "{}", summary);
    }
    if items.is_empty() {
        out.push_str("no documents found\n");
        return out;
    }
    let _ = writeln!(out, "{} document(s)", total);
    for (i, result) in items.iter().enumerate() {
        let _ = writeln!(out, "{}", result_line(i, result));
    }
    out
}

pub fn bulk_summary(resp: &BulkSearchResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "codes searched: {}  found: {}  not found: {}",
        resp.searched.len(),
        resp.found.len(),
        resp.not_found.len()
    );
    if !resp.found.is_empty() {
        let badges: Vec<String> = resp.found.iter().map(|c| format!("[+{}]", c)).collect();
        let _ = writeln!(out, "  {}", badges.join(" "));
    }
    if !resp.not_found.is_empty() {
        let badges: Vec<String> = resp.not_found.iter().map(|c| format!("[-{}]", c)).collect();
        let _ = writeln!(out, "  {}", badges.join(" "));
    }
    out
}

pub fn files_page(page: &FileListPage) -> String {
    let mut out = String::new();
    if page.files.is_empty() {
        out.push_str("no files\n");
        return out;
    }
    for file in &page.files {
        let month = file.month.as_deref().map(month_name).unwrap_or_default();
        let folder = file
            .folder
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or("(raíz)");
        let _ = writeln!(
            out,
            "{:>10}  {} {}  in {}",
            file.size_human,
            if file.indexed { "✓" } else { " " },
            file.name,
            folder
        );
        let _ = writeln!(
            out,
            "{:>14}{:<4} {:<10} {:<12} {}",
            "",
            file.year.as_deref().unwrap_or(""),
            month,
            file.bank.as_deref().unwrap_or(""),
            file.legal_entity.as_deref().unwrap_or("")
        );
        let _ = writeln!(out, "{:>14}{}  {}", "", file.path, file.download_url);
    }
    let window = page_window(page.page, page.total_pages);
    if !window.is_empty() {
        let buttons: Vec<String> = window
            .iter()
            .map(|n| {
                if *n == page.page {
                    format!("[{}]", n)
                } else {
                    n.to_string()
                }
            })
            .collect();
        let _ = writeln!(
            out,
            "{}{}{}   page {} of {}, {} files",
            if page.has_prev { "« " } else { "" },
            buttons.join(" "),
            if page.has_next { " »" } else { "" },
            page.page,
            page.total_pages,
            page.total
        );
    }
    out
}

pub fn folders(listing: &FolderListing, current: &str) -> String {
    let mut out = String::new();
    let trail: Vec<&str> = listing.breadcrumb.iter().map(|c| c.name.as_str()).collect();
    let _ = writeln!(out, "/{}", trail.join("/"));
    if listing.folders.is_empty() {
        out.push_str("  (no subfolders)\n");
    }
    for folder in &listing.folders {
        let _ = writeln!(out, "  {:<30} {:>6}", folder.name, folder.count);
    }
    if current.is_empty() {
        out.push_str("current: (root)\n");
    } else {
        let _ = writeln!(out, "current: {}", current);
    }
    out
}

pub fn vocabulary(vocab: &FilterVocabulary) -> String {
    if vocab.is_empty() {
        return "no filter options loaded\n".to_string();
    }
    let mut out = String::new();
    let years: Vec<String> = vocab.years.iter().map(|y| y.to_string()).collect();
    let _ = writeln!(out, "años:             {}", years.join(", "));
    let months: Vec<String> = vocab
        .months
        .iter()
        .map(|m| format!("{} {}", m.value, m.label))
        .collect();
    let _ = writeln!(out, "meses:            {}", months.join(", "));
    let banks: Vec<&str> = vocab.banks.iter().map(String::as_str).collect();
    let _ = writeln!(out, "bancos:           {}", banks.join(", "));
    let entities: Vec<&str> = vocab.legal_entities.iter().map(String::as_str).collect();
    let _ = writeln!(out, "razones sociales: {}", entities.join(", "));
    let _ = writeln!(out, "tipos documento:  {}", vocab.document_types.len());
    out
}

pub fn sync_info(batch: u32, pending_new: u64) -> String {
    format!("Lote {} | Pendientes: {}", batch, pending_new)
}

pub fn sync_report(report: &SyncReport) -> String {
    let mut out = String::new();
    let label = match report.state {
        SyncState::Completed => "sync completed",
        SyncState::Stopped => "sync stopped",
        SyncState::Failed => "sync failed",
        SyncState::Running => "sync",
    };
    let _ = writeln!(
        out,
        "{}: {} new, {} moved, {} orphans removed in {:.1}s ({} batches)",
        label,
        report.totals.new_files,
        report.totals.moved_files,
        report.totals.removed_orphans,
        report.totals.time_seconds,
        report.batches
    );
    for moved in &report.moved_details {
        let _ = writeln!(out, "  moved {} -> {}", moved.old_path, moved.new_path);
    }
    out
}

pub fn upload_report(report: &UploadReport) -> String {
    format!(
        "{} uploaded, {} indexed, {} errors ({} of {} chunks)",
        report.uploaded, report.indexed, report.errors, report.chunks_sent, report.chunks_total
    )
}

pub fn backfill_report(report: &BackfillReport) -> String {
    format!("{} hashes updated in {} batches", report.updated, report.batches)
}

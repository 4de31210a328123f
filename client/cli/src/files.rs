//! Paginated file listing, deletion and saving downloads to disk.

use crate::api::{ApiClient, FileListPage, FileListQuery};
use crate::error::{ApiError, ApiResult};
use crate::search::SearchFilters;
use std::path::{Path, PathBuf};

pub const DEFAULT_PER_PAGE: u32 = 100;
const PAGE_BUTTONS: u32 = 5;

pub async fn list_files(
    api: &ApiClient,
    token: &str,
    page: u32,
    search: Option<&str>,
    filters: &SearchFilters,
) -> ApiResult<FileListPage> {
    let query = FileListQuery {
        page: page.max(1),
        per_page: DEFAULT_PER_PAGE,
        search: search.map(str::to_string),
        filters: filters.to_map(),
    };
    let page = api.list_files(token, &query).await?;
    tracing::debug!(page = page.page, of = page.total_pages, total = page.total, "files listed");
    Ok(page)
}

/// Up to five page numbers around `current`, shifted to stay inside
/// `1..=total_pages`. Empty when there is nothing to paginate.
pub fn page_window(current: u32, total_pages: u32) -> Vec<u32> {
    if total_pages <= 1 {
        return Vec::new();
    }
    let current = current.clamp(1, total_pages);
    let mut start = current.saturating_sub(2).max(1);
    let end = (start + PAGE_BUTTONS - 1).min(total_pages);
    if end - start < PAGE_BUTTONS - 1 {
        start = end.saturating_sub(PAGE_BUTTONS - 1).max(1);
    }
    (start..=end).collect()
}

pub async fn delete_file(api: &ApiClient, token: &str, path: &str) -> ApiResult<()> {
    api.delete_file(token, path).await?;
    tracing::info!(path = %path, "file deleted");
    Ok(())
}

/// File name for a download URL: its last non-empty path segment.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download.pdf")
        .to_string()
}

/// Write `bytes` into `dir`, creating it if needed.
pub async fn save_bytes(dir: &Path, name: &str, bytes: &[u8]) -> ApiResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(name);
    tokio::fs::write(&target, bytes).await?;
    Ok(target)
}

pub async fn download_to(api: &ApiClient, token: &str, url: &str, dir: &Path) -> ApiResult<PathBuf> {
    if url.trim().is_empty() {
        return Err(ApiError::Validation("missing download URL".into()));
    }
    let bytes = api.download(token, url).await?;
    let target = save_bytes(dir, &file_name_from_url(url), &bytes).await?;
    tracing::info!(path = %target.display(), bytes = bytes.len(), "downloaded");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockServer;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 1), Vec::<u32>::new());
        assert_eq!(page_window(1, 3), vec![1, 2, 3]);
        assert_eq!(page_window(1, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_window(5, 10), vec![3, 4, 5, 6, 7]);
        assert_eq!(page_window(10, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_window(9, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_window(42, 10), vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("/api/download/2024/BCP/a.pdf"), "a.pdf");
        assert_eq!(file_name_from_url("http://h/api/download/b.pdf?x=1"), "b.pdf");
        assert_eq!(file_name_from_url("/"), "download.pdf");
    }

    #[tokio::test]
    async fn test_list_files_query() {
        let server = MockServer::start().await;
        server.respond(
            "GET /api/files/list",
            StatusCode::OK,
            json!({
                "files": [{
                    "name": "a.pdf", "path": "2024/BCP/a.pdf", "banco": "BCP", "año": 2024,
                    "size_human": "12 KB", "indexed": true, "download_url": "/api/download/2024/BCP/a.pdf"
                }],
                "total": 1, "page": 1, "total_pages": 1, "has_prev": false, "has_next": false
            }),
        );
        let api = ApiClient::new(&server.url());
        let filters = SearchFilters {
            bank: Some("BCP".into()),
            ..Default::default()
        };
        let page = list_files(&api, "t", 0, Some("boleta"), &filters).await.unwrap();
        assert_eq!(page.files[0].year.as_deref(), Some("2024"));

        let query = &server.requests()[0].query;
        assert_eq!(query["page"], "1");
        assert_eq!(query["per_page"], "100");
        assert_eq!(query["search"], "boleta");
        assert_eq!(query["banco"], "BCP");
    }

    #[tokio::test]
    async fn test_delete_requires_success_flag() {
        let server = MockServer::start().await;
        server.respond("DELETE /api/files/delete", StatusCode::OK, json!({"success": false}));
        let api = ApiClient::new(&server.url());
        assert!(delete_file(&api, "t", "2024/a.pdf").await.is_err());
        assert_eq!(server.requests()[0].body["path"], "2024/a.pdf");
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        server.respond_bytes(
            "GET /api/download/2024/a.pdf",
            b"%PDF-1.4 body".to_vec(),
            vec![("content-type", "application/pdf")],
        );
        let api = ApiClient::new(&server.url());
        let dir = tempfile::tempdir().unwrap();
        let path = download_to(&api, "t", "/api/download/2024/a.pdf", dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("a.pdf"));
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4 body");
    }
}

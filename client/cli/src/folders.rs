//! Remote folder navigation. Paths are `/`-terminated strings; the root is `""`.

use crate::api::{ApiClient, FolderListing};
use crate::error::{ApiError, ApiResult};

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strip characters the storage layer refuses, then trim.
pub fn sanitize_folder_name(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Parent of a folder path: drop the trailing separator and the last segment.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => format!("{}/", &trimmed[..idx]),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderBrowser {
    pub current_path: String,
}

impl FolderBrowser {
    pub fn at(path: &str) -> Self {
        Self {
            current_path: path.to_string(),
        }
    }

    pub fn descend(&mut self, folder_path: &str) {
        self.current_path = folder_path.to_string();
    }

    /// Returns false when already at the root.
    pub fn go_up(&mut self) -> bool {
        if self.current_path.is_empty() {
            return false;
        }
        self.current_path = parent_path(&self.current_path);
        true
    }

    /// Full path for a new subfolder of the current folder.
    pub fn new_subfolder_path(&self, raw_name: &str) -> ApiResult<String> {
        let name = sanitize_folder_name(raw_name)
            .ok_or_else(|| ApiError::Validation("folder name is empty".into()))?;
        Ok(format!("{}{}/", self.current_path, name))
    }

    pub async fn list(&self, api: &ApiClient, token: &str) -> ApiResult<FolderListing> {
        let listing = api.list_folders(token, &self.current_path).await?;
        tracing::debug!(
            parent = %self.current_path,
            folders = listing.folders.len(),
            time_ms = ?listing.time_ms,
            "folders listed"
        );
        Ok(listing)
    }

    /// Create a subfolder and move into it.
    pub async fn create(&mut self, api: &ApiClient, token: &str, raw_name: &str) -> ApiResult<String> {
        let path = self.new_subfolder_path(raw_name)?;
        api.create_folder(token, &path).await?;
        tracing::info!(path = %path, "folder created");
        self.current_path = path.clone();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockServer;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("  Planillas 2024 ").as_deref(), Some("Planillas 2024"));
        assert_eq!(sanitize_folder_name("a<b>c:d\"e/f\\g|h?i*").as_deref(), Some("abcdefghi"));
        assert_eq!(sanitize_folder_name(" /?* "), None);
        assert_eq!(sanitize_folder_name(""), None);
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("2024/BCP/"), "2024/");
        assert_eq!(parent_path("2024/"), "");
        assert_eq!(parent_path(""), "");
    }

    #[test]
    fn test_navigation() {
        let mut browser = FolderBrowser::default();
        assert!(!browser.go_up());
        browser.descend("2024/");
        browser.descend("2024/BCP/");
        assert!(browser.go_up());
        assert_eq!(browser.current_path, "2024/");
        assert!(browser.go_up());
        assert_eq!(browser.current_path, "");
    }

    #[test]
    fn test_new_subfolder_path() {
        let browser = FolderBrowser::at("2024/");
        assert_eq!(browser.new_subfolder_path(" Enero/ ").unwrap(), "2024/Enero/");
        assert!(browser.new_subfolder_path("***").is_err());
        assert_eq!(FolderBrowser::default().new_subfolder_path("x").unwrap(), "x/");
    }

    #[tokio::test]
    async fn test_create_selects_new_folder() {
        let server = MockServer::start().await;
        server.respond("POST /api/files/create-folder", StatusCode::OK, json!({"success": true}));
        let api = ApiClient::new(&server.url());
        let mut browser = FolderBrowser::at("2024/");

        let path = browser.create(&api, "t", "BBVA").await.unwrap();
        assert_eq!(path, "2024/BBVA/");
        assert_eq!(browser.current_path, "2024/BBVA/");
        assert_eq!(server.requests()[0].body["path"], "2024/BBVA/");
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name_locally() {
        let server = MockServer::start().await;
        let api = ApiClient::new(&server.url());
        let mut browser = FolderBrowser::at("2024/");
        assert!(browser.create(&api, "t", " ? ").await.is_err());
        assert_eq!(browser.current_path, "2024/");
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_list_sends_parent() {
        let server = MockServer::start().await;
        server.respond(
            "GET /api/folders",
            StatusCode::OK,
            json!({
                "breadcrumb": [{"name": "2024", "path": "2024/"}],
                "folders": [{"name": "BCP", "path": "2024/BCP/", "count": 12}],
                "time_ms": 3.2
            }),
        );
        let api = ApiClient::new(&server.url());
        let listing = FolderBrowser::at("2024/").list(&api, "t").await.unwrap();
        assert_eq!(listing.folders[0].count, 12);
        assert_eq!(server.requests()[0].query["parent"], "2024/");
    }
}

mod types;
mod upload;

pub use types::*;
pub use upload::PendingFile;

use crate::error::{ApiError, ApiResult};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Map a status plus optional JSON body onto the error taxonomy.
    /// Returns `None` when the response should be treated as data.
    fn classify(status: StatusCode, body: Option<&serde_json::Value>) -> Option<ApiError> {
        if status == StatusCode::UNAUTHORIZED {
            return Some(ApiError::AuthExpired);
        }
        let message = body
            .and_then(|v| v.get("error"))
            .and_then(|e| e.as_str())
            .map(str::to_string);
        if status == StatusCode::FORBIDDEN {
            return Some(ApiError::PermissionDenied(
                message.unwrap_or_else(|| "admin role required".to_string()),
            ));
        }
        if let Some(message) = message {
            return Some(ApiError::Validation(message));
        }
        if !status.is_success() {
            return Some(ApiError::Validation(format!("server returned {}", status)));
        }
        None
    }

    /// Decode a JSON response, surfacing `{error}` bodies and 401/403 uniformly.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> ApiResult<T> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        let body = resp.bytes().await?;
        let value = serde_json::from_slice::<serde_json::Value>(&body).ok();
        if let Some(err) = Self::classify(status, value.as_ref()) {
            return Err(err);
        }
        let value = value.ok_or_else(|| {
            ApiError::ResponseShape(format!("expected JSON body ({} bytes)", body.len()))
        })?;
        serde_json::from_value(value).map_err(|e| ApiError::ResponseShape(e.to_string()))
    }

    /// Check a binary response; on error, read the body for an `{error}` detail.
    async fn ensure_binary(resp: reqwest::Response, action: &str) -> ApiResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        let body = resp.bytes().await.unwrap_or_default();
        let value = serde_json::from_slice::<serde_json::Value>(&body).ok();
        Err(Self::classify(status, value.as_ref())
            .unwrap_or_else(|| ApiError::Validation(format!("could not {}", action))))
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<(String, Option<RemoteUser>)> {
        let resp = self
            .client
            .post(self.url("/api/token/"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        let parsed: LoginResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::ResponseShape(format!("login: {}", e)))?;

        match (status.is_success(), parsed.access) {
            (true, Some(access)) => Ok((access, parsed.user)),
            (true, None) => Err(ApiError::ResponseShape("login response without token".into())),
            (false, _) => Err(ApiError::InvalidCredentials(
                parsed
                    .error
                    .or(parsed.detail)
                    .unwrap_or_else(|| format!("server returned {}", status)),
            )),
        }
    }

    pub async fn filter_options(&self, token: &str) -> ApiResult<FilterVocabulary> {
        let resp = self
            .client
            .get(self.url("/api/filter-options"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn search(
        &self,
        token: &str,
        filters: &BTreeMap<String, String>,
    ) -> ApiResult<SearchResponse> {
        let resp = self
            .client
            .post(self.url("/api/search"))
            .bearer_auth(token)
            .json(filters)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn bulk_search(
        &self,
        token: &str,
        codes: &[String],
        filters: &BTreeMap<String, String>,
    ) -> ApiResult<BulkSearchResponse> {
        let field = |key: &str| filters.get(key).map(String::as_str).unwrap_or("");
        let resp = self
            .client
            .post(self.url("/api/search/bulk"))
            .bearer_auth(token)
            .json(&BulkSearchRequest {
                codigos: codes.join(","),
                year: field("año"),
                month: field("mes"),
                bank: field("banco"),
                razon_social: field("razon_social"),
                tipo_documento: field("tipo_documento"),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn merge_pdfs(
        &self,
        token: &str,
        paths: Vec<&str>,
        output_name: &str,
    ) -> ApiResult<MergedPdf> {
        let resp = self
            .client
            .post(self.url("/api/merge-pdfs"))
            .bearer_auth(token)
            .json(&MergeRequest {
                paths,
                output_name: output_name.to_string(),
            })
            .send()
            .await?;
        let resp = Self::ensure_binary(resp, "merge the files").await?;
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let files_merged = header("X-Files-Merged");
        let merge_errors = header("X-Merge-Errors").unwrap_or(0);
        let bytes = resp.bytes().await?.to_vec();
        Ok(MergedPdf {
            bytes,
            files_merged,
            merge_errors,
        })
    }

    pub async fn download(&self, token: &str, download_url: &str) -> ApiResult<Vec<u8>> {
        let resp = self
            .client
            .get(self.url(download_url))
            .bearer_auth(token)
            .send()
            .await?;
        let resp = Self::ensure_binary(resp, "download the file").await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Send one multipart chunk. `on_progress` receives the whole-request
    /// percentage as the body is streamed out.
    pub async fn upload_files<F>(
        &self,
        token: &str,
        files: &[PendingFile],
        folder: &str,
        on_progress: F,
    ) -> ApiResult<UploadResponse>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let form = upload::progress_form(files, folder, on_progress).await?;
        let resp = self
            .client
            .post(self.url("/api/files/upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        let body = resp.bytes().await?;
        let value = serde_json::from_slice::<serde_json::Value>(&body).ok();
        // Per-file failures arrive as `errors[]`, sometimes with a non-2xx status.
        if let Some(v) = value.as_ref() {
            if v.get("uploaded").is_some() || v.get("errors").is_some() {
                return serde_json::from_value(v.clone())
                    .map_err(|e| ApiError::ResponseShape(e.to_string()));
            }
        }
        if let Some(err) = Self::classify(status, value.as_ref()) {
            return Err(err);
        }
        Err(ApiError::ResponseShape(match value {
            Some(_) => "upload response without uploaded or errors".to_string(),
            None => format!("expected JSON upload response ({} bytes)", body.len()),
        }))
    }

    pub async fn list_files(&self, token: &str, query: &FileListQuery) -> ApiResult<FileListPage> {
        let resp = self
            .client
            .get(self.url("/api/files/list"))
            .bearer_auth(token)
            .query(&query.to_params())
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn delete_file(&self, token: &str, path: &str) -> ApiResult<()> {
        let resp = self
            .client
            .delete(self.url("/api/files/delete"))
            .bearer_auth(token)
            .json(&PathRequest { path })
            .send()
            .await?;
        let result: DeleteResponse = Self::decode(resp).await?;
        if result.success {
            Ok(())
        } else {
            Err(ApiError::Validation("could not delete the file".into()))
        }
    }

    pub async fn list_folders(&self, token: &str, parent: &str) -> ApiResult<FolderListing> {
        let resp = self
            .client
            .get(self.url("/api/folders"))
            .bearer_auth(token)
            .query(&[("parent", parent)])
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn create_folder(&self, token: &str, path: &str) -> ApiResult<()> {
        let resp = self
            .client
            .post(self.url("/api/files/create-folder"))
            .bearer_auth(token)
            .json(&PathRequest { path })
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        let body = resp.bytes().await?;
        let value = serde_json::from_slice::<serde_json::Value>(&body).ok();
        match Self::classify(status, value.as_ref()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn sync_index(&self, token: &str, batch_size: u32) -> ApiResult<SyncBatch> {
        let resp = self
            .client
            .post(self.url("/api/index/sync"))
            .bearer_auth(token)
            .json(&BatchRequest { batch_size })
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn populate_hashes(&self, token: &str, batch_size: u32) -> ApiResult<HashBatch> {
        let resp = self
            .client
            .post(self.url("/api/index/populate-hashes"))
            .bearer_auth(token)
            .json(&BatchRequest { batch_size })
            .send()
            .await?;
        Self::decode(resp).await
    }
}

//! The client controller: session, cached vocabulary, current results and
//! the workflows, all behind one owner.

use crate::api::{
    ApiClient, BulkSearchResponse, FileListPage, FilterVocabulary, FolderListing, HashBatch,
    MergedPdf, SearchResponse, SyncBatch,
};
use crate::backfill::{self, BackfillReport};
use crate::config::Config;
use crate::db::LocalState;
use crate::error::{ApiError, ApiResult};
use crate::files;
use crate::folders::FolderBrowser;
use crate::search::{self, SearchFilters};
use crate::session::Session;
use crate::sync::{self, StopHandle, SyncOptions, SyncReport, SyncTotals};
use crate::upload::{self, UploadBatch, UploadObserver, UploadOptions, UploadReport};
use crate::vocabulary::load_filter_options;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct App {
    config: Config,
    api: ApiClient,
    state: LocalState,
    vocabulary: FilterVocabulary,
    persist: bool,
}

impl App {
    pub fn open(server: Option<&str>) -> anyhow::Result<Self> {
        let mut config = Config::load()?;
        if let Some(server) = server {
            config.server_url = Some(server.trim_end_matches('/').to_string());
        }
        let base = config.server_url.clone().unwrap_or_default();
        let api = match config.request_timeout() {
            Some(timeout) => ApiClient::with_timeout(&base, timeout)?,
            None => ApiClient::new(&base),
        };
        let state = LocalState::open()?;
        let vocabulary = state.vocabulary()?.unwrap_or_default();
        Ok(Self {
            config,
            api,
            state,
            vocabulary,
            persist: true,
        })
    }

    /// Controller backed by an in-memory store that never writes the config file.
    #[cfg(test)]
    pub fn in_memory(server_url: &str) -> Self {
        Self {
            config: Config {
                server_url: Some(server_url.to_string()),
                ..Default::default()
            },
            api: ApiClient::new(server_url),
            state: LocalState::open_memory().expect("in-memory state"),
            vocabulary: FilterVocabulary::default(),
            persist: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &LocalState {
        &self.state
    }

    pub fn vocabulary(&self) -> &FilterVocabulary {
        &self.vocabulary
    }

    pub fn session(&self) -> Option<Session> {
        self.config.session()
    }

    fn save_config(&self) -> anyhow::Result<()> {
        if self.persist {
            self.config.save()?;
        }
        Ok(())
    }

    pub fn require_session(&self) -> anyhow::Result<Session> {
        self.config.require_server()?;
        self.config.require_auth()?;
        self.session()
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run: docsearch login"))
    }

    pub fn require_admin(&self) -> anyhow::Result<Session> {
        let session = self.require_session()?;
        if !session.is_admin() {
            return Err(ApiError::PermissionDenied("admin role required".into()).into());
        }
        Ok(session)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<Session> {
        self.config.require_server()?;
        let (token, remote) = self.api.login(username, password).await?;
        let session = Session::from_login(token, remote, username);
        self.config.set_session(Some(&session));
        self.save_config()?;
        tracing::info!(user = %session.user.username, role = ?session.user.role, "logged in");
        self.reload_vocabulary().await?;
        Ok(session)
    }

    pub fn logout(&mut self) -> anyhow::Result<()> {
        self.config.set_session(None);
        self.save_config()?;
        self.state.clear_session_state()?;
        self.vocabulary = FilterVocabulary::default();
        Ok(())
    }

    fn expire_session(&mut self) -> anyhow::Result<()> {
        tracing::warn!("session expired, clearing credentials");
        self.logout()
    }

    /// Pass a result through, forcing a logout first if the session expired.
    fn check<T>(&mut self, result: ApiResult<T>) -> anyhow::Result<T> {
        match result {
            Err(ApiError::AuthExpired) => {
                self.expire_session()?;
                Err(ApiError::AuthExpired.into())
            }
            other => Ok(other?),
        }
    }

    /// Workflow reports keep their partial tallies; only the session is touched.
    fn check_failure(&mut self, failure: Option<&ApiError>) -> anyhow::Result<()> {
        if failure.map(ApiError::is_auth_expired).unwrap_or(false) {
            self.expire_session()?;
        }
        Ok(())
    }

    pub async fn reload_vocabulary(&mut self) -> anyhow::Result<&FilterVocabulary> {
        let session = self.require_session()?;
        let result = load_filter_options(&self.api, &session.token, &self.vocabulary).await;
        let vocabulary = self.check(result)?;
        self.state.store_vocabulary(&vocabulary)?;
        self.vocabulary = vocabulary;
        Ok(&self.vocabulary)
    }

    pub async fn search(&mut self, filters: &SearchFilters) -> anyhow::Result<SearchResponse> {
        let session = self.require_session()?;
        let result = search::search(&self.api, &session.token, filters).await;
        let resp = self.check(result)?;
        self.state.store_results(&resp.results, None)?;
        Ok(resp)
    }

    pub async fn bulk_search(
        &mut self,
        codes: &[String],
        filters: &SearchFilters,
    ) -> anyhow::Result<BulkSearchResponse> {
        let session = self.require_session()?;
        let result = search::bulk_search(&self.api, &session.token, codes, filters).await;
        let resp = self.check(result)?;
        self.state.store_results(&resp.results, Some(resp.can_merge))?;
        Ok(resp)
    }

    /// Whether the last result set may be merged.
    pub fn merge_offered(&self) -> anyhow::Result<bool> {
        let stored = self.state.results()?;
        Ok(search::merge_offered(stored.results.len(), stored.mergeable))
    }

    /// Merge the last result set and write it into `dir`.
    pub async fn merge_results(&mut self, dir: &Path) -> anyhow::Result<(PathBuf, MergedPdf)> {
        let session = self.require_session()?;
        let stored = self.state.results()?;
        if !search::merge_offered(stored.results.len(), stored.mergeable) {
            anyhow::bail!("nothing to merge: run a search with at least two results first");
        }
        let result = search::merge(&self.api, &session.token, &stored.results).await;
        let merged = self.check(result)?;
        let name = search::merged_file_name(stored.results.len());
        let path = files::save_bytes(dir, &name, &merged.bytes).await?;
        tracing::info!(
            path = %path.display(),
            merged = ?merged.files_merged,
            errors = merged.merge_errors,
            "merged pdf saved"
        );
        Ok((path, merged))
    }

    pub async fn download(&mut self, url: &str, dir: &Path) -> anyhow::Result<PathBuf> {
        let session = self.require_session()?;
        let result = files::download_to(&self.api, &session.token, url, dir).await;
        self.check(result)
    }

    /// Download entry `index` (1-based) of the last result set.
    pub async fn download_result(&mut self, index: usize, dir: &Path) -> anyhow::Result<PathBuf> {
        let stored = self.state.results()?;
        let url = index
            .checked_sub(1)
            .and_then(|i| stored.results.get(i))
            .map(|r| r.download_url.clone())
            .ok_or_else(|| anyhow::anyhow!("no result #{} in the last search", index))?;
        self.download(&url, dir).await
    }

    pub async fn list_files(
        &mut self,
        page: u32,
        search: Option<&str>,
        filters: &SearchFilters,
    ) -> anyhow::Result<FileListPage> {
        let session = self.require_session()?;
        let result = files::list_files(&self.api, &session.token, page, search, filters).await;
        self.check(result)
    }

    pub async fn delete_file(&mut self, path: &str) -> anyhow::Result<()> {
        let session = self.require_admin()?;
        let result = files::delete_file(&self.api, &session.token, path).await;
        self.check(result)
    }

    /// List `path`, or the remembered browser path when none is given.
    pub async fn list_folders(&mut self, path: Option<&str>) -> anyhow::Result<(String, FolderListing)> {
        let session = self.require_session()?;
        let current = match path {
            Some(p) => p.to_string(),
            None => self.state.browser_path()?,
        };
        let browser = FolderBrowser::at(&current);
        let result = browser.list(&self.api, &session.token).await;
        let listing = self.check(result)?;
        self.state.set_browser_path(&browser.current_path)?;
        Ok((browser.current_path, listing))
    }

    pub async fn create_folder(&mut self, name: &str) -> anyhow::Result<String> {
        let session = self.require_session()?;
        let mut browser = FolderBrowser::at(&self.state.browser_path()?);
        let result = browser.create(&self.api, &session.token, name).await;
        let path = self.check(result)?;
        self.state.set_browser_path(&path)?;
        self.set_upload_folder(&path)?;
        Ok(path)
    }

    pub async fn pick_folder(&mut self) -> anyhow::Result<Option<String>> {
        let session = self.require_session()?;
        let start = self.state.browser_path()?;
        let picked = match crate::tui::pick_folder(&self.api, &session.token, &start).await {
            Ok(picked) => picked,
            Err(e) => {
                if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::AuthExpired)) {
                    self.expire_session()?;
                }
                return Err(e);
            }
        };
        if let Some(path) = &picked {
            self.state.set_browser_path(path)?;
            self.set_upload_folder(path)?;
        }
        Ok(picked)
    }

    pub fn set_upload_folder(&mut self, folder: &str) -> anyhow::Result<()> {
        self.config.upload_folder = Some(folder.to_string());
        self.save_config()
    }

    /// Upload folder: explicit, then configured, then the browser path.
    pub fn upload_folder(&self, explicit: Option<&str>) -> anyhow::Result<String> {
        if let Some(folder) = explicit {
            return Ok(folder.to_string());
        }
        if let Some(folder) = &self.config.upload_folder {
            return Ok(folder.clone());
        }
        self.state.browser_path()
    }

    /// Run a chunked upload. On success the first file-list page is fetched
    /// again so the caller can show it.
    pub async fn upload(
        &mut self,
        batch: &UploadBatch,
        options: &UploadOptions,
        observer: Arc<dyn UploadObserver>,
    ) -> anyhow::Result<(UploadReport, Option<FileListPage>)> {
        let session = self.require_admin()?;
        let report = upload::run_upload(&self.api, &session.token, batch, options, observer).await;
        self.check_failure(report.failure.as_ref())?;
        let page = if report.is_complete() {
            self.list_files(1, None, &SearchFilters::default()).await.ok()
        } else {
            None
        };
        Ok((report, page))
    }

    /// Run the index sync. Completed and stopped runs reload the vocabulary
    /// and, when `refresh_files` is set, the first file-list page. Neither
    /// follow-up can discard the report.
    pub async fn sync<F>(
        &mut self,
        batch_delay: Duration,
        stop: &StopHandle,
        refresh_files: bool,
        on_batch: F,
    ) -> anyhow::Result<(SyncReport, Option<FileListPage>)>
    where
        F: FnMut(u32, &SyncBatch, &SyncTotals),
    {
        let session = self.require_admin()?;
        let options = SyncOptions {
            batch_size: self.config.sync_batch_size(),
            batch_delay,
        };
        let report = sync::run_sync(&self.api, &session.token, &options, stop, on_batch).await;
        self.check_failure(report.failure.as_ref())?;

        let mut page = None;
        if report.state.should_reload() {
            if let Err(e) = self.reload_vocabulary().await {
                tracing::warn!(error = %e, "vocabulary reload after sync failed");
            }
            if refresh_files && self.session().is_some() {
                page = self.list_files(1, None, &SearchFilters::default()).await.ok();
            }
        }
        Ok((report, page))
    }

    /// Run the one-time hash backfill. Once it has completed it refuses to
    /// run again unless forced.
    pub async fn populate_hashes<F>(
        &mut self,
        force: bool,
        delay: Duration,
        on_batch: F,
    ) -> anyhow::Result<BackfillReport>
    where
        F: FnMut(u32, &HashBatch, u64),
    {
        let session = self.require_admin()?;
        if self.state.backfill_done()? && !force {
            anyhow::bail!("hash backfill already completed; pass --force to run it again");
        }
        let report = backfill::run_backfill(&self.api, &session.token, delay, on_batch).await;
        self.check_failure(report.failure.as_ref())?;
        if report.is_complete() {
            self.state.mark_backfill_done()?;
        }
        Ok(report)
    }

    pub fn server_url(&self) -> Option<&str> {
        self.config.server_url.as_deref()
    }

    /// Capped PDF selection from the given paths.
    pub fn select_uploads(&self, paths: &[PathBuf]) -> anyhow::Result<upload::UploadSelection> {
        Ok(upload::UploadSelection::from_paths(paths)?)
    }
}

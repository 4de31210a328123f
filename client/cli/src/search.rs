//! Single and bulk search, and the merge decision that follows them.

use crate::api::{ApiClient, BulkSearchResponse, MergedPdf, SearchResponse, SearchResult};
use crate::error::{ApiError, ApiResult};
use crate::vocabulary::month_name;
use std::collections::BTreeMap;

/// The server refuses larger merges; the client checks first.
pub const MAX_MERGE_FILES: usize = 100;

/// Known search filters, keyed by their wire names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub year: Option<String>,
    pub month: Option<String>,
    pub bank: Option<String>,
    pub legal_entity: Option<String>,
    pub document_type: Option<String>,
    /// Free-form `name=value` filters passed through untouched.
    pub extra: BTreeMap<String, String>,
}

impl SearchFilters {
    /// Wire mapping with every empty value dropped.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .extra
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.trim().to_string()))
            .collect();
        let known = [
            ("año", &self.year),
            ("mes", &self.month),
            ("banco", &self.bank),
            ("razon_social", &self.legal_entity),
            ("tipo_documento", &self.document_type),
        ];
        for (key, value) in known {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                map.insert(key.to_string(), value.to_string());
            }
        }
        map
    }

    /// Human summary of the active filters, e.g. `Año: 2024 | Mes: Marzo`.
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(year) = non_empty(&self.year) {
            parts.push(format!("Año: {}", year));
        }
        if let Some(month) = non_empty(&self.month) {
            parts.push(format!("Mes: {}", month_name(month)));
        }
        if let Some(bank) = non_empty(&self.bank) {
            parts.push(format!("Banco: {}", bank));
        }
        if let Some(entity) = non_empty(&self.legal_entity) {
            parts.push(format!("Razón Social: {}", entity));
        }
        if let Some(kind) = non_empty(&self.document_type) {
            parts.push(format!("Tipo: {}", kind));
        }
        for (key, value) in &self.extra {
            if !value.trim().is_empty() {
                parts.push(format!("{}: {}", key, value.trim()));
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse `name=value` pairs given on the command line.
pub fn parse_filter_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter name in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Split a pasted list of ID codes on commas and whitespace.
pub fn parse_codes(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge is offered only for two or more results, and for bulk search only
/// when the server flags the set as mergeable.
pub fn merge_offered(result_count: usize, mergeable: Option<bool>) -> bool {
    result_count >= 2 && mergeable.unwrap_or(true)
}

pub async fn search(
    api: &ApiClient,
    token: &str,
    filters: &SearchFilters,
) -> ApiResult<SearchResponse> {
    let map = filters.to_map();
    tracing::debug!(filters = ?map, "search");
    api.search(token, &map).await
}

pub async fn bulk_search(
    api: &ApiClient,
    token: &str,
    codes: &[String],
    filters: &SearchFilters,
) -> ApiResult<BulkSearchResponse> {
    if codes.is_empty() {
        return Err(ApiError::Validation("enter at least one ID code".into()));
    }
    tracing::debug!(codes = codes.len(), "bulk search");
    api.bulk_search(token, codes, &filters.to_map()).await
}

pub fn merge_output_name(count: usize) -> String {
    format!("documentos_{}_archivos", count)
}

pub fn merged_file_name(count: usize) -> String {
    format!("documentos_combinados_{}.pdf", count)
}

/// Ask the server to merge the given results into one PDF.
pub async fn merge(api: &ApiClient, token: &str, results: &[SearchResult]) -> ApiResult<MergedPdf> {
    if results.is_empty() {
        return Err(ApiError::Validation("no results to merge".into()));
    }
    if results.len() > MAX_MERGE_FILES {
        return Err(ApiError::Validation(format!(
            "at most {} files per merge; narrow the filters",
            MAX_MERGE_FILES
        )));
    }
    let paths = results.iter().map(|r| r.filename.as_str()).collect();
    api.merge_pdfs(token, paths, &merge_output_name(results.len()))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DocumentMetadata;
    use crate::testutil::MockServer;
    use axum::http::StatusCode;
    use serde_json::json;

    fn result(name: &str) -> SearchResult {
        SearchResult {
            filename: name.to_string(),
            metadata: DocumentMetadata::default(),
            size_kb: 1.0,
            download_url: format!("/api/download/{}", name),
        }
    }

    #[test]
    fn test_filters_drop_empty_values() {
        let filters = SearchFilters {
            year: Some("2024".into()),
            month: Some("  ".into()),
            bank: None,
            document_type: Some(" BOLETA ".into()),
            extra: [("codigo_empleado".to_string(), "123456".to_string())].into(),
            ..Default::default()
        };
        let map = filters.to_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map["año"], "2024");
        assert_eq!(map["tipo_documento"], "BOLETA");
        assert_eq!(map["codigo_empleado"], "123456");
    }

    #[test]
    fn test_summary() {
        let filters = SearchFilters {
            year: Some("2024".into()),
            month: Some("03".into()),
            ..Default::default()
        };
        assert_eq!(filters.summary().as_deref(), Some("Año: 2024 | Mes: Marzo"));
        assert_eq!(SearchFilters::default().summary(), None);
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!(parse_codes("111,222"), vec!["111", "222"]);
        assert_eq!(parse_codes(" 111\n222 , ,333\t"), vec!["111", "222", "333"]);
        assert!(parse_codes(" , \n").is_empty());
    }

    #[test]
    fn test_parse_filter_pair() {
        assert_eq!(
            parse_filter_pair("codigo_empleado=123456").unwrap(),
            ("codigo_empleado".to_string(), "123456".to_string())
        );
        assert!(parse_filter_pair("novalue").is_err());
        assert!(parse_filter_pair("=x").is_err());
    }

    #[test]
    fn test_merge_offered() {
        assert!(!merge_offered(0, None));
        assert!(!merge_offered(1, None));
        assert!(merge_offered(2, None));
        assert!(!merge_offered(1, Some(true)));
        assert!(!merge_offered(5, Some(false)));
        assert!(merge_offered(2, Some(true)));
    }

    #[tokio::test]
    async fn test_bulk_search_without_codes_sends_nothing() {
        let server = MockServer::start().await;
        let api = ApiClient::new(&server.url());
        let err = bulk_search(&api, "t", &[], &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_search_wire_body() {
        let server = MockServer::start().await;
        server.respond(
            "POST /api/search/bulk",
            StatusCode::OK,
            json!({
                "total": 1,
                "results": [{"filename": "a.pdf", "metadata": {}, "size_kb": 1, "download_url": "/api/download/a.pdf"}],
                "codigos_encontrados": ["111"],
                "codigos_no_encontrados": ["222"],
                "codigos_buscados": ["111", "222"],
                "can_merge": false
            }),
        );
        let api = ApiClient::new(&server.url());
        let filters = SearchFilters {
            bank: Some("BCP".into()),
            ..Default::default()
        };
        let resp = bulk_search(&api, "t", &parse_codes("111,222"), &filters)
            .await
            .unwrap();
        assert_eq!(resp.found, vec!["111"]);
        assert_eq!(resp.not_found, vec!["222"]);
        assert!(!merge_offered(resp.results.len(), Some(resp.can_merge)));

        let body = &server.requests()[0].body;
        assert_eq!(body["codigos"], "111,222");
        assert_eq!(body["banco"], "BCP");
        assert_eq!(body["año"], "");
    }

    #[tokio::test]
    async fn test_merge_rejects_oversized_sets_locally() {
        let server = MockServer::start().await;
        let api = ApiClient::new(&server.url());
        let results: Vec<_> = (0..=MAX_MERGE_FILES).map(|i| result(&format!("{}.pdf", i))).collect();
        let err = merge(&api, "t", &results).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_merge_names() {
        assert_eq!(merge_output_name(3), "documentos_3_archivos");
        assert_eq!(merged_file_name(3), "documentos_combinados_3.pdf");
    }
}

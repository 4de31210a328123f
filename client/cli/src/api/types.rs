use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// --- Auth types ---

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub access: Option<String>,
    pub user: Option<RemoteUser>,
    pub error: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

// --- Filter vocabulary ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterVocabulary {
    #[serde(rename = "años", default, deserialize_with = "year_list")]
    pub years: Vec<i32>,
    #[serde(rename = "meses", default)]
    pub months: Vec<MonthOption>,
    #[serde(rename = "bancos", default)]
    pub banks: BTreeSet<String>,
    #[serde(rename = "razones_sociales", default)]
    pub legal_entities: BTreeSet<String>,
    #[serde(rename = "tipos_documento", default)]
    pub document_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthOption {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    pub label: String,
}

// --- Search ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub filename: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub size_kb: f64,
    pub download_url: String,
}

impl SearchResult {
    /// Last path segment of the stored object name.
    pub fn display_name(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(rename = "año", default, deserialize_with = "string_or_number")]
    pub year: String,
    #[serde(rename = "mes", default, deserialize_with = "string_or_number")]
    pub month: String,
    #[serde(rename = "banco", default, deserialize_with = "string_or_number")]
    pub bank: String,
    #[serde(rename = "razon_social", default, deserialize_with = "string_or_number")]
    pub legal_entity: String,
    #[serde(rename = "tipo_documento", default, deserialize_with = "string_or_number")]
    pub document_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkSearchRequest<'a> {
    pub codigos: String,
    #[serde(rename = "año")]
    pub year: &'a str,
    #[serde(rename = "mes")]
    pub month: &'a str,
    #[serde(rename = "banco")]
    pub bank: &'a str,
    pub razon_social: &'a str,
    pub tipo_documento: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkSearchResponse {
    pub total: u64,
    pub results: Vec<SearchResult>,
    #[serde(rename = "codigos_encontrados", default)]
    pub found: Vec<String>,
    #[serde(rename = "codigos_no_encontrados", default)]
    pub not_found: Vec<String>,
    #[serde(rename = "codigos_buscados", default)]
    pub searched: Vec<String>,
    #[serde(default)]
    pub can_merge: bool,
}

// --- Merge ---

#[derive(Debug, Serialize)]
pub(crate) struct MergeRequest<'a> {
    pub paths: Vec<&'a str>,
    pub output_name: String,
}

#[derive(Debug)]
pub struct MergedPdf {
    pub bytes: Vec<u8>,
    pub files_merged: Option<u64>,
    pub merge_errors: u64,
}

// --- Upload ---

#[derive(Debug, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub uploaded: Vec<UploadedFile>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub indexed: bool,
}

// --- File listing ---

#[derive(Debug, Clone, Default)]
pub struct FileListQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl FileListQuery {
    pub(crate) fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
        ];
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search".to_string(), search.to_string()));
        }
        for (key, value) in &self.filters {
            if !value.is_empty() {
                params.push((key.clone(), value.clone()));
            }
        }
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_prev: bool,
    #[serde(default)]
    pub has_next: bool,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub folder: Option<String>,
    pub path: String,
    #[serde(rename = "banco", default)]
    pub bank: Option<String>,
    #[serde(rename = "año", default, deserialize_with = "opt_string_or_number")]
    pub year: Option<String>,
    #[serde(rename = "mes", default, deserialize_with = "opt_string_or_number")]
    pub month: Option<String>,
    #[serde(rename = "razon_social", default)]
    pub legal_entity: Option<String>,
    #[serde(default)]
    pub size_human: String,
    #[serde(default)]
    pub indexed: bool,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PathRequest<'a> {
    pub path: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
}

// --- Folders ---

#[derive(Debug, Clone, Deserialize)]
pub struct FolderListing {
    #[serde(default)]
    pub breadcrumb: Vec<Crumb>,
    #[serde(default)]
    pub folders: Vec<FolderEntry>,
    #[serde(default)]
    pub time_ms: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Crumb {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub count: u64,
}

// --- Batch jobs ---

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest {
    pub batch_size: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncBatch {
    #[serde(default)]
    pub new_files: u64,
    #[serde(default)]
    pub moved_files: u64,
    #[serde(default)]
    pub removed_orphans: u64,
    #[serde(default)]
    pub moved_details: Vec<MovedFile>,
    #[serde(default)]
    pub time_seconds: f64,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub pending_new: u64,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MovedFile {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HashBatch {
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub has_more: bool,
}

// --- Lenient scalar decoding ---

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Null => String::new(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(d)?.into_string())
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let s = Scalar::deserialize(d)?.into_string();
    Ok(if s.is_empty() { None } else { Some(s) })
}

fn year_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i32>, D::Error> {
    let raw = Vec::<Scalar>::deserialize(d)?;
    Ok(raw
        .into_iter()
        .filter_map(|s| s.into_string().trim().parse().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_accepts_mixed_years() {
        let json = r#"{
            "años": [2023, "2024", "n/a"],
            "meses": [{"value": "01", "label": "Enero"}, {"value": 2, "label": "Febrero"}],
            "bancos": ["BCP", "BBVA", "BCP"],
            "razones_sociales": ["ACME SAC"],
            "tipos_documento": ["BOLETA", "CTS"]
        }"#;
        let vocab: FilterVocabulary = serde_json::from_str(json).unwrap();
        assert_eq!(vocab.years, vec![2023, 2024]);
        assert_eq!(vocab.months[1].value, "2");
        assert_eq!(vocab.banks.len(), 2);
        assert_eq!(vocab.document_types, vec!["BOLETA", "CTS"]);
    }

    #[test]
    fn test_search_result_metadata_normalized() {
        let json = r#"{
            "filename": "2024/BCP/ACME/boleta_01.pdf",
            "metadata": {"año": 2024, "mes": "03", "banco": "BCP", "razon_social": "ACME", "tipo_documento": null},
            "size_kb": 12.5,
            "download_url": "/api/download/2024/BCP/ACME/boleta_01.pdf"
        }"#;
        let result: SearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.metadata.year, "2024");
        assert_eq!(result.metadata.document_type, "");
        assert_eq!(result.display_name(), "boleta_01.pdf");
    }

    #[test]
    fn test_file_list_query_skips_empty_values() {
        let mut filters = BTreeMap::new();
        filters.insert("banco".to_string(), "BCP".to_string());
        filters.insert("mes".to_string(), String::new());
        let query = FileListQuery {
            page: 2,
            per_page: 100,
            search: Some(String::new()),
            filters,
        };
        let params = query.to_params();
        assert_eq!(params.len(), 3);
        assert!(params.contains(&("banco".to_string(), "BCP".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "search" || k == "mes"));
    }

    #[test]
    fn test_sync_batch_defaults() {
        let batch: SyncBatch = serde_json::from_str(r#"{"new_files": 3, "has_more": true}"#).unwrap();
        assert_eq!(batch.new_files, 3);
        assert_eq!(batch.moved_files, 0);
        assert!(batch.moved_details.is_empty());
        assert!(batch.has_more);
    }
}

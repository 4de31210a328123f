//! Filter vocabulary: loading, month labels and document-type suggestions.

use crate::api::{ApiClient, FilterVocabulary};
use crate::error::{ApiError, ApiResult};

const SUGGESTIONS_WHEN_EMPTY: usize = 50;
const SUGGESTIONS_MAX: usize = 15;

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Fetch the vocabulary. Failures other than session expiry are logged and
/// the previous vocabulary is handed back unchanged.
pub async fn load_filter_options(
    api: &ApiClient,
    token: &str,
    previous: &FilterVocabulary,
) -> ApiResult<FilterVocabulary> {
    match api.filter_options(token).await {
        Ok(vocabulary) => {
            tracing::debug!(
                years = vocabulary.years.len(),
                banks = vocabulary.banks.len(),
                document_types = vocabulary.document_types.len(),
                "filter options loaded"
            );
            Ok(vocabulary)
        }
        Err(ApiError::AuthExpired) => Err(ApiError::AuthExpired),
        Err(e) => {
            tracing::warn!(error = %e, "could not load filter options, keeping previous");
            Ok(previous.clone())
        }
    }
}

/// Month name for a `"01"`..`"12"` code; anything else is returned as given.
pub fn month_name(code: &str) -> String {
    code.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=12).contains(n))
        .map(|n| MONTH_NAMES[n - 1].to_string())
        .unwrap_or_else(|| code.to_string())
}

impl FilterVocabulary {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
            && self.months.is_empty()
            && self.banks.is_empty()
            && self.legal_entities.is_empty()
            && self.document_types.is_empty()
    }

    /// Document types matching `input`: prefix matches first, then the rest
    /// alphabetically. An empty input lists the first entries unfiltered.
    pub fn suggest_document_types(&self, input: &str) -> Vec<&str> {
        let term = input.trim().to_lowercase();
        if term.is_empty() {
            return self
                .document_types
                .iter()
                .take(SUGGESTIONS_WHEN_EMPTY)
                .map(String::as_str)
                .collect();
        }
        let mut matches: Vec<&str> = self
            .document_types
            .iter()
            .map(String::as_str)
            .filter(|t| t.to_lowercase().contains(&term))
            .collect();
        matches.sort_by_cached_key(|t| {
            let lower = t.to_lowercase();
            (!lower.starts_with(&term), lower, t.to_string())
        });
        matches.truncate(SUGGESTIONS_MAX);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MonthOption;
    use crate::testutil::MockServer;
    use axum::http::StatusCode;
    use serde_json::json;

    fn vocabulary() -> FilterVocabulary {
        FilterVocabulary {
            years: vec![2023, 2024],
            months: vec![MonthOption {
                value: "03".into(),
                label: "Marzo (Q1)".into(),
            }],
            document_types: vec![
                "CONSTANCIA CTS".into(),
                "BOLETA".into(),
                "CTS".into(),
                "LIQUIDACION".into(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name("01"), "Enero");
        assert_eq!(month_name("12"), "Diciembre");
        assert_eq!(month_name("13"), "13");
        assert_eq!(month_name(""), "");
    }

    #[test]
    fn test_suggestions_prefix_first() {
        let vocab = vocabulary();
        assert_eq!(vocab.suggest_document_types("cts"), vec!["CTS", "CONSTANCIA CTS"]);
        assert_eq!(vocab.suggest_document_types("").len(), 4);
        assert!(vocab.suggest_document_types("xyz").is_empty());
    }

    #[test]
    fn test_suggestions_ignore_case_when_ordering() {
        let vocab = FilterVocabulary {
            document_types: vec![
                "Zeta boleta".into(),
                "apellido boleta".into(),
                "BOLETA".into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            vocab.suggest_document_types("boleta"),
            vec!["BOLETA", "apellido boleta", "Zeta boleta"]
        );
    }

    #[test]
    fn test_suggestions_capped() {
        let vocab = FilterVocabulary {
            document_types: (0..40).map(|i| format!("TIPO {:02}", i)).collect(),
            ..Default::default()
        };
        assert_eq!(vocab.suggest_document_types("tipo").len(), SUGGESTIONS_MAX);
    }

    #[tokio::test]
    async fn test_load_failure_keeps_previous() {
        let server = MockServer::start().await;
        server.respond(
            "GET /api/filter-options",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "boom"}),
        );
        let api = ApiClient::new(&server.url());
        let previous = vocabulary();
        let loaded = load_filter_options(&api, "t", &previous).await.unwrap();
        assert_eq!(loaded, previous);
    }

    #[tokio::test]
    async fn test_load_expired_session_is_an_error() {
        let server = MockServer::start().await;
        server.respond("GET /api/filter-options", StatusCode::UNAUTHORIZED, json!({}));
        let api = ApiClient::new(&server.url());
        let err = load_filter_options(&api, "t", &FilterVocabulary::default())
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());
    }
}

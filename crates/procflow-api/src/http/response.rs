//! Envelope wrapping every REST response.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "/api/v1/runs/..." }
//! }
//! ```
//!
//! List endpoints also report `meta.count`. Failed requests carry
//! `data: null` and one entry in `errors`.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub meta: ApiMeta,
    pub errors: Vec<ApiErrorDetail>,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    /// Number of items, for list responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable code such as `RUN_NOT_FOUND`.
    pub code: String,
    pub message: String,
    /// Structured context, e.g. the validation report of a refused run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiMeta {
    fn since(start: Option<Instant>) -> Self {
        let elapsed = start.map(|s| s.elapsed().as_millis()).unwrap_or(0);
        Self {
            request_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            response_time_ms: u64::try_from(elapsed).unwrap_or(u64::MAX),
            count: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap `data`, timing the request from `start`.
    pub fn success(data: T, start: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::since(Some(start)),
            errors: Vec::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &'static str, href: &str) -> Self {
        self.links.insert(rel, href.to_string());
        self
    }
}

impl<U: Serialize> ApiResponse<Vec<U>> {
    /// Wrap a list, recording its length in `meta.count`.
    pub fn list(items: Vec<U>, start: Instant) -> Self {
        let count = items.len();
        let mut resp = Self::success(items, start);
        resp.meta.count = Some(count);
        resp
    }
}

impl ApiResponse<()> {
    /// An envelope with no data and a single error.
    pub fn failure(code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            data: None,
            meta: ApiMeta::since(None),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message,
                details,
            }],
            links: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_reports_count_and_links() {
        let resp = ApiResponse::list(vec!["a", "b"], Instant::now())
            .with_link("self", "/api/v1/workflows");
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["data"], json!(["a", "b"]));
        assert_eq!(value["meta"]["count"], 2);
        assert_eq!(value["_links"]["self"], "/api/v1/workflows");
        assert!(value["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn failure_has_no_data_and_omits_empty_links() {
        let resp = ApiResponse::failure("CONFLICT", "stale run".to_string(), None);
        let value = serde_json::to_value(&resp).unwrap();

        assert!(value["data"].is_null());
        assert!(value.get("_links").is_none());
        assert!(value["meta"].get("count").is_none());
        assert_eq!(value["errors"][0]["code"], "CONFLICT");
        assert!(value["errors"][0].get("details").is_none());
    }
}

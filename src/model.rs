use serde::Deserialize;
use serde_json::Value;

use crate::query::QueryDescriptor;

/// One result record exactly as received from the API. Opaque except for the
/// provider-assigned integer `id` and the candidate image URL fields.
pub type ResultRecord = serde_json::Map<String, Value>;

/// A fully-formed search request: one descriptor at one page position.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub descriptor: QueryDescriptor,
    pub page: u32,
    pub per_page: u32,
    pub safesearch: bool,
}

impl SearchRequest {
    /// Assembles the query parameters for this request. Optional filters are
    /// included only when set, so empty filters never reach the wire.
    pub fn query_params(&self, api_key: &str) -> Vec<(&'static str, String)> {
        let d = &self.descriptor;
        let mut params = vec![
            ("key", api_key.to_string()),
            ("q", d.q.clone()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
            ("safesearch", self.safesearch.to_string()),
            ("order", d.order.clone()),
        ];
        if !d.colors.is_empty() {
            params.push(("colors", d.colors.clone()));
        }
        if !d.orientation.is_empty() {
            params.push(("orientation", d.orientation.clone()));
        }
        if !d.image_type.is_empty() {
            params.push(("image_type", d.image_type.clone()));
        }
        if d.min_width > 0 {
            params.push(("min_width", d.min_width.to_string()));
        }
        params
    }
}

/// Parsed body of a search response page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "totalHits", default)]
    pub total_hits: u64,

    #[serde(default)]
    pub hits: Vec<ResultRecord>,
}

/// Extracts the provider-assigned ID, if present and integral.
pub fn record_id(record: &ResultRecord) -> Option<u64> {
    record.get("id").and_then(Value::as_u64)
}

/// Best available image URL: the large variant when present, otherwise the
/// web-format variant.
pub fn best_image_url(record: &ResultRecord) -> Option<&str> {
    for key in ["largeImageURL", "webformatURL"] {
        if let Some(url) = record.get(key).and_then(Value::as_str) {
            if !url.is_empty() {
                return Some(url);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> ResultRecord {
        fields.as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&record(json!({"id": 42}))), Some(42));
        assert_eq!(record_id(&record(json!({"id": "42"}))), None);
        assert_eq!(record_id(&record(json!({"tags": "x"}))), None);
    }

    #[test]
    fn test_best_image_url_prefers_large() {
        let r = record(json!({
            "largeImageURL": "https://cdn/large.jpg",
            "webformatURL": "https://cdn/web.jpg"
        }));
        assert_eq!(best_image_url(&r), Some("https://cdn/large.jpg"));
    }

    #[test]
    fn test_best_image_url_falls_back_to_webformat() {
        let r = record(json!({"webformatURL": "https://cdn/web.jpg"}));
        assert_eq!(best_image_url(&r), Some("https://cdn/web.jpg"));

        let empty_large = record(json!({
            "largeImageURL": "",
            "webformatURL": "https://cdn/web.jpg"
        }));
        assert_eq!(best_image_url(&empty_large), Some("https://cdn/web.jpg"));

        assert_eq!(best_image_url(&record(json!({"id": 1}))), None);
    }

    #[test]
    fn test_search_response_deserialization() {
        let body = json!({
            "total": 9999,
            "totalHits": 500,
            "hits": [{"id": 1, "webformatURL": "https://cdn/1.jpg"}]
        });
        let resp: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.total_hits, 500);
        assert_eq!(resp.hits.len(), 1);

        let empty: SearchResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.total_hits, 0);
        assert!(empty.hits.is_empty());
    }

    #[test]
    fn test_query_params_skip_empty_filters() {
        let request = SearchRequest {
            descriptor: QueryDescriptor {
                colors: String::new(),
                image_type: "photo".to_string(),
                min_width: 0,
                order: "popular".to_string(),
                orientation: "all".to_string(),
                q: "makeup".to_string(),
            },
            page: 2,
            per_page: 200,
            safesearch: true,
        };
        let params = request.query_params("secret");

        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("key"), Some("secret"));
        assert_eq!(get("q"), Some("makeup"));
        assert_eq!(get("page"), Some("2"));
        assert_eq!(get("per_page"), Some("200"));
        assert_eq!(get("safesearch"), Some("true"));
        assert_eq!(get("order"), Some("popular"));
        assert_eq!(get("orientation"), Some("all"));
        assert_eq!(get("image_type"), Some("photo"));
        assert_eq!(get("colors"), None);
        assert_eq!(get("min_width"), None);
    }
}

//! Notion REST client
//!
//! Thin `reqwest` wrapper that speaks the endpoints the reconciler needs and
//! classifies HTTP failures into [`SyncError`] kinds:
//!
//! - 429 → `RateLimited` (with `Retry-After` when sent)
//! - 409, 5xx and connection failures → `Transient`
//! - 401, 403 → `Permanent`
//! - any other 4xx → `Rejected`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;

use super::blocks::{block_to_json, properties_to_json, property_plain_text};
use super::{Properties, RecordId, RecordStore, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use crate::models::Block;

/// Public Notion API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.notion.com/v1";

/// API version sent in the `Notion-Version` header
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 30;

/// Maximum page size for list/query endpoints
const PAGE_SIZE: u32 = 100;

/// Connection settings for one target database
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
    pub base_url: String,
    pub version: String,
}

/// Notion-backed record store
pub struct NotionClient {
    http: reqwest::Client,
    settings: NotionSettings,
}

impl NotionClient {
    /// Create a client, failing fast when credentials are missing
    pub fn new(settings: NotionSettings) -> SyncResult<Self> {
        if settings.token.trim().is_empty() {
            return Err(SyncError::Permanent("Notion token is not configured".to_string()));
        }
        if settings.database_id.trim().is_empty() {
            return Err(SyncError::Permanent(
                "Notion database id is not configured".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("mdsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Permanent(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, settings })
    }

    /// The target database
    pub fn database_id(&self) -> &str {
        &self.settings.database_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path);
        self.http
            .request(method, url)
            .bearer_auth(&self.settings.token)
            .header("Notion-Version", &self.settings.version)
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Value> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let code = body["code"].as_str().unwrap_or("unknown").to_string();
        let message = body["message"]
            .as_str()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
            .to_string();

        debug!("Notion request failed: {} {} {}", status, code, message);
        Err(classify_status(status.as_u16(), code, message, retry_after))
    }

    /// Run a database query, following pagination
    async fn query_all(&self, filter: Value) -> SyncResult<Vec<Value>> {
        let path = format!("databases/{}/query", self.settings.database_id);
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "filter": filter, "page_size": PAGE_SIZE });
            if let Some(ref c) = cursor {
                body["start_cursor"] = json!(c);
            }

            let page = self
                .send(self.request(Method::POST, &path).json(&body))
                .await?;
            collect_page(&page, &mut results, &mut cursor);
            if cursor.is_none() {
                return Ok(results);
            }
        }
    }
}

/// Push a page's results and advance the cursor (`None` when done)
fn collect_page(page: &Value, results: &mut Vec<Value>, cursor: &mut Option<String>) {
    if let Some(items) = page["results"].as_array() {
        results.extend(items.iter().cloned());
    }
    *cursor = if page["has_more"].as_bool().unwrap_or(false) {
        page["next_cursor"].as_str().map(str::to_string)
    } else {
        None
    };
}

fn object_id(value: &Value) -> Option<RecordId> {
    value["id"].as_str().map(str::to_string)
}

/// Map an HTTP failure to an error kind
pub(crate) fn classify_status(
    status: u16,
    code: String,
    message: String,
    retry_after: Option<Duration>,
) -> SyncError {
    match status {
        429 => SyncError::RateLimited { retry_after },
        401 | 403 => SyncError::Permanent(format!("{} ({})", message, code)),
        409 | 500..=599 => SyncError::Transient(format!("{} {}: {}", status, code, message)),
        _ => SyncError::Rejected {
            status,
            code,
            message,
        },
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn check_access(&self) -> SyncResult<()> {
        let path = format!("databases/{}", self.settings.database_id);
        match self.send(self.request(Method::GET, &path)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => Err(e),
            Err(SyncError::Rejected { message, .. }) => Err(SyncError::Permanent(format!(
                "database {} is not accessible: {}",
                self.settings.database_id, message
            ))),
            Err(e) => Err(e),
        }
    }

    async fn query_equals(&self, property: &str, value: &str) -> SyncResult<Vec<RecordId>> {
        let filter = json!({ "property": property, "rich_text": { "equals": value } });
        let pages = self.query_all(filter).await?;
        Ok(pages.iter().filter_map(object_id).collect())
    }

    async fn list_flagged(
        &self,
        flag_property: &str,
        key_property: &str,
    ) -> SyncResult<Vec<RemoteRecord>> {
        let filter = json!({ "property": flag_property, "checkbox": { "equals": true } });
        let pages = self.query_all(filter).await?;

        Ok(pages
            .iter()
            .filter_map(|page| {
                let id = object_id(page)?;
                let key = page["properties"]
                    .get(key_property)
                    .and_then(property_plain_text)
                    .filter(|k| !k.is_empty());
                Some(RemoteRecord { id, key })
            })
            .collect())
    }

    async fn create_record(
        &self,
        properties: &Properties,
        children: &[Block],
    ) -> SyncResult<RecordId> {
        let body = json!({
            "parent": { "database_id": self.settings.database_id },
            "properties": properties_to_json(properties),
            "children": children.iter().map(block_to_json).collect::<Vec<_>>(),
        });

        let page = self
            .send(self.request(Method::POST, "pages").json(&body))
            .await?;
        object_id(&page).ok_or_else(|| SyncError::Rejected {
            status: 200,
            code: "invalid_response".to_string(),
            message: "created page has no id".to_string(),
        })
    }

    async fn update_properties(&self, id: &str, properties: &Properties) -> SyncResult<()> {
        let body = json!({ "properties": properties_to_json(properties) });
        self.send(self.request(Method::PATCH, &format!("pages/{}", id)).json(&body))
            .await?;
        Ok(())
    }

    async fn list_children(&self, id: &str) -> SyncResult<Vec<RecordId>> {
        let path = format!("blocks/{}/children", id);
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, &path)
                .query(&[("page_size", PAGE_SIZE.to_string())]);
            if let Some(ref c) = cursor {
                request = request.query(&[("start_cursor", c)]);
            }

            let page = self.send(request).await?;
            collect_page(&page, &mut blocks, &mut cursor);
            if cursor.is_none() {
                return Ok(blocks.iter().filter_map(object_id).collect());
            }
        }
    }

    async fn delete_block(&self, block_id: &str) -> SyncResult<()> {
        self.send(self.request(Method::DELETE, &format!("blocks/{}", block_id)))
            .await?;
        Ok(())
    }

    async fn append_children(&self, id: &str, children: &[Block]) -> SyncResult<()> {
        let body = json!({
            "children": children.iter().map(block_to_json).collect::<Vec<_>>(),
        });
        self.send(
            self.request(Method::PATCH, &format!("blocks/{}/children", id))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn archive_record(&self, id: &str) -> SyncResult<()> {
        let body = json!({ "archived": true });
        self.send(self.request(Method::PATCH, &format!("pages/{}", id)).json(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::PropertyValue;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> NotionClient {
        NotionClient::new(NotionSettings {
            token: "secret-token".to_string(),
            database_id: "db1".to_string(),
            base_url: server.uri(),
            version: DEFAULT_NOTION_VERSION.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_missing_credentials_are_permanent() {
        let err = NotionClient::new(NotionSettings {
            token: String::new(),
            database_id: "db1".to_string(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            version: DEFAULT_NOTION_VERSION.to_string(),
        })
        .err()
        .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_classify_status() {
        let c = |status| classify_status(status, "code".to_string(), "msg".to_string(), None);
        assert!(matches!(c(429), SyncError::RateLimited { .. }));
        assert!(matches!(c(401), SyncError::Permanent(_)));
        assert!(matches!(c(403), SyncError::Permanent(_)));
        assert!(matches!(c(502), SyncError::Transient(_)));
        assert!(matches!(c(409), SyncError::Transient(_)));
        assert!(matches!(c(400), SyncError::Rejected { status: 400, .. }));
        assert!(matches!(c(404), SyncError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_query_equals_sends_filter_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/db1/query"))
            .and(header("Authorization", "Bearer secret-token"))
            .and(header("Notion-Version", DEFAULT_NOTION_VERSION))
            .and(body_partial_json(json!({
                "filter": { "property": "Slug", "rich_text": { "equals": "my-post" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": "page-1" }],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ids = client_for(&server)
            .query_equals("Slug", "my-post")
            .await
            .unwrap();
        assert_eq!(ids, vec!["page-1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_children_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/page-1/children"))
            .and(query_param("start_cursor", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": "b3" }],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks/page-1/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": "b1" }, { "id": "b2" }],
                "has_more": true,
                "next_cursor": "c2"
            })))
            .mount(&server)
            .await;

        let ids = client_for(&server).list_children("page-1").await.unwrap();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn test_create_record_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pages"))
            .and(body_partial_json(json!({
                "parent": { "database_id": "db1" },
                "properties": { "Slug": { "rich_text": [{ "text": { "content": "my-post" } }] } },
                "children": [{ "type": "divider" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "page-9" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut properties = Properties::new();
        properties.insert(
            "Slug".to_string(),
            PropertyValue::RichText("my-post".to_string()),
        );
        let id = client_for(&server)
            .create_record(&properties, &[Block::Divider])
            .await
            .unwrap();
        assert_eq!(id, "page-9");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/blocks/b1"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "2")
                    .set_body_json(json!({ "code": "rate_limited", "message": "slow down" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).delete_block("b1").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_check_access_missing_database_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/db1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "object_not_found",
                "message": "Could not find database"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).check_access().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_list_flagged_reads_key_property() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/db1/query"))
            .and(body_partial_json(json!({
                "filter": { "property": "Managed", "checkbox": { "equals": true } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "p1", "properties": { "Slug": { "rich_text": [{ "plain_text": "a" }] } } },
                    { "id": "p2", "properties": { "Slug": { "rich_text": [] } } }
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let records = client_for(&server)
            .list_flagged("Managed", "Slug")
            .await
            .unwrap();
        assert_eq!(
            records,
            vec![
                RemoteRecord {
                    id: "p1".to_string(),
                    key: Some("a".to_string()),
                },
                RemoteRecord {
                    id: "p2".to_string(),
                    key: None,
                },
            ]
        );
    }
}

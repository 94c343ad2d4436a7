use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::dto::{DatabaseInfo, Page, PagePatch, QueryRequest, QueryResponse};
use super::repo_types::{MealRecord, PhotoSource};
use crate::analysis::NutritionEstimate;
use crate::config::NotionConfig;
use crate::error::StoreError;

/// Largest page the query endpoint accepts.
const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Up to `limit` records whose analysis flag is false or absent.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<MealRecord>, StoreError>;

    async fn fetch_attachment(&self, record: &MealRecord) -> Result<Bytes, StoreError>;

    /// Writes every analysis field and sets the completion flag in one request.
    async fn write_back(
        &self,
        record_id: &str,
        estimate: &NutritionEstimate,
        analyzed_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    config: NotionConfig,
    download_timeout: Duration,
    max_download_bytes: u64,
}

impl NotionClient {
    pub fn new(http: reqwest::Client, config: NotionConfig, download_timeout: Duration) -> Self {
        Self {
            http,
            config,
            download_timeout,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }

    /// Photos larger than this fail with a download error instead of being buffered.
    pub fn with_max_download_bytes(mut self, max: u64) -> Self {
        self.max_download_bytes = max;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.config.token)
            .header("Notion-Version", &self.config.api_version)
            .timeout(self.config.timeout)
    }

    /// Reads the database metadata and returns its title.
    #[instrument(skip(self), fields(database_id = %self.config.database_id))]
    pub async fn check_database(&self) -> Result<String, StoreError> {
        let url = self.url(&format!("databases/{}", self.config.database_id));
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| StoreError::TransientFetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::TransientFetch(format!("{status}: {body}")));
        }
        let info: DatabaseInfo = response
            .json()
            .await
            .map_err(|e| StoreError::TransientFetch(e.to_string()))?;
        let title: String = info.title.into_iter().map(|t| t.plain_text).collect();
        info!(id = %info.id, %title, "database reachable");
        Ok(title)
    }

    async fn query_page(
        &self,
        url: &str,
        body: &QueryRequest<'_>,
    ) -> Result<QueryResponse, StoreError> {
        let response = self
            .authed(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::TransientFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::TransientFetch(format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::TransientFetch(format!("decode query response: {e}")))
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    #[instrument(skip(self), fields(database_id = %self.config.database_id))]
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<MealRecord>, StoreError> {
        let url = self.url(&format!("databases/{}/query", self.config.database_id));
        let page_size = limit.clamp(1, MAX_PAGE_SIZE);

        let mut pending = Vec::new();
        let mut cursor: Option<String> = None;
        let mut requests = 0usize;
        let mut scanned = 0usize;

        loop {
            let body = QueryRequest {
                page_size,
                start_cursor: cursor.as_deref(),
            };
            let page = match self.query_page(&url, &body).await {
                Ok(page) => page,
                Err(e) if requests > 0 => {
                    warn!(error = %e, collected = pending.len(), "follow-up query failed; keeping what was collected");
                    break;
                }
                Err(e) => return Err(e),
            };
            requests += 1;
            scanned += page.results.len();

            for value in page.results {
                let page_id = value
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned);
                match serde_json::from_value::<Page>(value) {
                    Ok(p) => {
                        let record = MealRecord::from(p);
                        if !record.analysis_done && pending.len() < limit {
                            pending.push(record);
                        }
                    }
                    Err(e) => warn!(
                        page_id = page_id.as_deref().unwrap_or("unknown"),
                        error = %e,
                        "skipping record that could not be decoded"
                    ),
                }
            }

            if pending.len() >= limit || !page.has_more {
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(requests, scanned, pending = pending.len(), "queried records");
        Ok(pending)
    }

    #[instrument(skip(self, record), fields(record_id = %record.id))]
    async fn fetch_attachment(&self, record: &MealRecord) -> Result<Bytes, StoreError> {
        let photo = record
            .photo
            .as_ref()
            .ok_or_else(|| StoreError::AttachmentUnavailable(record.id.clone()))?;

        let mut req = self.http.get(&photo.url).timeout(self.download_timeout);
        if photo.source == PhotoSource::Hosted {
            req = req.bearer_auth(&self.config.token);
        }

        let mut response = req
            .send()
            .await
            .map_err(|e| StoreError::Download(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            if let Some(expires_at) = &photo.expires_at {
                warn!(%status, %expires_at, "photo download rejected; link may have expired");
            }
            return Err(StoreError::Download(format!("{status} from photo url")));
        }

        let max = self.max_download_bytes;
        if let Some(len) = response.content_length().filter(|len| *len > max) {
            return Err(StoreError::Download(format!(
                "photo is {len} bytes, limit is {max}"
            )));
        }
        let mut buf = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StoreError::Download(e.to_string()))?
        {
            if (buf.len() + chunk.len()) as u64 > max {
                return Err(StoreError::Download(format!(
                    "photo exceeds limit of {max} bytes"
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        let bytes = buf.freeze();
        if bytes.is_empty() {
            return Err(StoreError::Download("empty photo body".into()));
        }
        debug!(len = bytes.len(), name = ?photo.name, "photo downloaded");
        Ok(bytes)
    }

    #[instrument(skip(self, estimate), fields(record_id = %record_id))]
    async fn write_back(
        &self,
        record_id: &str,
        estimate: &NutritionEstimate,
        analyzed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let fail = |reason: String| StoreError::WriteBack {
            record_id: record_id.to_string(),
            reason,
        };

        let patch = PagePatch::from_estimate(estimate, analyzed_at);
        let response = self
            .authed(self.http.patch(self.url(&format!("pages/{record_id}"))))
            .json(&patch)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("{status}: {body}")));
        }
        info!("record updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::repo_types::PhotoRef;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client(base: &str) -> NotionClient {
        let config = NotionConfig {
            token: "secret_test".into(),
            database_id: "db1".into(),
            api_base: base.into(),
            api_version: "2024-04-04".into(),
            timeout: Duration::from_secs(5),
        };
        NotionClient::new(reqwest::Client::new(), config, Duration::from_millis(500))
    }

    fn page(id: &str, done: Option<bool>) -> serde_json::Value {
        let mut props = json!({});
        if let Some(done) = done {
            props["AI Analysis Done"] = json!({"type": "checkbox", "checkbox": done});
        }
        json!({"object": "page", "id": id, "properties": props})
    }

    fn record(url: String, source: PhotoSource) -> MealRecord {
        MealRecord {
            id: "rec-1".into(),
            photo: Some(PhotoRef {
                url,
                name: None,
                source,
                expires_at: None,
            }),
            analysis_done: false,
        }
    }

    #[tokio::test]
    async fn fetch_pending_excludes_completed_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(header("Authorization", "Bearer secret_test"))
            .and(header("Notion-Version", "2024-04-04"))
            .and(body_json(json!({"page_size": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [page("a", Some(true)), page("b", Some(false)), page("c", None), page("d", Some(true))],
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server.uri()).fetch_pending(10).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(records.iter().all(|r| !r.analysis_done));
    }

    #[tokio::test]
    async fn fetch_pending_respects_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("a", None), page("b", None), page("c", None)]
            })))
            .mount(&server)
            .await;

        let records = client(&server.uri()).fetch_pending(2).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn fetch_pending_follows_cursor_past_completed_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_json(json!({"page_size": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("done-1", Some(true)), page("done-2", Some(true))],
                "has_more": true,
                "next_cursor": "c2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_json(json!({"page_size": 2, "start_cursor": "c2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("pending-old", None), page("done-3", Some(true)), page("pending-new", Some(false))],
                "has_more": true,
                "next_cursor": "c3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server.uri()).fetch_pending(2).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["pending-old", "pending-new"]);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fetch_pending_stops_when_no_cursor_is_given() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("done-1", Some(true))],
                "has_more": true,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server.uri()).fetch_pending(5).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn undecodable_record_does_not_sink_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    page("good", None),
                    {"id": "bad", "properties": {
                        "Meal Photo": {"type": "files", "files": [{"type": "file", "file": {}}]}
                    }},
                    {"properties": {}}
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let records = client(&server.uri()).fetch_pending(10).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[tokio::test]
    async fn unauthorized_query_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"code": "unauthorized"})))
            .mount(&server)
            .await;

        let err = client(&server.uri()).fetch_pending(10).await.unwrap_err();
        assert!(matches!(err, StoreError::TransientFetch(_)));
    }

    #[tokio::test]
    async fn unreachable_store_is_transient() {
        let err = client("http://127.0.0.1:9").fetch_pending(10).await.unwrap_err();
        assert!(matches!(err, StoreError::TransientFetch(_)));
    }

    #[tokio::test]
    async fn hosted_attachment_carries_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/meal.jpg"))
            .and(header("Authorization", "Bearer secret_test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let rec = record(format!("{}/files/meal.jpg", server.uri()), PhotoSource::Hosted);
        let bytes = client(&server.uri()).fetch_attachment(&rec).await.unwrap();
        assert_eq!(&bytes[..], b"jpeg");
    }

    #[tokio::test]
    async fn external_attachment_is_fetched_without_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cdn/plate.png"))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_bytes(b"png".to_vec())
                }
            })
            .mount(&server)
            .await;

        let rec = record(format!("{}/cdn/plate.png", server.uri()), PhotoSource::External);
        let bytes = client(&server.uri()).fetch_attachment(&rec).await.unwrap();
        assert_eq!(&bytes[..], b"png");
    }

    #[tokio::test]
    async fn missing_photo_is_attachment_unavailable() {
        let rec = MealRecord {
            id: "rec-9".into(),
            photo: None,
            analysis_done: false,
        };
        let err = client("http://127.0.0.1:9").fetch_attachment(&rec).await.unwrap_err();
        assert!(matches!(err, StoreError::AttachmentUnavailable(id) if id == "rec-9"));
    }

    #[tokio::test]
    async fn expired_link_and_slow_download_are_download_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/expired.jpg"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(path("/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let c = client(&server.uri());
        for name in ["expired.jpg", "slow.jpg"] {
            let rec = record(format!("{}/{name}", server.uri()), PhotoSource::Hosted);
            let err = c.fetch_attachment(&rec).await.unwrap_err();
            assert!(matches!(err, StoreError::Download(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn oversized_photo_is_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/huge.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8; 64]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/small.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8; 16]))
            .mount(&server)
            .await;

        let c = client(&server.uri()).with_max_download_bytes(32);
        let huge = record(format!("{}/files/huge.jpg", server.uri()), PhotoSource::Hosted);
        let err = c.fetch_attachment(&huge).await.unwrap_err();
        assert!(matches!(err, StoreError::Download(ref msg) if msg.contains("limit")), "{err}");

        let small = record(format!("{}/files/small.jpg", server.uri()), PhotoSource::Hosted);
        assert_eq!(c.fetch_attachment(&small).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn write_back_patches_data_and_flag_together() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/rec-1"))
            .and(header("Notion-Version", "2024-04-04"))
            .and(body_partial_json(json!({
                "properties": {
                    "AI Analysis Done": {"checkbox": true},
                    "Food Name": {"title": [{"text": {"content": "Dal"}}]},
                    "KCal Count": {"number": 300}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec-1"})))
            .expect(2)
            .mount(&server)
            .await;

        let est = NutritionEstimate {
            food_name: "Dal".into(),
            calories: 300,
            ..NutritionEstimate::default()
        };
        let at = OffsetDateTime::now_utc();
        let c = client(&server.uri());
        c.write_back("rec-1", &est, at).await.unwrap();
        c.write_back("rec-1", &est, at).await.unwrap();

        let bodies: Vec<serde_json::Value> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.body_json().unwrap())
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn rejected_patch_is_write_back_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .write_back("rec-1", &NutritionEstimate::default(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteBack { ref record_id, .. } if record_id == "rec-1"));
    }

    #[tokio::test]
    async fn check_database_returns_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/db1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "database",
                "id": "db1",
                "title": [{"type": "text", "plain_text": "Meal "}, {"type": "text", "plain_text": "Log"}]
            })))
            .mount(&server)
            .await;

        let title = client(&server.uri()).check_database().await.unwrap();
        assert_eq!(title, "Meal Log");
    }
}

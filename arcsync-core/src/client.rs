//! REST client for the archive's record API.
//!
//! Maps the `RecordStore` operations onto the archive's draft/version
//! endpoints. Every call is a single HTTP request awaited to completion;
//! non-success responses are classified into the `StoreError` taxonomy by
//! status code. No retries, backoff, or timeouts are layered on top of the
//! transport defaults.

use crate::record::{Checksum, FileDescriptor, FileSet};
use crate::store::{RecordStore, Result, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Client for one archive instance, authenticated with a bearer token.
pub struct ArchiveClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

/// One entry of a draft's file listing. Entries that are registered but not
/// yet committed carry no checksum.
#[derive(Debug, Deserialize)]
struct FileEntry {
    key: String,
    #[serde(default)]
    checksum: Option<Checksum>,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    entries: Vec<FileEntry>,
}

impl ArchiveClient {
    /// Create a client for `https://{domain}`.
    pub fn new(domain: &str, token: &str) -> Self {
        Self::with_base_url(&format!("https://{}", domain), token)
    }

    /// Create a client against a full base URL (e.g. a local test server).
    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}{}", self.base_url, resource)
    }

    /// Send a request with auth headers attached; classify failures.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), message))
    }

    /// Send a request and decode its JSON body.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        response.json().await.map_err(|e| StoreError::Protocol {
            status,
            message: format!("invalid JSON body: {}", e),
        })
    }
}

/// Classify a non-success status into the error taxonomy.
fn classify_status(status: u16, message: String) -> StoreError {
    match status {
        401 | 403 => StoreError::Authorization { status },
        404 => StoreError::NotFound(message),
        409 => StoreError::Conflict(message),
        _ => StoreError::Protocol { status, message },
    }
}

#[async_trait]
impl RecordStore for ArchiveClient {
    async fn create_version(&self, previous_id: &str) -> Result<String> {
        let url = self.url(&format!("/api/records/{}/versions", previous_id));
        let body: Value = self.send_json(self.http.post(&url)).await?;

        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Protocol {
                status: 200,
                message: "version response carries no record id".to_string(),
            })
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        let url = self.url(&format!("/api/records/{}/draft", id));
        self.send_json(self.http.get(&url)).await
    }

    async fn put_metadata(&self, id: &str, doc: &Value) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft", id));
        self.send(self.http.put(&url).json(doc)).await?;
        Ok(())
    }

    async fn import_links(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft/actions/files-import", id));
        self.send(self.http.post(&url)).await?;
        Ok(())
    }

    async fn list_linked_files(&self, id: &str) -> Result<FileSet> {
        let url = self.url(&format!("/api/records/{}/draft/files", id));
        let listing: FileListing = self.send_json(self.http.get(&url)).await?;

        let set = listing
            .entries
            .into_iter()
            .map(|entry| FileDescriptor {
                name: entry.key,
                checksum: entry.checksum.unwrap_or_else(|| Checksum::new("")),
            })
            .collect();

        Ok(set)
    }

    async fn delete_link(&self, id: &str, name: &str) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft/files/{}", id, name));
        self.send(self.http.delete(&url)).await?;
        Ok(())
    }

    async fn register_file(&self, id: &str, name: &str) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft/files", id));
        self.send(self.http.post(&url).json(&json!([{ "key": name }])))
            .await?;
        Ok(())
    }

    async fn upload_content(&self, id: &str, name: &str, path: &Path) -> Result<()> {
        let file = tokio::fs::File::open(path).await?;
        let stream = ReaderStream::new(file);

        debug!(record = id, file = name, "streaming file content");
        let url = self.url(&format!("/api/records/{}/draft/files/{}/content", id, name));
        self.send(
            self.http
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(reqwest::Body::wrap_stream(stream)),
        )
        .await?;
        Ok(())
    }

    async fn commit_upload(&self, id: &str, name: &str) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft/files/{}/commit", id, name));
        self.send(self.http.post(&url)).await?;
        Ok(())
    }

    async fn publish(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/records/{}/draft/actions/publish", id));
        self.send(self.http.post(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_statuses_map_to_authorization() {
        for status in [401, 403] {
            match classify_status(status, String::new()) {
                StoreError::Authorization { status: s } => assert_eq!(s, status),
                other => panic!("expected Authorization, got {:?}", other),
            }
        }
    }

    #[test]
    fn not_found_and_conflict_are_distinguished() {
        assert!(matches!(
            classify_status(404, "no such record".to_string()),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(409, "links exist".to_string()),
            StoreError::Conflict(_)
        ));
    }

    #[test]
    fn other_statuses_map_to_protocol_with_message() {
        match classify_status(500, "boom".to_string()) {
            StoreError::Protocol { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Protocol, got {:?}", other),
        }
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ArchiveClient::with_base_url("https://archive.example.org/", "token");
        assert_eq!(
            client.url("/api/records/abc/draft"),
            "https://archive.example.org/api/records/abc/draft"
        );
    }
}

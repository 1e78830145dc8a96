//! HTTP implementation of the object-storage contract.
//!
//! Talks to a REST object-storage API with bearer-token authentication:
//!
//! - `GET    /folders?name=<name>`            — folder lookup
//! - `POST   /folders`                        — folder creation
//! - `GET    /folders/<id>/files[?name=]`     — file lookup / listing
//! - `POST   /folders/<id>/files?name=<name>` — file creation (raw body)
//! - `GET    /files/<id>/content`             — whole-file read
//! - `PUT    /files/<id>/content`             — whole-file replace
//!
//! A `401` response is classified as [`SyncError::AuthExpired`] and is
//! never retried here; the caller owns re-authentication.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;

use super::{ObjectStore, RemoteFile, RemoteId, TokenSource};
use crate::config::SyncConfig;
use crate::error::SyncError;

/// A token source backed by a fixed string, for API-key style deployments
/// and tests. Real deployments plug in a refreshing [`TokenSource`].
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn bearer_token(&self) -> Result<String, SyncError> {
        Ok(self.token.clone())
    }
}

#[derive(Serialize)]
struct CreateFolderBody<'a> {
    name: &'a str,
}

/// Object storage client over HTTP.
pub struct HttpObjectStore {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpObjectStore {
    /// Creates a client for the given API base URL.
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        config: &SyncConfig,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, SyncError> {
        let token = self.tokens.bearer_token().await?;
        Ok(request.header("Authorization", format!("Bearer {}", token)))
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response, SyncError> {
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(classify_status(status, context))
        }
    }

    async fn find_by_name(
        &self,
        path: &str,
        name: &str,
        context: &str,
    ) -> Result<Option<RemoteId>, SyncError> {
        let request = self.client.get(self.url(path)).query(&[("name", name)]);
        let entries: Vec<RemoteFile> = self
            .send(request, context)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
        Ok(entries.into_iter().find(|f| f.name == name).map(|f| f.id))
    }
}

/// Maps an unsuccessful HTTP status to the engine's error taxonomy.
fn classify_status(status: StatusCode, context: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::AuthExpired,
        StatusCode::NOT_FOUND => SyncError::FolderOrFileMissing(context.to_string()),
        _ => SyncError::SyncFailed(format!("{}: server returned status {}", context, status)),
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteId>, SyncError> {
        self.find_by_name("/folders", name, "folder lookup").await
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteId, SyncError> {
        let request = self
            .client
            .post(self.url("/folders"))
            .json(&CreateFolderBody { name });
        let created: RemoteFile = self
            .send(request, "folder creation")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
        Ok(created.id)
    }

    async fn find_file(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<RemoteId>, SyncError> {
        let path = format!("/folders/{}/files", folder_id);
        self.find_by_name(&path, name, "file lookup").await
    }

    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteId, SyncError> {
        let request = self
            .client
            .post(self.url(&format!("/folders/{}/files", folder_id)))
            .query(&[("name", name)])
            .body(content.to_vec());
        let created: RemoteFile = self
            .send(request, "file creation")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
        Ok(created.id)
    }

    async fn read_file(&self, file_id: &str) -> Result<Vec<u8>, SyncError> {
        let request = self.client.get(self.url(&format!("/files/{}/content", file_id)));
        let bytes = self
            .send(request, "file read")
            .await?
            .bytes()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn replace_file(&self, file_id: &str, content: &[u8]) -> Result<(), SyncError> {
        let request = self
            .client
            .put(self.url(&format!("/files/{}/content", file_id)))
            .body(content.to_vec());
        self.send(request, "file replace").await?;
        Ok(())
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SyncError> {
        let request = self
            .client
            .get(self.url(&format!("/folders/{}/files", folder_id)));
        self.send(request, "file listing")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unauthorized() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "file read");
        assert_eq!(err, SyncError::AuthExpired);
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_status(StatusCode::NOT_FOUND, "file read");
        assert!(matches!(err, SyncError::FolderOrFileMissing(_)));
    }

    #[test]
    fn test_classify_server_error_is_retryable() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "file replace");
        assert!(matches!(err, SyncError::SyncFailed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_static_token_source() {
        let tokens = StaticTokenSource::new("secret");
        assert_eq!(tokens.bearer_token().await.unwrap(), "secret");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = SyncConfig::default();
        let store = HttpObjectStore::new(
            "https://storage.example.com/",
            Arc::new(StaticTokenSource::new("k")),
            &config,
        )
        .unwrap();
        assert_eq!(store.url("/folders"), "https://storage.example.com/folders");
    }
}

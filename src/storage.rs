//! Cloud Storage JSON API implementation of [`ArchiveUploader`].
//!
//! Objects are written with a single streamed `uploadType=media` request. When the request
//! forbids overwriting, the upload carries `ifGenerationMatch=0` so the bucket rejects an
//! existing key with `412 Precondition Failed`, surfaced as [`UploadError::Conflict`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drive_bucket_core::contract::{ArchiveUploader, SessionProvider, UploadRequest, UploadedObject};
use drive_bucket_core::error::UploadError;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

pub const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
pub const PROJECT_HEADER: &str = "x-goog-project-id";

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    bucket: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    generation: Option<String>,
}

pub struct GcsUploader {
    client: reqwest::Client,
    base_url: String,
    sessions: Arc<dyn SessionProvider>,
    project_id: Option<String>,
    timeout: Duration,
}

impl GcsUploader {
    pub fn new(sessions: Arc<dyn SessionProvider>, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| GCS_UPLOAD_BASE.to_string());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            sessions,
            project_id: None,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_project_id(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ArchiveUploader for GcsUploader {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedObject, UploadError> {
        let key = request.key.clone();
        let session = self
            .sessions
            .session()
            .await
            .map_err(|source| UploadError::Auth {
                key: key.clone(),
                source,
            })?;

        let url = format!("{}/b/{}/o", self.base_url, request.bucket);
        let mut params = vec![("uploadType", "media".to_string()), ("name", key.clone())];
        if !request.overwrite {
            params.push(("ifGenerationMatch", "0".to_string()));
        }

        info!(
            bucket = %request.bucket,
            key = %key,
            size = request.size,
            content_type = %request.content_type,
            "Uploading object"
        );

        let body = ReaderStream::new(tokio::fs::File::from_std(request.body));
        let mut builder = self
            .client
            .post(&url)
            .query(&params)
            .bearer_auth(session.access_token())
            .header(CONTENT_TYPE, request.content_type.as_str())
            .header(CONTENT_LENGTH, request.size)
            .timeout(self.timeout)
            .body(reqwest::Body::wrap_stream(body));
        if let Some(project_id) = &self.project_id {
            builder = builder.header(PROJECT_HEADER, project_id.as_str());
        }

        let resp = builder.send().await.map_err(|e| {
            error!(key = %key, error = %e, "Upload request failed");
            UploadError::Transport {
                key: key.clone(),
                source: Box::new(e),
            }
        })?;

        let status = resp.status();
        if status == StatusCode::PRECONDITION_FAILED {
            error!(bucket = %request.bucket, key = %key, "Object already exists");
            return Err(UploadError::Conflict {
                bucket: request.bucket,
                key,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(key = %key, status = status.as_u16(), body = %body, "Upload rejected");
            return Err(UploadError::Status {
                key,
                status: status.as_u16(),
                body,
            });
        }

        let object: ObjectResource = resp.json().await.map_err(|e| UploadError::Transport {
            key: key.clone(),
            source: Box::new(e),
        })?;
        let size = object
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(request.size);
        info!(bucket = %object.bucket, key = %object.name, size, "Upload complete");
        Ok(UploadedObject {
            bucket: object.bucket,
            key: object.name,
            size,
            generation: object.generation,
        })
    }
}

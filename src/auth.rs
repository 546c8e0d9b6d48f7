//! OAuth sessions for the Google APIs.
//!
//! [`TokenFileSession`] reuses a cached token file (as written by the usual installed-app
//! consent flow) and refreshes it with the refresh token when it is about to expire. The
//! interactive consent flow itself is not implemented: without a token file the session
//! fails with [`AuthError::ConsentRequired`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use drive_bucket_core::contract::{Session, SessionProvider};
use drive_bucket_core::error::AuthError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "token_expiry")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Fields we do not interpret are written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CachedToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AuthError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| AuthError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Session backed by a cached, refreshable token file.
pub struct TokenFileSession {
    client: reqwest::Client,
    token_path: PathBuf,
    client_secret_path: PathBuf,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenFileSession {
    pub fn new(token_path: impl Into<PathBuf>, client_secret_path: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_path: token_path.into(),
            client_secret_path: client_secret_path.into(),
            cached: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<CachedToken, AuthError> {
        if !self.token_path.exists() {
            warn!(path = %self.token_path.display(), "No cached OAuth token");
            return Err(AuthError::ConsentRequired {
                path: self.token_path.clone(),
            });
        }
        let token: CachedToken = read_json(&self.token_path).await?;
        debug!(path = %self.token_path.display(), expiry = ?token.expiry, "Loaded cached OAuth token");
        Ok(token)
    }

    async fn client_secret(&self, token: &CachedToken) -> Result<ClientSecret, AuthError> {
        if let (Some(client_id), Some(client_secret)) = (&token.client_id, &token.client_secret) {
            return Ok(ClientSecret {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                token_uri: token.token_uri.clone(),
            });
        }
        let file: ClientSecretFile = read_json(&self.client_secret_path).await?;
        file.installed.or(file.web).ok_or_else(|| AuthError::Decode {
            path: self.client_secret_path.clone(),
            source: <serde_json::Error as serde::de::Error>::custom("expected an \"installed\" or \"web\" client"),
        })
    }

    async fn refresh(&self, mut token: CachedToken) -> Result<CachedToken, AuthError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let secret = self.client_secret(&token).await?;
        let token_uri = token
            .token_uri
            .clone()
            .or_else(|| secret.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        info!(token_uri = %token_uri, "Refreshing OAuth access token");
        let response = self
            .client
            .post(&token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Refresh {
                source: Box::new(e),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let refreshed: RefreshResponse = response.json().await.map_err(|e| AuthError::Refresh {
            source: Box::new(e),
        })?;

        token.access_token = refreshed.access_token;
        token.expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(rotated) = refreshed.refresh_token {
            token.refresh_token = Some(rotated);
        }
        self.persist(&token).await?;
        Ok(token)
    }

    async fn persist(&self, token: &CachedToken) -> Result<(), AuthError> {
        let json = serde_json::to_vec_pretty(token).map_err(|source| AuthError::Decode {
            path: self.token_path.clone(),
            source,
        })?;
        tokio::fs::write(&self.token_path, json)
            .await
            .map_err(|source| AuthError::Io {
                path: self.token_path.clone(),
                source,
            })?;
        debug!(path = %self.token_path.display(), "Persisted refreshed OAuth token");
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for TokenFileSession {
    async fn session(&self) -> Result<Session, AuthError> {
        let mut cached = self.cached.lock().await;
        let token = match cached.take() {
            Some(token) => token,
            None => self.load().await?,
        };
        let token = if token.is_fresh(Utc::now()) {
            token
        } else {
            self.refresh(token).await?
        };
        let session = Session::new(token.access_token.clone());
        *cached = Some(token);
        Ok(session)
    }
}

/// Session around a token issued elsewhere (e.g. `gcloud auth print-access-token`).
pub struct StaticTokenSession {
    token: String,
}

impl StaticTokenSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticTokenSession {
    async fn session(&self) -> Result<Session, AuthError> {
        Ok(Session::new(self.token.clone()))
    }
}

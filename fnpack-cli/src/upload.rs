//! # HTTP object store
//!
//! Wires [`fnpack::store::ObjectStore`] to an HTTP endpoint. Each object is a
//! single `PUT {endpoint}/{bucket}/{key}` carrying the artifact bytes, the
//! content type, a SHA-256 of the body and, when configured, a bearer token.
//!
//! Anything that speaks this shape works: an S3-compatible gateway, a
//! presigning proxy, or a test server.

use async_trait::async_trait;
use fnpack::store::{ObjectStore, PutObject, StoreError};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::load_config::StoreConfig;
use fnpack::store::LocalDirStore;

/// Header carrying the hex SHA-256 of the request body.
pub const CONTENT_SHA256_HEADER: &str = "x-content-sha256";

const USER_AGENT_VALUE: &str = concat!("fnpack/", env!("CARGO_PKG_VERSION"));

pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, timeout: Duration, token: Option<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to build HTTP client");
                e
            })?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        tracing::info!(
            endpoint = %endpoint,
            timeout_secs = timeout.as_secs(),
            token_set = token.is_some(),
            "Initialized HttpObjectStore"
        );
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }
}

/// Hex SHA-256 of `body`.
pub fn content_sha256(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, request: PutObject) -> Result<(), StoreError> {
        let url = self.object_url(&request.bucket, &request.key);
        let digest = content_sha256(&request.body);
        let bytes = request.body.len();
        tracing::debug!(url = %url, bytes, sha256 = %digest, "PUT object");

        let mut builder = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, HeaderValue::from_str(&request.content_type)?)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(CONTENT_SHA256_HEADER, digest);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = builder.body(request.body).send().await.map_err(|e| {
            tracing::error!(error = ?e, url = %url, "HTTP transport error");
            e
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %url, status = status.as_u16(), bytes, "Object stored");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(url = %url, status = status.as_u16(), body = %body, "Store rejected object");
            Err(format!("store responded {status} for {url}").into())
        }
    }
}

/// Build the store described by `config`.
pub fn store_from_config(
    config: &StoreConfig,
    token: Option<String>,
) -> Result<Box<dyn ObjectStore>, StoreError> {
    match config {
        StoreConfig::Http {
            endpoint,
            timeout_secs,
        } => Ok(Box::new(HttpObjectStore::new(
            endpoint,
            Duration::from_secs(*timeout_secs),
            token,
        )?)),
        StoreConfig::Local { root } => {
            tracing::info!(root = %root.display(), "Using local directory store");
            Ok(Box::new(LocalDirStore::new(root.clone())))
        }
    }
}

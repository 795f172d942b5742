//! Blob-store writer.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use crate::error::ContentError;

use super::client::{HttpClient, TRANSACTION_ID_HEADER, USER_AGENT};

const WRITER_PATH: &str = "/content/";

/// Writes enriched payloads to the blob store, keyed by uuid and date.
#[async_trait]
pub trait Updater: Send + Sync {
    async fn upload(
        &self,
        payload: Bytes,
        tid: &str,
        uuid: &str,
        date: &str,
    ) -> Result<(), ContentError>;

    async fn delete(&self, uuid: &str, tid: &str) -> Result<(), ContentError>;

    /// Probe the writer's health resource.
    async fn check_health(&self) -> Result<String, ContentError>;
}

/// Updater backed by the blob-writer HTTP endpoint.
pub struct BlobWriter {
    client: HttpClient,
    base_url: String,
    health_url: String,
}

impl BlobWriter {
    pub fn new(
        client: HttpClient,
        base_url: impl Into<String>,
        health_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            health_url: health_url.into(),
        }
    }
}

#[async_trait]
impl Updater for BlobWriter {
    async fn upload(
        &self,
        payload: Bytes,
        tid: &str,
        uuid: &str,
        date: &str,
    ) -> Result<(), ContentError> {
        let url = format!("{}{}{}?date={}", self.base_url, WRITER_PATH, uuid, date);
        let request = self
            .client
            .request(Method::PUT, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(CONTENT_TYPE, "application/json")
            .header(TRANSACTION_ID_HEADER, tid)
            .body(payload);

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ContentError::upstream_with_body(status.as_u16(), body))
    }

    async fn delete(&self, uuid: &str, tid: &str) -> Result<(), ContentError> {
        let url = format!("{}{}{}", self.base_url, WRITER_PATH, uuid);
        let request = self
            .client
            .request(Method::DELETE, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(TRANSACTION_ID_HEADER, tid);

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ContentError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ContentError::upstream_with_body(status.as_u16(), body))
    }

    async fn check_health(&self) -> Result<String, ContentError> {
        let request = self
            .client
            .request(Method::GET, &self.health_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        let response = self.client.execute(request).await?;
        if response.status() == reqwest::StatusCode::OK {
            Ok("Blob writer is good to go.".to_string())
        } else {
            Err(ContentError::upstream(response.status().as_u16()))
        }
    }
}

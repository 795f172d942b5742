//! Enriched-content fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Method;

use crate::error::ContentError;

use super::client::{HttpClient, TRANSACTION_ID_HEADER, USER_AGENT};

const ENRICHED_CONTENT_PATH: &str = "/enrichedcontent/";
const GTG_PATH: &str = "/__gtg";
const POLICY_HEADER: &str = "X-Policy";

/// Pulls the enriched payload for one document.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the enriched payload by uuid. The payload is opaque bytes and
    /// is forwarded verbatim to the blob store.
    async fn get_content(&self, uuid: &str, tid: &str) -> Result<Bytes, ContentError>;

    /// Probe the endpoint's good-to-go resource.
    async fn check_health(&self) -> Result<String, ContentError>;
}

/// Fetcher backed by the enriched-content HTTP endpoint.
pub struct EnrichedContentFetcher {
    client: HttpClient,
    base_url: String,
    x_policy: Option<String>,
    authorization: Option<String>,
}

impl EnrichedContentFetcher {
    pub fn new(
        client: HttpClient,
        base_url: impl Into<String>,
        x_policy: Option<String>,
        authorization: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            x_policy,
            authorization,
        }
    }
}

#[async_trait]
impl Fetcher for EnrichedContentFetcher {
    async fn get_content(&self, uuid: &str, tid: &str) -> Result<Bytes, ContentError> {
        let url = format!("{}{}{}", self.base_url, ENRICHED_CONTENT_PATH, uuid);
        let mut request = self
            .client
            .request(Method::GET, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(ACCEPT, "application/json")
            .header(TRANSACTION_ID_HEADER, tid);

        if let Some(policy) = &self.x_policy {
            request = request.header(POLICY_HEADER, policy);
        }
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ContentError::AccessDenied);
        }
        Err(ContentError::upstream(status.as_u16()))
    }

    async fn check_health(&self) -> Result<String, ContentError> {
        let url = format!("{}{}", self.base_url, GTG_PATH);
        let request = self
            .client
            .request(Method::GET, &url)
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        let response = self.client.execute(request).await?;
        if response.status() == reqwest::StatusCode::OK {
            Ok("Enriched content endpoint is good to go.".to_string())
        } else {
            Err(ContentError::upstream(response.status().as_u16()))
        }
    }
}

//! CloudFormation status document and its delivery
//!
//! The document is PUT to the pre-signed `ResponseURL` from the event. The
//! URL carries its own authorization and CloudFormation requires an empty
//! `Content-Type`.

use crate::event::EventIdentity;
use crate::handlers::Outcome;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Largest response body CloudFormation accepts
pub const MAX_RESPONSE_BYTES: usize = 4096;

const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseDocument {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: BTreeMap<String, Value>,
}

fn log_stream_hint(log_stream: Option<&str>) -> Option<String> {
    log_stream
        .filter(|s| !s.is_empty())
        .map(|s| format!("See the details in CloudWatch Log Stream: {}", s))
}

impl ResponseDocument {
    pub fn success(identity: &EventIdentity, outcome: Outcome, log_stream: Option<&str>) -> Self {
        Self {
            status: Status::Success,
            reason: log_stream_hint(log_stream),
            physical_resource_id: outcome.physical_resource_id,
            stack_id: identity.stack_id.clone(),
            request_id: identity.request_id.clone(),
            logical_resource_id: identity.logical_resource_id.clone(),
            data: outcome.data,
        }
    }

    pub fn failure(
        identity: &EventIdentity,
        physical_resource_id: impl Into<String>,
        reason: &str,
        log_stream: Option<&str>,
    ) -> Self {
        let reason = match log_stream_hint(log_stream) {
            Some(hint) => format!("{} ({})", reason, hint),
            None => reason.to_string(),
        };
        Self {
            status: Status::Failed,
            reason: Some(reason),
            physical_resource_id: physical_resource_id.into(),
            stack_id: identity.stack_id.clone(),
            request_id: identity.request_id.clone(),
            logical_resource_id: identity.logical_resource_id.clone(),
            data: BTreeMap::new(),
        }
    }

    /// Serialize, shortening the reason if the body would exceed the size limit
    pub fn to_body(&self) -> Result<String> {
        let body = serde_json::to_string(self).context("Failed to serialize response")?;
        if body.len() <= MAX_RESPONSE_BYTES {
            return Ok(body);
        }

        let Some(reason) = &self.reason else {
            warn!(
                "Response for {} is {} bytes, above the {} byte limit",
                self.logical_resource_id,
                body.len(),
                MAX_RESPONSE_BYTES
            );
            return Ok(body);
        };

        // JSON escaping makes the encoded reason at least as long as the raw one
        let excess = body.len() - MAX_RESPONSE_BYTES + TRUNCATION_MARKER.len();
        let mut keep = reason.len().saturating_sub(excess);
        loop {
            while keep > 0 && !reason.is_char_boundary(keep) {
                keep -= 1;
            }
            let mut trimmed = self.clone();
            trimmed.reason = Some(format!("{}{}", &reason[..keep], TRUNCATION_MARKER));
            let body = serde_json::to_string(&trimmed).context("Failed to serialize response")?;
            if body.len() <= MAX_RESPONSE_BYTES || keep == 0 {
                return Ok(body);
            }
            keep = keep.saturating_sub(body.len() - MAX_RESPONSE_BYTES);
        }
    }
}

/// Where status documents go
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(&self, response_url: &str, document: &ResponseDocument) -> Result<()>;
}

/// Delivers to the pre-signed ResponseURL
pub struct HttpResponseSink {
    client: reqwest::Client,
}

impl HttpResponseSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseSink for HttpResponseSink {
    async fn deliver(&self, response_url: &str, document: &ResponseDocument) -> Result<()> {
        let body = document.to_body()?;
        debug!("Response body: {}", body);

        let response = self
            .client
            .put(response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .context("Failed to send response to CloudFormation")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("CloudFormation rejected the response ({}): {}", status, text);
        }

        info!(
            "Delivered {:?} for {} ({})",
            document.status, document.logical_resource_id, document.request_id
        );
        Ok(())
    }
}

/// Prints the document instead of delivering it (local runs)
pub struct StdoutSink;

#[async_trait]
impl ResponseSink for StdoutSink {
    async fn deliver(&self, response_url: &str, document: &ResponseDocument) -> Result<()> {
        debug!("Not delivering to {}", response_url);
        let rendered =
            serde_json::to_string_pretty(document).context("Failed to serialize response")?;
        println!("{}", rendered);
        Ok(())
    }
}

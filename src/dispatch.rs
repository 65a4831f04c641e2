//! Request dispatcher
//!
//! Parses one event, runs the matching handler and delivers exactly one
//! status document. Everything between parsing and delivery (client
//! construction included) runs inside a guarded region: errors, panics and
//! the invocation time limit all turn into a FAILED document.

use crate::error::HandlerError;
use crate::event::{LifecycleEvent, RawEvent};
use crate::handlers::{get_resource_handler, Outcome, ResourceKind};
use crate::handlers::nodes::FAILED_PREFIX;
use crate::logging::invocation_span;
use crate::organizations::OrganizationsApi;
use crate::response::{ResponseDocument, ResponseSink};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Instrument};

/// Builds the Organizations client for one invocation
#[async_trait]
pub trait ApiConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn OrganizationsApi>>;
}

pub struct Dispatcher {
    connector: Arc<dyn ApiConnector>,
    sink: Arc<dyn ResponseSink>,
    default_time_limit: Duration,
    log_stream: Option<String>,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn ApiConnector>,
        sink: Arc<dyn ResponseSink>,
        default_time_limit: Duration,
    ) -> Self {
        Self {
            connector,
            sink,
            default_time_limit,
            log_stream: std::env::var("AWS_LAMBDA_LOG_STREAM_NAME").ok(),
        }
    }

    /// Override the log stream named in FAILED reasons
    pub fn with_log_stream(mut self, log_stream: Option<String>) -> Self {
        self.log_stream = log_stream;
        self
    }

    pub fn default_time_limit(&self) -> Duration {
        self.default_time_limit
    }

    pub async fn dispatch(&self, payload: &Value) -> Option<ResponseDocument> {
        self.dispatch_within(payload, self.default_time_limit).await
    }

    /// Handle one event payload and deliver its status document
    ///
    /// Returns the document that was produced, or `None` when the payload is
    /// not a JSON object and so cannot be a custom resource request.
    pub async fn dispatch_within(
        &self,
        payload: &Value,
        time_limit: Duration,
    ) -> Option<ResponseDocument> {
        if !payload.is_object() {
            error!("Event is not a JSON object, cannot respond");
            return None;
        }
        let raw = match RawEvent::deserialize(payload) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Event is not a custom resource request, cannot respond: {}", e);
                return None;
            }
        };

        let identity = raw.identity();
        let span = invocation_span(
            &identity.request_id,
            raw.request_type.as_deref().unwrap_or("unknown"),
            raw.resource_type.as_deref().unwrap_or("unknown"),
            &identity.logical_resource_id,
        );

        async {
            let document = self.process(&raw, time_limit).await;

            match &identity.response_url {
                Some(url) => {
                    if let Err(e) = self.sink.deliver(url, &document).await {
                        error!("Failed to deliver response: {:#}", e);
                    }
                }
                None => error!("Event has no ResponseURL, the response cannot be delivered"),
            }

            Some(document)
        }
        .instrument(span)
        .await
    }

    /// Produce the status document for an event without delivering it
    pub async fn process(&self, raw: &RawEvent, time_limit: Duration) -> ResponseDocument {
        let identity = raw.identity();
        let guarded = AssertUnwindSafe(tokio::time::timeout(time_limit, self.run(raw)));

        let result = match guarded.catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(HandlerError::Unknown(format!(
                "Operation did not complete within {}s",
                time_limit.as_secs()
            ))),
            Err(panic) => Err(HandlerError::Unknown(format!(
                "Handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match result {
            Ok(outcome) => {
                info!("Request succeeded, physical id {}", outcome.physical_resource_id);
                ResponseDocument::success(&identity, outcome, self.log_stream.as_deref())
            }
            Err(err) => {
                error!("Request failed: {}", err);
                ResponseDocument::failure(
                    &identity,
                    failed_physical_id(raw),
                    &err.to_string(),
                    self.log_stream.as_deref(),
                )
            }
        }
    }

    async fn run(&self, raw: &RawEvent) -> Result<Outcome, HandlerError> {
        let event = LifecycleEvent::from_raw(raw)?;
        let kind = ResourceKind::lookup(&event.resource_type)?;
        info!(
            "Handling {} {} for {}",
            event.request_type, event.resource_type, event.identity.logical_resource_id
        );

        let api = self.connector.connect().await?;
        get_resource_handler(kind).handle(api.as_ref(), &event).await
    }
}

/// Physical id reported with a FAILED status
///
/// The incoming id is echoed so a failed Update or Delete never looks like a
/// replacement; a failed Create gets a placeholder that Delete recognises.
fn failed_physical_id(raw: &RawEvent) -> String {
    match raw.physical_resource_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!(
            "{}{}",
            FAILED_PREFIX,
            raw.request_id.as_deref().unwrap_or("unknown")
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

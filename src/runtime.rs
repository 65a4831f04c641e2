//! Lambda runtime loop and local invocation
//!
//! `lambda_runtime` fetches each event and acknowledges it; the event itself
//! goes to the [`Dispatcher`]. The CloudFormation answer travels through the
//! event's ResponseURL, so the Lambda response only summarises it.

use crate::aws::client::{AwsClients, SessionSettings};
use crate::aws::retry::RetryPolicy;
use crate::config::Config;
use crate::dispatch::{ApiConnector, Dispatcher};
use crate::organizations::{OrganizationsApi, OrganizationsClient};
use crate::response::{HttpResponseSink, ResponseDocument, ResponseSink, StdoutSink};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Time kept back from the Lambda deadline for delivering the response
pub const REPORTING_MARGIN: Duration = Duration::from_secs(5);

/// Builds a signed Organizations client per invocation
pub struct AwsConnector {
    pool: reqwest::Client,
    settings: SessionSettings,
    retry: RetryPolicy,
}

impl AwsConnector {
    pub fn new(pool: reqwest::Client, settings: SessionSettings, retry: RetryPolicy) -> Self {
        Self {
            pool,
            settings,
            retry,
        }
    }
}

#[async_trait]
impl ApiConnector for AwsConnector {
    async fn connect(&self) -> Result<Arc<dyn OrganizationsApi>> {
        let clients = AwsClients::connect(self.pool.clone(), &self.settings).await?;
        Ok(Arc::new(OrganizationsClient::from_clients(
            &clients,
            self.retry.clone(),
        )))
    }
}

/// Time the dispatcher may spend on one invocation
///
/// The configured ceiling, shortened to leave [`REPORTING_MARGIN`] before the
/// Lambda deadline. A zero deadline means the runtime did not supply one.
pub fn time_limit(ceiling: Duration, deadline_ms: u64, now: SystemTime) -> Duration {
    if deadline_ms == 0 {
        return ceiling;
    }
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    let remaining = deadline.duration_since(now).unwrap_or(Duration::ZERO);
    ceiling.min(remaining.saturating_sub(REPORTING_MARGIN))
}

/// Handle one Lambda invocation
pub async fn handle_invocation(
    dispatcher: &Dispatcher,
    event: LambdaEvent<Value>,
) -> Result<Value, Error> {
    let limit = time_limit(
        dispatcher.default_time_limit(),
        event.context.deadline,
        SystemTime::now(),
    );
    debug!("Invocation {} may run for {:?}", event.context.request_id, limit);

    match dispatcher.dispatch_within(&event.payload, limit).await {
        Some(document) => Ok(acknowledgement(&document)),
        None => Err("Payload is not a CloudFormation custom resource request".into()),
    }
}

fn build_dispatcher(config: &Config, sink: Arc<dyn ResponseSink>, pool: reqwest::Client) -> Dispatcher {
    let connector = AwsConnector::new(pool, config.session_settings(), config.retry_policy());
    Dispatcher::new(Arc::new(connector), sink, config.invocation_timeout())
}

fn http_pool(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")
}

/// Summary returned to Lambda for an invocation
fn acknowledgement(document: &ResponseDocument) -> Value {
    json!({
        "Status": document.status,
        "PhysicalResourceId": document.physical_resource_id,
        "LogicalResourceId": document.logical_resource_id,
    })
}

/// Serve invocations until the Runtime API goes away
pub async fn serve(config: &Config) -> Result<()> {
    config.validate()?;

    let pool = http_pool(config)?;
    let dispatcher = build_dispatcher(config, Arc::new(HttpResponseSink::new(pool.clone())), pool);
    info!("Runtime ready in {}", config.region);

    let dispatcher = &dispatcher;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_invocation(dispatcher, event).await
    }))
    .await
    .map_err(|e| anyhow!(e))
}

/// Process one event read from a file
pub async fn invoke_file(config: &Config, path: &Path, print_only: bool) -> Result<ResponseDocument> {
    config.validate()?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read event file {}", path.display()))?;
    let payload: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let pool = http_pool(config)?;
    let sink: Arc<dyn ResponseSink> = if print_only {
        Arc::new(StdoutSink)
    } else {
        Arc::new(HttpResponseSink::new(pool.clone()))
    };

    build_dispatcher(config, sink, pool)
        .dispatch(&payload)
        .await
        .with_context(|| format!("{} is not a custom resource request", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizations::memory::InMemoryOrganizations;
    use lambda_runtime::Context;
    use std::sync::Mutex;

    struct MemoryConnector(Arc<InMemoryOrganizations>);

    #[async_trait]
    impl ApiConnector for MemoryConnector {
        async fn connect(&self) -> Result<Arc<dyn OrganizationsApi>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl ResponseSink for CountingSink {
        async fn deliver(&self, url: &str, _document: &ResponseDocument) -> Result<()> {
            self.0.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn invocation(payload: Value, deadline: SystemTime) -> LambdaEvent<Value> {
        let mut context = Context::default();
        context.request_id = "8476a536".to_string();
        context.deadline = deadline
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        LambdaEvent::new(payload, context)
    }

    #[test]
    fn test_time_limit_respects_deadline_and_ceiling() {
        let now = SystemTime::now();
        let deadline = (now + Duration::from_secs(60))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        let limit = time_limit(Duration::from_secs(300), deadline, now);
        assert!(limit <= Duration::from_secs(55));
        assert!(limit > Duration::from_secs(54));
        assert_eq!(
            time_limit(Duration::from_secs(10), deadline, now),
            Duration::from_secs(10)
        );

        let late = now + Duration::from_secs(120);
        assert_eq!(time_limit(Duration::from_secs(300), deadline, late), Duration::ZERO);
        assert_eq!(
            time_limit(Duration::from_secs(300), 0, now),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn test_invocation_is_answered_and_acknowledged() {
        let org = Arc::new(InMemoryOrganizations::new());
        let sink = Arc::new(CountingSink::default());
        let dispatcher = Dispatcher::new(
            Arc::new(MemoryConnector(org.clone())),
            sink.clone(),
            Duration::from_secs(60),
        );

        let event = invocation(
            json!({
                "RequestType": "Create",
                "ResourceType": "Custom::OrganizationalUnit",
                "ResourceProperties": {"Name": "Workloads", "ParentId": "root"},
                "StackId": "arn:aws:cloudformation:us-east-1:111111111111:stack/org/guid",
                "RequestId": "req-1",
                "LogicalResourceId": "WorkloadsOu",
                "ResponseURL": "https://example.com/response"
            }),
            SystemTime::now() + Duration::from_secs(300),
        );
        let ack = handle_invocation(&dispatcher, event).await.unwrap();

        assert_eq!(ack["Status"], "SUCCESS");
        assert_eq!(ack["LogicalResourceId"], "WorkloadsOu");
        let unit_id = ack["PhysicalResourceId"].as_str().unwrap();
        assert!(org.unit(unit_id).is_some());
        assert_eq!(*sink.0.lock().unwrap(), vec!["https://example.com/response"]);
    }

    #[tokio::test]
    async fn test_non_object_payload_is_an_invocation_error() {
        let sink = Arc::new(CountingSink::default());
        let dispatcher = Dispatcher::new(
            Arc::new(MemoryConnector(Arc::new(InMemoryOrganizations::new()))),
            sink.clone(),
            Duration::from_secs(60),
        );

        let event = invocation(json!("ping"), SystemTime::now() + Duration::from_secs(300));
        let err = handle_invocation(&dispatcher, event).await.unwrap_err();

        assert!(err.to_string().contains("not a CloudFormation custom resource request"));
        assert!(sink.0.lock().unwrap().is_empty());
    }
}

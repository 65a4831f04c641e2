//! Lightweight AWS HTTP Client with SigV4 signing
//!
//! Only the two services this provider talks to are described here:
//! Organizations (JSON 1.1 protocol) and STS (Query protocol).

use anyhow::anyhow;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::Client;
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::credentials::Credentials;

const GOVCLOUD_PREFIX: &str = "us-gov-";
const CHINA_PREFIX: &str = "cn-";

/// Failure of a single signed request
#[derive(Debug, Error)]
pub enum RequestError {
    /// The service answered with a non-2xx status
    #[error("AWS request failed ({status}): {body}")]
    Status {
        status: u16,
        /// Value of the `x-amzn-ErrorType` header, when present
        error_type: Option<String>,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Mask sensitive credential values for logging
fn mask_credential(value: &str) -> String {
    if value.len() <= 8 {
        "*".repeat(value.len())
    } else {
        format!("{}...{}", &value[..4], &value[value.len() - 4..])
    }
}

/// AWS Service definition
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Service signing name (e.g., "organizations", "sts")
    pub signing_name: &'static str,
    /// Service endpoint prefix
    pub endpoint_prefix: &'static str,
    /// API version (used by the Query protocol)
    pub api_version: &'static str,
    pub protocol: Protocol,
    /// Target prefix for JSON protocol
    pub target_prefix: Option<&'static str>,
    /// Whether this is a global service (one endpoint per partition)
    pub is_global: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
    /// Action=X&Version=Y as query params, XML response
    Query,
    /// JSON-RPC style with X-Amz-Target header
    Json,
}

/// Service definitions for the supported services
pub fn get_service(name: &str) -> Option<ServiceDefinition> {
    match name {
        "organizations" => Some(ServiceDefinition {
            signing_name: "organizations",
            endpoint_prefix: "organizations",
            api_version: "2016-11-28",
            protocol: Protocol::Json,
            target_prefix: Some("AWSOrganizationsV20161128"),
            is_global: true,
        }),
        "sts" => Some(ServiceDefinition {
            signing_name: "sts",
            endpoint_prefix: "sts",
            api_version: "2011-06-15",
            protocol: Protocol::Query,
            target_prefix: None,
            is_global: false,
        }),
        _ => None,
    }
}

/// AWS HTTP Client
#[derive(Clone)]
pub struct AwsHttpClient {
    http_client: Client,
    credentials: Credentials,
    region: String,
    endpoint_url: Option<String>,
}

impl AwsHttpClient {
    /// Create a client on top of an existing (possibly warm) connection pool
    pub fn with_client(
        http_client: Client,
        credentials: Credentials,
        region: &str,
        endpoint_url: Option<String>,
    ) -> Self {
        debug!(
            "Creating AWS HTTP client for region: {}, access_key: {}, endpoint_url: {:?}",
            region,
            mask_credential(&credentials.access_key_id),
            endpoint_url
        );
        Self {
            http_client,
            credentials,
            region: region.to_string(),
            endpoint_url,
        }
    }

    /// Replace credentials (e.g. after assuming a role)
    pub fn set_credentials(&mut self, credentials: Credentials) {
        debug!(
            "Updating credentials, access_key: {}",
            mask_credential(&credentials.access_key_id)
        );
        self.credentials = credentials;
    }

    pub fn set_endpoint_url(&mut self, endpoint_url: Option<String>) {
        self.endpoint_url = endpoint_url;
    }

    /// Determine which region signs requests for a service
    ///
    /// Global services are anchored in one region per partition.
    fn effective_region<'a>(&'a self, service: &ServiceDefinition) -> &'a str {
        if !service.is_global {
            return &self.region;
        }
        if self.region.starts_with(GOVCLOUD_PREFIX) {
            "us-gov-west-1"
        } else if self.region.starts_with(CHINA_PREFIX) {
            "cn-northwest-1"
        } else {
            "us-east-1"
        }
    }

    /// Determine the endpoint domain for a region
    fn endpoint_domain(region: &str) -> &'static str {
        if region.starts_with(CHINA_PREFIX) {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        }
    }

    /// Get the endpoint URL for a service
    fn get_endpoint(&self, service: &ServiceDefinition) -> String {
        // A custom endpoint applies to every service (LocalStack, tests)
        if let Some(ref endpoint) = self.endpoint_url {
            return endpoint.trim_end_matches('/').to_string();
        }

        let region = self.effective_region(service);
        format!(
            "https://{}.{}.{}",
            service.endpoint_prefix,
            region,
            Self::endpoint_domain(region)
        )
    }

    /// Make a Query protocol request (STS)
    pub async fn query_request(
        &self,
        service_name: &str,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RequestError> {
        debug!("Query request: service={}, action={}", service_name, action);

        let service = get_service(service_name)
            .ok_or_else(|| anyhow!("Unknown service: {}", service_name))?;

        let endpoint = self.get_endpoint(&service);

        let mut query_params: Vec<(&str, &str)> =
            vec![("Action", action), ("Version", service.api_version)];
        query_params.extend_from_slice(params);

        let query_string: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let url = format!("{}/?{}", endpoint, query_string);
        self.signed_request(&service, "POST", &url, "", None).await
    }

    /// Make a JSON protocol request (Organizations)
    pub async fn json_request(
        &self,
        service_name: &str,
        target: &str,
        body: &str,
    ) -> Result<String, RequestError> {
        debug!("JSON request: service={}, target={}", service_name, target);
        trace!("JSON body: {}", body);

        let service = get_service(service_name)
            .ok_or_else(|| anyhow!("Unknown service: {}", service_name))?;

        let url = format!("{}/", self.get_endpoint(&service));

        let target_header = format!(
            "{}.{}",
            service.target_prefix.unwrap_or(service.signing_name),
            target
        );

        let mut headers = HashMap::new();
        headers.insert("X-Amz-Target".to_string(), target_header);
        headers.insert(
            "Content-Type".to_string(),
            "application/x-amz-json-1.1".to_string(),
        );

        self.signed_request(&service, "POST", &url, body, Some(headers))
            .await
    }

    /// Make a signed request
    async fn signed_request(
        &self,
        service: &ServiceDefinition,
        method: &str,
        url: &str,
        body: &str,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Result<String, RequestError> {
        let region = self.effective_region(service);

        let parsed_url = url::Url::parse(url).map_err(|e| anyhow!("Invalid URL {}: {}", url, e))?;
        let host = match (parsed_url.host_str(), parsed_url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(anyhow!("Invalid URL: {}", url).into()),
        };
        let path_and_query = if let Some(query) = parsed_url.query() {
            format!("{}?{}", parsed_url.path(), query)
        } else {
            parsed_url.path().to_string()
        };

        let mut headers = vec![("host".to_string(), host)];
        if let Some(extra) = &extra_headers {
            for (k, v) in extra {
                headers.push((k.to_lowercase(), v.clone()));
            }
        }

        let creds = aws_credential_types::Credentials::new(
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            self.credentials.session_token.clone(),
            None,
            "org-custom-resources",
        );
        let identity: Identity = creds.into();

        let signing_params = SigningParams::builder()
            .identity(&identity)
            .region(region)
            .name(service.signing_name)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| anyhow!("Failed to build signing params: {}", e))?
            .into();

        let signable_body = if body.is_empty() {
            SignableBody::Bytes(&[])
        } else {
            SignableBody::Bytes(body.as_bytes())
        };

        let signable_request = SignableRequest::new(
            method,
            &path_and_query,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            signable_body,
        )
        .map_err(|e| anyhow!("Failed to build signable request: {}", e))?;

        let (signing_instructions, _signature) = sign(signable_request, &signing_params)
            .map_err(|e| anyhow!("Failed to sign request: {}", e))?
            .into_parts();

        let mut request = match method {
            "GET" => self.http_client.get(url),
            "POST" => self.http_client.post(url),
            "PUT" => self.http_client.put(url),
            "DELETE" => self.http_client.delete(url),
            _ => return Err(anyhow!("Unsupported HTTP method: {}", method).into()),
        };

        for (name, value) in signing_instructions.headers() {
            request = request.header(name.to_string(), value.to_string());
        }

        if let Some(extra) = extra_headers {
            for (k, v) in extra {
                request = request.header(&k, &v);
            }
        }

        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        trace!("Sending {} request to {} (region: {})", method, url, region);
        let response = request.send().await?;
        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        debug!("Response status: {}", status);
        trace!(
            "Response body (first 2000 chars): {}",
            text.chars().take(2000).collect::<String>()
        );

        if !status.is_success() {
            warn!(
                "AWS request failed: status={}, body={}",
                status,
                text.chars().take(500).collect::<String>()
            );
            return Err(RequestError::Status {
                status: status.as_u16(),
                error_type,
                body: text,
            });
        }

        Ok(text)
    }
}

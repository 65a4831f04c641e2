//! AWS Credentials loading
//!
//! Supports:
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN),
//!   which is how the Lambda execution role is exposed
//! - IAM Role assumption via STS AssumeRole on top of those credentials

use anyhow::{anyhow, Result};
use std::env;
use std::fmt;
use tracing::debug;

use super::http::AwsHttpClient;

/// AWS credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Load credentials from environment variables
pub fn load_from_env() -> Result<Credentials> {
    let access_key_id =
        env::var("AWS_ACCESS_KEY_ID").map_err(|_| anyhow!("AWS_ACCESS_KEY_ID not set"))?;
    let secret_access_key =
        env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY not set"))?;
    let session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());

    Ok(Credentials {
        access_key_id,
        secret_access_key,
        session_token,
    })
}

/// Parameters for STS AssumeRole
#[derive(Debug, Clone)]
pub struct AssumeRoleConfig {
    pub role_arn: String,
    pub role_session_name: String,
    pub duration_seconds: u32,
}

/// Call STS AssumeRole with the client's current credentials
pub async fn assume_role(http: &AwsHttpClient, config: &AssumeRoleConfig) -> Result<Credentials> {
    debug!("Calling STS AssumeRole: {}", config.role_arn);

    let duration_str = config.duration_seconds.to_string();
    let params = [
        ("RoleArn", config.role_arn.as_str()),
        ("RoleSessionName", config.role_session_name.as_str()),
        ("DurationSeconds", duration_str.as_str()),
    ];

    let text = match http.query_request("sts", "AssumeRole", &params).await {
        Ok(text) => text,
        Err(super::http::RequestError::Status { status, body, .. }) => {
            let error_msg = parse_sts_error(&body).unwrap_or(body);
            return Err(anyhow!("STS AssumeRole failed ({}): {}", status, error_msg));
        }
        Err(e) => return Err(anyhow!("STS AssumeRole failed: {}", e)),
    };

    parse_assume_role_response(&text)
}

/// Extract the text of the first `<tag>...</tag>` element
fn extract_value(xml: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);
    let start = xml.find(&start_tag)? + start_tag.len();
    let end = xml[start..].find(&end_tag)? + start;
    Some(xml[start..end].trim().to_string())
}

/// Parse STS error response
fn parse_sts_error(xml: &str) -> Option<String> {
    // Format: <Error><Code>...</Code><Message>...</Message></Error>
    let code = extract_value(xml, "Code")?;
    let message = extract_value(xml, "Message")?;
    Some(format!("{}: {}", code, message))
}

/// Parse AssumeRole XML response
fn parse_assume_role_response(xml: &str) -> Result<Credentials> {
    let access_key_id = extract_value(xml, "AccessKeyId")
        .ok_or_else(|| anyhow!("AccessKeyId not found in AssumeRole response"))?;
    let secret_access_key = extract_value(xml, "SecretAccessKey")
        .ok_or_else(|| anyhow!("SecretAccessKey not found in AssumeRole response"))?;
    let session_token = extract_value(xml, "SessionToken")
        .ok_or_else(|| anyhow!("SessionToken not found in AssumeRole response"))?;

    Ok(Credentials {
        access_key_id,
        secret_access_key,
        session_token: Some(session_token),
    })
}

//! Runtime configuration
//!
//! Every setting is a flag with an environment-variable fallback, so the
//! Lambda function is configured through its environment and local runs
//! through flags.

use crate::aws::client::SessionSettings;
use crate::aws::credentials::AssumeRoleConfig;
use crate::aws::retry::RetryPolicy;
use crate::logging::LogFormat;
use anyhow::{bail, Result};
use clap::Args;
use std::time::Duration;
use tracing::warn;

/// Lifetime of provisioning-role sessions (the STS minimum)
const ROLE_SESSION_SECONDS: u32 = 900;

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Region the function runs in; selects the Organizations partition.
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom Organizations endpoint (LocalStack, tests).
    #[arg(long, env = "ORGANIZATIONS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Role to assume before calling Organizations.
    #[arg(long, env = "PROVISIONING_ROLE_ARN")]
    pub provisioning_role_arn: Option<String>,

    /// Session name used when assuming the provisioning role.
    #[arg(long, env = "ROLE_SESSION_NAME", default_value = "org-custom-resources")]
    pub role_session_name: String,

    /// Attempts per API call, including the first.
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 8)]
    pub retry_max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single backoff, in milliseconds.
    #[arg(long, env = "RETRY_MAX_DELAY_MS", default_value_t = 20_000)]
    pub retry_max_delay_ms: u64,

    /// Timeout of a single HTTP request, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Wall-clock ceiling for one invocation, in seconds.
    #[arg(long, env = "INVOCATION_TIMEOUT_SECS", default_value_t = 300)]
    pub invocation_timeout_secs: u64,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone().filter(|u| !u.is_empty()),
            assume_role: self
                .provisioning_role_arn
                .clone()
                .filter(|arn| !arn.is_empty())
                .map(|role_arn| AssumeRoleConfig {
                    role_arn,
                    role_session_name: self.role_session_name.clone(),
                    duration_seconds: ROLE_SESSION_SECONDS,
                }),
        }
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry_max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            bail!(
                "RETRY_BASE_DELAY_MS ({}) must not exceed RETRY_MAX_DELAY_MS ({})",
                self.retry_base_delay_ms,
                self.retry_max_delay_ms
            );
        }
        if self.invocation_timeout_secs == 0 {
            bail!("INVOCATION_TIMEOUT_SECS must be greater than 0");
        }

        let budget = self.retry_policy().worst_case_backoff();
        if budget >= self.invocation_timeout() {
            warn!(
                "Worst-case retry backoff of one call ({:?}) exceeds the invocation ceiling ({:?})",
                budget,
                self.invocation_timeout()
            );
        }
        Ok(())
    }
}

//! AWS Client - per-invocation session
//!
//! Credentials are resolved on every invocation (optionally through a
//! provisioning role) while the reqwest connection pool may be reused.

use anyhow::{Context, Result};
use tracing::info;

use super::credentials::{assume_role, load_from_env, AssumeRoleConfig, Credentials};
use super::http::AwsHttpClient;

/// Settings needed to build an [`AwsClients`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub assume_role: Option<AssumeRoleConfig>,
}

/// Container for AWS HTTP client
pub struct AwsClients {
    pub http: AwsHttpClient,
}

impl AwsClients {
    /// Build clients from the execution identity found in the environment
    pub async fn connect(pool: reqwest::Client, settings: &SessionSettings) -> Result<Self> {
        let credentials = load_from_env().context("No execution credentials available")?;
        Self::connect_with(pool, settings, credentials).await
    }

    /// Build clients from explicit base credentials
    pub async fn connect_with(
        pool: reqwest::Client,
        settings: &SessionSettings,
        credentials: Credentials,
    ) -> Result<Self> {
        // STS is regional and never goes to the Organizations endpoint override
        let mut http = AwsHttpClient::with_client(pool, credentials, &settings.region, None);

        if let Some(role) = &settings.assume_role {
            let assumed = assume_role(&http, role)
                .await
                .with_context(|| format!("Failed to assume provisioning role {}", role.role_arn))?;
            info!("Assumed provisioning role {}", role.role_arn);
            http.set_credentials(assumed);
        }

        http.set_endpoint_url(settings.endpoint_url.clone());

        Ok(Self { http })
    }
}

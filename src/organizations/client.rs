//! Organizations JSON 1.1 client
//!
//! - Request: POST with `X-Amz-Target: AWSOrganizationsV20161128.<Action>`, JSON body
//! - Response: JSON; faults decoded into [`ApiError`]
//!
//! Every call goes through the [`RetryPolicy`]. Create calls whose first
//! attempt was lost in transit may have succeeded server-side; when the
//! retry then reports a duplicate, the existing entity is adopted.

use super::error::{ApiError, TRANSPORT_ERROR_CODE};
use super::model::{
    CreatePolicyInput, OrganizationalUnit, Policy, UpdatePolicyInput,
};
use super::paginator::Listing;
use super::protocol::{ListOperation, Page};
use super::OrganizationsApi;
use crate::aws::client::AwsClients;
use crate::aws::http::AwsHttpClient;
use crate::aws::retry::RetryPolicy;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const SERVICE: &str = "organizations";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyEnvelope {
    policy: Policy,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrganizationalUnitEnvelope {
    organizational_unit: OrganizationalUnit,
}

#[derive(Clone)]
pub struct OrganizationsClient {
    http: AwsHttpClient,
    retry: RetryPolicy,
}

impl OrganizationsClient {
    pub fn new(http: AwsHttpClient, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    pub fn from_clients(clients: &AwsClients, retry: RetryPolicy) -> Self {
        Self::new(clients.http.clone(), retry)
    }

    /// One signed call, no retries
    async fn send(&self, action: &str, body: &Value) -> Result<String, ApiError> {
        let payload = body.to_string();
        let response = self.http.json_request(SERVICE, action, &payload).await?;
        Ok(response)
    }

    /// Call `action` with retries and return the raw response body
    async fn call(&self, action: &str, body: Value) -> Result<String, ApiError> {
        self.retry.run(action, || self.send(action, &body)).await
    }

    /// Call `action` with retries and decode the response
    async fn call_decoded<T: DeserializeOwned>(
        &self,
        action: &str,
        body: Value,
    ) -> Result<T, ApiError> {
        let response = self.call(action, body).await?;
        decode(action, &response)
    }

    /// Like [`Self::call`], also reporting whether any attempt failed in transit
    async fn call_tracked(&self, action: &str, body: Value) -> (Result<String, ApiError>, bool) {
        let interrupted = AtomicBool::new(false);
        let (body, flag) = (&body, &interrupted);
        let result = self
            .retry
            .run(action, move || async move {
                let result = self.send(action, body).await;
                if matches!(&result, Err(err) if err.code == TRANSPORT_ERROR_CODE) {
                    flag.store(true, Ordering::Relaxed);
                }
                result
            })
            .await;
        (result, interrupted.load(Ordering::Relaxed))
    }

    async fn find_policy(&self, name: &str, policy_type: &str) -> Result<Option<Policy>, ApiError> {
        let policies = Listing::new(
            self,
            ListOperation::Policies {
                filter: policy_type.to_string(),
            },
        )
        .collect_all()
        .await?;
        match policies.into_iter().find(|p| p.name.as_deref() == Some(name)) {
            Some(entity) => Ok(Some(self.describe_policy(&entity.id).await?)),
            None => Ok(None),
        }
    }

    async fn find_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<OrganizationalUnit>, ApiError> {
        let units = Listing::new(
            self,
            ListOperation::OrganizationalUnitsForParent {
                parent_id: parent_id.to_string(),
            },
        )
        .collect_all()
        .await?;
        match units.into_iter().find(|u| u.name.as_deref() == Some(name)) {
            Some(entity) => Ok(Some(self.describe_organizational_unit(&entity.id).await?)),
            None => Ok(None),
        }
    }
}

fn decode<T: DeserializeOwned>(action: &str, response: &str) -> Result<T, ApiError> {
    let response = if response.trim().is_empty() {
        "{}"
    } else {
        response
    };
    serde_json::from_str(response).map_err(|e| ApiError::malformed_response(action, e))
}

#[async_trait]
impl OrganizationsApi for OrganizationsClient {
    async fn create_policy(&self, input: &CreatePolicyInput) -> Result<Policy, ApiError> {
        let action = "CreatePolicy";
        let (result, interrupted) = self
            .call_tracked(
                action,
                json!({
                    "Name": input.name,
                    "Description": input.description,
                    "Type": input.policy_type,
                    "Content": input.content,
                }),
            )
            .await;

        let policy = match result {
            Ok(response) => decode::<PolicyEnvelope>(action, &response)?.policy,
            Err(err) if interrupted && err.is_already_exists() => {
                warn!(
                    "{} for {} was interrupted and the policy now exists, adopting it",
                    action, input.name
                );
                self.find_policy(&input.name, &input.policy_type)
                    .await?
                    .ok_or(err)?
            }
            Err(err) => return Err(err),
        };
        info!("Created policy {} ({})", policy.policy_summary.id, input.name);
        Ok(policy)
    }

    async fn update_policy(&self, input: &UpdatePolicyInput) -> Result<Policy, ApiError> {
        let envelope: PolicyEnvelope = self
            .call_decoded(
                "UpdatePolicy",
                json!({
                    "PolicyId": input.policy_id,
                    "Name": input.name,
                    "Description": input.description,
                    "Content": input.content,
                }),
            )
            .await?;
        info!("Updated policy {}", input.policy_id);
        Ok(envelope.policy)
    }

    async fn describe_policy(&self, policy_id: &str) -> Result<Policy, ApiError> {
        let envelope: PolicyEnvelope = self
            .call_decoded("DescribePolicy", json!({ "PolicyId": policy_id }))
            .await?;
        Ok(envelope.policy)
    }

    async fn delete_policy(&self, policy_id: &str) -> Result<(), ApiError> {
        self.call("DeletePolicy", json!({ "PolicyId": policy_id }))
            .await?;
        info!("Deleted policy {}", policy_id);
        Ok(())
    }

    async fn attach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError> {
        self.call(
            "AttachPolicy",
            json!({ "PolicyId": policy_id, "TargetId": target_id }),
        )
        .await?;
        info!("Attached policy {} to {}", policy_id, target_id);
        Ok(())
    }

    async fn detach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError> {
        self.call(
            "DetachPolicy",
            json!({ "PolicyId": policy_id, "TargetId": target_id }),
        )
        .await?;
        info!("Detached policy {} from {}", policy_id, target_id);
        Ok(())
    }

    async fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let action = "CreateOrganizationalUnit";
        let (result, interrupted) = self
            .call_tracked(action, json!({ "ParentId": parent_id, "Name": name }))
            .await;

        let unit = match result {
            Ok(response) => decode::<OrganizationalUnitEnvelope>(action, &response)?.organizational_unit,
            Err(err) if interrupted && err.is_already_exists() => {
                warn!(
                    "{} for {} was interrupted and the unit now exists, adopting it",
                    action, name
                );
                self.find_organizational_unit(parent_id, name)
                    .await?
                    .ok_or(err)?
            }
            Err(err) => return Err(err),
        };
        info!("Created organizational unit {} under {}", unit.id, parent_id);
        Ok(unit)
    }

    async fn update_organizational_unit(
        &self,
        ou_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let envelope: OrganizationalUnitEnvelope = self
            .call_decoded(
                "UpdateOrganizationalUnit",
                json!({ "OrganizationalUnitId": ou_id, "Name": name }),
            )
            .await?;
        info!("Renamed organizational unit {} to {}", ou_id, name);
        Ok(envelope.organizational_unit)
    }

    async fn describe_organizational_unit(
        &self,
        ou_id: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let envelope: OrganizationalUnitEnvelope = self
            .call_decoded(
                "DescribeOrganizationalUnit",
                json!({ "OrganizationalUnitId": ou_id }),
            )
            .await?;
        Ok(envelope.organizational_unit)
    }

    async fn delete_organizational_unit(&self, ou_id: &str) -> Result<(), ApiError> {
        self.call(
            "DeleteOrganizationalUnit",
            json!({ "OrganizationalUnitId": ou_id }),
        )
        .await?;
        info!("Deleted organizational unit {}", ou_id);
        Ok(())
    }

    async fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ApiError> {
        self.call(
            "MoveAccount",
            json!({
                "AccountId": account_id,
                "SourceParentId": source_parent_id,
                "DestinationParentId": destination_parent_id,
            }),
        )
        .await?;
        info!(
            "Moved account {} from {} to {}",
            account_id, source_parent_id, destination_parent_id
        );
        Ok(())
    }

    async fn list_page(
        &self,
        operation: &ListOperation,
        next_token: Option<&str>,
    ) -> Result<Page, ApiError> {
        let config = operation.config();
        debug!("{} page, token present: {}", config.action, next_token.is_some());
        let response = self
            .call(config.action, config.request_body(next_token))
            .await?;
        config.parse_page(&response)
    }
}

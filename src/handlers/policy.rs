//! Policy handler
//!
//! - Create: create the policy; its id becomes the physical id
//! - Update: update in place, or create a new policy when `Type` changes
//! - Delete: detach from every target, then delete; absent counts as deleted

use super::nodes::{deletable_id, is_policy_id};
use super::{Outcome, ResourceHandler};
use crate::error::HandlerError;
use crate::event::{LifecycleEvent, Properties};
use crate::organizations::model::{POLICY_TYPES, SERVICE_CONTROL_POLICY};
use crate::organizations::{
    CreatePolicyInput, ListOperation, Listing, OrganizationsApi, Policy, UpdatePolicyInput,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

pub const DEFAULT_DESCRIPTION: &str = "Managed by CloudFormation";

/// Policy types whose documents follow the IAM policy grammar
const IAM_GRAMMAR_TYPES: &[&str] = &["SERVICE_CONTROL_POLICY", "RESOURCE_CONTROL_POLICY"];

/// Policy properties after validation
#[derive(Debug, Clone, PartialEq)]
struct PolicySpec {
    name: String,
    description: String,
    policy_type: String,
    content: String,
}

impl PolicySpec {
    fn from_properties(props: &Properties) -> Result<Self, HandlerError> {
        let name = props.required_str("PolicyName")?;
        let description = props
            .optional_str("PolicyDescription")?
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let policy_type = policy_type(props)?;
        let document = props
            .get("PolicyDocument")
            .ok_or_else(|| HandlerError::validation("Missing required property 'PolicyDocument'"))?;
        let content = normalize_document(document, &policy_type)?;

        Ok(Self {
            name,
            description,
            policy_type,
            content,
        })
    }
}

fn policy_type(props: &Properties) -> Result<String, HandlerError> {
    let policy_type = props
        .optional_str("Type")?
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| SERVICE_CONTROL_POLICY.to_string());
    if POLICY_TYPES.contains(&policy_type.as_str()) {
        Ok(policy_type)
    } else {
        Err(HandlerError::validation(format!(
            "Unsupported policy type '{}'. Supported types: {}",
            policy_type,
            POLICY_TYPES.join(", ")
        )))
    }
}

/// Validate a policy document (object or JSON string) and render it compactly
pub fn normalize_document(document: &Value, policy_type: &str) -> Result<String, HandlerError> {
    let parsed = match document {
        Value::String(text) => serde_json::from_str::<Value>(text).map_err(|e| {
            HandlerError::validation(format!("Invalid JSON in policy document: {}", e))
        })?,
        other => other.clone(),
    };

    let object = parsed
        .as_object()
        .ok_or_else(|| HandlerError::validation("Policy document must be a JSON object"))?;

    if IAM_GRAMMAR_TYPES.contains(&policy_type) {
        if !object.contains_key("Version") {
            return Err(HandlerError::validation(
                "Policy document missing required 'Version' field",
            ));
        }
        let statements = object
            .get("Statement")
            .ok_or_else(|| {
                HandlerError::validation("Policy document missing required 'Statement' field")
            })?
            .as_array()
            .ok_or_else(|| HandlerError::validation("Policy 'Statement' must be an array"))?;
        if statements.is_empty() {
            return Err(HandlerError::validation(
                "Policy must contain at least one statement",
            ));
        }
        for (i, statement) in statements.iter().enumerate() {
            let statement = statement
                .as_object()
                .ok_or_else(|| HandlerError::validation(format!("Statement {} must be an object", i)))?;
            match statement.get("Effect").and_then(Value::as_str) {
                Some("Allow") | Some("Deny") => {}
                Some(_) => {
                    return Err(HandlerError::validation(format!(
                        "Statement {} Effect must be 'Allow' or 'Deny'",
                        i
                    )))
                }
                None => {
                    return Err(HandlerError::validation(format!(
                        "Statement {} missing required 'Effect' field",
                        i
                    )))
                }
            }
        }
    }

    serde_json::to_string(&parsed)
        .map_err(|e| HandlerError::Unknown(format!("Failed to serialize policy document: {}", e)))
}

fn outcome(policy: &Policy) -> Outcome {
    let summary = &policy.policy_summary;
    Outcome::new(summary.id.clone())
        .with("Id", summary.id.clone())
        .with("Arn", summary.arn.clone())
        .with("Name", summary.name.clone())
        .with("Type", summary.policy_type.clone())
}

async fn create(api: &dyn OrganizationsApi, spec: &PolicySpec) -> Result<Outcome, HandlerError> {
    let policy = api
        .create_policy(&CreatePolicyInput {
            name: spec.name.clone(),
            description: spec.description.clone(),
            policy_type: spec.policy_type.clone(),
            content: spec.content.clone(),
        })
        .await?;
    Ok(outcome(&policy))
}

pub struct PolicyHandler;

#[async_trait]
impl ResourceHandler for PolicyHandler {
    async fn create(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let spec = PolicySpec::from_properties(&event.properties)?;
        create(api, &spec).await
    }

    async fn update(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let policy_id = event.physical_id();
        if !is_policy_id(policy_id) {
            return Err(HandlerError::validation(format!(
                "Invalid policy ID format: {}",
                policy_id
            )));
        }

        let spec = PolicySpec::from_properties(&event.properties)?;
        let old_type = policy_type(event.old_properties())?;

        if old_type != spec.policy_type {
            // The type of an existing policy cannot change; a new id tells
            // the orchestrator to delete the old one afterwards
            info!(
                "Policy type changed from {} to {}, replacing {}",
                old_type, spec.policy_type, policy_id
            );
            return create(api, &spec).await;
        }

        let policy = api
            .update_policy(&UpdatePolicyInput {
                policy_id: policy_id.to_string(),
                name: spec.name.clone(),
                description: spec.description.clone(),
                content: spec.content.clone(),
            })
            .await?;
        Ok(outcome(&policy))
    }

    async fn delete(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let physical_id = event.physical_id();
        let policy_id = match deletable_id(physical_id) {
            Some(id) if is_policy_id(id) => id,
            _ => {
                info!("Skipping delete of never-created policy '{}'", physical_id);
                return Ok(Outcome::new(physical_id));
            }
        };

        let targets = match Listing::new(
            api,
            ListOperation::TargetsForPolicy {
                policy_id: policy_id.to_string(),
            },
        )
        .collect_all()
        .await
        {
            Ok(targets) => targets,
            Err(err) if err.is_not_found() => {
                info!("Policy {} already deleted", policy_id);
                return Ok(Outcome::new(physical_id));
            }
            Err(err) => return Err(err.into()),
        };

        for target in &targets {
            match api.detach_policy(policy_id, &target.id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!("Policy {} was already detached from {}", policy_id, target.id);
                }
                Err(err) => return Err(err.into()),
            }
        }

        match api.delete_policy(policy_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                info!("Policy {} already deleted", policy_id);
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Outcome::new(physical_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handlers::test_support::event;
    use crate::organizations::memory::InMemoryOrganizations;
    use serde_json::json;

    const TYPE_NAME: &str = "Custom::ServiceControlPolicy";

    fn props(description: &str, policy_type: &str) -> Value {
        json!({
            "PolicyName": "DenyLeaveOrganization",
            "PolicyDescription": description,
            "Type": policy_type,
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Deny",
                    "Action": "organizations:LeaveOrganization",
                    "Resource": "*"
                }]
            }
        })
    }

    async fn create_policy(org: &InMemoryOrganizations) -> String {
        let created = PolicyHandler
            .create(
                org,
                &event("Create", TYPE_NAME, None, props("first", "SERVICE_CONTROL_POLICY"), None),
            )
            .await
            .unwrap();
        created.physical_resource_id
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let org = InMemoryOrganizations::new();
        let id = create_policy(&org).await;
        let stored = org.policy(&id).unwrap();
        assert_eq!(stored.policy_summary.description, "first");
        assert!(!stored.content.contains('\n'));

        let deleted = PolicyHandler
            .delete(&org, &event("Delete", TYPE_NAME, Some(&id), props("first", "SERVICE_CONTROL_POLICY"), None))
            .await
            .unwrap();
        assert_eq!(deleted.physical_resource_id, id);

        let err = org.describe_policy(&id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_reports_attributes() {
        let org = InMemoryOrganizations::new();
        let outcome = PolicyHandler
            .create(&org, &event("Create", TYPE_NAME, None, props("d", "SERVICE_CONTROL_POLICY"), None))
            .await
            .unwrap();
        assert_eq!(outcome.data["Id"], json!(outcome.physical_resource_id));
        assert!(outcome.data["Arn"].as_str().unwrap().starts_with("arn:aws:organizations::"));
        assert_eq!(outcome.data["Type"], json!("SERVICE_CONTROL_POLICY"));
    }

    #[tokio::test]
    async fn test_description_change_keeps_id() {
        let org = InMemoryOrganizations::new();
        let id = create_policy(&org).await;

        let updated = PolicyHandler
            .update(
                &org,
                &event(
                    "Update",
                    TYPE_NAME,
                    Some(&id),
                    props("second", "SERVICE_CONTROL_POLICY"),
                    Some(props("first", "SERVICE_CONTROL_POLICY")),
                ),
            )
            .await
            .unwrap();

        assert_eq!(updated.physical_resource_id, id);
        assert_eq!(org.policy(&id).unwrap().policy_summary.description, "second");
    }

    #[tokio::test]
    async fn test_type_change_replaces() {
        let org = InMemoryOrganizations::new();
        let id = create_policy(&org).await;

        let updated = PolicyHandler
            .update(
                &org,
                &event(
                    "Update",
                    TYPE_NAME,
                    Some(&id),
                    props("first", "RESOURCE_CONTROL_POLICY"),
                    Some(props("first", "SERVICE_CONTROL_POLICY")),
                ),
            )
            .await
            .unwrap();

        assert_ne!(updated.physical_resource_id, id);
        // the old policy is left for the orchestrator's follow-up delete
        assert!(org.policy(&id).is_some());
        assert_eq!(org.call_count("UpdatePolicy"), 0);
    }

    #[tokio::test]
    async fn test_delete_detaches_all_targets() {
        let org = InMemoryOrganizations::new();
        let id = create_policy(&org).await;
        let root = org.root_id();
        let ou = org.add_organizational_unit("Workloads", &root);
        org.add_account("123456789012", &ou);
        for target in [root.as_str(), ou.as_str(), "123456789012"] {
            org.attach_policy(&id, target).await.unwrap();
        }

        PolicyHandler
            .delete(&org, &event("Delete", TYPE_NAME, Some(&id), json!({}), None))
            .await
            .unwrap();

        assert_eq!(org.call_count("DetachPolicy"), 3);
        assert!(org.policy(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_policy_succeeds() {
        let org = InMemoryOrganizations::new();
        for id in ["p-0000ffff", "", "Failed/req-1", "not-a-policy"] {
            let outcome = PolicyHandler
                .delete(&org, &event("Delete", TYPE_NAME, Some(id), json!({}), None))
                .await
                .unwrap();
            assert_eq!(outcome.physical_resource_id, id);
        }
        assert_eq!(org.call_count("DeletePolicy"), 0);
    }

    #[tokio::test]
    async fn test_delete_surfaces_dependency_faults() {
        let org = InMemoryOrganizations::new();
        let id = create_policy(&org).await;
        org.fail_next(
            "DeletePolicy",
            crate::organizations::ApiError::from_code("PolicyInUseException", "still in use"),
        );

        let err = PolicyHandler
            .delete(&org, &event("Delete", TYPE_NAME, Some(&id), json!({}), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert!(err.to_string().starts_with("DependencyViolation: "));
    }

    #[test]
    fn test_document_validation() {
        let scp = SERVICE_CONTROL_POLICY;
        assert!(normalize_document(&json!("{not json"), scp).is_err());
        assert!(normalize_document(&json!([]), scp).is_err());
        assert!(normalize_document(&json!({"Statement": []}), scp).is_err());
        assert!(normalize_document(&json!({"Version": "2012-10-17", "Statement": []}), scp).is_err());
        let bad_effect = json!({"Version": "2012-10-17", "Statement": [{"Effect": "Maybe"}]});
        assert!(normalize_document(&bad_effect, scp)
            .unwrap_err()
            .to_string()
            .contains("Effect must be 'Allow' or 'Deny'"));

        let text = "{\n  \"Version\": \"2012-10-17\",\n  \"Statement\": [{\"Effect\": \"Allow\", \"Action\": \"*\", \"Resource\": \"*\"}]\n}";
        let compact = normalize_document(&json!(text), scp).unwrap();
        assert!(!compact.contains('\n'));

        // tag policies do not use the IAM grammar
        assert!(normalize_document(&json!({"tags": {}}), "TAG_POLICY").is_ok());
    }

    #[test]
    fn test_missing_properties_are_validation_errors() {
        let props = Properties::from(json!({"PolicyDocument": {}}));
        let err = PolicySpec::from_properties(&props).unwrap_err();
        assert_eq!(err.to_string(), "ValidationError: Missing required property 'PolicyName'");

        let props = Properties::from(json!({
            "PolicyName": "x",
            "Type": "NOT_A_TYPE",
            "PolicyDocument": {}
        }));
        assert!(PolicySpec::from_properties(&props).is_err());
    }
}

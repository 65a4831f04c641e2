//! Organizational unit handler
//!
//! - Create: create the OU under the resolved parent, then relocate `Children`
//! - Update: rename in place; a new parent means a new OU (replacement)
//! - Delete: refuse while the OU has children; absent counts as deleted
//!
//! Child relocation is best-effort. A failed move is logged and does not
//! fail the event.

use super::nodes::{
    deletable_id, is_account_id, is_ou_id, resolve_node_id, same_reference, NodeScope,
};
use super::{Outcome, ResourceHandler};
use crate::error::HandlerError;
use crate::event::{LifecycleEvent, Properties};
use crate::organizations::{
    ChildType, ListOperation, Listing, OrganizationalUnit, OrganizationsApi,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
struct UnitSpec {
    name: String,
    /// `root` or a literal parent id
    parent: String,
    children: Vec<String>,
}

impl UnitSpec {
    fn from_properties(props: &Properties) -> Result<Self, HandlerError> {
        let name = props.required_str("Name")?.trim().to_string();
        let parent = props.required_str("ParentId")?;
        let children = props.string_list("Children")?;
        if let Some(bad) = children.iter().find(|c| !is_account_id(c)) {
            return Err(HandlerError::validation(format!(
                "Invalid account ID in Children: {}",
                bad
            )));
        }
        Ok(Self {
            name,
            parent,
            children,
        })
    }
}

fn outcome(unit: &OrganizationalUnit, parent_id: &str) -> Outcome {
    Outcome::new(unit.id.clone())
        .with("Id", unit.id.clone())
        .with("Arn", unit.arn.clone())
        .with("Name", unit.name.clone())
        .with("ParentId", parent_id.to_string())
}

/// Move each account into `destination` unless it is already there
async fn relocate_children(api: &dyn OrganizationsApi, destination: &str, children: &[String]) {
    for account_id in children {
        let current = Listing::new(
            api,
            ListOperation::Parents {
                child_id: account_id.clone(),
            },
        )
        .first()
        .await;

        let source = match current {
            Ok(Some(parent)) if parent.id == destination => {
                debug!("Account {} already in {}", account_id, destination);
                continue;
            }
            Ok(Some(parent)) => parent.id,
            Ok(None) => {
                warn!("Account {} has no parent, not moving it", account_id);
                continue;
            }
            Err(err) => {
                warn!("Could not look up parent of account {}: {}", account_id, err);
                continue;
            }
        };

        if let Err(err) = api.move_account(account_id, &source, destination).await {
            warn!(
                "Failed to move account {} from {} to {}: {}",
                account_id, source, destination, err
            );
        }
    }
}

async fn create(api: &dyn OrganizationsApi, spec: &UnitSpec) -> Result<Outcome, HandlerError> {
    let parent_id = resolve_node_id(api, &spec.parent, NodeScope::Parent, "ParentId").await?;
    let unit = api
        .create_organizational_unit(&parent_id, &spec.name)
        .await?;
    relocate_children(api, &unit.id, &spec.children).await;
    Ok(outcome(&unit, &parent_id))
}

pub struct OrganizationalUnitHandler;

#[async_trait]
impl ResourceHandler for OrganizationalUnitHandler {
    async fn create(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let spec = UnitSpec::from_properties(&event.properties)?;
        create(api, &spec).await
    }

    async fn update(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let ou_id = event.physical_id();
        if !is_ou_id(ou_id) {
            return Err(HandlerError::validation(format!(
                "Invalid organizational unit ID format: {}",
                ou_id
            )));
        }

        let spec = UnitSpec::from_properties(&event.properties)?;
        let old_props = event.old_properties();
        let old_name = old_props.optional_str("Name")?.unwrap_or_default();
        let old_parent = old_props.optional_str("ParentId")?.unwrap_or_default();

        let parent_id = resolve_node_id(api, &spec.parent, NodeScope::Parent, "ParentId").await?;
        let parent_changed = if same_reference(&spec.parent, &old_parent) {
            false
        } else {
            match resolve_node_id(api, &old_parent, NodeScope::Parent, "ParentId").await {
                Ok(old_id) => old_id != parent_id,
                Err(err) => {
                    debug!("Previous ParentId '{}' unresolvable: {}", old_parent, err);
                    true
                }
            }
        };

        if parent_changed {
            // Organizations cannot move an OU; a new id makes the orchestrator
            // delete the old one once this update completes
            info!(
                "ParentId of {} changed to {}, replacing it",
                ou_id, parent_id
            );
            return create(api, &spec).await;
        }

        let unit = if spec.name != old_name.trim() {
            api.update_organizational_unit(ou_id, &spec.name).await?
        } else {
            api.describe_organizational_unit(ou_id).await?
        };
        relocate_children(api, &unit.id, &spec.children).await;
        Ok(outcome(&unit, &parent_id))
    }

    async fn delete(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let physical_id = event.physical_id();
        let ou_id = match deletable_id(physical_id) {
            Some(id) if is_ou_id(id) => id,
            _ => {
                info!(
                    "Skipping delete of never-created organizational unit '{}'",
                    physical_id
                );
                return Ok(Outcome::new(physical_id));
            }
        };

        for child_type in [ChildType::Account, ChildType::OrganizationalUnit] {
            let child = Listing::new(
                api,
                ListOperation::Children {
                    parent_id: ou_id.to_string(),
                    child_type,
                },
            )
            .first()
            .await;

            match child {
                Ok(None) => {}
                Ok(Some(child)) => {
                    return Err(HandlerError::DependencyViolation(format!(
                        "Organizational unit {} still contains {} {}; move or remove its children before deleting it",
                        ou_id,
                        child_type.as_str().to_lowercase().replace('_', " "),
                        child.id
                    )));
                }
                Err(err) if err.is_not_found() => {
                    info!("Organizational unit {} already deleted", ou_id);
                    return Ok(Outcome::new(physical_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        match api.delete_organizational_unit(ou_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                info!("Organizational unit {} already deleted", ou_id);
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Outcome::new(physical_id))
    }
}

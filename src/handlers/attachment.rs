//! Policy attachment handler
//!
//! Attachments have no provider id, so the physical id is the pair
//! `<PolicyId>|<TargetId>`.

use super::nodes::{deletable_id, is_policy_id, resolve_node_id, NodeScope};
use super::{Outcome, ResourceHandler};
use crate::error::HandlerError;
use crate::event::{LifecycleEvent, Properties};
use crate::organizations::OrganizationsApi;
use async_trait::async_trait;
use tracing::{info, warn};

pub const SEPARATOR: char = '|';

pub fn composite_id(policy_id: &str, target_id: &str) -> String {
    format!("{}{}{}", policy_id, SEPARATOR, target_id)
}

/// Split a composite id, if it has the expected shape
pub fn split_composite_id(id: &str) -> Option<(String, String)> {
    let (policy_id, target_id) = id.split_once(SEPARATOR)?;
    if is_policy_id(policy_id) && NodeScope::Target.accepts(target_id) {
        Some((policy_id.to_string(), target_id.to_string()))
    } else {
        None
    }
}

/// Resolved (policy, target) pair
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pair {
    policy_id: String,
    target_id: String,
}

impl Pair {
    async fn from_properties(
        api: &dyn OrganizationsApi,
        props: &Properties,
    ) -> Result<Self, HandlerError> {
        let policy_id = props.required_str("PolicyId")?.trim().to_string();
        if !is_policy_id(&policy_id) {
            return Err(HandlerError::validation(format!(
                "Invalid policy ID format: {}",
                policy_id
            )));
        }
        let target = props.required_str("TargetId")?;
        let target_id = resolve_node_id(api, &target, NodeScope::Target, "TargetId").await?;
        Ok(Self {
            policy_id,
            target_id,
        })
    }

    fn physical_id(&self) -> String {
        composite_id(&self.policy_id, &self.target_id)
    }

    fn outcome(&self) -> Outcome {
        Outcome::new(self.physical_id())
            .with("PolicyId", self.policy_id.clone())
            .with("TargetId", self.target_id.clone())
    }

    /// Attach; an existing attachment counts as success
    async fn attach(&self, api: &dyn OrganizationsApi) -> Result<(), HandlerError> {
        match api.attach_policy(&self.policy_id, &self.target_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_exists() => {
                info!(
                    "Policy {} already attached to {}",
                    self.policy_id, self.target_id
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Detach; a missing attachment, policy or target counts as success
    async fn detach(&self, api: &dyn OrganizationsApi) -> Result<(), HandlerError> {
        match api.detach_policy(&self.policy_id, &self.target_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                info!(
                    "Policy {} not attached to {}: {}",
                    self.policy_id, self.target_id, err
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub struct AttachmentHandler;

#[async_trait]
impl ResourceHandler for AttachmentHandler {
    async fn create(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let pair = Pair::from_properties(api, &event.properties).await?;
        pair.attach(api).await?;
        Ok(pair.outcome())
    }

    async fn update(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let new = Pair::from_properties(api, &event.properties).await?;

        let old = match split_composite_id(event.physical_id()) {
            Some((policy_id, target_id)) => Pair {
                policy_id,
                target_id,
            },
            None => Pair::from_properties(api, event.old_properties()).await?,
        };

        // The stored id may describe a pair a failed update already detached,
        // so an unchanged pair is re-attached rather than assumed present
        if old == new {
            new.attach(api).await?;
            return Ok(new.outcome());
        }

        info!(
            "Attachment changed from {} to {}",
            old.physical_id(),
            new.physical_id()
        );
        old.detach(api).await?;
        new.attach(api).await?;
        Ok(new.outcome())
    }

    async fn delete(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let physical_id = event.physical_id();
        let Some(id) = deletable_id(physical_id) else {
            info!("Skipping delete of never-created attachment '{}'", physical_id);
            return Ok(Outcome::new(physical_id));
        };

        let pair = match split_composite_id(id) {
            Some((policy_id, target_id)) => Pair {
                policy_id,
                target_id,
            },
            // ids written in another format carry no pair; use the properties
            None => match Pair::from_properties(api, &event.properties).await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(
                        "Cannot determine attachment for '{}', treating it as never created: {}",
                        physical_id, err
                    );
                    return Ok(Outcome::new(physical_id));
                }
            },
        };

        pair.detach(api).await?;
        Ok(Outcome::new(physical_id))
    }
}

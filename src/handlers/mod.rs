//! Resource handlers
//!
//! One handler per supported resource type, each implementing Create,
//! Update and Delete against [`OrganizationsApi`]. The registry maps
//! CloudFormation type names to a closed set of [`ResourceKind`]s.

pub mod attachment;
pub mod nodes;
pub mod organizational_unit;
pub mod policy;

use crate::error::HandlerError;
use crate::event::{LifecycleEvent, RequestType};
use crate::organizations::OrganizationsApi;
use async_trait::async_trait;
use attachment::AttachmentHandler;
use organizational_unit::OrganizationalUnitHandler;
use policy::PolicyHandler;
use serde_json::Value;
use std::collections::BTreeMap;

/// Successful handler result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// A value differing from the incoming id signals replacement on Update
    pub physical_resource_id: String,
    pub data: BTreeMap<String, Value>,
}

impl Outcome {
    pub fn new(physical_resource_id: impl Into<String>) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.data.insert(name.to_string(), value.into());
        self
    }
}

/// Trait for resource type handlers
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn create(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError>;

    async fn update(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError>;

    /// Must succeed when the resource is already gone
    async fn delete(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Policy,
    OrganizationalUnit,
    Attachment,
}

/// Registered CloudFormation resource type names
pub const REGISTRY: &[(&str, ResourceKind)] = &[
    ("Custom::ServiceControlPolicy", ResourceKind::Policy),
    ("Custom::Policy", ResourceKind::Policy),
    ("Custom::OrganizationalUnit", ResourceKind::OrganizationalUnit),
    ("Custom::ServiceControlPolicyAttachment", ResourceKind::Attachment),
    ("Custom::PolicyAttachment", ResourceKind::Attachment),
];

impl ResourceKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, kind)| *kind)
    }

    /// Look up a type name, failing with the list of supported names
    pub fn lookup(name: &str) -> Result<Self, HandlerError> {
        Self::from_type_name(name).ok_or_else(|| {
            let supported: Vec<&str> = REGISTRY.iter().map(|(n, _)| *n).collect();
            HandlerError::validation(format!(
                "Unsupported resource type '{}'. Supported types: {}",
                name,
                supported.join(", ")
            ))
        })
    }
}

/// Handler wrapper that dispatches to the kind-specific implementation
pub struct UnifiedResourceHandler {
    kind: ResourceKind,
}

impl UnifiedResourceHandler {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    fn inner(&self) -> &'static dyn ResourceHandler {
        match self.kind {
            ResourceKind::Policy => &PolicyHandler,
            ResourceKind::OrganizationalUnit => &OrganizationalUnitHandler,
            ResourceKind::Attachment => &AttachmentHandler,
        }
    }

    /// Run the operation named by the event's request type
    pub async fn handle(
        &self,
        api: &dyn OrganizationsApi,
        event: &LifecycleEvent,
    ) -> Result<Outcome, HandlerError> {
        let handler = self.inner();
        match event.request_type {
            RequestType::Create => handler.create(api, event).await,
            RequestType::Update => handler.update(api, event).await,
            RequestType::Delete => handler.delete(api, event).await,
        }
    }
}

/// Get the handler for the given resource kind
pub fn get_resource_handler(kind: ResourceKind) -> UnifiedResourceHandler {
    UnifiedResourceHandler::new(kind)
}

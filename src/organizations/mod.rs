//! AWS Organizations API wrapper
//!
//! Handlers talk to Organizations only through the [`OrganizationsApi`]
//! trait. The production implementation is [`OrganizationsClient`]; tests
//! use an in-memory organization.

pub mod client;
pub mod error;
pub mod model;
pub mod paginator;
pub mod protocol;

#[cfg(test)]
pub(crate) mod memory;

pub use client::OrganizationsClient;
pub use error::ApiError;
pub use model::{
    ChildType, CreatePolicyInput, OrgEntity, OrganizationalUnit, Policy, UpdatePolicyInput,
};
pub use paginator::Listing;
pub use protocol::{ListOperation, Page};

use async_trait::async_trait;

/// The organization-management operations the resource handlers need
///
/// Every call already includes throttling retries; errors carry their
/// [`crate::error::ErrorKind`].
#[async_trait]
pub trait OrganizationsApi: Send + Sync {
    async fn create_policy(&self, input: &CreatePolicyInput) -> Result<Policy, ApiError>;

    async fn update_policy(&self, input: &UpdatePolicyInput) -> Result<Policy, ApiError>;

    async fn describe_policy(&self, policy_id: &str) -> Result<Policy, ApiError>;

    async fn delete_policy(&self, policy_id: &str) -> Result<(), ApiError>;

    async fn attach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError>;

    async fn detach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError>;

    async fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError>;

    async fn update_organizational_unit(
        &self,
        ou_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError>;

    async fn describe_organizational_unit(
        &self,
        ou_id: &str,
    ) -> Result<OrganizationalUnit, ApiError>;

    async fn delete_organizational_unit(&self, ou_id: &str) -> Result<(), ApiError>;

    async fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ApiError>;

    /// Fetch a single page of a listing
    async fn list_page(
        &self,
        operation: &ListOperation,
        next_token: Option<&str>,
    ) -> Result<Page, ApiError>;
}

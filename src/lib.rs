//! CloudFormation custom resources for AWS Organizations
//!
//! Handles `Custom::ServiceControlPolicy`, `Custom::OrganizationalUnit` and
//! `Custom::ServiceControlPolicyAttachment` lifecycle events, one event per
//! invocation, and answers each with exactly one status document.
//!
//! The organization's default `FullAWSAccess` policy is not managed here;
//! detaching or restoring it remains a manual step.

pub mod aws;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod logging;
pub mod organizations;
pub mod response;
pub mod runtime;

pub use config::Config;
pub use dispatch::{ApiConnector, Dispatcher};
pub use error::{ErrorKind, HandlerError};

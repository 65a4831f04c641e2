//! Organizations entity shapes as returned by the API

use serde::{Deserialize, Serialize};

/// Policy types accepted by CreatePolicy
pub const POLICY_TYPES: &[&str] = &[
    "SERVICE_CONTROL_POLICY",
    "RESOURCE_CONTROL_POLICY",
    "DECLARATIVE_POLICY_EC2",
    "BACKUP_POLICY",
    "TAG_POLICY",
    "CHATBOT_POLICY",
    "AISERVICES_OPT_OUT_POLICY",
];

pub const SERVICE_CONTROL_POLICY: &str = "SERVICE_CONTROL_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicySummary {
    pub id: String,
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "Type", default)]
    pub policy_type: String,
    #[serde(default)]
    pub aws_managed: bool,
}

/// A policy together with its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    pub policy_summary: PolicySummary,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrganizationalUnit {
    pub id: String,
    pub arn: String,
    pub name: String,
}

/// One row of any listing (roots, targets, children, accounts, parents, policies)
///
/// Listings disagree on field names (`TargetId` vs `Id`) and on which fields
/// are present, so everything but the id is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrgEntity {
    #[serde(alias = "TargetId")]
    pub id: String,
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
}

impl OrgEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            arn: None,
            name: None,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildType {
    Account,
    OrganizationalUnit,
}

impl ChildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildType::Account => "ACCOUNT",
            ChildType::OrganizationalUnit => "ORGANIZATIONAL_UNIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePolicyInput {
    pub name: String,
    pub description: String,
    pub policy_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePolicyInput {
    pub policy_id: String,
    pub name: String,
    pub description: String,
    pub content: String,
}

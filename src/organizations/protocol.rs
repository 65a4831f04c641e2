//! Listing operations and page decoding
//!
//! Every paginated Organizations listing is described by a [`ListConfig`]
//! (action, where the items live, how the page token travels) so the client
//! and the paginator never hard-code per-listing details.

use super::error::ApiError;
use super::model::{ChildType, OrgEntity};
use serde_json::{json, Map, Value};

/// Page size requested from the service (the Organizations maximum for most listings)
pub const DEFAULT_MAX_RESULTS: u32 = 20;

/// Pagination configuration for a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Parameter name for the input token
    pub input_token: &'static str,
    /// JSON pointer of the output token in the response
    pub output_token: &'static str,
    /// Parameter name for max results
    pub max_results_param: &'static str,
    pub max_results: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            input_token: "NextToken",
            output_token: "/NextToken",
            max_results_param: "MaxResults",
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Wire description of one listing call
#[derive(Debug, Clone, PartialEq)]
pub struct ListConfig {
    /// Action name sent in X-Amz-Target
    pub action: &'static str,
    /// JSON pointer of the items array in the response
    pub response_root: &'static str,
    /// Fixed request parameters
    pub params: Map<String, Value>,
    pub pagination: PaginationConfig,
}

/// A paginated listing the handlers can ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOperation {
    Roots,
    TargetsForPolicy { policy_id: String },
    PoliciesForTarget { target_id: String, filter: String },
    Policies { filter: String },
    OrganizationalUnitsForParent { parent_id: String },
    Children { parent_id: String, child_type: ChildType },
    AccountsForParent { parent_id: String },
    Parents { child_id: String },
}

impl ListOperation {
    pub fn config(&self) -> ListConfig {
        let (action, response_root, params) = match self {
            ListOperation::Roots => ("ListRoots", "/Roots", json!({})),
            ListOperation::TargetsForPolicy { policy_id } => (
                "ListTargetsForPolicy",
                "/Targets",
                json!({ "PolicyId": policy_id }),
            ),
            ListOperation::PoliciesForTarget { target_id, filter } => (
                "ListPoliciesForTarget",
                "/Policies",
                json!({ "TargetId": target_id, "Filter": filter }),
            ),
            ListOperation::Policies { filter } => {
                ("ListPolicies", "/Policies", json!({ "Filter": filter }))
            }
            ListOperation::OrganizationalUnitsForParent { parent_id } => (
                "ListOrganizationalUnitsForParent",
                "/OrganizationalUnits",
                json!({ "ParentId": parent_id }),
            ),
            ListOperation::Children {
                parent_id,
                child_type,
            } => (
                "ListChildren",
                "/Children",
                json!({ "ParentId": parent_id, "ChildType": child_type.as_str() }),
            ),
            ListOperation::AccountsForParent { parent_id } => (
                "ListAccountsForParent",
                "/Accounts",
                json!({ "ParentId": parent_id }),
            ),
            ListOperation::Parents { child_id } => {
                ("ListParents", "/Parents", json!({ "ChildId": child_id }))
            }
        };

        ListConfig {
            action,
            response_root,
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            pagination: PaginationConfig::default(),
        }
    }
}

impl ListConfig {
    /// Build the JSON request body for one page
    pub fn request_body(&self, next_token: Option<&str>) -> Value {
        let mut body = self.params.clone();
        body.insert(
            self.pagination.max_results_param.to_string(),
            json!(self.pagination.max_results),
        );
        if let Some(token) = next_token {
            body.insert(self.pagination.input_token.to_string(), json!(token));
        }
        Value::Object(body)
    }

    /// Parse a raw response into items and the next page token
    pub fn parse_page(&self, response: &str) -> Result<Page, ApiError> {
        let json: Value = if response.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(response)
                .map_err(|e| ApiError::malformed_response(self.action, e))?
        };

        let items = match json.pointer(self.response_root) {
            Some(Value::Array(arr)) => arr
                .iter()
                .map(|item| serde_json::from_value::<OrgEntity>(item.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ApiError::malformed_response(self.action, e))?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ApiError::malformed_response(
                    self.action,
                    format!("{} is not an array: {}", self.response_root, other),
                ))
            }
        };

        let next_token = json
            .pointer(self.pagination.output_token)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Page { items, next_token })
    }
}

/// Result from one listing call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<OrgEntity>,
    /// Next page token if more results are available
    pub next_token: Option<String>,
}

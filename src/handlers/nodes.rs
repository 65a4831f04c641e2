//! Id grammars and resolution of organization nodes
//!
//! A parent or target may be given as the literal `root`, which resolves
//! to the first root returned by the roots listing. Organizations have a
//! single root in practice; with several, the first is used and a warning
//! is logged.

use crate::error::HandlerError;
use crate::organizations::{ApiError, ListOperation, Listing, OrganizationsApi};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static POLICY_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^p-[0-9a-zA-Z_]{8,128}$").expect("Invalid policy id regex"));
static OU_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ou-[0-9a-z]{4,32}-[a-z0-9]{8,32}$").expect("Invalid ou id regex")
});
static ROOT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^r-[0-9a-z]{4,32}$").expect("Invalid root id regex"));
static ACCOUNT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("Invalid account id regex"));

/// Prefix of the id reported for a Create that never produced a resource
pub const FAILED_PREFIX: &str = "Failed/";

pub fn is_policy_id(id: &str) -> bool {
    POLICY_ID_REGEX.is_match(id)
}

pub fn is_ou_id(id: &str) -> bool {
    OU_ID_REGEX.is_match(id)
}

pub fn is_root_id(id: &str) -> bool {
    ROOT_ID_REGEX.is_match(id)
}

pub fn is_account_id(id: &str) -> bool {
    ACCOUNT_ID_REGEX.is_match(id)
}

/// Where a node reference may point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScope {
    /// Root or OU (OU parents)
    Parent,
    /// Root, OU or account (policy targets)
    Target,
}

impl NodeScope {
    pub fn accepts(&self, id: &str) -> bool {
        match self {
            NodeScope::Parent => is_root_id(id) || is_ou_id(id),
            NodeScope::Target => is_root_id(id) || is_ou_id(id) || is_account_id(id),
        }
    }
}

/// An id the orchestrator holds for a resource that may exist
///
/// Empty ids and `Failed/...` ids come from a Create that never succeeded.
pub fn deletable_id(id: &str) -> Option<&str> {
    let id = id.trim();
    if id.is_empty() || id.starts_with(FAILED_PREFIX) {
        None
    } else {
        Some(id)
    }
}

/// Id of the organization root
pub async fn resolve_root(api: &dyn OrganizationsApi) -> Result<String, HandlerError> {
    let roots = Listing::new(api, ListOperation::Roots).collect_all().await?;
    if roots.len() > 1 {
        warn!(
            "Organization has {} roots, using the first one ({})",
            roots.len(),
            roots[0].id
        );
    }
    roots
        .into_iter()
        .next()
        .map(|root| root.id)
        .ok_or_else(|| {
            HandlerError::Api(ApiError::from_code(
                "RootNotFoundException",
                "No organization roots found",
            ))
        })
}

/// Resolve a parent or target reference (`root` or a literal id)
pub async fn resolve_node_id(
    api: &dyn OrganizationsApi,
    reference: &str,
    scope: NodeScope,
    property: &str,
) -> Result<String, HandlerError> {
    let reference = reference.trim();
    if reference.eq_ignore_ascii_case("root") {
        let root = resolve_root(api).await?;
        debug!("Resolved {} 'root' to {}", property, root);
        return Ok(root);
    }
    if scope.accepts(reference) {
        Ok(reference.to_string())
    } else {
        Err(HandlerError::validation(format!(
            "Invalid {} format: {}",
            property, reference
        )))
    }
}

/// Whether two references name the same node without calling the API
pub fn same_reference(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.eq_ignore_ascii_case("root") || b.eq_ignore_ascii_case("root") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

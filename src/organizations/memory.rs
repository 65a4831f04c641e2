//! In-memory organization used by the handler and dispatcher tests
//!
//! Enforces the provider rules the handlers depend on (duplicate
//! attachments, policies in use, non-empty OUs) and pages every listing two
//! items at a time so pagination is always exercised.

use super::error::ApiError;
use super::model::{
    ChildType, CreatePolicyInput, OrgEntity, OrganizationalUnit, Policy, PolicySummary,
    UpdatePolicyInput, POLICY_TYPES,
};
use super::protocol::{ListOperation, Page};
use super::OrganizationsApi;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const ORG_ID: &str = "o-exampleorgid";
const MASTER_ACCOUNT: &str = "111111111111";
const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct State {
    roots: Vec<String>,
    policies: BTreeMap<String, Policy>,
    attachments: Vec<(String, String)>,
    /// id -> (unit, parent id)
    units: BTreeMap<String, (OrganizationalUnit, String)>,
    /// (account id, parent id) in creation order
    accounts: Vec<(String, String)>,
    calls: Vec<String>,
    faults: HashMap<String, VecDeque<ApiError>>,
    counter: u32,
}

impl State {
    fn next_suffix(&mut self) -> String {
        self.counter += 1;
        format!("{:08x}", self.counter)
    }

    fn is_root(&self, id: &str) -> bool {
        self.roots.iter().any(|r| r == id)
    }

    fn is_parent(&self, id: &str) -> bool {
        self.is_root(id) || self.units.contains_key(id)
    }

    fn is_target(&self, id: &str) -> bool {
        self.is_parent(id) || self.accounts.iter().any(|(a, _)| a == id)
    }

    fn policy(&self, policy_id: &str) -> Result<&Policy, ApiError> {
        self.policies
            .get(policy_id)
            .ok_or_else(|| not_found("PolicyNotFoundException", policy_id))
    }

    fn unit(&self, ou_id: &str) -> Result<&(OrganizationalUnit, String), ApiError> {
        self.units
            .get(ou_id)
            .ok_or_else(|| not_found("OrganizationalUnitNotFoundException", ou_id))
    }

    fn entity_for_target(&self, id: &str) -> OrgEntity {
        let mut entity = OrgEntity::new(id);
        entity.kind = Some(
            if self.is_root(id) {
                "ROOT"
            } else if self.units.contains_key(id) {
                "ORGANIZATIONAL_UNIT"
            } else {
                "ACCOUNT"
            }
            .to_string(),
        );
        entity
    }

    fn list_all(&self, operation: &ListOperation) -> Result<Vec<OrgEntity>, ApiError> {
        let items = match operation {
            ListOperation::Roots => self
                .roots
                .iter()
                .map(|id| {
                    let mut entity = OrgEntity::new(id.clone());
                    entity.name = Some("Root".to_string());
                    entity.arn = Some(format!(
                        "arn:aws:organizations::{}:root/{}/{}",
                        MASTER_ACCOUNT, ORG_ID, id
                    ));
                    entity
                })
                .collect(),
            ListOperation::TargetsForPolicy { policy_id } => {
                self.policy(policy_id)?;
                self.attachments
                    .iter()
                    .filter(|(p, _)| p == policy_id)
                    .map(|(_, t)| self.entity_for_target(t))
                    .collect()
            }
            ListOperation::PoliciesForTarget { target_id, filter } => {
                if !self.is_target(target_id) {
                    return Err(not_found("TargetNotFoundException", target_id));
                }
                self.attachments
                    .iter()
                    .filter(|(_, t)| t == target_id)
                    .filter_map(|(p, _)| self.policies.get(p))
                    .filter(|p| &p.policy_summary.policy_type == filter)
                    .map(policy_entity)
                    .collect()
            }
            ListOperation::Policies { filter } => self
                .policies
                .values()
                .filter(|p| &p.policy_summary.policy_type == filter)
                .map(policy_entity)
                .collect(),
            ListOperation::OrganizationalUnitsForParent { parent_id } => {
                if !self.is_parent(parent_id) {
                    return Err(not_found("ParentNotFoundException", parent_id));
                }
                self.units
                    .iter()
                    .filter(|(_, (_, parent))| parent == parent_id)
                    .map(|(_, (unit, _))| OrgEntity {
                        id: unit.id.clone(),
                        arn: Some(unit.arn.clone()),
                        name: Some(unit.name.clone()),
                        kind: None,
                    })
                    .collect()
            }
            ListOperation::Children {
                parent_id,
                child_type,
            } => {
                if !self.is_parent(parent_id) {
                    return Err(not_found("ParentNotFoundException", parent_id));
                }
                match child_type {
                    ChildType::Account => self.accounts_under(parent_id),
                    ChildType::OrganizationalUnit => self
                        .units
                        .iter()
                        .filter(|(_, (_, parent))| parent == parent_id)
                        .map(|(id, _)| self.entity_for_target(id))
                        .collect(),
                }
            }
            ListOperation::AccountsForParent { parent_id } => {
                if !self.is_parent(parent_id) {
                    return Err(not_found("ParentNotFoundException", parent_id));
                }
                self.accounts_under(parent_id)
            }
            ListOperation::Parents { child_id } => {
                let parent = self
                    .accounts
                    .iter()
                    .find(|(a, _)| a == child_id)
                    .map(|(_, p)| p.clone())
                    .or_else(|| self.units.get(child_id).map(|(_, p)| p.clone()))
                    .ok_or_else(|| not_found("ChildNotFoundException", child_id))?;
                vec![self.entity_for_target(&parent)]
            }
        };
        Ok(items)
    }

    fn accounts_under(&self, parent_id: &str) -> Vec<OrgEntity> {
        self.accounts
            .iter()
            .filter(|(_, parent)| parent == parent_id)
            .map(|(id, _)| self.entity_for_target(id))
            .collect()
    }
}

fn policy_entity(policy: &Policy) -> OrgEntity {
    OrgEntity {
        id: policy.policy_summary.id.clone(),
        arn: Some(policy.policy_summary.arn.clone()),
        name: Some(policy.policy_summary.name.clone()),
        kind: Some(policy.policy_summary.policy_type.clone()),
    }
}

fn not_found(code: &str, id: &str) -> ApiError {
    ApiError::from_code(code, format!("{} does not exist", id))
}

pub struct InMemoryOrganizations {
    state: Mutex<State>,
}

impl InMemoryOrganizations {
    pub fn new() -> Self {
        let state = State {
            roots: vec!["r-ab12".to_string()],
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and pop an injected fault, if any
    fn enter(&self, action: &str) -> Result<MutexGuard<'_, State>, ApiError> {
        let mut state = self.lock();
        state.calls.push(action.to_string());
        if let Some(err) = state.faults.get_mut(action).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        Ok(state)
    }

    pub fn root_id(&self) -> String {
        self.lock().roots[0].clone()
    }

    pub fn add_root(&self, id: &str) {
        self.lock().roots.push(id.to_string());
    }

    pub fn add_account(&self, account_id: &str, parent_id: &str) {
        self.lock()
            .accounts
            .push((account_id.to_string(), parent_id.to_string()));
    }

    /// Create an OU directly, bypassing the call log
    pub fn add_organizational_unit(&self, name: &str, parent_id: &str) -> String {
        let mut state = self.lock();
        let id = format!("ou-ab12-{}", state.next_suffix());
        let unit = OrganizationalUnit {
            id: id.clone(),
            arn: format!("arn:aws:organizations::{}:ou/{}/{}", MASTER_ACCOUNT, ORG_ID, id),
            name: name.to_string(),
        };
        state.units.insert(id.clone(), (unit, parent_id.to_string()));
        id
    }

    /// Make the next call of `action` fail with `err`
    pub fn fail_next(&self, action: &str, err: ApiError) {
        self.lock()
            .faults
            .entry(action.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn call_count(&self, action: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == action).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn policy(&self, policy_id: &str) -> Option<Policy> {
        self.lock().policies.get(policy_id).cloned()
    }

    pub fn policy_count(&self) -> usize {
        self.lock().policies.len()
    }

    pub fn unit(&self, ou_id: &str) -> Option<(OrganizationalUnit, String)> {
        self.lock().units.get(ou_id).cloned()
    }

    pub fn is_attached(&self, policy_id: &str, target_id: &str) -> bool {
        self.lock()
            .attachments
            .iter()
            .any(|(p, t)| p == policy_id && t == target_id)
    }

    pub fn parent_of_account(&self, account_id: &str) -> Option<String> {
        self.lock()
            .accounts
            .iter()
            .find(|(a, _)| a == account_id)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl OrganizationsApi for InMemoryOrganizations {
    async fn create_policy(&self, input: &CreatePolicyInput) -> Result<Policy, ApiError> {
        let mut state = self.enter("CreatePolicy")?;
        if !POLICY_TYPES.contains(&input.policy_type.as_str()) {
            return Err(ApiError::from_code(
                "InvalidInputException",
                format!("unknown policy type {}", input.policy_type),
            ));
        }
        if serde_json::from_str::<serde_json::Value>(&input.content).is_err() {
            return Err(ApiError::from_code(
                "MalformedPolicyDocumentException",
                "policy content is not JSON",
            ));
        }
        if state.policies.values().any(|p| {
            p.policy_summary.name == input.name && p.policy_summary.policy_type == input.policy_type
        }) {
            return Err(ApiError::from_code(
                "DuplicatePolicyException",
                format!("policy {} already exists", input.name),
            ));
        }

        let id = format!("p-{}", state.next_suffix());
        let policy = Policy {
            policy_summary: PolicySummary {
                id: id.clone(),
                arn: format!(
                    "arn:aws:organizations::{}:policy/{}/{}/{}",
                    MASTER_ACCOUNT,
                    ORG_ID,
                    input.policy_type.to_lowercase(),
                    id
                ),
                name: input.name.clone(),
                description: input.description.clone(),
                policy_type: input.policy_type.clone(),
                aws_managed: false,
            },
            content: input.content.clone(),
        };
        state.policies.insert(id, policy.clone());
        Ok(policy)
    }

    async fn update_policy(&self, input: &UpdatePolicyInput) -> Result<Policy, ApiError> {
        let mut state = self.enter("UpdatePolicy")?;
        let policy = state
            .policies
            .get_mut(&input.policy_id)
            .ok_or_else(|| not_found("PolicyNotFoundException", &input.policy_id))?;
        policy.policy_summary.name = input.name.clone();
        policy.policy_summary.description = input.description.clone();
        policy.content = input.content.clone();
        Ok(policy.clone())
    }

    async fn describe_policy(&self, policy_id: &str) -> Result<Policy, ApiError> {
        let state = self.enter("DescribePolicy")?;
        state.policy(policy_id).cloned()
    }

    async fn delete_policy(&self, policy_id: &str) -> Result<(), ApiError> {
        let mut state = self.enter("DeletePolicy")?;
        state.policy(policy_id)?;
        if state.attachments.iter().any(|(p, _)| p == policy_id) {
            return Err(ApiError::from_code(
                "PolicyInUseException",
                format!("{} is still attached", policy_id),
            ));
        }
        state.policies.remove(policy_id);
        Ok(())
    }

    async fn attach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError> {
        let mut state = self.enter("AttachPolicy")?;
        state.policy(policy_id)?;
        if !state.is_target(target_id) {
            return Err(not_found("TargetNotFoundException", target_id));
        }
        if state
            .attachments
            .iter()
            .any(|(p, t)| p == policy_id && t == target_id)
        {
            return Err(ApiError::from_code(
                "DuplicatePolicyAttachmentException",
                format!("{} is already attached to {}", policy_id, target_id),
            ));
        }
        state
            .attachments
            .push((policy_id.to_string(), target_id.to_string()));
        Ok(())
    }

    async fn detach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ApiError> {
        let mut state = self.enter("DetachPolicy")?;
        state.policy(policy_id)?;
        if !state.is_target(target_id) {
            return Err(not_found("TargetNotFoundException", target_id));
        }
        let before = state.attachments.len();
        state
            .attachments
            .retain(|(p, t)| !(p == policy_id && t == target_id));
        if state.attachments.len() == before {
            return Err(ApiError::from_code(
                "PolicyNotAttachedException",
                format!("{} is not attached to {}", policy_id, target_id),
            ));
        }
        Ok(())
    }

    async fn create_organizational_unit(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let mut state = self.enter("CreateOrganizationalUnit")?;
        if !state.is_parent(parent_id) {
            return Err(not_found("ParentNotFoundException", parent_id));
        }
        if state
            .units
            .values()
            .any(|(unit, parent)| parent == parent_id && unit.name == name)
        {
            return Err(ApiError::from_code(
                "DuplicateOrganizationalUnitException",
                format!("{} already exists under {}", name, parent_id),
            ));
        }
        let id = format!("ou-ab12-{}", state.next_suffix());
        let unit = OrganizationalUnit {
            id: id.clone(),
            arn: format!("arn:aws:organizations::{}:ou/{}/{}", MASTER_ACCOUNT, ORG_ID, id),
            name: name.to_string(),
        };
        state
            .units
            .insert(id, (unit.clone(), parent_id.to_string()));
        Ok(unit)
    }

    async fn update_organizational_unit(
        &self,
        ou_id: &str,
        name: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let mut state = self.enter("UpdateOrganizationalUnit")?;
        let (unit, _) = state
            .units
            .get_mut(ou_id)
            .ok_or_else(|| not_found("OrganizationalUnitNotFoundException", ou_id))?;
        unit.name = name.to_string();
        Ok(unit.clone())
    }

    async fn describe_organizational_unit(
        &self,
        ou_id: &str,
    ) -> Result<OrganizationalUnit, ApiError> {
        let state = self.enter("DescribeOrganizationalUnit")?;
        state.unit(ou_id).map(|(unit, _)| unit.clone())
    }

    async fn delete_organizational_unit(&self, ou_id: &str) -> Result<(), ApiError> {
        let mut state = self.enter("DeleteOrganizationalUnit")?;
        state.unit(ou_id)?;
        let has_children = state.accounts.iter().any(|(_, p)| p == ou_id)
            || state.units.values().any(|(_, p)| p == ou_id);
        if has_children {
            return Err(ApiError::from_code(
                "OrganizationalUnitNotEmptyException",
                format!("{} still has children", ou_id),
            ));
        }
        state.units.remove(ou_id);
        state.attachments.retain(|(_, t)| t != ou_id);
        Ok(())
    }

    async fn move_account(
        &self,
        account_id: &str,
        source_parent_id: &str,
        destination_parent_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.enter("MoveAccount")?;
        if !state.is_parent(destination_parent_id) {
            return Err(not_found(
                "DestinationParentNotFoundException",
                destination_parent_id,
            ));
        }
        let entry = state
            .accounts
            .iter_mut()
            .find(|(a, _)| a == account_id)
            .ok_or_else(|| not_found("AccountNotFoundException", account_id))?;
        if entry.1 != source_parent_id {
            return Err(not_found("SourceParentNotFoundException", source_parent_id));
        }
        entry.1 = destination_parent_id.to_string();
        Ok(())
    }

    async fn list_page(
        &self,
        operation: &ListOperation,
        next_token: Option<&str>,
    ) -> Result<Page, ApiError> {
        let config = operation.config();
        let state = self.enter(config.action)?;
        let items = state.list_all(operation)?;

        let offset = match next_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ApiError::from_code("InvalidInputException", format!("bad token {}", token))
            })?,
            None => 0,
        };
        let end = (offset + PAGE_SIZE).min(items.len());
        let page_items = items.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_token = (end < items.len()).then(|| end.to_string());

        Ok(Page {
            items: page_items,
            next_token,
        })
    }
}

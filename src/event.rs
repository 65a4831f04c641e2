//! CloudFormation custom-resource lifecycle events
//!
//! The payload is first read leniently into a [`RawEvent`] so that even a
//! malformed event can still be answered, then validated into a
//! [`LifecycleEvent`].

use crate::error::HandlerError;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        }
    }
}

impl FromStr for RequestType {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Create" => Ok(RequestType::Create),
            "Update" => Ok(RequestType::Update),
            "Delete" => Ok(RequestType::Delete),
            other => Err(HandlerError::validation(format!(
                "Unsupported request type '{}'. Supported types: Create, Update, Delete",
                other
            ))),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The event exactly as delivered, every field optional
///
/// Scalars of the wrong type are rendered as strings and anything else is
/// treated as absent, so a mistyped field never prevents answering the event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub resource_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub physical_resource_id: Option<String>,
    pub resource_properties: Option<Value>,
    pub old_resource_properties: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub stack_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logical_resource_id: Option<String>,
    #[serde(rename = "ResponseURL", default, deserialize_with = "lenient_string")]
    pub response_url: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

impl RawEvent {
    /// Fields every response must echo, whatever state the rest of the event is in
    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            stack_id: self.stack_id.clone().unwrap_or_default(),
            request_id: self.request_id.clone().unwrap_or_default(),
            logical_resource_id: self.logical_resource_id.clone().unwrap_or_default(),
            response_url: self.response_url.clone().filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventIdentity {
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub response_url: Option<String>,
}

/// A validated lifecycle event
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    pub resource_type: String,
    pub physical_resource_id: Option<String>,
    pub properties: Properties,
    /// Present only on Update
    pub old_properties: Option<Properties>,
    pub identity: EventIdentity,
}

impl LifecycleEvent {
    pub fn from_raw(raw: &RawEvent) -> Result<Self, HandlerError> {
        let resource_type = raw
            .resource_type
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HandlerError::validation("Event missing required field 'ResourceType'"))?;

        let request_type: RequestType = raw
            .request_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HandlerError::validation("Event missing required field 'RequestType'"))?
            .parse()?;

        let properties = Properties::from_value("ResourceProperties", raw.resource_properties.as_ref())?;
        let old_properties = match request_type {
            RequestType::Update => Some(Properties::from_value(
                "OldResourceProperties",
                raw.old_resource_properties.as_ref(),
            )?),
            _ => None,
        };

        Ok(Self {
            request_type,
            resource_type,
            physical_resource_id: raw.physical_resource_id.clone(),
            properties,
            old_properties,
            identity: raw.identity(),
        })
    }

    /// The stored id, empty when the orchestrator has none
    pub fn physical_id(&self) -> &str {
        self.physical_resource_id.as_deref().unwrap_or("")
    }

    pub fn old_properties(&self) -> &Properties {
        self.old_properties.as_ref().unwrap_or(&self.properties)
    }
}

/// Resource properties with typed accessors
///
/// CloudFormation sends scalars as strings; numbers and booleans are
/// accepted and rendered as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Map<String, Value>);

impl Properties {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    fn from_value(field: &str, value: Option<&Value>) -> Result<Self, HandlerError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(map)) => Ok(Self(map.clone())),
            Some(_) => Err(HandlerError::validation(format!(
                "{} must be an object",
                field
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn optional_str(&self, name: &str) -> Result<Option<String>, HandlerError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(HandlerError::validation(format!(
                "Property '{}' must be a string",
                name
            ))),
        }
    }

    /// A present, non-blank string property
    pub fn required_str(&self, name: &str) -> Result<String, HandlerError> {
        self.optional_str(name)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| HandlerError::validation(format!("Missing required property '{}'", name)))
    }

    /// A list of strings; a single string counts as a one-element list
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, HandlerError> {
        let invalid = || HandlerError::validation(format!("Property '{}' must be a list of strings", name));
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    _ => Err(invalid()),
                })
                .collect(),
            Some(_) => Err(invalid()),
        }
    }
}

impl From<Value> for Properties {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

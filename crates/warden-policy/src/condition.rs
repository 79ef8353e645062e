//! Structural conditions and their strict JSON decoding.
//!
//! Conditions are a closed set of four shapes. Stored blobs are decoded
//! once at the repository boundary; anything that does not fit its schema
//! becomes a [`ConditionDecodeError`] and the owning policy never matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use warden_core::Attributes;

use crate::error::ConditionDecodeError;

/// The universal wildcard for resource types and actions.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionFacet {
    Subject,
    Resource,
    Action,
    Environment,
}

impl fmt::Display for ConditionFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionFacet::Subject => write!(f, "subject"),
            ConditionFacet::Resource => write!(f, "resource"),
            ConditionFacet::Action => write!(f, "action"),
            ConditionFacet::Environment => write!(f, "environment"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subject
// ---------------------------------------------------------------------------

/// Attribute name → expected value(s). Empty matches any subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectCondition(pub Attributes);

impl SubjectCondition {
    pub fn any() -> Self {
        Self::default()
    }
}

impl From<Attributes> for SubjectCondition {
    fn from(attrs: Attributes) -> Self {
        Self(attrs)
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// Resource type a condition applies to: a concrete type or `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceTypeSelector {
    Any,
    Exact(String),
}

impl TryFrom<String> for ResourceTypeSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == WILDCARD {
            Ok(ResourceTypeSelector::Any)
        } else if value.trim().is_empty() {
            Err("resource type must not be empty".to_string())
        } else {
            Ok(ResourceTypeSelector::Exact(value))
        }
    }
}

impl From<ResourceTypeSelector> for String {
    fn from(selector: ResourceTypeSelector) -> Self {
        match selector {
            ResourceTypeSelector::Any => WILDCARD.to_string(),
            ResourceTypeSelector::Exact(t) => t,
        }
    }
}

impl fmt::Display for ResourceTypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceTypeSelector::Any => write!(f, "{}", WILDCARD),
            ResourceTypeSelector::Exact(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceCondition {
    #[serde(rename = "type")]
    pub resource_type: ResourceTypeSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl ResourceCondition {
    pub fn any() -> Self {
        Self {
            resource_type: ResourceTypeSelector::Any,
            attributes: None,
        }
    }

    pub fn of_type(resource_type: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        let resource_type = if resource_type == WILDCARD {
            ResourceTypeSelector::Any
        } else {
            ResourceTypeSelector::Exact(resource_type)
        };
        Self {
            resource_type,
            attributes: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Actions a policy covers. `"*"` covers every action; an empty list covers
/// none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionCondition {
    pub actions: Vec<String>,
}

impl ActionCondition {
    pub fn any() -> Self {
        Self {
            actions: vec![WILDCARD.to_string()],
        }
    }

    pub fn of<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.actions.iter().any(|a| a == WILDCARD)
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Contextual constraints such as network origin or business hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentCondition(pub Attributes);

impl From<Attributes> for EnvironmentCondition {
    fn from(attrs: Attributes) -> Self {
        Self(attrs)
    }
}

// ---------------------------------------------------------------------------
// Decoded condition set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConditions {
    pub subject: SubjectCondition,
    pub resource: ResourceCondition,
    pub action: ActionCondition,
    pub environment: Option<EnvironmentCondition>,
}

/// Outcome of decoding a policy's stored conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionState {
    Decoded(PolicyConditions),
    Undecodable(ConditionDecodeError),
}

impl ConditionState {
    pub fn decoded(&self) -> Option<&PolicyConditions> {
        match self {
            ConditionState::Decoded(c) => Some(c),
            ConditionState::Undecodable(_) => None,
        }
    }
}

fn decode_facet<T>(facet: ConditionFacet, blob: &Value) -> Result<T, ConditionDecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(blob).map_err(|e| ConditionDecodeError::new(facet, e.to_string()))
}

/// Decode the four stored condition blobs. A missing or `null` environment
/// means "no environmental constraint"; every other facet is required.
pub fn decode_conditions(
    subject: &Value,
    resource: &Value,
    action: &Value,
    environment: Option<&Value>,
) -> Result<PolicyConditions, ConditionDecodeError> {
    let subject = decode_facet(ConditionFacet::Subject, subject)?;
    let resource = decode_facet(ConditionFacet::Resource, resource)?;
    let action = decode_facet(ConditionFacet::Action, action)?;
    let environment = match environment {
        None | Some(Value::Null) => None,
        Some(blob) => Some(decode_facet(ConditionFacet::Environment, blob)?),
    };
    Ok(PolicyConditions {
        subject,
        resource,
        action,
        environment,
    })
}

/// Encode typed conditions back into their stored blobs.
pub fn encode_conditions(
    conditions: &PolicyConditions,
) -> serde_json::Result<(Value, Value, Value, Option<Value>)> {
    Ok((
        serde_json::to_value(&conditions.subject)?,
        serde_json::to_value(&conditions.resource)?,
        serde_json::to_value(&conditions.action)?,
        conditions
            .environment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    ))
}

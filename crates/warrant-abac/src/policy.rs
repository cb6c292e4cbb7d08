//! Policy model.
//!
//! A [`PolicySet`] is an ordered list of [`Policy`] values. Each policy has
//! an optional [`Target`] that decides whether it applies to a request, a
//! list of conditions that must all hold, and the [`Effect`] it produces.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use warrant_types::AttributeType;

use crate::obligation::ObligationExpression;

// ============================================================================
// Effect
// ============================================================================

/// Outcome of a policy or of a whole evaluation.
///
/// Policies declare `Permit` or `Deny`. `NotApplicable` is only produced by
/// evaluation, when no policy decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    /// Access is granted.
    Permit,
    /// Access is refused.
    Deny,
    /// No policy applied.
    NotApplicable,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permit => "PERMIT",
            Self::Deny => "DENY",
            Self::NotApplicable => "NOT_APPLICABLE",
        }
    }

    /// Whether a policy may declare this effect.
    pub fn is_decisive(self) -> bool {
        matches!(self, Self::Permit | Self::Deny)
    }
}

impl Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Target
// ============================================================================

/// Attribute types a subject must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTarget {
    #[serde(default)]
    pub attributes: Vec<AttributeType>,
}

/// Resource URI pattern plus attribute types the resource must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub uri_template: String,
    #[serde(default)]
    pub attributes: Vec<AttributeType>,
    /// Template whose `attribute_uri` variable selects the URI used for
    /// attribute lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_uri_template: Option<String>,
}

impl ResourceTarget {
    pub fn new(uri_template: impl Into<String>) -> Self {
        Self {
            name: None,
            uri_template: uri_template.into(),
            attributes: Vec::new(),
            attribute_uri_template: None,
        }
    }
}

/// Applicability of a policy.
///
/// Every present section must match. A missing section matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectTarget>,
    /// Comma-separated HTTP verbs, e.g. `"GET, PUT"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceTarget>,
}

// ============================================================================
// Policy
// ============================================================================

/// A named condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub condition: String,
}

impl Condition {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            name: None,
            condition: condition.into(),
        }
    }

    /// Name for error reports, falling back to the expression text.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.condition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// Conditions combined with logical AND.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub effect: Effect,
    /// Obligations attached to a decision made by this policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligation_ids: Vec<String>,
}

impl Policy {
    pub fn new(name: impl Into<String>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            target: None,
            conditions: Vec::new(),
            effect,
            obligation_ids: Vec::new(),
        }
    }

    /// Sets the target (builder pattern).
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Adds a condition (builder pattern).
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(Condition::new(condition));
        self
    }

    /// Attaches an obligation (builder pattern).
    pub fn with_obligation(mut self, id: impl Into<String>) -> Self {
        self.obligation_ids.push(id.into());
        self
    }

    pub fn resource_target(&self) -> Option<&ResourceTarget> {
        self.target.as_ref().and_then(|target| target.resource.as_ref())
    }
}

// ============================================================================
// Policy Set
// ============================================================================

/// Ordered policies evaluated first-applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySet {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligation_expressions: Vec<ObligationExpression>,
}

impl PolicySet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policies: Vec::new(),
            obligation_expressions: Vec::new(),
        }
    }

    /// Appends a policy (builder pattern).
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Adds an obligation expression (builder pattern).
    pub fn with_obligation_expression(mut self, expression: ObligationExpression) -> Self {
        self.obligation_expressions.push(expression);
        self
    }

    /// A set with one unconditional permit policy.
    pub fn permit_all(name: impl Into<String>) -> Self {
        Self::new(name).with_policy(Policy::new("permit-all", Effect::Permit))
    }

    /// Condition expressions of every policy, in order.
    pub fn condition_sources(&self) -> impl Iterator<Item = &str> {
        self.policies
            .iter()
            .flat_map(|policy| policy.conditions.iter().map(|condition| condition.condition.as_str()))
    }

    /// URI templates referenced by resource targets, attribute URI templates
    /// included.
    pub fn uri_templates(&self) -> impl Iterator<Item = &str> {
        self.policies
            .iter()
            .filter_map(|policy| policy.resource_target())
            .flat_map(|target| {
                std::iter::once(target.uri_template.as_str()).chain(target.attribute_uri_template.as_deref())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_wire_names() {
        assert_eq!(serde_json::to_string(&Effect::Permit).unwrap(), "\"PERMIT\"");
        assert_eq!(
            serde_json::to_string(&Effect::NotApplicable).unwrap(),
            "\"NOT_APPLICABLE\""
        );
        assert_eq!(Effect::Deny.to_string(), "DENY");
        assert!(!Effect::NotApplicable.is_decisive());
    }

    #[test]
    fn policy_set_parses_camel_case_json() {
        let json = r#"{
            "name": "alarms",
            "policies": [{
                "name": "admins-read-alarms",
                "target": {
                    "name": "alarm reads",
                    "subject": { "attributes": [{ "issuer": "issuer1", "name": "role" }] },
                    "action": "GET, HEAD",
                    "resource": {
                        "uriTemplate": "/alarms/sites/{site}",
                        "attributeUriTemplate": "{attribute_uri}/alarms",
                        "attributes": []
                    }
                },
                "conditions": [{ "name": "is admin", "condition": "true" }],
                "effect": "PERMIT",
                "obligationIds": ["audit"]
            }],
            "obligationExpressions": [{
                "id": "audit",
                "actionTemplate": { "log": "{level}" },
                "actionArguments": [{ "name": "level", "value": "info" }]
            }]
        }"#;

        let set: PolicySet = serde_json::from_str(json).unwrap();
        let policy = &set.policies[0];
        let resource = policy.resource_target().unwrap();
        assert_eq!(resource.uri_template, "/alarms/sites/{site}");
        assert_eq!(resource.attribute_uri_template.as_deref(), Some("{attribute_uri}/alarms"));
        assert_eq!(policy.effect, Effect::Permit);
        assert_eq!(policy.obligation_ids, vec!["audit".to_string()]);
        assert_eq!(policy.conditions[0].label(), "is admin");
        assert_eq!(set.obligation_expressions[0].id, "audit");
    }

    #[test]
    fn missing_sections_default() {
        let policy: Policy = serde_json::from_str(r#"{"name": "p", "effect": "DENY"}"#).unwrap();
        assert!(policy.target.is_none());
        assert!(policy.conditions.is_empty());
        assert!(policy.obligation_ids.is_empty());
    }

    #[test]
    fn condition_label_falls_back_to_text() {
        assert_eq!(Condition::new("true").label(), "true");
    }
}

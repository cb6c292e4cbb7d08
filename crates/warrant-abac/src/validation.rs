//! Policy-set validation, run when a policy set is stored.

use std::collections::HashSet;

use warrant_condition::ConditionShell;
use warrant_types::{ATTRIBUTE_URI_VARIABLE, UriTemplate};

use crate::error::PolicyValidationError;
use crate::policy::{Policy, PolicySet};

/// Verbs accepted in a target's `action`.
pub const SUPPORTED_ACTIONS: [&str; 11] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE", "SUBSCRIBE",
    "MESSAGE",
];

/// Returns the first problem with `set`, if any.
pub fn validate_policy_set(set: &PolicySet, shell: &ConditionShell) -> Result<(), PolicyValidationError> {
    match policy_set_issues(set, shell).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Collects every problem with `set`, in declaration order.
pub fn policy_set_issues(set: &PolicySet, shell: &ConditionShell) -> Vec<PolicyValidationError> {
    let mut issues = Vec::new();
    if set.name.trim().is_empty() {
        issues.push(PolicyValidationError::BlankPolicySetName);
    }

    let mut obligation_ids = HashSet::new();
    for expression in &set.obligation_expressions {
        if !obligation_ids.insert(expression.id.as_str()) {
            issues.push(PolicyValidationError::DuplicateObligation {
                policy_set: set.name.clone(),
                id: expression.id.clone(),
            });
        }
    }

    for policy in &set.policies {
        check_policy(set, policy, &obligation_ids, shell, &mut issues);
    }
    issues
}

fn check_policy(
    set: &PolicySet,
    policy: &Policy,
    obligation_ids: &HashSet<&str>,
    shell: &ConditionShell,
    issues: &mut Vec<PolicyValidationError>,
) {
    let policy_set = || set.name.clone();
    if policy.name.trim().is_empty() {
        issues.push(PolicyValidationError::BlankPolicyName { policy_set: policy_set() });
    }
    if !policy.effect.is_decisive() {
        issues.push(PolicyValidationError::InvalidEffect {
            policy_set: policy_set(),
            policy: policy.name.clone(),
            effect: policy.effect,
        });
    }

    for condition in &policy.conditions {
        if let Err(source) = shell.validate(&condition.condition) {
            issues.push(PolicyValidationError::Condition {
                policy_set: policy_set(),
                policy: policy.name.clone(),
                condition: condition.label().to_string(),
                source,
            });
        }
    }

    if let Some(action) = policy.target.as_ref().and_then(|target| target.action.as_deref()) {
        for verb in action.split(',').map(str::trim).filter(|verb| !verb.is_empty()) {
            if !SUPPORTED_ACTIONS.contains(&verb) {
                issues.push(PolicyValidationError::UnsupportedAction {
                    policy_set: policy_set(),
                    policy: policy.name.clone(),
                    action: verb.to_string(),
                });
            }
        }
    }

    if let Some(resource) = policy.resource_target() {
        if let Err(source) = UriTemplate::new(&resource.uri_template) {
            issues.push(PolicyValidationError::InvalidTemplate {
                policy_set: policy_set(),
                policy: policy.name.clone(),
                template: resource.uri_template.clone(),
                source,
            });
        }
        if let Some(template) = &resource.attribute_uri_template {
            match UriTemplate::new(template) {
                Ok(compiled) if !compiled.has_variable(ATTRIBUTE_URI_VARIABLE) => {
                    issues.push(PolicyValidationError::MissingAttributeUriVariable {
                        policy_set: policy_set(),
                        policy: policy.name.clone(),
                        template: template.clone(),
                    });
                }
                Ok(_) => {}
                Err(source) => issues.push(PolicyValidationError::InvalidTemplate {
                    policy_set: policy_set(),
                    policy: policy.name.clone(),
                    template: template.clone(),
                    source,
                }),
            }
        }
    }

    for id in &policy.obligation_ids {
        if !obligation_ids.contains(id.as_str()) {
            issues.push(PolicyValidationError::UnknownObligation {
                policy_set: policy_set(),
                policy: policy.name.clone(),
                id: id.clone(),
            });
        }
    }
}

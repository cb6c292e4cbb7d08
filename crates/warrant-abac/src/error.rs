//! Error types for policy validation and evaluation.

use thiserror::Error;
use warrant_attributes::{AttributeRetrievalError, StoreError};
use warrant_condition::ConditionError;
use warrant_types::{UriTemplateError, ZoneId};

/// Result type for policy evaluation.
pub type Result<T> = std::result::Result<T, PolicyEvaluationError>;

/// Failure while evaluating a request. Evaluation fails closed: no decision
/// is returned alongside any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyEvaluationError {
    #[error(transparent)]
    AttributeRetrieval(#[from] AttributeRetrievalError),

    #[error("condition of policy '{policy}' in policy set '{policy_set}' failed: {source}")]
    Condition {
        policy_set: String,
        policy: String,
        #[source]
        source: ConditionError,
    },

    #[error("policy set '{name}' does not exist in zone '{zone}'")]
    UnknownPolicySet { zone: ZoneId, name: String },

    #[error("zone '{zone}' has {count} policy sets; an evaluation order is required")]
    AmbiguousEvaluationOrder { zone: ZoneId, count: usize },

    #[error("invalid URI template '{template}': {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: UriTemplateError,
    },

    #[error("policy '{policy}' references unknown obligation '{obligation_id}'")]
    UnknownObligation { policy: String, obligation_id: String },

    #[error("policy set store: {0}")]
    Store(#[from] StoreError),
}

/// A policy set rejected before it is stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyValidationError {
    #[error("policy set name must not be blank")]
    BlankPolicySetName,

    #[error("policy set '{policy_set}' contains a policy with a blank name")]
    BlankPolicyName { policy_set: String },

    #[error("policy '{policy}' in policy set '{policy_set}' declares effect {effect}")]
    InvalidEffect {
        policy_set: String,
        policy: String,
        effect: crate::policy::Effect,
    },

    #[error("condition '{condition}' of policy '{policy}' in policy set '{policy_set}': {source}")]
    Condition {
        policy_set: String,
        policy: String,
        condition: String,
        #[source]
        source: ConditionError,
    },

    #[error("policy '{policy}' in policy set '{policy_set}' uses unsupported action '{action}'")]
    UnsupportedAction {
        policy_set: String,
        policy: String,
        action: String,
    },

    #[error("policy '{policy}' in policy set '{policy_set}' has invalid template '{template}': {source}")]
    InvalidTemplate {
        policy_set: String,
        policy: String,
        template: String,
        #[source]
        source: UriTemplateError,
    },

    #[error(
        "attribute URI template '{template}' of policy '{policy}' in policy set '{policy_set}' has no attribute_uri variable"
    )]
    MissingAttributeUriVariable {
        policy_set: String,
        policy: String,
        template: String,
    },

    #[error("policy set '{policy_set}' declares obligation '{id}' more than once")]
    DuplicateObligation { policy_set: String, id: String },

    #[error("policy '{policy}' in policy set '{policy_set}' references unknown obligation '{id}'")]
    UnknownObligation {
        policy_set: String,
        policy: String,
        id: String,
    },
}

impl PolicyValidationError {
    /// Name of the offending policy, when the error is about one policy.
    pub fn policy(&self) -> Option<&str> {
        match self {
            Self::BlankPolicySetName | Self::BlankPolicyName { .. } | Self::DuplicateObligation { .. } => {
                None
            }
            Self::InvalidEffect { policy, .. }
            | Self::Condition { policy, .. }
            | Self::UnsupportedAction { policy, .. }
            | Self::InvalidTemplate { policy, .. }
            | Self::MissingAttributeUriVariable { policy, .. }
            | Self::UnknownObligation { policy, .. } => Some(policy),
        }
    }
}

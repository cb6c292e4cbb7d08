//! # warrant-abac: Policy evaluation for `Warrant`
//!
//! Decides whether a subject may perform an action on a resource within a
//! zone, using ordered policy sets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  PolicyEvaluationRequest                     │
//! │  (subject, action, resource URI, order)      │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  CachingPolicyEvaluator                      │
//! │  └─ fingerprint → cached decision?           │
//! └─────────────────┬───────────────────────────┘
//!                   │ miss
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyEvaluationOrchestrator                │
//! │  ├─ Order the zone's policy sets             │
//! │  ├─ PolicyMatcher: resolve attributes,       │
//! │  │  match targets                            │
//! │  ├─ ConditionShell: run conditions           │
//! │  └─ First deciding set wins                  │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyEvaluationResult                      │
//! │  - Effect (PERMIT/DENY/NOT_APPLICABLE)       │
//! │  - Obligations, attributes, decidedBy        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use warrant_abac::{
//!     Effect, InMemoryPolicySetStore, PolicyEvaluationOrchestrator, PolicyEvaluationRequest,
//!     PolicyEvaluator, PolicySet, PolicySetStore,
//! };
//! use warrant_attributes::{AttributeReaderFactory, InMemoryPrivilegeStore, ReaderSettings, StaticAdapterProvider};
//! use warrant_condition::ConditionShell;
//! use warrant_types::ZoneId;
//!
//! let zone = ZoneId::from("zone-1");
//! let policy_sets = Arc::new(InMemoryPolicySetStore::new());
//! policy_sets.upsert(&zone, PolicySet::permit_all("everything")).unwrap();
//!
//! let readers = Arc::new(AttributeReaderFactory::new(
//!     Arc::new(InMemoryPrivilegeStore::new()),
//!     Arc::new(StaticAdapterProvider::new()),
//!     ReaderSettings::default(),
//! ));
//! let evaluator = PolicyEvaluationOrchestrator::new(policy_sets, readers, ConditionShell::default());
//!
//! let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/sites/sanramon");
//! let result = evaluator.evaluate(&zone, &request).unwrap();
//! assert_eq!(result.effect, Effect::Permit);
//! ```

pub mod cache;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod obligation;
pub mod policy;
pub mod store;
pub mod validation;

pub use cache::{
    CachingPolicyEvaluator, DEFAULT_DECISION_TTL, DecisionKey, InMemoryPolicyEvaluationCache,
    NoOpPolicyEvaluationCache, PolicyEvaluationCache, SWEEP_INTERVAL,
};
pub use error::{PolicyEvaluationError, PolicyValidationError, Result};
pub use evaluator::{
    DecidedBy, EvaluationTrace, PolicyEvaluationOrchestrator, PolicyEvaluationRequest,
    PolicyEvaluationResult, PolicyEvaluator,
};
pub use matcher::{
    MatchResult, MatchedPolicy, PolicyMatchCandidate, PolicyMatcher, TemplateCache, action_matches,
    resource_matches, subject_matches,
};
pub use obligation::{ActionArgument, Obligation, ObligationExpression};
pub use policy::{Condition, Effect, Policy, PolicySet, ResourceTarget, SubjectTarget, Target};
pub use store::{InMemoryPolicySetStore, PolicySetStore};
pub use validation::{SUPPORTED_ACTIONS, policy_set_issues, validate_policy_set};

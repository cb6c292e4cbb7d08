//! # Warrant
//!
//! Multi-tenant attribute-based access control decision engine.
//!
//! Given a subject, an action and a resource URI within a zone, Warrant
//! evaluates the zone's policy sets and returns PERMIT, DENY or
//! NOT_APPLICABLE. Attributes come from the privilege store or from external
//! adapters; conditions are written in a small closed expression language.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Warrant                            │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────┐   ┌────────┐ │
//! │  │ Decision  │ → │  Policy    │ → │ Attribute │ → │ Store/ │ │
//! │  │  cache    │   │ evaluation │   │  readers  │   │adapter │ │
//! │  └───────────┘   └─────┬──────┘   └───────────┘   └────────┘ │
//! │                        ▼                                      │
//! │                  ┌────────────┐                               │
//! │                  │ Conditions │                               │
//! │                  └────────────┘                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use warrant::{Attribute, Effect, EntityRecord, Policy, PolicyEvaluationRequest, PolicySet, Warrant, ZoneId};
//!
//! let warrant = Warrant::in_memory()?;
//! let zone = ZoneId::from("zone-1");
//!
//! warrant.upsert_policy_set(
//!     &zone,
//!     PolicySet::new("alarms").with_policy(
//!         Policy::new("admins", Effect::Permit)
//!             .with_condition(r#"match.single(subject.attributes("issuer1", "role"), "admin")"#),
//!     ),
//! )?;
//! warrant.upsert_subject(
//!     &zone,
//!     EntityRecord::new("bob", vec![Attribute::new("issuer1", "role", "admin")].into()),
//! )?;
//!
//! let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/sites/sanramon");
//! assert_eq!(warrant.evaluate(&zone, &request)?.effect, Effect::Permit);
//! # Ok::<(), warrant::WarrantError>(())
//! ```

mod error;
mod fixture;
mod warrant;

pub use error::{Result, WarrantError};
pub use fixture::{ExternalAttributes, ExternalSource, Fixture};
pub use warrant::{Warrant, WarrantBuilder};

// Re-export core types
pub use warrant_types::{Attribute, AttributeSet, AttributeType, Clock, EntityKind, ManualClock, ZoneId};

// Re-export policy model and evaluation types
pub use warrant_abac::{
    Condition, DecidedBy, Effect, InMemoryPolicySetStore, Obligation, ObligationExpression, Policy,
    PolicyEvaluationError, PolicyEvaluationRequest, PolicyEvaluationResult, PolicySet, PolicySetStore,
    PolicyValidationError, ResourceTarget, SubjectTarget, Target,
};

// Re-export attribute sources
pub use warrant_attributes::{
    AdapterConnection, AdapterError, AdapterProvider, AttributeAdapter, AttributeConnector,
    AttributeRetrievalError, EntityRecord, InMemoryPrivilegeStore, Parent, PrivilegeStore,
    StaticAdapterProvider, StaticAttributeAdapter, ZoneConnectors,
};

pub use warrant_condition::ConditionError;
pub use warrant_config::{ConfigLoader, WarrantConfig, ZoneConfig};

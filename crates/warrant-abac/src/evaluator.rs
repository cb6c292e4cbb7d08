//! Policy evaluation.
//!
//! Policy sets are evaluated in the requested order. Within a set the first
//! matching policy whose conditions all hold decides; across sets the first
//! deciding set wins. Any failure aborts the evaluation with an error rather
//! than a decision.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warrant_attributes::AttributeReaderFactory;
use warrant_condition::{ConditionContext, ConditionShell};
use warrant_types::{AttributeSet, ZoneId, canonicalize};

use crate::error::{PolicyEvaluationError, Result};
use crate::matcher::{PolicyMatchCandidate, PolicyMatcher, TemplateCache};
use crate::obligation::Obligation;
use crate::policy::{Effect, Policy, PolicySet};
use crate::store::PolicySetStore;

// ============================================================================
// Request and Result
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationRequest {
    pub subject_identifier: String,
    pub action: String,
    pub resource_identifier: String,
    /// Caller-supplied subject attributes, added to the resolved ones.
    #[serde(default)]
    pub subject_attributes: AttributeSet,
    /// Caller-supplied resource attributes, added to the resolved ones.
    #[serde(default)]
    pub resource_attributes: AttributeSet,
    /// Names of the policy sets to evaluate, in order.
    #[serde(default)]
    pub policy_sets_evaluation_order: Vec<String>,
}

impl PolicyEvaluationRequest {
    pub fn new(
        subject_identifier: impl Into<String>,
        action: impl Into<String>,
        resource_identifier: impl Into<String>,
    ) -> Self {
        Self {
            subject_identifier: subject_identifier.into(),
            action: action.into(),
            resource_identifier: resource_identifier.into(),
            ..Self::default()
        }
    }

    /// Sets the policy-set evaluation order (builder pattern).
    pub fn with_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_sets_evaluation_order = order.into_iter().map(Into::into).collect();
        self
    }

    fn candidate(&self) -> PolicyMatchCandidate {
        PolicyMatchCandidate {
            action: self.action.clone(),
            resource_uri: canonicalize(&self.resource_identifier),
            subject_identifier: self.subject_identifier.clone(),
            supplemental_resource_attributes: self.resource_attributes.clone(),
            supplemental_subject_attributes: self.subject_attributes.clone(),
        }
    }
}

/// The policy that decided an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecidedBy {
    pub policy_set: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationResult {
    pub effect: Effect,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    /// Attributes of the deciding policy's match; empty when not applicable.
    #[serde(default)]
    pub subject_attributes: AttributeSet,
    #[serde(default)]
    pub resource_attributes: AttributeSet,
    #[serde(default)]
    pub resolved_resource_uris: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<DecidedBy>,
    pub timestamp: DateTime<Utc>,
}

impl PolicyEvaluationResult {
    pub fn not_applicable() -> Self {
        Self {
            effect: Effect::NotApplicable,
            obligations: Vec::new(),
            subject_attributes: AttributeSet::new(),
            resource_attributes: AttributeSet::new(),
            resolved_resource_uris: BTreeSet::new(),
            decided_by: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_permit(&self) -> bool {
        self.effect == Effect::Permit
    }
}

/// A result together with the policy sets that were consulted to reach it.
#[derive(Debug, Clone)]
pub struct EvaluationTrace {
    pub result: PolicyEvaluationResult,
    /// Sets whose policies were matched, in order, up to the deciding one.
    pub policy_sets: Vec<String>,
    /// Every set the evaluation order resolved to. Removing any of them
    /// changes the outcome even if it was never consulted.
    pub evaluation_order: Vec<String>,
    /// True when no explicit order was given, so the outcome also depends on
    /// how many policy sets the zone holds.
    pub follows_zone_catalog: bool,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Anything that can decide a request within a zone.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, zone: &ZoneId, request: &PolicyEvaluationRequest) -> Result<PolicyEvaluationResult>;
}

/// Loads policy sets, matches targets, runs conditions and combines the
/// outcome.
pub struct PolicyEvaluationOrchestrator {
    policy_sets: Arc<dyn PolicySetStore>,
    readers: Arc<AttributeReaderFactory>,
    shell: ConditionShell,
    templates: TemplateCache,
}

impl PolicyEvaluationOrchestrator {
    pub fn new(
        policy_sets: Arc<dyn PolicySetStore>,
        readers: Arc<AttributeReaderFactory>,
        shell: ConditionShell,
    ) -> Self {
        Self {
            policy_sets,
            readers,
            shell,
            templates: TemplateCache::new(),
        }
    }

    pub fn shell(&self) -> &ConditionShell {
        &self.shell
    }

    /// Drops compiled conditions and URI templates that `retired` used and
    /// `successor` does not. Anything still shared with another set is
    /// recompiled on its next use.
    pub fn evict_compiled(&self, retired: &PolicySet, successor: Option<&PolicySet>) {
        let kept_conditions: HashSet<&str> = successor
            .into_iter()
            .flat_map(|set| set.condition_sources())
            .collect();
        let kept_templates: HashSet<&str> = successor
            .into_iter()
            .flat_map(|set| set.uri_templates())
            .collect();

        let mut evicted = 0usize;
        for source in retired.condition_sources().filter(|source| !kept_conditions.contains(source)) {
            self.shell.evict(source);
            evicted += 1;
        }
        for template in retired.uri_templates().filter(|template| !kept_templates.contains(template)) {
            if self.templates.remove(template) {
                evicted += 1;
            }
        }
        debug!(policy_set = %retired.name, evicted, "evicted compiled policy set artifacts");
    }

    /// Evaluates `request` and reports which policy sets were consulted.
    pub fn evaluate_traced(&self, zone: &ZoneId, request: &PolicyEvaluationRequest) -> Result<EvaluationTrace> {
        let candidate = request.candidate();
        let sets = self.ordered_policy_sets(zone, &request.policy_sets_evaluation_order)?;
        let evaluation_order: Vec<String> = sets.iter().map(|set| set.name.clone()).collect();
        let follows_zone_catalog = request.policy_sets_evaluation_order.is_empty();
        if sets.is_empty() {
            debug!(zone = %zone, "zone has no policy sets");
            return Ok(EvaluationTrace {
                result: PolicyEvaluationResult::not_applicable(),
                policy_sets: Vec::new(),
                evaluation_order,
                follows_zone_catalog,
            });
        }

        let resource_reader = self.readers.resource_reader(zone)?;
        let subject_reader = self.readers.subject_reader(zone)?;
        let matcher = PolicyMatcher::new(resource_reader.as_ref(), subject_reader.as_ref(), &self.templates);

        let mut consulted = Vec::with_capacity(sets.len());
        let mut resolved_uris = BTreeSet::new();
        let mut decision = None;

        for set in &sets {
            consulted.push(set.name.clone());
            let matches = matcher.match_policies(&candidate, &set.policies)?;
            resolved_uris.extend(matches.resolved_resource_uris.iter().cloned());

            for matched in &matches.matched_policies {
                let ctx = ConditionContext {
                    resource_attributes: &matched.resolved_resource_attributes,
                    subject_attributes: &matched.resolved_subject_attributes,
                    resource_uri: &candidate.resource_uri,
                    resource_uri_template: matched.resource_uri_template.as_deref(),
                };
                let holds = self
                    .shell
                    .evaluate_all(
                        matched.policy.conditions.iter().map(|c| c.condition.as_str()),
                        &ctx,
                    )
                    .map_err(|source| PolicyEvaluationError::Condition {
                        policy_set: set.name.clone(),
                        policy: matched.policy.name.clone(),
                        source,
                    })?;

                debug!(
                    zone = %zone,
                    policy_set = %set.name,
                    policy = %matched.policy.name,
                    holds,
                    "conditions evaluated"
                );
                if holds {
                    decision = Some(PolicyEvaluationResult {
                        effect: matched.policy.effect,
                        obligations: resolve_obligations(set, matched.policy)?,
                        subject_attributes: matched.resolved_subject_attributes.as_ref().clone(),
                        resource_attributes: matched.resolved_resource_attributes.as_ref().clone(),
                        resolved_resource_uris: BTreeSet::new(),
                        decided_by: Some(DecidedBy {
                            policy_set: set.name.clone(),
                            policy: matched.policy.name.clone(),
                        }),
                        timestamp: Utc::now(),
                    });
                    break;
                }
            }

            if decision.is_some() {
                break;
            }
        }

        let mut result = decision.unwrap_or_else(PolicyEvaluationResult::not_applicable);
        result.resolved_resource_uris = resolved_uris;

        info!(
            zone = %zone,
            subject = %request.subject_identifier,
            action = %request.action,
            resource = %candidate.resource_uri,
            effect = %result.effect,
            "policy evaluation complete"
        );
        Ok(EvaluationTrace {
            result,
            policy_sets: consulted,
            evaluation_order,
            follows_zone_catalog,
        })
    }

    /// Applies the evaluation-order rules to the zone's policy sets.
    fn ordered_policy_sets(&self, zone: &ZoneId, order: &[String]) -> Result<Vec<Arc<PolicySet>>> {
        let available = self.policy_sets.policy_sets(zone)?;

        if order.is_empty() {
            if available.len() > 1 {
                return Err(PolicyEvaluationError::AmbiguousEvaluationOrder {
                    zone: zone.clone(),
                    count: available.len(),
                });
            }
            return Ok(available);
        }

        order
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|set| &set.name == name)
                    .cloned()
                    .ok_or_else(|| PolicyEvaluationError::UnknownPolicySet {
                        zone: zone.clone(),
                        name: name.clone(),
                    })
            })
            .collect()
    }
}

impl PolicyEvaluator for PolicyEvaluationOrchestrator {
    fn evaluate(&self, zone: &ZoneId, request: &PolicyEvaluationRequest) -> Result<PolicyEvaluationResult> {
        self.evaluate_traced(zone, request).map(|trace| trace.result)
    }
}

fn resolve_obligations(set: &PolicySet, policy: &Policy) -> Result<Vec<Obligation>> {
    policy
        .obligation_ids
        .iter()
        .map(|id| {
            set.obligation_expressions
                .iter()
                .find(|expression| &expression.id == id)
                .map(|expression| expression.resolve())
                .ok_or_else(|| PolicyEvaluationError::UnknownObligation {
                    policy: policy.name.clone(),
                    obligation_id: id.clone(),
                })
        })
        .collect()
}

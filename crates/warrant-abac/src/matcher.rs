//! Policy target matching.
//!
//! The matcher resolves subject and resource attributes for a request and
//! keeps the policies whose targets apply. Conditions are not evaluated
//! here; see [`crate::evaluator`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};
use warrant_attributes::{ResourceAttributeReader, SubjectAttributeReader};
use warrant_types::{ATTRIBUTE_URI_VARIABLE, AttributeSet, UriTemplate};

use crate::error::{PolicyEvaluationError, Result};
use crate::policy::{Policy, ResourceTarget, SubjectTarget};

/// The request as seen by the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyMatchCandidate {
    pub action: String,
    pub resource_uri: String,
    pub subject_identifier: String,
    /// Unioned with resolved resource attributes.
    pub supplemental_resource_attributes: AttributeSet,
    /// Unioned with resolved subject attributes.
    pub supplemental_subject_attributes: AttributeSet,
}

/// A policy whose target applies, with the attributes it was matched against.
#[derive(Debug, Clone)]
pub struct MatchedPolicy<'p> {
    pub policy: &'p Policy,
    pub resolved_resource_attributes: Arc<AttributeSet>,
    pub resolved_subject_attributes: Arc<AttributeSet>,
    pub resource_uri_template: Option<Arc<UriTemplate>>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchResult<'p> {
    /// Matching policies in declaration order.
    pub matched_policies: Vec<MatchedPolicy<'p>>,
    /// URIs extracted through attribute URI templates and used for lookup.
    pub resolved_resource_uris: BTreeSet<String>,
}

// ============================================================================
// Target Predicates
// ============================================================================

/// A blank or missing target action matches any verb. Otherwise the verb
/// must equal one of the comma-separated entries exactly.
pub fn action_matches(target_action: Option<&str>, action: &str) -> bool {
    match target_action.map(str::trim) {
        None | Some("") => true,
        Some(verbs) => verbs.split(',').map(str::trim).any(|verb| verb == action),
    }
}

/// Every declared attribute type must be present. Values are not compared.
pub fn subject_matches(target: Option<&SubjectTarget>, attributes: &AttributeSet) -> bool {
    target.is_none_or(|target| attributes.has_all_types(&target.attributes))
}

/// The URI must match the target's template and every declared attribute
/// type must be present.
pub fn resource_matches(
    target: Option<&ResourceTarget>,
    template: Option<&UriTemplate>,
    uri: &str,
    attributes: &AttributeSet,
) -> bool {
    let Some(target) = target else {
        return true;
    };
    template.is_some_and(|template| template.matches(uri)) && attributes.has_all_types(&target.attributes)
}

// ============================================================================
// Template Cache
// ============================================================================

/// Compiled URI templates keyed by their source text.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: RwLock<HashMap<String, Arc<UriTemplate>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, template: &str) -> Result<Arc<UriTemplate>> {
        if let Some(compiled) = self
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(template)
        {
            return Ok(Arc::clone(compiled));
        }

        let compiled = Arc::new(UriTemplate::new(template).map_err(|source| {
            PolicyEvaluationError::InvalidTemplate {
                template: template.to_string(),
                source,
            }
        })?);
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Drops the compiled form of `template`.
    pub fn remove(&self, template: &str) -> bool {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(template)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Matcher
// ============================================================================

type ResolvedAttributes = (Arc<AttributeSet>, Arc<AttributeSet>);

pub struct PolicyMatcher<'a> {
    resource_reader: &'a dyn ResourceAttributeReader,
    subject_reader: &'a dyn SubjectAttributeReader,
    templates: &'a TemplateCache,
}

impl<'a> PolicyMatcher<'a> {
    pub fn new(
        resource_reader: &'a dyn ResourceAttributeReader,
        subject_reader: &'a dyn SubjectAttributeReader,
        templates: &'a TemplateCache,
    ) -> Self {
        Self {
            resource_reader,
            subject_reader,
            templates,
        }
    }

    /// Returns the policies whose targets apply to `candidate`.
    ///
    /// Attributes are resolved at most once per lookup URI. Retrieval
    /// failures abort the whole match.
    pub fn match_policies<'p>(
        &self,
        candidate: &PolicyMatchCandidate,
        policies: &'p [Policy],
    ) -> Result<MatchResult<'p>> {
        let mut resolved: HashMap<String, ResolvedAttributes> = HashMap::new();
        let mut result = MatchResult::default();

        for policy in policies {
            let resource = policy.resource_target();
            let lookup_uri = match resource.and_then(|target| target.attribute_uri_template.as_deref()) {
                Some(template) => {
                    let uri = self
                        .templates
                        .get(template)?
                        .variable(&candidate.resource_uri, ATTRIBUTE_URI_VARIABLE)
                        .filter(|uri| !uri.is_empty())
                        .unwrap_or_else(|| candidate.resource_uri.clone());
                    result.resolved_resource_uris.insert(uri.clone());
                    uri
                }
                None => candidate.resource_uri.clone(),
            };

            let (resource_attributes, subject_attributes) = match resolved.get(&lookup_uri) {
                Some(pair) => pair.clone(),
                None => {
                    let pair = self.resolve(candidate, &lookup_uri)?;
                    resolved.insert(lookup_uri, pair.clone());
                    pair
                }
            };

            let template = resource
                .map(|target| self.templates.get(&target.uri_template))
                .transpose()?;
            let target = policy.target.as_ref();
            let applies = action_matches(target.and_then(|t| t.action.as_deref()), &candidate.action)
                && subject_matches(target.and_then(|t| t.subject.as_ref()), &subject_attributes)
                && resource_matches(
                    resource,
                    template.as_deref(),
                    &candidate.resource_uri,
                    &resource_attributes,
                );

            if !applies {
                trace!(policy = %policy.name, "target does not match");
                continue;
            }
            debug!(policy = %policy.name, "target matches");
            result.matched_policies.push(MatchedPolicy {
                policy,
                resolved_resource_attributes: resource_attributes,
                resolved_subject_attributes: subject_attributes,
                resource_uri_template: template,
            });
        }

        Ok(result)
    }

    fn resolve(&self, candidate: &PolicyMatchCandidate, uri: &str) -> Result<ResolvedAttributes> {
        let resource = self
            .resource_reader
            .attributes(uri)?
            .union(&candidate.supplemental_resource_attributes);
        let subject = self
            .subject_reader
            .attributes_by_scope(&candidate.subject_identifier, &resource)?
            .union(&candidate.supplemental_subject_attributes);
        Ok((Arc::new(resource), Arc::new(subject)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use test_case::test_case;
    use warrant_attributes::{
        AttributeRetrievalError, EntityRecord, InMemoryPrivilegeStore, InternalResourceAttributeReader,
        InternalSubjectAttributeReader, Parent, PrivilegeStore,
    };
    use warrant_types::{Attribute, AttributeType, EntityKind, ZoneId};

    use super::*;
    use crate::policy::{Effect, Target};

    #[derive(Default)]
    struct CountingResourceReader {
        calls: AtomicUsize,
        attributes: HashMap<String, AttributeSet>,
    }

    impl ResourceAttributeReader for CountingResourceReader {
        fn attributes(&self, identifier: &str) -> warrant_attributes::Result<AttributeSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.attributes.get(identifier).cloned().unwrap_or_default())
        }
    }

    struct FixedSubjectReader(AttributeSet);

    impl SubjectAttributeReader for FixedSubjectReader {
        fn attributes(&self, _identifier: &str) -> warrant_attributes::Result<AttributeSet> {
            Ok(self.0.clone())
        }

        fn attributes_by_scope(
            &self,
            _identifier: &str,
            _scopes: &AttributeSet,
        ) -> warrant_attributes::Result<AttributeSet> {
            Ok(self.0.clone())
        }
    }

    struct FailingSubjectReader;

    impl SubjectAttributeReader for FailingSubjectReader {
        fn attributes(&self, identifier: &str) -> warrant_attributes::Result<AttributeSet> {
            Err(AttributeRetrievalError::DoNotRetry {
                identifier: identifier.to_string(),
            })
        }

        fn attributes_by_scope(
            &self,
            identifier: &str,
            _scopes: &AttributeSet,
        ) -> warrant_attributes::Result<AttributeSet> {
            self.attributes(identifier)
        }
    }

    fn candidate(action: &str, uri: &str) -> PolicyMatchCandidate {
        PolicyMatchCandidate {
            action: action.into(),
            resource_uri: uri.into(),
            subject_identifier: "bob".into(),
            ..PolicyMatchCandidate::default()
        }
    }

    fn role() -> AttributeType {
        AttributeType::new("issuer1", "role")
    }

    fn site_policy() -> Policy {
        Policy::new("site", Effect::Permit).with_target(Target {
            action: Some("GET".into()),
            subject: Some(SubjectTarget {
                attributes: vec![role()],
            }),
            resource: Some(ResourceTarget::new("/alarms/sites/{site}")),
            ..Target::default()
        })
    }

    #[test_case(None, "GET", true ; "missing action matches")]
    #[test_case(Some("  "), "DELETE", true ; "blank action matches")]
    #[test_case(Some("GET, PUT"), "PUT", true ; "listed verb")]
    #[test_case(Some("GET,PUT"), "POST", false ; "unlisted verb")]
    #[test_case(Some("GET"), "get", false ; "case exact")]
    fn action_matching(target: Option<&str>, action: &str, expected: bool) {
        assert_eq!(action_matches(target, action), expected);
    }

    #[test]
    fn policy_without_target_matches_and_gets_attributes() {
        let resources = CountingResourceReader::default();
        let subjects = FixedSubjectReader(vec![Attribute::new("issuer1", "role", "admin")].into());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);

        let policies = vec![Policy::new("any", Effect::Permit)];
        let result = matcher.match_policies(&candidate("GET", "/x"), &policies).unwrap();
        assert_eq!(result.matched_policies.len(), 1);
        assert!(result.matched_policies[0].resolved_subject_attributes.has_type(&role()));
        assert!(result.resolved_resource_uris.is_empty());
    }

    #[test]
    fn subject_without_required_type_does_not_match() {
        let resources = CountingResourceReader::default();
        let subjects = FixedSubjectReader(AttributeSet::new());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);

        let policies = vec![site_policy()];
        let result = matcher
            .match_policies(&candidate("GET", "/alarms/sites/sanramon"), &policies)
            .unwrap();
        assert!(result.matched_policies.is_empty());
    }

    #[test]
    fn supplemental_attributes_satisfy_targets() {
        let resources = CountingResourceReader::default();
        let subjects = FixedSubjectReader(AttributeSet::new());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);

        let mut request = candidate("GET", "/alarms/sites/sanramon");
        request.supplemental_subject_attributes = vec![Attribute::new("issuer1", "role", "x")].into();
        let policies = vec![site_policy()];
        let result = matcher.match_policies(&request, &policies).unwrap();
        assert_eq!(result.matched_policies.len(), 1);
        assert_eq!(
            result.matched_policies[0]
                .resource_uri_template
                .as_ref()
                .map(|t| t.as_str()),
            Some("/alarms/sites/{site}")
        );
    }

    #[test]
    fn resource_uri_and_action_must_match() {
        let resources = CountingResourceReader::default();
        let subjects = FixedSubjectReader(vec![Attribute::new("issuer1", "role", "admin")].into());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);
        let policies = vec![site_policy()];

        for (action, uri) in [("GET", "/alarms/regions/west"), ("PUT", "/alarms/sites/sanramon")] {
            let result = matcher.match_policies(&candidate(action, uri), &policies).unwrap();
            assert!(result.matched_policies.is_empty(), "{action} {uri}");
        }
    }

    #[test]
    fn attributes_resolved_once_per_lookup_uri() {
        let resources = CountingResourceReader::default();
        let subjects = FixedSubjectReader(AttributeSet::new());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);

        let policies = vec![
            Policy::new("a", Effect::Deny),
            Policy::new("b", Effect::Permit),
            Policy::new("c", Effect::Permit),
        ];
        matcher.match_policies(&candidate("GET", "/x"), &policies).unwrap();
        assert_eq!(resources.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn attribute_uri_template_selects_lookup_uri() {
        let mut resources = CountingResourceReader::default();
        resources.attributes.insert(
            "/sites/sanramon".into(),
            vec![Attribute::new("issuer1", "site", "sanramon")].into(),
        );
        let subjects = FixedSubjectReader(AttributeSet::new());
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);

        let mut resource = ResourceTarget::new("/sites/{site}/alarms/{alarm}");
        resource.attribute_uri_template = Some("{attribute_uri}/alarms/{alarm}".into());
        resource.attributes = vec![AttributeType::new("issuer1", "site")];
        let policies = vec![Policy::new("p", Effect::Permit).with_target(Target {
            resource: Some(resource),
            ..Target::default()
        })];

        let result = matcher
            .match_policies(&candidate("GET", "/sites/sanramon/alarms/7"), &policies)
            .unwrap();
        assert_eq!(result.matched_policies.len(), 1);
        assert_eq!(
            result.resolved_resource_uris,
            BTreeSet::from(["/sites/sanramon".to_string()])
        );
    }

    #[test]
    fn subject_scopes_come_from_resource_attributes() {
        let store = Arc::new(InMemoryPrivilegeStore::new());
        let zone = ZoneId::from("z");
        let site = Attribute::new("issuer1", "site", "sanramon");
        store
            .upsert(
                &zone,
                EntityKind::Subject,
                EntityRecord::new("operators", vec![Attribute::new("issuer1", "role", "operator")].into()),
            )
            .unwrap();
        store
            .upsert(
                &zone,
                EntityKind::Subject,
                EntityRecord::new("bob", AttributeSet::new())
                    .with_parent(Parent::scoped("operators", site.clone())),
            )
            .unwrap();
        store
            .upsert(
                &zone,
                EntityKind::Resource,
                EntityRecord::new("/sites/sanramon", vec![site].into()),
            )
            .unwrap();

        let resources = InternalResourceAttributeReader::new(zone.clone(), store.clone());
        let subjects = InternalSubjectAttributeReader::new(zone, store);
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &subjects, &templates);
        let policies = vec![Policy::new("p", Effect::Permit).with_target(Target {
            subject: Some(SubjectTarget {
                attributes: vec![role()],
            }),
            ..Target::default()
        })];

        let in_scope = matcher
            .match_policies(&candidate("GET", "/sites/sanramon"), &policies)
            .unwrap();
        assert_eq!(in_scope.matched_policies.len(), 1);

        let out_of_scope = matcher
            .match_policies(&candidate("GET", "/sites/dublin"), &policies)
            .unwrap();
        assert!(out_of_scope.matched_policies.is_empty());
    }

    #[test]
    fn retrieval_failure_aborts_matching() {
        let resources = CountingResourceReader::default();
        let templates = TemplateCache::new();
        let matcher = PolicyMatcher::new(&resources, &FailingSubjectReader, &templates);
        let policies = vec![Policy::new("p", Effect::Permit)];

        let error = matcher.match_policies(&candidate("GET", "/x"), &policies).unwrap_err();
        assert!(matches!(error, PolicyEvaluationError::AttributeRetrieval(_)));
    }

    #[test]
    fn template_cache_compiles_once() {
        let templates = TemplateCache::new();
        let first = templates.get("/a/{b}").unwrap();
        let second = templates.get("/a/{b}").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(templates.len(), 1);
        assert!(matches!(
            templates.get("/a/{b"),
            Err(PolicyEvaluationError::InvalidTemplate { .. })
        ));
    }
}

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use warrant::{
    AdapterConnection, AdapterError, Attribute, AttributeAdapter, AttributeConnector, Effect, EntityRecord,
    Policy, PolicyEvaluationRequest, PolicySet, ResourceTarget, StaticAdapterProvider, StaticAttributeAdapter,
    SubjectTarget, Target, Warrant, WarrantConfig, ZoneConnectors, ZoneId,
};
use warrant_types::AttributeType;

const ENDPOINT: &str = "https://attributes.example.com/v1/subjects";

const CONDITIONS: [&str; 4] = [
    r#"match.single(subject.attributes("issuer1", "role"), "admin")"#,
    r#"resource.uriVariable("site") == "sanramon""#,
    r#"subject.attributes("issuer1", "site").contains(resource.uriVariable("site"))"#,
    "true",
];

const TEMPLATES: [&str; 3] = ["/alarms/sites/{site}", "/alarms/{path:.+}", "/reports/{id:[0-9]+}"];

const ACTIONS: [&str; 4] = ["GET", "PUT, POST", "MESSAGE", "DELETE"];

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzEffect {
    Permit,
    Deny,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzPolicy {
    effect: FuzzEffect,
    action: Option<u8>,
    template: Option<u8>,
    requires_role: bool,
    conditions: Vec<u8>,
}

impl FuzzPolicy {
    fn to_policy(&self, index: usize) -> Policy {
        let effect = match self.effect {
            FuzzEffect::Permit => Effect::Permit,
            FuzzEffect::Deny => Effect::Deny,
        };
        let target = Target {
            action: self.action.map(|i| ACTIONS[usize::from(i) % ACTIONS.len()].to_string()),
            resource: self
                .template
                .map(|i| ResourceTarget::new(TEMPLATES[usize::from(i) % TEMPLATES.len()])),
            subject: self.requires_role.then(|| SubjectTarget {
                attributes: vec![AttributeType::new("issuer1", "role")],
            }),
            ..Target::default()
        };
        self.conditions.iter().take(4).fold(
            Policy::new(format!("policy-{index}"), effect).with_target(target),
            |policy, i| policy.with_condition(CONDITIONS[usize::from(*i) % CONDITIONS.len()]),
        )
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzRequest {
    subject_is_admin: bool,
    action: u8,
    site: String,
    external_failure: bool,
}

fuzz_target!(|input: (Vec<FuzzPolicy>, FuzzRequest)| {
    let (policies, request) = input;
    let zone = ZoneId::from("zone-1");

    let set = policies
        .iter()
        .take(8)
        .enumerate()
        .fold(PolicySet::new("fuzz"), |set, (i, policy)| set.with_policy(policy.to_policy(i)));

    let provider = Arc::new(StaticAdapterProvider::new());
    provider.register(Arc::new(StaticAttributeAdapter::failing(
        ENDPOINT,
        AdapterError::Failed {
            endpoint: ENDPOINT.into(),
            message: "unavailable".into(),
        },
    )) as Arc<dyn AttributeAdapter>);
    let Ok(warrant) = Warrant::builder(WarrantConfig::default()).with_adapter_provider(provider).build() else {
        return;
    };
    if request.external_failure {
        warrant.set_connectors(
            &zone,
            ZoneConnectors {
                subject: Some(AttributeConnector::new(vec![AdapterConnection::new(ENDPOINT)])),
                ..ZoneConnectors::default()
            },
        );
    }
    if warrant.upsert_policy_set(&zone, set.clone()).is_err() {
        return;
    }
    let role = if request.subject_is_admin { "admin" } else { "viewer" };
    let _ = warrant.upsert_subject(
        &zone,
        EntityRecord::new("bob", vec![Attribute::new("issuer1", "role", role)].into()),
    );

    let action = ACTIONS[usize::from(request.action) % ACTIONS.len()].split(',').next().unwrap_or("GET");
    let evaluation = PolicyEvaluationRequest::new("bob", action, format!("/alarms/sites/{}", request.site));

    let Ok(result) = warrant.evaluate(&zone, &evaluation) else {
        return;
    };

    // Retrieval failures never turn into a decision.
    assert!(
        !(request.external_failure && !set.policies.is_empty() && result.is_permit()),
        "failing adapter produced PERMIT"
    );
    // A decision names the policy that made it, with that policy's effect.
    match &result.decided_by {
        Some(decided_by) => {
            let policy = set.policies.iter().find(|p| p.name == decided_by.policy);
            assert_eq!(policy.map(|p| p.effect), Some(result.effect));
        }
        None => assert_eq!(result.effect, Effect::NotApplicable),
    }
});

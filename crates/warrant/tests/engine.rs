//! Engine-level behavior: concurrency, cache expiry and external attributes.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use warrant::{
    AdapterConnection, AdapterError, Attribute, AttributeAdapter, AttributeConnector, Effect, EntityKind,
    EntityRecord, InMemoryPrivilegeStore, ManualClock, Policy, PolicyEvaluationError,
    PolicyEvaluationRequest, PolicySet, PrivilegeStore, StaticAdapterProvider, StaticAttributeAdapter,
    Warrant, WarrantConfig, WarrantError, ZoneConfig, ZoneConnectors, ZoneId,
};

const ADMIN_CONDITION: &str = r#"match.single(subject.attributes("issuer1", "role"), "admin")"#;

fn zone() -> ZoneId {
    ZoneId::from("zone-1")
}

fn admin_only() -> PolicySet {
    PolicySet::new("alarms").with_policy(Policy::new("admins", Effect::Permit).with_condition(ADMIN_CONDITION))
}

fn admin(identifier: &str) -> EntityRecord {
    EntityRecord::new(identifier, vec![Attribute::new("issuer1", "role", "admin")].into())
}

#[test]
fn concurrent_evaluations_agree() {
    let warrant = Arc::new(Warrant::in_memory().unwrap());
    warrant.upsert_policy_set(&zone(), admin_only()).unwrap();
    for i in 0..10 {
        if i % 2 == 0 {
            warrant.upsert_subject(&zone(), admin(&format!("user-{i}"))).unwrap();
        }
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let warrant = Arc::clone(&warrant);
            thread::spawn(move || {
                for round in 0..50 {
                    let i = round % 10;
                    let request = PolicyEvaluationRequest::new(format!("user-{i}"), "GET", "/alarms/1");
                    let effect = warrant.evaluate(&zone(), &request).unwrap().effect;
                    let expected = if i % 2 == 0 { Effect::Permit } else { Effect::NotApplicable };
                    assert_eq!(effect, expected);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn cached_decisions_expire_with_the_clock() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryPrivilegeStore::new());
    let mut config = WarrantConfig::default();
    config.decision_cache.ttl_seconds = 60;
    let warrant = Warrant::builder(config)
        .with_clock(clock.clone())
        .with_privilege_store(store.clone())
        .build()
        .unwrap();
    warrant.upsert_policy_set(&zone(), admin_only()).unwrap();
    warrant.upsert_subject(&zone(), admin("bob")).unwrap();

    let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/1");
    assert!(warrant.evaluate(&zone(), &request).unwrap().is_permit());

    // Mutating the shared store directly bypasses the invalidation hooks.
    store.remove(&zone(), EntityKind::Subject, "bob").unwrap();
    assert!(warrant.evaluate(&zone(), &request).unwrap().is_permit());

    clock.advance(Duration::from_secs(60));
    assert_eq!(
        warrant.evaluate(&zone(), &request).unwrap().effect,
        Effect::NotApplicable
    );
}

#[test]
fn configured_zone_uses_external_subject_attributes() {
    let endpoint = "https://attributes.example.com/v1/subjects";
    let provider = Arc::new(StaticAdapterProvider::new());
    provider.register(Arc::new(
        StaticAttributeAdapter::new(endpoint).with_attributes("bob", vec![Attribute::new("issuer1", "role", "admin")].into()),
    ) as Arc<dyn AttributeAdapter>);

    let mut config = WarrantConfig::default();
    config.zones.push(ZoneConfig {
        subject_connector: Some(AttributeConnector::new(vec![AdapterConnection::new(endpoint)])),
        ..ZoneConfig::new("zone-1")
    });
    let warrant = Warrant::builder(config).with_adapter_provider(provider).build().unwrap();
    warrant.upsert_policy_set(&zone(), admin_only()).unwrap();

    let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/1");
    let result = warrant.evaluate(&zone(), &request).unwrap();
    assert!(result.is_permit());
    assert!(result.subject_attributes.has_attribute(&Attribute::new("issuer1", "role", "admin")));
}

#[test]
fn failing_adapter_never_permits() {
    let endpoint = "https://attributes.example.com/v1/subjects";
    let provider = Arc::new(StaticAdapterProvider::new());
    provider.register(Arc::new(StaticAttributeAdapter::failing(
        endpoint,
        AdapterError::Failed {
            endpoint: endpoint.into(),
            message: "503 Service Unavailable".into(),
        },
    )) as Arc<dyn AttributeAdapter>);

    let warrant = Warrant::builder(WarrantConfig::default())
        .with_adapter_provider(provider)
        .build()
        .unwrap();
    warrant.set_connectors(
        &zone(),
        ZoneConnectors {
            subject: Some(AttributeConnector::new(vec![AdapterConnection::new(endpoint)])),
            ..ZoneConnectors::default()
        },
    );
    warrant.upsert_policy_set(&zone(), PolicySet::permit_all("permit-all")).unwrap();

    let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/1");
    let error = warrant.evaluate(&zone(), &request).unwrap_err();
    assert!(matches!(
        error,
        WarrantError::Evaluation(PolicyEvaluationError::AttributeRetrieval(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the request, a permit-all zone permits and an empty zone
    /// is not applicable.
    #[test]
    fn permit_all_and_empty_zone(
        subject in "[a-z]{1,8}",
        action in prop::sample::select(vec!["GET", "POST", "DELETE", "MESSAGE"]),
        resource in "(/[a-z0-9]{1,6}){0,4}",
    ) {
        let warrant = Warrant::in_memory().unwrap();
        warrant.upsert_policy_set(&zone(), PolicySet::permit_all("permit-all")).unwrap();
        let request = PolicyEvaluationRequest::new(subject, action, resource);

        prop_assert_eq!(warrant.evaluate(&zone(), &request).unwrap().effect, Effect::Permit);
        prop_assert_eq!(
            warrant.evaluate(&ZoneId::from("empty"), &request).unwrap().effect,
            Effect::NotApplicable
        );
    }
}

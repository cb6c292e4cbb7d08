//! JSON fixtures that populate an engine for one zone.
//!
//! ```json
//! {
//!   "policySets": [{ "name": "alarms", "policies": [...] }],
//!   "subjects": [{ "subjectIdentifier": "bob", "attributes": [...], "parents": [] }],
//!   "resources": [{ "resourceIdentifier": "/sites/sanramon", "attributes": [...] }],
//!   "externalAttributes": {
//!     "subject": { "endpoint": "https://attrs.example.com", "attributes": { "bob": [...] } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use warrant_abac::PolicySet;
use warrant_attributes::{
    AdapterConnection, AdapterError, AttributeAdapter, AttributeConnector, EntityRecord,
    StaticAdapterProvider, StaticAttributeAdapter, ZoneConnectors,
};
use warrant_config::WarrantConfig;
use warrant_types::{AttributeSet, ZoneId};

use crate::error::{Result, WarrantError};
use crate::warrant::Warrant;

/// A map-backed external attribute source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSource {
    pub endpoint: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSet>,
    /// When set, every lookup fails with this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ExternalSource {
    fn adapter(&self) -> StaticAttributeAdapter {
        if let Some(message) = &self.failure {
            return StaticAttributeAdapter::failing(
                self.endpoint.clone(),
                AdapterError::Failed {
                    endpoint: self.endpoint.clone(),
                    message: message.clone(),
                },
            );
        }
        self.attributes
            .iter()
            .fold(StaticAttributeAdapter::new(self.endpoint.clone()), |adapter, (id, attrs)| {
                adapter.with_attributes(id.clone(), attrs.clone())
            })
    }

    fn connector(&self) -> AttributeConnector {
        AttributeConnector::new(vec![AdapterConnection::new(self.endpoint.clone())])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ExternalSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<ExternalSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub policy_sets: Vec<PolicySet>,
    #[serde(default)]
    pub subjects: Vec<EntityRecord>,
    #[serde(default)]
    pub resources: Vec<EntityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_attributes: Option<ExternalAttributes>,
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WarrantError::FixtureRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Builds an engine from `config` and loads this fixture into `zone`.
    ///
    /// External sources become static adapters and the zone's connectors
    /// point at them. Policy sets are validated as they are stored.
    pub fn into_warrant(self, config: WarrantConfig, zone: &ZoneId) -> Result<Warrant> {
        let provider = Arc::new(StaticAdapterProvider::new());
        let external = self.external_attributes.clone().unwrap_or_default();
        for source in [&external.resource, &external.subject].into_iter().flatten() {
            provider.register(Arc::new(source.adapter()) as Arc<dyn AttributeAdapter>);
        }

        let warrant = Warrant::builder(config).with_adapter_provider(provider).build()?;
        if external.resource.is_some() || external.subject.is_some() {
            warrant.set_connectors(
                zone,
                ZoneConnectors {
                    resource: external.resource.as_ref().map(ExternalSource::connector),
                    subject: external.subject.as_ref().map(ExternalSource::connector),
                },
            );
        }
        self.load_into(&warrant, zone)?;
        Ok(warrant)
    }

    /// Stores the fixture's policy sets and entities in `zone`.
    pub fn load_into(self, warrant: &Warrant, zone: &ZoneId) -> Result<()> {
        debug!(
            zone = %zone,
            policy_sets = self.policy_sets.len(),
            subjects = self.subjects.len(),
            resources = self.resources.len(),
            "loading fixture"
        );
        for set in self.policy_sets {
            warrant.upsert_policy_set(zone, set)?;
        }
        for subject in self.subjects {
            warrant.upsert_subject(zone, subject)?;
        }
        for resource in self.resources {
            warrant.upsert_resource(zone, resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use warrant_abac::{Effect, PolicyEvaluationRequest};

    use super::*;

    const FIXTURE: &str = r#"{
        "policySets": [{
            "name": "alarms",
            "policies": [{
                "name": "admins",
                "target": { "action": "GET", "resource": { "uriTemplate": "/alarms/sites/{site}" } },
                "conditions": [{ "condition": "match.single(subject.attributes(\"issuer1\", \"role\"), \"admin\")" }],
                "effect": "PERMIT"
            }]
        }],
        "subjects": [
            { "subjectIdentifier": "bob", "attributes": [{ "issuer": "issuer1", "name": "role", "value": "admin" }] }
        ]
    }"#;

    #[test]
    fn fixture_populates_zone() {
        let zone = ZoneId::from("zone-1");
        let warrant = Fixture::from_json(FIXTURE)
            .unwrap()
            .into_warrant(WarrantConfig::default(), &zone)
            .unwrap();

        let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/sites/sanramon");
        assert_eq!(warrant.evaluate(&zone, &request).unwrap().effect, Effect::Permit);
        assert_eq!(warrant.connectors(&zone), ZoneConnectors::default());
    }

    #[test]
    fn external_subject_source_is_connected() {
        let zone = ZoneId::from("zone-1");
        let mut fixture = Fixture::from_json(FIXTURE).unwrap();
        fixture.subjects.clear();
        fixture.external_attributes = Some(ExternalAttributes {
            subject: Some(ExternalSource {
                endpoint: "https://attrs.example.com".into(),
                attributes: BTreeMap::from([(
                    "bob".to_string(),
                    vec![warrant_types::Attribute::new("issuer1", "role", "admin")].into(),
                )]),
                failure: None,
            }),
            ..ExternalAttributes::default()
        });

        let warrant = fixture.into_warrant(WarrantConfig::default(), &zone).unwrap();
        let request = PolicyEvaluationRequest::new("bob", "GET", "/alarms/sites/sanramon");
        assert!(warrant.evaluate(&zone, &request).unwrap().is_permit());
        assert!(warrant.connectors(&zone).subject.is_some());
    }

    #[test]
    fn fixture_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let fixture = Fixture::from_file(&path).unwrap();
        assert_eq!(fixture.policy_sets[0].name, "alarms");
        assert!(matches!(
            Fixture::from_file(dir.path().join("missing.json")),
            Err(WarrantError::FixtureRead { .. })
        ));
    }

    #[test]
    fn malformed_fixture_is_a_parse_error() {
        assert!(matches!(
            Fixture::from_json("{ \"policySets\": 3 }"),
            Err(WarrantError::FixtureParse(_))
        ));
    }
}

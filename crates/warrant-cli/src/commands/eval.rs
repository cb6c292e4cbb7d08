//! Evaluate a single request against a fixture.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use warrant::{Fixture, PolicyEvaluationRequest, ZoneId};
use warrant_config::WarrantConfig;

pub struct Request {
    pub subject: String,
    pub action: String,
    pub resource: String,
    pub order: Vec<String>,
}

pub fn run(config: WarrantConfig, fixture: &Path, zone: &str, request: Request) -> Result<()> {
    let zone = ZoneId::from(zone);
    let warrant = Fixture::from_file(fixture)
        .and_then(|fixture| fixture.into_warrant(config, &zone))
        .with_context(|| format!("Failed to load fixture {}", fixture.display()))?;

    let request = PolicyEvaluationRequest::new(request.subject, request.action, request.resource)
        .with_order(request.order.into_iter().filter(|name| !name.trim().is_empty()));
    debug!(zone = %zone, subject = %request.subject_identifier, "evaluating request");

    let result = warrant
        .evaluate(&zone, &request)
        .context("Policy evaluation failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

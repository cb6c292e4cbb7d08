//! Policy set validation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use warrant_abac::{PolicySet, policy_set_issues};
use warrant_condition::ConditionShell;

pub fn run(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let set: PolicySet =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse policy set {}", path.display()))?;

    let issues = policy_set_issues(&set, &ConditionShell::uncached());
    if issues.is_empty() {
        println!(
            "Policy set '{}' is valid ({} policies)",
            set.name,
            set.policies.len()
        );
        return Ok(());
    }

    for issue in &issues {
        eprintln!("error: {issue}");
    }
    bail!("Policy set '{}' has {} error(s)", set.name, issues.len());
}

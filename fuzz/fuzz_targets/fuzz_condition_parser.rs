#![no_main]

use libfuzzer_sys::fuzz_target;
use warrant_condition::{ConditionContext, ConditionShell};
use warrant_types::{Attribute, AttributeSet};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing must never panic, only return Err.
    let shell = ConditionShell::uncached();
    if shell.validate(source).is_err() {
        return;
    }

    let attributes: AttributeSet = vec![Attribute::new("issuer1", "role", "admin")].into();
    let ctx = ConditionContext {
        resource_attributes: &attributes,
        subject_attributes: &attributes,
        resource_uri: "/alarms/sites/sanramon",
        resource_uri_template: None,
    };

    // Evaluation is deterministic.
    let first = shell.evaluate(source, &ctx);
    let second = shell.evaluate(source, &ctx);
    assert_eq!(first, second, "condition {source:?} evaluated differently twice");
});

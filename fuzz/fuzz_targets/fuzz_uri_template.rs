#![no_main]

use libfuzzer_sys::fuzz_target;
use warrant_types::{UriTemplate, canonicalize};

fuzz_target!(|input: (String, String)| {
    let (template, uri) = input;

    let canonical = canonicalize(&uri);
    assert_eq!(canonicalize(&canonical), canonical, "canonicalize is not idempotent for {uri:?}");

    let Ok(template) = UriTemplate::new(&template) else {
        return;
    };
    let matched = template.matches(&canonical);
    let extracted = template.extract(&canonical);
    assert_eq!(matched, extracted.is_some());

    if let Some(values) = extracted {
        for name in template.variables() {
            assert_eq!(template.variable(&canonical, name).as_ref(), values.get(name));
        }
    }
});

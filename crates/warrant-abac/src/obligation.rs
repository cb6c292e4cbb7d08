//! Obligations returned alongside a decision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named value substituted into an action template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgument {
    pub name: String,
    pub value: String,
}

/// Template for an obligation, declared once per policy set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationExpression {
    pub id: String,
    pub action_template: Value,
    #[serde(default)]
    pub action_arguments: Vec<ActionArgument>,
}

impl ObligationExpression {
    pub fn new(id: impl Into<String>, action_template: Value) -> Self {
        Self {
            id: id.into(),
            action_template,
            action_arguments: Vec::new(),
        }
    }

    /// Adds an argument (builder pattern).
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.action_arguments.push(ActionArgument {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Replaces every `{name}` placeholder in the template's string leaves.
    ///
    /// Object keys are left alone. Placeholders without an argument stay in
    /// place.
    pub fn resolve(&self) -> Obligation {
        let arguments: HashMap<&str, &str> = self
            .action_arguments
            .iter()
            .map(|argument| (argument.name.as_str(), argument.value.as_str()))
            .collect();
        Obligation {
            id: self.id.clone(),
            action: substitute(&self.action_template, &arguments),
        }
    }
}

/// A resolved obligation the caller must fulfil.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: String,
    pub action: Value,
}

fn substitute(value: &Value, arguments: &HashMap<&str, &str>) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_text(text, arguments)),
        Value::Array(items) => Value::Array(items.iter().map(|item| substitute(item, arguments)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), substitute(item, arguments)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_text(text: &str, arguments: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match arguments.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_placeholders_in_nested_strings() {
        let expression = ObligationExpression::new(
            "notify",
            json!({
                "operation": "add",
                "path": "/audit/{site}",
                "value": ["{user} at {site}", 3, true],
            }),
        )
        .with_argument("site", "sanramon")
        .with_argument("user", "bob");

        let obligation = expression.resolve();
        assert_eq!(obligation.id, "notify");
        assert_eq!(
            obligation.action,
            json!({
                "operation": "add",
                "path": "/audit/sanramon",
                "value": ["bob at sanramon", 3, true],
            })
        );
    }

    #[test]
    fn unknown_and_unclosed_placeholders_are_kept() {
        let expression = ObligationExpression::new("o", json!("{missing} and {open"));
        assert_eq!(expression.resolve().action, json!("{missing} and {open"));
    }

    #[test]
    fn keys_are_not_substituted() {
        let expression =
            ObligationExpression::new("o", json!({ "{k}": "{k}" })).with_argument("k", "v");
        assert_eq!(expression.resolve().action, json!({ "{k}": "v" }));
    }
}

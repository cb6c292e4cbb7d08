//! Tree-walking interpreter.

use std::collections::BTreeSet;

use warrant_types::{AttributeSet, EntityKind, UriTemplate};

use crate::ast::{BinaryOp, Expr, Method};
use crate::error::{ConditionError, Result};
use crate::value::{Value, mismatch};

/// Inputs bound to `resource` and `subject` while a condition runs.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub resource_attributes: &'a AttributeSet,
    pub subject_attributes: &'a AttributeSet,
    /// The request resource URI, the source of `uriVariable` lookups.
    pub resource_uri: &'a str,
    /// Template of the policy being evaluated, if its target declared one.
    pub resource_uri_template: Option<&'a UriTemplate>,
}

impl<'a> ConditionContext<'a> {
    fn attributes(&self, entity: EntityKind) -> &'a AttributeSet {
        match entity {
            EntityKind::Resource => self.resource_attributes,
            EntityKind::Subject => self.subject_attributes,
        }
    }

    /// Both bound objects read URI variables from the resource URI.
    /// A missing template or variable yields an empty string.
    fn uri_variable(&self, name: &str) -> String {
        self.resource_uri_template
            .and_then(|template| template.variable(self.resource_uri, name))
            .unwrap_or_default()
    }
}

impl Expr {
    /// Evaluates this expression against `ctx`.
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<Value> {
        match self {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::List(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    set.insert(item.evaluate(ctx)?.into_text("list element")?);
                }
                Ok(Value::Set(set))
            }

            Expr::Not(operand) => Ok(Value::Bool(!operand.evaluate(ctx)?.into_bool("'!'")?)),
            Expr::Negate(operand) => Ok(Value::Number(-operand.evaluate(ctx)?.into_number("unary '-'")?)),

            Expr::And(operands) => {
                for operand in operands {
                    if !operand.evaluate(ctx)?.into_bool("'&&'")? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(operands) => {
                for operand in operands {
                    if operand.evaluate(ctx)?.into_bool("'||'")? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }

            Expr::Binary { op, left, right } => {
                binary(*op, left.evaluate(ctx)?, right.evaluate(ctx)?)
            }

            Expr::Attributes {
                entity,
                issuer,
                name,
            } => {
                let issuer = issuer.evaluate(ctx)?.into_text("attributes issuer")?;
                let name = name.evaluate(ctx)?.into_text("attributes name")?;
                Ok(Value::Set(ctx.attributes(*entity).values(&issuer, &name)))
            }
            Expr::UriVariable { name, .. } => {
                let name = name.evaluate(ctx)?.into_text("uriVariable name")?;
                Ok(Value::String(ctx.uri_variable(&name)))
            }

            Expr::MatchAny(left, right) => {
                let left = left.evaluate(ctx)?.into_set("match.any")?;
                let right = right.evaluate(ctx)?.into_set("match.any")?;
                Ok(Value::Bool(!left.is_disjoint(&right)))
            }
            Expr::MatchSingle(set, value) => {
                let set = set.evaluate(ctx)?.into_set("match.single")?;
                let value = value.evaluate(ctx)?.into_text("match.single")?;
                Ok(Value::Bool(set.contains(&value)))
            }

            Expr::Method {
                receiver,
                method,
                args,
            } => {
                let receiver = receiver.evaluate(ctx)?;
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx))
                    .collect::<Result<Vec<_>>>()?;
                call(receiver, *method, args)
            }
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    let operation = format!("'{op}'");
    match op {
        BinaryOp::Equal => Ok(Value::Bool(equals(&left, &right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!equals(&left, &right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                (Value::Number(_) | Value::String(_), other) => {
                    return Err(mismatch(&operation, left.type_name(), other));
                }
                (other, _) => return Err(mismatch(&operation, "number or string", other)),
            };
            // NaN compares false under every relational operator.
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Less => ordering.is_lt(),
                BinaryOp::LessEqual => ordering.is_le(),
                BinaryOp::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), right @ (Value::String(_) | Value::Number(_))) => {
                Ok(Value::String(a + &right.into_text(&operation)?))
            }
            (left @ Value::Number(_), Value::String(b)) => {
                Ok(Value::String(left.into_text(&operation)? + &b))
            }
            (Value::Number(_) | Value::String(_), other) | (other, _) => {
                Err(mismatch(&operation, "number or string", &other))
            }
        },
        BinaryOp::Subtract => {
            let a = left.into_number(&operation)?;
            let b = right.into_number(&operation)?;
            Ok(Value::Number(a - b))
        }
    }
}

/// Values of different types are never equal.
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Set(a), Value::Set(b)) => a == b,
        _ => false,
    }
}

fn call(receiver: Value, method: Method, args: Vec<Value>) -> Result<Value> {
    let operation = format!("{}.{method}", receiver.type_name());
    let mut args = args.into_iter();
    let mut arg = |expected: &'static str| -> Result<Value> {
        args.next().ok_or_else(|| ConditionError::TypeMismatch {
            operation: operation.clone(),
            expected,
            found: "nothing",
        })
    };

    match (receiver, method) {
        (Value::Set(set), Method::Contains) => {
            let needle = arg("string")?.into_text(&format!("set.{method}"))?;
            Ok(Value::Bool(set.contains(&needle)))
        }
        (Value::Set(set), Method::ContainsAll) => {
            let needles = arg("set")?.into_set(&format!("set.{method}"))?;
            Ok(Value::Bool(needles.is_subset(&set)))
        }
        (Value::Set(set), Method::IsEmpty) => Ok(Value::Bool(set.is_empty())),
        (Value::Set(set), Method::Size) => Ok(Value::Number(set.len() as f64)),

        (Value::String(s), Method::Contains) => {
            let needle = arg("string")?.into_text(&format!("string.{method}"))?;
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        (Value::String(s), Method::StartsWith) => {
            let prefix = arg("string")?.into_text(&format!("string.{method}"))?;
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        (Value::String(s), Method::EndsWith) => {
            let suffix = arg("string")?.into_text(&format!("string.{method}"))?;
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        (Value::String(s), Method::EqualsIgnoreCase) => {
            let other = arg("string")?.into_text(&format!("string.{method}"))?;
            Ok(Value::Bool(s.to_lowercase() == other.to_lowercase()))
        }
        (Value::String(s), Method::ToLowerCase) => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), Method::ToUpperCase) => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), Method::Length) => Ok(Value::Number(s.chars().count() as f64)),
        (Value::String(s), Method::IsEmpty) => Ok(Value::Bool(s.is_empty())),

        (receiver, Method::ContainsAll | Method::Size) => Err(mismatch(&operation, "set", &receiver)),
        (receiver, _) => Err(mismatch(&operation, "string", &receiver)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use test_case::test_case;
    use warrant_types::Attribute;

    fn eval_with(source: &str, ctx: &ConditionContext<'_>) -> Result<Value> {
        parse(source).unwrap().evaluate(ctx)
    }

    fn eval(source: &str) -> Result<Value> {
        let subject: AttributeSet = vec![
            Attribute::new("issuer1", "role", "admin"),
            Attribute::new("issuer1", "role", "operator"),
            Attribute::new("issuer1", "site", "sanramon"),
        ]
        .into();
        let resource: AttributeSet = vec![
            Attribute::new("issuer1", "site", "sanramon"),
            Attribute::new("issuer1", "site", "boston"),
        ]
        .into();
        let template = UriTemplate::new("/alarms/sites/{site}").unwrap();
        let ctx = ConditionContext {
            resource_attributes: &resource,
            subject_attributes: &subject,
            resource_uri: "/alarms/sites/SanRamon",
            resource_uri_template: Some(&template),
        };
        eval_with(source, &ctx)
    }

    #[test_case(r#"match.single(subject.attributes("issuer1", "role"), "admin")"#, true; "single member")]
    #[test_case(r#"match.single(subject.attributes("issuer1", "role"), "guest")"#, false; "single non member")]
    #[test_case(r#"match.any(subject.attributes("issuer1", "site"), resource.attributes("issuer1", "site"))"#, true; "any intersect")]
    #[test_case(r#"match.any(subject.attributes("issuer1", "role"), resource.attributes("issuer1", "site"))"#, false; "any disjoint")]
    #[test_case(r#"resource.uriVariable("site") == "SanRamon""#, true; "uri variable")]
    #[test_case(r#"subject.uriVariable("site").equalsIgnoreCase("sanramon")"#, true; "subject reads resource uri")]
    #[test_case(r#"resource.uriVariable("missing").isEmpty()"#, true; "missing variable is empty")]
    #[test_case(r#"subject.attributes("issuer1", "role").size() == 2"#, true; "set size")]
    #[test_case(r#"subject.attributes("issuer1", "role").containsAll(["admin", "operator"])"#, true; "contains all")]
    #[test_case(r#"subject.attributes("nobody", "role").isEmpty()"#, true; "unknown issuer")]
    #[test_case(r#"!(1 + 2 > 3) && "ab" + "c" == "abc""#, true; "arithmetic and concat")]
    #[test_case(r#"false || 2 - 1 >= 1"#, true; "or with relational")]
    #[test_case(r#""site-" + 7 == "site-7""#, true; "string number concat")]
    #[test_case(r#"[] == []"#, true; "empty lists equal")]
    #[test_case(r#"1 == "1""#, false; "mixed types never equal")]
    fn evaluates(source: &str, expected: bool) {
        assert_eq!(eval(source), Ok(Value::Bool(expected)));
    }

    #[test]
    fn short_circuit_skips_type_errors() {
        assert_eq!(eval("false && 1"), Ok(Value::Bool(false)));
        assert_eq!(eval("true || 'x'"), Ok(Value::Bool(true)));
    }

    #[test_case("!'x'"; "not on string")]
    #[test_case("1 && true"; "and on number")]
    #[test_case("'a' < 1"; "mixed relational")]
    #[test_case("[true]"; "boolean list element")]
    #[test_case("true.size()"; "method on boolean")]
    #[test_case("'abc'.containsAll(['a'])"; "set method on string")]
    #[test_case("[].startsWith('a')"; "string method on set")]
    #[test_case("'a' - 'b'"; "subtract strings")]
    fn type_mismatches(source: &str) {
        assert!(
            matches!(eval(source), Err(ConditionError::TypeMismatch { .. })),
            "{source} should be a type mismatch"
        );
    }

    #[test]
    fn uri_variable_without_template_is_empty() {
        let empty = AttributeSet::new();
        let ctx = ConditionContext {
            resource_attributes: &empty,
            subject_attributes: &empty,
            resource_uri: "/anything",
            resource_uri_template: None,
        };
        assert_eq!(
            eval_with(r#"resource.uriVariable("site")"#, &ctx),
            Ok(Value::String(String::new()))
        );
    }
}

//! # warrant-condition: Policy conditions for `Warrant`
//!
//! Conditions are boolean expressions evaluated for policies whose target
//! already matched. The language is closed: three bound objects and a fixed
//! set of operators and methods.
//!
//! ```text
//! match.single(subject.attributes("https://acs.example.com", "role"), "admin")
//! match.any(subject.attributes("iss", "site"), resource.attributes("iss", "site"))
//! resource.uriVariable("site").startsWith("san") && !subject.attributes("iss", "group").isEmpty()
//! ```
//!
//! | Object | Members |
//! |---|---|
//! | `resource`, `subject` | `attributes(issuer, name)` → set, `uriVariable(name)` → string |
//! | `match` | `any(set, set)`, `single(set, value)` |
//! | sets | `contains`, `containsAll`, `isEmpty`, `size` |
//! | strings | `contains`, `startsWith`, `endsWith`, `equalsIgnoreCase`, `toLowerCase`, `toUpperCase`, `length`, `isEmpty` |
//!
//! Anything else fails to parse; nothing outside the tree can be reached at
//! evaluation time.
//!
//! # Example
//!
//! ```
//! use warrant_condition::{ConditionContext, ConditionShell};
//! use warrant_types::{Attribute, AttributeSet};
//!
//! let subject: AttributeSet = vec![Attribute::new("issuer1", "role", "admin")].into();
//! let resource = AttributeSet::new();
//! let ctx = ConditionContext {
//!     resource_attributes: &resource,
//!     subject_attributes: &subject,
//!     resource_uri: "/alarms/sites/sanramon",
//!     resource_uri_template: None,
//! };
//!
//! let shell = ConditionShell::default();
//! let permitted = shell
//!     .evaluate(r#"match.single(subject.attributes("issuer1", "role"), "admin")"#, &ctx)
//!     .unwrap();
//! assert!(permitted);
//! ```

pub mod ast;
pub mod cache;
pub mod error;
pub mod interpreter;
mod lexer;
pub mod parser;
pub mod shell;
pub mod value;

pub use ast::{BinaryOp, Expr, Method};
pub use cache::{ConditionCache, InMemoryConditionCache, NoOpConditionCache};
pub use error::{ConditionError, Result};
pub use interpreter::ConditionContext;
pub use parser::{MAX_EXPRESSION_DEPTH, MAX_EXPRESSION_LENGTH, parse};
pub use shell::ConditionShell;
pub use value::Value;

/// A parsed condition together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    source: String,
    expr: Expr,
}

impl CompiledCondition {
    /// Parses `source`.
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates the condition, requiring a boolean result.
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<bool> {
        match self.expr.evaluate(ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean {
                found: other.type_name(),
            }),
        }
    }
}

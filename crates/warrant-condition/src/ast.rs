//! Abstract syntax tree for conditions.
//!
//! The tree is closed: every node names a capability the language grants.
//! There is no node for arbitrary identifiers, property access, or dynamic
//! dispatch, so a parsed condition can only do what these variants describe.

use std::fmt;

use warrant_types::EntityKind;

/// A condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Number(f64),
    String(String),
    /// `[a, b, ...]`, evaluated to a set of strings.
    List(Vec<Expr>),

    Not(Box<Expr>),
    Negate(Box<Expr>),

    /// Short-circuit conjunction of two or more operands.
    And(Vec<Expr>),
    /// Short-circuit disjunction of two or more operands.
    Or(Vec<Expr>),

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `resource.attributes(issuer, name)` or `subject.attributes(issuer, name)`.
    Attributes {
        entity: EntityKind,
        issuer: Box<Expr>,
        name: Box<Expr>,
    },

    /// `resource.uriVariable(name)` or `subject.uriVariable(name)`.
    UriVariable { entity: EntityKind, name: Box<Expr> },

    /// `match.any(a, b)`: the two sets intersect.
    MatchAny(Box<Expr>, Box<Expr>),

    /// `match.single(set, value)`: `value` is a member of `set`.
    MatchSingle(Box<Expr>, Box<Expr>),

    /// A whitelisted method call on a value.
    Method {
        receiver: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Add => "+",
            Self::Subtract => "-",
        };
        f.write_str(symbol)
    }
}

/// Methods callable on values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Contains,
    ContainsAll,
    IsEmpty,
    Size,
    StartsWith,
    EndsWith,
    EqualsIgnoreCase,
    ToLowerCase,
    ToUpperCase,
    Length,
}

impl Method {
    const ALL: [Method; 10] = [
        Method::Contains,
        Method::ContainsAll,
        Method::IsEmpty,
        Method::Size,
        Method::StartsWith,
        Method::EndsWith,
        Method::EqualsIgnoreCase,
        Method::ToLowerCase,
        Method::ToUpperCase,
        Method::Length,
    ];

    /// Looks up a method by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::ContainsAll => "containsAll",
            Self::IsEmpty => "isEmpty",
            Self::Size => "size",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::EqualsIgnoreCase => "equalsIgnoreCase",
            Self::ToLowerCase => "toLowerCase",
            Self::ToUpperCase => "toUpperCase",
            Self::Length => "length",
        }
    }

    /// Number of arguments the method takes.
    pub fn arity(self) -> usize {
        match self {
            Self::IsEmpty | Self::Size | Self::ToLowerCase | Self::ToUpperCase | Self::Length => 0,
            Self::Contains
            | Self::ContainsAll
            | Self::StartsWith
            | Self::EndsWith
            | Self::EqualsIgnoreCase => 1,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

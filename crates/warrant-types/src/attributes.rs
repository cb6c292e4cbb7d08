//! Attribute types for ABAC evaluation.
//!
//! An [`Attribute`] is an `(issuer, name, value)` triple. Its [`AttributeType`]
//! drops the value and is what policy targets test for presence. An
//! [`AttributeSet`] keeps both views in sync.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Type
// ============================================================================

/// The `(issuer, name)` pair identifying a kind of attribute, independent of value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeType {
    pub issuer: String,
    pub name: String,
}

impl AttributeType {
    pub fn new(issuer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            name: name.into(),
        }
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.issuer, self.name)
    }
}

// ============================================================================
// Attribute
// ============================================================================

/// A single attribute value asserted by an issuer.
///
/// Identity and equality cover all three fields, so the same name from two
/// issuers, or two values of the same type, are distinct attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub issuer: String,
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(issuer: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the `(issuer, name)` type of this attribute.
    pub fn attribute_type(&self) -> AttributeType {
        AttributeType::new(self.issuer.clone(), self.name.clone())
    }

    fn is_of(&self, issuer: &str, name: &str) -> bool {
        self.issuer == issuer && self.name == name
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.issuer, self.name, self.value)
    }
}

// ============================================================================
// Attribute Set
// ============================================================================

/// A set of attributes with a derived set of their types.
///
/// Serialized as a plain list of attributes; the type index is rebuilt on
/// deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct AttributeSet {
    attributes: BTreeSet<Attribute>,
    types: BTreeSet<AttributeType>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, returning `true` if it was not already present.
    pub fn insert(&mut self, attribute: Attribute) -> bool {
        self.types.insert(attribute.attribute_type());
        self.attributes.insert(attribute)
    }

    /// Adds every attribute of `other` to this set.
    ///
    /// Returns `true` if membership changed.
    pub fn merge(&mut self, other: &AttributeSet) -> bool {
        let mut changed = false;
        for attribute in &other.attributes {
            changed |= self.insert(attribute.clone());
        }
        changed
    }

    /// Consuming variant of [`merge`](Self::merge).
    pub fn union(mut self, other: &AttributeSet) -> Self {
        self.merge(other);
        self
    }

    pub fn has_type(&self, attribute_type: &AttributeType) -> bool {
        self.types.contains(attribute_type)
    }

    pub fn has_all_types<'a>(&self, types: impl IntoIterator<Item = &'a AttributeType>) -> bool {
        types.into_iter().all(|t| self.has_type(t))
    }

    pub fn has_attribute(&self, attribute: &Attribute) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn has_all_attributes<'a>(
        &self,
        attributes: impl IntoIterator<Item = &'a Attribute>,
    ) -> bool {
        attributes.into_iter().all(|a| self.has_attribute(a))
    }

    /// Returns every value asserted for `(issuer, name)`.
    pub fn values(&self, issuer: &str, name: &str) -> BTreeSet<String> {
        self.attributes
            .iter()
            .filter(|a| a.is_of(issuer, name))
            .map(|a| a.value.clone())
            .collect()
    }

    pub fn types(&self) -> &BTreeSet<AttributeType> {
        &self.types
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<Vec<Attribute>> for AttributeSet {
    fn from(attributes: Vec<Attribute>) -> Self {
        attributes.into_iter().collect()
    }
}

impl From<AttributeSet> for Vec<Attribute> {
    fn from(set: AttributeSet) -> Self {
        set.attributes.into_iter().collect()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Attribute> for AttributeSet {
    fn extend<I: IntoIterator<Item = Attribute>>(&mut self, iter: I) {
        for attribute in iter {
            self.insert(attribute);
        }
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Attribute;
    type IntoIter = std::collections::btree_set::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

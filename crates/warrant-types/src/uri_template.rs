//! Resource URI templates.
//!
//! A template is literal text interleaved with variables:
//!
//! - `{name}` matches any run of characters, including `/`
//! - `{name:regex}` matches the given pattern
//!
//! Matching is anchored at both ends and always runs against the
//! [canonical](canonicalize) form of the URI, so `/a//b/./c` and `/a/b/c`
//! are the same resource.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Variable that an attribute URI template uses to carve out the sub-URI
/// whose attributes should be resolved.
pub const ATTRIBUTE_URI_VARIABLE: &str = "attribute_uri";

const DEFAULT_VARIABLE_PATTERN: &str = ".*";

/// Error compiling a URI template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriTemplateError {
    #[error("unclosed '{{' at byte {position} in URI template '{template}'")]
    UnclosedVariable { template: String, position: usize },

    #[error("empty variable name at byte {position} in URI template '{template}'")]
    EmptyVariableName { template: String, position: usize },

    #[error("invalid pattern for variable '{variable}' in URI template '{template}': {reason}")]
    InvalidPattern {
        template: String,
        variable: String,
        reason: String,
    },
}

/// A compiled resource URI template.
#[derive(Clone)]
pub struct UriTemplate {
    template: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compiles a template.
    pub fn new(template: &str) -> Result<Self, UriTemplateError> {
        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((position, ch)) = chars.next() {
            if ch != '{' {
                literal.push(ch);
                continue;
            }

            pattern.push_str(&regex::escape(&literal));
            literal.clear();

            // Braces nest so that `{id:[0-9]{3}}` keeps its quantifier.
            let mut depth = 1usize;
            let mut body = String::new();
            for (_, c) in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    break;
                }
                body.push(c);
            }
            if depth != 0 {
                return Err(UriTemplateError::UnclosedVariable {
                    template: template.to_string(),
                    position,
                });
            }

            let (name, variable_pattern) = match body.split_once(':') {
                Some((name, custom)) => (name.trim(), custom),
                None => (body.trim(), DEFAULT_VARIABLE_PATTERN),
            };
            if name.is_empty() {
                return Err(UriTemplateError::EmptyVariableName {
                    template: template.to_string(),
                    position,
                });
            }

            // Group names are positional so that variable names need not be
            // valid regex identifiers.
            pattern.push_str(&format!("(?P<v{}>{variable_pattern})", variables.len()));
            variables.push(name.to_string());
        }

        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| UriTemplateError::InvalidPattern {
            template: template.to_string(),
            variable: variables.last().cloned().unwrap_or_default(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            variables,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Variable names in declaration order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    /// Returns `true` if the canonical form of `uri` matches this template.
    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(&canonicalize(uri))
    }

    /// Extracts every variable from `uri`, or `None` if it does not match.
    ///
    /// When a variable name repeats, the last occurrence wins.
    pub fn extract(&self, uri: &str) -> Option<BTreeMap<String, String>> {
        let canonical = canonicalize(uri);
        let captures = self.regex.captures(&canonical)?;
        let mut values = BTreeMap::new();
        for (index, name) in self.variables.iter().enumerate() {
            if let Some(m) = captures.name(&format!("v{index}")) {
                values.insert(name.clone(), m.as_str().to_string());
            }
        }
        Some(values)
    }

    /// Extracts a single variable from `uri`.
    pub fn variable(&self, uri: &str, name: &str) -> Option<String> {
        self.extract(uri)?.remove(name)
    }
}

impl fmt::Debug for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriTemplate")
            .field("template", &self.template)
            .field("variables", &self.variables)
            .finish()
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for UriTemplate {}

/// Normalizes a URI path: collapses repeated slashes and resolves `.` and
/// `..` segments. A trailing slash is preserved.
///
/// `..` never climbs above the root of an absolute path.
pub fn canonicalize(uri: &str) -> String {
    let absolute = uri.starts_with('/');
    let trailing = uri.len() > 1 && (uri.ends_with('/') || uri.ends_with("/.") || uri.ends_with("/.."));

    let mut segments: Vec<&str> = Vec::new();
    for segment in uri.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut canonical = String::with_capacity(uri.len());
    if absolute {
        canonical.push('/');
    }
    canonical.push_str(&segments.join("/"));
    if trailing && !segments.is_empty() {
        canonical.push('/');
    }
    canonical
}

// ============================================================================
// Tests
// ============================================================================

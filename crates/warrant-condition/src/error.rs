//! Error types for condition parsing and evaluation.

use thiserror::Error;

/// Result type for condition operations.
pub type Result<T> = std::result::Result<T, ConditionError>;

/// Errors raised while compiling or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    /// The condition text is empty or whitespace.
    #[error("condition expression must not be blank")]
    BlankExpression,

    /// The text does not belong to the condition language.
    #[error("condition parsing failed at byte {position}: {message}")]
    Parsing { position: usize, message: String },

    #[error("condition expression is {length} bytes long, maximum is {max}")]
    ExpressionTooLong { length: usize, max: usize },

    #[error("condition expression nests deeper than {max} levels")]
    ExpressionTooDeep { max: usize },

    /// An operator or method received a value of the wrong type.
    #[error("{operation} expects {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The condition evaluated to something other than a boolean.
    #[error("condition must evaluate to a boolean, found {found}")]
    NotBoolean { found: &'static str },
}

impl ConditionError {
    pub(crate) fn parsing(position: usize, message: impl Into<String>) -> Self {
        Self::Parsing {
            position,
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised before any evaluation happens.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::BlankExpression
                | Self::Parsing { .. }
                | Self::ExpressionTooLong { .. }
                | Self::ExpressionTooDeep { .. }
        )
    }
}

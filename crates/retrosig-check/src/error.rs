//! Error taxonomy for declaration, realisation and call-time validation.
//!
//! [`RuntimeError`] is what every call through the [`Runtime`](crate::runtime::Runtime)
//! returns. Declaration-time errors (builder, shape, override) wrap the
//! component errors defined next to their components; call-time validation
//! failures carry a structured [`CallValidationError`].

use std::fmt;
use std::sync::Arc;

use retrosig_core::error::CoreError;
use retrosig_core::id::{MethodKey, SourceLocation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::declaration::DeclarationError;
use crate::overrides::OverrideError;
use crate::signature::ShapeMismatchError;

/// What a failed call-time check was checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationKind {
    Parameter,
    BlockParameter,
    ReturnValue,
    Bind,
}

impl ValidationKind {
    pub fn label(self) -> &'static str {
        match self {
            ValidationKind::Parameter => "Parameter",
            ValidationKind::BlockParameter => "Block parameter",
            ValidationKind::ReturnValue => "Return value",
            ValidationKind::Bind => "Bind",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single failed call-time check.
///
/// Serializable so handlers can log it as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallValidationError {
    pub method: MethodKey,
    /// The predicate's mismatch description.
    pub message: String,
    /// `message` decorated with kind, name, caller and definition.
    pub pretty_message: String,
    pub kind: ValidationKind,
    /// Parameter name; `None` for return values and bind checks.
    pub name: Option<Arc<str>>,
    /// The expected type, rendered.
    #[serde(rename = "type")]
    pub expected: String,
    /// The offending value, inspected.
    pub value: String,
    pub caller: SourceLocation,
    pub definition: SourceLocation,
}

impl CallValidationError {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: MethodKey,
        message: String,
        kind: ValidationKind,
        name: Option<Arc<str>>,
        expected: String,
        value: String,
        caller: SourceLocation,
        definition: SourceLocation,
    ) -> Self {
        let pretty_message = match &name {
            Some(name) => format!(
                "{} '{}': {}\nCaller: {}\nDefinition: {}",
                kind, name, message, caller, definition
            ),
            None => format!(
                "{}: {}\nCaller: {}\nDefinition: {}",
                kind, message, caller, definition
            ),
        };
        CallValidationError {
            method,
            message,
            pretty_message,
            kind,
            name,
            expected,
            value,
            caller,
            definition,
        }
    }
}

impl fmt::Display for CallValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_message)
    }
}

impl std::error::Error for CallValidationError {}

/// Errors surfaced by the runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("{location}: Error interpreting `sig`:\n  {error}\n")]
    Declaration {
        #[source]
        error: DeclarationError,
        location: SourceLocation,
    },

    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    CallValidation(#[from] Box<CallValidationError>),

    #[error("wrong number of arguments (given {given}, expected {expected})")]
    ArgumentCount { given: usize, expected: String },

    #[error("The method `{method}` on {owner} is declared as `abstract`. It does not have an implementation.")]
    AbstractNotImplemented { method: String, owner: String },

    #[error("A previous invocation of {method} raised, and the current one succeeded. Please don't do that.")]
    StickyFailure { method: String },

    #[error("undefined method `{name}' for {receiver}")]
    NoMethod { name: String, receiver: String },

    #[error("private method `{name}' called for {receiver}")]
    PrivateMethod { name: String, receiver: String },

    /// Misuse of the `sig`/define protocol.
    #[error("{0}")]
    SigUsage(String),

    #[error("`sig` not present for method `{method}` but you're trying to run it anyways.")]
    MissingSignature { method: String },

    /// Raised by a method body.
    #[error("{0}")]
    Raised(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RuntimeError {
    pub fn raised(message: impl Into<String>) -> Self {
        RuntimeError::Raised(message.into())
    }

    /// The call-time validation record, if this is a validation failure.
    pub fn as_call_validation(&self) -> Option<&CallValidationError> {
        match self {
            RuntimeError::CallValidation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CallValidationError> for RuntimeError {
    fn from(err: CallValidationError) -> Self {
        RuntimeError::CallValidation(Box::new(err))
    }
}

use retrosig_core::id::SourceLocation;
use thiserror::Error;

/// A declaration that is incompatible with the definition it overrides.
///
/// Every variant carries the child's definition site and, where there is
/// one, the base definition's.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// Mode legality (override/overridable/abstract/implementation).
    #[error("{message}")]
    Mode {
        message: String,
        base: Option<SourceLocation>,
        child: SourceLocation,
    },

    /// Parameter shapes do not line up.
    #[error("{message}")]
    Shape {
        message: String,
        base: SourceLocation,
        child: SourceLocation,
    },

    /// Argument types are not contravariant or the return type is not
    /// covariant.
    #[error("{message}")]
    TypeVariance {
        message: String,
        base: SourceLocation,
        child: SourceLocation,
    },
}

impl OverrideError {
    pub fn message(&self) -> &str {
        match self {
            OverrideError::Mode { message, .. }
            | OverrideError::Shape { message, .. }
            | OverrideError::TypeVariance { message, .. } => message,
        }
    }

    pub fn base_location(&self) -> Option<&SourceLocation> {
        match self {
            OverrideError::Mode { base, .. } => base.as_ref(),
            OverrideError::Shape { base, .. } | OverrideError::TypeVariance { base, .. } => Some(base),
        }
    }

    pub fn child_location(&self) -> &SourceLocation {
        match self {
            OverrideError::Mode { child, .. }
            | OverrideError::Shape { child, .. }
            | OverrideError::TypeVariance { child, .. } => child,
        }
    }
}

//! Core error types for retrosig-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the class registry.

use crate::id::ClassId;
use thiserror::Error;

/// Core errors produced by the retrosig-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Attempting to register a class or module name that already exists.
    #[error("duplicate class name: '{name}'")]
    DuplicateClassName { name: String },

    /// A ClassId was not found in the registry.
    #[error("class not found: ClassId({id})", id = id.0)]
    ClassNotFound { id: ClassId },

    /// `include` was given something that is not a module.
    #[error("wrong argument type {name} (expected Module)")]
    NotAModule { name: String },

    /// A class was used where a superclass was expected but it is a module.
    #[error("superclass must be a Class ({name} given)")]
    NotAClass { name: String },

    /// Including the module would make the ancestor chain cyclic.
    #[error("cyclic include detected: {module} into {target}")]
    CyclicInclude { module: String, target: String },
}

//! Callables and invocations.
//!
//! A [`Method`] is a real callable as the host defined it: identity,
//! reflected parameters, definition site and a body. Anything installed in a
//! method table implements [`Callable`]; validators wrap a `Method` and are
//! installed in its place.

use std::fmt;
use std::sync::Arc;

use retrosig_core::id::{ClassId, MethodKey, SourceLocation};
use retrosig_core::params::Parameter;
use retrosig_core::value::Value;

use crate::error::RuntimeError;
use crate::runtime::Runtime;

/// Everything a callable needs to know about one call.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub receiver: &'a Value,
    /// Class the method was looked up on (the receiver's class, or its
    /// singleton class for class-level calls).
    pub receiver_class: ClassId,
    /// Owner of the definition being executed. `super` continues after it.
    pub owner: ClassId,
    pub name: &'a str,
    pub args: &'a [Value],
    pub block: Option<&'a Value>,
    pub caller: &'a SourceLocation,
}

impl<'a> Invocation<'a> {
    /// Same call, different arguments.
    pub fn with_args(&self, args: &'a [Value]) -> Invocation<'a> {
        Invocation { args, ..*self }
    }

    /// Same call, resolved to a different definition.
    pub fn with_owner(&self, owner: ClassId) -> Invocation<'a> {
        Invocation { owner, ..*self }
    }
}

/// Anything that can sit in a method table.
pub trait Callable: Send + Sync {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError>;
}

/// Identity and reflected shape of a defined method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub key: MethodKey,
    pub owner_name: Arc<str>,
    pub params: Arc<[Parameter]>,
    pub location: SourceLocation,
}

impl MethodInfo {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn owner(&self) -> ClassId {
        self.key.owner
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_name, self.key.name)
    }
}

type MethodBody = dyn Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync;

/// A real callable: the original body a validator wraps.
#[derive(Clone)]
pub struct Method {
    pub info: MethodInfo,
    body: Arc<MethodBody>,
}

impl Method {
    pub fn new(
        info: MethodInfo,
        body: impl Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Method {
            info,
            body: Arc::new(body),
        }
    }

    pub fn key(&self) -> &MethodKey {
        &self.info.key
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.info.params
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("info", &self.info).finish()
    }
}

impl Callable for Method {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        (self.body)(rt, inv)
    }
}

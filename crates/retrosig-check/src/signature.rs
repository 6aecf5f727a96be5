//! Signatures: a finalized declaration reconciled with the real callable.
//!
//! Construction walks the reflected parameter list and the declared types
//! side by side. Names must match exactly and in order; each parameter then
//! lands in the bucket for its kind (positional, keyword, rest, keyword-rest,
//! block).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use retrosig_core::id::{ClassId, MethodKey};
use retrosig_core::params::{positional_names, ParamKind, Parameter};
use retrosig_core::types::{self, TypeRef};
use retrosig_core::value::Value;
use smallvec::SmallVec;
use thiserror::Error;

use crate::declaration::{Declaration, Returns};
use crate::error::RuntimeError;
use crate::method::MethodInfo;
use crate::mode::{CheckLevel, Mode};

/// A `(name, type)` pair for one declared parameter.
pub type NamedType = (Arc<str>, TypeRef);

/// The declared names do not reconcile with the real parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeMismatchError {
    #[error("The declaration for `{method}` is missing parameter(s): {names}")]
    Missing { method: String, names: String },

    #[error("The declaration for `{method}` has extra parameter(s): {names}")]
    Extra { method: String, names: String },

    #[error(
        "Parameter `{name}` is declared out of order (declared as arg number {declared_at}, \
         defined in the method as arg number {defined_at}).{hint}\nMethod: {method_desc}"
    )]
    OutOfOrder {
        name: String,
        declared_at: usize,
        defined_at: usize,
        hint: &'static str,
        method_desc: String,
    },

    #[error("The method `{method}` has more than one parameter named `{name}`.")]
    Duplicate { method: String, name: String },

    #[error("Required params after optional params are not supported in method declarations. Method: {method_desc}")]
    RequiredAfterOptional { method_desc: String },
}

const KEYWORD_ORDER_HINT: &str = "\n\nNote: Any required keyword arguments must precede any optional keyword \
     arguments. If your method declaration matches your definition, try reordering any \
     optional keyword parameters to the end of the method list.";

/// The immutable contract of one callable.
#[derive(Debug)]
pub struct Signature {
    pub method: MethodInfo,
    /// Required positionals first, then optional ones.
    pub arg_types: SmallVec<[NamedType; 4]>,
    pub req_arg_count: usize,
    pub kwarg_types: IndexMap<Arc<str>, TypeRef>,
    pub req_kwarg_names: Vec<Arc<str>>,
    pub rest: Option<NamedType>,
    pub keyrest: Option<NamedType>,
    pub block: Option<NamedType>,
    pub returns: Returns,
    pub bind: Option<TypeRef>,
    pub mode: Mode,
    pub check_level: CheckLevel,
    pub override_allow_incompatible: bool,
    pub implementation: bool,
    pub soft_notify: Option<Arc<str>>,
    pub generated: bool,
    /// The callable validates its own arguments; never wrapped.
    pub defined_raw: bool,
    /// The parameter list the shape was built from. Usually the method's
    /// own, but forwarders borrow another method's.
    pub parameters: Arc<[Parameter]>,
    ever_failed: AtomicBool,
}

impl Signature {
    /// Builds the signature for `method` from a finalized declaration.
    pub fn new(method: MethodInfo, decl: &Declaration) -> Result<Signature, ShapeMismatchError> {
        let parameters = method.params.clone();
        let mut sig = Signature::build(method, parameters, &decl.params, decl.returns.clone())?;
        sig.bind = decl.bind.clone();
        sig.mode = decl.mode;
        sig.check_level = decl.checked;
        sig.override_allow_incompatible = decl.override_allow_incompatible;
        sig.implementation = decl.implementation;
        sig.soft_notify = decl.soft_notify.clone();
        sig.generated = decl.generated;
        Ok(sig)
    }

    /// A signature for a callable that was never declared: every parameter
    /// and the return are not-typed, and it is never checked.
    pub fn new_untyped(
        method: MethodInfo,
        mode: Mode,
        parameters: Option<Arc<[Parameter]>>,
    ) -> Result<Signature, ShapeMismatchError> {
        let parameters = parameters.unwrap_or_else(|| method.params.clone());
        let not_typed = types::not_typed();
        let mut sig = Signature::empty(method, parameters.clone(), Returns::Type(not_typed.clone()));
        sig.mode = mode;
        sig.check_level = CheckLevel::Never;
        for (param, name) in parameters.iter().zip(positional_names(&parameters)) {
            sig.place(param.kind, name, not_typed.clone())?;
        }
        Ok(sig)
    }

    fn empty(method: MethodInfo, parameters: Arc<[Parameter]>, returns: Returns) -> Signature {
        Signature {
            method,
            arg_types: SmallVec::new(),
            req_arg_count: 0,
            kwarg_types: IndexMap::new(),
            req_kwarg_names: Vec::new(),
            rest: None,
            keyrest: None,
            block: None,
            returns,
            bind: None,
            mode: Mode::Standard,
            check_level: CheckLevel::Always,
            override_allow_incompatible: false,
            implementation: false,
            soft_notify: None,
            generated: false,
            defined_raw: false,
            parameters,
            ever_failed: AtomicBool::new(false),
        }
    }

    fn build(
        method: MethodInfo,
        parameters: Arc<[Parameter]>,
        declared: &IndexMap<Arc<str>, TypeRef>,
        returns: Returns,
    ) -> Result<Signature, ShapeMismatchError> {
        let param_names = effective_names(method.name(), &parameters, declared);
        let method_name = method.name().to_string();

        for (i, name) in param_names.iter().enumerate() {
            if param_names[..i].contains(name) {
                return Err(ShapeMismatchError::Duplicate {
                    method: method_name,
                    name: name.to_string(),
                });
            }
        }

        let missing: Vec<&str> = param_names
            .iter()
            .filter(|n| !declared.contains_key(*n))
            .map(|n| &**n)
            .collect();
        if !missing.is_empty() {
            return Err(ShapeMismatchError::Missing {
                method: method_name,
                names: missing.join(", "),
            });
        }
        let extra: Vec<&str> = declared
            .keys()
            .filter(|n| !param_names.contains(*n))
            .map(|n| &**n)
            .collect();
        if !extra.is_empty() {
            return Err(ShapeMismatchError::Extra {
                method: method_name,
                names: extra.join(", "),
            });
        }

        let mut sig = Signature::empty(method, parameters.clone(), returns);
        for ((param, param_name), (type_name, ty)) in
            parameters.iter().zip(&param_names).zip(declared.iter())
        {
            if type_name != param_name {
                let has_optional_keyword = parameters.iter().any(|p| p.kind == ParamKind::Key);
                let hint = if param.kind == ParamKind::KeyReq && has_optional_keyword {
                    KEYWORD_ORDER_HINT
                } else {
                    ""
                };
                return Err(ShapeMismatchError::OutOfOrder {
                    name: type_name.to_string(),
                    declared_at: declared.get_index_of(type_name).unwrap_or(0) + 1,
                    defined_at: param_names.iter().position(|n| n == type_name).unwrap_or(0) + 1,
                    hint,
                    method_desc: sig.method_desc(),
                });
            }
            sig.place(param.kind, param_name.clone(), ty.clone())?;
        }
        Ok(sig)
    }

    /// Files one parameter under its kind.
    fn place(&mut self, kind: ParamKind, name: Arc<str>, ty: TypeRef) -> Result<(), ShapeMismatchError> {
        match kind {
            ParamKind::Req => {
                if self.arg_types.len() > self.req_arg_count {
                    return Err(ShapeMismatchError::RequiredAfterOptional {
                        method_desc: self.method_desc(),
                    });
                }
                self.arg_types.push((name, ty));
                self.req_arg_count += 1;
            }
            ParamKind::Opt => self.arg_types.push((name, ty)),
            ParamKind::KeyReq => {
                self.req_kwarg_names.push(name.clone());
                self.kwarg_types.insert(name, ty);
            }
            ParamKind::Key => {
                self.kwarg_types.insert(name, ty);
            }
            ParamKind::Rest => self.rest = Some((name, ty)),
            ParamKind::KeyRest => self.keyrest = Some((name, ty)),
            ParamKind::Block => self.block = Some((name, ty)),
        }
        Ok(())
    }

    pub fn key(&self) -> &MethodKey {
        &self.method.key
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    pub fn owner(&self) -> ClassId {
        self.method.owner()
    }

    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }

    pub fn has_rest(&self) -> bool {
        self.rest.is_some()
    }

    pub fn has_keyrest(&self) -> bool {
        self.keyrest.is_some()
    }

    pub fn kwarg_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.kwarg_types.keys()
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.returns.as_type()
    }

    /// `Owner#name at file:line`.
    pub fn method_desc(&self) -> String {
        format!("{} at {}", self.method, self.method.location)
    }

    /// Whether this signature's checks run given the tests flag.
    pub fn is_enforced(&self, check_tests: bool) -> bool {
        self.check_level.is_enforced(check_tests)
    }

    /// Latches the "ever failed" marker. Returns `true` only for the call
    /// that flipped it.
    pub fn mark_failed(&self) -> bool {
        !self.ever_failed.swap(true, Ordering::Relaxed)
    }

    pub fn ever_failed(&self) -> bool {
        self.ever_failed.load(Ordering::Relaxed)
    }

    /// Splits `args` into positional and keyword arguments the way the host
    /// calling convention does, checks the positional count, then calls `f`
    /// with the name, value and declared type of every argument present.
    ///
    /// A trailing hash is treated as keywords only when the signature takes
    /// keywords and more positional arguments than required were supplied.
    pub fn each_arg_value_type<F>(&self, args: &[Value], mut f: F) -> Result<(), RuntimeError>
    where
        F: FnMut(&str, &Value, &TypeRef) -> Result<(), RuntimeError>,
    {
        let takes_keywords = !self.kwarg_types.is_empty() || self.has_keyrest();
        let (positional, kwargs) = match args.split_last() {
            Some((last, init)) if takes_keywords && args.len() > self.req_arg_count && last.is_hash() => {
                (init, last.hash_pairs())
            }
            _ => (args, None),
        };

        match &self.rest {
            Some(_) if positional.len() >= self.req_arg_count => {}
            Some(_) => {
                return Err(RuntimeError::ArgumentCount {
                    given: positional.len(),
                    expected: format!("{}+", self.req_arg_count),
                })
            }
            None if positional.len() < self.req_arg_count || positional.len() > self.arg_count() => {
                let mut expected = self.req_arg_count.to_string();
                if self.arg_count() != self.req_arg_count {
                    expected.push_str(&format!("..{}", self.arg_count()));
                }
                return Err(RuntimeError::ArgumentCount {
                    given: positional.len(),
                    expected,
                });
            }
            None => {}
        }

        for (i, value) in positional.iter().enumerate() {
            let (name, ty) = match (self.arg_types.get(i), &self.rest) {
                (Some((name, ty)), _) => (name, ty),
                (None, Some((name, ty))) => (name, ty),
                (None, None) => break,
            };
            f(name, value, ty)?;
        }

        for (key, value) in kwargs.unwrap_or_default() {
            let name = match key {
                Value::Symbol(name) => name,
                _ => match &self.keyrest {
                    Some((name, _)) => name,
                    None => continue,
                },
            };
            let ty = self
                .kwarg_types
                .get(name)
                .or_else(|| self.keyrest.as_ref().map(|(_, ty)| ty));
            if let Some(ty) = ty {
                f(name, value, ty)?;
            }
        }
        Ok(())
    }
}

/// Names the reflected parameters, applying the setter exception: a
/// `name=` method whose only parameter is unnamed and required takes the
/// single declared name.
fn effective_names(
    method_name: &str,
    parameters: &[Parameter],
    declared: &IndexMap<Arc<str>, TypeRef>,
) -> Vec<Arc<str>> {
    if let ([param], Some((only, _))) = (parameters, declared.first()) {
        if method_name.ends_with('=')
            && param.kind == ParamKind::Req
            && param.name.is_none()
            && declared.len() == 1
        {
            return vec![only.clone()];
        }
    }
    positional_names(parameters)
}

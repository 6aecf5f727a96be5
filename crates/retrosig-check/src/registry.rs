//! Signature registry.
//!
//! Declarations are realised lazily. Defining a method after `sig` installs
//! a [`LazyWrapper`] and parks a realisation closure under the method's key.
//! The first call (or an explicit [`Registry::run_all_sig_blocks`]) runs the
//! closure, which builds the signature, validates it against its ancestor,
//! stores it and installs the validator that replaces the wrapper.
//!
//! A closure that fails stays pending and its key is remembered; a later
//! success for the same key is reported as [`RuntimeError::StickyFailure`].
//!
//! No guard into any map is held while a closure or callable runs.

use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use retrosig_core::id::{ClassId, MethodKey, SourceLocation};
use retrosig_core::params::{ParamKind, Parameter};
use retrosig_core::value::Value;
use serde_json::json;

use crate::config::SigValidationContext;
use crate::declaration::{DeclBuilder, Declaration, DeclarationError};
use crate::dispatch;
use crate::error::RuntimeError;
use crate::method::{Callable, Invocation, Method};
use crate::mode::{CheckLevel, Mode};
use crate::overrides;
use crate::runtime::Runtime;
use crate::signature::Signature;

/// The body of a `sig { ... }` declaration.
pub type SigBlock = Arc<dyn Fn(&mut DeclBuilder) -> Result<(), DeclarationError> + Send + Sync>;

type Realize = Arc<dyn Fn(&Runtime) -> Result<Arc<Signature>, RuntimeError> + Send + Sync>;

/// A `sig` waiting for its method definition.
#[derive(Clone)]
pub struct DeclarationBlock {
    /// Class or module the `sig` was written in.
    pub scope: ClassId,
    pub location: SourceLocation,
    pub block: SigBlock,
    /// Declared with `sig_raw`: recorded, never wrapped.
    pub raw: bool,
}

impl fmt::Debug for DeclarationBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarationBlock")
            .field("scope", &self.scope)
            .field("location", &self.location)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// A method was defined right after a `sig`.
#[derive(Debug, Clone)]
pub struct MethodDefined {
    /// Class or module the definition was made in. For singleton
    /// definitions this is the attached class, not the singleton class.
    pub hook_scope: ClassId,
    pub original: Method,
    pub declaration: DeclarationBlock,
    pub singleton: bool,
}

#[derive(Default)]
pub struct Registry {
    signatures: DashMap<MethodKey, Arc<Signature>>,
    pending: DashMap<MethodKey, Realize>,
    sigs_that_raised: DashSet<MethodKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the declaration and returns the wrapper to install in place of
    /// the original.
    pub fn on_method_defined(&self, event: MethodDefined) -> Arc<dyn Callable> {
        let key = event.original.key().clone();
        let original = event.original.clone();
        let declaration = event.declaration;
        let realize: Realize = Arc::new(move |rt: &Runtime| rt.registry().run_sig(rt, &original, &declaration));
        self.pending.insert(key.clone(), realize);
        tracing::trace!(
            scope = %event.hook_scope,
            singleton = event.singleton,
            method = %key.name,
            "sig pending"
        );
        Arc::new(LazyWrapper {
            key,
            original: event.original,
        })
    }

    /// Drops everything known about `key`. Called when the method is
    /// redefined.
    pub fn forget(&self, key: &MethodKey) {
        self.signatures.remove(key);
        self.pending.remove(key);
        self.sigs_that_raised.remove(key);
    }

    pub fn has_pending(&self, key: &MethodKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stored signature, without realising anything.
    pub fn signature_for_key(&self, key: &MethodKey) -> Option<Arc<Signature>> {
        self.signatures.get(key).map(|s| s.value().clone())
    }

    /// Realises the pending declaration for `key`.
    pub fn run_sig_block_for_key(&self, rt: &Runtime, key: &MethodKey) -> Result<Arc<Signature>, RuntimeError> {
        let realize = self
            .pending
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| RuntimeError::SigUsage(format!("No `sig` wrapper for {}", describe_key(rt, key))))?;

        let sig = match realize(rt) {
            Ok(sig) => sig,
            Err(e) => {
                self.sigs_that_raised.insert(key.clone());
                tracing::debug!(owner = %key.owner, method = %key.name, error = %e, "sig realisation failed");
                return Err(e);
            }
        };
        if self.sigs_that_raised.contains(key) {
            return Err(RuntimeError::StickyFailure {
                method: describe_key(rt, key),
            });
        }
        self.pending.remove(key);
        Ok(sig)
    }

    pub fn maybe_run_sig_block_for_key(&self, rt: &Runtime, key: &MethodKey) -> Result<(), RuntimeError> {
        if self.has_pending(key) {
            self.run_sig_block_for_key(rt, key)?;
        }
        Ok(())
    }

    /// Realises every pending declaration, stopping at the first failure.
    pub fn run_all_sig_blocks(&self, rt: &Runtime) -> Result<(), RuntimeError> {
        loop {
            let next = self.pending.iter().next().map(|e| e.key().clone());
            match next {
                Some(key) => {
                    self.run_sig_block_for_key(rt, &key)?;
                }
                None => return Ok(()),
            }
        }
    }

    /// Gives `from`, a `(*args, &blk)` method that forwards to `to`, an
    /// untyped signature carrying `to`'s parameters, so override checks see
    /// the real shape.
    pub fn register_forwarder(
        &self,
        rt: &Runtime,
        from: &MethodKey,
        to: &MethodKey,
        mode: Mode,
        remove_first_param: bool,
    ) -> Result<(), RuntimeError> {
        self.maybe_run_sig_block_for_key(rt, from)?;
        if self.signatures.contains_key(from) {
            return Err(RuntimeError::SigUsage(format!(
                "{} already has a method signature",
                describe_key(rt, from)
            )));
        }

        let from_entry = rt.host().get(from).ok_or_else(|| no_method(rt, from))?;
        let kinds: Vec<ParamKind> = from_entry.info.params.iter().map(|p| p.kind).collect();
        if kinds != [ParamKind::Rest, ParamKind::Block] {
            return Err(RuntimeError::SigUsage(format!(
                "forwarder methods should take a single splat param and a block param. `{}` takes these params: {:?}",
                from_entry.info, kinds
            )));
        }

        self.maybe_run_sig_block_for_key(rt, to)?;
        let to_params: Arc<[Parameter]> = match self.signature_for_key(to) {
            Some(sig) => sig.parameters.clone(),
            None => rt.host().get(to).ok_or_else(|| no_method(rt, to))?.info.params,
        };
        let to_params = if remove_first_param && !to_params.is_empty() {
            to_params[1..].into()
        } else {
            to_params
        };

        let sig = Signature::new_untyped(from_entry.info, mode, Some(to_params))?;
        tracing::debug!(from = %from.name, to = %to.name, "registered forwarder");
        self.signatures.insert(from.clone(), Arc::new(sig));
        Ok(())
    }

    /// Builds, validates, installs and stores the signature for one
    /// definition.
    fn run_sig(
        &self,
        rt: &Runtime,
        original: &Method,
        block: &DeclarationBlock,
    ) -> Result<Arc<Signature>, RuntimeError> {
        let config = rt.config();
        let declaration = match run_builder(block, config.default_checked()) {
            Ok(decl) => Some(decl),
            Err(e) => {
                config.handle_sig_builder_error(&e, &block.location)?;
                None
            }
        };

        let sig = match declaration {
            Some(decl) => self.build_sig(rt, original, decl, block)?,
            None => Arc::new(Signature::new_untyped(original.info.clone(), Mode::Untyped, None)?),
        };

        let installed = dispatch::wrap_method_if_needed(rt, &sig, original.clone());
        rt.host().replace(original.key(), installed);
        self.signatures.insert(original.key().clone(), sig.clone());
        tracing::debug!(
            method = %sig.method,
            mode = sig.mode.as_str(),
            checked = sig.check_level.as_str(),
            "signature realised"
        );
        Ok(sig)
    }

    fn build_sig(
        &self,
        rt: &Runtime,
        original: &Method,
        decl: Declaration,
        block: &DeclarationBlock,
    ) -> Result<Arc<Signature>, RuntimeError> {
        let mut sig = match Signature::new(original.info.clone(), &decl) {
            Ok(sig) => sig,
            Err(e) => return self.declare_failed(rt, original, decl, None, e.into()),
        };
        sig.defined_raw = block.raw;
        let sig = Arc::new(sig);

        match overrides::validate(rt, &sig) {
            Ok(()) => Ok(sig),
            Err(e) => self.declare_failed(rt, original, decl, Some(sig), e),
        }
    }

    /// Falls back to an untyped signature after a declaration-time failure.
    /// Generated signatures (or overrides of one) only log.
    fn declare_failed(
        &self,
        rt: &Runtime,
        original: &Method,
        declaration: Declaration,
        signature: Option<Arc<Signature>>,
        err: RuntimeError,
    ) -> Result<Arc<Signature>, RuntimeError> {
        let owner = original.info.owner();
        let super_signature = rt
            .host()
            .super_method(rt.classes(), owner, owner, original.name())
            .and_then(|entry| self.signature_for_key(&entry.info.key));

        let generated = declaration.generated || super_signature.as_ref().is_some_and(|s| s.generated);
        if generated {
            rt.config().log_info(
                "SIG-DECLARE-FAILED",
                &json!({
                    "method": original.info.to_string(),
                    "definition": original.info.location.to_string(),
                    "error": err.to_string(),
                }),
            );
        } else {
            let ctx = SigValidationContext {
                method: original.info.clone(),
                declaration,
                signature,
                super_signature,
            };
            rt.config().handle_sig_validation_error(&err, &ctx)?;
        }
        Ok(Arc::new(Signature::new_untyped(original.info.clone(), Mode::Untyped, None)?))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("signatures", &self.signatures.len())
            .field("pending", &self.pending.len())
            .field("sigs_that_raised", &self.sigs_that_raised.len())
            .finish()
    }
}

fn run_builder(block: &DeclarationBlock, default_checked: CheckLevel) -> Result<Declaration, DeclarationError> {
    let mut builder = DeclBuilder::new(block.scope, default_checked);
    (block.block)(&mut builder)?;
    builder.finalize()
}

fn describe_key(rt: &Runtime, key: &MethodKey) -> String {
    format!("{}#{}", rt.classes().name(key.owner), key.name)
}

fn no_method(rt: &Runtime, key: &MethodKey) -> RuntimeError {
    RuntimeError::NoMethod {
        name: key.name.to_string(),
        receiver: rt.classes().name(key.owner).to_string(),
    }
}

/// Installed by [`Registry::on_method_defined`]; realises the signature on
/// the first call, then runs that call under it.
pub struct LazyWrapper {
    key: MethodKey,
    original: Method,
}

impl Callable for LazyWrapper {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        let registry = rt.registry();
        let sig = if registry.has_pending(&self.key) {
            registry.run_sig_block_for_key(rt, &self.key)?
        } else {
            // Realised elsewhere while a handle to this wrapper was still live.
            registry
                .signature_for_key(&self.key)
                .ok_or_else(|| RuntimeError::MissingSignature {
                    method: self.original.name().to_string(),
                })?
        };
        dispatch::call_with_signature(rt, &sig, &self.original, inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::signature::ShapeMismatchError;
    use retrosig_core::types;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add(rt: &Runtime) -> MethodKey {
        rt.sig(ClassId::OBJECT, |s| {
            s.params([("a", types::integer()), ("b", types::integer())])?
                .returns(types::integer())?;
            Ok(())
        })
        .unwrap();
        rt.define_method(
            ClassId::OBJECT,
            "add",
            vec![Parameter::req("a"), Parameter::req("b")],
            |_rt, inv| {
                let a = inv.args[0].as_integer().unwrap_or(0);
                let b = inv.args[1].as_integer().unwrap_or(0);
                Ok(Value::Integer(a + b))
            },
        )
        .unwrap()
    }

    #[test]
    fn realises_lazily_on_first_call() {
        let rt = Runtime::default();
        let key = add(&rt);
        assert!(rt.registry().has_pending(&key));
        assert!(rt.registry().signature_for_key(&key).is_none());

        let out = rt
            .call(&Value::Nil, "add", &[Value::Integer(1), Value::Integer(2)])
            .unwrap();
        assert_eq!(out.as_integer(), Some(3));
        assert!(!rt.registry().has_pending(&key));
        assert!(rt.registry().signature_for_key(&key).is_some());
    }

    #[test]
    fn run_all_realises_everything() {
        let rt = Runtime::default();
        let key = add(&rt);
        rt.run_all_sig_blocks().unwrap();
        assert_eq!(rt.registry().pending_count(), 0);
        assert_eq!(rt.registry().signature_for_key(&key).unwrap().arg_count(), 2);
    }

    #[test]
    fn success_after_failure_is_sticky() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let rt = Runtime::default();
        rt.sig(ClassId::OBJECT, move |s| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DeclarationError::Other("flaky".into()));
            }
            s.returns(types::integer())?;
            Ok(())
        })
        .unwrap();
        rt.define_method(ClassId::OBJECT, "flaky", vec![], |_rt, _inv| Ok(Value::Integer(1)))
            .unwrap();

        let first = rt.call(&Value::Nil, "flaky", &[]).unwrap_err();
        assert!(matches!(first, RuntimeError::Declaration { .. }));
        let second = rt.call(&Value::Nil, "flaky", &[]).unwrap_err();
        assert!(matches!(second, RuntimeError::StickyFailure { .. }), "{second}");
    }

    #[test]
    fn builder_handler_can_downgrade_to_untyped() {
        let config = Configuration::new().with_sig_builder_handler(|_e, _loc| Ok(()));
        let rt = Runtime::new(config);
        rt.sig(ClassId::OBJECT, |s| {
            s.params([("a", types::integer())])?;
            Ok(())
        })
        .unwrap();
        let key = rt
            .define_method(ClassId::OBJECT, "m", vec![Parameter::req("a")], |_rt, _inv| {
                Ok(Value::str("anything"))
            })
            .unwrap();

        assert!(rt.call(&Value::Nil, "m", &[Value::str("x")]).is_ok());
        assert_eq!(rt.registry().signature_for_key(&key).unwrap().mode, Mode::Untyped);
    }

    #[test]
    fn forwarder_borrows_target_parameters() {
        let rt = Runtime::default();
        let target = add(&rt);
        let from = rt
            .define_method(
                ClassId::OBJECT,
                "fwd",
                vec![Parameter::rest("args"), Parameter::block("blk")],
                |rt, inv| rt.call(inv.receiver, "add", inv.args),
            )
            .unwrap();
        rt.register_forwarder(&from, &target, Mode::Overridable, true).unwrap();

        let sig = rt.registry().signature_for_key(&from).unwrap();
        assert_eq!(sig.mode, Mode::Overridable);
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].name.as_deref(), Some("b"));

        let again = rt.register_forwarder(&from, &target, Mode::Overridable, false).unwrap_err();
        assert!(again.to_string().ends_with("already has a method signature"));
    }

    #[test]
    fn forwarder_rejects_target_with_required_after_optional() {
        let rt = Runtime::default();
        let target = rt
            .define_method(
                ClassId::OBJECT,
                "lopsided",
                vec![Parameter::opt("a"), Parameter::req("b")],
                |_rt, _inv| Ok(Value::Nil),
            )
            .unwrap();
        let from = rt
            .define_method(
                ClassId::OBJECT,
                "fwd",
                vec![Parameter::rest("args"), Parameter::block("blk")],
                |_rt, _inv| Ok(Value::Nil),
            )
            .unwrap();
        let err = rt.register_forwarder(&from, &target, Mode::Overridable, false).unwrap_err();
        assert!(matches!(err, RuntimeError::Shape(ShapeMismatchError::RequiredAfterOptional { .. })), "{err:?}");
        assert!(rt.registry().signature_for_key(&from).is_none());
    }

    #[test]
    fn forwarder_requires_splat_and_block() {
        let rt = Runtime::default();
        let target = add(&rt);
        let from = rt
            .define_method(ClassId::OBJECT, "bad", vec![Parameter::req("x")], |_rt, _inv| Ok(Value::Nil))
            .unwrap();
        let err = rt.register_forwarder(&from, &target, Mode::Overridable, false).unwrap_err();
        assert!(err.to_string().starts_with("forwarder methods should take a single splat param"));
    }
}

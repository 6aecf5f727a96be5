//! Call validation: picks and installs the validator for a realised
//! signature.
//!
//! The tier is chosen once, at installation:
//!
//! | Tier   | Shape                                                         |
//! |--------|---------------------------------------------------------------|
//! | Fast   | required positionals only, arity <= 4, no bind, simple types |
//! | Medium | same shape, arbitrary types                                   |
//! | Slow   | everything else                                               |
//!
//! Every tier accepts and rejects exactly the same calls; the faster ones
//! only skip work that their shape makes unnecessary.

pub mod fast;
pub mod medium;
pub mod report;
pub mod slow;

pub use report::report_error;

use std::sync::Arc;

use retrosig_core::id::ClassId;
use retrosig_core::params::{ParamKind, Parameter};
use retrosig_core::value::Value;

use crate::config::Configuration;
use crate::declaration::Returns;
use crate::error::RuntimeError;
use crate::method::{Callable, Invocation, Method};
use crate::mode::{CheckLevel, Mode};
use crate::runtime::Runtime;
use crate::signature::Signature;

use self::fast::FastValidator;
use self::medium::MediumValidator;
use self::slow::SlowValidator;

/// Largest arity with a monomorphised fast validator.
pub const MAX_FAST_ARITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Fast,
    Medium,
    Slow,
}

/// Picks the validator tier for `sig` wrapping a method with `params`.
pub fn classify(sig: &Signature, params: &[Parameter], config: &Configuration) -> Tier {
    let fixed_arity = sig.kwarg_types.is_empty()
        && !sig.has_rest()
        && !sig.has_keyrest()
        && params.iter().all(|p| p.kind == ParamKind::Req);
    let fixed_shape = fixed_arity
        && sig.bind.is_none()
        && sig.arg_count() <= MAX_FAST_ARITY
        && config.fast_path_enabled();
    if !fixed_shape {
        return Tier::Slow;
    }

    let simple_args = sig.arg_types.iter().all(|(_, ty)| ty.raw_type().is_some());
    let simple_return = match &sig.returns {
        Returns::Void => true,
        Returns::Type(ty) => ty.raw_type().is_some(),
    };
    if simple_args && simple_return {
        Tier::Fast
    } else {
        Tier::Medium
    }
}

/// Builds the callable that replaces `original` once `sig` is known.
///
/// Abstract signatures get a forwarding stub, raw and unchecked signatures
/// get the original back, and everything else gets a validator (behind a
/// gate re-reading the tests flag for `checked(:tests)`).
pub fn wrap_method_if_needed(rt: &Runtime, sig: &Arc<Signature>, original: Method) -> Arc<dyn Callable> {
    if sig.mode == Mode::Abstract {
        tracing::debug!(method = %sig.method, "installing abstract stub");
        return Arc::new(AbstractWrapper { sig: sig.clone() });
    }
    if sig.defined_raw {
        return Arc::new(original);
    }
    match sig.check_level {
        CheckLevel::Always => create_validator(rt, sig, original),
        CheckLevel::Tests => {
            tracing::debug!(method = %sig.method, "installing tests-only gate");
            Arc::new(TestsGate {
                validator: create_validator(rt, sig, original.clone()),
                original,
            })
        }
        CheckLevel::Never => Arc::new(original),
    }
}

fn create_validator(rt: &Runtime, sig: &Arc<Signature>, original: Method) -> Arc<dyn Callable> {
    let tier = classify(sig, original.params(), rt.config());
    tracing::debug!(method = %sig.method, ?tier, "installing validator");
    match tier {
        Tier::Fast => fast_validator(sig, original),
        Tier::Medium => Arc::new(MediumValidator::new(sig.clone(), original)),
        Tier::Slow => Arc::new(SlowValidator::new(sig.clone(), original)),
    }
}

fn fast_validator(sig: &Arc<Signature>, original: Method) -> Arc<dyn Callable> {
    let sig = sig.clone();
    match sig.arg_count() {
        0 => Arc::new(FastValidator::<0>::new(sig, original)),
        1 => Arc::new(FastValidator::<1>::new(sig, original)),
        2 => Arc::new(FastValidator::<2>::new(sig, original)),
        3 => Arc::new(FastValidator::<3>::new(sig, original)),
        4 => Arc::new(FastValidator::<4>::new(sig, original)),
        _ => Arc::new(SlowValidator::new(sig, original)),
    }
}

/// Runs `original` under the checks `sig` enforces right now, without
/// installing anything. Used by the lazy first-call wrapper.
pub fn call_with_signature(
    rt: &Runtime,
    sig: &Arc<Signature>,
    original: &Method,
    inv: &Invocation<'_>,
) -> Result<Value, RuntimeError> {
    if sig.mode == Mode::Abstract {
        return call_next_implementation(rt, sig, inv);
    }
    if !sig.defined_raw && sig.is_enforced(rt.config().check_tests()) {
        return slow::validate_call(rt, sig, original, inv);
    }
    original.call(rt, inv)
}

/// Forwards an abstract call to the next definition after the abstract one
/// in the receiver's ancestors.
fn call_next_implementation(rt: &Runtime, sig: &Signature, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
    match rt
        .host()
        .super_method(rt.classes(), inv.receiver_class, inv.owner, sig.method_name())
    {
        Some(next) => next.callable.call(rt, &inv.with_owner(next.info.owner())),
        None => Err(RuntimeError::AbstractNotImplemented {
            method: sig.method_name().to_string(),
            owner: owner_name(rt, sig.owner()),
        }),
    }
}

fn owner_name(rt: &Runtime, owner: ClassId) -> String {
    rt.classes().name(owner).to_string()
}

/// Installed for abstract signatures.
pub struct AbstractWrapper {
    sig: Arc<Signature>,
}

impl Callable for AbstractWrapper {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        call_next_implementation(rt, &self.sig, inv)
    }
}

/// Validates only while checking in tests is enabled.
pub struct TestsGate {
    validator: Arc<dyn Callable>,
    original: Method,
}

impl Callable for TestsGate {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        if rt.config().check_tests() {
            self.validator.call(rt, inv)
        } else {
            self.original.call(rt, inv)
        }
    }
}

/// Shared tail of every tier: substitutes the void sentinel or checks the
/// return value.
#[inline]
pub(crate) fn finish_return(
    rt: &Runtime,
    sig: &Signature,
    value: Value,
    inv: &Invocation<'_>,
) -> Result<Value, RuntimeError> {
    match &sig.returns {
        Returns::Void => Ok(Value::Void),
        Returns::Type(ty) => {
            report::check_value(
                rt,
                sig,
                crate::error::ValidationKind::ReturnValue,
                None,
                ty,
                &value,
                inv.caller,
            )?;
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclBuilder;
    use crate::overrides::test_support::{info, typed_sig};
    use retrosig_core::types;

    fn sig_for(params: Vec<Parameter>, decl_params: Vec<(&str, retrosig_core::types::TypeRef)>) -> Signature {
        let mut b = DeclBuilder::new(ClassId::OBJECT, CheckLevel::Always);
        if !decl_params.is_empty() {
            b.params(decl_params).unwrap();
        }
        b.returns(types::integer()).unwrap();
        let decl = b.finalize().unwrap();
        Signature::new(info(ClassId::OBJECT, "m", params), &decl).unwrap()
    }

    #[test]
    fn simple_fixed_arity_is_fast() {
        let config = Configuration::new();
        let sig = typed_sig(ClassId::OBJECT, vec![types::integer(), types::string()], Returns::Void, Mode::Standard);
        assert_eq!(classify(&sig, &sig.method.params, &config), Tier::Fast);

        config.disable_fast_path();
        assert_eq!(classify(&sig, &sig.method.params, &config), Tier::Slow);
    }

    #[test]
    fn union_types_are_medium() {
        let config = Configuration::new();
        let sig = typed_sig(
            ClassId::OBJECT,
            vec![types::nilable(types::integer())],
            Returns::Type(types::integer()),
            Mode::Standard,
        );
        assert_eq!(classify(&sig, &sig.method.params, &config), Tier::Medium);
    }

    #[test]
    fn optional_keyword_and_wide_shapes_are_slow() {
        let config = Configuration::new();
        let opt = sig_for(vec![Parameter::opt("a")], vec![("a", types::integer())]);
        assert_eq!(classify(&opt, &opt.method.params, &config), Tier::Slow);

        let kw = sig_for(vec![Parameter::keyreq("a")], vec![("a", types::integer())]);
        assert_eq!(classify(&kw, &kw.method.params, &config), Tier::Slow);

        let wide = typed_sig(ClassId::OBJECT, vec![types::integer(); 5], Returns::Void, Mode::Standard);
        assert_eq!(classify(&wide, &wide.method.params, &config), Tier::Slow);
    }
}

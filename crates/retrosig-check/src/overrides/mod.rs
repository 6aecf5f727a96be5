//! Override compatibility checking.
//!
//! Run once per realised signature against the nearest ancestor definition
//! of the same name:
//!
//! 1. [`modes`]: is the child allowed to override (or not override) the base?
//! 2. [`shape`]: can the child be called everywhere the base can?
//! 3. [`variance`]: contravariant arguments, covariant return.
//!
//! Constructors are exempt: they must be declared standard and are never
//! compared against an ancestor.

pub mod error;
pub mod modes;
pub mod shape;
pub mod variance;

pub use error::OverrideError;

use std::sync::Arc;

use retrosig_core::params::ParamKind;

use crate::error::RuntimeError;
use crate::method::MethodInfo;
use crate::mode::Mode;
use crate::runtime::Runtime;
use crate::signature::Signature;

/// `Owner at file:line`.
pub(crate) fn loc_str(method: &MethodInfo) -> String {
    format!("{} at {}", method.owner_name, method.location)
}

pub(crate) fn base_override_loc_str(sig: &Signature, base: &Signature) -> String {
    let noun = if base.mode == Mode::Abstract {
        "Implementation"
    } else {
        "Override"
    };
    format!(
        "\n * Base definition: in {}\n * {}: in {}",
        loc_str(&base.method),
        noun,
        loc_str(&sig.method)
    )
}

/// Validates `sig` against whatever it overrides.
///
/// The ancestor's pending declaration is realised first. An ancestor without
/// a signature is compared as an untyped signature, unless it takes a rest
/// or keyword-rest parameter, in which case the check is skipped.
pub fn validate(rt: &Runtime, sig: &Signature) -> Result<(), RuntimeError> {
    let classes = rt.classes();
    if sig.method_name() == "initialize" && !classes.is_module(sig.owner()) {
        if sig.mode != Mode::Standard {
            return Err(OverrideError::Mode {
                message: "Constructor methods should always be declared using `sig`.".into(),
                base: None,
                child: sig.method.location.clone(),
            }
            .into());
        }
        return Ok(());
    }

    let super_entry = rt
        .host()
        .super_method(classes, sig.owner(), sig.owner(), sig.method_name());
    let super_entry = match super_entry {
        Some(entry) if entry.info.owner() != sig.owner() => entry,
        _ => return Ok(modes::validate_non_override_mode(sig, classes)?),
    };

    rt.registry().maybe_run_sig_block_for_key(rt, &super_entry.info.key)?;
    let base = match rt.registry().signature_for_key(&super_entry.info.key) {
        Some(base) => base,
        None => {
            let splat = super_entry
                .info
                .params
                .iter()
                .any(|p| matches!(p.kind, ParamKind::Rest | ParamKind::KeyRest));
            if splat {
                tracing::trace!(method = %sig.method, "ancestor has no signature and takes a splat; skipping override checks");
                return Ok(());
            }
            match Signature::new_untyped(super_entry.info.clone(), Mode::Untyped, None) {
                Ok(base) => Arc::new(base),
                Err(e) => {
                    tracing::trace!(method = %sig.method, error = %e, "ancestor shape is unsupported; skipping override checks");
                    return Ok(());
                }
            }
        }
    };

    modes::validate_override_mode(sig, &base)?;
    shape::validate_override_shape(sig, &base)?;
    variance::validate_override_types(sig, &base, classes, rt.config().check_tests())?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::declaration::{DeclBuilder, Returns};
    use crate::mode::CheckLevel;
    use retrosig_core::id::{ClassId, MethodKey, SourceLocation};
    use retrosig_core::params::Parameter;
    use retrosig_core::types::{self, TypeRef};

    pub fn info(owner: ClassId, name: &str, params: Vec<Parameter>) -> MethodInfo {
        MethodInfo {
            key: MethodKey::new(owner, name),
            owner_name: format!("C{}", owner.0).into(),
            params: params.into(),
            location: SourceLocation::new("src/shapes.rs", owner.0 + 1),
        }
    }

    /// Every parameter typed `Integer`, returning `Integer`.
    pub fn shaped_sig(owner: ClassId, name: &str, params: Vec<Parameter>, mode: Mode) -> Signature {
        let declared: Vec<(String, TypeRef)> = params
            .iter()
            .filter_map(|p| p.name.as_ref().map(|n| (n.to_string(), types::integer())))
            .collect();
        let mut b = DeclBuilder::new(owner, CheckLevel::Always);
        if !declared.is_empty() {
            b.params(declared).unwrap();
        }
        b.returns(types::integer()).unwrap();
        let mut decl = b.finalize().unwrap();
        decl.mode = mode;
        Signature::new(info(owner, name, params), &decl).unwrap()
    }

    pub fn untyped_base(owner: ClassId, name: &str, params: Vec<Parameter>) -> Signature {
        Signature::new_untyped(info(owner, name, params), Mode::Untyped, None).unwrap()
    }

    pub fn sig_with_mode(owner: ClassId, mode: Mode, implementation: bool) -> Signature {
        let mut sig = shaped_sig(owner, "m", vec![], mode);
        sig.implementation = implementation;
        sig
    }

    /// Required positionals `a0, a1, ...` of the given types.
    pub fn typed_sig(owner: ClassId, args: Vec<TypeRef>, returns: Returns, mode: Mode) -> Signature {
        let params: Vec<Parameter> = (0..args.len()).map(|i| Parameter::req(&format!("a{}", i))).collect();
        let mut b = DeclBuilder::new(owner, CheckLevel::Always);
        if !args.is_empty() {
            b.params(args.into_iter().enumerate().map(|(i, t)| (format!("a{}", i), t)))
                .unwrap();
        }
        match returns {
            Returns::Void => b.void().unwrap(),
            Returns::Type(t) => b.returns(t).unwrap(),
        };
        let mut decl = b.finalize().unwrap();
        decl.mode = mode;
        Signature::new(info(owner, "m", params), &decl).unwrap()
    }
}

//! Type variance between an override and its base: argument types are
//! contravariant, the return type is covariant.

use retrosig_core::class::ClassRegistry;
use retrosig_core::types::{TypeKind, TypePredicate};

use super::{loc_str, OverrideError};
use crate::declaration::Returns;
use crate::mode::Mode;
use crate::signature::Signature;

pub fn validate_override_types(
    sig: &Signature,
    base: &Signature,
    classes: &ClassRegistry,
    check_tests: bool,
) -> Result<(), OverrideError> {
    if sig.override_allow_incompatible || base.mode == Mode::Untyped {
        return Ok(());
    }
    if !sig.is_enforced(check_tests) || !base.is_enforced(check_tests) {
        return Ok(());
    }

    let noun = if base.mode == Mode::Abstract {
        "implementation"
    } else {
        "override"
    };
    let noun_title = if base.mode == Mode::Abstract {
        "Implementation"
    } else {
        "Override"
    };
    let fail = |what: String, base_type: String, child_type: String, direction: &str| -> Result<(), OverrideError> {
        Err(OverrideError::TypeVariance {
            message: format!(
                "Incompatible {} in {} of method `{}`:\n\
                 * Base: `{}` (in {})\n\
                 * {}: `{}` (in {})\n\
                 (The types must be {}.)",
                what,
                noun,
                sig.method_name(),
                base_type,
                loc_str(&base.method),
                noun_title,
                child_type,
                loc_str(&sig.method),
                direction
            ),
            base: base.method.location.clone(),
            child: sig.method.location.clone(),
        })
    };

    for (index, ((_, base_type), (name, child_type))) in base.arg_types.iter().zip(&sig.arg_types).enumerate() {
        if !base_type.subtype_of(child_type.as_ref(), classes) {
            return fail(
                format!("type for arg #{} (`{}`)", index + 1, name),
                base_type.to_string(),
                child_type.to_string(),
                "contravariant",
            );
        }
    }

    for (name, base_type) in &base.kwarg_types {
        let child_type = sig
            .kwarg_types
            .get(name)
            .or_else(|| sig.keyrest.as_ref().map(|(_, ty)| ty));
        let Some(child_type) = child_type else {
            continue;
        };
        if !base_type.subtype_of(child_type.as_ref(), classes) {
            return fail(
                format!("type for arg `{}`", name),
                base_type.to_string(),
                child_type.to_string(),
                "contravariant",
            );
        }
    }

    if !returns_compatible(&sig.returns, &base.returns, classes) {
        return fail(
            "return type".into(),
            base.returns.to_string(),
            sig.returns.to_string(),
            "covariant",
        );
    }
    Ok(())
}

/// Covariant return rule. A void base accepts any child return; a void child
/// only satisfies a base whose return is unconstrained.
fn returns_compatible(child: &Returns, base: &Returns, classes: &ClassRegistry) -> bool {
    match (child, base) {
        (_, Returns::Void) => true,
        (Returns::Void, Returns::Type(base)) => matches!(
            base.kind(),
            TypeKind::Untyped | TypeKind::NotTyped | TypeKind::Anything
        ),
        (Returns::Type(child), Returns::Type(base)) => child.subtype_of(base.as_ref(), classes),
    }
}

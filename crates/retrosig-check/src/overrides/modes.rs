//! Mode legality: may this declaration override (or not override) what it
//! overrides?

use retrosig_core::class::{ClassKind, ClassRegistry};

use super::{loc_str, OverrideError};
use crate::mode::Mode;
use crate::signature::Signature;

/// `.override`, `.implementation`, `.overridable.implementation`, ...
fn pretty_mode(sig: &Signature) -> String {
    match (sig.mode, sig.implementation) {
        (Mode::OverridableOverride, true) => ".overridable.implementation".into(),
        (_, true) => ".implementation".into(),
        (mode, false) => format!(".{}", mode),
    }
}

fn mode_error(sig: &Signature, base: Option<&Signature>, message: String) -> OverrideError {
    OverrideError::Mode {
        message,
        base: base.map(|b| b.method.location.clone()),
        child: sig.method.location.clone(),
    }
}

/// Checks `sig` against the signature of the definition it overrides.
pub fn validate_override_mode(sig: &Signature, base: &Signature) -> Result<(), OverrideError> {
    let name = sig.method_name();
    if sig.implementation {
        if base.mode != Mode::Abstract {
            return Err(mode_error(
                sig,
                Some(base),
                format!(
                    "You declared `{}` as {}, but the method it overrides is not declared as abstract.\n  \
                     Either mark {} as `abstract.` in the parent: {}\n  \
                     ... or mark {} as `override.` in the child: {}\n",
                    name,
                    pretty_mode(sig),
                    base.method_name(),
                    loc_str(&base.method),
                    name,
                    loc_str(&sig.method)
                ),
            ));
        }
        return Ok(());
    }

    match sig.mode {
        Mode::Override | Mode::OverridableOverride => {
            if !base.mode.is_overridable() {
                return Err(mode_error(
                    sig,
                    Some(base),
                    format!(
                        "You declared `{}` as {}, but the method it overrides is not declared as `overridable`.\n  \
                         Parent definition: {}\n  \
                         Child definition:  {}\n",
                        name,
                        pretty_mode(sig),
                        loc_str(&base.method),
                        loc_str(&sig.method)
                    ),
                ));
            }
        }
        Mode::Standard | Mode::Abstract | Mode::Overridable => match base.mode {
            Mode::Standard | Mode::Untyped => {}
            Mode::Abstract => {
                return Err(mode_error(
                    sig,
                    Some(base),
                    format!(
                        "You must use `.implementation` when overriding the abstract method `{}`.\n  \
                         Abstract definition: {}\n  \
                         Implementation definition: {}\n",
                        name,
                        loc_str(&base.method),
                        loc_str(&sig.method)
                    ),
                ))
            }
            Mode::Overridable | Mode::Override | Mode::OverridableOverride => {
                return Err(mode_error(
                    sig,
                    Some(base),
                    format!(
                        "You must use `.override` when overriding the existing method `{}`.\n  \
                         Parent definition: {}\n  \
                         Child definition:  {}\n",
                        name,
                        loc_str(&base.method),
                        loc_str(&sig.method)
                    ),
                ))
            }
        },
        Mode::Untyped => {}
    }
    Ok(())
}

/// Checks `sig` when nothing is being overridden.
pub fn validate_non_override_mode(sig: &Signature, classes: &ClassRegistry) -> Result<(), OverrideError> {
    let name = sig.method_name();
    if sig.implementation {
        return Err(mode_error(
            sig,
            None,
            format!(
                "You marked `{}` as {}, but it doesn't match up with a corresponding abstract method.\n  \
                 Either check for typos and for missing includes or super classes to make the parent method shows up\n  \
                 ... or remove {} here: {}\n",
                name,
                pretty_mode(sig),
                pretty_mode(sig),
                loc_str(&sig.method)
            ),
        ));
    }
    if sig.mode.is_override() {
        return Err(mode_error(
            sig,
            None,
            format!(
                "You marked `{}` as {}, but that method doesn't already exist in this class/module to be overridden.\n  \
                 Either check for typos and for missing includes or super classes to make the parent method shows up\n  \
                 ... or remove {} here: {}\n",
                name,
                pretty_mode(sig),
                pretty_mode(sig),
                loc_str(&sig.method)
            ),
        ));
    }

    // Class methods on modules are not inherited, so they can never be
    // overridden.
    if matches!(sig.mode, Mode::Abstract | Mode::Overridable) {
        if let Ok(ClassKind::Singleton { attached }) = classes.kind(sig.owner()) {
            if classes.is_module(attached) {
                return Err(mode_error(
                    sig,
                    None,
                    format!(
                        "Defining an overridable class method (via {}) on a module is not allowed. \
                         Class methods on modules do not get inherited and thus cannot be overridden.",
                        pretty_mode(sig)
                    ),
                ));
            }
        }
    }
    Ok(())
}

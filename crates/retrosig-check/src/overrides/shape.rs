//! Parameter-shape compatibility between an override and its base.
//!
//! The child must be callable everywhere the base is: at least as many
//! positionals, no more required ones, every base keyword, rest and
//! keyword-rest if the base has them, no new required keywords, and a block
//! if the base takes one.

use super::{base_override_loc_str, OverrideError};
use crate::mode::Mode;
use crate::signature::Signature;

pub fn validate_override_shape(sig: &Signature, base: &Signature) -> Result<(), OverrideError> {
    if sig.override_allow_incompatible || base.mode == Mode::Untyped {
        return Ok(());
    }

    let name = sig.method_name();
    let verb = if base.mode == Mode::Abstract {
        "implements"
    } else {
        "overrides"
    };
    let fail = |detail: String| -> Result<(), OverrideError> {
        Err(OverrideError::Shape {
            message: format!(
                "Your definition of `{}` {} the method it {}: {}",
                name,
                detail,
                verb,
                base_override_loc_str(sig, base)
            ),
            base: base.method.location.clone(),
            child: sig.method.location.clone(),
        })
    };

    if !sig.has_rest() && sig.arg_count() < base.arg_count() {
        return fail(format!(
            "must accept at least {} positional arguments to be compatible with",
            base.arg_count()
        ));
    }

    if let (None, Some((rest_name, _))) = (&sig.rest, &base.rest) {
        return fail(format!("must have `*{}` to be compatible with", rest_name));
    }

    if sig.req_arg_count > base.req_arg_count {
        return fail(format!(
            "must have no more than {} required argument(s) to be compatible with",
            base.req_arg_count
        ));
    }

    if !sig.has_keyrest() {
        let missing: Vec<String> = base
            .kwarg_names()
            .filter(|n| !sig.kwarg_types.contains_key(*n))
            .map(|n| format!(":{}", n))
            .collect();
        if !missing.is_empty() {
            return fail(format!(
                "is missing these keyword arg(s): [{}] which are defined in",
                missing.join(", ")
            ));
        }
    }

    if let (None, Some((keyrest_name, _))) = (&sig.keyrest, &base.keyrest) {
        return fail(format!("must have `**{}` to be compatible with", keyrest_name));
    }

    let extra_required: Vec<String> = sig
        .req_kwarg_names
        .iter()
        .filter(|n| !base.req_kwarg_names.contains(*n))
        .map(|n| format!(":{}", n))
        .collect();
    if !extra_required.is_empty() {
        return fail(format!(
            "has extra required keyword arg(s) [{}] that are not required by",
            extra_required.join(", ")
        ));
    }

    if base.block.is_some() && sig.block.is_none() {
        return fail("must accept a block parameter to be compatible with".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::test_support::{shaped_sig, untyped_base};
    use retrosig_core::id::ClassId;
    use retrosig_core::params::Parameter;

    fn child(params: Vec<Parameter>) -> Signature {
        shaped_sig(ClassId::OBJECT, "m", params, Mode::Override)
    }

    fn base(params: Vec<Parameter>) -> Signature {
        shaped_sig(ClassId::BASIC_OBJECT, "m", params, Mode::Overridable)
    }

    #[test]
    fn identical_shapes_are_compatible() {
        let params = vec![Parameter::req("a"), Parameter::key("k"), Parameter::block("blk")];
        assert!(validate_override_shape(&child(params.clone()), &base(params)).is_ok());
    }

    #[test]
    fn fewer_positionals() {
        let err = validate_override_shape(
            &child(vec![Parameter::req("a")]),
            &base(vec![Parameter::req("a"), Parameter::opt("b")]),
        )
        .unwrap_err();
        assert!(err
            .message()
            .starts_with("Your definition of `m` must accept at least 2 positional arguments to be compatible with the method it overrides"));
    }

    #[test]
    fn rest_covers_positionals_but_is_required_if_base_has_it() {
        assert!(validate_override_shape(
            &child(vec![Parameter::rest("args")]),
            &base(vec![Parameter::opt("a"), Parameter::opt("b")]),
        )
        .is_ok());
        let err = validate_override_shape(
            &child(vec![Parameter::opt("a")]),
            &base(vec![Parameter::rest("args")]),
        )
        .unwrap_err();
        assert!(err.message().contains("must have `*args`"));
    }

    #[test]
    fn more_required_positionals() {
        let err = validate_override_shape(
            &child(vec![Parameter::req("a"), Parameter::req("b")]),
            &base(vec![Parameter::req("a"), Parameter::opt("b")]),
        )
        .unwrap_err();
        assert!(err.message().contains("no more than 1 required argument(s)"));
    }

    #[test]
    fn keyword_rules() {
        let err = validate_override_shape(
            &child(vec![]),
            &base(vec![Parameter::key("k"), Parameter::keyreq("r")]),
        )
        .unwrap_err();
        assert!(err.message().contains("missing these keyword arg(s): [:k, :r]"));

        assert!(validate_override_shape(
            &child(vec![Parameter::keyrest("opts")]),
            &base(vec![Parameter::key("k")]),
        )
        .is_ok());

        let err = validate_override_shape(
            &child(vec![Parameter::key("k")]),
            &base(vec![Parameter::key("k"), Parameter::keyrest("opts")]),
        )
        .unwrap_err();
        assert!(err.message().contains("must have `**opts`"));

        let err = validate_override_shape(
            &child(vec![Parameter::keyreq("k")]),
            &base(vec![Parameter::key("k")]),
        )
        .unwrap_err();
        assert!(err.message().contains("extra required keyword arg(s) [:k]"));
    }

    #[test]
    fn block_is_required_if_base_takes_one() {
        let err = validate_override_shape(&child(vec![]), &base(vec![Parameter::block("blk")])).unwrap_err();
        assert!(err.message().contains("must accept a block parameter"));
        assert!(matches!(err, OverrideError::Shape { .. }));
    }

    #[test]
    fn abstract_base_says_implements() {
        let b = shaped_sig(ClassId::BASIC_OBJECT, "m", vec![Parameter::req("a")], Mode::Abstract);
        let err = validate_override_shape(&child(vec![]), &b).unwrap_err();
        assert!(err.message().contains("the method it implements"));
        assert!(err.message().contains("* Implementation: in"));
    }

    #[test]
    fn skipped_for_untyped_base_and_allow_incompatible() {
        let b = untyped_base(ClassId::BASIC_OBJECT, "m", vec![Parameter::req("a"), Parameter::req("b")]);
        assert!(validate_override_shape(&child(vec![]), &b).is_ok());

        let mut c = child(vec![]);
        c.override_allow_incompatible = true;
        assert!(validate_override_shape(&c, &base(vec![Parameter::req("a")])).is_ok());
    }
}

//! Subtyping rules for the reference predicates.
//!
//! Used by the override checker's variance rules:
//!
//! - `T.untyped`, not-typed sentinels and type parameters are compatible with
//!   everything, in both directions
//! - everything is a subtype of `T.anything`
//! - a union is a subtype of `S` if every member is
//! - `T` is a subtype of a union if it is a subtype of some member
//! - simple types follow the class hierarchy (including included modules)
//! - custom predicates are only related to themselves (by name)

use crate::class::ClassRegistry;
use crate::types::{TypeKind, TypePredicate};

/// Returns `true` if the type described by `sub`/`sub_name` is a subtype of
/// `sup`.
pub fn is_subtype(
    sub: TypeKind<'_>,
    sub_name: &str,
    sup: &dyn TypePredicate,
    classes: &ClassRegistry,
) -> bool {
    let sup_kind = sup.kind();
    if is_gradual(sub) || is_gradual(sup_kind) || matches!(sup_kind, TypeKind::Anything) {
        return true;
    }

    if let TypeKind::Union(members) = sub {
        return members.iter().all(|m| m.subtype_of(sup, classes));
    }
    if let TypeKind::Union(members) = sup_kind {
        return members
            .iter()
            .any(|m| is_subtype(sub, sub_name, m.as_ref(), classes));
    }

    match (sub, sup_kind) {
        (TypeKind::Simple(a), TypeKind::Simple(b)) => classes.inherits(a, b),
        (TypeKind::Custom, TypeKind::Custom) => sub_name == sup.to_string(),
        _ => false,
    }
}

fn is_gradual(kind: TypeKind<'_>) -> bool {
    matches!(
        kind,
        TypeKind::Untyped | TypeKind::NotTyped | TypeKind::TypeParameter(_)
    )
}

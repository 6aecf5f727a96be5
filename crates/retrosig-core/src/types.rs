//! The type-predicate interface and the reference predicates.
//!
//! Every declared parameter, return and bind type is a [`TypeRef`]: a shared
//! [`TypePredicate`] trait object. The checker only ever talks to the trait.
//! This module also ships the small set of concrete predicates the workspace
//! needs to be usable on its own:
//!
//! - [`Simple`]: backed by one concrete class (`is_a?` membership). The only
//!   kind eligible for the dispatcher's fast path.
//! - [`Union`]: any of several types (also `nilable` and `boolean`).
//! - [`Untyped`], [`Anything`], [`NotTyped`]: accept everything.
//!   `NotTyped` marks synthesised signatures that were never declared.
//! - [`TypeParameter`]: a generic method's type variable, erased at runtime.
//! - [`Custom`]: an arbitrary named predicate.

use std::fmt;
use std::sync::Arc;

use crate::class::ClassRegistry;
use crate::id::ClassId;
use crate::subtype;
use crate::value::Value;

/// Shared handle to a type predicate.
pub type TypeRef = Arc<dyn TypePredicate>;

/// Structural view of a predicate, used by the reference subtyping rules.
#[derive(Debug, Clone, Copy)]
pub enum TypeKind<'a> {
    Simple(ClassId),
    Union(&'a [TypeRef]),
    Untyped,
    NotTyped,
    Anything,
    TypeParameter(&'a str),
    Custom,
}

/// A runtime type predicate.
///
/// `Display` renders the type the way it would be written in a declaration
/// (`Integer`, `T.nilable(String)`, ...); error messages rely on it.
pub trait TypePredicate: fmt::Display + fmt::Debug + Send + Sync {
    fn kind(&self) -> TypeKind<'_>;

    /// Membership test.
    fn valid(&self, value: &Value, classes: &ClassRegistry) -> bool;

    /// Human-readable mismatch description, or `None` when `value` is valid.
    fn error_message_for_obj(&self, value: &Value, classes: &ClassRegistry) -> Option<String> {
        if self.valid(value, classes) {
            None
        } else {
            Some(format!(
                "Expected type {}, got {}",
                self,
                classes.describe(value)
            ))
        }
    }

    /// `self <: other`.
    fn subtype_of(&self, other: &dyn TypePredicate, classes: &ClassRegistry) -> bool {
        subtype::is_subtype(self.kind(), &self.to_string(), other, classes)
    }

    /// The single concrete class backing a simple type.
    fn raw_type(&self) -> Option<ClassId> {
        match self.kind() {
            TypeKind::Simple(class) => Some(class),
            _ => None,
        }
    }
}

/// A type backed by a single class: `value.is_a?(class)`.
#[derive(Debug, Clone)]
pub struct Simple {
    pub class: ClassId,
    pub name: Arc<str>,
}

impl fmt::Display for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TypePredicate for Simple {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::Simple(self.class)
    }

    fn valid(&self, value: &Value, classes: &ClassRegistry) -> bool {
        classes.is_a(value, self.class)
    }
}

/// Any of several types.
#[derive(Debug, Clone)]
pub struct Union {
    pub types: Vec<TypeRef>,
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw: Vec<Option<ClassId>> = self.types.iter().map(|t| t.raw_type()).collect();
        if raw.len() == 2 && raw.contains(&Some(ClassId::TRUE)) && raw.contains(&Some(ClassId::FALSE)) {
            return f.write_str("T::Boolean");
        }
        let non_nil: Vec<&TypeRef> = self
            .types
            .iter()
            .filter(|t| t.raw_type() != Some(ClassId::NIL))
            .collect();
        if non_nil.len() + 1 == self.types.len() {
            if let [only] = non_nil.as_slice() {
                return write!(f, "T.nilable({})", only);
            }
            let inner: Vec<String> = non_nil.iter().map(|t| t.to_string()).collect();
            return write!(f, "T.nilable(T.any({}))", inner.join(", "));
        }
        let inner: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
        write!(f, "T.any({})", inner.join(", "))
    }
}

impl TypePredicate for Union {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::Union(&self.types)
    }

    fn valid(&self, value: &Value, classes: &ClassRegistry) -> bool {
        self.types.iter().any(|t| t.valid(value, classes))
    }
}

/// `T.untyped`: opts out of checking.
#[derive(Debug, Clone, Copy, Default)]
pub struct Untyped;

impl fmt::Display for Untyped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("T.untyped")
    }
}

impl TypePredicate for Untyped {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::Untyped
    }

    fn valid(&self, _value: &Value, _classes: &ClassRegistry) -> bool {
        true
    }
}

/// `T.anything`: the top type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anything;

impl fmt::Display for Anything {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("T.anything")
    }
}

impl TypePredicate for Anything {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::Anything
    }

    fn valid(&self, _value: &Value, _classes: &ClassRegistry) -> bool {
        true
    }
}

/// Sentinel for parameters of signatures synthesised without a declaration.
/// Those signatures are never enforced, so this accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotTyped;

impl fmt::Display for NotTyped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<NOT-TYPED>")
    }
}

impl TypePredicate for NotTyped {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::NotTyped
    }

    fn valid(&self, _value: &Value, _classes: &ClassRegistry) -> bool {
        true
    }
}

/// A generic method's type variable. Erased at runtime.
#[derive(Debug, Clone)]
pub struct TypeParameter {
    pub name: Arc<str>,
}

impl fmt::Display for TypeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T.type_parameter(:{})", self.name)
    }
}

impl TypePredicate for TypeParameter {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::TypeParameter(&self.name)
    }

    fn valid(&self, _value: &Value, _classes: &ClassRegistry) -> bool {
        true
    }
}

type CustomCheck = dyn Fn(&Value, &ClassRegistry) -> bool + Send + Sync;

/// A named, user-supplied predicate.
#[derive(Clone)]
pub struct Custom {
    pub name: Arc<str>,
    check: Arc<CustomCheck>,
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Custom").field("name", &self.name).finish()
    }
}

impl fmt::Display for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TypePredicate for Custom {
    fn kind(&self) -> TypeKind<'_> {
        TypeKind::Custom
    }

    fn valid(&self, value: &Value, classes: &ClassRegistry) -> bool {
        (self.check)(value, classes)
    }
}

pub fn simple(class: ClassId, name: impl Into<Arc<str>>) -> TypeRef {
    Arc::new(Simple {
        class,
        name: name.into(),
    })
}

/// Simple type for a registered class, named after it.
pub fn class(classes: &ClassRegistry, id: ClassId) -> TypeRef {
    simple(id, classes.name(id))
}

pub fn object() -> TypeRef {
    simple(ClassId::OBJECT, "Object")
}

pub fn integer() -> TypeRef {
    simple(ClassId::INTEGER, "Integer")
}

pub fn float() -> TypeRef {
    simple(ClassId::FLOAT, "Float")
}

pub fn numeric() -> TypeRef {
    simple(ClassId::NUMERIC, "Numeric")
}

pub fn string() -> TypeRef {
    simple(ClassId::STRING, "String")
}

pub fn symbol() -> TypeRef {
    simple(ClassId::SYMBOL, "Symbol")
}

pub fn nil() -> TypeRef {
    simple(ClassId::NIL, "NilClass")
}

pub fn array() -> TypeRef {
    simple(ClassId::ARRAY, "Array")
}

pub fn hash() -> TypeRef {
    simple(ClassId::HASH, "Hash")
}

pub fn proc_type() -> TypeRef {
    simple(ClassId::PROC, "Proc")
}

pub fn boolean() -> TypeRef {
    any(vec![
        simple(ClassId::TRUE, "TrueClass"),
        simple(ClassId::FALSE, "FalseClass"),
    ])
}

pub fn any(types: Vec<TypeRef>) -> TypeRef {
    Arc::new(Union { types })
}

pub fn nilable(inner: TypeRef) -> TypeRef {
    any(vec![inner, nil()])
}

pub fn untyped() -> TypeRef {
    Arc::new(Untyped)
}

pub fn anything() -> TypeRef {
    Arc::new(Anything)
}

pub fn not_typed() -> TypeRef {
    Arc::new(NotTyped)
}

pub fn type_parameter(name: &str) -> TypeRef {
    Arc::new(TypeParameter { name: name.into() })
}

pub fn custom(
    name: &str,
    check: impl Fn(&Value, &ClassRegistry) -> bool + Send + Sync + 'static,
) -> TypeRef {
    Arc::new(Custom {
        name: name.into(),
        check: Arc::new(check),
    })
}

/// Collects the names of every type parameter referenced by `ty`.
pub fn referenced_type_parameters(ty: &dyn TypePredicate, out: &mut Vec<Arc<str>>) {
    match ty.kind() {
        TypeKind::TypeParameter(name) => {
            if !out.iter().any(|n| &**n == name) {
                out.push(name.into());
            }
        }
        TypeKind::Union(members) => {
            for member in members {
                referenced_type_parameters(member.as_ref(), out);
            }
        }
        _ => {}
    }
}

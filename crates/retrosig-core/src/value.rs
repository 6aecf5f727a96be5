//! Runtime value representation for the dynamic object model.
//!
//! [`Value`] is what flows through every call: receivers, arguments, blocks
//! and return values. Compound variants are reference counted so cloning a
//! value for an error report never deep-copies.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::id::ClassId;

/// A runtime value.
///
/// - Immediates: `Nil`, `Bool`, `Integer`, `Float`, `Symbol`
/// - Heap: `Str`, `Array`, `Hash`, `Object`, `Proc`
/// - `Class` is a class or module used as a receiver (class-level calls)
/// - `Void` is the sentinel substituted for the return value of a
///   void-contracted callable
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(Arc<str>),
    Symbol(Arc<str>),
    Array(Arc<Vec<Value>>),
    /// Insertion-ordered key/value pairs. Keyword arguments travel as a
    /// trailing hash with symbol keys.
    Hash(Arc<Vec<(Value, Value)>>),
    Object(Arc<Object>),
    Class(ClassId),
    Proc(Proc),
    Void,
}

/// An instance of a user-defined class.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: ClassId,
    pub fields: IndexMap<String, Value>,
}

type ProcBody = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A callable block value.
#[derive(Clone)]
pub struct Proc {
    body: Arc<ProcBody>,
}

impl Proc {
    pub fn new(body: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Proc {
            body: Arc::new(body),
        }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.body)(args)
    }

    pub fn ptr_eq(&self, other: &Proc) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proc({:p})", Arc::as_ptr(&self.body))
    }
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn sym(s: impl Into<Arc<str>>) -> Value {
        Value::Symbol(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }

    pub fn hash(pairs: Vec<(Value, Value)>) -> Value {
        Value::Hash(Arc::new(pairs))
    }

    /// A hash with symbol keys, the shape keyword arguments take.
    pub fn kwargs<I, K>(pairs: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Arc<str>>,
    {
        Value::hash(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Symbol(k.into()), v))
                .collect(),
        )
    }

    pub fn object(class: ClassId) -> Value {
        Value::Object(Arc::new(Object {
            class,
            fields: IndexMap::new(),
        }))
    }

    pub fn object_with(class: ClassId, fields: IndexMap<String, Value>) -> Value {
        Value::Object(Arc::new(Object { class, fields }))
    }

    pub fn proc(body: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Value {
        Value::Proc(Proc::new(body))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, Value::Hash(_))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proc(&self) -> Option<&Proc> {
        match self {
            Value::Proc(p) => Some(p),
            _ => None,
        }
    }

    /// Key/value pairs of a hash, or `None` for any other value.
    pub fn hash_pairs(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Hash(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Looks up a symbol key in a hash value.
    pub fn hash_get(&self, key: &str) -> Option<&Value> {
        self.hash_pairs()?.iter().find_map(|(k, v)| match k {
            Value::Symbol(s) if &**s == key => Some(v),
            _ => None,
        })
    }

    /// Ruby-style literal rendering. Objects and classes are rendered by id;
    /// use [`ClassRegistry::inspect`](crate::class::ClassRegistry::inspect)
    /// for class names.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".into(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::Str(s) => format!("{:?}", s),
            Value::Symbol(s) => format!(":{}", s),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Hash(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| match k {
                        Value::Symbol(s) => format!("{}: {}", s, v.inspect()),
                        _ => format!("{} => {}", k.inspect(), v.inspect()),
                    })
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Object(obj) => format!("#<ClassId({})>", obj.class.0),
            Value::Class(id) => format!("ClassId({})", id.0),
            Value::Proc(p) => format!("#<{:?}>", p),
            Value::Void => "<VOID>".into(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Proc(a), Value::Proc(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_literals() {
        assert_eq!(Value::Nil.inspect(), "nil");
        assert_eq!(Value::Integer(3).inspect(), "3");
        assert_eq!(Value::Float(1.5).inspect(), "1.5");
        assert_eq!(Value::str("hi").inspect(), "\"hi\"");
        assert_eq!(Value::sym("a").inspect(), ":a");
        assert_eq!(
            Value::array(vec![Value::Integer(1), Value::Nil]).inspect(),
            "[1, nil]"
        );
    }

    #[test]
    fn kwargs_are_symbol_keyed_hashes() {
        let kw = Value::kwargs([("a", Value::Integer(1)), ("b", Value::from("x"))]);
        assert!(kw.is_hash());
        assert_eq!(kw.hash_get("a"), Some(&Value::Integer(1)));
        assert_eq!(kw.hash_get("c"), None);
        assert_eq!(kw.inspect(), "{a: 1, b: \"x\"}");
    }

    #[test]
    fn procs_compare_by_identity() {
        let p = Proc::new(|args| args.first().cloned().unwrap_or(Value::Nil));
        let q = Proc::new(|_| Value::Nil);
        assert_eq!(Value::Proc(p.clone()), Value::Proc(p.clone()));
        assert_ne!(Value::Proc(p.clone()), Value::Proc(q));
        assert_eq!(p.call(&[Value::Integer(9)]), Value::Integer(9));
    }

    #[test]
    fn distinct_variants_are_unequal() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::str("a"), Value::sym("a"));
        assert_ne!(Value::Nil, Value::Void);
    }
}

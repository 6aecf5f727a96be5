//! ClassId and ClassRegistry for the dynamic object model.
//!
//! Every class, module and singleton class has a unique [`ClassId`]. The
//! [`ClassRegistry`] pre-registers the builtin classes on construction and
//! answers the two questions the rest of the workspace asks of it: "what is
//! the class of this value" and "is this class a descendant of that one".
//!
//! The registry is shared behind `Arc` by the runtime, so all mutation goes
//! through `&self` and sharded concurrent maps.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::ClassId;
use crate::value::Value;

/// What kind of scope a [`ClassId`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Module,
    /// The per-object class holding class-level methods of `attached`.
    Singleton { attached: ClassId },
}

/// A registered class, module or singleton class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: Arc<str>,
    pub kind: ClassKind,
    /// `None` only for `BasicObject` and for modules.
    pub superclass: Option<ClassId>,
    /// Included modules, in include order.
    pub includes: SmallVec<[ClassId; 4]>,
}

/// Pre-registered ClassId constants for builtin classes.
impl ClassId {
    pub const BASIC_OBJECT: ClassId = ClassId(0);
    pub const OBJECT: ClassId = ClassId(1);
    pub const MODULE: ClassId = ClassId(2);
    pub const CLASS: ClassId = ClassId(3);
    pub const NIL: ClassId = ClassId(4);
    pub const TRUE: ClassId = ClassId(5);
    pub const FALSE: ClassId = ClassId(6);
    pub const NUMERIC: ClassId = ClassId(7);
    pub const INTEGER: ClassId = ClassId(8);
    pub const FLOAT: ClassId = ClassId(9);
    pub const STRING: ClassId = ClassId(10);
    pub const SYMBOL: ClassId = ClassId(11);
    pub const ARRAY: ClassId = ClassId(12);
    pub const HASH: ClassId = ClassId(13);
    pub const PROC: ClassId = ClassId(14);
    pub const VOID: ClassId = ClassId(15);
}

/// Registry of all classes and modules in a runtime.
///
/// Builtins, with their superclass:
/// - `BasicObject`, `Object < BasicObject`, `Module < Object`, `Class < Module`
/// - `NilClass`, `TrueClass`, `FalseClass`, `Numeric`, `String`, `Symbol`,
///   `Array`, `Hash`, `Proc`, `Void` `< Object`
/// - `Integer < Numeric`, `Float < Numeric`
#[derive(Debug)]
pub struct ClassRegistry {
    classes: DashMap<ClassId, ClassDef>,
    names: DashMap<Arc<str>, ClassId>,
    /// attached class -> its singleton class
    singletons: DashMap<ClassId, ClassId>,
    next_id: AtomicU32,
}

impl ClassRegistry {
    /// Number of builtin classes pre-registered on construction.
    const BUILTIN_COUNT: u32 = 16;

    pub fn new() -> Self {
        let registry = ClassRegistry {
            classes: DashMap::new(),
            names: DashMap::new(),
            singletons: DashMap::new(),
            next_id: AtomicU32::new(Self::BUILTIN_COUNT),
        };

        let builtins: [(ClassId, &str, Option<ClassId>); 16] = [
            (ClassId::BASIC_OBJECT, "BasicObject", None),
            (ClassId::OBJECT, "Object", Some(ClassId::BASIC_OBJECT)),
            (ClassId::MODULE, "Module", Some(ClassId::OBJECT)),
            (ClassId::CLASS, "Class", Some(ClassId::MODULE)),
            (ClassId::NIL, "NilClass", Some(ClassId::OBJECT)),
            (ClassId::TRUE, "TrueClass", Some(ClassId::OBJECT)),
            (ClassId::FALSE, "FalseClass", Some(ClassId::OBJECT)),
            (ClassId::NUMERIC, "Numeric", Some(ClassId::OBJECT)),
            (ClassId::INTEGER, "Integer", Some(ClassId::NUMERIC)),
            (ClassId::FLOAT, "Float", Some(ClassId::NUMERIC)),
            (ClassId::STRING, "String", Some(ClassId::OBJECT)),
            (ClassId::SYMBOL, "Symbol", Some(ClassId::OBJECT)),
            (ClassId::ARRAY, "Array", Some(ClassId::OBJECT)),
            (ClassId::HASH, "Hash", Some(ClassId::OBJECT)),
            (ClassId::PROC, "Proc", Some(ClassId::OBJECT)),
            (ClassId::VOID, "Void", Some(ClassId::OBJECT)),
        ];
        for (id, name, superclass) in builtins {
            let name: Arc<str> = name.into();
            registry.names.insert(name.clone(), id);
            registry.classes.insert(
                id,
                ClassDef {
                    id,
                    name,
                    kind: ClassKind::Class,
                    superclass,
                    includes: SmallVec::new(),
                },
            );
        }
        registry
    }

    fn allocate(&self, name: Arc<str>, kind: ClassKind, superclass: Option<ClassId>) -> ClassId {
        let id = ClassId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.classes.insert(
            id,
            ClassDef {
                id,
                name,
                kind,
                superclass,
                includes: SmallVec::new(),
            },
        );
        id
    }

    /// Registers a named class. `superclass` defaults to `Object`.
    pub fn define_class(&self, name: &str, superclass: Option<ClassId>) -> Result<ClassId, CoreError> {
        let superclass = superclass.unwrap_or(ClassId::OBJECT);
        match self.kind(superclass)? {
            ClassKind::Class => {}
            _ => {
                return Err(CoreError::NotAClass {
                    name: self.name(superclass).to_string(),
                })
            }
        }
        self.register_named(name, ClassKind::Class, Some(superclass))
    }

    /// Registers a named module.
    pub fn define_module(&self, name: &str) -> Result<ClassId, CoreError> {
        self.register_named(name, ClassKind::Module, None)
    }

    fn register_named(
        &self,
        name: &str,
        kind: ClassKind,
        superclass: Option<ClassId>,
    ) -> Result<ClassId, CoreError> {
        if self.names.contains_key(name) {
            return Err(CoreError::DuplicateClassName {
                name: name.to_string(),
            });
        }
        let name: Arc<str> = name.into();
        let id = self.allocate(name.clone(), kind, superclass);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Appends `module` to the include list of `target`.
    ///
    /// Including a module twice is a no-op.
    pub fn include(&self, target: ClassId, module: ClassId) -> Result<(), CoreError> {
        if self.kind(module)? != ClassKind::Module {
            return Err(CoreError::NotAModule {
                name: self.name(module).to_string(),
            });
        }
        self.kind(target)?;
        if self.inherits(module, target) {
            return Err(CoreError::CyclicInclude {
                module: self.name(module).to_string(),
                target: self.name(target).to_string(),
            });
        }
        let mut def = self
            .classes
            .get_mut(&target)
            .ok_or(CoreError::ClassNotFound { id: target })?;
        if !def.includes.contains(&module) {
            def.includes.push(module);
        }
        Ok(())
    }

    /// Returns the singleton class of `id`, creating it on first use.
    ///
    /// The singleton of a class inherits from the singleton of its superclass
    /// (`Class` at the root); the singleton of a module inherits from `Module`.
    pub fn singleton_class(&self, id: ClassId) -> ClassId {
        if let Some(existing) = self.singletons.get(&id) {
            return *existing;
        }
        let (name, kind, superclass) = match self.classes.get(&id) {
            Some(def) => (def.name.clone(), def.kind, def.superclass),
            None => (Arc::from("?"), ClassKind::Class, None),
        };
        let singleton_super = match kind {
            ClassKind::Module => ClassId::MODULE,
            ClassKind::Singleton { .. } => ClassId::CLASS,
            ClassKind::Class => match superclass {
                Some(sup) => self.singleton_class(sup),
                None => ClassId::CLASS,
            },
        };
        *self.singletons.entry(id).or_insert_with(|| {
            self.allocate(
                format!("#<Class:{}>", name).into(),
                ClassKind::Singleton { attached: id },
                Some(singleton_super),
            )
        })
    }

    pub fn get(&self, id: ClassId) -> Option<ClassDef> {
        self.classes.get(&id).map(|def| def.clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<ClassId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn kind(&self, id: ClassId) -> Result<ClassKind, CoreError> {
        self.classes
            .get(&id)
            .map(|def| def.kind)
            .ok_or(CoreError::ClassNotFound { id })
    }

    /// Display name of a class; `"?"` for unknown ids.
    pub fn name(&self, id: ClassId) -> Arc<str> {
        self.classes
            .get(&id)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| Arc::from("?"))
    }

    pub fn superclass(&self, id: ClassId) -> Option<ClassId> {
        self.classes.get(&id).and_then(|def| def.superclass)
    }

    /// For a singleton class, the class or module it is attached to.
    pub fn attached(&self, id: ClassId) -> Option<ClassId> {
        match self.classes.get(&id)?.kind {
            ClassKind::Singleton { attached } => Some(attached),
            _ => None,
        }
    }

    pub fn is_module(&self, id: ClassId) -> bool {
        matches!(self.kind(id), Ok(ClassKind::Module))
    }

    /// Returns the class of a runtime value.
    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => ClassId::NIL,
            Value::Bool(true) => ClassId::TRUE,
            Value::Bool(false) => ClassId::FALSE,
            Value::Integer(_) => ClassId::INTEGER,
            Value::Float(_) => ClassId::FLOAT,
            Value::Str(_) => ClassId::STRING,
            Value::Symbol(_) => ClassId::SYMBOL,
            Value::Array(_) => ClassId::ARRAY,
            Value::Hash(_) => ClassId::HASH,
            Value::Object(obj) => obj.class,
            Value::Class(id) => self.singleton_class(*id),
            Value::Proc(_) => ClassId::PROC,
            Value::Void => ClassId::VOID,
        }
    }

    /// `value.is_a?(target)`.
    pub fn is_a(&self, value: &Value, target: ClassId) -> bool {
        let class = self.class_of(value);
        class == target || self.inherits(class, target)
    }

    /// Returns `true` if `target` appears among the ancestors of `class`
    /// (including `class` itself).
    ///
    /// Walks the superclass chain and include lists without building the
    /// ancestor vector.
    pub fn inherits(&self, class: ClassId, target: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            let (superclass, includes) = match self.classes.get(&id) {
                Some(def) => (def.superclass, def.includes.clone()),
                None => return false,
            };
            if includes.iter().any(|m| self.inherits(*m, target)) {
                return true;
            }
            current = superclass;
        }
        false
    }

    /// Linearised ancestor chain: the class, its included modules (latest
    /// include first), then the superclass's ancestors. Duplicates keep their
    /// first position.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        self.push_ancestors(id, &mut out);
        out
    }

    fn push_ancestors(&self, id: ClassId, out: &mut Vec<ClassId>) {
        let (superclass, includes) = match self.classes.get(&id) {
            Some(def) => (def.superclass, def.includes.clone()),
            None => return,
        };
        if !out.contains(&id) {
            out.push(id);
        }
        for module in includes.iter().rev() {
            self.push_ancestors(*module, out);
        }
        if let Some(sup) = superclass {
            self.push_ancestors(sup, out);
        }
    }

    /// Ruby-style `inspect` with class names resolved.
    pub fn inspect(&self, value: &Value) -> String {
        match value {
            Value::Object(obj) => {
                if obj.fields.is_empty() {
                    format!("#<{}>", self.name(obj.class))
                } else {
                    let fields: Vec<String> = obj
                        .fields
                        .iter()
                        .map(|(k, v)| format!("@{}={}", k, self.inspect(v)))
                        .collect();
                    format!("#<{} {}>", self.name(obj.class), fields.join(", "))
                }
            }
            Value::Class(id) => self.name(*id).to_string(),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(|v| self.inspect(v)).collect();
                format!("[{}]", inner.join(", "))
            }
            other => other.inspect(),
        }
    }

    /// Describes a value for type-mismatch messages:
    /// `type String with value "x"`, or `type NilClass` for nil.
    pub fn describe(&self, value: &Value) -> String {
        let class_name = self.name(self.class_of(value));
        if value.is_nil() {
            format!("type {}", class_name)
        } else {
            format!(
                "type {} with value {}",
                class_name,
                truncate_middle(&self.inspect(value), 30, 30)
            )
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the first `start` and last `end` characters of long strings.
pub fn truncate_middle(s: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= start + end + 3 {
        return s.to_string();
    }
    let head: String = chars[..start].iter().collect();
    let tail: String = chars[chars.len() - end..].iter().collect();
    format!("{}...{}", head, tail)
}

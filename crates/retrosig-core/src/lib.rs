pub mod class;
pub mod error;
pub mod id;
pub mod params;
pub mod subtype;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use class::{ClassDef, ClassKind, ClassRegistry};
pub use error::CoreError;
pub use id::{ClassId, MethodKey, SourceLocation};
pub use params::{ParamKind, Parameter};
pub use types::{TypeKind, TypePredicate, TypeRef};
pub use value::{Object, Proc, Value};

//! Runtime method-signature checking.
//!
//! Declare a signature with [`Runtime::sig`], define the method, and every
//! call is checked against the declared argument, block, receiver and return
//! types. Overrides are checked against the definitions they replace when a
//! signature is realised.

pub mod config;
pub mod declaration;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod method;
pub mod mode;
pub mod overrides;
pub mod profile;
pub mod registry;
pub mod runtime;
pub mod signature;

pub use config::{Configuration, SigValidationContext};
pub use declaration::{DeclBuilder, Declaration, DeclarationError, Returns};
pub use error::{CallValidationError, RuntimeError, ValidationKind};
pub use host::{MethodEntry, Visibility};
pub use method::{Callable, Invocation, Method, MethodInfo};
pub use mode::{CheckLevel, Mode};
pub use overrides::OverrideError;
pub use profile::{Profile, ProfileSnapshot};
pub use runtime::Runtime;
pub use signature::{ShapeMismatchError, Signature};

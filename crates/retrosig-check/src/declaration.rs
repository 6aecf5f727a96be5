//! Declaration builder: the staged, then frozen, form of a signature.
//!
//! A declaration block receives a [`DeclBuilder`] and calls its fluent
//! setters; [`DeclBuilder::finalize`] validates the combination, fills
//! defaults and hands out the immutable [`Declaration`].
//!
//! Mode transitions:
//!
//! ```text
//! standard ──abstract──────> abstract            (terminal)
//! standard ──override──────> override ──overridable──> overridable_override
//! standard ──overridable───> overridable ──override──> overridable_override
//! standard ──implementation> override (+implementation marker)
//! overridable ─implementation> overridable_override (+implementation marker)
//! ```
//!
//! Every other setter may be called at most once; `returns`/`void` and the
//! three of `checked`/`soft`/`generated` are mutually exclusive.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use retrosig_core::id::ClassId;
use retrosig_core::types::{referenced_type_parameters, TypeRef};
use thiserror::Error;

use crate::mode::{CheckLevel, Mode};

/// The declared return of a signature.
#[derive(Debug, Clone)]
pub enum Returns {
    /// The real return value is discarded and replaced by `Value::Void`.
    Void,
    Type(TypeRef),
}

impl Returns {
    pub fn is_void(&self) -> bool {
        matches!(self, Returns::Void)
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Returns::Void => None,
            Returns::Type(t) => Some(t),
        }
    }
}

impl fmt::Display for Returns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returns::Void => f.write_str("<VOID>"),
            Returns::Type(t) => write!(f, "{}", t),
        }
    }
}

/// Errors raised while building a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("You can't modify a signature declaration after it has been used.")]
    Finalized,

    #[error("You can't call .{setter} multiple times in a signature.")]
    Repeated { setter: &'static str },

    #[error("You can't call .returns after calling .void.")]
    ReturnsAfterVoid,

    #[error("You can't call .void after calling .returns.")]
    VoidAfterReturns,

    #[error("You can't use .{second} with .{first}.")]
    Exclusive {
        first: &'static str,
        second: &'static str,
    },

    #[error(".{mode} cannot be repeated in a single signature")]
    ModeRepeated { mode: &'static str },

    #[error("`.{requested}` cannot be combined with `.{current}`.")]
    ModeConflict {
        requested: &'static str,
        current: &'static str,
    },

    #[error(
        "'params' was called without any arguments, but it needs to be called with keyword arguments. \
         Omit 'params' entirely for methods with no parameters."
    )]
    EmptyParams,

    #[error("Parameter `{name}` is declared more than once.")]
    DuplicateParam { name: String },

    #[error("Type parameter `{name}` is declared more than once.")]
    DuplicateTypeParameter { name: String },

    #[error("You must provide a return type; use the `.returns` or `.void` builder methods.")]
    MissingReturnType,

    #[error("`T.type_parameter(:{name})` is used but `{name}` is not declared in `type_parameters`.")]
    UndeclaredTypeParameter { name: String },

    #[error("{0}")]
    Other(String),
}

/// A finalized, immutable declaration.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// The class or module the declaration was made in.
    pub scope: ClassId,
    pub params: IndexMap<Arc<str>, TypeRef>,
    pub returns: Returns,
    pub bind: Option<TypeRef>,
    pub mode: Mode,
    pub checked: CheckLevel,
    /// Report failures to the soft-assert handler with this notify target.
    pub soft_notify: Option<Arc<str>>,
    /// Failures are logged, not raised.
    pub generated: bool,
    pub type_parameters: Vec<Arc<str>>,
    pub override_allow_incompatible: bool,
    /// Declared through `.implementation`: the parent must be abstract.
    pub implementation: bool,
}

/// Fluent builder for a [`Declaration`].
#[derive(Debug)]
pub struct DeclBuilder {
    scope: ClassId,
    default_checked: CheckLevel,
    params: Option<IndexMap<Arc<str>, TypeRef>>,
    returns: Option<Returns>,
    bind: Option<TypeRef>,
    mode: Mode,
    checked: Option<CheckLevel>,
    soft: Option<Arc<str>>,
    generated: bool,
    type_parameters: Option<Vec<Arc<str>>>,
    override_allow_incompatible: bool,
    implementation: bool,
    finalized: bool,
}

type BuildResult<'a> = Result<&'a mut DeclBuilder, DeclarationError>;

impl DeclBuilder {
    /// A fresh builder for a declaration made in `scope`. `default_checked`
    /// is used when `.checked` is never called.
    pub fn new(scope: ClassId, default_checked: CheckLevel) -> Self {
        DeclBuilder {
            scope,
            default_checked,
            params: None,
            returns: None,
            bind: None,
            mode: Mode::Standard,
            checked: None,
            soft: None,
            generated: false,
            type_parameters: None,
            override_allow_incompatible: false,
            implementation: false,
            finalized: false,
        }
    }

    fn check_live(&self) -> Result<(), DeclarationError> {
        if self.finalized {
            Err(DeclarationError::Finalized)
        } else {
            Ok(())
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Declares parameter types by name, in the callable's parameter order.
    pub fn params<I, K>(&mut self, params: I) -> BuildResult<'_>
    where
        I: IntoIterator<Item = (K, TypeRef)>,
        K: Into<Arc<str>>,
    {
        self.check_live()?;
        if self.params.is_some() {
            return Err(DeclarationError::Repeated { setter: "params" });
        }
        let mut map = IndexMap::new();
        for (name, ty) in params {
            let name: Arc<str> = name.into();
            if map.contains_key(&name) {
                return Err(DeclarationError::DuplicateParam {
                    name: name.to_string(),
                });
            }
            map.insert(name, ty);
        }
        if map.is_empty() {
            return Err(DeclarationError::EmptyParams);
        }
        self.params = Some(map);
        Ok(self)
    }

    pub fn returns(&mut self, ty: TypeRef) -> BuildResult<'_> {
        self.check_live()?;
        match self.returns {
            Some(Returns::Void) => Err(DeclarationError::ReturnsAfterVoid),
            Some(Returns::Type(_)) => Err(DeclarationError::Repeated { setter: "returns" }),
            None => {
                self.returns = Some(Returns::Type(ty));
                Ok(self)
            }
        }
    }

    pub fn void(&mut self) -> BuildResult<'_> {
        self.check_live()?;
        match self.returns {
            Some(Returns::Type(_)) => Err(DeclarationError::VoidAfterReturns),
            Some(Returns::Void) => Err(DeclarationError::Repeated { setter: "void" }),
            None => {
                self.returns = Some(Returns::Void);
                Ok(self)
            }
        }
    }

    /// Constrains the receiver (`self`) the callable is invoked on.
    pub fn bind(&mut self, ty: TypeRef) -> BuildResult<'_> {
        self.check_live()?;
        if self.bind.is_some() {
            return Err(DeclarationError::Repeated { setter: "bind" });
        }
        self.bind = Some(ty);
        Ok(self)
    }

    pub fn checked(&mut self, level: CheckLevel) -> BuildResult<'_> {
        self.check_live()?;
        if self.checked.is_some() {
            return Err(DeclarationError::Repeated { setter: "checked" });
        }
        if self.soft.is_some() {
            return Err(DeclarationError::Exclusive {
                first: "soft",
                second: "checked",
            });
        }
        if self.generated {
            return Err(DeclarationError::Exclusive {
                first: "generated",
                second: "checked",
            });
        }
        self.checked = Some(level);
        Ok(self)
    }

    /// Downgrades failures to soft assertions routed to `notify`.
    pub fn soft(&mut self, notify: &str) -> BuildResult<'_> {
        self.check_live()?;
        if self.soft.is_some() {
            return Err(DeclarationError::Repeated { setter: "soft" });
        }
        if self.checked.is_some() {
            return Err(DeclarationError::Exclusive {
                first: "checked",
                second: "soft",
            });
        }
        if self.generated {
            return Err(DeclarationError::Exclusive {
                first: "generated",
                second: "soft",
            });
        }
        self.soft = Some(notify.into());
        Ok(self)
    }

    /// Marks the signature as belonging to generated code: failures are
    /// logged once instead of raised.
    pub fn generated(&mut self) -> BuildResult<'_> {
        self.check_live()?;
        if self.generated {
            return Err(DeclarationError::Repeated { setter: "generated" });
        }
        if self.checked.is_some() {
            return Err(DeclarationError::Exclusive {
                first: "checked",
                second: "generated",
            });
        }
        if self.soft.is_some() {
            return Err(DeclarationError::Exclusive {
                first: "soft",
                second: "generated",
            });
        }
        self.generated = true;
        Ok(self)
    }

    /// Declares the generic type parameters usable via `T.type_parameter`.
    pub fn type_parameters<I, K>(&mut self, names: I) -> BuildResult<'_>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arc<str>>,
    {
        self.check_live()?;
        if self.type_parameters.is_some() {
            return Err(DeclarationError::Repeated {
                setter: "type_parameters",
            });
        }
        let mut out: Vec<Arc<str>> = Vec::new();
        for name in names {
            let name = name.into();
            if out.contains(&name) {
                return Err(DeclarationError::DuplicateTypeParameter {
                    name: name.to_string(),
                });
            }
            out.push(name);
        }
        self.type_parameters = Some(out);
        Ok(self)
    }

    pub fn r#abstract(&mut self) -> BuildResult<'_> {
        self.check_live()?;
        match self.mode {
            Mode::Standard => {
                self.mode = Mode::Abstract;
                Ok(self)
            }
            Mode::Abstract => Err(DeclarationError::ModeRepeated { mode: "abstract" }),
            _ => Err(DeclarationError::ModeConflict {
                requested: "abstract",
                current: self.mode_label(),
            }),
        }
    }

    pub fn r#override(&mut self) -> BuildResult<'_> {
        self.override_with(false)
    }

    /// `.override(allow_incompatible: true)`: skip shape and variance checks
    /// against the parent.
    pub fn override_allow_incompatible(&mut self) -> BuildResult<'_> {
        self.override_with(true)
    }

    fn override_with(&mut self, allow_incompatible: bool) -> BuildResult<'_> {
        self.check_live()?;
        match self.mode {
            Mode::Standard => {
                self.mode = Mode::Override;
                self.override_allow_incompatible = allow_incompatible;
                Ok(self)
            }
            Mode::Overridable => {
                self.mode = Mode::OverridableOverride;
                self.override_allow_incompatible = allow_incompatible;
                Ok(self)
            }
            Mode::Override | Mode::OverridableOverride if !self.implementation => {
                Err(DeclarationError::ModeRepeated { mode: "override" })
            }
            _ => Err(DeclarationError::ModeConflict {
                requested: "override",
                current: self.mode_label(),
            }),
        }
    }

    pub fn overridable(&mut self) -> BuildResult<'_> {
        self.check_live()?;
        match self.mode {
            Mode::Standard => {
                self.mode = Mode::Overridable;
                Ok(self)
            }
            Mode::Override => {
                self.mode = Mode::OverridableOverride;
                Ok(self)
            }
            Mode::Overridable | Mode::OverridableOverride => {
                Err(DeclarationError::ModeRepeated { mode: "overridable" })
            }
            Mode::Abstract | Mode::Untyped => Err(DeclarationError::ModeConflict {
                requested: "overridable",
                current: self.mode_label(),
            }),
        }
    }

    /// Declares that this definition implements an abstract parent.
    pub fn implementation(&mut self) -> BuildResult<'_> {
        self.check_live()?;
        if self.implementation {
            return Err(DeclarationError::ModeRepeated {
                mode: "implementation",
            });
        }
        match self.mode {
            Mode::Standard => {
                self.mode = Mode::Override;
                self.implementation = true;
                Ok(self)
            }
            Mode::Overridable => {
                self.mode = Mode::OverridableOverride;
                self.implementation = true;
                Ok(self)
            }
            _ => Err(DeclarationError::ModeConflict {
                requested: "implementation",
                current: self.mode_label(),
            }),
        }
    }

    fn mode_label(&self) -> &'static str {
        match (self.mode, self.implementation) {
            (Mode::Override, true) => "implementation",
            (Mode::OverridableOverride, true) => "overridable.implementation",
            (mode, _) => mode.as_str(),
        }
    }

    /// Validates, fills defaults and freezes the declaration.
    pub fn finalize(&mut self) -> Result<Declaration, DeclarationError> {
        self.check_live()?;
        let returns = self
            .returns
            .clone()
            .ok_or(DeclarationError::MissingReturnType)?;
        let params = self.params.clone().unwrap_or_default();
        let type_parameters = self.type_parameters.clone().unwrap_or_default();

        let mut referenced = Vec::new();
        for ty in params.values().chain(returns.as_type()).chain(self.bind.as_ref()) {
            referenced_type_parameters(ty.as_ref(), &mut referenced);
        }
        if let Some(name) = referenced.iter().find(|n| !type_parameters.contains(n)) {
            return Err(DeclarationError::UndeclaredTypeParameter {
                name: name.to_string(),
            });
        }

        let checked = match (self.checked, &self.soft) {
            (Some(level), _) => level,
            (None, Some(_)) => CheckLevel::Always,
            (None, None) => self.default_checked,
        };

        self.finalized = true;
        Ok(Declaration {
            scope: self.scope,
            params,
            returns,
            bind: self.bind.clone(),
            mode: self.mode,
            checked,
            soft_notify: self.soft.clone(),
            generated: self.generated,
            type_parameters,
            override_allow_incompatible: self.override_allow_incompatible,
            implementation: self.implementation,
        })
    }
}

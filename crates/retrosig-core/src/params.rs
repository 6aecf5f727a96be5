//! Reflected parameter lists of real callables.
//!
//! A [`Parameter`] is what the host knows about one formal parameter of a
//! callable: its kind and, usually, its name. Signature construction
//! reconciles these against the declared parameter types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The kind of a formal parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Required positional.
    Req,
    /// Optional positional.
    Opt,
    /// Splat (`*rest`).
    Rest,
    /// Required keyword.
    KeyReq,
    /// Optional keyword.
    Key,
    /// Double splat (`**opts`).
    KeyRest,
    /// Block (`&blk`).
    Block,
}

impl ParamKind {
    pub fn is_positional(self) -> bool {
        matches!(self, ParamKind::Req | ParamKind::Opt)
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, ParamKind::KeyReq | ParamKind::Key)
    }
}

/// One formal parameter. `name` is `None` for parameters the host could not
/// name, such as the implicit argument of a generated attribute writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub kind: ParamKind,
    pub name: Option<Arc<str>>,
}

impl Parameter {
    pub fn new(kind: ParamKind, name: &str) -> Self {
        Parameter {
            kind,
            name: Some(name.into()),
        }
    }

    pub fn unnamed(kind: ParamKind) -> Self {
        Parameter { kind, name: None }
    }

    pub fn req(name: &str) -> Self {
        Parameter::new(ParamKind::Req, name)
    }

    pub fn opt(name: &str) -> Self {
        Parameter::new(ParamKind::Opt, name)
    }

    pub fn rest(name: &str) -> Self {
        Parameter::new(ParamKind::Rest, name)
    }

    pub fn keyreq(name: &str) -> Self {
        Parameter::new(ParamKind::KeyReq, name)
    }

    pub fn key(name: &str) -> Self {
        Parameter::new(ParamKind::Key, name)
    }

    pub fn keyrest(name: &str) -> Self {
        Parameter::new(ParamKind::KeyRest, name)
    }

    pub fn block(name: &str) -> Self {
        Parameter::new(ParamKind::Block, name)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("");
        match self.kind {
            ParamKind::Req => write!(f, "{}", name),
            ParamKind::Opt => write!(f, "{}=...", name),
            ParamKind::Rest => write!(f, "*{}", name),
            ParamKind::KeyReq => write!(f, "{}:", name),
            ParamKind::Key => write!(f, "{}: ...", name),
            ParamKind::KeyRest => write!(f, "**{}", name),
            ParamKind::Block => write!(f, "&{}", name),
        }
    }
}

/// Names a parameter list positionally: the i-th parameter gets its own name
/// or `arg{i}` when it has none.
pub fn positional_names(params: &[Parameter]) -> Vec<Arc<str>> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| match &p.name {
            Some(name) => name.clone(),
            None => Arc::from(format!("arg{}", i)),
        })
        .collect()
}

//! Per-class method tables.
//!
//! The host stores one [`MethodEntry`] per [`MethodKey`]. Dispatch walks the
//! receiver class's linearised ancestors and takes the first definition;
//! `super` continues the walk after the definition's owner. Entries are
//! cloned out of the map before they are called, so a callable may replace
//! its own entry while it runs.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use retrosig_core::class::ClassRegistry;
use retrosig_core::id::{ClassId, MethodKey};
use serde::{Deserialize, Serialize};

use crate::method::{Callable, MethodInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// An installed callable and the definition it stands for.
#[derive(Clone)]
pub struct MethodEntry {
    /// The original definition's identity and shape; survives replacement.
    pub info: MethodInfo,
    pub callable: Arc<dyn Callable>,
    pub visibility: Visibility,
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("info", &self.info)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct Host {
    methods: DashMap<MethodKey, MethodEntry>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a definition, replacing any previous one under the same key.
    pub fn define(&self, entry: MethodEntry) {
        self.methods.insert(entry.info.key.clone(), entry);
    }

    pub fn get(&self, key: &MethodKey) -> Option<MethodEntry> {
        self.methods.get(key).map(|e| e.clone())
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.methods.contains_key(key)
    }

    /// Swaps the callable behind `key`, keeping its info and visibility.
    /// Returns `false` if nothing is defined there.
    pub fn replace(&self, key: &MethodKey, callable: Arc<dyn Callable>) -> bool {
        match self.methods.get_mut(key) {
            Some(mut entry) => {
                entry.callable = callable;
                true
            }
            None => false,
        }
    }

    pub fn visibility(&self, key: &MethodKey) -> Option<Visibility> {
        self.methods.get(key).map(|e| e.visibility)
    }

    pub fn set_visibility(&self, key: &MethodKey, visibility: Visibility) -> bool {
        match self.methods.get_mut(key) {
            Some(mut entry) => {
                entry.visibility = visibility;
                true
            }
            None => false,
        }
    }

    /// First definition of `name` along the ancestors of `class`.
    pub fn lookup(&self, classes: &ClassRegistry, class: ClassId, name: &str) -> Option<MethodEntry> {
        classes
            .ancestors(class)
            .into_iter()
            .find_map(|ancestor| self.get(&MethodKey::new(ancestor, name)))
    }

    /// Next definition of `name` after `owner` along the ancestors of
    /// `receiver_class`.
    pub fn super_method(
        &self,
        classes: &ClassRegistry,
        receiver_class: ClassId,
        owner: ClassId,
        name: &str,
    ) -> Option<MethodEntry> {
        let ancestors = classes.ancestors(receiver_class);
        let start = ancestors.iter().position(|c| *c == owner)? + 1;
        ancestors[start..]
            .iter()
            .find_map(|ancestor| self.get(&MethodKey::new(*ancestor, name)))
    }

    /// Number of installed definitions.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").field("methods", &self.methods.len()).finish()
    }
}

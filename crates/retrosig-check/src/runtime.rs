//! The runtime facade: class registry, method tables, signature registry and
//! configuration behind one handle.
//!
//! ```text
//! rt.sig(scope, |s| ...)        park a declaration for this thread
//! rt.define_method(...)         define; consumes the parked declaration
//! rt.call(receiver, name, args) dispatch through whatever is installed
//! ```
//!
//! Call sites are captured with `#[track_caller]` and become the caller
//! location in validation reports.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use retrosig_core::class::ClassRegistry;
use retrosig_core::id::{ClassId, MethodKey, SourceLocation};
use retrosig_core::params::Parameter;
use retrosig_core::value::Value;

use crate::config::Configuration;
use crate::declaration::{DeclBuilder, DeclarationError};
use crate::error::RuntimeError;
use crate::host::{Host, MethodEntry, Visibility};
use crate::method::{Invocation, Method, MethodInfo};
use crate::mode::Mode;
use crate::profile::{Profile, ProfileSnapshot};
use crate::registry::{DeclarationBlock, MethodDefined, Registry, SigBlock};
use crate::signature::Signature;

pub struct Runtime {
    classes: ClassRegistry,
    host: Host,
    registry: Registry,
    config: Configuration,
    profile: Profile,
    /// `sig` declarations waiting for their definition, per thread.
    pending: DashMap<ThreadId, DeclarationBlock>,
}

impl Runtime {
    pub fn new(config: Configuration) -> Self {
        Runtime {
            classes: ClassRegistry::new(),
            host: Host::new(),
            registry: Registry::new(),
            profile: Profile::new(config.sample_rate()),
            config,
            pending: DashMap::new(),
        }
    }

    /// A runtime configured from `RETROSIG_*` environment variables.
    pub fn from_env() -> Self {
        Runtime::new(Configuration::from_env())
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_snapshot(&self) -> ProfileSnapshot {
        self.profile.snapshot()
    }

    // -- declarations ------------------------------------------------------

    /// Declares the signature of the next method defined on this thread.
    #[track_caller]
    pub fn sig<F>(&self, scope: ClassId, block: F) -> Result<(), RuntimeError>
    where
        F: Fn(&mut DeclBuilder) -> Result<(), DeclarationError> + Send + Sync + 'static,
    {
        self.declare(scope, Arc::new(block), false, SourceLocation::caller())
    }

    /// Like [`sig`](Self::sig), but the signature is only recorded: the
    /// method is never wrapped with a validator.
    #[track_caller]
    pub fn sig_raw<F>(&self, scope: ClassId, block: F) -> Result<(), RuntimeError>
    where
        F: Fn(&mut DeclBuilder) -> Result<(), DeclarationError> + Send + Sync + 'static,
    {
        self.declare(scope, Arc::new(block), true, SourceLocation::caller())
    }

    fn declare(&self, scope: ClassId, block: SigBlock, raw: bool, location: SourceLocation) -> Result<(), RuntimeError> {
        match self.pending.entry(thread::current().id()) {
            Entry::Occupied(_) => Err(RuntimeError::SigUsage(
                "You called sig twice without declaring a method inbetween".into(),
            )),
            Entry::Vacant(slot) => {
                tracing::trace!(scope = %scope, %location, raw, "sig declared");
                slot.insert(DeclarationBlock {
                    scope,
                    location,
                    block,
                    raw,
                });
                Ok(())
            }
        }
    }

    /// Whether this thread has a `sig` waiting for a definition.
    pub fn has_pending_sig(&self) -> bool {
        self.pending.contains_key(&thread::current().id())
    }

    // -- definitions -------------------------------------------------------

    #[track_caller]
    pub fn define_method<F>(
        &self,
        owner: ClassId,
        name: &str,
        params: Vec<Parameter>,
        body: F,
    ) -> Result<MethodKey, RuntimeError>
    where
        F: Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let location = SourceLocation::caller();
        self.install(owner, false, name, params, Visibility::Public, body, location)
    }

    #[track_caller]
    pub fn define_method_with_visibility<F>(
        &self,
        owner: ClassId,
        name: &str,
        params: Vec<Parameter>,
        visibility: Visibility,
        body: F,
    ) -> Result<MethodKey, RuntimeError>
    where
        F: Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let location = SourceLocation::caller();
        self.install(owner, false, name, params, visibility, body, location)
    }

    /// Defines a class-level method on `owner`'s singleton class. A pending
    /// `sig` written in `owner` applies.
    #[track_caller]
    pub fn define_singleton_method<F>(
        &self,
        owner: ClassId,
        name: &str,
        params: Vec<Parameter>,
        body: F,
    ) -> Result<MethodKey, RuntimeError>
    where
        F: Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let location = SourceLocation::caller();
        self.install(owner, true, name, params, Visibility::Public, body, location)
    }

    #[allow(clippy::too_many_arguments)]
    fn install<F>(
        &self,
        hook_scope: ClassId,
        singleton: bool,
        name: &str,
        params: Vec<Parameter>,
        visibility: Visibility,
        body: F,
        location: SourceLocation,
    ) -> Result<MethodKey, RuntimeError>
    where
        F: Fn(&Runtime, &Invocation<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let owner = if singleton {
            self.classes.singleton_class(hook_scope)
        } else {
            hook_scope
        };
        let info = MethodInfo {
            key: MethodKey::new(owner, name),
            owner_name: self.classes.name(owner),
            params: params.into(),
            location,
        };
        let key = info.key.clone();
        let original = Method::new(info.clone(), body);

        self.registry.forget(&key);
        self.host.define(MethodEntry {
            info,
            callable: Arc::new(original.clone()),
            visibility,
        });

        let Some((_, declaration)) = self.pending.remove(&thread::current().id()) else {
            return Ok(key);
        };
        if declaration.scope != hook_scope && declaration.scope != owner {
            return Err(RuntimeError::SigUsage(format!(
                "A method ({}) is being added on a different class/module ({}) than the last call to `sig` ({}). \
                 Make sure each call to `sig` is immediately followed by a method definition on the same class/module.",
                name,
                self.classes.name(hook_scope),
                self.classes.name(declaration.scope)
            )));
        }

        let wrapper = self.registry.on_method_defined(MethodDefined {
            hook_scope,
            original,
            declaration,
            singleton,
        });
        self.host.replace(&key, wrapper);
        Ok(key)
    }

    // -- calls -------------------------------------------------------------

    /// Calls a public method on `receiver`.
    #[track_caller]
    pub fn call(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let caller = SourceLocation::caller();
        self.dispatch(receiver, name, args, None, &caller, true)
    }

    #[track_caller]
    pub fn call_with_block(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: &Value,
    ) -> Result<Value, RuntimeError> {
        let caller = SourceLocation::caller();
        self.dispatch(receiver, name, args, Some(block), &caller, true)
    }

    /// Calls any method on `receiver`, ignoring visibility.
    #[track_caller]
    pub fn send(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, RuntimeError> {
        let caller = SourceLocation::caller();
        self.dispatch(receiver, name, args, block, &caller, false)
    }

    /// Calls the next definition of the running method, from inside its body.
    #[track_caller]
    pub fn call_super(&self, inv: &Invocation<'_>, args: &[Value]) -> Result<Value, RuntimeError> {
        let caller = SourceLocation::caller();
        let entry = self
            .host
            .super_method(&self.classes, inv.receiver_class, inv.owner, inv.name)
            .ok_or_else(|| RuntimeError::NoMethod {
                name: format!("super: {}", inv.name),
                receiver: self.classes.inspect(inv.receiver),
            })?;
        let next = Invocation {
            owner: entry.info.owner(),
            args,
            caller: &caller,
            ..*inv
        };
        self.invoke_entry(&entry, &next)
    }

    fn dispatch(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: Option<&Value>,
        caller: &SourceLocation,
        check_visibility: bool,
    ) -> Result<Value, RuntimeError> {
        let class = self.classes.class_of(receiver);
        let entry = self
            .host
            .lookup(&self.classes, class, name)
            .ok_or_else(|| RuntimeError::NoMethod {
                name: name.to_string(),
                receiver: self.classes.inspect(receiver),
            })?;
        if check_visibility && entry.visibility == Visibility::Private {
            return Err(RuntimeError::PrivateMethod {
                name: name.to_string(),
                receiver: self.classes.inspect(receiver),
            });
        }
        let inv = Invocation {
            receiver,
            receiver_class: class,
            owner: entry.info.owner(),
            name,
            args,
            block,
            caller,
        };
        self.invoke_entry(&entry, &inv)
    }

    /// Runs an entry that was already looked up.
    pub fn invoke_entry(&self, entry: &MethodEntry, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        entry.callable.call(self, inv)
    }

    // -- signatures ----------------------------------------------------------

    /// The signature of the method stored under `key`, realising it first if
    /// it is still pending.
    pub fn signature_for(&self, key: &MethodKey) -> Result<Option<Arc<Signature>>, RuntimeError> {
        self.registry.maybe_run_sig_block_for_key(self, key)?;
        Ok(self.registry.signature_for_key(key))
    }

    /// The signature of whatever `class` dispatches `name` to.
    pub fn signature_for_method(&self, class: ClassId, name: &str) -> Result<Option<Arc<Signature>>, RuntimeError> {
        match self.host.lookup(&self.classes, class, name) {
            Some(entry) => self.signature_for(&entry.info.key),
            None => Ok(None),
        }
    }

    /// Realises every pending declaration now instead of on first call.
    pub fn run_all_sig_blocks(&self) -> Result<(), RuntimeError> {
        self.registry.run_all_sig_blocks(self)
    }

    pub fn register_forwarder(
        &self,
        from: &MethodKey,
        to: &MethodKey,
        mode: Mode,
        remove_first_param: bool,
    ) -> Result<(), RuntimeError> {
        self.registry.register_forwarder(self, from, to, mode, remove_first_param)
    }

    pub fn enable_checking_in_tests(&self) {
        self.config.enable_checking_in_tests();
    }

    pub fn disable_checking_in_tests(&self) {
        self.config.disable_checking_in_tests();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(Configuration::new())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("host", &self.host)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

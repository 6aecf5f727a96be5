//! Runtime configuration and error/report handlers.
//!
//! A [`Configuration`] is assembled with `with_*` methods before the
//! [`Runtime`](crate::runtime::Runtime) is built. Two switches stay mutable
//! afterwards (checking in tests, the fast path) and are atomics.
//!
//! Environment variables read by [`Configuration::from_env`]:
//! - `RETROSIG_DEFAULT_CHECKED`: `always`, `tests` or `never` (default: `always`)
//! - `RETROSIG_CHECK_TESTS`: `1`/`true` enables `.checked(:tests)` signatures
//! - `RETROSIG_SAMPLE_RATE`: profiling sample rate (default: 101)

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use retrosig_core::id::SourceLocation;

use crate::declaration::{Declaration, DeclarationError};
use crate::error::{CallValidationError, RuntimeError};
use crate::method::MethodInfo;
use crate::mode::CheckLevel;
use crate::profile::DEFAULT_SAMPLE_RATE;
use crate::signature::Signature;

/// Receives every call-time validation failure.
pub type CallValidationHandler = Arc<dyn Fn(&CallValidationError) -> Result<(), RuntimeError> + Send + Sync>;
/// Receives declaration builder failures with the `sig` location.
pub type SigBuilderHandler = Arc<dyn Fn(&DeclarationError, &SourceLocation) -> Result<(), RuntimeError> + Send + Sync>;
/// Receives shape and override failures.
pub type SigValidationHandler =
    Arc<dyn Fn(&RuntimeError, &SigValidationContext) -> Result<(), RuntimeError> + Send + Sync>;
/// `(message, notify)`.
pub type SoftAssertHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;
/// `(message, extra)`.
pub type LogInfoHandler = Arc<dyn Fn(&str, &serde_json::Value) + Send + Sync>;

/// What a sig-validation handler gets to look at.
#[derive(Debug, Clone)]
pub struct SigValidationContext {
    pub method: MethodInfo,
    pub declaration: Declaration,
    /// `None` when the shape itself did not reconcile.
    pub signature: Option<Arc<Signature>>,
    pub super_signature: Option<Arc<Signature>>,
}

pub struct Configuration {
    default_checked: CheckLevel,
    check_tests: AtomicBool,
    fast_path: AtomicBool,
    sample_rate: u64,
    call_validation_handler: Option<CallValidationHandler>,
    sig_builder_handler: Option<SigBuilderHandler>,
    sig_validation_handler: Option<SigValidationHandler>,
    soft_assert_handler: Option<SoftAssertHandler>,
    log_info_handler: Option<LogInfoHandler>,
}

impl Configuration {
    pub fn new() -> Self {
        Configuration {
            default_checked: CheckLevel::Always,
            check_tests: AtomicBool::new(false),
            fast_path: AtomicBool::new(true),
            sample_rate: DEFAULT_SAMPLE_RATE,
            call_validation_handler: None,
            sig_builder_handler: None,
            sig_validation_handler: None,
            soft_assert_handler: None,
            log_info_handler: None,
        }
    }

    /// Defaults overridden by `RETROSIG_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Configuration::new();
        if let Ok(raw) = std::env::var("RETROSIG_DEFAULT_CHECKED") {
            match raw.parse::<CheckLevel>() {
                Ok(level) => config.default_checked = level,
                Err(e) => tracing::warn!(value = %raw, "ignoring RETROSIG_DEFAULT_CHECKED: {}", e),
            }
        }
        if let Ok(raw) = std::env::var("RETROSIG_CHECK_TESTS") {
            let on = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
            config.check_tests = AtomicBool::new(on);
        }
        if let Ok(raw) = std::env::var("RETROSIG_SAMPLE_RATE") {
            match raw.trim().parse::<u64>() {
                Ok(rate) if rate > 0 => config.sample_rate = rate,
                _ => tracing::warn!(value = %raw, "ignoring RETROSIG_SAMPLE_RATE: expected a positive integer"),
            }
        }
        config
    }

    pub fn with_default_checked(mut self, level: CheckLevel) -> Self {
        self.default_checked = level;
        self
    }

    pub fn with_check_tests(self, on: bool) -> Self {
        self.check_tests.store(on, Ordering::Relaxed);
        self
    }

    pub fn with_fast_path(self, on: bool) -> Self {
        self.fast_path.store(on, Ordering::Relaxed);
        self
    }

    /// Sample every `rate`-th fast or medium tier call. Zero is treated as one.
    pub fn with_sample_rate(mut self, rate: u64) -> Self {
        self.sample_rate = rate.max(1);
        self
    }

    pub fn with_call_validation_handler(
        mut self,
        handler: impl Fn(&CallValidationError) -> Result<(), RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        self.call_validation_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_sig_builder_handler(
        mut self,
        handler: impl Fn(&DeclarationError, &SourceLocation) -> Result<(), RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        self.sig_builder_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_sig_validation_handler(
        mut self,
        handler: impl Fn(&RuntimeError, &SigValidationContext) -> Result<(), RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        self.sig_validation_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_soft_assert_handler(mut self, handler: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.soft_assert_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_log_info_handler(
        mut self,
        handler: impl Fn(&str, &serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        self.log_info_handler = Some(Arc::new(handler));
        self
    }

    pub fn default_checked(&self) -> CheckLevel {
        self.default_checked
    }

    pub fn sample_rate(&self) -> u64 {
        self.sample_rate
    }

    /// Whether `.checked(:tests)` signatures are currently enforced.
    pub fn check_tests(&self) -> bool {
        self.check_tests.load(Ordering::Relaxed)
    }

    pub fn enable_checking_in_tests(&self) {
        self.check_tests.store(true, Ordering::Relaxed);
    }

    pub fn disable_checking_in_tests(&self) {
        self.check_tests.store(false, Ordering::Relaxed);
    }

    pub fn fast_path_enabled(&self) -> bool {
        self.fast_path.load(Ordering::Relaxed)
    }

    /// Routes every later installation through the medium or slow tiers.
    pub fn disable_fast_path(&self) {
        self.fast_path.store(false, Ordering::Relaxed);
    }

    pub fn handle_call_validation_error(&self, err: &CallValidationError) -> Result<(), RuntimeError> {
        match &self.call_validation_handler {
            Some(handler) => handler(err),
            None => Err(err.clone().into()),
        }
    }

    pub fn handle_sig_builder_error(
        &self,
        err: &DeclarationError,
        location: &SourceLocation,
    ) -> Result<(), RuntimeError> {
        match &self.sig_builder_handler {
            Some(handler) => handler(err, location),
            None => Err(RuntimeError::Declaration {
                error: err.clone(),
                location: location.clone(),
            }),
        }
    }

    pub fn handle_sig_validation_error(
        &self,
        err: &RuntimeError,
        ctx: &SigValidationContext,
    ) -> Result<(), RuntimeError> {
        match &self.sig_validation_handler {
            Some(handler) => handler(err, ctx),
            None => Err(err.clone()),
        }
    }

    pub fn soft_assert(&self, message: &str, notify: &str) {
        match &self.soft_assert_handler {
            Some(handler) => handler(message, notify),
            None => tracing::warn!(notify = %notify, "{}", message),
        }
    }

    pub fn log_info(&self, message: &str, extra: &serde_json::Value) {
        match &self.log_info_handler {
            Some(handler) => handler(message, extra),
            None => tracing::info!(extra = %extra, "{}", message),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("default_checked", &self.default_checked)
            .field("check_tests", &self.check_tests())
            .field("fast_path", &self.fast_path_enabled())
            .field("sample_rate", &self.sample_rate)
            .field("call_validation_handler", &self.call_validation_handler.is_some())
            .field("sig_builder_handler", &self.sig_builder_handler.is_some())
            .field("sig_validation_handler", &self.sig_validation_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// A call-validation handler that logs failures and lets the call proceed.
pub fn log_and_continue() -> CallValidationHandler {
    Arc::new(|err: &CallValidationError| {
        tracing::warn!(
            method = %err.method,
            kind = %err.kind,
            record = %serde_json::to_string(err).unwrap_or_default(),
            "{}",
            err.message
        );
        Ok(())
    })
}

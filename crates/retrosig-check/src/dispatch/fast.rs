//! Fixed-arity validators over simple types.
//!
//! The raw classes are resolved once at installation, so a passing call is a
//! handful of `is_a` checks and no allocation. A failing check falls back to
//! the type's own message so reports match the other tiers. Every Nth call
//! times the checks (not the body) into the runtime's [`Profile`].
//!
//! [`Profile`]: crate::profile::Profile

use std::sync::Arc;
use std::time::{Duration, Instant};

use retrosig_core::id::ClassId;
use retrosig_core::value::Value;

use crate::declaration::Returns;
use crate::error::{RuntimeError, ValidationKind};
use crate::method::{Callable, Invocation, Method};
use crate::runtime::Runtime;
use crate::signature::Signature;

use super::report::report_error;

pub struct FastValidator<const N: usize> {
    sig: Arc<Signature>,
    original: Method,
    arg_classes: [ClassId; N],
    /// `None` for void procedures.
    return_class: Option<ClassId>,
}

impl<const N: usize> FastValidator<N> {
    /// `sig` must have `N` simple argument types and a simple or void return;
    /// anything else is checked against `BasicObject`.
    pub fn new(sig: Arc<Signature>, original: Method) -> Self {
        let arg_classes = std::array::from_fn(|i| {
            sig.arg_types
                .get(i)
                .and_then(|(_, ty)| ty.raw_type())
                .unwrap_or(ClassId::BASIC_OBJECT)
        });
        let return_class = match &sig.returns {
            Returns::Void => None,
            Returns::Type(ty) => Some(ty.raw_type().unwrap_or(ClassId::BASIC_OBJECT)),
        };
        FastValidator {
            sig,
            original,
            arg_classes,
            return_class,
        }
    }

    fn check_args(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<(), RuntimeError> {
        let classes = rt.classes();
        for (i, class) in self.arg_classes.iter().enumerate() {
            let value = &inv.args[i];
            if !classes.is_a(value, *class) {
                let (name, ty) = &self.sig.arg_types[i];
                let message = ty
                    .error_message_for_obj(value, classes)
                    .unwrap_or_else(|| format!("Expected type {}, got {}", ty, classes.describe(value)));
                report_error(
                    rt,
                    &self.sig,
                    message,
                    ValidationKind::Parameter,
                    Some(&**name),
                    ty,
                    value,
                    inv.caller,
                )?;
            }
        }
        Ok(())
    }

    fn check_return(&self, rt: &Runtime, class: ClassId, value: &Value, inv: &Invocation<'_>) -> Result<(), RuntimeError> {
        let classes = rt.classes();
        if classes.is_a(value, class) {
            return Ok(());
        }
        let Some(ty) = self.sig.return_type() else {
            return Ok(());
        };
        let message = ty
            .error_message_for_obj(value, classes)
            .unwrap_or_else(|| format!("Expected type {}, got {}", ty, classes.describe(value)));
        report_error(rt, &self.sig, message, ValidationKind::ReturnValue, None, ty, value, inv.caller)
    }
}

impl<const N: usize> Callable for FastValidator<N> {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        if inv.args.len() != N {
            return Err(RuntimeError::ArgumentCount {
                given: inv.args.len(),
                expected: N.to_string(),
            });
        }

        let sampled = rt.profile().should_sample();
        let mut spent = Duration::ZERO;

        let start = sampled.then(Instant::now);
        self.check_args(rt, inv)?;
        if let Some(start) = start {
            spent += start.elapsed();
        }

        let value = self.original.call(rt, inv)?;

        let result = match self.return_class {
            None => Ok(Value::Void),
            Some(class) => {
                let start = sampled.then(Instant::now);
                self.check_return(rt, class, &value, inv)?;
                if let Some(start) = start {
                    spent += start.elapsed();
                }
                Ok(value)
            }
        };
        if sampled {
            rt.profile().record(spent);
        }
        result
    }
}

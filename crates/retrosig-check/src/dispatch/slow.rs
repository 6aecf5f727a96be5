//! The general validator: every parameter kind, bind and block checks.

use std::sync::Arc;

use retrosig_core::value::Value;

use crate::error::{RuntimeError, ValidationKind};
use crate::method::{Callable, Invocation, Method};
use crate::runtime::Runtime;
use crate::signature::Signature;

use super::finish_return;
use super::report::check_value;

pub struct SlowValidator {
    sig: Arc<Signature>,
    original: Method,
}

impl SlowValidator {
    pub fn new(sig: Arc<Signature>, original: Method) -> Self {
        SlowValidator { sig, original }
    }
}

impl Callable for SlowValidator {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        validate_call(rt, &self.sig, &self.original, inv)
    }
}

/// Bind, arguments, block, call, return, in that order.
///
/// Missing or unknown keywords are not reported here; only the types of
/// keywords that were passed are checked.
pub fn validate_call(
    rt: &Runtime,
    sig: &Signature,
    original: &Method,
    inv: &Invocation<'_>,
) -> Result<Value, RuntimeError> {
    if let Some(bind) = &sig.bind {
        check_value(rt, sig, ValidationKind::Bind, None, bind, inv.receiver, inv.caller)?;
    }

    sig.each_arg_value_type(inv.args, |name, value, ty| {
        check_value(rt, sig, ValidationKind::Parameter, Some(name), ty, value, inv.caller)
    })?;

    if let Some((name, ty)) = &sig.block {
        let nil = Value::Nil;
        let block = inv.block.unwrap_or(&nil);
        check_value(rt, sig, ValidationKind::BlockParameter, Some(name), ty, block, inv.caller)?;
    }

    let value = original.call(rt, inv)?;
    finish_return(rt, sig, value, inv)
}

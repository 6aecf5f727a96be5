//! Failure reporting shared by every validator tier.

use std::sync::Arc;

use retrosig_core::id::SourceLocation;
use retrosig_core::types::TypeRef;
use retrosig_core::value::Value;
use serde_json::json;

use crate::error::{CallValidationError, RuntimeError, ValidationKind};
use crate::runtime::Runtime;
use crate::signature::Signature;

/// Checks `value` against `ty` and reports a mismatch.
#[inline]
pub fn check_value(
    rt: &Runtime,
    sig: &Signature,
    kind: ValidationKind,
    name: Option<&str>,
    ty: &TypeRef,
    value: &Value,
    caller: &SourceLocation,
) -> Result<(), RuntimeError> {
    match ty.error_message_for_obj(value, rt.classes()) {
        Some(message) => report_error(rt, sig, message, kind, name, ty, value, caller),
        None => Ok(()),
    }
}

/// Routes one failed check.
///
/// Soft signatures go to the soft-assert handler and generated ones are
/// logged once per signature; both let the call continue. Everything else
/// goes to the configured call-validation handler, which raises by default.
#[allow(clippy::too_many_arguments)]
pub fn report_error(
    rt: &Runtime,
    sig: &Signature,
    message: String,
    kind: ValidationKind,
    name: Option<&str>,
    ty: &TypeRef,
    value: &Value,
    caller: &SourceLocation,
) -> Result<(), RuntimeError> {
    let err = CallValidationError::new(
        sig.key().clone(),
        message,
        kind,
        name.map(Arc::from),
        ty.to_string(),
        rt.classes().inspect(value),
        caller.clone(),
        sig.method.location.clone(),
    );

    if let Some(notify) = &sig.soft_notify {
        rt.config().soft_assert(&err.pretty_message, notify);
        return Ok(());
    }
    if sig.generated {
        if sig.mark_failed() {
            rt.config().log_info(
                "SIG-CHECK-FAILED",
                &json!({
                    "method": sig.method.to_string(),
                    "caller": caller.to_string(),
                    "message": err.pretty_message,
                }),
            );
        }
        return Ok(());
    }
    rt.config().handle_call_validation_error(&err)
}

//! Fixed-arity validator for arbitrary argument and return types.
//!
//! Sampled into the runtime's profile the same way as the fast tier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use retrosig_core::value::Value;

use crate::error::{RuntimeError, ValidationKind};
use crate::method::{Callable, Invocation, Method};
use crate::runtime::Runtime;
use crate::signature::Signature;

use super::finish_return;
use super::report::check_value;

pub struct MediumValidator {
    sig: Arc<Signature>,
    original: Method,
}

impl MediumValidator {
    pub fn new(sig: Arc<Signature>, original: Method) -> Self {
        MediumValidator { sig, original }
    }
}

impl Callable for MediumValidator {
    fn call(&self, rt: &Runtime, inv: &Invocation<'_>) -> Result<Value, RuntimeError> {
        let sig = &*self.sig;
        if inv.args.len() != sig.arg_count() {
            return Err(RuntimeError::ArgumentCount {
                given: inv.args.len(),
                expected: sig.arg_count().to_string(),
            });
        }

        let sampled = rt.profile().should_sample();
        let mut spent = Duration::ZERO;

        let start = sampled.then(Instant::now);
        for ((name, ty), value) in sig.arg_types.iter().zip(inv.args) {
            check_value(rt, sig, ValidationKind::Parameter, Some(&**name), ty, value, inv.caller)?;
        }
        if let Some(start) = start {
            spent += start.elapsed();
        }

        let value = self.original.call(rt, inv)?;

        let start = sampled.then(Instant::now);
        let result = finish_return(rt, sig, value, inv)?;
        if let Some(start) = start {
            rt.profile().record(spent + start.elapsed());
        }
        Ok(result)
    }
}

//! Connection-key derivation for scripted callables.
//!
//! When a scripted callable is attached to a signal, the pair is identified
//! by a canonical key: the callable's declared name, optionally made unique
//! per binding by a hexadecimal identity suffix, followed by the signal's
//! parameter list trimmed to what the callable can actually accept.

use crate::error::{BridgeError, BridgeResult};
use crate::signature::signature_args;
use crate::value::{Arity, CallableKind, ScriptCallable};

/// Derive the connection key for `callback` attached to `signal`.
///
/// The declared name depends on the callable kind: bound methods and plain
/// functions use their function name, native callables their registered
/// name, and any other callable object gets a name synthesized from its
/// identity. With `encode_identity`, a hexadecimal suffix (receiver and
/// function identities for bound methods, the callable's own identity
/// otherwise) makes the key unique per binding.
///
/// Unless the signal is short-circuit, the key ends with a parenthesized
/// type list: the signal's declared parameter types truncated from the end
/// until they fit the callable's arity, minus one slot when the callable
/// implicitly takes a receiver. Variadic callables accept the full list.
///
/// Fails with [`BridgeError::CallbackNameUnresolved`] when the callable's
/// name cannot be determined.
pub fn callback_signature(
    signal: &str,
    callback: &dyn ScriptCallable,
    encode_identity: bool,
) -> BridgeResult<String> {
    let kind = callback.kind();
    let name = match kind {
        CallableKind::Callable => format!("__callback{}", callback.identity()),
        _ => callback.name().ok_or(BridgeError::CallbackNameUnresolved)?,
    };
    let takes_receiver = matches!(
        kind,
        CallableKind::BoundMethod { .. } | CallableKind::NativeFunction { bound: true }
    );

    let mut key = if encode_identity {
        match kind {
            CallableKind::BoundMethod { receiver, function } => {
                format!("{name}{receiver:x}{function:x}")
            }
            _ => format!("{name}{:x}", callback.identity()),
        }
    } else {
        name
    };

    let parsed = signature_args(signal);
    if !parsed.short_circuit {
        let keep = match callback.arity() {
            Arity::Variadic => usize::MAX,
            Arity::Exact(count) => count.saturating_sub(takes_receiver as usize),
        };
        let mut types = parsed.types;
        types.truncate(keep);
        key.push('(');
        key.push_str(&types.join(","));
        key.push(')');
    }
    Ok(key)
}

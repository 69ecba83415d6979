//! Signature string parsing.
//!
//! Signals and slots are addressed by canonical signature strings of the form
//! `name(type,type,...)`. On the wire the signature is prefixed with a single
//! discriminator character marking the channel kind: [`SIGNAL_CODE`] for
//! signals, [`SLOT_CODE`] for slots.
//!
//! Three argument-list shapes are distinguished:
//!
//! - `name(i32,String)` - a typed parameter list
//! - `name()` or `name(void)` - exactly zero parameters
//! - `name` (no parentheses) - a *short-circuit* signature: the whole
//!   argument bundle is passed through as one opaque payload instead of
//!   being decomposed and converted parameter by parameter
//!
//! Parsing is pure and infallible; malformed input yields a best-effort
//! result.

use crate::error::{BridgeError, BridgeResult};

/// Discriminator character marking a signal signature.
pub const SIGNAL_CODE: char = '2';

/// Discriminator character marking a slot signature.
pub const SLOT_CODE: char = '1';

/// The parsed argument list of a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureArgs {
    /// The declared parameter type names, in order.
    pub types: Vec<String>,
    /// Whether the signature is short-circuit (no parenthesis pair at all).
    ///
    /// An empty `types` list alone does not imply this; `name()` declares
    /// zero parameters while `name` is short-circuit.
    pub short_circuit: bool,
}

/// Check whether a discriminated signature names a signal.
pub fn is_signal(signature: &str) -> bool {
    signature.starts_with(SIGNAL_CODE)
}

/// Validate the signal discriminator and strip it.
///
/// Returns the bare signature on success, or
/// [`BridgeError::NotASignal`] when the discriminator marks anything else.
pub fn check_signal(signature: &str) -> BridgeResult<&str> {
    signature
        .strip_prefix(SIGNAL_CODE)
        .ok_or(BridgeError::NotASignal)
}

/// Parse the argument type list out of a signature.
///
/// # Example
///
/// ```
/// use horizon_lattice_script::signature::signature_args;
///
/// let parsed = signature_args("clicked(i32, String)");
/// assert_eq!(parsed.types, vec!["i32", "String"]);
/// assert!(!parsed.short_circuit);
///
/// assert!(signature_args("clicked()").types.is_empty());
/// assert!(signature_args("clicked").short_circuit);
/// ```
pub fn signature_args(signature: &str) -> SignatureArgs {
    let Some(open) = signature.find('(') else {
        return SignatureArgs {
            types: Vec::new(),
            short_circuit: true,
        };
    };
    if signature.contains("()") || signature.contains("(void)") {
        return SignatureArgs {
            types: Vec::new(),
            short_circuit: false,
        };
    }
    let inner = match signature.rfind(')') {
        Some(close) if close > open => &signature[open + 1..close],
        // No closing parenthesis: best effort, take the rest.
        _ => &signature[open + 1..],
    };
    SignatureArgs {
        types: inner.split(',').map(|t| t.trim().to_string()).collect(),
        short_circuit: false,
    }
}

/// The portion of a signature before the first parenthesis.
pub fn bare_name(signature: &str) -> &str {
    match signature.find('(') {
        Some(index) => &signature[..index],
        None => signature,
    }
}

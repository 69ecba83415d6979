//! Error types for the scripting bridge.

use std::fmt;

/// Errors surfaced synchronously to the caller of a bridge operation.
///
/// These cover protocol misuse (a non-signal signature where a signal is
/// required, a callback whose name cannot be determined) and marshaling
/// failures (arity over-count, unknown or mismatched parameter types).
/// Soft conditions such as an unresolved signal name or a missing dynamic
/// slot are diagnostics, not errors; they are logged and the operation
/// reports a neutral result instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The signature does not carry the signal discriminator.
    NotASignal,
    /// The callback's declared name could not be determined.
    CallbackNameUnresolved,
    /// More arguments were provided than the signal declares.
    TooManyArguments {
        /// The resolved signal signature.
        signature: String,
        /// The number of parameters the signal declares.
        declared: usize,
        /// The number of arguments that were provided.
        given: usize,
    },
    /// No converter is registered for a parameter type name.
    UnknownType {
        /// The offending type name.
        type_name: String,
    },
    /// A value could not be converted to or from the named type.
    ConversionFailed {
        /// The type name the conversion was attempted against.
        type_name: String,
    },
    /// The native argument array is missing a parameter slot.
    MissingArgument {
        /// The zero-based parameter position.
        index: usize,
    },
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotASignal => write!(f, "signature does not name a signal"),
            Self::CallbackNameUnresolved => {
                write!(f, "could not determine the callback's name")
            }
            Self::TooManyArguments {
                signature,
                declared,
                given,
            } => {
                write!(f, "{signature} only accepts {declared} arguments, {given} given")
            }
            Self::UnknownType { type_name } => {
                write!(f, "unknown type used to emit a signal: {type_name}")
            }
            Self::ConversionFailed { type_name } => {
                write!(f, "could not convert value to or from type {type_name}")
            }
            Self::MissingArgument { index } => {
                write!(f, "missing native argument at position {index}")
            }
        }
    }
}

impl std::error::Error for BridgeError {}

/// A specialized Result type for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

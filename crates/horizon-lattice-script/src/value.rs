//! The dynamically-typed side of the bridge.
//!
//! This module defines the vocabulary the embedded script runtime exposes to
//! the bridge: unityped values, callables with enough metadata to derive a
//! connection key, objects with attribute lookup, and the runtime handle that
//! guards every crossing from native dispatch into scripted execution.
//!
//! # Key Types
//!
//! - [`ScriptValue`] - A dynamically-typed value or argument bundle
//! - [`ScriptCallable`] - A scripted callable plus its reflection metadata
//! - [`ScriptObject`] - Attribute lookup on a scripted object
//! - [`ScriptRuntime`] - Interpreter exclusivity and error reporting
//!
//! # Interpreter Exclusivity
//!
//! Calls into scripted code must hold the interpreter lock for their full
//! duration. [`ScriptRuntime::acquire`] returns a scoped guard that is
//! released on every exit path. The lock is reentrant: a scripted slot may
//! emit a signal that dispatches straight back into another scripted slot on
//! the same thread.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// A dynamically-typed value crossing the bridge.
///
/// `Tuple` doubles as the argument bundle for calls and for short-circuit
/// signal payloads, where the whole bundle travels as one opaque value.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptValue {
    /// The absent value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An ordered bundle of values.
    Tuple(Vec<ScriptValue>),
}

/// An error raised by scripted code.
///
/// The bridge never propagates these across the native boundary; they are
/// reported through [`ScriptRuntime::report_error`] and swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    /// Create a new script error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

/// The declared argument count of a scripted callable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// The callable declares exactly this many parameters, including an
    /// implicit receiver if it takes one.
    Exact(usize),
    /// The callable accepts any number of arguments.
    Variadic,
}

/// What kind of callable the script runtime handed us.
///
/// The kind decides how the declared name is resolved and whether the
/// callable consumes one parameter slot for an implicit receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallableKind {
    /// A method bound to a receiver instance. Carries the identities of the
    /// bound receiver and the underlying function for key encoding.
    BoundMethod {
        /// Identity of the bound receiver instance.
        receiver: usize,
        /// Identity of the underlying function.
        function: usize,
    },
    /// A plain scripted function.
    Function,
    /// A callable implemented natively and registered with the runtime.
    NativeFunction {
        /// Whether the native callable carries a bound receiver.
        bound: bool,
    },
    /// Any other callable object. Its key name is synthesized from its
    /// identity.
    Callable,
}

/// A scripted callable with the reflection metadata the bridge needs.
pub trait ScriptCallable: Send + Sync {
    /// Invoke the callable with the given arguments.
    fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError>;

    /// The kind of callable this is.
    fn kind(&self) -> CallableKind;

    /// The callable's declared name, if it has one.
    fn name(&self) -> Option<String>;

    /// The callable's declared arity.
    fn arity(&self) -> Arity;

    /// A stable identity for this callable, unique while it is alive.
    fn identity(&self) -> usize;
}

/// A scripted object supporting attribute lookup.
///
/// Slot dispatch resolves the slot's bare name as an attribute on the object
/// that wraps the native receiver.
pub trait ScriptObject: Send + Sync {
    /// Look up a callable attribute by name.
    fn attr(&self, name: &str) -> Option<Arc<dyn ScriptCallable>>;
}

/// A plain scripted function backed by a closure.
///
/// Hosts embedding a real interpreter implement [`ScriptCallable`] over their
/// own function objects; `ScriptFn` covers the common case of exposing a
/// native closure to the bridge as a named function.
pub struct ScriptFn {
    name: String,
    arity: Arity,
    func: Box<dyn Fn(&[ScriptValue]) -> Result<ScriptValue, ScriptError> + Send + Sync>,
}

impl ScriptFn {
    /// Create a named function with the given declared arity.
    pub fn new<F>(name: impl Into<String>, arity: Arity, func: F) -> Self
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, ScriptError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            func: Box::new(func),
        }
    }
}

impl ScriptCallable for ScriptFn {
    fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        (self.func)(args)
    }

    fn kind(&self) -> CallableKind {
        CallableKind::Function
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn identity(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

/// Handle to the embedded script runtime.
///
/// Owns the interpreter lock and the error-reporting channel. Scripted-side
/// failures during slot dispatch are recorded here rather than propagated,
/// since the native meta-object system has no channel for them.
pub struct ScriptRuntime {
    interpreter: ReentrantMutex<()>,
    last_error: Mutex<Option<ScriptError>>,
}

impl ScriptRuntime {
    /// Create a new runtime handle.
    pub fn new() -> Self {
        Self {
            interpreter: ReentrantMutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    /// Acquire exclusive interpreter access for the scope of the guard.
    ///
    /// Reentrant: a thread already holding the lock may acquire it again,
    /// which happens when a scripted slot emits a signal that dispatches
    /// directly back into scripted code.
    pub fn acquire(&self) -> InterpreterGuard<'_> {
        InterpreterGuard {
            _guard: self.interpreter.lock(),
        }
    }

    /// Report a scripted-side error through the runtime's error channel.
    ///
    /// The error is logged and retained for inspection via
    /// [`take_last_error`](Self::take_last_error); it is never propagated to
    /// the native caller.
    pub fn report_error(&self, error: ScriptError) {
        tracing::warn!(
            target: "horizon_lattice_script::value",
            %error,
            "script error reported"
        );
        *self.last_error.lock() = Some(error);
    }

    /// Take the most recently reported error, clearing the channel.
    pub fn take_last_error(&self) -> Option<ScriptError> {
        self.last_error.lock().take()
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped interpreter access, released on drop.
pub struct InterpreterGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

//! Scripting bridge for the Horizon Lattice meta-object runtime.
//!
//! This crate connects an embedded, dynamically-typed script runtime to the
//! native signal/slot system: scripted callables can be attached to native
//! notifications, and scripted code can fire notifications that native
//! receivers observe. At its core it translates between a string-encoded
//! signature, a dynamically-typed argument bundle, and a strongly-typed
//! native invocation, including signals and slots declared at script-code
//! granularity, unknown at compile time.
//!
//! # Key Types
//!
//! - [`SignalManager`] - The bridge context: emission, dispatch, dynamic
//!   registration
//! - [`MethodTable`] - An object's signal/slot table with a stable id space
//! - [`ScriptValue`] / [`ScriptCallable`] / [`ScriptObject`] - The
//!   dynamically-typed side
//! - [`ConverterRegistry`] - Type-name-keyed marshaling strategies
//! - [`NativeArgs`] - The type-erased argument array handed to activation
//! - [`SignalActivation`] - The native notification broadcast seam
//! - [`WrapperLookup`] - The wrapper-lifetime collaborator
//!
//! # Signature Strings
//!
//! Signals and slots are addressed as `name(type,type,...)`, prefixed on the
//! wire with a one-character channel discriminator (`'2'` signal, `'1'`
//! slot). A signature without parentheses is *short-circuit*: the whole
//! argument bundle passes through as one opaque payload instead of being
//! converted parameter by parameter.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_lattice_script::{
//!     MethodTable, NativeArgs, ObjectId, ScriptValue, SignalManager, WrapperRegistry,
//! };
//!
//! // The native runtime supplies the activation primitive; any closure over
//! // (source, signal index, argument array) will do.
//! let activation = Arc::new(|_source: ObjectId, _index: usize, _args: &NativeArgs| {
//!     // deliver to connected receivers
//! });
//! let manager = SignalManager::new(activation, Arc::new(WrapperRegistry::new()));
//!
//! // Declare an object with one signal and emit it from script values.
//! let mut table = MethodTable::new();
//! table.add_signal("value_changed(i32)");
//! let source = manager.register_object(table);
//!
//! let delivered = manager
//!     .emit_signal(source, "2value_changed(i32)", &[ScriptValue::Int(42)])
//!     .unwrap();
//! assert!(delivered);
//! ```

pub mod activation;
pub mod callback;
pub mod convert;
mod error;
pub mod manager;
pub mod marshal;
pub mod meta;
pub mod receiver;
pub mod signature;
pub mod value;
pub mod wrapper;

pub use activation::SignalActivation;
pub use callback::callback_signature;
pub use convert::{
    ConverterRegistry, NativeBuffer, ScriptConvert, TypeConverter, ValueTypeConverter,
    SCRIPT_VALUE_TYPE,
};
pub use error::{BridgeError, BridgeResult};
pub use manager::SignalManager;
pub use marshal::{to_script, NativeArgs};
pub use meta::{MetaCall, MethodEntry, MethodKind, MethodTable, ObjectId};
pub use receiver::GlobalReceiver;
pub use signature::{
    bare_name, check_signal, is_signal, signature_args, SignatureArgs, SIGNAL_CODE, SLOT_CODE,
};
pub use value::{
    Arity, CallableKind, InterpreterGuard, ScriptCallable, ScriptError, ScriptFn, ScriptObject,
    ScriptRuntime, ScriptValue,
};
pub use wrapper::{WrapperLookup, WrapperRegistry};

//! The native activation primitive.
//!
//! Activation is the notification broadcast of the underlying meta-object
//! runtime: delivering a signal, by index, to whatever receivers the runtime
//! has connected, in the runtime's own connection order. The bridge never
//! implements delivery itself; it hands a fully marshaled argument array to
//! this seam and returns.

use crate::marshal::NativeArgs;
use crate::meta::ObjectId;

/// The notification broadcast the emission engine and the signal
/// re-broadcast path call into.
///
/// # Buffer lifetime
///
/// The argument buffers are only valid for the duration of the call: the
/// emitting side releases them as soon as `activate` returns. An
/// implementation that defers delivery must copy what it needs out of the
/// buffers before returning (the `"ScriptValue"` passthrough converter
/// exists for exactly that).
pub trait SignalActivation: Send + Sync {
    /// Broadcast `args` for the signal at `signal_index` on `source`.
    fn activate(&self, source: ObjectId, signal_index: usize, args: &NativeArgs);
}

impl<F> SignalActivation for F
where
    F: Fn(ObjectId, usize, &NativeArgs) + Send + Sync,
{
    fn activate(&self, source: ObjectId, signal_index: usize, args: &NativeArgs) {
        self(source, signal_index, args)
    }
}

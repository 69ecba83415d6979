//! The global receiver: the runtime-wide dynamic method table.
//!
//! Scripted callables can be attached to signals without a receiver object
//! of their own. The global receiver holds those callables: each one gets a
//! slot entry in the receiver's own method table, keyed by the callable's
//! identity-encoded connection key, and is invoked through
//! [`GlobalReceiver::invoke`] when the native runtime dispatches the slot.
//!
//! The receiver also tracks, per source object, how many connections
//! currently target it, so the manager can answer
//! [`has_connection_with`](GlobalReceiver::has_connection_with).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::callback::callback_signature;
use crate::convert::ConverterRegistry;
use crate::error::BridgeResult;
use crate::marshal::{to_script, NativeArgs};
use crate::meta::{MethodTable, ObjectId};
use crate::value::{ScriptCallable, ScriptRuntime};

#[derive(Default)]
struct ReceiverState {
    table: MethodTable,
    callbacks: HashMap<usize, Arc<dyn ScriptCallable>>,
    /// Live connection count per source object.
    connections: HashMap<ObjectId, usize>,
}

/// The per-runtime table of scripted-only slots.
pub struct GlobalReceiver {
    converters: Arc<ConverterRegistry>,
    runtime: Arc<ScriptRuntime>,
    state: Mutex<ReceiverState>,
}

impl GlobalReceiver {
    /// Create an empty receiver sharing the bridge's converter registry and
    /// runtime handle.
    pub fn new(converters: Arc<ConverterRegistry>, runtime: Arc<ScriptRuntime>) -> Self {
        Self {
            converters,
            runtime,
            state: Mutex::new(ReceiverState::default()),
        }
    }

    /// Register `callback` as a dynamic slot for the raw `slot` signature.
    ///
    /// The slot entry is keyed by the callback's identity-encoded connection
    /// key; registering the same callback against the same signature again
    /// reuses the existing entry. Returns the slot's id in the receiver's
    /// method table.
    pub fn add_slot(&self, slot: &str, callback: Arc<dyn ScriptCallable>) -> BridgeResult<usize> {
        let key = callback_signature(slot, callback.as_ref(), true)?;
        let mut state = self.state.lock();
        if let Some(index) = state.table.index_of_method(&key) {
            return Ok(index);
        }
        let index = state.table.add_slot(&key);
        state.callbacks.insert(index, callback);
        tracing::trace!(
            target: "horizon_lattice_script::receiver",
            %key,
            index,
            "registered dynamic slot"
        );
        Ok(index)
    }

    /// The number of dynamic slots registered.
    pub fn slot_count(&self) -> usize {
        self.state.lock().table.method_count()
    }

    /// Note a new connection from `source` to the slot at `slot_index`.
    pub fn connect_notify(&self, source: ObjectId, slot_index: usize) {
        tracing::trace!(
            target: "horizon_lattice_script::receiver",
            ?source,
            slot_index,
            "connection added"
        );
        *self.state.lock().connections.entry(source).or_insert(0) += 1;
    }

    /// Note a dropped connection from `source` to the slot at `slot_index`.
    pub fn disconnect_notify(&self, source: ObjectId, slot_index: usize) {
        tracing::trace!(
            target: "horizon_lattice_script::receiver",
            ?source,
            slot_index,
            "connection removed"
        );
        let mut state = self.state.lock();
        if let Some(count) = state.connections.get_mut(&source) {
            *count -= 1;
            if *count == 0 {
                state.connections.remove(&source);
            }
        }
    }

    /// Whether any live connection from `object` targets this receiver.
    pub fn has_connection_with(&self, object: ObjectId) -> bool {
        self.state.lock().connections.contains_key(&object)
    }

    /// Invoke the dynamic slot at `id` with a native argument array.
    ///
    /// Arguments are converted inbound per the slot's recorded parameter
    /// types and the callback runs under the interpreter lock. Scripted
    /// errors are reported through the runtime's error channel and
    /// swallowed. Always returns `-1`.
    pub fn invoke(&self, id: usize, args: &NativeArgs) -> isize {
        let (entry, callback) = {
            let state = self.state.lock();
            (
                state.table.method(id).cloned(),
                state.callbacks.get(&id).cloned(),
            )
        };
        let (Some(entry), Some(callback)) = (entry, callback) else {
            tracing::warn!(
                target: "horizon_lattice_script::receiver",
                id,
                "global receiver has no slot with this id"
            );
            return -1;
        };

        let _interpreter = self.runtime.acquire();
        let call_args = match to_script(entry.param_types(), args, &self.converters) {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(
                    target: "horizon_lattice_script::receiver",
                    slot = entry.name(),
                    %error,
                    "could not convert dynamic slot arguments"
                );
                return -1;
            }
        };
        if let Err(error) = callback.call(&call_args) {
            tracing::warn!(
                target: "horizon_lattice_script::receiver",
                slot = entry.name(),
                "error calling dynamic slot"
            );
            self.runtime.report_error(error);
        }
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Arity, ScriptFn, ScriptValue};
    use parking_lot::Mutex;
    use slotmap::KeyData;

    fn receiver() -> GlobalReceiver {
        GlobalReceiver::new(
            Arc::new(ConverterRegistry::with_primitives()),
            Arc::new(ScriptRuntime::new()),
        )
    }

    fn object_id(raw: u64) -> ObjectId {
        ObjectId::from(KeyData::from_ffi(raw))
    }

    #[test]
    fn test_add_slot_deduplicates() {
        let receiver = receiver();
        let callback = Arc::new(ScriptFn::new("on_changed", Arity::Exact(1), |_| {
            Ok(ScriptValue::Nil)
        }));

        let first = receiver.add_slot("changed(i32)", callback.clone()).unwrap();
        let second = receiver.add_slot("changed(i32)", callback).unwrap();
        assert_eq!(first, second);
        assert_eq!(receiver.slot_count(), 1);
    }

    #[test]
    fn test_distinct_callbacks_get_distinct_slots() {
        let receiver = receiver();
        let a = Arc::new(ScriptFn::new("on_changed", Arity::Exact(1), |_| {
            Ok(ScriptValue::Nil)
        }));
        let b = Arc::new(ScriptFn::new("on_changed", Arity::Exact(1), |_| {
            Ok(ScriptValue::Nil)
        }));

        let first = receiver.add_slot("changed(i32)", a).unwrap();
        let second = receiver.add_slot("changed(i32)", b).unwrap();
        // Same name, different identity: different connection keys.
        assert_ne!(first, second);
        assert_eq!(receiver.slot_count(), 2);
    }

    #[test]
    fn test_invoke_marshals_arguments() {
        let receiver = receiver();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let callback = Arc::new(ScriptFn::new("on_changed", Arity::Exact(1), move |args| {
            received_clone.lock().extend_from_slice(args);
            Ok(ScriptValue::Nil)
        }));
        let id = receiver.add_slot("changed(i32)", callback).unwrap();

        let converters = Arc::new(ConverterRegistry::with_primitives());
        let args = NativeArgs::from_script(
            &[ScriptValue::Int(7)],
            &["i32".to_string()],
            &converters,
        )
        .unwrap();

        assert_eq!(receiver.invoke(id, &args), -1);
        assert_eq!(*received.lock(), vec![ScriptValue::Int(7)]);
    }

    #[test]
    fn test_invoke_unknown_id_is_soft() {
        let receiver = receiver();
        let converters = Arc::new(ConverterRegistry::with_primitives());
        let args = NativeArgs::from_script(&[], &[], &converters).unwrap();
        assert_eq!(receiver.invoke(99, &args), -1);
    }

    #[test]
    fn test_connection_bookkeeping() {
        let receiver = receiver();
        let source = object_id(1 << 32 | 3);

        assert!(!receiver.has_connection_with(source));
        receiver.connect_notify(source, 0);
        receiver.connect_notify(source, 1);
        assert!(receiver.has_connection_with(source));

        receiver.disconnect_notify(source, 0);
        assert!(receiver.has_connection_with(source));
        receiver.disconnect_notify(source, 1);
        assert!(!receiver.has_connection_with(source));
    }
}

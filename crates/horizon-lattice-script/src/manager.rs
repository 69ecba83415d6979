//! The signal manager: the bridge context.
//!
//! [`SignalManager`] is the explicitly constructed context tying the bridge
//! together. It owns the per-object method tables and the global receiver,
//! shares the converter registry and runtime handle with both, and exposes
//! the three operations the bridge exists for:
//!
//! - [`emit_signal`](SignalManager::emit_signal) - a scripted emission
//!   request: resolve the signal, marshal the arguments, activate the native
//!   notification, release every converted buffer on all paths.
//! - [`meta_call`](SignalManager::meta_call) - the native runtime's generic
//!   entry point for invoking any declared method by id: signals are
//!   re-broadcast natively, slots are dispatched into scripted code under
//!   the interpreter lock.
//! - [`register_method`](SignalManager::register_method) - on-demand
//!   extension of a scripted-originated object's method table with signals
//!   and slots unknown at declaration time.
//!
//! # Ordering and reentrancy
//!
//! Receiver invocation order within one emission belongs to the native
//! runtime behind [`SignalActivation`]; the manager guarantees at-most-once
//! activation per emission and nothing about fan-out order. Dispatch may
//! reenter: a scripted slot may emit another signal while the interpreter
//! lock is held, and every argument array is local to its own emission.

use parking_lot::RwLock;
use slotmap::SlotMap;
use std::sync::Arc;

use crate::activation::SignalActivation;
use crate::convert::ConverterRegistry;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{to_script, NativeArgs};
use crate::meta::{MetaCall, MethodEntry, MethodKind, MethodTable, ObjectId};
use crate::receiver::GlobalReceiver;
use crate::signature::check_signal;
use crate::value::{ScriptCallable, ScriptRuntime, ScriptValue};
use crate::wrapper::WrapperLookup;

/// The bridge context.
///
/// Construct one per embedded runtime and pass it to call sites; there is no
/// process-wide instance. [`reset`](Self::reset) replaces the global
/// receiver with a fresh one, dropping every dynamic slot and connection
/// record.
pub struct SignalManager {
    converters: Arc<ConverterRegistry>,
    runtime: Arc<ScriptRuntime>,
    wrappers: Arc<dyn WrapperLookup>,
    activation: Arc<dyn SignalActivation>,
    objects: RwLock<SlotMap<ObjectId, MethodTable>>,
    receiver: RwLock<Arc<GlobalReceiver>>,
}

static_assertions::assert_impl_all!(SignalManager: Send, Sync);

impl SignalManager {
    /// Create a manager over the native activation primitive and the
    /// wrapper-lifetime service.
    ///
    /// The converter registry starts with the primitive value types
    /// registered; use [`converters`](Self::converters) to add more.
    pub fn new(activation: Arc<dyn SignalActivation>, wrappers: Arc<dyn WrapperLookup>) -> Self {
        let converters = Arc::new(ConverterRegistry::with_primitives());
        let runtime = Arc::new(ScriptRuntime::new());
        let receiver = Arc::new(GlobalReceiver::new(converters.clone(), runtime.clone()));
        Self {
            converters,
            runtime,
            wrappers,
            activation,
            objects: RwLock::new(SlotMap::with_key()),
            receiver: RwLock::new(receiver),
        }
    }

    /// The shared converter registry.
    pub fn converters(&self) -> Arc<ConverterRegistry> {
        self.converters.clone()
    }

    /// The shared script runtime handle.
    pub fn runtime(&self) -> Arc<ScriptRuntime> {
        self.runtime.clone()
    }

    /// The current global receiver.
    pub fn global_receiver(&self) -> Arc<GlobalReceiver> {
        self.receiver.read().clone()
    }

    /// Replace the global receiver with a fresh instance.
    ///
    /// Every dynamic slot and connection record is dropped; object method
    /// tables are untouched, as they belong to the registered objects.
    pub fn reset(&self) {
        *self.receiver.write() =
            Arc::new(GlobalReceiver::new(self.converters.clone(), self.runtime.clone()));
    }

    // =========================================================================
    // Object registry
    // =========================================================================

    /// Register a native object's method table and return its id.
    pub fn register_object(&self, table: MethodTable) -> ObjectId {
        let id = self.objects.write().insert(table);
        tracing::trace!(target: "horizon_lattice_script::manager", ?id, "registered object");
        id
    }

    /// Remove an object's method table. Returns `true` if it was registered.
    pub fn remove_object(&self, object: ObjectId) -> bool {
        self.objects.write().remove(object).is_some()
    }

    /// Find a method of any kind on `object` by exact signature.
    pub fn method_index(&self, object: ObjectId, signature: &str) -> Option<usize> {
        self.objects
            .read()
            .get(object)
            .and_then(|table| table.index_of_method(signature))
    }

    /// The number of methods `object` declares, dynamic entries included.
    pub fn method_count(&self, object: ObjectId) -> usize {
        self.objects
            .read()
            .get(object)
            .map_or(0, MethodTable::method_count)
    }

    // =========================================================================
    // Emission engine
    // =========================================================================

    /// Emit a signal from scripted code.
    ///
    /// `signal` carries its channel discriminator; anything but a signal is
    /// rejected with [`BridgeError::NotASignal`]. An unresolved signal name
    /// is non-fatal: it is logged (a typo, or a dynamic signal never used in
    /// a connection) and the emission reports `Ok(false)`.
    ///
    /// Short-circuit signals pass the whole argument bundle through as one
    /// opaque payload. Typed signals marshal each argument by declared type;
    /// providing more arguments than declared, or an argument of an
    /// unregistered type, is a type error. Every successfully converted
    /// buffer is released before this returns, whether or not activation
    /// ran.
    #[tracing::instrument(skip(self, args), target = "horizon_lattice_script::manager", level = "trace")]
    pub fn emit_signal(
        &self,
        source: ObjectId,
        signal: &str,
        args: &[ScriptValue],
    ) -> BridgeResult<bool> {
        let signal = check_signal(signal)?;

        let resolved = {
            let objects = self.objects.read();
            let Some(table) = objects.get(source) else {
                tracing::debug!(
                    target: "horizon_lattice_script::manager",
                    ?source,
                    "emit on an object that is not registered"
                );
                return Ok(false);
            };
            table
                .index_of_signal(signal)
                .and_then(|index| table.method(index).map(|entry| (index, entry.clone())))
        };
        let Some((index, entry)) = resolved else {
            tracing::debug!(
                target: "horizon_lattice_script::manager",
                signal,
                "signal not found, probably a typo or a dynamic signal that was never connected"
            );
            return Ok(false);
        };

        if entry.is_short_circuit() {
            let payload =
                NativeArgs::short_circuit(ScriptValue::Tuple(args.to_vec()), &self.converters);
            self.activation.activate(source, index, &payload);
            return Ok(true);
        }

        let declared = entry.param_types().len();
        if args.len() > declared {
            return Err(BridgeError::TooManyArguments {
                signature: entry.signature().to_string(),
                declared,
                given: args.len(),
            });
        }

        let native = NativeArgs::from_script(args, entry.param_types(), &self.converters)?;
        self.activation.activate(source, index, &native);
        // `native` drops here, releasing the buffers right after activation
        // returns. A deferring activation must copy first; see
        // `SignalActivation`.
        Ok(true)
    }

    // =========================================================================
    // Meta-call dispatcher
    // =========================================================================

    /// The native runtime's generic method-invocation entry point.
    ///
    /// Only [`MetaCall::InvokeMethod`] is serviced; any other call kind is
    /// logged and answered with `id - method_count`, the adjusted-offset
    /// sentinel the meta-object protocol expects. Signal entries are
    /// re-broadcast through the activation primitive with `args` untouched,
    /// which is what makes dynamically declared signals observable to native
    /// receivers. Slot entries are dispatched into scripted code; scripted
    /// failures are reported and swallowed, since the native caller has no
    /// error channel. Returns `-1` for every serviced call.
    pub fn meta_call(
        &self,
        object: ObjectId,
        call: MetaCall,
        id: usize,
        args: &NativeArgs,
    ) -> isize {
        let (method_count, entry) = {
            let objects = self.objects.read();
            match objects.get(object) {
                Some(table) => (table.method_count(), table.method(id).cloned()),
                None => (0, None),
            }
        };

        if call != MetaCall::InvokeMethod {
            tracing::warn!(
                target: "horizon_lattice_script::manager",
                ?call,
                "only method invocation is supported by the dispatcher"
            );
            return id as isize - method_count as isize;
        }

        let Some(entry) = entry else {
            tracing::warn!(
                target: "horizon_lattice_script::manager",
                ?object,
                id,
                "meta-call on an unknown method id"
            );
            return -1;
        };

        match entry.kind() {
            MethodKind::Signal => {
                // A scripted signal reaching the dispatcher is re-broadcast
                // natively; no scripted code is involved.
                self.activation.activate(object, id, args);
            }
            MethodKind::Slot => self.invoke_script_slot(object, &entry, args),
        }
        -1
    }

    /// Call the scripted method backing a slot entry.
    fn invoke_script_slot(&self, object: ObjectId, entry: &MethodEntry, args: &NativeArgs) {
        let _interpreter = self.runtime.acquire();

        let Some(target) = self.wrappers.wrapped_object(object) else {
            tracing::warn!(
                target: "horizon_lattice_script::manager",
                ?object,
                slot = entry.name(),
                "no script wrapper for the receiving object"
            );
            return;
        };

        let call_args = match to_script(entry.param_types(), args, &self.converters) {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(
                    target: "horizon_lattice_script::manager",
                    slot = entry.name(),
                    %error,
                    "could not convert slot arguments"
                );
                return;
            }
        };

        match target.attr(entry.name()) {
            Some(method) => {
                if let Err(error) = method.call(&call_args) {
                    tracing::warn!(
                        target: "horizon_lattice_script::manager",
                        slot = entry.name(),
                        "error calling slot"
                    );
                    self.runtime.report_error(error);
                }
            }
            None => {
                tracing::warn!(
                    target: "horizon_lattice_script::manager",
                    slot = entry.name(),
                    "dynamic slot not found"
                );
            }
        }
    }

    // =========================================================================
    // Dynamic method registrar
    // =========================================================================

    /// Add a signal or slot to an object's method table on demand.
    ///
    /// A signature already present succeeds as a no-op. Otherwise the object
    /// must be of scripted origin; dynamic methods on native-originated
    /// objects are refused with a warning. Returns whether the signature is
    /// registered when this returns.
    pub fn register_method(&self, source: ObjectId, signature: &str, kind: MethodKind) -> bool {
        let mut objects = self.objects.write();
        let Some(table) = objects.get_mut(source) else {
            tracing::warn!(
                target: "horizon_lattice_script::manager",
                ?source,
                "cannot register a method on an object that is not registered"
            );
            return false;
        };
        if table.index_of_method(signature).is_some() {
            return true;
        }
        if !self.wrappers.is_script_originated(source) {
            tracing::warn!(
                target: "horizon_lattice_script::manager",
                ?source,
                signature,
                "dynamic signals and slots require a script-originated object"
            );
            return false;
        }
        match kind {
            MethodKind::Signal => table.add_signal(signature),
            MethodKind::Slot => table.add_slot(signature),
        };
        true
    }

    // =========================================================================
    // Global receiver surface
    // =========================================================================

    /// Register a callback as a dynamic slot on the global receiver.
    ///
    /// Returns the slot's id in the receiver's method table.
    pub fn add_global_slot(
        &self,
        slot: &str,
        callback: Arc<dyn ScriptCallable>,
    ) -> BridgeResult<usize> {
        self.global_receiver().add_slot(slot, callback)
    }

    /// Forward a connection notification to the global receiver.
    pub fn global_receiver_connect_notify(&self, source: ObjectId, slot_index: usize) {
        self.global_receiver().connect_notify(source, slot_index);
    }

    /// Forward a disconnection notification to the global receiver.
    pub fn global_receiver_disconnect_notify(&self, source: ObjectId, slot_index: usize) {
        self.global_receiver().disconnect_notify(source, slot_index);
    }

    /// Whether the global receiver has a live connection from `object`.
    pub fn has_connection_with(&self, object: ObjectId) -> bool {
        self.global_receiver().has_connection_with(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Arity, ScriptError, ScriptFn, ScriptObject};
    use crate::wrapper::WrapperRegistry;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Activation that records (source, index, first argument as i32).
    #[derive(Default)]
    struct RecordingActivation {
        calls: Mutex<Vec<(ObjectId, usize, Option<i32>)>>,
    }

    impl SignalActivation for RecordingActivation {
        fn activate(&self, source: ObjectId, signal_index: usize, args: &NativeArgs) {
            let first = args.arg(0).and_then(|buf| buf.downcast_ref::<i32>().copied());
            self.calls.lock().push((source, signal_index, first));
        }
    }

    struct TestScriptObject {
        methods: HashMap<String, Arc<dyn ScriptCallable>>,
    }

    impl TestScriptObject {
        fn new(methods: Vec<(&str, Arc<dyn ScriptCallable>)>) -> Self {
            Self {
                methods: methods
                    .into_iter()
                    .map(|(name, callable)| (name.to_string(), callable))
                    .collect(),
            }
        }
    }

    impl ScriptObject for TestScriptObject {
        fn attr(&self, name: &str) -> Option<Arc<dyn ScriptCallable>> {
            self.methods.get(name).cloned()
        }
    }

    fn manager() -> (Arc<SignalManager>, Arc<RecordingActivation>, Arc<WrapperRegistry>) {
        let activation = Arc::new(RecordingActivation::default());
        let wrappers = Arc::new(WrapperRegistry::new());
        let manager = Arc::new(SignalManager::new(activation.clone(), wrappers.clone()));
        (manager, activation, wrappers)
    }

    fn button_table() -> MethodTable {
        let mut table = MethodTable::new();
        table.add_signal("clicked(i32)");
        table.add_slot("on_clicked(i32)");
        table
    }

    #[test]
    fn test_emit_declared_signal() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let delivered = manager
            .emit_signal(source, "2clicked(i32)", &[ScriptValue::Int(42)])
            .unwrap();

        assert!(delivered);
        assert_eq!(*activation.calls.lock(), vec![(source, 0, Some(42))]);
    }

    #[test]
    fn test_emit_rejects_slot_discriminator() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let result = manager.emit_signal(source, "1clicked(i32)", &[ScriptValue::Int(42)]);
        assert_eq!(result, Err(BridgeError::NotASignal));
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_emit_unresolved_signal_is_soft() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let delivered = manager.emit_signal(source, "2clicekd(i32)", &[]).unwrap();
        assert!(!delivered);
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_emit_too_many_arguments() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let result = manager.emit_signal(
            source,
            "2clicked(i32)",
            &[ScriptValue::Int(1), ScriptValue::Int(2)],
        );
        assert_eq!(
            result,
            Err(BridgeError::TooManyArguments {
                signature: "clicked(i32)".to_string(),
                declared: 1,
                given: 2,
            })
        );
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_emit_unknown_type_aborts_before_activation() {
        let (manager, activation, _) = manager();
        let mut table = MethodTable::new();
        table.add_signal("moved(Point)");
        let source = manager.register_object(table);

        let result = manager.emit_signal(source, "2moved(Point)", &[ScriptValue::Int(1)]);
        assert_eq!(
            result,
            Err(BridgeError::UnknownType {
                type_name: "Point".to_string()
            })
        );
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_emit_fewer_arguments_than_declared() {
        let (manager, activation, _) = manager();
        let mut table = MethodTable::new();
        table.add_signal("resized(i32,i32)");
        let source = manager.register_object(table);

        // Fewer arguments than declared is allowed; only the provided ones
        // are converted.
        let delivered = manager
            .emit_signal(source, "2resized(i32,i32)", &[ScriptValue::Int(5)])
            .unwrap();
        assert!(delivered);
        assert_eq!(*activation.calls.lock(), vec![(source, 0, Some(5))]);
    }

    #[test]
    fn test_emit_short_circuit_signal() {
        let bundle = Arc::new(Mutex::new(None));
        let bundle_clone = bundle.clone();
        let activation = Arc::new(move |_source: ObjectId, _index: usize, args: &NativeArgs| {
            *bundle_clone.lock() = args
                .arg(0)
                .and_then(|buf| buf.downcast_ref::<ScriptValue>().cloned());
        });
        let manager = SignalManager::new(activation, Arc::new(WrapperRegistry::new()));

        let mut table = MethodTable::new();
        table.add_signal("changed");
        let source = manager.register_object(table);

        let delivered = manager
            .emit_signal(
                source,
                "2changed",
                &[ScriptValue::Int(1), ScriptValue::Str("x".into())],
            )
            .unwrap();

        assert!(delivered);
        assert_eq!(
            bundle.lock().clone(),
            Some(ScriptValue::Tuple(vec![
                ScriptValue::Int(1),
                ScriptValue::Str("x".into())
            ]))
        );
    }

    #[test]
    fn test_emit_on_removed_object_is_soft() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());
        assert!(manager.remove_object(source));

        let delivered = manager
            .emit_signal(source, "2clicked(i32)", &[ScriptValue::Int(1)])
            .unwrap();
        assert!(!delivered);
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_meta_call_signal_rebroadcasts() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let converters = manager.converters();
        let args =
            NativeArgs::from_script(&[ScriptValue::Int(9)], &["i32".to_string()], &converters)
                .unwrap();

        let result = manager.meta_call(source, MetaCall::InvokeMethod, 0, &args);
        assert_eq!(result, -1);
        assert_eq!(*activation.calls.lock(), vec![(source, 0, Some(9))]);
    }

    #[test]
    fn test_meta_call_slot_invokes_script_method() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let on_clicked: Arc<dyn ScriptCallable> =
            Arc::new(ScriptFn::new("on_clicked", Arity::Exact(1), move |args| {
                received_clone.lock().extend_from_slice(args);
                Ok(ScriptValue::Nil)
            }));
        wrappers.register(
            source,
            Arc::new(TestScriptObject::new(vec![("on_clicked", on_clicked)])),
            true,
        );

        let converters = manager.converters();
        let args =
            NativeArgs::from_script(&[ScriptValue::Int(3)], &["i32".to_string()], &converters)
                .unwrap();

        let result = manager.meta_call(source, MetaCall::InvokeMethod, 1, &args);
        assert_eq!(result, -1);
        assert_eq!(*received.lock(), vec![ScriptValue::Int(3)]);
    }

    #[test]
    fn test_meta_call_missing_attribute_is_soft() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());
        wrappers.register(source, Arc::new(TestScriptObject::new(vec![])), true);

        let converters = manager.converters();
        let args =
            NativeArgs::from_script(&[ScriptValue::Int(3)], &["i32".to_string()], &converters)
                .unwrap();

        // No "on_clicked" attribute: logged, swallowed, -1.
        assert_eq!(manager.meta_call(source, MetaCall::InvokeMethod, 1, &args), -1);
    }

    #[test]
    fn test_meta_call_script_error_is_reported_and_swallowed() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());

        let on_clicked: Arc<dyn ScriptCallable> =
            Arc::new(ScriptFn::new("on_clicked", Arity::Exact(1), |_| {
                Err(ScriptError::new("slot exploded"))
            }));
        wrappers.register(
            source,
            Arc::new(TestScriptObject::new(vec![("on_clicked", on_clicked)])),
            true,
        );

        let converters = manager.converters();
        let args =
            NativeArgs::from_script(&[ScriptValue::Int(3)], &["i32".to_string()], &converters)
                .unwrap();

        assert_eq!(manager.meta_call(source, MetaCall::InvokeMethod, 1, &args), -1);
        assert_eq!(
            manager.runtime().take_last_error(),
            Some(ScriptError::new("slot exploded"))
        );
    }

    #[test]
    fn test_meta_call_unsupported_kind_returns_offset() {
        let (manager, activation, _) = manager();
        let source = manager.register_object(button_table());

        let converters = manager.converters();
        let args = NativeArgs::from_script(&[], &[], &converters).unwrap();

        // Two declared methods: sentinel is id - method_count.
        assert_eq!(manager.meta_call(source, MetaCall::ReadProperty, 5, &args), 3);
        assert!(activation.calls.lock().is_empty());
    }

    #[test]
    fn test_register_method_requires_script_origin() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());
        wrappers.register(source, Arc::new(TestScriptObject::new(vec![])), false);

        assert!(!manager.register_method(source, "custom(i32)", MethodKind::Signal));
        assert_eq!(manager.method_index(source, "custom(i32)"), None);
        assert_eq!(manager.method_count(source), 2);
    }

    #[test]
    fn test_register_method_on_script_originated_object() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());
        wrappers.register(source, Arc::new(TestScriptObject::new(vec![])), true);

        assert!(manager.register_method(source, "custom(i32)", MethodKind::Signal));
        assert_eq!(manager.method_index(source, "custom(i32)"), Some(2));

        // The dynamic signal is now emittable.
        let delivered = manager
            .emit_signal(source, "2custom(i32)", &[ScriptValue::Int(1)])
            .unwrap();
        assert!(delivered);
    }

    #[test]
    fn test_register_method_existing_signature_is_noop() {
        let (manager, _, wrappers) = manager();
        let source = manager.register_object(button_table());
        // Origin is irrelevant when the signature already exists.
        wrappers.register(source, Arc::new(TestScriptObject::new(vec![])), false);

        assert!(manager.register_method(source, "clicked(i32)", MethodKind::Signal));
        assert_eq!(manager.method_count(source), 2);
    }

    #[test]
    fn test_reset_replaces_global_receiver() {
        let (manager, _, _) = manager();
        let callback = Arc::new(ScriptFn::new("on_changed", Arity::Exact(1), |_| {
            Ok(ScriptValue::Nil)
        }));
        manager.add_global_slot("changed(i32)", callback).unwrap();
        assert_eq!(manager.global_receiver().slot_count(), 1);

        manager.reset();
        assert_eq!(manager.global_receiver().slot_count(), 0);
    }

    #[test]
    fn test_global_receiver_connection_notifications() {
        let (manager, _, _) = manager();
        let source = manager.register_object(button_table());

        assert!(!manager.has_connection_with(source));
        manager.global_receiver_connect_notify(source, 0);
        assert!(manager.has_connection_with(source));
        manager.global_receiver_disconnect_notify(source, 0);
        assert!(!manager.has_connection_with(source));
    }
}

//! Method tables for the meta-object runtime.
//!
//! Every object participating in the bridge exposes a [`MethodTable`]: an
//! indexed, append-only list of signal and slot entries sharing one stable
//! numeric id space. Statically declared methods and dynamically added ones
//! live in the same table, so an id assigned at registration time stays
//! valid for the object's lifetime. Lookups work both by signature string
//! and by numeric id.

use slotmap::new_key_type;

use crate::signature::{bare_name, signature_args};

new_key_type! {
    /// A unique identifier for a native object registered with the bridge.
    pub struct ObjectId;
}

/// Whether a method entry is a signal or a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    /// A notification channel the object broadcasts.
    Signal,
    /// A callable entry point invoked through dispatch.
    Slot,
}

/// The kind of meta-call the native runtime is performing.
///
/// Only [`InvokeMethod`](Self::InvokeMethod) is serviced by the dispatcher;
/// the other kinds exist so the entry point can recognize and decline them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaCall {
    /// Invoke a method (signal activation or slot call).
    InvokeMethod,
    /// Read a property value.
    ReadProperty,
    /// Write a property value.
    WriteProperty,
    /// Reset a property to its default.
    ResetProperty,
}

/// One signal or slot entry in a method table.
#[derive(Clone, Debug)]
pub struct MethodEntry {
    signature: String,
    name: String,
    kind: MethodKind,
    param_types: Vec<String>,
    short_circuit: bool,
}

impl MethodEntry {
    fn parse(signature: &str, kind: MethodKind) -> Self {
        let parsed = signature_args(signature);
        Self {
            signature: signature.to_string(),
            name: bare_name(signature).to_string(),
            kind,
            param_types: parsed.types,
            short_circuit: parsed.short_circuit,
        }
    }

    /// The full signature string this entry was registered under.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The bare method name (signature up to the first parenthesis).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this entry is a signal or a slot.
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// The declared parameter type names.
    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    /// Whether the signature is short-circuit (no declared parameter list).
    pub fn is_short_circuit(&self) -> bool {
        self.short_circuit
    }
}

/// An object's method table.
#[derive(Clone, Debug)]
pub struct MethodTable {
    methods: Vec<MethodEntry>,
}

impl MethodTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Append a signal entry, returning its id.
    pub fn add_signal(&mut self, signature: &str) -> usize {
        self.methods
            .push(MethodEntry::parse(signature, MethodKind::Signal));
        self.methods.len() - 1
    }

    /// Append a slot entry, returning its id.
    pub fn add_slot(&mut self, signature: &str) -> usize {
        self.methods
            .push(MethodEntry::parse(signature, MethodKind::Slot));
        self.methods.len() - 1
    }

    /// Find a method of any kind by its exact signature string.
    pub fn index_of_method(&self, signature: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|entry| entry.signature == signature)
    }

    /// Find a signal by its exact signature string.
    pub fn index_of_signal(&self, signature: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|entry| entry.kind == MethodKind::Signal && entry.signature == signature)
    }

    /// Look up an entry by id.
    pub fn method(&self, id: usize) -> Option<&MethodEntry> {
        self.methods.get(id)
    }

    /// The total number of entries, declared and dynamic alike.
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

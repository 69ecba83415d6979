//! Wrapper-lifetime collaborator.
//!
//! The bridge never owns the relation between a native object and the
//! scripted object wrapping it; it resolves wrappers on demand through
//! [`WrapperLookup`]. [`WrapperRegistry`] is a plain map-backed
//! implementation for hosts that track the relation themselves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::meta::ObjectId;
use crate::value::ScriptObject;

/// Resolves native objects to their scripted wrappers.
pub trait WrapperLookup: Send + Sync {
    /// The scripted object wrapping `object`, if any.
    fn wrapped_object(&self, object: ObjectId) -> Option<Arc<dyn ScriptObject>>;

    /// Whether `object` was originally constructed from scripted code.
    ///
    /// Dynamic signals and slots may only be added to scripted-originated
    /// objects.
    fn is_script_originated(&self, object: ObjectId) -> bool;
}

struct WrapperEntry {
    object: Arc<dyn ScriptObject>,
    script_originated: bool,
}

/// A map-backed [`WrapperLookup`] implementation.
pub struct WrapperRegistry {
    entries: RwLock<HashMap<ObjectId, WrapperEntry>>,
}

impl WrapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record `wrapper` as the scripted object wrapping `object`.
    pub fn register(
        &self,
        object: ObjectId,
        wrapper: Arc<dyn ScriptObject>,
        script_originated: bool,
    ) {
        self.entries.write().insert(
            object,
            WrapperEntry {
                object: wrapper,
                script_originated,
            },
        );
    }

    /// Drop the wrapper record for `object`. Returns `true` if one existed.
    pub fn remove(&self, object: ObjectId) -> bool {
        self.entries.write().remove(&object).is_some()
    }
}

impl WrapperLookup for WrapperRegistry {
    fn wrapped_object(&self, object: ObjectId) -> Option<Arc<dyn ScriptObject>> {
        self.entries
            .read()
            .get(&object)
            .map(|entry| entry.object.clone())
    }

    fn is_script_originated(&self, object: ObjectId) -> bool {
        self.entries
            .read()
            .get(&object)
            .is_some_and(|entry| entry.script_originated)
    }
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

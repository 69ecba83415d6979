//! Typed argument marshaling.
//!
//! [`NativeArgs`] is the typed argument buffer array handed to the native
//! activation primitive: slot 0 is reserved for a return value (always
//! unused here), slots 1..N hold the converted argument buffers.
//!
//! The array exclusively owns its buffers for the duration of one emission.
//! Release is structured scope-exit: the `Drop` impl looks each buffer's
//! deleter up by type name and releases every successfully converted buffer,
//! on the success path and when conversion fails partway through alike. An
//! array is stack-local to its emission and never shared across reentrant
//! calls.
//!
//! Buffers are gone as soon as the array drops, immediately after activation
//! returns. See [`SignalActivation`](crate::activation::SignalActivation)
//! for the synchronous-consumption requirement this places on receivers.

use std::fmt;
use std::sync::Arc;

use crate::convert::{ConverterRegistry, NativeBuffer, SCRIPT_VALUE_TYPE};
use crate::error::{BridgeError, BridgeResult};
use crate::value::ScriptValue;

/// The typed argument buffer array for one emission or dispatch.
pub struct NativeArgs {
    converters: Arc<ConverterRegistry>,
    /// Type names of the converted buffers, in slot order.
    types: Vec<String>,
    /// Slot 0 is the return-value slot, unused; slots 1..N are arguments.
    slots: Vec<Option<NativeBuffer>>,
}

impl NativeArgs {
    /// Convert a script argument sequence into native buffers.
    ///
    /// `arg_types` must be at least as long as `args`; callers validate the
    /// counts beforehand. Arguments are converted in order. An unknown type
    /// name aborts with [`BridgeError::UnknownType`] naming the offender;
    /// buffers already converted at that point are released when the
    /// partially built array drops.
    pub fn from_script(
        args: &[ScriptValue],
        arg_types: &[String],
        converters: &Arc<ConverterRegistry>,
    ) -> BridgeResult<Self> {
        let mut native = Self {
            converters: converters.clone(),
            types: Vec::with_capacity(args.len()),
            slots: Vec::with_capacity(args.len() + 1),
        };
        native.slots.push(None);
        for (value, type_name) in args.iter().zip(arg_types) {
            let converter =
                converters
                    .get(type_name)
                    .ok_or_else(|| BridgeError::UnknownType {
                        type_name: type_name.clone(),
                    })?;
            let buffer = converter.to_native(value)?;
            native.slots.push(Some(buffer));
            native.types.push(type_name.clone());
        }
        Ok(native)
    }

    /// Build the payload for a short-circuit emission: the whole argument
    /// bundle travels unconverted in a single passthrough slot.
    pub fn short_circuit(bundle: ScriptValue, converters: &Arc<ConverterRegistry>) -> Self {
        Self {
            converters: converters.clone(),
            types: vec![SCRIPT_VALUE_TYPE.to_string()],
            slots: vec![None, Some(NativeBuffer::new(SCRIPT_VALUE_TYPE, bundle))],
        }
    }

    /// Borrow the buffer for the zero-based argument `index`.
    pub fn arg(&self, index: usize) -> Option<&NativeBuffer> {
        self.slots.get(index + 1).and_then(|slot| slot.as_ref())
    }

    /// The number of argument slots (the return slot is not counted).
    pub fn arg_count(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }
}

impl fmt::Debug for NativeArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeArgs({})", self.types.join(","))
    }
}

impl Drop for NativeArgs {
    fn drop(&mut self) {
        let types = std::mem::take(&mut self.types);
        let slots = std::mem::take(&mut self.slots);
        for (type_name, slot) in types.iter().zip(slots.into_iter().skip(1)) {
            let Some(buffer) = slot else { continue };
            match self.converters.get(type_name) {
                Some(converter) => converter.release(buffer),
                None => {
                    tracing::warn!(
                        target: "horizon_lattice_script::marshal",
                        %type_name,
                        "no converter registered to release buffer"
                    );
                }
            }
        }
    }
}

/// Convert a native buffer array back into script values.
///
/// Each parameter's converter is looked up by its declared type name and
/// applied to the matching argument slot, in declared order. Used on the
/// inbound path, where the buffers are owned by the native caller.
pub fn to_script(
    param_types: &[String],
    args: &NativeArgs,
    converters: &ConverterRegistry,
) -> BridgeResult<Vec<ScriptValue>> {
    let mut values = Vec::with_capacity(param_types.len());
    for (index, type_name) in param_types.iter().enumerate() {
        let converter = converters
            .get(type_name)
            .ok_or_else(|| BridgeError::UnknownType {
                type_name: type_name.clone(),
            })?;
        let buffer = args
            .arg(index)
            .ok_or(BridgeError::MissingArgument { index })?;
        values.push(converter.to_script(buffer)?);
    }
    Ok(values)
}

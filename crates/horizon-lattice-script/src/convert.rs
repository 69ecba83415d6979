//! Type conversion registry.
//!
//! Conversion between script values and native parameter buffers is driven by
//! type name: every parameter type that can appear in a signal or slot
//! signature has a [`TypeConverter`] registered under that name. The
//! registry is a polymorphic strategy table, not a cast chain; the bridge
//! core only ever looks converters up by name and applies their
//! encode/decode/release operations.
//!
//! [`ConverterRegistry::with_primitives`] pre-registers converters for the
//! primitive value types used on signal parameters, plus the
//! [`SCRIPT_VALUE_TYPE`] passthrough converter that moves a whole
//! [`ScriptValue`] through a buffer unchanged. The passthrough type is what
//! carries short-circuit signal payloads, and it is the escape hatch for a
//! deferring activation implementation that needs to copy a payload out of
//! its buffer before the emission returns.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};
use crate::value::ScriptValue;

/// Registered name of the passthrough converter for whole script values.
pub const SCRIPT_VALUE_TYPE: &str = "ScriptValue";

/// A type-erased native parameter buffer.
///
/// The actual type behind the buffer is known only via its type-name tag; a
/// buffer is only meaningful to the converter registered under that name.
pub struct NativeBuffer {
    type_name: String,
    value: Box<dyn Any + Send + Sync>,
}

impl NativeBuffer {
    /// Wrap a value in a buffer tagged with `type_name`.
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Box::new(value),
        }
    }

    /// The type-name tag this buffer was created under.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the contained value as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeBuffer({})", self.type_name)
    }
}

/// A per-type-name conversion strategy.
pub trait TypeConverter: Send + Sync {
    /// Convert a script value into a native buffer.
    fn to_native(&self, value: &ScriptValue) -> BridgeResult<NativeBuffer>;

    /// Convert a native buffer back into a script value.
    fn to_script(&self, buffer: &NativeBuffer) -> BridgeResult<ScriptValue>;

    /// Release a buffer produced by [`to_native`](Self::to_native).
    fn release(&self, buffer: NativeBuffer) {
        drop(buffer);
    }
}

/// Conversion between a concrete Rust type and [`ScriptValue`].
///
/// Implemented for the primitive types the registry pre-registers; hosts
/// implement it for their own value types and register them with
/// [`ConverterRegistry::register_value_type`].
pub trait ScriptConvert: Any + Clone + Send + Sync {
    /// Extract a value of this type from a script value, if it fits.
    fn from_script(value: &ScriptValue) -> Option<Self>;

    /// Turn this value back into a script value.
    fn into_script(self) -> ScriptValue;
}

/// A [`TypeConverter`] over any [`ScriptConvert`] value type.
pub struct ValueTypeConverter<T> {
    type_name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueTypeConverter<T> {
    /// Create a converter registered under `type_name`.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            _marker: PhantomData,
        }
    }
}

impl<T: ScriptConvert> TypeConverter for ValueTypeConverter<T> {
    fn to_native(&self, value: &ScriptValue) -> BridgeResult<NativeBuffer> {
        T::from_script(value)
            .map(|converted| NativeBuffer::new(self.type_name, converted))
            .ok_or_else(|| BridgeError::ConversionFailed {
                type_name: self.type_name.to_string(),
            })
    }

    fn to_script(&self, buffer: &NativeBuffer) -> BridgeResult<ScriptValue> {
        buffer
            .downcast_ref::<T>()
            .cloned()
            .map(T::into_script)
            .ok_or_else(|| BridgeError::ConversionFailed {
                type_name: self.type_name.to_string(),
            })
    }
}

macro_rules! signed_convert {
    ($($t:ty),*) => {
        $(impl ScriptConvert for $t {
            fn from_script(value: &ScriptValue) -> Option<Self> {
                match *value {
                    ScriptValue::Int(v) => Self::try_from(v).ok(),
                    ScriptValue::UInt(v) => Self::try_from(v).ok(),
                    _ => None,
                }
            }

            fn into_script(self) -> ScriptValue {
                ScriptValue::Int(self as i64)
            }
        })*
    };
}

macro_rules! unsigned_convert {
    ($($t:ty),*) => {
        $(impl ScriptConvert for $t {
            fn from_script(value: &ScriptValue) -> Option<Self> {
                match *value {
                    ScriptValue::Int(v) => Self::try_from(v).ok(),
                    ScriptValue::UInt(v) => Self::try_from(v).ok(),
                    _ => None,
                }
            }

            fn into_script(self) -> ScriptValue {
                ScriptValue::UInt(self as u64)
            }
        })*
    };
}

signed_convert!(i8, i16, i32, i64, isize);
unsigned_convert!(u8, u16, u32, u64, usize);

impl ScriptConvert for f64 {
    fn from_script(value: &ScriptValue) -> Option<Self> {
        match *value {
            ScriptValue::Float(v) => Some(v),
            ScriptValue::Int(v) => Some(v as f64),
            ScriptValue::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    fn into_script(self) -> ScriptValue {
        ScriptValue::Float(self)
    }
}

impl ScriptConvert for f32 {
    fn from_script(value: &ScriptValue) -> Option<Self> {
        f64::from_script(value).map(|v| v as f32)
    }

    fn into_script(self) -> ScriptValue {
        ScriptValue::Float(self as f64)
    }
}

impl ScriptConvert for bool {
    fn from_script(value: &ScriptValue) -> Option<Self> {
        match *value {
            ScriptValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn into_script(self) -> ScriptValue {
        ScriptValue::Bool(self)
    }
}

impl ScriptConvert for String {
    fn from_script(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn into_script(self) -> ScriptValue {
        ScriptValue::Str(self)
    }
}

impl ScriptConvert for ScriptValue {
    fn from_script(value: &ScriptValue) -> Option<Self> {
        Some(value.clone())
    }

    fn into_script(self) -> ScriptValue {
        self
    }
}

/// The type-name-keyed converter registry.
pub struct ConverterRegistry {
    converters: RwLock<HashMap<String, Arc<dyn TypeConverter>>>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the primitive value types used on signal
    /// parameters pre-registered, including the [`SCRIPT_VALUE_TYPE`]
    /// passthrough converter.
    pub fn with_primitives() -> Self {
        let registry = Self::new();
        registry.register_value_type::<i8>("i8");
        registry.register_value_type::<i16>("i16");
        registry.register_value_type::<i32>("i32");
        registry.register_value_type::<i64>("i64");
        registry.register_value_type::<isize>("isize");
        registry.register_value_type::<u8>("u8");
        registry.register_value_type::<u16>("u16");
        registry.register_value_type::<u32>("u32");
        registry.register_value_type::<u64>("u64");
        registry.register_value_type::<usize>("usize");
        registry.register_value_type::<f32>("f32");
        registry.register_value_type::<f64>("f64");
        registry.register_value_type::<bool>("bool");
        registry.register_value_type::<String>("String");
        registry.register_value_type::<ScriptValue>(SCRIPT_VALUE_TYPE);
        registry
    }

    /// Register a converter under a type name, replacing any existing one.
    pub fn register(&self, type_name: impl Into<String>, converter: Arc<dyn TypeConverter>) {
        self.converters.write().insert(type_name.into(), converter);
    }

    /// Register a [`ValueTypeConverter`] for `T` under `type_name`.
    pub fn register_value_type<T: ScriptConvert>(&self, type_name: &'static str) {
        self.register(type_name, Arc::new(ValueTypeConverter::<T>::new(type_name)));
    }

    /// Look up the converter registered under `type_name`.
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TypeConverter>> {
        self.converters.read().get(type_name).cloned()
    }

    /// Check whether a converter is registered under `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.converters.read().contains_key(type_name)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trips() {
        let registry = ConverterRegistry::with_primitives();
        let cases = [
            ("i32", ScriptValue::Int(-7), ScriptValue::Int(-7)),
            ("u16", ScriptValue::Int(300), ScriptValue::UInt(300)),
            ("f64", ScriptValue::Float(1.5), ScriptValue::Float(1.5)),
            ("bool", ScriptValue::Bool(true), ScriptValue::Bool(true)),
            (
                "String",
                ScriptValue::Str("hi".into()),
                ScriptValue::Str("hi".into()),
            ),
            (
                SCRIPT_VALUE_TYPE,
                ScriptValue::Tuple(vec![ScriptValue::Nil, ScriptValue::Int(1)]),
                ScriptValue::Tuple(vec![ScriptValue::Nil, ScriptValue::Int(1)]),
            ),
        ];

        for (type_name, input, expected) in cases {
            let converter = registry.get(type_name).expect(type_name);
            let buffer = converter.to_native(&input).unwrap();
            assert_eq!(buffer.type_name(), type_name);
            assert_eq!(converter.to_script(&buffer).unwrap(), expected);
        }
    }

    #[test]
    fn test_out_of_range_integer_fails() {
        let registry = ConverterRegistry::with_primitives();
        let converter = registry.get("i8").unwrap();
        let result = converter.to_native(&ScriptValue::Int(1000));
        assert_eq!(
            result.unwrap_err(),
            BridgeError::ConversionFailed {
                type_name: "i8".to_string()
            }
        );
    }

    #[test]
    fn test_type_mismatch_fails() {
        let registry = ConverterRegistry::with_primitives();
        let converter = registry.get("bool").unwrap();
        assert!(converter.to_native(&ScriptValue::Int(1)).is_err());

        // A buffer tagged for one converter is opaque to another.
        let int_buffer = registry
            .get("i32")
            .unwrap()
            .to_native(&ScriptValue::Int(1))
            .unwrap();
        assert!(converter.to_script(&int_buffer).is_err());
    }

    #[test]
    fn test_unregistered_type_is_absent() {
        let registry = ConverterRegistry::with_primitives();
        assert!(registry.get("Widget").is_none());
        assert!(!registry.contains("Widget"));
        assert!(registry.contains("i64"));
    }
}

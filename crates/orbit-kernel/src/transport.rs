//! Transportable payloads for cross-context messages
//!
//! Contexts have independent heaps, so engine values never travel directly.
//! A sender captures a value into a [`TransportData`] payload; the receiver
//! unpacks it into its own heap. The binary wire layout is out of scope
//! here; this is the in-memory contract both sides agree on.

use crate::engine::{EngineValue, ScriptEngine};
use crate::error::SerializeError;
use crate::exports::ExternalFunction;

/// Engine-independent value tree carried inside a message payload
#[derive(Debug, Clone, PartialEq)]
pub enum TransportValue {
    /// No value (distinct from an absent payload)
    Unit,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text (also used for `Evaluate` source)
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered list of transportable values
    List(Vec<TransportValue>),
    /// Capability handle: invocable in the receiving context without leaking
    /// engine-native references across heaps
    Function(ExternalFunction),
}

/// An optional transportable payload attached to a message
#[derive(Debug, Clone, Default)]
pub struct TransportData(Option<TransportValue>);

impl TransportData {
    /// A payload with no value
    pub fn empty() -> Self {
        TransportData(None)
    }

    /// Wrap a transportable value
    pub fn new(value: TransportValue) -> Self {
        TransportData(Some(value))
    }

    /// Whether this payload carries no value
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the carried value, if any
    pub fn value(&self) -> Option<&TransportValue> {
        self.0.as_ref()
    }

    /// Unpack the payload into the destination context's heap
    pub fn unpack(&self, engine: &mut dyn ScriptEngine) -> Result<EngineValue, SerializeError> {
        engine.materialize(self)
    }

    /// Capture an engine-native value from the source context for transport
    pub fn move_value(
        engine: &mut dyn ScriptEngine,
        value: EngineValue,
    ) -> Result<TransportData, SerializeError> {
        engine.capture(value)
    }
}

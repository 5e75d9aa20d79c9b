//! Script-engine abstraction consumed by execution contexts
//!
//! Each context owns exactly one engine instance with its own heap. The
//! kernel never inspects engine values; it only moves opaque handles between
//! the engine and the per-context tables. Everything engine-internal
//! (compilation, GC, microtask queues) stays behind this seam.

use std::sync::Arc;

use crate::error::{ScriptError, SerializeError};
use crate::handle::ThreadHandle;
use crate::manager::KernelState;
use crate::transport::TransportData;

/// Opaque handle to a value inside one engine instance's heap
///
/// Meaningless outside the engine that minted it; values cross context
/// boundaries only as [`TransportData`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EngineValue(u64);

impl EngineValue {
    /// Wrap a raw engine slot id
    pub fn from_raw(raw: u64) -> Self {
        EngineValue(raw)
    }

    /// Get the raw engine slot id
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Opaque handle to a global execution environment within one engine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Environment(u32);

impl Environment {
    /// Wrap a raw environment id
    pub fn from_raw(raw: u32) -> Self {
        Environment(raw)
    }

    /// Get the raw environment id
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Back-reference handed to the engine at setup
///
/// Gives engine-level callbacks (native bindings, interrupt delivery) a way
/// back into the owning context and the kernel without global state.
#[derive(Clone)]
pub struct EngineBinding {
    /// Handle of the context that owns this engine instance
    pub thread: ThreadHandle,

    /// Runtime-wide state: tick source, current-thread slot, preempt requests
    pub kernel: Arc<KernelState>,
}

/// One single-threaded script engine instance
///
/// Never entered concurrently from two call sites; the owning context
/// serializes all access. Engine implementations observe the context's
/// interrupt controller at safe points during `evaluate`/`call` and ask the
/// kernel to preempt when an interrupt was requested.
pub trait ScriptEngine: Send {
    /// Bind the back-reference from this engine instance to its context
    fn bind(&mut self, binding: EngineBinding);

    /// Build the template/object cache used to construct environments lazily
    fn prepare(&mut self);

    /// Create a global execution environment
    fn new_environment(&mut self) -> Environment;

    /// Compile and execute source text in the given environment
    fn evaluate(
        &mut self,
        env: Environment,
        source: &str,
        resource_name: &str,
    ) -> Result<EngineValue, ScriptError>;

    /// Invoke a callable value with the given arguments
    fn call(
        &mut self,
        env: Environment,
        func: EngineValue,
        args: &[EngineValue],
    ) -> Result<EngineValue, ScriptError>;

    /// Resolve a pending-result handle with a value
    fn resolve(&mut self, resolver: EngineValue, value: EngineValue) -> Result<(), ScriptError>;

    /// Reject a pending-result handle with a value
    fn reject(&mut self, resolver: EngineValue, value: EngineValue) -> Result<(), ScriptError>;

    /// Drain the engine's microtask queue
    fn run_microtasks(&mut self) -> Result<(), ScriptError>;

    /// The engine's null value
    fn null(&mut self) -> EngineValue;

    /// An engine number holding an unsigned 32-bit integer
    fn uint32(&mut self, value: u32) -> EngineValue;

    /// An engine value wrapping a context handle (for passing senders into script code)
    fn external(&mut self, thread: ThreadHandle) -> EngineValue;

    /// Whether the value can be invoked with `call`
    fn is_callable(&self, value: EngineValue) -> bool;

    /// Produce an engine-native value from a transportable payload (unpack
    /// into this context's heap)
    fn materialize(&mut self, data: &TransportData) -> Result<EngineValue, SerializeError>;

    /// Capture an engine-native value for cross-context transport
    fn capture(&mut self, value: EngineValue) -> Result<TransportData, SerializeError>;
}

/// Creates engine instances for newly set-up contexts
pub trait EngineFactory: Send + Sync {
    /// Allocate a fresh, unbound engine instance
    fn create_engine(&self) -> Box<dyn ScriptEngine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_value_raw_round_trip() {
        let v = EngineValue::from_raw(42);
        assert_eq!(v.as_raw(), 42);
        assert_eq!(v, EngineValue::from_raw(42));
        assert_ne!(v, EngineValue::from_raw(43));
    }

    #[test]
    fn test_environment_raw_round_trip() {
        let env = Environment::from_raw(7);
        assert_eq!(env.as_raw(), 7);
    }
}

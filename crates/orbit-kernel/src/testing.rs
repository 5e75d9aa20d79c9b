//! Scriptable in-memory engine for unit tests
//!
//! `MockEngine` keeps a shared slab of [`MockValue`]s as its "heap" and
//! records every dispatch-visible operation as an [`EngineEvent`], so tests
//! can assert on exactly what the dispatch loop asked the engine to do.
//! A few magic source strings drive engine-side behavior: `throw:<msg>`
//! raises a script error and `exit` requests explicit termination.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::{
    EngineBinding, EngineFactory, EngineValue, Environment, ScriptEngine,
};
use crate::error::{ScriptError, SerializeError};
use crate::handle::{ThreadHandle, ThreadId};
use crate::transport::{TransportData, TransportValue};

/// A value in the mock engine's heap
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    /// The engine's null
    Null,
    /// Unsigned 32-bit number
    Uint(u32),
    /// Wrapped context handle
    External(ThreadId),
    /// A materialized transport payload
    Data(TransportValue),
    /// A callable, named for assertions
    Callable(String),
    /// A value that cannot be captured for transport
    Opaque(String),
}

/// One engine operation observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// `new_environment` was called
    NewEnvironment,
    /// `evaluate` was called with this source text
    Evaluated(String),
    /// `call` was called
    Called {
        /// The invoked callable
        func: MockValue,
        /// Its arguments
        args: Vec<MockValue>,
    },
    /// `resolve` was called
    Resolved {
        /// The pending-result handle
        resolver: MockValue,
        /// The settlement value
        value: MockValue,
    },
    /// `reject` was called
    Rejected {
        /// The pending-result handle
        resolver: MockValue,
        /// The settlement value
        value: MockValue,
    },
    /// `run_microtasks` was called
    MicrotasksRan,
    /// The engine instance was dropped
    Disposed,
}

struct MockState {
    heap: Mutex<Vec<MockValue>>,
    events: Mutex<Vec<EngineEvent>>,
}

impl MockState {
    fn intern(&self, value: MockValue) -> EngineValue {
        let mut heap = self.heap.lock();
        heap.push(value);
        EngineValue::from_raw(heap.len() as u64 - 1)
    }

    fn lookup(&self, value: EngineValue) -> MockValue {
        self.heap.lock()[value.as_raw() as usize].clone()
    }

    fn record(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

/// Creates [`MockEngine`] instances sharing one observable heap
pub struct MockEngineFactory {
    state: Arc<MockState>,
}

impl MockEngineFactory {
    /// Create a factory with an empty heap and event log
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                heap: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Snapshot of every event recorded so far, in order
    pub fn events(&self) -> Vec<EngineEvent> {
        self.state.events.lock().clone()
    }

    /// Put a value into the heap directly (for seeding callables etc.)
    pub fn intern(&self, value: MockValue) -> EngineValue {
        self.state.intern(value)
    }

    /// Resolve an engine handle back to its mock value
    pub fn value_of(&self, value: EngineValue) -> MockValue {
        self.state.lookup(value)
    }
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create_engine(&self) -> Box<dyn ScriptEngine> {
        Box::new(MockEngine {
            state: self.state.clone(),
            binding: None,
            next_env: 0,
        })
    }
}

/// Recording engine backed by the factory's shared heap
pub struct MockEngine {
    state: Arc<MockState>,
    binding: Option<EngineBinding>,
    next_env: u32,
}

impl MockEngine {
    fn binding(&self) -> &EngineBinding {
        self.binding.as_ref().expect("engine not bound")
    }

    /// Engine safe point: consume a pending interrupt request and ask the
    /// kernel to preempt, the way a real engine's interrupt callback would
    fn check_interrupts(&self) {
        let binding = self.binding();
        if binding.thread.interrupts().take_request() {
            binding.kernel.preempt();
        }
    }
}

impl ScriptEngine for MockEngine {
    fn bind(&mut self, binding: EngineBinding) {
        self.binding = Some(binding);
    }

    fn prepare(&mut self) {}

    fn new_environment(&mut self) -> Environment {
        self.state.record(EngineEvent::NewEnvironment);
        let env = Environment::from_raw(self.next_env);
        self.next_env += 1;
        env
    }

    fn evaluate(
        &mut self,
        _env: Environment,
        source: &str,
        resource_name: &str,
    ) -> Result<EngineValue, ScriptError> {
        self.state.record(EngineEvent::Evaluated(source.to_string()));
        self.check_interrupts();

        if let Some(message) = source.strip_prefix("throw:") {
            return Err(ScriptError::new(message)
                .with_location(resource_name, 1)
                .with_stack_trace(format!("    at {resource_name}:1")));
        }
        if source == "exit" {
            self.binding().thread.set_terminate_flag();
        }
        Ok(self.state.intern(MockValue::Null))
    }

    fn call(
        &mut self,
        _env: Environment,
        func: EngineValue,
        args: &[EngineValue],
    ) -> Result<EngineValue, ScriptError> {
        let func_value = self.state.lookup(func);
        self.state.record(EngineEvent::Called {
            func: func_value.clone(),
            args: args.iter().map(|a| self.state.lookup(*a)).collect(),
        });
        self.check_interrupts();

        if func_value == MockValue::Callable("boom".to_string()) {
            return Err(ScriptError::new("boom"));
        }
        Ok(self.state.intern(MockValue::Null))
    }

    fn resolve(&mut self, resolver: EngineValue, value: EngineValue) -> Result<(), ScriptError> {
        self.state.record(EngineEvent::Resolved {
            resolver: self.state.lookup(resolver),
            value: self.state.lookup(value),
        });
        Ok(())
    }

    fn reject(&mut self, resolver: EngineValue, value: EngineValue) -> Result<(), ScriptError> {
        self.state.record(EngineEvent::Rejected {
            resolver: self.state.lookup(resolver),
            value: self.state.lookup(value),
        });
        Ok(())
    }

    fn run_microtasks(&mut self) -> Result<(), ScriptError> {
        self.state.record(EngineEvent::MicrotasksRan);
        Ok(())
    }

    fn null(&mut self) -> EngineValue {
        self.state.intern(MockValue::Null)
    }

    fn uint32(&mut self, value: u32) -> EngineValue {
        self.state.intern(MockValue::Uint(value))
    }

    fn external(&mut self, thread: ThreadHandle) -> EngineValue {
        self.state.intern(MockValue::External(thread.id()))
    }

    fn is_callable(&self, value: EngineValue) -> bool {
        matches!(self.state.lookup(value), MockValue::Callable(_))
    }

    fn materialize(&mut self, data: &TransportData) -> Result<EngineValue, SerializeError> {
        match data.value() {
            Some(value) => Ok(self.state.intern(MockValue::Data(value.clone()))),
            None => Err(SerializeError::EmptyData),
        }
    }

    fn capture(&mut self, value: EngineValue) -> Result<TransportData, SerializeError> {
        match self.state.lookup(value) {
            MockValue::Null => Ok(TransportData::new(TransportValue::Unit)),
            MockValue::Uint(n) => Ok(TransportData::new(TransportValue::Int(n as i64))),
            MockValue::Data(value) => Ok(TransportData::new(value)),
            MockValue::External(_) | MockValue::Callable(_) | MockValue::Opaque(_) => {
                Err(SerializeError::Unserializable)
            }
        }
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.state.record(EngineEvent::Disposed);
    }
}

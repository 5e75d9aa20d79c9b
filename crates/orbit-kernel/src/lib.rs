//! Orbit Kernel Execution Core
//!
//! This crate provides the per-CPU execution core of the runtime kernel:
//! - Execution contexts, each owning one isolated script-engine instance
//! - Cross-context messaging (mailboxes, transportable payloads)
//! - Capability table for exported functions
//! - Continuation, timeout and IRQ-handler tables
//! - Timer-driven cooperative preemption
//! - Context scheduler (priority hint, else round-robin)
//!
//! The script engine itself lives behind the [`ScriptEngine`] trait; the
//! kernel only moves opaque value handles between the engine and its tables.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod error;
pub mod exports;
pub mod handle;
pub mod interrupt;
pub mod manager;
pub mod message;
pub mod pool;
pub mod thread;
pub mod timeouts;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineBinding, EngineFactory, EngineValue, Environment, ScriptEngine};
pub use error::{ScriptError, SerializeError};
pub use exports::{ExternalFunction, FunctionExports};
pub use handle::{ThreadHandle, ThreadId};
pub use interrupt::{InterruptController, InterruptScope, PREEMPT_TICK_THRESHOLD};
pub use manager::{
    FixedStackAllocator, KernelState, StackAllocator, StackHandle, ThreadManager,
    DEFAULT_MS_PER_TICK, DEFAULT_STACK_LEN,
};
pub use message::{MessageKind, ThreadMessage};
pub use thread::{Thread, ThreadType};
pub use transport::{TransportData, TransportValue};

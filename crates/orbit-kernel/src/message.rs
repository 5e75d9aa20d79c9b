//! Cross-context message unit
//!
//! A message is immutable once created: a tagged payload plus routing
//! metadata. The receiving context's dispatch loop consumes each message
//! exactly once (enforced by move); non-reusable messages drop after
//! dispatch, reusable ones return to the owner's recycle list.

use crate::exports::ExternalFunction;
use crate::handle::ThreadHandle;
use crate::transport::TransportData;

/// Message type tag
///
/// The meaning of `recv_index` depends on the tag: a continuation id for
/// `FunctionReturn*`, a timeout id for `TimeoutEvent`, an IRQ handler id for
/// `IrqRaise`, and the caller's continuation id for `FunctionCall` and
/// `SetArguments`. The enum is exhaustive, so an unknown tag is
/// unrepresentable rather than a runtime fault.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Install invocation arguments; the context has no parent
    SetArgumentsNoParent,
    /// Install invocation arguments and record sender as parent
    SetArguments,
    /// Compile and execute the payload as source text
    Evaluate,
    /// Invoke an exported function through its capability handle
    FunctionCall,
    /// Resolve the continuation named by `recv_index`
    FunctionReturnResolve,
    /// Reject the continuation named by `recv_index`
    FunctionReturnReject,
    /// A scheduled timeout elapsed; invoke its stored callback
    TimeoutEvent,
    /// A hardware interrupt was raised; invoke its registered handler
    IrqRaise,
    /// No-op
    Empty,
}

/// An immutable unit of cross-context communication
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    kind: MessageKind,
    sender: Option<ThreadHandle>,
    data: TransportData,
    exported_func: Option<ExternalFunction>,
    recv_index: u32,
    reusable: bool,
}

impl ThreadMessage {
    /// Create a new single-use message
    pub fn new(
        kind: MessageKind,
        sender: Option<ThreadHandle>,
        data: TransportData,
        exported_func: Option<ExternalFunction>,
        recv_index: u32,
    ) -> Self {
        Self {
            kind,
            sender,
            data,
            exported_func,
            recv_index,
            reusable: false,
        }
    }

    /// Mark this message as reusable: after dispatch it is returned to the
    /// receiving context's recycle list instead of being dropped
    pub fn reusable(mut self) -> Self {
        self.reusable = true;
        self
    }

    /// The message type tag
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The sending context, if any
    pub fn sender(&self) -> Option<&ThreadHandle> {
        self.sender.as_ref()
    }

    /// The payload
    pub fn data(&self) -> &TransportData {
        &self.data
    }

    /// The capability handle referenced by a `FunctionCall`
    pub fn exported_func(&self) -> Option<&ExternalFunction> {
        self.exported_func.as_ref()
    }

    /// Type-dependent correlation id
    pub fn recv_index(&self) -> u32 {
        self.recv_index
    }

    /// Whether this message survives dispatch
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }
}

//! Context handles: mailbox, shared tables, reference counting
//!
//! A [`ThreadHandle`] is the cloneable, cross-context face of an execution
//! context. Other contexts push messages through it concurrently; the owner
//! drains the mailbox with an atomic exactly-once take. The capability,
//! continuation, timeout-callback and IRQ tables also live behind the handle
//! so engine-level bindings can register entries while the owner is mid-tick.

use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::EngineValue;
use crate::exports::{ExternalFunction, FunctionExports};
use crate::interrupt::InterruptController;
use crate::manager::KernelState;
use crate::message::ThreadMessage;
use crate::pool::IndexedPool;
use crate::timeouts::Timeouts;

/// Unique identifier for an execution context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    /// Generate a new unique ThreadId
    pub fn new() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a ThreadId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        ThreadId(id)
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

struct ThreadShared {
    id: ThreadId,
    kernel: Arc<KernelState>,

    mailbox: Mutex<Vec<ThreadMessage>>,
    recycled: Mutex<Vec<ThreadMessage>>,

    exports: Mutex<FunctionExports>,
    timeouts: Mutex<Timeouts>,
    timeout_data: Mutex<IndexedPool<EngineValue>>,
    irq_data: Mutex<IndexedPool<EngineValue>>,
    promises: Mutex<IndexedPool<EngineValue>>,

    interrupts: InterruptController,

    /// Live handles/obligations keeping the context alive
    ref_count: AtomicUsize,

    /// Set when the context asked to exit regardless of refcount
    terminate: AtomicBool,

    /// Scheduling priority hint, bumped by message arrival
    priority: AtomicU32,
}

/// Cloneable handle to an execution context
#[derive(Clone)]
pub struct ThreadHandle {
    shared: Arc<ThreadShared>,
}

impl ThreadHandle {
    /// Create the handle for a new execution context
    pub fn new(kernel: Arc<KernelState>) -> Self {
        Self {
            shared: Arc::new(ThreadShared {
                id: ThreadId::new(),
                kernel,
                mailbox: Mutex::new(Vec::new()),
                recycled: Mutex::new(Vec::new()),
                exports: Mutex::new(FunctionExports::new()),
                timeouts: Mutex::new(Timeouts::new()),
                timeout_data: Mutex::new(IndexedPool::new()),
                irq_data: Mutex::new(IndexedPool::new()),
                promises: Mutex::new(IndexedPool::new()),
                interrupts: InterruptController::new(),
                ref_count: AtomicUsize::new(0),
                terminate: AtomicBool::new(false),
                priority: AtomicU32::new(1),
            }),
        }
    }

    /// The context's unique id
    pub fn id(&self) -> ThreadId {
        self.shared.id
    }

    // =========================================================================
    // Mailbox
    // =========================================================================

    /// Append a message to the context's mailbox
    ///
    /// Safe to call concurrently from any context. Bumps the scheduling
    /// priority hint.
    pub fn push_message(&self, msg: ThreadMessage) {
        self.shared.mailbox.lock().push(msg);
        self.shared.priority.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically take the entire pending message batch
    ///
    /// Exactly-once per call: two sequential takes with no intervening push
    /// return the batch and then an empty vector.
    pub fn take_messages(&self) -> Vec<ThreadMessage> {
        mem::take(&mut *self.shared.mailbox.lock())
    }

    /// Number of messages currently queued
    pub fn pending_messages(&self) -> usize {
        self.shared.mailbox.lock().len()
    }

    /// Return a dispatched reusable message to the recycle list
    pub fn recycle(&self, msg: ThreadMessage) {
        self.shared.recycled.lock().push(msg);
    }

    /// Take a recycled message for resending, if one is available
    pub fn take_recycled(&self) -> Option<ThreadMessage> {
        self.shared.recycled.lock().pop()
    }

    // =========================================================================
    // Capability table
    // =========================================================================

    /// Export a callable value, returning its capability handle
    ///
    /// Holds a reference on the context until revoked.
    pub fn add_export(
        &self,
        value: EngineValue,
        recv: Option<ThreadHandle>,
    ) -> ExternalFunction {
        self.add_ref();
        self.shared.exports.lock().add(value, self.clone(), recv)
    }

    /// Look up an exported value by (index, generation)
    pub fn export(&self, index: u32, export_id: u64) -> Option<EngineValue> {
        self.shared.exports.lock().get(index, export_id)
    }

    // =========================================================================
    // Continuations (pending asynchronous results)
    // =========================================================================

    /// Register a pending-result handle; returns its continuation id
    pub fn add_promise(&self, resolver: EngineValue) -> u32 {
        self.add_ref();
        self.shared.promises.lock().push(resolver)
    }

    /// Redeem a continuation id exactly once
    ///
    /// Panics if the id is unknown or already redeemed.
    pub fn take_promise(&self, index: u32) -> EngineValue {
        self.unref();
        self.shared.promises.lock().take(index)
    }

    // =========================================================================
    // Timeout callbacks
    // =========================================================================

    /// Register a timeout callback value; returns its timeout id
    pub fn add_timeout_data(&self, callback: EngineValue) -> u32 {
        self.add_ref();
        self.shared.timeout_data.lock().push(callback)
    }

    /// Take the callback registered for a fired timeout
    ///
    /// Panics if the id is unknown — a fired timeout must name a registered
    /// callback.
    pub fn take_timeout_data(&self, index: u32) -> EngineValue {
        self.unref();
        self.shared.timeout_data.lock().take(index)
    }

    /// Schedule (or reschedule) a timeout relative to the current tick
    ///
    /// `delay_ms` is converted through the runtime-wide milliseconds-per-tick
    /// ratio; re-registering an id overwrites its fire tick.
    pub fn set_timeout(&self, timeout_id: u32, delay_ms: u64) {
        let ticks_now = self.shared.kernel.ticks();
        let when = ticks_now + delay_ms / self.shared.kernel.ms_per_tick();
        self.shared.timeouts.lock().set(timeout_id, when);
    }

    /// Remove and return an elapsed timeout id, earliest first
    pub(crate) fn take_elapsed_timeout(&self, now: u64) -> Option<u32> {
        self.shared.timeouts.lock().take_elapsed(now)
    }

    // =========================================================================
    // IRQ handlers
    // =========================================================================

    /// Register an interrupt handler value; returns its IRQ id
    pub fn add_irq_data(&self, handler: EngineValue) -> u32 {
        self.add_ref();
        self.shared.irq_data.lock().push(handler)
    }

    /// Look up an interrupt handler without removing it
    pub fn irq_data(&self, index: u32) -> Option<EngineValue> {
        self.shared.irq_data.lock().get(index).copied()
    }

    // =========================================================================
    // Lifecycle bookkeeping
    // =========================================================================

    /// Increment the context reference counter
    pub fn add_ref(&self) {
        self.shared.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the context reference counter
    pub fn unref(&self) {
        let prev = self.shared.ref_count.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "thread refcount underflow");
    }

    /// Current reference count
    pub fn ref_count(&self) -> usize {
        self.shared.ref_count.load(Ordering::Relaxed)
    }

    /// Mark this context ready to terminate even if the refcount is nonzero
    pub fn set_terminate_flag(&self) {
        self.shared.terminate.store(true, Ordering::Release);
    }

    /// Whether termination was requested explicitly
    pub fn terminate_requested(&self) -> bool {
        self.shared.terminate.load(Ordering::Acquire)
    }

    /// The context's preemption controller
    pub fn interrupts(&self) -> &InterruptController {
        &self.shared.interrupts
    }

    /// Current scheduling priority hint
    pub fn priority(&self) -> u32 {
        self.shared.priority.load(Ordering::Relaxed)
    }

    /// Reset the priority hint after being scheduled
    pub(crate) fn reset_priority(&self) {
        self.shared.priority.store(1, Ordering::Relaxed);
    }

    /// The kernel state this context belongs to
    pub fn kernel(&self) -> &Arc<KernelState> {
        &self.shared.kernel
    }

    /// Drop all table contents during teardown
    pub(crate) fn clear_tables(&self) {
        let pending = self.shared.promises.lock().len();
        if pending > 0 {
            tracing::warn!(
                thread = self.shared.id.as_u64(),
                pending,
                "continuations never redeemed"
            );
        }
        self.shared.timeout_data.lock().clear();
        self.shared.irq_data.lock().clear();
        self.shared.promises.lock().clear();
        self.shared.timeouts.lock().clear();
        self.shared.exports.lock().clear();
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.shared.id)
            .finish()
    }
}

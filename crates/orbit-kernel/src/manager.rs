//! Kernel state and the cooperative context scheduler
//!
//! [`KernelState`] is the runtime-wide bookkeeping every context shares: the
//! monotonic tick counter, the tick/millisecond ratio, the currently active
//! context, and the pending-preempt flag. [`ThreadManager`] owns the
//! contexts on one CPU and drives them cooperatively: pick the next runnable
//! context (priority hint, else round-robin), give it one dispatch tick, and
//! tear it down when it reports it should stop.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::EngineFactory;
use crate::handle::{ThreadHandle, ThreadId};
use crate::thread::{Thread, ThreadType};

/// Default milliseconds represented by one scheduler tick
pub const DEFAULT_MS_PER_TICK: u64 = 10;

/// Default virtual stack length per context
pub const DEFAULT_STACK_LEN: usize = 2 * 1024 * 1024;

/// Handle to a virtual stack allocated for one context
#[derive(Debug, Clone)]
pub struct StackHandle {
    id: u64,
    len: usize,
}

impl StackHandle {
    /// Allocation identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stack length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the stack has zero length
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocates virtual stacks for new contexts (consumed once per context)
pub trait StackAllocator: Send + Sync {
    /// Allocate one stack
    fn alloc_stack(&self) -> StackHandle;
}

/// Stack allocator handing out fixed-size stacks
pub struct FixedStackAllocator {
    stack_len: usize,
    next_id: AtomicU64,
}

impl FixedStackAllocator {
    /// Create an allocator producing stacks of `stack_len` bytes
    pub fn new(stack_len: usize) -> Self {
        Self {
            stack_len,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for FixedStackAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_LEN)
    }
}

impl StackAllocator for FixedStackAllocator {
    fn alloc_stack(&self) -> StackHandle {
        StackHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            len: self.stack_len,
        }
    }
}

/// Runtime-wide shared state: tick source, current context, preempt flag
pub struct KernelState {
    /// Monotonic tick counter, bumped by the timer interrupt
    ticks: AtomicU64,

    /// Fixed milliseconds-per-tick conversion ratio
    ms_per_tick: u64,

    /// The context currently executing on this CPU
    current: Mutex<Option<ThreadId>>,

    /// Set when a context asked to be rescheduled at the next safe point
    preempt_requested: AtomicBool,

    stacks: Arc<dyn StackAllocator>,
}

impl KernelState {
    /// Create kernel state with an explicit tick ratio and stack allocator
    pub fn new(ms_per_tick: u64, stacks: Arc<dyn StackAllocator>) -> Arc<Self> {
        assert!(ms_per_tick > 0, "ms_per_tick must be nonzero");
        Arc::new(Self {
            // tick counting starts at 1 so tick 0 can never be a valid deadline
            ticks: AtomicU64::new(1),
            ms_per_tick,
            current: Mutex::new(None),
            preempt_requested: AtomicBool::new(false),
            stacks,
        })
    }

    /// Create kernel state with default ratio and stack allocator
    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_MS_PER_TICK, Arc::new(FixedStackAllocator::default()))
    }

    /// Current value of the monotonic tick counter
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Advance the tick counter by one, returning the new value
    pub fn advance_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Milliseconds represented by one tick
    pub fn ms_per_tick(&self) -> u64 {
        self.ms_per_tick
    }

    /// The context currently executing on this CPU
    pub fn current_thread(&self) -> Option<ThreadId> {
        *self.current.lock()
    }

    /// Record the context now executing on this CPU
    pub fn set_current(&self, id: Option<ThreadId>) {
        *self.current.lock() = id;
    }

    /// Ask the scheduler to switch contexts at the next safe point
    ///
    /// Delivered by the engine's interrupt callback while preemption
    /// checking is in scope.
    pub fn preempt(&self) {
        tracing::trace!("preempt requested");
        self.preempt_requested.store(true, Ordering::Release);
    }

    /// Consume a pending preempt request
    pub fn take_preempt_request(&self) -> bool {
        self.preempt_requested.swap(false, Ordering::AcqRel)
    }

    /// Allocate a virtual stack for a new context
    pub fn alloc_stack(&self) -> StackHandle {
        self.stacks.alloc_stack()
    }
}

/// Owns and cooperatively schedules the execution contexts of one CPU
pub struct ThreadManager {
    kernel: Arc<KernelState>,
    factory: Arc<dyn EngineFactory>,
    threads: Vec<Thread>,
    current_index: usize,
}

impl ThreadManager {
    /// Create a manager with no contexts
    pub fn new(kernel: Arc<KernelState>, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            kernel,
            factory,
            threads: Vec::new(),
            current_index: 0,
        }
    }

    /// Create and register a new execution context
    pub fn create_thread(&mut self, thread_type: ThreadType) -> ThreadHandle {
        let thread = Thread::new(thread_type, self.kernel.clone(), self.factory.clone());
        let handle = thread.handle().clone();
        self.threads.push(thread);
        handle
    }

    /// Whether any contexts are registered
    pub fn has_threads(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Number of registered contexts
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// The kernel state shared by this manager's contexts
    pub fn kernel(&self) -> &Arc<KernelState> {
        &self.kernel
    }

    /// Timer interrupt entry: advance the global tick and forward the tick
    /// to the currently active context's preemption controller
    pub fn timer_interrupt_notify(&self) {
        self.kernel.advance_tick();

        let Some(current) = self.kernel.current_thread() else {
            return;
        };
        if let Some(thread) = self.threads.iter().find(|t| t.handle().id() == current) {
            thread.timer_tick();
        }
    }

    /// Sweep terminated contexts and select the next one to run
    ///
    /// The context with the highest priority hint wins; when all hints are
    /// equal, selection is round-robin. The winner's hint is reset.
    pub fn switch_to_next_thread(&mut self) -> Option<ThreadId> {
        self.threads
            .retain(|thread| thread.thread_type() != ThreadType::Terminated);

        if self.threads.is_empty() {
            self.kernel.set_current(None);
            return None;
        }
        if self.current_index >= self.threads.len() {
            self.current_index = 0;
        }

        let mut max = 0u32;
        let mut min = u32::MAX;
        let mut max_index = 0usize;

        for (i, thread) in self.threads.iter().enumerate() {
            let p = thread.handle().priority();
            if p > max {
                max = p;
                max_index = i;
            }
            if p < min {
                min = p;
            }
        }

        if max != min {
            self.current_index = max_index;
        } else {
            self.current_index = (self.current_index + 1) % self.threads.len();
        }

        let thread = &self.threads[self.current_index];
        let id = thread.handle().id();
        thread.handle().reset_priority();
        self.kernel.set_current(Some(id));
        Some(id)
    }

    /// Run one scheduling slice: pick a context and give it one dispatch tick
    ///
    /// Sets up the context lazily on its first slice and tears it down when
    /// its `run` reports it should stop. Returns `false` when no runnable
    /// context remains.
    pub fn run_once(&mut self) -> bool {
        if self.switch_to_next_thread().is_none() {
            return false;
        }

        let thread = &mut self.threads[self.current_index];
        if !thread.is_set_up() {
            thread.set_up();
        }

        if !thread.run() {
            thread.tear_down();
        }

        // slice boundary is the cooperative safe point
        let _ = self.kernel.take_preempt_request();
        true
    }
}

//! Execution context lifecycle and message dispatch
//!
//! A [`Thread`] owns one script-engine instance and drives the per-tick
//! dispatch loop: promote elapsed timeouts into messages, drain the mailbox
//! exactly once, dispatch each message through the state machine, then
//! decide whether the context should keep existing. Script-level failures
//! are trapped per tick and reported; contract violations panic.

use std::sync::Arc;

use crate::engine::{EngineBinding, EngineFactory, EngineValue, Environment, ScriptEngine};
use crate::error::ScriptError;
use crate::handle::ThreadHandle;
use crate::interrupt::InterruptScope;
use crate::manager::{KernelState, StackHandle};
use crate::message::{MessageKind, ThreadMessage};
use crate::transport::{TransportData, TransportValue};

/// Resource name attributed to `Evaluate` source text
const EVALUATE_RESOURCE_NAME: &str = "<evaluate>";

/// Execution context type tag
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThreadType {
    /// Ordinary context: owns an engine instance, can terminate
    Default,
    /// Immortal placeholder context: never acquires an engine, never terminates
    Idle,
    /// Torn down; `run` must never be called again
    Terminated,
}

/// One isolated execution context
pub struct Thread {
    thread_type: ThreadType,
    handle: ThreadHandle,
    kernel: Arc<KernelState>,
    factory: Arc<dyn EngineFactory>,
    stack: StackHandle,

    engine: Option<Box<dyn ScriptEngine>>,
    env: Option<Environment>,

    args: Option<EngineValue>,
    exit_value: Option<EngineValue>,
    call_wrapper: Option<EngineValue>,

    parent: Option<ThreadHandle>,
    parent_continuation: u32,
}

impl Thread {
    /// Create a context of the given type
    ///
    /// Allocates the context's virtual stack; the engine instance is created
    /// later by [`set_up`](Thread::set_up).
    pub fn new(
        thread_type: ThreadType,
        kernel: Arc<KernelState>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let stack = kernel.alloc_stack();
        let handle = ThreadHandle::new(kernel.clone());
        Self {
            thread_type,
            handle,
            kernel,
            factory,
            stack,
            engine: None,
            env: None,
            args: None,
            exit_value: None,
            call_wrapper: None,
            parent: None,
            parent_continuation: 0,
        }
    }

    /// The context's cross-context handle
    pub fn handle(&self) -> &ThreadHandle {
        &self.handle
    }

    /// The context's type tag
    pub fn thread_type(&self) -> ThreadType {
        self.thread_type
    }

    /// The context's virtual stack
    pub fn stack(&self) -> &StackHandle {
        &self.stack
    }

    /// Whether `set_up` has already created the engine instance
    pub fn is_set_up(&self) -> bool {
        self.engine.is_some() || self.thread_type != ThreadType::Default
    }

    /// Installed invocation arguments, if any
    pub fn args(&self) -> Option<EngineValue> {
        self.args
    }

    /// The parent context this one computes a value for, if any
    pub fn parent(&self) -> Option<&ThreadHandle> {
        self.parent.as_ref()
    }

    /// Continuation id in the parent redeemed by this context's exit
    pub fn parent_continuation_id(&self) -> u32 {
        self.parent_continuation
    }

    /// Record the value delivered to the parent's continuation at teardown
    pub fn set_exit_value(&mut self, value: EngineValue) {
        self.exit_value = Some(value);
    }

    /// Install the fixed internal call-wrapper function (set-once)
    ///
    /// The wrapper receives (target-or-null, sender, arguments, continuation
    /// id) for every inbound `FunctionCall` and is responsible for producing
    /// and eventually settling a continuation back to the sender.
    pub fn set_call_wrapper(&mut self, wrapper: EngineValue) {
        assert!(self.call_wrapper.is_none(), "call wrapper already installed");
        let engine = self
            .engine
            .as_ref()
            .expect("set_call_wrapper() before set_up()");
        assert!(engine.is_callable(wrapper), "call wrapper is not callable");
        self.call_wrapper = Some(wrapper);
    }

    /// Set up the context: allocate the engine instance and its caches
    ///
    /// No-op for Idle contexts. Panics if the engine already exists.
    pub fn set_up(&mut self) {
        if self.thread_type == ThreadType::Idle {
            return;
        }

        assert!(self.engine.is_none(), "thread already set up");
        let mut engine = self.factory.create_engine();
        tracing::debug!(thread = self.handle.id().as_u64(), "new engine instance");

        engine.bind(EngineBinding {
            thread: self.handle.clone(),
            kernel: self.kernel.clone(),
        });
        engine.prepare();
        self.engine = Some(engine);
    }

    /// Forward a periodic timer tick to the preemption controller
    pub fn timer_tick(&self) {
        self.handle.interrupts().timer_tick();
    }

    /// Run one dispatch tick
    ///
    /// Returns `true` while the context expects further `run` calls and
    /// `false` once it should be torn down. Panics if called on a terminated
    /// context.
    pub fn run(&mut self) -> bool {
        assert!(
            self.thread_type != ThreadType::Terminated,
            "run() on a terminated thread"
        );

        // Idle context does nothing and never terminates
        if self.thread_type == ThreadType::Idle {
            return true;
        }

        // Promote elapsed timeouts into messages, appended after whatever
        // the mailbox already holds
        let ticks_now = self.kernel.ticks();
        while let Some(timeout_id) = self.handle.take_elapsed_timeout(ticks_now) {
            self.handle.push_message(ThreadMessage::new(
                MessageKind::TimeoutEvent,
                None,
                TransportData::empty(),
                None,
                timeout_id,
            ));
        }

        let messages = self.handle.take_messages();
        if messages.is_empty() {
            // fast path: never enter the engine for an empty batch
            return true;
        }

        let engine = self.engine.as_mut().expect("run() before set_up()");

        if self.env.is_none() {
            tracing::debug!(thread = self.handle.id().as_u64(), "new environment");
            self.env = Some(engine.new_environment());
        }
        let env = self.env.expect("environment just materialized");

        // One error trap spans the whole batch; at most one outstanding
        // exception is kept and it never escapes the tick
        let mut trap: Option<ScriptError> = None;

        for message in messages {
            match message.kind() {
                MessageKind::SetArgumentsNoParent => {
                    assert!(self.args.is_none(), "arguments already set");
                    match message.data().unpack(&mut **engine) {
                        Ok(unpacked) => self.args = Some(unpacked),
                        Err(err) => trap = Some(err.into()),
                    }
                }

                MessageKind::SetArguments => {
                    assert!(self.args.is_none(), "arguments already set");
                    match message.data().unpack(&mut **engine) {
                        Ok(unpacked) => {
                            self.args = Some(unpacked);
                            self.parent = message.sender().cloned();
                            self.parent_continuation = message.recv_index();
                        }
                        Err(err) => trap = Some(err.into()),
                    }
                }

                MessageKind::Evaluate => match message.data().value() {
                    Some(TransportValue::Text(source)) => {
                        let source = source.clone();
                        let _scope = InterruptScope::enter(self.handle.interrupts());
                        if let Err(err) = engine.evaluate(env, &source, EVALUATE_RESOURCE_NAME) {
                            trap = Some(err);
                        }
                    }
                    // a malformed payload fails this message, not the tick
                    other => {
                        trap = Some(ScriptError::new(format!(
                            "evaluate payload is not source text: {other:?}"
                        )));
                    }
                },

                MessageKind::FunctionCall => {
                    match message.data().unpack(&mut **engine) {
                        Ok(unpacked) => {
                            let efn = message
                                .exported_func()
                                .expect("function call without a capability reference");

                            // Revoked or unknown capability degrades to null,
                            // never failing the tick
                            let target = match self.handle.export(efn.index(), efn.export_id()) {
                                Some(value) => {
                                    assert!(
                                        engine.is_callable(value),
                                        "exported capability is not callable"
                                    );
                                    value
                                }
                                None => engine.null(),
                            };

                            let wrapper =
                                self.call_wrapper.expect("call wrapper is not installed");
                            let sender = match message.sender() {
                                Some(handle) => engine.external(handle.clone()),
                                None => engine.null(),
                            };
                            let recv_index = engine.uint32(message.recv_index());
                            let argv = [target, sender, unpacked, recv_index];

                            let _scope = InterruptScope::enter(self.handle.interrupts());
                            if let Err(err) = engine.call(env, wrapper, &argv) {
                                trap = Some(err);
                            }
                        }
                        Err(err) => trap = Some(err.into()),
                    }
                }

                MessageKind::FunctionReturnResolve | MessageKind::FunctionReturnReject => {
                    // Consume the continuation before touching the payload so
                    // a failed settlement cannot leave it pending forever.
                    // Redeeming an unknown continuation id panics.
                    let resolver = self.handle.take_promise(message.recv_index());

                    match message.data().unpack(&mut **engine) {
                        Ok(unpacked) => {
                            let _scope = InterruptScope::enter(self.handle.interrupts());
                            let settled = if message.kind() == MessageKind::FunctionReturnResolve {
                                engine.resolve(resolver, unpacked)
                            } else {
                                engine.reject(resolver, unpacked)
                            };
                            if let Err(err) = settled.and_then(|()| engine.run_microtasks()) {
                                trap = Some(err);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(
                                thread = self.handle.id().as_u64(),
                                continuation = message.recv_index(),
                                error = %err,
                                "settlement payload failed to unpack"
                            );
                            trap = Some(err.into());
                        }
                    }
                }

                MessageKind::TimeoutEvent => {
                    let callback = self.handle.take_timeout_data(message.recv_index());
                    assert!(
                        engine.is_callable(callback),
                        "timeout callback is not callable"
                    );

                    let _scope = InterruptScope::enter(self.handle.interrupts());
                    if let Err(err) = engine.call(env, callback, &[]) {
                        trap = Some(err);
                    }
                }

                MessageKind::IrqRaise => {
                    let handler = self
                        .handle
                        .irq_data(message.recv_index())
                        .unwrap_or_else(|| {
                            panic!("IRQ handler {} is not registered", message.recv_index())
                        });
                    assert!(engine.is_callable(handler), "IRQ handler is not callable");

                    let _scope = InterruptScope::enter(self.handle.interrupts());
                    if let Err(err) = engine.call(env, handler, &[]) {
                        trap = Some(err);
                    }
                }

                MessageKind::Empty => {}
            }

            if message.is_reusable() {
                self.handle.recycle(message);
            }
        }

        if self.handle.ref_count() == 0 || self.handle.terminate_requested() {
            let reason = if self.handle.terminate_requested() {
                "explicit exit"
            } else {
                "refcount 0"
            };
            tracing::info!(
                thread = self.handle.id().as_u64(),
                reason,
                "terminating thread"
            );
            self.handle.set_terminate_flag();
            return false;
        }

        if let Some(err) = trap.take() {
            tracing::error!(
                thread = self.handle.id().as_u64(),
                resource = err.resource_name.as_deref().unwrap_or("<unknown>"),
                line = err.line,
                stack = err.stack_trace.as_deref(),
                "uncaught exception: {}",
                err.message
            );
        }

        true
    }

    /// Tear the context down: resolve the parent's continuation with the
    /// exit value, release every owned resource, dispose the engine
    ///
    /// No-op for Idle contexts. Must be invoked exactly once, on the
    /// context's own execution path (it must be the kernel's current
    /// thread). Panics on a second call.
    pub fn tear_down(&mut self) {
        if self.thread_type == ThreadType::Idle {
            return;
        }
        assert_eq!(
            self.thread_type,
            ThreadType::Default,
            "tear_down() called twice"
        );

        let mut engine = self.engine.take().expect("tear_down() before set_up()");

        // Resume the caller: deliver the exit value to the parent's
        // continuation. A missing or uncapturable exit value degrades to a
        // unit payload; the parent must still be resumed.
        if let Some(parent) = self.parent.take() {
            let data = match self.exit_value {
                Some(value) => match engine.capture(value) {
                    Ok(data) => data,
                    Err(err) => {
                        tracing::warn!(
                            thread = self.handle.id().as_u64(),
                            error = %err,
                            "exit value serialization failed"
                        );
                        TransportData::new(TransportValue::Unit)
                    }
                },
                None => TransportData::new(TransportValue::Unit),
            };

            parent.push_message(ThreadMessage::new(
                MessageKind::FunctionReturnResolve,
                Some(self.handle.clone()),
                data,
                None,
                self.parent_continuation,
            ));
        }

        assert_eq!(
            self.kernel.current_thread(),
            Some(self.handle.id()),
            "tear_down() off the owning execution path"
        );

        self.handle.clear_tables();

        // fixed release order, each safe on empty state
        self.env = None;
        self.args = None;
        self.exit_value = None;
        self.call_wrapper = None;

        tracing::debug!(thread = self.handle.id().as_u64(), "dispose engine instance");
        drop(engine);

        self.thread_type = ThreadType::Terminated;
    }
}

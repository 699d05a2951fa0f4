//! Node handles and the kernel trait.
//!
//! A node is split in two: the [`NodeHandle`] is the shared, thread-safe
//! half (identity, state, latches, ports, queued params) that the managers
//! and dependent node threads touch; the [`NodeKernel`] is the private half
//! that only the node's own thread drives.

use crate::bus::{Event, NodeParams};
use crate::config::RuntimeConfig;
use crate::error::{FlowError, Result};
use crate::types::{NodeName, NodeState};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::port::{Payload, PortRegistrar, PortTable};

/// A resettable boolean flag threads can block on.
///
/// The start latch triggers a pass (and is left set for loop nodes); the
/// done latch is how dependents observe pass completion.
#[derive(Default)]
pub struct Latch {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Block until the latch is set or `timeout` elapses. Returns whether
    /// the latch was set.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if *state {
            return true;
        }
        self.cond.wait_while_for(&mut state, |set| !*set, timeout);
        *state
    }

    /// Like [`Latch::wait_for`], but against an absolute deadline.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        let timeout = deadline.saturating_duration_since(now);
        self.wait_for(timeout)
    }
}

/// Shared, thread-safe half of a node.
pub struct NodeHandle {
    pub name: NodeName,
    pub type_name: String,
    /// Loop nodes keep their start latch set across passes and re-run
    /// until paused.
    pub loop_node: bool,
    state: AtomicU8,
    pub start: Latch,
    pub done: Latch,
    stopping: AtomicBool,
    pub ports: Mutex<PortTable>,
    pending_params: Mutex<Option<NodeParams>>,
}

impl NodeHandle {
    pub fn new(name: NodeName, type_name: impl Into<String>, loop_node: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            type_name: type_name.into(),
            loop_node,
            state: AtomicU8::new(NodeState::Idle as u8),
            start: Latch::new(),
            done: Latch::new(),
            stopping: AtomicBool::new(false),
            ports: Mutex::new(PortTable::default()),
            pending_params: Mutex::new(None),
        })
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store a new state. Returns true when the state actually changed, so
    /// callers only publish transitions.
    pub fn set_state(&self, state: NodeState) -> bool {
        let prev = self.state.swap(state as u8, Ordering::AcqRel);
        prev != state as u8
    }

    /// Ask the node thread to exit at its next wake-up.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        // Wake the thread if it is parked on the start latch.
        self.start.set();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Queue params for the node thread; a second update before the thread
    /// wakes replaces the first.
    pub fn queue_params(&self, params: NodeParams) {
        *self.pending_params.lock() = Some(params);
    }

    pub fn take_pending_params(&self) -> Option<NodeParams> {
        self.pending_params.lock().take()
    }
}

/// Behaviour of a node type. Implementations are driven by exactly one
/// thread and never see the handle directly.
pub trait NodeKernel: Send {
    /// Declare inputs and outputs. Called once, before the node thread
    /// starts; declaration order is the order used by input checks.
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>);

    /// Run one pass. Inputs have already been resolved; outputs are set
    /// through the context. An error puts the node in the internal-error
    /// state and suppresses downstream triggering for this pass.
    fn process(&mut self, ctx: &mut KernelContext<'_>) -> Result<()>;

    /// Apply new parameters outside a pass.
    fn update_params(&mut self, _ctx: &mut KernelContext<'_>, _params: &NodeParams) -> Result<()> {
        Ok(())
    }

    /// Synchronous nodes stay in the running state until their direct
    /// downstream nodes complete the pass they triggered.
    fn sync(&self) -> bool {
        false
    }

    /// Release external resources. Called once, on the node thread, after
    /// the loop exits.
    fn shutdown(&mut self) {}
}

impl std::fmt::Debug for dyn NodeKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NodeKernel")
    }
}

/// Per-call view a kernel gets of its node: resolved inputs, output
/// setters, and the event queue.
pub struct KernelContext<'a> {
    handle: &'a Arc<NodeHandle>,
    events: &'a Sender<Event>,
    config: &'a RuntimeConfig,
    /// Input payload snapshot, parallel to the input port list.
    inputs: Vec<Option<Payload>>,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(
        handle: &'a Arc<NodeHandle>,
        events: &'a Sender<Event>,
        config: &'a RuntimeConfig,
        inputs: Vec<Option<Payload>>,
    ) -> Self {
        Self {
            handle,
            events,
            config,
            inputs,
        }
    }

    pub fn node_name(&self) -> &NodeName {
        &self.handle.name
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.config
    }

    /// Payload on the named input, if its upstream produced one.
    pub fn input(&self, name: &str) -> Option<&Payload> {
        let index = self.handle.ports.lock().input_index(name)?;
        self.inputs.get(index).and_then(|p| p.as_ref())
    }

    /// Place a payload on the named output.
    pub fn set_output(&mut self, name: &str, payload: Payload) -> Result<()> {
        let mut ports = self.handle.ports.lock();
        let index = ports
            .output_index(name)
            .ok_or_else(|| FlowError::PortNotFound {
                node: self.handle.name.clone(),
                port: name.to_string(),
            })?;
        ports.outputs[index].payload = Some(payload);
        Ok(())
    }

    /// Broadcast a params-changed event for this node. An empty map is the
    /// frame-ready notification.
    pub fn publish_params(&self, params: NodeParams) {
        let _ = self.events.send(Event::ParamsChanged {
            node_name: self.handle.name.clone(),
            params,
        });
    }

    /// Re-arm this node's own start latch, scheduling another pass. Loop
    /// sources use this to keep producing after parameter changes.
    pub fn start_self(&self) {
        self.handle.start.set();
    }
}

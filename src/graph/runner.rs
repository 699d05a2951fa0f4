//! The node thread and its execution protocol.
//!
//! Every node gets a dedicated thread parked on its start latch. A pass
//! walks a fixed sequence: recompute connection states, verify critical
//! inputs, pull upstream dependencies that have no data yet, run the
//! kernel, then trigger downstream consumers. Only consumers wired to an
//! output that actually carries data are triggered: a consumer woken over
//! a data-less edge would immediately pull its producer again, and the
//! pair would re-trigger each other forever. State transitions are
//! published as events, but only when the state actually changes.

use crate::bus::Event;
use crate::config::RuntimeConfig;
use crate::types::{ConnectionState, DataKind, NodeState};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, trace, warn};

use super::node::{KernelContext, NodeHandle, NodeKernel};
use super::port::{check_connection, OutputLink, Payload};

/// Spawn the thread that drives `kernel` for `handle`. Ports must already
/// be registered on the handle.
pub fn spawn(
    handle: Arc<NodeHandle>,
    kernel: Box<dyn NodeKernel>,
    events: Sender<Event>,
    config: RuntimeConfig,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(handle.name.to_string())
        .spawn(move || run(handle, kernel, events, config))
}

fn run(
    handle: Arc<NodeHandle>,
    mut kernel: Box<dyn NodeKernel>,
    events: Sender<Event>,
    config: RuntimeConfig,
) {
    debug!(node = %handle.name, "node thread started");
    loop {
        if handle.is_stopping() {
            break;
        }

        if let Some(params) = handle.take_pending_params() {
            let mut ctx = KernelContext::new(&handle, &events, &config, Vec::new());
            if let Err(e) = kernel.update_params(&mut ctx, &params) {
                warn!(node = %handle.name, error = %e, "parameter update failed");
                emit_state(&handle, &events, NodeState::InternalError);
            }
        }

        if !handle.start.wait_for(config.wake_interval()) {
            continue;
        }
        if handle.is_stopping() {
            break;
        }

        // Loop nodes keep the latch set and re-run until paused.
        if !handle.loop_node {
            handle.start.clear();
        }
        handle.done.clear();

        execute_pass(&handle, kernel.as_mut(), &events, &config);

        // The done latch reports pass completion, not success; dependents
        // inspect the state afterwards.
        handle.done.set();
    }
    kernel.shutdown();
    debug!(node = %handle.name, "node thread exited");
}

/// Snapshot of one input taken at the start of a pass, so upstream port
/// tables are never locked while our own is held.
struct InputView {
    name: String,
    critical: bool,
    accepts: Vec<DataKind>,
    link: Option<OutputLink>,
    prev_state: ConnectionState,
}

fn execute_pass(
    handle: &Arc<NodeHandle>,
    kernel: &mut dyn NodeKernel,
    events: &Sender<Event>,
    config: &RuntimeConfig,
) {
    emit_state(handle, events, NodeState::Waiting);

    let views: Vec<InputView> = {
        let ports = handle.ports.lock();
        ports
            .inputs
            .iter()
            .map(|p| InputView {
                name: p.name.clone(),
                critical: p.critical,
                accepts: p.accepts.clone(),
                link: p.link.clone(),
                prev_state: p.connection_state,
            })
            .collect()
    };

    // Recompute connection states; the first bad critical input (in
    // registration order) decides the failure state.
    let mut first_missing = None;
    let mut conn_states = Vec::with_capacity(views.len());
    for (index, view) in views.iter().enumerate() {
        let produces = view
            .link
            .as_ref()
            .and_then(|l| l.node.upgrade().map(|up| (up, l.port)))
            .and_then(|(up, port)| {
                up.ports.lock().outputs.get(port).map(|o| o.produces.clone())
            });
        let state = check_connection(&view.accepts, produces.as_deref());
        if state != view.prev_state {
            if let Some(input) = handle.ports.lock().inputs.get_mut(index) {
                input.connection_state = state;
            }
            let _ = events.send(Event::PortStateChanged {
                node_name: handle.name.clone(),
                port: view.name.clone(),
                state,
            });
        }
        if view.critical && state != ConnectionState::ConnectedOk && first_missing.is_none() {
            first_missing = Some(view.name.clone());
        }
        conn_states.push(state);
    }
    if let Some(port) = first_missing {
        debug!(node = %handle.name, %port, "critical input not connected");
        emit_state(handle, events, NodeState::MissingCriticalInput);
        return;
    }

    // Pull upstream nodes whose linked output holds no data yet. Only
    // healthy edges pull; an incompatible edge must not execute its
    // producer. All pulls are signalled before any await so independent
    // upstreams run concurrently; awaits then proceed in registration
    // order against one shared deadline.
    let mut pulled = Vec::new();
    for (view, conn_state) in views.iter().zip(&conn_states) {
        if *conn_state != ConnectionState::ConnectedOk {
            continue;
        }
        let Some(link) = &view.link else { continue };
        let Some(up) = link.node.upgrade() else { continue };
        let has_payload = up
            .ports
            .lock()
            .outputs
            .get(link.port)
            .map(|o| o.payload.is_some())
            .unwrap_or(false);
        if !has_payload {
            trace!(node = %handle.name, upstream = %up.name, input = %view.name, "pulling dependency");
            up.done.clear();
            up.start.set();
            pulled.push((view.critical, view.name.clone(), up));
        }
    }
    let deadline = Instant::now() + config.dependency_timeout();
    for (critical, input, up) in &pulled {
        let completed = up.done.wait_until(deadline);
        if completed && up.state() == NodeState::Idle {
            continue;
        }
        if *critical {
            if completed {
                debug!(node = %handle.name, upstream = %up.name, state = %up.state(),
                    "critical dependency failed");
            } else {
                warn!(node = %handle.name, upstream = %up.name, input = %input,
                    "timed out waiting for critical dependency");
            }
            emit_state(handle, events, NodeState::CriticalInputError);
            return;
        }
        debug!(node = %handle.name, upstream = %up.name, input = %input,
            "non-critical dependency unavailable, continuing");
    }

    emit_state(handle, events, NodeState::Running);

    let inputs: Vec<Option<Payload>> = views
        .iter()
        .map(|view| {
            view.link
                .as_ref()
                .and_then(|l| l.node.upgrade().map(|up| (up, l.port)))
                .and_then(|(up, port)| {
                    up.ports.lock().outputs.get(port).and_then(|o| o.payload.clone())
                })
        })
        .collect();

    let mut ctx = KernelContext::new(handle, events, config, inputs);
    if let Err(e) = kernel.process(&mut ctx) {
        warn!(node = %handle.name, error = %e, "pass failed");
        emit_state(handle, events, NodeState::InternalError);
        return;
    }

    // Trigger every consumer of an output that carries data. Deduplicated
    // so a node consuming two of our outputs runs once.
    let consumers: Vec<Arc<NodeHandle>> = {
        let ports = handle.ports.lock();
        let mut seen: Vec<Arc<NodeHandle>> = Vec::new();
        for output in ports.outputs.iter().filter(|o| o.payload.is_some()) {
            for link in &output.consumers {
                if let Some(down) = link.node.upgrade() {
                    if !seen.iter().any(|n| Arc::ptr_eq(n, &down)) {
                        seen.push(down);
                    }
                }
            }
        }
        seen
    };
    for down in &consumers {
        trace!(node = %handle.name, downstream = %down.name, "triggering consumer");
        down.done.clear();
        down.start.set();
    }

    if kernel.sync() && !consumers.is_empty() {
        let deadline = Instant::now() + config.dependency_timeout();
        for down in &consumers {
            if !down.done.wait_until(deadline) {
                warn!(node = %handle.name, downstream = %down.name,
                    "timed out waiting for synchronous consumer");
                break;
            }
        }
    }

    emit_state(handle, events, NodeState::Idle);
}

fn emit_state(handle: &Arc<NodeHandle>, events: &Sender<Event>, state: NodeState) {
    if handle.set_state(state) {
        let _ = events.send(Event::StateChanged {
            node_name: handle.name.clone(),
            state,
        });
    }
}

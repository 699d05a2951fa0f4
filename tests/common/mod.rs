//! Shared helpers for integration tests: a couple of minimal node kernels
//! and event-watching utilities.

// Not every test binary uses every helper.
#![allow(dead_code)]

use crossbeam_channel::Receiver;
use mediaflow_rs::error::FlowError;
use mediaflow_rs::graph::{KernelContext, NodeKernel, Payload, PortRegistrar};
use mediaflow_rs::{DataKind, Event, NodeName, NodeRegistry, NodeState, RuntimeConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Produces an incrementing counter value and counts its own passes.
pub struct CountingSource {
    pub passes: Arc<AtomicUsize>,
}

impl NodeKernel for CountingSource {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_output("Out", &[DataKind::Value]);
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> mediaflow_rs::Result<()> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.set_output("Out", Payload::Value(serde_json::json!(pass)))
    }
}

/// Declares the same output as [`CountingSource`] but always fails.
pub struct FailingSource;

impl NodeKernel for FailingSource {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_output("Out", &[DataKind::Value]);
    }

    fn process(&mut self, _ctx: &mut KernelContext<'_>) -> mediaflow_rs::Result<()> {
        Err(FlowError::Params("simulated failure".to_string()))
    }
}

/// Collects every value payload seen on its critical input.
pub struct CollectingSink {
    pub seen: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl NodeKernel for CollectingSink {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_input("In", &[DataKind::Value], true);
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> mediaflow_rs::Result<()> {
        if let Some(Payload::Value(value)) = ctx.input("In") {
            self.seen.lock().push(value.clone());
        }
        Ok(())
    }
}

/// Forwards its critical value input to its output unchanged.
pub struct Relay;

impl NodeKernel for Relay {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_input("In", &[DataKind::Value], true);
        ports.add_output("Out", &[DataKind::Value]);
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> mediaflow_rs::Result<()> {
        let value = match ctx.input("In") {
            Some(Payload::Value(value)) => value.clone(),
            _ => serde_json::Value::Null,
        };
        ctx.set_output("Out", Payload::Value(value))
    }
}

/// A sink whose input only accepts frames, for incompatibility scenarios.
pub struct FrameOnlySink;

impl NodeKernel for FrameOnlySink {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_input("In", &[DataKind::Frame], true);
    }

    fn process(&mut self, _ctx: &mut KernelContext<'_>) -> mediaflow_rs::Result<()> {
        Ok(())
    }
}

/// Registry with the test kernels plus the built-ins.
pub fn test_registry(
    passes: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<serde_json::Value>>>,
) -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    registry.register("CountingSource", move |_, _| {
        Ok(Box::new(CountingSource {
            passes: Arc::clone(&passes),
        }))
    });
    registry.register("FailingSource", |_, _| Ok(Box::new(FailingSource)));
    registry.register("CollectingSink", move |_, _| {
        Ok(Box::new(CollectingSink {
            seen: Arc::clone(&seen),
        }))
    });
    registry.register("FrameOnlySink", |_, _| Ok(Box::new(FrameOnlySink)));
    registry.register("Relay", |_, _| Ok(Box::new(Relay)));
    registry
}

/// Config tuned for fast test turnaround.
pub fn quick_config(frame_dir: &std::path::Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.wake_interval_ms = 5;
    config.dependency_timeout_ms = 1_000;
    config.frame_interval_ms = 1;
    config.frame_dir = frame_dir.to_path_buf();
    config
}

/// Collect state transitions for `node` until `target` shows up or the
/// timeout passes. Returns everything observed for that node.
pub fn states_until(
    events: &Receiver<Event>,
    node: &NodeName,
    target: NodeState,
    timeout: Duration,
) -> Vec<NodeState> {
    let deadline = Instant::now() + timeout;
    let mut states = Vec::new();
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(Event::StateChanged { node_name, state }) if &node_name == node => {
                states.push(state);
                if state == target {
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    states
}

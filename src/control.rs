//! Control Manager: owns the node graph and serializes every mutation.
//!
//! A single blocking loop consumes requests from the bus in order. Node
//! execution itself happens on the per-node threads; the manager only
//! creates, wires, triggers, and tears down. Structural errors (unknown
//! node, unknown port, duplicate name, cycle) are logged and the request is
//! dropped; the loop never dies on a bad request.

use crate::bus::{ControlEndpoint, Event, NodeParams, Request};
use crate::config::RuntimeConfig;
use crate::error::{FlowError, Result};
use crate::graph::{self, NodeHandle, NodeRegistry};
use crate::types::NodeName;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

struct ManagedNode {
    handle: Arc<NodeHandle>,
    thread: JoinHandle<()>,
}

pub struct ControlManager {
    endpoint: ControlEndpoint,
    registry: NodeRegistry,
    config: RuntimeConfig,
    nodes: HashMap<NodeName, ManagedNode>,
}

impl ControlManager {
    pub fn new(endpoint: ControlEndpoint, registry: NodeRegistry, config: RuntimeConfig) -> Self {
        Self {
            endpoint,
            registry,
            config,
            nodes: HashMap::new(),
        }
    }

    /// Run the manager on its own thread.
    pub fn spawn(
        endpoint: ControlEndpoint,
        registry: NodeRegistry,
        config: RuntimeConfig,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("control-manager".to_string())
            .spawn(move || Self::new(endpoint, registry, config).run())
    }

    /// Consume requests until `Shutdown` arrives or the request queue
    /// closes, then stop and join every node thread.
    pub fn run(mut self) {
        info!(types = ?self.registry.type_names(), "control manager started");
        while let Ok(request) = self.endpoint.requests.recv() {
            let is_shutdown = matches!(request, Request::Shutdown);
            if let Err(e) = self.handle_request(request) {
                warn!(error = %e, "request dropped");
            }
            if is_shutdown {
                break;
            }
        }
        self.teardown();
    }

    fn handle_request(&mut self, request: Request) -> Result<()> {
        match request {
            Request::CreateNode {
                type_name,
                node_name,
                loop_node,
                params,
            } => self.create_node(&type_name, node_name, loop_node, params),
            Request::DeleteNode { node_name } => self.delete_node(&node_name),
            Request::UpdateParams { node_name, params } => {
                self.node(&node_name)?.queue_params(params);
                Ok(())
            }
            Request::RunNode { node_name } => {
                debug!(node = %node_name, "run requested");
                self.node(&node_name)?.start.set();
                Ok(())
            }
            Request::PauseNode { node_name } => {
                debug!(node = %node_name, "pause requested");
                self.node(&node_name)?.start.clear();
                Ok(())
            }
            Request::ConnectPorts {
                from_node,
                output,
                to_node,
                input,
            } => {
                let from = Arc::clone(self.node(&from_node)?);
                let to = Arc::clone(self.node(&to_node)?);
                graph::connect_ports(&from, &output, &to, &input)?;
                debug!(%from_node, %output, %to_node, %input, "ports connected");
                Ok(())
            }
            Request::DisconnectPorts { node_name, input } => {
                let node = Arc::clone(self.node(&node_name)?);
                graph::disconnect_input(&node, &input)?;
                debug!(node = %node_name, %input, "port disconnected");
                Ok(())
            }
            Request::Shutdown => Ok(()),
        }
    }

    fn create_node(
        &mut self,
        type_name: &str,
        node_name: NodeName,
        loop_node: bool,
        params: NodeParams,
    ) -> Result<()> {
        if self.nodes.contains_key(&node_name) {
            return Err(FlowError::DuplicateNode(node_name));
        }
        let mut kernel = self.registry.create(type_name, &node_name, &self.config)?;

        let handle = NodeHandle::new(node_name.clone(), type_name, loop_node);
        {
            // Ports are registered before the thread exists, so a connect
            // request arriving right after creation always sees them.
            let mut ports = handle.ports.lock();
            let mut registrar = graph::PortRegistrar::new(&mut ports);
            kernel.register_ports(&mut registrar);
        }
        if !params.is_empty() {
            handle.queue_params(params);
        }

        let thread = graph::runner::spawn(
            Arc::clone(&handle),
            kernel,
            self.endpoint.events.clone(),
            self.config.clone(),
        )?;
        info!(node = %node_name, %type_name, loop_node, "node created");
        self.nodes.insert(node_name, ManagedNode { handle, thread });
        Ok(())
    }

    fn delete_node(&mut self, node_name: &NodeName) -> Result<()> {
        let managed = self
            .nodes
            .remove(node_name)
            .ok_or_else(|| FlowError::NodeNotFound(node_name.clone()))?;
        managed.handle.request_stop();
        if managed.thread.join().is_err() {
            warn!(node = %node_name, "node thread panicked");
        }
        // Neighbours hold weak links; their next pass sees the port as
        // disconnected.
        info!(node = %node_name, "node deleted");
        Ok(())
    }

    fn node(&self, name: &NodeName) -> Result<&Arc<NodeHandle>> {
        self.nodes
            .get(name)
            .map(|m| &m.handle)
            .ok_or_else(|| FlowError::NodeNotFound(name.clone()))
    }

    fn teardown(&mut self) {
        info!(nodes = self.nodes.len(), "control manager shutting down");
        for managed in self.nodes.values() {
            managed.handle.request_stop();
        }
        for (name, managed) in self.nodes.drain() {
            if managed.thread.join().is_err() {
                warn!(node = %name, "node thread panicked during shutdown");
            }
        }
        let _ = self.endpoint.events.send(Event::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, PresentationEndpoint};
    use crate::types::NodeState;
    use std::time::Duration;

    fn start_manager() -> (PresentationEndpoint, JoinHandle<()>) {
        let (control, presentation) = bus::channels();
        let mut config = RuntimeConfig::default();
        config.wake_interval_ms = 5;
        let join = ControlManager::spawn(control, NodeRegistry::with_builtins(), config).unwrap();
        (presentation, join)
    }

    fn recv_states(presentation: &PresentationEndpoint, until: NodeState) -> Vec<NodeState> {
        let mut states = Vec::new();
        while let Ok(event) = presentation.events.recv_timeout(Duration::from_secs(2)) {
            if let Event::StateChanged { state, .. } = event {
                states.push(state);
                if state == until {
                    break;
                }
            }
        }
        states
    }

    #[test]
    fn test_bad_requests_do_not_kill_the_loop() {
        let (presentation, join) = start_manager();

        presentation
            .requests
            .send(Request::CreateNode {
                type_name: "NoSuchType".to_string(),
                node_name: "ns.NoSuchType.1".into(),
                loop_node: false,
                params: NodeParams::new(),
            })
            .unwrap();
        presentation
            .requests
            .send(Request::RunNode {
                node_name: "ns.Ghost.1".into(),
            })
            .unwrap();

        // The loop is still alive and processes a real create afterwards.
        presentation
            .requests
            .send(Request::CreateNode {
                type_name: "DatasetGenerator".to_string(),
                node_name: "ns.DatasetGenerator.1".into(),
                loop_node: false,
                params: NodeParams::new(),
            })
            .unwrap();
        presentation
            .requests
            .send(Request::RunNode {
                node_name: "ns.DatasetGenerator.1".into(),
            })
            .unwrap();

        let states = recv_states(&presentation, NodeState::MissingCriticalInput);
        assert!(states.contains(&NodeState::MissingCriticalInput));

        presentation.requests.send(Request::Shutdown).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_shutdown_emits_final_event() {
        let (presentation, join) = start_manager();
        presentation.requests.send(Request::Shutdown).unwrap();
        join.join().unwrap();

        let mut saw_shutdown = false;
        while let Ok(event) = presentation.events.try_recv() {
            if matches!(event, Event::Shutdown) {
                saw_shutdown = true;
            }
        }
        assert!(saw_shutdown);
    }

    #[test]
    fn test_delete_then_recreate_same_name() {
        let (presentation, join) = start_manager();
        let name: NodeName = "ns.DatasetGenerator.x".into();

        for _ in 0..2 {
            presentation
                .requests
                .send(Request::CreateNode {
                    type_name: "DatasetGenerator".to_string(),
                    node_name: name.clone(),
                    loop_node: false,
                    params: NodeParams::new(),
                })
                .unwrap();
            presentation
                .requests
                .send(Request::DeleteNode {
                    node_name: name.clone(),
                })
                .unwrap();
        }

        presentation.requests.send(Request::Shutdown).unwrap();
        join.join().unwrap();
    }
}

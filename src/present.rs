//! Presentation Manager: the graph's observer-side mirror.
//!
//! Holds no graph logic. It publishes requests, folds events into
//! per-node mirrors (state, port states), and manages frame-channel
//! readers: an attach happens lazily on the first params event carrying a
//! frame spec, a re-attach whenever the spec changes, and an empty params
//! event copies the latest frame out of shared memory.

use crate::bus::{Event, NodeParams, PresentationEndpoint, Request};
use crate::config::RuntimeConfig;
use crate::error::{FlowError, Result};
use crate::frame::{FrameReader, FrameSpec};
use crate::types::{ConnectionState, NodeName, NodeState};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Last known observer-side view of one node.
#[derive(Default)]
pub struct NodeMirror {
    state: Option<NodeState>,
    port_states: HashMap<String, ConnectionState>,
    reader: Option<FrameReader>,
    latest_frame: Option<Vec<u8>>,
}

impl NodeMirror {
    pub fn state(&self) -> Option<NodeState> {
        self.state
    }

    pub fn port_state(&self, port: &str) -> Option<ConnectionState> {
        self.port_states.get(port).copied()
    }

    /// Copy of the most recently observed frame, if any.
    pub fn latest_frame(&self) -> Option<&[u8]> {
        self.latest_frame.as_deref()
    }

    pub fn frame_spec(&self) -> Option<&FrameSpec> {
        self.reader.as_ref().map(|r| r.spec())
    }
}

pub struct PresentationManager {
    endpoint: PresentationEndpoint,
    config: RuntimeConfig,
    mirrors: HashMap<NodeName, NodeMirror>,
}

impl PresentationManager {
    pub fn new(endpoint: PresentationEndpoint, config: RuntimeConfig) -> Self {
        Self {
            endpoint,
            config,
            mirrors: HashMap::new(),
        }
    }

    /// Create a node under a freshly generated name and return it.
    pub fn create_node(
        &self,
        type_name: &str,
        loop_node: bool,
        params: NodeParams,
    ) -> Result<NodeName> {
        let node_name = NodeName::generate(&self.config.namespace, type_name);
        self.send(Request::CreateNode {
            type_name: type_name.to_string(),
            node_name: node_name.clone(),
            loop_node,
            params,
        })?;
        Ok(node_name)
    }

    pub fn delete_node(&self, node_name: &NodeName) -> Result<()> {
        self.send(Request::DeleteNode {
            node_name: node_name.clone(),
        })
    }

    pub fn update_params(&self, node_name: &NodeName, params: NodeParams) -> Result<()> {
        self.send(Request::UpdateParams {
            node_name: node_name.clone(),
            params,
        })
    }

    pub fn run_node(&self, node_name: &NodeName) -> Result<()> {
        self.send(Request::RunNode {
            node_name: node_name.clone(),
        })
    }

    pub fn pause_node(&self, node_name: &NodeName) -> Result<()> {
        self.send(Request::PauseNode {
            node_name: node_name.clone(),
        })
    }

    pub fn connect_ports(
        &self,
        from_node: &NodeName,
        output: &str,
        to_node: &NodeName,
        input: &str,
    ) -> Result<()> {
        self.send(Request::ConnectPorts {
            from_node: from_node.clone(),
            output: output.to_string(),
            to_node: to_node.clone(),
            input: input.to_string(),
        })
    }

    pub fn disconnect_ports(&self, node_name: &NodeName, input: &str) -> Result<()> {
        self.send(Request::DisconnectPorts {
            node_name: node_name.clone(),
            input: input.to_string(),
        })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Request::Shutdown)
    }

    fn send(&self, request: Request) -> Result<()> {
        self.endpoint
            .requests
            .send(request)
            .map_err(|_| FlowError::Channel("control side is gone".to_string()))
    }

    pub fn mirror(&self, node_name: &NodeName) -> Option<&NodeMirror> {
        self.mirrors.get(node_name)
    }

    /// Drain every already-queued event without blocking. Returns false
    /// once the control side has shut down.
    pub fn pump(&mut self) -> bool {
        while let Ok(event) = self.endpoint.events.try_recv() {
            if !self.apply(event) {
                return false;
            }
        }
        true
    }

    /// Block on the event queue until the control side shuts down.
    pub fn run(&mut self) {
        while let Ok(event) = self.endpoint.events.recv() {
            if !self.apply(event) {
                break;
            }
        }
    }

    fn apply(&mut self, event: Event) -> bool {
        match event {
            Event::StateChanged { node_name, state } => {
                debug!(node = %node_name, %state, "state changed");
                self.mirrors.entry(node_name).or_default().state = Some(state);
            }
            Event::PortStateChanged {
                node_name,
                port,
                state,
            } => {
                self.mirrors
                    .entry(node_name)
                    .or_default()
                    .port_states
                    .insert(port, state);
            }
            Event::ParamsChanged { node_name, params } => {
                self.apply_params(node_name, params);
            }
            Event::Shutdown => return false,
        }
        true
    }

    fn apply_params(&mut self, node_name: NodeName, params: NodeParams) {
        let mirror = self.mirrors.entry(node_name.clone()).or_default();

        if let Some(frame_value) = params.get("frame") {
            match serde_json::from_value::<FrameSpec>(frame_value.clone()) {
                Ok(spec) => {
                    let changed = mirror.reader.as_ref().map(|r| r.spec()) != Some(&spec);
                    if changed {
                        match FrameReader::attach(&self.config.frame_dir, spec) {
                            Ok(reader) => {
                                debug!(node = %node_name, "attached to frame channel");
                                mirror.reader = Some(reader);
                                mirror.latest_frame = None;
                            }
                            Err(e) => {
                                warn!(node = %node_name, error = %e, "frame channel attach failed")
                            }
                        }
                    }
                }
                Err(e) => warn!(node = %node_name, error = %e, "malformed frame spec"),
            }
        } else if params.is_empty() {
            // Frame-ready notification.
            if let Some(reader) = &mirror.reader {
                mirror.latest_frame = Some(reader.read_frame());
            }
        }
    }
}

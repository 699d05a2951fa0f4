//! Ports and the connection model.
//!
//! Each node owns a port table behind a mutex on its shared handle. Links
//! between ports are weak references in both directions: an input holds a
//! weak link to its producing node, an output holds weak links to all its
//! consumers. A link whose upgrade fails is treated as disconnected, so a
//! deleted node degrades its neighbours instead of crashing them.

use crate::frame::FrameSpec;
use crate::types::{ConnectionState, DataKind};
use std::sync::Weak;

use super::node::NodeHandle;

/// Data sitting on an output port after a successful pass.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Structured data, passed by value.
    Value(serde_json::Value),
    /// A frame channel descriptor; the pixels live in shared memory.
    Frame(FrameSpec),
}

/// Weak link from an input to the producing node's output port.
#[derive(Clone)]
pub struct OutputLink {
    pub node: Weak<NodeHandle>,
    pub port: usize,
}

/// Weak link from an output to a consuming node's input port.
#[derive(Clone)]
pub struct InputLink {
    pub node: Weak<NodeHandle>,
    pub port: usize,
}

pub struct InputPort {
    pub name: String,
    pub critical: bool,
    pub accepts: Vec<DataKind>,
    pub link: Option<OutputLink>,
    /// Last computed connection state; recomputed every pass.
    pub connection_state: ConnectionState,
}

pub struct OutputPort {
    pub name: String,
    pub produces: Vec<DataKind>,
    pub payload: Option<Payload>,
    pub consumers: Vec<InputLink>,
}

/// All ports of a node, in registration order. Registration order is
/// significant: missing-input checks and dependency awaits walk inputs in
/// the order the kernel declared them.
#[derive(Default)]
pub struct PortTable {
    pub inputs: Vec<InputPort>,
    pub outputs: Vec<OutputPort>,
}

impl PortTable {
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }
}

/// Restricted view of a [`PortTable`] handed to kernels at creation time.
pub struct PortRegistrar<'a> {
    table: &'a mut PortTable,
}

impl<'a> PortRegistrar<'a> {
    pub fn new(table: &'a mut PortTable) -> Self {
        Self { table }
    }

    pub fn add_input(&mut self, name: &str, accepts: &[DataKind], critical: bool) {
        self.table.inputs.push(InputPort {
            name: name.to_string(),
            critical,
            accepts: accepts.to_vec(),
            link: None,
            connection_state: ConnectionState::Disconnected,
        });
    }

    pub fn add_output(&mut self, name: &str, produces: &[DataKind]) {
        self.table.outputs.push(OutputPort {
            name: name.to_string(),
            produces: produces.to_vec(),
            payload: None,
            consumers: Vec::new(),
        });
    }
}

/// True when a producing kind set and an accepting kind set intersect.
pub fn kinds_compatible(produces: &[DataKind], accepts: &[DataKind]) -> bool {
    produces.iter().any(|k| accepts.contains(k))
}

/// Classify an input given the kind set of the output it is wired to, or
/// `None` when the link is absent or its target is gone.
pub fn check_connection(
    accepts: &[DataKind],
    upstream_produces: Option<&[DataKind]>,
) -> ConnectionState {
    match upstream_produces {
        None => ConnectionState::Disconnected,
        Some(produces) if kinds_compatible(produces, accepts) => ConnectionState::ConnectedOk,
        Some(_) => ConnectionState::Incompatible,
    }
}

//! The node graph: handles, ports, kernels, the per-node execution thread,
//! and the type registry.

pub mod node;
pub mod nodes;
pub mod port;
pub mod registry;
pub mod runner;

pub use node::{KernelContext, Latch, NodeHandle, NodeKernel};
pub use port::{InputLink, OutputLink, Payload, PortRegistrar, PortTable};
pub use registry::NodeRegistry;

use crate::error::{FlowError, Result};
use std::sync::Arc;

/// Wire `from`'s output port to `to`'s input port.
///
/// Both port names are resolved eagerly, but kind compatibility is not
/// checked here; incompatible edges are allowed to exist and surface as an
/// incompatible connection state when `to` next runs. Edges that would
/// close a dependency cycle are rejected outright, since a cycle would
/// deadlock the pull protocol.
pub fn connect_ports(
    from: &Arc<NodeHandle>,
    output: &str,
    to: &Arc<NodeHandle>,
    input: &str,
) -> Result<()> {
    if would_create_cycle(from, to) {
        return Err(FlowError::CycleDetected {
            from: from.name.clone(),
            to: to.name.clone(),
        });
    }
    let out_idx = from
        .ports
        .lock()
        .output_index(output)
        .ok_or_else(|| FlowError::PortNotFound {
            node: from.name.clone(),
            port: output.to_string(),
        })?;
    let in_idx = to
        .ports
        .lock()
        .input_index(input)
        .ok_or_else(|| FlowError::PortNotFound {
            node: to.name.clone(),
            port: input.to_string(),
        })?;

    // An input holds at most one link; rewiring replaces the old edge.
    disconnect_input(to, input)?;

    from.ports.lock().outputs[out_idx].consumers.push(InputLink {
        node: Arc::downgrade(to),
        port: in_idx,
    });
    to.ports.lock().inputs[in_idx].link = Some(OutputLink {
        node: Arc::downgrade(from),
        port: out_idx,
    });
    Ok(())
}

/// Detach the named input from whatever output feeds it. A no-op when the
/// input is already unlinked.
pub fn disconnect_input(node: &Arc<NodeHandle>, input: &str) -> Result<()> {
    let link = {
        let mut ports = node.ports.lock();
        let in_idx = ports
            .input_index(input)
            .ok_or_else(|| FlowError::PortNotFound {
                node: node.name.clone(),
                port: input.to_string(),
            })?;
        ports.inputs[in_idx].link.take().map(|l| (l, in_idx))
    };
    if let Some((link, in_idx)) = link {
        if let Some(up) = link.node.upgrade() {
            if let Some(output) = up.ports.lock().outputs.get_mut(link.port) {
                output.consumers.retain(|c| {
                    !(c.port == in_idx
                        && c.node.upgrade().is_some_and(|n| Arc::ptr_eq(&n, node)))
                });
            }
        }
    }
    Ok(())
}

/// Would adding the edge `from -> to` close a cycle? True iff `from` is
/// already reachable from `to` along consumer edges (including `from == to`).
pub fn would_create_cycle(from: &Arc<NodeHandle>, to: &Arc<NodeHandle>) -> bool {
    let mut stack = vec![Arc::clone(to)];
    let mut visited: Vec<Arc<NodeHandle>> = Vec::new();
    while let Some(current) = stack.pop() {
        if Arc::ptr_eq(&current, from) {
            return true;
        }
        if visited.iter().any(|n| Arc::ptr_eq(n, &current)) {
            continue;
        }
        let downstream: Vec<Arc<NodeHandle>> = {
            let ports = current.ports.lock();
            ports
                .outputs
                .iter()
                .flat_map(|o| o.consumers.iter())
                .filter_map(|c| c.node.upgrade())
                .collect()
        };
        visited.push(current);
        stack.extend(downstream);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataKind;

    fn port_node(name: &str) -> Arc<NodeHandle> {
        let handle = NodeHandle::new(name.into(), "T", false);
        {
            let mut ports = handle.ports.lock();
            let mut reg = PortRegistrar::new(&mut ports);
            reg.add_input("In", &[DataKind::Value], true);
            reg.add_output("Out", &[DataKind::Value]);
        }
        handle
    }

    #[test]
    fn test_connect_links_both_directions() {
        let a = port_node("ns.T.a");
        let b = port_node("ns.T.b");
        connect_ports(&a, "Out", &b, "In").unwrap();

        assert_eq!(a.ports.lock().outputs[0].consumers.len(), 1);
        let link = b.ports.lock().inputs[0].link.clone().unwrap();
        assert!(Arc::ptr_eq(&link.node.upgrade().unwrap(), &a));
    }

    #[test]
    fn test_rewire_replaces_old_edge() {
        let a = port_node("ns.T.a");
        let b = port_node("ns.T.b");
        let c = port_node("ns.T.c");
        connect_ports(&a, "Out", &c, "In").unwrap();
        connect_ports(&b, "Out", &c, "In").unwrap();

        assert!(a.ports.lock().outputs[0].consumers.is_empty());
        assert_eq!(b.ports.lock().outputs[0].consumers.len(), 1);
    }

    #[test]
    fn test_disconnect_removes_consumer_entry() {
        let a = port_node("ns.T.a");
        let b = port_node("ns.T.b");
        connect_ports(&a, "Out", &b, "In").unwrap();
        disconnect_input(&b, "In").unwrap();

        assert!(a.ports.lock().outputs[0].consumers.is_empty());
        assert!(b.ports.lock().inputs[0].link.is_none());
    }

    #[test]
    fn test_cycle_rejected() {
        let a = port_node("ns.T.a");
        let b = port_node("ns.T.b");
        let c = port_node("ns.T.c");
        connect_ports(&a, "Out", &b, "In").unwrap();
        connect_ports(&b, "Out", &c, "In").unwrap();

        let err = connect_ports(&c, "Out", &a, "In").unwrap_err();
        assert!(matches!(err, FlowError::CycleDetected { .. }));
        assert!(a.ports.lock().inputs[0].link.is_none());
    }

    #[test]
    fn test_self_edge_rejected() {
        let a = port_node("ns.T.a");
        assert!(matches!(
            connect_ports(&a, "Out", &a, "In"),
            Err(FlowError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let a = port_node("ns.T.a");
        let b = port_node("ns.T.b");
        assert!(matches!(
            connect_ports(&a, "Missing", &b, "In"),
            Err(FlowError::PortNotFound { .. })
        ));
    }
}

//! Message bus between the control and presentation managers.
//!
//! Two unbounded, ordered, multi-producer/single-consumer queues: requests
//! flow toward the Control Manager, events flow back toward the Presentation
//! Manager. Delivery is in send order per queue; nothing is guaranteed
//! across queues. `Shutdown` is the sentinel each manager loop consumes to
//! terminate, and must be the last message enqueued on its queue.
//!
//! Messages are immutable value objects; ownership transfers to the queue on
//! send. The enums derive serde with a `kind` tag so the logical wire
//! contract is explicit even though delivery here is in-process.

use crate::types::{ConnectionState, NodeName, NodeState};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Free-form node parameters, keyed by name.
///
/// Carries media paths and decoder settings. Inside `ParamsChanged` events
/// it also carries the serialized frame-channel triple under `"frame"`.
pub type NodeParams = serde_json::Map<String, serde_json::Value>;

/// Requests sent from the presentation side to the Control Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Request {
    /// Instantiate a registered node type under the given name.
    CreateNode {
        type_name: String,
        node_name: NodeName,
        /// Continuous (loop) execution instead of one-shot.
        loop_node: bool,
        params: NodeParams,
    },
    /// Stop and remove a node, releasing any owned frame channel.
    DeleteNode { node_name: NodeName },
    /// Forward new parameters to a node's kernel.
    UpdateParams {
        node_name: NodeName,
        params: NodeParams,
    },
    /// Set a node's start trigger (for loop nodes: start/keep running).
    RunNode { node_name: NodeName },
    /// Clear a node's start trigger, pausing a loop node.
    PauseNode { node_name: NodeName },
    /// Wire an output port to an input port. Compatibility is not checked
    /// here; mismatches surface as connection states at execution time.
    ConnectPorts {
        from_node: NodeName,
        output: String,
        to_node: NodeName,
        input: String,
    },
    /// Detach an input port from whatever output it is wired to.
    DisconnectPorts { node_name: NodeName, input: String },
    /// Terminate the Control Manager loop. Must be the last request sent.
    Shutdown,
}

/// Events published by the Control Manager for the presentation side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    /// A node's execution state changed.
    StateChanged {
        node_name: NodeName,
        state: NodeState,
    },
    /// An input port's connection state changed.
    PortStateChanged {
        node_name: NodeName,
        port: String,
        state: ConnectionState,
    },
    /// Node parameters changed. A `"frame"` entry carries the frame-channel
    /// triple; empty params are the frame-ready repaint notification.
    ParamsChanged {
        node_name: NodeName,
        params: NodeParams,
    },
    /// The control side is shutting down. Last event on the queue.
    Shutdown,
}

/// Control-side endpoint: consumes requests, publishes events.
pub struct ControlEndpoint {
    pub requests: Receiver<Request>,
    pub events: Sender<Event>,
}

/// Presentation-side endpoint: publishes requests, consumes events.
pub struct PresentationEndpoint {
    pub requests: Sender<Request>,
    pub events: Receiver<Event>,
}

/// Create the two queues and hand each side its endpoint.
pub fn channels() -> (ControlEndpoint, PresentationEndpoint) {
    let (req_tx, req_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        ControlEndpoint {
            requests: req_rx,
            events: event_tx,
        },
        PresentationEndpoint {
            requests: req_tx,
            events: event_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_send_order() {
        let (control, presentation) = channels();

        presentation
            .requests
            .send(Request::RunNode {
                node_name: "ns.A.1".into(),
            })
            .unwrap();
        presentation.requests.send(Request::Shutdown).unwrap();

        assert!(matches!(
            control.requests.recv().unwrap(),
            Request::RunNode { .. }
        ));
        assert!(matches!(control.requests.recv().unwrap(), Request::Shutdown));
    }

    #[test]
    fn test_event_wire_tagging() {
        let event = Event::StateChanged {
            node_name: "ns.A.1".into(),
            state: NodeState::Running,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "StateChanged");
        assert_eq!(json["state"], "Running");

        let back: Event = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Event::StateChanged { state, .. } if state == NodeState::Running));
    }

    #[test]
    fn test_request_wire_tagging() {
        let req = Request::CreateNode {
            type_name: "MediaPlayer".to_string(),
            node_name: "ns.MediaPlayer.1".into(),
            loop_node: true,
            params: NodeParams::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "CreateNode");
        assert_eq!(json["loop_node"], true);
    }
}

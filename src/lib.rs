//! MediaFlow: a node-graph dataflow runtime for media pipelines.
//!
//! The runtime is split into two halves joined by a message bus. The
//! control side owns the graph: every node runs on its own thread and run
//! requests propagate upstream through a synchronous pull protocol, so
//! triggering a sink executes exactly the subgraph it depends on. The
//! presentation side mirrors node and port state from events and attaches
//! to shared-memory frame channels by name, keeping bulk pixel data off
//! the bus entirely.
//!
//! Typical setup:
//!
//! ```no_run
//! use mediaflow_rs::{bus, ControlManager, NodeRegistry, PresentationManager, RuntimeConfig};
//!
//! let config = RuntimeConfig::default();
//! let (control, presentation) = bus::channels();
//! let manager = ControlManager::spawn(control, NodeRegistry::with_builtins(), config.clone())
//!     .expect("spawn control manager");
//! let ui = PresentationManager::new(presentation, config);
//!
//! let player = ui.create_node("MediaPlayer", true, Default::default()).unwrap();
//! ui.run_node(&player).unwrap();
//! // ... pump events, read frames ...
//! ui.shutdown().unwrap();
//! manager.join().unwrap();
//! ```

pub mod bus;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod graph;
pub mod present;
pub mod types;

pub use bus::{Event, NodeParams, Request};
pub use config::RuntimeConfig;
pub use control::ControlManager;
pub use error::{FlowError, Result};
pub use frame::{FrameChannel, FrameReader, FrameShape, FrameSpec};
pub use graph::{NodeKernel, NodeRegistry};
pub use present::{NodeMirror, PresentationManager};
pub use types::{ConnectionState, DataKind, Dtype, NodeName, NodeState};

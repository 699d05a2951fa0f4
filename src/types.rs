//! Core types shared across the runtime: data kinds, node and connection
//! states, frame element types, and node identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of payload a port produces or accepts.
///
/// Connection compatibility is the intersection of the producing and
/// accepting kind sets; an empty intersection means
/// [`ConnectionState::Incompatible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// A video frame delivered through the shared-memory frame channel.
    Frame,
    /// A single image reference.
    Image,
    /// A group of related images.
    ImageGroup,
    /// An assembled dataset.
    Dataset,
    /// Any structured value (JSON).
    Value,
}

/// Element type of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    U8,
    U16,
    F32,
}

impl Dtype {
    /// Size of one element in bytes.
    pub fn itemsize(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::U16 => 2,
            Dtype::F32 => 4,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::U8 => write!(f, "u8"),
            Dtype::U16 => write!(f, "u16"),
            Dtype::F32 => write!(f, "f32"),
        }
    }
}

/// Execution state of a node.
///
/// Stored as an `AtomicU8` on the shared node handle so dependent node
/// threads can read it without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeState {
    Idle = 0,
    Waiting = 1,
    Running = 2,
    MissingCriticalInput = 3,
    CriticalInputError = 4,
    InternalError = 5,
}

impl NodeState {
    /// Decode a state previously stored with `as u8`.
    pub fn from_u8(raw: u8) -> NodeState {
        match raw {
            0 => NodeState::Idle,
            1 => NodeState::Waiting,
            2 => NodeState::Running,
            3 => NodeState::MissingCriticalInput,
            4 => NodeState::CriticalInputError,
            _ => NodeState::InternalError,
        }
    }

    /// True for the three error states.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            NodeState::MissingCriticalInput
                | NodeState::CriticalInputError
                | NodeState::InternalError
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Idle => "idle",
            NodeState::Waiting => "waiting",
            NodeState::Running => "running",
            NodeState::MissingCriticalInput => "missing-critical-input",
            NodeState::CriticalInputError => "critical-input-error",
            NodeState::InternalError => "internal-error",
        };
        write!(f, "{s}")
    }
}

/// Validity of the link between an input and the output it is wired to.
///
/// Recomputed at the start of every execution pass, never cached across
/// graph edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No output attached.
    Disconnected,
    /// Attached, but the kind sets do not intersect.
    Incompatible,
    /// Attached and compatible.
    ConnectedOk,
}

/// Process-unique node name, immutable after creation.
///
/// Format: `<namespace>.<TypeName>.<uuid>`. The name doubles as the
/// frame-channel lookup key; there is no separate channel registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Generate a fresh name under `namespace` for the given node type.
    pub fn generate(namespace: &str, type_name: &str) -> Self {
        NodeName(format!("{namespace}.{type_name}.{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        NodeName(s.to_string())
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        NodeName(s)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_state_round_trip() {
        for state in [
            NodeState::Idle,
            NodeState::Waiting,
            NodeState::Running,
            NodeState::MissingCriticalInput,
            NodeState::CriticalInputError,
            NodeState::InternalError,
        ] {
            assert_eq!(NodeState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_error_states() {
        assert!(!NodeState::Idle.is_error());
        assert!(!NodeState::Running.is_error());
        assert!(NodeState::InternalError.is_error());
        assert!(NodeState::MissingCriticalInput.is_error());
    }

    #[test]
    fn test_node_name_format() {
        let name = NodeName::generate("com.mediaflow", "MediaPlayer");
        let parts: Vec<&str> = name.as_str().splitn(4, '.').collect();
        assert_eq!(parts[0], "com");
        assert_eq!(parts[1], "mediaflow");
        assert_eq!(parts[2], "MediaPlayer");
        assert!(!parts[3].is_empty());
    }

    #[test]
    fn test_node_names_unique() {
        let a = NodeName::generate("ns", "T");
        let b = NodeName::generate("ns", "T");
        assert_ne!(a, b);
    }

    #[test]
    fn test_dtype_itemsize() {
        assert_eq!(Dtype::U8.itemsize(), 1);
        assert_eq!(Dtype::U16.itemsize(), 2);
        assert_eq!(Dtype::F32.itemsize(), 4);
    }
}

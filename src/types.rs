//! Shared identity types and ring-wide constants.
//!
//! These mirror the fixed-width types the original C implementation used
//! (`NodeID`/`NodeIndex` as `signed char`, fixed string buffers for IPs and
//! ports) so that the sentinel values and size bounds line up with the wire
//! protocol and the size of the routing tables.

use std::fmt;

/// Maximum number of nodes the ring can hold at once.
pub const MAX_NODES: usize = 16;
/// Largest node ID the protocol can carry.
pub const MAX_NODE_ID: i16 = 99;
/// Sentinel meaning "no node" / "unknown".
pub const NO_NODE_ID: i16 = -1;

pub const MAX_RECIPIENTS: usize = MAX_NODES - 1;
pub const MAX_NEIGHBORS: usize = MAX_NODES - 1;

pub const MAX_INBOUND_CHORDS: usize = MAX_NODES - 2;
/// Connection registry capacity: predecessor, successor, outbound chord,
/// new-node-in-progress, plus one slot per possible inbound chord.
pub const MAX_CONNECTIONS: usize = MAX_INBOUND_CHORDS + 4;

/// Every line on the wire, in either direction, is capped at this length.
pub const MAX_NODE_MESSAGE_SIZE: usize = 256;
/// Cap on a single line of user input read from stdin.
pub const USER_COMMAND_BUF_SIZE: usize = 256;

/// A node identifier in `[0, MAX_NODE_ID]`, or the sentinel `NO_NODE_ID`.
///
/// Kept as a thin newtype (rather than `u8`) so the `-1` sentinel the wire
/// protocol and routing tables rely on round-trips cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub i16);

impl NodeId {
    pub const NONE: NodeId = NodeId(NO_NODE_ID);

    pub fn is_none(self) -> bool {
        self.0 == NO_NODE_ID
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Parses a node ID from a decimal string, rejecting anything outside
    /// `[0, MAX_NODE_ID]` (the sentinel is never valid wire input).
    pub fn parse(s: &str) -> Option<NodeId> {
        let v: i16 = s.trim().parse().ok()?;
        if v < 0 || v > MAX_NODE_ID {
            None
        } else {
            Some(NodeId(v))
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::NONE
    }
}

/// A node's externally-visible identity: its ring ID plus the address at
/// which its TCP listener can be reached.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub id: NodeId,
    pub ip: String,
    pub port: String,
}

impl Node {
    pub fn new(id: NodeId, ip: impl Into<String>, port: impl Into<String>) -> Self {
        Node {
            id,
            ip: ip.into(),
            port: port.into(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_parse_rejects_out_of_range() {
        assert!(NodeId::parse("-1").is_none());
        assert!(NodeId::parse("100").is_none());
        assert!(NodeId::parse("abc").is_none());
    }

    #[test]
    fn node_id_parse_accepts_bounds() {
        assert_eq!(NodeId::parse("0"), Some(NodeId(0)));
        assert_eq!(NodeId::parse("99"), Some(NodeId(99)));
    }

    #[test]
    fn node_id_none_round_trips() {
        assert!(NodeId::NONE.is_none());
        assert!(!NodeId::NONE.is_some());
        assert!(NodeId(5).is_some());
    }
}

//! The directory server client: a UDP control channel used to discover
//! and announce ring membership, distinct from the TCP ring/chord links
//! themselves.
//!
//! Ported from `original_source/node-server.c`. `NODES`/`REG`/`UNREG` are
//! sent out; `NODESLIST`/`OKREG`/`OKUNREG` come back. The original used a
//! blocking 1-second `select()` specifically for the `NODES` round trip;
//! here that's modeled as a one-shot timer the event loop owns (see
//! `timer.rs`), since the whole program shares one non-blocking reactor.

use std::io;
use std::net::ToSocketAddrs;

use log::{trace, warn};
use mio::net::UdpSocket;

use crate::error::{NodeError, Result};
use crate::types::{Node, NodeId, MAX_NODES};

/// Why a `NODES` request was sent, which determines what we do with the
/// resulting list once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeListAction {
    Join,
    Chord,
}

/// The directory's UDP control-channel client.
pub struct DirectoryClient {
    pub socket: UdpSocket,
    remote: std::net::SocketAddr,
}

impl DirectoryClient {
    pub fn new(local_bind: std::net::SocketAddr, directory_addr: &str) -> Result<Self> {
        let remote = directory_addr
            .to_socket_addrs()
            .map_err(|e| NodeError::DirectoryResolve(e.to_string()))?
            .next()
            .ok_or_else(|| NodeError::DirectoryResolve(directory_addr.to_string()))?;
        let socket = UdpSocket::bind(local_bind)?;
        Ok(DirectoryClient { socket, remote })
    }

    fn send(&self, message: &str) -> Result<()> {
        trace!("sending message to directory server: {}", message);
        self.socket.send_to(message.as_bytes(), self.remote)?;
        Ok(())
    }

    pub fn request_node_list(&self, ring_id: &str) -> Result<()> {
        self.send(&format!("NODES {}", ring_id))
    }

    pub fn register(&self, ring_id: &str, self_id: NodeId, node: &Node) -> Result<()> {
        self.send(&format!("REG {} {} {} {}", ring_id, self_id, node.ip, node.port))
    }

    pub fn unregister(&self, ring_id: &str, self_id: NodeId) -> Result<()> {
        self.send(&format!("UNREG {} {}", ring_id, self_id))
    }

    /// Reads one pending datagram, if any.
    pub fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 2048];
        match self.socket.recv(&mut buf) {
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// What happened after parsing a directory datagram.
pub enum DirectoryMessage {
    NodesList(Vec<Node>),
    OkReg,
    OkUnreg,
    Unrecognized(String),
}

/// Parses a response datagram. `NODESLIST` is the only form with a
/// strict, validated layout (mirroring `parse_node_list`'s two sanity
/// checks: a newline exactly after the 13-byte header, and a trailing
/// newline); everything else is just a string-prefix match.
pub fn parse_directory_message(data: &[u8]) -> Result<DirectoryMessage> {
    if data.starts_with(b"NODESLIST ") {
        return parse_node_list(data).map(DirectoryMessage::NodesList);
    }
    let text = String::from_utf8_lossy(data);
    if text.starts_with("OKREG") {
        Ok(DirectoryMessage::OkReg)
    } else if text.starts_with("OKUNREG") {
        Ok(DirectoryMessage::OkUnreg)
    } else {
        Ok(DirectoryMessage::Unrecognized(text.into_owned()))
    }
}

fn parse_node_list(data: &[u8]) -> Result<Vec<Node>> {
    if data.len() < 14 || data[13] != b'\n' {
        return Err(NodeError::Directory("malformed node list header".into()));
    }
    if *data.last().unwrap() != b'\n' {
        return Err(NodeError::Directory("node list doesn't end with a line feed".into()));
    }

    let body = &data[14..];
    let text = String::from_utf8_lossy(body);
    let mut nodes = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let id = parts
            .next()
            .and_then(NodeId::parse)
            .ok_or_else(|| NodeError::Directory("failed to parse node list".into()))?;
        let ip = parts
            .next()
            .ok_or_else(|| NodeError::Directory("failed to parse node list".into()))?;
        let port = parts
            .next()
            .ok_or_else(|| NodeError::Directory("failed to parse node list".into()))?;
        if nodes.len() >= MAX_NODES {
            warn!("directory returned more nodes than this ring can hold, truncating");
            break;
        }
        nodes.push(Node::new(id, ip, port));
    }
    Ok(nodes)
}

/// Applies chord-mode filtering (spec §4.3): when requesting a chord
/// target, nodes already directly connected (or this node itself) aren't
/// valid choices and are dropped before presenting the list.
pub fn filter_for_chord(nodes: Vec<Node>, self_id: NodeId, already_connected: impl Fn(NodeId) -> bool) -> Vec<Node> {
    nodes
        .into_iter()
        .filter(|n| n.id != self_id && !already_connected(n.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_node_list_rejects_bad_header() {
        let data = b"NODESLISTxY\n10 1.2.3.4 5000\n";
        assert!(parse_directory_message(data).is_err());
    }

    #[test]
    fn parse_node_list_rejects_missing_trailing_newline() {
        let mut data = b"NODESLIST ab\n10 1.2.3.4 5000\n".to_vec();
        data.pop();
        assert!(parse_directory_message(&data).is_err());
    }

    #[test]
    fn parse_node_list_reads_entries() {
        let data = b"NODESLIST ab\n10 1.2.3.4 5000\n11 1.2.3.5 5001\n";
        match parse_directory_message(data).unwrap() {
            DirectoryMessage::NodesList(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert_eq!(nodes[0].id, NodeId(10));
                assert_eq!(nodes[0].ip, "1.2.3.4");
                assert_eq!(nodes[1].port, "5001");
            }
            _ => panic!("expected NodesList"),
        }
    }

    #[test]
    fn parse_node_list_allows_empty_list() {
        let data = b"NODESLIST ab\n";
        match parse_directory_message(data).unwrap() {
            DirectoryMessage::NodesList(nodes) => assert!(nodes.is_empty()),
            _ => panic!("expected NodesList"),
        }
    }

    #[test]
    fn chord_mode_filters_self_and_connected() {
        let nodes = vec![Node::new(NodeId(1), "a", "1"), Node::new(NodeId(2), "b", "2"), Node::new(NodeId(3), "c", "3")];
        let filtered = filter_for_chord(nodes, NodeId(1), |id| id == NodeId(2));
        let ids: Vec<_> = filtered.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId(3)]);
    }

    #[test]
    fn recognizes_okreg_and_okunreg() {
        assert!(matches!(parse_directory_message(b"OKREG").unwrap(), DirectoryMessage::OkReg));
        assert!(matches!(parse_directory_message(b"OKUNREG").unwrap(), DirectoryMessage::OkUnreg));
        assert!(matches!(
            parse_directory_message(b"WHATEVER").unwrap(),
            DirectoryMessage::Unrecognized(_)
        ));
    }
}

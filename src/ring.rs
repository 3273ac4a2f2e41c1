//! The ring membership state machine: join/leave, predecessor/successor
//! bookkeeping, chord creation/removal, and dispatch of inbound messages
//! per the role of the connection they arrived on.
//!
//! Ported from `original_source/ring.c`. The four raw `struct Connection
//! *` globals (`new_node_conn`, `pred_conn`, `succ_conn`,
//! `outbound_chord_conn`) are replaced by role-tagged lookups into the
//! `Registry`, per spec §9.

use std::time::Duration;

use log::{debug, trace, warn};
use mio::net::TcpStream;
use mio::{Interest, Poll, Token};

use crate::connections::{Registry, Role};
use crate::directory::{filter_for_chord, DirectoryClient, NodeListAction};
use crate::protocol::{self, Message};
use crate::routing::RoutingEngine;
use crate::timer::{Timer, TimerPurpose};
use crate::types::{Node, NodeId};

const PRED_TIMEOUT: Duration = Duration::from_millis(1000);
const DIRECTORY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Mirrors `enum ConnectionState` in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    AwaitingNodeList,
    AwaitingUserSelection,
    Connecting,
    Connected,
}

/// Mirrors `enum InputState`: the two-step flow for picking a node ID out
/// of a directory node list after a `join` or `chord` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Command,
    JoinNodeSelection,
    ChordNodeSelection,
}

pub struct Ring {
    pub self_node: Node,
    pub succ: Node,
    pub second_succ: Node,
    pub connection_state: ConnectionState,
    pub input_state: InputState,
    pub awaiting_pred: bool,
    pub awaiting_succ: bool,
    /// `None` means this ring was entered via direct join and isn't
    /// registered with the directory server (`ring_id_str[0] == '\0'`).
    pub ring_id: Option<String>,
    pub registry: Registry,
    pub routing: RoutingEngine,
    pub node_list_action: Option<NodeListAction>,
    pub node_list: Vec<Node>,
    pub timer: Timer,
}

impl Ring {
    pub fn new(self_node: Node) -> Self {
        let routing = RoutingEngine::new(self_node.id);
        Ring {
            self_node,
            succ: Node::default(),
            second_succ: Node::default(),
            connection_state: ConnectionState::Disconnected,
            input_state: InputState::Command,
            awaiting_pred: false,
            awaiting_succ: false,
            ring_id: None,
            registry: Registry::new(),
            routing,
            node_list_action: None,
            node_list: Vec::new(),
            timer: Timer::new(),
        }
    }

    // -- connection helpers --------------------------------------------

    /// Opens a non-blocking TCP connection to `node`, registers it in the
    /// connection table under `role`, and registers the socket for
    /// readiness polling.
    fn connect_to_node(&mut self, poll: &Poll, node: &Node, role: Role) -> std::io::Result<Token> {
        let addr = node
            .addr()
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid node address"))?;
        let stream = TcpStream::connect(addr)?;
        let token = self
            .registry
            .add(stream, role, node.ip.clone(), node.port.clone())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "connection registry full"))?;
        let conn = self.registry.get_mut(token).unwrap();
        conn.node_id = node.id;
        poll.registry().register(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE)?;
        Ok(token)
    }

    fn write_to(&mut self, token: Token, line: &str) -> std::io::Result<()> {
        match self.registry.get_mut(token) {
            Some(conn) => conn.write_line(line),
            None => Ok(()),
        }
    }

    fn announce_to_all(&mut self, recipient_id: NodeId) {
        let ann = self.routing.announcement_for(recipient_id);
        let line = protocol::route_line(&ann);
        debug!("announcing new shortest path: {}", line.trim_end());
        for conn in self.registry.iter_mut() {
            if let Err(e) = conn.write_line(&line) {
                warn!("couldn't announce route to node {}: {}", conn.node_id, e);
            }
        }
    }

    fn send_shortest_paths(&mut self, token: Token) -> std::io::Result<()> {
        let announcements = self.routing.full_announcement();
        if let Some(conn) = self.registry.get_mut(token) {
            trace!("sending shortest path table to node {}", conn.node_id);
            for ann in &announcements {
                conn.write_line(&protocol::route_line(ann))?;
            }
        }
        Ok(())
    }

    /// If `node_id` no longer has any direct connection, tells the
    /// routing engine the neighbor is gone and re-announces anything that
    /// changed as a result.
    fn remove_neighbor_connection(&mut self, node_id: NodeId) {
        if node_id.is_none() || self.registry.find_by_node_id(node_id).is_some() {
            return;
        }
        let changed = self.routing.remove_neighbor(node_id);
        for recipient_id in changed {
            self.announce_to_all(recipient_id);
        }
    }

    fn update_routing_and_announce(&mut self, neighbor_id: NodeId, recipient_id: NodeId, path: Option<crate::routing::Path>) {
        if self.routing.update(neighbor_id, recipient_id, path) {
            self.announce_to_all(recipient_id);
        }
    }

    // -- join / leave -----------------------------------------------------

    /// Initiates a join using the already-chosen `succ`. `ring_id` is
    /// `None` for a direct join (no directory registration).
    pub fn join_ring(&mut self, poll: &Poll, ring_id: Option<String>) {
        self.ring_id = ring_id;
        self.routing.reset(self.self_node.id);
        self.connection_state = ConnectionState::Connecting;
        self.awaiting_succ = true;
        self.awaiting_pred = true;

        let succ = self.succ.clone();
        let token = match self.connect_to_node(poll, &succ, Role::Successor) {
            Ok(t) => t,
            Err(e) => {
                println!("Connection error: couldn't connect to the successor: {}", e);
                println!("Join procedure aborted.");
                self.connection_state = ConnectionState::Disconnected;
                return;
            }
        };

        let entry = protocol::entry_line(self.self_node.id, &self.self_node.ip, &self.self_node.port);
        if self.write_to(token, &entry).is_err() || self.send_shortest_paths(token).is_err() {
            return;
        }

        self.timer.set(PRED_TIMEOUT, TimerPurpose::PredecessorConnect);
        debug!("connected to the successor and sent the ENTRY message");
    }

    /// `direct join <self-id> <succ-id> <ip> <port>` where `self-id ==
    /// succ-id` creates a brand-new, single-node ring.
    pub fn direct_join_alone(&mut self) {
        self.ring_id = None;
        self.succ = self.self_node.clone();
        self.second_succ = self.self_node.clone();
        self.connection_state = ConnectionState::Connected;
        self.awaiting_pred = false;
        self.awaiting_succ = false;
        self.routing.reset(self.self_node.id);
        println!("Initialized an empty ring without registering with the directory server.");
    }

    pub fn leave_ring(&mut self, directory: &DirectoryClient) {
        if self.connection_state == ConnectionState::Connected {
            if let Some(ring_id) = self.ring_id.clone() {
                if let Err(e) = directory.unregister(&ring_id, self.self_node.id) {
                    warn!("couldn't unregister from the directory server: {}", e);
                }
            }
        }
        self.registry.close_all();
        self.routing.reset(self.self_node.id);
        self.timer.cancel();
        self.connection_state = ConnectionState::Disconnected;
    }

    fn on_join_end(&mut self, directory: &DirectoryClient) {
        println!("Join successful. We are now in a ring.");
        self.connection_state = ConnectionState::Connected;
        if let Some(ring_id) = self.ring_id.clone() {
            if let Err(e) = directory.register(&ring_id, self.self_node.id, &self.self_node) {
                warn!("couldn't register with the directory server: {}", e);
            }
        }
    }

    pub fn create_outbound_chord(&mut self, poll: &Poll, node: &Node) {
        if self.registry.find_by_node_id(node.id).is_some() {
            println!("We are already connected to node {}. No chord was created.", node.id);
        }
        debug!("establishing a chord with node {} at {}:{}", node.id, node.ip, node.port);
        let token = match self.connect_to_node(poll, node, Role::OutboundChord) {
            Ok(t) => t,
            Err(e) => {
                println!("Couldn't connect to the node: {}", e);
                println!("Chord connection procedure aborted.");
                return;
            }
        };
        let chord = protocol::chord_line(self.self_node.id);
        if self.write_to(token, &chord).is_err() || self.send_shortest_paths(token).is_err() {
            println!("Couldn't write to the outbound chord socket. Chord connection procedure aborted.");
            return;
        }
        println!("Successfully established the chord with node {}.", node.id);
    }

    pub fn remove_outbound_chord(&mut self) -> bool {
        match self.registry.find_by_role(Role::OutboundChord) {
            None => false,
            Some(token) => {
                let id = self.registry.get(token).map(|c| c.node_id).unwrap_or(NodeId::NONE);
                self.registry.close(token);
                self.remove_neighbor_connection(id);
                println!("Outbound chord with node {} removed.", id);
                true
            }
        }
    }

    // -- accepting new connections ---------------------------------------

    pub fn accept_new_node(&mut self, poll: &Poll, stream: TcpStream, src_ip: String) -> std::io::Result<()> {
        if self.connection_state != ConnectionState::Connecting && self.connection_state != ConnectionState::Connected {
            warn!("unexpectedly received a TCP connection from {}", src_ip);
            return Ok(());
        }
        if self.registry.find_by_role(Role::NewNode).is_some() {
            warn!("couldn't accept connection from {}: already handling a pending node connection", src_ip);
            return Ok(());
        }
        let token = self
            .registry
            .add(stream, Role::NewNode, src_ip.clone(), String::new())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "connection registry full"))?;
        let conn = self.registry.get_mut(token).unwrap();
        poll.registry().register(&mut conn.stream, token, Interest::READABLE)?;
        debug!("accepted TCP connection from {}", src_ip);
        Ok(())
    }

    // -- message dispatch --------------------------------------------------

    pub fn handle_message(&mut self, directory: &DirectoryClient, poll: &Poll, token: Token, line: &str) {
        let role = match self.registry.get(token) {
            Some(c) => c.role,
            None => return,
        };
        let msg = protocol::parse_message(line);
        match role {
            Role::NewNode => self.handle_from_new_node(directory, poll, token, line, msg),
            Role::Predecessor => self.handle_from_pred(poll, token, line, msg),
            Role::Successor => self.handle_from_succ(directory, poll, token, line, msg),
            Role::OutboundChord | Role::InboundChord => self.handle_from_chord(token, line, msg),
        }
    }

    /// Shared handling of `ROUTE`/`CHAT`, common to every connection role.
    /// Returns `true` if the message was recognized and handled.
    fn handle_from_any_node(&mut self, token: Token, msg: &Option<Message>) -> bool {
        let conn_node_id = self.registry.get(token).map(|c| c.node_id).unwrap_or(NodeId::NONE);
        match msg {
            Some(Message::Route { neighbor_id, recipient_id, path }) => {
                if *neighbor_id != conn_node_id {
                    warn!("received ROUTE message from node {} with wrong neighbor ID, ignoring", conn_node_id);
                    return true;
                }
                if *neighbor_id == self.self_node.id {
                    warn!("received ROUTE message from a neighbor using our own ID, ignoring");
                    return true;
                }
                if *recipient_id == self.self_node.id {
                    warn!("neighbor {} said it has no valid path to us, which is impossible, ignoring", conn_node_id);
                    return true;
                }
                self.update_routing_and_announce(*neighbor_id, *recipient_id, path.clone());
                true
            }
            Some(Message::Chat { sender_id, recipient_id, text }) => {
                if *recipient_id == self.self_node.id {
                    println!("Node {} said: \"{}\"", sender_id, text);
                } else {
                    self.forward_message(*sender_id, *recipient_id, text);
                }
                true
            }
            _ => false,
        }
    }

    pub fn forward_message(&mut self, sender_id: NodeId, recipient_id: NodeId, text: &str) -> bool {
        let neighbor_id = match self.routing.forward_via(recipient_id) {
            Some(id) => id,
            None => {
                debug!("no valid paths to node {}, dropping the message", recipient_id);
                return false;
            }
        };
        let token = match self.registry.find_by_node_id(neighbor_id) {
            Some(t) => t,
            None => {
                warn!("couldn't forward message to {} via neighbor {}: connection closed", recipient_id, neighbor_id);
                return false;
            }
        };
        let line = protocol::chat_line(sender_id, recipient_id, text);
        self.write_to(token, &line).is_ok()
    }

    fn handle_from_succ(&mut self, directory: &DirectoryClient, poll: &Poll, token: Token, line: &str, msg: Option<Message>) {
        trace!("received message from successor: {}", line);
        match msg {
            Some(Message::Succ { id, ip, port }) => {
                if id == self.succ.id {
                    warn!("successor said it is its own successor, ignoring");
                    return;
                }
                self.second_succ = Node::new(id, ip, port);
                debug!("received second successor info");
                self.awaiting_succ = false;
                if self.connection_state == ConnectionState::Connecting {
                    if !self.awaiting_pred {
                        self.on_join_end(directory);
                    }
                } else if self.connection_state != ConnectionState::Connected {
                    warn!("received unexpected SUCC message from the successor node");
                }
            }
            Some(Message::Entry { id, ip, port }) => {
                if id == self.self_node.id || self.registry.find_by_node_id(id).is_some() || id == self.second_succ.id {
                    warn!("currently used node ID in ENTRY message from successor, leaving the ring");
                    self.leave_ring(directory);
                    return;
                }
                debug!("a new node is joining the ring between me and my successor");
                if let Some(pred_token) = self.registry.find_by_role(Role::Predecessor) {
                    let succ_line = protocol::succ_line(id, &ip, &port);
                    if self.write_to(pred_token, &succ_line).is_err() {
                        return;
                    }
                }
                self.registry.close(token);
                let old_succ_id = self.succ.id;
                self.remove_neighbor_connection(old_succ_id);

                self.second_succ = self.succ.clone();
                self.succ = Node::new(id, ip, port);

                let succ = self.succ.clone();
                let new_token = match self.connect_to_node(poll, &succ, Role::Successor) {
                    Ok(t) => t,
                    Err(e) => {
                        println!("Couldn't connect to the node joining the ring: {}. Left the ring.", e);
                        self.leave_ring(directory);
                        return;
                    }
                };
                let pred = protocol::pred_line(self.self_node.id);
                if self.write_to(new_token, &pred).is_err() || self.send_shortest_paths(new_token).is_err() {}
            }
            _ => {
                if !self.handle_from_any_node(token, &msg) {
                    warn!("received malformed message from the successor: \"{}\"", line);
                }
            }
        }
    }

    fn handle_from_pred(&mut self, _poll: &Poll, token: Token, line: &str, msg: Option<Message>) {
        trace!("received message from predecessor: {}", line);
        if matches!(msg, Some(Message::Entry { .. })) && self.connection_state == ConnectionState::Connecting {
            warn!("received ENTRY message from the predecessor; likely a connection to self, aborting");
            self.registry.close(token);
            self.connection_state = ConnectionState::Disconnected;
            return;
        }
        if !self.handle_from_any_node(token, &msg) {
            warn!("received malformed message from the predecessor: \"{}\"", line);
        }
    }

    fn handle_from_chord(&mut self, token: Token, line: &str, msg: Option<Message>) {
        let id = self.registry.get(token).map(|c| c.node_id).unwrap_or(NodeId::NONE);
        trace!("received message from chord with node {}: {}", id, line);
        if !self.handle_from_any_node(token, &msg) {
            warn!("received malformed message from chord neighbor {}: \"{}\"", id, line);
        }
    }

    fn handle_from_new_node(&mut self, directory: &DirectoryClient, poll: &Poll, token: Token, line: &str, msg: Option<Message>) {
        trace!("received message from new client node: {}", line);
        match msg {
            Some(Message::Entry { id, ip, port }) => {
                let alone = self.connection_state == ConnectionState::Disconnected
                    || (self.connection_state == ConnectionState::Connected && self.succ.id == self.self_node.id);
                if alone {
                    if self.connection_state == ConnectionState::Disconnected {
                        println!("Another node tried to join using this node as its successor, but we're not in a ring.");
                        self.registry.close(token);
                        return;
                    }
                    if id == self.self_node.id {
                        println!("Another node tried to join with the same ID as this node.");
                        self.registry.close(token);
                        return;
                    }
                    debug!("received an entry request; we and the other node will be the only nodes in the ring");
                    self.registry.get_mut(token).unwrap().node_id = id;

                    self.succ = Node::new(id, ip.clone(), port.clone());
                    self.second_succ = self.self_node.clone();

                    let succ_line = protocol::succ_line(self.succ.id, &self.succ.ip, &self.succ.port);
                    if self.write_to(token, &succ_line).is_err() {
                        return;
                    }

                    let succ = self.succ.clone();
                    let succ_token = match self.connect_to_node(poll, &succ, Role::Successor) {
                        Ok(t) => t,
                        Err(e) => {
                            println!("Couldn't connect to the other node: {}. Left the ring.", e);
                            self.connection_state = ConnectionState::Disconnected;
                            return;
                        }
                    };
                    let pred = protocol::pred_line(self.self_node.id);
                    if self.write_to(succ_token, &pred).is_err() || self.send_shortest_paths(succ_token).is_err() {
                        return;
                    }

                    if let Some(conn) = self.registry.get_mut(token) {
                        conn.role = Role::Predecessor;
                    }
                } else if self.connection_state == ConnectionState::Connected {
                    debug!("received an entry request from node {}", id);
                    self.registry.get_mut(token).unwrap().node_id = id;

                    let succ_line = protocol::succ_line(self.succ.id, &self.succ.ip, &self.succ.port);
                    let old_pred_token = self.registry.find_by_role(Role::Predecessor);
                    let entry_line = protocol::entry_line(id, &ip, &port);

                    if self.write_to(token, &succ_line).is_err() {
                        return;
                    }
                    if let Some(pt) = old_pred_token {
                        if self.write_to(pt, &entry_line).is_err() {
                            return;
                        }
                    }
                    if self.send_shortest_paths(token).is_err() {
                        return;
                    }

                    if let Some(pt) = old_pred_token {
                        let pred_id = self.registry.get(pt).map(|c| c.node_id).unwrap_or(NodeId::NONE);
                        self.registry.close(pt);
                        self.remove_neighbor_connection(pred_id);
                    }
                    if let Some(conn) = self.registry.get_mut(token) {
                        conn.role = Role::Predecessor;
                    }
                } else {
                    debug!("received an entry request while connecting to the ring, closing the connection");
                    self.registry.close(token);
                }
            }
            Some(Message::Pred { id }) => {
                if self.connection_state == ConnectionState::Disconnected {
                    warn!("received predecessor connection while disconnected, closing");
                    self.registry.close(token);
                    return;
                }
                if let Some(old_pred) = self.registry.find_by_role(Role::Predecessor) {
                    debug!("already connected to a predecessor, closing the old connection");
                    self.registry.close(old_pred);
                }
                debug!("predecessor identified itself as {} (PRED message)", id);

                if let Some(existing) = self.registry.find_by_node_id(id) {
                    if self.registry.get(existing).map(|c| c.role) == Some(Role::OutboundChord) || self.registry.is_inbound_chord(existing) {
                        debug!("closing degenerate chord with our new predecessor");
                        self.registry.close(existing);
                        self.remove_neighbor_connection(id);
                    }
                }

                self.registry.get_mut(token).unwrap().node_id = id;
                if let Some(conn) = self.registry.get_mut(token) {
                    conn.role = Role::Predecessor;
                }
                self.timer.cancel();

                let succ_line = protocol::succ_line(self.succ.id, &self.succ.ip, &self.succ.port);
                if self.write_to(token, &succ_line).is_err() || self.send_shortest_paths(token).is_err() {
                    return;
                }

                self.awaiting_pred = false;
                if self.connection_state == ConnectionState::Connecting && !self.awaiting_succ {
                    self.on_join_end(directory);
                }
            }
            Some(Message::Chord { id }) => {
                if self.registry.find_by_node_id(id).is_some() {
                    warn!("rejected inbound chord from node {} because we are already connected", id);
                    self.registry.close(token);
                    return;
                }
                debug!("received an inbound chord connection from node {}", id);
                self.registry.get_mut(token).unwrap().node_id = id;
                if let Some(conn) = self.registry.get_mut(token) {
                    conn.role = Role::InboundChord;
                }
                if self.send_shortest_paths(token).is_err() {
                    return;
                }
            }
            _ => {
                warn!("received malformed message from the client node: \"{}\"", line);
            }
        }
    }

    // -- broken connections ------------------------------------------------

    pub fn handle_broken_socket(&mut self, directory: &DirectoryClient, poll: &Poll, token: Token) {
        let role = match self.registry.get(token) {
            Some(c) => c.role,
            None => return,
        };
        match role {
            Role::NewNode => debug!("the new client node closed the connection"),
            Role::Predecessor => self.handle_broken_pred(directory),
            Role::Successor => self.handle_broken_succ(directory, poll),
            Role::OutboundChord | Role::InboundChord => {
                let id = self.registry.get(token).map(|c| c.node_id).unwrap_or(NodeId::NONE);
                debug!("node {} closed the chord connection", id);
            }
        }
        let node_id = self.registry.get(token).map(|c| c.node_id).unwrap_or(NodeId::NONE);
        self.registry.close(token);
        self.remove_neighbor_connection(node_id);
    }

    fn handle_broken_succ(&mut self, directory: &DirectoryClient, poll: &Poll) {
        if self.connection_state != ConnectionState::Connected {
            println!("The successor closed the connection before we finished joining. Aborting the join procedure.");
            self.leave_ring(directory);
            return;
        }
        self.awaiting_succ = true;
        self.succ = self.second_succ.clone();

        if self.succ.id == self.self_node.id {
            debug!("the other node left, we are now alone in the ring");
            return;
        }

        let pred_token = match self.registry.find_by_role(Role::Predecessor) {
            Some(t) if self.registry.get(t).map(|c| c.node_id.is_some()).unwrap_or(false) => t,
            _ => {
                warn!("successor left while waiting for the new predecessor to connect, left the ring");
                self.leave_ring(directory);
                return;
            }
        };

        debug!("our successor left, connecting to the second successor");
        let succ_line = protocol::succ_line(self.succ.id, &self.succ.ip, &self.succ.port);
        if self.write_to(pred_token, &succ_line).is_err() {
            return;
        }

        if let Some(existing) = self.registry.find_by_node_id(self.succ.id) {
            if self.registry.get(existing).map(|c| c.role) == Some(Role::OutboundChord) || self.registry.is_inbound_chord(existing) {
                debug!("closing degenerate chord with our new successor");
                self.registry.close(existing);
                let id = self.succ.id;
                self.remove_neighbor_connection(id);
            }
        }

        let succ = self.succ.clone();
        let token = match self.connect_to_node(poll, &succ, Role::Successor) {
            Ok(t) => t,
            Err(e) => {
                println!("Couldn't connect to the new successor: {}. Left the ring.", e);
                self.leave_ring(directory);
                return;
            }
        };
        let pred = protocol::pred_line(self.self_node.id);
        if self.write_to(token, &pred).is_err() || self.send_shortest_paths(token).is_err() {
            return;
        }
        debug!("successfully connected to the new successor");
    }

    fn handle_broken_pred(&mut self, directory: &DirectoryClient) {
        if self.connection_state != ConnectionState::Connected {
            println!("The predecessor closed the connection before we finished joining. Aborting the join procedure.");
            self.leave_ring(directory);
            return;
        }
        if self.self_node.id == self.second_succ.id {
            debug!("the predecessor closed the connection, we are now alone in the ring");
        } else {
            debug!("the predecessor closed the connection, awaiting the new predecessor's connection");
            self.timer.set(PRED_TIMEOUT, TimerPurpose::PredecessorConnect);
        }
    }

    // -- directory node-list handling --------------------------------------

    pub fn request_node_list(&mut self, directory: &DirectoryClient, ring_id: &str, action: NodeListAction) {
        self.node_list_action = Some(action);
        if let Err(e) = directory.request_node_list(ring_id) {
            warn!("couldn't request node list: {}", e);
            return;
        }
        self.timer.set(DIRECTORY_TIMEOUT, TimerPurpose::DirectoryNodeList);
    }

    /// Called when the directory's `NODESLIST` arrives, or when the
    /// 1-second wait times out (`nodes = None`).
    pub fn on_node_list(&mut self, directory: &DirectoryClient, nodes: Option<Vec<Node>>) {
        self.timer.cancel();
        let action = match self.node_list_action.take() {
            Some(a) => a,
            None => return,
        };

        let nodes = match nodes {
            Some(n) => n,
            None => {
                println!("Timeout while waiting for the node list response from the directory server. Connection aborted.");
                self.leave_ring(directory);
                return;
            }
        };

        match action {
            NodeListAction::Join => {
                if nodes.is_empty() {
                    println!("There are no nodes in the ring. We are the only node in the ring.");
                    self.succ = self.self_node.clone();
                    self.second_succ = self.self_node.clone();
                    self.routing.reset(self.self_node.id);
                    self.on_join_end(directory);
                    return;
                }

                println!("Nodes currently in the ring:");
                print_node_table(&nodes);

                if let Some(_dup) = nodes.iter().find(|n| n.id == self.self_node.id) {
                    let used: std::collections::HashSet<i16> = nodes.iter().map(|n| n.id.0).collect();
                    match (0..=crate::types::MAX_NODE_ID).find(|id| !used.contains(id)) {
                        Some(new_id) => {
                            warn!("the node ID {} is already in use, using {} instead", self.self_node.id, new_id);
                            self.self_node.id = NodeId(new_id);
                        }
                        None => {
                            println!("No available node IDs left in the ring. Joining procedure aborted.");
                            self.connection_state = ConnectionState::Disconnected;
                            return;
                        }
                    }
                }
                self.node_list = nodes;
                self.connection_state = ConnectionState::AwaitingUserSelection;
                self.input_state = InputState::JoinNodeSelection;
                print!("Please select a node ID to use as the successor: ");
            }
            NodeListAction::Chord => {
                let already_connected = |id: NodeId| self.registry.find_by_node_id(id).is_some();
                let filtered = filter_for_chord(nodes, self.self_node.id, already_connected);
                if filtered.is_empty() {
                    println!("There are no nodes to which we can create a chord.");
                    return;
                }
                println!("Nodes you can create a chord to:");
                print_node_table(&filtered);
                self.node_list = filtered;
                self.input_state = InputState::ChordNodeSelection;
                print!("Please select a node ID to use as the chord neighbor: ");
            }
        }
    }

    /// Completes a `JoinNodeSelection`/`ChordNodeSelection` once the user
    /// types the chosen ID (or cancels with an invalid one).
    pub fn select_node(&mut self, poll: &Poll, id_str: &str) {
        let id = NodeId::parse(id_str.trim());
        match self.input_state {
            InputState::JoinNodeSelection => {
                let id = match id {
                    Some(id) => id,
                    None => return self.cancel_selection(true),
                };
                match self.node_list.iter().find(|n| n.id == id).cloned() {
                    Some(node) => {
                        self.succ = node;
                        let ring_id = self.ring_id.clone();
                        self.input_state = InputState::Command;
                        self.join_ring(poll, ring_id);
                    }
                    None => self.cancel_selection(true),
                }
            }
            InputState::ChordNodeSelection => {
                let id = match id {
                    Some(id) if id != self.self_node.id && self.registry.find_by_node_id(id).is_none() => id,
                    _ => return self.cancel_selection(false),
                };
                match self.node_list.iter().find(|n| n.id == id).cloned() {
                    Some(node) => {
                        self.input_state = InputState::Command;
                        self.create_outbound_chord(poll, &node);
                    }
                    None => self.cancel_selection(false),
                }
            }
            InputState::Command => {}
        }
    }

    fn cancel_selection(&mut self, was_join: bool) {
        println!("Invalid ID. Operation cancelled.");
        if was_join {
            self.connection_state = ConnectionState::Disconnected;
        }
        self.input_state = InputState::Command;
    }
}

fn print_node_table(nodes: &[Node]) {
    println!("+------------------------------+");
    println!("| ID | IP address      | Port  |");
    println!("+------------------------------+");
    for n in nodes {
        println!("| {:<2} | {:<15} | {:<5} |", n.id, n.ip, n.port);
    }
    println!("+------------------------------+");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ring_starts_disconnected() {
        let ring = Ring::new(Node::new(NodeId(1), "127.0.0.1", "6000"));
        assert_eq!(ring.connection_state, ConnectionState::Disconnected);
        assert_eq!(ring.input_state, InputState::Command);
        assert!(ring.ring_id.is_none());
    }

    #[test]
    fn direct_join_alone_connects_with_self_as_successor() {
        let mut ring = Ring::new(Node::new(NodeId(1), "127.0.0.1", "6000"));
        ring.direct_join_alone();
        assert_eq!(ring.connection_state, ConnectionState::Connected);
        assert_eq!(ring.succ.id, NodeId(1));
        assert_eq!(ring.second_succ.id, NodeId(1));
        assert!(!ring.awaiting_pred && !ring.awaiting_succ);
    }
}

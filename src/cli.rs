//! Interactive stdin command interface.
//!
//! Ported from `original_source/main.c`'s `handle_user_input`. The
//! two-step `join`/`chord` node-selection flow lives in `ring::InputState`
//! and `Ring::select_node`; this module does the one-shot command parsing
//! and the commands that don't need a second line of input.

use crate::connections::Role;
use crate::directory::{DirectoryClient, NodeListAction};
use crate::ring::{ConnectionState, InputState, Ring};
use crate::types::{Node, NodeId};
use mio::Poll;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { ring_id: String, self_id: NodeId },
    DirectJoin { self_id: NodeId, succ_id: NodeId, ip: String, port: String },
    Leave,
    Chord,
    RemoveChord,
    ShowTopology,
    ShowRouting { recipient: NodeId },
    ShowPath { recipient: NodeId },
    Message { recipient: NodeId, text: String },
    Exit,
    NodeSelection(String),
    Unrecognized,
    Empty,
}

/// Tokenizes one line of stdin. While a node-selection is pending
/// (`input_state != Command`), the whole line is treated as a bare ID.
pub fn parse_command(input_state: InputState, line: &str) -> Command {
    let line = line.trim();
    if input_state != InputState::Command {
        return Command::NodeSelection(line.to_string());
    }
    if line.is_empty() {
        return Command::Empty;
    }

    if let Some(rest) = strip_verb(line, "direct join") {
        return parse_direct_join(rest);
    }
    if strip_verb(line, "remove chord").is_some() {
        return Command::RemoveChord;
    }
    if strip_verb(line, "show topology").is_some() {
        return Command::ShowTopology;
    }
    if let Some(rest) = strip_verb(line, "show routing") {
        return match NodeId::parse(rest) {
            Some(id) => Command::ShowRouting { recipient: id },
            None => Command::Unrecognized,
        };
    }
    if let Some(rest) = strip_verb(line, "show path") {
        return match NodeId::parse(rest) {
            Some(id) => Command::ShowPath { recipient: id },
            None => Command::Unrecognized,
        };
    }

    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match verb {
        "join" | "j" => parse_join(rest),
        "dj" => parse_direct_join(rest),
        "leave" | "l" => Command::Leave,
        "chord" | "c" => Command::Chord,
        "rc" => Command::RemoveChord,
        "st" => Command::ShowTopology,
        "sr" => match NodeId::parse(rest) {
            Some(id) => Command::ShowRouting { recipient: id },
            None => Command::Unrecognized,
        },
        "sp" => match NodeId::parse(rest) {
            Some(id) => Command::ShowPath { recipient: id },
            None => Command::Unrecognized,
        },
        "message" | "m" => parse_message(rest),
        "exit" | "x" => Command::Exit,
        _ => Command::Unrecognized,
    }
}

/// Matches a (possibly multi-word) verb at the start of `line`, requiring
/// a word boundary right after it, and returns whatever follows.
fn strip_verb<'a>(line: &'a str, verb: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(verb)?;
    if rest.is_empty() {
        Some(rest)
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn parse_join(rest: &str) -> Command {
    let mut p = rest.split_whitespace();
    let parsed = (|| {
        let ring_id = p.next()?.to_string();
        let self_id = NodeId::parse(p.next()?)?;
        Some(Command::Join { ring_id, self_id })
    })();
    parsed.unwrap_or(Command::Unrecognized)
}

fn parse_direct_join(rest: &str) -> Command {
    let mut p = rest.split_whitespace();
    let parsed = (|| {
        let self_id = NodeId::parse(p.next()?)?;
        let succ_id = NodeId::parse(p.next()?)?;
        let ip = p.next()?.to_string();
        let port = p.next()?.to_string();
        Some(Command::DirectJoin { self_id, succ_id, ip, port })
    })();
    parsed.unwrap_or(Command::Unrecognized)
}

fn parse_message(rest: &str) -> Command {
    let mut p = rest.splitn(2, ' ');
    let parsed = (|| {
        let recipient = NodeId::parse(p.next()?)?;
        let text = p.next()?.to_string();
        Some(Command::Message { recipient, text })
    })();
    parsed.unwrap_or(Command::Unrecognized)
}

/// Executes one parsed command against the ring. Returns `true` if the
/// program should exit.
pub fn dispatch(ring: &mut Ring, directory: &DirectoryClient, poll: &Poll, cmd: Command) -> bool {
    match cmd {
        Command::Empty => {}
        Command::Unrecognized => println!("Unrecognized command."),
        Command::NodeSelection(id_str) => ring.select_node(poll, &id_str),
        Command::Join { ring_id, self_id } => do_join(ring, directory, ring_id, self_id),
        Command::DirectJoin { self_id, succ_id, ip, port } => do_direct_join(ring, poll, self_id, succ_id, ip, port),
        Command::Leave => do_leave(ring, directory),
        Command::Chord => do_chord(ring, directory),
        Command::RemoveChord => {
            if !ring.remove_outbound_chord() {
                println!("There is no outbound chord to remove.");
            }
        }
        Command::ShowTopology => print_topology(ring),
        Command::ShowRouting { recipient } => print_routing(ring, recipient),
        Command::ShowPath { recipient } => print_path(ring, recipient),
        Command::Message { recipient, text } => do_message(ring, recipient, &text),
        Command::Exit => return true,
    }
    false
}

fn do_join(ring: &mut Ring, directory: &DirectoryClient, ring_id: String, self_id: NodeId) {
    if ring.connection_state != ConnectionState::Disconnected {
        println!("Already in a ring; leave it first.");
        return;
    }
    ring.self_node.id = self_id;
    ring.connection_state = ConnectionState::AwaitingNodeList;
    ring.ring_id = Some(ring_id.clone());
    ring.request_node_list(directory, &ring_id, NodeListAction::Join);
}

fn do_direct_join(ring: &mut Ring, poll: &Poll, self_id: NodeId, succ_id: NodeId, ip: String, port: String) {
    if ring.connection_state != ConnectionState::Disconnected {
        println!("Already in a ring; leave it first.");
        return;
    }
    ring.self_node.id = self_id;
    if succ_id == self_id {
        ring.direct_join_alone();
    } else {
        ring.succ = Node::new(succ_id, ip, port);
        ring.join_ring(poll, None);
    }
}

fn do_leave(ring: &mut Ring, directory: &DirectoryClient) {
    if ring.connection_state == ConnectionState::Disconnected {
        println!("Not currently in a ring.");
        return;
    }
    ring.leave_ring(directory);
    println!("Left the ring.");
}

fn do_chord(ring: &mut Ring, directory: &DirectoryClient) {
    if ring.connection_state != ConnectionState::Connected {
        println!("Must be connected to a ring before creating a chord.");
        return;
    }
    match ring.ring_id.clone() {
        Some(ring_id) => ring.request_node_list(directory, &ring_id, NodeListAction::Chord),
        None => println!("Can't list chord candidates for a ring joined without a directory server."),
    }
}

fn do_message(ring: &mut Ring, recipient: NodeId, text: &str) {
    if recipient == ring.self_node.id {
        println!("Can't send a message to yourself.");
        return;
    }
    let sender = ring.self_node.id;
    if !ring.forward_message(sender, recipient, text) {
        println!("No known route to node {}.", recipient);
    }
}

fn print_topology(ring: &Ring) {
    println!("Self: {}", ring.self_node.id);
    let pred_id = ring
        .registry
        .find_by_role(Role::Predecessor)
        .and_then(|t| ring.registry.get(t))
        .map(|c| c.node_id.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("Predecessor: {}", pred_id);
    println!("Successor: {} ({}:{})", ring.succ.id, ring.succ.ip, ring.succ.port);
    println!("Second successor: {} ({}:{})", ring.second_succ.id, ring.second_succ.ip, ring.second_succ.port);
    for conn in ring.registry.iter() {
        println!("  connection: node {} role {:?}", conn.node_id, conn.role);
    }
}

fn print_routing(ring: &Ring, recipient: NodeId) {
    if !ring.routing.has_route(recipient) {
        println!("No known routes to node {}.", recipient);
        return;
    }
    println!("+-------------------------------+");
    println!("| neighbor | hop count          |");
    println!("+-------------------------------+");
    for (neighbor, path) in ring.routing.routes_to(recipient) {
        let hops = path.map_or("invalid".to_string(), |p| p.hop_count().to_string());
        println!("| {:<8} | {:<18} |", neighbor, hops);
    }
    println!("+-------------------------------+");
}

fn print_path(ring: &Ring, recipient: NodeId) {
    match ring.routing.shortest_path(recipient) {
        Some(path) if path.nodes.is_empty() => println!("Direct path to node {}.", recipient),
        Some(path) => {
            let hops: Vec<String> = path.nodes.iter().map(|n| n.to_string()).collect();
            println!("Path to node {}: via {}", recipient, hops.join(" -> "));
        }
        None => println!("No known path to node {}.", recipient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_word_short_and_long_names() {
        assert_eq!(parse_command(InputState::Command, "leave"), Command::Leave);
        assert_eq!(parse_command(InputState::Command, "l"), Command::Leave);
        assert_eq!(parse_command(InputState::Command, "x"), Command::Exit);
    }

    #[test]
    fn parses_join_with_ring_id_and_self_id() {
        assert_eq!(
            parse_command(InputState::Command, "join abc 7"),
            Command::Join { ring_id: "abc".into(), self_id: NodeId(7) }
        );
    }

    #[test]
    fn parses_message_preserving_spaces() {
        assert_eq!(
            parse_command(InputState::Command, "m 5 hello there"),
            Command::Message { recipient: NodeId(5), text: "hello there".into() }
        );
    }

    #[test]
    fn parses_direct_join() {
        assert_eq!(
            parse_command(InputState::Command, "dj 1 2 10.0.0.1 6000"),
            Command::DirectJoin { self_id: NodeId(1), succ_id: NodeId(2), ip: "10.0.0.1".into(), port: "6000".into() }
        );
        assert_eq!(
            parse_command(InputState::Command, "direct join 1 2 10.0.0.1 6000"),
            Command::DirectJoin { self_id: NodeId(1), succ_id: NodeId(2), ip: "10.0.0.1".into(), port: "6000".into() }
        );
    }

    #[test]
    fn parses_two_word_long_forms() {
        assert_eq!(parse_command(InputState::Command, "remove chord"), Command::RemoveChord);
        assert_eq!(parse_command(InputState::Command, "show topology"), Command::ShowTopology);
        assert_eq!(
            parse_command(InputState::Command, "show routing 4"),
            Command::ShowRouting { recipient: NodeId(4) }
        );
        assert_eq!(
            parse_command(InputState::Command, "show path 4"),
            Command::ShowPath { recipient: NodeId(4) }
        );
    }

    #[test]
    fn node_selection_bypasses_verb_parsing() {
        assert_eq!(
            parse_command(InputState::JoinNodeSelection, "leave"),
            Command::NodeSelection("leave".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_command(InputState::Command, "frobnicate"), Command::Unrecognized);
    }
}

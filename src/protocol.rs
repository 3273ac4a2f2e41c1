//! Wire message parsing and formatting for the TCP ring/chord protocol.
//!
//! Line-delimited ASCII, one message per line, newline-terminated, each
//! line capped at `MAX_NODE_MESSAGE_SIZE` bytes. `ROUTE` has its own
//! richer format handled in `routing.rs`; everything else lives here.

use crate::routing::{parse_route_body, Path, RouteAnnouncement};
use crate::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A node asking to join via this link as predecessor.
    Entry { id: NodeId, ip: String, port: String },
    /// A predecessor telling its successor its own ID.
    Pred { id: NodeId },
    /// A successor telling its predecessor the second successor's address.
    Succ { id: NodeId, ip: String, port: String },
    /// A chord request, carrying only the requester's ID (the address is
    /// already known from the TCP peer).
    Chord { id: NodeId },
    Route { neighbor_id: NodeId, recipient_id: NodeId, path: Option<Path> },
    Chat { sender_id: NodeId, recipient_id: NodeId, text: String },
}

/// Parses one already-newline-stripped line.
pub fn parse_message(line: &str) -> Option<Message> {
    if let Some(rest) = line.strip_prefix("ENTRY ") {
        let mut parts = rest.splitn(3, ' ');
        let id = NodeId::parse(parts.next()?)?;
        let ip = parts.next()?.to_string();
        let port = parts.next()?.to_string();
        return Some(Message::Entry { id, ip, port });
    }
    if let Some(rest) = line.strip_prefix("PRED ") {
        let id = NodeId::parse(rest.trim())?;
        return Some(Message::Pred { id });
    }
    if let Some(rest) = line.strip_prefix("SUCC ") {
        let mut parts = rest.splitn(3, ' ');
        let id = NodeId::parse(parts.next()?)?;
        let ip = parts.next()?.to_string();
        let port = parts.next()?.to_string();
        return Some(Message::Succ { id, ip, port });
    }
    if let Some(rest) = line.strip_prefix("CHORD ") {
        let id = NodeId::parse(rest.trim())?;
        return Some(Message::Chord { id });
    }
    if let Some(rest) = line.strip_prefix("ROUTE ") {
        let (neighbor_id, recipient_id, path) = parse_route_body(rest)?;
        return Some(Message::Route { neighbor_id, recipient_id, path });
    }
    if let Some(rest) = line.strip_prefix("CHAT ") {
        let mut parts = rest.splitn(3, ' ');
        let sender_id = NodeId::parse(parts.next()?)?;
        let recipient_id = NodeId::parse(parts.next()?)?;
        let text = parts.next()?.to_string();
        return Some(Message::Chat { sender_id, recipient_id, text });
    }
    None
}

pub fn entry_line(id: NodeId, ip: &str, port: &str) -> String {
    format!("ENTRY {} {} {}\n", id, ip, port)
}

pub fn pred_line(id: NodeId) -> String {
    format!("PRED {}\n", id)
}

pub fn succ_line(id: NodeId, ip: &str, port: &str) -> String {
    format!("SUCC {} {} {}\n", id, ip, port)
}

pub fn chord_line(id: NodeId) -> String {
    format!("CHORD {}\n", id)
}

pub fn chat_line(sender_id: NodeId, recipient_id: NodeId, text: &str) -> String {
    format!("CHAT {} {} {}\n", sender_id, recipient_id, text)
}

pub fn route_line(ann: &RouteAnnouncement) -> String {
    ann.to_line()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry() {
        let msg = parse_message("ENTRY 5 10.0.0.1 6000").unwrap();
        assert_eq!(
            msg,
            Message::Entry { id: NodeId(5), ip: "10.0.0.1".into(), port: "6000".into() }
        );
    }

    #[test]
    fn parses_pred_and_chord() {
        assert_eq!(parse_message("PRED 7").unwrap(), Message::Pred { id: NodeId(7) });
        assert_eq!(parse_message("CHORD 8").unwrap(), Message::Chord { id: NodeId(8) });
    }

    #[test]
    fn parses_succ() {
        let msg = parse_message("SUCC 9 10.0.0.2 6001").unwrap();
        assert_eq!(
            msg,
            Message::Succ { id: NodeId(9), ip: "10.0.0.2".into(), port: "6001".into() }
        );
    }

    #[test]
    fn parses_chat_preserving_embedded_spaces() {
        let msg = parse_message("CHAT 1 2 hello  world").unwrap();
        assert_eq!(
            msg,
            Message::Chat { sender_id: NodeId(1), recipient_id: NodeId(2), text: "hello  world".into() }
        );
    }

    #[test]
    fn parses_route_delegating_to_routing_module() {
        let msg = parse_message("ROUTE 1 2").unwrap();
        assert_eq!(msg, Message::Route { neighbor_id: NodeId(1), recipient_id: NodeId(2), path: None });
    }

    #[test]
    fn rejects_unrecognized_lines() {
        assert!(parse_message("GARBAGE").is_none());
        assert!(parse_message("ENTRY notanumber a b").is_none());
    }

    #[test]
    fn formats_round_trip() {
        let line = entry_line(NodeId(3), "1.2.3.4", "5000");
        assert_eq!(line, "ENTRY 3 1.2.3.4 5000\n");
        assert_eq!(
            parse_message(line.trim_end()).unwrap(),
            Message::Entry { id: NodeId(3), ip: "1.2.3.4".into(), port: "5000".into() }
        );
    }
}

//! The distance-vector routing engine: the per-recipient x per-neighbor
//! routing matrix, the derived forwarding vector, path propagation on
//! link up/down, and path announcements.
//!
//! Ported from `original_source/routing.c`. The array-of-slots shape
//! (sparse `recipient_ids`/`neighbor_ids` parallel vectors indexing into
//! fixed-size matrices) is kept deliberately instead of switching to
//! `HashMap`-based tables, per spec §9: iteration order over neighbors
//! feeds tie-breaking and re-announcement behavior, so an unordered map
//! would subtly change which neighbor wins a tie.
//!
//! A stored `Path` holds only the intermediate hops strictly between its
//! two named endpoints (the neighbor it came from, and the recipient),
//! per spec §3. Relaying a path onward therefore means prepending the
//! locally-chosen neighbor to the stored intermediates -- except when
//! that neighbor *is* the recipient (the recipient is directly connected),
//! in which case this node is itself directly adjacent to the recipient
//! and the relayed path is empty too.

use log::{trace, warn};

use crate::types::{NodeId, MAX_NEIGHBORS, MAX_NODES, MAX_RECIPIENTS, NO_NODE_ID};

/// A path between two endpoints: the intermediate node IDs, excluding
/// both endpoints. An empty `nodes` list means the two endpoints are
/// directly connected (hop_count 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
}

impl Path {
    pub fn direct() -> Path {
        Path { nodes: Vec::new() }
    }

    pub fn hop_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A stored routing-table entry: either a path, or "no path" (equivalent
/// to `INVALID_PATH` in the original).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Invalid,
    Valid(Path),
}

impl Entry {
    fn hop_count(&self) -> Option<usize> {
        match self {
            Entry::Invalid => None,
            Entry::Valid(p) => Some(p.hop_count()),
        }
    }
}

/// A `ROUTE` announcement ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAnnouncement {
    pub neighbor_id: NodeId,
    pub recipient_id: NodeId,
    pub path: Option<Path>,
}

impl RouteAnnouncement {
    /// Renders the `ROUTE` line, including the trailing newline. The
    /// dash-separated path string lists the neighbor, then any
    /// intermediates, then the recipient -- collapsing to a single token
    /// when the neighbor and recipient coincide (the "this is how you
    /// reach me directly" / self-line form).
    pub fn to_line(&self) -> String {
        match &self.path {
            None => format!("ROUTE {} {}\n", self.neighbor_id, self.recipient_id),
            Some(path) => {
                let mut seq = vec![self.neighbor_id];
                seq.extend(path.nodes.iter().copied());
                if seq.last() != Some(&self.recipient_id) {
                    seq.push(self.recipient_id);
                }
                let path_str = seq
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join("-");
                format!("ROUTE {} {} {}\n", self.neighbor_id, self.recipient_id, path_str)
            }
        }
    }
}

/// Parses the body of a `ROUTE` line (everything after `ROUTE `) into
/// `(neighbor_id, recipient_id, path)`. `path` is `None` for the
/// path-absent form.
pub fn parse_route_body(body: &str) -> Option<(NodeId, NodeId, Option<Path>)> {
    let mut parts = body.splitn(3, ' ');
    let neighbor_id = NodeId::parse(parts.next()?)?;
    let recipient_id = NodeId::parse(parts.next()?)?;
    let path_str = parts.next();

    match path_str {
        None => Some((neighbor_id, recipient_id, None)),
        Some(s) if s.is_empty() => Some((neighbor_id, recipient_id, None)),
        Some(s) => {
            let ids: Vec<&str> = s.split('-').collect();
            if ids.is_empty() {
                return None;
            }
            let mut node_ids = Vec::with_capacity(ids.len());
            for part in &ids {
                node_ids.push(NodeId::parse(part)?);
            }
            if node_ids[0] != neighbor_id || *node_ids.last().unwrap() != recipient_id {
                return None;
            }
            let intermediates = if node_ids.len() <= 1 {
                Vec::new()
            } else {
                node_ids[1..node_ids.len() - 1].to_vec()
            };
            if intermediates.len() > MAX_NODES {
                // The original's equivalent guard (`false && i >=
                // MAX_NODES`) was unreachable dead code; this
                // re-implementation makes the call explicit per spec §9's
                // open question and rejects paths that can't possibly fit
                // in a ring this size.
                return None;
            }
            Some((neighbor_id, recipient_id, Some(Path { nodes: intermediates })))
        }
    }
}

/// Owns the routing matrix and forwarding vector for one node.
pub struct RoutingEngine {
    self_id: NodeId,
    recipient_ids: Vec<NodeId>,
    neighbor_ids: Vec<NodeId>,
    // table[recipient_slot][neighbor_slot]
    table: Vec<Vec<Entry>>,
    // forwarding[recipient_slot] = Some(neighbor_slot)
    forwarding: Vec<Option<usize>>,
}

impl RoutingEngine {
    pub fn new(self_id: NodeId) -> Self {
        RoutingEngine {
            self_id,
            recipient_ids: vec![NodeId(NO_NODE_ID); MAX_RECIPIENTS],
            neighbor_ids: vec![NodeId(NO_NODE_ID); MAX_NEIGHBORS],
            table: vec![vec![Entry::Invalid; MAX_NEIGHBORS]; MAX_RECIPIENTS],
            forwarding: vec![None; MAX_RECIPIENTS],
        }
    }

    pub fn reset(&mut self, self_id: NodeId) {
        *self = RoutingEngine::new(self_id);
    }

    fn recipient_slot(&self, id: NodeId) -> Option<usize> {
        self.recipient_ids.iter().position(|&x| x == id)
    }

    fn neighbor_slot(&self, id: NodeId) -> Option<usize> {
        self.neighbor_ids.iter().position(|&x| x == id)
    }

    fn recipient_slot_or_alloc(&mut self, id: NodeId) -> usize {
        if let Some(i) = self.recipient_slot(id) {
            return i;
        }
        let i = self
            .recipient_ids
            .iter()
            .position(|&x| x.is_none())
            .expect("ran out of space for recipients in the routing tables");
        self.recipient_ids[i] = id;
        for e in self.table[i].iter_mut() {
            *e = Entry::Invalid;
        }
        self.forwarding[i] = None;
        i
    }

    fn neighbor_slot_or_alloc(&mut self, id: NodeId) -> usize {
        if let Some(i) = self.neighbor_slot(id) {
            return i;
        }
        let i = self
            .neighbor_ids
            .iter()
            .position(|&x| x.is_none())
            .expect("ran out of space for neighbors in the routing tables");
        self.neighbor_ids[i] = id;
        for row in self.table.iter_mut() {
            row[i] = Entry::Invalid;
        }
        i
    }

    /// Returns the stored (unshifted) path to `recipient_id` via the
    /// currently-chosen neighbor, if any. This is the raw table entry --
    /// see `announcement_for` for the path as *this* node would relay it.
    pub fn shortest_path(&self, recipient_id: NodeId) -> Option<&Path> {
        let r = self.recipient_slot(recipient_id)?;
        let n = self.forwarding[r]?;
        match &self.table[r][n] {
            Entry::Valid(p) => Some(p),
            Entry::Invalid => None,
        }
    }

    /// All of this recipient's known neighbor-path pairs, for `show
    /// routing`. Ordered by neighbor slot.
    pub fn routes_to(&self, recipient_id: NodeId) -> Vec<(NodeId, Option<&Path>)> {
        let mut out = Vec::new();
        if let Some(r) = self.recipient_slot(recipient_id) {
            for (n, &nid) in self.neighbor_ids.iter().enumerate() {
                if nid.is_some() {
                    let path = match &self.table[r][n] {
                        Entry::Valid(p) => Some(p),
                        Entry::Invalid => None,
                    };
                    out.push((nid, path));
                }
            }
        }
        out
    }

    pub fn has_route(&self, recipient_id: NodeId) -> bool {
        self.recipient_slot(recipient_id).is_some()
    }

    pub fn known_neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbor_ids.iter().copied().filter(|n| n.is_some())
    }

    pub fn known_recipients(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.recipient_ids.iter().copied().filter(|n| n.is_some())
    }

    /// Updates the table given a new (or withdrawn, `path = None`) path
    /// from `neighbor_id` to `recipient_id`. Returns `true` if the
    /// node's own shortest path to `recipient_id` changed as a result
    /// (different neighbor, or the same neighbor with a different path),
    /// in which case the caller should re-announce.
    pub fn update(&mut self, neighbor_id: NodeId, recipient_id: NodeId, path: Option<Path>) -> bool {
        if recipient_id == self.self_id {
            return false;
        }
        if neighbor_id == self.self_id {
            warn!("update(): neighbor_id == self_id, ignoring");
            return false;
        }

        let neighbor = self.neighbor_slot_or_alloc(neighbor_id);
        let recipient = self.recipient_slot_or_alloc(recipient_id);

        let entry = match path {
            Some(p) if p.nodes.iter().any(|&n| n == self.self_id) => Entry::Invalid,
            Some(p) => Entry::Valid(p),
            None => Entry::Invalid,
        };

        let old_neighbor = self.forwarding[recipient];
        let old_path = old_neighbor.map(|n| self.table[recipient][n].clone());

        self.table[recipient][neighbor] = entry;

        // Pick the minimum hop-count among valid entries, keeping the
        // previously-chosen neighbor on a tie to reduce churn.
        let mut best: Option<usize> = None;
        for n in 0..MAX_NEIGHBORS {
            if self.neighbor_ids[n].is_none() {
                continue;
            }
            if let Some(hc) = self.table[recipient][n].hop_count() {
                best = Some(match best {
                    None => n,
                    Some(b) => {
                        let best_hc = self.table[recipient][b].hop_count().unwrap();
                        if hc < best_hc {
                            n
                        } else {
                            b
                        }
                    }
                });
            }
        }

        if let (Some(old), Some(new)) = (old_neighbor, best) {
            if self.table[recipient][old].hop_count() == self.table[recipient][new].hop_count() {
                best = Some(old);
            }
        }

        if best.is_none() {
            trace!(
                "no valid paths to recipient {}, freeing its routing-table row",
                recipient_id
            );
            self.recipient_ids[recipient] = NodeId::NONE;
        }

        self.forwarding[recipient] = best;

        match (old_neighbor, best) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(o), Some(b)) => o != b || old_path.as_ref() != Some(&self.table[recipient][b]),
        }
    }

    /// Drops all routing-table entries for a neighbor that is no longer
    /// reachable (its connection just closed), as if it had announced
    /// path-absent for every recipient, then frees its slot.
    ///
    /// Returns the set of recipients whose shortest path changed, so the
    /// caller can re-announce.
    pub fn remove_neighbor(&mut self, neighbor_id: NodeId) -> Vec<NodeId> {
        let neighbor = match self.neighbor_slot(neighbor_id) {
            Some(n) => n,
            None => return Vec::new(),
        };

        let mut changed = Vec::new();
        for recipient in 0..MAX_RECIPIENTS {
            let recipient_id = self.recipient_ids[recipient];
            if recipient_id.is_some() && self.update(neighbor_id, recipient_id, None) {
                changed.push(recipient_id);
            }
        }
        self.neighbor_ids[neighbor] = NodeId::NONE;
        changed
    }

    /// Builds the announcement this node would make about `recipient_id`
    /// -- i.e. the path from *this* node to the recipient, obtained by
    /// prepending the chosen neighbor to its stored intermediates (or
    /// staying direct, if the chosen neighbor *is* the recipient).
    pub fn announcement_for(&self, recipient_id: NodeId) -> RouteAnnouncement {
        let path = (|| {
            let r = self.recipient_slot(recipient_id)?;
            let n = self.forwarding[r]?;
            let chosen_neighbor = self.neighbor_ids[n];
            let stored = match &self.table[r][n] {
                Entry::Valid(p) => p,
                Entry::Invalid => return None,
            };
            if chosen_neighbor == recipient_id {
                Some(Path::direct())
            } else {
                let mut nodes = vec![chosen_neighbor];
                nodes.extend(stored.nodes.iter().copied());
                Some(Path { nodes })
            }
        })();
        RouteAnnouncement {
            neighbor_id: self.self_id,
            recipient_id,
            path,
        }
    }

    /// The full shortest-path view for link-up announcements: the self
    /// line plus one entry per allocated recipient slot.
    pub fn full_announcement(&self) -> Vec<RouteAnnouncement> {
        let mut out = Vec::with_capacity(1 + MAX_RECIPIENTS);
        out.push(RouteAnnouncement {
            neighbor_id: self.self_id,
            recipient_id: self.self_id,
            path: Some(Path::direct()),
        });
        for r in 0..MAX_RECIPIENTS {
            let recipient_id = self.recipient_ids[r];
            if recipient_id.is_some() {
                out.push(self.announcement_for(recipient_id));
            }
        }
        out
    }

    /// Looks up the egress neighbor for a chat message to `recipient_id`.
    pub fn forward_via(&self, recipient_id: NodeId) -> Option<NodeId> {
        let r = self.recipient_slot(recipient_id)?;
        let n = self.forwarding[r]?;
        Some(self.neighbor_ids[n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_neighbor_path_is_chosen() {
        let mut rt = RoutingEngine::new(NodeId(1));
        let changed = rt.update(NodeId(2), NodeId(2), Some(Path::direct()));
        assert!(changed);
        assert_eq!(rt.forward_via(NodeId(2)), Some(NodeId(2)));
    }

    #[test]
    fn loop_freedom_path_crossing_self_is_invalid() {
        // Invariant 1: a path containing self as an intermediate hop is
        // treated as invalid at insertion time.
        let mut rt = RoutingEngine::new(NodeId(1));
        let path = Path { nodes: vec![NodeId(1)] };
        let changed = rt.update(NodeId(2), NodeId(3), Some(path));
        assert!(!changed);
        assert_eq!(rt.forward_via(NodeId(3)), None);
    }

    #[test]
    fn shorter_path_replaces_forwarding_choice() {
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(2), NodeId(9), Some(Path { nodes: vec![NodeId(5), NodeId(6)] }));
        assert_eq!(rt.forward_via(NodeId(9)), Some(NodeId(2)));

        let changed = rt.update(NodeId(3), NodeId(9), Some(Path::direct()));
        assert!(changed);
        assert_eq!(rt.forward_via(NodeId(9)), Some(NodeId(3)));
    }

    #[test]
    fn tie_keeps_previous_neighbor_stable() {
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(2), NodeId(9), Some(Path { nodes: vec![NodeId(20)] }));
        assert_eq!(rt.forward_via(NodeId(9)), Some(NodeId(2)));

        // Same hop count via a different neighbor: must not flip.
        let changed = rt.update(NodeId(3), NodeId(9), Some(Path { nodes: vec![NodeId(21)] }));
        assert!(!changed);
        assert_eq!(rt.forward_via(NodeId(9)), Some(NodeId(2)));
    }

    #[test]
    fn withdrawing_the_only_path_frees_the_recipient_row() {
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(2), NodeId(9), Some(Path::direct()));
        assert!(rt.has_route(NodeId(9)));

        let changed = rt.update(NodeId(2), NodeId(9), None);
        assert!(changed);
        assert!(!rt.has_route(NodeId(9)));
    }

    #[test]
    fn remove_neighbor_withdraws_every_recipient_via_it() {
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(2), NodeId(9), Some(Path::direct()));
        rt.update(NodeId(2), NodeId(10), Some(Path::direct()));
        let changed = rt.remove_neighbor(NodeId(2));
        assert_eq!(changed.len(), 2);
        assert!(!rt.has_route(NodeId(9)));
        assert!(!rt.has_route(NodeId(10)));
    }

    #[test]
    fn announcement_minimality_unchanged_update_does_not_report_change() {
        // Invariant 4: announce only when the chosen (neighbor, path)
        // actually changes.
        let mut rt = RoutingEngine::new(NodeId(1));
        assert!(rt.update(NodeId(2), NodeId(9), Some(Path::direct())));
        assert!(!rt.update(NodeId(2), NodeId(9), Some(Path::direct())));
    }

    #[test]
    fn forwarding_agreement_with_minimum_hop_count() {
        // Invariant 3: forwarding_table[r] = n implies routing_table[r][n]
        // is valid and minimal.
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(2), NodeId(9), Some(Path { nodes: vec![NodeId(5), NodeId(6)] }));
        rt.update(NodeId(3), NodeId(9), Some(Path { nodes: vec![NodeId(7)] }));
        let via = rt.forward_via(NodeId(9)).unwrap();
        assert_eq!(via, NodeId(3));
        let chosen_hops = rt.shortest_path(NodeId(9)).unwrap().hop_count();
        for (n, p) in rt.routes_to(NodeId(9)) {
            if let Some(p) = p {
                assert!(chosen_hops <= p.hop_count(), "neighbor {n} had a shorter path that wasn't chosen");
            }
        }
    }

    #[test]
    fn relayed_path_prepends_chosen_neighbor() {
        // A reaches 9 via neighbor 3, whose own reported intermediates to
        // 9 are [7]. A's relayed path to others must be [3, 7].
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(3), NodeId(9), Some(Path { nodes: vec![NodeId(7)] }));
        let ann = rt.announcement_for(NodeId(9));
        assert_eq!(ann.path.unwrap().nodes, vec![NodeId(3), NodeId(7)]);
    }

    #[test]
    fn relayed_path_stays_direct_when_neighbor_is_recipient() {
        let mut rt = RoutingEngine::new(NodeId(1));
        rt.update(NodeId(9), NodeId(9), Some(Path::direct()));
        let ann = rt.announcement_for(NodeId(9));
        assert_eq!(ann.path.unwrap().nodes, Vec::<NodeId>::new());
    }

    #[test]
    fn self_line_round_trips_as_three_tokens() {
        // Spec's self-announcement form: "ROUTE <id> <id> <id>" -- a
        // single path token, since the two endpoints coincide.
        let ann = RouteAnnouncement {
            neighbor_id: NodeId(10),
            recipient_id: NodeId(10),
            path: Some(Path::direct()),
        };
        assert_eq!(ann.to_line(), "ROUTE 10 10 10\n");
    }

    #[test]
    fn route_line_round_trips_with_path() {
        // Invariant 5: path_to_string then reverse-parse yields the same
        // (hop_count, nodes).
        let ann = RouteAnnouncement {
            neighbor_id: NodeId(10),
            recipient_id: NodeId(30),
            path: Some(Path { nodes: vec![NodeId(20)] }),
        };
        let line = ann.to_line();
        assert_eq!(line, "ROUTE 10 30 10-20-30\n");

        let body = line.trim_start_matches("ROUTE ").trim_end_matches('\n');
        let (nbr, rcp, path) = parse_route_body(body).unwrap();
        assert_eq!(nbr, NodeId(10));
        assert_eq!(rcp, NodeId(30));
        assert_eq!(path.unwrap().nodes, vec![NodeId(20)]);
    }

    #[test]
    fn route_line_round_trips_path_absent() {
        let ann = RouteAnnouncement {
            neighbor_id: NodeId(10),
            recipient_id: NodeId(30),
            path: None,
        };
        let line = ann.to_line();
        assert_eq!(line, "ROUTE 10 30\n");
        let body = line.trim_start_matches("ROUTE ").trim_end_matches('\n');
        let (nbr, rcp, path) = parse_route_body(body).unwrap();
        assert_eq!(nbr, NodeId(10));
        assert_eq!(rcp, NodeId(30));
        assert!(path.is_none());
    }

    #[test]
    fn route_line_round_trips_direct_between_distinct_nodes() {
        // hop_count 0 between two distinct nodes: "ROUTE 10 20 10-20".
        let ann = RouteAnnouncement {
            neighbor_id: NodeId(10),
            recipient_id: NodeId(20),
            path: Some(Path::direct()),
        };
        let line = ann.to_line();
        assert_eq!(line, "ROUTE 10 20 10-20\n");
        let body = line.trim_start_matches("ROUTE ").trim_end_matches('\n');
        let (_, _, path) = parse_route_body(body).unwrap();
        assert_eq!(path.unwrap().nodes, Vec::<NodeId>::new());
    }

    #[test]
    fn parse_route_body_rejects_mismatched_endpoints() {
        assert!(parse_route_body("10 30 11-20-30").is_none());
        assert!(parse_route_body("10 30 10-20-31").is_none());
    }
}

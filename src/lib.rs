//! A node in a ring + chord peer-to-peer overlay network.
//!
//! Each node maintains a position in a logical ring (successor,
//! second-successor, predecessor), may open additional point-to-point
//! "chord" shortcuts to arbitrary ring members, and runs a distance-vector
//! routing layer over both ring and chord links to forward chat messages
//! across multiple hops. A directory server, reachable over UDP, is used
//! to discover ring membership by a three-character ring id; direct join
//! bypasses it entirely.
//!
//! ## Modules
//!
//! - [`types`] — shared identity types (`NodeId`, `Node`) and size constants.
//! - [`error`] — the fatal-error taxonomy (`NodeError`).
//! - [`line_reader`] — turns a byte stream into newline-delimited messages.
//! - [`connections`] — the fixed-capacity, role-tagged connection table.
//! - [`directory`] — the UDP directory-server client.
//! - [`routing`] — the distance-vector routing engine and `ROUTE` wire format.
//! - [`protocol`] — the rest of the TCP wire protocol (`ENTRY`/`PRED`/…).
//! - [`timer`] — the single-shot predecessor/directory timeout.
//! - [`ring`] — the ring membership state machine tying the above together.
//! - [`cli`] — the interactive stdin command language.
//! - [`event_loop`] — the `mio`-based reactor driving everything.

pub mod cli;
pub mod connections;
pub mod directory;
pub mod error;
pub mod event_loop;
pub mod line_reader;
pub mod protocol;
pub mod ring;
pub mod routing;
pub mod timer;
pub mod types;

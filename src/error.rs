//! Error taxonomy.
//!
//! Only fatal-environmental and fatal-protocol conditions (spec §7 a/b) are
//! represented here: peer-recoverable and user-recoverable conditions are
//! handled in place (a `warn!` log line plus a local recovery action) and
//! never escape as an `Err` past the call site that detects them.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("couldn't resolve directory server address: {0}")]
    DirectoryResolve(String),

    #[error("malformed directory response: {0}")]
    Directory(String),
}

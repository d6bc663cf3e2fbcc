//! # Raft — replicated state machine driver
//!
//! A single consensus group spanning all peers: election, log replication
//! and ordered apply to a local state machine behind an apply filter (so a
//! node can agree on an entry's order without necessarily storing its
//! data locally — the sharding story lives one layer up, in `router`).
//!
//! [`ConsensusNode`] owns the state machine; [`transport::Transport`] is
//! the delivery abstraction (an HTTP implementation is provided);
//! [`node::ApplySink`] is the local-engine hookup, kept as a trait so this
//! crate never depends on `engine` directly.

mod error;
mod message;
mod node;
mod transport;

pub use error::RaftError;
pub use message::{Command, ConsensusMessage, Envelope, LogEntry, Proposal};
pub use node::{ApplySink, ConsensusNode};
pub use transport::{HttpTransport, Transport};

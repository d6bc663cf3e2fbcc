//! Wire types for the consensus group: the mutation `Command`s proposals
//! carry, log entries, and the RequestVote/AppendEntries message pair
//! exchanged between peers. Serialized as JSON by the transport, matching
//! the `POST /api/internal/raft` body the HTTP surface decodes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A mutation proposed to the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl Command {
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Command::Put { key, .. } | Command::Delete { key } => key,
        }
    }
}

/// A command tagged with the proposal id the leader's waiter is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub command: Command,
}

/// One entry in the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub proposal: Proposal,
}

/// The consensus message types exchanged between peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConsensusMessage {
    RequestVote {
        term: u64,
        candidate_id: String,
        last_log_index: u64,
        last_log_term: u64,
        /// Pre-vote round: does not bump the candidate's own term, used to
        /// probe for a quorum before disrupting the current leader.
        pre_vote: bool,
    },
    RequestVoteResponse {
        term: u64,
        voter_id: String,
        vote_granted: bool,
        pre_vote: bool,
    },
    AppendEntries {
        term: u64,
        leader_id: String,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    },
    AppendEntriesResponse {
        term: u64,
        follower_id: String,
        success: bool,
        /// Highest index this follower's log matches the leader's at,
        /// valid only when `success` is true.
        match_index: u64,
    },
}

/// An addressed consensus message: `to` identifies the intended recipient
/// peer id, `from` the sender. The transport never sends an envelope
/// addressed to its own node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub payload: ConsensusMessage,
}

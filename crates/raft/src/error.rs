use thiserror::Error;

/// Errors surfaced by the consensus node and its transport.
#[derive(Debug, Error)]
pub enum RaftError {
    /// `Execute` was called on a non-leader. `leader_hint`, if known, lets
    /// the caller redirect instead of retrying blindly.
    #[error("not the leader (hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<String> },

    /// `Execute` timed out waiting for the entry to be applied.
    #[error("proposal timed out before being applied")]
    ProposalTimedOut,

    /// An apply callback returned an error; per the apply contract this is
    /// fatal and implies divergence between the log and the state machine.
    #[error("apply error, run loop must stop: {0}")]
    ApplyFailed(String),

    /// The node already hit a fatal apply error on an earlier entry and has
    /// stopped driving its run loop; it can no longer commit or apply.
    #[error("node stopped after a prior fatal apply error")]
    NodeStopped,

    /// Every delivery attempt to a peer failed.
    #[error("transport error sending to {peer}: {source}")]
    Transport { peer: String, #[source] source: anyhow::Error },

    /// Attempted to send a message addressed to this node itself.
    #[error("refusing to send a message addressed to self ({0})")]
    SelfSend(String),
}

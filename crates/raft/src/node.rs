//! The consensus state machine: election, log replication, commit and
//! apply. One [`ConsensusNode`] per process; a single group spans all
//! peers (no multi-group support, matching spec scope).
//!
//! Role transitions follow the classic Raft shape — follower on election
//! timeout becomes a pre-vote candidate, a quorum of (real) votes makes it
//! leader, a higher term observed anywhere reverts it to follower —
//! grounded on the state/role split in `dennisss-repo/pkg/raft/src/
//! consensus.rs`'s `ServerState::{Follower,Candidate,Leader}` enum, though
//! the tick/ready/advance driving loop itself is written directly against
//! this workspace's own contract rather than that file's event-driven
//! shape.

use crate::error::RaftError;
use crate::message::{Command, ConsensusMessage, Envelope, LogEntry, Proposal};
use crate::transport::Transport;
use crossbeam_channel::{bounded, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Applies committed commands to the local state machine (the storage
/// engine, in practice). Kept as a trait so this crate has no compile-time
/// dependency on `engine`.
pub trait ApplySink: Send + Sync {
    fn apply(&self, command: &Command) -> anyhow::Result<()>;
}

const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Follower,
    Candidate,
    Leader,
}

struct LeaderState {
    next_index: HashMap<String, u64>,
    match_index: HashMap<String, u64>,
    /// Followers that have sent a successful `AppendEntriesResponse` since
    /// the current check-quorum window started. Consulted only when
    /// `check_quorum` is enabled.
    acked_in_window: HashSet<String>,
    /// Ticks elapsed in the current check-quorum window.
    quorum_check_ticks: u32,
}

struct Inner {
    role: Role,
    current_term: u64,
    voted_for: Option<String>,
    log: Vec<LogEntry>,
    commit_index: u64,
    last_applied: u64,
    leader_id: Option<String>,
    elapsed_ticks: u32,
    votes_received: HashSet<String>,
    pre_vote_phase: bool,
    leader_state: Option<LeaderState>,
}

impl Inner {
    fn last_log_index(&self) -> u64 {
        self.log.last().map(|e| e.index).unwrap_or(0)
    }

    fn last_log_term(&self) -> u64 {
        self.log.last().map(|e| e.term).unwrap_or(0)
    }

    fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.log.iter().find(|e| e.index == index).map(|e| e.term)
    }
}

/// The replicated state machine driver. Every method takes `&self`; a
/// single internal `Mutex<Inner>` serializes state transitions.
pub struct ConsensusNode {
    id: String,
    peer_ids: Vec<String>,
    inner: Mutex<Inner>,
    transport: Arc<dyn Transport>,
    apply_sink: Arc<dyn ApplySink>,
    apply_filter: RwLock<Box<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    waiters: Mutex<HashMap<Uuid, Sender<Result<(), RaftError>>>>,
    election_tick: u32,
    heartbeat_tick: u32,
    execute_timeout: Duration,
    /// If `true`, an election timeout starts a pre-vote round (probing
    /// whether a real election could win) before bumping the term and
    /// requesting real votes. If `false`, timeout goes straight to a real
    /// election.
    pre_vote: bool,
    /// If `true`, a leader that hasn't heard a successful heartbeat
    /// response from a quorum of followers within an `election_tick`
    /// window steps down to follower — guards against a partitioned
    /// leader serving stale reads while the rest of the cluster has moved
    /// on and elected someone else.
    check_quorum: bool,
    /// Set once a committed entry fails to apply. spec.md treats this as a
    /// consistency violation: fatal to the node, so the run loop stops and
    /// no further entries are applied or proposed.
    stopped: AtomicBool,
}

impl ConsensusNode {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        peer_ids: Vec<String>,
        transport: Arc<dyn Transport>,
        apply_sink: Arc<dyn ApplySink>,
        election_tick: u32,
        heartbeat_tick: u32,
        pre_vote: bool,
        check_quorum: bool,
    ) -> Self {
        Self {
            id: id.into(),
            peer_ids,
            inner: Mutex::new(Inner {
                role: Role::Follower,
                current_term: 0,
                voted_for: None,
                log: Vec::new(),
                commit_index: 0,
                last_applied: 0,
                leader_id: None,
                elapsed_ticks: 0,
                votes_received: HashSet::new(),
                pre_vote_phase: false,
                leader_state: None,
            }),
            transport,
            apply_sink,
            apply_filter: RwLock::new(Box::new(|_| true)),
            waiters: Mutex::new(HashMap::new()),
            election_tick,
            heartbeat_tick,
            execute_timeout: Duration::from_millis(u64::from(election_tick) * TICK_INTERVAL.as_millis() as u64 * 2),
            pre_vote,
            check_quorum,
            stopped: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Installs the predicate deciding whether a committed entry's key is
    /// applied to the local engine. Entries the filter rejects still
    /// signal the leader's waiter (if any) without touching the engine.
    pub fn set_apply_filter(&self, filter: impl Fn(&[u8]) -> bool + Send + Sync + 'static) {
        *self.apply_filter.write().unwrap() = Box::new(filter);
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        matches!(self.inner.lock().unwrap().role, Role::Leader)
    }

    #[must_use]
    pub fn leader_addr_hint(&self) -> Option<String> {
        self.inner.lock().unwrap().leader_id.clone()
    }

    /// Whether this node has hit a fatal apply error and stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Proposes `command` to the log. On the leader, blocks until this
    /// node has applied the resulting entry (or the apply filter rejected
    /// it, which still completes the wait) or `execute_timeout` elapses.
    /// On a non-leader, fails immediately with a leader hint if known.
    pub fn execute(&self, command: Command) -> Result<(), RaftError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(RaftError::NodeStopped);
        }

        let proposal_id = Uuid::new_v4();
        let (tx, rx) = bounded(1);

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.role != Role::Leader {
                return Err(RaftError::NotLeader { leader_hint: inner.leader_id.clone() });
            }
            let entry = LogEntry {
                term: inner.current_term,
                index: inner.last_log_index() + 1,
                proposal: Proposal { id: proposal_id, command },
            };
            inner.log.push(entry);
            // A leader counts its own log as matched without waiting for a
            // round trip; this is what lets a single-node group (no peers)
            // commit at all.
            Self::recompute_commit_index(&mut inner);
            self.waiters.lock().unwrap().insert(proposal_id, tx);
        }

        self.replicate_to_peers();

        match rx.recv_timeout(self.execute_timeout) {
            Ok(result) => result,
            Err(_) => {
                self.waiters.lock().unwrap().remove(&proposal_id);
                Err(RaftError::ProposalTimedOut)
            }
        }
    }

    /// Feeds an incoming consensus message to the state machine.
    pub fn handle(&self, envelope: Envelope) {
        match envelope.payload {
            ConsensusMessage::RequestVote { term, candidate_id, last_log_index, last_log_term, pre_vote } => {
                self.handle_request_vote(term, candidate_id, last_log_index, last_log_term, pre_vote);
            }
            ConsensusMessage::RequestVoteResponse { term, voter_id, vote_granted, pre_vote } => {
                self.handle_request_vote_response(term, voter_id, vote_granted, pre_vote);
            }
            ConsensusMessage::AppendEntries { term, leader_id, prev_log_index, prev_log_term, entries, leader_commit } => {
                self.handle_append_entries(term, leader_id, prev_log_index, prev_log_term, entries, leader_commit);
            }
            ConsensusMessage::AppendEntriesResponse { term, follower_id, success, match_index } => {
                self.handle_append_entries_response(term, follower_id, success, match_index);
            }
        }
    }

    /// Drives the tick/ready/advance loop until `running` is cleared.
    /// `Tick` fires every `TICK_INTERVAL`; on each tick this advances
    /// election/heartbeat timers and applies any newly committed entries
    /// in order, one at a time.
    pub fn run(&self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) && !self.stopped.load(Ordering::Relaxed) {
            std::thread::sleep(TICK_INTERVAL);
            self.tick();
        }
        if self.stopped.load(Ordering::Relaxed) {
            tracing::error!(node = %self.id, "raft: run loop stopped after a fatal apply error");
        }
    }

    fn tick(&self) {
        let became_candidate = {
            let mut inner = self.inner.lock().unwrap();
            inner.elapsed_ticks += 1;

            if self.check_quorum && inner.role == Role::Leader {
                self.tick_check_quorum(&mut inner);
            }

            match inner.role {
                Role::Leader => {
                    if inner.elapsed_ticks >= self.heartbeat_tick {
                        inner.elapsed_ticks = 0;
                        true // reuse the flag to mean "send now"
                    } else {
                        false
                    }
                }
                Role::Follower | Role::Candidate => inner.elapsed_ticks >= self.election_tick,
            }
        };

        let role = self.inner.lock().unwrap().role;
        if role == Role::Leader {
            if became_candidate {
                self.replicate_to_peers();
            }
        } else if became_candidate {
            self.start_election(self.pre_vote);
        }

        self.apply_committed();
    }

    /// Steps the leader's check-quorum window: if an `election_tick`
    /// window has elapsed without hearing a successful heartbeat response
    /// from a quorum of followers, steps down to follower. A single-node
    /// group (no peers) is always its own quorum and never steps down.
    fn tick_check_quorum(&self, inner: &mut Inner) {
        let Some(leader_state) = inner.leader_state.as_mut() else { return };
        leader_state.quorum_check_ticks += 1;
        if leader_state.quorum_check_ticks < self.election_tick {
            return;
        }
        leader_state.quorum_check_ticks = 0;
        let quorum = (self.peer_ids.len() + 1) / 2 + 1;
        let heard_from = leader_state.acked_in_window.len() + 1; // leader counts itself
        leader_state.acked_in_window.clear();
        if heard_from < quorum {
            tracing::warn!(node = %self.id, "raft: check-quorum failed, stepping down to follower");
            inner.role = Role::Follower;
            inner.leader_id = None;
            inner.leader_state = None;
            inner.elapsed_ticks = 0;
        }
    }

    fn start_election(&self, pre_vote: bool) {
        let (term, last_log_index, last_log_term) = {
            let mut inner = self.inner.lock().unwrap();
            inner.elapsed_ticks = 0;
            inner.role = Role::Candidate;
            inner.votes_received.clear();
            inner.votes_received.insert(self.id.clone());
            inner.pre_vote_phase = pre_vote;
            if !pre_vote {
                inner.current_term += 1;
                inner.voted_for = Some(self.id.clone());
            }
            (inner.current_term, inner.last_log_index(), inner.last_log_term())
        };

        for peer in &self.peer_ids {
            let envelope = Envelope {
                from: self.id.clone(),
                to: peer.clone(),
                payload: ConsensusMessage::RequestVote {
                    term: if pre_vote { term + 1 } else { term },
                    candidate_id: self.id.clone(),
                    last_log_index,
                    last_log_term,
                    pre_vote,
                },
            };
            self.send_best_effort(envelope);
        }

        if self.peer_ids.is_empty() {
            // single-node group: an immediate quorum of one.
            if pre_vote {
                self.start_election(false);
            } else {
                self.become_leader();
            }
        }
    }

    fn become_leader(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.role = Role::Leader;
        inner.leader_id = Some(self.id.clone());
        let next = inner.last_log_index() + 1;
        inner.leader_state = Some(LeaderState {
            next_index: self.peer_ids.iter().map(|p| (p.clone(), next)).collect(),
            match_index: self.peer_ids.iter().map(|p| (p.clone(), 0)).collect(),
            acked_in_window: HashSet::new(),
            quorum_check_ticks: 0,
        });
        inner.elapsed_ticks = 0;
        tracing::info!(node = %self.id, term = inner.current_term, "raft: became leader");
    }

    fn handle_request_vote(&self, term: u64, candidate_id: String, last_log_index: u64, last_log_term: u64, pre_vote: bool) {
        let (grant, response_term) = {
            let mut inner = self.inner.lock().unwrap();
            let effective_term = if pre_vote { term - 1 } else { term };
            if effective_term > inner.current_term && !pre_vote {
                inner.current_term = effective_term;
                inner.voted_for = None;
                inner.role = Role::Follower;
            }

            let log_ok = last_log_term > inner.last_log_term()
                || (last_log_term == inner.last_log_term() && last_log_index >= inner.last_log_index());
            let term_ok = effective_term >= inner.current_term;
            let vote_available = pre_vote || inner.voted_for.is_none() || inner.voted_for.as_deref() == Some(candidate_id.as_str());

            let grant = term_ok && log_ok && vote_available;
            if grant && !pre_vote {
                inner.voted_for = Some(candidate_id.clone());
                inner.elapsed_ticks = 0;
            }
            (grant, inner.current_term)
        };

        self.send_best_effort(Envelope {
            from: self.id.clone(),
            to: candidate_id,
            payload: ConsensusMessage::RequestVoteResponse {
                term: response_term,
                voter_id: self.id.clone(),
                vote_granted: grant,
                pre_vote,
            },
        });
    }

    fn handle_request_vote_response(&self, term: u64, voter_id: String, vote_granted: bool, pre_vote: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.role != Role::Candidate || inner.pre_vote_phase != pre_vote {
            return;
        }
        let relevant_term = if pre_vote { term + 1 } else { term };
        if relevant_term != inner.current_term && !pre_vote {
            return;
        }
        if !vote_granted {
            return;
        }
        inner.votes_received.insert(voter_id);
        let quorum = (self.peer_ids.len() + 1) / 2 + 1;
        if inner.votes_received.len() >= quorum {
            drop(inner);
            if pre_vote {
                self.start_election(false);
            } else {
                self.become_leader();
            }
        }
    }

    fn handle_append_entries(&self, term: u64, leader_id: String, prev_log_index: u64, prev_log_term: u64, entries: Vec<LogEntry>, leader_commit: u64) {
        let (success, match_index, response_term) = {
            let mut inner = self.inner.lock().unwrap();
            if term < inner.current_term {
                (false, 0, inner.current_term)
            } else {
                inner.current_term = term;
                inner.role = Role::Follower;
                inner.leader_id = Some(leader_id);
                inner.elapsed_ticks = 0;

                match inner.term_at(prev_log_index) {
                    Some(t) if t == prev_log_term => {
                        inner.log.retain(|e| e.index <= prev_log_index);
                        for entry in entries {
                            inner.log.push(entry);
                        }
                        let new_last = inner.last_log_index();
                        if leader_commit > inner.commit_index {
                            inner.commit_index = leader_commit.min(new_last);
                        }
                        (true, new_last, inner.current_term)
                    }
                    _ => (false, 0, inner.current_term),
                }
            }
        };

        self.send_best_effort(Envelope {
            from: self.id.clone(),
            to: {
                let inner = self.inner.lock().unwrap();
                inner.leader_id.clone().unwrap_or_default()
            },
            payload: ConsensusMessage::AppendEntriesResponse {
                term: response_term,
                follower_id: self.id.clone(),
                success,
                match_index,
            },
        });
    }

    fn handle_append_entries_response(&self, term: u64, follower_id: String, success: bool, match_index: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.role != Role::Leader || term != inner.current_term {
            return;
        }
        let Some(leader_state) = inner.leader_state.as_mut() else { return };
        if success {
            leader_state.acked_in_window.insert(follower_id.clone());
            leader_state.match_index.insert(follower_id.clone(), match_index);
            leader_state.next_index.insert(follower_id, match_index + 1);
        } else if let Some(next) = leader_state.next_index.get_mut(&follower_id) {
            *next = next.saturating_sub(1).max(1);
        }

        Self::recompute_commit_index(&mut inner);
    }

    /// The highest index replicated to a majority (leader counts its own
    /// log), committed only if its term matches the leader's current term
    /// (the standard Raft safety rule against committing a previous
    /// leader's uncommitted entries by count alone).
    fn recompute_commit_index(inner: &mut Inner) {
        let Some(leader_state) = inner.leader_state.as_ref() else { return };
        let mut match_indices: Vec<u64> = leader_state.match_index.values().copied().collect();
        match_indices.push(inner.last_log_index());
        match_indices.sort_unstable();
        let majority_index = match_indices[match_indices.len() / 2];

        if majority_index > inner.commit_index {
            if let Some(entry_term) = inner.term_at(majority_index) {
                if entry_term == inner.current_term {
                    inner.commit_index = majority_index;
                }
            }
        }
    }

    fn replicate_to_peers(&self) {
        let inner = self.inner.lock().unwrap();
        if inner.role != Role::Leader {
            return;
        }
        let Some(leader_state) = inner.leader_state.as_ref() else { return };
        let term = inner.current_term;
        let commit_index = inner.commit_index;

        for peer in &self.peer_ids {
            let next_index = *leader_state.next_index.get(peer).unwrap_or(&1);
            let prev_log_index = next_index.saturating_sub(1);
            let prev_log_term = inner.term_at(prev_log_index).unwrap_or(0);
            let entries: Vec<LogEntry> = inner.log.iter().filter(|e| e.index >= next_index).cloned().collect();

            let envelope = Envelope {
                from: self.id.clone(),
                to: peer.clone(),
                payload: ConsensusMessage::AppendEntries {
                    term,
                    leader_id: self.id.clone(),
                    prev_log_index,
                    prev_log_term,
                    entries,
                    leader_commit: commit_index,
                },
            };
            drop_and_send(&self.transport, envelope);
        }
    }

    fn apply_committed(&self) {
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return;
            }

            let entry = {
                let mut inner = self.inner.lock().unwrap();
                if inner.last_applied >= inner.commit_index {
                    return;
                }
                let next_index = inner.last_applied + 1;
                let Some(entry) = inner.log.iter().find(|e| e.index == next_index).cloned() else {
                    return;
                };
                inner.last_applied = next_index;
                entry
            };

            let apply_locally = (self.apply_filter.read().unwrap())(entry.proposal.command.key());
            let result = if apply_locally {
                self.apply_sink.apply(&entry.proposal.command).map_err(|e| RaftError::ApplyFailed(e.to_string()))
            } else {
                Ok(())
            };

            let to_send = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(RaftError::ApplyFailed(e.to_string())),
            };
            if let Some(waiter) = self.waiters.lock().unwrap().remove(&entry.proposal.id) {
                let _ = waiter.send(to_send);
            }

            if let Err(e) = result {
                tracing::error!(error = %e, node = %self.id, "raft: apply failed, consistency violation — stopping this node's run loop");
                self.stopped.store(true, Ordering::Relaxed);
                return;
            }
        }
    }

    fn send_best_effort(&self, envelope: Envelope) {
        if envelope.to.is_empty() || envelope.to == self.id {
            return;
        }
        drop_and_send(&self.transport, envelope);
    }
}

fn drop_and_send(transport: &Arc<dyn Transport>, envelope: Envelope) {
    if let Err(e) = transport.send(&envelope) {
        tracing::warn!(to = %envelope.to, error = %e, "raft: best-effort send failed");
    }
}

#[cfg(test)]
mod tests;

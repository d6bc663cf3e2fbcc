//! Best-effort, in-order-per-sender delivery of consensus messages between
//! peers. [`HttpTransport`] posts JSON envelopes to a peer's
//! `POST /api/internal/raft` endpoint with a fixed per-attempt timeout and
//! retries with backoff on transport errors.

use crate::error::RaftError;
use crate::message::Envelope;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Capability the consensus node needs to deliver messages to peers.
pub trait Transport: Send + Sync {
    /// Sends `envelope` to the peer named by `envelope.to`. Must not be
    /// called with `envelope.to == envelope.from` — callers are
    /// responsible for filtering self-addressed messages before reaching
    /// the transport.
    fn send(&self, envelope: &Envelope) -> Result<(), RaftError>;

    fn add_peer(&self, id: String, addr: String);
    fn remove_peer(&self, id: &str);
    fn update_peer(&self, id: String, addr: String);
}

/// A retrying, blocking HTTP transport built on `ureq`.
pub struct HttpTransport {
    peers: RwLock<HashMap<String, String>>,
    per_attempt_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HttpTransport {
    #[must_use]
    pub fn new(per_attempt_timeout: Duration, max_attempts: u32, backoff_base: Duration) -> Self {
        Self { peers: RwLock::new(HashMap::new()), per_attempt_timeout, max_attempts, backoff_base }
    }

    fn addr_of(&self, peer_id: &str) -> Option<String> {
        self.peers.read().unwrap().get(peer_id).cloned()
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 3, Duration::from_millis(50))
    }
}

impl Transport for HttpTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), RaftError> {
        if envelope.to == envelope.from {
            return Err(RaftError::SelfSend(envelope.to.clone()));
        }
        let Some(addr) = self.addr_of(&envelope.to) else {
            return Err(RaftError::Transport {
                peer: envelope.to.clone(),
                source: anyhow::anyhow!("no known address for peer {}", envelope.to),
            });
        };
        let url = format!("http://{addr}/api/internal/raft");

        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                std::thread::sleep(self.backoff_base * attempt);
            }
            let result = ureq::post(&url).timeout(self.per_attempt_timeout).send_json(
                serde_json::to_value(envelope)
                    .map_err(|e| RaftError::Transport { peer: envelope.to.clone(), source: e.into() })?,
            );
            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(peer = %envelope.to, attempt, error = %e, "raft transport: delivery attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(RaftError::Transport {
            peer: envelope.to.clone(),
            source: anyhow::anyhow!(last_err.unwrap()),
        })
    }

    fn add_peer(&self, id: String, addr: String) {
        self.peers.write().unwrap().insert(id, addr);
    }

    fn remove_peer(&self, id: &str) {
        self.peers.write().unwrap().remove(id);
    }

    fn update_peer(&self, id: String, addr: String) {
        self.peers.write().unwrap().insert(id, addr);
    }
}

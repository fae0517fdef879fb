//! Per-session ordering of commentary requests. A newer request on a session
//! supersedes every older one still in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::error::Error;

/// Idle sessions kept before the table is pruned.
const MAX_IDLE_SESSIONS: usize = 1024;

/// Largest sequence number a client may choose. Assigned numbers may go
/// past it, so a client can never exhaust its session.
const MAX_CLIENT_SEQUENCE: u64 = 1 << 32;

/// Latest sequence number per session.
#[derive(Debug)]
pub struct RequestSequencer {
    /// Sessions with no request in flight kept before pruning.
    idle_limit: usize,
    /// One watch channel per session; the value is the latest sequence seen.
    sessions: Mutex<HashMap<String, watch::Sender<u64>>>,
}

/// A request's place in its session.
#[derive(Debug)]
pub struct Ticket {
    /// Follows the session's latest sequence number.
    latest: watch::Receiver<u64>,
    /// This request's sequence number.
    sequence: u64,
    /// Session identifier.
    session: String,
}

impl Default for RequestSequencer {
    fn default() -> Self {
        return Self::with_idle_limit(MAX_IDLE_SESSIONS);
    }
}

impl RequestSequencer {
    /// Sequencer that prunes idle sessions once more than `idle_limit` are known.
    pub fn with_idle_limit(idle_limit: usize) -> Self {
        return Self { idle_limit, sessions: Mutex::new(HashMap::new()) };
    }

    /// Register a request. Without an explicit sequence the request gets the
    /// next number after the session's latest.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if a request with the same or a higher
    /// sequence number already arrived on this session, and
    /// `Error::InvalidRequest` for a sequence above the client maximum.
    pub fn begin(&self, session: &str, sequence: Option<u64>) -> Result<Ticket, Error> {
        if let Some(requested) = sequence
            && requested > MAX_CLIENT_SEQUENCE
        {
            return Err(Error::InvalidRequest {
                reason: format!("sequence must not exceed {MAX_CLIENT_SEQUENCE}"),
            });
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.contains_key(session) && sessions.len() >= self.idle_limit {
            sessions.retain(|_, sender| return sender.receiver_count() > 0);
            tracing::debug!(remaining = sessions.len(), "pruned idle commentary sessions");
        }
        let sender = sessions
            .entry(session.to_string())
            .or_insert_with(|| return watch::channel(0).0);

        let latest = *sender.borrow();
        let sequence = match sequence {
            Some(requested) => requested,
            None => latest.checked_add(1).ok_or_else(|| {
                return Error::InvalidRequest { reason: "session sequence exhausted".to_string() };
            })?,
        };
        if sequence <= latest {
            tracing::debug!(session, sequence, latest, "stale commentary request rejected");
            return Err(Error::Superseded { latest, sequence, session: session.to_string() });
        }

        sender.send_replace(sequence);
        return Ok(Ticket { latest: sender.subscribe(), sequence, session: session.to_string() });
    }
}

impl Ticket {
    /// This request's sequence number.
    pub const fn sequence(&self) -> u64 {
        return self.sequence;
    }

    /// Whether a newer request has arrived on the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if so.
    pub fn check(&self) -> Result<(), Error> {
        let latest = *self.latest.borrow();
        if latest > self.sequence {
            return Err(self.superseded_by(latest));
        }
        return Ok(());
    }

    /// Run `work` unless a newer request arrives first, in which case `work`
    /// is dropped and `Error::Superseded` is returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded`, or whatever `work` returns.
    pub async fn run<T, F>(self, work: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let sequence = self.sequence;
        let mut watcher = self.latest.clone();
        tokio::select! {
            biased;
            changed = watcher.wait_for(|latest| return *latest > sequence) => {
                let latest = match changed {
                    Ok(latest) => *latest,
                    Err(_closed) => sequence,
                };
                tracing::debug!(session = %self.session, sequence, latest, "in-flight commentary request superseded");
                return Err(self.superseded_by(latest));
            },
            result = work => {
                self.check()?;
                return result;
            },
        }
    }

    /// The error reported for this ticket.
    fn superseded_by(&self, latest: u64) -> Error {
        return Error::Superseded { latest, sequence: self.sequence, session: self.session.clone() };
    }
}

//! Recovery of interrupted decryption sessions.
//!
//! When an approved request's decryption session is interrupted, a quorum of
//! the same committee submits recovery codes instead of re-running the
//! approval flow. Once exactly `required_quorum` distinct members have
//! submitted, the codes go to the [`SecretReconstructor`].
//!
//! ```text
//! Idle -> Scanning --first code--> Recovering --quorum--> Completed
//!             |                        |
//!             +--------timeout---------+-----rejected---> Failed
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::committee::CommitteeCoordinator;
use crate::config::{deadline_after, RecoveryConfig};
use crate::events::{CustodyEvent, EventBus};
use crate::reconstruct::{ReconstructedSecret, RecoveryShare, SecretReconstructor};
use crate::types::{AccessStatus, CustodyError, Identity, Result};

/// Recovery session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// Being constructed
    Idle,
    /// Waiting for the first code
    Scanning,
    /// Collecting codes
    Recovering,
    /// Quorum reached and secret reconstructed
    Completed,
    /// Timed out or reconstruction rejected
    Failed,
}

impl RecoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether codes are still accepted.
    pub fn accepts_codes(&self) -> bool {
        matches!(self, Self::Scanning | Self::Recovering)
    }
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryFailure {
    /// Quorum not reached in time
    QuorumTimeout,
    /// The reconstructor refused the collected codes
    ReconstructionRejected(String),
}

/// A recovery session for one approved request.
#[derive(Debug, Clone, Serialize)]
pub struct RecoverySession {
    /// Unique session ID
    pub id: String,
    /// Approved request being recovered
    pub original_request_id: String,
    /// Requester of the original request
    pub requester: Identity,
    /// Current state
    pub state: RecoveryState,
    /// Committee of the original request
    pub committee: Vec<Identity>,
    /// Codes required (the original threshold)
    pub required_quorum: u32,
    /// Collected codes as a percentage of the quorum, capped at 100
    pub progress_percent: u8,
    /// Set when the session failed
    pub failure: Option<RecoveryFailure>,
    /// Whether the requester has collected the secret
    pub secret_claimed: bool,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session completed or failed
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    shares: Vec<RecoveryShare>,
}

impl RecoverySession {
    /// Members that have submitted, in submission order.
    pub fn contributors(&self) -> Vec<Identity> {
        self.shares.iter().map(|s| s.identity.clone()).collect()
    }

    /// Number of codes collected.
    pub fn collected(&self) -> usize {
        self.shares.len()
    }

    fn has_submitted(&self, identity: &Identity) -> bool {
        self.shares.iter().any(|s| &s.identity == identity)
    }

    fn recompute_progress(&mut self) {
        let quorum = self.required_quorum.max(1) as usize;
        self.progress_percent = (100 * self.shares.len() / quorum).min(100) as u8;
    }

    fn fail(&mut self, reason: RecoveryFailure) {
        self.state = RecoveryState::Failed;
        self.failure = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    /// Open past the timeout. A timeout too large to represent never elapses.
    fn is_stalled(&self, timeout_secs: u64, now: DateTime<Utc>) -> bool {
        self.state.accepts_codes()
            && deadline_after(self.started_at, timeout_secs).is_some_and(|d| d <= now)
    }
}

/// Collects recovery codes and drives reconstruction.
pub struct RecoveryCoordinator {
    committee: Arc<CommitteeCoordinator>,
    reconstructor: Arc<dyn SecretReconstructor>,
    config: RecoveryConfig,
    events: EventBus,
    sessions: DashMap<String, Arc<Mutex<RecoverySession>>>,
    /// Reconstructed secrets awaiting their requester
    secrets: DashMap<String, ReconstructedSecret>,
}

impl RecoveryCoordinator {
    /// Create a coordinator sharing the committee coordinator's event bus.
    pub fn new(
        committee: Arc<CommitteeCoordinator>,
        reconstructor: Arc<dyn SecretReconstructor>,
        config: RecoveryConfig,
    ) -> Self {
        let events = committee.events().clone();
        Self {
            committee,
            reconstructor,
            config,
            events,
            sessions: DashMap::new(),
            secrets: DashMap::new(),
        }
    }

    /// Open a session for an approved request.
    pub async fn initiate(&self, original_request_id: &str) -> Result<RecoverySession> {
        let request = self.committee.request(original_request_id).await?;
        if request.status != AccessStatus::Approved {
            return Err(CustodyError::OriginalRequestNotApproved {
                request_id: original_request_id.to_string(),
                status: request.status,
            });
        }

        let mut session = RecoverySession {
            id: uuid::Uuid::new_v4().to_string(),
            original_request_id: request.id.clone(),
            requester: request.requester.clone(),
            state: RecoveryState::Idle,
            committee: request.committee.iter().map(|m| m.identity.clone()).collect(),
            required_quorum: request.threshold,
            progress_percent: 0,
            failure: None,
            secret_claimed: false,
            started_at: Utc::now(),
            finished_at: None,
            shares: Vec::new(),
        };
        session.state = RecoveryState::Scanning;

        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));

        info!(
            session_id = %session.id,
            request_id = %original_request_id,
            quorum = session.required_quorum,
            "Recovery session started"
        );

        Ok(session)
    }

    /// Record one member's recovery code.
    ///
    /// The submission that reaches the quorum runs reconstruction before the
    /// session lock is released, so the reconstructor always sees exactly
    /// `required_quorum` codes.
    pub async fn submit_recovery_code(
        &self,
        session_id: &str,
        identity: &Identity,
        code: &str,
    ) -> Result<RecoverySession> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;

        if !session.state.accepts_codes() {
            return Err(CustodyError::SessionTerminal {
                session_id: session_id.to_string(),
                state: session.state,
            });
        }
        if session.is_stalled(self.config.quorum_timeout_secs, Utc::now()) {
            self.fail(&mut session, RecoveryFailure::QuorumTimeout);
            return Err(CustodyError::QuorumTimeout(session_id.to_string()));
        }
        if !session.committee.contains(identity) {
            return Err(CustodyError::NotACommitteeMember {
                request_id: session.original_request_id.clone(),
                identity: identity.clone(),
            });
        }
        if session.has_submitted(identity) {
            return Err(CustodyError::DuplicateSubmission {
                session_id: session_id.to_string(),
                identity: identity.clone(),
            });
        }

        session.shares.push(RecoveryShare::new(identity.clone(), code));
        session.recompute_progress();
        if session.state == RecoveryState::Scanning {
            session.state = RecoveryState::Recovering;
        }

        debug!(
            session_id = %session_id,
            member = %identity,
            collected = session.collected(),
            quorum = session.required_quorum,
            "Recovery code recorded"
        );

        if session.collected() < session.required_quorum as usize {
            return Ok(session.clone());
        }

        let outcome = self
            .reconstructor
            .reconstruct(&session.original_request_id, &session.shares)
            .await;
        match outcome {
            Ok(secret) => {
                session.state = RecoveryState::Completed;
                session.finished_at = Some(Utc::now());
                self.secrets.insert(session.id.clone(), secret);

                info!(
                    session_id = %session_id,
                    request_id = %session.original_request_id,
                    "Recovery completed"
                );
                self.events.publish(CustodyEvent::RecoveryCompleted {
                    session_id: session.id.clone(),
                    original_request_id: session.original_request_id.clone(),
                });
                Ok(session.clone())
            }
            Err(e) => {
                self.fail(&mut session, RecoveryFailure::ReconstructionRejected(e.to_string()));
                Err(CustodyError::ReconstructionRejected(e))
            }
        }
    }

    /// Fail a session that did not reach quorum in time.
    pub async fn fail_on_timeout(&self, session_id: &str) -> Result<RecoverySession> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;

        if session.state.is_terminal() {
            return Err(CustodyError::SessionTerminal {
                session_id: session_id.to_string(),
                state: session.state,
            });
        }
        self.fail(&mut session, RecoveryFailure::QuorumTimeout);
        Ok(session.clone())
    }

    /// Fail every open session older than the quorum timeout.
    ///
    /// Returns the IDs that were failed.
    pub async fn expire_stalled(&self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = self.config.quorum_timeout_secs;
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut failed = Vec::new();
        for handle in handles {
            let mut session = handle.lock().await;
            if session.is_stalled(timeout, now) {
                self.fail(&mut session, RecoveryFailure::QuorumTimeout);
                failed.push(session.id.clone());
            }
        }
        failed
    }

    /// Snapshot of a session.
    pub async fn session(&self, session_id: &str) -> Result<RecoverySession> {
        let handle = self.handle(session_id)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Hand the reconstructed secret to the original requester, once.
    pub async fn claim_secret(
        &self,
        session_id: &str,
        requester: &Identity,
    ) -> Result<ReconstructedSecret> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;

        if &session.requester != requester {
            return Err(CustodyError::NotRequester {
                request_id: session.original_request_id.clone(),
                identity: requester.clone(),
            });
        }
        if session.state != RecoveryState::Completed {
            return Err(CustodyError::SessionIncomplete {
                session_id: session_id.to_string(),
                state: session.state,
            });
        }

        let (_, secret) = self
            .secrets
            .remove(session_id)
            .ok_or_else(|| CustodyError::SecretAlreadyClaimed(session_id.to_string()))?;
        session.secret_claimed = true;

        info!(session_id = %session_id, requester = %requester, "Recovered secret claimed");
        Ok(secret)
    }

    fn handle(&self, session_id: &str) -> Result<Arc<Mutex<RecoverySession>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CustodyError::SessionNotFound(session_id.to_string()))
    }

    fn fail(&self, session: &mut RecoverySession, reason: RecoveryFailure) {
        warn!(
            session_id = %session.id,
            request_id = %session.original_request_id,
            collected = session.collected(),
            reason = ?reason,
            "Recovery failed"
        );
        session.fail(reason.clone());
        self.events.publish(CustodyEvent::RecoveryFailed {
            session_id: session.id.clone(),
            original_request_id: session.original_request_id.clone(),
            reason,
        });
    }
}

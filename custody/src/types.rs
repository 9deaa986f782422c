//! Core types for committee custody.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use record_cache::CacheError;
use reputation::{ReputationRecord, Tier};

use crate::dispute::DisputeStatus;
use crate::reconstruct::ReconstructionError;
use crate::recovery::RecoveryState;

/// Opaque public identifier of a requester or committee member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a public key or other stable identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A candidate committee member as reported by the external ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    /// Member identity
    pub identity: Identity,
    /// Validations performed
    pub total_validations: u64,
    /// Validations later confirmed accurate
    pub accurate_validations: u64,
}

impl PoolMember {
    /// Create a pool entry.
    pub fn new(identity: impl Into<Identity>, total_validations: u64, accurate_validations: u64) -> Self {
        Self {
            identity: identity.into(),
            total_validations,
            accurate_validations,
        }
    }

    /// Reputation counters for this member.
    pub fn record(&self) -> ReputationRecord {
        ReputationRecord::new(self.total_validations, self.accurate_validations)
    }
}

/// Lifecycle of an access request.
///
/// `Pending -> Active -> {Approved | Rejected | Expired}`. The last three are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Being constructed, never observable by callers
    Pending,
    /// Collecting approvals
    Active,
    /// Threshold reached, decryption authorized
    Approved,
    /// Refused by an authority
    Rejected,
    /// Timed out before reaching threshold
    Expired,
}

impl AccessStatus {
    /// Whether no further transition can leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    /// Whether `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: AccessStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Approved)
                | (Self::Active, Self::Rejected)
                | (Self::Active, Self::Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One seat on a request's committee.
///
/// Owned by its request; the same identity on another request is a
/// distinct member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    /// Member identity
    pub identity: Identity,
    /// Tier at selection time
    pub tier: Tier,
    /// Governance weight at selection time
    pub weight: u32,
    /// Whether this member has approved
    pub has_approved: bool,
    /// When the approval was recorded
    pub approved_at: Option<DateTime<Utc>>,
}

impl CommitteeMember {
    pub(crate) fn seat(identity: Identity, tier: Tier) -> Self {
        Self {
            identity,
            tier,
            weight: tier.weight(),
            has_approved: false,
            approved_at: None,
        }
    }
}

/// Request to release access to an encrypted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Unique request ID
    pub id: String,
    /// Record whose access is requested
    pub target_record_id: String,
    /// Who asked
    pub requester: Identity,
    /// Why access is needed
    pub justification: String,
    /// Selected committee, fixed at creation
    pub committee: Vec<CommitteeMember>,
    /// Approvals required (K of N)
    pub threshold: u32,
    /// Current status
    pub status: AccessStatus,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// When the request reached a terminal status
    pub decided_at: Option<DateTime<Utc>>,
    /// Authority that rejected the request
    pub rejected_by: Option<Identity>,
    /// Reason given on rejection
    pub rejection_reason: Option<String>,
}

impl AccessRequest {
    /// Number of committee members that have approved.
    pub fn approval_count(&self) -> usize {
        self.committee.iter().filter(|m| m.has_approved).count()
    }

    /// Sum of approving members' weights.
    pub fn approval_weight(&self) -> u32 {
        self.committee
            .iter()
            .filter(|m| m.has_approved)
            .map(|m| m.weight)
            .sum()
    }

    /// Whether the approval count has reached the threshold.
    pub fn threshold_reached(&self) -> bool {
        self.approval_count() >= self.threshold as usize
    }

    /// Look up a committee seat.
    pub fn member(&self, identity: &Identity) -> Option<&CommitteeMember> {
        self.committee.iter().find(|m| &m.identity == identity)
    }

    /// Whether `identity` sits on this committee.
    pub fn is_member(&self, identity: &Identity) -> bool {
        self.member(identity).is_some()
    }

    /// Identities that have approved, in committee order.
    pub fn approvers(&self) -> Vec<Identity> {
        self.committee
            .iter()
            .filter(|m| m.has_approved)
            .map(|m| m.identity.clone())
            .collect()
    }

    /// Move to `next`, refusing anything but a forward transition.
    pub(crate) fn advance(&mut self, next: AccessStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CustodyError::RequestNotActive {
                request_id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.decided_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Result of a recorded approval.
#[derive(Debug, Clone)]
pub struct Approval {
    /// Request after the approval was applied
    pub request: AccessRequest,
    /// True only for the approval that moved the request to `Approved`
    pub newly_authorized: bool,
}

/// Committee dimensions for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeShape {
    /// Committee size (N)
    pub size: usize,
    /// Approvals required (K)
    pub threshold: u32,
}

impl CommitteeShape {
    pub fn new(size: usize, threshold: u32) -> Self {
        Self { size, threshold }
    }
}

/// Error types for committee custody.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    /// Justification text outside the allowed length
    #[error("Justification must be {min}-{max} characters, got {actual}")]
    InvalidJustification { min: usize, max: usize, actual: usize },

    /// Not enough eligible members to seat a committee
    #[error("Committee needs {required} eligible members, pool has {available}")]
    InsufficientCommitteePool { required: usize, available: usize },

    /// Threshold outside `1..=committee size`
    #[error("Threshold {threshold} invalid for committee of {committee_size}")]
    InvalidThreshold { threshold: u32, committee_size: usize },

    /// Same identity listed twice in a member pool
    #[error("Identity {0} appears more than once in the member pool")]
    DuplicatePoolMember(Identity),

    /// Unknown access request
    #[error("Access request not found: {0}")]
    RequestNotFound(String),

    /// Request is not accepting this operation in its current status
    #[error("Access request {request_id} is {status}")]
    RequestNotActive { request_id: String, status: AccessStatus },

    /// Caller does not sit on the committee
    #[error("{identity} is not on the committee for {request_id}")]
    NotACommitteeMember { request_id: String, identity: Identity },

    /// Member already approved this request
    #[error("{identity} already approved {request_id}")]
    AlreadyApproved { request_id: String, identity: Identity },

    /// Unknown dispute
    #[error("Dispute not found: {0}")]
    DisputeNotFound(String),

    /// Dispute already resolved or rejected
    #[error("Dispute {dispute_id} is {status:?}")]
    DisputeTerminal { dispute_id: String, status: DisputeStatus },

    /// Disputes may only contest approved requests
    #[error("Access request {request_id} is {status}, only approved requests can be disputed")]
    DisputeTargetNotApproved { request_id: String, status: AccessStatus },

    /// Dispute filed without a reason
    #[error("Dispute reason must not be empty")]
    InvalidDisputeReason,

    /// Stake at risk below the configured minimum
    #[error("Dispute stake {offered} below minimum {minimum}")]
    InsufficientStake { offered: u64, minimum: u64 },

    /// Recovery requested for a request that was never approved
    #[error("Access request {request_id} is {status}, recovery requires an approved request")]
    OriginalRequestNotApproved { request_id: String, status: AccessStatus },

    /// Unknown recovery session
    #[error("Recovery session not found: {0}")]
    SessionNotFound(String),

    /// Recovery session no longer accepts submissions
    #[error("Recovery session {session_id} is {state:?}")]
    SessionTerminal { session_id: String, state: RecoveryState },

    /// Member already submitted a code in this session
    #[error("{identity} already submitted a recovery code to {session_id}")]
    DuplicateSubmission { session_id: String, identity: Identity },

    /// Quorum not reached before the time bound
    #[error("Recovery session {0} timed out before reaching quorum")]
    QuorumTimeout(String),

    /// The reconstruction primitive rejected the collected codes
    #[error("Reconstruction rejected: {0}")]
    ReconstructionRejected(#[from] ReconstructionError),

    /// Secret requested before the session completed
    #[error("Recovery session {session_id} is {state:?}, not completed")]
    SessionIncomplete { session_id: String, state: RecoveryState },

    /// Only the original requester may claim a recovered secret
    #[error("{identity} did not request {request_id}")]
    NotRequester { request_id: String, identity: Identity },

    /// Recovered secret was already handed out
    #[error("Secret for recovery session {0} already claimed")]
    SecretAlreadyClaimed(String),

    /// Cache dependency failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CustodyError {
    /// Stable label for the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJustification { .. } => "invalid_justification",
            Self::InsufficientCommitteePool { .. } => "insufficient_committee_pool",
            Self::InvalidThreshold { .. } => "invalid_threshold",
            Self::DuplicatePoolMember(_) => "duplicate_pool_member",
            Self::RequestNotFound(_) => "request_not_found",
            Self::RequestNotActive { .. } => "request_not_active",
            Self::NotACommitteeMember { .. } => "not_a_committee_member",
            Self::AlreadyApproved { .. } => "already_approved",
            Self::DisputeNotFound(_) => "dispute_not_found",
            Self::DisputeTerminal { .. } => "dispute_terminal",
            Self::DisputeTargetNotApproved { .. } => "dispute_target_not_approved",
            Self::InvalidDisputeReason => "invalid_dispute_reason",
            Self::InsufficientStake { .. } => "insufficient_stake",
            Self::OriginalRequestNotApproved { .. } => "original_request_not_approved",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionTerminal { .. } => "session_terminal",
            Self::DuplicateSubmission { .. } => "duplicate_submission",
            Self::QuorumTimeout(_) => "quorum_timeout",
            Self::ReconstructionRejected(_) => "reconstruction_rejected",
            Self::SessionIncomplete { .. } => "session_incomplete",
            Self::NotRequester { .. } => "not_requester",
            Self::SecretAlreadyClaimed(_) => "secret_already_claimed",
            Self::Cache(CacheError::ProducerFailed(_)) => "producer_failed",
            Self::Cache(CacheError::Abandoned) => "producer_abandoned",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, CustodyError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(approved: &[bool], threshold: u32) -> AccessRequest {
        AccessRequest {
            id: "req-1".to_string(),
            target_record_id: "case-1".to_string(),
            requester: Identity::new("requester"),
            justification: "x".repeat(60),
            committee: approved
                .iter()
                .enumerate()
                .map(|(i, &approved)| CommitteeMember {
                    has_approved: approved,
                    ..CommitteeMember::seat(Identity::new(format!("m{}", i + 1)), Tier::Silver)
                })
                .collect(),
            threshold,
            status: AccessStatus::Active,
            created_at: Utc::now(),
            decided_at: None,
            rejected_by: None,
            rejection_reason: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(AccessStatus::Pending.can_transition_to(AccessStatus::Active));
        assert!(AccessStatus::Active.can_transition_to(AccessStatus::Approved));
        assert!(!AccessStatus::Approved.can_transition_to(AccessStatus::Active));
        assert!(!AccessStatus::Expired.can_transition_to(AccessStatus::Rejected));
        assert!(!AccessStatus::Pending.can_transition_to(AccessStatus::Approved));
    }

    #[test]
    fn test_approval_counts() {
        let request = request_with(&[true, false, true, false, false], 3);
        assert_eq!(request.approval_count(), 2);
        assert_eq!(request.approval_weight(), 4);
        assert!(!request.threshold_reached());
        assert_eq!(request.approvers(), vec![Identity::new("m1"), Identity::new("m3")]);
    }

    #[test]
    fn test_advance_refuses_regression() {
        let mut request = request_with(&[true, true, true], 3);
        request.advance(AccessStatus::Approved).unwrap();
        assert!(request.decided_at.is_some());

        let err = request.advance(AccessStatus::Rejected).unwrap_err();
        assert_eq!(err.kind(), "request_not_active");
        assert_eq!(request.status, AccessStatus::Approved);
    }

    #[test]
    fn test_identity_serializes_transparently() {
        let json = serde_json::to_string(&Identity::new("7xKXtg2CW87")).unwrap();
        assert_eq!(json, "\"7xKXtg2CW87\"");
    }
}

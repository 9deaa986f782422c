//! Disputes against approved access requests.
//!
//! A dispute contests an approval after the fact. The filer puts stake at
//! risk; the final disposition tells the stake subsystem whether to release
//! or forfeit it. Disputes never change the status of the request they
//! contest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::committee::CommitteeCoordinator;
use crate::events::CustodyEvent;
use crate::types::{AccessStatus, CustodyError, Identity, Result};

/// Dispute lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Filed, awaiting review
    Pending,
    /// Under review by the dispute authority
    UnderReview,
    /// Upheld
    Resolved,
    /// Dismissed
    Rejected,
}

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

/// Decision reached on a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// The contested approval was improper
    Upheld,
    /// The contested approval stands
    Dismissed,
}

impl DisputeOutcome {
    fn status(&self) -> DisputeStatus {
        match self {
            Self::Upheld => DisputeStatus::Resolved,
            Self::Dismissed => DisputeStatus::Rejected,
        }
    }
}

/// What happens to the stake at risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeDisposition {
    /// Stake returned
    Release,
    /// Stake slashed
    Forfeit,
}

/// A dispute filed against an approved request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique dispute ID
    pub id: String,
    /// Contested request
    pub request_id: String,
    /// Record the contested request targets
    pub target_record_id: String,
    /// Who filed the dispute
    pub filed_by: Identity,
    /// Why the approval is contested
    pub reason: String,
    /// Current status
    pub status: DisputeStatus,
    /// Stake put at risk (base units)
    pub stake_at_risk: u64,
    /// Resolution notes
    pub resolution: Option<String>,
    /// Final stake disposition
    pub disposition: Option<StakeDisposition>,
    /// When the dispute was filed
    pub filed_at: DateTime<Utc>,
    /// When the dispute was resolved or rejected
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CommitteeCoordinator {
    /// File a dispute against an approved request.
    pub async fn file_dispute(
        &self,
        request_id: &str,
        filed_by: Identity,
        reason: &str,
        stake_at_risk: u64,
    ) -> Result<Dispute> {
        if reason.trim().is_empty() {
            return Err(CustodyError::InvalidDisputeReason);
        }
        let minimum = self.dispute_config.min_stake;
        if stake_at_risk < minimum {
            return Err(CustodyError::InsufficientStake {
                offered: stake_at_risk,
                minimum,
            });
        }

        let target_record_id = {
            let handle = self.handle(request_id)?;
            let request = handle.lock().await;
            if request.status != AccessStatus::Approved {
                return Err(CustodyError::DisputeTargetNotApproved {
                    request_id: request_id.to_string(),
                    status: request.status,
                });
            }
            request.target_record_id.clone()
        };

        let dispute = Dispute {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            target_record_id,
            filed_by,
            reason: reason.to_string(),
            status: DisputeStatus::Pending,
            stake_at_risk,
            resolution: None,
            disposition: None,
            filed_at: Utc::now(),
            resolved_at: None,
        };

        self.disputes
            .insert(dispute.id.clone(), Arc::new(Mutex::new(dispute.clone())));

        info!(
            dispute_id = %dispute.id,
            request_id = %request_id,
            filed_by = %dispute.filed_by,
            stake = stake_at_risk,
            "Dispute filed"
        );

        Ok(dispute)
    }

    /// Move a pending dispute under review.
    pub async fn begin_review(&self, dispute_id: &str) -> Result<Dispute> {
        let handle = self.dispute_handle(dispute_id)?;
        let mut dispute = handle.lock().await;

        if dispute.status != DisputeStatus::Pending {
            return Err(CustodyError::DisputeTerminal {
                dispute_id: dispute_id.to_string(),
                status: dispute.status,
            });
        }
        dispute.status = DisputeStatus::UnderReview;

        info!(dispute_id = %dispute_id, "Dispute under review");
        Ok(dispute.clone())
    }

    /// Resolve a dispute and announce the stake disposition.
    ///
    /// Pending disputes may be resolved directly; review is optional.
    pub async fn resolve_dispute(
        &self,
        dispute_id: &str,
        outcome: DisputeOutcome,
        resolution: Option<&str>,
        disposition: StakeDisposition,
    ) -> Result<Dispute> {
        let handle = self.dispute_handle(dispute_id)?;
        let mut dispute = handle.lock().await;

        if dispute.status.is_terminal() {
            return Err(CustodyError::DisputeTerminal {
                dispute_id: dispute_id.to_string(),
                status: dispute.status,
            });
        }

        dispute.status = outcome.status();
        dispute.resolution = resolution.map(str::to_string);
        dispute.disposition = Some(disposition);
        dispute.resolved_at = Some(Utc::now());

        info!(
            dispute_id = %dispute_id,
            request_id = %dispute.request_id,
            outcome = ?outcome,
            disposition = ?disposition,
            "Dispute resolved"
        );
        self.events.publish(CustodyEvent::DisputeResolved {
            dispute_id: dispute.id.clone(),
            request_id: dispute.request_id.clone(),
            status: dispute.status,
            disposition,
            stake_at_risk: dispute.stake_at_risk,
        });

        Ok(dispute.clone())
    }

    /// Snapshot of a dispute.
    pub async fn dispute(&self, dispute_id: &str) -> Result<Dispute> {
        let handle = self.dispute_handle(dispute_id)?;
        let dispute = handle.lock().await;
        Ok(dispute.clone())
    }

    /// Every dispute filed against one request, oldest first.
    pub async fn disputes_for_request(&self, request_id: &str) -> Vec<Dispute> {
        let handles: Vec<_> = self
            .disputes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut found = Vec::new();
        for handle in handles {
            let dispute = handle.lock().await;
            if dispute.request_id == request_id {
                found.push(dispute.clone());
            }
        }
        found.sort_by_key(|d| d.filed_at);
        found
    }

    fn dispute_handle(&self, dispute_id: &str) -> Result<Arc<Mutex<Dispute>>> {
        self.disputes
            .get(dispute_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CustodyError::DisputeNotFound(dispute_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolMember;
    use tokio_test::assert_err;

    const STAKE: u64 = 100_000_000;

    fn pool() -> Vec<PoolMember> {
        (1..=5)
            .map(|i| PoolMember::new(format!("m{}", i), 40, 30))
            .collect()
    }

    async fn approved_request(coordinator: &CommitteeCoordinator) -> String {
        let request = coordinator
            .request_access(
                Identity::new("researcher"),
                "case-9",
                "Audit of consent records for the regional vaccination registry",
                &pool(),
            )
            .unwrap();
        for i in 1..=3 {
            coordinator
                .approve(&request.id, &Identity::new(format!("m{}", i)))
                .await
                .unwrap();
        }
        request.id
    }

    #[tokio::test]
    async fn test_file_and_resolve() {
        let coordinator = CommitteeCoordinator::default();
        let mut events = coordinator.events().subscribe();
        let request_id = approved_request(&coordinator).await;
        // Drain the authorization event
        events.recv().await.unwrap();

        let dispute = coordinator
            .file_dispute(&request_id, Identity::new("patient"), "Access exceeded stated scope", STAKE)
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Pending);
        assert_eq!(dispute.target_record_id, "case-9");

        let reviewed = coordinator.begin_review(&dispute.id).await.unwrap();
        assert_eq!(reviewed.status, DisputeStatus::UnderReview);

        let resolved = coordinator
            .resolve_dispute(&dispute.id, DisputeOutcome::Upheld, Some("Scope exceeded"), StakeDisposition::Release)
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.disposition, Some(StakeDisposition::Release));
        assert!(resolved.resolved_at.is_some());

        assert_eq!(
            events.recv().await.unwrap(),
            CustodyEvent::DisputeResolved {
                dispute_id: dispute.id.clone(),
                request_id: request_id.clone(),
                status: DisputeStatus::Resolved,
                disposition: StakeDisposition::Release,
                stake_at_risk: STAKE,
            }
        );

        // The contested request keeps its status
        assert_eq!(
            coordinator.request(&request_id).await.unwrap().status,
            AccessStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_dismissed_dispute_forfeits() {
        let coordinator = CommitteeCoordinator::default();
        let request_id = approved_request(&coordinator).await;
        let dispute = coordinator
            .file_dispute(&request_id, Identity::new("patient"), "Frivolous", STAKE * 2)
            .await
            .unwrap();

        let resolved = coordinator
            .resolve_dispute(&dispute.id, DisputeOutcome::Dismissed, None, StakeDisposition::Forfeit)
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Rejected);
        assert_eq!(resolved.resolution, None);

        let err = assert_err!(
            coordinator
                .resolve_dispute(&dispute.id, DisputeOutcome::Upheld, Some("again"), StakeDisposition::Release)
                .await
        );
        assert_eq!(err.kind(), "dispute_terminal");
        let err = assert_err!(coordinator.begin_review(&dispute.id).await);
        assert_eq!(err.kind(), "dispute_terminal");
    }

    #[tokio::test]
    async fn test_filing_requires_approved_request() {
        let coordinator = CommitteeCoordinator::default();
        let active = coordinator
            .request_access(
                Identity::new("researcher"),
                "case-9",
                "Audit of consent records for the regional vaccination registry",
                &pool(),
            )
            .unwrap();

        let err = assert_err!(
            coordinator
                .file_dispute(&active.id, Identity::new("patient"), "Premature", STAKE)
                .await
        );
        assert_eq!(err.kind(), "dispute_target_not_approved");

        let err = assert_err!(
            coordinator
                .file_dispute("missing", Identity::new("patient"), "Unknown", STAKE)
                .await
        );
        assert_eq!(err.kind(), "request_not_found");
    }

    #[tokio::test]
    async fn test_filing_validation() {
        let coordinator = CommitteeCoordinator::default();
        let request_id = approved_request(&coordinator).await;

        let err = assert_err!(
            coordinator
                .file_dispute(&request_id, Identity::new("patient"), "   ", STAKE)
                .await
        );
        assert!(matches!(err, CustodyError::InvalidDisputeReason));

        let err = assert_err!(
            coordinator
                .file_dispute(&request_id, Identity::new("patient"), "Too cheap", STAKE - 1)
                .await
        );
        assert!(matches!(
            err,
            CustodyError::InsufficientStake { offered, minimum } if offered == STAKE - 1 && minimum == STAKE
        ));
        assert!(coordinator.disputes_for_request(&request_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_disputes_for_request() {
        let coordinator = CommitteeCoordinator::default();
        let request_id = approved_request(&coordinator).await;
        for reason in ["First", "Second"] {
            coordinator
                .file_dispute(&request_id, Identity::new("patient"), reason, STAKE)
                .await
                .unwrap();
        }

        let disputes = coordinator.disputes_for_request(&request_id).await;
        assert_eq!(disputes.len(), 2);
        assert!(coordinator.disputes_for_request("other").await.is_empty());

        let err = assert_err!(coordinator.dispute("missing").await);
        assert_eq!(err.kind(), "dispute_not_found");
    }
}

//! Committee coordinator - forms committees and tallies approvals.
//!
//! Every request lives behind its own mutex. An approval locks only the
//! request it targets, reads the committee, validates, and writes the new
//! state before releasing, so unrelated requests never contend and no
//! reader ever sees the threshold reached while the status is still
//! `Active`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use record_cache::{CacheKey, RecordCache};
use reputation::ReputationEngine;

use crate::config::{deadline_after, CommitteeConfig, CustodyConfig, DisputeConfig};
use crate::dispute::Dispute;
use crate::events::{CustodyEvent, EventBus};
use crate::pool::{select_committee, MemberPoolSource};
use crate::types::{
    AccessRequest, AccessStatus, Approval, CommitteeShape, CustodyError, Identity, PoolMember,
    Result,
};

/// Forms committees, records approvals, and tracks disputes.
pub struct CommitteeCoordinator {
    /// Committee configuration
    config: CommitteeConfig,
    /// Dispute configuration
    pub(crate) dispute_config: DisputeConfig,
    /// Tier resolution for eligibility and ranking
    engine: Arc<ReputationEngine>,
    /// Member pools by target record
    pool_cache: Arc<RecordCache<Vec<PoolMember>>>,
    /// Outbound events
    pub(crate) events: EventBus,
    /// Access requests, one lock per request
    requests: DashMap<String, Arc<Mutex<AccessRequest>>>,
    /// Disputes, one lock per dispute
    pub(crate) disputes: DashMap<String, Arc<Mutex<Dispute>>>,
}

impl CommitteeCoordinator {
    /// Create a coordinator from explicit collaborators.
    pub fn new(
        config: CommitteeConfig,
        engine: Arc<ReputationEngine>,
        pool_cache: Arc<RecordCache<Vec<PoolMember>>>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            dispute_config: DisputeConfig::default(),
            engine,
            pool_cache,
            events,
            requests: DashMap::new(),
            disputes: DashMap::new(),
        }
    }

    /// Build every collaborator from a validated configuration.
    pub fn from_config(config: &CustodyConfig) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(ReputationEngine::new(config.reputation.tiers.clone()));
        let pool_cache = Arc::new(RecordCache::new(config.cache.clone()));
        Ok(Self::new(config.committee.clone(), engine, pool_cache, EventBus::new())
            .with_dispute_config(config.disputes.clone()))
    }

    /// Override dispute configuration.
    pub fn with_dispute_config(mut self, dispute_config: DisputeConfig) -> Self {
        self.dispute_config = dispute_config;
        self
    }

    /// Committee configuration.
    pub fn config(&self) -> &CommitteeConfig {
        &self.config
    }

    /// Reputation engine used for selection.
    pub fn engine(&self) -> &ReputationEngine {
        &self.engine
    }

    /// Event bus shared with other coordinators.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Submit an access request using the configured committee shape.
    pub fn request_access(
        &self,
        requester: Identity,
        target_record_id: &str,
        justification: &str,
        member_pool: &[PoolMember],
    ) -> Result<AccessRequest> {
        self.request_access_with(
            requester,
            target_record_id,
            justification,
            member_pool,
            self.config.shape(),
        )
    }

    /// Submit an access request with an explicit committee shape.
    ///
    /// Validation failures leave no trace: nothing is stored unless the
    /// request is fully formed.
    pub fn request_access_with(
        &self,
        requester: Identity,
        target_record_id: &str,
        justification: &str,
        member_pool: &[PoolMember],
        shape: CommitteeShape,
    ) -> Result<AccessRequest> {
        self.check_justification(justification)?;
        if shape.size == 0 || shape.threshold == 0 || shape.threshold as usize > shape.size {
            return Err(CustodyError::InvalidThreshold {
                threshold: shape.threshold,
                committee_size: shape.size,
            });
        }

        let committee = select_committee(
            &self.engine,
            member_pool,
            shape.size,
            self.config.min_committee_tier,
        )?;

        let mut request = AccessRequest {
            id: uuid::Uuid::new_v4().to_string(),
            target_record_id: target_record_id.to_string(),
            requester,
            justification: justification.to_string(),
            committee,
            threshold: shape.threshold,
            status: AccessStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            rejected_by: None,
            rejection_reason: None,
        };
        request.advance(AccessStatus::Active)?;

        self.requests
            .insert(request.id.clone(), Arc::new(Mutex::new(request.clone())));

        info!(
            request_id = %request.id,
            target = %request.target_record_id,
            requester = %request.requester,
            committee_size = request.committee.len(),
            threshold = request.threshold,
            "Access request created"
        );

        Ok(request)
    }

    /// Submit an access request, reading the member pool through the cache.
    ///
    /// Concurrent submissions for the same record share one pool fetch.
    pub async fn request_access_from_source(
        &self,
        source: &dyn MemberPoolSource,
        requester: Identity,
        target_record_id: &str,
        justification: &str,
    ) -> Result<AccessRequest> {
        // Reject bad input before paying for a pool lookup.
        self.check_justification(justification)?;

        let key = CacheKey::member_pool(target_record_id);
        let pool = self
            .pool_cache
            .dedupe_key(&key, || source.fetch_pool(target_record_id))
            .await?;

        self.request_access(requester, target_record_id, justification, &pool)
    }

    /// Drop a cached member pool so the next submission refetches it.
    pub fn invalidate_pool(&self, target_record_id: &str) {
        self.pool_cache
            .delete(&CacheKey::member_pool(target_record_id).to_storage_key());
    }

    /// Record an approval from a committee member.
    ///
    /// The approval that first brings the count to the threshold moves the
    /// request to `Approved` in the same write and is the only one reported
    /// as `newly_authorized`. Members approving after that are still
    /// recorded; the status does not change.
    pub async fn approve(&self, request_id: &str, approver: &Identity) -> Result<Approval> {
        let handle = self.handle(request_id)?;
        let mut request = handle.lock().await;

        if !matches!(request.status, AccessStatus::Active | AccessStatus::Approved) {
            return Err(CustodyError::RequestNotActive {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }

        let now = Utc::now();
        let member = request
            .committee
            .iter_mut()
            .find(|m| &m.identity == approver)
            .ok_or_else(|| CustodyError::NotACommitteeMember {
                request_id: request_id.to_string(),
                identity: approver.clone(),
            })?;

        if member.has_approved {
            return Err(CustodyError::AlreadyApproved {
                request_id: request_id.to_string(),
                identity: approver.clone(),
            });
        }
        member.has_approved = true;
        member.approved_at = Some(now);

        let approvals = request.approval_count();
        let newly_authorized =
            request.status == AccessStatus::Active && approvals >= request.threshold as usize;
        if newly_authorized {
            request.advance(AccessStatus::Approved)?;
        }

        debug!(
            request_id = %request_id,
            approver = %approver,
            approvals = approvals,
            threshold = request.threshold,
            "Approval recorded"
        );

        if newly_authorized {
            info!(
                request_id = %request_id,
                requester = %request.requester,
                approvals = approvals,
                "Access threshold reached, decryption authorized"
            );
            self.events.publish(CustodyEvent::AccessAuthorized {
                request_id: request.id.clone(),
                target_record_id: request.target_record_id.clone(),
                requester: request.requester.clone(),
                approvals,
                authorized_at: now,
            });
        }

        Ok(Approval {
            request: request.clone(),
            newly_authorized,
        })
    }

    /// Reject an active request on behalf of an authority.
    pub async fn reject(
        &self,
        request_id: &str,
        authority: &Identity,
        reason: &str,
    ) -> Result<AccessRequest> {
        let handle = self.handle(request_id)?;
        let mut request = handle.lock().await;

        request.advance(AccessStatus::Rejected)?;
        request.rejected_by = Some(authority.clone());
        request.rejection_reason = Some(reason.to_string());

        info!(
            request_id = %request_id,
            authority = %authority,
            reason = %reason,
            "Access request rejected"
        );
        self.events.publish(CustodyEvent::AccessRejected {
            request_id: request_id.to_string(),
            rejected_by: authority.clone(),
            reason: reason.to_string(),
        });

        Ok(request.clone())
    }

    /// Expire an active request after an external timeout signal.
    pub async fn expire(&self, request_id: &str) -> Result<AccessRequest> {
        let handle = self.handle(request_id)?;
        let mut request = handle.lock().await;

        request.advance(AccessStatus::Expired)?;

        info!(request_id = %request_id, approvals = request.approval_count(), "Access request expired");
        self.events.publish(CustodyEvent::AccessExpired {
            request_id: request_id.to_string(),
        });

        Ok(request.clone())
    }

    /// Expire every active request older than the configured TTL.
    ///
    /// Returns the IDs that were expired. A TTL too large to represent never
    /// elapses.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<String> {
        let ttl_secs = self.config.request_ttl_secs;
        let mut expired = Vec::new();

        for handle in self.handles() {
            let mut request = handle.lock().await;
            let overdue = deadline_after(request.created_at, ttl_secs).is_some_and(|d| d <= now);
            if request.status == AccessStatus::Active && overdue {
                if let Err(e) = request.advance(AccessStatus::Expired) {
                    warn!(request_id = %request.id, error = %e, "Failed to expire request");
                    continue;
                }
                self.events.publish(CustodyEvent::AccessExpired {
                    request_id: request.id.clone(),
                });
                expired.push(request.id.clone());
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue access requests");
        }
        expired
    }

    /// Snapshot of a request.
    pub async fn request(&self, request_id: &str) -> Result<AccessRequest> {
        let handle = self.handle(request_id)?;
        let request = handle.lock().await;
        Ok(request.clone())
    }

    /// Snapshots of every request made by `requester`.
    pub async fn requests_by(&self, requester: &Identity) -> Vec<AccessRequest> {
        let mut found = Vec::new();
        for handle in self.handles() {
            let request = handle.lock().await;
            if &request.requester == requester {
                found.push(request.clone());
            }
        }
        found.sort_by_key(|r| r.created_at);
        found
    }

    /// Snapshots of every active request where `member` has a seat.
    pub async fn pending_for_member(&self, member: &Identity) -> Vec<AccessRequest> {
        let mut found = Vec::new();
        for handle in self.handles() {
            let request = handle.lock().await;
            if request.status == AccessStatus::Active && request.is_member(member) {
                found.push(request.clone());
            }
        }
        found.sort_by_key(|r| r.created_at);
        found
    }

    /// Lock handle for one request.
    pub(crate) fn handle(&self, request_id: &str) -> Result<Arc<Mutex<AccessRequest>>> {
        self.requests
            .get(request_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CustodyError::RequestNotFound(request_id.to_string()))
    }

    /// Handles collected up front so no map guard is held across an await.
    fn handles(&self) -> Vec<Arc<Mutex<AccessRequest>>> {
        self.requests.iter().map(|entry| entry.value().clone()).collect()
    }

    fn check_justification(&self, justification: &str) -> Result<()> {
        let length = justification.trim().chars().count();
        let (min, max) = (
            self.config.min_justification_length,
            self.config.max_justification_length,
        );
        if length < min || length > max {
            return Err(CustodyError::InvalidJustification {
                min,
                max,
                actual: length,
            });
        }
        Ok(())
    }
}

impl Default for CommitteeCoordinator {
    fn default() -> Self {
        Self::new(
            CommitteeConfig::default(),
            Arc::new(ReputationEngine::default()),
            Arc::new(RecordCache::with_defaults()),
            EventBus::new(),
        )
    }
}

//! Committee member pools and deterministic committee selection.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use reputation::{ReputationEngine, Tier};

use crate::types::{CommitteeMember, CustodyError, PoolMember, Result};

/// Error types for member pool lookups.
#[derive(Debug, thiserror::Error)]
pub enum PoolSourceError {
    /// Ledger or indexer not reachable
    #[error("Pool source unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Supplies the eligible member pool for a target record.
///
/// Implementations read from an external ledger; tests substitute an
/// in-memory pool.
#[async_trait]
pub trait MemberPoolSource: Send + Sync {
    /// Fetch candidate members with their validation counters.
    async fn fetch_pool(&self, target_record_id: &str) -> std::result::Result<Vec<PoolMember>, PoolSourceError>;
}

/// In-memory pool, optionally overridden per record.
#[derive(Debug, Clone, Default)]
pub struct StaticMemberPool {
    default_pool: Vec<PoolMember>,
    per_record: Arc<RwLock<HashMap<String, Vec<PoolMember>>>>,
}

impl StaticMemberPool {
    /// Serve the same pool for every record.
    pub fn new(default_pool: Vec<PoolMember>) -> Self {
        Self {
            default_pool,
            per_record: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Serve a specific pool for one record.
    pub async fn set_pool(&self, target_record_id: impl Into<String>, pool: Vec<PoolMember>) {
        self.per_record.write().await.insert(target_record_id.into(), pool);
    }
}

#[async_trait]
impl MemberPoolSource for StaticMemberPool {
    async fn fetch_pool(&self, target_record_id: &str) -> std::result::Result<Vec<PoolMember>, PoolSourceError> {
        let per_record = self.per_record.read().await;
        Ok(per_record
            .get(target_record_id)
            .cloned()
            .unwrap_or_else(|| self.default_pool.clone()))
    }
}

/// Rank a pool and seat the top `size` eligible members.
///
/// Ranking is `(tier desc, accuracy desc, identity asc)`, so the same pool
/// always yields the same committee.
pub fn select_committee(
    engine: &ReputationEngine,
    pool: &[PoolMember],
    size: usize,
    min_tier: Tier,
) -> Result<Vec<CommitteeMember>> {
    let mut seen = HashSet::with_capacity(pool.len());
    for member in pool {
        if !seen.insert(&member.identity) {
            return Err(CustodyError::DuplicatePoolMember(member.identity.clone()));
        }
    }

    let mut ranked: Vec<(Tier, u8, &PoolMember)> = pool
        .iter()
        .map(|member| {
            let record = member.record();
            (engine.tier_of(&record), record.accuracy_rate(), member)
        })
        .filter(|(tier, _, _)| *tier >= min_tier)
        .collect();

    if ranked.len() < size {
        return Err(CustodyError::InsufficientCommitteePool {
            required: size,
            available: ranked.len(),
        });
    }

    ranked.sort_by(|a, b| {
        (Reverse(a.0), Reverse(a.1), &a.2.identity).cmp(&(Reverse(b.0), Reverse(b.1), &b.2.identity))
    });

    Ok(ranked
        .into_iter()
        .take(size)
        .map(|(tier, _, member)| CommitteeMember::seat(member.identity.clone(), tier))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn pool() -> Vec<PoolMember> {
        vec![
            PoolMember::new("carol", 30, 20),   // 67% -> Silver
            PoolMember::new("alice", 600, 540), // 90% -> Platinum
            PoolMember::new("bob", 150, 120),   // 80% -> Gold
            PoolMember::new("dave", 5, 5),      // Bronze
            PoolMember::new("erin", 150, 135),  // 90% -> Gold
            PoolMember::new("frank", 150, 135), // 90% -> Gold
        ]
    }

    fn names(committee: &[CommitteeMember]) -> Vec<&str> {
        committee.iter().map(|m| m.identity.as_str()).collect()
    }

    #[test]
    fn test_ranks_by_tier_accuracy_identity() {
        let engine = ReputationEngine::default();
        let committee = select_committee(&engine, &pool(), 5, Tier::Bronze).unwrap();
        assert_eq!(names(&committee), vec!["alice", "erin", "frank", "bob", "carol"]);
        assert_eq!(committee[0].tier, Tier::Platinum);
        assert_eq!(committee[0].weight, 5);
        assert!(committee.iter().all(|m| !m.has_approved && m.approved_at.is_none()));
    }

    #[test]
    fn test_selection_ignores_pool_order() {
        let engine = ReputationEngine::default();
        let mut reversed = pool();
        reversed.reverse();
        let a = select_committee(&engine, &pool(), 4, Tier::Bronze).unwrap();
        let b = select_committee(&engine, &reversed, 4, Tier::Bronze).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_pool() {
        let engine = ReputationEngine::default();
        let err = select_committee(&engine, &pool()[..3], 5, Tier::Bronze).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::InsufficientCommitteePool { required: 5, available: 3 }
        ));
    }

    #[test]
    fn test_min_tier_filters_eligibility() {
        let engine = ReputationEngine::default();
        let err = select_committee(&engine, &pool(), 5, Tier::Gold).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::InsufficientCommitteePool { required: 5, available: 4 }
        ));
        let committee = select_committee(&engine, &pool(), 4, Tier::Gold).unwrap();
        assert!(!committee.iter().any(|m| m.identity == Identity::new("carol")));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let engine = ReputationEngine::default();
        let mut members = pool();
        members.push(PoolMember::new("bob", 1, 1));
        let err = select_committee(&engine, &members, 3, Tier::Bronze).unwrap_err();
        assert_eq!(err.kind(), "duplicate_pool_member");
    }

    #[tokio::test]
    async fn test_static_pool_per_record_override() {
        let source = StaticMemberPool::new(pool());
        source.set_pool("case-7", pool()[..2].to_vec()).await;

        assert_eq!(source.fetch_pool("case-1").await.unwrap().len(), 6);
        assert_eq!(source.fetch_pool("case-7").await.unwrap().len(), 2);
    }
}

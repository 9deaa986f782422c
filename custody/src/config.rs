//! Configuration for committee custody.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use record_cache::CacheConfig;
use reputation::{Tier, TierTable};

use crate::types::{CommitteeShape, CustodyError, Result};

/// Longest accepted request TTL or quorum timeout (100 years).
pub const MAX_TIMEOUT_SECS: u64 = 100 * 365 * 86_400;

/// `start + secs`, or `None` when the deadline is not representable.
///
/// Callers treat `None` as a deadline that never arrives.
pub(crate) fn deadline_after(start: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| start.checked_add_signed(ttl))
}

/// Top-level custody configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Committee formation
    pub committee: CommitteeConfig,
    /// Reputation tier thresholds
    pub reputation: ReputationConfig,
    /// Cache TTLs per key class
    pub cache: CacheConfig,
    /// Recovery sessions
    pub recovery: RecoveryConfig,
    /// Dispute filing
    pub disputes: DisputeConfig,
}

impl CustodyConfig {
    /// Load config from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| CustodyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| CustodyError::Config(e.to_string()))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.committee.validate()?;
        self.recovery.validate()
    }
}

/// Committee configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeConfig {
    /// Members seated per request (N)
    pub committee_size: usize,
    /// Approvals required (K)
    pub approval_threshold: u32,
    /// Minimum justification length in characters
    pub min_justification_length: usize,
    /// Maximum justification length in characters
    pub max_justification_length: usize,
    /// Lowest tier eligible for a committee seat
    pub min_committee_tier: Tier,
    /// Age after which an unfinished request may be expired (seconds)
    pub request_ttl_secs: u64,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            committee_size: 5,
            approval_threshold: 3,
            min_justification_length: 50,
            max_justification_length: 500,
            min_committee_tier: Tier::Bronze,
            request_ttl_secs: 30 * 86_400, // 30 days
        }
    }
}

impl CommitteeConfig {
    /// Default committee dimensions.
    pub fn shape(&self) -> CommitteeShape {
        CommitteeShape::new(self.committee_size, self.approval_threshold)
    }

    fn validate(&self) -> Result<()> {
        if self.committee_size == 0 {
            return Err(CustodyError::Config("committee_size must be at least 1".to_string()));
        }
        if self.approval_threshold == 0 || self.approval_threshold as usize > self.committee_size {
            return Err(CustodyError::Config(format!(
                "approval_threshold {} must be within 1..={}",
                self.approval_threshold, self.committee_size
            )));
        }
        if self.min_justification_length > self.max_justification_length {
            return Err(CustodyError::Config(format!(
                "min_justification_length {} exceeds max_justification_length {}",
                self.min_justification_length, self.max_justification_length
            )));
        }
        if self.request_ttl_secs > MAX_TIMEOUT_SECS {
            return Err(CustodyError::Config(format!(
                "request_ttl_secs {} exceeds {}",
                self.request_ttl_secs, MAX_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Reputation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Ordered tier thresholds, lowest first
    pub tiers: TierTable,
}

/// Recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// How long a session may collect codes before it fails (seconds)
    pub quorum_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            quorum_timeout_secs: 3600, // 1 hour
        }
    }
}

impl RecoveryConfig {
    fn validate(&self) -> Result<()> {
        if self.quorum_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(CustodyError::Config(format!(
                "quorum_timeout_secs {} exceeds {}",
                self.quorum_timeout_secs, MAX_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Dispute configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    /// Minimum stake a filer must put at risk (base units)
    pub min_stake: u64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            min_stake: 100_000_000, // 100 tokens at 6 decimals
        }
    }
}

//! Committee custody for encrypted record access.
//!
//! Access to an encrypted record is released only when a K-of-N committee,
//! selected by reputation, approves the request:
//!
//! - **Committee formation**: deterministic ranking of an eligible member pool
//! - **Threshold approval**: per-request atomic tallying, one authorization
//! - **Disputes**: staked challenges against approved requests
//! - **Recovery**: a quorum of the same committee restores an interrupted
//!   session without re-running approval
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   CommitteeCoordinator                       │
//! │                                                              │
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────────┐     │
//! │  │ PoolSource │──▶│ RecordCache │──▶│ select_committee │     │
//! │  └────────────┘   └─────────────┘   └────────┬─────────┘     │
//! │                                              │               │
//! │                 ┌────────────────────────────▼────────────┐  │
//! │                 │ AccessRequest (one lock per request)    │  │
//! │                 │ Active ──approve×K──▶ Approved          │  │
//! │                 └──────────┬───────────────────┬──────────┘  │
//! │                            │                   │             │
//! │                     ┌──────▼─────┐      ┌──────▼────────┐    │
//! │                     │  Disputes  │      │   EventBus    │    │
//! │                     └────────────┘      └───────────────┘    │
//! └────────────────────────────┬─────────────────────────────────┘
//!                              │
//!                ┌─────────────▼────────────┐
//!                │   RecoveryCoordinator    │──▶ SecretReconstructor
//!                └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use custody::{CommitteeCoordinator, Identity, PoolMember};
//!
//! # tokio_test::block_on(async {
//! let coordinator = CommitteeCoordinator::default();
//! let pool: Vec<_> = (1..=5)
//!     .map(|i| PoolMember::new(format!("validator-{}", i), 40, 30))
//!     .collect();
//!
//! let request = coordinator
//!     .request_access(
//!         Identity::new("researcher"),
//!         "record-42",
//!         "Cohort study of long-term outcomes, approved by the ethics board",
//!         &pool,
//!     )
//!     .unwrap();
//!
//! for i in 1..=3 {
//!     let approver = Identity::new(format!("validator-{}", i));
//!     coordinator.approve(&request.id, &approver).await.unwrap();
//! }
//! let request = coordinator.request(&request.id).await.unwrap();
//! assert!(request.threshold_reached());
//! # });
//! ```

pub mod committee;
pub mod config;
pub mod dispute;
pub mod events;
pub mod pool;
pub mod reconstruct;
pub mod recovery;
pub mod types;

// Re-export main types
pub use committee::CommitteeCoordinator;
pub use config::{CommitteeConfig, CustodyConfig, DisputeConfig, RecoveryConfig, ReputationConfig};
pub use dispute::{Dispute, DisputeOutcome, DisputeStatus, StakeDisposition};
pub use events::{CustodyEvent, EventBus};
pub use pool::{select_committee, MemberPoolSource, PoolSourceError, StaticMemberPool};
pub use reconstruct::{
    ChecksumReconstructor, ReconstructedSecret, ReconstructionError, RecoveryShare,
    SecretReconstructor,
};
pub use recovery::{RecoveryCoordinator, RecoveryFailure, RecoverySession, RecoveryState};
pub use types::*;

pub use record_cache::{CacheConfig, CacheError};
pub use reputation::{ReputationEngine, ReputationRecord, Tier, TierTable, TierThreshold};

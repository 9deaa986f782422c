//! Validator reputation tiers.
//!
//! Converts a validator's `(total validations, accuracy rate)` pair into a
//! discrete [`Tier`] against a fixed, ordered [`TierTable`]:
//!
//! - **Bronze**: base tier, no minimums
//! - **Silver**: established validators
//! - **Gold**: experienced validators
//! - **Platinum**: top of the ladder
//!
//! Tiers are never stored; [`ReputationEngine`] derives them from the raw
//! counters on every read so they cannot drift from their inputs.
//!
//! # Example
//!
//! ```
//! use reputation::{ReputationEngine, ReputationRecord, Tier};
//!
//! let engine = ReputationEngine::default();
//! let record = ReputationRecord::new(120, 90);
//! assert_eq!(engine.tier_of(&record), Tier::Gold);
//! ```

pub mod engine;
pub mod tier;

pub use engine::{ReputationEngine, ReputationRecord, ReputationSnapshot, TierProgress};
pub use tier::{Tier, TierTable, TierThreshold};

/// Errors raised while building a tier table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReputationError {
    /// Table has no rows
    #[error("Tier table is empty")]
    EmptyTable,

    /// First row has non-zero minimums
    #[error("Base tier {0} must have zero minimums")]
    MissingBaseTier(Tier),

    /// Rows are out of order or lower a minimum
    #[error("Tier {upper} must rank above {lower} without lowering its minimums")]
    UnorderedTiers { lower: Tier, upper: Tier },

    /// Accuracy minimum above 100 percent
    #[error("Tier {tier} minimum accuracy {min_accuracy} exceeds 100")]
    AccuracyOutOfRange { tier: Tier, min_accuracy: u8 },
}

pub type Result<T> = std::result::Result<T, ReputationError>;

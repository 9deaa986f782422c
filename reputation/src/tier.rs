//! Reputation tiers and the ordered threshold table.
//!
//! Tiers form a strict ladder. A tier applies to a validator when both its
//! minimum validation count and minimum accuracy are met.

use serde::{Deserialize, Serialize};

use crate::{ReputationError, Result};

/// Reputation classification for a validator.
///
/// Ordering follows the ladder: `Bronze < Silver < Gold < Platinum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Base tier, every validator starts here
    Bronze = 0,
    /// Established validators
    Silver = 1,
    /// Experienced validators
    Gold = 2,
    /// Top of the ladder
    Platinum = 3,
}

impl Tier {
    /// Governance weight carried by a member of this tier.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Bronze => 1,
            Self::Silver => 2,
            Self::Gold => 3,
            Self::Platinum => 5,
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        }
    }

    /// All tiers, lowest first.
    pub fn all_ascending() -> [Self; 4] {
        [Self::Bronze, Self::Silver, Self::Gold, Self::Platinum]
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Bronze
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimums a validator must meet to hold a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    /// Tier granted when both minimums are met
    pub tier: Tier,
    /// Minimum total validations
    pub min_validations: u64,
    /// Minimum accuracy rate (percent, 0-100)
    pub min_accuracy: u8,
}

impl TierThreshold {
    /// Create a threshold row.
    pub const fn new(tier: Tier, min_validations: u64, min_accuracy: u8) -> Self {
        Self {
            tier,
            min_validations,
            min_accuracy,
        }
    }

    /// Whether a validator with these counters meets this row.
    pub fn is_met(&self, total_validations: u64, accuracy_rate: u8) -> bool {
        total_validations >= self.min_validations && accuracy_rate >= self.min_accuracy
    }
}

/// Fixed, ordered threshold table, lowest tier first.
///
/// The first row is always the base tier with zero minimums, so every
/// validator resolves to at least that tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierThreshold>", into = "Vec<TierThreshold>")]
pub struct TierTable {
    rows: Vec<TierThreshold>,
}

impl TierTable {
    /// Build a table from rows, lowest tier first.
    ///
    /// Rows must start at a zero-minimum base tier, name strictly increasing
    /// tiers, and never lower either minimum on the way up.
    pub fn new(rows: Vec<TierThreshold>) -> Result<Self> {
        let base = rows.first().ok_or(ReputationError::EmptyTable)?;
        if base.min_validations != 0 || base.min_accuracy != 0 {
            return Err(ReputationError::MissingBaseTier(base.tier));
        }

        for row in &rows {
            if row.min_accuracy > 100 {
                return Err(ReputationError::AccuracyOutOfRange {
                    tier: row.tier,
                    min_accuracy: row.min_accuracy,
                });
            }
        }

        for pair in rows.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.tier <= lower.tier
                || upper.min_validations < lower.min_validations
                || upper.min_accuracy < lower.min_accuracy
            {
                return Err(ReputationError::UnorderedTiers {
                    lower: lower.tier,
                    upper: upper.tier,
                });
            }
        }

        Ok(Self { rows })
    }

    /// Rows, lowest tier first.
    pub fn rows(&self) -> &[TierThreshold] {
        &self.rows
    }

    /// The base (lowest) tier.
    pub fn base_tier(&self) -> Tier {
        // Construction guarantees at least one row.
        self.rows.first().map(|r| r.tier).unwrap_or_default()
    }

    /// Threshold row for a tier, if the table defines it.
    pub fn threshold_for(&self, tier: Tier) -> Option<&TierThreshold> {
        self.rows.iter().find(|r| r.tier == tier)
    }

    /// Replace a single tier's minimums, revalidating the table.
    pub fn with_threshold(&self, threshold: TierThreshold) -> Result<Self> {
        let mut rows = self.rows.clone();
        match rows.iter_mut().find(|r| r.tier == threshold.tier) {
            Some(row) => *row = threshold,
            None => {
                rows.push(threshold);
                rows.sort_by_key(|r| r.tier);
            }
        }
        Self::new(rows)
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            rows: vec![
                TierThreshold::new(Tier::Bronze, 0, 0),
                TierThreshold::new(Tier::Silver, 25, 60),
                TierThreshold::new(Tier::Gold, 100, 70),
                TierThreshold::new(Tier::Platinum, 500, 80),
            ],
        }
    }
}

impl TryFrom<Vec<TierThreshold>> for TierTable {
    type Error = ReputationError;

    fn try_from(rows: Vec<TierThreshold>) -> Result<Self> {
        Self::new(rows)
    }
}

impl From<TierTable> for Vec<TierThreshold> {
    fn from(table: TierTable) -> Self {
        table.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_and_weights() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Platinum);
        assert_eq!(Tier::Platinum.weight(), 5);
        assert_eq!(Tier::Gold.to_string(), "Gold");
    }

    #[test]
    fn test_default_table_is_valid() {
        let table = TierTable::default();
        assert!(TierTable::new(table.rows().to_vec()).is_ok());
        assert_eq!(table.base_tier(), Tier::Bronze);
    }

    #[test]
    fn test_rejects_missing_base() {
        let err = TierTable::new(vec![TierThreshold::new(Tier::Silver, 10, 50)]).unwrap_err();
        assert!(matches!(err, ReputationError::MissingBaseTier(Tier::Silver)));
        assert!(matches!(TierTable::new(vec![]), Err(ReputationError::EmptyTable)));
    }

    #[test]
    fn test_rejects_decreasing_minimums() {
        let rows = vec![
            TierThreshold::new(Tier::Bronze, 0, 0),
            TierThreshold::new(Tier::Silver, 50, 70),
            TierThreshold::new(Tier::Gold, 40, 80),
        ];
        assert!(matches!(
            TierTable::new(rows),
            Err(ReputationError::UnorderedTiers { lower: Tier::Silver, upper: Tier::Gold })
        ));
    }

    #[test]
    fn test_rejects_accuracy_above_hundred() {
        let rows = vec![
            TierThreshold::new(Tier::Bronze, 0, 0),
            TierThreshold::new(Tier::Silver, 10, 101),
        ];
        assert!(matches!(
            TierTable::new(rows),
            Err(ReputationError::AccuracyOutOfRange { min_accuracy: 101, .. })
        ));
    }

    #[test]
    fn test_with_threshold_replaces_row() {
        let table = TierTable::default()
            .with_threshold(TierThreshold::new(Tier::Platinum, 500, 95))
            .and_then(|t| t.with_threshold(TierThreshold::new(Tier::Gold, 100, 85)))
            .unwrap();
        assert_eq!(table.threshold_for(Tier::Gold).unwrap().min_accuracy, 85);
        assert_eq!(table.threshold_for(Tier::Platinum).unwrap().min_accuracy, 95);
        assert_eq!(table.rows().len(), 4);
    }

    #[test]
    fn test_with_threshold_revalidates() {
        // Gold above Platinum's 80% breaks the ladder
        let err = TierTable::default()
            .with_threshold(TierThreshold::new(Tier::Gold, 100, 85))
            .unwrap_err();
        assert_eq!(
            err,
            ReputationError::UnorderedTiers {
                lower: Tier::Gold,
                upper: Tier::Platinum
            }
        );
    }

    #[test]
    fn test_table_deserializes_through_validation() {
        let yaml = "- tier: bronze\n  min_validations: 0\n  min_accuracy: 0\n- tier: gold\n  min_validations: 100\n  min_accuracy: 85\n";
        let table: TierTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.rows().len(), 2);

        let bad = "- tier: gold\n  min_validations: 100\n  min_accuracy: 85\n";
        assert!(serde_yaml::from_str::<TierTable>(bad).is_err());
    }
}

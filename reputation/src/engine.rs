//! Tier resolution over validation counters.

use serde::{Deserialize, Serialize};

use crate::tier::{Tier, TierTable, TierThreshold};

/// Raw validation counters for one validator.
///
/// Derived values (accuracy, tier) are never stored here; they are
/// recomputed from the counters on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Validations performed
    pub total_validations: u64,
    /// Validations later confirmed accurate
    pub accurate_validations: u64,
}

impl ReputationRecord {
    /// Create a record. `accurate_validations` is clamped to `total_validations`.
    pub fn new(total_validations: u64, accurate_validations: u64) -> Self {
        Self {
            total_validations,
            accurate_validations: accurate_validations.min(total_validations),
        }
    }

    /// Accuracy as a rounded percentage, `round(accurate / total * 100)`.
    ///
    /// A validator with no history has an accuracy of 0.
    pub fn accuracy_rate(&self) -> u8 {
        if self.total_validations == 0 {
            return 0;
        }
        let accurate = self.accurate_validations.min(self.total_validations) as u128;
        let total = self.total_validations as u128;
        // Round half up in integer arithmetic.
        ((accurate * 200 + total) / (total * 2)).min(100) as u8
    }
}

/// Read projection of a record, suitable for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationSnapshot {
    pub total_validations: u64,
    pub accurate_validations: u64,
    pub accuracy_rate: u8,
    pub tier: Tier,
}

/// Distance from a record to the next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierProgress {
    /// Tier being worked toward, `None` at the top of the ladder
    pub next_tier: Option<Tier>,
    /// Additional validations needed (never negative)
    pub validations_needed: u64,
    /// Additional accuracy points needed (never negative)
    pub accuracy_needed: u8,
}

/// Converts validation counters into tiers against a fixed table.
///
/// Pure: no side effects and no error paths.
#[derive(Debug, Clone, Default)]
pub struct ReputationEngine {
    table: TierTable,
}

impl ReputationEngine {
    /// Create an engine over a validated table.
    pub fn new(table: TierTable) -> Self {
        Self { table }
    }

    /// The threshold table in use.
    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// Highest tier whose minimums are both met, or the base tier.
    pub fn tier_for(&self, total_validations: u64, accuracy_rate: u8) -> Tier {
        let accuracy_rate = accuracy_rate.min(100);
        self.table
            .rows()
            .iter()
            .filter(|row| row.is_met(total_validations, accuracy_rate))
            .map(|row| row.tier)
            .max()
            .unwrap_or_else(|| self.table.base_tier())
    }

    /// Tier of a record, derived from its counters.
    pub fn tier_of(&self, record: &ReputationRecord) -> Tier {
        self.tier_for(record.total_validations, record.accuracy_rate())
    }

    /// Tier immediately above `current` in the table, if any.
    pub fn next_tier(&self, current: Tier) -> Option<Tier> {
        self.next_row(current).map(|row| row.tier)
    }

    /// What a record still needs to reach the next tier.
    pub fn progress_to_next_tier(&self, record: &ReputationRecord) -> TierProgress {
        let current = self.tier_of(record);
        match self.next_row(current) {
            Some(next) => TierProgress {
                next_tier: Some(next.tier),
                validations_needed: next.min_validations.saturating_sub(record.total_validations),
                accuracy_needed: next.min_accuracy.saturating_sub(record.accuracy_rate()),
            },
            None => TierProgress {
                next_tier: None,
                validations_needed: 0,
                accuracy_needed: 0,
            },
        }
    }

    /// Full read projection of a record.
    pub fn snapshot(&self, record: &ReputationRecord) -> ReputationSnapshot {
        ReputationSnapshot {
            total_validations: record.total_validations,
            accurate_validations: record.accurate_validations.min(record.total_validations),
            accuracy_rate: record.accuracy_rate(),
            tier: self.tier_of(record),
        }
    }

    fn next_row(&self, current: Tier) -> Option<&TierThreshold> {
        self.table.rows().iter().find(|row| row.tier > current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_platinum_engine() -> ReputationEngine {
        let table = TierTable::new(vec![
            TierThreshold::new(Tier::Bronze, 0, 0),
            TierThreshold::new(Tier::Silver, 25, 60),
            TierThreshold::new(Tier::Gold, 100, 85),
            TierThreshold::new(Tier::Platinum, 500, 95),
        ])
        .unwrap();
        ReputationEngine::new(table)
    }

    #[test]
    fn test_accuracy_rate_rounds() {
        assert_eq!(ReputationRecord::new(0, 0).accuracy_rate(), 0);
        assert_eq!(ReputationRecord::new(3, 2).accuracy_rate(), 67);
        assert_eq!(ReputationRecord::new(8, 1).accuracy_rate(), 13);
        assert_eq!(ReputationRecord::new(200, 184).accuracy_rate(), 92);
        assert_eq!(ReputationRecord::new(10, 50).accuracy_rate(), 100);
    }

    #[test]
    fn test_gold_not_platinum() {
        let engine = gold_platinum_engine();
        assert_eq!(engine.tier_for(200, 92), Tier::Gold);
    }

    #[test]
    fn test_defaults_to_base_tier() {
        let engine = ReputationEngine::default();
        assert_eq!(engine.tier_for(0, 0), Tier::Bronze);
        assert_eq!(engine.tier_for(10_000, 10), Tier::Bronze);
    }

    #[test]
    fn test_both_minimums_required() {
        let engine = ReputationEngine::default();
        assert_eq!(engine.tier_for(1_000, 65), Tier::Silver);
        assert_eq!(engine.tier_for(30, 99), Tier::Silver);
        assert_eq!(engine.tier_for(500, 80), Tier::Platinum);
    }

    #[test]
    fn test_tier_is_monotonic() {
        let engine = gold_platinum_engine();
        let counts = [0u64, 1, 24, 25, 99, 100, 101, 499, 500, 10_000];
        for &total in &counts {
            for accuracy in 0..=100u8 {
                let tier = engine.tier_for(total, accuracy);
                if accuracy < 100 {
                    assert!(engine.tier_for(total, accuracy + 1) >= tier);
                }
                assert!(engine.tier_for(total + 1, accuracy) >= tier);
            }
        }
    }

    #[test]
    fn test_next_tier() {
        let engine = ReputationEngine::default();
        assert_eq!(engine.next_tier(Tier::Bronze), Some(Tier::Silver));
        assert_eq!(engine.next_tier(Tier::Gold), Some(Tier::Platinum));
        assert_eq!(engine.next_tier(Tier::Platinum), None);
    }

    #[test]
    fn test_progress_clamped() {
        let engine = gold_platinum_engine();
        let record = ReputationRecord::new(200, 184);
        let progress = engine.progress_to_next_tier(&record);
        assert_eq!(progress.next_tier, Some(Tier::Platinum));
        assert_eq!(progress.validations_needed, 300);
        assert_eq!(progress.accuracy_needed, 3);

        // Accuracy already past Gold's bar but validations short
        let record = ReputationRecord::new(50, 50);
        let progress = engine.progress_to_next_tier(&record);
        assert_eq!(progress.next_tier, Some(Tier::Gold));
        assert_eq!(progress.validations_needed, 50);
        assert_eq!(progress.accuracy_needed, 0);
    }

    #[test]
    fn test_progress_at_top() {
        let engine = ReputationEngine::default();
        let progress = engine.progress_to_next_tier(&ReputationRecord::new(900, 900));
        assert_eq!(progress.next_tier, None);
        assert_eq!(progress.validations_needed, 0);
    }

    #[test]
    fn test_snapshot_recomputes() {
        let engine = ReputationEngine::default();
        let mut record = ReputationRecord::new(24, 24);
        assert_eq!(engine.snapshot(&record).tier, Tier::Bronze);
        record.total_validations += 1;
        record.accurate_validations += 1;
        let snapshot = engine.snapshot(&record);
        assert_eq!(snapshot.tier, Tier::Silver);
        assert_eq!(snapshot.accuracy_rate, 100);
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Durable state of one named sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub next_value: u64,
    /// Rollover epoch tag, an `MMDD` date string.
    pub rollover_value: String,
}

impl Block {
    pub fn new(next_value: u64, rollover_value: impl Into<String>) -> Self {
        Self {
            next_value,
            rollover_value: rollover_value.into(),
        }
    }
}

pub fn rollover_tag(date: NaiveDate) -> String {
    date.format("%m%d").to_string()
}

/// Bounds a sequence to `[min_value, max_value]` and restarts it once per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverPolicy {
    pub min_value: u64,
    pub max_value: u64,
}

impl RolloverPolicy {
    /// True when the projected block overflows the ceiling or belongs to an earlier day.
    pub fn should_roll_over(&self, projected: &Block, today_tag: &str) -> bool {
        projected.next_value > self.max_value || projected.rollover_value != today_tag
    }

    pub fn target(&self, today_tag: &str) -> Block {
        Block::new(self.min_value, today_tag)
    }
}

/// Applies one batch reservation to the stored block.
///
/// Returns the start of the reserved range and the block to persist. Stores call this
/// inside their read-modify-write so every backend rolls over identically.
pub fn reserve(
    current: &Block,
    batch_size: u64,
    rollover_condition: &(dyn Fn(&Block) -> bool + Send + Sync),
    rollover_target: &Block,
) -> (u64, Block) {
    let projected = Block::new(
        current.next_value + batch_size,
        current.rollover_value.clone(),
    );
    if rollover_condition(&projected) {
        let start = rollover_target.next_value;
        (
            start,
            Block::new(start + batch_size, rollover_target.rollover_value.clone()),
        )
    } else {
        (current.next_value, projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RolloverPolicy {
        RolloverPolicy {
            min_value: 1,
            max_value: 999,
        }
    }

    #[test]
    fn test_rollover_tag_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(rollover_tag(date), "0307");
    }

    #[test]
    fn test_reserve_advances_within_day() {
        let p = policy();
        let cond = move |b: &Block| p.should_roll_over(b, "0307");
        let (start, next) = reserve(&Block::new(101, "0307"), 100, &cond, &p.target("0307"));
        assert_eq!(start, 101);
        assert_eq!(next, Block::new(201, "0307"));
    }

    #[test]
    fn test_reserve_rolls_over_on_new_day() {
        let p = policy();
        let cond = move |b: &Block| p.should_roll_over(b, "0308");
        let (start, next) = reserve(&Block::new(501, "0307"), 100, &cond, &p.target("0308"));
        assert_eq!(start, 1);
        assert_eq!(next, Block::new(101, "0308"));
    }

    #[test]
    fn test_reserve_rolls_over_on_overflow() {
        let p = policy();
        let cond = move |b: &Block| p.should_roll_over(b, "0307");
        let (start, next) = reserve(&Block::new(950, "0307"), 100, &cond, &p.target("0307"));
        assert_eq!(start, 1);
        assert_eq!(next, Block::new(101, "0307"));
    }
}

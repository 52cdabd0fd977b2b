//! Thread-safe collector for per-batch token usage.
//!
//! Batch tasks run concurrently and each appends exactly one record. The
//! order of additions does not matter but no record may be lost, so every
//! append happens under a mutex.

use crate::output::{UsageRecord, UsageTotals};
use std::sync::Mutex;

/// Collects [`UsageRecord`]s from concurrent batch tasks.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch's usage.
    pub fn record(&self, usage: UsageRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(usage);
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reduce all records into totals.
    pub fn totals(&self) -> UsageTotals {
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.iter().fold(
            UsageTotals {
                records: records.len(),
                ..UsageTotals::default()
            },
            |mut acc, r| {
                acc.prompt_tokens += r.prompt_tokens;
                acc.completion_tokens += r.completion_tokens;
                acc.total_tokens += r.total_tokens;
                acc
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_accumulator_totals_zero() {
        let acc = UsageAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.totals(), UsageTotals::default());
    }

    #[test]
    fn totals_are_exact_sums() {
        let acc = UsageAccumulator::new();
        acc.record(UsageRecord::new(10, 5, 15));
        acc.record(UsageRecord::new(20, 8, 28));
        acc.record(UsageRecord::new(7, 3, 10));

        let totals = acc.totals();
        assert_eq!(totals.prompt_tokens, 37);
        assert_eq!(totals.completion_tokens, 16);
        assert_eq!(totals.total_tokens, 53);
        assert_eq!(totals.records, 3);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let acc = Arc::new(UsageAccumulator::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let acc = Arc::clone(&acc);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        acc.record(UsageRecord::new(1, 2, 3));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }

        let totals = acc.totals();
        assert_eq!(totals.records, 1600);
        assert_eq!(totals.prompt_tokens, 1600);
        assert_eq!(totals.completion_tokens, 3200);
        assert_eq!(totals.total_tokens, 4800);
    }
}

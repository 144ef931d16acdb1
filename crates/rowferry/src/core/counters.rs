//! Per-operation row accounting.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Row counts for one transfer.
///
/// `seen == written + failed + ignored` on every correct run; anything left
/// over is reported by [`TransferCounters::unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCounters {
    pub seen: u64,
    pub written: u64,
    pub failed: u64,
    pub ignored: u64,
}

impl TransferCounters {
    /// Rows seen but not accounted for. Nonzero means an accounting bug.
    pub fn unknown(&self) -> i64 {
        self.seen as i64 - self.accounted() as i64
    }

    /// Rows that reached a final state.
    pub fn accounted(&self) -> u64 {
        self.written + self.failed + self.ignored
    }
}

impl AddAssign for TransferCounters {
    fn add_assign(&mut self, other: Self) {
        self.seen += other.seen;
        self.written += other.written;
        self.failed += other.failed;
        self.ignored += other.ignored;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown() {
        let mut c = TransferCounters {
            seen: 10,
            written: 7,
            failed: 2,
            ignored: 1,
        };
        assert_eq!(c.unknown(), 0);
        c.seen += 1;
        assert_eq!(c.unknown(), 1);
    }

    #[test]
    fn test_add_assign() {
        let mut total = TransferCounters::default();
        total += TransferCounters {
            seen: 2,
            written: 2,
            ..Default::default()
        };
        total += TransferCounters {
            seen: 3,
            failed: 1,
            ignored: 2,
            ..Default::default()
        };
        assert_eq!(total.seen, 5);
        assert_eq!(total.accounted(), 5);
    }
}

//! Per-node extra data: script cost, op count, witness-size bounds and
//! timelock mixing analysis.

/// Which timelock kinds a subtree contains, and whether a conjunction
/// ever demands both kinds of the same lock class at once (which no
/// transaction can satisfy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimelockInfo {
    pub csv_with_height: bool,
    pub csv_with_time: bool,
    pub cltv_with_height: bool,
    pub cltv_with_time: bool,
    pub contains_combination: bool,
}

/// Relative locks with bit 22 set are time-based (512-second units).
pub const SEQUENCE_TIME_FLAG: u32 = 1 << 22;
/// Absolute locks at or above this are unix timestamps.
pub const LOCKTIME_TIME_THRESHOLD: u32 = 500_000_000;

impl TimelockInfo {
    pub fn from_older(value: u32) -> Self {
        TimelockInfo {
            csv_with_time: value & SEQUENCE_TIME_FLAG != 0,
            csv_with_height: value & SEQUENCE_TIME_FLAG == 0,
            ..Default::default()
        }
    }

    pub fn from_after(value: u32) -> Self {
        TimelockInfo {
            cltv_with_time: value >= LOCKTIME_TIME_THRESHOLD,
            cltv_with_height: value < LOCKTIME_TIME_THRESHOLD,
            ..Default::default()
        }
    }

    /// Combine under a conjunction: both sides must hold, so mixing a
    /// height lock with a time lock of the same class is unsatisfiable.
    pub fn combine_and(self, other: Self) -> Self {
        TimelockInfo {
            csv_with_height: self.csv_with_height || other.csv_with_height,
            csv_with_time: self.csv_with_time || other.csv_with_time,
            cltv_with_height: self.cltv_with_height || other.cltv_with_height,
            cltv_with_time: self.cltv_with_time || other.cltv_with_time,
            contains_combination: self.contains_combination
                || other.contains_combination
                || (self.csv_with_height && other.csv_with_time)
                || (self.csv_with_time && other.csv_with_height)
                || (self.cltv_with_height && other.cltv_with_time)
                || (self.cltv_with_time && other.cltv_with_height),
        }
    }

    /// Combine under a disjunction: either side alone may hold.
    pub fn combine_or(self, other: Self) -> Self {
        TimelockInfo {
            csv_with_height: self.csv_with_height || other.csv_with_height,
            csv_with_time: self.csv_with_time || other.csv_with_time,
            cltv_with_height: self.cltv_with_height || other.cltv_with_height,
            cltv_with_time: self.cltv_with_time || other.cltv_with_time,
            contains_combination: self.contains_combination || other.contains_combination,
        }
    }

    /// Combine a threshold: with `k > 1` two locks can be forced into the
    /// same satisfaction, so it behaves like a conjunction.
    pub fn combine_thresh(k: usize, items: impl Iterator<Item = Self>) -> Self {
        let mut acc = TimelockInfo::default();
        for item in items {
            acc = if k > 1 {
                acc.combine_and(item)
            } else {
                acc.combine_or(item)
            };
        }
        acc
    }
}

/// Static analysis data carried by every node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtData {
    /// Serialized script size of this subtree in bytes.
    pub pk_cost: usize,
    /// Number of opcodes (non-push elements) in the subtree's script.
    pub static_ops: usize,
    /// Upper bound on the witness bytes of a satisfaction, counting each
    /// stack element as its data plus a one-byte length prefix. `None`
    /// when the node cannot be satisfied by any witness alone.
    pub sat_size: Option<usize>,
    /// Same bound for the dissatisfaction path; `None` propagates to the
    /// parent when a child has no dissatisfaction.
    pub dissat_size: Option<usize>,
    pub timelocks: TimelockInfo,
    /// Height of this subtree (leaves are 1).
    pub height: usize,
}

/// `a + b` over optional sizes; `None` absorbs.
pub fn opt_add(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    }
}

/// Maximum of the present alternatives; `None` only when both absent.
pub fn opt_max(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_relative_locks_flag_conjunction() {
        let height = TimelockInfo::from_older(144);
        let time = TimelockInfo::from_older(SEQUENCE_TIME_FLAG | 10);
        assert!(height.combine_and(time).contains_combination);
        assert!(!height.combine_or(time).contains_combination);
    }

    #[test]
    fn absolute_lock_classification() {
        assert!(TimelockInfo::from_after(499_999_999).cltv_with_height);
        assert!(TimelockInfo::from_after(500_000_000).cltv_with_time);
    }

    #[test]
    fn thresh_k1_is_disjunction() {
        let items = [
            TimelockInfo::from_after(100),
            TimelockInfo::from_after(600_000_000),
        ];
        assert!(!TimelockInfo::combine_thresh(1, items.into_iter()).contains_combination);
        assert!(TimelockInfo::combine_thresh(2, items.into_iter()).contains_combination);
    }

    #[test]
    fn option_arithmetic() {
        assert_eq!(opt_add(Some(3), Some(4)), Some(7));
        assert_eq!(opt_add(Some(3), None), None);
        assert_eq!(opt_max(Some(3), None), Some(3));
        assert_eq!(opt_max(None, None), None);
    }
}

//! Selection strategies over a candidate UTXO list.

use rand_core::RngCore;

use crate::fees::{fee_for_vsize, tx_vsize, ScriptKind};
use crate::{Error, Utxo, DUST_THRESHOLD};

/// How candidates are ordered or searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Largest value first; fewest inputs.
    LargestFirst,
    /// Smallest value first; consolidates dust.
    SmallestFirst,
    /// Caller order, oldest first by convention.
    Fifo,
    /// Uniform shuffle; privacy-preserving default.
    Random,
    /// Exact-match search that avoids a change output when possible.
    BranchAndBound,
    /// Heuristic dispatch over the other strategies.
    Optimal,
}

/// Tunables for one selection run.
#[derive(Clone, Debug)]
pub struct SelectionParams {
    /// Amount to send, in satoshis.
    pub target: i64,
    /// Fee rate in sat/vB.
    pub fee_rate: f64,
    pub dust_threshold: i64,
    pub max_inputs: usize,
    pub allow_unconfirmed: bool,
    /// Script type of the payment output.
    pub payment_kind: ScriptKind,
    /// Script type of the change output.
    pub change_kind: ScriptKind,
    /// Search bound for branch-and-bound.
    pub max_tries: u32,
}

impl SelectionParams {
    pub fn new(target: i64, fee_rate: f64) -> Self {
        SelectionParams {
            target,
            fee_rate,
            dust_threshold: DUST_THRESHOLD,
            max_inputs: 100,
            allow_unconfirmed: false,
            payment_kind: ScriptKind::P2wpkh,
            change_kind: ScriptKind::P2wpkh,
            max_tries: 100_000,
        }
    }
}

/// A successful selection. Always satisfies
/// `total == target + change + fee` and `total >= target + fee`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<Utxo>,
    pub total: i64,
    pub fee: i64,
    pub change: i64,
}

/// Run a selection strategy over the candidates.
///
/// The RNG is consumed only by [`Strategy::Random`]; deterministic
/// strategies never touch it.
pub fn select<R: RngCore>(
    utxos: &[Utxo],
    strategy: Strategy,
    params: &SelectionParams,
    rng: &mut R,
) -> Result<Selection, Error> {
    let mut candidates: Vec<Utxo> = utxos
        .iter()
        .filter(|u| (u.confirmed || params.allow_unconfirmed) && u.value >= params.dust_threshold)
        .cloned()
        .collect();

    match strategy {
        Strategy::LargestFirst => {
            candidates.sort_by(|a, b| b.value.cmp(&a.value));
            greedy(candidates, params)
        }
        Strategy::SmallestFirst => {
            candidates.sort_by(|a, b| a.value.cmp(&b.value));
            greedy(candidates, params)
        }
        Strategy::Fifo => greedy(candidates, params),
        Strategy::Random => {
            shuffle(&mut candidates, rng);
            greedy(candidates, params)
        }
        Strategy::BranchAndBound => {
            candidates.sort_by(|a, b| b.value.cmp(&a.value));
            branch_and_bound(&candidates, params)
        }
        Strategy::Optimal => optimal(candidates, params),
    }
}

/// Heuristic dispatch: tiny wallets and high send ratios go straight to
/// largest-first; expensive fee environments justify the exact-match
/// search.
fn optimal(candidates: Vec<Utxo>, params: &SelectionParams) -> Result<Selection, Error> {
    let total_available: i64 = candidates.iter().map(|u| u.value).sum();

    if candidates.len() <= 3 {
        let mut sorted = candidates;
        sorted.sort_by(|a, b| b.value.cmp(&a.value));
        return greedy(sorted, params);
    }

    let ratio = if total_available > 0 {
        params.target as f64 / total_available as f64
    } else {
        1.0
    };

    let mut sorted = candidates;
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    if params.fee_rate > 50.0 || ratio <= 0.8 {
        match branch_and_bound(&sorted, params) {
            Ok(selection) => return Ok(selection),
            Err(Error::NoSolutionFound) => {}
            Err(other) => return Err(other),
        }
    }
    greedy(sorted, params)
}

/// Fisher-Yates with a caller-supplied RNG.
fn shuffle<R: RngCore>(utxos: &mut [Utxo], rng: &mut R) {
    for i in (1..utxos.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        utxos.swap(i, j);
    }
}

/// Fee for the current input set plus payment and change outputs.
fn fee_with_change(inputs: &[Utxo], params: &SelectionParams) -> i64 {
    let kinds: Vec<ScriptKind> = inputs.iter().map(|u| u.script_kind).collect();
    fee_for_vsize(
        tx_vsize(&kinds, &[params.payment_kind, params.change_kind]),
        params.fee_rate,
    )
}

/// Accumulate in order until the running total covers target plus the
/// recomputed fee.
fn greedy(candidates: Vec<Utxo>, params: &SelectionParams) -> Result<Selection, Error> {
    let available: i64 = candidates.iter().map(|u| u.value).sum();

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total: i64 = 0;
    for utxo in candidates {
        if selected.len() >= params.max_inputs {
            break;
        }
        total += utxo.value;
        selected.push(utxo);

        let fee = fee_with_change(&selected, params);
        if total >= params.target + fee {
            let mut change = total - params.target - fee;
            let mut final_fee = fee;
            if change < params.dust_threshold {
                // dust change is absorbed into the fee
                final_fee += change;
                change = 0;
            }
            return Ok(Selection {
                selected,
                total,
                fee: final_fee,
                change,
            });
        }
    }

    Err(Error::InsufficientFunds {
        available,
        required: params.target + fee_with_change(&selected, params),
    })
}

/// Depth-first include/exclude search over a value-descending list,
/// looking for a set whose total lands inside
/// `[target + fee, target + fee + cost_of_change]` so the change output
/// can be dropped entirely.
fn branch_and_bound(candidates: &[Utxo], params: &SelectionParams) -> Result<Selection, Error> {
    let cost_of_change =
        fee_for_vsize(params.change_kind.output_vsize(), params.fee_rate);

    struct Frame {
        index: usize,
        include: Vec<usize>,
        total: i64,
    }

    let mut best: Option<(Vec<usize>, i64, i64)> = None; // (indices, total, fee)
    let mut tries: u32 = 0;
    let mut stack = vec![Frame {
        index: 0,
        include: Vec::new(),
        total: 0,
    }];

    let remaining_after: Vec<i64> = {
        // suffix sums for pruning exhausted branches
        let mut suffix = vec![0i64; candidates.len() + 1];
        for i in (0..candidates.len()).rev() {
            suffix[i] = suffix[i + 1] + candidates[i].value;
        }
        suffix
    };

    while let Some(frame) = stack.pop() {
        tries += 1;
        if tries > params.max_tries {
            tracing::debug!(tries, "branch-and-bound try budget exhausted");
            break;
        }

        let fee = {
            let kinds: Vec<ScriptKind> = frame
                .include
                .iter()
                .map(|&i| candidates[i].script_kind)
                .collect();
            fee_for_vsize(
                tx_vsize(&kinds, &[params.payment_kind]),
                params.fee_rate,
            )
        };
        let lower = params.target + fee;
        let upper = lower + cost_of_change;

        if frame.total >= lower && frame.total <= upper {
            let waste = frame.total - lower;
            let better = match &best {
                Some((_, best_total, best_fee)) => waste < best_total - (params.target + best_fee),
                None => true,
            };
            if better {
                best = Some((frame.include.clone(), frame.total, fee));
            }
            continue;
        }
        if frame.total > upper
            || frame.index >= candidates.len()
            || frame.include.len() >= params.max_inputs
            || frame.total + remaining_after[frame.index] < lower
        {
            continue;
        }

        // exclude branch first so the include branch is explored first
        stack.push(Frame {
            index: frame.index + 1,
            include: frame.include.clone(),
            total: frame.total,
        });
        let mut with = frame.include;
        with.push(frame.index);
        stack.push(Frame {
            index: frame.index + 1,
            include: with,
            total: frame.total + candidates[frame.index].value,
        });
    }

    match best {
        Some((indices, total, _)) => {
            // the excess over target is absorbed into the fee; no change
            let selected: Vec<Utxo> = indices.iter().map(|&i| candidates[i].clone()).collect();
            Ok(Selection {
                selected,
                total,
                fee: total - params.target,
                change: 0,
            })
        }
        None => Err(Error::NoSolutionFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // deterministic RNG for the Random strategy tests
    struct XorShift(u64);
    impl RngCore for XorShift {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }
        fn next_u64(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn coins(values: &[i64]) -> Vec<Utxo> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Utxo::confirmed_p2wpkh([i as u8; 32], 0, v))
            .collect()
    }

    fn check_accounting(selection: &Selection, params: &SelectionParams) {
        assert_eq!(
            selection.total,
            params.target + selection.change + selection.fee
        );
        assert!(selection.total >= params.target + selection.fee);
        assert!(selection.change == 0 || selection.change >= params.dust_threshold);
    }

    #[test]
    fn largest_first_picks_biggest() {
        let utxos = coins(&[10_000, 50_000, 20_000]);
        let params = SelectionParams::new(30_000, 1.0);
        let selection = select(&utxos, Strategy::LargestFirst, &params, &mut XorShift(1)).unwrap();
        assert_eq!(selection.selected[0].value, 50_000);
        assert_eq!(selection.selected.len(), 1);
        check_accounting(&selection, &params);
    }

    #[test]
    fn smallest_first_consolidates() {
        let utxos = coins(&[10_000, 50_000, 20_000]);
        let params = SelectionParams::new(25_000, 1.0);
        let selection =
            select(&utxos, Strategy::SmallestFirst, &params, &mut XorShift(1)).unwrap();
        assert_eq!(selection.selected[0].value, 10_000);
        assert!(selection.selected.len() >= 2);
        check_accounting(&selection, &params);
    }

    #[test]
    fn fifo_respects_caller_order() {
        let utxos = coins(&[10_000, 50_000, 20_000]);
        let params = SelectionParams::new(5_000, 1.0);
        let selection = select(&utxos, Strategy::Fifo, &params, &mut XorShift(1)).unwrap();
        assert_eq!(selection.selected[0].value, 10_000);
    }

    #[test]
    fn unconfirmed_and_dust_filtered() {
        let mut utxos = coins(&[600, 40_000]);
        utxos[0].value = 500; // dust, dropped
        utxos[1].confirmed = false; // unconfirmed, dropped by default
        let params = SelectionParams::new(10_000, 1.0);
        assert!(matches!(
            select(&utxos, Strategy::LargestFirst, &params, &mut XorShift(1)),
            Err(Error::InsufficientFunds { .. })
        ));

        let mut relaxed = params.clone();
        relaxed.allow_unconfirmed = true;
        assert!(select(&utxos, Strategy::LargestFirst, &relaxed, &mut XorShift(1)).is_ok());
    }

    #[test]
    fn dust_change_absorbed_into_fee() {
        // fee for 1-in/2-out p2wpkh is 140 sat, so change would be 460,
        // below the 546 dust floor
        let utxos = coins(&[30_600]);
        let params = SelectionParams::new(30_000, 1.0);
        let selection = select(&utxos, Strategy::LargestFirst, &params, &mut XorShift(1)).unwrap();
        assert_eq!(selection.change, 0);
        assert_eq!(selection.fee, 600);
        check_accounting(&selection, &params);
    }

    #[test]
    fn max_inputs_bounds_selection() {
        let utxos = coins(&[1_000; 50]);
        let mut params = SelectionParams::new(20_000, 1.0);
        params.max_inputs = 5;
        assert!(matches!(
            select(&utxos, Strategy::SmallestFirst, &params, &mut XorShift(1)),
            Err(Error::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn random_is_a_permutation() {
        let utxos = coins(&[10_000, 20_000, 30_000, 40_000]);
        let params = SelectionParams::new(99_000, 0.0);
        let selection = select(&utxos, Strategy::Random, &params, &mut XorShift(42)).unwrap();
        let mut values: Vec<i64> = selection.selected.iter().map(|u| u.value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![10_000, 20_000, 30_000, 40_000]);
        check_accounting(&selection, &params);
    }

    #[test]
    fn branch_and_bound_finds_changeless_match() {
        // fee for 2-in/1-out: 10 + 2*68 + 31 = 177 sat at 1 sat/vB
        let utxos = coins(&[100_000, 60_123, 40_054, 25_000]);
        let params = SelectionParams::new(100_000, 1.0);
        let selection =
            select(&utxos, Strategy::BranchAndBound, &params, &mut XorShift(1)).unwrap();
        assert_eq!(selection.change, 0);
        let mut values: Vec<i64> = selection.selected.iter().map(|u| u.value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![40_054, 60_123]);
        check_accounting(&selection, &params);
    }

    #[test]
    fn branch_and_bound_gives_up_cleanly() {
        let utxos = coins(&[500_000]);
        // no subset lands in the narrow window above 100_000
        let params = SelectionParams::new(100_000, 1.0);
        assert_eq!(
            select(&utxos, Strategy::BranchAndBound, &params, &mut XorShift(1)).unwrap_err(),
            Error::NoSolutionFound
        );
    }

    #[test]
    fn optimal_dispatch_thresholds() {
        // <= 3 candidates: behaves like largest-first
        let few = coins(&[10_000, 20_000, 30_000]);
        let params = SelectionParams::new(15_000, 1.0);
        let a = select(&few, Strategy::Optimal, &params, &mut XorShift(1)).unwrap();
        let b = select(&few, Strategy::LargestFirst, &params, &mut XorShift(1)).unwrap();
        assert_eq!(a, b);

        // many candidates, high ratio: still largest-first
        let many = coins(&[30_000, 25_000, 20_000, 15_000, 10_000]);
        let hot = SelectionParams::new(90_000, 1.0);
        let c = select(&many, Strategy::Optimal, &hot, &mut XorShift(1)).unwrap();
        let d = select(&many, Strategy::LargestFirst, &hot, &mut XorShift(1)).unwrap();
        assert_eq!(c, d);

        // low ratio: branch-and-bound runs and may find a changeless set,
        // falling back to largest-first otherwise; either way it succeeds
        let cold = SelectionParams::new(20_000, 1.0);
        assert!(select(&many, Strategy::Optimal, &cold, &mut XorShift(1)).is_ok());
    }

    #[test]
    fn insufficient_funds_reports_amounts() {
        let utxos = coins(&[1_000]);
        let params = SelectionParams::new(10_000, 1.0);
        match select(&utxos, Strategy::LargestFirst, &params, &mut XorShift(1)) {
            Err(Error::InsufficientFunds {
                available,
                required,
            }) => {
                assert_eq!(available, 1_000);
                assert!(required > 10_000);
            }
            other => panic!("expected insufficient funds, got {other:?}"),
        }
    }
}

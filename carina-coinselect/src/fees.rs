//! Virtual-size and fee arithmetic: vsize tables, RBF replacement and
//! CPFP package rates.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Fixed transaction overhead in virtual bytes (version, counts, lock
/// time, segwit marker amortized).
pub const TX_OVERHEAD_VSIZE: usize = 10;

/// The script templates the fee model knows input/output sizes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl ScriptKind {
    /// Virtual size of one input spending this script type.
    pub fn input_vsize(self) -> usize {
        match self {
            ScriptKind::P2pkh => 148,
            ScriptKind::P2sh => 91,
            ScriptKind::P2wpkh => 68,
            ScriptKind::P2wsh => 104,
            ScriptKind::P2tr => 57,
        }
    }

    /// Virtual size of one output paying this script type.
    pub fn output_vsize(self) -> usize {
        match self {
            ScriptKind::P2pkh => 34,
            ScriptKind::P2sh => 32,
            ScriptKind::P2wpkh => 31,
            ScriptKind::P2wsh => 43,
            ScriptKind::P2tr => 43,
        }
    }
}

/// `10 + Σ input_vsize + Σ output_vsize`.
pub fn tx_vsize(inputs: &[ScriptKind], outputs: &[ScriptKind]) -> usize {
    TX_OVERHEAD_VSIZE
        + inputs.iter().map(|k| k.input_vsize()).sum::<usize>()
        + outputs.iter().map(|k| k.output_vsize()).sum::<usize>()
}

/// Fee for a virtual size at a sat/vB rate, rounded up.
pub fn fee_for_vsize(vsize: usize, fee_rate: f64) -> i64 {
    (vsize as f64 * fee_rate).ceil() as i64
}

/// BIP-125 rule: a replacement must pay the original fee plus its own
/// relay cost at the minimum rate.
pub fn is_fee_sufficient_for_replacement(
    new_fee: i64,
    original_fee: i64,
    new_tx_vsize: usize,
    min_relay_rate: f64,
) -> bool {
    new_fee >= original_fee + fee_for_vsize(new_tx_vsize, min_relay_rate)
}

/// [`is_fee_sufficient_for_replacement`] as a checked operation.
pub fn check_replacement_fee(
    new_fee: i64,
    original_fee: i64,
    new_tx_vsize: usize,
    min_relay_rate: f64,
) -> Result<(), Error> {
    let required = original_fee + fee_for_vsize(new_tx_vsize, min_relay_rate);
    if new_fee >= required {
        Ok(())
    } else {
        Err(Error::ReplacementFeeTooLow {
            fee: new_fee,
            required,
        })
    }
}

/// Child fee that lifts a package `(parent + child)` to the target rate:
/// solve `(parent_fee + child_fee) / (parent_vsize + child_vsize) >=
/// package_rate` for the child, clamped at zero when the parent already
/// pays enough.
pub fn cpfp_child_fee(
    parent_fee: i64,
    parent_vsize: usize,
    child_vsize: usize,
    package_rate: f64,
) -> i64 {
    let package_fee = fee_for_vsize(parent_vsize + child_vsize, package_rate);
    (package_fee - parent_fee).max(0)
}

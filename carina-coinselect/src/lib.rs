//! UTXO coin selection and fee arithmetic.
//!
//! Selection is pure: the caller passes a bounded candidate list, a
//! strategy and the fee parameters, and receives the chosen coins plus the
//! resulting fee and change. Nothing here talks to a chain source.

pub mod fees;
pub mod select;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fees::{
    check_replacement_fee, cpfp_child_fee, fee_for_vsize, is_fee_sufficient_for_replacement,
    tx_vsize, ScriptKind, TX_OVERHEAD_VSIZE,
};
pub use select::{select, Selection, SelectionParams, Strategy};

/// Outputs below this many satoshis are considered economically
/// unspendable.
pub const DUST_THRESHOLD: i64 = 546;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("insufficient funds: {available} sat available, {required} sat required")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("no branch-and-bound solution within bounds")]
    NoSolutionFound,

    #[error("replacement fee {fee} sat is below the required {required} sat")]
    ReplacementFeeTooLow { fee: i64, required: i64 },
}

/// An unspent output as the wallet tracks it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: [u8; 32],
    pub vout: u32,
    /// Value in satoshis.
    pub value: i64,
    pub confirmed: bool,
    /// The script type, which fixes the input's virtual size.
    pub script_kind: ScriptKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_pubkey: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,
    /// Whether the funding transaction signals BIP-125 replaceability.
    #[serde(default)]
    pub rbf: bool,
}

impl Utxo {
    /// A confirmed P2WPKH coin; the common case in tests and examples.
    pub fn confirmed_p2wpkh(txid: [u8; 32], vout: u32, value: i64) -> Self {
        Utxo {
            txid,
            vout,
            value,
            confirmed: true,
            script_kind: ScriptKind::P2wpkh,
            script_pubkey: None,
            derivation_path: None,
            rbf: false,
        }
    }
}

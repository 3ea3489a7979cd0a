//! Transaction model and consensus encoding for the Bitcoin lineage.
//!
//! The [`Transaction`] type carries the shared wire format (legacy and
//! SegWit); [`sighash`] computes the digests signatures commit to under the
//! legacy, BIP-143 and BIP-341 schemes; [`dash`] and [`zcash`] cover the
//! two variant lineages; [`builder`] assembles transactions the way a
//! wallet does.

pub mod builder;
pub mod codec;
pub mod dash;
pub mod script;
pub mod sighash;
pub mod transaction;
pub mod zcash;

use thiserror::Error;

pub use builder::TransactionBuilder;
pub use script::{Script, ScriptElement};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput, Witness};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("varint is not minimally encoded")]
    NonCanonicalVarInt,

    #[error("{0} trailing bytes after a complete structure")]
    TrailingBytes(usize),

    #[error("unsupported segwit flag {0:#04x}")]
    UnsupportedSegwitFlag(u8),

    #[error("witness count {witnesses} does not match input count {inputs}")]
    WitnessCountMismatch { witnesses: usize, inputs: usize },

    #[error("input index {index} out of range for {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },

    #[error("{prevouts} prevouts supplied for {inputs} inputs")]
    PrevoutCountMismatch { prevouts: usize, inputs: usize },

    #[error("sighash type {0:#04x} is not defined")]
    UnknownSighashType(u8),

    #[error("output value {0} is negative")]
    NegativeValue(i64),

    #[error("push of {0} bytes exceeds the script limit")]
    OversizedPush(usize),

    #[error("malformed script push opcode")]
    MalformedPush,

    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("extra payload is only valid for special transaction versions")]
    UnexpectedExtraPayload,
}

//! Ergonomic transaction assembly.

use crate::transaction::{OutPoint, Transaction, TxInput, TxOutput, Witness};
use crate::Error;

/// Default sequence for inputs that opt in to BIP-125 replacement.
pub const RBF_SEQUENCE: u32 = 0xffff_fffd;
/// Default sequence for final (non-replaceable) inputs.
pub const FINAL_SEQUENCE: u32 = 0xffff_ffff;

/// Chained builder producing a frozen [`Transaction`].
///
/// Witnesses are attached after signing via
/// [`Transaction::witnesses`]; the builder itself only shapes the
/// skeleton the sighash functions run over.
pub struct TransactionBuilder {
    version: i32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    rbf: bool,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        TransactionBuilder {
            version: 2,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            rbf: false,
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Spend an outpoint with the default sequence.
    pub fn input(mut self, previous_output: OutPoint) -> Self {
        self.inputs
            .push(TxInput::new(previous_output, FINAL_SEQUENCE));
        self
    }

    /// Spend an outpoint with an explicit sequence.
    pub fn input_with_sequence(mut self, previous_output: OutPoint, sequence: u32) -> Self {
        self.inputs.push(TxInput::new(previous_output, sequence));
        self
    }

    pub fn output(mut self, value: i64, script_pubkey: Vec<u8>) -> Self {
        self.outputs.push(TxOutput::new(value, script_pubkey));
        self
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Signal replaceability on every input built with the default
    /// sequence.
    pub fn replace_by_fee(mut self) -> Self {
        self.rbf = true;
        self
    }

    pub fn build(self) -> Result<Transaction, Error> {
        if self.inputs.is_empty() {
            return Err(Error::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(Error::NoOutputs);
        }
        for output in &self.outputs {
            if output.value < 0 {
                return Err(Error::NegativeValue(output.value));
            }
        }

        let mut inputs = self.inputs;
        if self.rbf {
            for input in inputs.iter_mut() {
                if input.sequence == FINAL_SEQUENCE {
                    input.sequence = RBF_SEQUENCE;
                }
            }
        }

        Ok(Transaction {
            version: self.version,
            inputs,
            outputs: self.outputs,
            witnesses: Vec::new(),
            lock_time: self.lock_time,
        })
    }
}

/// Attach signed witness stacks to a frozen transaction, one per input.
pub fn attach_witnesses(tx: &mut Transaction, witnesses: Vec<Witness>) -> Result<(), Error> {
    if witnesses.len() != tx.inputs.len() {
        return Err(Error::WitnessCountMismatch {
            witnesses: witnesses.len(),
            inputs: tx.inputs.len(),
        });
    }
    tx.witnesses = witnesses;
    Ok(())
}

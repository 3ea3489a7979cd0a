//! Zcash Sapling (v4) transparent transactions and the ZIP-243 signature
//! hash.
//!
//! Only transparent spends are modeled; the shielded vectors serialize
//! empty, which is exactly what a transparent-only wallet emits.

use carina_crypto::hash::{blake2b256_personal, Hash};

use crate::codec::{write_bytes, write_varint, Reader};
use crate::transaction::{TxInput, TxOutput};
use crate::Error;

pub const SAPLING_TX_VERSION: i32 = 4;
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892f_2085;
pub const SAPLING_BRANCH_ID: u32 = 0x76b8_09bb;

const PREVOUTS_PERSONAL: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONAL: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONAL: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONAL_PREFIX: &[u8; 12] = b"ZcashSigHash";

/// A Sapling-era transaction with transparent inputs and outputs only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZcashTransaction {
    pub version: i32,
    pub version_group_id: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    pub expiry_height: u32,
    pub value_balance: i64,
}

impl ZcashTransaction {
    pub fn sapling(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
        expiry_height: u32,
    ) -> Self {
        ZcashTransaction {
            version: SAPLING_TX_VERSION,
            version_group_id: SAPLING_VERSION_GROUP_ID,
            inputs,
            outputs,
            lock_time,
            expiry_height,
            value_balance: 0,
        }
    }

    /// v4 wire serialization: overwinter-flagged header, version group id,
    /// transparent vectors, then the (empty) shielded vectors.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let header = 0x8000_0000u32 | (self.version as u32);
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(&self.version_group_id.to_le_bytes());

        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.previous_output.txid);
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_bytes(&mut out, &input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_bytes(&mut out, &output.script_pubkey);
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.expiry_height.to_le_bytes());
        out.extend_from_slice(&self.value_balance.to_le_bytes());
        write_varint(&mut out, 0); // shielded spends
        write_varint(&mut out, 0); // shielded outputs
        write_varint(&mut out, 0); // joinsplits
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader::new(bytes);
        let header = reader.u32_le()?;
        let version = (header & 0x7fff_ffff) as i32;
        let version_group_id = reader.u32_le()?;

        let input_count = reader.varint()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            inputs.push(TxInput {
                previous_output: crate::transaction::OutPoint {
                    txid: reader.array()?,
                    vout: reader.u32_le()?,
                },
                script_sig: reader.bytes()?,
                sequence: reader.u32_le()?,
            });
        }
        let output_count = reader.varint()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            outputs.push(TxOutput {
                value: reader.i64_le()?,
                script_pubkey: reader.bytes()?,
            });
        }

        let lock_time = reader.u32_le()?;
        let expiry_height = reader.u32_le()?;
        let value_balance = reader.i64_le()?;
        for _ in 0..3 {
            if reader.varint()? != 0 {
                return Err(Error::UnexpectedExtraPayload);
            }
        }
        reader.finish()?;
        Ok(ZcashTransaction {
            version,
            version_group_id,
            inputs,
            outputs,
            lock_time,
            expiry_height,
            value_balance,
        })
    }
}

/// The transparent input being signed.
#[derive(Clone, Debug)]
pub struct TransparentInput<'a> {
    pub index: usize,
    pub script_code: &'a [u8],
    pub amount: i64,
}

fn personalized(personal: &[u8; 16], data: &[u8]) -> Hash<32> {
    blake2b256_personal(personal, data)
}

/// ZIP-243 signature hash: BLAKE2b-256 with the
/// `"ZcashSigHash" || LE32(branch_id)` personalization.
pub fn zip243_sighash(
    tx: &ZcashTransaction,
    branch_id: u32,
    hash_type: u32,
    input: Option<TransparentInput>,
) -> Result<Hash<32>, Error> {
    let zeros = [0u8; 32];

    let hash_prevouts = if tx.inputs.is_empty() {
        Hash::new(zeros)
    } else {
        let mut buf = Vec::with_capacity(36 * tx.inputs.len());
        for txin in &tx.inputs {
            buf.extend_from_slice(&txin.previous_output.txid);
            buf.extend_from_slice(&txin.previous_output.vout.to_le_bytes());
        }
        personalized(PREVOUTS_PERSONAL, &buf)
    };

    let hash_sequence = if tx.inputs.is_empty() {
        Hash::new(zeros)
    } else {
        let mut buf = Vec::with_capacity(4 * tx.inputs.len());
        for txin in &tx.inputs {
            buf.extend_from_slice(&txin.sequence.to_le_bytes());
        }
        personalized(SEQUENCE_PERSONAL, &buf)
    };

    let hash_outputs = if tx.outputs.is_empty() {
        Hash::new(zeros)
    } else {
        let mut buf = Vec::new();
        for txout in &tx.outputs {
            buf.extend_from_slice(&txout.value.to_le_bytes());
            write_bytes(&mut buf, &txout.script_pubkey);
        }
        personalized(OUTPUTS_PERSONAL, &buf)
    };

    let mut data = Vec::new();
    let header = 0x8000_0000u32 | (tx.version as u32);
    data.extend_from_slice(&header.to_le_bytes());
    data.extend_from_slice(&tx.version_group_id.to_le_bytes());
    data.extend_from_slice(hash_prevouts.as_ref());
    data.extend_from_slice(hash_sequence.as_ref());
    data.extend_from_slice(hash_outputs.as_ref());
    data.extend_from_slice(&zeros); // joinsplits
    data.extend_from_slice(&zeros); // shielded spends
    data.extend_from_slice(&zeros); // shielded outputs
    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&tx.expiry_height.to_le_bytes());
    data.extend_from_slice(&tx.value_balance.to_le_bytes());
    data.extend_from_slice(&hash_type.to_le_bytes());

    if let Some(input) = input {
        let txin = tx
            .inputs
            .get(input.index)
            .ok_or(Error::InputIndexOutOfRange {
                index: input.index,
                inputs: tx.inputs.len(),
            })?;
        data.extend_from_slice(&txin.previous_output.txid);
        data.extend_from_slice(&txin.previous_output.vout.to_le_bytes());
        write_bytes(&mut data, input.script_code);
        data.extend_from_slice(&input.amount.to_le_bytes());
        data.extend_from_slice(&txin.sequence.to_le_bytes());
    }

    let mut personal = [0u8; 16];
    personal[..12].copy_from_slice(SIGHASH_PERSONAL_PREFIX);
    personal[12..].copy_from_slice(&branch_id.to_le_bytes());
    Ok(blake2b256_personal(&personal, &data))
}

//! Signature-hash computation: legacy, BIP-143 (SegWit v0) and BIP-341
//! (Taproot key path).

use carina_crypto::hash::{sha256, sha256d, Hash, TaggedHasher};

use crate::codec::{write_bytes, write_varint};
use crate::transaction::{Transaction, TxInput, TxOutput};
use crate::Error;

pub const SIGHASH_DEFAULT: u8 = 0x00;
pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Which outputs a signature commits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SighashBase {
    All,
    None,
    Single,
}

/// A parsed SIGHASH flag set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SighashType {
    pub base: SighashBase,
    pub anyone_can_pay: bool,
}

impl SighashType {
    pub const ALL: SighashType = SighashType {
        base: SighashBase::All,
        anyone_can_pay: false,
    };

    /// Legacy/BIP-143 interpretation: the low five bits pick the base
    /// (unknown values behave as ALL), bit 0x80 is ANYONECANPAY.
    pub fn from_consensus_u32(raw: u32) -> Self {
        let base = match raw as u8 & 0x1f {
            SIGHASH_NONE => SighashBase::None,
            SIGHASH_SINGLE => SighashBase::Single,
            _ => SighashBase::All,
        };
        SighashType {
            base,
            anyone_can_pay: raw as u8 & SIGHASH_ANYONECANPAY != 0,
        }
    }

    /// BIP-341 interpretation: only the eight defined bytes are legal and
    /// `0x00` (DEFAULT) means ALL.
    pub fn from_taproot_u8(raw: u8) -> Result<Self, Error> {
        let base = match raw & 0x03 {
            0x00 if raw == SIGHASH_DEFAULT => SighashBase::All,
            SIGHASH_ALL => SighashBase::All,
            SIGHASH_NONE => SighashBase::None,
            SIGHASH_SINGLE => SighashBase::Single,
            _ => return Err(Error::UnknownSighashType(raw)),
        };
        if raw & !(0x03 | SIGHASH_ANYONECANPAY) != 0 {
            return Err(Error::UnknownSighashType(raw));
        }
        Ok(SighashType {
            base,
            anyone_can_pay: raw & SIGHASH_ANYONECANPAY != 0,
        })
    }
}

/// The value 1 as a 32-byte little-endian integer, the digest the legacy
/// scheme returns for the SIGHASH_SINGLE out-of-range consensus bug.
fn uint256_one() -> Hash<32> {
    let mut one = [0u8; 32];
    one[0] = 0x01;
    Hash::new(one)
}

fn check_input_index(tx: &Transaction, input_index: usize) -> Result<(), Error> {
    if input_index >= tx.inputs.len() {
        return Err(Error::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.inputs.len(),
        });
    }
    Ok(())
}

/// Legacy (pre-SegWit) signature hash.
///
/// `script_code` replaces the signed input's script; every other input
/// script is emptied. SIGHASH_SINGLE with an input index at or beyond the
/// outputs returns the 32-byte integer 1, preserving the consensus bug.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> Result<Hash<32>, Error> {
    check_input_index(tx, input_index)?;
    let parsed = SighashType::from_consensus_u32(hash_type);

    if parsed.base == SighashBase::Single && input_index >= tx.outputs.len() {
        return Ok(uint256_one());
    }

    let inputs: Vec<TxInput> = if parsed.anyone_can_pay {
        let signed = &tx.inputs[input_index];
        vec![TxInput {
            previous_output: signed.previous_output.clone(),
            script_sig: script_code.to_vec(),
            sequence: signed.sequence,
        }]
    } else {
        tx.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| TxInput {
                previous_output: input.previous_output.clone(),
                script_sig: if i == input_index {
                    script_code.to_vec()
                } else {
                    Vec::new()
                },
                sequence: if i == input_index || parsed.base == SighashBase::All {
                    input.sequence
                } else {
                    0
                },
            })
            .collect()
    };

    let outputs: Vec<TxOutput> = match parsed.base {
        SighashBase::All => tx.outputs.clone(),
        SighashBase::None => Vec::new(),
        SighashBase::Single => tx
            .outputs
            .iter()
            .take(input_index + 1)
            .enumerate()
            .map(|(i, output)| {
                if i == input_index {
                    output.clone()
                } else {
                    // emptied outputs serialize as value -1 + empty script
                    TxOutput {
                        value: -1,
                        script_pubkey: Vec::new(),
                    }
                }
            })
            .collect(),
    };

    let masked = Transaction {
        version: tx.version,
        inputs,
        outputs,
        witnesses: Vec::new(),
        lock_time: tx.lock_time,
    };

    let mut preimage = masked.serialize_legacy();
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(sha256d(&preimage))
}

/// BIP-143 signature hash for SegWit v0 inputs.
pub fn bip143_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: i64,
    hash_type: u32,
) -> Result<Hash<32>, Error> {
    check_input_index(tx, input_index)?;
    let parsed = SighashType::from_consensus_u32(hash_type);
    let zeros = [0u8; 32];

    let hash_prevouts = if parsed.anyone_can_pay {
        Hash::new(zeros)
    } else {
        let mut buf = Vec::with_capacity(36 * tx.inputs.len());
        for input in &tx.inputs {
            buf.extend_from_slice(&input.previous_output.txid);
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
        }
        sha256d(&buf)
    };

    let hash_sequence = if parsed.anyone_can_pay || parsed.base != SighashBase::All {
        Hash::new(zeros)
    } else {
        let mut buf = Vec::with_capacity(4 * tx.inputs.len());
        for input in &tx.inputs {
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        sha256d(&buf)
    };

    let hash_outputs = match parsed.base {
        SighashBase::All => {
            let mut buf = Vec::new();
            for output in &tx.outputs {
                output.write(&mut buf);
            }
            sha256d(&buf)
        }
        // unlike legacy, an out-of-range SINGLE masks to zeros
        SighashBase::Single if input_index < tx.outputs.len() => {
            let mut buf = Vec::new();
            tx.outputs[input_index].write(&mut buf);
            sha256d(&buf)
        }
        _ => Hash::new(zeros),
    };

    let signed = &tx.inputs[input_index];
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(hash_prevouts.as_ref());
    preimage.extend_from_slice(hash_sequence.as_ref());
    preimage.extend_from_slice(&signed.previous_output.txid);
    preimage.extend_from_slice(&signed.previous_output.vout.to_le_bytes());
    write_bytes(&mut preimage, script_code);
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&signed.sequence.to_le_bytes());
    preimage.extend_from_slice(hash_outputs.as_ref());
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(sha256d(&preimage))
}

/// BIP-341 key-path signature hash under the `TapSighash` tag.
///
/// `prevouts` must carry the value and scriptPubKey of every input being
/// spent. `SIGHASH_DEFAULT` (0x00) commits like ALL but keeps its distinct
/// byte in the preimage.
pub fn bip341_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOutput],
    hash_type: u8,
    annex: Option<&[u8]>,
) -> Result<Hash<32>, Error> {
    check_input_index(tx, input_index)?;
    if prevouts.len() != tx.inputs.len() {
        return Err(Error::PrevoutCountMismatch {
            prevouts: prevouts.len(),
            inputs: tx.inputs.len(),
        });
    }
    let parsed = SighashType::from_taproot_u8(hash_type)?;

    let mut hasher = TaggedHasher::new("TapSighash");
    hasher.input(&[0x00]); // epoch
    hasher.input(&[hash_type]);
    hasher.input(&tx.version.to_le_bytes());
    hasher.input(&tx.lock_time.to_le_bytes());

    if !parsed.anyone_can_pay {
        let mut prevouts_buf = Vec::with_capacity(36 * tx.inputs.len());
        let mut amounts_buf = Vec::with_capacity(8 * tx.inputs.len());
        let mut scripts_buf = Vec::new();
        let mut sequences_buf = Vec::with_capacity(4 * tx.inputs.len());
        for (input, prevout) in tx.inputs.iter().zip(prevouts) {
            prevouts_buf.extend_from_slice(&input.previous_output.txid);
            prevouts_buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            amounts_buf.extend_from_slice(&prevout.value.to_le_bytes());
            write_bytes(&mut scripts_buf, &prevout.script_pubkey);
            sequences_buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        hasher.input(sha256(&prevouts_buf).as_ref());
        hasher.input(sha256(&amounts_buf).as_ref());
        hasher.input(sha256(&scripts_buf).as_ref());
        hasher.input(sha256(&sequences_buf).as_ref());
    }

    if parsed.base == SighashBase::All {
        let mut outputs_buf = Vec::new();
        for output in &tx.outputs {
            output.write(&mut outputs_buf);
        }
        hasher.input(sha256(&outputs_buf).as_ref());
    }

    let spend_type: u8 = u8::from(annex.is_some());
    hasher.input(&[spend_type]);

    if parsed.anyone_can_pay {
        let signed = &tx.inputs[input_index];
        let prevout = &prevouts[input_index];
        hasher.input(&signed.previous_output.txid);
        hasher.input(&signed.previous_output.vout.to_le_bytes());
        hasher.input(&prevout.value.to_le_bytes());
        let mut spk = Vec::new();
        write_bytes(&mut spk, &prevout.script_pubkey);
        hasher.input(&spk);
        hasher.input(&signed.sequence.to_le_bytes());
    } else {
        hasher.input(&(input_index as u32).to_le_bytes());
    }

    if let Some(annex) = annex {
        let mut buf = Vec::with_capacity(annex.len() + 9);
        write_varint(&mut buf, annex.len() as u64);
        buf.extend_from_slice(annex);
        hasher.input(sha256(&buf).as_ref());
    }

    if parsed.base == SighashBase::Single {
        if input_index >= tx.outputs.len() {
            return Err(Error::InputIndexOutOfRange {
                index: input_index,
                inputs: tx.outputs.len(),
            });
        }
        let mut buf = Vec::new();
        tx.outputs[input_index].write(&mut buf);
        hasher.input(sha256(&buf).as_ref());
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, Witness};

    fn two_in_two_out() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![
                TxInput::new(OutPoint::new([0x11; 32], 0), 0xffff_ffff),
                TxInput::new(OutPoint::new([0x22; 32], 1), 0xffff_fffe),
            ],
            outputs: vec![
                TxOutput::new(50_000, vec![0x51]),
                TxOutput::new(25_000, vec![0x52]),
            ],
            witnesses: Vec::new(),
            lock_time: 0,
        }
    }

    #[test]
    fn single_bug_returns_one() {
        let tx = Transaction {
            outputs: vec![TxOutput::new(50_000, vec![0x51])],
            ..two_in_two_out()
        };
        // input 1 signs SINGLE but only output 0 exists
        let digest = legacy_sighash(&tx, 1, &[], SIGHASH_SINGLE as u32).unwrap();
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(digest, Hash::new(one));
    }

    #[test]
    fn input_index_checked_first() {
        let tx = two_in_two_out();
        assert!(matches!(
            legacy_sighash(&tx, 5, &[], SIGHASH_ALL as u32),
            Err(Error::InputIndexOutOfRange { index: 5, inputs: 2 })
        ));
    }

    #[test]
    fn legacy_all_matches_manual_preimage() {
        let tx = two_in_two_out();
        let script_code = hex::decode("76a914cccccccccccccccccccccccccccccccccccccccc88ac").unwrap();
        let digest = legacy_sighash(&tx, 0, &script_code, SIGHASH_ALL as u32).unwrap();

        // independently build the masked serialization
        let mut masked = tx.clone();
        masked.inputs[0].script_sig = script_code;
        masked.inputs[1].script_sig = Vec::new();
        let mut preimage = masked.serialize_legacy();
        preimage.extend_from_slice(&1u32.to_le_bytes());
        assert_eq!(digest, sha256d(&preimage));
    }

    #[test]
    fn legacy_none_zeroes_other_sequences() {
        let tx = two_in_two_out();
        let a = legacy_sighash(&tx, 0, &[0x51], SIGHASH_NONE as u32).unwrap();

        let mut resequenced = tx.clone();
        resequenced.inputs[1].sequence = 0;
        let b = legacy_sighash(&resequenced, 0, &[0x51], SIGHASH_NONE as u32).unwrap();
        assert_eq!(a, b);

        // under ALL the change is visible
        let c = legacy_sighash(&tx, 0, &[0x51], SIGHASH_ALL as u32).unwrap();
        let d = legacy_sighash(&resequenced, 0, &[0x51], SIGHASH_ALL as u32).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn bip143_native_p2wpkh_vector() {
        // the reference transaction from the BIP-143 example
        let mut txid0 = [0u8; 32];
        hex::decode_to_slice(
            "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f",
            &mut txid0,
        )
        .unwrap();
        let mut txid1 = [0u8; 32];
        hex::decode_to_slice(
            "ef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a",
            &mut txid1,
        )
        .unwrap();
        let tx = Transaction {
            version: 1,
            inputs: vec![
                TxInput::new(OutPoint::new(txid0, 0), 0xffff_ffee),
                TxInput::new(OutPoint::new(txid1, 1), 0xffff_ffff),
            ],
            outputs: vec![
                TxOutput::new(
                    112_340_000,
                    hex::decode("76a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac").unwrap(),
                ),
                TxOutput::new(
                    223_450_000,
                    hex::decode("76a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac").unwrap(),
                ),
            ],
            witnesses: Vec::new(),
            lock_time: 17,
        };
        let script_code =
            hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
        let digest = bip143_sighash(&tx, 1, &script_code, 600_000_000, SIGHASH_ALL as u32).unwrap();
        assert_eq!(
            digest.to_string(),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    #[test]
    fn bip143_single_out_of_range_uses_zeros() {
        let tx = Transaction {
            outputs: vec![TxOutput::new(50_000, vec![0x51])],
            ..two_in_two_out()
        };
        // must not hit the legacy bug path; digest is a normal hash
        let digest = bip143_sighash(&tx, 1, &[0x51], 1000, SIGHASH_SINGLE as u32).unwrap();
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_ne!(digest, Hash::new(one));
    }

    #[test]
    fn taproot_default_equals_all() {
        let mut tx = two_in_two_out();
        tx.version = 2;
        tx.witnesses = vec![Witness::default(), Witness::default()];
        let prevouts = vec![
            TxOutput::new(70_000, vec![0x51, 0x20, 0xab]),
            TxOutput::new(30_000, vec![0x51, 0x20, 0xcd]),
        ];
        let default = bip341_sighash(&tx, 0, &prevouts, SIGHASH_DEFAULT, None).unwrap();
        let all = bip341_sighash(&tx, 0, &prevouts, SIGHASH_ALL, None).unwrap();
        // DEFAULT commits to the same data but hashes a different type byte
        assert_ne!(default, all);

        // and the digest changes with the signed input
        let other = bip341_sighash(&tx, 1, &prevouts, SIGHASH_DEFAULT, None).unwrap();
        assert_ne!(default, other);
    }

    #[test]
    fn taproot_rejects_undefined_types() {
        let tx = two_in_two_out();
        let prevouts = vec![
            TxOutput::new(1, vec![0x51]),
            TxOutput::new(2, vec![0x51]),
        ];
        for bad in [0x04u8, 0x80, 0x41, 0xff] {
            assert!(bip341_sighash(&tx, 0, &prevouts, bad, None).is_err());
        }
    }

    #[test]
    fn taproot_annex_commits() {
        let tx = two_in_two_out();
        let prevouts = vec![
            TxOutput::new(1, vec![0x51]),
            TxOutput::new(2, vec![0x51]),
        ];
        let without = bip341_sighash(&tx, 0, &prevouts, SIGHASH_DEFAULT, None).unwrap();
        let with = bip341_sighash(&tx, 0, &prevouts, SIGHASH_DEFAULT, Some(&[0x50, 0x01])).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn taproot_prevout_count_enforced() {
        let tx = two_in_two_out();
        assert!(matches!(
            bip341_sighash(&tx, 0, &[TxOutput::new(1, vec![0x51])], 0, None),
            Err(Error::PrevoutCountMismatch { prevouts: 1, inputs: 2 })
        ));
    }
}

//! The shared Bitcoin transaction structures and their wire codecs.

use std::fmt;

use carina_crypto::hash::{sha256d, Hash};

use crate::codec::{write_bytes, write_varint, Reader};
use crate::Error;

/// Sequence values below this signal replaceability (BIP-125).
pub const RBF_SEQUENCE_THRESHOLD: u32 = 0xffff_fffe;

/// Reference to a previous output. The txid is kept in internal byte
/// order; [`OutPoint::txid_hex`] shows the conventional reversed form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Display-order (reversed) transaction id.
    pub fn txid_hex(&self) -> String {
        let mut reversed = self.txid;
        reversed.reverse();
        hex::encode(reversed)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
    }

    fn read(reader: &mut Reader) -> Result<Self, Error> {
        Ok(OutPoint {
            txid: reader.array()?,
            vout: reader.u32_le()?,
        })
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid_hex(), self.vout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, sequence: u32) -> Self {
        TxInput {
            previous_output,
            script_sig: Vec::new(),
            sequence,
        }
    }

    /// BIP-125: any sequence below `0xFFFFFFFE` opts in to replacement.
    pub fn signals_rbf(&self) -> bool {
        self.sequence < RBF_SEQUENCE_THRESHOLD
    }

    fn write(&self, out: &mut Vec<u8>) {
        self.previous_output.write(out);
        write_bytes(out, &self.script_sig);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }

    fn read(reader: &mut Reader) -> Result<Self, Error> {
        Ok(TxInput {
            previous_output: OutPoint::read(reader)?,
            script_sig: reader.bytes()?,
            sequence: reader.u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    /// Satoshis; negative values only appear in sighash placeholders and
    /// are rejected on the wire.
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        TxOutput {
            value,
            script_pubkey,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_bytes(out, &self.script_pubkey);
    }

    fn read(reader: &mut Reader) -> Result<Self, Error> {
        Ok(TxOutput {
            value: reader.i64_le()?,
            script_pubkey: reader.bytes()?,
        })
    }
}

/// One input's witness stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Witness(pub Vec<Vec<u8>>);

impl Witness {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0.len() as u64);
        for item in &self.0 {
            write_bytes(out, item);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, Error> {
        let count = reader.varint()?;
        let mut items = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            items.push(reader.bytes()?);
        }
        Ok(Witness(items))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// One stack per input once any input carries witness data; empty for
    /// purely legacy transactions.
    pub witnesses: Vec<Witness>,
    pub lock_time: u32,
}

impl Transaction {
    /// Whether the SegWit serialization (marker + flag + witness section)
    /// applies.
    pub fn has_witness(&self) -> bool {
        !self.witnesses.is_empty() && self.witnesses.iter().any(|w| !w.is_empty())
    }

    /// Legacy serialization, witness data omitted.
    pub fn serialize_legacy(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(&mut out);
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Wire serialization: SegWit form when witness data is present,
    /// legacy form otherwise.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if !self.has_witness() {
            return Ok(self.serialize_legacy());
        }
        if self.witnesses.len() != self.inputs.len() {
            return Err(Error::WitnessCountMismatch {
                witnesses: self.witnesses.len(),
                inputs: self.inputs.len(),
            });
        }
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(0x00); // segwit marker
        out.push(0x01); // segwit flag
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(&mut out);
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut out);
        }
        for witness in &self.witnesses {
            witness.write(&mut out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader::new(bytes);
        let tx = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }

    pub(crate) fn read(reader: &mut Reader) -> Result<Self, Error> {
        let version = reader.i32_le()?;

        let mut input_count = reader.varint()?;
        let mut segwit = false;
        if input_count == 0 && reader.remaining() > 0 {
            // marker byte seen; the next byte is the flag
            let flag = reader.u8()?;
            if flag != 0x01 {
                return Err(Error::UnsupportedSegwitFlag(flag));
            }
            segwit = true;
            input_count = reader.varint()?;
        }

        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            inputs.push(TxInput::read(reader)?);
        }

        let output_count = reader.varint()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let output = TxOutput::read(reader)?;
            if output.value < 0 {
                return Err(Error::NegativeValue(output.value));
            }
            outputs.push(output);
        }

        let mut witnesses = Vec::new();
        if segwit {
            for _ in 0..inputs.len() {
                witnesses.push(Witness::read(reader)?);
            }
        }

        let lock_time = reader.u32_le()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            witnesses,
            lock_time,
        })
    }

    /// Double-SHA-256 over the legacy serialization, internal byte order.
    pub fn txid(&self) -> Hash<32> {
        sha256d(&self.serialize_legacy())
    }

    /// Double-SHA-256 over the witness serialization. Equal to
    /// [`Transaction::txid`] when no witness is present.
    pub fn wtxid(&self) -> Result<Hash<32>, Error> {
        Ok(sha256d(&self.serialize()?))
    }

    /// Display-order (reversed) hex transaction id.
    pub fn txid_hex(&self) -> String {
        let mut bytes = self.txid().to_byte_array();
        bytes.reverse();
        hex::encode(bytes)
    }

    /// Whether any input opts in to BIP-125 replacement.
    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(TxInput::signals_rbf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput::new(OutPoint::new([0xaa; 32], 0), 0xffff_ffff)],
            outputs: vec![TxOutput::new(
                5_000_000_000,
                hex::decode("76a914bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb88ac").unwrap(),
            )],
            witnesses: Vec::new(),
            lock_time: 0,
        }
    }

    #[test]
    fn legacy_wire_layout() {
        let expected = format!(
            "01000000

             01
             {prev}00000000
             00
             ffffffff

             01
             00f2052a01000000
             1976a914bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb88ac

             00000000",
            prev = "aa".repeat(32),
        )
        .split_whitespace()
        .collect::<String>();
        assert_eq!(hex::encode(simple_tx().serialize().unwrap()), expected);
    }

    #[test]
    fn legacy_roundtrip() {
        let tx = simple_tx();
        let bytes = tx.serialize().unwrap();
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
    }

    #[test]
    fn segwit_marker_and_wtxid() {
        let mut tx = simple_tx();
        tx.witnesses = vec![Witness(vec![vec![0x01; 71], vec![0x02; 33]])];
        let bytes = tx.serialize().unwrap();
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 0x01);

        let parsed = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(parsed, tx);

        // txid ignores the witness, wtxid commits to it
        assert_eq!(tx.txid(), simple_tx().txid());
        assert_ne!(tx.wtxid().unwrap(), tx.txid());
    }

    #[test]
    fn empty_witness_stacks_serialize_legacy() {
        let mut tx = simple_tx();
        tx.witnesses = vec![Witness::default()];
        assert!(!tx.has_witness());
        assert_eq!(tx.serialize().unwrap(), tx.serialize_legacy());
    }

    #[test]
    fn rbf_signaling() {
        let mut tx = simple_tx();
        assert!(!tx.signals_rbf());
        tx.inputs[0].sequence = 0xffff_fffd;
        assert!(tx.signals_rbf());
        tx.inputs[0].sequence = 0xffff_fffe;
        assert!(!tx.signals_rbf());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = simple_tx().serialize().unwrap();
        bytes.push(0x00);
        assert!(matches!(
            Transaction::deserialize(&bytes),
            Err(Error::TrailingBytes(1))
        ));
    }

    #[test]
    fn rejects_negative_output() {
        let mut tx = simple_tx();
        tx.outputs[0].value = -5;
        let bytes = tx.serialize().unwrap();
        assert!(matches!(
            Transaction::deserialize(&bytes),
            Err(Error::NegativeValue(-5))
        ));
    }
}

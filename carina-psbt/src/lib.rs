//! Partially-signed Bitcoin transactions (BIP-174), serialization layer.
//!
//! A PSBT is a global key/value map followed by one map per input and one
//! per output, each terminated by a single `0x00` byte. This crate keeps
//! every entry verbatim, typed accessors are provided for the key types
//! the wallet core itself reads and writes, and unknown entries survive a
//! round-trip bit-exactly.

use thiserror::Error;

use carina_tx::codec::{write_bytes, write_varint, Reader};
use carina_tx::Transaction;

/// The five magic bytes every PSBT starts with.
pub const MAGIC: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

/// Global map key types.
pub mod global {
    pub const UNSIGNED_TX: u8 = 0x00;
    pub const XPUB: u8 = 0x01;
    pub const VERSION: u8 = 0xfb;
}

/// Per-input map key types.
pub mod input {
    pub const NON_WITNESS_UTXO: u8 = 0x00;
    pub const WITNESS_UTXO: u8 = 0x01;
    pub const PARTIAL_SIG: u8 = 0x02;
    pub const SIGHASH_TYPE: u8 = 0x03;
    pub const REDEEM_SCRIPT: u8 = 0x04;
    pub const WITNESS_SCRIPT: u8 = 0x05;
    pub const BIP32_DERIVATION: u8 = 0x06;
    pub const FINAL_SCRIPTSIG: u8 = 0x07;
    pub const FINAL_SCRIPTWITNESS: u8 = 0x08;
}

/// Per-output map key types.
pub mod output {
    pub const REDEEM_SCRIPT: u8 = 0x00;
    pub const WITNESS_SCRIPT: u8 = 0x01;
    pub const BIP32_DERIVATION: u8 = 0x02;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("missing or wrong PSBT magic")]
    BadMagic,

    #[error("wire error: {0}")]
    Wire(#[from] carina_tx::Error),

    #[error("duplicate key in a map")]
    DuplicateKey,

    #[error("zero-length key outside a map terminator")]
    EmptyKey,

    #[error("global map is missing the unsigned transaction")]
    MissingUnsignedTx,

    #[error("the unsigned transaction must not carry scriptSigs or witnesses")]
    SignedTransaction,
}

/// An ordered key/value map; order is preserved so serialization is
/// byte-identical to what was parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PsbtMap {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl PsbtMap {
    pub fn new() -> Self {
        PsbtMap::default()
    }

    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }

    /// Look up by full key bytes.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Look up a key consisting of a bare type byte.
    pub fn get_typed(&self, key_type: u8) -> Option<&[u8]> {
        self.get(&[key_type])
    }

    /// Insert, rejecting duplicates.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(Error::DuplicateKey);
        }
        self.entries.push((key, value));
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) {
        for (key, value) in &self.entries {
            write_bytes(out, key);
            write_bytes(out, value);
        }
        out.push(0x00);
    }

    fn read(reader: &mut Reader) -> Result<Self, Error> {
        let mut map = PsbtMap::new();
        loop {
            let key = reader.bytes()?;
            if key.is_empty() {
                return Ok(map);
            }
            let value = reader.bytes()?;
            map.insert(key, value)?;
        }
    }
}

/// A partially-signed transaction: the global map plus one map per input
/// and output of the unsigned transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Psbt {
    pub global: PsbtMap,
    pub inputs: Vec<PsbtMap>,
    pub outputs: Vec<PsbtMap>,
}

impl Psbt {
    /// Start a PSBT from an unsigned transaction, allocating empty maps
    /// for its inputs and outputs.
    pub fn from_unsigned_tx(tx: &Transaction) -> Result<Self, Error> {
        if tx.has_witness() || tx.inputs.iter().any(|i| !i.script_sig.is_empty()) {
            return Err(Error::SignedTransaction);
        }
        let mut global = PsbtMap::new();
        global.insert(vec![global::UNSIGNED_TX], tx.serialize_legacy())?;
        Ok(Psbt {
            inputs: vec![PsbtMap::new(); tx.inputs.len()],
            outputs: vec![PsbtMap::new(); tx.outputs.len()],
            global,
        })
    }

    /// Decode the unsigned transaction out of the global map.
    pub fn unsigned_tx(&self) -> Result<Transaction, Error> {
        let raw = self
            .global
            .get_typed(global::UNSIGNED_TX)
            .ok_or(Error::MissingUnsignedTx)?;
        let tx = Transaction::deserialize(raw)?;
        if tx.has_witness() || tx.inputs.iter().any(|i| !i.script_sig.is_empty()) {
            return Err(Error::SignedTransaction);
        }
        Ok(tx)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        self.global.write(&mut out);
        for map in &self.inputs {
            map.write(&mut out);
        }
        for map in &self.outputs {
            map.write(&mut out);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::BadMagic);
        }
        let mut reader = Reader::new(&bytes[MAGIC.len()..]);
        let global = PsbtMap::read(&mut reader)?;

        // input/output map counts come from the unsigned transaction
        let psbt_probe = Psbt {
            global: global.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        let tx = psbt_probe.unsigned_tx()?;

        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for _ in 0..tx.inputs.len() {
            inputs.push(PsbtMap::read(&mut reader)?);
        }
        let mut outputs = Vec::with_capacity(tx.outputs.len());
        for _ in 0..tx.outputs.len() {
            outputs.push(PsbtMap::read(&mut reader)?);
        }
        reader.finish()?;
        Ok(Psbt {
            global,
            inputs,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_tx::{OutPoint, TransactionBuilder};

    fn unsigned() -> Transaction {
        TransactionBuilder::new()
            .input(OutPoint::new([0x5a; 32], 0))
            .input(OutPoint::new([0x5b; 32], 2))
            .output(40_000, vec![0x00, 0x14, 0xaa])
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_psbt_layout() {
        let psbt = Psbt::from_unsigned_tx(&unsigned()).unwrap();
        assert_eq!(psbt.inputs.len(), 2);
        assert_eq!(psbt.outputs.len(), 1);

        let bytes = psbt.serialize();
        assert_eq!(&bytes[..5], &MAGIC);
        // terminators: one global, two inputs, one output
        assert_eq!(bytes[bytes.len() - 1], 0x00);
        assert_eq!(Psbt::deserialize(&bytes).unwrap(), psbt);
    }

    #[test]
    fn unsigned_tx_roundtrip() {
        let tx = unsigned();
        let psbt = Psbt::from_unsigned_tx(&tx).unwrap();
        assert_eq!(psbt.unsigned_tx().unwrap(), tx);
    }

    #[test]
    fn unknown_keys_survive_verbatim() {
        let mut psbt = Psbt::from_unsigned_tx(&unsigned()).unwrap();
        // a proprietary key with structured key data
        psbt.global
            .insert(vec![0xfc, 0x03, b'c', b'a', b'r'], vec![0x01, 0x02])
            .unwrap();
        psbt.inputs[1]
            .insert(vec![0xf0, 0xde, 0xad], vec![])
            .unwrap();

        let bytes = psbt.serialize();
        let parsed = Psbt::deserialize(&bytes).unwrap();
        assert_eq!(parsed, psbt);
        // bit-exact round trip
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Psbt::from_unsigned_tx(&unsigned()).unwrap().serialize();
        bytes[4] = 0x00;
        assert_eq!(Psbt::deserialize(&bytes).unwrap_err(), Error::BadMagic);
    }

    #[test]
    fn rejects_signed_transaction() {
        let mut tx = unsigned();
        tx.inputs[0].script_sig = vec![0x51];
        assert_eq!(
            Psbt::from_unsigned_tx(&tx).unwrap_err(),
            Error::SignedTransaction
        );
    }

    #[test]
    fn rejects_duplicate_keys() {
        let mut map = PsbtMap::new();
        map.insert(vec![0x42], vec![1]).unwrap();
        assert_eq!(map.insert(vec![0x42], vec![2]).unwrap_err(), Error::DuplicateKey);
    }

    #[test]
    fn missing_unsigned_tx_detected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(0x00); // empty global map
        assert_eq!(
            Psbt::deserialize(&bytes).unwrap_err(),
            Error::MissingUnsignedTx
        );
    }

    #[test]
    fn typed_input_entries() {
        let mut psbt = Psbt::from_unsigned_tx(&unsigned()).unwrap();
        psbt.inputs[0]
            .insert(vec![input::SIGHASH_TYPE], 1u32.to_le_bytes().to_vec())
            .unwrap();
        assert_eq!(
            psbt.inputs[0].get_typed(input::SIGHASH_TYPE),
            Some(&1u32.to_le_bytes()[..])
        );
    }
}

//! Dash special transactions (DIP-2).
//!
//! Dash packs `(type << 16) | base_version` into the 32-bit version field;
//! version 3 transactions with a non-zero type append a varint-prefixed
//! extra payload after the lock time.

use crate::codec::{write_bytes, Reader};
use crate::transaction::Transaction;
use crate::Error;

/// A Dash transaction: the shared base plus the DIP-2 envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashTransaction {
    pub base: Transaction,
    pub tx_type: u16,
    pub extra_payload: Vec<u8>,
}

impl DashTransaction {
    /// Wrap a plain transaction as a classical (type 0) Dash transaction.
    pub fn classical(base: Transaction) -> Self {
        DashTransaction {
            base,
            tx_type: 0,
            extra_payload: Vec::new(),
        }
    }

    fn has_extra_payload(&self) -> bool {
        (self.base.version as u16) >= 3 && self.tx_type != 0
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if !self.extra_payload.is_empty() && !self.has_extra_payload() {
            return Err(Error::UnexpectedExtraPayload);
        }
        let packed = ((self.tx_type as u32) << 16) | (self.base.version as u32 & 0xffff);
        let mut body = Transaction {
            version: packed as i32,
            ..self.base.clone()
        }
        .serialize()?;
        if self.has_extra_payload() {
            write_bytes(&mut body, &self.extra_payload);
        }
        Ok(body)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader::new(bytes);
        let mut base = Transaction::read(&mut reader)?;
        let packed = base.version as u32;
        let tx_type = (packed >> 16) as u16;
        let version = (packed & 0xffff) as u16;
        base.version = version as i32;

        let extra_payload = if version >= 3 && tx_type != 0 {
            reader.bytes()?
        } else {
            Vec::new()
        };
        reader.finish()?;
        Ok(DashTransaction {
            base,
            tx_type,
            extra_payload,
        })
    }
}

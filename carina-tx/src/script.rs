//! Script representation with minimal-push canonical serialization.

use std::fmt;

use crate::Error;

/// The opcodes the wallet core emits or recognizes by name. Anything else
/// still round-trips through [`ScriptElement::Opcode`].
pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;

    pub const OP_IF: u8 = 0x63;
    pub const OP_NOTIF: u8 = 0x64;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_RETURN: u8 = 0x6a;

    pub const OP_TOALTSTACK: u8 = 0x6b;
    pub const OP_FROMALTSTACK: u8 = 0x6c;
    pub const OP_IFDUP: u8 = 0x73;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_SWAP: u8 = 0x7c;

    pub const OP_SIZE: u8 = 0x82;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;

    pub const OP_ADD: u8 = 0x93;
    pub const OP_BOOLAND: u8 = 0x9a;
    pub const OP_BOOLOR: u8 = 0x9b;
    pub const OP_NUMEQUAL: u8 = 0x9c;
    pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
    pub const OP_0NOTEQUAL: u8 = 0x92;

    pub const OP_RIPEMD160: u8 = 0xa6;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_HASH256: u8 = 0xaa;

    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
    pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;

    pub const OP_CHECKSIGADD: u8 = 0xba;
}

/// One element of a script: a raw opcode or a data push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptElement {
    Opcode(u8),
    Push(Vec<u8>),
}

/// An ordered sequence of script elements.
///
/// Serialization always uses the minimal push form: small integers become
/// `OP_0`/`OP_1..16`/`OP_1NEGATE`, short data a direct length byte, longer
/// data the smallest `OP_PUSHDATA` variant that fits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script(Vec<ScriptElement>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn elements(&self) -> &[ScriptElement] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_opcode(&mut self, opcode: u8) -> &mut Self {
        self.0.push(ScriptElement::Opcode(opcode));
        self
    }

    pub fn push_slice(&mut self, data: &[u8]) -> &mut Self {
        self.0.push(ScriptElement::Push(data.to_vec()));
        self
    }

    /// Push a number in the canonical script-number form: `OP_0`,
    /// `OP_1..16`, `OP_1NEGATE` or a minimal little-endian push with a
    /// sign bit.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        match value {
            0 => self.push_opcode(opcodes::OP_0),
            -1 => self.push_opcode(opcodes::OP_1NEGATE),
            1..=16 => self.push_opcode(opcodes::OP_1 + (value as u8) - 1),
            _ => {
                let encoded = scriptnum_encode(value);
                self.0.push(ScriptElement::Push(encoded));
                self
            }
        }
    }

    /// Append every element of another script.
    pub fn extend(&mut self, other: Script) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    /// Replace the final opcode, used to fold `X VERIFY` into the
    /// verify-form of `X`.
    pub fn replace_last_opcode(&mut self, opcode: u8) -> bool {
        match self.0.last_mut() {
            Some(ScriptElement::Opcode(last)) => {
                *last = opcode;
                true
            }
            _ => false,
        }
    }

    pub fn last_opcode(&self) -> Option<u8> {
        match self.0.last() {
            Some(ScriptElement::Opcode(op)) => Some(*op),
            _ => None,
        }
    }

    /// Serialize with canonical minimal pushes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for element in &self.0 {
            match element {
                ScriptElement::Opcode(op) => out.push(*op),
                ScriptElement::Push(data) => push_minimal(&mut out, data),
            }
        }
        out
    }

    /// Parse raw script bytes back into elements.
    ///
    /// Pushes that use a longer-than-necessary opcode are rejected so that
    /// `to_bytes` is a true inverse.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut elements = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let opcode = bytes[pos];
            pos += 1;
            match opcode {
                0x01..=0x4b => {
                    let len = opcode as usize;
                    let data = take(bytes, &mut pos, len)?;
                    if is_small_int(data) {
                        return Err(Error::MalformedPush);
                    }
                    elements.push(ScriptElement::Push(data.to_vec()));
                }
                opcodes::OP_PUSHDATA1 => {
                    let len = take(bytes, &mut pos, 1)?[0] as usize;
                    if len < 0x4c {
                        return Err(Error::MalformedPush);
                    }
                    let data = take(bytes, &mut pos, len)?;
                    elements.push(ScriptElement::Push(data.to_vec()));
                }
                opcodes::OP_PUSHDATA2 => {
                    let raw = take(bytes, &mut pos, 2)?;
                    let len = u16::from_le_bytes(raw.try_into().expect("2 bytes")) as usize;
                    if len <= 0xff {
                        return Err(Error::MalformedPush);
                    }
                    let data = take(bytes, &mut pos, len)?;
                    elements.push(ScriptElement::Push(data.to_vec()));
                }
                opcodes::OP_PUSHDATA4 => {
                    let raw = take(bytes, &mut pos, 4)?;
                    let len = u32::from_le_bytes(raw.try_into().expect("4 bytes")) as usize;
                    if len <= 0xffff {
                        return Err(Error::MalformedPush);
                    }
                    let data = take(bytes, &mut pos, len)?;
                    elements.push(ScriptElement::Push(data.to_vec()));
                }
                other => elements.push(ScriptElement::Opcode(other)),
            }
        }
        Ok(Script(elements))
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], Error> {
    if bytes.len() - *pos < len {
        return Err(Error::UnexpectedEof);
    }
    let slice = &bytes[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

/// Whether a push should have been a small-integer opcode instead.
fn is_small_int(data: &[u8]) -> bool {
    data.len() == 1 && (data[0] == 0x81 || (1..=16).contains(&data[0]))
}

fn push_minimal(out: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => out.push(opcodes::OP_0),
        1 if data[0] == 0x81 => out.push(opcodes::OP_1NEGATE),
        1 if (1..=16).contains(&data[0]) => out.push(opcodes::OP_1 + data[0] - 1),
        len @ 1..=0x4b => {
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len @ 0x4c..=0xff => {
            out.push(opcodes::OP_PUSHDATA1);
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len @ 0x100..=0xffff => {
            out.push(opcodes::OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
        len => {
            out.push(opcodes::OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
}

/// Minimal script-number encoding: little-endian magnitude with the top
/// bit of the final byte as the sign.
fn scriptnum_encode(value: i64) -> Vec<u8> {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut out = Vec::new();
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if out.last().is_some_and(|&b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = out.last_mut().expect("nonzero magnitude");
        *last |= 0x80;
    }
    out
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::opcodes::*;
    use super::*;

    #[test]
    fn p2pkh_template_bytes() {
        let hash = [0xbb; 20];
        let mut script = Script::new();
        script
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(&hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG);
        assert_eq!(
            hex::encode(script.to_bytes()),
            "76a914bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb88ac"
        );
    }

    #[test]
    fn minimal_integer_pushes() {
        let mut script = Script::new();
        script.push_int(0).push_int(1).push_int(16).push_int(-1);
        assert_eq!(script.to_bytes(), vec![OP_0, OP_1, OP_16, OP_1NEGATE]);

        let mut script = Script::new();
        script.push_int(17);
        assert_eq!(script.to_bytes(), vec![0x01, 17]);

        let mut script = Script::new();
        script.push_int(500_000);
        // 500000 = 0x07a120, little-endian, high bit clear
        assert_eq!(script.to_bytes(), vec![0x03, 0x20, 0xa1, 0x07]);

        let mut script = Script::new();
        script.push_int(128);
        // needs a padding byte to keep the sign bit clear
        assert_eq!(script.to_bytes(), vec![0x02, 0x80, 0x00]);
    }

    #[test]
    fn pushdata_thresholds() {
        for (len, prefix_len) in [(0x4b, 1), (0x4c, 2), (0xff, 2), (0x100, 3)] {
            let mut script = Script::new();
            script.push_slice(&vec![0xcd; len]);
            let bytes = script.to_bytes();
            assert_eq!(bytes.len(), len + prefix_len, "len {len}");
            assert_eq!(Script::from_bytes(&bytes).unwrap(), script);
        }
    }

    #[test]
    fn roundtrip_with_opcodes() {
        let mut script = Script::new();
        script
            .push_opcode(OP_IF)
            .push_slice(&[0xaa; 33])
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_int(144)
            .push_opcode(OP_CHECKSEQUENCEVERIFY)
            .push_opcode(OP_ENDIF);
        let bytes = script.to_bytes();
        assert_eq!(Script::from_bytes(&bytes).unwrap(), script);
    }

    #[test]
    fn rejects_non_minimal_push() {
        // 0x01 0x05 pushes the byte 5, which must be OP_5
        assert!(Script::from_bytes(&[0x01, 0x05]).is_err());
        // PUSHDATA1 used for a 3-byte push
        assert!(Script::from_bytes(&[0x4c, 0x03, 1, 2, 3]).is_err());
    }

    #[test]
    fn verify_folding_helper() {
        let mut script = Script::new();
        script.push_slice(&[0x02; 33]).push_opcode(OP_CHECKSIG);
        assert_eq!(script.last_opcode(), Some(OP_CHECKSIG));
        assert!(script.replace_last_opcode(OP_CHECKSIGVERIFY));
        assert_eq!(script.last_opcode(), Some(OP_CHECKSIGVERIFY));
    }
}

//! Miniscript: a typed, analyzable subset of Bitcoin Script, plus the
//! output-descriptor layer above it.
//!
//! The pipeline is: descriptor or miniscript text → token tree → typed
//! [`Miniscript`] AST (correctness, malleability and size data computed in
//! one bottom-up pass) → canonical script bytes. Everything is owned
//! sub-trees built bottom-up; no node refers back to its parent.

pub mod ast;
pub mod descriptor;
pub mod extdata;
pub mod lex;
pub mod policy;
pub mod taptree;
pub mod types;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use carina_crypto::hash::hash160;

pub use ast::{Fragment, Miniscript};
pub use descriptor::Descriptor;
pub use policy::Semantic;
pub use taptree::TapTree;

/// Maximum AST height before parsing aborts.
pub const MAX_TREE_HEIGHT: usize = 402;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected {found:?} at offset {offset}")]
    Lex { offset: usize, found: String },

    #[error("unknown fragment {0:?}")]
    UnknownFragment(String),

    #[error("fragment {fragment} is ill-typed: {reason}")]
    TypeCheck {
        fragment: &'static str,
        reason: String,
    },

    #[error("expression tree exceeds the height limit")]
    RecursionLimit,

    #[error("policy is unsatisfiable: conflicting timelock kinds under one conjunction")]
    PolicyUnsatisfiable,

    #[error("threshold {k} of {n} is out of range")]
    InvalidThreshold { k: usize, n: usize },

    #[error("invalid public key {0:?}")]
    InvalidKey(String),

    #[error("invalid hash literal {0:?}")]
    InvalidHash(String),

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("descriptor checksum mismatch: expected {expected}, found {found}")]
    BadChecksum { expected: String, found: String },

    #[error("character {0:?} may not appear in a descriptor")]
    InvalidDescriptorCharacter(char),

    #[error("malformed descriptor: {0}")]
    BadDescriptor(String),

    #[error("address error: {0}")]
    Address(#[from] carina_addresses::Error),

    #[error("key material error: {0}")]
    Crypto(#[from] carina_crypto::Error),
}

/// A concrete public key inside a miniscript: compressed SEC form in
/// legacy/SegWit contexts, x-only in Taproot contexts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Full([u8; 33]),
    XOnly([u8; 32]),
}

impl Key {
    /// The bytes pushed by `pk_k`.
    pub fn push_bytes(&self) -> Vec<u8> {
        match self {
            Key::Full(bytes) => bytes.to_vec(),
            Key::XOnly(bytes) => bytes.to_vec(),
        }
    }

    /// HASH160 of the push bytes, as committed by `pk_h`.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.push_bytes()).to_byte_array()
    }

    pub fn is_x_only(&self) -> bool {
        matches!(self, Key::XOnly(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Full(bytes) => f.write_str(&hex::encode(bytes)),
            Key::XOnly(bytes) => f.write_str(&hex::encode(bytes)),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            66 => {
                let mut bytes = [0u8; 33];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| Error::InvalidKey(s.to_string()))?;
                if bytes[0] != 0x02 && bytes[0] != 0x03 {
                    return Err(Error::InvalidKey(s.to_string()));
                }
                Ok(Key::Full(bytes))
            }
            64 => {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|_| Error::InvalidKey(s.to_string()))?;
                Ok(Key::XOnly(bytes))
            }
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parse_by_length() {
        let full: Key = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5"
            .parse()
            .unwrap();
        assert!(!full.is_x_only());
        assert_eq!(full.push_bytes().len(), 33);

        let xonly: Key = "c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5"
            .parse()
            .unwrap();
        assert!(xonly.is_x_only());
        assert_eq!(xonly.push_bytes().len(), 32);
    }

    #[test]
    fn key_rejects_bad_prefix() {
        assert!(
            "05c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5"
                .parse::<Key>()
                .is_err()
        );
    }

    #[test]
    fn key_display_roundtrip() {
        let text = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
        let key: Key = text.parse().unwrap();
        assert_eq!(key.to_string(), text);
    }
}

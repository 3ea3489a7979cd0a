//! Cryptographic primitives for the Carina wallet core.
//!
//! This crate is pure computation over caller-owned values: the secp256k1
//! field and group arithmetic, the hash functions shared by the Bitcoin
//! lineage of chains, deterministic ECDSA (RFC 6979), BIP-340 Schnorr
//! signatures and the BIP-327 MuSig2 aggregation protocol. There is no I/O,
//! no global state and no internal locking; every operation may be called
//! from any number of threads as long as each caller owns its inputs.

pub mod curve;
pub mod ecdh;
pub mod ecdsa;
pub mod hash;
pub mod memsec;
pub mod musig;
pub mod schnorr;
pub mod taproot;

use thiserror::Error;

/// Failures shared by the arithmetic and signature modules.
///
/// Each variant is a stable discriminant callers may match on; the embedded
/// strings are advisory only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A scalar was zero or not below the group order, a point was off the
    /// curve, or an encoding had the wrong length or prefix.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(&'static str),

    /// An operation produced the point at infinity where a point was
    /// required, or a quantity left its valid range mid-computation.
    #[error("curve math failure: {0}")]
    CurveMath(&'static str),

    /// A tweak moved a key out of range (sum hit infinity or order).
    #[error("tweak out of range")]
    TweakOutOfRange,

    /// A DER or compact signature could not be decoded.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(&'static str),
}

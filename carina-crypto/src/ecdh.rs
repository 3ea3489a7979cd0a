//! Elliptic-curve Diffie-Hellman over secp256k1.

use crate::curve::{AffinePoint, Scalar};
use crate::hash::{sha256, Hash};
use crate::Error;

/// The shared secret `SHA256(compressed(sk·P))`, the libsecp convention.
///
/// Hashing the compressed point (rather than returning the raw X
/// coordinate) makes the result safe to feed into a KDF directly.
pub fn shared_secret(sk: &Scalar, pk: &AffinePoint) -> Result<Hash<32>, Error> {
    if sk.is_zero() {
        return Err(Error::InvalidKeyMaterial("private key is zero"));
    }
    let point = pk.mul(sk);
    if point.is_infinity() {
        return Err(Error::CurveMath("ECDH produced the identity"));
    }
    Ok(sha256(&point.compressed()?))
}

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::Error;

/// The group order `n` (SEC2).
pub(crate) static N: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        16,
    )
    .unwrap()
});

/// `n / 2`, the boundary of the low-S rule.
static HALF_N: Lazy<BigUint> = Lazy::new(|| &*N >> 1);

static INV_EXP: Lazy<BigUint> = Lazy::new(|| &*N - 2u8);

/// An integer modulo the secp256k1 group order.
///
/// A `Scalar` used as a private key additionally satisfies `0 < s`; the
/// [`Scalar::secret_from_be_bytes`] constructor enforces that.
#[derive(Clone, PartialEq, Eq)]
pub struct Scalar(BigUint);

impl Scalar {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v) % &*N)
    }

    pub(crate) fn from_biguint(v: BigUint) -> Self {
        Self(v % &*N)
    }

    pub(crate) fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Decode 32 big-endian bytes; values `>= n` are rejected.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let v = BigUint::from_bytes_be(bytes);
        if v >= *N {
            return Err(Error::InvalidKeyMaterial("scalar overflows group order"));
        }
        Ok(Self(v))
    }

    /// Decode 32 big-endian bytes, reducing modulo `n`.
    pub fn reduce_from_be_bytes(bytes: &[u8; 32]) -> Self {
        Self(BigUint::from_bytes_be(bytes) % &*N)
    }

    /// Decode a private key: 32 big-endian bytes with `0 < s < n`.
    pub fn secret_from_be_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let s = Self::from_be_bytes(bytes)?;
        if s.is_zero() {
            return Err(Error::InvalidKeyMaterial("private key is zero"));
        }
        Ok(s)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    pub fn add(&self, other: &Self) -> Self {
        Self((&self.0 + &other.0) % &*N)
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self((&self.0 + &*N - &other.0) % &*N)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self((&self.0 * &other.0) % &*N)
    }

    pub fn negate(&self) -> Self {
        if self.0.is_zero() {
            self.clone()
        } else {
            Self(&*N - &self.0)
        }
    }

    /// Multiplicative inverse modulo `n`; `None` for zero.
    pub fn invert(&self) -> Option<Self> {
        if self.0.is_zero() {
            return None;
        }
        Some(Self(self.0.modpow(&INV_EXP, &N)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether the scalar lies in the upper half of the order (`s > n/2`),
    /// the half the low-S rule forbids in signatures.
    pub fn is_high(&self) -> bool {
        self.0 > *HALF_N
    }

    /// Bit `i` (little-endian index) of the scalar.
    pub fn bit(&self, i: u64) -> bool {
        self.0.bit(i)
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scalar")
            .field(&hex::encode(self.to_be_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_reduces_to_zero() {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&N.to_bytes_be());
        assert!(Scalar::from_be_bytes(&bytes).is_err());
        assert!(Scalar::reduce_from_be_bytes(&bytes).is_zero());
    }

    #[test]
    fn secret_rejects_zero() {
        assert!(Scalar::secret_from_be_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn invert_roundtrip() {
        let k = Scalar::from_u64(0x1234_5678_9abc);
        let one = k.mul(&k.invert().unwrap());
        assert_eq!(one, Scalar::from_u64(1));
    }

    #[test]
    fn negate_adds_to_zero() {
        let k = Scalar::from_u64(42);
        assert!(k.add(&k.negate()).is_zero());
    }

    #[test]
    fn high_boundary() {
        // n/2 is not high, n/2 + 1 is
        let half = Scalar::from_biguint(&*N >> 1);
        assert!(!half.is_high());
        assert!(half.add(&Scalar::from_u64(1)).is_high());
    }
}

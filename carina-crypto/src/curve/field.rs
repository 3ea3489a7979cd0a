use std::fmt;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use once_cell::sync::Lazy;

use crate::Error;

/// The field prime `p = 2^256 - 2^32 - 977` (SEC2).
pub(crate) static P: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f",
        16,
    )
    .unwrap()
});

/// Exponent for square roots: `(p + 1) / 4`, valid because `p ≡ 3 (mod 4)`.
static SQRT_EXP: Lazy<BigUint> = Lazy::new(|| (&*P + 1u8) >> 2);

/// Exponent for inversion by Fermat's little theorem: `p - 2`.
static INV_EXP: Lazy<BigUint> = Lazy::new(|| &*P - 2u8);

/// An integer modulo the secp256k1 field prime.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldElement(BigUint);

impl FieldElement {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn one() -> Self {
        Self(BigUint::one())
    }

    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    pub(crate) fn from_biguint(v: BigUint) -> Self {
        Self(v % &*P)
    }

    pub(crate) fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Decode 32 big-endian bytes; values `>= p` are rejected.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let v = BigUint::from_bytes_be(bytes);
        if v >= *P {
            return Err(Error::InvalidKeyMaterial("field element overflows prime"));
        }
        Ok(Self(v))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    pub fn add(&self, other: &Self) -> Self {
        Self((&self.0 + &other.0) % &*P)
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self((&self.0 + &*P - &other.0) % &*P)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self((&self.0 * &other.0) % &*P)
    }

    pub fn square(&self) -> Self {
        self.mul(self)
    }

    pub fn negate(&self) -> Self {
        if self.0.is_zero() {
            self.clone()
        } else {
            Self(&*P - &self.0)
        }
    }

    /// Multiplicative inverse; `None` for zero.
    pub fn invert(&self) -> Option<Self> {
        if self.0.is_zero() {
            return None;
        }
        Some(Self(self.0.modpow(&INV_EXP, &P)))
    }

    /// Square root with an explicit residue check; `None` when the element
    /// is a non-residue. The returned root is the principal one
    /// (`a^((p+1)/4)`), callers pick the parity they need.
    pub fn sqrt(&self) -> Option<Self> {
        let beta = self.0.modpow(&SQRT_EXP, &P);
        if (&beta * &beta) % &*P != self.0 {
            return None;
        }
        Some(Self(beta))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parity of the canonical representative, `y mod 2`.
    pub fn is_even(&self) -> bool {
        self.0.is_even()
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldElement")
            .field(&hex::encode(self.to_be_bytes()))
            .finish()
    }
}

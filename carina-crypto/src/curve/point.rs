use std::fmt;

use num_bigint::BigUint;
use once_cell::sync::Lazy;

use super::{FieldElement, Scalar};
use crate::Error;

static GENERATOR: Lazy<AffinePoint> = Lazy::new(|| {
    let x = FieldElement::from_biguint(
        BigUint::parse_bytes(
            b"79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            16,
        )
        .unwrap(),
    );
    let y = FieldElement::from_biguint(
        BigUint::parse_bytes(
            b"483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
            16,
        )
        .unwrap(),
    );
    AffinePoint::Affine { x, y }
});

/// A point on secp256k1 in affine coordinates, or the identity.
#[derive(Clone, PartialEq, Eq)]
pub enum AffinePoint {
    Infinity,
    Affine { x: FieldElement, y: FieldElement },
}

impl AffinePoint {
    /// The SEC2 base point `G`.
    pub fn generator() -> &'static AffinePoint {
        &GENERATOR
    }

    /// Construct from coordinates, verifying the curve equation.
    pub fn new(x: FieldElement, y: FieldElement) -> Result<Self, Error> {
        let p = AffinePoint::Affine { x, y };
        if !p.is_on_curve() {
            return Err(Error::InvalidKeyMaterial("point is not on the curve"));
        }
        Ok(p)
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, AffinePoint::Infinity)
    }

    /// `y² == x³ + 7`; the identity is on the curve by convention.
    pub fn is_on_curve(&self) -> bool {
        match self {
            AffinePoint::Infinity => true,
            AffinePoint::Affine { x, y } => {
                let rhs = x.square().mul(x).add(&FieldElement::from_u64(7));
                y.square() == rhs
            }
        }
    }

    /// Parity of the Y coordinate; the identity has no parity and reports
    /// `false`.
    pub fn has_even_y(&self) -> bool {
        match self {
            AffinePoint::Infinity => false,
            AffinePoint::Affine { y, .. } => y.is_even(),
        }
    }

    pub fn negate(&self) -> Self {
        match self {
            AffinePoint::Infinity => AffinePoint::Infinity,
            AffinePoint::Affine { x, y } => AffinePoint::Affine {
                x: x.clone(),
                y: y.negate(),
            },
        }
    }

    /// Point addition with explicit identity and `P + (−P) = ∞` handling.
    pub fn add(&self, other: &Self) -> Self {
        let (x1, y1) = match self {
            AffinePoint::Infinity => return other.clone(),
            AffinePoint::Affine { x, y } => (x, y),
        };
        let (x2, y2) = match other {
            AffinePoint::Infinity => return self.clone(),
            AffinePoint::Affine { x, y } => (x, y),
        };

        if x1 == x2 {
            return if y1 == y2 {
                self.double()
            } else {
                AffinePoint::Infinity
            };
        }

        // lambda = (y2 - y1) / (x2 - x1); denominator nonzero since x1 != x2
        let lambda = y2
            .sub(y1)
            .mul(&x2.sub(x1).invert().expect("x1 != x2"));
        let x3 = lambda.square().sub(x1).sub(x2);
        let y3 = lambda.mul(&x1.sub(&x3)).sub(y1);
        AffinePoint::Affine { x: x3, y: y3 }
    }

    pub fn double(&self) -> Self {
        let (x, y) = match self {
            AffinePoint::Infinity => return AffinePoint::Infinity,
            AffinePoint::Affine { x, y } => (x, y),
        };
        if y.is_zero() {
            return AffinePoint::Infinity;
        }

        // lambda = 3x² / 2y
        let three_x2 = x.square().mul(&FieldElement::from_u64(3));
        let two_y_inv = y
            .add(y)
            .invert()
            .expect("y is nonzero");
        let lambda = three_x2.mul(&two_y_inv);
        let x3 = lambda.square().sub(x).sub(x);
        let y3 = lambda.mul(&x.sub(&x3)).sub(y);
        AffinePoint::Affine { x: x3, y: y3 }
    }

    /// Scalar multiplication, MSB-first double-and-add. Produces the same
    /// result as textbook repeated addition for any scalar in `[0, n)`.
    pub fn mul(&self, k: &Scalar) -> Self {
        let mut acc = AffinePoint::Infinity;
        for i in (0..256).rev() {
            acc = acc.double();
            if k.bit(i) {
                acc = acc.add(self);
            }
        }
        acc
    }

    /// The point with the given X coordinate and even Y, per BIP-340.
    /// Fails when `x³ + 7` has no square root.
    pub fn lift_x(x_bytes: &[u8; 32]) -> Result<Self, Error> {
        let x = FieldElement::from_be_bytes(x_bytes)?;
        let alpha = x.square().mul(&x).add(&FieldElement::from_u64(7));
        let beta = alpha
            .sqrt()
            .ok_or(Error::CurveMath("x is not on the curve"))?;
        let y = if beta.is_even() { beta } else { beta.negate() };
        Ok(AffinePoint::Affine { x, y })
    }

    pub fn x(&self) -> Option<&FieldElement> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Affine { x, .. } => Some(x),
        }
    }

    pub fn y(&self) -> Option<&FieldElement> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Affine { y, .. } => Some(y),
        }
    }

    /// 33-byte compressed encoding, prefix 0x02/0x03 by Y parity.
    pub fn compressed(&self) -> Result<[u8; 33], Error> {
        match self {
            AffinePoint::Infinity => Err(Error::CurveMath("cannot encode the identity")),
            AffinePoint::Affine { x, y } => {
                let mut out = [0u8; 33];
                out[0] = if y.is_even() { 0x02 } else { 0x03 };
                out[1..].copy_from_slice(&x.to_be_bytes());
                Ok(out)
            }
        }
    }

    /// 65-byte uncompressed encoding, prefix 0x04.
    pub fn uncompressed(&self) -> Result<[u8; 65], Error> {
        match self {
            AffinePoint::Infinity => Err(Error::CurveMath("cannot encode the identity")),
            AffinePoint::Affine { x, y } => {
                let mut out = [0u8; 65];
                out[0] = 0x04;
                out[1..33].copy_from_slice(&x.to_be_bytes());
                out[33..].copy_from_slice(&y.to_be_bytes());
                Ok(out)
            }
        }
    }

    /// 32-byte x-only encoding (BIP-340/341); the implied Y is even.
    pub fn x_only(&self) -> Result<[u8; 32], Error> {
        match self {
            AffinePoint::Infinity => Err(Error::CurveMath("cannot encode the identity")),
            AffinePoint::Affine { x, .. } => Ok(x.to_be_bytes()),
        }
    }

    /// Decode any of the three standard encodings by length and prefix.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.len() {
            33 => {
                let parity_even = match bytes[0] {
                    0x02 => true,
                    0x03 => false,
                    _ => return Err(Error::InvalidKeyMaterial("bad compressed prefix")),
                };
                let mut x_bytes = [0u8; 32];
                x_bytes.copy_from_slice(&bytes[1..]);
                let even = Self::lift_x(&x_bytes)
                    .map_err(|_| Error::InvalidKeyMaterial("point is not on the curve"))?;
                Ok(if parity_even { even } else { even.negate() })
            }
            65 => {
                if bytes[0] != 0x04 {
                    return Err(Error::InvalidKeyMaterial("bad uncompressed prefix"));
                }
                let mut x_bytes = [0u8; 32];
                let mut y_bytes = [0u8; 32];
                x_bytes.copy_from_slice(&bytes[1..33]);
                y_bytes.copy_from_slice(&bytes[33..]);
                Self::new(
                    FieldElement::from_be_bytes(&x_bytes)?,
                    FieldElement::from_be_bytes(&y_bytes)?,
                )
            }
            32 => {
                let mut x_bytes = [0u8; 32];
                x_bytes.copy_from_slice(bytes);
                Self::lift_x(&x_bytes)
            }
            _ => Err(Error::InvalidKeyMaterial("bad point encoding length")),
        }
    }
}

impl fmt::Debug for AffinePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffinePoint::Infinity => f.write_str("AffinePoint(infinity)"),
            AffinePoint::Affine { .. } => f
                .debug_tuple("AffinePoint")
                .field(&hex::encode(self.uncompressed().expect("not infinity")))
                .finish(),
        }
    }
}

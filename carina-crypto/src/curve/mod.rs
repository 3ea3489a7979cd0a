//! secp256k1 field and group arithmetic.
//!
//! Everything here is plain affine arithmetic over [`num_bigint::BigUint`]
//! internals with fixed 32-byte big-endian encodings at the API boundary.
//! Values are immutable once constructed; operations return new values.

mod field;
mod point;
mod scalar;

pub use field::FieldElement;
pub use point::AffinePoint;
pub use scalar::Scalar;

#[cfg(test)]
mod tests {
    use super::*;

    const GX: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const TWO_G: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    #[test]
    fn generator_is_on_curve() {
        assert!(AffinePoint::generator().is_on_curve());
    }

    #[test]
    fn one_times_g_is_g() {
        let one = Scalar::from_u64(1);
        let p = AffinePoint::generator().mul(&one);
        assert_eq!(&p, AffinePoint::generator());
        assert_eq!(hex::encode(p.x_only().unwrap()), GX);
    }

    #[test]
    fn two_g_matches_sec2_vector() {
        let two = Scalar::from_u64(2);
        let p = AffinePoint::generator().mul(&two);
        assert_eq!(hex::encode(p.compressed().unwrap()), TWO_G);
        // doubling and addition agree
        let q = AffinePoint::generator().add(AffinePoint::generator());
        assert_eq!(p, q);
    }

    #[test]
    fn scalar_mul_matches_repeated_addition() {
        let k = Scalar::from_u64(17);
        let ladder = AffinePoint::generator().mul(&k);
        let mut acc = AffinePoint::Infinity;
        for _ in 0..17 {
            acc = acc.add(AffinePoint::generator());
        }
        assert_eq!(ladder, acc);
    }

    #[test]
    fn order_times_g_is_infinity() {
        let n_minus_1 = Scalar::from_u64(1).negate();
        let p = AffinePoint::generator().mul(&n_minus_1);
        assert_eq!(p, AffinePoint::generator().negate());
        assert!(p.add(AffinePoint::generator()).is_infinity());
    }

    #[test]
    fn point_plus_negation_is_infinity() {
        let k = Scalar::from_u64(999);
        let p = AffinePoint::generator().mul(&k);
        assert!(p.add(&p.negate()).is_infinity());
    }

    #[test]
    fn compressed_roundtrip() {
        let k = Scalar::from_u64(12345);
        let p = AffinePoint::generator().mul(&k);
        let enc = p.compressed().unwrap();
        assert_eq!(AffinePoint::decode(&enc).unwrap(), p);

        let unc = p.uncompressed().unwrap();
        assert_eq!(unc.len(), 65);
        assert_eq!(AffinePoint::decode(&unc).unwrap(), p);
    }

    #[test]
    fn lift_x_produces_even_y() {
        let k = Scalar::from_u64(7);
        let p = AffinePoint::generator().mul(&k);
        let lifted = AffinePoint::lift_x(&p.x_only().unwrap()).unwrap();
        assert!(lifted.has_even_y());
        assert_eq!(lifted.x_only().unwrap(), p.x_only().unwrap());
    }

    #[test]
    fn lift_x_rejects_non_residue() {
        // a well-known x coordinate with no point on the curve
        let mut x = [0u8; 32];
        hex::decode_to_slice(
            "eefdea4cdb677750a420fee807eacf21eb9898ae79b9768766e4faa04a2d4a34",
            &mut x,
        )
        .unwrap();
        assert!(AffinePoint::lift_x(&x).is_err());
    }

    #[test]
    fn decode_rejects_off_curve() {
        let mut enc = [0u8; 33];
        enc[0] = 0x02;
        hex::decode_to_slice(
            "eefdea4cdb677750a420fee807eacf21eb9898ae79b9768766e4faa04a2d4a34",
            &mut enc[1..],
        )
        .unwrap();
        assert!(AffinePoint::decode(&enc).is_err());
    }
}

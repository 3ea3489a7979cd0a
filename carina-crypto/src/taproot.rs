//! BIP-341 output-key tweaking.

use crate::curve::{AffinePoint, Scalar};
use crate::hash::TaggedHasher;
use crate::Error;

const TWEAK_TAG: &str = "TapTweak";

/// Result of tweaking an internal key into a Taproot output key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TweakedKey {
    /// The output point `Q = P + t·G` (guaranteed non-infinity).
    pub output: AffinePoint,
    /// Whether `Q` has odd Y, needed by script-path control blocks.
    pub parity_odd: bool,
}

/// The tweak scalar `t = H_TapTweak(P.x || merkle_root?)`.
///
/// Fails with [`Error::TweakOutOfRange`] in the astronomically unlikely
/// case the hash is not below the group order.
pub fn tap_tweak_scalar(
    internal_x: &[u8; 32],
    merkle_root: Option<&[u8; 32]>,
) -> Result<Scalar, Error> {
    let mut hasher = TaggedHasher::new(TWEAK_TAG);
    hasher.input(internal_x);
    if let Some(root) = merkle_root {
        hasher.input(root);
    }
    Scalar::from_be_bytes(&hasher.finalize()).map_err(|_| Error::TweakOutOfRange)
}

/// Tweak an internal key per BIP-341: `Q = lift_x(P) + t·G`.
///
/// With `merkle_root = None` this is the BIP-86 key-path-only construction.
/// The caller may pass either the x-only bytes or anything accepted by
/// [`AffinePoint::decode`] reduced to x-only beforehand; the tweak commits
/// to the X coordinate alone.
pub fn tap_tweak(
    internal_x: &[u8; 32],
    merkle_root: Option<&[u8; 32]>,
) -> Result<TweakedKey, Error> {
    let internal = AffinePoint::lift_x(internal_x)?;
    let t = tap_tweak_scalar(internal_x, merkle_root)?;
    let output = internal.add(&AffinePoint::generator().mul(&t));
    if output.is_infinity() {
        return Err(Error::TweakOutOfRange);
    }
    let parity_odd = !output.has_even_y();
    Ok(TweakedKey { output, parity_odd })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bip86_key_path_vector() {
        // first receiving key of the BIP-86 reference wallet
        let mut internal = [0u8; 32];
        hex::decode_to_slice(
            "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115",
            &mut internal,
        )
        .unwrap();
        let tweaked = tap_tweak(&internal, None).unwrap();
        assert_eq!(
            hex::encode(tweaked.output.x_only().unwrap()),
            "a6086be794611dc6672727655f00a026bd54f466e258829c771a20252273425c"
        );
    }

    #[test]
    fn tweak_is_additive() {
        let internal = AffinePoint::generator()
            .mul(&Scalar::from_u64(424242))
            .x_only()
            .unwrap();
        let t = tap_tweak_scalar(&internal, None).unwrap();
        let lifted = AffinePoint::lift_x(&internal).unwrap();
        let expected = lifted.add(&AffinePoint::generator().mul(&t));
        assert_eq!(tap_tweak(&internal, None).unwrap().output, expected);
    }
}

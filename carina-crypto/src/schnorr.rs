//! BIP-340 Schnorr signatures over secp256k1.

use crate::curve::{AffinePoint, Scalar};
use crate::hash::{tagged_hash, TaggedHasher};
use crate::memsec::Scrubbed as _;
use crate::Error;

const AUX_TAG: &str = "BIP0340/aux";
const NONCE_TAG: &str = "BIP0340/nonce";
const CHALLENGE_TAG: &str = "BIP0340/challenge";

/// A 64-byte BIP-340 signature: the X coordinate of the nonce point
/// followed by the response scalar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub rx: [u8; 32],
    pub s: Scalar,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.rx);
        out[32..].copy_from_slice(&self.s.to_be_bytes());
        out
    }

    /// Decode, rejecting `s >= n`. The `r` range check against the field
    /// prime happens during verification, where the lift is attempted.
    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, Error> {
        let mut rx = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        rx.copy_from_slice(&bytes[..32]);
        s_bytes.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            rx,
            s: Scalar::from_be_bytes(&s_bytes)?,
        })
    }
}

/// The challenge scalar `e = H_tag(R.x || P.x || m) mod n`.
fn challenge(rx: &[u8; 32], px: &[u8; 32], msg: &[u8]) -> Scalar {
    let mut hasher = TaggedHasher::new(CHALLENGE_TAG);
    hasher.input(rx);
    hasher.input(px);
    hasher.input(msg);
    Scalar::reduce_from_be_bytes(&hasher.finalize())
}

/// Sign `msg` with the given auxiliary randomness.
///
/// Passing all-zero `aux` yields the deterministic variant from the BIP's
/// test vectors; callers with fresh entropy should prefer it for
/// fault-attack resistance.
pub fn sign(sk: &Scalar, msg: &[u8], aux: &[u8; 32]) -> Result<Signature, Error> {
    if sk.is_zero() {
        return Err(Error::InvalidKeyMaterial("private key is zero"));
    }
    let pk_point = AffinePoint::generator().mul(sk);
    let d = if pk_point.has_even_y() {
        sk.clone()
    } else {
        sk.negate()
    };
    let px = pk_point.x_only()?;

    // t = d xor H_aux(aux)
    let aux_digest = tagged_hash(AUX_TAG, aux);
    let mut t = d.to_be_bytes();
    for (byte, mask) in t.iter_mut().zip(aux_digest.as_ref()) {
        *byte ^= mask;
    }

    let mut nonce_hasher = TaggedHasher::new(NONCE_TAG);
    nonce_hasher.input(&t);
    nonce_hasher.input(&px);
    nonce_hasher.input(msg);
    let k_prime = Scalar::reduce_from_be_bytes(&nonce_hasher.finalize());
    t.scrub();
    if k_prime.is_zero() {
        return Err(Error::CurveMath("derived nonce is zero"));
    }

    let r_point = AffinePoint::generator().mul(&k_prime);
    let k = if r_point.has_even_y() {
        k_prime
    } else {
        k_prime.negate()
    };
    let rx = r_point.x_only()?;

    let e = challenge(&rx, &px, msg);
    let s = k.add(&e.mul(&d));
    Ok(Signature { rx, s })
}

/// Verify a signature against an x-only public key.
pub fn verify(pk_x: &[u8; 32], msg: &[u8], sig: &Signature) -> bool {
    let pk = match AffinePoint::lift_x(pk_x) {
        Ok(p) => p,
        Err(_) => return false,
    };
    // r must be a valid field element
    if crate::curve::FieldElement::from_be_bytes(&sig.rx).is_err() {
        return false;
    }
    let e = challenge(&sig.rx, pk_x, msg);
    let r_point = AffinePoint::generator()
        .mul(&sig.s)
        .add(&pk.mul(&e).negate());
    if r_point.is_infinity() || !r_point.has_even_y() {
        return false;
    }
    match r_point.x_only() {
        Ok(x) => x == sig.rx,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(hex_str: &str) -> Scalar {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes).unwrap();
        Scalar::secret_from_be_bytes(&bytes).unwrap()
    }

    fn bytes32(hex_str: &str) -> [u8; 32] {
        let mut out = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut out).unwrap();
        out
    }

    #[test]
    fn bip340_vector_0() {
        let sk = scalar("0000000000000000000000000000000000000000000000000000000000000003");
        let aux = [0u8; 32];
        let msg = [0u8; 32];
        let sig = sign(&sk, &msg, &aux).unwrap();
        assert_eq!(
            hex::encode(sig.to_bytes()).to_uppercase(),
            "E907831F80848D1069A5371B402410364BDF1C5F8307B0084C55F1CE2DBA8215\
             25F66A4A85EA8B71E482A74F382D2CE5EBEEE8FDB2172F477DF4900D310536C0"
        );
        let pk = AffinePoint::generator().mul(&sk).x_only().unwrap();
        assert_eq!(
            hex::encode(pk).to_uppercase(),
            "F9308A019258C31049344F85F89D5229B531C845836F99B08601F113BCE036F9"
        );
        assert!(verify(&pk, &msg, &sig));
    }

    #[test]
    fn bip340_vector_1() {
        let sk = scalar("b7e151628aed2a6abf7158809cf4f3c762e7160f38b4da56a784d9045190cfef");
        let aux = bytes32("0000000000000000000000000000000000000000000000000000000000000001");
        let msg = bytes32("243f6a8885a308d313198a2e03707344a4093822299f31d0082efa98ec4e6c89");
        let sig = sign(&sk, &msg, &aux).unwrap();
        assert_eq!(
            hex::encode(sig.to_bytes()).to_uppercase(),
            "6896BD60EEAE296DB48A229FF71DFE071BDE413E6D43F917DC8DCF8C78DE3341\
             8906D11AC976ABCCB20B091292BFF4EA897EFCB639EA871CFA95F6DE339E4B0A"
        );
    }

    #[test]
    fn verify_rejects_bit_flip() {
        let sk = scalar("000000000000000000000000000000000000000000000000000000000000000b");
        let pk = AffinePoint::generator().mul(&sk).x_only().unwrap();
        let msg = b"schnorr message";
        let sig = sign(&sk, msg, &[7u8; 32]).unwrap();
        assert!(verify(&pk, msg, &sig));

        let mut tampered = sig.clone();
        tampered.rx[0] ^= 0x01;
        assert!(!verify(&pk, msg, &tampered));
    }

    #[test]
    fn odd_y_keys_sign_correctly() {
        // iterate a few keys so both Y parities of P are exercised
        for byte in 1u8..=8 {
            let mut sk_bytes = [0u8; 32];
            sk_bytes[31] = byte;
            let sk = Scalar::secret_from_be_bytes(&sk_bytes).unwrap();
            let pk = AffinePoint::generator().mul(&sk).x_only().unwrap();
            let sig = sign(&sk, b"parity", &[0u8; 32]).unwrap();
            assert!(verify(&pk, b"parity", &sig));
        }
    }
}

//! Deterministic ECDSA over secp256k1 (RFC 6979).

use crate::curve::{AffinePoint, Scalar};
use crate::hash::hmac_sha256;
use crate::memsec::Scrubbed as _;
use crate::Error;

/// An ECDSA signature, both components already reduced modulo `n` and the
/// `s` component normalized to the lower half of the order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: Scalar,
    pub s: Scalar,
}

impl Signature {
    /// 64-byte `r || s` compact form.
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r.to_be_bytes());
        out[32..].copy_from_slice(&self.s.to_be_bytes());
        out
    }

    pub fn from_compact(bytes: &[u8; 64]) -> Result<Self, Error> {
        let mut r_bytes = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        r_bytes.copy_from_slice(&bytes[..32]);
        s_bytes.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r: Scalar::from_be_bytes(&r_bytes)?,
            s: Scalar::from_be_bytes(&s_bytes)?,
        })
    }

    /// Strict DER encoding (minimal integer lengths).
    pub fn to_der(&self) -> Vec<u8> {
        let r = der_integer(&self.r.to_be_bytes());
        let s = der_integer(&self.s.to_be_bytes());
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((r.len() + s.len() + 4) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    pub fn from_der(bytes: &[u8]) -> Result<Self, Error> {
        let err = Error::InvalidSignatureEncoding("malformed DER signature");
        if bytes.len() < 8 || bytes[0] != 0x30 || bytes[1] as usize != bytes.len() - 2 {
            return Err(err);
        }
        let (r, rest) = der_read_integer(&bytes[2..])?;
        let (s, rest) = der_read_integer(rest)?;
        if !rest.is_empty() {
            return Err(err);
        }
        Ok(Signature { r, s })
    }
}

fn der_integer(bytes: &[u8; 32]) -> Vec<u8> {
    let stripped: &[u8] = {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(31);
        &bytes[start..]
    };
    let mut out = Vec::with_capacity(33);
    if stripped[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(stripped);
    out
}

fn der_read_integer(bytes: &[u8]) -> Result<(Scalar, &[u8]), Error> {
    let err = Error::InvalidSignatureEncoding("malformed DER integer");
    if bytes.len() < 2 || bytes[0] != 0x02 {
        return Err(err);
    }
    let len = bytes[1] as usize;
    if len == 0 || len > 33 || bytes.len() < 2 + len {
        return Err(err);
    }
    let body = &bytes[2..2 + len];
    if body[0] & 0x80 != 0 {
        return Err(Error::InvalidSignatureEncoding("negative DER integer"));
    }
    if body.len() > 1 && body[0] == 0x00 && body[1] & 0x80 == 0 {
        return Err(Error::InvalidSignatureEncoding("non-minimal DER integer"));
    }
    let digits = if body[0] == 0x00 { &body[1..] } else { body };
    if digits.len() > 32 {
        return Err(err);
    }
    let mut padded = [0u8; 32];
    padded[32 - digits.len()..].copy_from_slice(digits);
    Ok((Scalar::from_be_bytes(&padded)?, &bytes[2 + len..]))
}

/// Sign a 32-byte message hash with the RFC 6979 deterministic nonce.
///
/// Re-signs internally whenever the candidate nonce is out of range or the
/// resulting `r` or `s` would be zero; `s` is normalized to the lower half
/// of the order before returning.
pub fn sign(sk: &Scalar, msg32: &[u8; 32]) -> Result<Signature, Error> {
    if sk.is_zero() {
        return Err(Error::InvalidKeyMaterial("private key is zero"));
    }
    let z = Scalar::reduce_from_be_bytes(msg32);
    let mut nonce = Rfc6979::new(sk, &z.to_be_bytes());

    loop {
        let k = nonce.next_nonce();
        let point = AffinePoint::generator().mul(&k);
        let x_bytes = match point.x() {
            Some(x) => x.to_be_bytes(),
            // k in [1, n) never multiplies G to infinity; treat as retry
            None => continue,
        };
        let r = Scalar::reduce_from_be_bytes(&x_bytes);
        if r.is_zero() {
            continue;
        }
        let k_inv = match k.invert() {
            Some(inv) => inv,
            None => continue,
        };
        let mut s = k_inv.mul(&z.add(&r.mul(sk)));
        if s.is_zero() {
            continue;
        }
        if s.is_high() {
            s = s.negate();
        }
        return Ok(Signature { r, s });
    }
}

/// Verify a signature over a 32-byte message hash.
///
/// Rejects `r == 0`, `s == 0` (range above `n` is unrepresentable in
/// [`Signature`]) and the point at infinity.
pub fn verify(pk: &AffinePoint, msg32: &[u8; 32], sig: &Signature) -> bool {
    if pk.is_infinity() || sig.r.is_zero() || sig.s.is_zero() {
        return false;
    }
    let z = Scalar::reduce_from_be_bytes(msg32);
    let w = match sig.s.invert() {
        Some(w) => w,
        None => return false,
    };
    let u1 = z.mul(&w);
    let u2 = sig.r.mul(&w);
    let point = AffinePoint::generator().mul(&u1).add(&pk.mul(&u2));
    match point.x() {
        Some(x) => Scalar::reduce_from_be_bytes(&x.to_be_bytes()) == sig.r,
        None => false,
    }
}

/// HMAC-SHA-256 DRBG from RFC 6979 §3.2. The update schedule touches the
/// private key bytes in a fixed pattern regardless of their value.
struct Rfc6979 {
    k: [u8; 32],
    v: [u8; 32],
}

impl Rfc6979 {
    fn new(sk: &Scalar, h1: &[u8; 32]) -> Self {
        let mut x = sk.to_be_bytes();
        let mut k = [0x00u8; 32];
        let mut v = [0x01u8; 32];

        let mut msg = Vec::with_capacity(97);
        msg.extend_from_slice(&v);
        msg.push(0x00);
        msg.extend_from_slice(&x);
        msg.extend_from_slice(h1);
        k = hmac_sha256(&k, &msg);
        v = hmac_sha256(&k, &v);

        msg.clear();
        msg.extend_from_slice(&v);
        msg.push(0x01);
        msg.extend_from_slice(&x);
        msg.extend_from_slice(h1);
        k = hmac_sha256(&k, &msg);
        v = hmac_sha256(&k, &v);

        msg.scrub();
        x.scrub();
        Rfc6979 { k, v }
    }

    /// Next candidate nonce in `[1, n)`.
    fn next_nonce(&mut self) -> Scalar {
        loop {
            self.v = hmac_sha256(&self.k, &self.v);
            if let Ok(k) = Scalar::from_be_bytes(&self.v) {
                if !k.is_zero() {
                    self.bump();
                    return k;
                }
            }
            self.bump();
        }
    }

    fn bump(&mut self) {
        let mut msg = [0u8; 33];
        msg[..32].copy_from_slice(&self.v);
        msg[32] = 0x00;
        self.k = hmac_sha256(&self.k, &msg);
        self.v = hmac_sha256(&self.k, &self.v);
    }
}

impl Drop for Rfc6979 {
    fn drop(&mut self) {
        self.k.scrub();
        self.v.scrub();
    }
}

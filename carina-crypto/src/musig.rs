//! BIP-327 MuSig2: n-of-n Schnorr key and signature aggregation.
//!
//! The protocol runs in three phases. Key aggregation combines the
//! participants' public keys into a single x-only aggregate; nonce exchange
//! has every signer publish two nonce points; signing produces one partial
//! signature per participant, which aggregate into an ordinary BIP-340
//! signature. Participant order matters everywhere: all signers must feed
//! the identical key list and the identical nonce list.

use thiserror::Error;

use crate::curve::{AffinePoint, Scalar};
use crate::hash::{sha256, tagged_hash, TaggedHasher};
use crate::memsec::{ct_eq, Scrubbed as _};
use crate::schnorr;

const KEYAGG_LIST_TAG: &str = "KeyAgg list";
const KEYAGG_COEFF_TAG: &str = "KeyAgg coefficient";
const AUX_TAG: &str = "MuSig/aux";
const NONCE_TAG: &str = "MuSig/nonce";
const NONCE_COEF_TAG: &str = "MuSig/noncecoef";
const CHALLENGE_TAG: &str = "BIP0340/challenge";

const KEYAGG_CACHE_MAGIC: [u8; 4] = [0x8d, 0x42, 0xb1, 0x5c];
const SECNONCE_MAGIC: [u8; 4] = [0x22, 0x0e, 0xdc, 0xf1];
const SESSION_MAGIC: [u8; 4] = [0x9b, 0x3e, 0x5d, 0x32];

/// Typed reasons for a MuSig2 protocol failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MusigError {
    #[error("participant list is empty")]
    EmptyKeyList,
    #[error("participant public key is invalid")]
    InvalidParticipantKey,
    #[error("aggregate public key is the point at infinity")]
    KeyAggInfinity,
    #[error("aggregate nonce is the point at infinity")]
    NonceAggInfinity,
    #[error("public nonce encoding is invalid")]
    InvalidNonce,
    #[error("secret nonce does not belong to the signing key")]
    NonceKeyMismatch,
    #[error("tweak is out of range")]
    TweakOutOfRange,
    #[error("partial signature is out of range")]
    PartialSigOutOfRange,
    #[error("partial signature failed verification")]
    PartialSigMismatch,
    #[error("opaque state blob is malformed: {0}")]
    InvalidBlob(&'static str),
}

/// The key-aggregation coefficient `a_i` for one participant.
fn key_agg_coeff(list_hash: &[u8; 32], pk: &[u8; 33], second: Option<&[u8; 33]>) -> Scalar {
    if let Some(second) = second {
        if ct_eq(pk, second) {
            return Scalar::from_u64(1);
        }
    }
    let mut hasher = TaggedHasher::new(KEYAGG_COEFF_TAG);
    hasher.input(list_hash);
    hasher.input(pk);
    Scalar::reduce_from_be_bytes(&hasher.finalize())
}

/// Aggregated-key state: the running aggregate point plus the tweak
/// accumulators every later phase needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyAggContext {
    q: AffinePoint,
    t_acc: Scalar,
    g_acc_neg: bool,
    list_hash: [u8; 32],
    second_key: Option<[u8; 33]>,
}

impl KeyAggContext {
    /// Aggregate the participant keys, order-sensitively.
    pub fn new(pubkeys: &[[u8; 33]]) -> Result<Self, MusigError> {
        if pubkeys.is_empty() {
            return Err(MusigError::EmptyKeyList);
        }

        let mut list_hasher = TaggedHasher::new(KEYAGG_LIST_TAG);
        for pk in pubkeys {
            list_hasher.input(pk);
        }
        let list_hash = list_hasher.finalize().to_byte_array();

        // the first key that differs from the first participant's key
        let second_key = pubkeys[1..]
            .iter()
            .find(|pk| !ct_eq(&pk[..], &pubkeys[0][..]))
            .copied();

        let mut q = AffinePoint::Infinity;
        for pk in pubkeys {
            let point = AffinePoint::decode(pk).map_err(|_| MusigError::InvalidParticipantKey)?;
            let coeff = key_agg_coeff(&list_hash, pk, second_key.as_ref());
            q = q.add(&point.mul(&coeff));
        }
        if q.is_infinity() {
            return Err(MusigError::KeyAggInfinity);
        }

        tracing::trace!(participants = pubkeys.len(), "musig key aggregation");

        Ok(KeyAggContext {
            q,
            t_acc: Scalar::zero(),
            g_acc_neg: false,
            list_hash,
            second_key,
        })
    }

    /// X-only aggregate public key (the output key after any tweaks).
    pub fn aggregated_xonly(&self) -> [u8; 32] {
        self.q
            .x_only()
            .expect("aggregate is checked against infinity")
    }

    /// Apply a tweak. A plain tweak adds `t·G`; an x-only tweak first
    /// forces the running aggregate to even Y, flipping the accumulated
    /// parity and negating the accumulated tweak.
    pub fn tweak_add(&mut self, tweak: &[u8; 32], xonly: bool) -> Result<(), MusigError> {
        let t = Scalar::from_be_bytes(tweak).map_err(|_| MusigError::TweakOutOfRange)?;
        if xonly && !self.q.has_even_y() {
            self.q = self.q.negate();
            self.t_acc = self.t_acc.negate();
            self.g_acc_neg = !self.g_acc_neg;
        }
        let tweaked = self.q.add(&AffinePoint::generator().mul(&t));
        if tweaked.is_infinity() {
            return Err(MusigError::TweakOutOfRange);
        }
        self.q = tweaked;
        self.t_acc = self.t_acc.add(&t);
        Ok(())
    }

    /// 197-byte cache blob:
    /// `magic(4) || Q(64, x||y) || t_acc(32) || g_acc(1) || L(32) ||
    /// second_key(64, x||y; zeros when absent)`.
    pub fn to_bytes(&self) -> [u8; 197] {
        let mut out = [0u8; 197];
        out[..4].copy_from_slice(&KEYAGG_CACHE_MAGIC);
        let q = self.q.uncompressed().expect("aggregate is not infinity");
        out[4..68].copy_from_slice(&q[1..]);
        out[68..100].copy_from_slice(&self.t_acc.to_be_bytes());
        out[100] = u8::from(self.g_acc_neg);
        out[101..133].copy_from_slice(&self.list_hash);
        if let Some(second) = &self.second_key {
            let point = AffinePoint::decode(second).expect("validated on construction");
            let coords = point.uncompressed().expect("participant key");
            out[133..197].copy_from_slice(&coords[1..]);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; 197]) -> Result<Self, MusigError> {
        if bytes[..4] != KEYAGG_CACHE_MAGIC {
            return Err(MusigError::InvalidBlob("bad key-agg cache magic"));
        }
        let q = decode_coords(&bytes[4..68])?;
        let mut t_bytes = [0u8; 32];
        t_bytes.copy_from_slice(&bytes[68..100]);
        let t_acc =
            Scalar::from_be_bytes(&t_bytes).map_err(|_| MusigError::InvalidBlob("tweak range"))?;
        let g_acc_neg = match bytes[100] {
            0 => false,
            1 => true,
            _ => return Err(MusigError::InvalidBlob("bad parity byte")),
        };
        let mut list_hash = [0u8; 32];
        list_hash.copy_from_slice(&bytes[101..133]);
        let second_key = if bytes[133..197].iter().all(|&b| b == 0) {
            None
        } else {
            let point = decode_coords(&bytes[133..197])?;
            Some(
                point
                    .compressed()
                    .map_err(|_| MusigError::InvalidBlob("second key"))?,
            )
        };
        Ok(KeyAggContext {
            q,
            t_acc,
            g_acc_neg,
            list_hash,
            second_key,
        })
    }
}

fn decode_coords(bytes: &[u8]) -> Result<AffinePoint, MusigError> {
    let mut enc = [0u8; 65];
    enc[0] = 0x04;
    enc[1..].copy_from_slice(bytes);
    AffinePoint::decode(&enc).map_err(|_| MusigError::InvalidBlob("point off curve"))
}

/// One signer's secret nonce pair, bound to their public key.
///
/// Single use: signing consumes the value. The scalars are scrubbed on
/// drop.
pub struct SecNonce {
    k1: Scalar,
    k2: Scalar,
    pk: [u8; 33],
}

impl Drop for SecNonce {
    fn drop(&mut self) {
        self.k1 = Scalar::zero();
        self.k2 = Scalar::zero();
    }
}

impl SecNonce {
    /// 132-byte blob: `magic 0x220EDCF1 || k1(32) || k2(32) || pk(64, x||y)`.
    pub fn to_bytes(&self) -> Result<[u8; 132], MusigError> {
        let point =
            AffinePoint::decode(&self.pk).map_err(|_| MusigError::InvalidParticipantKey)?;
        let coords = point
            .uncompressed()
            .map_err(|_| MusigError::InvalidParticipantKey)?;
        let mut out = [0u8; 132];
        out[..4].copy_from_slice(&SECNONCE_MAGIC);
        out[4..36].copy_from_slice(&self.k1.to_be_bytes());
        out[36..68].copy_from_slice(&self.k2.to_be_bytes());
        out[68..132].copy_from_slice(&coords[1..]);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8; 132]) -> Result<Self, MusigError> {
        if bytes[..4] != SECNONCE_MAGIC {
            return Err(MusigError::InvalidBlob("bad secret nonce magic"));
        }
        let mut k1_bytes = [0u8; 32];
        let mut k2_bytes = [0u8; 32];
        k1_bytes.copy_from_slice(&bytes[4..36]);
        k2_bytes.copy_from_slice(&bytes[36..68]);
        let k1 = Scalar::from_be_bytes(&k1_bytes)
            .map_err(|_| MusigError::InvalidBlob("nonce scalar range"))?;
        let k2 = Scalar::from_be_bytes(&k2_bytes)
            .map_err(|_| MusigError::InvalidBlob("nonce scalar range"))?;
        let pk = decode_coords(&bytes[68..132])?
            .compressed()
            .map_err(|_| MusigError::InvalidBlob("nonce key"))?;
        Ok(SecNonce { k1, k2, pk })
    }

    pub fn public_nonce(&self) -> Result<PubNonce, MusigError> {
        let r1 = AffinePoint::generator().mul(&self.k1);
        let r2 = AffinePoint::generator().mul(&self.k2);
        Ok(PubNonce {
            r1: r1
                .compressed()
                .map_err(|_| MusigError::InvalidNonce)?,
            r2: r2
                .compressed()
                .map_err(|_| MusigError::InvalidNonce)?,
        })
    }
}

/// A signer's two public nonce points, 66 bytes on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PubNonce {
    pub r1: [u8; 33],
    pub r2: [u8; 33],
}

impl PubNonce {
    pub fn to_bytes(&self) -> [u8; 66] {
        let mut out = [0u8; 66];
        out[..33].copy_from_slice(&self.r1);
        out[33..].copy_from_slice(&self.r2);
        out
    }

    pub fn from_bytes(bytes: &[u8; 66]) -> Result<Self, MusigError> {
        let mut r1 = [0u8; 33];
        let mut r2 = [0u8; 33];
        r1.copy_from_slice(&bytes[..33]);
        r2.copy_from_slice(&bytes[33..]);
        // eagerly validate both points
        AffinePoint::decode(&r1).map_err(|_| MusigError::InvalidNonce)?;
        AffinePoint::decode(&r2).map_err(|_| MusigError::InvalidNonce)?;
        Ok(PubNonce { r1, r2 })
    }
}

/// The sum of every participant's public nonces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggNonce {
    r1: AffinePoint,
    r2: AffinePoint,
}

/// Derive a secret nonce pair and its public counterpart.
///
/// `rand` must be fresh 32-byte entropy. When the signing key is supplied
/// it is mixed in (`sk XOR H_aux(rand)`) so that bad caller randomness
/// degrades to deterministic-but-secret nonces instead of repeats. The
/// optional aggregate key and message bind the nonce to its session; the
/// derivation carries a trailing counter byte distinguishing `k1`/`k2`.
pub fn nonce_gen(
    rand: &[u8; 32],
    sk: Option<&Scalar>,
    pk: &[u8; 33],
    aggpk_xonly: Option<&[u8; 32]>,
    msg: Option<&[u8]>,
    extra: &[u8],
) -> Result<(SecNonce, PubNonce), MusigError> {
    AffinePoint::decode(pk).map_err(|_| MusigError::InvalidParticipantKey)?;

    let mut seed = match sk {
        Some(sk) => {
            let mask = tagged_hash(AUX_TAG, rand);
            let mut bytes = sk.to_be_bytes();
            for (byte, m) in bytes.iter_mut().zip(mask.as_ref()) {
                *byte ^= m;
            }
            bytes
        }
        None => *rand,
    };

    loop {
        let derive = |counter: u8| -> Scalar {
            let mut hasher = TaggedHasher::new(NONCE_TAG);
            hasher.input(&seed);
            hasher.input(&[33u8]);
            hasher.input(pk);
            match aggpk_xonly {
                Some(aggpk) => {
                    hasher.input(&[32u8]);
                    hasher.input(aggpk);
                }
                None => hasher.input(&[0u8]),
            }
            match msg {
                Some(m) => {
                    hasher.input(&[1u8]);
                    hasher.input(&(m.len() as u64).to_be_bytes());
                    hasher.input(m);
                }
                None => hasher.input(&[0u8]),
            }
            hasher.input(&(extra.len() as u32).to_be_bytes());
            hasher.input(extra);
            hasher.input(&[counter]);
            Scalar::reduce_from_be_bytes(&hasher.finalize())
        };

        let k1 = derive(0);
        let k2 = derive(1);
        if k1.is_zero() || k2.is_zero() {
            // reroll rather than fail; unreachable in practice
            seed = sha256(&seed).to_byte_array();
            continue;
        }
        seed.scrub();

        let secnonce = SecNonce { k1, k2, pk: *pk };
        let pubnonce = secnonce.public_nonce()?;
        return Ok((secnonce, pubnonce));
    }
}

/// [`nonce_gen`] with entropy drawn from a caller-supplied RNG.
pub fn nonce_gen_with_rng<R: rand_core::RngCore + rand_core::CryptoRng>(
    rng: &mut R,
    sk: Option<&Scalar>,
    pk: &[u8; 33],
    aggpk_xonly: Option<&[u8; 32]>,
    msg: Option<&[u8]>,
    extra: &[u8],
) -> Result<(SecNonce, PubNonce), MusigError> {
    let mut rand = [0u8; 32];
    rng.fill_bytes(&mut rand);
    let result = nonce_gen(&rand, sk, pk, aggpk_xonly, msg, extra);
    rand.scrub();
    result
}

/// Sum the participants' public nonces. Order must match the key list
/// ordering used at aggregation time.
pub fn nonce_agg(nonces: &[PubNonce]) -> Result<AggNonce, MusigError> {
    if nonces.is_empty() {
        return Err(MusigError::InvalidNonce);
    }
    let mut r1 = AffinePoint::Infinity;
    let mut r2 = AffinePoint::Infinity;
    for nonce in nonces {
        r1 = r1.add(&AffinePoint::decode(&nonce.r1).map_err(|_| MusigError::InvalidNonce)?);
        r2 = r2.add(&AffinePoint::decode(&nonce.r2).map_err(|_| MusigError::InvalidNonce)?);
    }
    if r1.is_infinity() || r2.is_infinity() {
        return Err(MusigError::NonceAggInfinity);
    }
    Ok(AggNonce { r1, r2 })
}

/// Per-message signing state shared by all participants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    negate_nonces: bool,
    b: Scalar,
    e: Scalar,
    t_acc: Scalar,
    g_acc_neg: bool,
    final_rx: [u8; 32],
}

impl Session {
    pub fn new(ctx: &KeyAggContext, agg_nonce: &AggNonce, msg: &[u8]) -> Result<Self, MusigError> {
        let q_xonly = ctx.aggregated_xonly();

        let mut agg_bytes = [0u8; 66];
        agg_bytes[..33].copy_from_slice(
            &agg_nonce
                .r1
                .compressed()
                .map_err(|_| MusigError::NonceAggInfinity)?,
        );
        agg_bytes[33..].copy_from_slice(
            &agg_nonce
                .r2
                .compressed()
                .map_err(|_| MusigError::NonceAggInfinity)?,
        );

        let mut b_hasher = TaggedHasher::new(NONCE_COEF_TAG);
        b_hasher.input(&agg_bytes);
        b_hasher.input(&q_xonly);
        b_hasher.input(msg);
        let b = Scalar::reduce_from_be_bytes(&b_hasher.finalize());

        let r = agg_nonce.r1.add(&agg_nonce.r2.mul(&b));
        if r.is_infinity() {
            return Err(MusigError::NonceAggInfinity);
        }
        let negate_nonces = !r.has_even_y();
        let final_rx = r.x_only().map_err(|_| MusigError::NonceAggInfinity)?;

        let mut e_hasher = TaggedHasher::new(CHALLENGE_TAG);
        e_hasher.input(&final_rx);
        e_hasher.input(&q_xonly);
        e_hasher.input(msg);
        let e = Scalar::reduce_from_be_bytes(&e_hasher.finalize());

        tracing::trace!(negate_nonces, "musig session established");

        Ok(Session {
            negate_nonces,
            b,
            e,
            t_acc: ctx.t_acc.clone(),
            g_acc_neg: ctx.g_acc_neg,
            final_rx,
        })
    }

    /// 133-byte blob: `magic(4) || flags(1; bit0 = negate nonces, bit1 =
    /// accumulated parity negative) || b(32) || e(32) || t_acc(32) ||
    /// final R.x(32)`.
    pub fn to_bytes(&self) -> [u8; 133] {
        let mut out = [0u8; 133];
        out[..4].copy_from_slice(&SESSION_MAGIC);
        out[4] = u8::from(self.negate_nonces) | (u8::from(self.g_acc_neg) << 1);
        out[5..37].copy_from_slice(&self.b.to_be_bytes());
        out[37..69].copy_from_slice(&self.e.to_be_bytes());
        out[69..101].copy_from_slice(&self.t_acc.to_be_bytes());
        out[101..133].copy_from_slice(&self.final_rx);
        out
    }

    pub fn from_bytes(bytes: &[u8; 133]) -> Result<Self, MusigError> {
        if bytes[..4] != SESSION_MAGIC {
            return Err(MusigError::InvalidBlob("bad session magic"));
        }
        if bytes[4] & !0x03 != 0 {
            return Err(MusigError::InvalidBlob("bad session flags"));
        }
        let read_scalar = |range: std::ops::Range<usize>| -> Result<Scalar, MusigError> {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&bytes[range]);
            Scalar::from_be_bytes(&buf).map_err(|_| MusigError::InvalidBlob("scalar range"))
        };
        let mut final_rx = [0u8; 32];
        final_rx.copy_from_slice(&bytes[101..133]);
        Ok(Session {
            negate_nonces: bytes[4] & 0x01 != 0,
            g_acc_neg: bytes[4] & 0x02 != 0,
            b: read_scalar(5..37)?,
            e: read_scalar(37..69)?,
            t_acc: read_scalar(69..101)?,
            final_rx,
        })
    }

    /// Produce this signer's partial signature, consuming the secret nonce.
    pub fn partial_sign(
        &self,
        ctx: &KeyAggContext,
        secnonce: SecNonce,
        sk: &Scalar,
    ) -> Result<PartialSig, MusigError> {
        let pk_point = AffinePoint::generator().mul(sk);
        let pk = pk_point
            .compressed()
            .map_err(|_| MusigError::InvalidParticipantKey)?;
        if !ct_eq(&pk, &secnonce.pk) {
            return Err(MusigError::NonceKeyMismatch);
        }

        let (k1, k2) = if self.negate_nonces {
            (secnonce.k1.negate(), secnonce.k2.negate())
        } else {
            (secnonce.k1.clone(), secnonce.k2.clone())
        };

        let a = key_agg_coeff(&ctx.list_hash, &pk, ctx.second_key.as_ref());

        // effective secret: negate for the output-key parity and again for
        // the accumulated tweak parity
        let mut d = sk.clone();
        if !ctx.q.has_even_y() {
            d = d.negate();
        }
        if ctx.g_acc_neg {
            d = d.negate();
        }

        let s = k1.add(&self.b.mul(&k2)).add(&self.e.mul(&a).mul(&d));
        tracing::trace!("musig partial signature produced");
        Ok(PartialSig(s))
    }

    /// Check one participant's partial signature against their public
    /// nonce and public key.
    pub fn partial_verify(
        &self,
        ctx: &KeyAggContext,
        nonce: &PubNonce,
        pk: &[u8; 33],
        sig: &PartialSig,
    ) -> Result<(), MusigError> {
        let r1 = AffinePoint::decode(&nonce.r1).map_err(|_| MusigError::InvalidNonce)?;
        let r2 = AffinePoint::decode(&nonce.r2).map_err(|_| MusigError::InvalidNonce)?;
        let mut r_eff = r1.add(&r2.mul(&self.b));
        if self.negate_nonces {
            r_eff = r_eff.negate();
        }

        let point = AffinePoint::decode(pk).map_err(|_| MusigError::InvalidParticipantKey)?;
        let a = key_agg_coeff(&ctx.list_hash, pk, ctx.second_key.as_ref());
        let mut p_eff = point;
        if !ctx.q.has_even_y() {
            p_eff = p_eff.negate();
        }
        if ctx.g_acc_neg {
            p_eff = p_eff.negate();
        }

        let lhs = AffinePoint::generator().mul(&sig.0);
        let rhs = r_eff.add(&p_eff.mul(&self.e.mul(&a)));
        if lhs == rhs {
            Ok(())
        } else {
            Err(MusigError::PartialSigMismatch)
        }
    }

    /// Combine the partial signatures into a complete BIP-340 signature.
    pub fn partial_sig_agg(
        &self,
        ctx: &KeyAggContext,
        partials: &[PartialSig],
    ) -> Result<schnorr::Signature, MusigError> {
        if partials.is_empty() {
            return Err(MusigError::PartialSigOutOfRange);
        }
        let mut s = Scalar::zero();
        for partial in partials {
            s = s.add(&partial.0);
        }
        // the tweak term carries the output-key parity
        let mut t = self.t_acc.clone();
        if !ctx.q.has_even_y() {
            t = t.negate();
        }
        s = s.add(&self.e.mul(&t));
        Ok(schnorr::Signature {
            rx: self.final_rx,
            s,
        })
    }
}

/// One participant's contribution to the final signature scalar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialSig(pub Scalar);

impl PartialSig {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, MusigError> {
        Scalar::from_be_bytes(bytes)
            .map(PartialSig)
            .map_err(|_| MusigError::PartialSigOutOfRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(seed: u64) -> (Scalar, [u8; 33]) {
        let sk = Scalar::from_u64(seed);
        let pk = AffinePoint::generator().mul(&sk).compressed().unwrap();
        (sk, pk)
    }

    fn run_protocol(
        keys: &[(Scalar, [u8; 33])],
        tweak: Option<(&[u8; 32], bool)>,
        msg: &[u8],
    ) -> (KeyAggContext, schnorr::Signature) {
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(|(_, pk)| *pk).collect();
        let mut ctx = KeyAggContext::new(&pubkeys).unwrap();
        if let Some((t, xonly)) = tweak {
            ctx.tweak_add(t, xonly).unwrap();
        }
        let aggpk = ctx.aggregated_xonly();

        let mut secnonces = Vec::new();
        let mut pubnonces = Vec::new();
        for (i, (sk, pk)) in keys.iter().enumerate() {
            let mut rand = [0u8; 32];
            rand[0] = i as u8 + 1;
            let (sec, public) =
                nonce_gen(&rand, Some(sk), pk, Some(&aggpk), Some(msg), &[]).unwrap();
            secnonces.push(sec);
            pubnonces.push(public);
        }

        let agg_nonce = nonce_agg(&pubnonces).unwrap();
        let session = Session::new(&ctx, &agg_nonce, msg).unwrap();

        let mut partials = Vec::new();
        for ((sk, pk), sec) in keys.iter().zip(secnonces) {
            let partial = session.partial_sign(&ctx, sec, sk).unwrap();
            session
                .partial_verify(&ctx, &pubnonces[partials.len()], pk, &partial)
                .unwrap();
            partials.push(partial);
        }

        let sig = session.partial_sig_agg(&ctx, &partials).unwrap();
        (ctx, sig)
    }

    #[test]
    fn two_of_two_signs_valid_bip340() {
        let keys = [signer(1111), signer(2222)];
        let msg = b"musig two of two";
        let (ctx, sig) = run_protocol(&keys, None, msg);
        assert!(schnorr::verify(&ctx.aggregated_xonly(), msg, &sig));
    }

    #[test]
    fn three_signers_with_xonly_tweak() {
        let keys = [signer(7), signer(11), signer(13)];
        let tweak = [0x55u8; 32];
        let msg = b"tweaked aggregate";
        let (ctx, sig) = run_protocol(&keys, Some((&tweak, true)), msg);
        assert!(schnorr::verify(&ctx.aggregated_xonly(), msg, &sig));
    }

    #[test]
    fn plain_tweak_also_verifies() {
        let keys = [signer(21), signer(22)];
        let tweak = [0x11u8; 32];
        let msg = b"plain tweak";
        let (ctx, sig) = run_protocol(&keys, Some((&tweak, false)), msg);
        assert!(schnorr::verify(&ctx.aggregated_xonly(), msg, &sig));
    }

    #[test]
    fn aggregation_is_order_insensitive_over_partials() {
        let keys = [signer(31), signer(32)];
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(|(_, pk)| *pk).collect();
        let ctx = KeyAggContext::new(&pubkeys).unwrap();
        let aggpk = ctx.aggregated_xonly();
        let msg = b"commutative";

        let mut secnonces = Vec::new();
        let mut pubnonces = Vec::new();
        for (i, (sk, pk)) in keys.iter().enumerate() {
            let rand = [i as u8 + 9; 32];
            let (sec, public) =
                nonce_gen(&rand, Some(sk), pk, Some(&aggpk), Some(msg), &[]).unwrap();
            secnonces.push(sec);
            pubnonces.push(public);
        }
        let agg_nonce = nonce_agg(&pubnonces).unwrap();
        let session = Session::new(&ctx, &agg_nonce, msg).unwrap();

        let mut partials = Vec::new();
        for ((sk, _), sec) in keys.iter().zip(secnonces) {
            partials.push(session.partial_sign(&ctx, sec, sk).unwrap());
        }
        let forward = session.partial_sig_agg(&ctx, &partials).unwrap();
        partials.reverse();
        let backward = session.partial_sig_agg(&ctx, &partials).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn duplicate_keys_aggregate() {
        let (sk, pk) = signer(5);
        let _ = sk;
        let ctx = KeyAggContext::new(&[pk, pk]).unwrap();
        // no second distinct key: every coefficient is hashed
        assert!(ctx.second_key.is_none());
    }

    #[test]
    fn second_key_gets_unit_coefficient() {
        let (_, pk_a) = signer(41);
        let (_, pk_b) = signer(42);
        let ctx = KeyAggContext::new(&[pk_a, pk_b]).unwrap();
        assert_eq!(ctx.second_key, Some(pk_b));
        assert_eq!(
            key_agg_coeff(&ctx.list_hash, &pk_b, ctx.second_key.as_ref()),
            Scalar::from_u64(1)
        );
    }

    #[test]
    fn keyagg_cache_roundtrip() {
        let keys = [signer(51), signer(52), signer(53)];
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(|(_, pk)| *pk).collect();
        let mut ctx = KeyAggContext::new(&pubkeys).unwrap();
        ctx.tweak_add(&[3u8; 32], true).unwrap();
        let blob = ctx.to_bytes();
        assert_eq!(blob.len(), 197);
        assert_eq!(KeyAggContext::from_bytes(&blob).unwrap(), ctx);
    }

    #[test]
    fn secnonce_roundtrip_and_magic() {
        let (sk, pk) = signer(61);
        let (sec, _) = nonce_gen(&[8u8; 32], Some(&sk), &pk, None, None, &[]).unwrap();
        let blob = sec.to_bytes().unwrap();
        assert_eq!(&blob[..4], &[0x22, 0x0e, 0xdc, 0xf1]);
        let restored = SecNonce::from_bytes(&blob).unwrap();
        assert_eq!(restored.k1, sec.k1);
        assert_eq!(restored.k2, sec.k2);
    }

    #[test]
    fn session_blob_roundtrip() {
        let keys = [signer(71), signer(72)];
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(|(_, pk)| *pk).collect();
        let ctx = KeyAggContext::new(&pubkeys).unwrap();
        let msg = b"session blob";
        let mut nonces = Vec::new();
        for (i, (sk, pk)) in keys.iter().enumerate() {
            let rand = [i as u8 + 77; 32];
            let (_, public) = nonce_gen(&rand, Some(sk), pk, None, Some(msg), &[]).unwrap();
            nonces.push(public);
        }
        let session = Session::new(&ctx, &nonce_agg(&nonces).unwrap(), msg).unwrap();
        let blob = session.to_bytes();
        assert_eq!(blob.len(), 133);
        assert_eq!(Session::from_bytes(&blob).unwrap(), session);
    }

    #[test]
    fn wrong_key_nonce_pairing_is_rejected() {
        let (sk_a, pk_a) = signer(81);
        let (sk_b, pk_b) = signer(82);
        let ctx = KeyAggContext::new(&[pk_a, pk_b]).unwrap();
        let msg = b"mismatch";
        let (sec_a, pub_a) = nonce_gen(&[1u8; 32], Some(&sk_a), &pk_a, None, Some(msg), &[]).unwrap();
        let (_, pub_b) = nonce_gen(&[2u8; 32], Some(&sk_b), &pk_b, None, Some(msg), &[]).unwrap();
        let session =
            Session::new(&ctx, &nonce_agg(&[pub_a, pub_b]).unwrap(), msg).unwrap();
        // signer B presents signer A's nonce
        assert_eq!(
            session.partial_sign(&ctx, sec_a, &sk_b).unwrap_err(),
            MusigError::NonceKeyMismatch
        );
    }

    #[test]
    fn tampered_partial_fails_verification() {
        let keys = [signer(91), signer(92)];
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(|(_, pk)| *pk).collect();
        let ctx = KeyAggContext::new(&pubkeys).unwrap();
        let aggpk = ctx.aggregated_xonly();
        let msg = b"tamper";
        let mut secnonces = Vec::new();
        let mut pubnonces = Vec::new();
        for (i, (sk, pk)) in keys.iter().enumerate() {
            let rand = [i as u8 + 3; 32];
            let (sec, public) =
                nonce_gen(&rand, Some(sk), pk, Some(&aggpk), Some(msg), &[]).unwrap();
            secnonces.push(sec);
            pubnonces.push(public);
        }
        let session = Session::new(&ctx, &nonce_agg(&pubnonces).unwrap(), msg).unwrap();
        let sec = secnonces.remove(0);
        let partial = session.partial_sign(&ctx, sec, &keys[0].0).unwrap();
        let tampered = PartialSig(partial.0.add(&Scalar::from_u64(1)));
        assert_eq!(
            session
                .partial_verify(&ctx, &pubnonces[0], &keys[0].1, &tampered)
                .unwrap_err(),
            MusigError::PartialSigMismatch
        );
    }
}

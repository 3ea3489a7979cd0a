use cryptoxide::digest::Digest as _;
use cryptoxide::hmac::Hmac;
use cryptoxide::mac::Mac as _;
use cryptoxide::sha2::{Sha256, Sha512};
use ripemd160::{Digest as _, Ripemd160};
use tiny_keccak::{Hasher as _, Keccak};

use crate::hash::Hash;

/// SHA-256 of the input.
pub fn sha256(data: &[u8]) -> Hash<32> {
    let mut ctx = Sha256::new();
    ctx.input(data);
    let mut out = [0u8; 32];
    ctx.result(&mut out);
    Hash::new(out)
}

/// Double SHA-256, the digest consensus structures commit to.
pub fn sha256d(data: &[u8]) -> Hash<32> {
    sha256(sha256(data).as_ref())
}

/// SHA-512 of the input.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut ctx = Sha512::new();
    ctx.input(data);
    let mut out = [0u8; 64];
    ctx.result(&mut out);
    out
}

/// RIPEMD-160 of the input.
pub fn ripemd160(data: &[u8]) -> Hash<20> {
    let mut ctx = Ripemd160::new();
    ctx.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ctx.finalize());
    Hash::new(out)
}

/// HASH160 = RIPEMD-160 ∘ SHA-256, the public-key and script hash of the
/// legacy and SegWit v0 address families.
pub fn hash160(data: &[u8]) -> Hash<20> {
    ripemd160(sha256(data).as_ref())
}

/// HMAC-SHA-512 keyed by `key`, as used by BIP-32 child key derivation.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::new(Sha512::new(), key);
    mac.input(data);
    let mut out = [0u8; 64];
    mac.raw_result(&mut out);
    out
}

/// HMAC-SHA-256 keyed by `key`, the building block of the RFC 6979 DRBG.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::new(Sha256::new(), key);
    mac.input(data);
    let mut out = [0u8; 32];
    mac.raw_result(&mut out);
    out
}

/// Keccak-256 as used by Ethereum (pre-NIST padding).
pub fn keccak256(data: &[u8]) -> Hash<32> {
    let mut ctx = Keccak::v256();
    ctx.update(data);
    let mut out = [0u8; 32];
    ctx.finalize(&mut out);
    Hash::new(out)
}

/// BLAKE2b-256 with a 16-byte personalization, the digest of the Zcash
/// Sapling signature scheme (ZIP-243).
pub fn blake2b256_personal(personal: &[u8; 16], data: &[u8]) -> Hash<32> {
    let digest = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(personal)
        .to_state()
        .update(data)
        .finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_bytes());
    Hash::new(out)
}

/// The BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
pub fn tagged_hash(tag: &str, msg: &[u8]) -> Hash<32> {
    let mut hasher = TaggedHasher::new(tag);
    hasher.input(msg);
    hasher.finalize()
}

/// Streaming form of [`tagged_hash`] for multi-part messages.
///
/// BIP-340, BIP-341 and BIP-327 all feed several concatenated fields into a
/// tagged hash; building the preimage incrementally avoids intermediate
/// buffers of secret material.
pub struct TaggedHasher(Sha256);

impl TaggedHasher {
    pub fn new(tag: &str) -> Self {
        let tag_digest = sha256(tag.as_bytes());
        let mut ctx = Sha256::new();
        ctx.input(tag_digest.as_ref());
        ctx.input(tag_digest.as_ref());
        Self(ctx)
    }

    #[inline]
    pub fn input(&mut self, data: &[u8]) {
        self.0.input(data);
    }

    pub fn finalize(mut self) -> Hash<32> {
        let mut out = [0u8; 32];
        self.0.result(&mut out);
        Hash::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty() {
        assert_eq!(
            sha256(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_abc() {
        assert_eq!(
            sha256(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256d_hello() {
        // double-SHA256("hello")
        assert_eq!(
            sha256d(b"hello").to_string(),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn ripemd160_abc() {
        assert_eq!(
            ripemd160(b"abc").to_string(),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn hash160_of_sec_pubkey() {
        // HASH160 of a compressed public key, the P2WPKH program
        let pubkey =
            hex::decode("0330d54fd0dd420a6e5f8d3624f5f3ba96190b89f338e2949c8c3c14e0ac16168f")
                .unwrap();
        assert_eq!(
            hash160(&pubkey).to_string(),
            "74b8d7b96009c4e043aec5a73026c9171c406faf"
        );
    }

    #[test]
    fn keccak256_empty() {
        assert_eq!(
            keccak256(b"").to_string(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn hmac_sha512_rfc4231_case1() {
        let key = [0x0bu8; 20];
        let out = hmac_sha512(&key, b"Hi There");
        assert_eq!(
            hex::encode(&out[..32]),
            "87aa7cdea5ef619d4ff0b4241a1d6cb02379f4e2ce4ec2787ad0b30545e17cde"
        );
        assert_eq!(
            hex::encode(&out[32..]),
            "daa833b7d6b8a702038b274eaea3f4e4be9d914eeb61f1702e696c203a126854"
        );
    }

    #[test]
    fn tagged_hash_matches_manual_construction() {
        let tag = "TapTweak";
        let msg = b"carina";
        let tag_digest = sha256(tag.as_bytes());
        let mut preimage = Vec::new();
        preimage.extend_from_slice(tag_digest.as_ref());
        preimage.extend_from_slice(tag_digest.as_ref());
        preimage.extend_from_slice(msg);
        assert_eq!(tagged_hash(tag, msg), sha256(&preimage));
    }

    #[test]
    fn tagged_hasher_streaming_equals_oneshot() {
        let mut hasher = TaggedHasher::new("BIP0340/challenge");
        hasher.input(b"part one ");
        hasher.input(b"part two");
        assert_eq!(
            hasher.finalize(),
            tagged_hash("BIP0340/challenge", b"part one part two")
        );
    }
}

//! BIP-32 hierarchical-deterministic keys.
//!
//! Extended keys are immutable values; derivation returns new ones. The
//! crate covers master-key generation from a seed, hardened and
//! non-hardened private derivation, public-only derivation, fingerprints
//! and the 78-byte `xprv`/`xpub` text family (plus the SegWit-flavoured
//! `yprv`/`zprv` prefixes).

pub mod path;

use cryptoxide::hmac::Hmac;
use cryptoxide::pbkdf2::pbkdf2;
use cryptoxide::sha2::Sha512;
use thiserror::Error;

use carina_addresses::base58;
use carina_crypto::curve::{AffinePoint, Scalar};
use carina_crypto::hash::{hash160, hmac_sha512};
use carina_crypto::memsec::Scrubbed as _;

pub use path::{DerivationPath, HARDENED_OFFSET};

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("key material error: {0}")]
    Crypto(#[from] carina_crypto::Error),

    #[error("text encoding error: {0}")]
    Encoding(#[from] carina_addresses::Error),

    #[error("derived child is unusable, skip to the next index")]
    UnusableChild,

    #[error("hardened derivation requires the private key")]
    HardenedFromPublic,

    #[error("derivation depth exceeds 255")]
    DepthOverflow,

    #[error("seed of {0} bytes is outside the 16..=64 range")]
    InvalidSeedLength(usize),

    #[error("malformed derivation path {0:?}")]
    InvalidPath(String),

    #[error("unknown extended-key version prefix")]
    UnknownVersion,

    #[error("extended-key payload of {0} bytes where 78 were expected")]
    WrongPayloadLength(usize),

    #[error("non-zero parent data on a depth-0 key")]
    InconsistentDepth,
}

/// The six version prefixes of the extended-key text form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyVersion {
    Xprv,
    Xpub,
    Yprv,
    Ypub,
    Zprv,
    Zpub,
}

impl KeyVersion {
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            KeyVersion::Xprv => [0x04, 0x88, 0xad, 0xe4],
            KeyVersion::Xpub => [0x04, 0x88, 0xb2, 0x1e],
            KeyVersion::Yprv => [0x04, 0x9d, 0x78, 0x78],
            KeyVersion::Ypub => [0x04, 0x9d, 0x7c, 0xb2],
            KeyVersion::Zprv => [0x04, 0xb2, 0x43, 0x0c],
            KeyVersion::Zpub => [0x04, 0xb2, 0x47, 0x46],
        }
    }

    pub fn from_bytes(bytes: &[u8; 4]) -> Result<Self, Error> {
        Ok(match bytes {
            [0x04, 0x88, 0xad, 0xe4] => KeyVersion::Xprv,
            [0x04, 0x88, 0xb2, 0x1e] => KeyVersion::Xpub,
            [0x04, 0x9d, 0x78, 0x78] => KeyVersion::Yprv,
            [0x04, 0x9d, 0x7c, 0xb2] => KeyVersion::Ypub,
            [0x04, 0xb2, 0x43, 0x0c] => KeyVersion::Zprv,
            [0x04, 0xb2, 0x47, 0x46] => KeyVersion::Zpub,
            _ => return Err(Error::UnknownVersion),
        })
    }

    pub fn is_private(self) -> bool {
        matches!(self, KeyVersion::Xprv | KeyVersion::Yprv | KeyVersion::Zprv)
    }

    /// The public counterpart used when deriving watch-only keys.
    pub fn to_public(self) -> Self {
        match self {
            KeyVersion::Xprv | KeyVersion::Xpub => KeyVersion::Xpub,
            KeyVersion::Yprv | KeyVersion::Ypub => KeyVersion::Ypub,
            KeyVersion::Zprv | KeyVersion::Zpub => KeyVersion::Zpub,
        }
    }
}

/// An extended private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Xprv {
    key: Scalar,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

/// An extended public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Xpub {
    point: AffinePoint,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl Xprv {
    /// Master key from a 16..=64-byte seed:
    /// `I = HMAC-SHA512("Bitcoin seed", seed)`.
    pub fn from_seed(seed: &[u8]) -> Result<Self, Error> {
        if !(16..=64).contains(&seed.len()) {
            return Err(Error::InvalidSeedLength(seed.len()));
        }
        let mut i = hmac_sha512(MASTER_HMAC_KEY, seed);
        let mut il = [0u8; 32];
        il.copy_from_slice(&i[..32]);
        let key = Scalar::secret_from_be_bytes(&il)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        il.scrub();
        i.scrub();
        Ok(Xprv {
            key,
            chain_code,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
        })
    }

    pub fn private_key(&self) -> &Scalar {
        &self.key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn to_xpub(&self) -> Xpub {
        Xpub {
            point: AffinePoint::generator().mul(&self.key),
            chain_code: self.chain_code,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
        }
    }

    /// First four bytes of `HASH160(compressed public key)`.
    pub fn fingerprint(&self) -> [u8; 4] {
        self.to_xpub().fingerprint()
    }

    /// Derive one child. Hardened indices (`>= 0x80000000`) commit to the
    /// private key; the rest commit to the compressed public key.
    ///
    /// Returns [`Error::UnusableChild`] for the (vanishingly rare) indices
    /// BIP-32 declares invalid; the caller skips to the next index.
    pub fn derive_child(&self, index: u32) -> Result<Xprv, Error> {
        let depth = self.depth.checked_add(1).ok_or(Error::DepthOverflow)?;

        let mut data = Vec::with_capacity(37);
        if index >= HARDENED_OFFSET {
            data.push(0x00);
            data.extend_from_slice(&self.key.to_be_bytes());
        } else {
            let compressed = self.to_xpub().point.compressed()?;
            data.extend_from_slice(&compressed);
        }
        data.extend_from_slice(&index.to_be_bytes());

        let mut i = hmac_sha512(&self.chain_code, &data);
        data.scrub();
        let mut il = [0u8; 32];
        il.copy_from_slice(&i[..32]);
        let tweak = Scalar::from_be_bytes(&il).map_err(|_| Error::UnusableChild)?;
        il.scrub();

        let key = self.key.add(&tweak);
        if key.is_zero() {
            return Err(Error::UnusableChild);
        }
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        i.scrub();

        Ok(Xprv {
            key,
            chain_code,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: index,
        })
    }

    /// Derive along a full path.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Xprv, Error> {
        let mut current = self.clone();
        for &index in path.indices() {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    /// 78-byte serialization under the given (private) version prefix,
    /// emitted through Base58Check.
    pub fn encode(&self, version: KeyVersion) -> Result<String, Error> {
        if !version.is_private() {
            return Err(Error::UnknownVersion);
        }
        let mut key_material = [0u8; 33];
        key_material[1..].copy_from_slice(&self.key.to_be_bytes());
        let text = encode_extended(
            version,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
            &key_material,
        );
        key_material.scrub();
        Ok(text)
    }
}

impl Xpub {
    pub fn public_point(&self) -> &AffinePoint {
        &self.point
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        let compressed = self
            .point
            .compressed()
            .expect("extended keys are never the identity");
        let digest = hash160(&compressed);
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest[..4]);
        out
    }

    /// Public-only derivation; hardened indices are impossible here.
    pub fn derive_child(&self, index: u32) -> Result<Xpub, Error> {
        if index >= HARDENED_OFFSET {
            return Err(Error::HardenedFromPublic);
        }
        let depth = self.depth.checked_add(1).ok_or(Error::DepthOverflow)?;

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.point.compressed()?);
        data.extend_from_slice(&index.to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let mut il = [0u8; 32];
        il.copy_from_slice(&i[..32]);
        let tweak = Scalar::from_be_bytes(&il).map_err(|_| Error::UnusableChild)?;

        let point = self
            .point
            .add(&AffinePoint::generator().mul(&tweak));
        if point.is_infinity() {
            return Err(Error::UnusableChild);
        }
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        Ok(Xpub {
            point,
            chain_code,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: index,
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Xpub, Error> {
        let mut current = self.clone();
        for &index in path.indices() {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    pub fn encode(&self, version: KeyVersion) -> Result<String, Error> {
        if version.is_private() {
            return Err(Error::UnknownVersion);
        }
        Ok(encode_extended(
            version,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
            &self.point.compressed()?,
        ))
    }
}

/// Either side of the key pair, as produced by [`decode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtendedKey {
    Private(Xprv),
    Public(Xpub),
}

fn encode_extended(
    version: KeyVersion,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: &[u8; 32],
    key_material: &[u8; 33],
) -> String {
    let mut payload = Vec::with_capacity(78);
    payload.extend_from_slice(&version.to_bytes());
    payload.push(depth);
    payload.extend_from_slice(&parent_fingerprint);
    payload.extend_from_slice(&child_number.to_be_bytes());
    payload.extend_from_slice(chain_code);
    payload.extend_from_slice(key_material);
    let text = base58::encode_check(&payload);
    payload.scrub();
    text
}

/// Decode the 111-character text form back into an extended key.
pub fn decode(text: &str) -> Result<(KeyVersion, ExtendedKey), Error> {
    let payload = base58::decode_check(text)?;
    if payload.len() != 78 {
        return Err(Error::WrongPayloadLength(payload.len()));
    }
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&payload[..4]);
    let version = KeyVersion::from_bytes(&version_bytes)?;

    let depth = payload[4];
    let mut parent_fingerprint = [0u8; 4];
    parent_fingerprint.copy_from_slice(&payload[5..9]);
    let child_number = u32::from_be_bytes(payload[9..13].try_into().expect("4 bytes"));
    if depth == 0 && (parent_fingerprint != [0; 4] || child_number != 0) {
        return Err(Error::InconsistentDepth);
    }
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&payload[13..45]);

    let key = if version.is_private() {
        if payload[45] != 0x00 {
            return Err(Error::Crypto(carina_crypto::Error::InvalidKeyMaterial(
                "private key material must be zero-padded",
            )));
        }
        let mut sk = [0u8; 32];
        sk.copy_from_slice(&payload[46..]);
        let scalar = Scalar::secret_from_be_bytes(&sk)?;
        sk.scrub();
        ExtendedKey::Private(Xprv {
            key: scalar,
            chain_code,
            depth,
            parent_fingerprint,
            child_number,
        })
    } else {
        let point = AffinePoint::decode(&payload[45..])?;
        ExtendedKey::Public(Xpub {
            point,
            chain_code,
            depth,
            parent_fingerprint,
            child_number,
        })
    };
    Ok((version, key))
}

/// The BIP-39 seed-derivation contract: PBKDF2-HMAC-SHA512 with 2048
/// iterations over the salt `"mnemonic" || passphrase`.
///
/// Word-list handling and phrase validation live with the wallet
/// front-end; this crate only turns an accepted phrase into seed bytes.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> [u8; 64] {
    let mut salt = Vec::with_capacity(8 + passphrase.len());
    salt.extend_from_slice(b"mnemonic");
    salt.extend_from_slice(passphrase.as_bytes());

    let mut mac = Hmac::new(Sha512::new(), phrase.as_bytes());
    let mut seed = [0u8; 64];
    pbkdf2(&mut mac, &salt, 2048, &mut seed);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR1_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn master() -> Xprv {
        Xprv::from_seed(&hex::decode(VECTOR1_SEED).unwrap()).unwrap()
    }

    #[test]
    fn vector1_master_keys() {
        let m = master();
        assert_eq!(
            m.encode(KeyVersion::Xprv).unwrap(),
            "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi"
        );
        assert_eq!(
            m.to_xpub().encode(KeyVersion::Xpub).unwrap(),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );
    }

    #[test]
    fn vector1_first_hardened_child() {
        let child = master().derive_child(HARDENED_OFFSET).unwrap();
        assert_eq!(
            child.encode(KeyVersion::Xprv).unwrap(),
            "xprv9uHRZZhk6KAJC1avXpDAp4MDc3sQKNxDiPvvkX8Br5ngLNv1TxvUxt4cV1rGL5hj6KCesnDYUhd7oWgT11eZG7XnxHrnYeSvkzY7d2bhkJ7"
        );
    }

    #[test]
    fn text_roundtrip() {
        let m = master();
        let text = m.encode(KeyVersion::Xprv).unwrap();
        assert_eq!(text.len(), 111);
        let (version, decoded) = decode(&text).unwrap();
        assert_eq!(version, KeyVersion::Xprv);
        assert_eq!(decoded, ExtendedKey::Private(m));
    }

    #[test]
    fn public_derivation_matches_private() {
        let account = master()
            .derive_path(&"m/84'/0'/0'".parse().unwrap())
            .unwrap();
        let suffix: DerivationPath = "m/0/7".parse().unwrap();

        let via_private = account.derive_path(&suffix).unwrap().to_xpub();
        let via_public = account.to_xpub().derive_path(&suffix).unwrap();
        assert_eq!(via_private, via_public);
    }

    #[test]
    fn hardened_public_derivation_fails() {
        let xpub = master().to_xpub();
        assert_eq!(
            xpub.derive_child(HARDENED_OFFSET).unwrap_err(),
            Error::HardenedFromPublic
        );
    }

    #[test]
    fn segwit_versions_change_prefix() {
        let m = master();
        assert!(m.encode(KeyVersion::Zprv).unwrap().starts_with("zprv"));
        assert!(m
            .to_xpub()
            .encode(KeyVersion::Zpub)
            .unwrap()
            .starts_with("zpub"));
        assert!(m.encode(KeyVersion::Xpub).is_err());
    }

    #[test]
    fn seed_length_bounds() {
        assert!(Xprv::from_seed(&[0u8; 15]).is_err());
        assert!(Xprv::from_seed(&[0u8; 65]).is_err());
        assert!(Xprv::from_seed(&[1u8; 16]).is_ok());
    }

    #[test]
    fn bip39_trezor_vector() {
        let seed = mnemonic_to_seed(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            "TREZOR",
        );
        assert_eq!(
            hex::encode(seed),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }
}

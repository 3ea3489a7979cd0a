//! Address encoding and decoding for the chains the wallet core speaks.
//!
//! The entry point is the [`Address`] enum, which holds the decoded form of
//! a legacy Base58Check address, a SegWit or Taproot program, or an
//! Ethereum account. Codecs never consult global tables: every call that
//! depends on the network takes a [`NetworkParams`] value.

pub mod base58;
pub mod bech32;
pub mod caip;
pub mod eip55;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use carina_crypto::hash::{hash160, keccak256, sha256};
use carina_crypto::{curve::AffinePoint, taproot};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("character {0:?} is not in the Base58 alphabet")]
    InvalidBase58Character(char),

    #[error("Base58Check payload of {0} bytes is shorter than its checksum")]
    Base58TooShort(usize),

    #[error("Base58Check checksum mismatch")]
    BadBase58Checksum,

    #[error("bech32 human-readable part is empty or invalid")]
    Bech32EmptyHrp,

    #[error("bech32 string exceeds 90 characters")]
    Bech32TooLong,

    #[error("bech32 string mixes upper and lower case")]
    Bech32MixedCase,

    #[error("bech32 separator '1' not found")]
    Bech32MissingSeparator,

    #[error("bech32 checksum shorter than 6 characters")]
    Bech32ChecksumTooShort,

    #[error("character {0:?} is not in the bech32 charset")]
    InvalidBech32Character(char),

    #[error("bech32 checksum mismatch")]
    BadBech32Checksum,

    #[error("value {0} does not fit the source bit group")]
    InvalidBitGroup(u8),

    #[error("non-zero padding after bit regrouping")]
    InvalidPadding,

    #[error("witness version {0} is out of range")]
    InvalidWitnessVersion(u8),

    #[error("witness program of {0} bytes is out of range")]
    InvalidProgramLength(usize),

    #[error("checksum variant does not match the witness version")]
    WrongChecksumVariant,

    #[error("human-readable part {0:?} does not belong to this network")]
    UnknownHrp(String),

    #[error("version byte {0:#04x} does not belong to this network")]
    UnknownVersionByte(u8),

    #[error("payload of {0} bytes where 20 were expected")]
    InvalidPayloadLength(usize),

    #[error("ethereum account hex of {0} characters where 40 were expected")]
    InvalidEthereumLength(usize),

    #[error("ethereum account is not valid hex")]
    InvalidEthereumHex,

    #[error("EIP-55 checksum mismatch")]
    BadEip55Checksum,

    #[error("CAIP-2 namespace {0:?} is invalid")]
    InvalidCaip2Namespace(String),

    #[error("CAIP-2 reference {0:?} is invalid")]
    InvalidCaip2Reference(String),

    #[error("CAIP-2 chain id {0:?} is missing its separator")]
    InvalidCaip2ChainId(String),

    #[error("unrecognized address {0:?}")]
    UnknownAddressFormat(String),

    #[error("key material error: {0}")]
    Key(#[from] carina_crypto::Error),
}

/// Per-network codec parameters, passed by value into every call that
/// needs them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub p2pkh_version: u8,
    pub p2sh_version: u8,
    pub hrp: String,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        NetworkParams {
            p2pkh_version: 0x00,
            p2sh_version: 0x05,
            hrp: "bc".to_string(),
        }
    }

    pub fn testnet() -> Self {
        NetworkParams {
            p2pkh_version: 0x6f,
            p2sh_version: 0xc4,
            hrp: "tb".to_string(),
        }
    }

    pub fn regtest() -> Self {
        NetworkParams {
            p2pkh_version: 0x6f,
            p2sh_version: 0xc4,
            hrp: "bcrt".to_string(),
        }
    }
}

/// A decoded address of any supported flavour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    /// Version byte plus 20-byte hash (P2PKH or P2SH).
    LegacyBase58 { version: u8, hash: [u8; 20] },
    /// Witness version 0 or 2..16 program under a bech32 HRP.
    SegWit {
        hrp: String,
        version: u8,
        program: Vec<u8>,
    },
    /// Witness version 1 with a 32-byte x-only output key.
    Taproot { hrp: String, output_key: [u8; 32] },
    /// A 20-byte Ethereum account.
    EthereumHex([u8; 20]),
}

impl Address {
    /// Pay-to-public-key-hash from a SEC-encoded public key.
    pub fn p2pkh(pubkey: &[u8], params: &NetworkParams) -> Self {
        Address::LegacyBase58 {
            version: params.p2pkh_version,
            hash: hash160(pubkey).to_byte_array(),
        }
    }

    /// Pay-to-script-hash from a redeem script.
    pub fn p2sh(redeem_script: &[u8], params: &NetworkParams) -> Self {
        Address::LegacyBase58 {
            version: params.p2sh_version,
            hash: hash160(redeem_script).to_byte_array(),
        }
    }

    /// Native SegWit v0 key program.
    pub fn p2wpkh(pubkey: &[u8], params: &NetworkParams) -> Self {
        Address::SegWit {
            hrp: params.hrp.clone(),
            version: 0,
            program: hash160(pubkey).as_ref().to_vec(),
        }
    }

    /// Native SegWit v0 script program.
    pub fn p2wsh(witness_script: &[u8], params: &NetworkParams) -> Self {
        Address::SegWit {
            hrp: params.hrp.clone(),
            version: 0,
            program: sha256(witness_script).as_ref().to_vec(),
        }
    }

    /// Taproot output from an internal key, tweaked per BIP-341 (BIP-86
    /// when `merkle_root` is absent).
    pub fn p2tr(
        internal_x: &[u8; 32],
        merkle_root: Option<&[u8; 32]>,
        params: &NetworkParams,
    ) -> Result<Self, Error> {
        let tweaked = taproot::tap_tweak(internal_x, merkle_root)?;
        Ok(Address::Taproot {
            hrp: params.hrp.clone(),
            output_key: tweaked.output.x_only()?,
        })
    }

    /// Taproot output from an already-tweaked output key.
    pub fn p2tr_from_output(output_key: [u8; 32], params: &NetworkParams) -> Self {
        Address::Taproot {
            hrp: params.hrp.clone(),
            output_key,
        }
    }

    /// Ethereum account: last 20 bytes of `keccak256` over the
    /// uncompressed public key coordinates.
    pub fn ethereum(pubkey: &AffinePoint) -> Result<Self, Error> {
        let uncompressed = pubkey.uncompressed()?;
        let digest = keccak256(&uncompressed[1..]);
        let mut account = [0u8; 20];
        account.copy_from_slice(&digest[12..]);
        Ok(Address::EthereumHex(account))
    }

    /// Encode to the canonical text form.
    pub fn encode(&self) -> Result<String, Error> {
        match self {
            Address::LegacyBase58 { version, hash } => {
                let mut payload = Vec::with_capacity(21);
                payload.push(*version);
                payload.extend_from_slice(hash);
                Ok(base58::encode_check(&payload))
            }
            Address::SegWit {
                hrp,
                version,
                program,
            } => encode_witness(hrp, *version, program),
            Address::Taproot { hrp, output_key } => encode_witness(hrp, 1, output_key),
            Address::EthereumHex(account) => Ok(eip55::encode(account)),
        }
    }

    /// Parse a text address against the given network.
    pub fn decode(text: &str, params: &NetworkParams) -> Result<Self, Error> {
        if text.starts_with("0x") || text.starts_with("0X") {
            return eip55::decode(text).map(Address::EthereumHex);
        }
        if let Ok((hrp, data, variant)) = bech32::decode(text) {
            if hrp != params.hrp {
                return Err(Error::UnknownHrp(hrp));
            }
            let (version, program) = split_witness(&data, variant)?;
            return Ok(match (version, program.len()) {
                (1, 32) => {
                    let mut output_key = [0u8; 32];
                    output_key.copy_from_slice(&program);
                    Address::Taproot { hrp, output_key }
                }
                _ => Address::SegWit {
                    hrp,
                    version,
                    program,
                },
            });
        }
        let payload = base58::decode_check(text)
            .map_err(|_| Error::UnknownAddressFormat(text.to_string()))?;
        if payload.len() != 21 {
            return Err(Error::InvalidPayloadLength(payload.len().saturating_sub(1)));
        }
        let version = payload[0];
        if version != params.p2pkh_version && version != params.p2sh_version {
            return Err(Error::UnknownVersionByte(version));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Address::LegacyBase58 { version, hash })
    }

    /// The scriptPubKey this address locks to; `None` for Ethereum
    /// accounts, which are not script-addressed. The network params decide
    /// whether a legacy version byte means P2PKH or P2SH.
    pub fn script_pubkey(&self, params: &NetworkParams) -> Option<Vec<u8>> {
        match self {
            Address::LegacyBase58 { version, hash } => {
                let mut script = Vec::with_capacity(25);
                if *version == params.p2sh_version {
                    // OP_HASH160 <20> OP_EQUAL
                    script.push(0xa9);
                    script.push(0x14);
                    script.extend_from_slice(hash);
                    script.push(0x87);
                } else {
                    // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
                    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
                    script.extend_from_slice(hash);
                    script.extend_from_slice(&[0x88, 0xac]);
                }
                Some(script)
            }
            Address::SegWit {
                version, program, ..
            } => {
                let mut script = Vec::with_capacity(2 + program.len());
                script.push(witness_version_opcode(*version));
                script.push(program.len() as u8);
                script.extend_from_slice(program);
                Some(script)
            }
            Address::Taproot { output_key, .. } => {
                let mut script = Vec::with_capacity(34);
                script.push(witness_version_opcode(1));
                script.push(32);
                script.extend_from_slice(output_key);
                Some(script)
            }
            Address::EthereumHex(_) => None,
        }
    }
}

fn witness_version_opcode(version: u8) -> u8 {
    if version == 0 {
        0x00
    } else {
        0x50 + version
    }
}

fn encode_witness(hrp: &str, version: u8, program: &[u8]) -> Result<String, Error> {
    if version > 16 {
        return Err(Error::InvalidWitnessVersion(version));
    }
    if !(2..=40).contains(&program.len()) {
        return Err(Error::InvalidProgramLength(program.len()));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(Error::InvalidProgramLength(program.len()));
    }
    let mut data = vec![version];
    data.extend(bech32::convert_bits(program, 8, 5, true)?);
    let variant = if version == 0 {
        bech32::Variant::Bech32
    } else {
        bech32::Variant::Bech32m
    };
    bech32::encode(hrp, &data, variant)
}

fn split_witness(data: &[u8], variant: bech32::Variant) -> Result<(u8, Vec<u8>), Error> {
    let (&version, rest) = data
        .split_first()
        .ok_or(Error::InvalidProgramLength(0))?;
    if version > 16 {
        return Err(Error::InvalidWitnessVersion(version));
    }
    let expected = if version == 0 {
        bech32::Variant::Bech32
    } else {
        bech32::Variant::Bech32m
    };
    if variant != expected {
        return Err(Error::WrongChecksumVariant);
    }
    let program = bech32::convert_bits(rest, 5, 8, false)?;
    if !(2..=40).contains(&program.len()) {
        return Err(Error::InvalidProgramLength(program.len()));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(Error::InvalidProgramLength(program.len()));
    }
    Ok((version, program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_mainnet_vector() {
        let pubkey =
            hex::decode("0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2")
                .unwrap();
        let addr = Address::p2pkh(&pubkey, &NetworkParams::mainnet());
        assert_eq!(addr.encode().unwrap(), "15mKKb2eos1hWa6tisdPwwDC1a5J1y9nma");
    }

    #[test]
    fn p2wpkh_mainnet_vector() {
        let pubkey =
            hex::decode("0330d54fd0dd420a6e5f8d3624f5f3ba96190b89f338e2949c8c3c14e0ac16168f")
                .unwrap();
        let addr = Address::p2wpkh(&pubkey, &NetworkParams::mainnet());
        assert_eq!(
            addr.encode().unwrap(),
            "bc1qwjud0wtqp8zwqsawcknnqfkfzuwyqma0dvmpe6"
        );
    }

    #[test]
    fn bip86_taproot_vector() {
        let mut internal = [0u8; 32];
        hex::decode_to_slice(
            "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115",
            &mut internal,
        )
        .unwrap();
        let addr = Address::p2tr(&internal, None, &NetworkParams::mainnet()).unwrap();
        assert_eq!(
            addr.encode().unwrap(),
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
        );
    }

    #[test]
    fn decode_roundtrips() {
        let params = NetworkParams::mainnet();
        for text in [
            "15mKKb2eos1hWa6tisdPwwDC1a5J1y9nma",
            "bc1qwjud0wtqp8zwqsawcknnqfkfzuwyqma0dvmpe6",
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr",
        ] {
            let addr = Address::decode(text, &params).unwrap();
            assert_eq!(addr.encode().unwrap(), text);
        }
    }

    #[test]
    fn rejects_foreign_hrp() {
        let params = NetworkParams::testnet();
        assert!(matches!(
            Address::decode("bc1qwjud0wtqp8zwqsawcknnqfkfzuwyqma0dvmpe6", &params),
            Err(Error::UnknownHrp(_))
        ));
    }

    #[test]
    fn rejects_v0_program_of_odd_size() {
        let program = vec![0u8; 25];
        assert!(encode_witness("bc", 0, &program).is_err());
    }

    #[test]
    fn rejects_v1_with_bech32_checksum() {
        // taproot program encoded under the wrong (Bech32) constant
        let mut data = vec![1u8];
        data.extend(bech32::convert_bits(&[0x33; 32], 8, 5, true).unwrap());
        let wrong = bech32::encode("bc", &data, bech32::Variant::Bech32).unwrap();
        assert!(matches!(
            Address::decode(&wrong, &NetworkParams::mainnet()),
            Err(Error::WrongChecksumVariant)
        ));
    }

    #[test]
    fn segwit_script_pubkey_shapes() {
        let params = NetworkParams::mainnet();
        let pk = hex::decode("0330d54fd0dd420a6e5f8d3624f5f3ba96190b89f338e2949c8c3c14e0ac16168f")
            .unwrap();
        let v0 = Address::p2wpkh(&pk, &params).script_pubkey(&params).unwrap();
        assert_eq!(v0[0], 0x00);
        assert_eq!(v0[1], 20);
        assert_eq!(v0.len(), 22);

        let v1 = Address::p2tr_from_output([0x55; 32], &params)
            .script_pubkey(&params)
            .unwrap();
        assert_eq!(v1[0], 0x51);
        assert_eq!(v1[1], 32);
        assert_eq!(v1.len(), 34);
    }

    #[test]
    fn ethereum_account_from_pubkey() {
        use carina_crypto::curve::{AffinePoint, Scalar};
        let sk = Scalar::from_u64(1);
        let pk = AffinePoint::generator().mul(&sk);
        let addr = Address::ethereum(&pk).unwrap();
        // well-known account of private key 1
        assert_eq!(
            addr.encode().unwrap(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }
}

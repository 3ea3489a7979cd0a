//! Rust-native building blocks for multi-chain wallet development
//!
//! Carina is a collection of modules that implements the cryptographic and
//! consensus-encoding core a wallet needs: key derivation, address
//! encoding, transaction construction and signing, and the
//! miniscript/descriptor policy layer. This crate doesn't provide any
//! particular application; it is meant to be used as a base layer for
//! higher-level use-cases such as wallets, signers and vault tooling.

#[doc(inline)]
pub use carina_crypto as crypto;

pub mod keys {
    //! Key derivation and key trees

    #[doc(inline)]
    pub use carina_hdkeys as hd;
}

#[doc(inline)]
pub use carina_addresses as addresses;

pub mod chain {
    //! Consensus structures of the supported chains

    #[doc(inline)]
    pub use carina_psbt as psbt;

    #[doc(inline)]
    pub use carina_tx as tx;
}

pub mod wallet {
    //! Utilities for wallet implementations

    #[doc(inline)]
    pub use carina_coinselect as coinselect;

    #[doc(inline)]
    pub use carina_miniscript as miniscript;
}

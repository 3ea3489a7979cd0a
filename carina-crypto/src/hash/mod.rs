//! Hash functions of the Bitcoin lineage and their fixed-size outputs.

mod digest;
#[allow(clippy::module_inception)]
mod hash;

pub use digest::{
    blake2b256_personal, hash160, hmac_sha256, hmac_sha512, keccak256, ripemd160, sha256, sha256d,
    sha512, tagged_hash, TaggedHasher,
};
pub use hash::Hash;

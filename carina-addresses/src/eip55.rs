//! EIP-55 mixed-case checksum encoding of Ethereum addresses.

use carina_crypto::hash::keccak256;

use crate::Error;

/// Checksum-encode a 20-byte account, `0x`-prefixed.
///
/// Each alphabetic character is uppercased iff the corresponding nibble of
/// `keccak256(lowercase_hex)` is 8 or above.
pub fn encode(account: &[u8; 20]) -> String {
    let lower = hex::encode(account);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode a hex account, enforcing the checksum when the input is
/// mixed-case. All-lower and all-upper inputs carry no checksum and are
/// accepted as-is.
pub fn decode(text: &str) -> Result<[u8; 20], Error> {
    let body = text.strip_prefix("0x").unwrap_or(text);
    if body.len() != 40 {
        return Err(Error::InvalidEthereumLength(body.len()));
    }
    let mut account = [0u8; 20];
    hex::decode_to_slice(body, &mut account).map_err(|_| Error::InvalidEthereumHex)?;

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && encode(&account) != format!("0x{body}") {
        return Err(Error::BadEip55Checksum);
    }
    Ok(account)
}

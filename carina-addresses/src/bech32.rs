//! Bech32 and Bech32m codecs (BIP-173 / BIP-350).

use crate::Error;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Checksum constant selecting the encoding flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// BIP-173, used by witness version 0 programs.
    Bech32,
    /// BIP-350, used by witness version 1 and above.
    Bech32m,
}

impl Variant {
    fn constant(self) -> u32 {
        match self {
            Variant::Bech32 => 1,
            Variant::Bech32m => 0x2bc8_30a3,
        }
    }
}

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ v as u32;
        for (i, g) in GEN.iter().enumerate() {
            if (b >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    for c in hrp.bytes() {
        out.push(c >> 5);
    }
    out.push(0);
    for c in hrp.bytes() {
        out.push(c & 0x1f);
    }
    out
}

/// Encode 5-bit data under the given HRP and variant.
pub fn encode(hrp: &str, data: &[u8], variant: Variant) -> Result<String, Error> {
    if hrp.is_empty() {
        return Err(Error::Bech32EmptyHrp);
    }
    if hrp.len() + 1 + data.len() + 6 > 90 {
        return Err(Error::Bech32TooLong);
    }
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; 6]);
    let plm = polymod(&values) ^ variant.constant();

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &v in data {
        out.push(CHARSET[v as usize] as char);
    }
    for i in 0..6 {
        out.push(CHARSET[((plm >> (5 * (5 - i))) & 0x1f) as usize] as char);
    }
    Ok(out)
}

/// Decode into `(hrp, 5-bit data, variant)`.
///
/// Mixed case is rejected; the input is folded to lower case before the
/// checksum runs.
pub fn decode(text: &str) -> Result<(String, Vec<u8>, Variant), Error> {
    if text.len() > 90 {
        return Err(Error::Bech32TooLong);
    }
    let has_lower = text.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = text.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Error::Bech32MixedCase);
    }
    let text = text.to_ascii_lowercase();

    let sep = text.rfind('1').ok_or(Error::Bech32MissingSeparator)?;
    if sep == 0 {
        return Err(Error::Bech32EmptyHrp);
    }
    if text.len() - sep - 1 < 6 {
        return Err(Error::Bech32ChecksumTooShort);
    }
    let hrp = &text[..sep];
    if hrp.bytes().any(|b| !(33..=126).contains(&b)) {
        return Err(Error::Bech32EmptyHrp);
    }

    let mut data = Vec::with_capacity(text.len() - sep - 1);
    for c in text[sep + 1..].bytes() {
        let value = CHARSET
            .iter()
            .position(|&a| a == c)
            .ok_or(Error::InvalidBech32Character(c as char))?;
        data.push(value as u8);
    }

    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    let variant = match polymod(&values) {
        c if c == Variant::Bech32.constant() => Variant::Bech32,
        c if c == Variant::Bech32m.constant() => Variant::Bech32m,
        _ => return Err(Error::BadBech32Checksum),
    };

    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data, variant))
}

/// Regroup bits, `from`-bit groups to `to`-bit groups.
///
/// With `pad` the final partial group is zero-filled; without it, leftover
/// bits must be zero padding from a previous conversion or the input is
/// rejected.
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        if (value as u32) >> from != 0 {
            return Err(Error::InvalidBitGroup(value));
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return Err(Error::InvalidPadding);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bip173_valid_strings() {
        for valid in [
            "A12UEL5L",
            "an83characterlonghumanreadablepartthatcontainsthenumber1andtheexcludedcharactersbio1tt5tgs",
            "abcdef1qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw",
        ] {
            let (_, _, variant) = decode(valid).unwrap();
            assert_eq!(variant, Variant::Bech32);
        }
    }

    #[test]
    fn bip350_valid_strings() {
        for valid in [
            "A1LQFN3A",
            "abcdef1l7aum6echk45nj3s0wdvt2fg8x9yrzpqzd3ryx",
        ] {
            let (_, _, variant) = decode(valid).unwrap();
            assert_eq!(variant, Variant::Bech32m);
        }
    }

    #[test]
    fn rejects_mixed_case() {
        assert!(matches!(
            decode("A12uEL5L"),
            Err(Error::Bech32MixedCase)
        ));
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            decode("pzry9x0s0muk"),
            Err(Error::Bech32MissingSeparator)
        ));
    }

    #[test]
    fn rejects_bad_checksum() {
        assert!(decode("a12uel5m").is_err());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let data: Vec<u8> = (0..32).collect();
        for variant in [Variant::Bech32, Variant::Bech32m] {
            let text = encode("bc", &data, variant).unwrap();
            let (hrp, decoded, got) = decode(&text).unwrap();
            assert_eq!(hrp, "bc");
            assert_eq!(decoded, data);
            assert_eq!(got, variant);
        }
    }

    #[test]
    fn convert_bits_pads_and_restores() {
        let program = hex::decode("74b8d7b96009c4e043aec5a73026c9171c406faf").unwrap();
        let five = convert_bits(&program, 8, 5, true).unwrap();
        let eight = convert_bits(&five, 5, 8, false).unwrap();
        assert_eq!(eight, program);
    }

    #[test]
    fn convert_bits_rejects_dirty_padding() {
        // 1 leftover group with nonzero bits
        assert!(convert_bits(&[0x1f], 5, 8, false).is_err());
    }
}

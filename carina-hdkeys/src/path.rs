//! Derivation path grammar (`m/84'/0'/0'/0/0`).

use std::{fmt, str::FromStr};

use crate::Error;

/// Child indices at or above this value are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// An ordered sequence of 32-bit child numbers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn new(indices: Vec<u32>) -> Self {
        DerivationPath(indices)
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one step, returning the extended path.
    pub fn child(&self, index: u32) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        DerivationPath(indices)
    }

    /// Whether any step is hardened.
    pub fn has_hardened_step(&self) -> bool {
        self.0.iter().any(|&i| i >= HARDENED_OFFSET)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for &index in &self.0 {
            if index >= HARDENED_OFFSET {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match parts.next() {
            Some("m") | Some("M") => {}
            _ => return Err(Error::InvalidPath(s.to_string())),
        }

        let mut indices = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(Error::InvalidPath(s.to_string()));
            }
            let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidPath(s.to_string()))?;
            if index >= HARDENED_OFFSET {
                return Err(Error::InvalidPath(s.to_string()));
            }
            indices.push(if hardened {
                index + HARDENED_OFFSET
            } else {
                index
            });
        }
        Ok(DerivationPath(indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let path: DerivationPath = "m/84'/0'/0'/0/5".parse().unwrap();
        assert_eq!(
            path.indices(),
            &[
                84 + HARDENED_OFFSET,
                HARDENED_OFFSET,
                HARDENED_OFFSET,
                0,
                5
            ]
        );
        assert_eq!(path.to_string(), "m/84'/0'/0'/0/5");
    }

    #[test]
    fn h_suffix_accepted() {
        let a: DerivationPath = "m/44h/0h/0h".parse().unwrap();
        let b: DerivationPath = "m/44'/0'/0'".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn master_only() {
        let path: DerivationPath = "m".parse().unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "m");
    }

    #[test]
    fn rejects_garbage() {
        assert!("44'/0'".parse::<DerivationPath>().is_err());
        assert!("m//0".parse::<DerivationPath>().is_err());
        assert!("m/x".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn hardened_detection() {
        let path: DerivationPath = "m/0/1".parse().unwrap();
        assert!(!path.has_hardened_step());
        assert!(path.child(HARDENED_OFFSET).has_hardened_step());
    }
}

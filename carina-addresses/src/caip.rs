//! CAIP-2 chain identifiers (`namespace:reference`).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A chain-agnostic blockchain identifier, e.g. `eip155:1` or
/// `bip122:000000000019d6689c085ae165831e93`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    pub fn new(namespace: &str, reference: &str) -> Result<Self, Error> {
        if namespace.len() < 3
            || namespace.len() > 8
            || !namespace
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(Error::InvalidCaip2Namespace(namespace.to_string()));
        }
        if reference.is_empty()
            || reference.len() > 32
            || !reference
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::InvalidCaip2Reference(reference.to_string()));
        }
        Ok(ChainId {
            namespace: namespace.to_string(),
            reference: reference.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidCaip2ChainId(s.to_string()))?;
        Self::new(namespace, reference)
    }
}

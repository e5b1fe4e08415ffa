use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{PoolstakeError, Result};

/// Domain separation tag for label-derived addresses.
const ADDRESS_LABEL_DOMAIN: &[u8] = b"POOLSTAKE_ADDRESS_V1";

/// 20-byte account / operator address, rendered as lowercase hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;
    pub const EMPTY: Address = Address([0u8; 20]);

    /// Deterministic address for a human-readable label: `SHA-256(domain || label)[..20]`.
    pub fn from_label(label: &str) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(ADDRESS_LABEL_DOMAIN);
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }

    pub fn from_slice(bz: &[u8]) -> Result<Address> {
        let bytes: [u8; 20] = bz.try_into().map_err(|_| {
            PoolstakeError::InvalidInput(format!("address must be 20 bytes, got {}", bz.len()))
        })?;
        Ok(Address(bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = PoolstakeError;

    fn from_str(s: &str) -> Result<Address> {
        let bz = hex::decode(s)
            .map_err(|e| PoolstakeError::InvalidInput(format!("invalid address hex: {e}")))?;
        Address::from_slice(&bz)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_deterministic_and_distinct() {
        assert_eq!(Address::from_label("alice"), Address::from_label("alice"));
        assert_ne!(Address::from_label("alice"), Address::from_label("bob"));
        assert!(!Address::from_label("alice").is_empty());
        assert!(Address::EMPTY.is_empty());
    }

    #[test]
    fn hex_roundtrip() {
        let a = Address::from_label("pool-a");
        assert_eq!(a.to_string().parse::<Address>().unwrap(), a);
        assert!("abcd".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let a = Address::from_label("x");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}

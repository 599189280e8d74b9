//! Identifiers shared across the verification stack.

use serde::{Deserialize, Serialize};

/// The masterchain workchain id.
pub const MASTERCHAIN: i32 = -1;
/// The full masterchain shard prefix.
pub const MASTERCHAIN_SHARD: u64 = 0x8000_0000_0000_0000;

/// Hex-encoded 32-byte arrays for JSON payloads.
pub mod hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let v = hex::decode(s.trim_start_matches("0x")).map_err(Error::custom)?;
        v.try_into()
            .map_err(|_| Error::custom("expected 32 bytes of hex"))
    }
}

/// A standard internal account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Address {
    pub workchain: i8,
    #[serde(with = "hex32")]
    pub account: [u8; 32],
}

impl Address {
    pub fn new(workchain: i8, account: [u8; 32]) -> Self {
        Self { workchain, account }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.account))
    }
}

impl std::str::FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (wc, rest) = s
            .split_once(':')
            .ok_or_else(|| "expected workchain:account".to_string())?;
        let workchain: i8 = wc.parse().map_err(|_| "bad workchain".to_string())?;
        let bytes = hex::decode(rest).map_err(|_| "bad account hex".to_string())?;
        let account: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "account must be 32 bytes".to_string())?;
        Ok(Self { workchain, account })
    }
}

/// Shard-qualified block position, without hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BlockIdShort {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
}

impl BlockIdShort {
    pub fn masterchain(seqno: u32) -> Self {
        Self {
            workchain: MASTERCHAIN,
            shard: MASTERCHAIN_SHARD,
            seqno,
        }
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain == MASTERCHAIN && self.shard == MASTERCHAIN_SHARD
    }
}

/// Fully-qualified block id. The two hashes pin the exact block content;
/// everything a client verifies ultimately resolves to one of these.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BlockId {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
    #[serde(with = "hex32")]
    pub root_hash: [u8; 32],
    #[serde(with = "hex32")]
    pub file_hash: [u8; 32],
}

impl BlockId {
    pub fn short(&self) -> BlockIdShort {
        BlockIdShort {
            workchain: self.workchain,
            shard: self.shard,
            seqno: self.seqno,
        }
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain == MASTERCHAIN && self.shard == MASTERCHAIN_SHARD
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{:016x},{}):{}:{}",
            self.workchain,
            self.shard,
            self.seqno,
            hex::encode(self.root_hash),
            hex::encode(self.file_hash)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_parse() {
        let addr = Address::new(-1, [0xAB; 32]);
        let s = addr.to_string();
        assert!(s.starts_with("-1:abab"));
        assert_eq!(s.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_masterchain_id() {
        let id = BlockIdShort::masterchain(100);
        assert!(id.is_masterchain());
        assert!(!BlockIdShort {
            workchain: 0,
            shard: MASTERCHAIN_SHARD,
            seqno: 100
        }
        .is_masterchain());
    }

    #[test]
    fn test_block_id_json() {
        let id = BlockId {
            workchain: -1,
            shard: MASTERCHAIN_SHARD,
            seqno: 42,
            root_hash: [1; 32],
            file_hash: [2; 32],
        };
        let json = serde_json::to_string(&id).unwrap();
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

//! Typed views over the protocol's cell layouts.
//!
//! Every `load` takes a [`CellSlice`] positioned at the start of the value
//! and consumes exactly the bits and references the layout defines, so
//! loaders compose by concatenation. Constructor tags are checked before any
//! field is read; a wrong tag is a [`SchemaError::UnexpectedTag`].

pub mod account;
pub mod block;
pub mod config;
pub mod state;

use thiserror::Error;

use crate::cell::{CellArena, CellBuilder, CellError, CellSlice};
use crate::dict::{AugValue, Dict, DictError, DictValue};

pub use account::{
    Account, AccountState, AccountStatus, DepthBalanceInfo, HashUpdate, ShardAccount, Transaction,
};
pub use block::{
    check_block_proof, BlkPrevInfo, Block, BlockExtra, BlockInfo, McBlockExtra, ShardFeeCreated,
    StateUpdate,
};
pub use config::{CatchainConfig, ConfigParams, ValidatorDescr, ValidatorSet};
pub use state::{
    list_shards, FutureSplitMerge, KeyExtBlkRef, KeyMaxLt, McStateExtra, McStateInfo, ShardDescr,
    ShardStateUnsplit, ValidatorInfo,
};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unexpected tag {tag:#x} while reading {what}")]
    UnexpectedTag { what: &'static str, tag: u64 },

    #[error("{what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    #[error("required subtree of {what} was pruned out of the proof")]
    PrunedOut { what: &'static str },

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error(transparent)]
    Dict(#[from] DictError),
}

pub(crate) fn expect_tag(
    slice: &mut CellSlice<'_>,
    bit_len: usize,
    expected: u64,
    what: &'static str,
) -> Result<(), SchemaError> {
    let tag = slice.load_uint(bit_len)?;
    if tag != expected {
        return Err(SchemaError::UnexpectedTag { what, tag });
    }
    Ok(())
}

/// Reference to a previous block, embedded wherever a block or state points
/// backwards in the chain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ExtBlkRef {
    pub end_lt: u64,
    pub seq_no: u32,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
}

impl ExtBlkRef {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            end_lt: slice.load_u64()?,
            seq_no: slice.load_u32()?,
            root_hash: slice.load_hash()?,
            file_hash: slice.load_hash()?,
        })
    }
}

/// `capabilities#c4`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GlobalVersion {
    pub version: u32,
    pub capabilities: u64,
}

impl GlobalVersion {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 8, 0xc4, "GlobalVersion")?;
        Ok(Self {
            version: slice.load_u32()?,
            capabilities: slice.load_u64()?,
        })
    }
}

/// `shard_ident$00` — workchain plus a shard prefix with its length.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShardIdent {
    pub workchain: i32,
    pub shard: u64,
}

impl ShardIdent {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 2, 0, "ShardIdent")?;
        let pfx_bits = slice.load_uint_leq(60)?;
        let workchain = slice.load_i32()?;
        let prefix = slice.load_u64()?;
        // the marker bit sits right below the prefix
        let shard = (1u64 << (63 - pfx_bits)) | prefix;
        Ok(Self { workchain, shard })
    }
}

/// Ed25519 signature as stored in cells (`ed25519_signature#5`).
#[derive(Clone, Copy, Debug)]
pub struct CryptoSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl CryptoSignature {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 4, 5, "CryptoSignature")?;
        Ok(Self {
            r: slice.load_hash()?,
            s: slice.load_hash()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CryptoSignaturePair {
    pub node_id_short: [u8; 32],
    pub signature: CryptoSignature,
}

impl DictValue for CryptoSignaturePair {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        let node_id_short = slice.load_hash()?;
        let signature =
            CryptoSignature::load(slice).map_err(|e| DictError::Value(e.to_string()))?;
        Ok(Self {
            node_id_short,
            signature,
        })
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_bytes(&self.node_id_short)?;
        builder.write_uint(5, 4)?;
        builder.write_bytes(&self.signature.r)?;
        builder.write_bytes(&self.signature.s)?;
        Ok(())
    }
}

/// An amount of an extra currency, big-endian, arbitrary width.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ExtraCurrency(pub Vec<u8>);

impl DictValue for ExtraCurrency {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        Ok(Self(slice.load_var_bytes(32)?))
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        let len = self.0.len();
        if len > 31 {
            return Err(DictError::Value("extra currency wider than 248 bits".into()));
        }
        builder.write_uint(len as u64, 5)?;
        builder.write_bytes(&self.0)?;
        Ok(())
    }
}

fn add_be(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = vec![0u8; len + 1];
    let mut carry = 0u16;
    for i in 0..len {
        let x = if i < a.len() { a[a.len() - 1 - i] as u16 } else { 0 };
        let y = if i < b.len() { b[b.len() - 1 - i] as u16 } else { 0 };
        let sum = x + y + carry;
        out[len - i] = sum as u8;
        carry = sum >> 8;
    }
    out[0] = carry as u8;
    if out[0] == 0 {
        out.remove(0);
    }
    while out.len() > 1 && out[0] == 0 {
        out.remove(0);
    }
    out
}

/// Toncoin plus any extra currencies.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CurrencyCollection {
    pub grams: u128,
    pub extra: Dict<ExtraCurrency>,
}

impl CurrencyCollection {
    pub fn zero() -> Self {
        Self {
            grams: 0,
            extra: Dict::empty(32),
        }
    }
}

impl DictValue for CurrencyCollection {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        let grams = slice.load_grams()?;
        let extra = Dict::load_maybe(slice, 32)?;
        Ok(Self { grams, extra })
    }

    fn store(&self, builder: &mut CellBuilder, arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_grams(self.grams)?;
        self.extra.serialize_maybe(builder, arena)?;
        Ok(())
    }
}

impl AugValue for CurrencyCollection {
    fn combine(&self, other: &Self) -> Result<Self, DictError> {
        let mut extra = Dict::empty(32);
        for (key, value) in self.extra.iter() {
            extra.insert(*key, value.clone())?;
        }
        for (key, value) in other.extra.iter() {
            let merged = match extra.get(key) {
                Some(existing) => ExtraCurrency(add_be(&existing.0, &value.0)),
                None => value.clone(),
            };
            extra.insert(*key, merged)?;
        }
        Ok(Self {
            grams: self.grams + other.grams,
            extra,
        })
    }
}

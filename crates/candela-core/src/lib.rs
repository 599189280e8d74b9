//! # Candela Core
//!
//! Pure Rust TON light client verification logic.
//!
//! This crate contains **no networking code**. It is the cryptographic heart
//! of Candela — every piece of chain data passes through these verification
//! functions before being trusted.
//!
//! ## Trust Model
//!
//! - **Cell model and bag-of-cells** (`cell` module): hash-addressed cells
//!   with Merkle-proof and Merkle-update exotics. A proof's root hash equals
//!   the original tree's, so any pruned view is checked against a known hash.
//!
//! - **Trie dictionaries** (`dict` module): the Patricia-trie codec used by
//!   block and state structures; proof-aware lookups distinguish "proven
//!   absent" from "pruned away".
//!
//! - **Chain of trust** (`schema` + `consensus` modules): block headers are
//!   accepted only through Merkle proofs against known ids, and forward links
//!   only after recomputing the validator subset and verifying 2/3+ of its
//!   ed25519 signature weight (the same assumption the chain itself makes).
//!
//! ## Usage
//!
//! ```ignore
//! use candela_core::schema::check_block_proof;
//! use candela_core::consensus::{compute_mc_validator_subset, check_block_signatures};
//! ```

pub mod cell;
pub mod consensus;
pub mod dict;
pub mod schema;
pub mod types;

// Re-export commonly used types for convenience
pub use cell::{
    decode_boc, encode_boc, sha256, BocOptions, CellArena, CellBuilder, CellError, CellId,
    CellKind, CellSlice, LevelMask,
};
pub use consensus::{
    check_block_signatures, compute_mc_validator_subset, node_id_short, validators_list_hash,
    BlockSignature, ConsensusError, ValidatorSetPrng,
};
pub use dict::{AugDict, Dict, DictError, DictKey, DictValue, Lookup, RefValue};
pub use schema::{check_block_proof, Block, SchemaError, ShardStateUnsplit, ValidatorSet};
pub use types::{Address, BlockId, BlockIdShort, MASTERCHAIN, MASTERCHAIN_SHARD};

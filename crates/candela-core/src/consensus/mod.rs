//! Validator-set reconstruction and block-signature checking.
//!
//! The provider hands us a signature set it claims belongs to a block; this
//! module recomputes which validators were supposed to sign (from the key
//! block's config and the catchain session) and verifies the claim without
//! trusting anything but the chain of proofs.

pub mod prng;
pub mod signatures;

use thiserror::Error;

pub use prng::ValidatorSetPrng;
pub use signatures::{
    block_sign_payload, check_block_signatures, compute_mc_validator_subset, node_id_short,
    validators_list_hash, BlockSignature,
};

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("validator set hash mismatch: header declares {expected:#010x}, computed {computed:#010x}")]
    ValidatorSetMismatch { expected: u32, computed: u32 },

    #[error("signed weight {signed} of {total} does not exceed two thirds")]
    InsufficientSignatureWeight { signed: u64, total: u64 },

    #[error("signature from unknown node {}", hex::encode(node_id))]
    UnknownSigner { node_id: [u8; 32] },

    #[error("duplicate signature from node {}", hex::encode(node_id))]
    DuplicateSignature { node_id: [u8; 32] },

    #[error("invalid ed25519 signature from node {}", hex::encode(node_id))]
    InvalidSignature { node_id: [u8; 32] },
}

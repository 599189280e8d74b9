//! The transport boundary.
//!
//! A [`BlockProvider`] is any source of raw chain data: a lite server, an
//! HTTP gateway, a test fixture. Providers perform NO validation — every
//! byte they return is untrusted until the engine has proved it against the
//! trust chain. Keep implementations dumb; keep verification in the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use candela_core::types::{hex32, Address, BlockId, BlockIdShort};

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connection refused, timeout, 5xx...).
    /// Retried by the engine.
    #[error("transport failure: {0}")]
    Transport(#[from] anyhow::Error),

    /// The provider answered but had nothing for the query. Retried by the
    /// engine, then surfaced as an empty answer.
    #[error("provider returned an empty answer")]
    EmptyAnswer,
}

/// Masterchain tip as reported by a provider.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MasterchainInfo {
    pub last: BlockId,
    /// Generation time of the tip, for the sync-drift bound.
    pub last_utime: u32,
}

/// A block id paired with the header proof that should justify it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockHeaderRaw {
    pub id: BlockId,
    /// Bag of cells holding a Merkle proof over the block header.
    pub header_proof: Vec<u8>,
}

/// One signature over the destination block of a forward link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureRaw {
    #[serde(with = "hex32")]
    pub node_id_short: [u8; 32],
    pub signature: Vec<u8>,
}

/// Signature set attached to a forward link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkSignatures {
    pub validator_set_hash: u32,
    pub catchain_seqno: u32,
    pub signatures: Vec<SignatureRaw>,
}

/// One step of a partial proof chain, exactly as the provider frames it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum ProofLinkRaw {
    /// Destination seqno below the source: proved through the source's
    /// state and its previous-blocks dictionary.
    Backward {
        from: BlockId,
        to: BlockId,
        to_key_block: bool,
        proof: Vec<u8>,
        dest_proof: Vec<u8>,
        state_proof: Vec<u8>,
    },
    /// Destination seqno above the source: proved by validator signatures
    /// under the source key block's config.
    Forward {
        from: BlockId,
        to: BlockId,
        to_key_block: bool,
        config_proof: Vec<u8>,
        dest_proof: Vec<u8>,
        signatures: LinkSignatures,
    },
}

impl ProofLinkRaw {
    pub fn from_id(&self) -> &BlockId {
        match self {
            Self::Backward { from, .. } | Self::Forward { from, .. } => from,
        }
    }

    pub fn to_id(&self) -> &BlockId {
        match self {
            Self::Backward { to, .. } | Self::Forward { to, .. } => to,
        }
    }

    pub fn to_key_block(&self) -> bool {
        match self {
            Self::Backward { to_key_block, .. } | Self::Forward { to_key_block, .. } => {
                *to_key_block
            }
        }
    }
}

/// A partial chain of proof links from `from` towards a target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProofRaw {
    pub from: BlockId,
    pub to: BlockId,
    pub steps: Vec<ProofLinkRaw>,
}

/// Proof-carrying answer for state-derived queries (shards, accounts,
/// config): a bag of cells with two roots, the block proof and the state
/// proof it commits to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateProofRaw {
    pub id: BlockId,
    pub proof: Vec<u8>,
}

/// Raw transaction chain, concatenated as a multi-root bag of cells,
/// newest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionsRaw {
    pub boc: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SendStatus {
    pub status: i32,
}

/// Capability a transport must offer. Every method returns raw, unverified
/// data; the engine owns all checking.
pub trait BlockProvider {
    fn latest_block(&self) -> Result<MasterchainInfo, ProviderError>;

    fn lookup_block(
        &self,
        id: BlockIdShort,
        lt: Option<u64>,
        utime: Option<u32>,
    ) -> Result<BlockHeaderRaw, ProviderError>;

    fn block_header(&self, id: &BlockId) -> Result<BlockHeaderRaw, ProviderError>;

    fn block_data(&self, id: &BlockId) -> Result<Vec<u8>, ProviderError>;

    fn block_proof(
        &self,
        known: &BlockId,
        target: &BlockId,
    ) -> Result<BlockProofRaw, ProviderError>;

    fn shards_info(&self, id: &BlockId) -> Result<StateProofRaw, ProviderError>;

    fn account_state(
        &self,
        id: &BlockId,
        address: &Address,
    ) -> Result<StateProofRaw, ProviderError>;

    fn config(&self, id: &BlockId) -> Result<StateProofRaw, ProviderError>;

    fn transactions(
        &self,
        address: &Address,
        lt: u64,
        hash: [u8; 32],
        count: u32,
    ) -> Result<TransactionsRaw, ProviderError>;

    fn send_message(&self, body: &[u8]) -> Result<SendStatus, ProviderError>;
}

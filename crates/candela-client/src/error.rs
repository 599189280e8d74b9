use thiserror::Error;

use candela_core::cell::CellError;
use candela_core::consensus::ConsensusError;
use candela_core::dict::DictError;
use candela_core::schema::SchemaError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid proof link: {reason}")]
    InvalidLinkType { reason: String },

    #[error("proof chain exceeded {limit} links without reaching the target")]
    ChainTooLong { limit: usize },

    #[error("verification deadline exceeded")]
    Timeout,

    #[error("provider is {drift_secs}s behind the local clock (allowed {max_secs}s)")]
    SyncDrift { drift_secs: u64, max_secs: u64 },

    #[error("provider unavailable after {attempts} attempts: {last}")]
    ProviderUnavailable { attempts: u32, last: String },

    #[error("provider had no answer for {what}")]
    EmptyAnswer { what: &'static str },

    /// The provider's data is well-formed but does not prove what it claims.
    #[error("proof mismatch: {reason}")]
    ProofMismatch { reason: String },

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error(transparent)]
    Dict(#[from] DictError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

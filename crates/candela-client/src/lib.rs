//! # Candela Client
//!
//! The provider-facing half of the Candela TON light client. It pairs any
//! [`BlockProvider`] transport with the pure verification logic from
//! `candela-core` and exposes a read surface that only ever returns data it
//! has proved.
//!
//! ## Trust model
//!
//! - The only unconditional trust is the configured zero-state id
//! - Every other block id is proved by walking provider proof chains:
//!   forward links by validator signatures under the previous key block's
//!   config, backward links through a state's previous-blocks dictionary
//! - Key blocks proven along the way become trust anchors, so later walks
//!   start close to their target
//! - Providers are assumed hostile; a malformed or mismatched answer is an
//!   error, never a fallback
//!
//! ## Usage
//!
//! ```ignore
//! use candela_client::{Client, ClientConfig};
//!
//! let config = ClientConfig::new(zero_state_id);
//! let client = Client::new(my_provider, config);
//!
//! let info = client.latest_block()?;
//! let report = client.validate_block(&info.last);
//! assert!(report.valid);
//!
//! let account = client.account_state(&info.last, &address)?;
//! ```

mod anchors;
mod config;
mod engine;
mod error;
mod provider;

pub use anchors::AnchorStore;
pub use config::{ClientConfig, MAX_CHAIN_LINKS};
pub use engine::{
    AccountSnapshot, Client, ConfigSnapshot, ShardEntry, TransactionRecord, ValidationReport,
    VerifiedBlock,
};
pub use error::ClientError;
pub use provider::{
    BlockHeaderRaw, BlockProofRaw, BlockProvider, LinkSignatures, MasterchainInfo, ProofLinkRaw,
    ProviderError, SendStatus, SignatureRaw, StateProofRaw, TransactionsRaw,
};

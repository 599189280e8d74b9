use std::time::Duration;

use serde::{Deserialize, Serialize};

use candela_core::types::BlockId;

/// Longest proof chain the engine will follow before giving up.
pub const MAX_CHAIN_LINKS: usize = 10_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The one id trusted unconditionally; everything else is proved from
    /// here. Normally the network's zero state.
    pub zero_state: BlockId,

    /// How far the provider's tip may lag the local clock before
    /// `latest_block` refuses to answer.
    pub max_sync_drift: Duration,

    /// Retries for transport failures and empty answers.
    pub retries: u32,

    /// Optional wall-clock budget for one `validate_block` call.
    pub deadline: Option<Duration>,
}

impl ClientConfig {
    pub fn new(zero_state: BlockId) -> Self {
        Self {
            zero_state,
            max_sync_drift: Duration::from_secs(60),
            retries: 3,
            deadline: None,
        }
    }
}

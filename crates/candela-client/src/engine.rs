//! The verification engine.
//!
//! For each operation the flow is:
//! 1. Fetch raw data from the provider
//! 2. Verify it cryptographically against the trust-anchor cache
//! 3. Return the verified result
//!
//! NEVER return unverified data. If verification fails, return an error.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use candela_core::cell::{decode_boc, encode_boc, sha256, BocOptions, CellArena, CellId, CellKind};
use candela_core::consensus::{
    check_block_signatures, compute_mc_validator_subset, validators_list_hash, BlockSignature,
    ConsensusError,
};
use candela_core::dict::{DictKey, Lookup};
use candela_core::schema::{
    check_block_proof, list_shards, Account, AccountState, Block, BlockInfo, ConfigParams,
    ShardDescr, ShardStateUnsplit, Transaction,
};
use candela_core::types::{Address, BlockId, BlockIdShort, MASTERCHAIN};

use crate::anchors::AnchorStore;
use crate::config::{ClientConfig, MAX_CHAIN_LINKS};
use crate::error::ClientError;
use crate::provider::{
    BlockProvider, LinkSignatures, MasterchainInfo, ProofLinkRaw, ProviderError, StateProofRaw,
};

/// Outcome of `validate_block`: a result object rather than an error, so
/// callers can log the reason without unwinding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: Option<String>,
    /// Proof links verified along the way (0 when already trusted).
    pub links: usize,
}

/// Verified block bytes plus the parsed header.
#[derive(Debug)]
pub struct VerifiedBlock {
    pub id: BlockId,
    pub info: BlockInfo,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardEntry {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
    #[serde(with = "candela_core::types::hex32")]
    pub root_hash: [u8; 32],
    #[serde(with = "candela_core::types::hex32")]
    pub file_hash: [u8; 32],
}

/// Account state at a proven block; `exists == false` is itself a proven
/// fact (verified absence).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub address: Address,
    pub exists: bool,
    pub status: String,
    pub balance: u128,
    pub last_trans_lt: Option<u64>,
    pub last_trans_hash: Option<[u8; 32]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(with = "candela_core::types::hex32")]
    pub config_addr: [u8; 32],
    /// Parameter index paired with the parameter cell re-encoded as a bag
    /// of cells.
    pub params: Vec<(u32, Vec<u8>)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(with = "candela_core::types::hex32")]
    pub hash: [u8; 32],
    pub lt: u64,
    pub now: u32,
    pub prev_trans_lt: u64,
    #[serde(with = "candela_core::types::hex32")]
    pub prev_trans_hash: [u8; 32],
    pub outmsg_cnt: u16,
    pub total_fees: u128,
}

pub struct Client<P> {
    provider: P,
    config: ClientConfig,
    anchors: AnchorStore,
}

impl<P: BlockProvider> Client<P> {
    pub fn new(provider: P, config: ClientConfig) -> Self {
        let anchors = AnchorStore::new(config.zero_state);
        Self {
            provider,
            config,
            anchors,
        }
    }

    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn retry<T>(
        &self,
        what: &'static str,
        f: impl Fn() -> Result<T, ProviderError>,
    ) -> Result<T, ClientError> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(match err {
                            ProviderError::EmptyAnswer => ClientError::EmptyAnswer { what },
                            other => ClientError::ProviderUnavailable {
                                attempts,
                                last: other.to_string(),
                            },
                        });
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Chain of trust
    // ------------------------------------------------------------------

    /// Verifies that `id` descends from a trust anchor, walking provider
    /// proof chains in both directions as needed.
    pub fn validate_block(&self, id: &BlockId) -> ValidationReport {
        match self.ensure_trusted(id) {
            Ok(links) => ValidationReport {
                valid: true,
                reason: None,
                links,
            },
            Err(err) => ValidationReport {
                valid: false,
                reason: Some(err.to_string()),
                links: 0,
            },
        }
    }

    /// Like `validate_block` but propagates the failure. Newly proven key
    /// blocks become anchors only after the whole chain verifies; a failure
    /// anywhere discards them all.
    pub fn ensure_trusted(&self, id: &BlockId) -> Result<usize, ClientError> {
        if !id.is_masterchain() {
            return Err(ClientError::InvalidLinkType {
                reason: "target is not a masterchain block".into(),
            });
        }
        if self.anchors.contains(id) {
            return Ok(0);
        }
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let mut from = self
            .anchors
            .nearest(id.seqno)
            .ok_or_else(|| ClientError::ProofMismatch {
                reason: "no trust anchors configured".into(),
            })?;

        let mut pending: Vec<BlockId> = Vec::new();
        let mut links = 0usize;
        loop {
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(ClientError::Timeout);
                }
            }
            let proof = self.retry("block proof", || self.provider.block_proof(&from, id))?;
            if proof.from != from {
                return Err(ClientError::ProofMismatch {
                    reason: "proof chain starts at an unexpected block".into(),
                });
            }
            if !proof.from.is_masterchain() || !proof.to.is_masterchain() {
                return Err(ClientError::InvalidLinkType {
                    reason: "proof chain endpoints must be masterchain blocks".into(),
                });
            }
            if proof.steps.is_empty() {
                return Err(ClientError::EmptyAnswer {
                    what: "proof chain steps",
                });
            }

            let mut curr = proof.from;
            for link in &proof.steps {
                links += 1;
                if links > MAX_CHAIN_LINKS {
                    return Err(ClientError::ChainTooLong {
                        limit: MAX_CHAIN_LINKS,
                    });
                }
                self.verify_link(&curr, link)?;
                if link.to_key_block() {
                    pending.push(*link.to_id());
                }
                curr = *link.to_id();
            }
            if curr != proof.to {
                return Err(ClientError::ProofMismatch {
                    reason: "proof chain does not end at its declared block".into(),
                });
            }
            from = proof.to;
            if from == *id {
                pending.push(*id);
                self.anchors.add_all(pending);
                return Ok(links);
            }
        }
    }

    fn verify_link(&self, curr: &BlockId, link: &ProofLinkRaw) -> Result<(), ClientError> {
        let from = link.from_id();
        let to = link.to_id();
        if from != curr {
            return Err(ClientError::ProofMismatch {
                reason: "proof link does not continue the chain".into(),
            });
        }
        if !from.is_masterchain() || !to.is_masterchain() {
            return Err(ClientError::InvalidLinkType {
                reason: "proof link endpoints must be masterchain blocks".into(),
            });
        }
        if from.seqno == to.seqno {
            return Err(ClientError::InvalidLinkType {
                reason: "proof link endpoints share a seqno".into(),
            });
        }
        match link {
            ProofLinkRaw::Backward {
                from,
                to,
                to_key_block,
                proof,
                dest_proof,
                state_proof,
            } => {
                if to.seqno > from.seqno {
                    return Err(ClientError::InvalidLinkType {
                        reason: "backward link moves forward".into(),
                    });
                }
                self.verify_backward_link(from, to, *to_key_block, proof, dest_proof, state_proof)
            }
            ProofLinkRaw::Forward {
                from,
                to,
                to_key_block,
                config_proof,
                dest_proof,
                signatures,
            } => {
                if to.seqno < from.seqno {
                    return Err(ClientError::InvalidLinkType {
                        reason: "forward link moves backward".into(),
                    });
                }
                self.verify_forward_link(
                    from,
                    to,
                    *to_key_block,
                    config_proof,
                    dest_proof,
                    signatures,
                )
            }
        }
    }

    fn verify_backward_link(
        &self,
        from: &BlockId,
        to: &BlockId,
        to_key_block: bool,
        proof: &[u8],
        dest_proof: &[u8],
        state_proof: &[u8],
    ) -> Result<(), ClientError> {
        if proof.is_empty() {
            return Err(ClientError::ProofMismatch {
                reason: "backward link lacks a source proof".into(),
            });
        }
        if state_proof.is_empty() {
            return Err(ClientError::ProofMismatch {
                reason: "backward link lacks a state proof".into(),
            });
        }
        if dest_proof.is_empty() && to.seqno > 0 {
            return Err(ClientError::ProofMismatch {
                reason: "backward link lacks a destination proof".into(),
            });
        }

        let mut arena = CellArena::new();
        let proof_root = decode_single_root(&mut arena, proof)?;
        let expected_state_hash = if from.seqno > 0 {
            let block = check_block_proof(&arena, proof_root, from)?;
            let update = block.state_update.ok_or_else(|| ClientError::ProofMismatch {
                reason: "source header carries no state update".into(),
            })?;
            update.new_hash
        } else {
            check_state_proof_shape(&arena, proof_root, &from.root_hash)?;
            from.root_hash
        };

        let mut state_arena = CellArena::new();
        let state_root = decode_single_root(&mut state_arena, state_proof)?;
        let state_cell = check_state_proof_shape(&state_arena, state_root, &expected_state_hash)?;
        let state = ShardStateUnsplit::load(&state_arena, state_cell)?;
        let info = state
            .custom
            .and_then(|c| c.info)
            .ok_or_else(|| ClientError::ProofMismatch {
                reason: "masterchain state extras pruned out of the proof".into(),
            })?;

        let key = DictKey::from_uint(to.seqno as u64, 32);
        match info.prev_blocks.lookup(&key) {
            Lookup::Found((_, entry)) => {
                if entry.blk_ref.seq_no != to.seqno
                    || entry.blk_ref.root_hash != to.root_hash
                    || entry.blk_ref.file_hash != to.file_hash
                {
                    return Err(ClientError::ProofMismatch {
                        reason: format!(
                            "previous-blocks entry for seqno {} does not match the destination",
                            to.seqno
                        ),
                    });
                }
            }
            _ => {
                return Err(ClientError::ProofMismatch {
                    reason: format!("seqno {} is not proven by the source state", to.seqno),
                });
            }
        }

        if to.seqno > 0 {
            let mut dest_arena = CellArena::new();
            let dest_root = decode_single_root(&mut dest_arena, dest_proof)?;
            let block_to = check_block_proof(&dest_arena, dest_root, to)?;
            if block_to.info.key_block != to_key_block {
                return Err(ClientError::ProofMismatch {
                    reason: "destination key-block flag does not match the link".into(),
                });
            }
        }
        Ok(())
    }

    fn verify_forward_link(
        &self,
        from: &BlockId,
        to: &BlockId,
        to_key_block: bool,
        config_proof: &[u8],
        dest_proof: &[u8],
        signatures: &LinkSignatures,
    ) -> Result<(), ClientError> {
        if config_proof.is_empty() {
            return Err(ClientError::ProofMismatch {
                reason: "forward link lacks a config proof".into(),
            });
        }
        if dest_proof.is_empty() && to.seqno > 0 {
            return Err(ClientError::ProofMismatch {
                reason: "forward link lacks a destination proof".into(),
            });
        }
        if signatures.signatures.is_empty() {
            return Err(ClientError::ProofMismatch {
                reason: "forward link carries no signatures".into(),
            });
        }

        let mut arena = CellArena::new();
        let root = decode_single_root(&mut arena, config_proof)?;
        let config: ConfigParams = if from.seqno == 0 {
            // the chain bootstraps from the zero state's embedded config
            let state_cell = check_state_proof_shape(&arena, root, &from.root_hash)?;
            let state = ShardStateUnsplit::load(&arena, state_cell)?;
            state
                .custom
                .map(|c| c.config)
                .ok_or_else(|| ClientError::ProofMismatch {
                    reason: "zero state carries no config".into(),
                })?
        } else {
            let block = check_block_proof(&arena, root, from)?;
            block
                .extra
                .and_then(|e| e.custom)
                .and_then(|mc| mc.config)
                .ok_or_else(|| ClientError::ProofMismatch {
                    reason: "forward link source is not a key block with a config".into(),
                })?
        };

        let catchain = config.catchain(&arena)?;
        let vset = config.current_validators(&arena)?;
        let subset = compute_mc_validator_subset(&vset, &catchain, signatures.catchain_seqno);
        let computed = validators_list_hash(&subset, signatures.catchain_seqno);

        let mut dest_arena = CellArena::new();
        let dest_root = decode_single_root(&mut dest_arena, dest_proof)?;
        let block_to = check_block_proof(&dest_arena, dest_root, to)?;
        if block_to.info.key_block != to_key_block {
            return Err(ClientError::ProofMismatch {
                reason: "destination key-block flag does not match the link".into(),
            });
        }
        if computed != block_to.info.gen_validator_list_hash_short {
            return Err(ConsensusError::ValidatorSetMismatch {
                expected: block_to.info.gen_validator_list_hash_short,
                computed,
            }
            .into());
        }
        if computed != signatures.validator_set_hash {
            return Err(ConsensusError::ValidatorSetMismatch {
                expected: signatures.validator_set_hash,
                computed,
            }
            .into());
        }

        let mut sigs = Vec::with_capacity(signatures.signatures.len());
        for raw in &signatures.signatures {
            let signature: [u8; 64] =
                raw.signature
                    .as_slice()
                    .try_into()
                    .map_err(|_| ClientError::ProofMismatch {
                        reason: "signature must be exactly 64 bytes".into(),
                    })?;
            sigs.push(BlockSignature {
                node_id_short: raw.node_id_short,
                signature,
            });
        }
        check_block_signatures(&subset, &sigs, &to.root_hash, &to.file_hash)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    /// Provider tip, gated by the sync-drift bound against the local clock.
    pub fn latest_block(&self) -> Result<MasterchainInfo, ClientError> {
        let info = self.retry("masterchain info", || self.provider.latest_block())?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let drift = now.saturating_sub(info.last_utime as u64);
        let max = self.config.max_sync_drift.as_secs();
        if drift > max {
            return Err(ClientError::SyncDrift {
                drift_secs: drift,
                max_secs: max,
            });
        }
        Ok(info)
    }

    /// Resolves a block by position, logical time or generation time; the
    /// returned id is proven by its own header proof.
    pub fn lookup_block(
        &self,
        short: BlockIdShort,
        lt: Option<u64>,
        utime: Option<u32>,
    ) -> Result<BlockId, ClientError> {
        let res = self.retry("block lookup", || {
            self.provider.lookup_block(short, lt, utime)
        })?;
        let mut arena = CellArena::new();
        let root = decode_single_root(&mut arena, &res.header_proof)?;
        let block = check_block_proof(&arena, root, &res.id)?;

        if res.id.workchain != short.workchain || res.id.shard != short.shard {
            return Err(ClientError::ProofMismatch {
                reason: "lookup answered for a different shard".into(),
            });
        }
        if lt.is_none() && utime.is_none() && res.id.seqno != short.seqno {
            return Err(ClientError::ProofMismatch {
                reason: "lookup answered for a different seqno".into(),
            });
        }
        if block.info.not_master != (short.workchain != MASTERCHAIN) {
            return Err(ClientError::ProofMismatch {
                reason: "masterchain flag contradicts the requested workchain".into(),
            });
        }
        if let Some(lt) = lt {
            if lt < block.info.start_lt || lt > block.info.end_lt {
                return Err(ClientError::ProofMismatch {
                    reason: "requested logical time is outside the block".into(),
                });
            }
        }
        if let Some(utime) = utime {
            if block.info.gen_utime > utime {
                return Err(ClientError::ProofMismatch {
                    reason: "block was generated after the requested time".into(),
                });
            }
        }
        Ok(res.id)
    }

    /// Verified block header.
    pub fn block_header(&self, id: &BlockId) -> Result<BlockInfo, ClientError> {
        self.ensure_trusted(id)?;
        let res = self.retry("block header", || self.provider.block_header(id))?;
        if res.id != *id {
            return Err(ClientError::ProofMismatch {
                reason: "provider answered for a different block".into(),
            });
        }
        let mut arena = CellArena::new();
        let root = decode_single_root(&mut arena, &res.header_proof)?;
        let block = check_block_proof(&arena, root, id)?;
        Ok(block.info)
    }

    /// Full block bytes, pinned by both hashes of the id.
    pub fn block_data(&self, id: &BlockId) -> Result<VerifiedBlock, ClientError> {
        self.ensure_trusted(id)?;
        let bytes = self.retry("block data", || self.provider.block_data(id))?;
        if sha256(&bytes) != id.file_hash {
            return Err(ClientError::ProofMismatch {
                reason: "block bytes do not hash to the declared file hash".into(),
            });
        }
        let mut arena = CellArena::new();
        let root = decode_single_root(&mut arena, &bytes)?;
        if arena.cell(root).repr_hash() != id.root_hash {
            return Err(ClientError::ProofMismatch {
                reason: "decoded block root does not match the declared root hash".into(),
            });
        }
        let block = Block::load(&arena, root)?;
        Ok(VerifiedBlock {
            id: *id,
            info: block.info,
            bytes,
        })
    }

    /// Shard registry out of the masterchain state at `id`.
    pub fn shards_info(&self, id: &BlockId) -> Result<Vec<ShardEntry>, ClientError> {
        self.ensure_trusted(id)?;
        let raw = self.retry("shards info", || self.provider.shards_info(id))?;
        let (arena, state) = self.open_state_proof(id, &raw)?;
        let extra = state.custom.ok_or_else(|| ClientError::ProofMismatch {
            reason: "masterchain state extras pruned out of the proof".into(),
        })?;
        let shards = list_shards(&arena, &extra.shard_hashes)?;
        Ok(shards
            .into_iter()
            .map(|(workchain, shard, descr): (i32, u64, ShardDescr)| ShardEntry {
                workchain,
                shard,
                seqno: descr.seq_no,
                root_hash: descr.root_hash,
                file_hash: descr.file_hash,
            })
            .collect())
    }

    /// Account state proven against the shard state at `id`. Absence is a
    /// verified answer; a pruned path is an error.
    pub fn account_state(
        &self,
        id: &BlockId,
        address: &Address,
    ) -> Result<AccountSnapshot, ClientError> {
        self.ensure_trusted(id)?;
        let raw = self.retry("account state", || {
            self.provider.account_state(id, address)
        })?;
        let (arena, state) = self.open_state_proof(id, &raw)?;
        if state.shard.workchain != address.workchain as i32 {
            return Err(ClientError::ProofMismatch {
                reason: "state proof is for a different workchain".into(),
            });
        }
        let accounts = state.accounts(&arena)?;
        let key = DictKey::from_raw(address.account, 256);
        match accounts.lookup(&key) {
            Lookup::Found((_, shard_account)) => {
                if arena.cell(shard_account.account).kind() == CellKind::PrunedBranch {
                    return Err(ClientError::ProofMismatch {
                        reason: "account cell pruned out of the proof".into(),
                    });
                }
                let account = Account::load(&arena, shard_account.account)?;
                let (exists, status, balance) = match &account {
                    None => (false, "nonexist", 0),
                    Some(acc) => {
                        let status = match acc.state {
                            AccountState::Uninit => "uninit",
                            AccountState::Active { .. } => "active",
                            AccountState::Frozen { .. } => "frozen",
                        };
                        (true, status, acc.balance.grams)
                    }
                };
                Ok(AccountSnapshot {
                    address: *address,
                    exists,
                    status: status.into(),
                    balance,
                    last_trans_lt: Some(shard_account.last_trans_lt),
                    last_trans_hash: Some(shard_account.last_trans_hash),
                })
            }
            Lookup::Absent => Ok(AccountSnapshot {
                address: *address,
                exists: false,
                status: "nonexist".into(),
                balance: 0,
                last_trans_lt: None,
                last_trans_hash: None,
            }),
            Lookup::Pruned => Err(ClientError::ProofMismatch {
                reason: "account path pruned; absence is not proven".into(),
            }),
        }
    }

    /// Config parameters out of the masterchain state at `id`, optionally
    /// filtered to one parameter. A parameter proven absent yields an empty
    /// list; a pruned path is an error.
    pub fn config(
        &self,
        id: &BlockId,
        param: Option<u32>,
    ) -> Result<ConfigSnapshot, ClientError> {
        self.ensure_trusted(id)?;
        let raw = self.retry("config", || self.provider.config(id))?;
        let (arena, state) = self.open_state_proof(id, &raw)?;
        let config = state
            .custom
            .map(|c| c.config)
            .ok_or_else(|| ClientError::ProofMismatch {
                reason: "masterchain state extras pruned out of the proof".into(),
            })?;

        let mut params = Vec::new();
        for (key, value) in config.params.iter() {
            let index = key.to_uint() as u32;
            if param.is_some_and(|p| p != index) {
                continue;
            }
            let boc = encode_boc(&arena, &[value.0], &BocOptions::default())?;
            params.push((index, boc));
        }
        if let Some(p) = param {
            if params.is_empty() && !config.params.proves_absent(&DictKey::from_uint(p as u64, 32))
            {
                return Err(ClientError::ProofMismatch {
                    reason: format!("config parameter {p} pruned; absence is not proven"),
                });
            }
        }
        Ok(ConfigSnapshot {
            config_addr: config.config_addr,
            params,
        })
    }

    /// Transaction history walk. Each record must hash to what its
    /// successor declared, so the provider cannot splice the chain.
    pub fn transactions(
        &self,
        address: &Address,
        lt: u64,
        hash: [u8; 32],
        count: u32,
    ) -> Result<Vec<TransactionRecord>, ClientError> {
        let raw = self.retry("transactions", || {
            self.provider.transactions(address, lt, hash, count)
        })?;
        let mut arena = CellArena::new();
        let roots = decode_boc(&mut arena, &raw.boc)?;

        let mut expect_lt = lt;
        let mut expect_hash = hash;
        let mut out = Vec::new();
        for root in roots.into_iter().take(count as usize) {
            if expect_lt == 0 {
                break;
            }
            let tx = Transaction::load(&arena, root)?;
            if tx.hash != expect_hash || tx.lt != expect_lt {
                return Err(ClientError::ProofMismatch {
                    reason: format!("transaction chain broken at lt {expect_lt}"),
                });
            }
            if tx.account_addr != address.account {
                return Err(ClientError::ProofMismatch {
                    reason: "transaction belongs to a different account".into(),
                });
            }
            expect_lt = tx.prev_trans_lt;
            expect_hash = tx.prev_trans_hash;
            out.push(TransactionRecord {
                hash: tx.hash,
                lt: tx.lt,
                now: tx.now,
                prev_trans_lt: tx.prev_trans_lt,
                prev_trans_hash: tx.prev_trans_hash,
                outmsg_cnt: tx.outmsg_cnt,
                total_fees: tx.total_fees.grams,
            });
        }
        Ok(out)
    }

    /// Opaque pass-through; there is nothing to verify about an outbound
    /// message.
    pub fn send_message(&self, body: &[u8]) -> Result<i32, ClientError> {
        let status = self.retry("send message", || self.provider.send_message(body))?;
        Ok(status.status)
    }

    /// Decodes a two-root state proof (block proof + state proof) and
    /// verifies the block → state hash link.
    fn open_state_proof(
        &self,
        id: &BlockId,
        raw: &StateProofRaw,
    ) -> Result<(CellArena, ShardStateUnsplit), ClientError> {
        if raw.id != *id {
            return Err(ClientError::ProofMismatch {
                reason: "provider answered for a different block".into(),
            });
        }
        let mut arena = CellArena::new();
        let roots = decode_boc(&mut arena, &raw.proof)?;
        if roots.len() != 2 {
            return Err(ClientError::ProofMismatch {
                reason: format!("state proof must carry 2 roots, found {}", roots.len()),
            });
        }
        let block = check_block_proof(&arena, roots[0], id)?;
        let update = block.state_update.ok_or_else(|| ClientError::ProofMismatch {
            reason: "block header carries no state update".into(),
        })?;
        let state_cell = check_state_proof_shape(&arena, roots[1], &update.new_hash)?;
        let state = ShardStateUnsplit::load(&arena, state_cell)?;
        Ok((arena, state))
    }
}

/// Decodes a bag of cells that must hold exactly one root.
fn decode_single_root(arena: &mut CellArena, bytes: &[u8]) -> Result<CellId, ClientError> {
    let roots = decode_boc(arena, bytes)?;
    if roots.len() != 1 {
        return Err(ClientError::ProofMismatch {
            reason: format!("expected a single root cell, found {}", roots.len()),
        });
    }
    Ok(roots[0])
}

/// A state proof is a Merkle proof whose body hashes to `expected`.
/// Returns the body cell.
fn check_state_proof_shape(
    arena: &CellArena,
    root: CellId,
    expected: &[u8; 32],
) -> Result<CellId, ClientError> {
    let cell = arena.cell(root);
    if cell.kind() != CellKind::MerkleProof {
        return Err(ClientError::ProofMismatch {
            reason: "state proof is not a merkle proof".into(),
        });
    }
    let body = cell.refs()[0];
    if arena.cell(body).hash(0) != *expected {
        return Err(ClientError::ProofMismatch {
            reason: "state proof does not cover the expected state hash".into(),
        });
    }
    Ok(body)
}

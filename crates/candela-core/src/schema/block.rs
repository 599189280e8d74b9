//! Block layout: header, state-update hashes, masterchain extras, and the
//! Merkle-proof header check every client operation goes through.

use crate::cell::{CellArena, CellBuilder, CellId, CellKind, CellSlice};
use crate::dict::{AugDict, AugValue, Dict, DictError, DictValue, RefValue};
use crate::types::BlockId;

use super::{
    expect_tag, config::ConfigParams, CryptoSignaturePair, CurrencyCollection, ExtBlkRef,
    GlobalVersion, SchemaError, ShardIdent,
};

pub const BLOCK_TAG: u64 = 0x11ef55aa;
pub const BLOCK_INFO_TAG: u64 = 0x9bc7a987;
pub const BLOCK_EXTRA_TAG: u64 = 0x4a33f6fd;
pub const MC_BLOCK_EXTRA_TAG: u64 = 0xcca5;

fn load_ref_checked<'a>(
    slice: &mut CellSlice<'a>,
    what: &'static str,
) -> Result<CellSlice<'a>, SchemaError> {
    let id = slice.load_ref()?;
    if slice.arena().cell(id).kind() == CellKind::PrunedBranch {
        return Err(SchemaError::PrunedOut { what });
    }
    Ok(CellSlice::new(slice.arena(), id))
}

fn load_ref_if_present<'a>(slice: &mut CellSlice<'a>) -> Result<Option<CellSlice<'a>>, SchemaError> {
    let id = slice.load_ref()?;
    if slice.arena().cell(id).kind() == CellKind::PrunedBranch {
        return Ok(None);
    }
    Ok(Some(CellSlice::new(slice.arena(), id)))
}

/// `block#11ef55aa` — the parts a verifier needs. Subtrees a proof pruned
/// away load as `None` and only fail when something actually reads them.
#[derive(Debug)]
pub struct Block {
    pub global_id: i32,
    pub info: BlockInfo,
    pub value_flow: CellId,
    pub state_update: Option<StateUpdate>,
    pub extra: Option<BlockExtra>,
}

impl Block {
    pub fn load(arena: &CellArena, root: CellId) -> Result<Self, SchemaError> {
        let mut slice = CellSlice::new(arena, root);
        expect_tag(&mut slice, 32, BLOCK_TAG, "Block")?;
        let global_id = slice.load_i32()?;

        let mut info_slice = load_ref_checked(&mut slice, "block info")?;
        let info = BlockInfo::load(&mut info_slice)?;

        let value_flow = slice.load_ref()?;

        let update_cell = slice.load_ref()?;
        let state_update = if arena.cell(update_cell).kind() == CellKind::MerkleUpdate {
            Some(StateUpdate::load(arena, update_cell)?)
        } else {
            None
        };

        let extra = match load_ref_if_present(&mut slice)? {
            Some(mut extra_slice) => Some(BlockExtra::load(&mut extra_slice)?),
            None => None,
        };

        Ok(Self {
            global_id,
            info,
            value_flow,
            state_update,
            extra,
        })
    }

    /// The embedded config of a key block, if the proof carried it.
    pub fn config(&self) -> Option<&ConfigParams> {
        self.extra
            .as_ref()
            .and_then(|e| e.custom.as_ref())
            .and_then(|mc| mc.config.as_ref())
    }
}

/// The two state hashes out of the block's Merkle update.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateUpdate {
    pub old_hash: [u8; 32],
    pub new_hash: [u8; 32],
}

impl StateUpdate {
    fn load(arena: &CellArena, cell: CellId) -> Result<Self, SchemaError> {
        let mut slice = CellSlice::new(arena, cell);
        expect_tag(&mut slice, 8, CellKind::TYPE_MERKLE_UPDATE as u64, "MerkleUpdate")?;
        Ok(Self {
            old_hash: slice.load_hash()?,
            new_hash: slice.load_hash()?,
        })
    }
}

/// `block_info#9bc7a987`
#[derive(Debug)]
pub struct BlockInfo {
    pub version: u32,
    pub not_master: bool,
    pub after_merge: bool,
    pub before_split: bool,
    pub after_split: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub key_block: bool,
    pub vert_seqno_incr: bool,
    pub flags: u8,
    pub seq_no: u32,
    pub vert_seq_no: u32,
    pub shard: ShardIdent,
    pub gen_utime: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub gen_validator_list_hash_short: u32,
    pub gen_catchain_seqno: u32,
    pub min_ref_mc_seqno: u32,
    pub prev_key_block_seqno: u32,
    pub gen_software: Option<GlobalVersion>,
    pub master_ref: Option<ExtBlkRef>,
    pub prev_ref: Option<BlkPrevInfo>,
}

impl BlockInfo {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 32, BLOCK_INFO_TAG, "BlockInfo")?;
        let version = slice.load_u32()?;
        let not_master = slice.load_bit()?;
        let after_merge = slice.load_bit()?;
        let before_split = slice.load_bit()?;
        let after_split = slice.load_bit()?;
        let want_split = slice.load_bit()?;
        let want_merge = slice.load_bit()?;
        let key_block = slice.load_bit()?;
        let vert_seqno_incr = slice.load_bit()?;
        let flags = slice.load_u8()?;
        if flags > 1 {
            return Err(SchemaError::Invalid {
                what: "BlockInfo",
                reason: format!("reserved flags {flags:#x} set"),
            });
        }
        let seq_no = slice.load_u32()?;
        let vert_seq_no = slice.load_u32()?;
        let shard = ShardIdent::load(slice)?;
        let gen_utime = slice.load_u32()?;
        let start_lt = slice.load_u64()?;
        let end_lt = slice.load_u64()?;
        let gen_validator_list_hash_short = slice.load_u32()?;
        let gen_catchain_seqno = slice.load_u32()?;
        let min_ref_mc_seqno = slice.load_u32()?;
        let prev_key_block_seqno = slice.load_u32()?;
        let gen_software = if flags & 1 != 0 {
            Some(GlobalVersion::load(slice)?)
        } else {
            None
        };
        let master_ref = if not_master {
            match load_ref_if_present(slice)? {
                Some(mut s) => Some(ExtBlkRef::load(&mut s)?),
                None => None,
            }
        } else {
            None
        };
        let prev_ref = match load_ref_if_present(slice)? {
            Some(mut s) => Some(BlkPrevInfo::load(&mut s, after_merge)?),
            None => None,
        };
        if vert_seqno_incr {
            // previous vertical chain reference, unused by the verifier
            let _ = slice.load_ref()?;
        }
        Ok(Self {
            version,
            not_master,
            after_merge,
            before_split,
            after_split,
            want_split,
            want_merge,
            key_block,
            vert_seqno_incr,
            flags,
            seq_no,
            vert_seq_no,
            shard,
            gen_utime,
            start_lt,
            end_lt,
            gen_validator_list_hash_short,
            gen_catchain_seqno,
            min_ref_mc_seqno,
            prev_key_block_seqno,
            gen_software,
            master_ref,
            prev_ref,
        })
    }
}

/// Reference(s) to the immediately preceding block(s).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlkPrevInfo {
    Single(ExtBlkRef),
    Merge { prev1: ExtBlkRef, prev2: ExtBlkRef },
}

impl BlkPrevInfo {
    pub fn load(slice: &mut CellSlice<'_>, after_merge: bool) -> Result<Self, SchemaError> {
        if !after_merge {
            return Ok(Self::Single(ExtBlkRef::load(slice)?));
        }
        let mut first = load_ref_checked(slice, "merge predecessor")?;
        let mut second = load_ref_checked(slice, "merge predecessor")?;
        Ok(Self::Merge {
            prev1: ExtBlkRef::load(&mut first)?,
            prev2: ExtBlkRef::load(&mut second)?,
        })
    }
}

/// Per-shard fee aggregate, also its own augmentation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ShardFeeCreated {
    pub fees: CurrencyCollection,
    pub create: CurrencyCollection,
}

impl DictValue for ShardFeeCreated {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        Ok(Self {
            fees: CurrencyCollection::load(slice)?,
            create: CurrencyCollection::load(slice)?,
        })
    }

    fn store(&self, builder: &mut CellBuilder, arena: &mut CellArena) -> Result<(), DictError> {
        self.fees.store(builder, arena)?;
        self.create.store(builder, arena)?;
        Ok(())
    }
}

impl AugValue for ShardFeeCreated {
    fn combine(&self, other: &Self) -> Result<Self, DictError> {
        Ok(Self {
            fees: self.fees.combine(&other.fees)?,
            create: self.create.combine(&other.create)?,
        })
    }
}

/// `block_extra#4a33f6fd`
#[derive(Debug)]
pub struct BlockExtra {
    pub in_msg_descr: CellId,
    pub out_msg_descr: CellId,
    pub account_blocks: CellId,
    pub rand_seed: [u8; 32],
    pub created_by: [u8; 32],
    pub custom: Option<McBlockExtra>,
}

impl BlockExtra {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 32, BLOCK_EXTRA_TAG, "BlockExtra")?;
        let in_msg_descr = slice.load_ref()?;
        let out_msg_descr = slice.load_ref()?;
        let account_blocks = slice.load_ref()?;
        let rand_seed = slice.load_hash()?;
        let created_by = slice.load_hash()?;
        let custom = match slice.load_maybe_ref()? {
            Some(id) if slice.arena().cell(id).kind() != CellKind::PrunedBranch => {
                let mut custom_slice = CellSlice::new(slice.arena(), id);
                Some(McBlockExtra::load(&mut custom_slice)?)
            }
            _ => None,
        };
        Ok(Self {
            in_msg_descr,
            out_msg_descr,
            account_blocks,
            rand_seed,
            created_by,
            custom,
        })
    }
}

/// `masterchain_block_extra#cca5`
#[derive(Debug)]
pub struct McBlockExtra {
    pub key_block: bool,
    pub shard_hashes: Dict<RefValue>,
    pub shard_fees: AugDict<ShardFeeCreated, ShardFeeCreated>,
    pub prev_blk_signatures: Option<Dict<CryptoSignaturePair>>,
    /// Present on key blocks only.
    pub config: Option<ConfigParams>,
}

impl McBlockExtra {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 16, MC_BLOCK_EXTRA_TAG, "McBlockExtra")?;
        let key_block = slice.load_bit()?;
        let shard_hashes = Dict::load_maybe(slice, 32)?;
        let shard_fees = AugDict::load_maybe(slice, 96)?;
        let prev_blk_signatures = match load_ref_if_present(slice)? {
            Some(mut inner) => Some(Dict::load_maybe(&mut inner, 16)?),
            None => None,
        };
        let config = if key_block {
            Some(ConfigParams::load(slice)?)
        } else {
            None
        };
        Ok(Self {
            key_block,
            shard_hashes,
            shard_fees,
            prev_blk_signatures,
            config,
        })
    }
}

/// Verifies a block header proof against the id the caller already trusts
/// (or is in the middle of proving). NEVER accept header fields that did not
/// come through this check.
pub fn check_block_proof(
    arena: &CellArena,
    proof_root: CellId,
    id: &BlockId,
) -> Result<Block, SchemaError> {
    let proof = arena.cell(proof_root);
    if proof.kind() != CellKind::MerkleProof {
        return Err(SchemaError::Invalid {
            what: "block proof",
            reason: "root is not a merkle proof".into(),
        });
    }
    let body = proof.refs()[0];
    if arena.cell(body).hash(0) != id.root_hash {
        return Err(SchemaError::Invalid {
            what: "block proof",
            reason: "proof does not cover the expected root hash".into(),
        });
    }
    let block = Block::load(arena, body)?;
    if block.info.version != 0 {
        return Err(SchemaError::Invalid {
            what: "block proof",
            reason: format!("unsupported block version {}", block.info.version),
        });
    }
    if block.info.shard.workchain != id.workchain
        || block.info.shard.shard != id.shard
        || block.info.seq_no != id.seqno
    {
        return Err(SchemaError::Invalid {
            what: "block proof",
            reason: format!(
                "header is for ({},{:016x},{}), expected ({},{:016x},{})",
                block.info.shard.workchain,
                block.info.shard.shard,
                block.info.seq_no,
                id.workchain,
                id.shard,
                id.seqno
            ),
        });
    }
    if block.state_update.is_none() {
        return Err(SchemaError::Invalid {
            what: "block proof",
            reason: "state update is missing or not a merkle update".into(),
        });
    }
    Ok(block)
}

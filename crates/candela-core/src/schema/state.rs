//! Shard state layout: the masterchain extras the verifier walks (previous
//! blocks, embedded config) and the shard-tracking structures.

use crate::cell::{CellArena, CellBuilder, CellId, CellKind, CellSlice};
use crate::dict::{AugDict, AugValue, Dict, DictError, DictValue, RefValue};

use super::{
    expect_tag, config::ConfigParams, CurrencyCollection, ExtBlkRef, SchemaError, ShardIdent,
};

pub const SHARD_STATE_TAG: u64 = 0x9023afe2;
pub const MC_STATE_EXTRA_TAG: u64 = 0xcc26;

/// `shard_state#9023afe2`
#[derive(Debug)]
pub struct ShardStateUnsplit {
    pub global_id: i32,
    pub shard: ShardIdent,
    pub seq_no: u32,
    pub vert_seq_no: u32,
    pub gen_utime: u32,
    pub gen_lt: u64,
    pub min_ref_mc_seqno: u32,
    pub before_split: bool,
    /// Root of the augmented accounts dictionary, possibly pruned.
    pub accounts: CellId,
    pub custom: Option<McStateExtra>,
}

impl ShardStateUnsplit {
    pub fn load(arena: &CellArena, root: CellId) -> Result<Self, SchemaError> {
        let mut slice = CellSlice::new(arena, root);
        expect_tag(&mut slice, 32, SHARD_STATE_TAG, "ShardState")?;
        let global_id = slice.load_i32()?;
        let shard = ShardIdent::load(&mut slice)?;
        let seq_no = slice.load_u32()?;
        let vert_seq_no = slice.load_u32()?;
        let gen_utime = slice.load_u32()?;
        let gen_lt = slice.load_u64()?;
        let min_ref_mc_seqno = slice.load_u32()?;
        let _out_msg_queue_info = slice.load_ref()?;
        let before_split = slice.load_bit()?;
        let accounts = slice.load_ref()?;
        let _totals = slice.load_ref()?;
        let custom = match slice.load_maybe_ref()? {
            Some(id) if arena.cell(id).kind() != CellKind::PrunedBranch => {
                let mut custom_slice = CellSlice::new(arena, id);
                Some(McStateExtra::load(&mut custom_slice)?)
            }
            _ => None,
        };
        Ok(Self {
            global_id,
            shard,
            seq_no,
            vert_seq_no,
            gen_utime,
            gen_lt,
            min_ref_mc_seqno,
            before_split,
            accounts,
            custom,
        })
    }

    /// Parses the accounts dictionary; errors if the proof pruned its root.
    pub fn accounts(
        &self,
        arena: &CellArena,
    ) -> Result<AugDict<super::account::DepthBalanceInfo, super::account::ShardAccount>, SchemaError>
    {
        if arena.cell(self.accounts).kind() == CellKind::PrunedBranch {
            return Err(SchemaError::PrunedOut {
                what: "accounts dictionary",
            });
        }
        // ShardAccounts wraps the augmented dict in its own cell
        let mut slice = CellSlice::new(arena, self.accounts);
        Ok(AugDict::load_maybe(&mut slice, 256)?)
    }
}

/// `masterchain_state_extra#cc26`
#[derive(Debug)]
pub struct McStateExtra {
    pub shard_hashes: Dict<RefValue>,
    pub config: ConfigParams,
    /// Fields stored in the extension cell; `None` when pruned away.
    pub info: Option<McStateInfo>,
    pub global_balance: CurrencyCollection,
}

#[derive(Debug)]
pub struct McStateInfo {
    pub validator_info: ValidatorInfo,
    pub prev_blocks: AugDict<KeyMaxLt, KeyExtBlkRef>,
    pub after_key_block: bool,
    pub last_key_block: Option<ExtBlkRef>,
}

impl McStateExtra {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 16, MC_STATE_EXTRA_TAG, "McStateExtra")?;
        let shard_hashes = Dict::load_maybe(slice, 32)?;
        let config = ConfigParams::load(slice)?;
        let inner = slice.load_ref()?;
        let info = if slice.arena().cell(inner).kind() == CellKind::PrunedBranch {
            None
        } else {
            let mut s = CellSlice::new(slice.arena(), inner);
            let flags = s.load_u16()?;
            if flags > 1 {
                return Err(SchemaError::Invalid {
                    what: "McStateExtra",
                    reason: format!("reserved flags {flags:#x} set"),
                });
            }
            let validator_info = ValidatorInfo::load(&mut s)?;
            let prev_blocks = AugDict::load_maybe(&mut s, 32)?;
            let after_key_block = s.load_bit()?;
            let last_key_block = if s.load_bit()? {
                Some(ExtBlkRef::load(&mut s)?)
            } else {
                None
            };
            Some(McStateInfo {
                validator_info,
                prev_blocks,
                after_key_block,
                last_key_block,
            })
        };
        let global_balance = CurrencyCollection::load(slice).map_err(SchemaError::Dict)?;
        Ok(Self {
            shard_hashes,
            config,
            info,
            global_balance,
        })
    }
}

/// `validator_info$_`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ValidatorInfo {
    pub validator_list_hash_short: u32,
    pub catchain_seqno: u32,
    pub nx_cc_updated: bool,
}

impl ValidatorInfo {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        Ok(Self {
            validator_list_hash_short: slice.load_u32()?,
            catchain_seqno: slice.load_u32()?,
            nx_cc_updated: slice.load_bit()?,
        })
    }
}

/// Entry of the previous-blocks dictionary: a key-block flag plus the block
/// reference itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KeyExtBlkRef {
    pub key: bool,
    pub blk_ref: ExtBlkRef,
}

impl DictValue for KeyExtBlkRef {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        let key = slice.load_bit()?;
        let blk_ref = ExtBlkRef::load(slice).map_err(|e| DictError::Value(e.to_string()))?;
        Ok(Self { key, blk_ref })
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_bit(self.key)?;
        builder.write_uint(self.blk_ref.end_lt, 64)?;
        builder.write_uint(self.blk_ref.seq_no as u64, 32)?;
        builder.write_bytes(&self.blk_ref.root_hash)?;
        builder.write_bytes(&self.blk_ref.file_hash)?;
        Ok(())
    }
}

/// Augmentation of the previous-blocks dictionary.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KeyMaxLt {
    pub key: bool,
    pub max_end_lt: u64,
}

impl DictValue for KeyMaxLt {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        Ok(Self {
            key: slice.load_bit()?,
            max_end_lt: slice.load_u64()?,
        })
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_bit(self.key)?;
        builder.write_uint(self.max_end_lt, 64)?;
        Ok(())
    }
}

impl AugValue for KeyMaxLt {
    fn combine(&self, other: &Self) -> Result<Self, DictError> {
        Ok(Self {
            key: self.key || other.key,
            max_end_lt: self.max_end_lt.max(other.max_end_lt),
        })
    }
}

/// When a shard is scheduled to split or merge.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FutureSplitMerge {
    None,
    Split { split_utime: u32, interval: u32 },
    Merge { merge_utime: u32, interval: u32 },
}

impl FutureSplitMerge {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        if !slice.load_bit()? {
            return Ok(Self::None);
        }
        let merge = slice.load_bit()?;
        let utime = slice.load_u32()?;
        let interval = slice.load_u32()?;
        Ok(if merge {
            Self::Merge {
                merge_utime: utime,
                interval,
            }
        } else {
            Self::Split {
                split_utime: utime,
                interval,
            }
        })
    }
}

/// One shard's registration in the masterchain (`shard_descr#b` inline fees,
/// `shard_descr_new#a` fees in a reference).
#[derive(Clone, Debug)]
pub struct ShardDescr {
    pub seq_no: u32,
    pub reg_mc_seqno: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
    pub before_split: bool,
    pub before_merge: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub nx_cc_updated: bool,
    pub next_catchain_seqno: u32,
    pub next_validator_shard: u64,
    pub min_ref_mc_seqno: u32,
    pub gen_utime: u32,
    pub split_merge_at: FutureSplitMerge,
    pub fees_collected: CurrencyCollection,
    pub funds_created: CurrencyCollection,
}

impl ShardDescr {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        let tag = slice.load_uint(4)?;
        if tag != 0xa && tag != 0xb {
            return Err(SchemaError::UnexpectedTag {
                what: "ShardDescr",
                tag,
            });
        }
        let seq_no = slice.load_u32()?;
        let reg_mc_seqno = slice.load_u32()?;
        let start_lt = slice.load_u64()?;
        let end_lt = slice.load_u64()?;
        let root_hash = slice.load_hash()?;
        let file_hash = slice.load_hash()?;
        let before_split = slice.load_bit()?;
        let before_merge = slice.load_bit()?;
        let want_split = slice.load_bit()?;
        let want_merge = slice.load_bit()?;
        let nx_cc_updated = slice.load_bit()?;
        let flags = slice.load_uint(3)?;
        if flags != 0 {
            return Err(SchemaError::Invalid {
                what: "ShardDescr",
                reason: format!("reserved flags {flags:#x} set"),
            });
        }
        let next_catchain_seqno = slice.load_u32()?;
        let next_validator_shard = slice.load_u64()?;
        let min_ref_mc_seqno = slice.load_u32()?;
        let gen_utime = slice.load_u32()?;
        let split_merge_at = FutureSplitMerge::load(slice)?;
        let (fees_collected, funds_created) = if tag == 0xb {
            (
                CurrencyCollection::load(slice)?,
                CurrencyCollection::load(slice)?,
            )
        } else {
            let mut fees = slice.load_ref_slice()?;
            (
                CurrencyCollection::load(&mut fees)?,
                CurrencyCollection::load(&mut fees)?,
            )
        };
        Ok(Self {
            seq_no,
            reg_mc_seqno,
            start_lt,
            end_lt,
            root_hash,
            file_hash,
            before_split,
            before_merge,
            want_split,
            want_merge,
            nx_cc_updated,
            next_catchain_seqno,
            next_validator_shard,
            min_ref_mc_seqno,
            gen_utime,
            split_merge_at,
            fees_collected,
            funds_created,
        })
    }
}

/// Flattens the per-workchain shard binary trees into `(workchain, shard,
/// descr)` rows. Pruned subtrees are silently skipped: their shards are not
/// proven by this proof.
pub fn list_shards(
    arena: &CellArena,
    shard_hashes: &Dict<RefValue>,
) -> Result<Vec<(i32, u64, ShardDescr)>, SchemaError> {
    let mut out = Vec::new();
    for (key, tree) in shard_hashes.iter() {
        let workchain = key.to_uint() as u32 as i32;
        walk_bin_tree(arena, tree.0, workchain, 0, 0, &mut out)?;
    }
    Ok(out)
}

fn walk_bin_tree(
    arena: &CellArena,
    cell: CellId,
    workchain: i32,
    path: u64,
    depth: u32,
    out: &mut Vec<(i32, u64, ShardDescr)>,
) -> Result<(), SchemaError> {
    if arena.cell(cell).kind() == CellKind::PrunedBranch {
        return Ok(());
    }
    let mut slice = CellSlice::new(arena, cell);
    if !slice.load_bit()? {
        let descr = ShardDescr::load(&mut slice)?;
        let shard = ((path << 1) | 1) << (63 - depth);
        out.push((workchain, shard, descr));
        return Ok(());
    }
    if depth >= 60 {
        return Err(SchemaError::Invalid {
            what: "shard tree",
            reason: "split depth exceeds 60".into(),
        });
    }
    let left = slice.load_ref()?;
    let right = slice.load_ref()?;
    walk_bin_tree(arena, left, workchain, path << 1, depth + 1, out)?;
    walk_bin_tree(arena, right, workchain, (path << 1) | 1, depth + 1, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::DictKey;

    fn build_shard_descr(arena: &mut CellArena, seq_no: u32) -> CellId {
        let mut b = CellBuilder::new();
        b.write_uint(0xb, 4).unwrap();
        b.write_uint(seq_no as u64, 32).unwrap();
        b.write_uint(seq_no as u64, 32).unwrap(); // reg_mc_seqno
        b.write_uint(100, 64).unwrap();
        b.write_uint(200, 64).unwrap();
        b.write_bytes(&[1; 32]).unwrap();
        b.write_bytes(&[2; 32]).unwrap();
        b.write_uint(0, 5).unwrap(); // status bits
        b.write_uint(0, 3).unwrap(); // reserved
        b.write_uint(5, 32).unwrap(); // next_catchain_seqno
        b.write_uint(0x8000_0000_0000_0000, 64).unwrap();
        b.write_uint(0, 32).unwrap();
        b.write_uint(1_700_000_000, 32).unwrap();
        b.write_bit(false).unwrap(); // fsm_none
        CurrencyCollection::zero().store(&mut b, arena).unwrap();
        CurrencyCollection::zero().store(&mut b, arena).unwrap();
        arena.append(b).unwrap()
    }

    #[test]
    fn test_shard_descr_round_trip() {
        let mut arena = CellArena::new();
        let cell = build_shard_descr(&mut arena, 77);
        let descr = ShardDescr::load(&mut CellSlice::new(&arena, cell)).unwrap();
        assert_eq!(descr.seq_no, 77);
        assert_eq!(descr.split_merge_at, FutureSplitMerge::None);
        assert_eq!(descr.fees_collected.grams, 0);
    }

    #[test]
    fn test_list_shards_fork() {
        let mut arena = CellArena::new();
        // two leaves under one fork for workchain 0
        let descr_a = build_shard_descr(&mut arena, 10);
        let descr_b = build_shard_descr(&mut arena, 11);
        let leaf = |arena: &mut CellArena, descr: CellId| {
            let mut b = CellBuilder::new();
            b.write_bit(false).unwrap();
            let bits = arena.cell(descr).bit_len();
            let data = arena.cell(descr).bits().read_bits(0, bits).unwrap();
            b.write_raw(&data, bits).unwrap();
            arena.append(b).unwrap()
        };
        let left = leaf(&mut arena, descr_a);
        let right = leaf(&mut arena, descr_b);
        let mut fork = CellBuilder::new();
        fork.write_bit(true).unwrap();
        fork.write_ref(left).unwrap();
        fork.write_ref(right).unwrap();
        let tree = arena.append(fork).unwrap();

        let mut dict: Dict<RefValue> = Dict::empty(32);
        dict.insert(DictKey::from_uint(0, 32), RefValue(tree))
            .unwrap();

        let shards = list_shards(&arena, &dict).unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].1, 0x4000_0000_0000_0000);
        assert_eq!(shards[1].1, 0xC000_0000_0000_0000);
        assert_eq!(shards[0].2.seq_no, 10);
    }

    #[test]
    fn test_prev_blocks_dict() {
        let mut dict: AugDict<KeyMaxLt, KeyExtBlkRef> = AugDict::empty(32);
        for seq in [5u32, 9, 12] {
            dict.insert(
                DictKey::from_uint(seq as u64, 32),
                KeyMaxLt {
                    key: false,
                    max_end_lt: seq as u64 * 100,
                },
                KeyExtBlkRef {
                    key: false,
                    blk_ref: ExtBlkRef {
                        end_lt: seq as u64 * 100,
                        seq_no: seq,
                        root_hash: [seq as u8; 32],
                        file_hash: [seq as u8 + 1; 32],
                    },
                },
            )
            .unwrap();
        }

        let mut arena = CellArena::new();
        let mut b = CellBuilder::new();
        dict.serialize_maybe(&mut b, &mut arena).unwrap();
        let cell = arena.append(b).unwrap();

        let mut slice = CellSlice::new(&arena, cell);
        let parsed: AugDict<KeyMaxLt, KeyExtBlkRef> = AugDict::load_maybe(&mut slice, 32).unwrap();
        let (extra, entry) = parsed.get_uint(9).unwrap();
        assert_eq!(extra.max_end_lt, 900);
        assert_eq!(entry.blk_ref.seq_no, 9);
        assert_eq!(parsed.root_extra.as_ref().unwrap().max_end_lt, 1200);
    }

    fn build_mc_state(arena: &mut CellArena, seq_no: u32, prune_inner: bool) -> CellId {
        // config with an empty params dict cell
        let mut params: Dict<RefValue> = Dict::empty(32);
        let filler = arena.append_bytes(&[1]).unwrap();
        params
            .insert(DictKey::from_uint(0, 32), RefValue(filler))
            .unwrap();
        let params_root = params.serialize_root(arena).unwrap();

        let mut inner = CellBuilder::new();
        inner.write_uint(0, 16).unwrap(); // flags
        inner.write_uint(0xAA, 32).unwrap(); // validator_list_hash_short
        inner.write_uint(7, 32).unwrap(); // catchain_seqno
        inner.write_bit(false).unwrap(); // nx_cc_updated
        let mut prev: AugDict<KeyMaxLt, KeyExtBlkRef> = AugDict::empty(32);
        prev.root_extra = Some(KeyMaxLt {
            key: false,
            max_end_lt: 0,
        });
        prev.serialize_maybe(&mut inner, arena).unwrap();
        inner.write_bit(false).unwrap(); // after_key_block
        inner.write_bit(false).unwrap(); // no last_key_block
        let mut inner_cell = arena.append(inner).unwrap();
        if prune_inner {
            inner_cell = arena.make_pruned_branch(inner_cell).unwrap();
        }

        let mut extra = CellBuilder::new();
        extra.write_uint(MC_STATE_EXTRA_TAG, 16).unwrap();
        extra.write_bit(false).unwrap(); // empty shard_hashes
        extra.write_bytes(&[0x55; 32]).unwrap(); // config_addr
        extra.write_ref(params_root).unwrap();
        extra.write_ref(inner_cell).unwrap();
        CurrencyCollection::zero().store(&mut extra, arena).unwrap();
        let extra_cell = arena.append(extra).unwrap();

        let queue = arena.append_bytes(&[0]).unwrap();
        let accounts = {
            let mut b = CellBuilder::new();
            b.write_bit(false).unwrap();
            // empty aug dict still carries a root DepthBalanceInfo
            b.write_uint(0, 5).unwrap();
            CurrencyCollection::zero().store(&mut b, arena).unwrap();
            arena.append(b).unwrap()
        };
        let totals = arena.append_bytes(&[0]).unwrap();

        let mut b = CellBuilder::new();
        b.write_uint(SHARD_STATE_TAG, 32).unwrap();
        b.write_int(-239, 32).unwrap();
        b.write_uint(0, 2).unwrap();
        b.write_uint(0, 6).unwrap();
        b.write_int(-1, 32).unwrap();
        b.write_uint(0, 64).unwrap();
        b.write_uint(seq_no as u64, 32).unwrap();
        b.write_uint(0, 32).unwrap();
        b.write_uint(1_700_000_000, 32).unwrap();
        b.write_uint(5000, 64).unwrap();
        b.write_uint(0, 32).unwrap();
        b.write_ref(queue).unwrap();
        b.write_bit(false).unwrap();
        b.write_ref(accounts).unwrap();
        b.write_ref(totals).unwrap();
        b.write_bit(true).unwrap();
        b.write_ref(extra_cell).unwrap();
        arena.append(b).unwrap()
    }

    #[test]
    fn test_shard_state_parses() {
        let mut arena = CellArena::new();
        let root = build_mc_state(&mut arena, 123, false);
        let state = ShardStateUnsplit::load(&arena, root).unwrap();
        assert_eq!(state.seq_no, 123);
        assert_eq!(state.shard.workchain, -1);
        let extra = state.custom.unwrap();
        let info = extra.info.unwrap();
        assert_eq!(info.validator_info.catchain_seqno, 7);
        assert!(info.prev_blocks.is_empty());
    }

    #[test]
    fn test_shard_state_with_pruned_extension() {
        let mut arena = CellArena::new();
        let root = build_mc_state(&mut arena, 123, true);
        let state = ShardStateUnsplit::load(&arena, root).unwrap();
        let extra = state.custom.unwrap();
        assert!(extra.info.is_none());
    }
}

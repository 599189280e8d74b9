//! Network configuration: the key-block parameter dictionary and the typed
//! parameters the verifier consumes (validator sets, catchain settings).

use crate::cell::{CellArena, CellBuilder, CellId, CellKind, CellSlice};
use crate::dict::{Dict, DictError, DictValue, RefValue};

use super::SchemaError;

/// Config parameter index holding the current validator set.
pub const PARAM_CUR_VALIDATORS: u64 = 34;
/// Config parameter index holding the current temporary validator set,
/// preferred over the permanent one when present.
pub const PARAM_CUR_TEMP_VALIDATORS: u64 = 35;
/// Config parameter index holding the catchain settings.
pub const PARAM_CATCHAIN: u64 = 28;

/// `_ config_addr:bits256 config:^(Hashmap 32 ^Cell) = ConfigParams;`
///
/// Parameter values stay opaque cells until a typed accessor asks for them,
/// so a proof that prunes parameters the caller never reads still parses.
#[derive(Debug)]
pub struct ConfigParams {
    pub config_addr: [u8; 32],
    pub params: Dict<RefValue>,
}

impl ConfigParams {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        let config_addr = slice.load_hash()?;
        let root = slice.load_ref()?;
        let params = if slice.arena().cell(root).kind() == CellKind::PrunedBranch {
            let mut dict = Dict::empty(32);
            dict.mark_fully_pruned();
            dict
        } else {
            Dict::load_root(slice.arena(), root, 32)?
        };
        Ok(Self {
            config_addr,
            params,
        })
    }

    /// Raw cell of one parameter, if proven present.
    pub fn param(&self, index: u64) -> Option<CellId> {
        self.params.get_uint(index).map(|r| r.0)
    }

    pub fn catchain(&self, arena: &CellArena) -> Result<CatchainConfig, SchemaError> {
        let cell = self
            .param(PARAM_CATCHAIN)
            .ok_or(SchemaError::PrunedOut { what: "catchain config" })?;
        CatchainConfig::load(&mut CellSlice::new(arena, cell))
    }

    /// The validator set that signs masterchain blocks: temporary set when
    /// configured, the permanent one otherwise.
    pub fn current_validators(&self, arena: &CellArena) -> Result<ValidatorSet, SchemaError> {
        for index in [PARAM_CUR_TEMP_VALIDATORS, PARAM_CUR_VALIDATORS] {
            if let Some(cell) = self.param(index) {
                return ValidatorSet::load(&mut CellSlice::new(arena, cell));
            }
        }
        Err(SchemaError::Invalid {
            what: "config",
            reason: "no current validator set (params 34/35 missing)".into(),
        })
    }
}

/// One validator: `validator#53` or `validator_addr#73` with an ADNL address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ValidatorDescr {
    pub public_key: [u8; 32],
    pub weight: u64,
    pub adnl_addr: Option<[u8; 32]>,
}

impl DictValue for ValidatorDescr {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        let tag = slice.load_u8()?;
        if tag != 0x53 && tag != 0x73 {
            return Err(DictError::Value(format!(
                "unknown validator descriptor tag {tag:#04x}"
            )));
        }
        // sig_pub_key#8e81278a
        let key_tag = slice.load_u32()?;
        if key_tag != 0x8e81278a {
            return Err(DictError::Value(format!(
                "unknown public key tag {key_tag:#010x}"
            )));
        }
        let public_key = slice.load_hash()?;
        let weight = slice.load_u64()?;
        let adnl_addr = if tag == 0x73 {
            Some(slice.load_hash()?)
        } else {
            None
        };
        Ok(Self {
            public_key,
            weight,
            adnl_addr,
        })
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_uint(if self.adnl_addr.is_some() { 0x73 } else { 0x53 }, 8)?;
        builder.write_uint(0x8e81278a, 32)?;
        builder.write_bytes(&self.public_key)?;
        builder.write_uint(self.weight, 64)?;
        if let Some(adnl) = &self.adnl_addr {
            builder.write_bytes(adnl)?;
        }
        Ok(())
    }
}

/// `validators#11` / `validators_ext#12`.
#[derive(Debug)]
pub struct ValidatorSet {
    pub utime_since: u32,
    pub utime_until: u32,
    pub total: u16,
    pub main: u16,
    pub total_weight: Option<u64>,
    /// Validators ordered by their 16-bit index.
    pub list: Vec<ValidatorDescr>,
}

impl ValidatorSet {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        let tag = slice.load_u8()?;
        let ext = match tag {
            0x11 => false,
            0x12 => true,
            other => {
                return Err(SchemaError::UnexpectedTag {
                    what: "ValidatorSet",
                    tag: other as u64,
                })
            }
        };
        let utime_since = slice.load_u32()?;
        let utime_until = slice.load_u32()?;
        let total = slice.load_u16()?;
        let main = slice.load_u16()?;
        if main > total {
            return Err(SchemaError::Invalid {
                what: "ValidatorSet",
                reason: format!("main {main} exceeds total {total}"),
            });
        }
        if main < 1 {
            return Err(SchemaError::Invalid {
                what: "ValidatorSet",
                reason: "main count is zero".into(),
            });
        }
        let total_weight = if ext { Some(slice.load_u64()?) } else { None };
        let dict: Dict<ValidatorDescr> = if ext {
            Dict::load_maybe(slice, 16)?
        } else {
            Dict::load_inline(slice, 16)?
        };
        let list = dict.iter().map(|(_, v)| *v).collect();
        Ok(Self {
            utime_since,
            utime_until,
            total,
            main,
            total_weight,
            list,
        })
    }
}

/// Catchain parameters (config param 28): `catchain_config#c1` or
/// `catchain_config_new#c2` with the shuffle flag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CatchainConfig {
    pub shuffle_mc_validators: bool,
    pub mc_catchain_lifetime: u32,
    pub shard_catchain_lifetime: u32,
    pub shard_validators_lifetime: u32,
    pub shard_validators_num: u32,
}

impl CatchainConfig {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        let tag = slice.load_u8()?;
        let shuffle_mc_validators = match tag {
            0xc1 => false,
            0xc2 => {
                let flags = slice.load_uint(7)?;
                if flags != 0 {
                    return Err(SchemaError::Invalid {
                        what: "CatchainConfig",
                        reason: format!("reserved flags {flags:#x} set"),
                    });
                }
                slice.load_bit()?
            }
            other => {
                return Err(SchemaError::UnexpectedTag {
                    what: "CatchainConfig",
                    tag: other as u64,
                })
            }
        };
        Ok(Self {
            shuffle_mc_validators,
            mc_catchain_lifetime: slice.load_u32()?,
            shard_catchain_lifetime: slice.load_u32()?,
            shard_validators_lifetime: slice.load_u32()?,
            shard_validators_num: slice.load_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellArena;
    use crate::dict::DictKey;

    pub(crate) fn build_validator_set(
        arena: &mut CellArena,
        keys: &[[u8; 32]],
        weight: u64,
    ) -> CellId {
        let mut dict: Dict<ValidatorDescr> = Dict::empty(16);
        for (i, key) in keys.iter().enumerate() {
            dict.insert(
                DictKey::from_uint(i as u64, 16),
                ValidatorDescr {
                    public_key: *key,
                    weight,
                    adnl_addr: Some([i as u8; 32]),
                },
            )
            .unwrap();
        }
        let mut b = CellBuilder::new();
        b.write_uint(0x12, 8).unwrap();
        b.write_uint(1000, 32).unwrap();
        b.write_uint(2000, 32).unwrap();
        b.write_uint(keys.len() as u64, 16).unwrap();
        b.write_uint(keys.len() as u64, 16).unwrap();
        b.write_uint(weight * keys.len() as u64, 64).unwrap();
        dict.serialize_maybe(&mut b, arena).unwrap();
        arena.append(b).unwrap()
    }

    #[test]
    fn test_validator_set_ext_round_trip() {
        let mut arena = CellArena::new();
        let keys = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let cell = build_validator_set(&mut arena, &keys, 17);

        let vset = ValidatorSet::load(&mut CellSlice::new(&arena, cell)).unwrap();
        assert_eq!(vset.total, 3);
        assert_eq!(vset.main, 3);
        assert_eq!(vset.total_weight, Some(51));
        assert_eq!(vset.list.len(), 3);
        assert_eq!(vset.list[1].public_key, [2u8; 32]);
        assert_eq!(vset.list[1].adnl_addr, Some([1u8; 32]));
    }

    #[test]
    fn test_validator_set_rejects_main_over_total() {
        let mut arena = CellArena::new();
        let mut b = CellBuilder::new();
        b.write_uint(0x12, 8).unwrap();
        b.write_uint(0, 64).unwrap(); // since/until
        b.write_uint(2, 16).unwrap(); // total
        b.write_uint(5, 16).unwrap(); // main > total
        b.write_uint(0, 64).unwrap();
        b.write_bit(false).unwrap();
        let cell = arena.append(b).unwrap();
        assert!(matches!(
            ValidatorSet::load(&mut CellSlice::new(&arena, cell)),
            Err(SchemaError::Invalid { .. })
        ));
    }

    #[test]
    fn test_catchain_config_new() {
        let mut arena = CellArena::new();
        let mut b = CellBuilder::new();
        b.write_uint(0xc2, 8).unwrap();
        b.write_uint(0, 7).unwrap();
        b.write_bit(true).unwrap(); // shuffle
        for v in [250u64, 250, 1000, 7] {
            b.write_uint(v, 32).unwrap();
        }
        let cell = arena.append(b).unwrap();

        let cc = CatchainConfig::load(&mut CellSlice::new(&arena, cell)).unwrap();
        assert!(cc.shuffle_mc_validators);
        assert_eq!(cc.shard_validators_num, 7);
    }

    #[test]
    fn test_config_params_typed_access() {
        let mut arena = CellArena::new();
        let vset_cell = build_validator_set(&mut arena, &[[9u8; 32]], 1);

        let mut cc = CellBuilder::new();
        cc.write_uint(0xc1, 8).unwrap();
        for v in [250u64, 250, 1000, 7] {
            cc.write_uint(v, 32).unwrap();
        }
        let cc_cell = arena.append(cc).unwrap();

        let mut params: Dict<RefValue> = Dict::empty(32);
        params
            .insert(DictKey::from_uint(PARAM_CATCHAIN, 32), RefValue(cc_cell))
            .unwrap();
        params
            .insert(
                DictKey::from_uint(PARAM_CUR_VALIDATORS, 32),
                RefValue(vset_cell),
            )
            .unwrap();
        let dict_root = params.serialize_root(&mut arena).unwrap();

        let mut b = CellBuilder::new();
        b.write_bytes(&[0x55; 32]).unwrap();
        b.write_ref(dict_root).unwrap();
        let config_cell = arena.append(b).unwrap();

        let config = ConfigParams::load(&mut CellSlice::new(&arena, config_cell)).unwrap();
        assert_eq!(config.config_addr, [0x55; 32]);
        let cc = config.catchain(&arena).unwrap();
        assert!(!cc.shuffle_mc_validators);
        // param 35 absent, falls back to 34
        let vset = config.current_validators(&arena).unwrap();
        assert_eq!(vset.list[0].public_key, [9u8; 32]);
    }
}

//! Accounts and transactions: what `account_state` and the transaction walk
//! return after proof checking.

use crate::cell::{CellArena, CellBuilder, CellId, CellSlice};
use crate::dict::{AugValue, Dict, DictError, DictValue, RefValue};
use crate::types::Address;

use super::{expect_tag, CurrencyCollection, SchemaError};

pub const HASH_UPDATE_TAG: u64 = 0x72;
pub const TRANSACTION_TAG: u64 = 0b0111;

/// Augmentation of the accounts dictionary.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DepthBalanceInfo {
    pub split_depth: u8,
    pub balance: CurrencyCollection,
}

impl DictValue for DepthBalanceInfo {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        let split_depth = slice
            .load_uint_leq(30)
            .map_err(DictError::Cell)? as u8;
        Ok(Self {
            split_depth,
            balance: CurrencyCollection::load(slice)?,
        })
    }

    fn store(&self, builder: &mut CellBuilder, arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_uint(self.split_depth as u64, 5)?;
        self.balance.store(builder, arena)?;
        Ok(())
    }
}

impl AugValue for DepthBalanceInfo {
    fn combine(&self, other: &Self) -> Result<Self, DictError> {
        Ok(Self {
            split_depth: self.split_depth.max(other.split_depth),
            balance: self.balance.combine(&other.balance)?,
        })
    }
}

/// `account_descr$_` — the accounts-dictionary value.
#[derive(Clone, Copy, Debug)]
pub struct ShardAccount {
    pub account: CellId,
    pub last_trans_hash: [u8; 32],
    pub last_trans_lt: u64,
}

impl DictValue for ShardAccount {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        Ok(Self {
            account: slice.load_ref()?,
            last_trans_hash: slice.load_hash()?,
            last_trans_lt: slice.load_u64()?,
        })
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_ref(self.account)?;
        builder.write_bytes(&self.last_trans_hash)?;
        builder.write_uint(self.last_trans_lt, 64)?;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccountStatus {
    Uninit,
    Frozen,
    Active,
    NonExist,
}

impl AccountStatus {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        Ok(match slice.load_uint(2)? {
            0b00 => Self::Uninit,
            0b01 => Self::Frozen,
            0b10 => Self::Active,
            _ => Self::NonExist,
        })
    }
}

/// Contract state inside an active account.
#[derive(Clone, Copy, Debug)]
pub enum AccountState {
    Uninit,
    Active {
        code: Option<CellId>,
        data: Option<CellId>,
    },
    Frozen {
        state_hash: [u8; 32],
    },
}

/// `account$1` — `None` stands for `account_none$0`.
#[derive(Clone, Debug)]
pub struct Account {
    pub address: Address,
    pub last_paid: u32,
    pub due_payment: Option<u128>,
    pub last_trans_lt: u64,
    pub balance: CurrencyCollection,
    pub state: AccountState,
}

impl Account {
    pub fn load(arena: &CellArena, root: CellId) -> Result<Option<Self>, SchemaError> {
        let mut slice = CellSlice::new(arena, root);
        if !slice.load_bit()? {
            return Ok(None);
        }
        let address = slice.load_address()?.ok_or(SchemaError::Invalid {
            what: "Account",
            reason: "account address is addr_none".into(),
        })?;
        // storage_stat: cells/bits/public_cells then last_paid, due_payment
        for _ in 0..3 {
            let _ = slice.load_var_uint(7)?;
        }
        let last_paid = slice.load_u32()?;
        let due_payment = if slice.load_bit()? {
            Some(slice.load_grams()?)
        } else {
            None
        };
        let last_trans_lt = slice.load_u64()?;
        let balance = CurrencyCollection::load(&mut slice)?;
        let state = if slice.load_bit()? {
            // account_active$1: StateInit
            if slice.load_bit()? {
                let _ = slice.load_uint(5)?; // split_depth
            }
            if slice.load_bit()? {
                let _ = slice.load_uint(2)?; // tick/tock
            }
            let code = slice.load_maybe_ref()?;
            let data = slice.load_maybe_ref()?;
            let _library: Dict<RefValue> = Dict::load_maybe(&mut slice, 256)?;
            AccountState::Active { code, data }
        } else if slice.load_bit()? {
            AccountState::Frozen {
                state_hash: slice.load_hash()?,
            }
        } else {
            AccountState::Uninit
        };
        Ok(Some(Self {
            address,
            last_paid,
            due_payment,
            last_trans_lt,
            balance,
            state,
        }))
    }
}

/// `update_hashes#72` — old/new hash pair of the account state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HashUpdate {
    pub old_hash: [u8; 32],
    pub new_hash: [u8; 32],
}

impl HashUpdate {
    pub fn load(slice: &mut CellSlice<'_>) -> Result<Self, SchemaError> {
        expect_tag(slice, 8, HASH_UPDATE_TAG, "HashUpdate")?;
        Ok(Self {
            old_hash: slice.load_hash()?,
            new_hash: slice.load_hash()?,
        })
    }
}

/// `transaction$0111`
#[derive(Debug)]
pub struct Transaction {
    /// Representation hash of the transaction cell.
    pub hash: [u8; 32],
    pub account_addr: [u8; 32],
    pub lt: u64,
    pub prev_trans_hash: [u8; 32],
    pub prev_trans_lt: u64,
    pub now: u32,
    pub outmsg_cnt: u16,
    pub orig_status: AccountStatus,
    pub end_status: AccountStatus,
    pub in_msg: Option<CellId>,
    pub out_msgs: Dict<RefValue>,
    pub total_fees: CurrencyCollection,
    pub state_update: HashUpdate,
    pub description: CellId,
}

impl Transaction {
    pub fn load(arena: &CellArena, root: CellId) -> Result<Self, SchemaError> {
        let mut slice = CellSlice::new(arena, root);
        expect_tag(&mut slice, 4, TRANSACTION_TAG, "Transaction")?;
        let account_addr = slice.load_hash()?;
        let lt = slice.load_u64()?;
        let prev_trans_hash = slice.load_hash()?;
        let prev_trans_lt = slice.load_u64()?;
        let now = slice.load_u32()?;
        let outmsg_cnt = slice.load_uint(15)? as u16;
        let orig_status = AccountStatus::load(&mut slice)?;
        let end_status = AccountStatus::load(&mut slice)?;
        let (in_msg, out_msgs) = {
            let mut msgs = slice.load_ref_slice()?;
            let in_msg = msgs.load_maybe_ref()?;
            let out_msgs = Dict::load_maybe(&mut msgs, 15)?;
            (in_msg, out_msgs)
        };
        let total_fees = CurrencyCollection::load(&mut slice)?;
        let update_cell = slice.load_ref()?;
        let state_update = HashUpdate::load(&mut CellSlice::new(arena, update_cell))?;
        let description = slice.load_ref()?;
        Ok(Self {
            hash: arena.cell(root).repr_hash(),
            account_addr,
            lt,
            prev_trans_hash,
            prev_trans_lt,
            now,
            outmsg_cnt,
            orig_status,
            end_status,
            in_msg,
            out_msgs,
            total_fees,
            state_update,
            description,
        })
    }
}

//! Sequential reader over a finalized cell.
//!
//! A [`CellSlice`] tracks a bit cursor and a reference cursor; every `load_*`
//! consumes what it reads. Schema loaders thread one slice per cell and
//! descend into references by opening a fresh slice on the child.

use crate::types::Address;

use super::{Cell, CellArena, CellError, CellHash, CellId, CellKind};

#[derive(Clone)]
pub struct CellSlice<'a> {
    arena: &'a CellArena,
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    pub fn new(arena: &'a CellArena, id: CellId) -> Self {
        Self {
            arena,
            cell: arena.cell(id),
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    pub fn arena(&self) -> &'a CellArena {
        self.arena
    }

    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    pub fn kind(&self) -> CellKind {
        self.cell.kind()
    }

    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.refs().len() - self.ref_pos
    }

    pub fn is_data_empty(&self) -> bool {
        self.remaining_bits() == 0
    }

    fn take_bits(&mut self, wanted: usize) -> Result<usize, CellError> {
        if wanted > self.remaining_bits() {
            return Err(CellError::SliceUnderflow {
                wanted,
                available: self.remaining_bits(),
            });
        }
        let start = self.bit_pos;
        self.bit_pos += wanted;
        Ok(start)
    }

    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        let start = self.take_bits(1)?;
        self.cell.bits().bit(start)
    }

    pub fn load_uint(&mut self, bit_len: usize) -> Result<u64, CellError> {
        let start = self.take_bits(bit_len)?;
        self.cell.bits().read_uint(start, bit_len)
    }

    pub fn load_int(&mut self, bit_len: usize) -> Result<i64, CellError> {
        let start = self.take_bits(bit_len)?;
        self.cell.bits().read_int(start, bit_len)
    }

    pub fn load_u8(&mut self) -> Result<u8, CellError> {
        Ok(self.load_uint(8)? as u8)
    }

    pub fn load_u16(&mut self) -> Result<u16, CellError> {
        Ok(self.load_uint(16)? as u16)
    }

    pub fn load_u32(&mut self) -> Result<u32, CellError> {
        Ok(self.load_uint(32)? as u32)
    }

    pub fn load_u64(&mut self) -> Result<u64, CellError> {
        self.load_uint(64)
    }

    pub fn load_i32(&mut self) -> Result<i32, CellError> {
        Ok(self.load_int(32)? as i32)
    }

    /// MSB-first raw bits, packed into bytes.
    pub fn load_bits(&mut self, bit_len: usize) -> Result<Vec<u8>, CellError> {
        let start = self.take_bits(bit_len)?;
        self.cell.bits().read_bits(start, bit_len)
    }

    pub fn load_hash(&mut self) -> Result<CellHash, CellError> {
        let bytes = self.load_bits(256)?;
        bytes.try_into().map_err(|_| CellError::IntegrityError {
            reason: "truncated 256-bit field".into(),
        })
    }

    pub fn skip_bits(&mut self, bit_len: usize) -> Result<(), CellError> {
        self.take_bits(bit_len)?;
        Ok(())
    }

    /// `#<= max`: an unsigned integer stored in as many bits as `max` needs.
    pub fn load_uint_leq(&mut self, max: u32) -> Result<u32, CellError> {
        let width = (32 - max.leading_zeros()) as usize;
        let value = self.load_uint(width)? as u32;
        if value > max {
            return Err(CellError::IntegrityError {
                reason: format!("value {value} exceeds bound {max}"),
            });
        }
        Ok(value)
    }

    /// `VarUInteger n` with a value that fits 128 bits (n <= 16).
    pub fn load_var_uint(&mut self, n: u32) -> Result<u128, CellError> {
        let len_bits = (32 - (n - 1).leading_zeros()) as usize;
        let len = self.load_uint(len_bits)? as usize;
        if len > 16 {
            return Err(CellError::IntegrityError {
                reason: format!("variable integer of {len} bytes does not fit 128 bits"),
            });
        }
        let mut value = 0u128;
        for byte in self.load_bits(len * 8)? {
            value = (value << 8) | byte as u128;
        }
        Ok(value)
    }

    /// `VarUInteger n` of arbitrary width, as big-endian bytes.
    pub fn load_var_bytes(&mut self, n: u32) -> Result<Vec<u8>, CellError> {
        let len_bits = (32 - (n - 1).leading_zeros()) as usize;
        let len = self.load_uint(len_bits)? as usize;
        self.load_bits(len * 8)
    }

    /// Toncoin amount: `VarUInteger 16`.
    pub fn load_grams(&mut self) -> Result<u128, CellError> {
        self.load_var_uint(16)
    }

    /// Internal message address; `addr_none$00` yields `None`.
    pub fn load_address(&mut self) -> Result<Option<Address>, CellError> {
        match self.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                self.skip_anycast()?;
                let workchain = self.load_int(8)? as i8;
                let account = self.load_hash()?;
                Ok(Some(Address { workchain, account }))
            }
            0b11 => {
                self.skip_anycast()?;
                let addr_len = self.load_uint(9)? as usize;
                let workchain = self.load_i32()?;
                if addr_len != 256 || i8::try_from(workchain).is_err() {
                    return Err(CellError::IntegrityError {
                        reason: format!(
                            "unsupported variable address: {addr_len} bits, workchain {workchain}"
                        ),
                    });
                }
                let account = self.load_hash()?;
                Ok(Some(Address {
                    workchain: workchain as i8,
                    account,
                }))
            }
            tag => Err(CellError::IntegrityError {
                reason: format!("external address tag {tag:#b} where an internal one is required"),
            }),
        }
    }

    fn skip_anycast(&mut self) -> Result<(), CellError> {
        if self.load_bit()? {
            let depth = self.load_uint_leq(30)? as usize;
            self.skip_bits(depth)?;
        }
        Ok(())
    }

    pub fn load_ref(&mut self) -> Result<CellId, CellError> {
        let refs = self.cell.refs();
        if self.ref_pos >= refs.len() {
            return Err(CellError::RefUnderflow);
        }
        let id = refs[self.ref_pos];
        self.ref_pos += 1;
        Ok(id)
    }

    /// Consumes a reference and opens a slice on the child.
    pub fn load_ref_slice(&mut self) -> Result<CellSlice<'a>, CellError> {
        let id = self.load_ref()?;
        Ok(CellSlice::new(self.arena, id))
    }

    /// `Maybe ^X`: one presence bit, then a reference if set.
    pub fn load_maybe_ref(&mut self) -> Result<Option<CellId>, CellError> {
        if self.load_bit()? {
            Ok(Some(self.load_ref()?))
        } else {
            Ok(None)
        }
    }
}

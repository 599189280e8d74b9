//! The hash-addressed cell model.
//!
//! A cell is up to 1023 bits of payload plus up to 4 references to other
//! cells. Cells form a DAG (shared children, never cycles) owned by a
//! [`CellArena`]; parents hold plain [`CellId`] handles, never pointers.
//!
//! A cell is immutable once finalized. Finalization computes one SHA-256
//! hash and depth per significant Merkle level, bottom-up, and validates the
//! structure of the exotic kinds. Because a builder can only reference
//! already-finalized cells, hashing never recurses — attacker-controlled
//! trees cannot exhaust the stack, and the protocol depth ceiling is
//! enforced at every append.

pub mod bits;
pub mod boc;
pub mod slice;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use bits::BitBuffer;
pub use boc::{decode_boc, encode_boc, BocOptions};
pub use slice::CellSlice;

/// Maximum payload bits per cell.
pub const MAX_BITS: usize = 1023;
/// Maximum references per cell.
pub const MAX_REFS: usize = 4;
/// Cell trees deeper than this are rejected outright.
pub const MAX_DEPTH: u16 = 1024;

pub const HASH_BYTES: usize = 32;
pub const DEPTH_BYTES: usize = 2;

pub type CellHash = [u8; 32];

/// SHA-256 of a byte string.
pub fn sha256(data: &[u8]) -> CellHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[derive(Debug, Error)]
pub enum CellError {
    #[error("bit buffer capacity exceeded: need {needed} more bits, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("bit read out of range: offset {offset}, len {len}, only {written} bits written")]
    OutOfRange {
        offset: usize,
        len: usize,
        written: usize,
    },

    #[error("value does not fit into {bits} bits")]
    EncodingError { bits: usize },

    #[error("cell reference limit exceeded")]
    TooManyRefs,

    #[error("cell tree depth {depth} reaches the protocol ceiling")]
    DepthOverflow { depth: u16 },

    #[error("cell integrity violation: {reason}")]
    IntegrityError { reason: String },

    #[error("unsupported exotic cell type {type_byte:#04x}")]
    UnsupportedCell { type_byte: u8 },

    #[error("slice underflow: wanted {wanted} more bits, {available} left")]
    SliceUnderflow { wanted: usize, available: usize },

    #[error("slice underflow: no cell references left")]
    RefUnderflow,

    #[error("malformed bag of cells: {reason}")]
    MalformedBoc { reason: String },

    #[error("topological order is broken: cell {cell} references cell {reference}")]
    TopologicalOrderBroken { cell: usize, reference: usize },
}

/// Handle into a [`CellArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CellId(u32);

/// Every cell kind the protocol defines, one variant each.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellKind {
    Ordinary,
    /// Stands in for a hidden subtree inside a Merkle proof; carries the
    /// subtree's hashes and depths instead of its content.
    PrunedBranch,
    /// References a library cell by its 256-bit hash.
    Library,
    /// Proves membership against a root hash while hiding pruned subtrees.
    MerkleProof,
    /// Proves a state transition: old and new subtrees under one cell.
    MerkleUpdate,
}

impl CellKind {
    /// First data byte of an exotic cell.
    pub const TYPE_PRUNED_BRANCH: u8 = 1;
    pub const TYPE_LIBRARY: u8 = 2;
    pub const TYPE_MERKLE_PROOF: u8 = 3;
    pub const TYPE_MERKLE_UPDATE: u8 = 4;

    pub fn from_type_byte(type_byte: u8) -> Result<Self, CellError> {
        match type_byte {
            Self::TYPE_PRUNED_BRANCH => Ok(CellKind::PrunedBranch),
            Self::TYPE_LIBRARY => Ok(CellKind::Library),
            Self::TYPE_MERKLE_PROOF => Ok(CellKind::MerkleProof),
            Self::TYPE_MERKLE_UPDATE => Ok(CellKind::MerkleUpdate),
            other => Err(CellError::UnsupportedCell { type_byte: other }),
        }
    }

    pub fn is_exotic(self) -> bool {
        !matches!(self, CellKind::Ordinary)
    }
}

/// Bitmask of the Merkle levels (1..=3) at which a cell carries a distinct
/// hash. Level 0 is always significant.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    pub fn new(mask: u8) -> Self {
        Self(mask & 7)
    }

    pub fn mask(self) -> u8 {
        self.0
    }

    /// Highest significant level (0..=3).
    pub fn level(self) -> u8 {
        (8 - self.0.leading_zeros()) as u8
    }

    /// Number of hashes a cell with this mask carries.
    pub fn hash_count(self) -> usize {
        self.0.count_ones() as usize + 1
    }

    /// Mask restricted to levels strictly below `level`.
    pub fn apply(self, level: u8) -> Self {
        if level >= 8 {
            return self;
        }
        Self(self.0 & ((1u8 << level) - 1))
    }

    pub fn is_significant(self, level: u8) -> bool {
        level == 0 || (self.0 >> (level - 1)) & 1 == 1
    }

    /// Index into the cell's hash array for a query at `level`.
    pub fn hash_index(self, level: u8) -> usize {
        self.apply(level).0.count_ones() as usize
    }

    pub fn union(self, other: LevelMask) -> Self {
        Self(self.0 | other.0)
    }

    pub fn shift_down(self) -> Self {
        Self(self.0 >> 1)
    }
}

/// A finalized, immutable cell.
#[derive(Debug)]
pub struct Cell {
    kind: CellKind,
    bits: BitBuffer,
    refs: Vec<CellId>,
    level_mask: LevelMask,
    // One entry per significant level; for pruned branches the stored
    // subtree hashes come first, the cell's own hash last, so that
    // hash_index() addresses both kinds uniformly.
    hashes: Vec<CellHash>,
    depths: Vec<u16>,
}

impl Cell {
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn is_exotic(&self) -> bool {
        self.kind.is_exotic()
    }

    pub fn bits(&self) -> &BitBuffer {
        &self.bits
    }

    pub fn bit_len(&self) -> usize {
        self.bits.used_bits()
    }

    pub fn refs(&self) -> &[CellId] {
        &self.refs
    }

    pub fn level_mask(&self) -> LevelMask {
        self.level_mask
    }

    pub fn level(&self) -> u8 {
        self.level_mask.level()
    }

    /// Hash of this cell at the given Merkle level.
    pub fn hash(&self, level: u8) -> CellHash {
        self.hashes[self.level_mask.hash_index(level).min(self.hashes.len() - 1)]
    }

    /// The representation hash: hash at level 0.
    pub fn repr_hash(&self) -> CellHash {
        self.hash(0)
    }

    pub fn depth(&self, level: u8) -> u16 {
        self.depths[self.level_mask.hash_index(level).min(self.depths.len() - 1)]
    }

    fn refs_descriptor(&self, mask: LevelMask) -> u8 {
        self.refs.len() as u8 + if self.kind.is_exotic() { 8 } else { 0 } + mask.mask() * 32
    }

    fn bits_descriptor(&self) -> u8 {
        (self.bit_len().div_ceil(8) + self.bit_len() / 8) as u8
    }

    /// `d1 ∥ d2 ∥ top-upped payload`, the per-cell prefix of the container
    /// format and of every hash representation.
    pub(crate) fn data_with_descriptors(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.bits.used_bytes());
        out.push(self.refs_descriptor(self.level_mask));
        out.push(self.bits_descriptor());
        out.extend_from_slice(&self.bits.top_upped_bytes());
        out
    }
}

/// Accumulates bits and references for a cell under construction.
#[derive(Debug)]
pub struct CellBuilder {
    bits: BitBuffer,
    refs: Vec<CellId>,
    exotic: bool,
}

impl Default for CellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CellBuilder {
    pub fn new() -> Self {
        Self {
            bits: BitBuffer::new(MAX_BITS),
            refs: Vec::new(),
            exotic: false,
        }
    }

    /// Wraps an already-populated buffer, as produced by container parsing.
    pub(crate) fn with_bits(bits: BitBuffer) -> Self {
        Self {
            bits,
            refs: Vec::new(),
            exotic: false,
        }
    }

    /// Marks the cell as exotic: the first data byte is its type tag.
    pub fn mark_exotic(&mut self) {
        self.exotic = true;
    }

    pub fn bits(&self) -> &BitBuffer {
        &self.bits
    }

    pub fn write_bit(&mut self, value: bool) -> Result<(), CellError> {
        self.bits.write_bit(value)
    }

    pub fn write_uint(&mut self, value: u64, bit_len: usize) -> Result<(), CellError> {
        self.bits.write_uint(value, bit_len)
    }

    pub fn write_int(&mut self, value: i64, bit_len: usize) -> Result<(), CellError> {
        self.bits.write_int(value, bit_len)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CellError> {
        self.bits.write_bytes(bytes)
    }

    pub fn write_raw(&mut self, src: &[u8], bit_len: usize) -> Result<(), CellError> {
        self.bits.write_raw(src, bit_len)
    }

    pub fn write_grams(&mut self, amount: u128) -> Result<(), CellError> {
        self.bits.write_grams(amount)
    }

    pub fn write_address(
        &mut self,
        address: Option<&crate::types::Address>,
    ) -> Result<(), CellError> {
        self.bits.write_address(address)
    }

    pub fn write_ref(&mut self, child: CellId) -> Result<(), CellError> {
        if self.refs.len() >= MAX_REFS {
            return Err(CellError::TooManyRefs);
        }
        self.refs.push(child);
        Ok(())
    }
}

/// Owns every cell; the sole minting authority for [`CellId`]s.
#[derive(Debug, Default)]
pub struct CellArena {
    cells: Vec<Cell>,
}

impl CellArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0 as usize]
    }

    /// Finalizes the builder's content and appends the cell.
    ///
    /// All referenced children are already finalized (the builder could not
    /// have obtained their ids otherwise), so hashing is strictly bottom-up.
    pub fn append(&mut self, builder: CellBuilder) -> Result<CellId, CellError> {
        let cell = self.finalize(builder)?;
        let id = CellId(self.cells.len() as u32);
        self.cells.push(cell);
        Ok(id)
    }

    /// Convenience: an ordinary cell holding raw bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<CellId, CellError> {
        let mut b = CellBuilder::new();
        b.write_bytes(bytes)?;
        self.append(b)
    }

    /// Builds a pruned branch standing in for `target`, carrying all of the
    /// target's hashes and depths.
    pub fn make_pruned_branch(&mut self, target: CellId) -> Result<CellId, CellError> {
        let mask = LevelMask::new((self.cell(target).level_mask().mask() << 1) | 1);
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(CellKind::TYPE_PRUNED_BRANCH as u64, 8)?;
        b.write_uint(mask.mask() as u64, 8)?;
        let stored = mask.mask().count_ones() as u8;
        for level in 0..stored {
            let hash = self.cell(target).hash(level);
            b.write_bytes(&hash)?;
        }
        for level in 0..stored {
            let depth = self.cell(target).depth(level);
            b.write_uint(depth as u64, 16)?;
        }
        self.append(b)
    }

    /// Wraps `body` into a Merkle proof cell.
    pub fn make_merkle_proof(&mut self, body: CellId) -> Result<CellId, CellError> {
        let (hash, depth) = {
            let cell = self.cell(body);
            (cell.hash(0), cell.depth(0))
        };
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(CellKind::TYPE_MERKLE_PROOF as u64, 8)?;
        b.write_bytes(&hash)?;
        b.write_uint(depth as u64, 16)?;
        b.write_ref(body)?;
        self.append(b)
    }

    /// Wraps old/new state roots into a Merkle update cell.
    pub fn make_merkle_update(&mut self, old: CellId, new: CellId) -> Result<CellId, CellError> {
        let (old_hash, old_depth) = {
            let cell = self.cell(old);
            (cell.hash(0), cell.depth(0))
        };
        let (new_hash, new_depth) = {
            let cell = self.cell(new);
            (cell.hash(0), cell.depth(0))
        };
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(CellKind::TYPE_MERKLE_UPDATE as u64, 8)?;
        b.write_bytes(&old_hash)?;
        b.write_bytes(&new_hash)?;
        b.write_uint(old_depth as u64, 16)?;
        b.write_uint(new_depth as u64, 16)?;
        b.write_ref(old)?;
        b.write_ref(new)?;
        self.append(b)
    }

    fn read_payload_hash(bits: &BitBuffer, offset: usize) -> Result<CellHash, CellError> {
        let bytes = bits.read_bits(offset, 256)?;
        bytes
            .try_into()
            .map_err(|_| CellError::IntegrityError {
                reason: "truncated embedded hash".into(),
            })
    }

    fn finalize(&self, builder: CellBuilder) -> Result<Cell, CellError> {
        let CellBuilder { bits, refs, exotic } = builder;

        if bits.used_bits() > MAX_BITS {
            return Err(CellError::IntegrityError {
                reason: format!("cell data is {} bits, over the limit", bits.used_bits()),
            });
        }
        if refs.len() > MAX_REFS {
            return Err(CellError::TooManyRefs);
        }

        let kind = if exotic {
            if bits.used_bits() < 8 {
                return Err(CellError::IntegrityError {
                    reason: "not enough data for an exotic cell tag".into(),
                });
            }
            CellKind::from_type_byte(bits.read_uint(0, 8)? as u8)?
        } else {
            CellKind::Ordinary
        };

        let level_mask = match kind {
            CellKind::Ordinary => {
                let mut mask = LevelMask::default();
                for &r in &refs {
                    mask = mask.union(self.cell(r).level_mask());
                }
                mask
            }
            CellKind::PrunedBranch => {
                if !refs.is_empty() {
                    return Err(CellError::IntegrityError {
                        reason: "pruned branch carries a cell reference".into(),
                    });
                }
                if bits.used_bits() < 16 {
                    return Err(CellError::IntegrityError {
                        reason: "not enough data for a pruned branch".into(),
                    });
                }
                let mask = LevelMask::new(bits.read_uint(8, 8)? as u8);
                let level = mask.level();
                if level == 0 || level > 3 {
                    return Err(CellError::IntegrityError {
                        reason: format!("pruned branch has invalid level {level}"),
                    });
                }
                let stored = mask.apply(level - 1).hash_count();
                let expected = (2 + stored * (HASH_BYTES + DEPTH_BYTES)) * 8;
                if bits.used_bits() != expected {
                    return Err(CellError::IntegrityError {
                        reason: format!(
                            "pruned branch payload is {} bits, expected {expected}",
                            bits.used_bits()
                        ),
                    });
                }
                mask
            }
            CellKind::Library => {
                if bits.used_bits() != 8 + HASH_BYTES * 8 {
                    return Err(CellError::IntegrityError {
                        reason: "library cell payload must be a tag plus one hash".into(),
                    });
                }
                if !refs.is_empty() {
                    return Err(CellError::IntegrityError {
                        reason: "library cell carries a cell reference".into(),
                    });
                }
                LevelMask::default()
            }
            CellKind::MerkleProof => {
                if bits.used_bits() != (1 + HASH_BYTES + DEPTH_BYTES) * 8 {
                    return Err(CellError::IntegrityError {
                        reason: "merkle proof payload size mismatch".into(),
                    });
                }
                if refs.len() != 1 {
                    return Err(CellError::IntegrityError {
                        reason: format!("merkle proof has {} references, expected 1", refs.len()),
                    });
                }
                let child = self.cell(refs[0]);
                let embedded = Self::read_payload_hash(&bits, 8)?;
                if embedded != child.hash(0) {
                    return Err(CellError::IntegrityError {
                        reason: format!(
                            "merkle proof hash mismatch: {} != {}",
                            hex::encode(embedded),
                            hex::encode(child.hash(0))
                        ),
                    });
                }
                if bits.read_uint(8 + HASH_BYTES * 8, 16)? as u16 != child.depth(0) {
                    return Err(CellError::IntegrityError {
                        reason: "merkle proof depth mismatch".into(),
                    });
                }
                child.level_mask().shift_down()
            }
            CellKind::MerkleUpdate => {
                if bits.used_bits() != (1 + 2 * (HASH_BYTES + DEPTH_BYTES)) * 8 {
                    return Err(CellError::IntegrityError {
                        reason: "merkle update payload size mismatch".into(),
                    });
                }
                if refs.len() != 2 {
                    return Err(CellError::IntegrityError {
                        reason: format!("merkle update has {} references, expected 2", refs.len()),
                    });
                }
                for (i, &r) in refs.iter().enumerate() {
                    let child = self.cell(r);
                    let embedded = Self::read_payload_hash(&bits, 8 + i * HASH_BYTES * 8)?;
                    if embedded != child.hash(0) {
                        return Err(CellError::IntegrityError {
                            reason: format!("merkle update hash mismatch on branch {i}"),
                        });
                    }
                    let depth_offset = 8 + 2 * HASH_BYTES * 8 + i * DEPTH_BYTES * 8;
                    if bits.read_uint(depth_offset, 16)? as u16 != child.depth(0) {
                        return Err(CellError::IntegrityError {
                            reason: format!("merkle update depth mismatch on branch {i}"),
                        });
                    }
                }
                self.cell(refs[0])
                    .level_mask()
                    .union(self.cell(refs[1]).level_mask())
                    .shift_down()
            }
        };

        let mut cell = Cell {
            kind,
            bits,
            refs,
            level_mask,
            hashes: Vec::new(),
            depths: Vec::new(),
        };
        self.compute_hashes(&mut cell)?;
        Ok(cell)
    }

    /// One hash per significant level, exactly in the wire representation
    /// order: clipped d1, d2, payload (data at the base level, the previous
    /// hash above it), child depths, child hashes. Merkle cells read their
    /// children one level higher — the property that makes a proof's root
    /// hash equal the original tree's.
    fn compute_hashes(&self, cell: &mut Cell) -> Result<(), CellError> {
        let total = cell.level_mask.hash_count();
        let own_count = if cell.kind == CellKind::PrunedBranch {
            1
        } else {
            total
        };
        let offset = total - own_count;

        let mut own_hashes = vec![[0u8; 32]; own_count];
        let mut own_depths = vec![0u16; own_count];

        let level = cell.level_mask.level();
        let mut hash_i = 0usize;
        for level_i in 0..=level {
            if !cell.level_mask.is_significant(level_i) {
                continue;
            }
            if hash_i < offset {
                hash_i += 1;
                continue;
            }

            let mut repr: Vec<u8> = Vec::with_capacity(2 + 128 + cell.refs.len() * 34);
            repr.push(cell.refs_descriptor(cell.level_mask.apply(level_i)));
            repr.push(cell.bits_descriptor());

            if hash_i == offset {
                if level_i != 0 && cell.kind != CellKind::PrunedBranch {
                    return Err(CellError::IntegrityError {
                        reason: "base hash requested above level zero".into(),
                    });
                }
                repr.extend_from_slice(&cell.bits.top_upped_bytes());
            } else {
                if level_i == 0 || cell.kind == CellKind::PrunedBranch {
                    return Err(CellError::IntegrityError {
                        reason: "chained hash requested at level zero".into(),
                    });
                }
                repr.extend_from_slice(&own_hashes[hash_i - offset - 1]);
            }

            let child_level = match cell.kind {
                CellKind::MerkleProof | CellKind::MerkleUpdate => level_i + 1,
                _ => level_i,
            };

            let mut depth = 0u16;
            for &r in &cell.refs {
                let child_depth = self.cell(r).depth(child_level);
                repr.extend_from_slice(&child_depth.to_be_bytes());
                depth = depth.max(child_depth);
            }
            if !cell.refs.is_empty() {
                if depth >= MAX_DEPTH {
                    return Err(CellError::DepthOverflow { depth });
                }
                depth += 1;
            }
            own_depths[hash_i - offset] = depth;

            for &r in &cell.refs {
                repr.extend_from_slice(&self.cell(r).hash(child_level));
            }

            own_hashes[hash_i - offset] = sha256(&repr);
            hash_i += 1;
        }

        if cell.kind == CellKind::PrunedBranch {
            // normalize: stored subtree hashes first, own hash last
            let stored = cell.level_mask.mask().count_ones() as usize;
            let mut hashes = Vec::with_capacity(stored + 1);
            let mut depths = Vec::with_capacity(stored + 1);
            for i in 0..stored {
                hashes.push(Self::read_payload_hash(&cell.bits, 16 + i * HASH_BYTES * 8)?);
            }
            let depth_base = 16 + stored * HASH_BYTES * 8;
            for i in 0..stored {
                depths.push(cell.bits.read_uint(depth_base + i * DEPTH_BYTES * 8, 16)? as u16);
            }
            hashes.push(own_hashes[0]);
            depths.push(own_depths[0]);
            cell.hashes = hashes;
            cell.depths = depths;
        } else {
            cell.hashes = own_hashes;
            cell.depths = own_depths;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut CellArena, byte: u8) -> CellId {
        arena.append_bytes(&[byte]).unwrap()
    }

    #[test]
    fn test_hash_is_deterministic() {
        let mut a = CellArena::new();
        let mut b = CellArena::new();
        let la = leaf(&mut a, 0x42);
        let lb = leaf(&mut b, 0x42);
        assert_eq!(a.cell(la).repr_hash(), b.cell(lb).repr_hash());
        assert_eq!(a.cell(la).depth(0), 0);
    }

    #[test]
    fn test_parent_hash_covers_children() {
        let mut arena = CellArena::new();
        let child = leaf(&mut arena, 0x01);
        let mut b = CellBuilder::new();
        b.write_uint(0xAB, 8).unwrap();
        b.write_ref(child).unwrap();
        let parent = arena.append(b).unwrap();

        let other_child = leaf(&mut arena, 0x02);
        let mut b = CellBuilder::new();
        b.write_uint(0xAB, 8).unwrap();
        b.write_ref(other_child).unwrap();
        let other_parent = arena.append(b).unwrap();

        assert_ne!(
            arena.cell(parent).repr_hash(),
            arena.cell(other_parent).repr_hash()
        );
        assert_eq!(arena.cell(parent).depth(0), 1);
    }

    #[test]
    fn test_pruned_branch_preserves_target_hash() {
        let mut arena = CellArena::new();
        let hidden = leaf(&mut arena, 0x77);
        let pruned = arena.make_pruned_branch(hidden).unwrap();

        let cell = arena.cell(pruned);
        assert_eq!(cell.kind(), CellKind::PrunedBranch);
        assert_eq!(cell.level(), 1);
        // a level-0 query resolves to the hidden subtree's stored hash
        assert_eq!(cell.hash(0), arena.cell(hidden).repr_hash());
        assert_eq!(cell.depth(0), arena.cell(hidden).depth(0));
        // the pruned cell's own hash (at its level) differs
        assert_ne!(cell.hash(1), arena.cell(hidden).repr_hash());
    }

    #[test]
    fn test_merkle_proof_hash_transparency() {
        // original: root -> (left, right); proof hides `right`
        let mut arena = CellArena::new();
        let left = leaf(&mut arena, 0x01);
        let right = leaf(&mut arena, 0x02);
        let mut b = CellBuilder::new();
        b.write_uint(0xCC, 8).unwrap();
        b.write_ref(left).unwrap();
        b.write_ref(right).unwrap();
        let root = arena.append(b).unwrap();
        let root_hash = arena.cell(root).repr_hash();

        let pruned_right = arena.make_pruned_branch(right).unwrap();
        let mut b = CellBuilder::new();
        b.write_uint(0xCC, 8).unwrap();
        b.write_ref(left).unwrap();
        b.write_ref(pruned_right).unwrap();
        let body = arena.append(b).unwrap();

        // the proof body hashes to the original root at level 0
        assert_eq!(arena.cell(body).hash(0), root_hash);
        assert_eq!(arena.cell(body).level(), 1);

        let proof = arena.make_merkle_proof(body).unwrap();
        let proof_cell = arena.cell(proof);
        assert_eq!(proof_cell.kind(), CellKind::MerkleProof);
        assert_eq!(proof_cell.level(), 0);
    }

    #[test]
    fn test_merkle_proof_rejects_wrong_hash() {
        let mut arena = CellArena::new();
        let body = leaf(&mut arena, 0x01);
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(CellKind::TYPE_MERKLE_PROOF as u64, 8).unwrap();
        b.write_bytes(&[0u8; 32]).unwrap();
        b.write_uint(0, 16).unwrap();
        b.write_ref(body).unwrap();
        assert!(matches!(
            arena.append(b),
            Err(CellError::IntegrityError { .. })
        ));
    }

    #[test]
    fn test_pruned_branch_rejects_refs() {
        let mut arena = CellArena::new();
        let child = leaf(&mut arena, 0x01);
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(CellKind::TYPE_PRUNED_BRANCH as u64, 8).unwrap();
        b.write_uint(1, 8).unwrap();
        b.write_bytes(&[0u8; 32]).unwrap();
        b.write_uint(0, 16).unwrap();
        b.write_ref(child).unwrap();
        assert!(matches!(
            arena.append(b),
            Err(CellError::IntegrityError { .. })
        ));
    }

    #[test]
    fn test_exotic_with_unknown_tag() {
        let mut arena = CellArena::new();
        let mut b = CellBuilder::new();
        b.mark_exotic();
        b.write_uint(0x07, 8).unwrap();
        assert!(matches!(
            arena.append(b),
            Err(CellError::UnsupportedCell { type_byte: 0x07 })
        ));
    }

    #[test]
    fn test_ref_limit() {
        let mut arena = CellArena::new();
        let child = leaf(&mut arena, 0);
        let mut b = CellBuilder::new();
        for _ in 0..4 {
            b.write_ref(child).unwrap();
        }
        assert!(matches!(b.write_ref(child), Err(CellError::TooManyRefs)));
    }

    #[test]
    fn test_merkle_update_validates_both_branches() {
        let mut arena = CellArena::new();
        let old = leaf(&mut arena, 0x0A);
        let new = leaf(&mut arena, 0x0B);
        let update = arena.make_merkle_update(old, new).unwrap();
        assert_eq!(arena.cell(update).kind(), CellKind::MerkleUpdate);
    }
}

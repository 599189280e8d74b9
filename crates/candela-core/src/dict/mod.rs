//! Patricia-trie dictionaries over cells.
//!
//! Fixed-width keys map to values through a binary trie with compressed edge
//! labels. Three label encodings exist on the wire (`hml_short$0`,
//! `hml_long$10`, `hml_same$11`); parsing accepts all of them, serialization
//! picks the cheapest. A fork stores its left (bit 0) and right (bit 1)
//! subtrees as references; a leaf stores the value inline once the key is
//! exhausted.
//!
//! Inside Merkle proofs, subtrees are routinely replaced by pruned branches.
//! Those cut points are recorded as key prefixes so a lookup can distinguish
//! "proven absent" from "not covered by this proof".

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cell::{CellArena, CellBuilder, CellError, CellId, CellKind, CellSlice};

#[derive(Debug, Error)]
pub enum DictError {
    #[error("dictionary must not be empty here")]
    Empty,

    #[error("malformed edge label: {reason}")]
    MalformedLabel { reason: String },

    #[error("key width mismatch: key is {key} bits, dictionary holds {expected}")]
    KeyWidth { key: u16, expected: u16 },

    #[error("dictionary contains pruned subtrees and cannot be serialized")]
    Pruned,

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error("value codec: {0}")]
    Value(String),
}

pub const MAX_KEY_BITS: u16 = 256;

/// A key: up to 256 bits, most significant bit first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DictKey {
    len: u16,
    bytes: [u8; 32],
}

impl DictKey {
    pub fn empty() -> Self {
        Self {
            len: 0,
            bytes: [0; 32],
        }
    }

    pub fn from_raw(bytes: [u8; 32], len: u16) -> Self {
        let mut key = Self { len: 0, bytes: [0; 32] };
        for i in 0..len.min(MAX_KEY_BITS) {
            key = key.push(bytes[(i / 8) as usize] >> (7 - i % 8) & 1 == 1);
        }
        key
    }

    /// The low `len` bits of `value`, most significant first.
    pub fn from_uint(value: u64, len: u16) -> Self {
        let mut key = Self::empty();
        for i in (0..len.min(64)).rev() {
            key = key.push(value >> i & 1 == 1);
        }
        key
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit(&self, i: u16) -> bool {
        self.bytes[(i / 8) as usize] >> (7 - i % 8) & 1 == 1
    }

    #[must_use]
    pub fn push(&self, bit: bool) -> Self {
        let mut next = *self;
        if bit {
            next.bytes[(next.len / 8) as usize] |= 1 << (7 - next.len % 8);
        }
        next.len += 1;
        next
    }

    pub fn starts_with(&self, prefix: &DictKey) -> bool {
        prefix.len <= self.len && (0..prefix.len).all(|i| self.bit(i) == prefix.bit(i))
    }

    pub fn to_uint(&self) -> u64 {
        let mut value = 0u64;
        for i in 0..self.len.min(64) {
            value = value << 1 | self.bit(i) as u64;
        }
        value
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Wire codec for a dictionary value.
pub trait DictValue: Sized {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError>;
    fn store(&self, builder: &mut CellBuilder, arena: &mut CellArena) -> Result<(), DictError>;
}

/// Per-subtree aggregate carried by augmented dictionaries.
pub trait AugValue: DictValue {
    /// Aggregate of two sibling subtrees, recomputed when serializing forks.
    fn combine(&self, other: &Self) -> Result<Self, DictError>;
}

/// A value that is a single cell reference (`^X`).
#[derive(Clone, Copy, Debug)]
pub struct RefValue(pub CellId);

impl DictValue for RefValue {
    fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
        Ok(RefValue(slice.load_ref()?))
    }

    fn store(&self, builder: &mut CellBuilder, _arena: &mut CellArena) -> Result<(), DictError> {
        builder.write_ref(self.0)?;
        Ok(())
    }
}

/// Result of a proof-aware lookup.
#[derive(Debug)]
pub enum Lookup<'a, V> {
    Found(&'a V),
    /// The key is absent and the proof covers its path.
    Absent,
    /// The key's path runs into a pruned subtree; nothing is proven.
    Pruned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dict<V> {
    key_len: u16,
    entries: BTreeMap<DictKey, V>,
    pruned: Vec<DictKey>,
}

impl<V: DictValue> Dict<V> {
    pub fn empty(key_len: u16) -> Self {
        Self {
            key_len,
            entries: BTreeMap::new(),
            pruned: Vec::new(),
        }
    }

    /// Parses a non-empty `Hashmap n` from its root cell.
    pub fn load_root(arena: &CellArena, root: CellId, key_len: u16) -> Result<Self, DictError> {
        let mut dict = Self::empty(key_len);
        let mut slice = CellSlice::new(arena, root);
        dict.parse_node(&mut slice, DictKey::empty(), key_len)?;
        Ok(dict)
    }

    /// Parses a non-empty `Hashmap n` whose root node sits inline in `slice`.
    pub fn load_inline(slice: &mut CellSlice<'_>, key_len: u16) -> Result<Self, DictError> {
        let mut dict = Self::empty(key_len);
        dict.parse_node(slice, DictKey::empty(), key_len)?;
        Ok(dict)
    }

    /// Parses a `HashmapE n`: one presence bit, then a root reference.
    pub fn load_maybe(slice: &mut CellSlice<'_>, key_len: u16) -> Result<Self, DictError> {
        match slice.load_maybe_ref()? {
            None => Ok(Self::empty(key_len)),
            Some(root) => {
                if slice.arena().cell(root).kind() == CellKind::PrunedBranch {
                    let mut dict = Self::empty(key_len);
                    dict.pruned.push(DictKey::empty());
                    return Ok(dict);
                }
                Self::load_root(slice.arena(), root, key_len)
            }
        }
    }

    fn parse_node(
        &mut self,
        slice: &mut CellSlice<'_>,
        prefix: DictKey,
        remaining: u16,
    ) -> Result<(), DictError> {
        let (prefix, remaining) = read_label(slice, prefix, remaining)?;
        if remaining == 0 {
            let value = V::load(slice)?;
            self.entries.insert(prefix, value);
            return Ok(());
        }
        for bit in [false, true] {
            let child = slice.load_ref()?;
            let branch = prefix.push(bit);
            if slice.arena().cell(child).kind() == CellKind::PrunedBranch {
                self.pruned.push(branch);
                continue;
            }
            let mut child_slice = CellSlice::new(slice.arena(), child);
            self.parse_node(&mut child_slice, branch, remaining - 1)?;
        }
        Ok(())
    }

    pub fn key_len(&self) -> u16 {
        self.key_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_pruned(&self) -> bool {
        !self.pruned.is_empty()
    }

    /// Marks the entire key space as hidden behind a pruned branch.
    pub fn mark_fully_pruned(&mut self) {
        self.pruned.push(DictKey::empty());
    }

    pub fn get(&self, key: &DictKey) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_uint(&self, key: u64) -> Option<&V> {
        self.get(&DictKey::from_uint(key, self.key_len))
    }

    /// True when the proof demonstrates the key maps to nothing.
    pub fn proves_absent(&self, key: &DictKey) -> bool {
        matches!(self.lookup(key), Lookup::Absent)
    }

    pub fn lookup(&self, key: &DictKey) -> Lookup<'_, V> {
        if let Some(value) = self.entries.get(key) {
            return Lookup::Found(value);
        }
        if self.pruned.iter().any(|p| key.starts_with(p)) {
            return Lookup::Pruned;
        }
        Lookup::Absent
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &V)> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: DictKey, value: V) -> Result<(), DictError> {
        if key.len() != self.key_len {
            return Err(DictError::KeyWidth {
                key: key.len(),
                expected: self.key_len,
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Serializes a non-empty dictionary to its root cell.
    pub fn serialize_root(&self, arena: &mut CellArena) -> Result<CellId, DictError> {
        if self.has_pruned() {
            return Err(DictError::Pruned);
        }
        if self.entries.is_empty() {
            return Err(DictError::Empty);
        }
        let keys: Vec<&DictKey> = self.entries.keys().collect();
        self.build_node(arena, &keys, 0)
    }

    /// Serializes as `HashmapE n` into `builder`.
    pub fn serialize_maybe(
        &self,
        builder: &mut CellBuilder,
        arena: &mut CellArena,
    ) -> Result<(), DictError> {
        if self.has_pruned() {
            return Err(DictError::Pruned);
        }
        if self.entries.is_empty() {
            builder.write_bit(false)?;
            return Ok(());
        }
        builder.write_bit(true)?;
        let root = self.serialize_root(arena)?;
        builder.write_ref(root)?;
        Ok(())
    }

    fn build_node(
        &self,
        arena: &mut CellArena,
        keys: &[&DictKey],
        from: u16,
    ) -> Result<CellId, DictError> {
        let mut builder = CellBuilder::new();
        let label_len = common_prefix_len(keys, from);
        let remaining = self.key_len - from;
        write_label(&mut builder, keys[0], from, label_len, remaining)?;

        let pos = from + label_len;
        if pos == self.key_len {
            let value = &self.entries[keys[0]];
            value.store(&mut builder, arena)?;
            return arena.append(builder).map_err(Into::into);
        }

        let split = keys.partition_point(|k| !k.bit(pos));
        let left = self.build_node(arena, &keys[..split], pos + 1)?;
        let right = self.build_node(arena, &keys[split..], pos + 1)?;
        builder.write_ref(left)?;
        builder.write_ref(right)?;
        arena.append(builder).map_err(Into::into)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AugDict<A, V> {
    key_len: u16,
    entries: BTreeMap<DictKey, (A, V)>,
    /// Aggregate over the whole dictionary, stored next to the root.
    pub root_extra: Option<A>,
    pruned: Vec<DictKey>,
}

impl<A: AugValue + Clone, V: DictValue> AugDict<A, V> {
    pub fn empty(key_len: u16) -> Self {
        Self {
            key_len,
            entries: BTreeMap::new(),
            root_extra: None,
            pruned: Vec::new(),
        }
    }

    /// Parses a `HashmapAugE n`: presence bit, optional root ref, root extra.
    pub fn load_maybe(slice: &mut CellSlice<'_>, key_len: u16) -> Result<Self, DictError> {
        let root = slice.load_maybe_ref()?;
        let mut dict = Self::empty(key_len);
        match root {
            None => {}
            Some(root) if slice.arena().cell(root).kind() == CellKind::PrunedBranch => {
                dict.pruned.push(DictKey::empty());
            }
            Some(root) => {
                let mut root_slice = CellSlice::new(slice.arena(), root);
                dict.parse_node(&mut root_slice, DictKey::empty(), key_len)?;
            }
        }
        dict.root_extra = Some(A::load(slice)?);
        Ok(dict)
    }

    fn parse_node(
        &mut self,
        slice: &mut CellSlice<'_>,
        prefix: DictKey,
        remaining: u16,
    ) -> Result<(), DictError> {
        let (prefix, remaining) = read_label(slice, prefix, remaining)?;
        if remaining == 0 {
            let extra = A::load(slice)?;
            let value = V::load(slice)?;
            self.entries.insert(prefix, (extra, value));
            return Ok(());
        }
        for bit in [false, true] {
            let child = slice.load_ref()?;
            let branch = prefix.push(bit);
            if slice.arena().cell(child).kind() == CellKind::PrunedBranch {
                self.pruned.push(branch);
                continue;
            }
            let mut child_slice = CellSlice::new(slice.arena(), child);
            self.parse_node(&mut child_slice, branch, remaining - 1)?;
        }
        // the fork's own aggregate; recomputed from the leaves on store
        let _ = A::load(slice)?;
        Ok(())
    }

    pub fn key_len(&self) -> u16 {
        self.key_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_pruned(&self) -> bool {
        !self.pruned.is_empty()
    }

    pub fn get(&self, key: &DictKey) -> Option<&(A, V)> {
        self.entries.get(key)
    }

    pub fn get_uint(&self, key: u64) -> Option<&(A, V)> {
        self.get(&DictKey::from_uint(key, self.key_len))
    }

    pub fn proves_absent(&self, key: &DictKey) -> bool {
        matches!(self.lookup(key), Lookup::Absent)
    }

    pub fn lookup(&self, key: &DictKey) -> Lookup<'_, (A, V)> {
        if let Some(entry) = self.entries.get(key) {
            return Lookup::Found(entry);
        }
        if self.pruned.iter().any(|p| key.starts_with(p)) {
            return Lookup::Pruned;
        }
        Lookup::Absent
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &(A, V))> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: DictKey, extra: A, value: V) -> Result<(), DictError> {
        if key.len() != self.key_len {
            return Err(DictError::KeyWidth {
                key: key.len(),
                expected: self.key_len,
            });
        }
        self.entries.insert(key, (extra, value));
        Ok(())
    }

    /// Serializes as `HashmapAugE n`, recomputing every fork aggregate.
    pub fn serialize_maybe(
        &self,
        builder: &mut CellBuilder,
        arena: &mut CellArena,
    ) -> Result<(), DictError> {
        if self.has_pruned() {
            return Err(DictError::Pruned);
        }
        if self.entries.is_empty() {
            builder.write_bit(false)?;
            match &self.root_extra {
                Some(extra) => extra.store(builder, arena)?,
                None => return Err(DictError::Value("missing root aggregate".into())),
            }
            return Ok(());
        }
        builder.write_bit(true)?;
        let keys: Vec<&DictKey> = self.entries.keys().collect();
        let (root, extra) = self.build_node(arena, &keys, 0)?;
        builder.write_ref(root)?;
        extra.store(builder, arena)?;
        Ok(())
    }

    fn build_node(
        &self,
        arena: &mut CellArena,
        keys: &[&DictKey],
        from: u16,
    ) -> Result<(CellId, A), DictError> {
        let mut builder = CellBuilder::new();
        let label_len = common_prefix_len(keys, from);
        let remaining = self.key_len - from;
        write_label(&mut builder, keys[0], from, label_len, remaining)?;

        let pos = from + label_len;
        if pos == self.key_len {
            let (extra, value) = &self.entries[keys[0]];
            extra.store(&mut builder, arena)?;
            value.store(&mut builder, arena)?;
            let id = arena.append(builder)?;
            return Ok((id, extra.clone()));
        }

        let split = keys.partition_point(|k| !k.bit(pos));
        let (left, left_extra) = self.build_node(arena, &keys[..split], pos + 1)?;
        let (right, right_extra) = self.build_node(arena, &keys[split..], pos + 1)?;
        builder.write_ref(left)?;
        builder.write_ref(right)?;
        let extra = left_extra.combine(&right_extra)?;
        extra.store(&mut builder, arena)?;
        let id = arena.append(builder)?;
        Ok((id, extra))
    }
}

fn bits_for_u16(value: u16) -> usize {
    (16 - value.leading_zeros()) as usize
}

/// Parses one edge label, returning the extended prefix and the key bits
/// still to resolve below this node.
fn read_label(
    slice: &mut CellSlice<'_>,
    mut prefix: DictKey,
    remaining: u16,
) -> Result<(DictKey, u16), DictError> {
    let len;
    if !slice.load_bit()? {
        // hml_short$0: unary length, then the bits themselves
        let mut n = 0u16;
        while slice.load_bit()? {
            n += 1;
        }
        len = n;
        if len > remaining {
            return Err(DictError::MalformedLabel {
                reason: format!("short label of {len} bits, {remaining} remain"),
            });
        }
        for _ in 0..len {
            prefix = prefix.push(slice.load_bit()?);
        }
    } else if !slice.load_bit()? {
        // hml_long$10
        len = slice.load_uint(bits_for_u16(remaining))? as u16;
        if len > remaining {
            return Err(DictError::MalformedLabel {
                reason: format!("long label of {len} bits, {remaining} remain"),
            });
        }
        for _ in 0..len {
            prefix = prefix.push(slice.load_bit()?);
        }
    } else {
        // hml_same$11
        let bit = slice.load_bit()?;
        len = slice.load_uint(bits_for_u16(remaining))? as u16;
        if len > remaining {
            return Err(DictError::MalformedLabel {
                reason: format!("same-bit label of {len} bits, {remaining} remain"),
            });
        }
        for _ in 0..len {
            prefix = prefix.push(bit);
        }
    }
    Ok((prefix, remaining - len))
}

/// Writes the cheapest label encoding for `key[from..from+len]`.
fn write_label(
    builder: &mut CellBuilder,
    key: &DictKey,
    from: u16,
    len: u16,
    remaining: u16,
) -> Result<(), DictError> {
    let len_bits = bits_for_u16(remaining);
    let short_cost = 1 + (len as usize + 1) + len as usize;
    let long_cost = 2 + len_bits + len as usize;
    let all_same = len > 0 && (from..from + len).all(|i| key.bit(i) == key.bit(from));
    let same_cost = if all_same { 3 + len_bits } else { usize::MAX };

    if same_cost < short_cost && same_cost < long_cost {
        builder.write_uint(0b11, 2)?;
        builder.write_bit(key.bit(from))?;
        builder.write_uint(len as u64, len_bits)?;
    } else if short_cost <= long_cost {
        builder.write_bit(false)?;
        for _ in 0..len {
            builder.write_bit(true)?;
        }
        builder.write_bit(false)?;
        for i in from..from + len {
            builder.write_bit(key.bit(i))?;
        }
    } else {
        builder.write_uint(0b10, 2)?;
        builder.write_uint(len as u64, len_bits)?;
        for i in from..from + len {
            builder.write_bit(key.bit(i))?;
        }
    }
    Ok(())
}

fn common_prefix_len(keys: &[&DictKey], from: u16) -> u16 {
    let first = keys[0];
    let mut len = first.len() - from;
    for key in &keys[1..] {
        let mut l = 0;
        while l < len && key.bit(from + l) == first.bit(from + l) {
            l += 1;
        }
        len = l;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Debug)]
    struct U32Value(u32);

    impl DictValue for U32Value {
        fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
            Ok(U32Value(slice.load_u32()?))
        }

        fn store(
            &self,
            builder: &mut CellBuilder,
            _arena: &mut CellArena,
        ) -> Result<(), DictError> {
            builder.write_uint(self.0 as u64, 32)?;
            Ok(())
        }
    }

    #[derive(Clone, Copy, PartialEq, Debug)]
    struct MaxLt(u64);

    impl DictValue for MaxLt {
        fn load(slice: &mut CellSlice<'_>) -> Result<Self, DictError> {
            Ok(MaxLt(slice.load_u64()?))
        }

        fn store(
            &self,
            builder: &mut CellBuilder,
            _arena: &mut CellArena,
        ) -> Result<(), DictError> {
            builder.write_uint(self.0, 64)?;
            Ok(())
        }
    }

    impl AugValue for MaxLt {
        fn combine(&self, other: &Self) -> Result<Self, DictError> {
            Ok(MaxLt(self.0.max(other.0)))
        }
    }

    fn sample_dict(key_len: u16, keys: &[u64]) -> Dict<U32Value> {
        let mut dict = Dict::empty(key_len);
        for &k in keys {
            dict.insert(DictKey::from_uint(k, key_len), U32Value((k as u32).wrapping_mul(10)))
                .unwrap();
        }
        dict
    }

    #[test]
    fn test_key_bit_order() {
        let key = DictKey::from_uint(0b1010, 4);
        assert!(key.bit(0));
        assert!(!key.bit(1));
        assert!(key.bit(2));
        assert!(!key.bit(3));
        assert_eq!(key.to_uint(), 0b1010);
    }

    #[test]
    fn test_round_trip() {
        let dict = sample_dict(16, &[0, 1, 7, 255, 256, 65535]);
        let mut arena = CellArena::new();
        let root = dict.serialize_root(&mut arena).unwrap();

        let parsed: Dict<U32Value> = Dict::load_root(&arena, root, 16).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed.get_uint(7), Some(&U32Value(70)));
        assert_eq!(parsed.get_uint(65535), Some(&U32Value(655350)));
        assert_eq!(parsed.get_uint(2), None);
    }

    #[test]
    fn test_single_entry_uses_full_label() {
        let dict = sample_dict(32, &[0xDEADBEEF]);
        let mut arena = CellArena::new();
        let root = dict.serialize_root(&mut arena).unwrap();
        let parsed: Dict<U32Value> = Dict::load_root(&arena, root, 32).unwrap();
        assert_eq!(parsed.get_uint(0xDEADBEEF), Some(&U32Value(0xDEADBEEFu32.wrapping_mul(10))));
    }

    #[test]
    fn test_same_bit_label_round_trip() {
        // keys sharing a long run of zeros exercise hml_same
        let dict = sample_dict(64, &[0, 1]);
        let mut arena = CellArena::new();
        let root = dict.serialize_root(&mut arena).unwrap();
        let parsed: Dict<U32Value> = Dict::load_root(&arena, root, 64).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get_uint(0), Some(&U32Value(0)));
        assert_eq!(parsed.get_uint(1), Some(&U32Value(10)));
    }

    #[test]
    fn test_empty_root_is_error() {
        let dict: Dict<U32Value> = Dict::empty(16);
        let mut arena = CellArena::new();
        assert!(matches!(
            dict.serialize_root(&mut arena),
            Err(DictError::Empty)
        ));
    }

    #[test]
    fn test_hashmap_e_empty_bit() {
        let dict: Dict<U32Value> = Dict::empty(16);
        let mut arena = CellArena::new();
        let mut builder = CellBuilder::new();
        dict.serialize_maybe(&mut builder, &mut arena).unwrap();
        let id = arena.append(builder).unwrap();

        let mut slice = CellSlice::new(&arena, id);
        let parsed: Dict<U32Value> = Dict::load_maybe(&mut slice, 16).unwrap();
        assert!(parsed.is_empty());
        assert!(!parsed.has_pruned());
    }

    #[test]
    fn test_key_width_enforced() {
        let mut dict: Dict<U32Value> = Dict::empty(16);
        assert!(matches!(
            dict.insert(DictKey::from_uint(1, 8), U32Value(1)),
            Err(DictError::KeyWidth {
                key: 8,
                expected: 16
            })
        ));
    }

    #[test]
    fn test_pruned_subtree_lookup() {
        // build a 2-entry dict, then prune one branch and re-wrap the fork
        let dict = sample_dict(8, &[0x00, 0x80]);
        let mut arena = CellArena::new();
        let root = dict.serialize_root(&mut arena).unwrap();

        let fork = arena.cell(root);
        let left = fork.refs()[0];
        let right = fork.refs()[1];
        let label_bits = fork.bit_len();
        let label = fork.bits().read_bits(0, label_bits).unwrap();

        let pruned_right = arena.make_pruned_branch(right).unwrap();
        let mut builder = CellBuilder::new();
        builder.write_raw(&label, label_bits).unwrap();
        builder.write_ref(left).unwrap();
        builder.write_ref(pruned_right).unwrap();
        let proof_root = arena.append(builder).unwrap();

        let parsed: Dict<U32Value> = Dict::load_root(&arena, proof_root, 8).unwrap();
        assert!(parsed.has_pruned());
        assert!(matches!(
            parsed.lookup(&DictKey::from_uint(0x00, 8)),
            Lookup::Found(U32Value(0))
        ));
        // 0x80 lives under the pruned branch: not proven absent
        assert!(matches!(
            parsed.lookup(&DictKey::from_uint(0x80, 8)),
            Lookup::Pruned
        ));
        assert!(!parsed.proves_absent(&DictKey::from_uint(0x80, 8)));
        // 0x01 resolves through the intact branch
        assert!(parsed.proves_absent(&DictKey::from_uint(0x01, 8)));
    }

    #[test]
    fn test_aug_dict_round_trip() {
        let mut dict: AugDict<MaxLt, U32Value> = AugDict::empty(32);
        for (seq, lt) in [(100u64, 5000u64), (101, 6000), (200, 9000)] {
            dict.insert(DictKey::from_uint(seq, 32), MaxLt(lt), U32Value(seq as u32))
                .unwrap();
        }

        let mut arena = CellArena::new();
        let mut builder = CellBuilder::new();
        dict.serialize_maybe(&mut builder, &mut arena).unwrap();
        let id = arena.append(builder).unwrap();

        let mut slice = CellSlice::new(&arena, id);
        let parsed: AugDict<MaxLt, U32Value> = AugDict::load_maybe(&mut slice, 32).unwrap();
        assert_eq!(parsed.len(), 3);
        let (extra, value) = parsed.get_uint(101).unwrap();
        assert_eq!(*extra, MaxLt(6000));
        assert_eq!(*value, U32Value(101));
        // root aggregate is the maximum over all leaves
        assert_eq!(parsed.root_extra, Some(MaxLt(9000)));
    }

    #[test]
    fn test_aug_dict_empty_keeps_root_extra() {
        let mut dict: AugDict<MaxLt, U32Value> = AugDict::empty(32);
        dict.root_extra = Some(MaxLt(0));

        let mut arena = CellArena::new();
        let mut builder = CellBuilder::new();
        dict.serialize_maybe(&mut builder, &mut arena).unwrap();
        let id = arena.append(builder).unwrap();

        let mut slice = CellSlice::new(&arena, id);
        let parsed: AugDict<MaxLt, U32Value> = AugDict::load_maybe(&mut slice, 32).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.root_extra, Some(MaxLt(0)));
    }
}

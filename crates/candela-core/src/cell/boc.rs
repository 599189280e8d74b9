//! Bag-of-cells: the container format that carries cell trees over the wire.
//!
//! Serialization deduplicates cells by representation hash and emits them in
//! topological order, parents first. Deserialization enforces that order, so
//! cells can be finalized in a single reverse pass and a malicious payload
//! cannot smuggle in a reference cycle.

use std::collections::HashMap;

use crc::Crc;

use super::{BitBuffer, CellArena, CellBuilder, CellError, CellHash, CellId};

const REACH_BOC_MAGIC: [u8; 4] = [0xB5, 0xEE, 0x9C, 0x72];
const LEAN_BOC_MAGIC: [u8; 4] = [0x68, 0xFF, 0x65, 0xF3];
const LEAN_BOC_MAGIC_CRC: [u8; 4] = [0xAC, 0xC3, 0xA7, 0x28];

const CRC32C: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISCSI);

#[derive(Clone, Copy, Debug)]
pub struct BocOptions {
    pub has_idx: bool,
    pub has_crc32c: bool,
}

impl Default for BocOptions {
    fn default() -> Self {
        Self {
            has_idx: false,
            has_crc32c: true,
        }
    }
}

fn bits_for(value: usize) -> usize {
    (usize::BITS - value.leading_zeros()) as usize
}

fn write_be(out: &mut Vec<u8>, value: usize, byte_len: usize) {
    for i in (0..byte_len).rev() {
        out.push((value >> (i * 8)) as u8);
    }
}

/// Unique cells reachable from `roots`, ordered so that every parent
/// precedes all of its children.
fn collect_cells(
    arena: &CellArena,
    roots: &[CellId],
) -> (Vec<CellId>, HashMap<CellHash, usize>) {
    // (discovery order, max depth from a root)
    let mut seen: HashMap<CellHash, (usize, usize, CellId)> = HashMap::new();
    let mut stack: Vec<(CellId, usize)> = roots.iter().map(|&r| (r, 0)).collect();
    stack.reverse();

    while let Some((id, depth)) = stack.pop() {
        let hash = arena.cell(id).repr_hash();
        let discovery = seen.len();
        let entry = seen.entry(hash).or_insert((discovery, depth, id));
        if entry.0 != discovery && entry.1 >= depth {
            continue;
        }
        entry.1 = entry.1.max(depth);
        for &child in arena.cell(id).refs() {
            stack.push((child, depth + 1));
        }
    }

    let mut ordered: Vec<(usize, usize, CellId)> = seen.values().copied().collect();
    ordered.sort_by_key(|&(discovery, depth, _)| (depth, discovery));

    let mut index = HashMap::with_capacity(ordered.len());
    let mut cells = Vec::with_capacity(ordered.len());
    for (i, &(_, _, id)) in ordered.iter().enumerate() {
        index.insert(arena.cell(id).repr_hash(), i);
        cells.push(id);
    }
    (cells, index)
}

pub fn encode_boc(
    arena: &CellArena,
    roots: &[CellId],
    options: &BocOptions,
) -> Result<Vec<u8>, CellError> {
    if roots.is_empty() {
        return Err(CellError::MalformedBoc {
            reason: "no root cells to serialize".into(),
        });
    }
    let (cells, index) = collect_cells(arena, roots);
    let cells_num = cells.len();
    let s_bytes = bits_for(cells_num).div_ceil(8).max(1);

    let mut records: Vec<Vec<u8>> = Vec::with_capacity(cells_num);
    for &id in &cells {
        let cell = arena.cell(id);
        let mut record = cell.data_with_descriptors();
        for &child in cell.refs() {
            let child_index = index[&arena.cell(child).repr_hash()];
            write_be(&mut record, child_index, s_bytes);
        }
        records.push(record);
    }
    let tot_cells_size: usize = records.iter().map(Vec::len).sum();
    let offset_bytes = bits_for(tot_cells_size).div_ceil(8).max(1);

    let mut out = Vec::with_capacity(16 + cells_num * s_bytes + tot_cells_size + 4);
    out.extend_from_slice(&REACH_BOC_MAGIC);
    out.push(
        (options.has_idx as u8) << 7 | (options.has_crc32c as u8) << 6 | s_bytes as u8,
    );
    out.push(offset_bytes as u8);
    write_be(&mut out, cells_num, s_bytes);
    write_be(&mut out, roots.len(), s_bytes);
    write_be(&mut out, 0, s_bytes); // absent cells
    write_be(&mut out, tot_cells_size, offset_bytes);
    for &root in roots {
        write_be(&mut out, index[&arena.cell(root).repr_hash()], s_bytes);
    }
    if options.has_idx {
        let mut offset = 0usize;
        for record in &records {
            offset += record.len();
            write_be(&mut out, offset, offset_bytes);
        }
    }
    for record in &records {
        out.extend_from_slice(record);
    }
    if options.has_crc32c {
        let checksum = CRC32C.checksum(&out);
        out.extend_from_slice(&checksum.to_le_bytes());
    }
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CellError> {
        if self.pos + len > self.bytes.len() {
            return Err(CellError::MalformedBoc {
                reason: "container is truncated".into(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_be(&mut self, byte_len: usize) -> Result<usize, CellError> {
        let mut value = 0usize;
        for &b in self.take(byte_len)? {
            value = (value << 8) | b as usize;
        }
        Ok(value)
    }
}

struct RawCell {
    bits: BitBuffer,
    exotic: bool,
    refs: Vec<usize>,
}

/// Parses a bag of cells into `arena`, returning the root cell ids.
pub fn decode_boc(arena: &mut CellArena, bytes: &[u8]) -> Result<Vec<CellId>, CellError> {
    let mut r = Reader { bytes, pos: 0 };
    let magic: [u8; 4] = r.take(4)?.try_into().map_err(|_| CellError::MalformedBoc {
        reason: "container is truncated".into(),
    })?;

    let (has_idx, has_crc32c, s_bytes) = match magic {
        REACH_BOC_MAGIC => {
            let flags = r.read_be(1)?;
            (flags & 0x80 != 0, flags & 0x40 != 0, flags & 0x07)
        }
        LEAN_BOC_MAGIC => (true, false, r.read_be(1)?),
        LEAN_BOC_MAGIC_CRC => (true, true, r.read_be(1)?),
        _ => {
            return Err(CellError::MalformedBoc {
                reason: "unknown magic prefix".into(),
            })
        }
    };
    if s_bytes == 0 || s_bytes > 8 {
        return Err(CellError::MalformedBoc {
            reason: format!("invalid index width {s_bytes}"),
        });
    }

    let offset_bytes = r.read_be(1)?;
    if offset_bytes == 0 || offset_bytes > 8 {
        return Err(CellError::MalformedBoc {
            reason: format!("invalid offset width {offset_bytes}"),
        });
    }
    let cells_num = r.read_be(s_bytes)?;
    let roots_num = r.read_be(s_bytes)?;
    let absent_num = r.read_be(s_bytes)?;
    if absent_num != 0 {
        return Err(CellError::MalformedBoc {
            reason: "absent cells are not supported".into(),
        });
    }
    if roots_num == 0 || roots_num > cells_num {
        return Err(CellError::MalformedBoc {
            reason: format!("bad root count {roots_num} for {cells_num} cells"),
        });
    }
    let tot_cells_size = r.read_be(offset_bytes)?;

    let mut root_indices = Vec::with_capacity(roots_num);
    for _ in 0..roots_num {
        root_indices.push(r.read_be(s_bytes)?);
    }
    if has_idx {
        r.take(cells_num * offset_bytes)?;
    }

    let cells_start = r.pos;
    let mut raw_cells = Vec::with_capacity(cells_num);
    for i in 0..cells_num {
        let d1 = r.read_be(1)?;
        let d2 = r.read_be(1)?;
        let level_mask = super::LevelMask::new((d1 >> 5) as u8);
        let exotic = d1 & 8 != 0;
        let ref_num = d1 & 7;
        if ref_num > super::MAX_REFS {
            return Err(CellError::MalformedBoc {
                reason: format!("cell {i} declares {ref_num} references"),
            });
        }
        if d1 & 16 != 0 {
            // stored hashes and depths, recomputed on finalize
            r.take(level_mask.hash_count() * (super::HASH_BYTES + super::DEPTH_BYTES))?;
        }
        let data_byte_size = (d2 >> 1) + (d2 & 1);
        let full_bytes = d2 & 1 == 0;
        let data = r.take(data_byte_size)?;
        let bits = BitBuffer::from_top_upped(data, full_bytes)?;
        let mut refs = Vec::with_capacity(ref_num);
        for _ in 0..ref_num {
            let child = r.read_be(s_bytes)?;
            if child >= cells_num {
                return Err(CellError::MalformedBoc {
                    reason: format!("cell {i} references missing cell {child}"),
                });
            }
            if child <= i {
                return Err(CellError::TopologicalOrderBroken {
                    cell: i,
                    reference: child,
                });
            }
            refs.push(child);
        }
        raw_cells.push(RawCell { bits, exotic, refs });
    }
    if r.pos - cells_start != tot_cells_size {
        return Err(CellError::MalformedBoc {
            reason: format!(
                "declared cell data size {tot_cells_size} does not match {}",
                r.pos - cells_start
            ),
        });
    }
    if has_crc32c {
        let expected = u32::from_le_bytes(r.take(4)?.try_into().map_err(|_| {
            CellError::MalformedBoc {
                reason: "container is truncated".into(),
            }
        })?);
        let actual = CRC32C.checksum(&bytes[..bytes.len() - 4]);
        if expected != actual {
            return Err(CellError::MalformedBoc {
                reason: format!("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}"),
            });
        }
    }

    // children carry larger indices, so a reverse pass finalizes bottom-up
    let mut ids: Vec<Option<CellId>> = vec![None; cells_num];
    for i in (0..cells_num).rev() {
        let raw = &raw_cells[i];
        let mut builder = CellBuilder::with_bits(raw.bits.clone());
        if raw.exotic {
            builder.mark_exotic();
        }
        for &child in &raw.refs {
            let child_id = ids[child].ok_or_else(|| CellError::MalformedBoc {
                reason: format!("cell {child} was never materialized"),
            })?;
            builder.write_ref(child_id)?;
        }
        ids[i] = Some(arena.append(builder)?);
    }

    let mut roots = Vec::with_capacity(roots_num);
    for index in root_indices {
        roots.push(ids[index].ok_or_else(|| CellError::MalformedBoc {
            reason: format!("root index {index} out of range"),
        })?);
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    fn sample_tree(arena: &mut CellArena) -> CellId {
        let leaf_a = arena.append_bytes(&[0x0A]).unwrap();
        let leaf_b = arena.append_bytes(&[0x0B, 0x0C]).unwrap();
        let mut mid = CellBuilder::new();
        mid.write_uint(0x1234, 16).unwrap();
        mid.write_ref(leaf_a).unwrap();
        mid.write_ref(leaf_b).unwrap();
        let mid = arena.append(mid).unwrap();
        let mut root = CellBuilder::new();
        root.write_uint(7, 5).unwrap();
        root.write_ref(mid).unwrap();
        root.write_ref(leaf_a).unwrap(); // shared subtree
        arena.append(root).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_root_hash() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let expected = arena.cell(root).repr_hash();

        let bytes = encode_boc(&arena, &[root], &BocOptions::default()).unwrap();

        let mut decoded = CellArena::new();
        let roots = decode_boc(&mut decoded, &bytes).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(decoded.cell(roots[0]).repr_hash(), expected);
    }

    #[test]
    fn test_shared_cells_are_deduplicated() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let bytes = encode_boc(&arena, &[root], &BocOptions::default()).unwrap();

        // 4 unique cells: root, mid, leaf_a (stored once), leaf_b
        let mut decoded = CellArena::new();
        decode_boc(&mut decoded, &bytes).unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn test_crc_detects_corruption() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let mut bytes = encode_boc(&arena, &[root], &BocOptions::default()).unwrap();
        let last_data = bytes.len() - 5;
        bytes[last_data] ^= 0xFF;

        let mut decoded = CellArena::new();
        let err = decode_boc(&mut decoded, &bytes);
        assert!(err.is_err());
    }

    #[test]
    fn test_no_crc_variant() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let expected = arena.cell(root).repr_hash();
        let options = BocOptions {
            has_idx: false,
            has_crc32c: false,
        };
        let bytes = encode_boc(&arena, &[root], &options).unwrap();

        let mut decoded = CellArena::new();
        let roots = decode_boc(&mut decoded, &bytes).unwrap();
        assert_eq!(decoded.cell(roots[0]).repr_hash(), expected);
    }

    #[test]
    fn test_index_section_is_skipped() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let expected = arena.cell(root).repr_hash();
        let options = BocOptions {
            has_idx: true,
            has_crc32c: true,
        };
        let bytes = encode_boc(&arena, &[root], &options).unwrap();

        let mut decoded = CellArena::new();
        let roots = decode_boc(&mut decoded, &bytes).unwrap();
        assert_eq!(decoded.cell(roots[0]).repr_hash(), expected);
    }

    #[test]
    fn test_exotic_cells_survive_round_trip() {
        let mut arena = CellArena::new();
        let body = sample_tree(&mut arena);
        let proof = arena.make_merkle_proof(body).unwrap();
        let bytes = encode_boc(&arena, &[proof], &BocOptions::default()).unwrap();

        let mut decoded = CellArena::new();
        let roots = decode_boc(&mut decoded, &bytes).unwrap();
        let cell = decoded.cell(roots[0]);
        assert_eq!(cell.kind(), crate::cell::CellKind::MerkleProof);
        assert_eq!(cell.repr_hash(), arena.cell(proof).repr_hash());
    }

    #[test]
    fn test_truncated_input() {
        let mut arena = CellArena::new();
        let root = sample_tree(&mut arena);
        let bytes = encode_boc(&arena, &[root], &BocOptions::default()).unwrap();
        let mut decoded = CellArena::new();
        assert!(matches!(
            decode_boc(&mut decoded, &bytes[..bytes.len() / 2]),
            Err(CellError::MalformedBoc { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut decoded = CellArena::new();
        assert!(matches!(
            decode_boc(&mut decoded, &[0xDE, 0xAD, 0xBE, 0xEF, 0x00]),
            Err(CellError::MalformedBoc { .. })
        ));
    }
}

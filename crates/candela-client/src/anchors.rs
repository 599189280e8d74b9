//! The trust-anchor cache.
//!
//! Anchors are masterchain block ids the client has fully verified (or was
//! configured to trust, like the zero state). They are the only shared
//! mutable state in the client: reads are concurrent, writes take the lock
//! only after a whole chain verified. Anchors grow monotonically; the cache
//! never forgets one except through an explicit clear.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use candela_core::types::BlockId;

#[derive(Debug, Default, Serialize, Deserialize)]
struct AnchorMap {
    by_seqno: BTreeMap<u32, BlockId>,
}

#[derive(Debug)]
pub struct AnchorStore {
    inner: RwLock<AnchorMap>,
}

impl AnchorStore {
    /// Starts from one configured trusted id, normally the zero state.
    pub fn new(trusted: BlockId) -> Self {
        let mut by_seqno = BTreeMap::new();
        by_seqno.insert(trusted.seqno, trusted);
        Self {
            inner: RwLock::new(AnchorMap { by_seqno }),
        }
    }

    pub fn len(&self) -> usize {
        self.read().by_seqno.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_seqno.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.read().by_seqno.get(&id.seqno) == Some(id)
    }

    /// The verified id closest to `seqno` by absolute distance.
    pub fn nearest(&self, seqno: u32) -> Option<BlockId> {
        let map = self.read();
        let below = map.by_seqno.range(..=seqno).next_back();
        let above = map.by_seqno.range(seqno..).next();
        match (below, above) {
            (Some((s1, id1)), Some((s2, id2))) => {
                if seqno - s1 <= s2 - seqno {
                    Some(*id1)
                } else {
                    Some(*id2)
                }
            }
            (Some((_, id)), None) | (None, Some((_, id))) => Some(*id),
            (None, None) => None,
        }
    }

    pub fn add(&self, id: BlockId) {
        self.write().by_seqno.insert(id.seqno, id);
    }

    pub fn add_all(&self, ids: impl IntoIterator<Item = BlockId>) {
        let mut map = self.write();
        for id in ids {
            map.by_seqno.insert(id.seqno, id);
        }
    }

    pub fn clear(&self) {
        self.write().by_seqno.clear();
    }

    /// JSON snapshot for persistence by the embedding application.
    pub fn to_json(&self) -> String {
        // BTreeMap<u32, _> serializes as an ordered object
        serde_json::to_string(&*self.read()).unwrap_or_else(|_| "{}".into())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let map: AnchorMap = serde_json::from_str(json)?;
        Ok(Self {
            inner: RwLock::new(map),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AnchorMap> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AnchorMap> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seqno: u32) -> BlockId {
        BlockId {
            workchain: -1,
            shard: 0x8000_0000_0000_0000,
            seqno,
            root_hash: [seqno as u8; 32],
            file_hash: [seqno as u8 + 1; 32],
        }
    }

    #[test]
    fn test_nearest_prefers_closest() {
        let store = AnchorStore::new(id(0));
        store.add(id(100));
        store.add(id(200));
        assert_eq!(store.nearest(30).unwrap().seqno, 0);
        assert_eq!(store.nearest(90).unwrap().seqno, 100);
        assert_eq!(store.nearest(150).unwrap().seqno, 100); // tie goes low
        assert_eq!(store.nearest(151).unwrap().seqno, 200);
        assert_eq!(store.nearest(9999).unwrap().seqno, 200);
    }

    #[test]
    fn test_contains_checks_hashes() {
        let store = AnchorStore::new(id(5));
        assert!(store.contains(&id(5)));
        let mut tampered = id(5);
        tampered.root_hash = [0xDD; 32];
        assert!(!store.contains(&tampered));
    }

    #[test]
    fn test_json_round_trip() {
        let store = AnchorStore::new(id(0));
        store.add(id(7));
        let json = store.to_json();
        let restored = AnchorStore::from_json(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.contains(&id(7)));
    }
}

//! Deterministic validator-shuffle generator.
//!
//! Seeded with the shard, workchain and catchain sequence number, it yields
//! the exact permutation the validators themselves used, so the verifier can
//! reconstruct the signing subset offline.

use sha2::{Digest, Sha512};

pub struct ValidatorSetPrng {
    data: [u8; 48],
    hash: [u8; 64],
    pos: usize,
    limit: usize,
}

impl ValidatorSetPrng {
    pub fn new(shard: u64, workchain: i32, cc_seqno: u32) -> Self {
        let mut data = [0u8; 48];
        data[32..40].copy_from_slice(&shard.to_be_bytes());
        data[40..44].copy_from_slice(&workchain.to_be_bytes());
        data[44..48].copy_from_slice(&cc_seqno.to_be_bytes());
        Self {
            data,
            hash: [0u8; 64],
            pos: 0,
            limit: 0,
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        if self.pos < self.limit {
            let word = Self::word(&self.hash, self.pos);
            self.pos += 1;
            return word;
        }
        let mut hasher = Sha512::new();
        hasher.update(self.data);
        self.hash = hasher.finalize().into();
        self.increment_seed();
        self.pos = 1;
        self.limit = 8;
        Self::word(&self.hash, 0)
    }

    /// Uniform draw in `0..range` via the high 64 bits of a 128-bit product.
    pub fn next_ranged(&mut self, range: u64) -> u64 {
        ((self.next_u64() as u128 * range as u128) >> 64) as u64
    }

    fn word(hash: &[u8; 64], index: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[index * 8..index * 8 + 8]);
        u64::from_be_bytes(bytes)
    }

    // big-endian increment of the leading 32-byte seed
    fn increment_seed(&mut self) {
        for byte in self.data[..32].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }
}

//! An append-only Merkle accumulator that commits to a stream of item hashes.
//!
//! The accumulator keeps one partial per tree level. A non-zero partial at level `i` is the root
//! of a complete subtree holding `2^i` items, so the partials alone are enough to resume
//! accumulation or to compute the root.

use alloc::vec::Vec;
use alloy_primitives::{keccak256, B256};

/// Returns the number of partials an accumulator holding `size` items carries.
pub const fn calc_num_partials(size: u64) -> u64 {
    (u64::BITS - size.leading_zeros()) as u64
}

/// A streaming Merkle tree commitment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleAccumulator {
    size: u64,
    partials: Vec<B256>,
}

impl MerkleAccumulator {
    /// Creates an empty [MerkleAccumulator].
    pub const fn new() -> Self {
        Self { size: 0, partials: Vec::new() }
    }

    /// Rebuilds an accumulator from its partials. The size is recovered from the set of
    /// non-zero levels.
    pub fn from_partials(partials: &[B256]) -> Self {
        let size = partials
            .iter()
            .enumerate()
            .filter(|(_, partial)| !partial.is_zero())
            .fold(0u64, |size, (level, _)| size + (1 << level));
        Self { size, partials: partials.to_vec() }
    }

    /// Returns the number of items appended so far.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the partials, exactly [calc_num_partials] of them.
    pub fn partials(&self) -> Vec<B256> {
        let mut partials = self.partials.clone();
        partials.resize(calc_num_partials(self.size) as usize, B256::ZERO);
        partials
    }

    /// Appends an item hash, returning the new size.
    pub fn append(&mut self, item_hash: B256) -> u64 {
        let size_before = self.size;
        self.size += 1;

        let mut level = 0u64;
        let mut so_far = keccak256(item_hash);
        loop {
            if level == calc_num_partials(size_before) {
                self.set_partial(level, so_far);
                return self.size;
            }
            let this_level = self.partial(level);
            if this_level.is_zero() {
                self.set_partial(level, so_far);
                return self.size;
            }
            so_far = hash_pair(this_level, so_far);
            self.set_partial(level, B256::ZERO);
            level += 1;
        }
    }

    /// Computes the root. An empty accumulator has the zero root.
    pub fn root(&self) -> B256 {
        let mut hash_so_far: Option<B256> = None;
        let mut capacity_in_hash = 0u64;
        let mut capacity = 1u64;
        for level in 0..calc_num_partials(self.size) {
            let partial = self.partial(level);
            if !partial.is_zero() {
                hash_so_far = Some(match hash_so_far {
                    None => {
                        capacity_in_hash = capacity;
                        partial
                    }
                    Some(mut acc) => {
                        while capacity_in_hash < capacity {
                            acc = hash_pair(acc, B256::ZERO);
                            capacity_in_hash *= 2;
                        }
                        capacity_in_hash = 2 * capacity;
                        hash_pair(partial, acc)
                    }
                });
            }
            capacity *= 2;
        }
        hash_so_far.unwrap_or_default()
    }

    fn partial(&self, level: u64) -> B256 {
        self.partials.get(level as usize).copied().unwrap_or_default()
    }

    fn set_partial(&mut self, level: u64, value: B256) {
        let level = level as usize;
        if level >= self.partials.len() {
            self.partials.resize(level + 1, B256::ZERO);
        }
        self.partials[level] = value;
    }
}

fn hash_pair(left: B256, right: B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{collection::vec, prelude::*};

    fn leaf(n: u64) -> B256 {
        keccak256(n.to_be_bytes())
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(MerkleAccumulator::new().root(), B256::ZERO);
        assert!(MerkleAccumulator::new().partials().is_empty());
    }

    #[test]
    fn test_num_partials() {
        assert_eq!(calc_num_partials(0), 0);
        assert_eq!(calc_num_partials(1), 1);
        assert_eq!(calc_num_partials(2), 2);
        assert_eq!(calc_num_partials(3), 2);
        assert_eq!(calc_num_partials(4), 3);
        assert_eq!(calc_num_partials(1 << 20), 21);
    }

    #[test]
    fn test_single_item_root() {
        let mut acc = MerkleAccumulator::new();
        acc.append(leaf(0));
        assert_eq!(acc.root(), keccak256(leaf(0)));
    }

    #[test]
    fn test_two_item_root() {
        let mut acc = MerkleAccumulator::new();
        acc.append(leaf(0));
        acc.append(leaf(1));
        assert_eq!(acc.root(), hash_pair(keccak256(leaf(0)), keccak256(leaf(1))));
        assert_eq!(acc.partials(), vec![B256::ZERO, acc.root()]);
    }

    #[test]
    fn test_three_item_root_pads_the_lower_subtree() {
        let mut acc = MerkleAccumulator::new();
        (0..3).for_each(|i| {
            acc.append(leaf(i));
        });
        let top = hash_pair(keccak256(leaf(0)), keccak256(leaf(1)));
        let bottom = hash_pair(keccak256(leaf(2)), B256::ZERO);
        assert_eq!(acc.root(), hash_pair(top, bottom));
    }

    #[test]
    fn test_from_partials_recovers_size() {
        let mut acc = MerkleAccumulator::new();
        (0..11).for_each(|i| {
            acc.append(leaf(i));
        });
        let resumed = MerkleAccumulator::from_partials(&acc.partials());
        assert_eq!(resumed.size(), 11);
        assert_eq!(resumed.root(), acc.root());
    }

    proptest! {
        #[test]
        fn test_resume_matches_continuous(split in 0usize..64, total in 0usize..64) {
            let items: Vec<B256> = (0..total as u64).map(leaf).collect();
            let split = split.min(total);

            let mut continuous = MerkleAccumulator::new();
            items.iter().for_each(|h| { continuous.append(*h); });

            let mut head = MerkleAccumulator::new();
            items[..split].iter().for_each(|h| { head.append(*h); });
            let mut resumed = MerkleAccumulator::from_partials(&head.partials());
            items[split..].iter().for_each(|h| { resumed.append(*h); });

            prop_assert_eq!(resumed.size(), continuous.size());
            prop_assert_eq!(resumed.root(), continuous.root());
            prop_assert_eq!(resumed.partials(), continuous.partials());
        }

        #[test]
        fn test_roots_differ_per_prefix(hashes in vec(any::<[u8; 32]>(), 1..32)) {
            let mut acc = MerkleAccumulator::new();
            let mut roots = Vec::new();
            for h in hashes {
                acc.append(B256::from(h));
                roots.push(acc.root());
            }
            let mut deduped = roots.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), roots.len());
        }
    }
}

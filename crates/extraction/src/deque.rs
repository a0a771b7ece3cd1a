//! The window of delayed messages that have been seen but not yet read.

use crate::errors::{MelError, MelResult};
use alloy_primitives::B256;
use mel_primitives::DelayedInboxMessage;
use std::collections::VecDeque;

/// Bookkeeping for one seen delayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedMeta {
    /// Absolute delayed message index.
    pub index: u64,
    /// Whether a batch has consumed the message.
    pub read: bool,
    /// Root of the seen accumulator right after the message was appended.
    pub merkle_root: B256,
    /// The parent chain block whose state first observed the message.
    pub mel_state_parent_chain_block_num: u64,
}

/// An index-contiguous window of [DelayedMeta]s.
///
/// The window is never persisted. It is rebuilt from persisted states when a state is loaded and
/// travels with the live state from block to block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayedMetaDeque {
    entries: VecDeque<DelayedMeta>,
    init_message: Option<DelayedInboxMessage>,
}

impl DelayedMetaDeque {
    /// Creates an empty deque.
    pub const fn new() -> Self {
        Self { entries: VecDeque::new(), init_message: None }
    }

    /// Returns the number of tracked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the index of the first tracked entry.
    pub fn first_index(&self) -> Option<u64> {
        self.entries.front().map(|meta| meta.index)
    }

    /// Returns the index the next appended entry must carry, if anything is tracked.
    pub fn next_index(&self) -> Option<u64> {
        self.entries.back().map(|meta| meta.index + 1)
    }

    /// Appends an entry at the tail.
    pub fn add(&mut self, meta: DelayedMeta) -> MelResult<()> {
        if let Some(expected) = self.next_index() {
            if meta.index != expected {
                return Err(
                    MelError::NonContiguousDelayedMeta { expected, got: meta.index }.crit()
                );
            }
        }
        self.entries.push_back(meta);
        Ok(())
    }

    /// Looks up the entry for an absolute index.
    pub fn get(&self, index: u64) -> Option<&DelayedMeta> {
        let offset = index.checked_sub(self.first_index()?)?;
        self.entries.get(offset as usize)
    }

    /// Marks the entry for an absolute index as read. Returns false if it is not tracked.
    pub fn mark_read(&mut self, index: u64) -> bool {
        let Some(offset) = self.first_index().and_then(|first| index.checked_sub(first)) else {
            return false;
        };
        match self.entries.get_mut(offset as usize) {
            Some(meta) => {
                meta.read = true;
                true
            }
            None => false,
        }
    }

    /// Drops leading entries that are read and below `finalized_read_count`.
    pub fn trim_finalized(&mut self, finalized_read_count: u64) -> usize {
        let mut trimmed = 0;
        while let Some(front) = self.entries.front() {
            if !front.read || front.index >= finalized_read_count {
                break;
            }
            self.entries.pop_front();
            trimmed += 1;
        }
        trimmed
    }

    /// Rewinds the window to an older state. Entries at or beyond `seen_count` are dropped and
    /// entries at or beyond `read_count` become unread again.
    pub fn reorg(&mut self, seen_count: u64, read_count: u64) {
        while self.entries.back().is_some_and(|meta| meta.index >= seen_count) {
            self.entries.pop_back();
        }
        self.entries.iter_mut().filter(|meta| meta.index >= read_count).for_each(|meta| {
            meta.read = false;
        });
        if seen_count == 0 {
            self.init_message = None;
        }
    }

    /// Returns the chain initialization message, delayed message 0.
    pub const fn init_message(&self) -> Option<&DelayedInboxMessage> {
        self.init_message.as_ref()
    }

    /// Sets the chain initialization message.
    pub fn set_init_message(&mut self, message: DelayedInboxMessage) {
        self.init_message = Some(message);
    }

    /// Iterates over the tracked entries.
    pub fn iter(&self) -> impl Iterator<Item = &DelayedMeta> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn meta(index: u64) -> DelayedMeta {
        DelayedMeta {
            index,
            read: false,
            merkle_root: B256::with_last_byte(index as u8),
            mel_state_parent_chain_block_num: index / 2,
        }
    }

    fn filled(start: u64, end: u64) -> DelayedMetaDeque {
        let mut deque = DelayedMetaDeque::new();
        (start..end).for_each(|i| deque.add(meta(i)).unwrap());
        deque
    }

    #[test]
    fn test_add_rejects_gaps() {
        let mut deque = filled(3, 5);
        let err = deque.add(meta(6)).unwrap_err();
        assert_eq!(err, MelError::NonContiguousDelayedMeta { expected: 5, got: 6 }.crit());
        assert_eq!(deque.len(), 2);
    }

    #[test]
    fn test_get_by_absolute_index() {
        let deque = filled(10, 15);
        assert!(deque.get(9).is_none());
        assert_eq!(deque.get(10).unwrap().index, 10);
        assert_eq!(deque.get(14).unwrap().index, 14);
        assert!(deque.get(15).is_none());
        assert!(DelayedMetaDeque::new().get(0).is_none());
    }

    #[test]
    fn test_trim_stops_at_unread_or_unfinalized() {
        let mut deque = filled(0, 6);
        (0..4).for_each(|i| assert!(deque.mark_read(i)));
        assert_eq!(deque.trim_finalized(2), 2);
        assert_eq!(deque.first_index(), Some(2));
        assert_eq!(deque.trim_finalized(10), 2);
        assert_eq!(deque.first_index(), Some(4));
        assert_eq!(deque.trim_finalized(10), 0);
    }

    #[test]
    fn test_reorg_trims_and_clears_read() {
        let mut deque = filled(5, 25);
        (5..15).for_each(|i| {
            deque.mark_read(i);
        });
        deque.reorg(20, 12);
        assert_eq!(deque.len(), 15);
        assert_eq!(deque.next_index(), Some(20));
        assert!(deque.get(11).unwrap().read);
        assert!(!deque.get(12).unwrap().read);
        assert!(!deque.get(14).unwrap().read);
    }

    #[test]
    fn test_reorg_to_genesis_drops_init_message() {
        let mut deque = filled(0, 1);
        deque.set_init_message(DelayedInboxMessage::default());
        deque.reorg(0, 0);
        assert!(deque.is_empty());
        assert!(deque.init_message().is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add,
        Read(u64),
        Trim(u64),
        Rewind(u64, u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Add),
            2 => (0u64..64).prop_map(Op::Read),
            1 => (0u64..64).prop_map(Op::Trim),
            1 => (0u64..64, 0u64..64).prop_map(|(a, b)| Op::Rewind(a.max(b), a.min(b))),
        ]
    }

    proptest! {
        #[test]
        fn test_contiguity_holds(start in 0u64..16, ops in proptest::collection::vec(op(), 0..128)) {
            let mut deque = DelayedMetaDeque::new();
            let mut next = start;
            for op in ops {
                match op {
                    Op::Add => {
                        deque.add(meta(next)).unwrap();
                        next += 1;
                    }
                    Op::Read(i) => {
                        deque.mark_read(i);
                    }
                    Op::Trim(i) => {
                        deque.trim_finalized(i);
                    }
                    Op::Rewind(seen, read) => {
                        deque.reorg(seen, read);
                        next = match deque.next_index() {
                            Some(n) => n,
                            None => next.min(seen.max(start)),
                        };
                    }
                }

                let indices: Vec<u64> = deque.iter().map(|m| m.index).collect();
                for pair in indices.windows(2) {
                    prop_assert_eq!(pair[0] + 1, pair[1]);
                }
                for index in &indices {
                    prop_assert_eq!(deque.get(*index).map(|m| m.index), Some(*index));
                }
            }
        }
    }
}

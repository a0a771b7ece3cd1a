//! The persistable snapshot of extraction progress.

use crate::{
    deque::{DelayedMeta, DelayedMetaDeque},
    errors::{MelError, MelErrorKind, MelResult},
    traits::StateDatabase,
};
use alloy_primitives::{keccak256, Address, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use mel_primitives::{DelayedInboxMessage, MerkleAccumulator, MessageWithMetadata};

/// The current schema version of a persisted [MelState].
pub const MEL_STATE_VERSION: u16 = 0;

/// Extraction progress as of one parent chain block.
///
/// Only the public fields are persisted. The delayed meta deque and the cached accumulators are
/// working state of the live extraction and are rebuilt when a state is loaded.
///
/// Cloning carries the persisted fields and the deque but resets the cached accumulators, which
/// the clone rebuilds from the persisted partials on first use. Equality ignores the caches.
#[derive(Debug, Default, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MelState {
    /// Schema version.
    pub version: u16,
    /// Chain id of the parent chain.
    pub parent_chain_id: u64,
    /// Number of the parent chain block this state was built from.
    pub parent_chain_block_number: u64,
    /// Hash of the parent chain block this state was built from.
    pub parent_chain_block_hash: B256,
    /// Parent hash of that block.
    pub parent_chain_previous_block_hash: B256,
    /// The sequencer inbox, watched for batches.
    pub batch_posting_target_address: Address,
    /// The delayed inbox, watched for bridge messages.
    pub delayed_message_posting_target_address: Address,
    /// Root of the message accumulator.
    pub message_accumulator: B256,
    /// Root of the seen delayed message accumulator.
    pub delayed_message_accumulator: B256,
    /// Number of extracted messages.
    pub msg_count: u64,
    /// Number of processed batches.
    pub batch_count: u64,
    /// Number of delayed messages consumed by batches.
    pub delayed_messages_read: u64,
    /// Number of delayed messages observed.
    pub delayed_messages_seen: u64,
    /// Partials of the message accumulator at `msg_count`.
    pub message_merkle_partials: Vec<B256>,
    /// Partials of the seen delayed message accumulator at `delayed_messages_seen`.
    pub delayed_message_merkle_partials: Vec<B256>,

    #[cfg_attr(feature = "serde", serde(skip))]
    seen_unread_delayed_meta_deque: DelayedMetaDeque,
    #[cfg_attr(feature = "serde", serde(skip))]
    read_delayed_msgs_acc: Option<MerkleAccumulator>,
    #[cfg_attr(feature = "serde", serde(skip))]
    seen_delayed_msgs_acc: Option<MerkleAccumulator>,
    #[cfg_attr(feature = "serde", serde(skip))]
    msgs_acc: Option<MerkleAccumulator>,
}

impl Clone for MelState {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            parent_chain_id: self.parent_chain_id,
            parent_chain_block_number: self.parent_chain_block_number,
            parent_chain_block_hash: self.parent_chain_block_hash,
            parent_chain_previous_block_hash: self.parent_chain_previous_block_hash,
            batch_posting_target_address: self.batch_posting_target_address,
            delayed_message_posting_target_address: self.delayed_message_posting_target_address,
            message_accumulator: self.message_accumulator,
            delayed_message_accumulator: self.delayed_message_accumulator,
            msg_count: self.msg_count,
            batch_count: self.batch_count,
            delayed_messages_read: self.delayed_messages_read,
            delayed_messages_seen: self.delayed_messages_seen,
            message_merkle_partials: self.message_merkle_partials.clone(),
            delayed_message_merkle_partials: self.delayed_message_merkle_partials.clone(),
            seen_unread_delayed_meta_deque: self.seen_unread_delayed_meta_deque.clone(),
            read_delayed_msgs_acc: None,
            seen_delayed_msgs_acc: None,
            msgs_acc: None,
        }
    }
}

impl PartialEq for MelState {
    fn eq(&self, other: &Self) -> bool {
        alloy_rlp::encode(self) == alloy_rlp::encode(other)
            && self.seen_unread_delayed_meta_deque == other.seen_unread_delayed_meta_deque
    }
}

impl MelState {
    /// Creates the state a chain starts extraction from.
    pub fn new(
        parent_chain_id: u64,
        parent_chain_block_number: u64,
        parent_chain_block_hash: B256,
        batch_posting_target_address: Address,
        delayed_message_posting_target_address: Address,
    ) -> Self {
        Self {
            version: MEL_STATE_VERSION,
            parent_chain_id,
            parent_chain_block_number,
            parent_chain_block_hash,
            batch_posting_target_address,
            delayed_message_posting_target_address,
            ..Default::default()
        }
    }

    /// Returns the hash of the persisted fields.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Returns the seen but unread delayed meta deque.
    pub const fn seen_unread_delayed_meta_deque(&self) -> &DelayedMetaDeque {
        &self.seen_unread_delayed_meta_deque
    }

    /// Returns the seen but unread delayed meta deque mutably.
    pub fn seen_unread_delayed_meta_deque_mut(&mut self) -> &mut DelayedMetaDeque {
        &mut self.seen_unread_delayed_meta_deque
    }

    /// Replaces the seen but unread delayed meta deque.
    pub fn set_seen_unread_delayed_meta_deque(&mut self, deque: DelayedMetaDeque) {
        self.seen_unread_delayed_meta_deque = deque;
        self.read_delayed_msgs_acc = None;
    }

    /// Appends a newly seen delayed message to the seen accumulator and the deque.
    pub fn accumulate_delayed_message(&mut self, message: &DelayedInboxMessage) -> MelResult<()> {
        let partials = &self.delayed_message_merkle_partials;
        let acc = self
            .seen_delayed_msgs_acc
            .get_or_insert_with(|| MerkleAccumulator::from_partials(partials));
        acc.append(message.hash());
        let merkle_root = acc.root();

        let index = self.delayed_messages_seen;
        if index == 0 {
            self.seen_unread_delayed_meta_deque.set_init_message(message.clone());
        }
        self.seen_unread_delayed_meta_deque.add(DelayedMeta {
            index,
            read: false,
            merkle_root,
            mel_state_parent_chain_block_num: self.parent_chain_block_number,
        })?;
        self.delayed_messages_seen += 1;
        Ok(())
    }

    /// Appends an extracted message to the message accumulator.
    pub fn accumulate_message(&mut self, message: &MessageWithMetadata) {
        let partials = &self.message_merkle_partials;
        let acc = self.msgs_acc.get_or_insert_with(|| MerkleAccumulator::from_partials(partials));
        acc.append(message.hash());
        self.msg_count += 1;
    }

    /// Writes the seen delayed accumulator back into the persisted partials and root.
    pub fn generate_delayed_message_merkle_partials_and_root(&mut self) {
        if let Some(acc) = &self.seen_delayed_msgs_acc {
            self.delayed_message_merkle_partials = acc.partials();
            self.delayed_message_accumulator = acc.root();
        }
    }

    /// Writes the message accumulator back into the persisted partials and root.
    pub fn generate_message_merkle_partials_and_root(&mut self) {
        if let Some(acc) = &self.msgs_acc {
            self.message_merkle_partials = acc.partials();
            self.message_accumulator = acc.root();
        }
    }

    /// Verifies that `message` is the delayed message committed at `index` as of the block that
    /// observed it.
    ///
    /// The accumulator is rebuilt from the state one block before the observing block and
    /// replayed up to `index`. The rebuilt accumulator is kept so that reading `index + 1` next
    /// only appends one more hash.
    pub async fn check_against_accumulator<D>(
        &mut self,
        db: &D,
        index: u64,
        message: &DelayedInboxMessage,
    ) -> MelResult<()>
    where
        D: StateDatabase + ?Sized,
    {
        let meta = *self
            .seen_unread_delayed_meta_deque
            .get(index)
            .ok_or(MelError::MissingDelayedMeta(index).crit())?;

        let mut acc = match self.read_delayed_msgs_acc.take() {
            Some(cached) if cached.size() == index => cached,
            _ => self.rebuild_read_accumulator(db, &meta).await?,
        };
        acc.append(message.hash());
        if acc.root() != meta.merkle_root {
            return Err(MelError::AccumulatorMismatch(index).crit());
        }
        self.read_delayed_msgs_acc = Some(acc);
        Ok(())
    }

    async fn rebuild_read_accumulator<D>(
        &self,
        db: &D,
        meta: &DelayedMeta,
    ) -> MelResult<MerkleAccumulator>
    where
        D: StateDatabase + ?Sized,
    {
        let observed_at = meta.mel_state_parent_chain_block_num;
        let mut acc = match observed_at.checked_sub(1) {
            Some(number) => {
                let base = db
                    .state(number)
                    .await
                    .map_err(Into::<MelErrorKind>::into)?
                    .ok_or(MelError::MissingState(number).crit())?;
                MerkleAccumulator::from_partials(&base.delayed_message_merkle_partials)
            }
            None => MerkleAccumulator::new(),
        };
        for i in acc.size()..meta.index {
            let replayed = self.replay_delayed_message(db, i).await?;
            acc.append(replayed.hash());
        }
        debug!(
            target: "mel-extraction",
            "Rebuilt read accumulator for delayed message {} from block {}",
            meta.index,
            observed_at
        );
        Ok(acc)
    }

    async fn replay_delayed_message<D>(&self, db: &D, index: u64) -> MelResult<DelayedInboxMessage>
    where
        D: StateDatabase + ?Sized,
    {
        if index == 0 {
            if let Some(init) = self.seen_unread_delayed_meta_deque.init_message() {
                return Ok(init.clone());
            }
        }
        db.delayed_message(index)
            .await
            .map_err(Into::<MelErrorKind>::into)?
            .ok_or(MelError::MissingDelayedMessage(index).crit())
    }

    /// Marks a delayed message as consumed.
    pub fn read_delayed_message(&mut self, index: u64) {
        if !self.seen_unread_delayed_meta_deque.mark_read(index) {
            trace!(target: "mel-extraction", "Delayed message {} is not tracked by the deque", index);
        }
        self.delayed_messages_read = self.delayed_messages_read.max(index + 1);
    }

    /// Moves the live deque into `previous`, rewinding it to that state's counters.
    pub fn reorg_to(&mut self, previous: &mut Self) {
        let mut deque = core::mem::take(&mut self.seen_unread_delayed_meta_deque);
        deque.reorg(previous.delayed_messages_seen, previous.delayed_messages_read);
        previous.set_seen_unread_delayed_meta_deque(deque);
        previous.seen_delayed_msgs_acc = None;
        previous.msgs_acc = None;
    }

    fn fields_len(&self) -> usize {
        self.version.length()
            + self.parent_chain_id.length()
            + self.parent_chain_block_number.length()
            + self.parent_chain_block_hash.length()
            + self.parent_chain_previous_block_hash.length()
            + self.batch_posting_target_address.length()
            + self.delayed_message_posting_target_address.length()
            + self.message_accumulator.length()
            + self.delayed_message_accumulator.length()
            + self.msg_count.length()
            + self.batch_count.length()
            + self.delayed_messages_read.length()
            + self.delayed_messages_seen.length()
            + self.message_merkle_partials.length()
            + self.delayed_message_merkle_partials.length()
    }
}

impl Encodable for MelState {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.version.encode(out);
        self.parent_chain_id.encode(out);
        self.parent_chain_block_number.encode(out);
        self.parent_chain_block_hash.encode(out);
        self.parent_chain_previous_block_hash.encode(out);
        self.batch_posting_target_address.encode(out);
        self.delayed_message_posting_target_address.encode(out);
        self.message_accumulator.encode(out);
        self.delayed_message_accumulator.encode(out);
        self.msg_count.encode(out);
        self.batch_count.encode(out);
        self.delayed_messages_read.encode(out);
        self.delayed_messages_seen.encode(out);
        self.message_merkle_partials.encode(out);
        self.delayed_message_merkle_partials.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for MelState {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started = buf.len();
        let this = Self {
            version: Decodable::decode(buf)?,
            parent_chain_id: Decodable::decode(buf)?,
            parent_chain_block_number: Decodable::decode(buf)?,
            parent_chain_block_hash: Decodable::decode(buf)?,
            parent_chain_previous_block_hash: Decodable::decode(buf)?,
            batch_posting_target_address: Decodable::decode(buf)?,
            delayed_message_posting_target_address: Decodable::decode(buf)?,
            message_accumulator: Decodable::decode(buf)?,
            delayed_message_accumulator: Decodable::decode(buf)?,
            msg_count: Decodable::decode(buf)?,
            batch_count: Decodable::decode(buf)?,
            delayed_messages_read: Decodable::decode(buf)?,
            delayed_messages_seen: Decodable::decode(buf)?,
            message_merkle_partials: Decodable::decode(buf)?,
            delayed_message_merkle_partials: Decodable::decode(buf)?,
            ..Default::default()
        };
        let consumed = started - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{delayed_message, TestStateDatabase};
    use mel_primitives::L1IncomingMessage;

    #[test]
    fn test_decode_drops_working_state() {
        let mut state = MelState::new(1, 10, B256::repeat_byte(1), Address::ZERO, Address::ZERO);
        state.accumulate_delayed_message(&delayed_message(0)).unwrap();
        state.generate_delayed_message_merkle_partials_and_root();

        let encoded = alloy_rlp::encode(&state);
        let decoded = MelState::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.hash(), state.hash());
        assert_eq!(decoded.delayed_messages_seen, 1);
        assert!(decoded.seen_unread_delayed_meta_deque().is_empty());
        assert!(decoded.seen_unread_delayed_meta_deque().init_message().is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut state = MelState::default();
        state.accumulate_delayed_message(&delayed_message(0)).unwrap();
        let mut cloned = state.clone();
        cloned.accumulate_delayed_message(&delayed_message(1)).unwrap();
        cloned.generate_delayed_message_merkle_partials_and_root();

        assert_eq!(state.delayed_messages_seen, 1);
        assert_eq!(state.seen_unread_delayed_meta_deque().len(), 1);
        assert!(state.delayed_message_merkle_partials.is_empty());
        assert_eq!(cloned.seen_unread_delayed_meta_deque().len(), 2);
    }

    #[test]
    fn test_clone_resets_cached_accumulators() {
        let mut state = MelState::default();
        for i in 0..3 {
            state.accumulate_delayed_message(&delayed_message(i)).unwrap();
        }
        state.generate_delayed_message_merkle_partials_and_root();
        assert!(state.seen_delayed_msgs_acc.is_some());

        let mut cloned = state.clone();
        assert!(cloned.seen_delayed_msgs_acc.is_none());
        assert!(cloned.read_delayed_msgs_acc.is_none());
        assert!(cloned.msgs_acc.is_none());
        assert_eq!(cloned, state);
        assert_eq!(cloned.seen_unread_delayed_meta_deque().init_message(), Some(&delayed_message(0)));

        // The clone resumes from the persisted partials.
        state.accumulate_delayed_message(&delayed_message(3)).unwrap();
        state.generate_delayed_message_merkle_partials_and_root();
        cloned.accumulate_delayed_message(&delayed_message(3)).unwrap();
        cloned.generate_delayed_message_merkle_partials_and_root();
        assert_eq!(cloned.delayed_message_accumulator, state.delayed_message_accumulator);
        assert_eq!(cloned, state);
    }

    #[test]
    fn test_accumulating_resumes_from_partials() {
        let mut continuous = MelState::default();
        for i in 0..5 {
            continuous.accumulate_delayed_message(&delayed_message(i)).unwrap();
        }
        continuous.generate_delayed_message_merkle_partials_and_root();

        let mut first = MelState::default();
        for i in 0..3 {
            first.accumulate_delayed_message(&delayed_message(i)).unwrap();
        }
        first.generate_delayed_message_merkle_partials_and_root();
        let encoded = alloy_rlp::encode(&first);
        let mut resumed = MelState::decode(&mut encoded.as_slice()).unwrap();
        for i in 3..5 {
            resumed.accumulate_delayed_message(&delayed_message(i)).unwrap();
        }
        resumed.generate_delayed_message_merkle_partials_and_root();

        assert_eq!(resumed.delayed_message_accumulator, continuous.delayed_message_accumulator);
        assert_eq!(resumed.delayed_message_merkle_partials, continuous.delayed_message_merkle_partials);
    }

    #[test]
    fn test_message_accumulator() {
        let mut state = MelState::default();
        let message =
            MessageWithMetadata { message: L1IncomingMessage::invalid(), delayed_messages_read: 0 };
        state.accumulate_message(&message);
        state.accumulate_message(&message);
        state.generate_message_merkle_partials_and_root();

        let mut acc = MerkleAccumulator::new();
        acc.append(message.hash());
        acc.append(message.hash());
        assert_eq!(state.msg_count, 2);
        assert_eq!(state.message_accumulator, acc.root());
        assert_eq!(state.message_merkle_partials, acc.partials());
    }

    #[tokio::test]
    async fn test_check_against_accumulator() {
        let mut db = TestStateDatabase::default();
        let genesis = MelState::new(1, 1, B256::repeat_byte(1), Address::ZERO, Address::ZERO);
        db.insert_state(genesis.clone());

        let mut state = genesis.clone();
        state.parent_chain_block_number = 2;
        let messages: Vec<_> = (0..5).map(delayed_message).collect();
        for message in &messages {
            state.accumulate_delayed_message(message).unwrap();
        }
        state.generate_delayed_message_merkle_partials_and_root();
        messages.iter().enumerate().for_each(|(i, m)| db.insert_delayed(i as u64, m.clone()));

        for (i, message) in messages.iter().enumerate().skip(1) {
            state.check_against_accumulator(&db, i as u64, message).await.unwrap();
        }
        // Out of order reads rebuild the accumulator.
        state.check_against_accumulator(&db, 2, &messages[2]).await.unwrap();

        let mut corrupt = messages[3].clone();
        corrupt.message.l2_msg = b"corrupt".into();
        let err = state.check_against_accumulator(&db, 3, &corrupt).await.unwrap_err();
        assert_eq!(err, MelError::AccumulatorMismatch(3).crit());
    }

    #[tokio::test]
    async fn test_check_requires_base_state() {
        let db = TestStateDatabase::default();
        let mut state = MelState::default();
        state.parent_chain_block_number = 4;
        state.accumulate_delayed_message(&delayed_message(0)).unwrap();
        state.accumulate_delayed_message(&delayed_message(1)).unwrap();
        let err = state.check_against_accumulator(&db, 1, &delayed_message(1)).await.unwrap_err();
        assert_eq!(err, MelError::MissingState(3).crit());
    }

    #[test]
    fn test_reorg_to_rewinds_deque() {
        let mut previous = MelState::default();
        previous.delayed_messages_seen = 2;
        previous.delayed_messages_read = 1;

        let mut dirty = MelState::default();
        for i in 0..4 {
            dirty.accumulate_delayed_message(&delayed_message(i)).unwrap();
        }
        dirty.read_delayed_message(0);
        dirty.read_delayed_message(1);

        dirty.reorg_to(&mut previous);
        let deque = previous.seen_unread_delayed_meta_deque();
        assert_eq!(deque.len(), 2);
        assert!(deque.get(0).unwrap().read);
        assert!(!deque.get(1).unwrap().read);
        assert!(dirty.seen_unread_delayed_meta_deque().is_empty());
    }
}

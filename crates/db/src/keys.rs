//! The key schema.

/// Prefix of [mel_extraction::state::MelState]s, keyed by parent chain block number.
pub const MEL_STATE_PREFIX: &[u8] = b"l";

/// Prefix of delayed messages, keyed by index.
pub const MEL_DELAYED_MESSAGE_PREFIX: &[u8] = b"y";

/// Prefix of batch metadata, keyed by sequence number.
pub const MEL_SEQUENCER_BATCH_META_PREFIX: &[u8] = b"s";

/// Key of the head state's parent chain block number.
pub const HEAD_MEL_STATE_BLOCK_NUM_KEY: &[u8] = b"_headMelStateBlockNum";

/// Appends the big endian `number` to `prefix`.
pub fn db_key(prefix: &[u8], number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

/// Returns the key of the state built from block `block_number`.
pub fn state_key(block_number: u64) -> Vec<u8> {
    db_key(MEL_STATE_PREFIX, block_number)
}

/// Returns the key of delayed message `index`.
pub fn delayed_message_key(index: u64) -> Vec<u8> {
    db_key(MEL_DELAYED_MESSAGE_PREFIX, index)
}

/// Returns the key of the metadata of batch `seq`.
pub fn batch_metadata_key(seq: u64) -> Vec<u8> {
    db_key(MEL_SEQUENCER_BATCH_META_PREFIX, seq)
}

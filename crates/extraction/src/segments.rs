//! Walks the segments of a sequencer message and emits the messages they encode.

use crate::{
    errors::{MelError, MelErrorKind, MelResult},
    sequencer::{decompress_brotli, SequencerMessage},
    state::MelState,
    traits::DelayedMessageDatabase,
};
use alloy_primitives::U256;
use alloy_rlp::Decodable;
use mel_primitives::{
    L1IncomingMessage, L1IncomingMessageHeader, L1MessageKind, MessageWithMetadata,
    BATCH_POSTER_ADDRESS, MAX_L2_MESSAGE_SIZE,
};

/// The kind byte that starts every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentKind {
    /// A raw L2 message.
    L2Message = 0,
    /// A brotli compressed L2 message.
    L2MessageBrotli = 1,
    /// Consume the next delayed message.
    DelayedMessages = 2,
    /// Advance the timestamp by an RLP encoded delta.
    AdvanceTimestamp = 3,
    /// Advance the parent chain block number by an RLP encoded delta.
    AdvanceL1BlockNumber = 4,
}

impl TryFrom<u8> for SegmentKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::L2Message),
            1 => Ok(Self::L2MessageBrotli),
            2 => Ok(Self::DelayedMessages),
            3 => Ok(Self::AdvanceTimestamp),
            4 => Ok(Self::AdvanceL1BlockNumber),
            other => Err(other),
        }
    }
}

/// Extracts the messages of one sequencer message.
///
/// Delayed messages consumed along the way are read through `db` and marked read on `state`.
pub async fn messages_from_batch_segments<D>(
    state: &mut MelState,
    seq_msg: &SequencerMessage,
    db: &D,
) -> MelResult<Vec<MessageWithMetadata>>
where
    D: DelayedMessageDatabase + ?Sized,
{
    let mut cursor = SegmentCursor::default();
    let mut messages = Vec::new();
    while let Some(message) = cursor.next_message(state, seq_msg, db).await? {
        messages.push(message);
        if is_last_segment(seq_msg, cursor.segment, state.delayed_messages_read) {
            break;
        }
        cursor.segment += 1;
    }
    Ok(messages)
}

/// Returns true once nothing after `segment` can produce another message.
pub fn is_last_segment(seq_msg: &SequencerMessage, segment: usize, delayed_read: u64) -> bool {
    if delayed_read < seq_msg.after_delayed_messages {
        return false;
    }
    seq_msg.segments.iter().skip(segment + 1).filter(|s| !s.is_empty()).all(|s| {
        matches!(
            SegmentKind::try_from(s[0]),
            Ok(SegmentKind::AdvanceTimestamp | SegmentKind::AdvanceL1BlockNumber)
        )
    })
}

#[derive(Debug, Default)]
struct SegmentCursor {
    segment: usize,
    timestamp: u64,
    block_number: u64,
}

impl SegmentCursor {
    async fn next_message<D>(
        &mut self,
        state: &mut MelState,
        seq_msg: &SequencerMessage,
        db: &D,
    ) -> MelResult<Option<MessageWithMetadata>>
    where
        D: DelayedMessageDatabase + ?Sized,
    {
        while let Some(segment) = seq_msg.segments.get(self.segment) {
            let Some((&kind, body)) = segment.split_first() else {
                self.segment += 1;
                continue;
            };
            let kind = SegmentKind::try_from(kind).map_err(|kind| {
                MelError::MalformedSegment {
                    index: self.segment,
                    reason: format!("unknown segment kind {kind}"),
                }
                .crit()
            })?;
            match kind {
                SegmentKind::AdvanceTimestamp | SegmentKind::AdvanceL1BlockNumber => {
                    match decode_advance(body) {
                        Ok(delta) if kind == SegmentKind::AdvanceTimestamp => {
                            self.timestamp = self.timestamp.wrapping_add(delta);
                        }
                        Ok(delta) => self.block_number = self.block_number.wrapping_add(delta),
                        Err(e) => {
                            warn!(
                                target: "mel-extraction",
                                "Error decoding advance segment {}: {}",
                                self.segment,
                                e
                            );
                        }
                    }
                    self.segment += 1;
                }
                SegmentKind::L2Message | SegmentKind::L2MessageBrotli => {
                    let l2_msg = if kind == SegmentKind::L2MessageBrotli {
                        decompress_brotli(body, MAX_L2_MESSAGE_SIZE).map_err(|e| {
                            MelError::MalformedSegment { index: self.segment, reason: e.to_string() }
                                .crit()
                        })?
                    } else {
                        body.to_vec()
                    };
                    let header = L1IncomingMessageHeader {
                        kind: L1MessageKind::L2Message,
                        poster: BATCH_POSTER_ADDRESS,
                        block_number: clamp(
                            self.block_number,
                            seq_msg.min_l1_block,
                            seq_msg.max_l1_block,
                        ),
                        timestamp: clamp(
                            self.timestamp,
                            seq_msg.min_timestamp,
                            seq_msg.max_timestamp,
                        ),
                        request_id: None,
                        l1_base_fee: Some(U256::ZERO),
                    };
                    return Ok(Some(MessageWithMetadata {
                        message: L1IncomingMessage {
                            header,
                            l2_msg: l2_msg.into(),
                            ..Default::default()
                        },
                        delayed_messages_read: state.delayed_messages_read,
                    }));
                }
                SegmentKind::DelayedMessages => {
                    if state.delayed_messages_read >= seq_msg.after_delayed_messages {
                        return Ok(Some(MessageWithMetadata {
                            message: L1IncomingMessage::invalid(),
                            delayed_messages_read: seq_msg.after_delayed_messages,
                        }));
                    }
                    return read_delayed(state, db).await.map(Some);
                }
            }
        }

        if state.delayed_messages_read < seq_msg.after_delayed_messages {
            return read_delayed(state, db).await.map(Some);
        }
        Ok(None)
    }
}

async fn read_delayed<D>(state: &mut MelState, db: &D) -> MelResult<MessageWithMetadata>
where
    D: DelayedMessageDatabase + ?Sized,
{
    let index = state.delayed_messages_read;
    let delayed = db
        .read_delayed_message(state, index)
        .await
        .map_err(Into::<MelErrorKind>::into)?
        .ok_or(MelError::MissingDelayedMessage(index).crit())?;
    state.read_delayed_message(index);
    Ok(MessageWithMetadata {
        message: delayed.message,
        delayed_messages_read: state.delayed_messages_read,
    })
}

fn decode_advance(mut body: &[u8]) -> Result<u64, alloy_rlp::Error> {
    let delta = u64::decode(&mut body)?;
    if !body.is_empty() {
        return Err(alloy_rlp::Error::Custom("trailing bytes after advance"));
    }
    Ok(delta)
}

const fn clamp(value: u64, min: u64, max: u64) -> u64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compress_brotli, trace_layer, TestDelayedMessageDatabase};
    use alloy_primitives::Bytes;
    use mel_primitives::DelayedInboxMessage;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    fn segment(kind: SegmentKind, body: &[u8]) -> Bytes {
        let mut out = vec![kind as u8];
        out.extend_from_slice(body);
        out.into()
    }

    fn advance(kind: SegmentKind, delta: u64) -> Bytes {
        segment(kind, &alloy_rlp::encode(delta))
    }

    fn brotli(data: &[u8]) -> Bytes {
        segment(SegmentKind::L2MessageBrotli, &compress_brotli(data))
    }

    fn with_bounds(segments: Vec<Bytes>, min_ts: u64, max_ts: u64) -> SequencerMessage {
        SequencerMessage {
            min_timestamp: min_ts,
            max_timestamp: max_ts,
            max_l1_block: 1_000_000,
            segments,
            ..Default::default()
        }
    }

    fn with_delayed(after_delayed_messages: u64, segments: Vec<Bytes>) -> SequencerMessage {
        SequencerMessage { after_delayed_messages, segments, ..Default::default() }
    }

    fn delayed_payload(data: &'static [u8]) -> DelayedInboxMessage {
        DelayedInboxMessage {
            message: L1IncomingMessage { l2_msg: Bytes::from_static(data), ..Default::default() },
            ..Default::default()
        }
    }

    async fn walk(
        state: &mut MelState,
        seq_msg: &SequencerMessage,
        db: &TestDelayedMessageDatabase,
    ) -> MelResult<Vec<MessageWithMetadata>> {
        messages_from_batch_segments(state, seq_msg, db).await
    }

    #[tokio::test]
    async fn test_timestamp_clamped_to_min() {
        let seq_msg = with_bounds(
            vec![
                advance(SegmentKind::AdvanceTimestamp, 7),
                advance(SegmentKind::AdvanceTimestamp, 3),
                brotli(b"foobar"),
            ],
            10,
            20,
        );
        let msgs = walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message.l2_msg, Bytes::from_static(b"foobar"));
        assert_eq!(msgs[0].message.header.timestamp, 10);
        assert_eq!(msgs[0].message.header.kind, L1MessageKind::L2Message);
        assert_eq!(msgs[0].message.header.poster, BATCH_POSTER_ADDRESS);
    }

    #[tokio::test]
    async fn test_clamp_does_not_feed_back() {
        let seq_msg = with_bounds(
            vec![
                advance(SegmentKind::AdvanceTimestamp, 7),
                brotli(b"foobar"),
                advance(SegmentKind::AdvanceTimestamp, 3),
                brotli(b"foobar"),
            ],
            10,
            20,
        );
        let msgs = walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message.header.timestamp, 10);
        assert_eq!(msgs[1].message.header.timestamp, 10);
    }

    #[tokio::test]
    async fn test_advances() {
        let seq_msg = with_bounds(
            vec![
                advance(SegmentKind::AdvanceTimestamp, 50),
                advance(SegmentKind::AdvanceL1BlockNumber, 20),
                segment(SegmentKind::L2Message, b"raw"),
            ],
            0,
            1_000_000,
        );
        let msgs = walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message.l2_msg, Bytes::from_static(b"raw"));
        assert_eq!(msgs[0].message.header.timestamp, 50);
        assert_eq!(msgs[0].message.header.block_number, 20);
    }

    #[tokio::test]
    async fn test_bad_advance_is_skipped() {
        let (layer, storage) = trace_layer();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::Registry::default().with(layer));
        let seq_msg = with_bounds(
            vec![
                segment(SegmentKind::AdvanceTimestamp, &50u64.to_be_bytes()),
                brotli(b"foobar"),
            ],
            0,
            1_000_000,
        );
        let msgs = walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message.l2_msg, Bytes::from_static(b"foobar"));
        assert_eq!(msgs[0].message.header.timestamp, 0);
        assert_eq!(storage.get_by_level(Level::WARN).len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_delayed_messages() {
        let mut db = TestDelayedMessageDatabase::default();
        db.insert(0, delayed_payload(b"foobar"));
        db.insert(1, delayed_payload(b"barfoo"));
        let mut state = MelState::default();
        let msgs = walk(&mut state, &with_delayed(2, vec![]), &db).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message.l2_msg, Bytes::from_static(b"foobar"));
        assert_eq!(msgs[0].delayed_messages_read, 1);
        assert_eq!(msgs[1].message.l2_msg, Bytes::from_static(b"barfoo"));
        assert_eq!(msgs[1].delayed_messages_read, 2);
        assert_eq!(state.delayed_messages_read, 2);
    }

    #[tokio::test]
    async fn test_delayed_segment_beyond_declared_count() {
        let mut state = MelState::default();
        state.delayed_messages_read = 1;
        let seq_msg = with_delayed(1, vec![segment(SegmentKind::DelayedMessages, &[])]);
        let msgs = walk(&mut state, &seq_msg, &Default::default()).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message, L1IncomingMessage::invalid());
    }

    #[tokio::test]
    async fn test_delayed_segment_reads() {
        let mut db = TestDelayedMessageDatabase::default();
        db.insert(0, delayed_payload(b"foobar"));
        let mut state = MelState::default();
        let seq_msg = with_delayed(1, vec![segment(SegmentKind::DelayedMessages, &[])]);
        let msgs = walk(&mut state, &seq_msg, &db).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message.l2_msg, Bytes::from_static(b"foobar"));
        assert_eq!(state.delayed_messages_read, 1);
    }

    #[tokio::test]
    async fn test_database_error_propagates() {
        let db = TestDelayedMessageDatabase::failing("oops");
        let seq_msg = with_delayed(1, vec![Bytes::new()]);
        let err = walk(&mut MelState::default(), &seq_msg, &db).await.unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[tokio::test]
    async fn test_missing_delayed_message() {
        let seq_msg = with_delayed(1, vec![Bytes::new()]);
        let err =
            walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap_err();
        assert_eq!(err, MelError::MissingDelayedMessage(0).crit());
        assert!(err.to_string().contains("no more delayed messages in db"));
    }

    #[tokio::test]
    async fn test_exhausted_batch_reads_nothing() {
        let db = TestDelayedMessageDatabase::failing("must not be called");
        let mut state = MelState::default();
        state.delayed_messages_read = 1;
        let seq_msg = with_delayed(1, vec![Bytes::new(), Bytes::new()]);
        assert!(is_last_segment(&seq_msg, 0, 1));
        let msgs = walk(&mut state, &seq_msg, &db).await.unwrap();
        assert!(msgs.is_empty());
        assert_eq!(state.delayed_messages_read, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_malformed() {
        let seq_msg = with_delayed(0, vec![Bytes::from_static(&[9, 1, 2])]);
        let err =
            walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap_err();
        assert!(matches!(
            err,
            MelErrorKind::Critical(MelError::MalformedSegment { index: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_brotli_is_malformed() {
        let seq_msg = with_delayed(
            0,
            vec![segment(SegmentKind::L2Message, b"ok"), segment(SegmentKind::L2MessageBrotli, &[])],
        );
        let err =
            walk(&mut MelState::default(), &seq_msg, &Default::default()).await.unwrap_err();
        assert!(matches!(
            err,
            MelErrorKind::Critical(MelError::MalformedSegment { index: 1, .. })
        ));
    }

    #[test]
    fn test_last_segment() {
        let l2 = segment(SegmentKind::L2Message, b"x");
        let adv = advance(SegmentKind::AdvanceTimestamp, 1);
        let seq_msg = with_delayed(0, vec![l2.clone(), adv.clone(), Bytes::new()]);
        assert!(is_last_segment(&seq_msg, 0, 0));
        let seq_msg = with_delayed(0, vec![l2.clone(), adv, l2]);
        assert!(!is_last_segment(&seq_msg, 0, 0));
        assert!(is_last_segment(&seq_msg, 2, 0));
        assert!(!is_last_segment(&with_delayed(1, vec![]), 0, 0));
    }
}

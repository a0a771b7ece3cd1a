//! Sequencer message parsing.

use crate::{
    dap::DapReaderRegistry,
    errors::{MelError, MelResult},
    serialize::{BLOB_HASHES_HEADER_FLAG, SEQUENCER_HEADER_LEN},
    traits::KeysetValidationMode,
};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Header;
use std::io::Read;

/// The payload header byte of brotli compressed segment streams.
pub const BROTLI_MESSAGE_HEADER_BYTE: u8 = 0x00;

/// Flag bit of data availability committee certificates.
pub const DAS_MESSAGE_HEADER_FLAG: u8 = 0x80;

/// Flag bit of tree encoded committee certificates.
pub const TREE_DAS_MESSAGE_HEADER_FLAG: u8 = 0x08;

/// Header byte of external DA certificates.
pub const DA_CERTIFICATE_MESSAGE_HEADER_FLAG: u8 = 0x01;

/// Decompression limit of a segment stream.
pub const MAX_DECOMPRESSED_LEN: usize = 16 * 1024 * 1024;

/// The number of segments read from one sequencer message.
pub const MAX_SEGMENTS_PER_SEQUENCER_MESSAGE: usize = 100 * 1024;

/// A decoded sequencer batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerMessage {
    /// Lower bound of message timestamps.
    pub min_timestamp: u64,
    /// Upper bound of message timestamps.
    pub max_timestamp: u64,
    /// Lower bound of message block numbers.
    pub min_l1_block: u64,
    /// Upper bound of message block numbers.
    pub max_l1_block: u64,
    /// Delayed messages read once the batch is applied.
    pub after_delayed_messages: u64,
    /// The tagged segments.
    pub segments: Vec<Bytes>,
}

/// Returns true if `header_byte` marks a payload that lives with a DA provider.
pub const fn is_da_header_byte(header_byte: u8) -> bool {
    header_byte & DAS_MESSAGE_HEADER_FLAG != 0
        || header_byte & TREE_DAS_MESSAGE_HEADER_FLAG != 0
        || header_byte == BLOB_HASHES_HEADER_FLAG
        || header_byte == DA_CERTIFICATE_MESSAGE_HEADER_FLAG
}

/// Parses a serialized batch into its header and segments.
pub async fn parse_sequencer_message(
    batch_num: u64,
    batch_block_hash: B256,
    data: &[u8],
    readers: &DapReaderRegistry,
    keyset_validation: KeysetValidationMode,
) -> MelResult<SequencerMessage> {
    if data.len() < SEQUENCER_HEADER_LEN {
        return Err(MelError::MissingSequencerHeader(data.len()).crit());
    }
    let word = |i: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[i * 8..i * 8 + 8]);
        u64::from_be_bytes(raw)
    };
    let mut message = SequencerMessage {
        min_timestamp: word(0),
        max_timestamp: word(1),
        min_l1_block: word(2),
        max_l1_block: word(3),
        after_delayed_messages: word(4),
        segments: Vec::new(),
    };

    let mut payload = Bytes::copy_from_slice(&data[SEQUENCER_HEADER_LEN..]);
    if let Some(&header_byte) = payload.first() {
        if let Some(reader) = readers.reader_for(header_byte) {
            let recovered = reader
                .recover_payload(batch_num, batch_block_hash, data, keyset_validation)
                .await
                .map_err(|e| MelError::Dap(e).temp())?;
            match recovered {
                Some(recovered) => payload = recovered,
                None => return Ok(message),
            }
        } else if is_da_header_byte(header_byte) {
            return Err(MelError::MissingDapReader(header_byte).crit());
        }
    }

    match payload.first() {
        Some(&BROTLI_MESSAGE_HEADER_BYTE) => {
            match decompress_brotli(&payload[1..], MAX_DECOMPRESSED_LEN) {
                Ok(decompressed) => message.segments = decode_segments(&decompressed),
                Err(e) => {
                    warn!(
                        target: "mel-extraction",
                        "Sequencer message {} decompression failed: {}",
                        batch_num,
                        e
                    );
                }
            }
        }
        Some(header_byte) => {
            warn!(
                target: "mel-extraction",
                "Unknown sequencer message format {:#04x} in batch {}",
                header_byte,
                batch_num
            );
        }
        None => {}
    }
    Ok(message)
}

fn decode_segments(mut buf: &[u8]) -> Vec<Bytes> {
    let mut segments = Vec::new();
    while !buf.is_empty() {
        if segments.len() >= MAX_SEGMENTS_PER_SEQUENCER_MESSAGE {
            warn!(target: "mel-extraction", "Too many segments in sequencer message");
            break;
        }
        match Header::decode_bytes(&mut buf, false) {
            Ok(segment) => segments.push(Bytes::copy_from_slice(segment)),
            Err(e) => {
                warn!(target: "mel-extraction", "Error parsing sequencer message segment: {}", e);
                break;
            }
        }
    }
    segments
}

/// Decompresses a brotli stream, failing if the output exceeds `max_len` bytes.
pub fn decompress_brotli(data: &[u8], max_len: usize) -> Result<Vec<u8>, std::io::Error> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, 4096).take(max_len as u64 + 1).read_to_end(&mut out)?;
    if out.len() > max_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed size exceeds {max_len} bytes"),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::MelErrorKind,
        test_utils::{compress_brotli, sequencer_payload, trace_layer, TestDapReader},
    };
    use std::sync::Arc;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    fn header(after_delayed: u64) -> Vec<u8> {
        [1u64, 2, 3, 4, after_delayed].iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    async fn parse(data: &[u8], readers: &DapReaderRegistry) -> MelResult<SequencerMessage> {
        parse_sequencer_message(0, B256::ZERO, data, readers, KeysetValidationMode::Validate).await
    }

    #[tokio::test]
    async fn test_header_only() {
        let msg = parse(&header(7), &DapReaderRegistry::new()).await.unwrap();
        assert_eq!(msg.min_timestamp, 1);
        assert_eq!(msg.max_timestamp, 2);
        assert_eq!(msg.min_l1_block, 3);
        assert_eq!(msg.max_l1_block, 4);
        assert_eq!(msg.after_delayed_messages, 7);
        assert!(msg.segments.is_empty());
    }

    #[tokio::test]
    async fn test_short_header() {
        let err = parse(&[0u8; 39], &DapReaderRegistry::new()).await.unwrap_err();
        assert_eq!(err, MelError::MissingSequencerHeader(39).crit());
    }

    #[tokio::test]
    async fn test_brotli_segments() {
        let segments = vec![vec![3u8, 7], vec![], vec![0u8, 1, 2, 3]];
        let mut data = header(0);
        data.extend(sequencer_payload(&segments));
        let msg = parse(&data, &DapReaderRegistry::new()).await.unwrap();
        let expected: Vec<Bytes> = segments.into_iter().map(Bytes::from).collect();
        assert_eq!(msg.segments, expected);
    }

    #[tokio::test]
    async fn test_corrupt_brotli_warns() {
        let (layer, storage) = trace_layer();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::Registry::default().with(layer),
        );
        let noise: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let compressed = compress_brotli(&noise);
        let mut data = header(0);
        data.push(BROTLI_MESSAGE_HEADER_BYTE);
        data.extend_from_slice(&compressed[..compressed.len() / 2]);
        let msg = parse(&data, &DapReaderRegistry::new()).await.unwrap();
        assert!(msg.segments.is_empty());
        assert_eq!(storage.get_by_level(Level::WARN).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_format_warns() {
        let (layer, storage) = trace_layer();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::Registry::default().with(layer),
        );
        let mut data = header(0);
        data.extend([0x20, 1, 2]);
        let msg = parse(&data, &DapReaderRegistry::new()).await.unwrap();
        assert!(msg.segments.is_empty());
        let warnings = storage.get_by_level(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Unknown sequencer message format"));
    }

    #[tokio::test]
    async fn test_da_header_without_reader() {
        for flag in [0x80u8, 0x88, 0x50, 0x08, 0x01] {
            let mut data = header(0);
            data.push(flag);
            let err = parse(&data, &DapReaderRegistry::new()).await.unwrap_err();
            assert_eq!(err, MelError::MissingDapReader(flag).crit());
        }
    }

    #[tokio::test]
    async fn test_da_reader_replaces_payload() {
        let mut readers = DapReaderRegistry::new();
        let recovered = sequencer_payload(&[vec![0u8, 9]]);
        readers.register(Arc::new(TestDapReader::new(0x80, Some(recovered.into()))));
        let mut data = header(0);
        data.extend([0x80, 0xaa]);
        let msg = parse(&data, &readers).await.unwrap();
        assert_eq!(msg.segments, vec![Bytes::from_static(&[0, 9])]);
    }

    #[tokio::test]
    async fn test_da_reader_empty_payload() {
        let mut readers = DapReaderRegistry::new();
        readers.register(Arc::new(TestDapReader::new(0x80, None)));
        let mut data = header(3);
        data.push(0x80);
        let msg = parse(&data, &readers).await.unwrap();
        assert_eq!(msg.after_delayed_messages, 3);
        assert!(msg.segments.is_empty());
    }

    #[tokio::test]
    async fn test_da_reader_failure_is_temporary() {
        let mut readers = DapReaderRegistry::new();
        readers.register(Arc::new(TestDapReader::failing(0x80)));
        let mut data = header(0);
        data.push(0x80);
        let err = parse(&data, &readers).await.unwrap_err();
        assert!(matches!(err, MelErrorKind::Temporary(MelError::Dap(_))));
    }

    #[test]
    fn test_decompress_limit() {
        let compressed = compress_brotli(&[7u8; 1024]);
        assert_eq!(decompress_brotli(&compressed, 1024).unwrap().len(), 1024);
        assert!(decompress_brotli(&compressed, 1023).is_err());
    }
}

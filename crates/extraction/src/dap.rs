//! Data availability reader routing and the blob reader.

use crate::{
    serialize::{BLOB_HASHES_HEADER_FLAG, SEQUENCER_HEADER_LEN},
    traits::{BlobReader, DapReader, KeysetValidationMode},
};
use alloy_eips::eip4844::{Blob, BYTES_PER_BLOB};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Header;
use async_trait::async_trait;
use std::sync::Arc;

/// Routes payload header bytes to registered [DapReader]s.
#[derive(Debug, Clone, Default)]
pub struct DapReaderRegistry {
    readers: Vec<Arc<dyn DapReader>>,
    keyset_validation: KeysetValidationMode,
}

impl DapReaderRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self { readers: Vec::new(), keyset_validation: KeysetValidationMode::Validate }
    }

    /// Sets the keyset validation mode passed to every reader.
    pub fn with_keyset_validation(mut self, mode: KeysetValidationMode) -> Self {
        self.keyset_validation = mode;
        self
    }

    /// Returns the keyset validation mode passed to every reader.
    pub const fn keyset_validation(&self) -> KeysetValidationMode {
        self.keyset_validation
    }

    /// Registers a reader. Earlier registrations win when two readers claim a header byte.
    pub fn register(&mut self, reader: Arc<dyn DapReader>) {
        self.readers.push(reader);
    }

    /// Returns the reader that handles `header_byte`.
    pub fn reader_for(&self, header_byte: u8) -> Option<&Arc<dyn DapReader>> {
        self.readers.iter().find(|reader| reader.is_valid_header_byte(header_byte))
    }

    /// Returns the number of registered readers.
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Returns true if no reader is registered.
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

/// Resolves blob batches through a [BlobReader].
#[derive(Debug, Clone)]
pub struct BlobDapReader<B> {
    blobs: B,
}

impl<B> BlobDapReader<B> {
    /// Creates a reader fetching blobs from `blobs`.
    pub const fn new(blobs: B) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl<B: BlobReader> DapReader for BlobDapReader<B> {
    fn is_valid_header_byte(&self, header_byte: u8) -> bool {
        header_byte == BLOB_HASHES_HEADER_FLAG
    }

    async fn recover_payload(
        &self,
        batch_num: u64,
        batch_block_hash: B256,
        sequencer_msg: &[u8],
        _: KeysetValidationMode,
    ) -> Result<Option<Bytes>, String> {
        let hashes = sequencer_msg
            .get(SEQUENCER_HEADER_LEN + 1..)
            .ok_or_else(|| format!("batch {batch_num} has no blob payload"))?;
        if hashes.len() % 32 != 0 {
            return Err(format!("batch {batch_num} blob hashes are {} bytes", hashes.len()));
        }
        let hashes: Vec<B256> = hashes.chunks_exact(32).map(B256::from_slice).collect();
        let blobs = self
            .blobs
            .get_blobs(batch_block_hash, &hashes)
            .await
            .map_err(|e| format!("failed to fetch blobs of batch {batch_num}: {e}"))?;
        if blobs.len() != hashes.len() {
            return Err(format!(
                "expected {} blobs for batch {batch_num}, got {}",
                hashes.len(),
                blobs.len()
            ));
        }
        decode_blobs(&blobs).map(Some)
    }
}

/// Decodes the payload spread over `blobs`.
///
/// Every 32 byte field element carries 31 bytes of data after a zero byte. The concatenated data
/// holds one RLP byte string followed by padding.
pub fn decode_blobs(blobs: &[Blob]) -> Result<Bytes, String> {
    let mut data = Vec::with_capacity(blobs.len() * BYTES_PER_BLOB / 32 * 31);
    for blob in blobs {
        blob.chunks_exact(32).for_each(|element| data.extend_from_slice(&element[1..]));
    }
    let mut buf = data.as_slice();
    let payload =
        Header::decode_bytes(&mut buf, false).map_err(|e| format!("invalid blob payload: {e}"))?;
    Ok(Bytes::copy_from_slice(payload))
}

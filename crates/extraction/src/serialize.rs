//! Reconstructs the raw bytes a sequencer batch committed to.

use crate::{
    errors::{MelError, MelErrorKind, MelResult},
    traits::{BatchEventParser, ReceiptFetcher},
};
use alloy_consensus::{Transaction, TxEnvelope};
use alloy_primitives::Bytes;
use mel_primitives::{BatchDataLocation, SequencerInboxBatch};

/// The length of the header that precedes the batch data.
pub const SEQUENCER_HEADER_LEN: usize = 40;

/// The payload header byte of blob batches.
pub const BLOB_HASHES_HEADER_FLAG: u8 = 0x50;

/// Returns the serialized batch: the 40 byte header followed by the batch data.
///
/// The result is stored on the batch, later calls return it without refetching.
pub async fn serialize_batch<P, R>(
    batch: &mut SequencerInboxBatch,
    tx: &TxEnvelope,
    parser: &P,
    receipts: &R,
) -> MelResult<Bytes>
where
    P: BatchEventParser + ?Sized,
    R: ReceiptFetcher + ?Sized,
{
    if let Some(serialized) = &batch.serialized {
        return Ok(serialized.clone());
    }

    let bounds = &batch.time_bounds;
    let mut out = Vec::with_capacity(SEQUENCER_HEADER_LEN);
    out.extend_from_slice(&bounds.min_timestamp.to_be_bytes());
    out.extend_from_slice(&bounds.max_timestamp.to_be_bytes());
    out.extend_from_slice(&bounds.min_block_number.to_be_bytes());
    out.extend_from_slice(&bounds.max_block_number.to_be_bytes());
    out.extend_from_slice(&batch.after_delayed_count.to_be_bytes());

    match batch.data_location {
        BatchDataLocation::TxInput => {
            if tx.input().len() < 4 {
                return Err(MelError::CalldataTooShort("addSequencerL2BatchFromOrigin").crit());
            }
            let data = parser.decode_batch_calldata(tx.input())?;
            out.extend_from_slice(&data);
        }
        BatchDataLocation::SeparateEvent => {
            let receipt = receipts
                .receipt_for_transaction_index(batch.tx_index)
                .await
                .map_err(Into::<MelErrorKind>::into)?;
            let mut found = Vec::new();
            for log in receipt.logs.iter().filter(|log| log.address == batch.bridge_address) {
                if let Some((seq, data)) = parser.parse_batch_data(log)? {
                    if seq == batch.sequence_number {
                        found.push(data);
                    }
                }
            }
            match found.len() {
                0 => return Err(MelError::MissingBatchData(batch.sequence_number).crit()),
                1 => out.extend_from_slice(&found[0]),
                n => {
                    return Err(MelError::DuplicateBatchData(batch.sequence_number, n).crit())
                }
            }
        }
        BatchDataLocation::None => {}
        BatchDataLocation::BlobHashes => {
            let hashes = tx.blob_versioned_hashes().unwrap_or_default();
            if hashes.is_empty() {
                return Err(MelError::MissingBlobHashes(batch.sequence_number).crit());
            }
            out.push(BLOB_HASHES_HEADER_FLAG);
            hashes.iter().for_each(|hash| out.extend_from_slice(hash.as_slice()));
        }
    }

    let serialized = Bytes::from(out);
    batch.serialized = Some(serialized.clone());
    Ok(serialized)
}

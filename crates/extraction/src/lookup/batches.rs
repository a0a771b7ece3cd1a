//! Sequencer batch lookup.

use crate::{
    errors::{MelError, MelErrorKind, MelResult},
    state::MelState,
    traits::{BatchEventParser, ReceiptFetcher},
    ParentChainBlock,
};
use alloy_consensus::{Transaction, TxEnvelope};
use alloy_primitives::B256;
use mel_primitives::{BatchDataLocation, SequencerInboxBatch};

/// A batch together with the transaction that posted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedBatch {
    /// The batch.
    pub batch: SequencerInboxBatch,
    /// The posting transaction.
    pub tx: TxEnvelope,
}

/// Collects the batches delivered to the sequencer inbox in `block`, in sequence order.
pub async fn parse_batches_from_block<P, R>(
    state: &MelState,
    block: &ParentChainBlock,
    block_hash: B256,
    parser: &P,
    receipts: &R,
) -> MelResult<Vec<PostedBatch>>
where
    P: BatchEventParser + ?Sized,
    R: ReceiptFetcher + ?Sized,
{
    let mut batches: Vec<PostedBatch> = Vec::new();
    for (tx_index, tx) in block.body.transactions.iter().enumerate() {
        if tx.to() != Some(state.batch_posting_target_address) {
            continue;
        }
        let tx_index = tx_index as u64;
        let receipt = receipts
            .receipt_for_transaction_index(tx_index)
            .await
            .map_err(Into::<MelErrorKind>::into)?;

        for log in &receipt.logs {
            let Some(event) = parser.parse_batch_delivered(log)? else {
                continue;
            };
            let data_location = BatchDataLocation::try_from(event.data_location)
                .map_err(|code| MelError::UnknownDataLocation(code).crit())?;

            if let Some(last) = batches.last() {
                let expected = last.batch.sequence_number.checked_add(1);
                if expected != Some(event.sequence_number) {
                    return Err(MelError::BatchesOutOfOrder {
                        expected: expected.unwrap_or(u64::MAX),
                        got: event.sequence_number,
                    }
                    .crit());
                }
            }

            trace!(
                target: "mel-extraction",
                "Found batch {} in block {} ({})",
                event.sequence_number,
                block.header.number,
                data_location
            );
            batches.push(PostedBatch {
                batch: SequencerInboxBatch {
                    block_hash,
                    parent_chain_block_number: block.header.number,
                    sequence_number: event.sequence_number,
                    before_inbox_acc: event.before_acc,
                    after_inbox_acc: event.after_acc,
                    after_delayed_acc: event.delayed_acc,
                    after_delayed_count: event.after_delayed_messages_read,
                    time_bounds: event.time_bounds,
                    raw_log: log.clone(),
                    tx_index,
                    bridge_address: log.address,
                    data_location,
                    serialized: None,
                },
                tx: tx.clone(),
            });
        }
    }
    Ok(batches)
}

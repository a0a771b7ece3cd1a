//! The extraction function.

use crate::{
    dap::DapReaderRegistry,
    ensure,
    errors::{LinkageError, MelError, MelErrorKind, MelResult},
    lookup::{parse_batches_from_block, parse_delayed_messages_from_block},
    segments::messages_from_batch_segments,
    sequencer::parse_sequencer_message,
    serialize::serialize_batch,
    state::MelState,
    traits::{BatchEventParser, BridgeEventParser, DelayedMessageDatabase, ReceiptFetcher},
    ParentChainBlock,
};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use mel_primitives::{
    legacy_batch_gas_cost, BatchDataStats, BatchMetadata, BatchPostingReport, DelayedInboxMessage,
    L1MessageKind, MessageWithMetadata,
};

/// The outcome of extracting one parent chain block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    /// The state after the block.
    pub state: MelState,
    /// The extracted messages, in order.
    pub messages: Vec<MessageWithMetadata>,
    /// The delayed messages first seen in the block, in index order.
    pub delayed_messages: Vec<DelayedInboxMessage>,
    /// Metadata of the batches processed in the block.
    pub batch_metas: Vec<BatchMetadata>,
}

/// Applies `block` to `input_state`.
///
/// `input_state` is never modified. Nothing is persisted, the caller stores the returned
/// [ExtractedBlock] once it accepts it.
pub async fn extract_messages<P, R, D>(
    input_state: &MelState,
    block: &ParentChainBlock,
    dap_readers: &DapReaderRegistry,
    delayed_db: &D,
    receipts: &R,
    parser: &P,
) -> MelResult<ExtractedBlock>
where
    P: BatchEventParser + BridgeEventParser + ?Sized,
    R: ReceiptFetcher + ?Sized,
    D: DelayedMessageDatabase + ?Sized,
{
    let mut state = input_state.clone();

    let parent_hash = block.header.parent_hash;
    if parent_hash != state.parent_chain_block_hash {
        return Err(
            LinkageError::ParentHashMismatch(state.parent_chain_block_hash, parent_hash).into()
        );
    }
    let block_hash = block.header.hash_slow();
    state.parent_chain_block_number = block.header.number;
    state.parent_chain_block_hash = block_hash;
    state.parent_chain_previous_block_hash = parent_hash;

    let mut batches =
        parse_batches_from_block(&state, block, block_hash, parser, receipts).await?;
    if let Some(first) = batches.first() {
        ensure!(
            first.batch.sequence_number == state.batch_count,
            MelError::BatchesOutOfOrder {
                expected: state.batch_count,
                got: first.batch.sequence_number
            }
            .crit()
        );
    }
    let mut delayed_messages =
        parse_delayed_messages_from_block(&state, block, block_hash, parser, receipts).await?;

    let first_new_delayed = state.delayed_messages_seen;
    let mut reports = Vec::new();
    for (i, delayed) in delayed_messages.iter().enumerate() {
        state.accumulate_delayed_message(delayed)?;
        if delayed.message.header.kind == L1MessageKind::BatchPostingReport {
            reports.push(i);
        }
    }
    if !delayed_messages.is_empty() {
        state.generate_delayed_message_merkle_partials_and_root();
    }

    ensure!(
        reports.len() == batches.len(),
        MelError::ReportCountMismatch { reports: reports.len(), batches: batches.len() }.crit()
    );

    let mut messages = Vec::new();
    let mut batch_metas = Vec::with_capacity(batches.len());
    for (posted, report_index) in batches.iter_mut().zip(reports) {
        let batch = &mut posted.batch;
        let serialized = serialize_batch(batch, &posted.tx, parser, receipts).await?;

        let report_message = &mut delayed_messages[report_index].message;
        let report = BatchPostingReport::decode(&report_message.l2_msg)
            .map_err(|e| MelError::from(e).crit())?;
        let data_hash = keccak256(&serialized);
        ensure!(
            data_hash == report.data_hash,
            MelError::BatchDataHashMismatch { expected: report.data_hash, got: data_hash }.crit()
        );
        let stats = BatchDataStats::from_data(&serialized);
        report_message.legacy_batch_gas_cost = Some(legacy_batch_gas_cost(&stats));
        report_message.batch_data_stats = Some(stats);

        let seq_msg = parse_sequencer_message(
            batch.sequence_number,
            batch.block_hash,
            &serialized,
            dap_readers,
            dap_readers.keyset_validation(),
        )
        .await?;
        let overlay = BlockDelayedMessages {
            inner: delayed_db,
            first_index: first_new_delayed,
            messages: &delayed_messages,
        };
        let batch_messages = messages_from_batch_segments(&mut state, &seq_msg, &overlay).await?;
        for message in &batch_messages {
            state.accumulate_message(message);
        }
        state.batch_count += 1;
        debug!(
            target: "mel-extraction",
            "Batch {} yielded {} messages",
            batch.sequence_number,
            batch_messages.len()
        );
        messages.extend(batch_messages);

        batch_metas.push(BatchMetadata {
            accumulator: batch.after_inbox_acc,
            message_count: state.msg_count,
            delayed_message_count: batch.after_delayed_count,
            parent_chain_block: state.parent_chain_block_number,
        });
    }
    if !messages.is_empty() {
        state.generate_message_merkle_partials_and_root();
    }

    info!(
        target: "mel-extraction",
        "Extracted block {}: {} messages, {} delayed messages, {} batches",
        state.parent_chain_block_number,
        messages.len(),
        delayed_messages.len(),
        batch_metas.len()
    );
    Ok(ExtractedBlock { state, messages, delayed_messages, batch_metas })
}

/// Serves delayed messages seen in the block being extracted, which are not stored yet.
struct BlockDelayedMessages<'a, D: ?Sized> {
    inner: &'a D,
    first_index: u64,
    messages: &'a [DelayedInboxMessage],
}

#[async_trait]
impl<D> DelayedMessageDatabase for BlockDelayedMessages<'_, D>
where
    D: DelayedMessageDatabase + ?Sized,
{
    type Error = MelErrorKind;

    async fn read_delayed_message(
        &self,
        state: &mut MelState,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error> {
        if let Some(offset) = index.checked_sub(self.first_index) {
            if let Some(message) = self.messages.get(offset as usize) {
                return Ok(Some(message.clone()));
            }
        }
        self.inner.read_delayed_message(state, index).await.map_err(Into::into)
    }
}

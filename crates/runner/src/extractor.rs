//! The [MessageExtractor] block processing loop.

use crate::{
    config::ExtractorConfig,
    errors::{ExtractorError, ExtractorResult},
    fsm::{FsmState, PendingSave},
    receipts::BlockReceiptFetcher,
    traits::{MessageConsumer, ParentChainReader},
};
use core::time::Duration;
use mel_db::{Database, KeyValueStore};
use mel_extraction::{
    backlog::initialize_seen_unread_delayed_meta_deque, dap::DapReaderRegistry,
    extract::extract_messages, parser::SolEventParser, state::MelState, traits::StateFetcher,
};
use tokio_util::sync::CancellationToken;

/// The outcome of one action: the next state and how long to wait before acting on it. On
/// failure the state to retry is handed back with the error.
type Step = Result<(FsmState, Duration), (FsmState, ExtractorError)>;

/// Reads parent chain blocks one by one and turns them into messages.
///
/// Every call to [MessageExtractor::act] performs the action of the current [FsmState]. A
/// failed action leaves the state unchanged, so acting again retries it.
#[derive(Debug)]
pub struct MessageExtractor<R, C, KV> {
    reader: R,
    consumer: C,
    db: Database<KV>,
    dap_readers: DapReaderRegistry,
    config: ExtractorConfig,
    state: FsmState,
}

impl<R, C, KV> MessageExtractor<R, C, KV>
where
    R: ParentChainReader,
    C: MessageConsumer,
    KV: KeyValueStore,
{
    /// Creates an extractor in the [FsmState::Start] state.
    pub fn new(
        reader: R,
        consumer: C,
        db: Database<KV>,
        dap_readers: DapReaderRegistry,
        config: ExtractorConfig,
    ) -> Self {
        let dap_readers = dap_readers.with_keyset_validation(config.validate_keysets);
        Self { reader, consumer, db, dap_readers, config, state: FsmState::Start }
    }

    /// Returns the current state.
    pub const fn current_state(&self) -> &FsmState {
        &self.state
    }

    /// Returns the database.
    pub const fn database(&self) -> &Database<KV> {
        &self.db
    }

    /// Returns the parent chain reader.
    pub const fn reader(&self) -> &R {
        &self.reader
    }

    /// Returns the message consumer.
    pub const fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Acts until `shutdown` is cancelled or an action fails critically. Cancellation is only
    /// observed between actions.
    pub async fn run(&mut self, shutdown: CancellationToken) -> ExtractorResult<()> {
        info!(target: "mel-runner", "Starting message extractor");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let wait = match self.act().await {
                Ok(wait) => wait,
                Err(e) if e.is_critical() => {
                    error!(
                        target: "mel-runner",
                        "Critical error in state {}, stopping: {}",
                        self.state,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!(target: "mel-runner", "Error in message extractor: {}", e);
                    self.config.retry_interval()
                }
            };
            if wait.is_zero() {
                continue;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!(target: "mel-runner", "Message extractor stopped in state {}", self.state);
        Ok(())
    }

    /// Performs the action of the current state and returns how long to wait before acting
    /// again.
    pub async fn act(&mut self) -> ExtractorResult<Duration> {
        let current = core::mem::take(&mut self.state);
        debug!(target: "mel-runner", "Acting on state {}", current);
        let step = match current {
            FsmState::Start => self.start().await,
            FsmState::ProcessingNextBlock(pre_state) => self.process_next_block(pre_state).await,
            FsmState::SavingMessages(pending) => self.save_messages(*pending).await,
            FsmState::Reorging(dirty) => self.reorg(dirty).await,
        };
        match step {
            Ok((next, wait)) => {
                self.state = next;
                Ok(wait)
            }
            Err((retry, err)) => {
                self.state = retry;
                Err(err)
            }
        }
    }

    async fn start(&mut self) -> Step {
        self.try_start().await.map_or_else(
            |e| Err((FsmState::Start, e)),
            |state| Ok((FsmState::ProcessingNextBlock(state), Duration::ZERO)),
        )
    }

    async fn try_start(&self) -> ExtractorResult<MelState> {
        let hash = self.config.start_parent_chain_block_hash;
        self.reader
            .header_by_hash(hash)
            .await
            .map_err(|e| ExtractorError::Reader(e.to_string()))?
            .ok_or(ExtractorError::StartBlockNotFound(hash))?;

        let mut state = self.db.fetch_initial_state(hash).await?;
        let finalized = self.finalized_block_number().await?;
        initialize_seen_unread_delayed_meta_deque(&mut state, &self.db, finalized).await?;
        info!(
            target: "mel-runner",
            "Starting from block {} with {} messages and {} delayed messages read",
            state.parent_chain_block_number,
            state.msg_count,
            state.delayed_messages_read
        );
        Ok(state)
    }

    async fn process_next_block(&mut self, pre_state: MelState) -> Step {
        let number = pre_state.parent_chain_block_number + 1;
        let block = match self.reader.block_by_number(number).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                trace!(target: "mel-runner", "Block {} not available yet", number);
                let retry = self.config.retry_interval();
                return Ok((FsmState::ProcessingNextBlock(pre_state), retry));
            }
            Err(e) => {
                let err = ExtractorError::Reader(e.to_string());
                return Err((FsmState::ProcessingNextBlock(pre_state), err));
            }
        };

        let receipts = BlockReceiptFetcher::new(&self.reader, &block);
        let extracted = extract_messages(
            &pre_state,
            &block,
            &self.dap_readers,
            &self.db,
            &receipts,
            &SolEventParser,
        )
        .await;
        match extracted {
            Ok(extracted) => {
                debug!(
                    target: "mel-runner",
                    "Extracted {} messages from block {}",
                    extracted.messages.len(),
                    number
                );
                let pending = PendingSave { pre_state_msg_count: pre_state.msg_count, extracted };
                Ok((FsmState::SavingMessages(Box::new(pending)), Duration::ZERO))
            }
            Err(e) if e.is_reorg() => {
                warn!(target: "mel-runner", "Block {} does not extend the head: {}", number, e);
                Ok((FsmState::Reorging(pre_state), Duration::ZERO))
            }
            Err(e) => Err((FsmState::ProcessingNextBlock(pre_state), e.into())),
        }
    }

    async fn save_messages(&mut self, pending: PendingSave) -> Step {
        if let Err(e) = self.try_save_messages(&pending).await {
            return Err((FsmState::SavingMessages(Box::new(pending)), e));
        }
        let mut post_state = pending.extracted.state;
        self.trim_deque(&mut post_state).await;
        Ok((FsmState::ProcessingNextBlock(post_state), Duration::ZERO))
    }

    async fn try_save_messages(&mut self, pending: &PendingSave) -> ExtractorResult<()> {
        self.consumer
            .push_messages(pending.pre_state_msg_count, &pending.extracted.messages)
            .await
            .map_err(|e| ExtractorError::Consumer(e.to_string()))?;
        self.db.save_extracted_block(&pending.extracted)?;
        Ok(())
    }

    /// Drops finalized, read entries once the deque outgrows its capacity. Failures only skip
    /// the trim, the saved state is unaffected.
    async fn trim_deque(&self, state: &mut MelState) {
        if state.seen_unread_delayed_meta_deque().len() <= self.config.delayed_meta_deque_capacity
        {
            return;
        }
        let finalized = match self.finalized_block_number().await {
            Ok(Some(number)) => number,
            Ok(None) => return,
            Err(e) => {
                warn!(target: "mel-runner", "Skipping delayed meta deque trim: {}", e);
                return;
            }
        };
        match self.db.get_state(finalized) {
            Ok(Some(finalized_state)) => {
                let trimmed = state
                    .seen_unread_delayed_meta_deque_mut()
                    .trim_finalized(finalized_state.delayed_messages_read);
                trace!(
                    target: "mel-runner",
                    "Trimmed {} delayed metas finalized at block {}",
                    trimmed,
                    finalized
                );
            }
            Ok(None) => {}
            Err(e) => warn!(target: "mel-runner", "Skipping delayed meta deque trim: {}", e),
        }
    }

    async fn reorg(&mut self, mut dirty: MelState) -> Step {
        match self.try_reorg(&dirty) {
            Ok(mut previous) => {
                dirty.reorg_to(&mut previous);
                info!(
                    target: "mel-runner",
                    "Reorged from block {} to block {}",
                    dirty.parent_chain_block_number,
                    previous.parent_chain_block_number
                );
                Ok((FsmState::ProcessingNextBlock(previous), Duration::ZERO))
            }
            Err(e) => Err((FsmState::Reorging(dirty), e)),
        }
    }

    /// Loads the state before `dirty`, checks that `dirty` built on it and moves the head to
    /// it.
    fn try_reorg(&mut self, dirty: &MelState) -> ExtractorResult<MelState> {
        let number = dirty
            .parent_chain_block_number
            .checked_sub(1)
            .ok_or(ExtractorError::ReorgBelowGenesis)?;
        let previous = self.db.get_state(number)?.ok_or(ExtractorError::MissingState(number))?;
        if previous.parent_chain_block_hash != dirty.parent_chain_previous_block_hash {
            return Err(ExtractorError::ReorgLinkage {
                number,
                expected: dirty.parent_chain_previous_block_hash,
                got: previous.parent_chain_block_hash,
            });
        }
        self.db.revert_head_to(&previous)?;
        Ok(previous)
    }

    async fn finalized_block_number(&self) -> ExtractorResult<Option<u64>> {
        self.reader.finalized_block_number().await.map_err(|e| ExtractorError::Reader(e.to_string()))
    }
}

//! This module contains the errors raised while extracting messages.

use alloy_primitives::B256;
use mel_primitives::BatchPostingReportError;
use thiserror::Error;

/// A result type for message extraction.
pub type MelResult<T> = Result<T, MelErrorKind>;

/// [crate::ensure] is a short-hand for bubbling up errors in the case of a condition not being met.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

/// A top level filter for [MelError] that sorts by severity.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MelErrorKind {
    /// A collaborator failed. Retrying the same block may succeed.
    #[error("Temporary error: {0}")]
    Temporary(#[source] MelError),
    /// The block violates the protocol. Retrying yields the same error.
    #[error("Critical error: {0}")]
    Critical(#[source] MelError),
    /// The block does not extend the state. The parent chain reorganized.
    #[error("Parent chain reorg: {0}")]
    Reorg(#[from] LinkageError),
}

impl MelErrorKind {
    /// Returns true if the error signals a reorg.
    pub const fn is_reorg(&self) -> bool {
        matches!(self, Self::Reorg(_))
    }
}

/// A hash linkage failure between a state and the next parent chain block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageError {
    /// The first argument is the hash the state expects, the second the block's parent hash.
    #[error("parent chain block hash in MEL state does not match incoming block's parent hash: expected {0}, got {1}")]
    ParentHashMismatch(B256, B256),
}

/// An error encountered during extraction.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MelError {
    /// Batch sequence numbers are not consecutive.
    #[error("sequencer batches out of order: expected {expected}, got {got}")]
    BatchesOutOfOrder {
        /// The expected sequence number.
        expected: u64,
        /// The sequence number found.
        got: u64,
    },
    /// The number of batch posting reports differs from the number of batches.
    #[error("batch posting reports {reports} do not match the number of batches {batches}")]
    ReportCountMismatch {
        /// Reports seen in the block.
        reports: usize,
        /// Batches seen in the block.
        batches: usize,
    },
    /// The serialized batch does not hash to the value in its posting report.
    #[error("batch data hash incorrect: report has {expected}, batch hashes to {got}")]
    BatchDataHashMismatch {
        /// The hash from the posting report.
        expected: B256,
        /// The hash of the serialized batch.
        got: B256,
    },
    /// A sequencer message segment could not be interpreted.
    #[error("malformed segment {index}: {reason}")]
    MalformedSegment {
        /// Position of the segment.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// A delayed message read from storage is not committed to by the accumulator.
    #[error("delayed message {0} not part of the mel state accumulator")]
    AccumulatorMismatch(u64),
    /// The persisted seen root of a state disagrees with the replayed messages.
    #[error("replayed delayed messages do not match the seen root of the state at block {0}")]
    SeenRootMismatch(u64),
    /// A delayed message needed by a batch is not available.
    #[error("no more delayed messages in db: index {0}")]
    MissingDelayedMessage(u64),
    /// No delayed meta is tracked for the index.
    #[error("no delayed meta for index {0}")]
    MissingDelayedMeta(u64),
    /// A delayed meta was appended out of order.
    #[error("delayed meta index {got} is not contiguous, expected {expected}")]
    NonContiguousDelayedMeta {
        /// The index the deque expects next.
        expected: u64,
        /// The index given.
        got: u64,
    },
    /// A persisted state is missing.
    #[error("mel state for parent chain block {0} not found")]
    MissingState(u64),
    /// A delivered delayed message has no payload in the block.
    #[error("message {0} data not found")]
    DelayedMessageDataNotFound(u64),
    /// A delayed message payload does not hash to the delivered data hash.
    #[error("message {index} data has mismatched hash: expected {expected}, got {got}")]
    DelayedMessageHashMismatch {
        /// The delayed message index.
        index: u64,
        /// The hash from the delivery event.
        expected: B256,
        /// The hash of the payload found.
        got: B256,
    },
    /// Calldata is shorter than a function selector.
    #[error("calldata too short for {0}")]
    CalldataTooShort(&'static str),
    /// No data event was found for a batch posted with a separate data event.
    #[error("no data event for batch {0}")]
    MissingBatchData(u64),
    /// More than one data event was found for a batch.
    #[error("{1} data events for batch {0}")]
    DuplicateBatchData(u64, usize),
    /// A blob batch carries no blob hashes.
    #[error("blob batch {0} carries no blob hashes")]
    MissingBlobHashes(u64),
    /// The delivery event declares an unknown data location.
    #[error("unknown batch data location {0}")]
    UnknownDataLocation(u8),
    /// A sequencer message is shorter than its header.
    #[error("sequencer message missing L1 header: {0} bytes")]
    MissingSequencerHeader(usize),
    /// A payload needs a DA reader that is not configured.
    #[error("no DA reader configured for header byte {0:#04x}")]
    MissingDapReader(u8),
    /// A batch posting report could not be decoded.
    #[error("Batch posting report error: {0}")]
    BatchPostingReport(#[from] BatchPostingReportError),
    /// An event or calldata could not be decoded.
    #[error("Event decoding error: {0}")]
    EventDecoding(#[from] EventDecodingError),
    /// A parent chain provider failed.
    #[error("Provider error: {0}")]
    Provider(String),
    /// Storage failed.
    #[error("Database error: {0}")]
    Database(String),
    /// A DA reader failed.
    #[error("DA reader error: {0}")]
    Dap(String),
}

impl MelError {
    /// Wrap [self] as a [MelErrorKind::Critical].
    pub const fn crit(self) -> MelErrorKind {
        MelErrorKind::Critical(self)
    }

    /// Wrap [self] as a [MelErrorKind::Temporary].
    pub const fn temp(self) -> MelErrorKind {
        MelErrorKind::Temporary(self)
    }
}

/// A failure to decode an event log or calldata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode {item}: {reason}")]
pub struct EventDecodingError {
    /// The event or function being decoded.
    pub item: &'static str,
    /// The decoder's message.
    pub reason: String,
}

impl EventDecodingError {
    /// Creates a new [EventDecodingError].
    pub fn new(item: &'static str, reason: impl ToString) -> Self {
        Self { item, reason: reason.to_string() }
    }
}

impl From<EventDecodingError> for MelErrorKind {
    fn from(err: EventDecodingError) -> Self {
        MelError::EventDecoding(err).crit()
    }
}

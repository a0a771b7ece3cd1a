//! Errors of the [crate::MessageExtractor].

use alloy_primitives::B256;
use mel_db::DbError;
use mel_extraction::errors::MelErrorKind;
use thiserror::Error;

/// An error raised while acting on the extractor's current state. The state is kept, so the next
/// action retries it unless the error [is critical](ExtractorError::is_critical).
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// The parent chain reader failed.
    #[error("Parent chain reader error: {0}")]
    Reader(String),
    /// The configured start block is not known to the parent chain.
    #[error("start block {0} not found on the parent chain")]
    StartBlockNotFound(B256),
    /// Extraction failed for a reason other than a reorg.
    #[error(transparent)]
    Extraction(#[from] MelErrorKind),
    /// The message consumer rejected the extracted messages.
    #[error("Message consumer error: {0}")]
    Consumer(String),
    /// The database failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    /// The state before a reorged block is missing.
    #[error("mel state for parent chain block {0} not found")]
    MissingState(u64),
    /// The genesis state itself was reorged.
    #[error("cannot reorg below parent chain block 0")]
    ReorgBelowGenesis,
    /// The persisted state before a reorged block is not the block it built on.
    #[error("state of block {number} has hash {got}, reorged state expects previous hash {expected}")]
    ReorgLinkage {
        /// The block of the persisted state.
        number: u64,
        /// The reorged state's previous block hash.
        expected: B256,
        /// The persisted state's block hash.
        got: B256,
    },
}

impl ExtractorError {
    /// Returns true if retrying cannot succeed and the extractor must stop.
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Extraction(MelErrorKind::Critical(_))
                | Self::MissingState(_)
                | Self::ReorgBelowGenesis
                | Self::ReorgLinkage { .. }
        )
    }
}

/// A [Result] type for the [ExtractorError].
pub type ExtractorResult<T> = Result<T, ExtractorError>;

//! Data availability readers.

use alloy_eips::eip4844::Blob;
use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use core::fmt::{Debug, Display};

/// How a DA reader treats batches whose keyset cannot be validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum KeysetValidationMode {
    /// Reject invalid keysets.
    #[default]
    Validate,
    /// Abort the process on invalid keysets.
    PanicIfInvalid,
    /// Skip validation.
    DontValidate,
}

/// Resolves batch payloads that live outside the parent chain calldata.
#[async_trait]
pub trait DapReader: Debug + Send + Sync {
    /// Returns true if the reader handles payloads starting with `header_byte`.
    fn is_valid_header_byte(&self, header_byte: u8) -> bool;

    /// Recovers the payload referenced by `sequencer_msg`, which is the full serialized batch
    /// including its 40 byte header. `None` means the batch carries no data.
    async fn recover_payload(
        &self,
        batch_num: u64,
        batch_block_hash: B256,
        sequencer_msg: &[u8],
        keyset_validation: KeysetValidationMode,
    ) -> Result<Option<Bytes>, String>;
}

/// Fetches blobs by their versioned hashes.
#[async_trait]
pub trait BlobReader: Debug + Send + Sync {
    /// The error type for the [BlobReader].
    type Error: Display;

    /// Returns the blobs for `versioned_hashes`, in order, as referenced from the block.
    async fn get_blobs(
        &self,
        batch_block_hash: B256,
        versioned_hashes: &[B256],
    ) -> Result<Vec<Blob>, Self::Error>;
}

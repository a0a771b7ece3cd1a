//! Serves the receipts of one block through a [ParentChainReader].

use crate::traits::ParentChainReader;
use alloy_consensus::Receipt;
use alloy_primitives::B256;
use async_trait::async_trait;
use mel_extraction::{
    errors::{MelError, MelErrorKind},
    traits::ReceiptFetcher,
    ParentChainBlock,
};
use thiserror::Error;

/// An error fetching a receipt of a block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockReceiptError {
    /// The block has no transaction at the index.
    #[error("block {block} has no transaction {index}")]
    MissingTransaction {
        /// The block number.
        block: u64,
        /// The transaction index.
        index: u64,
    },
    /// The reader does not know the receipt.
    #[error("receipt of transaction {0} not found")]
    MissingReceipt(B256),
    /// The reader failed.
    #[error("{0}")]
    Reader(String),
}

impl From<BlockReceiptError> for MelErrorKind {
    fn from(err: BlockReceiptError) -> Self {
        MelError::Provider(err.to_string()).temp()
    }
}

/// A [ReceiptFetcher] resolving transaction indices of `block` to receipts.
#[derive(Debug)]
pub struct BlockReceiptFetcher<'a, R> {
    reader: &'a R,
    block: &'a ParentChainBlock,
}

impl<'a, R> BlockReceiptFetcher<'a, R> {
    /// Creates a fetcher for the transactions of `block`.
    pub const fn new(reader: &'a R, block: &'a ParentChainBlock) -> Self {
        Self { reader, block }
    }
}

#[async_trait]
impl<R: ParentChainReader> ReceiptFetcher for BlockReceiptFetcher<'_, R> {
    type Error = BlockReceiptError;

    async fn receipt_for_transaction_index(&self, tx_index: u64) -> Result<Receipt, Self::Error> {
        let tx = self.block.body.transactions.get(tx_index as usize).ok_or(
            BlockReceiptError::MissingTransaction {
                block: self.block.header.number,
                index: tx_index,
            },
        )?;
        let tx_hash = *tx.tx_hash();
        trace!(target: "mel-runner", "Fetching receipt of transaction {}", tx_hash);
        self.reader
            .transaction_receipt(tx_hash)
            .await
            .map_err(|e| BlockReceiptError::Reader(e.to_string()))?
            .ok_or(BlockReceiptError::MissingReceipt(tx_hash))
    }
}

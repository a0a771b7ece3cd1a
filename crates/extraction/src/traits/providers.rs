//! Parent chain data providers.

use crate::errors::MelErrorKind;
use alloy_consensus::Receipt;
use async_trait::async_trait;
use core::fmt::Display;

/// Fetches receipts of the transactions in one parent chain block.
#[async_trait]
pub trait ReceiptFetcher: Send + Sync {
    /// The error type for the [ReceiptFetcher].
    type Error: Display + Into<MelErrorKind>;

    /// Returns the receipt of the transaction at `tx_index` in the block.
    async fn receipt_for_transaction_index(&self, tx_index: u64) -> Result<Receipt, Self::Error>;
}

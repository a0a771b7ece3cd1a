//! This module contains the traits describing the collaborators of message extraction.

mod providers;
pub use providers::ReceiptFetcher;

mod parsers;
pub use parsers::{
    BatchDeliveredEvent, BatchEventParser, BridgeEventParser, InboxMessageData,
    MessageDeliveredEvent,
};

mod database;
pub use database::{DelayedMessageDatabase, StateDatabase, StateFetcher};

mod dap;
pub use dap::{BlobReader, DapReader, KeysetValidationMode};

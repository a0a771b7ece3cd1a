//! Test utilities for `mel-extraction`.

mod builders;
pub use builders::{
    blob_tx, block_with_txs, call_tx, compress_brotli, delayed_message, encode_blobs, event_log,
    receipt, sequencer_payload, TestBlockBuilder,
};

mod providers;
pub use providers::{
    TestBlobReader, TestDapReader, TestDatabaseError, TestDelayedMessageDatabase,
    TestProviderError, TestReceiptFetcher, TestStateDatabase,
};

mod tracing;
pub use self::tracing::{trace_layer, CollectingLayer, TraceStorage};

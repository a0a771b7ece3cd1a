//! Scans parent chain blocks for inbox events.

mod batches;
pub use batches::{parse_batches_from_block, PostedBatch};

mod delayed;
pub use delayed::parse_delayed_messages_from_block;

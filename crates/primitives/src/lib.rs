#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod accumulator;
pub use accumulator::{calc_num_partials, MerkleAccumulator};

mod batch;
pub use batch::{BatchDataLocation, BatchMetadata, SequencerInboxBatch, TimeBounds};

mod delayed;
pub use delayed::DelayedInboxMessage;

mod message;
pub use message::{
    BatchDataStats, L1IncomingMessage, L1IncomingMessageHeader, L1MessageKind,
    MessageWithMetadata, BATCH_POSTER_ADDRESS, MAX_L2_MESSAGE_SIZE,
};

mod report;
pub use report::{legacy_batch_gas_cost, BatchPostingReport, BatchPostingReportError};

mod rlp;

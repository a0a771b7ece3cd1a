#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "test-utils")), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

/// Re-export commonly used types and traits.
pub mod prelude {
    pub use crate::{
        backlog::initialize_seen_unread_delayed_meta_deque,
        dap::{BlobDapReader, DapReaderRegistry},
        errors::{LinkageError, MelError, MelErrorKind, MelResult},
        extract::{extract_messages, ExtractedBlock},
        parser::SolEventParser,
        state::MelState,
        traits::{
            BatchEventParser, BlobReader, BridgeEventParser, DapReader, DelayedMessageDatabase,
            KeysetValidationMode, ReceiptFetcher, StateDatabase, StateFetcher,
        },
        ParentChainBlock,
    };
}

pub mod backlog;
pub mod dap;
pub mod deque;
pub mod errors;
pub mod extract;
pub mod lookup;
pub mod parser;
pub mod segments;
pub mod sequencer;
pub mod serialize;
pub mod state;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// A parent chain block as handed to extraction.
pub type ParentChainBlock = alloy_consensus::Block<alloy_consensus::TxEnvelope>;

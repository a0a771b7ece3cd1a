#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(any(test, feature = "test-utils")), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod config;
pub use config::{ExtractorConfig, DEFAULT_RETRY_INTERVAL_MS};

mod errors;
pub use errors::{ExtractorError, ExtractorResult};

mod fsm;
pub use fsm::{FsmState, PendingSave};

mod receipts;
pub use receipts::{BlockReceiptError, BlockReceiptFetcher};

mod traits;
pub use traits::{MessageConsumer, ParentChainReader};

mod extractor;
pub use extractor::MessageExtractor;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

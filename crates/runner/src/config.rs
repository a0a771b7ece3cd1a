//! Configuration of the [crate::MessageExtractor].

use alloy_primitives::B256;
use core::time::Duration;
use mel_extraction::traits::KeysetValidationMode;
use serde::{Deserialize, Serialize};

/// The wait between attempts when a block is not available yet or an action failed.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Configures a [crate::MessageExtractor].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    /// The parent chain block whose persisted state extraction resumes from.
    pub start_parent_chain_block_hash: B256,
    /// Milliseconds to wait before acting again after a retry.
    pub retry_interval_ms: u64,
    /// The deque length above which finalized, read entries are trimmed.
    pub delayed_meta_deque_capacity: usize,
    /// Passed to every DA reader.
    pub validate_keysets: KeysetValidationMode,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            start_parent_chain_block_hash: B256::ZERO,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            delayed_meta_deque_capacity: 0,
            validate_keysets: KeysetValidationMode::Validate,
        }
    }
}

impl ExtractorConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns the retry interval. A zero interval falls back to the default.
    pub const fn retry_interval(&self) -> Duration {
        match self.retry_interval_ms {
            0 => Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

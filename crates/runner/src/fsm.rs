//! The states of the [crate::MessageExtractor].

use core::fmt;
use mel_extraction::{extract::ExtractedBlock, state::MelState};

/// The state the extractor acts on next. Each variant carries the data its action needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FsmState {
    /// Resolve the starting state.
    #[default]
    Start,
    /// Extract the block after the carried state.
    ProcessingNextBlock(MelState),
    /// Persist an extracted block.
    SavingMessages(Box<PendingSave>),
    /// The block after the carried state does not extend it. Rewind to the previous state.
    Reorging(MelState),
}

impl FsmState {
    /// Returns the name of the state.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::ProcessingNextBlock(_) => "ProcessingNextBlock",
            Self::SavingMessages(_) => "SavingMessages",
            Self::Reorging(_) => "Reorging",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An extracted block waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    /// The message count before the block.
    pub pre_state_msg_count: u64,
    /// The extraction output.
    pub extracted: ExtractedBlock,
}

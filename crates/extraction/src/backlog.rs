//! Rebuilds the seen but unread delayed meta deque of a loaded state.

use crate::{
    deque::{DelayedMeta, DelayedMetaDeque},
    errors::{MelError, MelErrorKind, MelResult},
    state::MelState,
    traits::StateDatabase,
};
use mel_primitives::{DelayedInboxMessage, MerkleAccumulator};

/// Populates the deque of `state` from persisted states and delayed messages.
///
/// The window starts at the read count of the finalized state when `finalized_block` is given
/// and that count is lower than the state's own, otherwise at the state's read count. States are
/// walked back from `state` until one has seen no more than the window start, then the stored
/// delayed messages are replayed forward. Every traversed state's persisted seen root is checked
/// along the way.
pub async fn initialize_seen_unread_delayed_meta_deque<D>(
    state: &mut MelState,
    db: &D,
    finalized_block: Option<u64>,
) -> MelResult<()>
where
    D: StateDatabase + ?Sized,
{
    let head_read = state.delayed_messages_read;
    let head_seen = state.delayed_messages_seen;
    let mut target = head_read;
    if let Some(number) = finalized_block.filter(|n| *n < state.parent_chain_block_number) {
        if let Some(finalized) = db.state(number).await.map_err(Into::<MelErrorKind>::into)? {
            target = target.min(finalized.delayed_messages_read);
        }
    }

    if target >= head_seen {
        state.set_seen_unread_delayed_meta_deque(DelayedMetaDeque::new());
        return Ok(());
    }

    // Newest first. The walk stops at the first state that had seen no more than `target`.
    let mut chain = vec![state.clone()];
    let mut base_partials = Vec::new();
    loop {
        let Some(cursor) = chain.last() else {
            break;
        };
        if cursor.delayed_messages_seen <= target {
            if let Some(base) = chain.pop() {
                base_partials = base.delayed_message_merkle_partials;
            }
            break;
        }
        let Some(number) = cursor.parent_chain_block_number.checked_sub(1) else {
            break;
        };
        let previous = db
            .state(number)
            .await
            .map_err(Into::<MelErrorKind>::into)?
            .ok_or(MelError::MissingState(number).crit())?;
        chain.push(previous);
    }

    let mut acc = MerkleAccumulator::from_partials(&base_partials);
    let mut deque = DelayedMetaDeque::new();
    let mut init_message: Option<DelayedInboxMessage> = None;
    for observed in chain.iter().rev() {
        for index in acc.size()..observed.delayed_messages_seen {
            let message = db
                .delayed_message(index)
                .await
                .map_err(Into::<MelErrorKind>::into)?
                .ok_or(MelError::MissingDelayedMessage(index).crit())?;
            acc.append(message.hash());
            if index >= target {
                deque.add(DelayedMeta {
                    index,
                    read: index < head_read,
                    merkle_root: acc.root(),
                    mel_state_parent_chain_block_num: observed.parent_chain_block_number,
                })?;
            }
            if index == 0 {
                init_message = Some(message);
            }
        }
        if acc.root() != observed.delayed_message_accumulator {
            return Err(MelError::SeenRootMismatch(observed.parent_chain_block_number).crit());
        }
    }

    if let Some(message) = init_message {
        deque.set_init_message(message);
    }
    debug!(
        target: "mel-extraction",
        "Initialized delayed meta deque of block {} with {} entries from index {}",
        state.parent_chain_block_number,
        deque.len(),
        target
    );
    state.set_seen_unread_delayed_meta_deque(deque);
    Ok(())
}

//! Builders for parent chain blocks, transactions and batch payloads.

use super::providers::TestReceiptFetcher;
use crate::{parser::abi, state::MelState, ParentChainBlock};
use alloy_consensus::{
    BlockBody, Header, Receipt, SignableTransaction, TxEip4844, TxEip4844Variant, TxEnvelope,
    TxLegacy,
};
use alloy_eips::eip4844::{Blob, BYTES_PER_BLOB};
use alloy_primitives::{keccak256, Address, Bytes, Log, Signature, TxKind, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use mel_primitives::{
    DelayedInboxMessage, L1IncomingMessage, L1IncomingMessageHeader, L1MessageKind,
};
use std::io::Write;

const SENDER: Address = Address::repeat_byte(0x77);
const BASE_FEE: u64 = 7;
const TIMESTAMP: u64 = 1_700_000_000;

fn signature() -> Signature {
    Signature::new(U256::from(1), U256::from(1), false)
}

/// Returns a legacy transaction calling `to` with `input`.
pub fn call_tx(to: Address, input: Bytes) -> TxEnvelope {
    let tx = TxLegacy { to: TxKind::Call(to), input, ..Default::default() };
    TxEnvelope::Legacy(tx.into_signed(signature()))
}

/// Returns a blob transaction to `to` referencing `hashes`.
pub fn blob_tx(to: Address, hashes: Vec<B256>) -> TxEnvelope {
    let tx = TxEip4844 { to, blob_versioned_hashes: hashes, ..Default::default() };
    TxEnvelope::Eip4844(TxEip4844Variant::TxEip4844(tx).into_signed(signature()))
}

/// Returns a block holding `txs`.
pub fn block_with_txs(number: u64, parent_hash: B256, txs: Vec<TxEnvelope>) -> ParentChainBlock {
    ParentChainBlock {
        header: Header { number, parent_hash, ..Default::default() },
        body: BlockBody { transactions: txs, ommers: Vec::new(), withdrawals: None },
    }
}

/// Returns a successful receipt carrying `logs`.
pub fn receipt(logs: Vec<Log>) -> Receipt {
    Receipt { status: true.into(), cumulative_gas_used: 0, logs }
}

/// Returns `event` as emitted by `address`.
pub fn event_log<E: SolEvent>(address: Address, event: &E) -> Log {
    Log { address, data: event.encode_log_data() }
}

/// Returns a distinct delayed message for `index`.
pub fn delayed_message(index: u64) -> DelayedInboxMessage {
    DelayedInboxMessage {
        block_hash: B256::with_last_byte(index as u8),
        before_inbox_acc: B256::ZERO,
        message: L1IncomingMessage {
            header: L1IncomingMessageHeader {
                kind: L1MessageKind::EthDeposit,
                poster: SENDER,
                block_number: index,
                timestamp: TIMESTAMP + index,
                request_id: Some(B256::from(U256::from(index))),
                l1_base_fee: Some(U256::from(BASE_FEE)),
            },
            l2_msg: Bytes::from(index.to_be_bytes().to_vec()),
            ..Default::default()
        },
    }
}

/// Brotli compresses `data` at the highest quality.
pub fn compress_brotli(data: &[u8]) -> Vec<u8> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer.write_all(data).expect("writing to a vec cannot fail");
    writer.into_inner()
}

/// Returns a brotli payload carrying `segments`, header byte included.
pub fn sequencer_payload(segments: &[Vec<u8>]) -> Vec<u8> {
    let stream: Vec<u8> =
        segments.iter().flat_map(|segment| alloy_rlp::encode(segment.as_slice())).collect();
    let mut payload = vec![0u8];
    payload.extend(compress_brotli(&stream));
    payload
}

/// Spreads `data` over as many blobs as needed, 31 bytes per field element.
pub fn encode_blobs(data: &[u8]) -> Vec<Blob> {
    let encoded = alloy_rlp::encode(data);
    let per_blob = BYTES_PER_BLOB / 32 * 31;
    encoded
        .chunks(per_blob)
        .map(|chunk| {
            let mut blob = Blob::ZERO;
            for (i, piece) in chunk.chunks(31).enumerate() {
                let start = i * 32 + 1;
                blob.0[start..start + piece.len()].copy_from_slice(piece);
            }
            blob
        })
        .collect()
}

/// Builds the block that follows a state, with its receipts.
///
/// Delayed messages and batches are delivered in call order. Every batch also delivers the batch
/// posting report that commits to its data.
#[derive(Debug, Clone)]
pub struct TestBlockBuilder {
    number: u64,
    parent_hash: B256,
    batch_inbox: Address,
    bridge: Address,
    next_delayed_index: u64,
    inbox_acc: B256,
    txs: Vec<TxEnvelope>,
    receipts: Vec<Receipt>,
}

impl TestBlockBuilder {
    /// Starts the block after `state`.
    pub fn new(state: &MelState) -> Self {
        Self {
            number: state.parent_chain_block_number + 1,
            parent_hash: state.parent_chain_block_hash,
            batch_inbox: state.batch_posting_target_address,
            bridge: state.delayed_message_posting_target_address,
            next_delayed_index: state.delayed_messages_seen,
            inbox_acc: B256::ZERO,
            txs: Vec::new(),
            receipts: Vec::new(),
        }
    }

    /// Overrides the parent hash.
    pub fn parent_hash(&mut self, parent_hash: B256) -> &mut Self {
        self.parent_hash = parent_hash;
        self
    }

    /// Delivers a delayed message with an inline payload.
    pub fn with_delayed_message(&mut self, kind: L1MessageKind, data: Bytes) -> &mut Self {
        let index = self.next_delayed_index;
        self.next_delayed_index += 1;

        let delivered = abi::MessageDelivered {
            messageIndex: U256::from(index),
            beforeInboxAcc: self.inbox_acc,
            inbox: self.bridge,
            kind: kind.into(),
            sender: SENDER,
            messageDataHash: keccak256(&data),
            baseFeeL1: U256::from(BASE_FEE),
            timestamp: TIMESTAMP,
        };
        let message = DelayedInboxMessage {
            block_hash: B256::ZERO,
            before_inbox_acc: self.inbox_acc,
            message: L1IncomingMessage {
                header: L1IncomingMessageHeader {
                    kind,
                    poster: SENDER,
                    block_number: self.number,
                    timestamp: TIMESTAMP,
                    request_id: Some(B256::from(U256::from(index))),
                    l1_base_fee: Some(U256::from(BASE_FEE)),
                },
                l2_msg: data.clone(),
                ..Default::default()
            },
        };
        self.inbox_acc = message.after_inbox_acc();

        let inline = abi::InboxMessageDelivered { messageNum: U256::from(index), data };
        self.txs.push(call_tx(self.bridge, Bytes::new()));
        self.receipts.push(receipt(vec![
            event_log(self.bridge, &delivered),
            event_log(self.bridge, &inline),
        ]));
        self
    }

    /// Posts batch `seq` carrying `segments` in calldata, with its posting report.
    pub fn with_batch(&mut self, seq: u64, after_delayed: u64, segments: &[Vec<u8>]) -> &mut Self {
        let data = sequencer_payload(segments);
        let mut serialized: Vec<u8> = [0, u64::MAX, 0, u64::MAX, after_delayed]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        serialized.extend_from_slice(&data);
        self.with_batch_and_report_hash(seq, after_delayed, segments, keccak256(serialized))
    }

    /// Posts batch `seq` with a posting report committing to `data_hash`.
    pub fn with_batch_and_report_hash(
        &mut self,
        seq: u64,
        after_delayed: u64,
        segments: &[Vec<u8>],
        data_hash: B256,
    ) -> &mut Self {
        let mut report = Vec::with_capacity(32 + 20 + 32 + 32 + 32 + 8);
        report.extend_from_slice(&U256::from(TIMESTAMP).to_be_bytes::<32>());
        report.extend_from_slice(SENDER.as_slice());
        report.extend_from_slice(data_hash.as_slice());
        report.extend_from_slice(&U256::from(seq).to_be_bytes::<32>());
        report.extend_from_slice(&U256::from(BASE_FEE).to_be_bytes::<32>());
        report.extend_from_slice(&0u64.to_be_bytes());
        self.with_delayed_message(L1MessageKind::BatchPostingReport, report.into());

        let call = abi::addSequencerL2BatchFromOriginCall {
            sequenceNumber: U256::from(seq),
            data: sequencer_payload(segments).into(),
            afterDelayedMessagesRead: U256::from(after_delayed),
            gasRefunder: Address::ZERO,
            prevMessageCount: U256::ZERO,
            newMessageCount: U256::ZERO,
        };
        let delivered = abi::SequencerBatchDelivered {
            batchSequenceNumber: U256::from(seq),
            beforeAcc: B256::with_last_byte(seq as u8),
            afterAcc: B256::with_last_byte(seq as u8 + 1),
            delayedAcc: B256::ZERO,
            afterDelayedMessagesRead: U256::from(after_delayed),
            timeBounds: abi::TimeBounds {
                minTimestamp: 0,
                maxTimestamp: u64::MAX,
                minBlockNumber: 0,
                maxBlockNumber: u64::MAX,
            },
            dataLocation: 0,
        };
        self.txs.push(call_tx(self.batch_inbox, call.abi_encode().into()));
        self.receipts.push(receipt(vec![event_log(self.batch_inbox, &delivered)]));
        self
    }

    /// Returns the block and a receipt fetcher serving its receipts.
    pub fn build(self) -> (ParentChainBlock, TestReceiptFetcher) {
        (block_with_txs(self.number, self.parent_hash, self.txs), TestReceiptFetcher::new(self.receipts))
    }
}

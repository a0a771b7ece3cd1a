//! Batch posting reports.

use crate::message::BatchDataStats;
use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;
const KECCAK256_GAS: u64 = 30;
const KECCAK256_WORD_GAS: u64 = 6;
const SSTORE_SET_GAS: u64 = 20_000;

/// An error decoding a batch posting report.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPostingReportError {
    /// The report ended before a required field.
    #[error("batch posting report too short reading {0}")]
    UnexpectedEof(&'static str),
    /// The batch number does not fit in a u64.
    #[error("batch posting report batch number overflows u64")]
    BatchNumberOverflow,
}

/// The fields of a batch posting report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPostingReport {
    /// Timestamp of the posting.
    pub batch_timestamp: U256,
    /// The account that posted the batch.
    pub batch_poster: Address,
    /// Hash of the serialized batch.
    pub data_hash: B256,
    /// Sequence number of the batch.
    pub batch_number: u64,
    /// Parent chain base fee at posting.
    pub l1_base_fee: U256,
    /// Extra gas charged to the poster.
    pub extra_gas: u64,
}

impl BatchPostingReport {
    /// Decodes the report fields from a message payload.
    pub fn decode(mut data: &[u8]) -> Result<Self, BatchPostingReportError> {
        let batch_timestamp = U256::from_be_bytes(take::<32>(&mut data, "batch timestamp")?);
        let batch_poster = Address::from(take::<20>(&mut data, "batch poster")?);
        let data_hash = B256::from(take::<32>(&mut data, "data hash")?);
        let batch_number = U256::from_be_bytes(take::<32>(&mut data, "batch number")?);
        let batch_number =
            u64::try_from(batch_number).map_err(|_| BatchPostingReportError::BatchNumberOverflow)?;
        let l1_base_fee = U256::from_be_bytes(take::<32>(&mut data, "base fee")?);
        let extra_gas = match take::<8>(&mut data, "extra gas") {
            Ok(raw) => u64::from_be_bytes(raw),
            Err(_) => 0,
        };
        Ok(Self { batch_timestamp, batch_poster, data_hash, batch_number, l1_base_fee, extra_gas })
    }
}

/// Returns the legacy gas cost of posting a batch with the given stats.
pub const fn legacy_batch_gas_cost(stats: &BatchDataStats) -> u64 {
    let zeros = stats.length - stats.non_zeros;
    let mut gas = TX_DATA_ZERO_GAS * zeros + TX_DATA_NON_ZERO_GAS * stats.non_zeros;
    let words = stats.length.div_ceil(32);
    gas += KECCAK256_GAS + words * KECCAK256_WORD_GAS;
    gas += 2 * SSTORE_SET_GAS;
    gas
}

fn take<const N: usize>(
    data: &mut &[u8],
    field: &'static str,
) -> Result<[u8; N], BatchPostingReportError> {
    if data.len() < N {
        return Err(BatchPostingReportError::UnexpectedEof(field));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    *data = &data[N..];
    Ok(out)
}

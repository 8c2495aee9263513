//!
//! Read queries over settled state.
//!

use {
    super::{allocator, StoreTx, UNIVERSE_BLOCK, UNIVERSE_OUTPUT, UNIVERSE_TX},
    crate::{
        converter::{self, ContractTransfer},
        data_model::{Amount, BlockId, OutputRecord, TxHash, H160, H256},
        error::Result,
        fatal,
    },
};

/// Encoded output record at `index`.
pub fn read_output_index(stx: &StoreTx, index: u64) -> Result<Option<Vec<u8>>> {
    stx.load(UNIVERSE_OUTPUT, "record", &index.to_be_bytes(), "")
}

/// Decoded output record at `index`.
pub fn get_output(stx: &StoreTx, index: u64) -> Result<Option<OutputRecord>> {
    stx.load_obj(UNIVERSE_OUTPUT, "record", &index.to_be_bytes(), "")
}

/// Global index of the first output of `tx_hash`, `-1` when it has none.
pub fn find_tx_output_index(stx: &StoreTx, tx_hash: &TxHash) -> Result<i64> {
    match stx.load_u64(UNIVERSE_TX, "output-index", tx_hash.as_bytes(), "")? {
        None => Ok(-1),
        Some(i) => i64::try_from(i).map_err(|_| fatal!("global index {} out of range", i)),
    }
}

/// `[start, end)` of the outputs of a settled block.
pub fn get_block_output_index(stx: &StoreTx, block_id: &BlockId) -> Result<Option<(u64, u64)>> {
    let start = stx.load_u64(UNIVERSE_BLOCK, "bounds", block_id.as_bytes(), "start")?;
    let end = stx.load_u64(UNIVERSE_BLOCK, "bounds", block_id.as_bytes(), "end")?;
    match (start, end) {
        (Some(s), Some(e)) if s <= e => Ok(Some((s, e))),
        (None, None) => Ok(None),
        _ => Err(fatal!("broken output bounds of block {:?}", block_id)),
    }
}

#[allow(missing_docs)]
pub fn get_state_root(stx: &StoreTx, block_id: &BlockId) -> Result<Option<H256>> {
    converter::get_state_root(stx, block_id)
}

#[allow(missing_docs)]
pub fn get_contract_transfer(stx: &StoreTx, tx_hash: &TxHash) -> Result<Option<ContractTransfer>> {
    converter::get_contract_transfer(stx, tx_hash)
}

#[allow(missing_docs)]
pub fn get_contract_address(stx: &StoreTx, tx_hash: &TxHash) -> Result<Option<H160>> {
    converter::get_contract_address(stx, tx_hash)
}

/// `(this block, cumulative)` destroyed coins.
pub fn get_block_destroyed(stx: &StoreTx, block_id: &BlockId) -> Result<Option<(Amount, Amount)>> {
    allocator::block_destroyed(stx, block_id)
}

/// Every output record of a settled block, in index order.
pub fn block_outputs(stx: &StoreTx, block_id: &BlockId) -> Result<Vec<OutputRecord>> {
    let (start, end) = match get_block_output_index(stx, block_id)? {
        Some(b) => b,
        None => return Ok(vec![]),
    };
    (start..end)
        .map(|i| get_output(stx, i)?.ok_or_else(|| fatal!("gap at global index {}", i)))
        .collect()
}

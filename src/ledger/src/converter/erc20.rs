//! ERC20 transfer events of contract calls.

use {
    crate::data_model::{keccak_256, TxHash, H160, H256, U256},
    lazy_static::lazy_static,
    serde::{Deserialize, Serialize},
};

use super::engine::Log;

lazy_static! {
    /// Keccak256("Transfer(address,address,uint256)")
    ///
    /// event Transfer(address indexed from, address indexed to, uint256 value);
    pub static ref TRANSFER_EVENT_SELECTOR: H256 =
        H256::from(keccak_256(b"Transfer(address,address,uint256)"));
}

/// One ERC20 transfer seen in the logs of a contract call.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub tx_hash: TxHash,
    pub log_index: u32,
    // the token contract
    pub contract: H160,
    pub from: H160,
    pub to: H160,
    pub value: U256,
}

fn topic_address(topic: &H256) -> H160 {
    H160::from_slice(&topic.as_bytes()[12..])
}

/// Pick the transfer events out of `logs`, keeping their log positions.
pub fn scan_transfers(tx_hash: &TxHash, logs: &[Log]) -> Vec<TokenTransfer> {
    logs.iter()
        .enumerate()
        .filter(|(_, log)| {
            3 == log.topics.len()
                && log.topics[0] == *TRANSFER_EVENT_SELECTOR
                && 32 <= log.data.len()
        })
        .map(|(i, log)| TokenTransfer {
            tx_hash: *tx_hash,
            log_index: i as u32,
            contract: log.address,
            from: topic_address(&log.topics[1]),
            to: topic_address(&log.topics[2]),
            value: U256::from_big_endian(&log.data[..32]),
        })
        .collect()
}

/// Log a token contract emits for `from -> to` of `value`.
pub fn transfer_log(contract: H160, from: H160, to: H160, value: U256) -> Log {
    let mut data = [0u8; 32];
    value.to_big_endian(&mut data);
    Log {
        address: contract,
        topics: vec![*TRANSFER_EVENT_SELECTOR, from.into(), to.into()],
        data: data.to_vec(),
    }
}

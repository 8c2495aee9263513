//!
//! Interface of the account-state contract engine.
//!

use {
    crate::{
        data_model::{BlockId, BlockHeight, TxHash, H160, H256, U256},
        error::Result,
        reject,
    },
    config::settle::SettleConfig,
    serde::{Deserialize, Serialize},
};

/// Block and transaction facts visible to a contract call.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecContext {
    pub origin: H160,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub height: BlockHeight,
    pub timestamp: u64,
    pub block_id: BlockId,
    pub tx_hash: TxHash,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub from: H160,
    // None creates a contract
    pub to: Option<H160>,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
}

/// An event emitted during execution.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecResult {
    pub gas_used: u64,
    pub return_data: Vec<u8>,
    // set when the message created a contract
    pub contract_address: Option<H160>,
}

/// Gas left for the rest of the block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GasPool(u64);

impl GasPool {
    #[allow(missing_docs)]
    pub fn new(gas: u64) -> Self {
        GasPool(gas)
    }

    #[allow(missing_docs)]
    pub fn gas(&self) -> u64 {
        self.0
    }

    /// Reserve gas for a message, fails once the block is full.
    pub fn sub_gas(&mut self, amount: u64) -> Result<()> {
        let left = self
            .0
            .checked_sub(amount)
            .ok_or_else(|| reject!("block gas limit reached: {} < {}", self.0, amount))?;
        self.0 = left;
        Ok(())
    }

    /// Give back unused gas.
    pub fn add_gas(&mut self, amount: u64) {
        self.0 = self.0.saturating_add(amount);
    }
}

/// Gas limit and gas price of one call, each validated and defaulted on
/// its own.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GasSettings {
    pub gas_limit: u64,
    pub gas_price: u64,
}

impl GasSettings {
    #[allow(missing_docs)]
    pub fn resolve(gas: Option<u64>, gas_price: Option<u64>, cfg: &SettleConfig) -> Result<Self> {
        let gas_limit = match gas {
            Some(0) => return Err(reject!("gas limit can not be zero")),
            Some(g) if g > cfg.block_gas_limit => {
                return Err(reject!("gas limit {} above the block limit", g));
            }
            Some(g) => g,
            None => cfg.default_gas_limit,
        };
        let gas_price = match gas_price {
            Some(0) => return Err(reject!("gas price can not be zero")),
            Some(p) => p,
            None => cfg.default_gas_price,
        };
        Ok(GasSettings {
            gas_limit,
            gas_price,
        })
    }

    /// `gas_limit * gas_price`, paid up front.
    #[inline(always)]
    pub fn prepay(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.gas_price)
    }

    /// What goes back to the caller after execution.
    #[inline(always)]
    pub fn refund(&self, gas_used: u64) -> U256 {
        U256::from(self.gas_limit.saturating_sub(gas_used)) * U256::from(self.gas_price)
    }
}

/// Account-state ledger driven by the contract bridge.
///
/// Every method that can fail because of the caller's transaction returns
/// `SettleError::Collaborator`; anything else is fatal.
pub trait ContractEngine: Send {
    /// Execute one message, drawing its gas from `gas_pool`.
    fn apply_message(
        &mut self,
        ctx: &ExecContext,
        msg: &Message,
        gas_pool: &mut GasPool,
    ) -> Result<ExecResult>;

    /// Credit value moved in from the confidential ledger.
    fn deposit(&mut self, who: &H160, amount: U256) -> Result<()>;

    /// Debit value moved out to the confidential ledger.
    fn withdraw(&mut self, who: &H160, amount: U256) -> Result<()>;

    #[allow(missing_docs)]
    fn add_balance(&mut self, who: &H160, amount: U256) -> Result<()>;

    #[allow(missing_docs)]
    fn sub_balance(&mut self, who: &H160, amount: U256) -> Result<()>;

    #[allow(missing_docs)]
    fn get_balance(&self, who: &H160) -> U256;

    /// Logs emitted by a transaction of the running block.
    fn get_logs(&self, tx_hash: &TxHash) -> Vec<Log>;

    /// Mark the current state, returns the revision id.
    fn snapshot(&mut self) -> usize;

    /// Drop every change made after `revision`.
    fn revert_to_snapshot(&mut self, revision: usize);

    /// Commit the block's state, returns the new state root.
    fn commit(&mut self, height: BlockHeight) -> Result<H256>;

    /// Root of the last committed state.
    fn state_root(&self) -> Option<H256>;

    /// Throw away everything after `root`, `None` resets to genesis.
    fn reset_root(&mut self, root: Option<H256>) -> Result<()>;
}

//!
//! In-memory contract engine for tests.
//!
//! Understands just enough to drive the bridge: balances, plain value
//! transfers, contract creation and one fake token whose creation mints its
//! supply to the creator. A call whose payload is `fail` is rejected.
//!
//! Like a real engine, a call draws its whole gas limit from the block's
//! gas pool before the value transfer runs, so a failed transfer leaves
//! the pool drained unless the caller restores it.
//!

#![allow(missing_docs)]

use {
    crate::{
        converter::{
            engine::{ContractEngine, ExecContext, ExecResult, GasPool, Log, Message},
            erc20,
        },
        data_model::{hash_of, keccak_256, BlockHeight, TxHash, H160, H256, U256},
        error::Result,
        fatal, reject,
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

pub const TOKEN_SUPPLY: u64 = 1_000_000;

const TX_GAS: u64 = 21_000;
const BYTE_GAS: u64 = 16;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct State {
    balances: BTreeMap<H160, U256>,
    nonce: u64,
}

type Logs = BTreeMap<TxHash, Vec<Log>>;

#[derive(Debug, Default)]
pub struct MockEngine {
    state: State,
    logs: Logs,
    snapshots: Vec<(State, Logs)>,
    committed: BTreeMap<H256, State>,
    root: Option<H256>,
}

impl MockEngine {
    fn credit(&mut self, who: &H160, amount: U256) -> Result<()> {
        let b = self.state.balances.entry(*who).or_default();
        *b = b
            .checked_add(amount)
            .ok_or_else(|| reject!("balance overflow of {:?}", who))?;
        Ok(())
    }

    fn debit(&mut self, who: &H160, amount: U256) -> Result<()> {
        let b = self.state.balances.entry(*who).or_default();
        *b = b
            .checked_sub(amount)
            .ok_or_else(|| reject!("insufficient balance of {:?}", who))?;
        Ok(())
    }

    fn gas_of(msg: &Message) -> u64 {
        TX_GAS + BYTE_GAS * msg.data.len() as u64
    }
}

impl ContractEngine for MockEngine {
    fn apply_message(
        &mut self,
        ctx: &ExecContext,
        msg: &Message,
        gas_pool: &mut GasPool,
    ) -> Result<ExecResult> {
        if msg.data == b"fail" {
            return Err(reject!("execution reverted"));
        }
        let gas_used = Self::gas_of(msg);
        if gas_used > msg.gas_limit {
            return Err(reject!("out of gas: {} > {}", gas_used, msg.gas_limit));
        }
        gas_pool.sub_gas(msg.gas_limit)?;

        let contract_address = match msg.to {
            Some(to) => {
                if !msg.value.is_zero() {
                    self.debit(&msg.from, msg.value)?;
                    self.credit(&to, msg.value)?;
                }
                None
            }
            None => {
                let mut seed = msg.from.as_bytes().to_vec();
                seed.extend_from_slice(&self.state.nonce.to_be_bytes());
                self.state.nonce += 1;
                let addr = H160::from_slice(&keccak_256(&seed)[12..]);
                if msg.data == b"token" {
                    self.logs.entry(ctx.tx_hash).or_default().push(erc20::transfer_log(
                        addr,
                        H160::zero(),
                        msg.from,
                        U256::from(TOKEN_SUPPLY),
                    ));
                }
                Some(addr)
            }
        };

        gas_pool.add_gas(msg.gas_limit - gas_used);
        Ok(ExecResult {
            gas_used,
            return_data: vec![],
            contract_address,
        })
    }

    fn deposit(&mut self, who: &H160, amount: U256) -> Result<()> {
        self.credit(who, amount)
    }

    fn withdraw(&mut self, who: &H160, amount: U256) -> Result<()> {
        self.debit(who, amount)
    }

    fn add_balance(&mut self, who: &H160, amount: U256) -> Result<()> {
        self.credit(who, amount)
    }

    fn sub_balance(&mut self, who: &H160, amount: U256) -> Result<()> {
        self.debit(who, amount)
    }

    fn get_balance(&self, who: &H160) -> U256 {
        self.state.balances.get(who).copied().unwrap_or_default()
    }

    fn get_logs(&self, tx_hash: &TxHash) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push((self.state.clone(), self.logs.clone()));
        self.snapshots.len() - 1
    }

    fn revert_to_snapshot(&mut self, revision: usize) {
        if let Some((state, logs)) = self.snapshots.get(revision).cloned() {
            self.state = state;
            self.logs = logs;
            self.snapshots.truncate(revision);
        }
    }

    fn commit(&mut self, _height: BlockHeight) -> Result<H256> {
        let bytes = bincode::serialize(&self.state)?;
        let root = hash_of(&[bytes.as_slice()]);
        self.committed.insert(root, self.state.clone());
        self.root = Some(root);
        self.logs.clear();
        self.snapshots.clear();
        Ok(root)
    }

    fn state_root(&self) -> Option<H256> {
        self.root
    }

    fn reset_root(&mut self, root: Option<H256>) -> Result<()> {
        self.state = match root {
            None => State::default(),
            Some(r) => self
                .committed
                .get(&r)
                .cloned()
                .ok_or_else(|| fatal!("unknown state root {:?}", r))?,
        };
        self.root = root;
        self.logs.clear();
        self.snapshots.clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_returns_to_a_committed_state() {
        let who = H160::repeat_byte(1);
        let mut e = MockEngine::default();
        e.deposit(&who, U256::from(10)).unwrap();
        let root = e.commit(1).unwrap();

        e.deposit(&who, U256::from(5)).unwrap();
        e.commit(2).unwrap();
        assert_eq!(U256::from(15), e.get_balance(&who));

        e.reset_root(Some(root)).unwrap();
        assert_eq!(U256::from(10), e.get_balance(&who));
        assert_eq!(Some(root), e.state_root());
        assert!(e.reset_root(Some(H256::repeat_byte(9))).unwrap_err().is_fatal());
    }

    #[test]
    fn snapshot_reverts_balances_and_logs() {
        let who = H160::repeat_byte(1);
        let mut e = MockEngine::default();
        let rev = e.snapshot();
        e.deposit(&who, U256::from(10)).unwrap();
        assert!(e.withdraw(&who, U256::from(11)).is_err());
        e.revert_to_snapshot(rev);
        assert_eq!(U256::zero(), e.get_balance(&who));
    }
}

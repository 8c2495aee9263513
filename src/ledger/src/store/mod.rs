//!
//! # Settlement store
//!
//! Every record lives in one keyed object store addressed by
//! `(universe, category, key, attribute)`. All mutations of one block go
//! through a single [`StoreTx`] that is committed exactly once, so a failed
//! block leaves nothing behind.
//!

pub mod allocator;
pub mod api;
#[cfg(test)]
pub(crate) mod helpers;
#[cfg(test)]
mod test;

use {
    crate::{
        confidential::{ConfidentialCrypto, RistrettoCrypto},
        converter::{self, engine::ContractEngine},
        data_model::{Amount, Block, BlockId, Transaction, TxHash, H256},
        error::{Result, SettleError},
        fatal,
        staking::reward::RewardSplit,
    },
    allocator::BlockSummary,
    byteorder::{BigEndian, ByteOrder},
    config::settle::SettleConfig,
    parking_lot::RwLock,
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::collections::BTreeMap,
    tracing::{debug, info, warn},
};

/// Output records, keyed by the 8-byte big-endian global index.
pub const UNIVERSE_OUTPUT: &str = "output";
/// Per-block facts: rewards, validity marks, bounds, roots, undo data.
pub const UNIVERSE_BLOCK: &str = "block";
/// Transaction bodies and their first output index.
pub const UNIVERSE_TX: &str = "tx";
/// Pool/share registry, epoch tables and the bonus reserve.
pub const UNIVERSE_STAKE: &str = "stake";
/// Contract ledger side records.
pub const UNIVERSE_CONTRACT: &str = "contract";
/// Token ledger entries and ERC20 transfers.
pub const UNIVERSE_TOKEN: &str = "token";
/// Chain-wide counters.
pub const UNIVERSE_META: &str = "meta";

const SEPARATOR: u8 = b'/';

/// Raw mutations, `None` deletes the key.
pub type WriteBatch = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// Keyed object store engine.
pub trait KvStore: Send + Sync {
    /// Read one raw value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply a batch atomically.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;
}

/// In-memory engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Every raw pair, in key order.
    pub fn dump(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.map
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        for (k, v) in batch {
            match v {
                Some(v) => {
                    self.map.insert(k, v);
                }
                None => {
                    self.map.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// `universe/category/attr/` followed by the raw key bytes.
pub fn compose_key(universe: &str, category: &str, key: &[u8], attr: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(
        universe.len() + category.len() + attr.len() + key.len() + 3,
    );
    k.extend_from_slice(universe.as_bytes());
    k.push(SEPARATOR);
    k.extend_from_slice(category.as_bytes());
    k.push(SEPARATOR);
    k.extend_from_slice(attr.as_bytes());
    k.push(SEPARATOR);
    k.extend_from_slice(key);
    k
}

/// Atomic store transaction with read-your-writes semantics.
///
/// When journaling is on, the first write to every key records the value
/// it replaced, which is enough to undo the whole transaction later.
pub struct StoreTx<'a> {
    base: &'a dyn KvStore,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    journal: Option<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'a> StoreTx<'a> {
    #[allow(missing_docs)]
    pub fn new(base: &'a dyn KvStore) -> Self {
        StoreTx {
            base,
            overlay: BTreeMap::new(),
            journal: None,
        }
    }

    #[allow(missing_docs)]
    pub fn journaled(base: &'a dyn KvStore) -> Self {
        StoreTx {
            journal: Some(BTreeMap::new()),
            ..Self::new(base)
        }
    }

    #[allow(missing_docs)]
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.overlay.get(key) {
            Some(v) => Ok(v.clone()),
            None => self.base.get(key),
        }
    }

    #[allow(missing_docs)]
    pub fn set_raw(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        let first_touch = self
            .journal
            .as_ref()
            .map(|j| !j.contains_key(&key))
            .unwrap_or(false);
        if first_touch {
            let prev = self.get_raw(&key)?;
            if let Some(j) = self.journal.as_mut() {
                j.insert(key.clone(), prev);
            }
        }
        self.overlay.insert(key, value);
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn load(
        &self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.get_raw(&compose_key(universe, category, key, attr))
    }

    #[allow(missing_docs)]
    pub fn store(
        &mut self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.set_raw(compose_key(universe, category, key, attr), Some(value))
    }

    #[allow(missing_docs)]
    pub fn delete(
        &mut self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
    ) -> Result<()> {
        self.set_raw(compose_key(universe, category, key, attr), None)
    }

    #[allow(missing_docs)]
    pub fn contains(
        &self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
    ) -> Result<bool> {
        self.load(universe, category, key, attr).map(|v| v.is_some())
    }

    /// Load a big-endian u64, malformed values are fatal.
    pub fn load_u64(
        &self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
    ) -> Result<Option<u64>> {
        match self.load(universe, category, key, attr)? {
            None => Ok(None),
            Some(v) if 8 == v.len() => Ok(Some(BigEndian::read_u64(&v))),
            Some(v) => Err(fatal!(
                "malformed u64 at {}/{}/{}: {} bytes",
                universe,
                category,
                attr,
                v.len()
            )),
        }
    }

    #[allow(missing_docs)]
    pub fn store_u64(
        &mut self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
        value: u64,
    ) -> Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, value);
        self.store(universe, category, key, attr, buf.to_vec())
    }

    /// Load a bincode record, undecodable bytes are fatal.
    pub fn load_obj<T: DeserializeOwned>(
        &self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
    ) -> Result<Option<T>> {
        self.load(universe, category, key, attr)?
            .map(|v| {
                bincode::deserialize(&v).map_err(|e| {
                    fatal!("malformed record at {}/{}/{}: {}", universe, category, attr, e)
                })
            })
            .transpose()
    }

    #[allow(missing_docs)]
    pub fn store_obj<T: Serialize>(
        &mut self,
        universe: &str,
        category: &str,
        key: &[u8],
        attr: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.store(universe, category, key, attr, bytes)
    }

    /// Stop journaling and hand out what was captured.
    pub fn take_journal(&mut self) -> WriteBatch {
        self.journal
            .take()
            .map(|j| j.into_iter().collect())
            .unwrap_or_default()
    }

    #[allow(missing_docs)]
    pub fn into_batch(self) -> WriteBatch {
        self.overlay.into_iter().collect()
    }
}

/// Undo data saved with every settled block.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UndoRecord {
    // previous value of every key the block touched
    journal: WriteBatch,
    // contract state root before the block
    engine_root: Option<H256>,
}

/// What one settled block produced.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SettleSummary {
    /// first global index of the block
    pub start: u64,
    /// next free global index after the block
    pub end: u64,
    #[allow(missing_docs)]
    pub split: RewardSplit,
    /// coins destroyed by this block
    pub destroyed: Amount,
    /// contract transactions that went through the bridge
    pub contract_txs: usize,
}

/// Persist a transaction body, returns its hash.
pub fn put_transaction(stx: &mut StoreTx, tx: &Transaction) -> Result<TxHash> {
    let hash = tx.hash()?;
    stx.store_obj(UNIVERSE_TX, "body", hash.as_bytes(), "", tx)?;
    Ok(hash)
}

#[allow(missing_docs)]
pub fn get_transaction(stx: &StoreTx, hash: &TxHash) -> Result<Option<Transaction>> {
    stx.load_obj(UNIVERSE_TX, "body", hash.as_bytes(), "")
}

fn pair_key(a: &H256, b: &H256) -> Vec<u8> {
    let mut k = a.as_bytes().to_vec();
    k.extend_from_slice(b.as_bytes());
    k
}

/// Mark `tx` as accepted by `block`.
pub fn mark_tx_valid(stx: &mut StoreTx, block: &BlockId, tx: &TxHash) -> Result<()> {
    stx.store(UNIVERSE_BLOCK, "tx-valid", &pair_key(block, tx), "", vec![1])
}

#[allow(missing_docs)]
pub fn is_tx_valid(stx: &StoreTx, block: &BlockId, tx: &TxHash) -> Result<bool> {
    stx.contains(UNIVERSE_BLOCK, "tx-valid", &pair_key(block, tx), "")
}

/// Mark the token sub-transaction of `tx` as accepted by `block`.
pub fn mark_token_valid(stx: &mut StoreTx, block: &BlockId, tx: &TxHash) -> Result<()> {
    stx.store(UNIVERSE_BLOCK, "token-valid", &pair_key(block, tx), "", vec![1])
}

#[allow(missing_docs)]
pub fn is_token_valid(stx: &StoreTx, block: &BlockId, tx: &TxHash) -> Result<bool> {
    stx.contains(UNIVERSE_BLOCK, "token-valid", &pair_key(block, tx), "")
}

/// Record the total and base reward of a block.
pub fn record_block_reward(
    stx: &mut StoreTx,
    block: &BlockId,
    total: Amount,
    base: Amount,
) -> Result<()> {
    stx.store_u64(UNIVERSE_BLOCK, "reward", block.as_bytes(), "total", total)?;
    stx.store_u64(UNIVERSE_BLOCK, "reward", block.as_bytes(), "base", base)
}

/// `(total, base)`, both or nothing.
pub fn block_reward(stx: &StoreTx, block: &BlockId) -> Result<Option<(Amount, Amount)>> {
    let total = stx.load_u64(UNIVERSE_BLOCK, "reward", block.as_bytes(), "total")?;
    let base = stx.load_u64(UNIVERSE_BLOCK, "reward", block.as_bytes(), "base")?;
    match (total, base) {
        (Some(t), Some(b)) => Ok(Some((t, b))),
        (None, None) => Ok(None),
        _ => Err(fatal!("half-written reward of block {:?}", block)),
    }
}

struct Inner<S, E> {
    store: S,
    engine: E,
}

/// Chain-wide settlement state.
///
/// One exclusive lock serializes settle and revert, queries take it shared.
pub struct Settlement<S, E, C = RistrettoCrypto> {
    cfg: SettleConfig,
    crypto: C,
    inner: RwLock<Inner<S, E>>,
}

impl<S, E, C> Settlement<S, E, C>
where
    S: KvStore,
    E: ContractEngine,
    C: ConfidentialCrypto,
{
    #[allow(missing_docs)]
    pub fn new(cfg: SettleConfig, store: S, engine: E, crypto: C) -> Result<Self> {
        cfg.validate()
            .map_err(|e| fatal!("invalid settlement config: {}", e))?;
        Ok(Settlement {
            cfg,
            crypto,
            inner: RwLock::new(Inner { store, engine }),
        })
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &SettleConfig {
        &self.cfg
    }

    #[allow(missing_docs)]
    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Write block-acceptance facts (rewards, transaction bodies, validity
    /// marks) in one atomic store transaction.
    pub fn record<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreTx) -> Result<T>,
    {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let (batch, ret) = {
            let mut stx = StoreTx::new(&inner.store);
            let ret = f(&mut stx)?;
            (stx.into_batch(), ret)
        };
        inner.store.commit(batch)?;
        Ok(ret)
    }

    /// Run a read-only query against the committed state.
    pub fn query<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreTx) -> Result<T>,
    {
        let guard = self.inner.read();
        f(&StoreTx::new(&guard.store))
    }

    /// Borrow the contract engine.
    pub fn with_engine<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&E) -> T,
    {
        f(&self.inner.read().engine)
    }

    /// Borrow the store engine.
    pub fn with_store<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        f(&self.inner.read().store)
    }

    /// Settle one block: allocate all of its outputs, run its contract
    /// transactions and commit everything at once.
    pub fn settle_block(&self, block: &Block) -> Result<SettleSummary> {
        let mut guard = self.inner.write();
        let Inner { store, engine } = &mut *guard;

        let engine_root = engine.state_root();
        let res = self
            .settle_inner(&*store, engine, block, engine_root)
            .and_then(|(batch, summary)| store.commit(batch).map(|_| summary));

        match res {
            Ok(summary) => {
                info!(
                    height = block.height,
                    start = summary.start,
                    end = summary.end,
                    pow = summary.split.pow_reward,
                    pos = summary.split.pos_reward,
                    destroyed = summary.destroyed,
                    "block settled"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(height = block.height, error = %e, "block settlement aborted");
                if let Err(re) = engine.reset_root(engine_root) {
                    warn!(error = %re, "contract engine rewind failed");
                }
                Err(e)
            }
        }
    }

    fn settle_inner(
        &self,
        store: &S,
        engine: &mut E,
        block: &Block,
        engine_root: Option<H256>,
    ) -> Result<(WriteBatch, SettleSummary)> {
        let mut stx = StoreTx::journaled(store);

        if api::get_block_output_index(&stx, &block.id)?.is_some() {
            return Err(fatal!("block {:?} is already settled", block.id));
        }
        if let Some(prev) = block.prev_id {
            stx.store(UNIVERSE_BLOCK, "parent", block.id.as_bytes(), "", prev.as_bytes().to_vec())?;
        }

        let contract_txs = if self.cfg.contract_fork_active(block.height) {
            converter::settle_contracts(&mut stx, &self.crypto, engine, &self.cfg, block)?
        } else {
            0
        };

        let BlockSummary {
            start,
            end,
            split,
            destroyed,
        } = allocator::allocate_block(&mut stx, &self.crypto, &self.cfg, block)?;

        let undo = UndoRecord {
            journal: stx.take_journal(),
            engine_root,
        };
        debug!(height = block.height, keys = undo.journal.len(), "undo journal captured");
        stx.store_obj(UNIVERSE_BLOCK, "undo", block.id.as_bytes(), "", &undo)?;

        Ok((
            stx.into_batch(),
            SettleSummary {
                start,
                end,
                split,
                destroyed,
                contract_txs,
            },
        ))
    }

    /// Reverse the most recently settled block.
    pub fn revert_block(&self, block_id: &BlockId) -> Result<()> {
        let mut guard = self.inner.write();
        let Inner { store, engine } = &mut *guard;

        let (batch, engine_root) = {
            let mut stx = StoreTx::new(&*store);

            let (start, end) = api::get_block_output_index(&stx, block_id)?
                .ok_or_else(|| fatal!("block {:?} is not settled", block_id))?;
            let next = allocator::next_global_index(&stx)?;
            if end != next {
                return Err(fatal!(
                    "block {:?} ends at {} but the tip ends at {}",
                    block_id,
                    end,
                    next
                ));
            }

            let undo: UndoRecord = stx
                .load_obj(UNIVERSE_BLOCK, "undo", block_id.as_bytes(), "")?
                .ok_or_else(|| fatal!("undo journal of block {:?} is missing", block_id))?;

            for (k, v) in undo.journal.into_iter().rev() {
                stx.set_raw(k, v)?;
            }
            stx.delete(UNIVERSE_BLOCK, "state-root", block_id.as_bytes(), "")?;
            stx.delete(UNIVERSE_BLOCK, "undo", block_id.as_bytes(), "")?;

            info!(start, end, "block reverted");
            (stx.into_batch(), undo.engine_root)
        };

        store.commit(batch)?;
        engine.reset_root(engine_root).map_err(|e| match e {
            SettleError::Collaborator(m) => fatal!("contract engine rewind: {}", m),
            e => e,
        })
    }

    #[allow(missing_docs)]
    pub fn read_output_index(&self, index: u64) -> Result<Option<Vec<u8>>> {
        self.query(|stx| api::read_output_index(stx, index))
    }

    /// Decoded output record at `index`.
    pub fn get_output(&self, index: u64) -> Result<Option<crate::data_model::OutputRecord>> {
        self.query(|stx| api::get_output(stx, index))
    }

    #[allow(missing_docs)]
    pub fn find_tx_output_index(&self, tx_hash: &TxHash) -> Result<i64> {
        self.query(|stx| api::find_tx_output_index(stx, tx_hash))
    }

    #[allow(missing_docs)]
    pub fn get_block_output_index(&self, block_id: &BlockId) -> Result<Option<(u64, u64)>> {
        self.query(|stx| api::get_block_output_index(stx, block_id))
    }

    #[allow(missing_docs)]
    pub fn get_state_root(&self, block_id: &BlockId) -> Result<Option<H256>> {
        self.query(|stx| api::get_state_root(stx, block_id))
    }

    #[allow(missing_docs)]
    pub fn get_contract_transfer(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<converter::ContractTransfer>> {
        self.query(|stx| api::get_contract_transfer(stx, tx_hash))
    }

    #[allow(missing_docs)]
    pub fn get_contract_address(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<crate::data_model::H160>> {
        self.query(|stx| api::get_contract_address(stx, tx_hash))
    }

    /// `(this block, cumulative)`
    pub fn get_block_destroyed(&self, block_id: &BlockId) -> Result<Option<(Amount, Amount)>> {
        self.query(|stx| api::get_block_destroyed(stx, block_id))
    }
}

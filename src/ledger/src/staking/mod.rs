//!
//! # Staking
//!
//! Pool/share registry, vote counters, pending epoch payout tables and the
//! bonus reserve. All state lives in the settlement store under
//! [`UNIVERSE_STAKE`](crate::store::UNIVERSE_STAKE), so every change made
//! while settling a block is undone with it.
//!

pub mod bonus;
pub mod ops;
pub mod reward;

use {
    crate::{
        data_model::{Amount, BlockHeight, PoolId, RewardAddress, ShareId, TxOutTarget, Vote, H256},
        error::Result,
        fatal,
        store::{StoreTx, UNIVERSE_STAKE},
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
    tracing::debug,
};

/// Commission is expressed in basis points of a vote's reward.
pub const FEE_BPS_DENOMINATOR: u64 = 10_000;

/// A registered stake pool.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    #[allow(missing_docs)]
    pub pool_id: PoolId,
    /// where pool profit and bonus are paid
    pub reward: RewardAddress,
    /// commission taken from each vote's reward
    pub fee_bps: u64,
    /// everything paid so far
    pub profit: Amount,
    /// timestamp of the last payout
    pub last_pay_time: u64,
    /// votes of the running vote epoch
    pub votes: u64,
    /// votes of the previous vote epoch
    pub prev_votes: u64,
    #[allow(missing_docs)]
    pub closed: bool,
    #[allow(missing_docs)]
    pub register_height: BlockHeight,
}

/// A share bought inside a pool.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub share_id: ShareId,
    pub pool_id: PoolId,
    pub reward: RewardAddress,
    pub profit: Amount,
    pub last_pay_time: u64,
    pub repurchased: bool,
}

#[allow(missing_docs)]
pub fn get_pool(stx: &StoreTx, id: &PoolId) -> Result<Option<PoolInfo>> {
    stx.load_obj(UNIVERSE_STAKE, "pool", id.as_bytes(), "")
}

/// The pool must exist.
pub fn must_pool(stx: &StoreTx, id: &PoolId) -> Result<PoolInfo> {
    get_pool(stx, id)?.ok_or_else(|| fatal!("unknown pool {:?}", id))
}

#[allow(missing_docs)]
pub fn put_pool(stx: &mut StoreTx, pool: &PoolInfo) -> Result<()> {
    stx.store_obj(UNIVERSE_STAKE, "pool", pool.pool_id.as_bytes(), "", pool)
}

#[allow(missing_docs)]
pub fn get_share(stx: &StoreTx, id: &ShareId) -> Result<Option<ShareInfo>> {
    stx.load_obj(UNIVERSE_STAKE, "share", id.as_bytes(), "")
}

/// The share must exist.
pub fn must_share(stx: &StoreTx, id: &ShareId) -> Result<ShareInfo> {
    get_share(stx, id)?.ok_or_else(|| fatal!("unknown share {:?}", id))
}

#[allow(missing_docs)]
pub fn put_share(stx: &mut StoreTx, share: &ShareInfo) -> Result<()> {
    stx.store_obj(UNIVERSE_STAKE, "share", share.share_id.as_bytes(), "", share)
}

/// Ids of every pool ever registered, ascending.
pub fn pool_ids(stx: &StoreTx) -> Result<Vec<PoolId>> {
    Ok(stx
        .load_obj(UNIVERSE_STAKE, "pool-list", &[], "")?
        .unwrap_or_default())
}

#[allow(missing_docs)]
pub fn register_pool(
    stx: &mut StoreTx,
    pool_id: PoolId,
    reward: RewardAddress,
    fee_bps: u64,
    h: BlockHeight,
) -> Result<()> {
    if fee_bps > FEE_BPS_DENOMINATOR {
        return Err(fatal!("pool {:?} fee {} bps out of range", pool_id, fee_bps));
    }
    if get_pool(stx, &pool_id)?.is_some() {
        return Err(fatal!("pool {:?} registered twice", pool_id));
    }

    let mut ids = pool_ids(stx)?;
    if let Err(pos) = ids.binary_search(&pool_id) {
        ids.insert(pos, pool_id);
    }
    stx.store_obj(UNIVERSE_STAKE, "pool-list", &[], "", &ids)?;

    debug!(pool = ?pool_id, fee_bps, "pool registered");
    put_pool(
        stx,
        &PoolInfo {
            pool_id,
            reward,
            fee_bps,
            profit: 0,
            last_pay_time: 0,
            votes: 0,
            prev_votes: 0,
            closed: false,
            register_height: h,
        },
    )
}

#[allow(missing_docs)]
pub fn register_share(
    stx: &mut StoreTx,
    share_id: ShareId,
    pool_id: PoolId,
    reward: RewardAddress,
) -> Result<()> {
    let pool = must_pool(stx, &pool_id)?;
    if pool.closed {
        return Err(fatal!("share {:?} bought in closed pool {:?}", share_id, pool_id));
    }
    if get_share(stx, &share_id)?.is_some() {
        return Err(fatal!("share {:?} registered twice", share_id));
    }
    put_share(
        stx,
        &ShareInfo {
            share_id,
            pool_id,
            reward,
            profit: 0,
            last_pay_time: 0,
            repurchased: false,
        },
    )
}

#[allow(missing_docs)]
pub fn close_pool(stx: &mut StoreTx, pool_id: &PoolId) -> Result<()> {
    let mut pool = must_pool(stx, pool_id)?;
    pool.closed = true;
    put_pool(stx, &pool)
}

#[allow(missing_docs)]
pub fn repurchase_share(stx: &mut StoreTx, share_id: &ShareId) -> Result<()> {
    let mut share = must_share(stx, share_id)?;
    share.repurchased = true;
    put_share(stx, &share)
}

/// Registry side effects of one output of an ordinary transaction.
pub fn apply_target_effects(
    stx: &mut StoreTx,
    target: &TxOutTarget,
    h: BlockHeight,
) -> Result<()> {
    match target {
        TxOutTarget::ToKey { .. } | TxOutTarget::ToSubAddress { .. } => Ok(()),
        TxOutTarget::ToRegisterPool {
            pool_id,
            fee_bps,
            reward,
            ..
        } => register_pool(stx, *pool_id, *reward, *fee_bps, h),
        TxOutTarget::ToBuyShare {
            pool_id,
            share_id,
            reward,
            ..
        } => register_share(stx, *share_id, *pool_id, *reward),
        TxOutTarget::ToClosePool { pool_id, .. } => close_pool(stx, pool_id),
        TxOutTarget::ToRepoShare { share_id, .. } => repurchase_share(stx, share_id),
    }
}

/// Count the votes of a main-chain block into the running vote epoch.
pub fn count_votes(stx: &mut StoreTx, votes: &[Vote]) -> Result<()> {
    let mut counts: BTreeMap<PoolId, u64> = BTreeMap::new();
    for v in votes {
        *counts.entry(v.pool_id).or_default() += 1;
    }
    for (id, n) in counts {
        let mut pool = must_pool(stx, &id)?;
        pool.votes = pool.votes.saturating_add(n);
        put_pool(stx, &pool)?;
    }
    Ok(())
}

/// `(pool_id, votes, prev_votes)` of every open pool that was voted for
/// in the running epoch. Idle pools are left out of the ranking.
pub fn rank_stats(stx: &StoreTx) -> Result<Vec<(PoolId, u64, u64)>> {
    let mut res = vec![];
    for id in pool_ids(stx)? {
        let pool = must_pool(stx, &id)?;
        if !pool.closed && 0 < pool.votes {
            res.push((id, pool.votes, pool.prev_votes));
        }
    }
    Ok(res)
}

/// `prev_votes = votes`, `votes = 0` for every pool.
pub fn roll_vote_epoch(stx: &mut StoreTx) -> Result<()> {
    for id in pool_ids(stx)? {
        let mut pool = must_pool(stx, &id)?;
        pool.prev_votes = pool.votes;
        pool.votes = 0;
        put_pool(stx, &pool)?;
    }
    Ok(())
}

/// Pending payout tables of the cycle payout mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EpochTable {
    /// paid every share cycle
    Share,
    /// paid every pool cycle
    Pool,
}

impl EpochTable {
    fn attr(self) -> &'static str {
        match self {
            EpochTable::Share => "share",
            EpochTable::Pool => "pool",
        }
    }
}

/// One row of an epoch table.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RewardInfo {
    pub id: H256,
    pub amount: Amount,
}

fn load_epoch(stx: &StoreTx, table: EpochTable) -> Result<BTreeMap<H256, Amount>> {
    Ok(stx
        .load_obj(UNIVERSE_STAKE, "epoch", &[], table.attr())?
        .unwrap_or_default())
}

/// Accumulate `amount` for `id` in the running epoch.
pub fn epoch_add(stx: &mut StoreTx, table: EpochTable, id: H256, amount: Amount) -> Result<()> {
    if 0 == amount {
        return Ok(());
    }
    let mut rows = load_epoch(stx, table)?;
    let slot = rows.entry(id).or_default();
    *slot = slot
        .checked_add(amount)
        .ok_or_else(|| fatal!("epoch table overflow for {:?}", id))?;
    stx.store_obj(UNIVERSE_STAKE, "epoch", &[], table.attr(), &rows)
}

/// Close the running epoch, returning its rows ordered by id.
pub fn epoch_drain(stx: &mut StoreTx, table: EpochTable) -> Result<Vec<RewardInfo>> {
    let rows = load_epoch(stx, table)?;
    if rows.is_empty() {
        return Ok(vec![]);
    }
    stx.delete(UNIVERSE_STAKE, "epoch", &[], table.attr())?;
    Ok(rows
        .into_iter()
        .map(|(id, amount)| RewardInfo { id, amount })
        .collect())
}

#[allow(missing_docs)]
pub fn bonus_reserve(stx: &StoreTx) -> Result<Amount> {
    Ok(stx
        .load_u64(UNIVERSE_STAKE, "bonus-reserve", &[], "")?
        .unwrap_or(0))
}

#[allow(missing_docs)]
pub fn reserve_add(stx: &mut StoreTx, amount: Amount) -> Result<()> {
    let v = bonus_reserve(stx)?
        .checked_add(amount)
        .ok_or_else(|| fatal!("bonus reserve overflow"))?;
    stx.store_u64(UNIVERSE_STAKE, "bonus-reserve", &[], "", v)
}

#[allow(missing_docs)]
pub fn reserve_sub(stx: &mut StoreTx, amount: Amount) -> Result<()> {
    let v = bonus_reserve(stx)?
        .checked_sub(amount)
        .ok_or_else(|| fatal!("bonus reserve underflow by {}", amount))?;
    stx.store_u64(UNIVERSE_STAKE, "bonus-reserve", &[], "", v)
}

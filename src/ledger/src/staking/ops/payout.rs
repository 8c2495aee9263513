//!
//! # Payout synthesis
//!
//! Stake, cycle and bonus rewards are paid by synthetic transactions. Each
//! one has the tx key `Hs(seed || tag)` and one stealth output per payee.
//!

use {
    crate::{
        confidential::ConfidentialCrypto,
        data_model::{
            Amount, Block, BlockId, EcdhTuple, Key, PoolId, RewardAddress, ShareId,
            SignatureType, Transaction, TxExtra, TxHash, TxOut, TxOutTarget, TxType, Vote,
            H256,
        },
        error::Result,
        fatal,
        staking::{
            self,
            bonus::{self, BonusParams},
            EpochTable, FEE_BPS_DENOMINATOR,
        },
        store::{self, StoreTx, UNIVERSE_BLOCK},
    },
    config::settle::SettleConfig,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

/// Kind of a synthetic payout, it selects the tx key tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// combined per-block stake payout
    Stake,
    #[allow(missing_docs)]
    ShareCycle,
    #[allow(missing_docs)]
    PoolCycle,
    #[allow(missing_docs)]
    Bonus,
    /// contract ledger withdrawal
    Contract,
}

impl Distribution {
    #[allow(missing_docs)]
    pub fn tag(self) -> &'static [u8] {
        match self {
            Distribution::Stake => b"stake",
            Distribution::ShareCycle => b"share_cycle",
            Distribution::PoolCycle => b"pool_cycle",
            Distribution::Bonus => b"bonus",
            Distribution::Contract => b"contract",
        }
    }
}

/// One recipient of a synthetic transaction.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Payee {
    pub reward: RewardAddress,
    pub amount: Amount,
    pub tx_type: TxType,
    pub pool_id: Option<PoolId>,
    pub share_id: Option<ShareId>,
}

/// A minted transaction together with who it pays.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyntheticTx {
    pub hash: TxHash,
    pub tx: Transaction,
    pub payees: Vec<Payee>,
}

/// Build the synthetic transaction of `dist` seeded by `seed`
/// (a block id, or a tx hash for contract withdrawals).
pub fn synthesize<C: ConfidentialCrypto + ?Sized>(
    crypto: &C,
    seed: &H256,
    dist: Distribution,
    payees: Vec<Payee>,
) -> Result<SyntheticTx> {
    let tx_secret = crypto.hash_to_scalar(&[seed.as_bytes(), dist.tag()]);
    let tx_pub_key = crypto
        .public_key(&tx_secret)
        .ok_or_else(|| fatal!("invalid synthetic tx key"))?;
    let one = unit_scalar();

    let mut outputs = Vec::with_capacity(payees.len());
    let mut commitments = Vec::with_capacity(payees.len());
    let mut ecdh_info: Vec<EcdhTuple> = Vec::with_capacity(payees.len());
    let mut additional_pub_keys = vec![];
    let with_subaddress = payees.iter().any(|p| p.reward.is_subaddress);

    for (i, p) in payees.iter().enumerate() {
        let derivation = crypto
            .derive_key(&p.reward.view, &tx_secret)
            .ok_or_else(|| fatal!("invalid view key of payee {}", i))?;
        let key = crypto
            .derive_public_key(&derivation, i as u64, &p.reward.spend)
            .ok_or_else(|| fatal!("invalid spend key of payee {}", i))?;
        let shared = crypto.derive_scalar(&derivation, i as u64);
        let (commitment, tuple) = crypto.encode_amount(p.amount, &one, &shared);

        if with_subaddress {
            let k = if p.reward.is_subaddress {
                crypto
                    .derive_key(&p.reward.spend, &tx_secret)
                    .ok_or_else(|| fatal!("invalid spend key of payee {}", i))?
            } else {
                tx_pub_key
            };
            additional_pub_keys.push(k);
        }

        let target = if p.reward.is_subaddress {
            TxOutTarget::ToSubAddress { key }
        } else {
            TxOutTarget::ToKey { key }
        };
        outputs.push(TxOut {
            amount: p.amount,
            target,
        });
        commitments.push(commitment);
        ecdh_info.push(tuple);
    }

    let tx = Transaction {
        version: 2,
        unlock_time: 0,
        key_images: vec![],
        outputs,
        commitments,
        ecdh_info,
        extra: TxExtra {
            tx_pub_key,
            additional_pub_keys,
            ..Default::default()
        },
        sig_type: SignatureType::Synthetic,
    };

    Ok(SyntheticTx {
        hash: tx.hash()?,
        tx,
        payees,
    })
}

// little-endian 1
fn unit_scalar() -> Key {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
}

/// Persist a synthetic transaction like an ordinary one and credit its
/// payees.
pub fn persist_synthetic(stx: &mut StoreTx, block: &Block, syn: &SyntheticTx) -> Result<()> {
    let hash = store::put_transaction(stx, &syn.tx)?;
    if hash != syn.hash {
        return Err(fatal!("synthetic tx hash mismatch"));
    }
    store::mark_tx_valid(stx, &block.id, &hash)?;

    let mut list = synthetic_txs(stx, &block.id)?;
    list.push(hash);
    stx.store_obj(UNIVERSE_BLOCK, "synthetic", block.id.as_bytes(), "", &list)?;

    for p in syn.payees.iter() {
        match p.tx_type {
            TxType::PoolProfit | TxType::BonusProfit => {
                let id = p.pool_id.ok_or_else(|| fatal!("pool payout without pool"))?;
                let mut pool = staking::must_pool(stx, &id)?;
                pool.profit = pool.profit.saturating_add(p.amount);
                pool.last_pay_time = block.timestamp;
                staking::put_pool(stx, &pool)?;
            }
            TxType::ShareProfit => {
                let id = p.share_id.ok_or_else(|| fatal!("share payout without share"))?;
                let mut share = staking::must_share(stx, &id)?;
                share.profit = share.profit.saturating_add(p.amount);
                share.last_pay_time = block.timestamp;
                staking::put_share(stx, &share)?;
            }
            _ => {}
        }
    }

    debug!(tx = ?hash, outputs = syn.payees.len(), "synthetic tx persisted");
    Ok(())
}

/// Synthetic transactions minted by a block, in allocation order.
pub fn synthetic_txs(stx: &StoreTx, block: &BlockId) -> Result<Vec<TxHash>> {
    Ok(stx
        .load_obj(UNIVERSE_BLOCK, "synthetic", block.as_bytes(), "")?
        .unwrap_or_default())
}

/// Pool and share part of each vote, plus the division dust.
///
/// `per_vote = pos / n`, the pool keeps `per_vote * fee_bps / 10000`.
pub fn vote_rewards(
    stx: &StoreTx,
    votes: &[Vote],
    pos_reward: Amount,
) -> Result<(Vec<(Payee, Payee)>, Amount)> {
    if votes.is_empty() {
        return Ok((vec![], pos_reward));
    }

    let per_vote = pos_reward / votes.len() as u64;
    let dust = pos_reward - per_vote * votes.len() as u64;

    let mut res = Vec::with_capacity(votes.len());
    for v in votes {
        let pool = staking::must_pool(stx, &v.pool_id)?;
        let share = staking::must_share(stx, &v.share_id)?;
        if share.pool_id != pool.pool_id {
            return Err(fatal!(
                "vote of share {:?} names foreign pool {:?}",
                v.share_id,
                v.pool_id
            ));
        }

        let pool_part =
            (per_vote as u128 * pool.fee_bps as u128 / FEE_BPS_DENOMINATOR as u128) as Amount;
        res.push((
            Payee {
                reward: pool.reward,
                amount: pool_part,
                tx_type: TxType::PoolProfit,
                pool_id: Some(pool.pool_id),
                share_id: None,
            },
            Payee {
                reward: share.reward,
                amount: per_vote - pool_part,
                tx_type: TxType::ShareProfit,
                pool_id: Some(pool.pool_id),
                share_id: Some(share.share_id),
            },
        ));
    }

    Ok((res, dust))
}

/// Payees of the combined stake tx, ordered `pool0, share0, pool1, ...`.
pub fn combined_payees(
    stx: &StoreTx,
    votes: &[Vote],
    pos_reward: Amount,
) -> Result<(Vec<Payee>, Amount)> {
    let (pairs, dust) = vote_rewards(stx, votes, pos_reward)?;
    let payees = pairs.into_iter().flat_map(|(p, s)| [p, s]).collect();
    Ok((payees, dust))
}

/// Accumulate this block's pos reward into the running epoch tables,
/// returns the dust.
pub fn accumulate_cycle(stx: &mut StoreTx, votes: &[Vote], pos_reward: Amount) -> Result<Amount> {
    let (pairs, dust) = vote_rewards(stx, votes, pos_reward)?;
    for (pool, share) in pairs {
        if let Some(id) = pool.pool_id {
            staking::epoch_add(stx, EpochTable::Pool, id, pool.amount)?;
        }
        if let Some(id) = share.share_id {
            staking::epoch_add(stx, EpochTable::Share, id, share.amount)?;
        }
    }
    Ok(dust)
}

/// Drain a finished epoch table into payees.
pub fn cycle_payees(stx: &mut StoreTx, table: EpochTable) -> Result<Vec<Payee>> {
    let mut res = vec![];
    for row in staking::epoch_drain(stx, table)? {
        let payee = match table {
            EpochTable::Pool => {
                let pool = staking::must_pool(stx, &row.id)?;
                Payee {
                    reward: pool.reward,
                    amount: row.amount,
                    tx_type: TxType::PoolProfit,
                    pool_id: Some(pool.pool_id),
                    share_id: None,
                }
            }
            EpochTable::Share => {
                let share = staking::must_share(stx, &row.id)?;
                Payee {
                    reward: share.reward,
                    amount: row.amount,
                    tx_type: TxType::ShareProfit,
                    pool_id: Some(share.pool_id),
                    share_id: Some(share.share_id),
                }
            }
        };
        res.push(payee);
    }
    Ok(res)
}

/// Rank the pools, compute the bonus out of the reserve and roll the vote
/// epoch. The reserve itself is debited by the caller once the payout is
/// allocated.
pub fn bonus_payees(stx: &mut StoreTx, cfg: &SettleConfig, block: &Block) -> Result<Vec<Payee>> {
    let params = BonusParams::from(cfg);
    let reserve = staking::bonus_reserve(stx)?;
    let ranked = bonus::rank_pools(staking::rank_stats(stx)?, &params);

    let snapshot = serde_json::to_vec(&ranked)
        .map_err(|e| fatal!("rank snapshot encoding: {}", e))?;
    stx.store(UNIVERSE_BLOCK, "rank-snapshot", block.id.as_bytes(), "", snapshot)?;

    let rewards = bonus::compute_bonus(&ranked, reserve, &params)?;
    staking::roll_vote_epoch(stx)?;

    info!(
        height = block.height,
        reserve,
        pools = ranked.len(),
        rewarded = rewards.len(),
        "bonus distributed"
    );

    rewards
        .into_iter()
        .map(|r| {
            let pool = staking::must_pool(stx, &r.pool_id)?;
            Ok(Payee {
                reward: pool.reward,
                amount: r.amount,
                tx_type: TxType::BonusProfit,
                pool_id: Some(r.pool_id),
                share_id: None,
            })
        })
        .collect()
}

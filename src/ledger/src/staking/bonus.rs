//!
//! # Bonus rank engine
//!
//! Pools are ranked by the votes of the finished vote epoch and placed
//! into three bands. Gold and silver split fixed quotas of the bonus
//! reserve, a pool whose votes dropped sharply against the previous epoch
//! forfeits part of its share, and the forfeited part is spread over the
//! bronze band by votes.
//!

use {
    crate::{
        data_model::{Amount, PoolId},
        error::Result,
        fatal,
    },
    config::settle::SettleConfig,
    serde::{Deserialize, Serialize},
};

const PPM: i128 = 1_000_000;

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
}

/// Ranking stats of one pool.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolRankEntry {
    pub pool_id: PoolId,
    pub votes: u64,
    pub prev_votes: u64,
    pub tier: Tier,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BonusReward {
    pub pool_id: PoolId,
    pub amount: Amount,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BonusParams {
    pub gold_count: usize,
    pub silver_count: usize,
    pub gold_shared_percent: u64,
    pub silver_percent: u64,
    pub penalty_start_rate_ppm: i64,
    pub penalty_full_rate_ppm: i64,
}

impl From<&SettleConfig> for BonusParams {
    fn from(cfg: &SettleConfig) -> Self {
        BonusParams {
            gold_count: cfg.gold_count,
            silver_count: cfg.silver_count,
            gold_shared_percent: cfg.gold_shared_percent,
            silver_percent: cfg.silver_percent,
            penalty_start_rate_ppm: cfg.penalty_start_rate_ppm,
            penalty_full_rate_ppm: cfg.penalty_full_rate_ppm,
        }
    }
}

/// Sort by votes (desc) then pool id (asc), and band by position.
pub fn rank_pools(
    mut stats: Vec<(PoolId, u64, u64)>,
    params: &BonusParams,
) -> Vec<PoolRankEntry> {
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats
        .into_iter()
        .enumerate()
        .map(|(pos, (pool_id, votes, prev_votes))| {
            let tier = if pos < params.gold_count {
                Tier::Gold
            } else if pos < params.gold_count + params.silver_count {
                Tier::Silver
            } else {
                Tier::Bronze
            };
            PoolRankEntry {
                pool_id,
                votes,
                prev_votes,
                tier,
            }
        })
        .collect()
}

// Linear penalty inside the momentum band, capped at half the expected share.
fn penalty(expected: u128, e: &PoolRankEntry, params: &BonusParams) -> u128 {
    if 0 == e.prev_votes || 0 == expected {
        return 0;
    }

    let rate = (e.votes as i128 - e.prev_votes as i128) * PPM / e.prev_votes as i128;
    let start = params.penalty_start_rate_ppm as i128;
    let full = params.penalty_full_rate_ppm as i128;

    if rate >= start {
        0
    } else if rate <= full || start <= full {
        expected / 2
    } else {
        expected * (start - rate) as u128 / (2 * (start - full)) as u128
    }
}

fn band_votes(band: &[&PoolRankEntry]) -> u128 {
    band.iter().map(|e| e.votes as u128).sum()
}

/// Distribute `bonus_total` over the ranked pools.
///
/// The result never sums above `bonus_total`, is empty when no pool is
/// ranked, and omits pools whose amount rounds to zero.
pub fn compute_bonus(
    ranked: &[PoolRankEntry],
    bonus_total: Amount,
    params: &BonusParams,
) -> Result<Vec<BonusReward>> {
    let band = |t: Tier| ranked.iter().filter(|e| e.tier == t).collect::<Vec<_>>();
    let (gold, silver, bronze) = (band(Tier::Gold), band(Tier::Silver), band(Tier::Bronze));

    let total = bonus_total as u128;
    let mut res: Vec<(PoolId, u128)> = vec![];
    let mut overflow = 0u128;

    let finish = |res: Vec<(PoolId, u128)>| -> Result<Vec<BonusReward>> {
        let mut sum = 0u128;
        let out = res
            .into_iter()
            .filter(|(_, amount)| 0 < *amount)
            .map(|(pool_id, amount)| {
                sum += amount;
                BonusReward {
                    pool_id,
                    amount: amount as Amount,
                }
            })
            .collect();
        if sum > total {
            return Err(fatal!("bonus {} exceeds the reserve {}", sum, total));
        }
        Ok(out)
    };

    let mut gold_quota = 0;
    if !gold.is_empty() {
        gold_quota = if silver.is_empty() && bronze.is_empty() {
            total
        } else {
            total * params.gold_shared_percent as u128 / 100
        };
        let avg = gold_quota / gold.len() as u128;
        if 0 == avg {
            return finish(res);
        }
        for e in gold.iter() {
            let p = penalty(avg, e, params);
            overflow += p;
            res.push((e.pool_id, avg - p));
        }
    }

    if !silver.is_empty() {
        let quota = if bronze.is_empty() {
            total - gold_quota
        } else {
            total * params.silver_percent as u128 / 100
        };
        let votes = band_votes(&silver);
        if 0 == votes {
            return Err(fatal!("silver band without votes"));
        }
        if 0 == quota {
            return finish(res);
        }
        for e in silver.iter() {
            let expected = quota * e.votes as u128 / votes;
            let p = penalty(expected, e, params);
            overflow += p;
            res.push((e.pool_id, expected - p));
        }
    }

    if !bronze.is_empty() && 0 < overflow {
        let votes = band_votes(&bronze);
        if 0 == votes {
            return Err(fatal!("bronze band without votes"));
        }
        for e in bronze.iter() {
            res.push((e.pool_id, overflow * e.votes as u128 / votes));
        }
    }

    finish(res)
}

//!
//! # Block reward split
//!
//! A pure function of the block facts, selected by four height eras.
//!

use {
    crate::{
        data_model::{Amount, BlockHeight},
        error::Result,
        fatal,
    },
    config::settle::SettleConfig,
    serde::{Deserialize, Serialize},
};

/// Split of one block's total reward.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RewardSplit {
    /// paid to the miner
    pub pow_reward: Amount,
    /// paid to the voting pools and shares
    pub pos_reward: Amount,
    /// moved into the bonus reserve
    pub reserved: Amount,
    /// never paid out
    pub destroyed: Amount,
}

impl RewardSplit {
    /// `pow + pos + reserved + destroyed`, None on overflow
    pub fn sum(&self) -> Option<Amount> {
        self.pow_reward
            .checked_add(self.pos_reward)?
            .checked_add(self.reserved)?
            .checked_add(self.destroyed)
    }
}

/// Reward policy eras, in activation order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum RewardEra {
    /// everything goes to the miner
    Solo,
    /// side blocks earn nothing
    EarlyVoting,
    /// side blocks keep the pow share, never a pos share
    SideBlockFix,
    /// vote-less main blocks pay everything to the miner
    NoVoteFix,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RewardParams {
    pub voting_start_height: BlockHeight,
    pub side_block_fix_height: BlockHeight,
    pub no_vote_fix_height: BlockHeight,
    pub pow_percent: u64,
    pub bonus_rate_percent: u64,
    pub exact_split_fork_version: u8,
}

impl From<&SettleConfig> for RewardParams {
    fn from(cfg: &SettleConfig) -> Self {
        RewardParams {
            voting_start_height: cfg.voting_start_height,
            side_block_fix_height: cfg.side_block_fix_height,
            no_vote_fix_height: cfg.no_vote_fix_height,
            pow_percent: cfg.pow_percent,
            bonus_rate_percent: cfg.bonus_rate_percent,
            exact_split_fork_version: cfg.exact_split_fork_version,
        }
    }
}

impl RewardParams {
    /// Era in force at height `h`.
    pub fn era_of(&self, h: BlockHeight) -> RewardEra {
        if h < self.voting_start_height {
            RewardEra::Solo
        } else if h < self.side_block_fix_height {
            RewardEra::EarlyVoting
        } else if h < self.no_vote_fix_height {
            RewardEra::SideBlockFix
        } else {
            RewardEra::NoVoteFix
        }
    }

    // (pow_part, pos_part), any rounding dust is left out of both
    fn parts(&self, avail: Amount, fork_version: u8) -> (Amount, Amount) {
        if fork_version < self.exact_split_fork_version {
            (
                avail / 100 * self.pow_percent,
                avail / 100 * (100 - self.pow_percent),
            )
        } else {
            let pow = (avail as u128 * self.pow_percent as u128 / 100) as Amount;
            (pow, avail - pow)
        }
    }
}

/// Split `total` between pow, pos, the bonus reserve and destruction.
///
/// `reserved = base / 100 * bonus_rate_percent` once voting has started,
/// and `total == pow + pos + reserved + destroyed` always holds.
pub fn split_reward(
    total: Amount,
    base: Amount,
    h: BlockHeight,
    has_votes: bool,
    side_block: bool,
    fork_version: u8,
    params: &RewardParams,
) -> Result<RewardSplit> {
    if params.pow_percent > 100 || params.bonus_rate_percent > 100 {
        return Err(fatal!("reward percentages out of range"));
    }

    let era = params.era_of(h);

    if RewardEra::Solo == era {
        return Ok(RewardSplit {
            pow_reward: total,
            ..Default::default()
        });
    }

    if RewardEra::EarlyVoting == era && side_block {
        return Ok(RewardSplit {
            destroyed: total,
            ..Default::default()
        });
    }

    let reserved = base / 100 * params.bonus_rate_percent;
    let avail = total.checked_sub(reserved).ok_or_else(|| {
        fatal!(
            "bonus reserve {} exceeds total reward {} at height {}",
            reserved,
            total,
            h
        )
    })?;
    let (pow_part, pos_part) = params.parts(avail, fork_version);

    let (pow_reward, pos_reward) = match (era, side_block, has_votes) {
        (_, true, _) => (pow_part, 0),
        (_, false, true) => (pow_part, pos_part),
        (RewardEra::NoVoteFix, false, false) => (avail, 0),
        (_, false, false) => (pow_part, 0),
    };

    let split = RewardSplit {
        pow_reward,
        pos_reward,
        reserved,
        destroyed: avail - pow_reward - pos_reward,
    };

    if Some(total) != split.sum() {
        return Err(fatal!("reward identity broken: {:?} != {}", split, total));
    }

    Ok(split)
}

use {
    ruc::*,
    serde::{Deserialize, Serialize},
    std::{
        fs::File,
        io::{ErrorKind, Read, Write},
    },
};

/// Activation heights and economic parameters consumed by block settlement.
///
/// Every field is consensus relevant: two nodes running with different
/// values will assign different global output indices and fork.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SettleConfig {
    // Reward split eras.
    // Below this height the whole block reward goes to the miner.
    pub voting_start_height: u64,
    // Side blocks keep their proof-of-work share from here on.
    pub side_block_fix_height: u64,
    // Vote-less main blocks pay the whole reward to the miner from here on.
    pub no_vote_fix_height: u64,
    pub pow_percent: u64,
    pub bonus_rate_percent: u64,
    // Parts are computed in u128 without percentage-first truncation.
    pub exact_split_fork_version: u8,

    // Stake payouts.
    pub stake_cycle_start_height: u64,
    pub share_cycle_blocks: u64,
    pub pool_cycle_blocks: u64,

    // Bonus season, a single window.
    pub bonus_interval: u64,
    pub bonus_season_start: u64,
    pub bonus_season_end: u64,
    pub gold_count: usize,
    pub silver_count: usize,
    pub gold_shared_percent: u64,
    pub silver_percent: u64,
    // Momentum band in parts-per-million, both negative,
    // `penalty_full_rate_ppm < penalty_start_rate_ppm`.
    pub penalty_start_rate_ppm: i64,
    pub penalty_full_rate_ppm: i64,

    // Unlock policy.
    pub normal_tx_amount_unlock: u64,
    pub mined_money_unlock_window: u64,
    pub close_pool_tx_amount_unlock: u64,
    pub unlock_clamp_fork_version: u8,
    pub unlock_clamp_blocks: u64,
    pub unlock_clamp_seconds: u64,

    // Contract ledger.
    pub contract_fork_height: u64,
    pub block_gas_limit: u64,
    pub default_gas_limit: u64,
    pub default_gas_price: u64,

    // Reward multiplier (percent, at most 100) per index-within-tx of
    // issue-token outputs.
    pub issue_token_reward_percent: Vec<u64>,
}

impl Default for SettleConfig {
    #[cfg(not(feature = "debug_env"))]
    fn default() -> Self {
        SettleConfig {
            voting_start_height: 200_000,
            side_block_fix_height: 260_000,
            no_vote_fix_height: 320_000,
            pow_percent: 40,
            bonus_rate_percent: 5,
            exact_split_fork_version: 4,
            stake_cycle_start_height: 300_000,
            share_cycle_blocks: 30,
            pool_cycle_blocks: 720,
            bonus_interval: 5040,
            bonus_season_start: 260_000,
            bonus_season_end: 260_000 + 5040 * 52,
            gold_count: 5,
            silver_count: 10,
            gold_shared_percent: 50,
            silver_percent: 30,
            penalty_start_rate_ppm: -10_0000,
            penalty_full_rate_ppm: -30_0000,
            normal_tx_amount_unlock: 10,
            mined_money_unlock_window: 60,
            close_pool_tx_amount_unlock: 5040,
            unlock_clamp_fork_version: 5,
            unlock_clamp_blocks: 1000,
            unlock_clamp_seconds: 12000,
            contract_fork_height: 400_000,
            block_gas_limit: 3000_0000,
            default_gas_limit: 9_0000,
            default_gas_price: 100_0000_0000,
            issue_token_reward_percent: vec![100; 16],
        }
    }

    #[cfg(feature = "debug_env")]
    fn default() -> Self {
        SettleConfig {
            voting_start_height: 10,
            side_block_fix_height: 20,
            no_vote_fix_height: 30,
            pow_percent: 40,
            bonus_rate_percent: 5,
            exact_split_fork_version: 4,
            stake_cycle_start_height: 25,
            share_cycle_blocks: 3,
            pool_cycle_blocks: 9,
            bonus_interval: 10,
            bonus_season_start: 20,
            bonus_season_end: 10_000,
            gold_count: 2,
            silver_count: 3,
            gold_shared_percent: 50,
            silver_percent: 30,
            penalty_start_rate_ppm: -10_0000,
            penalty_full_rate_ppm: -30_0000,
            normal_tx_amount_unlock: 10,
            mined_money_unlock_window: 60,
            close_pool_tx_amount_unlock: 100,
            unlock_clamp_fork_version: 5,
            unlock_clamp_blocks: 1000,
            unlock_clamp_seconds: 12000,
            contract_fork_height: 0,
            block_gas_limit: 3000_0000,
            default_gas_limit: 9_0000,
            default_gas_price: 100_0000_0000,
            issue_token_reward_percent: vec![100; 16],
        }
    }
}

impl SettleConfig {
    /// Load the settlement config from a TOML (or JSON) file,
    /// writing the defaults out first when the file does not exist.
    pub fn from_file(file_path: &str) -> Result<SettleConfig> {
        let mut f = match File::open(file_path) {
            Ok(file) => file,
            Err(error) => {
                if error.kind() == ErrorKind::NotFound {
                    let config = SettleConfig::default();
                    let content = toml::to_string(&config).c(d!())?;
                    File::create(file_path)
                        .c(d!(file_path.to_owned()))?
                        .write_all(content.as_bytes())
                        .c(d!())?;
                    return Ok(config);
                } else {
                    return Err(eg!(format!("failed to open file: {:?}", error)));
                }
            }
        };

        let mut content = String::new();
        f.read_to_string(&mut content).c(d!())?;
        let config: SettleConfig = toml::from_str(content.as_str())
            .or_else(|_| serde_json::from_str(content.as_str()))
            .c(d!())?;
        config.validate().c(d!())?;
        Ok(config)
    }

    /// Reject parameter sets that would make settlement ill-defined.
    pub fn validate(&self) -> Result<()> {
        if !(self.voting_start_height <= self.side_block_fix_height
            && self.side_block_fix_height <= self.no_vote_fix_height)
        {
            return Err(eg!("reward eras must be ordered"));
        }
        if self.pow_percent > 100 || self.bonus_rate_percent > 100 {
            return Err(eg!("percent out of range"));
        }
        if self.gold_shared_percent + self.silver_percent > 100 {
            return Err(eg!("bonus quotas exceed 100%"));
        }
        if 0 == self.share_cycle_blocks
            || 0 == self.pool_cycle_blocks
            || 0 == self.bonus_interval
        {
            return Err(eg!("cycle length can not be zero"));
        }
        if self.bonus_season_start > self.bonus_season_end {
            return Err(eg!("invalid bonus season window"));
        }
        if !(self.penalty_full_rate_ppm < self.penalty_start_rate_ppm
            && self.penalty_start_rate_ppm <= 0)
        {
            return Err(eg!("invalid momentum penalty band"));
        }
        if 0 == self.default_gas_limit || 0 == self.default_gas_price {
            return Err(eg!("gas defaults can not be zero"));
        }
        if self.issue_token_reward_percent.iter().any(|p| *p > 100) {
            return Err(eg!("token issue multiplier above 100%"));
        }
        Ok(())
    }

    /// Bonus height inside the single season window.
    #[inline(always)]
    pub fn is_bonus_height(&self, h: u64) -> bool {
        0 == h % self.bonus_interval
            && (self.bonus_season_start..self.bonus_season_end).contains(&h)
    }

    #[inline(always)]
    #[allow(missing_docs)]
    pub fn contract_fork_active(&self, h: u64) -> bool {
        h >= self.contract_fork_height
    }
}

pub mod global_cfg {
    use super::SettleConfig;
    use lazy_static::lazy_static;
    use ruc::*;
    #[cfg(not(test))]
    use std::env;

    lazy_static! {
        /// Global settlement config.
        pub static ref CFG: Config = pnk!(get_config());
    }

    #[derive(Debug, Default)]
    pub struct Config {
        pub config_file: String,
        pub settle: SettleConfig,
    }

    #[cfg(test)]
    fn get_config() -> Result<Config> {
        Ok(Config::default())
    }

    #[cfg(not(test))]
    fn get_config() -> Result<Config> {
        let config_file = env::var("SETTLE_CONFIG_FILE")
            .unwrap_or_else(|_| String::from("./settlement.toml"));
        let settle = SettleConfig::from_file(&config_file).c(d!())?;
        Ok(Config {
            config_file,
            settle,
        })
    }
}

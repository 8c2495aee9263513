//!
//! # Helper Utils
//!

#![allow(missing_docs, dead_code)]

use {
    super::{self as store, KvStore, MemStore, StoreTx},
    crate::{
        confidential::{ConfidentialCrypto, RistrettoCrypto},
        converter,
        data_model::{
            hash_of, Amount, Block, BlockHeight, BlockId, ContractIntent, ContractKind, Key,
            PoolId, RewardAddress, ShareId, SignatureType, TokenKind, TokenSubTx, Transaction,
            TxExtra, TxOut, TxOutTarget, H160, H256,
        },
        error::Result,
        staking,
    },
    config::settle::SettleConfig,
};

/// Small heights so that every reward era, cycle boundary and bonus height
/// is reachable within a few dozen blocks.
pub fn test_config() -> SettleConfig {
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
        bonus_season_end: 1_000,
        gold_count: 1,
        silver_count: 1,
        gold_shared_percent: 50,
        silver_percent: 30,
        penalty_start_rate_ppm: -10_0000,
        penalty_full_rate_ppm: -30_0000,
        normal_tx_amount_unlock: 10,
        mined_money_unlock_window: 60,
        close_pool_tx_amount_unlock: 100,
        unlock_clamp_fork_version: 5,
        unlock_clamp_blocks: 1_000,
        unlock_clamp_seconds: 12_000,
        contract_fork_height: 0,
        block_gas_limit: 3_000_000,
        default_gas_limit: 90_000,
        default_gas_price: 1,
        issue_token_reward_percent: vec![100, 50, 25],
    }
}

/// Deterministic public address.
#[inline(always)]
pub fn address(seed: &[u8]) -> RewardAddress {
    let (_, spend) = RistrettoCrypto::keypair_from_seed(&[seed, &b"/spend"[..]].concat());
    let (_, view) = RistrettoCrypto::keypair_from_seed(&[seed, &b"/view"[..]].concat());
    RewardAddress {
        spend,
        view,
        is_subaddress: false,
    }
}

#[inline(always)]
pub fn block_id(height: BlockHeight) -> BlockId {
    hash_of(&[&b"block"[..], &height.to_be_bytes()])
}

#[inline(always)]
pub fn pool_id(n: u8) -> PoolId {
    H256::repeat_byte(0x10 + n)
}

#[inline(always)]
pub fn share_id(n: u8) -> ShareId {
    H256::repeat_byte(0x80 + n)
}

/// Miner transaction paying `amount` in one output.
pub fn coinbase(height: BlockHeight, amount: Amount) -> Transaction {
    let seed = height.to_be_bytes();
    Transaction {
        version: 2,
        unlock_time: 0,
        key_images: vec![],
        outputs: vec![TxOut {
            amount,
            target: TxOutTarget::ToKey {
                key: hash_of(&[&b"miner"[..], &seed]).0,
            },
        }],
        commitments: vec![],
        ecdh_info: vec![],
        extra: TxExtra {
            tx_pub_key: hash_of(&[&b"miner-tx"[..], &seed]).0,
            ..Default::default()
        },
        sig_type: SignatureType::Coinbase,
    }
}

/// Transparent transaction with one `ToKey` output per amount.
pub fn plain_tx(amounts: &[Amount]) -> Transaction {
    let tag = amounts
        .iter()
        .flat_map(|a| a.to_be_bytes())
        .collect::<Vec<_>>();
    Transaction {
        version: 2,
        unlock_time: 0,
        key_images: vec![hash_of(&[&b"key-image"[..], &tag]).0],
        outputs: amounts
            .iter()
            .enumerate()
            .map(|(i, a)| TxOut {
                amount: *a,
                target: TxOutTarget::ToKey {
                    key: hash_of(&[tag.as_slice(), &(i as u64).to_be_bytes()]).0,
                },
            })
            .collect(),
        commitments: vec![],
        ecdh_info: vec![],
        extra: TxExtra::default(),
        sig_type: SignatureType::Ring,
    }
}

/// Block at `height` whose parent is the block at `height - 1`.
pub fn block_with(height: BlockHeight, txs: &[&Transaction]) -> Block {
    Block {
        id: block_id(height),
        prev_id: if height > 1 {
            Some(block_id(height - 1))
        } else {
            None
        },
        height,
        topo_height: height,
        timestamp: 1_600_000_000 + height * 60,
        fork_version: 1,
        side_block: false,
        miner_tx: coinbase(height, 0),
        tx_hashes: txs.iter().map(|tx| pnk(tx.hash())).collect(),
        votes: vec![],
    }
}

fn pnk<T>(r: Result<T>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("{}", e),
    }
}

/// Write the acceptance facts of `block`: its reward, the bodies of
/// `txs` and their validity marks.
pub fn accept_in(
    stx: &mut StoreTx,
    block: &Block,
    txs: &[&Transaction],
    total: Amount,
    base: Amount,
) -> Result<()> {
    store::record_block_reward(stx, &block.id, total, base)?;
    for tx in txs {
        let hash = store::put_transaction(stx, tx)?;
        store::mark_tx_valid(stx, &block.id, &hash)?;
        if tx.is_token() {
            store::mark_token_valid(stx, &block.id, &hash)?;
        }
    }
    Ok(())
}

pub fn accept(
    store: &mut MemStore,
    block: &Block,
    txs: &[&Transaction],
    total: Amount,
    base: Amount,
) {
    let batch = {
        let mut stx = StoreTx::new(&*store);
        pnk(accept_in(&mut stx, block, txs, total, base));
        stx.into_batch()
    };
    pnk(store.commit(batch));
}

/// Register pool `n` with commission `fee_bps` and one share in it.
pub fn stake_pair(stx: &mut StoreTx, n: u8, fee_bps: u64) -> (PoolId, ShareId) {
    let (p, s) = (pool_id(n), share_id(n));
    pnk(staking::register_pool(stx, p, address(&[b'p', n]), fee_bps, 0));
    pnk(staking::register_share(stx, s, p, address(&[b's', n])));
    (p, s)
}

fn stake_tx(n: u8, target: TxOutTarget) -> Transaction {
    Transaction {
        extra: TxExtra {
            locked_amount_commitment: Some(locked_commitment(n)),
            ..Default::default()
        },
        outputs: vec![
            TxOut {
                amount: 0,
                target,
            },
            TxOut {
                amount: 7,
                target: TxOutTarget::ToKey { key: [n; 32] },
            },
        ],
        ..plain_tx(&[n as Amount])
    }
}

#[inline(always)]
pub fn locked_commitment(n: u8) -> Key {
    [n ^ 0xc0; 32]
}

/// Transaction registering pool `n`.
pub fn register_pool_tx(n: u8, fee_bps: u64) -> Transaction {
    stake_tx(
        n,
        TxOutTarget::ToRegisterPool {
            key: [0xa0 + n; 32],
            pool_id: pool_id(n),
            fee_bps,
            reward: address(&[b'p', n]),
        },
    )
}

/// Transaction buying share `n` of pool `n`.
pub fn buy_share_tx(n: u8) -> Transaction {
    stake_tx(
        0x40 + n,
        TxOutTarget::ToBuyShare {
            key: [0xb0 + n; 32],
            pool_id: pool_id(n),
            share_id: share_id(n),
            reward: address(&[b's', n]),
        },
    )
}

/// Transaction carrying a token sub-transaction with one output per amount.
pub fn token_tx(token: u8, kind: TokenKind, amounts: &[Amount]) -> Transaction {
    let base = plain_tx(&[token as Amount, 1]);
    Transaction {
        extra: TxExtra {
            token: Some(TokenSubTx {
                token_id: H256::repeat_byte(token),
                kind,
                outputs: amounts
                    .iter()
                    .map(|a| TxOut {
                        amount: *a,
                        target: TxOutTarget::ToKey { key: [token; 32] },
                    })
                    .collect(),
            }),
            ..Default::default()
        },
        ..base
    }
}

/// Transaction whose output `index` deposits `amount` into the contract
/// ledger, every earlier output is change back to `sender`.
pub fn deposit_tx<C: ConfidentialCrypto>(
    crypto: &C,
    tx_secret: &Key,
    sender: RewardAddress,
    amount: Amount,
    index: u32,
    blinding: &Key,
) -> Transaction {
    let mut outputs = vec![];
    let mut commitments = vec![];
    let mut ecdh_info = vec![];

    let derivation = crypto.derive_key(&sender.view, tx_secret).unwrap();
    for i in 0..index as u64 {
        let key = crypto.derive_public_key(&derivation, i, &sender.spend).unwrap();
        let shared = crypto.derive_scalar(&derivation, i);
        let (c, t) = crypto.encode_amount(1, blinding, &shared);
        outputs.push(TxOut {
            amount: 0,
            target: TxOutTarget::ToKey { key },
        });
        commitments.push(c);
        ecdh_info.push(t);
    }

    let (out, c, t) =
        pnk(converter::build_deposit_output(crypto, tx_secret, amount, index, blinding));
    outputs.push(out);
    commitments.push(c);
    ecdh_info.push(t);

    Transaction {
        version: 2,
        unlock_time: 0,
        key_images: vec![hash_of(&[&b"deposit"[..], tx_secret]).0],
        outputs,
        commitments,
        ecdh_info,
        extra: TxExtra {
            tx_pub_key: crypto.public_key(tx_secret).unwrap(),
            contract: Some(ContractIntent {
                kind: ContractKind::Deposit,
                sender,
                to: H160::zero(),
                declared_amount: amount,
                deposit_index: index,
                payload: vec![],
                gas: None,
                gas_price: None,
            }),
            ..Default::default()
        },
        sig_type: SignatureType::Ring,
    }
}

/// Transaction addressed to the contract ledger with one change output.
pub fn contract_tx(intent: ContractIntent) -> Transaction {
    let tag = pnk(bincode::serialize(&intent).map_err(Into::into));
    Transaction {
        key_images: vec![hash_of(&[&b"contract"[..], &tag]).0],
        outputs: vec![TxOut {
            amount: 0,
            target: TxOutTarget::ToKey {
                key: hash_of(&[&b"change"[..], &tag]).0,
            },
        }],
        extra: TxExtra {
            contract: Some(intent),
            ..Default::default()
        },
        ..plain_tx(&[])
    }
}

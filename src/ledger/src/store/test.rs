#![cfg(test)]
#![allow(missing_docs)]

use {
    super::{helpers::*, *},
    crate::{
        confidential::ConfidentialCrypto,
        data_model::{
            ContractIntent, ContractKind, OutputRecord, SignatureType, TokenKind, TxOut,
            TxOutTarget, TxType, Vote, H160, U256,
        },
        mocks::{MockEngine, TOKEN_SUPPLY},
        staking::{
            self,
            bonus::{PoolRankEntry, Tier},
            ops::{payout, token},
            reward::{split_reward, RewardParams},
        },
    },
};

const TOTAL: Amount = 1_000_000;

type Chain = Settlement<MemStore, MockEngine>;

fn chain(engine: MockEngine) -> Chain {
    Settlement::new(test_config(), MemStore::new(), engine, RistrettoCrypto).unwrap()
}

fn split_at(s: &Chain, b: &Block) -> RewardSplit {
    split_reward(
        TOTAL,
        TOTAL,
        b.height,
        !b.votes.is_empty(),
        b.side_block,
        b.fork_version,
        &RewardParams::from(s.config()),
    )
    .unwrap()
}

// Accept `b` and settle it, the miner claims its exact pow share.
fn settle(s: &Chain, mut b: Block, txs: &[&Transaction]) -> (Block, SettleSummary) {
    b.miner_tx = coinbase(b.height, split_at(s, &b).pow_reward);
    s.record(|stx| accept_in(stx, &b, txs, TOTAL, TOTAL)).unwrap();
    let summary = s.settle_block(&b).unwrap();
    (b, summary)
}

fn settle_empty(s: &Chain, from: u64, to: u64) {
    for h in from..=to {
        settle(s, block_with(h, &[]), &[]);
    }
}

fn voted(h: u64, votes: &[Vote]) -> Block {
    Block {
        votes: votes.to_vec(),
        ..block_with(h, &[])
    }
}

fn outputs(s: &Chain, b: &Block) -> Vec<OutputRecord> {
    s.query(|stx| api::block_outputs(stx, &b.id)).unwrap()
}

fn dump(s: &Chain) -> BTreeMap<Vec<u8>, Vec<u8>> {
    s.with_store(|m| m.dump().clone())
}

fn both_votes() -> [Vote; 2] {
    [
        Vote {
            pool_id: pool_id(0),
            share_id: share_id(0),
        },
        Vote {
            pool_id: pool_id(1),
            share_id: share_id(1),
        },
    ]
}

// Pools 0 (10% fee) and 1 (25% fee) with one share each, chain at height 9.
fn staked_chain() -> Chain {
    let s = chain(MockEngine::default());
    let txs = [
        register_pool_tx(0, 1000),
        register_pool_tx(1, 2500),
        buy_share_tx(0),
        buy_share_tx(1),
    ];
    let refs = txs.iter().collect::<Vec<_>>();
    settle(&s, block_with(1, &refs), &refs);
    settle_empty(&s, 2, 9);
    s
}

#[test]
fn test_indices_are_dense_and_ordered() {
    let s = chain(MockEngine::default());
    let crypto = RistrettoCrypto;
    let mut next = 0;

    for h in 1..=3u64 {
        let tx = plain_tx(&[h * 10, h * 10 + 1]);
        let (b, sum) = settle(&s, block_with(h, &[&tx]), &[&tx]);

        assert_eq!((next, next + 3), (sum.start, sum.end));
        assert_eq!(Some((sum.start, sum.end)), s.get_block_output_index(&b.id).unwrap());

        let recs = outputs(&s, &b);
        for (i, r) in recs.iter().enumerate() {
            assert_eq!(next + i as u64, r.global_index);
            assert_eq!(b.id, r.block_id);
        }

        // the miner output comes first
        assert_eq!(TxType::Pow, recs[0].tx_type);
        assert_eq!(SignatureType::Coinbase, recs[0].sig_type);
        assert_eq!(h + 60, recs[0].unlock_height);
        assert_eq!(TOTAL, recs[0].amount);
        assert_eq!(crypto.zero_commitment(TOTAL), recs[0].mask);

        assert_eq!((0, 1), (recs[1].index_in_tx, recs[2].index_in_tx));
        assert_eq!(tx.key_images, recs[1].key_images);
        assert!(recs[2].key_images.is_empty());
        assert_eq!(h + 10, recs[1].unlock_height);
        assert_eq!(TxType::Normal, recs[2].tx_type);

        assert_eq!(next as i64 + 1, s.find_tx_output_index(&tx.hash().unwrap()).unwrap());
        let raw = s.read_output_index(next).unwrap().unwrap();
        assert_eq!(recs[0], bincode::deserialize::<OutputRecord>(&raw).unwrap());

        next = sum.end;
    }

    assert_eq!(None, s.read_output_index(next).unwrap());
    assert_eq!(-1, s.find_tx_output_index(&H256::repeat_byte(0xee)).unwrap());
}

#[test]
fn test_stake_outputs_register_pools_and_shares() {
    let s = staked_chain();
    let b1 = block_with(1, &[]);
    let recs = outputs(&s, &b1);
    assert_eq!(9, recs.len());

    let reg = &recs[1];
    assert_eq!(TxType::RegisterPool, reg.tx_type);
    assert_eq!(locked_commitment(0), reg.mask);
    assert_eq!(0, reg.unlock_height);
    assert_eq!((Some(pool_id(0)), None), (reg.pool_id, reg.share_id));
    assert_eq!(TxType::Normal, recs[2].tx_type);
    assert_eq!(11, recs[2].unlock_height);

    let buy = &recs[5];
    assert_eq!(TxType::BuyShare, buy.tx_type);
    assert_eq!(locked_commitment(0x40), buy.mask);
    assert_eq!((Some(pool_id(0)), Some(share_id(0))), (buy.pool_id, buy.share_id));

    let pool = s.query(|stx| staking::must_pool(stx, &pool_id(1))).unwrap();
    assert_eq!(2500, pool.fee_bps);
    assert!(!pool.closed);
    let share = s.query(|stx| staking::must_share(stx, &share_id(0))).unwrap();
    assert_eq!(pool_id(0), share.pool_id);
}

#[test]
fn test_close_pool_output_and_registry() {
    let s = chain(MockEngine::default());
    let reg = register_pool_tx(0, 500);
    settle(&s, block_with(1, &[&reg]), &[&reg]);

    let close = Transaction {
        outputs: vec![
            TxOut {
                amount: 1,
                target: TxOutTarget::ToKey { key: [3; 32] },
            },
            TxOut {
                amount: 0,
                target: TxOutTarget::ToClosePool {
                    key: [4; 32],
                    pool_id: pool_id(0),
                },
            },
        ],
        ..plain_tx(&[99])
    };
    let (b2, _) = settle(&s, block_with(2, &[&close]), &[&close]);

    let recs = outputs(&s, &b2);
    assert_eq!(TxType::ClosePool, recs[2].tx_type);
    assert_eq!(2 + 100, recs[2].unlock_height);
    assert!(s.query(|stx| staking::must_pool(stx, &pool_id(0))).unwrap().closed);
    assert!(s.query(|stx| staking::rank_stats(stx)).unwrap().is_empty());
}

#[test]
fn test_combined_stake_payout() {
    let s = staked_chain();
    let (b10, sum) = settle(&s, voted(10, &both_votes()), &[]);
    assert_eq!(0, sum.destroyed);

    let split = split_at(&s, &b10);
    let per_vote = split.pos_reward / 2;
    let (pool0, pool1) = (per_vote / 10, per_vote / 4);

    let recs = outputs(&s, &b10);
    assert_eq!(5, recs.len());
    let got = recs[1..]
        .iter()
        .map(|r| (r.tx_type, r.pool_id, r.share_id, r.amount))
        .collect::<Vec<_>>();
    assert_eq!(
        got,
        vec![
            (TxType::PoolProfit, Some(pool_id(0)), None, pool0),
            (TxType::ShareProfit, Some(pool_id(0)), Some(share_id(0)), per_vote - pool0),
            (TxType::PoolProfit, Some(pool_id(1)), None, pool1),
            (TxType::ShareProfit, Some(pool_id(1)), Some(share_id(1)), per_vote - pool1),
        ]
    );
    assert!(recs[1..].iter().all(|r| SignatureType::Synthetic == r.sig_type));
    assert!(recs[1..].iter().all(|r| 10 + 60 == r.unlock_height));

    // persisted like an ordinary transaction
    let syn = recs[1].tx_hash;
    assert!(recs[1..].iter().all(|r| syn == r.tx_hash));
    s.query(|stx| {
        assert_eq!(vec![syn], payout::synthetic_txs(stx, &b10.id)?);
        assert!(is_tx_valid(stx, &b10.id, &syn)?);
        assert_eq!(4, get_transaction(stx, &syn)?.unwrap().outputs.len());

        let pool = staking::must_pool(stx, &pool_id(0))?;
        assert_eq!((pool0, b10.timestamp, 1), (pool.profit, pool.last_pay_time, pool.votes));
        assert_eq!(split.reserved, staking::bonus_reserve(stx)?);
        Ok(())
    })
    .unwrap();

    // a vote-less main block destroys the pos part
    let (b11, _) = settle(&s, block_with(11, &[]), &[]);
    let destroyed = split_at(&s, &b11).destroyed;
    assert!(0 < destroyed);
    assert_eq!(Some((destroyed, destroyed)), s.get_block_destroyed(&b11.id).unwrap());
}

#[test]
fn test_bonus_pays_out_the_reserve_and_rolls_votes() {
    let s = staked_chain();
    settle(&s, voted(10, &both_votes()), &[]);
    settle_empty(&s, 11, 19);

    let reserve = s.query(|stx| staking::bonus_reserve(stx)).unwrap();
    let b20 = block_with(20, &[]);
    let reserve = reserve + split_at(&s, &b20).reserved;
    let (b20, _) = settle(&s, b20, &[]);

    // one gold and one silver pool, no momentum history
    let gold = reserve / 2;
    let recs = outputs(&s, &b20);
    let got = recs[1..]
        .iter()
        .map(|r| (r.tx_type, r.pool_id, r.amount))
        .collect::<Vec<_>>();
    assert_eq!(
        got,
        vec![
            (TxType::BonusProfit, Some(pool_id(0)), gold),
            (TxType::BonusProfit, Some(pool_id(1)), reserve - gold),
        ]
    );

    s.query(|stx| {
        assert_eq!(0, staking::bonus_reserve(stx)?);
        let pool = staking::must_pool(stx, &pool_id(1))?;
        assert_eq!((0, 1), (pool.votes, pool.prev_votes));

        let raw = stx
            .load(UNIVERSE_BLOCK, "rank-snapshot", b20.id.as_bytes(), "")?
            .unwrap();
        let ranked: Vec<PoolRankEntry> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            vec![Tier::Gold, Tier::Silver],
            ranked.iter().map(|e| e.tier).collect::<Vec<_>>()
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_bonus_ranks_only_voted_pools() {
    let s = staked_chain();
    settle(&s, voted(10, &both_votes()[..1]), &[]);
    settle_empty(&s, 11, 19);

    let reserve = s.query(|stx| staking::bonus_reserve(stx)).unwrap();
    let b20 = block_with(20, &[]);
    let reserve = reserve + split_at(&s, &b20).reserved;
    let (b20, _) = settle(&s, b20, &[]);

    // pool 1 sat idle, pool 0 is the lone gold pool
    let got = outputs(&s, &b20)[1..]
        .iter()
        .map(|r| (r.tx_type, r.pool_id, r.amount))
        .collect::<Vec<_>>();
    assert_eq!(vec![(TxType::BonusProfit, Some(pool_id(0)), reserve)], got);

    s.query(|stx| {
        assert_eq!(0, staking::bonus_reserve(stx)?);
        let raw = stx
            .load(UNIVERSE_BLOCK, "rank-snapshot", b20.id.as_bytes(), "")?
            .unwrap();
        let ranked: Vec<PoolRankEntry> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(1, ranked.len());
        assert_eq!((pool_id(0), Tier::Gold), (ranked[0].pool_id, ranked[0].tier));

        let idle = staking::must_pool(stx, &pool_id(1))?;
        assert_eq!((0, 0), (idle.votes, idle.prev_votes));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_side_block_skips_the_bonus() {
    let s = staked_chain();
    settle(&s, voted(10, &both_votes()), &[]);
    settle_empty(&s, 11, 19);
    let reserve = s.query(|stx| staking::bonus_reserve(stx)).unwrap();

    let side = Block {
        side_block: true,
        ..block_with(20, &[])
    };
    let reserved = split_at(&s, &side).reserved;
    assert!(0 < reserved);
    let (side, sum) = settle(&s, side, &[]);

    assert_eq!(1, sum.end - sum.start);
    assert_eq!(TxType::Pow, outputs(&s, &side)[0].tx_type);
    s.query(|stx| {
        assert_eq!(reserve + reserved, staking::bonus_reserve(stx)?);
        assert!(payout::synthetic_txs(stx, &side.id)?.is_empty());
        assert_eq!(
            None,
            stx.load(UNIVERSE_BLOCK, "rank-snapshot", side.id.as_bytes(), "")?
        );
        // the vote epoch keeps running
        let pool = staking::must_pool(stx, &pool_id(0))?;
        assert_eq!((1, 0), (pool.votes, pool.prev_votes));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_cycle_payouts_wait_for_their_boundary() {
    let s = staked_chain();
    // nobody votes before 25, the bonus at 20 ranks no pool
    settle_empty(&s, 10, 24);
    assert_eq!(1, outputs(&s, &block_with(20, &[])).len());

    let (b25, _) = settle(&s, voted(25, &both_votes()), &[]);
    let (b26, _) = settle(&s, voted(26, &both_votes()), &[]);
    assert_eq!(1, outputs(&s, &b25).len());
    assert_eq!(1, outputs(&s, &b26).len());

    let per_vote = split_at(&s, &b25).pos_reward / 2;
    let (pool0, pool1) = (per_vote / 10, per_vote / 4);

    // 27 closes both a share cycle and a pool cycle
    let (b27, _) = settle(&s, voted(27, &both_votes()), &[]);
    let recs = outputs(&s, &b27);
    let got = recs[1..]
        .iter()
        .map(|r| (r.tx_type, r.share_id.is_some(), r.amount))
        .collect::<Vec<_>>();
    assert_eq!(
        got,
        vec![
            (TxType::ShareProfit, true, 2 * (per_vote - pool0)),
            (TxType::ShareProfit, true, 2 * (per_vote - pool1)),
            (TxType::PoolProfit, false, 2 * pool0),
            (TxType::PoolProfit, false, 2 * pool1),
        ]
    );
    assert_ne!(recs[1].tx_hash, recs[3].tx_hash);
    assert_eq!(
        2,
        s.query(|stx| payout::synthetic_txs(stx, &b27.id)).unwrap().len()
    );

    // what 27 accumulated waits for the next boundary that carries pos
    let (b28, _) = settle(&s, block_with(28, &[]), &[]);
    assert_eq!(1, outputs(&s, &b28).len());
    settle(&s, block_with(29, &[]), &[]);
    let (b30, _) = settle(&s, voted(30, &both_votes()), &[]);
    let shares = outputs(&s, &b30)
        .into_iter()
        .filter(|r| TxType::ShareProfit == r.tx_type)
        .map(|r| r.amount)
        .collect::<Vec<_>>();
    assert_eq!(vec![per_vote - pool0, per_vote - pool1], shares);
}

#[test]
fn test_token_outputs_follow_their_parent() {
    let s = chain(MockEngine::default());
    let issue = token_tx(7, TokenKind::Issue, &[1000, 1000]);
    let unchecked = token_tx(8, TokenKind::Transfer, &[300]);
    let mut b = block_with(1, &[&issue, &unchecked]);
    b.miner_tx = coinbase(1, TOTAL);

    s.record(|stx| {
        accept_in(stx, &b, &[&issue], TOTAL, TOTAL)?;
        let h = put_transaction(stx, &unchecked)?;
        mark_tx_valid(stx, &b.id, &h)
    })
    .unwrap();
    let sum = s.settle_block(&b).unwrap();
    assert_eq!((0, 7), (sum.start, sum.end));

    let recs = outputs(&s, &b);
    let tokens = recs
        .iter()
        .filter(|r| r.token_id.is_some())
        .map(|r| (r.global_index, r.index_in_tx, r.tx_type, r.amount))
        .collect::<Vec<_>>();
    assert_eq!(
        vec![(3, 2, TxType::IssueToken, 1000), (4, 3, TxType::IssueToken, 500)],
        tokens
    );

    let entry = s
        .query(|stx| token::get_token_entry(stx, &H256::repeat_byte(7), 4))
        .unwrap()
        .unwrap();
    assert_eq!((500, recs[4].key), (entry.amount, entry.key));
}

#[test]
fn test_withdraw_surfaces_as_contract_output() {
    let alice = address(b"alice");
    let mut engine = MockEngine::default();
    engine.deposit(&alice.account(), U256::from(25_000)).unwrap();
    engine.commit(0).unwrap();
    let s = chain(engine);

    let withdraw = contract_tx(ContractIntent {
        kind: ContractKind::Withdraw,
        sender: alice,
        to: H160::zero(),
        declared_amount: 0,
        deposit_index: 0,
        payload: 10_000u64.to_be_bytes().to_vec(),
        gas: None,
        gas_price: None,
    });
    let (b, sum) = settle(&s, block_with(1, &[&withdraw]), &[&withdraw]);
    assert_eq!(1, sum.contract_txs);

    let recs = outputs(&s, &b);
    assert_eq!(3, recs.len());
    let out = &recs[2];
    assert_eq!(TxType::ContractTx, out.tx_type);
    assert_eq!(SignatureType::Synthetic, out.sig_type);
    assert_eq!(10_000, out.amount);
    assert_eq!(1 + 10, out.unlock_height);

    let crypto = RistrettoCrypto;
    assert_eq!(crypto.zero_commitment(10_000), out.mask);

    // alice finds the output with her view key
    let syn = s.query(|stx| get_transaction(stx, &out.tx_hash)).unwrap().unwrap();
    let (view_secret, _) = RistrettoCrypto::keypair_from_seed(b"alice/view");
    let derivation = crypto.derive_key(&syn.extra.tx_pub_key, &view_secret).unwrap();
    assert_eq!(
        Some(out.key),
        crypto.derive_public_key(&derivation, 0, &alice.spend)
    );

    let hash = withdraw.hash().unwrap();
    assert_eq!(2, s.find_tx_output_index(&out.tx_hash).unwrap());
    assert_eq!(10_000, s.get_contract_transfer(&hash).unwrap().unwrap().amount);
    assert_eq!(
        U256::from(15_000),
        s.with_engine(|e| e.get_balance(&alice.account()))
    );
}

#[test]
fn test_deposit_credits_the_contract_account() {
    let s = chain(MockEngine::default());
    let crypto = RistrettoCrypto;
    let (tx_secret, _) = RistrettoCrypto::keypair_from_seed(b"deposit-tx");
    let blinding = crypto.hash_to_scalar(&[b"blinding"]);
    let dave = address(b"dave");

    let deposit = deposit_tx(&crypto, &tx_secret, dave, 40_000, 1, &blinding);
    let (b, sum) = settle(&s, block_with(1, &[&deposit]), &[&deposit]);
    assert_eq!(1, sum.contract_txs);

    let hash = deposit.hash().unwrap();
    let res = s
        .query(|stx| converter::get_contract_result(stx, &hash))
        .unwrap()
        .unwrap();
    assert!(res.ok, "{:?}", res.error);
    assert_eq!(
        U256::from(40_000),
        s.with_engine(|e| e.get_balance(&dave.account()))
    );

    // the deposit itself stays an ordinary confidential output
    let recs = outputs(&s, &b);
    assert_eq!(3, recs.len());
    assert_eq!(deposit.commitments[1], recs[2].mask);
    assert_eq!(None, s.get_contract_transfer(&hash).unwrap());
}

#[test]
fn test_contract_creation_is_queryable() {
    let carol = address(b"carol");
    let mut engine = MockEngine::default();
    engine.deposit(&carol.account(), U256::from(1_000_000)).unwrap();
    engine.commit(0).unwrap();
    let s = chain(engine);

    let create = contract_tx(ContractIntent {
        kind: ContractKind::Call,
        sender: carol,
        to: H160::zero(),
        declared_amount: 0,
        deposit_index: 0,
        payload: b"token".to_vec(),
        gas: None,
        gas_price: None,
    });
    let (b, _) = settle(&s, block_with(1, &[&create]), &[&create]);

    let hash = create.hash().unwrap();
    let addr = s.get_contract_address(&hash).unwrap().unwrap();
    let t = s
        .query(|stx| converter::get_token_transfer(stx, &hash, 0))
        .unwrap()
        .unwrap();
    assert_eq!((addr, U256::from(TOKEN_SUPPLY)), (t.contract, t.value));
    assert_eq!(
        s.with_engine(|e| e.state_root()),
        s.get_state_root(&b.id).unwrap()
    );
}

#[test]
fn test_revert_then_resettle_reproduces_identical_bytes() {
    let alice = address(b"alice");
    let mut engine = MockEngine::default();
    engine.deposit(&alice.account(), U256::from(25_000)).unwrap();
    engine.commit(0).unwrap();
    let s = chain(engine);

    let tx1 = plain_tx(&[5, 6]);
    let (b1, sum1) = settle(&s, block_with(1, &[&tx1]), &[&tx1]);
    let root1 = s.with_engine(|e| e.state_root());

    let withdraw = contract_tx(ContractIntent {
        kind: ContractKind::Withdraw,
        sender: alice,
        to: H160::zero(),
        declared_amount: 0,
        deposit_index: 0,
        payload: 10_000u64.to_be_bytes().to_vec(),
        gas: None,
        gas_price: None,
    });
    let mut b2 = block_with(2, &[&withdraw]);
    b2.miner_tx = coinbase(2, TOTAL);
    s.record(|stx| accept_in(stx, &b2, &[&withdraw], TOTAL, TOTAL))
        .unwrap();
    let accepted = dump(&s);

    let sum2 = s.settle_block(&b2).unwrap();
    let settled = dump(&s);
    assert!(s.get_state_root(&b2.id).unwrap().is_some());

    // only the tip can go
    assert!(s.revert_block(&b1.id).unwrap_err().is_fatal());

    s.revert_block(&b2.id).unwrap();
    assert_eq!(accepted, dump(&s));
    assert_eq!(None, s.get_block_output_index(&b2.id).unwrap());
    assert_eq!(None, s.get_state_root(&b2.id).unwrap());
    assert_eq!(None, s.get_contract_transfer(&withdraw.hash().unwrap()).unwrap());
    assert_eq!(-1, s.find_tx_output_index(&withdraw.hash().unwrap()).unwrap());
    assert_eq!(sum1.end, s.query(allocator::next_global_index).unwrap());
    assert_eq!(root1, s.with_engine(|e| e.state_root()));
    assert_eq!(
        U256::from(25_000),
        s.with_engine(|e| e.get_balance(&alice.account()))
    );

    assert_eq!(sum2, s.settle_block(&b2).unwrap());
    assert_eq!(settled, dump(&s));
}

#[test]
fn test_revert_restores_stake_state() {
    let s = staked_chain();
    settle(&s, voted(10, &both_votes()), &[]);
    settle_empty(&s, 11, 19);
    let reserve = s.query(|stx| staking::bonus_reserve(stx)).unwrap();
    let pool = s.query(|stx| staking::must_pool(stx, &pool_id(0))).unwrap();

    let (b20, _) = settle(&s, block_with(20, &[]), &[]);
    assert_eq!(0, s.query(|stx| staking::bonus_reserve(stx)).unwrap());

    s.revert_block(&b20.id).unwrap();
    assert_eq!(reserve, s.query(|stx| staking::bonus_reserve(stx)).unwrap());
    assert_eq!(pool, s.query(|stx| staking::must_pool(stx, &pool_id(0))).unwrap());
    assert!(s.query(|stx| payout::synthetic_txs(stx, &b20.id)).unwrap().is_empty());
}

#[test]
fn test_coinbase_mismatch_commits_nothing() {
    let s = chain(MockEngine::default());
    settle(&s, block_with(1, &[]), &[]);
    let root = s.with_engine(|e| e.state_root());

    let tx = plain_tx(&[9]);
    let mut b2 = block_with(2, &[&tx]);
    s.record(|stx| accept_in(stx, &b2, &[&tx], TOTAL, TOTAL))
        .unwrap();
    let before = dump(&s);

    b2.miner_tx = coinbase(2, TOTAL - 1);
    assert!(s.settle_block(&b2).unwrap_err().is_fatal());
    assert_eq!(before, dump(&s));
    assert_eq!(root, s.with_engine(|e| e.state_root()));
    assert_eq!(-1, s.find_tx_output_index(&tx.hash().unwrap()).unwrap());

    b2.miner_tx = coinbase(2, TOTAL);
    assert_eq!(1, s.settle_block(&b2).unwrap().start);
    assert!(s.settle_block(&b2).unwrap_err().is_fatal());
}

#[test]
fn test_missing_parent_record_is_fatal() {
    let s = chain(MockEngine::default());
    settle(&s, block_with(1, &[]), &[]);

    // the parent of 3 was never settled
    let mut b3 = block_with(3, &[]);
    b3.miner_tx = coinbase(3, TOTAL);
    s.record(|stx| accept_in(stx, &b3, &[], TOTAL, TOTAL)).unwrap();
    assert!(s.settle_block(&b3).unwrap_err().is_fatal());
    assert_eq!(None, s.get_block_output_index(&b3.id).unwrap());
}

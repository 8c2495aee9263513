//!
//! # Output index allocation
//!
//! Every spendable output gets exactly one global index, in this order:
//! the miner output, stake payouts, the bonus payout, then the outputs of
//! each valid transaction of the block followed by its token and contract
//! withdraw outputs.
//!

use {
    super::{
        self as store, StoreTx, UNIVERSE_BLOCK, UNIVERSE_META, UNIVERSE_OUTPUT, UNIVERSE_TX,
    },
    crate::{
        confidential::ConfidentialCrypto,
        converter,
        data_model::{
            Amount, Block, BlockId, EcdhTuple, OutputRecord, SignatureType, Transaction,
            TxHash, TxOutTarget, TxType, MAX_BLOCK_NUMBER, MAX_UNLOCK_HEIGHT,
        },
        error::Result,
        fatal,
        staking::{
            self,
            ops::{
                payout::{self, Distribution, Payee, SyntheticTx},
                token::{self, TokenLedgerEntry},
            },
            reward::{split_reward, RewardParams, RewardSplit},
            EpochTable,
        },
    },
    config::settle::SettleConfig,
    tracing::{debug, info},
};

/// Next free global index, handed from one allocation to the next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexCursor {
    next: u64,
}

impl IndexCursor {
    #[allow(missing_docs)]
    pub fn new(next: u64) -> Self {
        IndexCursor { next }
    }

    /// Consume one index.
    #[inline(always)]
    pub fn take(&mut self) -> Result<u64> {
        let idx = self.next;
        self.next = idx
            .checked_add(1)
            .ok_or_else(|| fatal!("global output index exhausted"))?;
        Ok(idx)
    }

    #[allow(missing_docs)]
    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.next
    }
}

/// What allocation produced for one block.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockSummary {
    pub start: u64,
    pub end: u64,
    pub split: RewardSplit,
    pub destroyed: Amount,
}

/// Next free global index of the chain.
pub fn next_global_index(stx: &StoreTx) -> Result<u64> {
    Ok(stx
        .load_u64(UNIVERSE_META, "next-output-index", &[], "")?
        .unwrap_or(0))
}

fn put_output(stx: &mut StoreTx, rec: &OutputRecord) -> Result<()> {
    let key = rec.global_index.to_be_bytes();
    if stx.contains(UNIVERSE_OUTPUT, "record", &key, "")? {
        return Err(fatal!("global index {} assigned twice", rec.global_index));
    }
    stx.store_obj(UNIVERSE_OUTPUT, "record", &key, "", rec)?;
    if 0 == rec.index_in_tx {
        stx.store_u64(UNIVERSE_TX, "output-index", rec.tx_hash.as_bytes(), "", rec.global_index)?;
    }
    Ok(())
}

// Builds records sharing the block-level fields.
struct Emitter<'b> {
    block: &'b Block,
    cursor: IndexCursor,
}

impl<'b> Emitter<'b> {
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        tx_hash: TxHash,
        index_in_tx: u32,
        key: [u8; 32],
        mask: [u8; 32],
        ecdh: EcdhTuple,
        amount: Amount,
        unlock_height: u64,
        sig_type: SignatureType,
        tx_type: TxType,
    ) -> Result<OutputRecord> {
        Ok(OutputRecord {
            block_id: self.block.id,
            tx_hash,
            height: self.block.height,
            topo_height: self.block.topo_height,
            index_in_tx,
            global_index: self.cursor.take()?,
            key,
            mask,
            ecdh,
            amount,
            unlock_height,
            sig_type,
            tx_type,
            key_images: vec![],
            payment_id: None,
            pool_id: None,
            share_id: None,
            token_id: None,
        })
    }
}

/// Unlock height of output `i` of an ordinary transaction.
pub fn unlock_height(
    cfg: &SettleConfig,
    block: &Block,
    tx: &Transaction,
    i: usize,
    target: &TxOutTarget,
) -> u64 {
    let h = block.height;
    let mut unlock = h.saturating_add(cfg.normal_tx_amount_unlock);

    if 0 == i && 0 != tx.unlock_time {
        unlock = tx.unlock_time;
    }

    match target {
        TxOutTarget::ToBuyShare { .. } | TxOutTarget::ToRegisterPool { .. } => unlock = 0,
        TxOutTarget::ToClosePool { .. } => {
            unlock = h.saturating_add(cfg.close_pool_tx_amount_unlock)
        }
        TxOutTarget::ToKey { .. }
        | TxOutTarget::ToSubAddress { .. }
        | TxOutTarget::ToRepoShare { .. } => {}
    }

    if 0 == i && tx.extra.locked {
        unlock = MAX_UNLOCK_HEIGHT;
    }

    clamp_unlock(cfg, block, unlock)
}

/// Raise too-short unlocks once the clamp fork is active.
pub fn clamp_unlock(cfg: &SettleConfig, block: &Block, unlock: u64) -> u64 {
    if block.fork_version < cfg.unlock_clamp_fork_version || 0 == unlock {
        return unlock;
    }
    if unlock < MAX_BLOCK_NUMBER {
        unlock.max(block.height.saturating_add(cfg.unlock_clamp_blocks))
    } else {
        unlock.max(block.timestamp.saturating_add(cfg.unlock_clamp_seconds))
    }
}

fn allocate_coinbase<C: ConfidentialCrypto + ?Sized>(
    stx: &mut StoreTx,
    crypto: &C,
    cfg: &SettleConfig,
    em: &mut Emitter,
    split: &RewardSplit,
) -> Result<()> {
    let block = em.block;
    let tx = &block.miner_tx;
    let out = match tx.outputs.as_slice() {
        [out] if out.amount == split.pow_reward => out,
        _ => {
            return Err(fatal!(
                "miner tx of block {:?} must pay exactly {} in one output",
                block.id,
                split.pow_reward
            ))
        }
    };

    let hash = store::put_transaction(stx, tx)?;
    let rec = em.emit(
        hash,
        0,
        out.target.key(),
        crypto.zero_commitment(out.amount),
        EcdhTuple::default(),
        out.amount,
        block.height.saturating_add(cfg.mined_money_unlock_window),
        SignatureType::Coinbase,
        TxType::Pow,
    )?;
    put_output(stx, &OutputRecord {
        key_images: tx.key_images.clone(),
        ..rec
    })
}

#[allow(clippy::too_many_arguments)]
fn allocate_synthetic<C: ConfidentialCrypto + ?Sized>(
    stx: &mut StoreTx,
    crypto: &C,
    em: &mut Emitter,
    seed: &BlockId,
    dist: Distribution,
    payees: Vec<Payee>,
    unlock: u64,
) -> Result<Option<SyntheticTx>> {
    if payees.is_empty() {
        return Ok(None);
    }

    let syn = payout::synthesize(crypto, seed, dist, payees)?;
    payout::persist_synthetic(stx, em.block, &syn)?;

    for (i, (out, p)) in syn.tx.outputs.iter().zip(syn.payees.iter()).enumerate() {
        let rec = em.emit(
            syn.hash,
            i as u32,
            out.target.key(),
            syn.tx.commitments[i],
            syn.tx.ecdh_info[i],
            out.amount,
            unlock,
            SignatureType::Synthetic,
            p.tx_type,
        )?;
        put_output(stx, &OutputRecord {
            pool_id: p.pool_id,
            share_id: p.share_id,
            ..rec
        })?;
    }

    debug!(tx = ?syn.hash, ?dist, outputs = syn.payees.len(), "synthetic outputs allocated");
    Ok(Some(syn))
}

fn allocate_tx<C: ConfidentialCrypto + ?Sized>(
    stx: &mut StoreTx,
    crypto: &C,
    cfg: &SettleConfig,
    em: &mut Emitter,
    tx_hash: &TxHash,
) -> Result<()> {
    let block = em.block;
    let tx = store::get_transaction(stx, tx_hash)?
        .ok_or_else(|| fatal!("valid tx {:?} has no body", tx_hash))?;

    let confidential = !tx.commitments.is_empty();
    if confidential
        && (tx.commitments.len() != tx.outputs.len() || tx.ecdh_info.len() != tx.outputs.len())
    {
        return Err(fatal!("tx {:?} has malformed amount data", tx_hash));
    }

    for (i, out) in tx.outputs.iter().enumerate() {
        let (mask, ecdh) = match out.target {
            TxOutTarget::ToBuyShare { .. } | TxOutTarget::ToRegisterPool { .. } => (
                tx.extra
                    .locked_amount_commitment
                    .ok_or_else(|| fatal!("stake tx {:?} without locked commitment", tx_hash))?,
                EcdhTuple::default(),
            ),
            _ if confidential => (tx.commitments[i], tx.ecdh_info[i]),
            _ => (crypto.zero_commitment(out.amount), EcdhTuple::default()),
        };

        let (pool_id, share_id) = out.target.linkage();
        let rec = em.emit(
            *tx_hash,
            i as u32,
            out.target.key(),
            mask,
            ecdh,
            out.amount,
            unlock_height(cfg, block, &tx, i, &out.target),
            tx.sig_type,
            out.target.tx_type(),
        )?;
        let rec = OutputRecord {
            key_images: if 0 == i { tx.key_images.clone() } else { vec![] },
            payment_id: tx.extra.payment_id,
            pool_id,
            share_id,
            ..rec
        };
        put_output(stx, &rec)?;
        staking::apply_target_effects(stx, &out.target, block.height)?;
    }

    let contract_active = cfg.contract_fork_active(block.height);

    if let Some(sub) = tx.extra.token.as_ref() {
        if store::is_token_valid(stx, &block.id, tx_hash)? {
            let tx_type = token::token_tx_type(sub);
            for (j, out) in sub.outputs.iter().enumerate() {
                let amount = token::token_output_amount(sub, j, &cfg.issue_token_reward_percent)?;
                let rec = em.emit(
                    *tx_hash,
                    (tx.outputs.len() + j) as u32,
                    out.target.key(),
                    crypto.zero_commitment(amount),
                    EcdhTuple::default(),
                    amount,
                    clamp_unlock(cfg, block, block.height.saturating_add(cfg.normal_tx_amount_unlock)),
                    tx.sig_type,
                    tx_type,
                )?;
                let rec = OutputRecord {
                    token_id: Some(sub.token_id),
                    ..rec
                };
                put_output(stx, &rec)?;

                if contract_active {
                    token::record_token_entry(
                        stx,
                        &TokenLedgerEntry {
                            token_id: sub.token_id,
                            tx_hash: *tx_hash,
                            global_index: rec.global_index,
                            amount,
                            key: rec.key,
                        },
                    )?;
                }
            }
        }
    }

    if contract_active {
        if let Some(t) = converter::get_contract_transfer(stx, tx_hash)? {
            let payee = Payee {
                reward: t.address,
                amount: t.amount,
                tx_type: TxType::ContractTx,
                pool_id: None,
                share_id: None,
            };
            let unlock =
                clamp_unlock(cfg, block, block.height.saturating_add(cfg.normal_tx_amount_unlock));
            allocate_synthetic(stx, crypto, em, tx_hash, Distribution::Contract, vec![payee], unlock)?;
        }
    }

    Ok(())
}

/// Total and cumulative destroyed coins of a block.
pub fn block_destroyed(stx: &StoreTx, block: &BlockId) -> Result<Option<(Amount, Amount)>> {
    let this = stx.load_u64(UNIVERSE_BLOCK, "destroyed", block.as_bytes(), "block")?;
    let total = stx.load_u64(UNIVERSE_BLOCK, "destroyed", block.as_bytes(), "total")?;
    match (this, total) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        _ => Err(fatal!("half-written destroyed coins of block {:?}", block)),
    }
}

fn record_destroyed(stx: &mut StoreTx, block: &Block, destroyed: Amount) -> Result<()> {
    let parent_total = match block.prev_id {
        None => 0,
        Some(prev) => {
            block_destroyed(stx, &prev)?
                .ok_or_else(|| fatal!("parent {:?} has no destroyed-coin record", prev))?
                .1
        }
    };
    let total = parent_total
        .checked_add(destroyed)
        .ok_or_else(|| fatal!("cumulative destroyed coins overflow"))?;
    stx.store_u64(UNIVERSE_BLOCK, "destroyed", block.id.as_bytes(), "block", destroyed)?;
    stx.store_u64(UNIVERSE_BLOCK, "destroyed", block.id.as_bytes(), "total", total)
}

/// Allocate every output of `block` inside `stx`.
pub fn allocate_block<C: ConfidentialCrypto + ?Sized>(
    stx: &mut StoreTx,
    crypto: &C,
    cfg: &SettleConfig,
    block: &Block,
) -> Result<BlockSummary> {
    let h = block.height;
    let start = next_global_index(stx)?;
    let mut em = Emitter {
        block,
        cursor: IndexCursor::new(start),
    };

    // 1. reward split
    let (total, base) = store::block_reward(stx, &block.id)?
        .ok_or_else(|| fatal!("block {:?} has no reward record", block.id))?;
    let split = split_reward(
        total,
        base,
        h,
        !block.votes.is_empty(),
        block.side_block,
        block.fork_version,
        &RewardParams::from(cfg),
    )?;
    let mut destroyed = split.destroyed;
    if 0 < split.reserved {
        staking::reserve_add(stx, split.reserved)?;
    }

    // 2. coinbase
    allocate_coinbase(stx, crypto, cfg, &mut em, &split)?;

    if !block.side_block && !block.votes.is_empty() {
        staking::count_votes(stx, &block.votes)?;
    }

    // 3. stake payouts
    let payout_unlock = h.saturating_add(cfg.mined_money_unlock_window);
    if 0 < split.pos_reward {
        if h < cfg.stake_cycle_start_height {
            let (payees, dust) = payout::combined_payees(stx, &block.votes, split.pos_reward)?;
            destroyed += dust;
            allocate_synthetic(stx, crypto, &mut em, &block.id, Distribution::Stake, payees, payout_unlock)?;
        } else {
            if 0 == h % cfg.share_cycle_blocks {
                let payees = payout::cycle_payees(stx, EpochTable::Share)?;
                allocate_synthetic(stx, crypto, &mut em, &block.id, Distribution::ShareCycle, payees, payout_unlock)?;
            }
            if 0 == h % cfg.pool_cycle_blocks {
                let payees = payout::cycle_payees(stx, EpochTable::Pool)?;
                allocate_synthetic(stx, crypto, &mut em, &block.id, Distribution::PoolCycle, payees, payout_unlock)?;
            }
            destroyed += payout::accumulate_cycle(stx, &block.votes, split.pos_reward)?;
        }
    }

    // 4. bonus
    if !block.side_block && cfg.is_bonus_height(h) {
        let payees = payout::bonus_payees(stx, cfg, block)?;
        let paid: Amount = payees.iter().map(|p| p.amount).sum();
        allocate_synthetic(stx, crypto, &mut em, &block.id, Distribution::Bonus, payees, payout_unlock)?;
        staking::reserve_sub(stx, paid)?;
    }

    // 5. destroyed coins
    record_destroyed(stx, block, destroyed)?;

    // 6. ordinary transactions
    for tx_hash in block.tx_hashes.iter() {
        if store::is_tx_valid(stx, &block.id, tx_hash)? {
            allocate_tx(stx, crypto, cfg, &mut em, tx_hash)?;
        }
    }

    // 7. bounds
    let end = em.cursor.position();
    stx.store_u64(UNIVERSE_BLOCK, "bounds", block.id.as_bytes(), "start", start)?;
    stx.store_u64(UNIVERSE_BLOCK, "bounds", block.id.as_bytes(), "end", end)?;
    stx.store_u64(UNIVERSE_META, "next-output-index", &[], "", end)?;

    info!(height = h, start, end, destroyed, "outputs allocated");

    Ok(BlockSummary {
        start,
        end,
        split,
        destroyed,
    })
}

//!
//! # Contract value bridge
//!
//! Moves value between the confidential ledger and the account-state
//! contract ledger. This is the only place the two ledgers meet:
//!
//! - deposit: a confidential output sent to the contract address is opened
//!   with the public contract view key and credited to the caller's account;
//! - withdraw: the caller's account is debited and a `ContractTransfer` is
//!   recorded, the allocator later turns it into a `ContractTx` output;
//! - call: a message runs against the engine with prepaid gas.
//!

pub mod engine;
pub mod erc20;

use {
    crate::{
        confidential::{self, ConfidentialCrypto},
        data_model::{
            Amount, Block, ContractIntent, ContractKind, EcdhTuple, Key, RewardAddress,
            Transaction, TxHash, TxOut, TxOutTarget, H160, H256, U256,
        },
        error::{Result, SettleError},
        fatal, reject,
        store::{self, StoreTx, UNIVERSE_BLOCK, UNIVERSE_CONTRACT, UNIVERSE_TOKEN},
    },
    config::settle::SettleConfig,
    engine::{ContractEngine, ExecContext, GasPool, GasSettings, Message},
    erc20::TokenTransfer,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

/// Value withdrawn from the contract ledger, keyed by tx hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractTransfer {
    /// confidential address receiving the value
    pub address: RewardAddress,
    #[allow(missing_docs)]
    pub amount: Amount,
}

/// Outcome of one contract transaction.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractResult {
    pub ok: bool,
    pub kind: ContractKind,
    pub gas_used: u64,
    pub return_data: Vec<u8>,
    pub contract_address: Option<H160>,
    pub error: Option<String>,
}

/// Who created a contract, and in which transaction.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractOrigin {
    pub tx_hash: TxHash,
    pub origin: H160,
}

// Everything a successful intent writes, held back until the engine is done.
#[derive(Debug, Default)]
struct Effects {
    transfer: Option<ContractTransfer>,
    token_transfers: Vec<TokenTransfer>,
    created: Option<H160>,
}

/// Build a deposit output: a stealth output to the contract address whose
/// amount opens with the public contract view key.
///
/// Returns the output, its commitment and its ecdh tuple; the caller puts
/// `tx_secret * G` in the transaction's public key.
pub fn build_deposit_output<C: ConfidentialCrypto + ?Sized>(
    crypto: &C,
    tx_secret: &Key,
    amount: Amount,
    index: u32,
    blinding: &Key,
) -> Result<(TxOut, Key, EcdhTuple)> {
    let to = confidential::contract_address(crypto)
        .ok_or_else(|| fatal!("invalid contract address"))?;
    let derivation = crypto
        .derive_key(&to.view, tx_secret)
        .ok_or_else(|| fatal!("invalid contract view key"))?;
    let key = crypto
        .derive_public_key(&derivation, index as u64, &to.spend)
        .ok_or_else(|| fatal!("invalid contract spend key"))?;
    let shared = crypto.derive_scalar(&derivation, index as u64);
    let (commitment, tuple) = crypto.encode_amount(amount, blinding, &shared);

    Ok((
        TxOut {
            amount: 0,
            target: TxOutTarget::ToKey { key },
        },
        commitment,
        tuple,
    ))
}

/// Open the deposit output with the contract view key and return the
/// amount, which must equal the declared one.
pub fn check_deposit<C: ConfidentialCrypto + ?Sized>(
    crypto: &C,
    tx: &Transaction,
    intent: &ContractIntent,
) -> Result<Amount> {
    if 0 == intent.declared_amount {
        return Err(reject!("deposit of zero"));
    }

    let i = intent.deposit_index as usize;
    let out = tx
        .outputs
        .get(i)
        .ok_or_else(|| reject!("deposit output {} does not exist", i))?;
    let (commitment, tuple) = match (tx.commitments.get(i), tx.ecdh_info.get(i)) {
        (Some(c), Some(t)) => (c, t),
        _ => return Err(reject!("deposit output {} is not confidential", i)),
    };

    let to = confidential::contract_address(crypto)
        .ok_or_else(|| fatal!("invalid contract address"))?;
    let view_secret = confidential::contract_view_secret(crypto);
    let derivation = crypto
        .derive_key(&tx.extra.tx_pub_key, &view_secret)
        .ok_or_else(|| reject!("invalid tx public key"))?;

    let expected = crypto.derive_public_key(&derivation, i as u64, &to.spend);
    if Some(out.target.key()) != expected {
        return Err(reject!("deposit output {} is not sent to the contract ledger", i));
    }

    let shared = crypto.derive_scalar(&derivation, i as u64);
    let (amount, ok) = crypto.decode_amount(tuple, &shared, commitment);
    if !ok || amount != intent.declared_amount {
        return Err(reject!(
            "deposit amount mismatch: declared {}",
            intent.declared_amount
        ));
    }

    Ok(amount)
}

/// Amount of a withdraw payload: exactly 8 big-endian bytes.
pub fn decode_withdraw_amount(payload: &[u8]) -> Result<Amount> {
    if 8 != payload.len() {
        return Err(reject!("withdraw payload of {} bytes", payload.len()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(payload);
    match u64::from_be_bytes(buf) {
        0 => Err(reject!("withdraw of zero")),
        n => Ok(n),
    }
}

#[allow(clippy::too_many_arguments)]
fn execute<C: ConfidentialCrypto + ?Sized, E: ContractEngine + ?Sized>(
    crypto: &C,
    engine: &mut E,
    cfg: &SettleConfig,
    block: &Block,
    tx_hash: &TxHash,
    tx: &Transaction,
    intent: &ContractIntent,
    gas_pool: &mut GasPool,
) -> Result<(ContractResult, Effects)> {
    let caller = intent.sender.account();
    let mut res = ContractResult {
        ok: true,
        kind: intent.kind,
        gas_used: 0,
        return_data: vec![],
        contract_address: None,
        error: None,
    };
    let mut effects = Effects::default();

    match intent.kind {
        ContractKind::Deposit => {
            let amount = check_deposit(crypto, tx, intent)?;
            engine.deposit(&caller, U256::from(amount))?;
        }
        ContractKind::Withdraw => {
            let amount = decode_withdraw_amount(&intent.payload)?;
            engine.withdraw(&caller, U256::from(amount))?;
            effects.transfer = Some(ContractTransfer {
                address: intent.sender,
                amount,
            });
        }
        ContractKind::Call => {
            let gas = GasSettings::resolve(intent.gas, intent.gas_price, cfg)?;
            engine.sub_balance(&caller, gas.prepay())?;

            let ctx = ExecContext {
                origin: caller,
                gas_limit: gas.gas_limit,
                gas_price: gas.gas_price,
                height: block.height,
                timestamp: block.timestamp,
                block_id: block.id,
                tx_hash: *tx_hash,
            };
            let msg = Message {
                from: caller,
                to: if intent.to.is_zero() { None } else { Some(intent.to) },
                value: U256::from(intent.declared_amount),
                data: intent.payload.clone(),
                gas_limit: gas.gas_limit,
            };
            let out = engine.apply_message(&ctx, &msg, gas_pool)?;
            engine.add_balance(&caller, gas.refund(out.gas_used))?;

            effects.token_transfers = erc20::scan_transfers(tx_hash, &engine.get_logs(tx_hash));
            if msg.to.is_none() {
                let addr = out
                    .contract_address
                    .ok_or_else(|| reject!("creation without a contract address"))?;
                effects.created = Some(addr);
            }

            res.gas_used = out.gas_used;
            res.return_data = out.return_data;
            res.contract_address = out.contract_address;
        }
    }

    Ok((res, effects))
}

fn token_transfer_key(t: &TokenTransfer) -> Vec<u8> {
    let mut k = t.tx_hash.as_bytes().to_vec();
    k.extend_from_slice(&t.log_index.to_be_bytes());
    k
}

fn persist(
    stx: &mut StoreTx,
    tx_hash: &TxHash,
    origin: H160,
    res: &ContractResult,
    effects: Effects,
) -> Result<()> {
    stx.store_obj(UNIVERSE_CONTRACT, "result", tx_hash.as_bytes(), "", res)?;

    if let Some(t) = effects.transfer {
        stx.store_obj(UNIVERSE_CONTRACT, "transfer", tx_hash.as_bytes(), "", &t)?;
    }
    for t in effects.token_transfers.iter() {
        stx.store_obj(UNIVERSE_TOKEN, "erc20", &token_transfer_key(t), "", t)?;
    }
    if let Some(addr) = effects.created {
        stx.store_obj(UNIVERSE_CONTRACT, "address", tx_hash.as_bytes(), "", &addr)?;
        stx.store_obj(
            UNIVERSE_CONTRACT,
            "origin",
            addr.as_bytes(),
            "",
            &ContractOrigin {
                tx_hash: *tx_hash,
                origin,
            },
        )?;
    }
    Ok(())
}

/// Run every contract transaction of the block through the engine, then
/// commit and record the block's state root. Returns how many contract
/// transactions were seen.
///
/// A collaborator failure rolls back only that transaction, including the
/// gas it drew from the block, and records a failed `ContractResult`;
/// anything else aborts the block.
pub fn settle_contracts<C: ConfidentialCrypto + ?Sized, E: ContractEngine + ?Sized>(
    stx: &mut StoreTx,
    crypto: &C,
    engine: &mut E,
    cfg: &SettleConfig,
    block: &Block,
) -> Result<usize> {
    let mut gas_pool = GasPool::new(cfg.block_gas_limit);
    let mut n = 0;

    for tx_hash in block.tx_hashes.iter() {
        if !store::is_tx_valid(stx, &block.id, tx_hash)? {
            continue;
        }
        let tx = store::get_transaction(stx, tx_hash)?
            .ok_or_else(|| fatal!("valid tx {:?} has no body", tx_hash))?;
        let intent = match tx.extra.contract.as_ref() {
            Some(i) => i,
            None => continue,
        };
        n += 1;

        let revision = engine.snapshot();
        let gas_left = gas_pool;
        match execute(crypto, engine, cfg, block, tx_hash, &tx, intent, &mut gas_pool) {
            Ok((res, effects)) => {
                debug!(tx = ?tx_hash, kind = ?intent.kind, gas = res.gas_used, "contract tx applied");
                persist(stx, tx_hash, intent.sender.account(), &res, effects)?;
            }
            Err(SettleError::Collaborator(msg)) => {
                engine.revert_to_snapshot(revision);
                gas_pool = gas_left;
                warn!(tx = ?tx_hash, kind = ?intent.kind, error = %msg, "contract tx rejected");
                let res = ContractResult {
                    ok: false,
                    kind: intent.kind,
                    gas_used: 0,
                    return_data: vec![],
                    contract_address: None,
                    error: Some(msg),
                };
                stx.store_obj(UNIVERSE_CONTRACT, "result", tx_hash.as_bytes(), "", &res)?;
            }
            Err(e) => return Err(e),
        }
    }

    let root = engine.commit(block.height).map_err(|e| match e {
        SettleError::Collaborator(m) => fatal!("state commit: {}", m),
        e => e,
    })?;
    stx.store(UNIVERSE_BLOCK, "state-root", block.id.as_bytes(), "", root.as_bytes().to_vec())?;
    debug!(height = block.height, root = %hex::encode(root), "state root recorded");

    Ok(n)
}

/// Recorded outcome of a contract transaction.
pub fn get_contract_result(stx: &StoreTx, tx_hash: &TxHash) -> Result<Option<ContractResult>> {
    stx.load_obj(UNIVERSE_CONTRACT, "result", tx_hash.as_bytes(), "")
}

#[allow(missing_docs)]
pub fn get_contract_transfer(stx: &StoreTx, tx_hash: &TxHash) -> Result<Option<ContractTransfer>> {
    stx.load_obj(UNIVERSE_CONTRACT, "transfer", tx_hash.as_bytes(), "")
}

/// Address of the contract created by `tx_hash`.
pub fn get_contract_address(stx: &StoreTx, tx_hash: &TxHash) -> Result<Option<H160>> {
    stx.load_obj(UNIVERSE_CONTRACT, "address", tx_hash.as_bytes(), "")
}

#[allow(missing_docs)]
pub fn get_contract_origin(stx: &StoreTx, address: &H160) -> Result<Option<ContractOrigin>> {
    stx.load_obj(UNIVERSE_CONTRACT, "origin", address.as_bytes(), "")
}

#[allow(missing_docs)]
pub fn get_token_transfer(
    stx: &StoreTx,
    tx_hash: &TxHash,
    log_index: u32,
) -> Result<Option<TokenTransfer>> {
    let mut k = tx_hash.as_bytes().to_vec();
    k.extend_from_slice(&log_index.to_be_bytes());
    stx.load_obj(UNIVERSE_TOKEN, "erc20", &k, "")
}

/// State root recorded for `block_id`.
pub fn get_state_root(stx: &StoreTx, block_id: &H256) -> Result<Option<H256>> {
    match stx.load(UNIVERSE_BLOCK, "state-root", block_id.as_bytes(), "")? {
        None => Ok(None),
        Some(v) if 32 == v.len() => Ok(Some(H256::from_slice(&v))),
        Some(_) => Err(fatal!("malformed state root of block {:?}", block_id)),
    }
}

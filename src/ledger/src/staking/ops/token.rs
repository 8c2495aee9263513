//!
//! # Token outputs
//!
//! Outputs of a token sub-transaction are allocated right after the
//! outputs of their parent transaction.
//!

use {
    crate::{
        data_model::{Amount, Key, TokenId, TokenKind, TokenSubTx, TxHash, TxType},
        error::Result,
        fatal,
        store::{StoreTx, UNIVERSE_TOKEN},
    },
    serde::{Deserialize, Serialize},
};

/// One output of the token ledger.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenLedgerEntry {
    pub token_id: TokenId,
    pub tx_hash: TxHash,
    pub global_index: u64,
    pub amount: Amount,
    pub key: Key,
}

/// Category of the outputs of a sub-transaction.
#[inline(always)]
pub fn token_tx_type(sub: &TokenSubTx) -> TxType {
    match sub.kind {
        TokenKind::Issue => TxType::IssueToken,
        TokenKind::Transfer => TxType::TransferToken,
    }
}

/// Amount carried by output `i` of a sub-transaction.
///
/// Issue outputs are scaled by `reward_percent[i]`, transfer outputs carry
/// their declared amount.
pub fn token_output_amount(sub: &TokenSubTx, i: usize, reward_percent: &[u64]) -> Result<Amount> {
    let out = sub
        .outputs
        .get(i)
        .ok_or_else(|| fatal!("token output {} out of range", i))?;

    match sub.kind {
        TokenKind::Transfer => Ok(out.amount),
        TokenKind::Issue => {
            let pct = reward_percent.get(i).ok_or_else(|| {
                fatal!("issue output {} has no reward multiplier", i)
            })?;
            let amount = out.amount as u128 * *pct as u128 / 100;
            Amount::try_from(amount)
                .map_err(|_| fatal!("issue output {} overflows: {} * {}%", i, out.amount, pct))
        }
    }
}

fn entry_key(token_id: &TokenId, global_index: u64) -> Vec<u8> {
    let mut k = token_id.as_bytes().to_vec();
    k.extend_from_slice(&global_index.to_be_bytes());
    k
}

#[allow(missing_docs)]
pub fn record_token_entry(stx: &mut StoreTx, entry: &TokenLedgerEntry) -> Result<()> {
    stx.store_obj(
        UNIVERSE_TOKEN,
        "ledger",
        &entry_key(&entry.token_id, entry.global_index),
        "",
        entry,
    )
}

#[allow(missing_docs)]
pub fn get_token_entry(
    stx: &StoreTx,
    token_id: &TokenId,
    global_index: u64,
) -> Result<Option<TokenLedgerEntry>> {
    stx.load_obj(UNIVERSE_TOKEN, "ledger", &entry_key(token_id, global_index), "")
}

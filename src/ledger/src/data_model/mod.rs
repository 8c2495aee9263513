//!
//! Data model of block settlement
//!

pub use primitive_types::{H160, H256, U256};

use {
    crate::error::Result,
    serde::{Deserialize, Serialize},
    sha2::{Digest as _, Sha256},
    sha3::Keccak256,
};


/// Block hash
pub type BlockId = H256;
/// Transaction hash
pub type TxHash = H256;
/// Id of a stake pool, the hash of its register-pool transaction
pub type PoolId = H256;
/// Id of a share, the hash of its buy-share transaction
pub type ShareId = H256;
/// Id of a token
pub type TokenId = H256;

/// Height in the block tree
pub type BlockHeight = u64;
/// Amount of atomic coin units
pub type Amount = u64;

/// A compressed curve point or a canonical scalar
pub type Key = [u8; 32];

/// Unlock sentinel of a `locked` transaction's first output.
pub const MAX_UNLOCK_HEIGHT: u64 = u64::MAX;

/// Unlock values below this are block numbers, others are timestamps.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

/// Closed set of output categories.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TxType {
    Pow,
    PoolProfit,
    ShareProfit,
    BonusProfit,
    Normal,
    ContractTx,
    IssueToken,
    TransferToken,
    BuyShare,
    RepoShare,
    RegisterPool,
    ClosePool,
}

impl TxType {
    /// Outputs minted by the system rather than spent into existence.
    #[inline(always)]
    pub fn is_synthetic(self) -> bool {
        matches!(
            self,
            TxType::Pow
                | TxType::PoolProfit
                | TxType::ShareProfit
                | TxType::BonusProfit
                | TxType::ContractTx
        )
    }
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    Coinbase,
    Synthetic,
    Ring,
}

/// Public address of a payee, either a plain address or a sub-address.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RewardAddress {
    /// public spend key
    pub spend: Key,
    /// public view key
    pub view: Key,
    #[allow(missing_docs)]
    pub is_subaddress: bool,
}

impl RewardAddress {
    /// Address of this payee in the account-state ledger.
    pub fn account(&self) -> H160 {
        let digest = Keccak256::new()
            .chain_update(self.spend)
            .chain_update(self.view)
            .finalize();
        H160::from_slice(&digest[12..])
    }
}

/// Encrypted blinding factor and amount of one confidential output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EcdhTuple {
    #[allow(missing_docs)]
    pub mask: Key,
    #[allow(missing_docs)]
    pub amount: Key,
}

/// Destination of an output.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxOutTarget {
    ToKey {
        key: Key,
    },
    ToSubAddress {
        key: Key,
    },
    ToBuyShare {
        key: Key,
        pool_id: PoolId,
        share_id: ShareId,
        reward: RewardAddress,
    },
    ToRepoShare {
        key: Key,
        share_id: ShareId,
    },
    ToRegisterPool {
        key: Key,
        pool_id: PoolId,
        // commission in basis points
        fee_bps: u64,
        reward: RewardAddress,
    },
    ToClosePool {
        key: Key,
        pool_id: PoolId,
    },
}

impl TxOutTarget {
    /// One-time destination key.
    pub fn key(&self) -> Key {
        match self {
            TxOutTarget::ToKey { key }
            | TxOutTarget::ToSubAddress { key }
            | TxOutTarget::ToBuyShare { key, .. }
            | TxOutTarget::ToRepoShare { key, .. }
            | TxOutTarget::ToRegisterPool { key, .. }
            | TxOutTarget::ToClosePool { key, .. } => *key,
        }
    }

    /// Category of an output of an ordinary transaction.
    pub fn tx_type(&self) -> TxType {
        match self {
            TxOutTarget::ToKey { .. } | TxOutTarget::ToSubAddress { .. } => {
                TxType::Normal
            }
            TxOutTarget::ToBuyShare { .. } => TxType::BuyShare,
            TxOutTarget::ToRepoShare { .. } => TxType::RepoShare,
            TxOutTarget::ToRegisterPool { .. } => TxType::RegisterPool,
            TxOutTarget::ToClosePool { .. } => TxType::ClosePool,
        }
    }

    /// Pool/share linkage recorded on the output.
    pub fn linkage(&self) -> (Option<PoolId>, Option<ShareId>) {
        match self {
            TxOutTarget::ToKey { .. } | TxOutTarget::ToSubAddress { .. } => {
                (None, None)
            }
            TxOutTarget::ToBuyShare {
                pool_id, share_id, ..
            } => (Some(*pool_id), Some(*share_id)),
            TxOutTarget::ToRepoShare { share_id, .. } => (None, Some(*share_id)),
            TxOutTarget::ToRegisterPool { pool_id, .. }
            | TxOutTarget::ToClosePool { pool_id, .. } => (Some(*pool_id), None),
        }
    }
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    // plain amount, zero for confidential outputs
    pub amount: Amount,
    pub target: TxOutTarget,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Issue,
    Transfer,
}

/// Token sub-transaction carried in a parent transaction's extra data.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenSubTx {
    pub token_id: TokenId,
    pub kind: TokenKind,
    pub outputs: Vec<TxOut>,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ContractKind {
    Deposit,
    Withdraw,
    Call,
}

/// Intent of a contract-addressed transaction.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractIntent {
    pub kind: ContractKind,
    // confidential address of the caller
    pub sender: RewardAddress,
    // zero means contract creation
    pub to: H160,
    pub declared_amount: Amount,
    pub deposit_index: u32,
    pub payload: Vec<u8>,
    pub gas: Option<u64>,
    pub gas_price: Option<u64>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxExtra {
    pub tx_pub_key: Key,
    // per-output public keys of outputs sent to sub-addresses
    pub additional_pub_keys: Vec<Key>,
    pub payment_id: Option<[u8; 8]>,
    pub locked: bool,
    pub locked_amount_commitment: Option<Key>,
    pub token: Option<TokenSubTx>,
    pub contract: Option<ContractIntent>,
}

/// A confidential transaction, as far as settlement needs to see it.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub unlock_time: u64,
    pub key_images: Vec<Key>,
    pub outputs: Vec<TxOut>,
    // one commitment and one ecdh tuple per output
    pub commitments: Vec<Key>,
    pub ecdh_info: Vec<EcdhTuple>,
    pub extra: TxExtra,
    pub sig_type: SignatureType,
}

impl Transaction {
    /// sha256 over the canonical encoding
    pub fn hash(&self) -> Result<TxHash> {
        let bytes = bincode::serialize(self)?;
        Ok(hash_of(&[bytes.as_slice()]))
    }

    /// Sum of the plain output amounts.
    pub fn plain_amount(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    #[inline(always)]
    #[allow(missing_docs)]
    pub fn is_token(&self) -> bool {
        self.extra.token.is_some()
    }
}

/// A pool vote carried by a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    #[allow(missing_docs)]
    pub pool_id: PoolId,
    #[allow(missing_docs)]
    pub share_id: ShareId,
}

/// A block already placed in topological order.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub prev_id: Option<BlockId>,
    pub height: BlockHeight,
    pub topo_height: u64,
    pub timestamp: u64,
    pub fork_version: u8,
    pub side_block: bool,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<TxHash>,
    pub votes: Vec<Vote>,
}

/// One spendable or recordable output, immutable once written.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub block_id: BlockId,
    pub tx_hash: TxHash,
    pub height: BlockHeight,
    pub topo_height: u64,
    pub index_in_tx: u32,
    pub global_index: u64,
    pub key: Key,
    pub mask: Key,
    pub ecdh: EcdhTuple,
    // plain amount when the output is not confidential
    pub amount: Amount,
    pub unlock_height: u64,
    pub sig_type: SignatureType,
    pub tx_type: TxType,
    pub key_images: Vec<Key>,
    pub payment_id: Option<[u8; 8]>,
    pub pool_id: Option<PoolId>,
    pub share_id: Option<ShareId>,
    pub token_id: Option<TokenId>,
}

/// sha256 over the concatenated parts
pub fn hash_of(parts: &[&[u8]]) -> H256 {
    let mut hasher = Sha256::new();
    parts.iter().for_each(|p| hasher.update(p));
    H256::from_slice(&hasher.finalize())
}

/// keccak256, as used by the account-state ledger
pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

//!
//! # Confidential transaction primitives
//!
//! Settlement only consumes these through [`ConfidentialCrypto`];
//! [`RistrettoCrypto`] is the reference implementation over ristretto255.
//!
//! The contract view key is a documented trust boundary: it is derived
//! from a public seed, so anyone can compute it. It lets every node verify
//! that a deposit was sent to the contract ledger with the declared amount
//! (proof of destination), it does NOT keep deposit amounts confidential.
//!

use {
    crate::data_model::{Amount, EcdhTuple, Key, RewardAddress},
    curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT,
        ristretto::{CompressedRistretto, RistrettoPoint},
        scalar::Scalar,
    },
    lazy_static::lazy_static,
    sha2::{Digest, Sha512},
};

/// Seed of the network-wide contract view key.
pub const CONTRACT_VIEW_KEY_SEED: &[u8] = b"settlement/contract-view-key";

/// Seed of the contract ledger's spend key, nobody can spend with it.
pub const CONTRACT_SPEND_KEY_SEED: &[u8] = b"settlement/contract-spend-key";

const AMOUNT_DOMAIN: &[u8] = b"settlement/amount";
const MASK_DOMAIN: &[u8] = b"settlement/commitment-mask";

lazy_static! {
    // second generator of the commitment scheme
    static ref H: RistrettoPoint =
        RistrettoPoint::hash_from_bytes::<Sha512>(b"settlement/amount-generator");
}

/// Curve operations settlement relies on.
pub trait ConfidentialCrypto: Send + Sync {
    /// Hash arbitrary parts onto a scalar.
    fn hash_to_scalar(&self, parts: &[&[u8]]) -> Key;

    /// `secret * G`
    fn public_key(&self, secret: &Key) -> Option<Key>;

    /// Shared derivation `secret * public`.
    fn derive_key(&self, public: &Key, secret: &Key) -> Option<Key>;

    /// Per-output shared scalar of a derivation.
    fn derive_scalar(&self, derivation: &Key, index: u64) -> Key;

    /// One-time output key `Hs(derivation, index) * G + spend`.
    fn derive_public_key(&self, derivation: &Key, index: u64, spend: &Key)
        -> Option<Key>;

    /// Commitment to a public amount with blinding factor one.
    fn zero_commitment(&self, amount: Amount) -> Key;

    /// Commit to `amount` and encrypt the opening with the shared scalar.
    fn encode_amount(
        &self,
        amount: Amount,
        blinding: &Key,
        shared: &Key,
    ) -> (Key, EcdhTuple);

    /// Decrypt an ecdh tuple, the flag tells whether it opens `commitment`.
    fn decode_amount(
        &self,
        tuple: &EcdhTuple,
        shared: &Key,
        commitment: &Key,
    ) -> (Amount, bool);
}

/// Network-wide contract view secret.
pub fn contract_view_secret<C: ConfidentialCrypto + ?Sized>(crypto: &C) -> Key {
    crypto.hash_to_scalar(&[CONTRACT_VIEW_KEY_SEED])
}

/// Published contract view key.
pub fn contract_view_public<C: ConfidentialCrypto + ?Sized>(crypto: &C) -> Option<Key> {
    crypto.public_key(&contract_view_secret(crypto))
}

/// Stealth address every deposit is sent to.
pub fn contract_address<C: ConfidentialCrypto + ?Sized>(crypto: &C) -> Option<RewardAddress> {
    Some(RewardAddress {
        spend: crypto.public_key(&crypto.hash_to_scalar(&[CONTRACT_SPEND_KEY_SEED]))?,
        view: contract_view_public(crypto)?,
        is_subaddress: false,
    })
}

/// Reference implementation over ristretto255.
#[derive(Clone, Copy, Debug, Default)]
pub struct RistrettoCrypto;

impl RistrettoCrypto {
    #[inline(always)]
    fn hs(parts: &[&[u8]]) -> Scalar {
        let mut hasher = Sha512::new();
        parts.iter().for_each(|p| hasher.update(p));
        Scalar::from_hash(hasher)
    }

    #[inline(always)]
    fn point(bytes: &Key) -> Option<RistrettoPoint> {
        CompressedRistretto(*bytes).decompress()
    }

    #[inline(always)]
    fn commit(blinding: &Scalar, amount: Amount) -> RistrettoPoint {
        blinding * RISTRETTO_BASEPOINT_POINT + Scalar::from(amount) * *H
    }

    /// Deterministic key pair, used by wallets and tests.
    pub fn keypair_from_seed(seed: &[u8]) -> (Key, Key) {
        let secret = Self::hs(&[b"settlement/keypair", seed]);
        let public = (secret * RISTRETTO_BASEPOINT_POINT).compress().to_bytes();
        (secret.to_bytes(), public)
    }
}

impl ConfidentialCrypto for RistrettoCrypto {
    fn hash_to_scalar(&self, parts: &[&[u8]]) -> Key {
        Self::hs(parts).to_bytes()
    }

    fn public_key(&self, secret: &Key) -> Option<Key> {
        let s = Scalar::from_bytes_mod_order(*secret);
        Some((s * RISTRETTO_BASEPOINT_POINT).compress().to_bytes())
    }

    fn derive_key(&self, public: &Key, secret: &Key) -> Option<Key> {
        let s = Scalar::from_bytes_mod_order(*secret);
        Self::point(public).map(|p| (s * p).compress().to_bytes())
    }

    fn derive_scalar(&self, derivation: &Key, index: u64) -> Key {
        Self::hs(&[derivation, &index.to_be_bytes()]).to_bytes()
    }

    fn derive_public_key(
        &self,
        derivation: &Key,
        index: u64,
        spend: &Key,
    ) -> Option<Key> {
        let hs = Scalar::from_bytes_mod_order(self.derive_scalar(derivation, index));
        Self::point(spend)
            .map(|b| (hs * RISTRETTO_BASEPOINT_POINT + b).compress().to_bytes())
    }

    fn zero_commitment(&self, amount: Amount) -> Key {
        Self::commit(&Scalar::ONE, amount).compress().to_bytes()
    }

    fn encode_amount(
        &self,
        amount: Amount,
        blinding: &Key,
        shared: &Key,
    ) -> (Key, EcdhTuple) {
        let x = Scalar::from_bytes_mod_order(*blinding);
        let commitment = Self::commit(&x, amount).compress().to_bytes();
        let tuple = EcdhTuple {
            mask: (x + Self::hs(&[MASK_DOMAIN, shared])).to_bytes(),
            amount: (Scalar::from(amount) + Self::hs(&[AMOUNT_DOMAIN, shared]))
                .to_bytes(),
        };
        (commitment, tuple)
    }

    fn decode_amount(
        &self,
        tuple: &EcdhTuple,
        shared: &Key,
        commitment: &Key,
    ) -> (Amount, bool) {
        let x = Scalar::from_bytes_mod_order(tuple.mask) - Self::hs(&[MASK_DOMAIN, shared]);
        let a = (Scalar::from_bytes_mod_order(tuple.amount)
            - Self::hs(&[AMOUNT_DOMAIN, shared]))
        .to_bytes();

        // anything above 64 bits can not be an amount
        if a[8..].iter().any(|b| 0 != *b) {
            return (0, false);
        }
        let mut le = [0u8; 8];
        le.copy_from_slice(&a[..8]);
        let amount = u64::from_le_bytes(le);

        let ok = Self::commit(&x, amount).compress().to_bytes() == *commitment;
        (amount, ok)
    }
}

//!
//! Deterministic block settlement: global output indexing, block reward
//! split, staking payouts and the contract value bridge.
//!

#![deny(warnings)]
#![deny(missing_docs)]
#![allow(clippy::needless_borrow)]

pub mod confidential;
pub mod converter;
pub mod data_model;
pub mod error;
pub mod staking;
pub mod store;

#[cfg(test)]
mod mocks;

pub use {
    error::{Result, SettleError},
    store::{KvStore, MemStore, Settlement},
};

//!
//! # Synthetic Operations
//!
//! Transactions the settlement layer mints by itself: stake and bonus
//! payouts, contract withdrawals and the outputs of token sub-transactions.
//! None of them is signed by a user, every byte is a function of the block.
//!

pub mod payout;
pub mod token;

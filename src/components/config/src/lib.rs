//!
//! Settlement configuration: hard-fork activation heights
//! and the economic parameters of the reward layer.
//!

#![deny(warnings)]

pub mod settle;

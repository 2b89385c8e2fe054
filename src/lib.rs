//! Tokenswap - credential rewriting middleware for replayed HTTP traffic
//!
//! Captured production traffic carries session cookies and bearer tokens the
//! replay target never issued. Tokenswap sits in the replay stream, learns
//! the target's fresh credentials from replayed responses, and swaps them
//! into later requests of the same user.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod cache;
pub mod config;
pub mod cookie;
pub mod error;
pub mod frame;
pub mod identity;
pub mod rewrite;
pub mod store;

pub use error::{Result, TokenSwapError};

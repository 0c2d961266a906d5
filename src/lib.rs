//! Sign-In-With-Solana relay: issues sign-in challenges, drives a signer,
//! and verifies what comes back.

pub mod activity;
pub mod api;
pub mod attempt;
pub mod canon;
pub mod challenge;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod signer;
pub mod store;
pub mod types;
pub mod verify;

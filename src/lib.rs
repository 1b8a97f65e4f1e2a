//! Campus token economy.
//!
//! [`economics`] holds the authoritative ledger state machines; [`wallet`] is
//! the async client that reads, validates and submits against a ledger.

pub use campus_economics as economics;
pub use campus_wallet_core as wallet;

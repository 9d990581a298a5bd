//! A hash-chained ledger of RSA-encrypted, optionally signed messages
//! exchanged between named parties.

pub mod blockchain;
pub mod config;
pub mod messaging;
pub mod session;

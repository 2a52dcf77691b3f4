//! Domain model: accounts, balances, ledger entries, compliance metadata and
//! the ports the engine talks to.

pub mod account;
pub mod entry;
pub mod metadata;
pub mod ports;

//! CSV batch interface: ledger requests in, account balances out.

pub mod account_writer;
pub mod request_reader;

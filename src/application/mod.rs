//! Application layer containing the ledger orchestration.
//!
//! This module defines the `LedgerEngine`, the single entry point for every
//! balance-affecting operation. It serializes writes per account through the
//! store's unit of work and gates them behind the dependency health check.

pub mod engine;

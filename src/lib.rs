//! Closed-loop wallet ledger.
//!
//! Tracks per-owner wallet balances (current, available, held), records every
//! balance change as an immutable ledger entry and refuses to mutate anything
//! while a required dependency is reported unhealthy.

pub mod application;
pub mod domain;
pub mod error;
pub mod health;
pub mod infrastructure;
pub mod interfaces;
pub mod settings;

//! Bank transaction reconciliation
//!
//! This module contains the matching engine:
//! - Transaction store for open bank transactions
//! - Candidate finder and matcher that propose voucher allocations
//! - Reconciler that applies proposals atomically
//! - Statement import and voucher creation for unmatched transactions

pub mod candidates;
pub mod engine;
pub mod import;
pub mod matcher;
pub mod reconciler;
pub mod store;
pub mod vouchers;

pub use candidates::*;
pub use engine::*;
pub use import::*;
pub use matcher::*;
pub use reconciler::*;
pub use store::*;
pub use vouchers::*;

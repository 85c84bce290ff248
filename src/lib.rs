//! # Reconciliation Core
//!
//! A bank statement reconciliation library that matches imported bank
//! transactions against accounting vouchers (payment entries, journal entries,
//! invoices).
//!
//! ## Features
//!
//! - **Statement import**: decoded statement entries become unreconciled bank transactions
//! - **Candidate lookup**: outstanding vouchers ranked by reference, amount and date
//! - **Matching**: exact, fuzzy and partial proposals with configurable tolerances
//! - **Atomic allocation**: optimistic revalidation, all-or-nothing commits
//! - **Auto-reconcile**: exact reference matches applied in bulk, failures reported per transaction
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::utils::MemoryStorage;
//! use reconciliation_core::{AutoReconcileRequest, BankAccount, ReconciliationEngine};
//!
//! # async fn run() -> reconciliation_core::ReconcileResult<()> {
//! let mut engine = ReconciliationEngine::new(MemoryStorage::new());
//! let account = BankAccount::new(
//!     "ubs-chf".to_string(),
//!     "UBS CHF".to_string(),
//!     "centura".to_string(),
//!     "CHF".to_string(),
//!     "1020".to_string(),
//! );
//! engine.register_bank_account(&account).await?;
//!
//! let summary = engine
//!     .auto_reconcile(&AutoReconcileRequest {
//!         bank_account: Some(account.id.clone()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", summary.message());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::MatchingConfig;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;

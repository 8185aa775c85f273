//! # Colored Coins
//!
//! Colored-coin issuance, auditor/aggregatee spends and atomic trade offers on
//! a coin-set ledger.
//!
//! A color is a fungible asset named by the id of the uncolored coin consumed
//! to create it. Every coin of a color is locked by the same core program
//! wrapped around an ordinary inner puzzle; the core ties each coin to a parent
//! of the same color and, when several coins are spent together, makes one of
//! them (the auditor) check that the declared outputs add up to the inputs.
//!
//! ## Architecture
//!
//! - `program`, `expr`, `script`: tree values, a typed builder for puzzles and
//!   the evaluator that turns a puzzle and solution into conditions
//! - `color`, `script_hash`, `lineage`: core derivation, colored puzzle hashes
//!   and the lineage proofs coins present when spent
//! - `issuance`, `spend`, `trade`: the bundle builders
//! - `scanner`, `wallet`: ownership tracking and the wallet facade
//! - `ledger`: the ledger interface and an in-memory simulator
//!
//! ## Design Principles
//!
//! 1. **Deterministic cores**: a core is reproducible from its genesis id alone
//! 2. **Ledger authority**: conservation is enforced by the core on the ledger,
//!    never assumed by wallet code
//! 3. **Single actor**: wallet state changes only while scanning confirmed
//!    blocks or reserving coins of an accepted bundle
//!
//! ## Usage
//!
//! ```rust
//! use colored_coins::config::{LedgerConfig, WalletConfig};
//! use colored_coins::ledger::{LedgerApi, LedgerSim};
//! use colored_coins::wallet::Wallet;
//!
//! let mut ledger = LedgerSim::new(LedgerConfig::default());
//! let mut wallet = Wallet::new(WalletConfig::new("alice", [1; 32])).unwrap();
//! let address = wallet.get_new_puzzle_hash().unwrap();
//! ledger.next_block(address, address).unwrap();
//! wallet.sync(&ledger).unwrap();
//!
//! let issuance = wallet.issue(&[10000, 500, 1000], None).unwrap();
//! wallet.submit(&mut ledger, &issuance.bundle).unwrap();
//! ledger.next_block(address, address).unwrap();
//! wallet.sync(&ledger).unwrap();
//! assert_eq!(wallet.colored_balance(&issuance.color), 11500);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod program;
pub mod expr;
pub mod script;
pub mod keys;
pub mod standard;
pub mod color;
pub mod script_hash;
pub mod lineage;
pub mod issuance;
pub mod spend;
pub mod trade;
pub mod ledger;
pub mod scanner;
pub mod wallet;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use types::*;
pub use color::{Color, Core};
pub use error::{ColoredCoinError, Result};
pub use ledger::{LedgerApi, LedgerSim};
pub use trade::TradeOffer;
pub use wallet::Wallet;

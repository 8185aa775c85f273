//! Shared fixtures for ledger-driven tests

#![allow(dead_code)]

use colored_coins::config::{LedgerConfig, WalletConfig};
use colored_coins::ledger::{LedgerApi, LedgerSim};
use colored_coins::wallet::Wallet;

/// Puzzle hash nobody can spend; block rewards go here unless a test funds a wallet
pub const BURN: [u8; 32] = [0; 32];

pub fn ledger() -> LedgerSim {
    LedgerSim::new(LedgerConfig::default())
}

pub fn wallet(name: &str, seed: u8) -> Wallet {
    Wallet::new(WalletConfig::new(name, [seed; 32])).unwrap()
}

/// Farm one block paying its reward to `wallet`, then sync it
pub fn fund(ledger: &mut LedgerSim, wallet: &mut Wallet) {
    let address = wallet.get_new_puzzle_hash().unwrap();
    ledger.next_block(address, BURN).unwrap();
    wallet.sync(&*ledger).unwrap();
}

/// Confirm the mempool and sync every wallet
pub fn confirm(ledger: &mut LedgerSim, wallets: &mut [&mut Wallet]) {
    ledger.next_block(BURN, BURN).unwrap();
    for wallet in wallets.iter_mut() {
        wallet.sync(&*ledger).unwrap();
    }
}

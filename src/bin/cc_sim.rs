//! cc-sim: issue a color, send it and trade it between two wallets on an
//! in-memory ledger
//!
//! Usage: `cc-sim [config.toml]`

use anyhow::{bail, Context, Result};
use colored_coins::config::{SimConfig, WalletConfig};
use colored_coins::ledger::{LedgerApi, LedgerSim};
use colored_coins::logging::init_logging;
use colored_coins::wallet::Wallet;
use colored_coins::TradeOffer;
use tracing::info;

fn farm(ledger: &mut LedgerSim, wallets: &mut [&mut Wallet], reward_to: usize) -> Result<()> {
    let address = wallets[reward_to].get_new_puzzle_hash()?;
    ledger.next_block(address, address)?;
    for wallet in wallets.iter_mut() {
        wallet.sync(&*ledger)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::from_toml_file(&path).with_context(|| format!("loading {}", path))?,
        None => SimConfig::default(),
    };
    init_logging(config.log_format()?, &config.log_level);

    let mut ledger = LedgerSim::new(config.ledger.clone());
    let mut alice = Wallet::new(WalletConfig::new("alice", [1; 32]))?;
    let mut bob = Wallet::new(WalletConfig::new("bob", [2; 32]))?;
    farm(&mut ledger, &mut [&mut alice, &mut bob], 0)?;
    farm(&mut ledger, &mut [&mut alice, &mut bob], 1)?;

    // Issue
    let issuance = alice.issue(&[10000, 500, 1000], None)?;
    let color = issuance.color;
    alice.submit(&mut ledger, &issuance.bundle)?;
    farm(&mut ledger, &mut [&mut alice, &mut bob], 0)?;
    info!(%color, balance = alice.colored_balance(&color), "issued");

    // Send 1500
    bob.add_color(color);
    let payee = bob.get_new_puzzle_hash()?;
    let payment = alice.send_colored(&color, &[(payee, 1500)])?;
    alice.submit(&mut ledger, &payment)?;
    farm(&mut ledger, &mut [&mut alice, &mut bob], 0)?;
    info!(alice = alice.colored_balance(&color), bob = bob.colored_balance(&color), "sent");

    // Trade: alice gives 900 of the color for 100 base
    let offer = alice.create_trade_offer(&[(-900, Some(color)), (100, None)])?;
    let received = TradeOffer::from_hex(&offer.to_hex()?)?;
    for (color, amount) in bob.inspect_trade_offer(&received)? {
        let name = color.map(|c| c.to_string()).unwrap_or_else(|| "base".to_string());
        info!(color = %name, amount, "offer discrepancy");
    }
    bob.accept_trade_offer(&mut ledger, &received)?;
    farm(&mut ledger, &mut [&mut alice, &mut bob], 0)?;

    if bob.colored_balance(&color) != 2400 {
        bail!("unexpected balance {}", bob.colored_balance(&color));
    }
    for wallet in [&alice, &bob] {
        info!(
            wallet = wallet.name(),
            base = wallet.uncolored_balance(),
            colored = wallet.colored_balance(&color),
            "final balances"
        );
    }
    Ok(())
}

//! Trade offers completed between two wallets

mod common;

use colored_coins::constants::{DEFAULT_BLOCK_REWARD, MAX_COST};
use colored_coins::script::Condition;
use colored_coins::spend::{build_audited_spends, sign_requests, Role, SpendRequest};
use colored_coins::standard::solution_for_conditions;
use colored_coins::trade::discrepancies;
use colored_coins::wallet::Wallet;
use colored_coins::{Color, ColoredCoinError, LedgerSim, SpendBundle, TradeOffer};
use common::*;

/// Alice and Bob funded once each; Alice holds `amounts` of a fresh color
fn setup(amounts: &[u64]) -> (LedgerSim, Wallet, Wallet, Color) {
    let mut ledger = ledger();
    let mut alice = wallet("alice", 1);
    let mut bob = wallet("bob", 2);
    fund(&mut ledger, &mut alice);
    fund(&mut ledger, &mut bob);
    let issuance = alice.issue(amounts, None).unwrap();
    alice.submit(&mut ledger, &issuance.bundle).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    (ledger, alice, bob, issuance.color)
}

#[test]
fn test_acceptor_bootstraps_color_offerer_gives() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000]);
    let alice_base = alice.uncolored_balance();
    let bob_base = bob.uncolored_balance();
    assert_eq!(bob.colored_balance(&color), 0);

    let offer = alice.create_trade_offer(&[(-900, Some(color)), (100, None)]).unwrap();
    let offer = TradeOffer::from_hex(&offer.to_hex().unwrap()).unwrap();
    let report = bob.inspect_trade_offer(&offer).unwrap();
    assert_eq!(report.get(&Some(color)), Some(&900));
    assert_eq!(report.get(&None), Some(&-100));

    let bundle = bob.accept_trade_offer(&mut ledger, &offer).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);

    assert_eq!(bob.colored_balance(&color), 900);
    assert_eq!(alice.colored_balance(&color), 100);
    assert_eq!(alice.uncolored_balance(), alice_base + 100);
    assert_eq!(bob.uncolored_balance(), bob_base - 100);

    // Every color nets to zero over the completed bundle
    let totals = discrepancies(&bundle, MAX_COST).unwrap();
    assert!(totals.values().all(|total| *total == 0), "{:?}", totals);
}

#[test]
fn test_offerer_bootstraps_color_it_wants() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000]);
    let alice_base = alice.uncolored_balance();
    let bob_base = bob.uncolored_balance();

    // Bob wants 300 of Alice's color and pays 50 for it
    bob.add_color(color);
    let offer = bob.create_trade_offer(&[(300, Some(color)), (-50, None)]).unwrap();
    let report = alice.inspect_trade_offer(&offer).unwrap();
    assert_eq!(report.get(&Some(color)), Some(&-300));
    assert_eq!(report.get(&None), Some(&50));

    alice.accept_trade_offer(&mut ledger, &offer).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);

    assert_eq!(bob.colored_balance(&color), 300);
    assert_eq!(alice.colored_balance(&color), 700);
    assert_eq!(alice.uncolored_balance(), alice_base + 50);
    assert_eq!(bob.uncolored_balance(), bob_base - 50);
}

#[test]
fn test_trade_between_holders_of_same_color() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000, 600]);
    bob.add_color(color);
    let payee = bob.get_new_puzzle_hash().unwrap();
    let payment = alice.send_colored(&color, &[(payee, 600)]).unwrap();
    alice.submit(&mut ledger, &payment).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    assert_eq!(bob.colored_balance(&color), 600);

    let offer = alice.create_trade_offer(&[(-250, Some(color)), (25, None)]).unwrap();
    let bundle = bob.accept_trade_offer(&mut ledger, &offer).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);

    assert_eq!(bob.colored_balance(&color), 850);
    assert_eq!(alice.colored_balance(&color), 750);
    assert!(discrepancies(&bundle, MAX_COST).unwrap().values().all(|total| *total == 0));
}

#[test]
fn test_offer_cannot_be_taken_without_its_base_leg() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000, 600]);
    bob.add_color(color);
    let payee = bob.get_new_puzzle_hash().unwrap();
    let payment = alice.send_colored(&color, &[(payee, 600)]).unwrap();
    alice.submit(&mut ledger, &payment).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    let alice_base = alice.uncolored_balance();

    let offer = alice.create_trade_offer(&[(-250, Some(color)), (25, None)]).unwrap();
    let parts = offer.parts(MAX_COST).unwrap();
    assert!(!parts.complete.is_empty());
    let (core, offered) = parts.incomplete[&color].clone();

    // Bob audits Alice's colored spends and leaves out the base spend paying her
    let own = bob.colored_coins(&color).remove(0);
    let lineage = bob.state().lineage().require(&own.coin.id()).unwrap();
    let output = own.coin.amount + 250;
    let bob_payee = bob.get_new_puzzle_hash().unwrap();
    let conditions = [Condition::CreateOutput { puzzle_hash: bob_payee, amount: output }];
    let auditor = SpendRequest::new(
        own.coin,
        own.inner_puzzle.clone(),
        lineage,
        output,
        solution_for_conditions(&conditions),
        Role::Auditor,
    );
    let mut requests = vec![auditor.clone()];
    requests.extend(offered);
    let spends = build_audited_spends(&core, &requests, MAX_COST).unwrap();
    let mut signature = offer.bundle.aggregated_signature.clone();
    signature.merge(sign_requests(bob.keychain(), std::iter::once(&auditor), MAX_COST).unwrap());

    match bob.submit(&mut ledger, &SpendBundle::new(spends, signature)) {
        Err(ColoredCoinError::TransactionRejected(reason)) => {
            assert!(reason.contains("companion"), "{}", reason)
        }
        other => panic!("unexpected {:?}", other),
    }
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    assert_eq!(alice.colored_balance(&color), 1000);
    assert_eq!(bob.colored_balance(&color), 600);

    // The whole offer still goes through
    bob.accept_trade_offer(&mut ledger, &offer).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    assert_eq!(alice.colored_balance(&color), 750);
    assert_eq!(bob.colored_balance(&color), 850);
    assert_eq!(alice.uncolored_balance(), alice_base + 25);
}

#[test]
fn test_two_color_swap() {
    let (mut ledger, mut alice, mut bob, red) = setup(&[500]);
    let issuance = bob.issue(&[800], None).unwrap();
    let blue = issuance.color;
    bob.submit(&mut ledger, &issuance.bundle).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);

    alice.add_color(blue);
    let offer = alice.create_trade_offer(&[(-200, Some(red)), (300, Some(blue))]).unwrap();
    bob.accept_trade_offer(&mut ledger, &offer).unwrap();
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);

    assert_eq!(alice.colored_balance(&red), 300);
    assert_eq!(alice.colored_balance(&blue), 300);
    assert_eq!(bob.colored_balance(&red), 200);
    assert_eq!(bob.colored_balance(&blue), 500);
}

#[test]
fn test_acceptor_without_the_color_cannot_pay_it() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000]);

    // Alice gives 100 base and wants 900 of a color Bob does not hold
    let offer = alice.create_trade_offer(&[(-100, None), (900, Some(color))]).unwrap();
    let bob_base = bob.uncolored_balance();
    match bob.accept_trade_offer(&mut ledger, &offer) {
        Err(ColoredCoinError::TradeIncomplete(_)) => {}
        other => panic!("unexpected {:?}", other.map(|bundle| bundle.coin_spends.len())),
    }
    assert_eq!(ledger.mempool_len(), 0);
    confirm(&mut ledger, &mut [&mut alice, &mut bob]);
    assert_eq!(bob.uncolored_balance(), bob_base);
    assert_eq!(alice.colored_balance(&color), 1000);
}

#[test]
fn test_acceptor_short_of_base_currency() {
    let (mut ledger, mut alice, mut bob, color) = setup(&[1000]);
    let price = 2 * DEFAULT_BLOCK_REWARD as i64;
    let offer = alice.create_trade_offer(&[(-900, Some(color)), (price, None)]).unwrap();
    assert!(matches!(
        bob.accept_trade_offer(&mut ledger, &offer),
        Err(ColoredCoinError::TradeIncomplete(_))
    ));
}

#[test]
fn test_incomplete_offer_is_rejected_on_its_own() {
    let (mut ledger, mut alice, _bob, color) = setup(&[1000]);
    let offer = alice.create_trade_offer(&[(-900, Some(color)), (100, None)]).unwrap();
    assert!(matches!(
        alice.submit(&mut ledger, &offer.bundle),
        Err(ColoredCoinError::TransactionRejected(_))
    ));
}

#[test]
fn test_empty_offer_is_refused() {
    let (_ledger, mut alice, _bob, color) = setup(&[1000]);
    assert!(alice.create_trade_offer(&[]).is_err());
    assert!(alice.create_trade_offer(&[(5, Some(color)), (-5, Some(color))]).is_err());
    assert!(matches!(
        alice.create_trade_offer(&[(-5, Some(Color([9; 32])))]),
        Err(ColoredCoinError::UnknownColor(_))
    ));
}

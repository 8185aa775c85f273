//! Issuance engine: genesis spend, eve spend and zero-value bootstrap mints

use crate::color::{Color, Core};
use crate::error::{ColoredCoinError, Result};
use crate::keys::Signer;
use crate::lineage::LineageProof;
use crate::program::Program;
use crate::script::Condition;
use crate::script_hash::{colored_puzzle, colored_puzzle_hash};
use crate::spend::colored_solution;
use crate::standard::{sign_coin_spends, solution_for_conditions, standard_spend};
use crate::types::{hash_hex, Coin, CoinId, CoinSpend, PuzzleHash, SpendBundle};
use tracing::info;

/// An uncolored coin together with its standard puzzle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingCoin {
    pub coin: Coin,
    pub puzzle: Program,
}

/// A colored coin's eve spend and the child it recreates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EveSpend {
    pub spend: CoinSpend,
    pub child: Coin,
    pub child_lineage: LineageProof,
    pub inner_puzzle: Program,
}

/// EveSpend: 𝒦 × 𝒞 × 𝒫 → 𝒞𝒮
///
/// `coin` was created by the uncolored coin `coin.parent_id`. The inner puzzle
/// takes a standard condition-list solution and is asked to recreate exactly
/// its own hash and amount, so the child differs from `coin` only in id and
/// parent.
pub fn eve_spend(core: &Core, coin: Coin, inner_puzzle: &Program) -> Result<EveSpend> {
    let inner_puzzle_hash = inner_puzzle.tree_hash();
    if coin.puzzle_hash != colored_puzzle_hash(&core.hash(), &inner_puzzle_hash) {
        return Err(ColoredCoinError::InvalidSpend(format!(
            "coin {} is not a {} coin with this inner puzzle",
            hash_hex(&coin.id()),
            core.color()
        )));
    }
    let inner_solution = solution_for_conditions(&[Condition::CreateOutput {
        puzzle_hash: inner_puzzle_hash,
        amount: coin.amount,
    }]);
    let solution = colored_solution(
        &inner_solution,
        &LineageProof::Genesis(coin.parent_id),
        coin.amount,
        Program::nil(),
        Program::nil(),
    );
    let child = Coin::new(coin.id(), coin.puzzle_hash, coin.amount);
    Ok(EveSpend {
        spend: CoinSpend::new(coin, colored_puzzle(core, inner_puzzle), solution),
        child,
        child_lineage: LineageProof::Parent {
            parent_id: coin.parent_id,
            inner_puzzle_hash,
            amount: coin.amount,
        },
        inner_puzzle: inner_puzzle.clone(),
    })
}

/// Result of an issuance
#[derive(Debug, Clone)]
pub struct Issuance {
    pub color: Color,
    pub core: Core,
    pub bundle: SpendBundle,
    pub minted: Vec<EveSpend>,
}

/// Issue: 𝒞⁺ × ℕ⁺ → 𝒮ℬ
///
/// 1. The first funding coin is the genesis coin; its id names the color
/// 2. The genesis spend creates one colored output per amount and optional change
/// 3. Every other funding coin only asserts that the genesis coin is spent
/// 4. Every minted coin is eve-spent in the same bundle
pub fn issue(
    funding: &[FundingCoin],
    amounts: &[u64],
    inner_puzzles: &[Program],
    change_puzzle_hash: PuzzleHash,
    signer: &dyn Signer,
    max_cost: u64,
) -> Result<Issuance> {
    if amounts.is_empty() || amounts.len() != inner_puzzles.len() {
        return Err(ColoredCoinError::InvalidSpend(format!(
            "{} amounts for {} inner puzzles",
            amounts.len(),
            inner_puzzles.len()
        )));
    }
    let needed = amounts
        .iter()
        .try_fold(0u64, |total, amount| total.checked_add(*amount))
        .ok_or_else(|| ColoredCoinError::InvalidSpend("issuance total overflows".to_string()))?;
    let genesis = funding
        .first()
        .ok_or(ColoredCoinError::InsufficientFunds { needed, available: 0 })?;
    let available: u64 = funding.iter().map(|funding| funding.coin.amount).sum();
    if available < needed {
        return Err(ColoredCoinError::InsufficientFunds { needed, available });
    }

    let genesis_id = genesis.coin.id();
    let color = Color(genesis_id);
    let core = Core::for_color(color);

    let mut conditions: Vec<Condition> = amounts
        .iter()
        .zip(inner_puzzles)
        .map(|(amount, inner)| Condition::CreateOutput {
            puzzle_hash: colored_puzzle_hash(&core.hash(), &inner.tree_hash()),
            amount: *amount,
        })
        .collect();
    if available > needed {
        conditions.push(Condition::CreateOutput {
            puzzle_hash: change_puzzle_hash,
            amount: available - needed,
        });
    }

    let mut coin_spends = vec![standard_spend(genesis.coin, &genesis.puzzle, &conditions)];
    for extra in &funding[1..] {
        let companion = [Condition::ConsumeCompanion(genesis_id)];
        coin_spends.push(standard_spend(extra.coin, &extra.puzzle, &companion));
    }

    let mut minted = Vec::with_capacity(amounts.len());
    for (amount, inner) in amounts.iter().zip(inner_puzzles) {
        let coin = Coin::new(genesis_id, colored_puzzle_hash(&core.hash(), &inner.tree_hash()), *amount);
        minted.push(eve_spend(&core, coin, inner)?);
    }
    coin_spends.extend(minted.iter().map(|eve| eve.spend.clone()));

    let signature = sign_coin_spends(signer, &coin_spends, max_cost)?;
    info!(color = %color, coins = amounts.len(), total = needed, "issued color");
    Ok(Issuance { color, core, bundle: SpendBundle::new(coin_spends, signature), minted })
}

/// Zero-value bootstrap coin of an existing color
///
/// `funding_id` is the uncolored coin whose spend will carry the returned
/// condition. The eve spend is allowed because the coin carries no value, and
/// its child can then act as auditor in the same bundle.
pub fn zero_value_mint(
    core: &Core,
    funding_id: CoinId,
    inner_puzzle: &Program,
) -> Result<(Condition, EveSpend)> {
    let puzzle_hash = colored_puzzle_hash(&core.hash(), &inner_puzzle.tree_hash());
    let create = Condition::CreateOutput { puzzle_hash, amount: 0 };
    let eve = eve_spend(core, Coin::new(funding_id, puzzle_hash, 0), inner_puzzle)?;
    Ok((create, eve))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_COST;
    use crate::keys::Keychain;
    use crate::script::{conditions_for_spend, EvalError};
    use crate::standard::puzzle_for_pk;

    fn funding(keychain: &mut Keychain, parent: u8, amount: u64) -> FundingCoin {
        let (_, pubkey) = keychain.next_public_key().unwrap();
        let puzzle = puzzle_for_pk(&pubkey.serialize());
        FundingCoin { coin: Coin::new([parent; 32], puzzle.tree_hash(), amount), puzzle }
    }

    #[test]
    fn test_eve_spend_recreates_coin() {
        let core = Core::for_color(Color([1; 32]));
        let inner = puzzle_for_pk(&[2; 33]);
        let coin = Coin::new([1; 32], colored_puzzle_hash(&core.hash(), &inner.tree_hash()), 500);
        let eve = eve_spend(&core, coin, &inner).unwrap();
        assert_eq!(eve.child.puzzle_hash, coin.puzzle_hash);
        assert_eq!(eve.child.amount, coin.amount);
        assert_eq!(eve.child.parent_id, coin.id());
        let conditions = conditions_for_spend(&eve.spend, MAX_COST).unwrap();
        assert!(conditions.contains(&Condition::AssertParentId([1; 32])));
        assert!(conditions.contains(&Condition::CreateOutput { puzzle_hash: coin.puzzle_hash, amount: 500 }));
    }

    #[test]
    fn test_eve_spend_rejects_foreign_parent() {
        let core = Core::for_color(Color([1; 32]));
        let inner = puzzle_for_pk(&[2; 33]);
        let coin = Coin::new([9; 32], colored_puzzle_hash(&core.hash(), &inner.tree_hash()), 500);
        let eve = eve_spend(&core, coin, &inner).unwrap();
        let err =
            crate::script::run_program(&eve.spend.puzzle_reveal, &eve.spend.solution, MAX_COST).unwrap_err();
        assert_eq!(err, EvalError::Raised(Program::atom(b"eve parent".to_vec())));
    }

    #[test]
    fn test_zero_value_eve_accepts_any_parent() {
        let core = Core::for_color(Color([1; 32]));
        let inner = puzzle_for_pk(&[2; 33]);
        let (create, eve) = zero_value_mint(&core, [9; 32], &inner).unwrap();
        assert_eq!(create, Condition::CreateOutput { puzzle_hash: eve.child.puzzle_hash, amount: 0 });
        assert!(conditions_for_spend(&eve.spend, MAX_COST).is_ok());
    }

    #[test]
    fn test_issue_builds_genesis_and_eves() {
        let mut keychain = Keychain::from_seed([1; 32]);
        let coins = vec![funding(&mut keychain, 1, 8000), funding(&mut keychain, 2, 5000)];
        let inners: Vec<Program> = (0..3).map(|_| {
            let (_, pk) = keychain.next_public_key().unwrap();
            puzzle_for_pk(&pk.serialize())
        }).collect();
        let issuance = issue(&coins, &[10000, 500, 1000], &inners, [7; 32], &keychain, MAX_COST).unwrap();
        assert_eq!(issuance.color, Color(coins[0].coin.id()));
        assert_eq!(issuance.bundle.coin_spends.len(), 2 + 3);
        assert_eq!(issuance.minted.iter().map(|eve| eve.child.amount).sum::<u64>(), 11500);
        let change = conditions_for_spend(&issuance.bundle.coin_spends[0], MAX_COST).unwrap();
        assert!(change.contains(&Condition::CreateOutput { puzzle_hash: [7; 32], amount: 1500 }));
    }

    #[test]
    fn test_issue_insufficient_funds() {
        let mut keychain = Keychain::from_seed([1; 32]);
        let coins = vec![funding(&mut keychain, 1, 100)];
        let inner = puzzle_for_pk(&[2; 33]);
        match issue(&coins, &[101], &[inner], [7; 32], &keychain, MAX_COST) {
            Err(ColoredCoinError::InsufficientFunds { needed, available }) => {
                assert_eq!((needed, available), (101, 100));
            }
            other => panic!("unexpected {:?}", other.map(|issuance| issuance.color)),
        }
    }
}

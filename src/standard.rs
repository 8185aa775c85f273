//! Standard single-key inner puzzle and the ephemeral lock puzzles

use crate::constants::*;
use crate::error::Result;
use crate::expr::*;
use crate::keys::{AggregateSignature, Signer};
use crate::program::{curried_tree_hash, hash_atom, int_to_bytes, Program};
use crate::script::{conditions_for_spend, conditions_to_program, Condition};
use crate::types::{Coin, CoinId, CoinSpend, Hash, PuzzleHash};

/// StandardPuzzle: 𝔹³³ → 𝒫
///
/// Solution is `(conditions)`. The puzzle returns the conditions with one
/// signature demand prepended: `pubkey` must sign the tree hash of the
/// condition list, bound to the coin being spent.
pub fn puzzle_for_pk(pubkey: &[u8]) -> Program {
    cons(
        list(vec![int(COND_AGGREGATE_SIGNATURE as i128), bytes(pubkey), tree_hash(arg(0))]),
        arg(0),
    )
    .compile()
}

pub fn puzzle_hash_for_pk(pubkey: &[u8]) -> PuzzleHash {
    puzzle_for_pk(pubkey).tree_hash()
}

pub fn solution_for_conditions(conditions: &[Condition]) -> Program {
    Program::list([conditions_to_program(conditions)])
}

/// Message the standard puzzle demands a signature over
pub fn signature_message(conditions: &[Condition]) -> Hash {
    conditions_to_program(conditions).tree_hash()
}

/// Spend of a standard coin yielding `conditions`
pub fn standard_spend(coin: Coin, puzzle: &Program, conditions: &[Condition]) -> CoinSpend {
    CoinSpend::new(coin, puzzle.clone(), solution_for_conditions(conditions))
}

/// Sign every signature demand the given spends yield when run
pub fn sign_coin_spends(
    signer: &dyn Signer,
    spends: &[CoinSpend],
    max_cost: u64,
) -> Result<AggregateSignature> {
    let mut aggregate = AggregateSignature::default();
    for spend in spends {
        aggregate.merge(signer.sign_conditions(&spend.coin.id(), &conditions_for_spend(spend, max_cost)?)?);
    }
    Ok(aggregate)
}

fn lock_module_hash() -> Hash {
    hash_atom(&[])
}

/// E-lock: zero-value output an aggregatee creates to commit its declared
/// output to one auditor
pub fn e_lock_puzzle(auditor_id: &CoinId, output: u64) -> Program {
    Program::curry(
        &Program::nil(),
        &[
            Program::atom(E_LOCK_TAG.to_vec()),
            Program::atom(auditor_id.to_vec()),
            Program::uint(output),
        ],
    )
}

pub fn e_lock_puzzle_hash(auditor_id: &CoinId, output: u64) -> PuzzleHash {
    curried_tree_hash(
        &lock_module_hash(),
        &[
            hash_atom(E_LOCK_TAG),
            hash_atom(auditor_id),
            hash_atom(&int_to_bytes(output as i128)),
        ],
    )
}

/// A-lock: zero-value output the auditor creates for each aggregatee it counted
pub fn a_lock_puzzle(aggregatee_id: &CoinId) -> Program {
    Program::curry(
        &Program::nil(),
        &[Program::atom(A_LOCK_TAG.to_vec()), Program::atom(aggregatee_id.to_vec())],
    )
}

pub fn a_lock_puzzle_hash(aggregatee_id: &CoinId) -> PuzzleHash {
    curried_tree_hash(&lock_module_hash(), &[hash_atom(A_LOCK_TAG), hash_atom(aggregatee_id)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{conditions_for_puzzle, run_program};

    #[test]
    fn test_standard_puzzle_prepends_signature_demand() {
        let pubkey = vec![2u8; 33];
        let conditions = vec![Condition::CreateOutput { puzzle_hash: [7; 32], amount: 100 }];
        let output = conditions_for_puzzle(
            &puzzle_for_pk(&pubkey),
            &solution_for_conditions(&conditions),
            MAX_COST,
        )
        .unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(
            output[0],
            Condition::AggregateSignature { pubkey, message: signature_message(&conditions) }
        );
        assert_eq!(output[1], conditions[0]);
    }

    #[test]
    fn test_sign_coin_spends() {
        use crate::keys::{coin_message, Keychain};
        use secp256k1::Secp256k1;

        let mut keychain = Keychain::from_seed([1; 32]);
        let (_, pubkey) = keychain.next_public_key().unwrap();
        let puzzle = puzzle_for_pk(&pubkey.serialize());
        let coin = Coin::new([0; 32], puzzle.tree_hash(), 100);
        let conditions = vec![Condition::CreateOutput { puzzle_hash: [7; 32], amount: 100 }];
        let spend = standard_spend(coin, &puzzle, &conditions);
        let signature = sign_coin_spends(&keychain, &[spend], MAX_COST).unwrap();
        let message = coin_message(&signature_message(&conditions), &coin.id());
        let required = vec![(pubkey.serialize().to_vec(), message)];
        assert!(signature.verify(&Secp256k1::verification_only(), &required));
    }

    #[test]
    fn test_puzzle_hash_differs_per_key() {
        assert_ne!(puzzle_hash_for_pk(&[2; 33]), puzzle_hash_for_pk(&[3; 33]));
    }

    #[test]
    fn test_lock_hashes_match_puzzles() {
        let id = [5u8; 32];
        for output in [0u64, 1, 1500, 128] {
            assert_eq!(e_lock_puzzle(&id, output).tree_hash(), e_lock_puzzle_hash(&id, output));
        }
        assert_eq!(a_lock_puzzle(&id).tree_hash(), a_lock_puzzle_hash(&id));
        assert_ne!(a_lock_puzzle_hash(&id), e_lock_puzzle_hash(&id, 0));
    }

    #[test]
    fn test_locks_yield_no_conditions() {
        let puzzle = e_lock_puzzle(&[1; 32], 10);
        assert!(run_program(&puzzle, &Program::nil(), MAX_COST).unwrap().is_nil());
        let puzzle = a_lock_puzzle(&[1; 32]);
        assert!(run_program(&puzzle, &Program::nil(), MAX_COST).unwrap().is_nil());
    }
}

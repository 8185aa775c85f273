//! Script-hash derivation for colored coins
//!
//! A colored puzzle is the color's core curried with its own hash and the
//! wallet's inner puzzle. The same hash can be computed three ways: from the
//! full tree, from component hashes on the wallet side, and inside a running
//! core from the hashes it is given in the solution.

use crate::color::Core;
use crate::constants::*;
use crate::expr::*;
use crate::program::{curried_tree_hash, hash_atom, Program};
use crate::types::{Hash, PuzzleHash};

/// ColoredPuzzle: 𝒦 × 𝒫 → 𝒫
pub fn colored_puzzle(core: &Core, inner_puzzle: &Program) -> Program {
    Program::curry(core.program(), &[Program::atom(core.hash().to_vec()), inner_puzzle.clone()])
}

/// ColoredPuzzleHash: ℍ × ℍ → ℍ
///
/// Equal to `colored_puzzle(core, inner).tree_hash()` for the core hashing to
/// `core_hash` and the inner puzzle hashing to `inner_puzzle_hash`.
pub fn colored_puzzle_hash(core_hash: &Hash, inner_puzzle_hash: &Hash) -> PuzzleHash {
    curried_tree_hash(core_hash, &[hash_atom(core_hash), *inner_puzzle_hash])
}

/// Structural colored-puzzle test
///
/// Returns the core and inner puzzle when `puzzle` is a core curried with its
/// own hash and an inner puzzle, `None` for anything else.
pub fn parse_colored_puzzle(puzzle: &Program) -> Option<(Core, Program)> {
    let (core_program, args) = puzzle.uncurry()?;
    if args.len() != 2 {
        return None;
    }
    let core = Core::from_program(core_program)?;
    if args[0].as_atom() != Some(&core.hash()[..]) {
        return None;
    }
    Some((core, args[1].clone()))
}

pub fn is_colored_puzzle(puzzle: &Program) -> bool {
    parse_colored_puzzle(puzzle).is_some()
}

// In-program builders. Each mirrors a wallet-side hash function and produces
// the same bytes when evaluated.

/// sha256(0x01 ‖ value)
pub fn hash_atom_expr(value: Expr) -> Expr {
    sha256(vec![bytes(&[1]), value])
}

/// sha256(0x02 ‖ left ‖ right)
pub fn hash_pair_expr(left: Expr, right: Expr) -> Expr {
    sha256(vec![bytes(&[2]), left, right])
}

fn hash_const(hash: Hash) -> Expr {
    bytes(&hash)
}

/// In-program [`curried_tree_hash`]
pub fn curried_hash_expr(module_hash: Expr, arg_hashes: Vec<Expr>) -> Expr {
    let quote_hash = hash_atom(&[OP_QUOTE]);
    let nil_hash = hash_atom(&[]);
    let mut env = hash_const(hash_atom(&[1]));
    for arg_hash in arg_hashes.into_iter().rev() {
        let quoted_arg = hash_pair_expr(hash_const(quote_hash), arg_hash);
        env = hash_pair_expr(
            hash_const(hash_atom(&[OP_CONS])),
            hash_pair_expr(quoted_arg, hash_pair_expr(env, hash_const(nil_hash))),
        );
    }
    let quoted_module = hash_pair_expr(hash_const(quote_hash), module_hash);
    hash_pair_expr(
        hash_const(hash_atom(&[OP_APPLY])),
        hash_pair_expr(quoted_module, hash_pair_expr(env, hash_const(nil_hash))),
    )
}

/// In-program [`colored_puzzle_hash`]
pub fn colored_ph_expr(core_hash: Expr, inner_puzzle_hash: Expr) -> Expr {
    curried_hash_expr(core_hash.clone(), vec![hash_atom_expr(core_hash), inner_puzzle_hash])
}

/// In-program coin id; `amount` must evaluate to a canonical integer atom
pub fn coin_id_expr(parent_id: Expr, puzzle_hash: Expr, amount: Expr) -> Expr {
    sha256(vec![parent_id, puzzle_hash, amount])
}

/// In-program id of a zero-value coin
pub fn zero_coin_id_expr(parent_id: Expr, puzzle_hash: Expr) -> Expr {
    sha256(vec![parent_id, puzzle_hash])
}

/// In-program [`crate::standard::e_lock_puzzle_hash`]
pub fn e_lock_ph_expr(auditor_id: Expr, output: Expr) -> Expr {
    curried_hash_expr(
        hash_const(hash_atom(&[])),
        vec![hash_const(hash_atom(E_LOCK_TAG)), hash_atom_expr(auditor_id), hash_atom_expr(output)],
    )
}

/// In-program [`crate::standard::a_lock_puzzle_hash`]
pub fn a_lock_ph_expr(aggregatee_id: Expr) -> Expr {
    curried_hash_expr(
        hash_const(hash_atom(&[])),
        vec![hash_const(hash_atom(A_LOCK_TAG)), hash_atom_expr(aggregatee_id)],
    )
}

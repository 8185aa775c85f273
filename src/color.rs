//! Color/core derivation
//!
//! A color is named by its genesis coin id. Its core is one fixed module
//! curried with that id, so every wallet derives byte-identical cores for the
//! same color and can recover the color from any revealed colored puzzle.
//!
//! Module environment once curried and solved:
//!
//! | index | value |
//! |---|---|
//! | 0 | genesis id |
//! | 1 | core hash |
//! | 2 | inner puzzle |
//! | 3 | inner solution |
//! | 4 | parent info: raw parent id (eve) or `(parent_id inner_hash amount)` |
//! | 5 | my amount |
//! | 6 | auditor info `(parent_id inner_hash amount)` or nil |
//! | 7 | aggregatee list `((parent_id inner_hash amount output) ...)`, auditor only |

use crate::constants::*;
use crate::error::{ColoredCoinError, Result};
use crate::expr::*;
use crate::program::Program;
use crate::script_hash::*;
use crate::types::{CoinId, Hash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Color: identity of a fungible asset, the genesis coin id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Color(pub CoinId);

impl Color {
    pub fn genesis_id(&self) -> &CoinId {
        &self.0
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded).map_err(|err| ColoredCoinError::UnknownColor(err.to_string()))?;
        let id: CoinId = bytes
            .try_into()
            .map_err(|_| ColoredCoinError::UnknownColor(format!("{} is not a 32-byte id", encoded)))?;
        Ok(Color(id))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Color::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Core: the lineage and conservation rule for one color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    color: Color,
    program: Program,
    hash: Hash,
}

impl Core {
    /// DeriveCore: Color → 𝒦
    pub fn for_color(color: Color) -> Self {
        let program = Program::curry(core_module(), &[Program::atom(color.0.to_vec())]);
        let hash = program.tree_hash();
        Self { color, program, hash }
    }

    /// Recognize a core program; `None` unless it is the core module curried
    /// with a 32-byte genesis id
    pub fn from_program(program: &Program) -> Option<Self> {
        let (module, args) = program.uncurry()?;
        if module != core_module() || args.len() != 1 {
            return None;
        }
        let genesis: CoinId = args[0].as_atom()?.try_into().ok()?;
        Some(Core::for_color(Color(genesis)))
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }
}

/// The shared core module
pub fn core_module() -> &'static Program {
    static MODULE: OnceLock<Program> = OnceLock::new();
    MODULE.get_or_init(|| build_core_module().compile())
}

fn condition(opcode: u8, operands: Vec<Expr>) -> Expr {
    let mut items = Vec::with_capacity(operands.len() + 1);
    items.push(int(opcode as i128));
    items.extend(operands);
    list(items)
}

fn is_create_output(condition: Expr) -> Expr {
    equal(first(condition), int(COND_CREATE_OUTPUT as i128))
}

/// wrap(self, core_hash, conditions): re-address every created output into the
/// color, keeping only `(51 puzzle_hash amount)`
fn wrap_function() -> Program {
    let head = first(arg(2));
    let wrapped = condition(
        COND_CREATE_OUTPUT,
        vec![colored_ph_expr(arg(1), nth(head.clone(), 1)), nth(head.clone(), 2)],
    );
    if_then_else(
        is_pair(arg(2)),
        cons(
            if_then_else(is_create_output(head.clone()), wrapped, head),
            recurse(vec![arg(1), rest(arg(2))]),
        ),
        nil(),
    )
    .compile()
}

/// created(self, conditions): the `CreateOutput` subset
fn created_function() -> Program {
    let head = first(arg(1));
    let tail = recurse(vec![rest(arg(1))]);
    if_then_else(
        is_pair(arg(1)),
        if_then_else(is_create_output(head.clone()), cons(head, tail.clone()), tail),
        nil(),
    )
    .compile()
}

/// sum_out(self, conditions): total of created amounts
fn sum_out_function() -> Program {
    let head = first(arg(1));
    if_then_else(
        is_pair(arg(1)),
        add(
            if_then_else(is_create_output(head.clone()), nth(head, 2), int(0)),
            recurse(vec![rest(arg(1))]),
        ),
        int(0),
    )
    .compile()
}

/// delta(self, aggregatees): Σ(amount − output)
fn delta_function() -> Program {
    let entry = first(arg(1));
    if_then_else(
        is_pair(arg(1)),
        add(subtract(nth(entry.clone(), 2), nth(entry, 3)), recurse(vec![rest(arg(1))])),
        int(0),
    )
    .compile()
}

fn entry_id_expr(core_hash: Expr, entry: Expr) -> Expr {
    coin_id_expr(
        first(entry.clone()),
        colored_ph_expr(core_hash, nth(entry.clone(), 1)),
        nth(entry, 2),
    )
}

/// locks(self, core_hash, auditor_id, aggregatees, tail): per aggregatee,
/// consume its E-lock and create its A-lock
fn locks_function() -> Program {
    // 0 self, 1 core hash, 2 auditor id, 3 aggregatees, 4 tail, 5 aggregatee id
    let entry = first(arg(3));
    let body = cons(
        condition(
            COND_CONSUME_COMPANION,
            vec![zero_coin_id_expr(arg(5), e_lock_ph_expr(arg(2), nth(entry, 3)))],
        ),
        cons(
            condition(COND_CREATE_OUTPUT, vec![a_lock_ph_expr(arg(5)), int(0)]),
            recurse(vec![arg(1), arg(2), rest(arg(3)), arg(4)]),
        ),
    );
    if_then_else(
        is_pair(arg(3)),
        let_in(
            vec![arg(0), arg(1), arg(2), arg(3), arg(4), entry_id_expr(arg(1), first(arg(3)))],
            &body,
        ),
        arg(4),
    )
    .compile()
}

fn or(left: Expr, right: Expr) -> Expr {
    if_then_else(left, int(1), right)
}

/// Eve branch, environment:
/// 0 genesis, 1 core hash, 2 wrapped, 3 my puzzle hash, 4 raw parent, 5 my amount
fn eve_branch() -> Expr {
    let own_output = list(vec![condition(COND_CREATE_OUTPUT, vec![arg(3), arg(5)])]);
    assert_that(
        or(equal(arg(4), arg(0)), op(Operator::Not, vec![arg(5)])),
        b"eve parent",
        assert_that(
            equal(tree_hash(call(&created_function(), vec![arg(2)])), tree_hash(own_output)),
            b"eve output",
            cons(condition(COND_ASSERT_PARENT_ID, vec![arg(4)]), arg(2)),
        ),
    )
}

/// Normal branch, environment:
/// 0 core hash, 1 wrapped, 2 my puzzle hash, 3 my amount, 4 aggregatees,
/// 5 parent id, 6 auditor id, 7 total output
fn normal_body() -> Expr {
    let my_id = coin_id_expr(arg(5), arg(2), arg(3));
    let auditor_entry = first(arg(4));
    let auditor = assert_that(
        equal(entry_id_expr(arg(0), auditor_entry.clone()), my_id.clone()),
        b"auditor entry",
        assert_that(
            equal(nth(auditor_entry, 3), arg(7)),
            b"auditor output",
            assert_that(
                equal(arg(6), my_id.clone()),
                b"auditor id",
                assert_that(
                    op(Operator::Not, vec![call(&delta_function(), vec![arg(4)])]),
                    CONSERVATION_TAG,
                    call(&locks_function(), vec![arg(0), arg(6), rest(arg(4)), arg(1)]),
                ),
            ),
        ),
    );
    let aggregatee = cons(
        condition(COND_CREATE_OUTPUT, vec![e_lock_ph_expr(arg(6), arg(7)), int(0)]),
        cons(
            condition(
                COND_CONSUME_COMPANION,
                vec![zero_coin_id_expr(arg(6), a_lock_ph_expr(my_id))],
            ),
            arg(1),
        ),
    );
    cons(
        condition(COND_ASSERT_PARENT_ID, vec![arg(5)]),
        if_then_else(is_pair(arg(4)), auditor, aggregatee),
    )
}

/// Shared body after the inner puzzle ran, environment:
/// 0 genesis, 1 core hash, 2 wrapped, 3 my puzzle hash, 4 parent info,
/// 5 my amount, 6 auditor info, 7 aggregatees
fn dispatch() -> Expr {
    let parent_info = arg(4);
    let parent_id = coin_id_expr(
        first(parent_info.clone()),
        colored_ph_expr(arg(1), nth(parent_info.clone(), 1)),
        nth(parent_info.clone(), 2),
    );
    let auditor_id = assert_that(
        is_pair(arg(6)),
        b"missing auditor",
        coin_id_expr(first(arg(6)), colored_ph_expr(arg(1), nth(arg(6), 1)), nth(arg(6), 2)),
    );
    let normal = let_in(
        vec![
            arg(1),
            arg(2),
            arg(3),
            arg(5),
            arg(7),
            parent_id,
            auditor_id,
            call(&sum_out_function(), vec![arg(2)]),
        ],
        &normal_body(),
    );
    cons(
        condition(COND_ASSERT_VALUE, vec![arg(3), arg(5)]),
        if_then_else(is_pair(parent_info), normal, eve_branch()),
    )
}

fn build_core_module() -> Expr {
    let inner_conditions = apply(arg(2), arg(3));
    let wrapped = call(&wrap_function(), vec![arg(1), inner_conditions]);
    let my_puzzle_hash = colored_ph_expr(arg(1), tree_hash(arg(2)));
    let_in(
        vec![arg(0), arg(1), wrapped, my_puzzle_hash, arg(4), arg(5), arg(6), arg(7)],
        &dispatch(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_is_deterministic() {
        let a = Core::for_color(Color([1; 32]));
        let b = Core::for_color(Color([1; 32]));
        assert_eq!(a, b);
        assert_eq!(a.program().to_bytes().unwrap(), b.program().to_bytes().unwrap());
        assert_ne!(a.hash(), Core::for_color(Color([2; 32])).hash());
    }

    #[test]
    fn test_core_from_program() {
        let core = Core::for_color(Color([3; 32]));
        assert_eq!(Core::from_program(core.program()), Some(core.clone()));
        assert_eq!(Core::from_program(core_module()), None);
        let short = Program::curry(core_module(), &[Program::atom(vec![3; 31])]);
        assert_eq!(Core::from_program(&short), None);
    }

    #[test]
    fn test_color_hex_roundtrip() {
        let color = Color([0xab; 32]);
        assert_eq!(Color::from_hex(&color.to_string()).unwrap(), color);
        assert!(Color::from_hex("abcd").is_err());
        let json = serde_json::to_string(&color).unwrap();
        assert_eq!(serde_json::from_str::<Color>(&json).unwrap(), color);
    }

    #[test]
    fn test_color_ordering_follows_bytes() {
        assert!(Color([1; 32]) < Color([2; 32]));
    }
}

//! Typed construction of authorization programs
//!
//! Programs are never assembled from text. An [`AuthorizationExpr`] is built
//! with the helpers below and compiled once into a [`Program`], which is what
//! puzzles reveal and what the script engine evaluates.

use crate::constants::*;
use crate::program::{int_to_bytes, Program};

/// Operators the script engine understands (quote and cons have their own
/// expression variants)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Apply,
    If,
    First,
    Rest,
    IsPair,
    Raise,
    Equal,
    Sha256,
    Add,
    Subtract,
    GreaterThan,
    Not,
    TreeHash,
}

impl Operator {
    pub fn opcode(self) -> u8 {
        match self {
            Operator::Apply => OP_APPLY,
            Operator::If => OP_IF,
            Operator::First => OP_FIRST,
            Operator::Rest => OP_REST,
            Operator::IsPair => OP_LISTP,
            Operator::Raise => OP_RAISE,
            Operator::Equal => OP_EQUAL,
            Operator::Sha256 => OP_SHA256,
            Operator::Add => OP_ADD,
            Operator::Subtract => OP_SUBTRACT,
            Operator::GreaterThan => OP_GREATER,
            Operator::Not => OP_NOT,
            Operator::TreeHash => OP_TREEHASH,
        }
    }
}

/// Path into the environment: read low bit first, 0 = first, 1 = rest, the
/// highest set bit terminates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgPath(pub u64);

impl ArgPath {
    /// The whole environment
    pub fn env() -> Self {
        ArgPath(1)
    }

    /// The `index`-th element of the environment list
    pub fn nth(index: u32) -> Self {
        debug_assert!(index < 62);
        ArgPath((1u64 << (index + 1)) | ((1u64 << index) - 1))
    }
}

/// AuthorizationExpr: Quote | Cons | Op | Arg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationExpr {
    Quote(Program),
    Cons(Box<AuthorizationExpr>, Box<AuthorizationExpr>),
    Op(Operator, Vec<AuthorizationExpr>),
    Arg(ArgPath),
}

pub type Expr = AuthorizationExpr;

impl AuthorizationExpr {
    /// Compile to the program form the script engine evaluates
    pub fn compile(&self) -> Program {
        match self {
            Expr::Quote(value) => Program::pair(Program::atom(vec![OP_QUOTE]), value.clone()),
            Expr::Cons(first, rest) => Program::list([
                Program::atom(vec![OP_CONS]),
                first.compile(),
                rest.compile(),
            ]),
            Expr::Op(operator, operands) => {
                let mut items = Vec::with_capacity(operands.len() + 1);
                items.push(Program::atom(vec![operator.opcode()]));
                items.extend(operands.iter().map(Expr::compile));
                Program::list(items)
            }
            Expr::Arg(path) => Program::atom(int_to_bytes(path.0 as i128)),
        }
    }
}

pub fn quote(value: Program) -> Expr {
    Expr::Quote(value)
}

pub fn nil() -> Expr {
    Expr::Quote(Program::nil())
}

pub fn int(value: i128) -> Expr {
    Expr::Quote(Program::int(value))
}

pub fn bytes(value: &[u8]) -> Expr {
    Expr::Quote(Program::atom(value.to_vec()))
}

pub fn arg(index: u32) -> Expr {
    Expr::Arg(ArgPath::nth(index))
}

pub fn env() -> Expr {
    Expr::Arg(ArgPath::env())
}

pub fn cons(first: Expr, rest: Expr) -> Expr {
    Expr::Cons(Box::new(first), Box::new(rest))
}

/// A proper list built from `items`
pub fn list(items: Vec<Expr>) -> Expr {
    items.into_iter().rev().fold(nil(), |tail, item| cons(item, tail))
}

pub fn op(operator: Operator, operands: Vec<Expr>) -> Expr {
    Expr::Op(operator, operands)
}

pub fn first(value: Expr) -> Expr {
    op(Operator::First, vec![value])
}

pub fn rest(value: Expr) -> Expr {
    op(Operator::Rest, vec![value])
}

/// `index`-th element of a list-valued expression
pub fn nth(value: Expr, index: usize) -> Expr {
    let mut node = value;
    for _ in 0..index {
        node = rest(node);
    }
    first(node)
}

pub fn is_pair(value: Expr) -> Expr {
    op(Operator::IsPair, vec![value])
}

pub fn equal(left: Expr, right: Expr) -> Expr {
    op(Operator::Equal, vec![left, right])
}

pub fn sha256(parts: Vec<Expr>) -> Expr {
    op(Operator::Sha256, parts)
}

pub fn add(left: Expr, right: Expr) -> Expr {
    op(Operator::Add, vec![left, right])
}

pub fn subtract(left: Expr, right: Expr) -> Expr {
    op(Operator::Subtract, vec![left, right])
}

pub fn tree_hash(value: Expr) -> Expr {
    op(Operator::TreeHash, vec![value])
}

pub fn raise(payload: Expr) -> Expr {
    op(Operator::Raise, vec![payload])
}

/// Lazy conditional: only the selected branch is evaluated
pub fn if_then_else(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    op(Operator::If, vec![condition, then, otherwise])
}

/// Evaluate `then` when `condition` holds, otherwise raise `payload`
pub fn assert_that(condition: Expr, payload: &[u8], then: Expr) -> Expr {
    if_then_else(condition, then, raise(bytes(payload)))
}

/// Run `program` against the environment `environment`
pub fn apply(program: Expr, environment: Expr) -> Expr {
    op(Operator::Apply, vec![program, environment])
}

/// Evaluate `body` in a fresh environment whose elements are `bindings`
///
/// Inside `body`, `arg(i)` refers to `bindings[i]`; nothing from the enclosing
/// environment is visible unless it is passed as a binding.
pub fn let_in(bindings: Vec<Expr>, body: &Expr) -> Expr {
    apply(quote(body.compile()), list(bindings))
}

/// Call a compiled function; the function sees itself as `arg(0)` and its
/// arguments from `arg(1)` on, so it can recurse with [`recurse`]
pub fn call(function: &Program, args: Vec<Expr>) -> Expr {
    let mut bindings = Vec::with_capacity(args.len() + 1);
    bindings.push(quote(function.clone()));
    bindings.extend(args);
    apply(quote(function.clone()), list(bindings))
}

/// Recursive call from inside a function invoked through [`call`]
pub fn recurse(args: Vec<Expr>) -> Expr {
    let mut bindings = Vec::with_capacity(args.len() + 1);
    bindings.push(arg(0));
    bindings.extend(args);
    apply(arg(0), list(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_paths() {
        assert_eq!(ArgPath::nth(0), ArgPath(2));
        assert_eq!(ArgPath::nth(1), ArgPath(5));
        assert_eq!(ArgPath::nth(2), ArgPath(11));
        assert_eq!(ArgPath::nth(3), ArgPath(23));
        assert_eq!(ArgPath::env(), ArgPath(1));
    }

    #[test]
    fn test_compile_quote() {
        let compiled = quote(Program::int(7)).compile();
        assert_eq!(compiled, Program::pair(Program::atom(vec![OP_QUOTE]), Program::int(7)));
    }

    #[test]
    fn test_compile_op() {
        let compiled = add(arg(0), int(3)).compile();
        let items = compiled.list_items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], &Program::atom(vec![OP_ADD]));
        assert_eq!(items[1], &Program::atom(vec![2]));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let expr = list(vec![int(51), sha256(vec![arg(0), arg(1)]), nth(env(), 2)]);
        assert_eq!(expr.compile(), expr.clone().compile());
        assert_eq!(expr.compile().tree_hash(), expr.compile().tree_hash());
    }

    #[test]
    fn test_list_builds_cons_chain() {
        let expr = list(vec![int(1), int(2)]);
        assert_eq!(expr, cons(int(1), cons(int(2), nil())));
    }
}

//! Script execution engine and the conditions it yields
//!
//! A coin's puzzle is run against the solution revealed in its spend; the result
//! is a list of declarative conditions that the ledger checks against the rest of
//! the bundle.

use crate::constants::*;
use crate::error::{ColoredCoinError, Result};
use crate::program::{bytes_to_int, is_canonical_int, sha256, Program};
use crate::types::{CoinId, CoinSpend, Hash, PuzzleHash};
use thiserror::Error;

/// Evaluation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The program executed `raise` with this payload
    #[error("raised {}", describe_payload(.0))]
    Raised(Program),

    #[error("{0}")]
    Failed(String),
}

impl EvalError {
    /// True when the payload is the core's conservation tag
    pub fn is_conservation_failure(&self) -> bool {
        matches!(self, EvalError::Raised(payload) if payload.as_atom() == Some(CONSERVATION_TAG))
    }
}

impl From<EvalError> for ColoredCoinError {
    fn from(err: EvalError) -> Self {
        ColoredCoinError::ScriptExecution(err.to_string())
    }
}

fn describe_payload(payload: &Program) -> String {
    match payload.as_atom() {
        Some(bytes) if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        _ => payload.to_string(),
    }
}

/// Nesting limit for evaluation, keeps hostile recursion off the native stack
const MAX_EVAL_DEPTH: usize = 1000;

fn failed<T>(message: impl Into<String>) -> std::result::Result<T, EvalError> {
    Err(EvalError::Failed(message.into()))
}

/// RunProgram: 𝒫 × 𝒫 × ℕ → 𝒫
///
/// Evaluation of `program` against environment `env`:
/// 1. An atom is a path into the environment (low bit first, 0 = first, 1 = rest)
/// 2. A pair `(op . operands)` applies an operator:
///    - `q` returns the operands unevaluated
///    - `i` evaluates its condition, then only the selected branch
///    - every other operator evaluates all operands first
/// 3. Every step costs 1, hashing costs its input length; exceeding `max_cost` fails
pub fn run_program(
    program: &Program,
    env: &Program,
    max_cost: u64,
) -> std::result::Result<Program, EvalError> {
    let mut cost = 0u64;
    eval(program, env, &mut cost, max_cost, 0)
}

fn charge(cost: &mut u64, amount: u64, max_cost: u64) -> std::result::Result<(), EvalError> {
    *cost = cost.saturating_add(amount);
    if *cost > max_cost {
        return failed("cost limit exceeded");
    }
    Ok(())
}

fn truthy(value: &Program) -> bool {
    !value.is_nil()
}

fn boolean(value: bool) -> Program {
    if value {
        Program::int(1)
    } else {
        Program::nil()
    }
}

fn operands_of(operands: &Program) -> std::result::Result<Vec<&Program>, EvalError> {
    operands
        .list_items()
        .map_err(|_| EvalError::Failed("operands are not a proper list".to_string()))
}

fn eval(
    code: &Program,
    env: &Program,
    cost: &mut u64,
    max_cost: u64,
    depth: usize,
) -> std::result::Result<Program, EvalError> {
    if depth > MAX_EVAL_DEPTH {
        return failed("recursion depth exceeded");
    }
    charge(cost, 1, max_cost)?;
    match code {
        Program::Atom(path) => traverse_path(path, env),
        Program::Pair(operator, operands) => {
            let opcode = match operator.as_atom() {
                Some([byte]) => *byte,
                _ => return failed(format!("invalid operator {}", operator)),
            };
            match opcode {
                OP_QUOTE => Ok(operands.as_ref().clone()),
                OP_IF => {
                    let parts = operands_of(operands)?;
                    if parts.len() != 3 {
                        return failed(format!("if expects 3 operands, got {}", parts.len()));
                    }
                    let condition = eval(parts[0], env, cost, max_cost, depth + 1)?;
                    let branch = if truthy(&condition) { parts[1] } else { parts[2] };
                    eval(branch, env, cost, max_cost, depth + 1)
                }
                _ => {
                    let mut args = Vec::new();
                    for operand in operands_of(operands)? {
                        args.push(eval(operand, env, cost, max_cost, depth + 1)?);
                    }
                    apply_operator(opcode, args, cost, max_cost, depth)
                }
            }
        }
    }
}

fn traverse_path(path: &[u8], env: &Program) -> std::result::Result<Program, EvalError> {
    if path.is_empty() {
        return Ok(Program::nil());
    }
    if path.len() > 8 {
        return failed("environment path too long");
    }
    let mut bits = path.iter().fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
    let mut node = env;
    while bits > 1 {
        node = match node {
            Program::Pair(first, rest) => {
                if bits & 1 == 1 {
                    rest
                } else {
                    first
                }
            }
            Program::Atom(_) => return failed("path into atom"),
        };
        bits >>= 1;
    }
    Ok(node.clone())
}

fn take<const N: usize>(name: &str, args: Vec<Program>) -> std::result::Result<[Program; N], EvalError> {
    args.try_into().map_err(|args: Vec<Program>| {
        EvalError::Failed(format!("{} expects {} operands, got {}", name, N, args.len()))
    })
}

fn atom_of<'a>(name: &str, value: &'a Program) -> std::result::Result<&'a [u8], EvalError> {
    value
        .as_atom()
        .ok_or_else(|| EvalError::Failed(format!("{} on a pair", name)))
}

fn int_of(name: &str, value: &Program) -> std::result::Result<i128, EvalError> {
    bytes_to_int(atom_of(name, value)?).map_err(|err| EvalError::Failed(format!("{}: {}", name, err)))
}

fn apply_operator(
    opcode: u8,
    args: Vec<Program>,
    cost: &mut u64,
    max_cost: u64,
    depth: usize,
) -> std::result::Result<Program, EvalError> {
    match opcode {
        OP_APPLY => {
            let [program, environment] = take("apply", args)?;
            eval(&program, &environment, cost, max_cost, depth + 1)
        }
        OP_CONS => {
            let [first, rest] = take("cons", args)?;
            Ok(Program::pair(first, rest))
        }
        OP_FIRST => {
            let [value] = take("first", args)?;
            match value {
                Program::Pair(first, _) => Ok(*first),
                Program::Atom(_) => failed("first of atom"),
            }
        }
        OP_REST => {
            let [value] = take("rest", args)?;
            match value {
                Program::Pair(_, rest) => Ok(*rest),
                Program::Atom(_) => failed("rest of atom"),
            }
        }
        OP_LISTP => {
            let [value] = take("listp", args)?;
            Ok(boolean(value.is_pair()))
        }
        OP_RAISE => {
            let payload = args.into_iter().next().unwrap_or_else(Program::nil);
            Err(EvalError::Raised(payload))
        }
        OP_EQUAL => {
            let [left, right] = take("=", args)?;
            Ok(boolean(atom_of("=", &left)? == atom_of("=", &right)?))
        }
        OP_SHA256 => {
            let mut buffer = Vec::new();
            for value in &args {
                buffer.extend_from_slice(atom_of("sha256", value)?);
            }
            charge(cost, buffer.len() as u64, max_cost)?;
            Ok(Program::atom(sha256(&[&buffer]).to_vec()))
        }
        OP_ADD => {
            let mut total: i128 = 0;
            for value in &args {
                total = total
                    .checked_add(int_of("+", value)?)
                    .ok_or_else(|| EvalError::Failed("+ overflow".to_string()))?;
            }
            Ok(Program::int(total))
        }
        OP_SUBTRACT => {
            let mut values = args.iter();
            let mut total = match values.next() {
                Some(value) => int_of("-", value)?,
                None => 0,
            };
            for value in values {
                total = total
                    .checked_sub(int_of("-", value)?)
                    .ok_or_else(|| EvalError::Failed("- overflow".to_string()))?;
            }
            Ok(Program::int(total))
        }
        OP_GREATER => {
            let [left, right] = take(">", args)?;
            Ok(boolean(int_of(">", &left)? > int_of(">", &right)?))
        }
        OP_NOT => {
            let [value] = take("not", args)?;
            Ok(boolean(!truthy(&value)))
        }
        OP_TREEHASH => {
            let [value] = take("treehash", args)?;
            charge(cost, value.serialized_len() as u64, max_cost)?;
            Ok(Program::atom(value.tree_hash().to_vec()))
        }
        other => failed(format!("unknown operator {}", other)),
    }
}

/// Declarative output of a puzzle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AggregateSignature { pubkey: Vec<u8>, message: Hash },
    CreateOutput { puzzle_hash: PuzzleHash, amount: u64 },
    ConsumeCompanion(CoinId),
    AssertParentId(CoinId),
    AssertValue { puzzle_hash: PuzzleHash, amount: u64 },
}

impl Condition {
    pub fn to_program(&self) -> Program {
        match self {
            Condition::AggregateSignature { pubkey, message } => Program::list([
                Program::int(COND_AGGREGATE_SIGNATURE as i128),
                Program::atom(pubkey.clone()),
                Program::atom(message.to_vec()),
            ]),
            Condition::CreateOutput { puzzle_hash, amount } => Program::list([
                Program::int(COND_CREATE_OUTPUT as i128),
                Program::atom(puzzle_hash.to_vec()),
                Program::uint(*amount),
            ]),
            Condition::ConsumeCompanion(coin_id) => Program::list([
                Program::int(COND_CONSUME_COMPANION as i128),
                Program::atom(coin_id.to_vec()),
            ]),
            Condition::AssertParentId(parent_id) => Program::list([
                Program::int(COND_ASSERT_PARENT_ID as i128),
                Program::atom(parent_id.to_vec()),
            ]),
            Condition::AssertValue { puzzle_hash, amount } => Program::list([
                Program::int(COND_ASSERT_VALUE as i128),
                Program::atom(puzzle_hash.to_vec()),
                Program::uint(*amount),
            ]),
        }
    }

    /// Parse one condition; opcodes and amounts must be canonical integers
    pub fn from_program(program: &Program) -> Result<Self> {
        let items = program.list_items()?;
        let opcode_atom = items
            .first()
            .and_then(|item| item.as_atom())
            .ok_or_else(|| ColoredCoinError::InvalidProgram(format!("malformed condition {}", program)))?;
        if opcode_atom.len() != 1 || !is_canonical_int(opcode_atom) {
            return Err(ColoredCoinError::InvalidProgram(format!(
                "non-canonical condition opcode in {}",
                program
            )));
        }
        let arg = |index: usize| -> Result<&Program> {
            items.get(index).copied().ok_or_else(|| {
                let reason = format!("condition {} is missing operand {}", program, index);
                ColoredCoinError::InvalidProgram(reason)
            })
        };
        match opcode_atom[0] {
            COND_AGGREGATE_SIGNATURE => {
                let pubkey = arg(1)?
                    .as_atom()
                    .filter(|bytes| bytes.len() == 33)
                    .ok_or_else(|| {
                        ColoredCoinError::InvalidProgram("signature pubkey must be 33 bytes".to_string())
                    })?;
                Ok(Condition::AggregateSignature { pubkey: pubkey.to_vec(), message: arg(2)?.as_hash()? })
            }
            COND_CREATE_OUTPUT => Ok(Condition::CreateOutput {
                puzzle_hash: arg(1)?.as_hash()?,
                amount: canonical_amount(arg(2)?)?,
            }),
            COND_CONSUME_COMPANION => Ok(Condition::ConsumeCompanion(arg(1)?.as_hash()?)),
            COND_ASSERT_PARENT_ID => Ok(Condition::AssertParentId(arg(1)?.as_hash()?)),
            COND_ASSERT_VALUE => Ok(Condition::AssertValue {
                puzzle_hash: arg(1)?.as_hash()?,
                amount: canonical_amount(arg(2)?)?,
            }),
            other => Err(ColoredCoinError::InvalidProgram(format!("unknown condition opcode {}", other))),
        }
    }
}

fn canonical_amount(program: &Program) -> Result<u64> {
    let bytes = program
        .as_atom()
        .ok_or_else(|| ColoredCoinError::InvalidProgram("amount must be an atom".to_string()))?;
    if !is_canonical_int(bytes) {
        return Err(ColoredCoinError::InvalidProgram("non-canonical amount".to_string()));
    }
    program.as_u64()
}

/// Parse a condition list
pub fn parse_conditions(output: &Program) -> Result<Vec<Condition>> {
    output.list_items()?.into_iter().map(Condition::from_program).collect()
}

pub fn conditions_to_program(conditions: &[Condition]) -> Program {
    Program::list(conditions.iter().map(Condition::to_program))
}

/// Sum of all `CreateOutput` amounts
pub fn output_total(conditions: &[Condition]) -> u128 {
    conditions
        .iter()
        .map(|condition| match condition {
            Condition::CreateOutput { amount, .. } => *amount as u128,
            _ => 0,
        })
        .sum()
}

/// Run a puzzle against a solution and parse the resulting conditions
pub fn conditions_for_puzzle(puzzle: &Program, solution: &Program, max_cost: u64) -> Result<Vec<Condition>> {
    let output = run_program(puzzle, solution, max_cost)?;
    parse_conditions(&output)
}

/// ConditionsForSpend: 𝒞𝒮 → 𝒦*
///
/// 1. The revealed puzzle must hash to the coin's puzzle hash
/// 2. Run the puzzle against the solution
/// 3. Parse the output as a condition list
pub fn conditions_for_spend(spend: &CoinSpend, max_cost: u64) -> Result<Vec<Condition>> {
    if spend.puzzle_reveal.tree_hash() != spend.coin.puzzle_hash {
        return Err(ColoredCoinError::InvalidSpend(format!(
            "puzzle reveal does not match coin {}",
            hex::encode(spend.coin.id())
        )));
    }
    conditions_for_puzzle(&spend.puzzle_reveal, &spend.solution, max_cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::*;

    fn run(expr: &Expr, env: Program) -> std::result::Result<Program, EvalError> {
        run_program(&expr.compile(), &env, MAX_COST)
    }

    #[test]
    fn test_quote_returns_operand() {
        let value = Program::list([Program::int(1), Program::int(2)]);
        assert_eq!(run(&quote(value.clone()), Program::nil()).unwrap(), value);
    }

    #[test]
    fn test_env_paths() {
        let env = Program::list([Program::int(10), Program::int(20), Program::int(30)]);
        assert_eq!(run(&arg(0), env.clone()).unwrap(), Program::int(10));
        assert_eq!(run(&arg(2), env.clone()).unwrap(), Program::int(30));
        assert_eq!(run(&crate::expr::env(), env.clone()).unwrap(), env);
        assert!(run(&arg(5), env).is_err());
    }

    #[test]
    fn test_arithmetic() {
        let env = Program::list([Program::int(1000), Program::int(500)]);
        assert_eq!(run(&add(arg(0), arg(1)), env.clone()).unwrap(), Program::int(1500));
        assert_eq!(run(&subtract(arg(1), arg(0)), env.clone()).unwrap(), Program::int(-500));
        let greater = op(Operator::GreaterThan, vec![arg(0), arg(1)]);
        assert_eq!(run(&greater, env).unwrap(), Program::int(1));
    }

    #[test]
    fn test_if_is_lazy() {
        let expr = if_then_else(int(1), int(7), raise(bytes(b"never")));
        assert_eq!(run(&expr, Program::nil()).unwrap(), Program::int(7));
        let expr = if_then_else(nil(), raise(bytes(b"never")), int(8));
        assert_eq!(run(&expr, Program::nil()).unwrap(), Program::int(8));
    }

    #[test]
    fn test_raise_carries_payload() {
        let err = run(&raise(bytes(CONSERVATION_TAG)), Program::nil()).unwrap_err();
        assert!(err.is_conservation_failure());
        assert_eq!(err.to_string(), "raised conservation");
    }

    #[test]
    fn test_sha256_concatenates() {
        let env = Program::list([Program::atom(b"ab".to_vec()), Program::atom(b"c".to_vec())]);
        let result = run(&crate::expr::sha256(vec![arg(0), arg(1)]), env).unwrap();
        assert_eq!(result.as_atom().unwrap(), crate::program::sha256(&[b"abc"]).as_slice());
    }

    #[test]
    fn test_treehash_matches_program() {
        let value = Program::list([Program::int(51), Program::atom(vec![4; 32])]);
        let result = run(&tree_hash(quote(value.clone())), Program::nil()).unwrap();
        assert_eq!(result.as_atom().unwrap(), value.tree_hash().as_slice());
    }

    #[test]
    fn test_let_and_recursion() {
        // sum of a list via a recursive function
        let body = if_then_else(
            is_pair(arg(1)),
            add(first(arg(1)), recurse(vec![rest(arg(1))])),
            int(0),
        );
        let sum = body.compile();
        let expr = let_in(vec![call(&sum, vec![arg(0)])], &add(arg(0), int(1)));
        let env = Program::list([Program::list([Program::int(1), Program::int(2), Program::int(3)])]);
        assert_eq!(run(&expr, env).unwrap(), Program::int(7));
    }

    #[test]
    fn test_equal_on_pair_fails() {
        let env = Program::list([Program::list([Program::int(1)])]);
        assert!(run(&equal(arg(0), int(1)), env).is_err());
    }

    #[test]
    fn test_cost_limit() {
        let forever = recurse(vec![]).compile();
        let expr = call(&forever, vec![]);
        let err = run_program(&expr.compile(), &Program::nil(), 200).unwrap_err();
        assert_eq!(err, EvalError::Failed("cost limit exceeded".to_string()));
    }

    #[test]
    fn test_depth_limit() {
        let forever = recurse(vec![]).compile();
        let expr = call(&forever, vec![]);
        let err = run_program(&expr.compile(), &Program::nil(), MAX_COST).unwrap_err();
        assert_eq!(err, EvalError::Failed("recursion depth exceeded".to_string()));
    }

    #[test]
    fn test_condition_program_roundtrip() {
        let conditions = vec![
            Condition::CreateOutput { puzzle_hash: [1; 32], amount: 1500 },
            Condition::AssertParentId([2; 32]),
            Condition::AssertValue { puzzle_hash: [3; 32], amount: 0 },
            Condition::ConsumeCompanion([4; 32]),
            Condition::AggregateSignature { pubkey: vec![2; 33], message: [5; 32] },
        ];
        let parsed = parse_conditions(&conditions_to_program(&conditions)).unwrap();
        assert_eq!(parsed, conditions);
        assert_eq!(output_total(&parsed), 1500);
    }

    #[test]
    fn test_condition_rejects_non_canonical_opcode() {
        let program =
            Program::list([Program::atom(vec![0x00, 51]), Program::atom(vec![1; 32]), Program::int(1)]);
        assert!(Condition::from_program(&program).is_err());
    }

    #[test]
    fn test_condition_rejects_negative_amount() {
        let program = Program::list([Program::int(51), Program::atom(vec![1; 32]), Program::int(-1)]);
        assert!(Condition::from_program(&program).is_err());
    }

    #[test]
    fn test_conditions_for_spend_checks_puzzle_hash() {
        use crate::types::{Coin, CoinSpend};
        let puzzle = quote(Program::nil()).compile();
        let good = CoinSpend::new(Coin::new([0; 32], puzzle.tree_hash(), 1), puzzle.clone(), Program::nil());
        assert!(conditions_for_spend(&good, MAX_COST).unwrap().is_empty());
        let bad = CoinSpend::new(Coin::new([0; 32], [9; 32], 1), puzzle, Program::nil());
        assert!(conditions_for_spend(&bad, MAX_COST).is_err());
    }
}

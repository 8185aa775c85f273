//! Protocol constants: operator opcodes, condition opcodes, limits

/// `q`: return the operand unevaluated
pub const OP_QUOTE: u8 = 1;

/// `a`: evaluate a program against an environment
pub const OP_APPLY: u8 = 2;

/// `i`: lazy conditional
pub const OP_IF: u8 = 3;

/// `c`: build a pair
pub const OP_CONS: u8 = 4;

/// `f`: left half of a pair
pub const OP_FIRST: u8 = 5;

/// `r`: right half of a pair
pub const OP_REST: u8 = 6;

/// `l`: is the operand a pair
pub const OP_LISTP: u8 = 7;

/// `x`: abort evaluation
pub const OP_RAISE: u8 = 8;

/// `=`: byte equality of two atoms
pub const OP_EQUAL: u8 = 9;

/// `sha256`: hash of the concatenated atom operands
pub const OP_SHA256: u8 = 10;

/// `+`
pub const OP_ADD: u8 = 11;

/// `-`
pub const OP_SUBTRACT: u8 = 12;

/// `>`
pub const OP_GREATER: u8 = 13;

/// `not`
pub const OP_NOT: u8 = 14;

/// `treehash`: tree hash of the operand
pub const OP_TREEHASH: u8 = 15;

/// Condition: signature by `pubkey` over `message` required
pub const COND_AGGREGATE_SIGNATURE: u8 = 50;

/// Condition: create a coin
pub const COND_CREATE_OUTPUT: u8 = 51;

/// Condition: a coin with the given id is spent in the same bundle
pub const COND_CONSUME_COMPANION: u8 = 52;

/// Condition: the spending coin's parent id
pub const COND_ASSERT_PARENT_ID: u8 = 71;

/// Condition: the spending coin's puzzle hash and amount
pub const COND_ASSERT_VALUE: u8 = 73;

/// Tag curried into E-lock puzzles (created by aggregatees)
pub const E_LOCK_TAG: &[u8] = b"e-lock";

/// Tag curried into A-lock puzzles (created by the auditor)
pub const A_LOCK_TAG: &[u8] = b"a-lock";

/// Payload the core raises with when inputs and declared outputs differ
pub const CONSERVATION_TAG: &[u8] = b"conservation";

/// Default evaluation budget for a single spend
pub const MAX_COST: u64 = 2_000_000;

/// Longest atom the byte encoding can carry (three-byte length prefix)
pub const MAX_ATOM_LEN: usize = 0x0f_ffff;

/// Default reward paid to the coinbase puzzle hash of every simulated block
pub const DEFAULT_BLOCK_REWARD: u64 = 1_000_000;

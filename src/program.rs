//! Program trees: the single value model for puzzles, solutions and conditions
//!
//! A program is either an atom (a byte string) or a pair of programs. Nil is the
//! empty atom and terminates proper lists. Integers are stored as minimal
//! big-endian two's complement atoms, with zero as nil.

use crate::constants::*;
use crate::error::{ColoredCoinError, Result};
use crate::types::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum nesting accepted by the byte deserializer
const MAX_PARSE_DEPTH: usize = 4096;

/// Program: 𝒫 = 𝔹* ∪ (𝒫 × 𝒫)
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Program {
    Atom(Vec<u8>),
    Pair(Box<Program>, Box<Program>),
}

/// SHA-256 over the concatenation of `parts`
pub fn sha256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Tree hash of an atom: sha256(0x01 ‖ bytes)
pub fn hash_atom(bytes: &[u8]) -> Hash {
    sha256(&[&[1u8], bytes])
}

/// Tree hash of a pair: sha256(0x02 ‖ h(left) ‖ h(right))
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    sha256(&[&[2u8], left, right])
}

/// Minimal big-endian two's complement encoding; zero encodes as the empty atom
pub fn int_to_bytes(value: i128) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (byte, next) = (bytes[start], bytes[start + 1]);
        let redundant = (byte == 0x00 && next & 0x80 == 0) || (byte == 0xff && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decode a two's complement atom (at most 16 bytes)
pub fn bytes_to_int(bytes: &[u8]) -> Result<i128> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 16 {
        return Err(ColoredCoinError::InvalidProgram(format!(
            "integer atom of {} bytes", bytes.len()
        )));
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(i128::from_be_bytes(buf))
}

/// True when `bytes` is the minimal encoding of the integer it denotes
pub fn is_canonical_int(bytes: &[u8]) -> bool {
    match bytes_to_int(bytes) {
        Ok(value) => int_to_bytes(value) == bytes,
        Err(_) => false,
    }
}

impl Program {
    pub fn nil() -> Self {
        Program::Atom(Vec::new())
    }

    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        Program::Atom(bytes.into())
    }

    pub fn int(value: i128) -> Self {
        Program::Atom(int_to_bytes(value))
    }

    pub fn uint(value: u64) -> Self {
        Program::int(value as i128)
    }

    pub fn pair(first: Program, rest: Program) -> Self {
        Program::Pair(Box::new(first), Box::new(rest))
    }

    /// Build a proper (nil-terminated) list
    pub fn list(items: impl IntoIterator<Item = Program>) -> Self {
        let items: Vec<Program> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(Program::nil(), |tail, item| Program::pair(item, tail))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Program::Atom(bytes) if bytes.is_empty())
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Program::Pair(_, _))
    }

    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Program::Atom(bytes) => Some(bytes),
            Program::Pair(_, _) => None,
        }
    }

    pub fn first(&self) -> Result<&Program> {
        match self {
            Program::Pair(first, _) => Ok(first),
            Program::Atom(_) => Err(ColoredCoinError::InvalidProgram("first of atom".to_string())),
        }
    }

    pub fn rest(&self) -> Result<&Program> {
        match self {
            Program::Pair(_, rest) => Ok(rest),
            Program::Atom(_) => Err(ColoredCoinError::InvalidProgram("rest of atom".to_string())),
        }
    }

    /// The `index`-th element of a list
    pub fn nth(&self, index: usize) -> Result<&Program> {
        let mut node = self;
        for _ in 0..index {
            node = node.rest()?;
        }
        node.first()
    }

    fn atom_or_err(&self, what: &str) -> Result<&[u8]> {
        self.as_atom()
            .ok_or_else(|| ColoredCoinError::InvalidProgram(format!("expected {} atom, found pair", what)))
    }

    pub fn as_int(&self) -> Result<i128> {
        bytes_to_int(self.atom_or_err("integer")?)
    }

    pub fn as_u64(&self) -> Result<u64> {
        let value = self.as_int()?;
        u64::try_from(value)
            .map_err(|_| ColoredCoinError::InvalidProgram(format!("{} is not a coin amount", value)))
    }

    pub fn as_hash(&self) -> Result<Hash> {
        let bytes = self.atom_or_err("hash")?;
        bytes.try_into().map_err(|_| {
            ColoredCoinError::InvalidProgram(format!("expected 32-byte hash, found {} bytes", bytes.len()))
        })
    }

    /// Elements of a proper list
    pub fn list_items(&self) -> Result<Vec<&Program>> {
        let mut items = Vec::new();
        let mut node = self;
        loop {
            match node {
                Program::Pair(first, rest) => {
                    items.push(first.as_ref());
                    node = rest;
                }
                Program::Atom(bytes) if bytes.is_empty() => return Ok(items),
                Program::Atom(_) => {
                    return Err(ColoredCoinError::InvalidProgram("improper list".to_string()))
                }
            }
        }
    }

    /// TreeHash: 𝒫 → ℍ
    pub fn tree_hash(&self) -> Hash {
        match self {
            Program::Atom(bytes) => hash_atom(bytes),
            Program::Pair(first, rest) => hash_pair(&first.tree_hash(), &rest.tree_hash()),
        }
    }

    /// Serialize for the VM boundary; atoms longer than [`MAX_ATOM_LEN`]
    /// have no encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_program(self, &mut out)?;
        Ok(out)
    }

    /// Length of the byte encoding, without building it
    pub fn serialized_len(&self) -> usize {
        match self {
            Program::Pair(first, rest) => 1 + first.serialized_len() + rest.serialized_len(),
            Program::Atom(bytes) => match bytes.len() {
                0 => 1,
                1 if bytes[0] <= 0x7f => 1,
                len if len < 0x40 => 1 + len,
                len if len < 0x2000 => 2 + len,
                len => 3 + len,
            },
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let program = read_program(bytes, &mut pos, 0)?;
        if pos != bytes.len() {
            return Err(ColoredCoinError::Serialization(format!(
                "{} trailing bytes after program", bytes.len() - pos
            )));
        }
        Ok(program)
    }

    /// Curry: bind `args` in front of the environment `module` will see
    ///
    /// Produces `(a (q . module) (c (q . arg0) (c (q . arg1) ... 1)))`.
    pub fn curry(module: &Program, args: &[Program]) -> Program {
        let mut env = Program::atom(vec![1]);
        for arg in args.iter().rev() {
            env = Program::list([
                Program::atom(vec![OP_CONS]),
                Program::pair(Program::atom(vec![OP_QUOTE]), arg.clone()),
                env,
            ]);
        }
        Program::list([
            Program::atom(vec![OP_APPLY]),
            Program::pair(Program::atom(vec![OP_QUOTE]), module.clone()),
            env,
        ])
    }

    /// Structural inverse of [`Program::curry`]
    pub fn uncurry(&self) -> Option<(&Program, Vec<&Program>)> {
        let items = self.list_items().ok()?;
        if items.len() != 3 || items[0].as_atom() != Some(&[OP_APPLY][..]) {
            return None;
        }
        let module = unquote(items[1])?;
        let mut args = Vec::new();
        let mut env = items[2];
        while env.as_atom() != Some(&[1u8][..]) {
            let parts = env.list_items().ok()?;
            if parts.len() != 3 || parts[0].as_atom() != Some(&[OP_CONS][..]) {
                return None;
            }
            args.push(unquote(parts[1])?);
            env = parts[2];
        }
        Some((module, args))
    }
}

fn unquote(program: &Program) -> Option<&Program> {
    match program {
        Program::Pair(op, value) if op.as_atom() == Some(&[OP_QUOTE][..]) => Some(value),
        _ => None,
    }
}

/// CurriedTreeHash: ℍ × ℍ* → ℍ
///
/// Tree hash of `curry(module, args)` given only the hashes of the module and of
/// each argument.
pub fn curried_tree_hash(module_hash: &Hash, arg_hashes: &[Hash]) -> Hash {
    let quote = hash_atom(&[OP_QUOTE]);
    let nil = hash_atom(&[]);
    let mut env = hash_atom(&[1]);
    for arg in arg_hashes.iter().rev() {
        let quoted_arg = hash_pair(&quote, arg);
        env = hash_pair(
            &hash_atom(&[OP_CONS]),
            &hash_pair(&quoted_arg, &hash_pair(&env, &nil)),
        );
    }
    let quoted_module = hash_pair(&quote, module_hash);
    hash_pair(
        &hash_atom(&[OP_APPLY]),
        &hash_pair(&quoted_module, &hash_pair(&env, &nil)),
    )
}

fn write_program(program: &Program, out: &mut Vec<u8>) -> Result<()> {
    match program {
        Program::Pair(first, rest) => {
            out.push(0xff);
            write_program(first, out)?;
            write_program(rest, out)
        }
        Program::Atom(bytes) => write_atom(bytes, out),
    }
}

fn write_atom(atom: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len = atom.len();
    if len > MAX_ATOM_LEN {
        return Err(ColoredCoinError::Serialization(format!("atom of {} bytes", len)));
    }
    if len == 0 {
        out.push(0x80);
        return Ok(());
    }
    if len == 1 && atom[0] <= 0x7f {
        out.push(atom[0]);
        return Ok(());
    }
    if len < 0x40 {
        out.push(0x80 | len as u8);
    } else if len < 0x2000 {
        out.push(0xc0 | (len >> 8) as u8);
        out.push((len & 0xff) as u8);
    } else {
        out.push(0xe0 | ((len >> 16) & 0x0f) as u8);
        out.push(((len >> 8) & 0xff) as u8);
        out.push((len & 0xff) as u8);
    }
    out.extend_from_slice(atom);
    Ok(())
}

fn next_byte(bytes: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *bytes
        .get(*pos)
        .ok_or_else(|| ColoredCoinError::Serialization("unexpected end of program".to_string()))?;
    *pos += 1;
    Ok(byte)
}

fn read_program(bytes: &[u8], pos: &mut usize, depth: usize) -> Result<Program> {
    if depth > MAX_PARSE_DEPTH {
        return Err(ColoredCoinError::Serialization("program nested too deeply".to_string()));
    }
    let prefix = next_byte(bytes, pos)?;
    match prefix {
        0xff => {
            let first = read_program(bytes, pos, depth + 1)?;
            let rest = read_program(bytes, pos, depth + 1)?;
            Ok(Program::pair(first, rest))
        }
        0x00..=0x7f => Ok(Program::Atom(vec![prefix])),
        0x80 => Ok(Program::nil()),
        _ => {
            let len = if prefix & 0xc0 == 0x80 {
                (prefix & 0x3f) as usize
            } else if prefix & 0xe0 == 0xc0 {
                ((prefix & 0x1f) as usize) << 8 | next_byte(bytes, pos)? as usize
            } else if prefix & 0xf0 == 0xe0 {
                let high = ((prefix & 0x0f) as usize) << 16;
                let mid = (next_byte(bytes, pos)? as usize) << 8;
                high | mid | next_byte(bytes, pos)? as usize
            } else {
                return Err(ColoredCoinError::Serialization(format!(
                    "invalid atom prefix 0x{:02x}", prefix
                )));
            };
            if len > MAX_ATOM_LEN {
                return Err(ColoredCoinError::Serialization(format!("atom of {} bytes", len)));
            }
            let end = pos
                .checked_add(len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| ColoredCoinError::Serialization("atom runs past end".to_string()))?;
            let atom = bytes[*pos..end].to_vec();
            *pos = end;
            Ok(Program::Atom(atom))
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Atom(bytes) if bytes.is_empty() => write!(f, "()"),
            Program::Atom(bytes) if bytes.len() <= 4 => match bytes_to_int(bytes) {
                Ok(value) => write!(f, "{}", value),
                Err(_) => write!(f, "0x{}", hex::encode(bytes)),
            },
            Program::Atom(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Program::Pair(first, rest) => {
                write!(f, "({}", first)?;
                let mut node = rest.as_ref();
                loop {
                    match node {
                        Program::Pair(item, tail) => {
                            write!(f, " {}", item)?;
                            node = tail;
                        }
                        Program::Atom(bytes) if bytes.is_empty() => break,
                        atom => {
                            write!(f, " . {}", atom)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex::encode(bytes))
    }
}

impl<'de> Deserialize<'de> for Program {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        Program::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

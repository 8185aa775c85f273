//! Lineage store and the revealed-spend index it is filled from

use crate::color::Core;
use crate::error::{ColoredCoinError, Result};
use crate::program::Program;
use crate::script_hash::{colored_puzzle_hash, parse_colored_puzzle};
use crate::types::{hash_hex, Coin, CoinId, CoinSpend, Hash, PuzzleHash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lineage proof a colored coin presents when spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineageProof {
    /// The parent is an uncolored coin: the genesis coin, or the funding coin of
    /// a zero-value bootstrap mint
    Genesis(CoinId),

    /// The parent is a colored coin of the same core
    Parent {
        parent_id: CoinId,
        inner_puzzle_hash: PuzzleHash,
        amount: u64,
    },
}

impl LineageProof {
    /// Solution encoding: a raw id atom, or the triple `(parent_id inner_hash amount)`
    pub fn to_program(&self) -> Program {
        match self {
            LineageProof::Genesis(id) => Program::atom(id.to_vec()),
            LineageProof::Parent { parent_id, inner_puzzle_hash, amount } => Program::list([
                Program::atom(parent_id.to_vec()),
                Program::atom(inner_puzzle_hash.to_vec()),
                Program::uint(*amount),
            ]),
        }
    }

    pub fn from_program(program: &Program) -> Result<Self> {
        if let Some(bytes) = program.as_atom() {
            let id: CoinId = bytes.try_into().map_err(|_| {
                ColoredCoinError::InvalidProgram(format!("raw parent id of {} bytes", bytes.len()))
            })?;
            return Ok(LineageProof::Genesis(id));
        }
        let items = program.list_items()?;
        if items.len() != 3 {
            return Err(ColoredCoinError::InvalidProgram(format!("lineage triple of {} items", items.len())));
        }
        Ok(LineageProof::Parent {
            parent_id: items[0].as_hash()?,
            inner_puzzle_hash: items[1].as_hash()?,
            amount: items[2].as_u64()?,
        })
    }

    pub fn is_eve(&self) -> bool {
        matches!(self, LineageProof::Genesis(_))
    }

    /// Id of the parent coin this proof claims, for a coin of the core hashing
    /// to `core_hash`
    pub fn parent_coin_id(&self, core_hash: &Hash) -> CoinId {
        match self {
            LineageProof::Genesis(id) => *id,
            LineageProof::Parent { parent_id, inner_puzzle_hash, amount } => {
                Coin::new(*parent_id, colored_puzzle_hash(core_hash, inner_puzzle_hash), *amount).id()
            }
        }
    }
}

/// Lineage store: coin id → lineage proof
#[derive(Debug, Clone, Default)]
pub struct LineageStore {
    records: HashMap<CoinId, LineageProof>,
}

impl LineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coin_id: CoinId, proof: LineageProof) {
        self.records.insert(coin_id, proof);
    }

    pub fn get(&self, coin_id: &CoinId) -> Option<&LineageProof> {
        self.records.get(coin_id)
    }

    /// Lineage of a coin about to be spent
    pub fn require(&self, coin_id: &CoinId) -> Result<LineageProof> {
        self.records
            .get(coin_id)
            .copied()
            .ok_or_else(|| ColoredCoinError::LineageUnresolved(hash_hex(coin_id)))
    }

    pub fn remove(&mut self, coin_id: &CoinId) -> Option<LineageProof> {
        self.records.remove(coin_id)
    }

    pub fn contains(&self, coin_id: &CoinId) -> bool {
        self.records.contains_key(coin_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What a parent's reveal says about its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentReveal {
    pub proof: LineageProof,
    /// Core of the parent, `None` when the parent is uncolored
    pub core: Option<Core>,
}

/// Revealed spends of one block, keyed by the id of the coin spent
pub struct RevealIndex<'a> {
    spends: HashMap<CoinId, &'a CoinSpend>,
}

impl<'a> RevealIndex<'a> {
    pub fn new(spends: &'a [CoinSpend]) -> Self {
        Self {
            spends: spends.iter().map(|spend| (spend.coin.id(), spend)).collect(),
        }
    }

    pub fn spend_of(&self, coin_id: &CoinId) -> Option<&'a CoinSpend> {
        self.spends.get(coin_id).copied()
    }

    pub fn len(&self) -> usize {
        self.spends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spends.is_empty()
    }

    /// Lineage for `child`, from its parent's reveal in this block
    ///
    /// A colored parent yields the triple; an uncolored parent yields its raw id.
    /// `None` when the parent was not spent in this block.
    pub fn parent_reveal(&self, child: &Coin) -> Option<ParentReveal> {
        let spend = self.spend_of(&child.parent_id)?;
        Some(match parse_colored_puzzle(&spend.puzzle_reveal) {
            Some((core, inner)) => ParentReveal {
                proof: LineageProof::Parent {
                    parent_id: spend.coin.parent_id,
                    inner_puzzle_hash: inner.tree_hash(),
                    amount: spend.coin.amount,
                },
                core: Some(core),
            },
            None => ParentReveal { proof: LineageProof::Genesis(child.parent_id), core: None },
        })
    }

}

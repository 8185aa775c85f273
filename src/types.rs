//! Core ledger types for colored-coin wallets

use crate::keys::AggregateSignature;
use crate::program::{int_to_bytes, sha256, Program};
use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Coin identifier: sha256(parent_id ‖ puzzle_hash ‖ amount)
pub type CoinId = Hash;

/// Tree hash of a coin's locking program
pub type PuzzleHash = Hash;

/// Coin: 𝒞 = ℍ × ℍ × ℕ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub parent_id: CoinId,
    pub puzzle_hash: PuzzleHash,
    pub amount: u64,
}

impl Coin {
    pub fn new(parent_id: CoinId, puzzle_hash: PuzzleHash, amount: u64) -> Self {
        Self { parent_id, puzzle_hash, amount }
    }

    /// CoinId: 𝒞 → ℍ
    pub fn id(&self) -> CoinId {
        sha256(&[&self.parent_id, &self.puzzle_hash, &int_to_bytes(self.amount as i128)])
    }
}

/// Coin spend: the coin, its revealed puzzle and the solution it runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSpend {
    pub coin: Coin,
    pub puzzle_reveal: Program,
    pub solution: Program,
}

impl CoinSpend {
    pub fn new(coin: Coin, puzzle_reveal: Program, solution: Program) -> Self {
        Self { coin, puzzle_reveal, solution }
    }
}

/// Spend bundle: 𝒮ℬ = 𝒞𝒮* × 𝒜𝒮, applied atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendBundle {
    pub coin_spends: Vec<CoinSpend>,
    pub aggregated_signature: AggregateSignature,
}

impl SpendBundle {
    pub fn new(coin_spends: Vec<CoinSpend>, aggregated_signature: AggregateSignature) -> Self {
        Self { coin_spends, aggregated_signature }
    }

    /// Concatenate spends and merge signatures
    pub fn aggregate(bundles: impl IntoIterator<Item = SpendBundle>) -> Self {
        let mut coin_spends = Vec::new();
        let mut aggregated_signature = AggregateSignature::default();
        for bundle in bundles {
            coin_spends.extend(bundle.coin_spends);
            aggregated_signature.merge(bundle.aggregated_signature);
        }
        Self { coin_spends, aggregated_signature }
    }

    /// Ids of every coin this bundle spends
    pub fn removals(&self) -> Vec<CoinId> {
        self.coin_spends.iter().map(|spend| spend.coin.id()).collect()
    }

    /// Bundle name: hash over spent coin ids, puzzles and solutions
    pub fn name(&self) -> Hash {
        let mut parts: Vec<Hash> = Vec::with_capacity(self.coin_spends.len() * 3);
        for spend in &self.coin_spends {
            parts.push(spend.coin.id());
            parts.push(spend.puzzle_reveal.tree_hash());
            parts.push(spend.solution.tree_hash());
        }
        let refs: Vec<&[u8]> = parts.iter().map(|part| part.as_slice()).collect();
        sha256(&refs)
    }
}

/// Block Header: ℋ = ℍ × ℕ × ℍ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous_hash: Hash,
    pub height: u64,
    pub body_hash: Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        sha256(&[&self.previous_hash, &self.height.to_be_bytes(), &self.body_hash])
    }
}

/// Block Body: reward coins plus the aggregated bundle of included spends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub coinbase: Option<Coin>,
    pub fees_coin: Option<Coin>,
    pub spend_bundle: Option<SpendBundle>,
}

impl BlockBody {
    pub fn hash(&self) -> Hash {
        let coinbase = self.coinbase.map(|coin| coin.id()).unwrap_or_default();
        let fees = self.fees_coin.map(|coin| coin.id()).unwrap_or_default();
        let bundle = self.spend_bundle.as_ref().map(SpendBundle::name).unwrap_or_default();
        sha256(&[&coinbase, &fees, &bundle])
    }

    /// Spends revealed by this block, in bundle order
    pub fn coin_spends(&self) -> &[CoinSpend] {
        self.spend_bundle
            .as_ref()
            .map(|bundle| bundle.coin_spends.as_slice())
            .unwrap_or(&[])
    }
}

/// Block: ℬ = ℋ × Body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// Chain tip as reported by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipInfo {
    pub genesis_hash: Hash,
    pub tip_hash: Hash,
    pub tip_height: u64,
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

/// Mempool acceptance result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolResult {
    Accepted,
    Rejected(String),
}

/// Lowercase hex rendering used in logs and error messages
pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

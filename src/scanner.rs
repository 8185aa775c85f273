//! Ownership scanner
//!
//! Each block is scanned once: the additions the wallet recognizes are
//! adopted, with lineage recovered from their parent's reveal in the same
//! block, and the removals it holds are dropped.

use crate::color::Core;
use crate::error::Result;
use crate::keys::Keychain;
use crate::ledger::{additions_for_body, removals_for_body};
use crate::lineage::{LineageProof, ParentReveal, RevealIndex};
use crate::program::Program;
use crate::script_hash::colored_puzzle_hash;
use crate::standard::puzzle_for_pk;
use crate::types::{hash_hex, Block, Coin, PuzzleHash};
use crate::wallet::{ColoredRecord, UncoloredRecord, WalletState};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What a recognized puzzle hash locks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Standard puzzle for an uncolored coin, inner puzzle for a colored one
    pub puzzle: Program,
    /// `None` for uncolored coins
    pub core: Option<Core>,
    /// `None` for watch-only puzzles
    pub key_index: Option<u32>,
}

/// Candidate map: puzzle hash → candidate, built once per block
#[derive(Debug, Default)]
pub struct CandidateMap {
    entries: HashMap<PuzzleHash, Candidate>,
}

impl CandidateMap {
    /// 1. Standard puzzle of every issued key, uncolored
    /// 2. Every issued key's puzzle wrapped into every known core
    /// 3. Every watched inner puzzle wrapped into every known core
    pub fn build<'a>(
        keychain: &Keychain,
        cores: impl IntoIterator<Item = &'a Core>,
        watched: &[Program],
    ) -> Result<Self> {
        let mut inners = Vec::with_capacity(keychain.issued() as usize + watched.len());
        for index in 0..keychain.issued() {
            let puzzle = puzzle_for_pk(&keychain.public_key(index)?.serialize());
            inners.push((puzzle, Some(index)));
        }
        inners.extend(watched.iter().map(|puzzle| (puzzle.clone(), None)));

        let mut entries = HashMap::new();
        for (puzzle, key_index) in inners.iter().filter(|(_, key_index)| key_index.is_some()) {
            entries.insert(
                puzzle.tree_hash(),
                Candidate { puzzle: puzzle.clone(), core: None, key_index: *key_index },
            );
        }
        for core in cores {
            for (puzzle, key_index) in &inners {
                entries.insert(
                    colored_puzzle_hash(&core.hash(), &puzzle.tree_hash()),
                    Candidate { puzzle: puzzle.clone(), core: Some(core.clone()), key_index: *key_index },
                );
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, puzzle_hash: &PuzzleHash) -> Option<&Candidate> {
        self.entries.get(puzzle_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts from scanning one block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub adopted: usize,
    pub removed: usize,
    pub forged: usize,
    pub unresolved: usize,
}

/// Whether `reveal` is a lineage a coin of `core` can legitimately have
///
/// A genesis edge is valid from the color's genesis coin, or for a zero-value
/// bootstrap coin from any parent. A colored parent must carry the same core.
fn lineage_is_valid(core: &Core, coin: &Coin, reveal: &ParentReveal) -> bool {
    match (&reveal.proof, &reveal.core) {
        (LineageProof::Genesis(raw), None) => raw == core.color().genesis_id() || coin.amount == 0,
        (LineageProof::Parent { .. }, Some(parent_core)) => parent_core == core,
        _ => false,
    }
}

/// ScanBlock: 𝒲 × ℬ → 𝒲
///
/// 1. Build the candidate map
/// 2. Adopt recognized additions; colored ones only with a valid lineage
/// 3. Drop removals from every owned set and release their reservations
pub fn scan_block(
    state: &mut WalletState,
    keychain: &Keychain,
    block: &Block,
    max_cost: u64,
) -> Result<ScanSummary> {
    // 1. Candidates
    let candidates = CandidateMap::build(keychain, state.cores.values(), &state.watched)?;
    let mut summary = ScanSummary::default();

    // 2. Additions
    let reveals = RevealIndex::new(block.body.coin_spends());
    for coin in additions_for_body(&block.body, max_cost)? {
        let Some(candidate) = candidates.get(&coin.puzzle_hash) else {
            continue;
        };
        let coin_id = coin.id();
        match (&candidate.core, candidate.key_index) {
            (None, Some(key_index)) => {
                debug!(coin = %hash_hex(&coin_id), amount = coin.amount, "adopted uncolored coin");
                state
                    .uncolored
                    .insert(coin_id, UncoloredRecord { coin, puzzle: candidate.puzzle.clone(), key_index });
                summary.adopted += 1;
            }
            (None, None) => {}
            (Some(core), key_index) => {
                let record = ColoredRecord {
                    coin,
                    color: core.color(),
                    inner_puzzle: candidate.puzzle.clone(),
                    key_index,
                };
                match reveals.parent_reveal(&coin) {
                    Some(reveal) if lineage_is_valid(core, &coin, &reveal) => {
                        debug!(
                            coin = %hash_hex(&coin_id),
                            color = %core.color(),
                            amount = coin.amount,
                            "adopted colored coin"
                        );
                        state.lineage.insert(coin_id, reveal.proof);
                        state.colored.insert(coin_id, record);
                        summary.adopted += 1;
                    }
                    Some(_) => {
                        warn!(
                            coin = %hash_hex(&coin_id),
                            color = %core.color(),
                            "ignoring forged colored coin"
                        );
                        summary.forged += 1;
                    }
                    None => {
                        warn!(
                            coin = %hash_hex(&coin_id),
                            color = %core.color(),
                            "lineage unresolved, coin unspendable"
                        );
                        state.pending.insert(coin_id, record);
                        summary.unresolved += 1;
                    }
                }
            }
        }
    }

    // 3. Removals
    for coin_id in removals_for_body(&block.body) {
        let owned = state.colored.remove(&coin_id).is_some()
            | state.uncolored.remove(&coin_id).is_some()
            | state.pending.remove(&coin_id).is_some();
        state.lineage.remove(&coin_id);
        state.reserved.remove(&coin_id);
        if owned {
            debug!(coin = %hash_hex(&coin_id), "dropped spent coin");
            summary.removed += 1;
        }
    }
    Ok(summary)
}

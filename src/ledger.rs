//! Ledger collaborator: the interface wallets consume and an in-memory simulator
//!
//! The simulator is the validation authority in tests and in the `cc-sim`
//! runnable: it runs every revealed puzzle, checks the resulting conditions
//! against the bundle and the coin set, verifies signatures and orders
//! accepted bundles into blocks.

use crate::config::LedgerConfig;
use crate::error::{ColoredCoinError, Result};
use crate::keys::coin_message;
use crate::program::sha256;
use crate::script::{parse_conditions, run_program, Condition};
use crate::types::*;
use secp256k1::{Secp256k1, VerifyOnly};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Prefix of rejection reasons caused by a failed conservation check
pub const CONSERVATION_REJECTION: &str = "conservation violation";

/// Rejection reason when a signature demand is left uncovered
pub const SIGNATURE_REJECTION: &str = "aggregate signature does not cover every demand";

/// Ledger interface consumed by wallets
pub trait LedgerApi {
    fn get_tip(&self) -> TipInfo;

    /// Produce the next block (test/bootstrap only)
    fn next_block(&mut self, coinbase_puzzle_hash: PuzzleHash, fees_puzzle_hash: PuzzleHash) -> Result<Block>;

    /// Header-hash preimage lookup
    fn block(&self, header_hash: &Hash) -> Option<Block>;

    /// Coin-id preimage lookup, spent or unspent
    fn coin(&self, coin_id: &CoinId) -> Option<Coin>;

    fn push_tx(&mut self, bundle: SpendBundle) -> Result<MempoolResult>;
}

/// Coins a block creates: rewards first, then every output of its spends
pub fn additions_for_body(body: &BlockBody, max_cost: u64) -> Result<Vec<Coin>> {
    let mut additions: Vec<Coin> = body.coinbase.iter().chain(body.fees_coin.iter()).copied().collect();
    for spend in body.coin_spends() {
        let output = run_program(&spend.puzzle_reveal, &spend.solution, max_cost)?;
        for condition in parse_conditions(&output)? {
            if let Condition::CreateOutput { puzzle_hash, amount } = condition {
                additions.push(Coin::new(spend.coin.id(), puzzle_hash, amount));
            }
        }
    }
    Ok(additions)
}

/// Ids of the coins a block spends
pub fn removals_for_body(body: &BlockBody) -> Vec<CoinId> {
    body.coin_spends().iter().map(|spend| spend.coin.id()).collect()
}

/// A bundle accepted into the mempool with the effects computed at validation
struct MempoolEntry {
    bundle: SpendBundle,
    additions: Vec<Coin>,
    fee: u64,
}

/// Effects of a valid bundle
struct BundleEffects {
    additions: Vec<Coin>,
    fee: u64,
}

/// In-memory ledger simulator
pub struct LedgerSim {
    config: LedgerConfig,
    secp: Secp256k1<VerifyOnly>,
    blocks: HashMap<Hash, Block>,
    chain: Vec<Hash>,
    unspent: HashMap<CoinId, Coin>,
    spent: HashMap<CoinId, Coin>,
    mempool: Vec<MempoolEntry>,
}

impl LedgerSim {
    /// New chain holding only an empty genesis block
    pub fn new(config: LedgerConfig) -> Self {
        let body = BlockBody { coinbase: None, fees_coin: None, spend_bundle: None };
        let header = BlockHeader { previous_hash: [0; 32], height: 0, body_hash: body.hash() };
        let genesis = Block { header, body };
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self {
            config,
            secp: Secp256k1::verification_only(),
            blocks,
            chain: vec![hash],
            unspent: HashMap::new(),
            spent: HashMap::new(),
            mempool: Vec::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn height(&self) -> u64 {
        (self.chain.len() - 1) as u64
    }

    pub fn is_unspent(&self, coin_id: &CoinId) -> bool {
        self.unspent.contains_key(coin_id)
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    /// ValidateBundle: 𝒮ℬ × 𝒰𝒮 → {valid, invalid}
    ///
    /// 1. The bundle spends at least one coin and no coin twice
    /// 2. Every revealed puzzle matches its coin, runs, and yields well-formed conditions
    /// 3. No output is created twice
    /// 4. Every spent coin is unspent or created inside the bundle
    /// 5. Parent, value and companion assertions hold
    /// 6. Outputs do not exceed inputs
    /// 7. Every signature demand, bound to its spent coin, is covered by the
    ///    aggregate signature
    /// 8. No spent coin is already spent by a mempool bundle
    pub fn validate_bundle(&self, bundle: &SpendBundle) -> ValidationResult {
        match self.bundle_effects(bundle) {
            Ok(_) => ValidationResult::Valid,
            Err(reason) => ValidationResult::Invalid(reason),
        }
    }

    fn bundle_effects(&self, bundle: &SpendBundle) -> std::result::Result<BundleEffects, String> {
        // 1. Non-empty, no double spend
        if bundle.coin_spends.is_empty() {
            return Err("empty spend bundle".to_string());
        }
        let removals = bundle.removals();
        let removal_set: HashSet<CoinId> = removals.iter().copied().collect();
        if removal_set.len() != removals.len() {
            return Err("coin spent twice in bundle".to_string());
        }

        // 2. Run every spend
        let mut conditions_per_spend = Vec::with_capacity(bundle.coin_spends.len());
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.id();
            if spend.puzzle_reveal.tree_hash() != spend.coin.puzzle_hash {
                return Err(format!("puzzle reveal mismatch for coin {}", hash_hex(&coin_id)));
            }
            let output = match run_program(&spend.puzzle_reveal, &spend.solution, self.config.max_cost) {
                Ok(output) => output,
                Err(err) if err.is_conservation_failure() => {
                    return Err(format!("{} in coin {}", CONSERVATION_REJECTION, hash_hex(&coin_id)));
                }
                Err(err) => return Err(format!("script failed for coin {}: {}", hash_hex(&coin_id), err)),
            };
            let conditions = parse_conditions(&output)
                .map_err(|err| format!("bad conditions from coin {}: {}", hash_hex(&coin_id), err))?;
            conditions_per_spend.push(conditions);
        }

        // 3. Outputs
        let mut additions = Vec::new();
        let mut addition_ids = HashSet::new();
        for (spend, conditions) in bundle.coin_spends.iter().zip(&conditions_per_spend) {
            for condition in conditions {
                if let Condition::CreateOutput { puzzle_hash, amount } = condition {
                    let coin = Coin::new(spend.coin.id(), *puzzle_hash, *amount);
                    if !addition_ids.insert(coin.id()) {
                        return Err(format!("duplicate output {}", hash_hex(&coin.id())));
                    }
                    if self.unspent.contains_key(&coin.id()) || self.spent.contains_key(&coin.id()) {
                        return Err(format!("output {} already exists", hash_hex(&coin.id())));
                    }
                    additions.push(coin);
                }
            }
        }

        // 4. Inputs exist
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.id();
            if !self.unspent.contains_key(&coin_id) && !addition_ids.contains(&coin_id) {
                return Err(format!("coin {} is not unspent", hash_hex(&coin_id)));
            }
        }

        // 5. Assertions
        let mut required_signatures = Vec::new();
        for (spend, conditions) in bundle.coin_spends.iter().zip(&conditions_per_spend) {
            let coin_id = spend.coin.id();
            for condition in conditions {
                match condition {
                    Condition::AssertParentId(parent_id) if *parent_id != spend.coin.parent_id => {
                        return Err(format!("parent assertion failed for coin {}", hash_hex(&coin_id)));
                    }
                    Condition::AssertValue { puzzle_hash, amount }
                        if *puzzle_hash != spend.coin.puzzle_hash || *amount != spend.coin.amount =>
                    {
                        return Err(format!("value assertion failed for coin {}", hash_hex(&coin_id)));
                    }
                    Condition::ConsumeCompanion(companion) if !removal_set.contains(companion) => {
                        return Err(format!(
                            "coin {} requires companion {} to be spent",
                            hash_hex(&coin_id),
                            hash_hex(companion)
                        ));
                    }
                    Condition::AggregateSignature { pubkey, message } => {
                        required_signatures.push((pubkey.clone(), coin_message(message, &coin_id)));
                    }
                    _ => {}
                }
            }
        }

        // 6. Value
        let input_total: u128 = bundle.coin_spends.iter().map(|spend| spend.coin.amount as u128).sum();
        let output_total: u128 = additions.iter().map(|coin| coin.amount as u128).sum();
        if output_total > input_total {
            return Err(format!("outputs {} exceed inputs {}", output_total, input_total));
        }
        let fee = u64::try_from(input_total - output_total).map_err(|_| "fee overflows".to_string())?;

        // 7. Signatures
        if !bundle.aggregated_signature.verify(&self.secp, &required_signatures) {
            return Err(SIGNATURE_REJECTION.to_string());
        }

        // 8. Mempool conflicts
        for entry in &self.mempool {
            if entry.bundle.removals().iter().any(|id| removal_set.contains(id)) {
                return Err("bundle conflicts with mempool".to_string());
            }
        }

        Ok(BundleEffects { additions, fee })
    }

    fn reward_parent(tag: &[u8], height: u64) -> CoinId {
        sha256(&[tag, &height.to_be_bytes()])
    }
}

impl LedgerApi for LedgerSim {
    fn get_tip(&self) -> TipInfo {
        TipInfo {
            genesis_hash: self.chain[0],
            tip_hash: self.chain[self.chain.len() - 1],
            tip_height: self.height(),
        }
    }

    fn next_block(
        &mut self,
        coinbase_puzzle_hash: PuzzleHash,
        fees_puzzle_hash: PuzzleHash,
    ) -> Result<Block> {
        let height = self.height() + 1;
        let entries: Vec<MempoolEntry> = self.mempool.drain(..).collect();
        let fees: u64 = entries.iter().map(|entry| entry.fee).sum();

        let reward = self.config.block_reward;
        let coinbase = Coin::new(Self::reward_parent(b"coinbase", height), coinbase_puzzle_hash, reward);
        let fees_coin =
            (fees > 0).then(|| Coin::new(Self::reward_parent(b"fees", height), fees_puzzle_hash, fees));

        let mut additions = vec![coinbase];
        additions.extend(fees_coin);
        let mut bundles = Vec::with_capacity(entries.len());
        for entry in entries {
            additions.extend(entry.additions);
            bundles.push(entry.bundle);
        }
        let spend_bundle = (!bundles.is_empty()).then(|| SpendBundle::aggregate(bundles));

        for coin in &additions {
            self.unspent.insert(coin.id(), *coin);
        }
        if let Some(bundle) = &spend_bundle {
            for spend in &bundle.coin_spends {
                let coin_id = spend.coin.id();
                let coin = self
                    .unspent
                    .remove(&coin_id)
                    .ok_or_else(|| {
                        ColoredCoinError::Ledger(format!("spent coin {} vanished", hash_hex(&coin_id)))
                    })?;
                self.spent.insert(coin_id, coin);
            }
        }

        let body = BlockBody { coinbase: Some(coinbase), fees_coin, spend_bundle };
        let header = BlockHeader {
            previous_hash: self.get_tip().tip_hash,
            height,
            body_hash: body.hash(),
        };
        let block = Block { header, body };
        let hash = block.hash();
        self.blocks.insert(hash, block.clone());
        self.chain.push(hash);
        let spends = block.body.coin_spends().len();
        info!(height, block = %hash_hex(&hash), fees, spends, "produced block");
        Ok(block)
    }

    fn block(&self, header_hash: &Hash) -> Option<Block> {
        self.blocks.get(header_hash).cloned()
    }

    fn coin(&self, coin_id: &CoinId) -> Option<Coin> {
        self.unspent.get(coin_id).or_else(|| self.spent.get(coin_id)).copied()
    }

    /// AcceptToMemoryPool: 𝒮ℬ → {accepted, rejected}
    fn push_tx(&mut self, bundle: SpendBundle) -> Result<MempoolResult> {
        let name = bundle.name();
        if self.mempool.iter().any(|entry| entry.bundle.name() == name) {
            return Ok(MempoolResult::Rejected("bundle already in mempool".to_string()));
        }
        match self.bundle_effects(&bundle) {
            Ok(BundleEffects { additions, fee }) => {
                info!(bundle = %hash_hex(&name), spends = bundle.coin_spends.len(), fee, "accepted bundle");
                self.mempool.push(MempoolEntry { bundle, additions, fee });
                Ok(MempoolResult::Accepted)
            }
            Err(reason) => {
                warn!(bundle = %hash_hex(&name), %reason, "rejected bundle");
                Ok(MempoolResult::Rejected(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_BLOCK_REWARD, MAX_COST};
    use crate::keys::{AggregateSignature, Keychain};
    use crate::program::Program;
    use crate::standard::{puzzle_for_pk, sign_coin_spends, standard_spend};

    struct Fixture {
        ledger: LedgerSim,
        keychain: Keychain,
        puzzle: Program,
    }

    fn fixture() -> Fixture {
        let mut keychain = Keychain::from_seed([1; 32]);
        let (_, pubkey) = keychain.next_public_key().unwrap();
        let puzzle = puzzle_for_pk(&pubkey.serialize());
        let mut ledger = LedgerSim::new(LedgerConfig::default());
        ledger.next_block(puzzle.tree_hash(), puzzle.tree_hash()).unwrap();
        Fixture { ledger, keychain, puzzle }
    }

    fn reward_coin(fixture: &Fixture) -> Coin {
        let tip = fixture.ledger.get_tip();
        fixture.ledger.block(&tip.tip_hash).unwrap().body.coinbase.unwrap()
    }

    fn signed(fixture: &Fixture, spends: Vec<CoinSpend>) -> SpendBundle {
        let signature = sign_coin_spends(&fixture.keychain, &spends, MAX_COST).unwrap();
        SpendBundle::new(spends, signature)
    }

    #[test]
    fn test_genesis_tip() {
        let ledger = LedgerSim::new(LedgerConfig::default());
        let tip = ledger.get_tip();
        assert_eq!(tip.tip_height, 0);
        assert_eq!(tip.genesis_hash, tip.tip_hash);
    }

    #[test]
    fn test_block_pays_reward() {
        let fixture = fixture();
        let coin = reward_coin(&fixture);
        assert_eq!(coin.amount, DEFAULT_BLOCK_REWARD);
        assert_eq!(coin.puzzle_hash, fixture.puzzle.tree_hash());
        assert!(fixture.ledger.is_unspent(&coin.id()));
        assert_eq!(fixture.ledger.coin(&coin.id()), Some(coin));
    }

    #[test]
    fn test_valid_spend_then_block() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let conditions = vec![Condition::CreateOutput { puzzle_hash: [7; 32], amount: coin.amount - 10 }];
        let bundle = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &conditions)]);
        assert_eq!(fixture.ledger.push_tx(bundle).unwrap(), MempoolResult::Accepted);
        let block = fixture.ledger.next_block([8; 32], [9; 32]).unwrap();
        assert_eq!(block.body.fees_coin.unwrap().amount, 10);
        let additions = additions_for_body(&block.body, MAX_COST).unwrap();
        assert_eq!(additions.len(), 3);
        assert_eq!(removals_for_body(&block.body), vec![coin.id()]);
        assert!(!fixture.ledger.is_unspent(&coin.id()));
        assert_eq!(fixture.ledger.coin(&coin.id()), Some(coin));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let spend = standard_spend(coin, &fixture.puzzle, &[]);
        let bundle = SpendBundle::new(vec![spend], AggregateSignature::default());
        assert!(matches!(fixture.ledger.push_tx(bundle).unwrap(), MempoolResult::Rejected(_)));
    }

    #[test]
    fn test_signature_not_reusable_on_sibling_coin() {
        let mut fixture = fixture();
        let first = reward_coin(&fixture);
        fixture.ledger.next_block(fixture.puzzle.tree_hash(), fixture.puzzle.tree_hash()).unwrap();
        let second = reward_coin(&fixture);
        assert_eq!(first.puzzle_hash, second.puzzle_hash);

        // Same key, same empty conditions, different coin
        let signed_first = signed(&fixture, vec![standard_spend(first, &fixture.puzzle, &[])]);
        let replay = SpendBundle::new(
            vec![standard_spend(second, &fixture.puzzle, &[])],
            signed_first.aggregated_signature.clone(),
        );
        assert_eq!(
            fixture.ledger.push_tx(replay).unwrap(),
            MempoolResult::Rejected(SIGNATURE_REJECTION.to_string())
        );
        assert_eq!(fixture.ledger.push_tx(signed_first).unwrap(), MempoolResult::Accepted);
    }

    #[test]
    fn test_overspend_rejected() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let conditions = vec![Condition::CreateOutput { puzzle_hash: [7; 32], amount: coin.amount + 1 }];
        let bundle = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &conditions)]);
        match fixture.ledger.push_tx(bundle).unwrap() {
            MempoolResult::Rejected(reason) => assert!(reason.starts_with("outputs")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_double_spend_against_mempool_rejected() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let first = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &[])]);
        let conditions = vec![Condition::CreateOutput { puzzle_hash: [7; 32], amount: 1 }];
        let second = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &conditions)]);
        assert_eq!(fixture.ledger.push_tx(first).unwrap(), MempoolResult::Accepted);
        assert_eq!(
            fixture.ledger.push_tx(second).unwrap(),
            MempoolResult::Rejected("bundle conflicts with mempool".to_string())
        );
    }

    #[test]
    fn test_unknown_coin_rejected() {
        let mut fixture = fixture();
        let coin = Coin::new([3; 32], fixture.puzzle.tree_hash(), 5);
        let bundle = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &[])]);
        match fixture.ledger.push_tx(bundle).unwrap() {
            MempoolResult::Rejected(reason) => assert!(reason.contains("is not unspent")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_companion_assertion() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let conditions = vec![Condition::ConsumeCompanion([4; 32])];
        let bundle = signed(&fixture, vec![standard_spend(coin, &fixture.puzzle, &conditions)]);
        match fixture.ledger.push_tx(bundle).unwrap() {
            MempoolResult::Rejected(reason) => assert!(reason.contains("companion")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ephemeral_spend_accepted() {
        let mut fixture = fixture();
        let coin = reward_coin(&fixture);
        let child_ph = fixture.puzzle.tree_hash();
        let parent_spend = standard_spend(
            coin,
            &fixture.puzzle,
            &[Condition::CreateOutput { puzzle_hash: child_ph, amount: coin.amount }],
        );
        let child = Coin::new(coin.id(), child_ph, coin.amount);
        let child_spend = standard_spend(
            child,
            &fixture.puzzle,
            &[Condition::CreateOutput { puzzle_hash: [7; 32], amount: coin.amount }],
        );
        let bundle = signed(&fixture, vec![parent_spend, child_spend]);
        assert_eq!(fixture.ledger.push_tx(bundle).unwrap(), MempoolResult::Accepted);
        fixture.ledger.next_block([8; 32], [9; 32]).unwrap();
        assert!(!fixture.ledger.is_unspent(&child.id()));
        assert!(fixture.ledger.is_unspent(&Coin::new(child.id(), [7; 32], coin.amount).id()));
    }
}

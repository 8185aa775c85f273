//! Wallet facade: owned state, coin selection and the protocol operations
//!
//! A wallet is a single actor. Its state is only changed by the ownership
//! scanner (from ledger-confirmed blocks) and by reserving the coins of a
//! bundle the ledger just accepted.

use crate::color::{Color, Core};
use crate::config::WalletConfig;
use crate::error::{ColoredCoinError, Result};
use crate::issuance::{self, zero_value_mint, EveSpend, FundingCoin, Issuance};
use crate::keys::{AggregateSignature, Keychain, Signer};
use crate::ledger::{LedgerApi, CONSERVATION_REJECTION, SIGNATURE_REJECTION};
use crate::lineage::{LineageProof, LineageStore};
use crate::program::Program;
use crate::scanner::{scan_block, ScanSummary};
use crate::script::{conditions_for_puzzle, Condition};
use crate::script_hash::colored_puzzle_hash;
use crate::spend::{build_audited_spends, build_incomplete_spends, sign_requests, Role, SpendRequest};
use crate::standard::{puzzle_for_pk, sign_coin_spends, solution_for_conditions, standard_spend};
use crate::trade::TradeOffer;
use crate::types::{hash_hex, Coin, CoinId, CoinSpend, Hash, MempoolResult, PuzzleHash, SpendBundle};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

/// A colored coin the wallet recognizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredRecord {
    pub coin: Coin,
    pub color: Color,
    pub inner_puzzle: Program,
    /// Key that signs for the inner puzzle, `None` when watch-only
    pub key_index: Option<u32>,
}

impl ColoredRecord {
    pub fn is_spendable(&self) -> bool {
        self.key_index.is_some()
    }
}

/// An uncolored coin locked by one of the wallet's keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncoloredRecord {
    pub coin: Coin,
    pub puzzle: Program,
    pub key_index: u32,
}

impl UncoloredRecord {
    pub fn funding(&self) -> FundingCoin {
        FundingCoin { coin: self.coin, puzzle: self.puzzle.clone() }
    }
}

/// Everything the wallet knows about the ledger
#[derive(Debug, Default)]
pub struct WalletState {
    pub(crate) colored: HashMap<CoinId, ColoredRecord>,
    /// Recognized colored coins whose lineage could not be recovered
    pub(crate) pending: HashMap<CoinId, ColoredRecord>,
    pub(crate) uncolored: HashMap<CoinId, UncoloredRecord>,
    pub(crate) lineage: LineageStore,
    pub(crate) cores: BTreeMap<Color, Core>,
    pub(crate) watched: Vec<Program>,
    /// Coins spent by bundles the ledger accepted but has not yet confirmed
    pub(crate) reserved: HashSet<CoinId>,
}

impl WalletState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn core(&self, color: &Color) -> Option<&Core> {
        self.cores.get(color)
    }

    pub fn known_colors(&self) -> Vec<Color> {
        self.cores.keys().copied().collect()
    }

    pub fn lineage(&self) -> &LineageStore {
        &self.lineage
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_reserved(&self, coin_id: &CoinId) -> bool {
        self.reserved.contains(coin_id)
    }
}

/// Coins of one color taking part in a bundle built by this wallet
///
/// The first input carries the leg's whole output in `primary_role`; any other
/// input is an aggregatee creating nothing.
struct ColoredLeg {
    core: Core,
    inputs: Vec<(Coin, Program, LineageProof)>,
    output: u64,
    primary_conditions: Vec<Condition>,
    primary_role: Role,
    eve: Option<EveSpend>,
    mint: Option<Condition>,
}

impl ColoredLeg {
    fn coin_ids(&self) -> impl Iterator<Item = CoinId> + '_ {
        self.inputs.iter().map(|(coin, _, _)| coin.id())
    }

    /// Spend requests, each inner solution extended with `bind(coin_id)`
    fn requests(&self, bind: impl Fn(&CoinId) -> Vec<Condition>) -> Vec<SpendRequest> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(position, (coin, inner, lineage))| {
                let (mut conditions, output, role) = if position == 0 {
                    (self.primary_conditions.clone(), self.output, self.primary_role)
                } else {
                    (Vec::new(), 0, Role::Aggregatee)
                };
                conditions.extend(bind(&coin.id()));
                let solution = solution_for_conditions(&conditions);
                SpendRequest::new(*coin, inner.clone(), lineage.clone(), output, solution, role)
            })
            .collect()
    }
}

/// Conditions tying the spend of `coin_id` to the rest of `group`
///
/// The first coin of the group requires every other one; every other coin
/// requires the first. No coin of the group can be spent without all of them.
fn group_companions(group: &[CoinId], coin_id: &CoinId) -> Vec<Condition> {
    match group.split_first() {
        Some((anchor, rest)) if anchor == coin_id => {
            rest.iter().map(|id| Condition::ConsumeCompanion(*id)).collect()
        }
        Some((anchor, _)) => vec![Condition::ConsumeCompanion(*anchor)],
        None => Vec::new(),
    }
}

/// Greedy selection, largest first; `at_least_one` picks the largest coin even
/// when nothing is needed
fn select_greedy<T>(
    mut candidates: Vec<(Coin, T)>,
    needed: u64,
    at_least_one: bool,
) -> Result<Vec<(Coin, T)>> {
    candidates.sort_by(|(a, _), (b, _)| b.amount.cmp(&a.amount).then_with(|| a.id().cmp(&b.id())));
    let available: u128 = candidates.iter().map(|(coin, _)| coin.amount as u128).sum();
    let mut total: u128 = 0;
    let mut selected = Vec::new();
    for (coin, item) in candidates {
        if total >= needed as u128 && !(at_least_one && selected.is_empty()) {
            break;
        }
        total += coin.amount as u128;
        selected.push((coin, item));
    }
    if total < needed as u128 {
        return Err(ColoredCoinError::InsufficientFunds {
            needed,
            available: u64::try_from(available).unwrap_or(u64::MAX),
        });
    }
    Ok(selected)
}

fn magnitude(delta: i128) -> Result<u64> {
    u64::try_from(delta.unsigned_abs())
        .map_err(|_| ColoredCoinError::InvalidSpend(format!("amount {} out of range", delta)))
}

/// A colored-coin wallet
pub struct Wallet {
    config: WalletConfig,
    keychain: Keychain,
    state: WalletState,
    last_synced: Option<Hash>,
}

impl Wallet {
    pub fn new(config: WalletConfig) -> Result<Self> {
        let keychain = Keychain::from_seed(config.seed_bytes()?);
        Ok(Self { config, keychain, state: WalletState::new(), last_synced: None })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn keychain(&self) -> &Keychain {
        &self.keychain
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    /// Standard puzzle for a fresh key; doubles as the inner puzzle of a colored address
    pub fn get_new_inner_puzzle(&mut self) -> Result<Program> {
        let (_, pubkey) = self.keychain.next_public_key()?;
        Ok(puzzle_for_pk(&pubkey.serialize()))
    }

    /// Fresh uncolored address
    pub fn get_new_puzzle_hash(&mut self) -> Result<PuzzleHash> {
        Ok(self.get_new_inner_puzzle()?.tree_hash())
    }

    /// Fresh address for coins of `color`
    pub fn colored_puzzle_hash(&mut self, color: &Color) -> Result<PuzzleHash> {
        let core_hash = self.core(color)?.hash();
        Ok(colored_puzzle_hash(&core_hash, &self.get_new_puzzle_hash()?))
    }

    /// Register a color so its coins are recognized from the next block on
    pub fn add_color(&mut self, color: Color) -> Core {
        self.state.cores.entry(color).or_insert_with(|| Core::for_color(color)).clone()
    }

    /// Track colored coins locked by `inner_puzzle` without being able to spend them
    pub fn watch_inner_puzzle(&mut self, inner_puzzle: Program) {
        if !self.state.watched.contains(&inner_puzzle) {
            self.state.watched.push(inner_puzzle);
        }
    }

    fn core(&self, color: &Color) -> Result<&Core> {
        self.state.core(color).ok_or_else(|| ColoredCoinError::UnknownColor(color.to_string()))
    }

    /// Scan every block between the last synced one and the tip, oldest first
    pub fn sync(&mut self, ledger: &dyn LedgerApi) -> Result<ScanSummary> {
        let tip = ledger.get_tip();
        let mut blocks = Vec::new();
        let mut hash = tip.tip_hash;
        while Some(hash) != self.last_synced {
            let block = ledger
                .block(&hash)
                .ok_or_else(|| ColoredCoinError::Ledger(format!("unknown block {}", hash_hex(&hash))))?;
            let previous = block.header.previous_hash;
            let height = block.header.height;
            blocks.push(block);
            if height == 0 {
                break;
            }
            hash = previous;
        }

        let mut total = ScanSummary::default();
        for block in blocks.iter().rev() {
            let summary = scan_block(&mut self.state, &self.keychain, block, self.config.max_cost)?;
            total.adopted += summary.adopted;
            total.removed += summary.removed;
            total.forged += summary.forged;
            total.unresolved += summary.unresolved;
            self.last_synced = Some(block.hash());
        }
        Ok(total)
    }

    /// Push a bundle; on acceptance the coins it spends are reserved
    pub fn submit(&mut self, ledger: &mut dyn LedgerApi, bundle: &SpendBundle) -> Result<()> {
        match ledger.push_tx(bundle.clone())? {
            MempoolResult::Accepted => {
                for coin_id in bundle.removals() {
                    let owned = self.state.colored.contains_key(&coin_id)
                        || self.state.uncolored.contains_key(&coin_id);
                    if owned {
                        self.state.reserved.insert(coin_id);
                    }
                }
                info!(wallet = %self.config.name, bundle = %hash_hex(&bundle.name()), "submitted bundle");
                Ok(())
            }
            MempoolResult::Rejected(reason) if reason.starts_with(CONSERVATION_REJECTION) => {
                warn!(wallet = %self.config.name, %reason, "bundle rejected");
                Err(ColoredCoinError::ConservationViolation(reason))
            }
            MempoolResult::Rejected(reason) if reason == SIGNATURE_REJECTION => {
                warn!(wallet = %self.config.name, %reason, "bundle rejected");
                Err(ColoredCoinError::InvalidSignature(reason))
            }
            MempoolResult::Rejected(reason) => {
                warn!(wallet = %self.config.name, %reason, "bundle rejected");
                Err(ColoredCoinError::TransactionRejected(reason))
            }
        }
    }

    pub fn uncolored_balance(&self) -> u64 {
        self.state.uncolored.values().map(|record| record.coin.amount).sum()
    }

    /// Balance of spendable coins of `color`
    pub fn colored_balance(&self, color: &Color) -> u64 {
        self.colored_coins(color).iter().filter(|r| r.is_spendable()).map(|r| r.coin.amount).sum()
    }

    /// Balance of watch-only coins of `color`
    pub fn watched_balance(&self, color: &Color) -> u64 {
        self.colored_coins(color).iter().filter(|r| !r.is_spendable()).map(|r| r.coin.amount).sum()
    }

    /// Recognized coins of `color`, largest first
    pub fn colored_coins(&self, color: &Color) -> Vec<ColoredRecord> {
        let mut coins: Vec<ColoredRecord> =
            self.state.colored.values().filter(|record| &record.color == color).cloned().collect();
        coins.sort_by(|a, b| b.coin.amount.cmp(&a.coin.amount).then_with(|| a.coin.id().cmp(&b.coin.id())));
        coins
    }

    /// Owned uncolored coins, largest first
    pub fn uncolored_coins(&self) -> Vec<UncoloredRecord> {
        let mut coins: Vec<UncoloredRecord> = self.state.uncolored.values().cloned().collect();
        coins.sort_by(|a, b| b.coin.amount.cmp(&a.coin.amount).then_with(|| a.coin.id().cmp(&b.coin.id())));
        coins
    }

    fn select_uncolored(&self, needed: u64, at_least_one: bool) -> Result<Vec<UncoloredRecord>> {
        let candidates = self
            .state
            .uncolored
            .values()
            .filter(|record| !self.state.is_reserved(&record.coin.id()))
            .map(|record| (record.coin, record.clone()))
            .collect();
        let selected = select_greedy(candidates, needed, at_least_one)?;
        if at_least_one && selected.is_empty() {
            return Err(ColoredCoinError::InsufficientFunds { needed, available: 0 });
        }
        Ok(selected.into_iter().map(|(_, record)| record).collect())
    }

    /// Spendable coins of `color` with their lineage
    fn select_colored(&self, color: &Color, needed: u64) -> Result<Vec<(ColoredRecord, LineageProof)>> {
        let candidates = self
            .state
            .colored
            .values()
            .filter(|record| {
                &record.color == color && record.is_spendable() && !self.state.is_reserved(&record.coin.id())
            })
            .map(|record| (record.coin, record.clone()))
            .collect();
        select_greedy(candidates, needed, true)?
            .into_iter()
            .map(|(coin, record)| self.state.lineage.require(&coin.id()).map(|lineage| (record, lineage)))
            .collect()
    }

    fn has_spendable(&self, color: &Color) -> bool {
        self.state.colored.values().any(|record| {
            &record.color == color && record.is_spendable() && !self.state.is_reserved(&record.coin.id())
        })
    }

    /// Issue a new color, one coin per amount
    ///
    /// `genesis` names the uncolored coin to consume first; otherwise coins are
    /// accumulated largest first. The returned bundle still has to be submitted.
    pub fn issue(&mut self, amounts: &[u64], genesis: Option<CoinId>) -> Result<Issuance> {
        let needed = amounts
            .iter()
            .try_fold(0u64, |total, amount| total.checked_add(*amount))
            .ok_or_else(|| ColoredCoinError::InvalidSpend("issuance total overflows".to_string()))?;

        let funding: Vec<FundingCoin> = match genesis {
            Some(genesis_id) => {
                let first = self
                    .state
                    .uncolored
                    .get(&genesis_id)
                    .filter(|_| !self.state.is_reserved(&genesis_id))
                    .cloned()
                    .ok_or_else(|| ColoredCoinError::UnknownCoin(hash_hex(&genesis_id)))?;
                let mut funding = vec![first.funding()];
                if first.coin.amount < needed {
                    let rest: Vec<(Coin, UncoloredRecord)> = self
                        .state
                        .uncolored
                        .values()
                        .filter(|record| {
                            record.coin.id() != genesis_id && !self.state.is_reserved(&record.coin.id())
                        })
                        .map(|record| (record.coin, record.clone()))
                        .collect();
                    let extra = select_greedy(rest, needed - first.coin.amount, false).map_err(|_| {
                        ColoredCoinError::InsufficientFunds { needed, available: self.uncolored_balance() }
                    })?;
                    funding.extend(extra.iter().map(|(_, record)| record.funding()));
                }
                funding
            }
            None => self.select_uncolored(needed, true)?.iter().map(UncoloredRecord::funding).collect(),
        };

        let inner_puzzles = amounts.iter().map(|_| self.get_new_inner_puzzle()).collect::<Result<Vec<_>>>()?;
        let change = self.get_new_puzzle_hash()?;
        let max_cost = self.config.max_cost;
        let issued = issuance::issue(&funding, amounts, &inner_puzzles, change, &self.keychain, max_cost)?;
        self.state.cores.insert(issued.color, issued.core.clone());
        Ok(issued)
    }

    /// Audited spend of coins of one color, signed for the wallet's inner puzzles
    pub fn spend(&self, color: &Color, requests: &[SpendRequest]) -> Result<SpendBundle> {
        let core = self.core(color)?;
        let spends = build_audited_spends(core, requests, self.config.max_cost)?;
        let signature = sign_requests(&self.keychain, requests, self.config.max_cost)?;
        Ok(SpendBundle::new(spends, signature))
    }

    /// Pay `payments` (inner puzzle hash, amount) in `color`, change back to
    /// this wallet; the largest selected coin audits
    pub fn send_colored(&mut self, color: &Color, payments: &[(PuzzleHash, u64)]) -> Result<SpendBundle> {
        let needed = payments
            .iter()
            .try_fold(0u64, |total, (_, amount)| total.checked_add(*amount))
            .ok_or_else(|| ColoredCoinError::InvalidSpend("payment total overflows".to_string()))?;
        let selected = self.select_colored(color, needed)?;
        if selected.is_empty() {
            return Err(ColoredCoinError::InsufficientFunds { needed, available: 0 });
        }
        let input: u64 = selected.iter().map(|(record, _)| record.coin.amount).sum();

        let mut outputs: Vec<Condition> = payments
            .iter()
            .map(|&(puzzle_hash, amount)| Condition::CreateOutput { puzzle_hash, amount })
            .collect();
        if input > needed {
            let change = self.get_new_puzzle_hash()?;
            outputs.push(Condition::CreateOutput { puzzle_hash: change, amount: input - needed });
        }

        let requests: Vec<SpendRequest> = selected
            .into_iter()
            .enumerate()
            .map(|(position, (record, lineage))| {
                let (conditions, role, output) = if position == 0 {
                    (outputs.clone(), Role::Auditor, input)
                } else {
                    (Vec::new(), Role::Aggregatee, 0)
                };
                let solution = solution_for_conditions(&conditions);
                SpendRequest::new(record.coin, record.inner_puzzle, lineage, output, solution, role)
            })
            .collect();
        let bundle = self.spend(color, &requests)?;
        info!(
            wallet = %self.config.name,
            color = %color,
            amount = needed,
            coins = requests.len(),
            "built colored payment"
        );
        Ok(bundle)
    }

    /// Coins of `color` whose holdings change by `delta`; mints a zero-value
    /// coin funded by `mint_funding` when the wallet holds none
    fn colored_leg(
        &mut self,
        color: &Color,
        delta: i128,
        mint_funding: Option<CoinId>,
        primary_role: Role,
    ) -> Result<ColoredLeg> {
        let core = self.core(color)?.clone();
        let needed = if delta < 0 { magnitude(delta)? } else { 0 };
        let mut inputs: Vec<(Coin, Program, LineageProof)> = self
            .select_colored(color, needed)?
            .into_iter()
            .map(|(record, lineage)| (record.coin, record.inner_puzzle, lineage))
            .collect();

        let mut eve = None;
        let mut mint = None;
        if inputs.is_empty() {
            let funding = mint_funding.ok_or(ColoredCoinError::InsufficientFunds { needed, available: 0 })?;
            let inner = self.get_new_inner_puzzle()?;
            let (create, eve_spend) = zero_value_mint(&core, funding, &inner)?;
            inputs.push((eve_spend.child, inner, eve_spend.child_lineage));
            eve = Some(eve_spend);
            mint = Some(create);
        }

        let input: u128 = inputs.iter().map(|(coin, _, _)| coin.amount as u128).sum();
        let output = u64::try_from(input as i128 + delta)
            .map_err(|_| ColoredCoinError::InvalidSpend(format!("{} output out of range", color)))?;
        let primary_conditions = if output > 0 {
            vec![Condition::CreateOutput { puzzle_hash: self.get_new_puzzle_hash()?, amount: output }]
        } else {
            Vec::new()
        };

        Ok(ColoredLeg { core, inputs, output, primary_conditions, primary_role, eve, mint })
    }

    /// Standard spends changing base holdings by `delta`; the first coin also
    /// carries `extra` conditions, the others are tied to it
    fn base_spends(
        &mut self,
        records: &[UncoloredRecord],
        delta: i128,
        extra: Vec<Condition>,
    ) -> Result<Vec<CoinSpend>> {
        let Some(primary) = records.first() else {
            return Ok(Vec::new());
        };
        let input: u128 = records.iter().map(|record| record.coin.amount as u128).sum();
        let change = u64::try_from(input as i128 + delta)
            .map_err(|_| ColoredCoinError::InvalidSpend("base output out of range".to_string()))?;
        let mut conditions = Vec::with_capacity(extra.len() + 1);
        if change > 0 {
            let puzzle_hash = self.get_new_puzzle_hash()?;
            conditions.push(Condition::CreateOutput { puzzle_hash, amount: change });
        }
        conditions.extend(extra);

        let primary_id = primary.coin.id();
        let mut spends = vec![standard_spend(primary.coin, &primary.puzzle, &conditions)];
        for record in &records[1..] {
            let companion = [Condition::ConsumeCompanion(primary_id)];
            spends.push(standard_spend(record.coin, &record.puzzle, &companion));
        }
        Ok(spends)
    }

    /// Base coins for a leg changing base holdings by `base_delta`
    fn base_selection(&self, base_delta: i128, needs_coin: bool) -> Result<Vec<UncoloredRecord>> {
        if base_delta == 0 && !needs_coin {
            return Ok(Vec::new());
        }
        let needed = if base_delta < 0 { magnitude(base_delta)? } else { 0 };
        self.select_uncolored(needed, true)
    }

    /// Build a trade offer
    ///
    /// Each entry is the change in this wallet's holdings: negative gives,
    /// positive receives, `None` is base currency. Colored spends are left
    /// without auditor data; base spends are complete. Every offered coin is
    /// tied to the others with companion conditions, so an acceptor can take
    /// the offer only as a whole. Everything this wallet can sign is signed.
    pub fn create_trade_offer(&mut self, entries: &[(i64, Option<Color>)]) -> Result<TradeOffer> {
        let mut deltas: BTreeMap<Option<Color>, i128> = BTreeMap::new();
        for (amount, color) in entries {
            *deltas.entry(*color).or_default() += *amount as i128;
        }
        deltas.retain(|_, delta| *delta != 0);
        if deltas.is_empty() {
            return Err(ColoredCoinError::InvalidSpend("empty trade offer".to_string()));
        }
        for color in deltas.keys().flatten() {
            self.core(color)?;
        }

        let base_delta = deltas.remove(&None).unwrap_or(0);
        let colored: Vec<(Color, i128)> =
            deltas.into_iter().filter_map(|(color, d)| color.map(|c| (c, d))).collect();
        let needs_mint = colored.iter().any(|(color, delta)| *delta > 0 && !self.has_spendable(color));
        let base = self.base_selection(base_delta, needs_mint)?;
        let funding = base.first().map(|record| record.coin.id());

        let legs = colored
            .iter()
            .map(|(color, delta)| self.colored_leg(color, *delta, funding, Role::Aggregatee))
            .collect::<Result<Vec<_>>>()?;

        // Base coins lead the group, so the base primary is the anchor when present
        let group: Vec<CoinId> = base
            .iter()
            .map(|record| record.coin.id())
            .chain(legs.iter().flat_map(|leg| leg.coin_ids()))
            .collect();

        let max_cost = self.config.max_cost;
        let mut spends = Vec::new();
        let mut signature = AggregateSignature::default();
        let mut mints = Vec::new();
        let mut eves = Vec::new();
        for leg in legs {
            let requests = leg.requests(|coin_id| group_companions(&group, coin_id));
            spends.extend(build_incomplete_spends(&leg.core, &requests, max_cost)?);
            signature.merge(sign_requests(&self.keychain, &requests, max_cost)?);
            mints.extend(leg.mint);
            eves.extend(leg.eve.map(|eve| eve.spend));
        }

        if let Some(primary) = base.first() {
            mints.extend(group_companions(&group, &primary.coin.id()));
        }
        let mut complete = self.base_spends(&base, base_delta, mints)?;
        complete.extend(eves);
        signature.merge(sign_coin_spends(&self.keychain, &complete, max_cost)?);
        complete.extend(spends);

        info!(wallet = %self.config.name, spends = complete.len(), "created trade offer");
        Ok(TradeOffer::new(SpendBundle::new(complete, signature)))
    }

    /// Discrepancy per color: what an accepting wallet receives (positive) or gives
    pub fn inspect_trade_offer(&self, offer: &TradeOffer) -> Result<BTreeMap<Option<Color>, i64>> {
        offer.inspect(self.config.max_cost)
    }

    /// Complete `offer` with this wallet's coins and submit it
    ///
    /// For every color in the offer this wallet supplies the auditor, minting a
    /// zero-value coin when it holds none; base currency is balanced with an
    /// ordinary spend. Fails with `TradeIncomplete` when a side cannot be
    /// covered, leaving the offer untouched.
    pub fn accept_trade_offer(
        &mut self,
        ledger: &mut dyn LedgerApi,
        offer: &TradeOffer,
    ) -> Result<SpendBundle> {
        let max_cost = self.config.max_cost;
        let discrepancies = offer.inspect(max_cost)?;
        let parts = offer.parts(max_cost)?;
        for color in parts.incomplete.keys() {
            self.add_color(*color);
        }

        let incomplete_trade = |err: ColoredCoinError| match err {
            ColoredCoinError::InsufficientFunds { needed, available } => {
                ColoredCoinError::TradeIncomplete(format!("need {} more, have {}", needed, available))
            }
            other => other,
        };

        let base_delta = discrepancies.get(&None).copied().unwrap_or(0) as i128;
        let mut colors: BTreeMap<Color, i128> = parts.incomplete.keys().map(|color| (*color, 0)).collect();
        for (color, delta) in discrepancies.iter().filter_map(|(color, d)| color.map(|c| (c, *d))) {
            if delta != 0 {
                self.add_color(color);
                colors.insert(color, delta as i128);
            }
        }

        let needs_mint = colors.iter().any(|(color, delta)| *delta >= 0 && !self.has_spendable(color));
        let base = self.base_selection(base_delta, needs_mint).map_err(incomplete_trade)?;
        let funding = base.first().map(|record| record.coin.id());

        let mut audited = Vec::new();
        let mut signature = offer.bundle.aggregated_signature.clone();
        let mut mints = Vec::new();
        let mut eves = Vec::new();
        for (color, delta) in &colors {
            let leg = self.colored_leg(color, *delta, funding, Role::Auditor).map_err(incomplete_trade)?;
            let mut requests = leg.requests(|_| Vec::new());
            signature.merge(sign_requests(&self.keychain, &requests, max_cost)?);
            if let Some((_, offered)) = parts.incomplete.get(color) {
                requests.extend(offered.iter().cloned());
            }
            audited.extend(build_audited_spends(&leg.core, &requests, max_cost)?);
            mints.extend(leg.mint);
            eves.extend(leg.eve.map(|eve| eve.spend));
        }

        let mut own = self.base_spends(&base, base_delta, mints)?;
        own.extend(eves);
        signature.merge(sign_coin_spends(&self.keychain, &own, max_cost)?);

        let mut spends = parts.complete;
        spends.extend(own);
        spends.extend(audited);
        let bundle = SpendBundle::new(spends, signature);
        self.submit(ledger, &bundle)?;
        info!(wallet = %self.config.name, colors = colors.len(), "accepted trade offer");
        Ok(bundle)
    }

    /// Sign the signature demands `inner_puzzle` yields for `inner_solution`
    /// when spending `coin_id`
    pub fn sign_inner(
        &self,
        coin_id: &CoinId,
        inner_puzzle: &Program,
        inner_solution: &Program,
    ) -> Result<AggregateSignature> {
        let conditions = conditions_for_puzzle(inner_puzzle, inner_solution, self.config.max_cost)?;
        self.keychain.sign_conditions(coin_id, &conditions)
    }
}

//! Trade offers: partially built, partially signed bundles
//!
//! An offer carries complete base-currency and eve spends plus colored spends
//! without auditor data. The counterparty inspects the per-color discrepancy,
//! then completes the colored spends with an auditor of its own.

use crate::color::{Color, Core};
use crate::error::{ColoredCoinError, Result};
use crate::lineage::LineageProof;
use crate::script::{conditions_for_spend, output_total};
use crate::script_hash::parse_colored_puzzle;
use crate::spend::SpendRequest;
use crate::types::{CoinSpend, SpendBundle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A trade offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub bundle: SpendBundle,
}

/// An offer split into what can run as is and what awaits an auditor
#[derive(Debug, Clone)]
pub struct OfferParts {
    pub complete: Vec<CoinSpend>,
    pub incomplete: BTreeMap<Color, (Core, Vec<SpendRequest>)>,
}

impl TradeOffer {
    pub fn new(bundle: SpendBundle) -> Self {
        Self { bundle }
    }

    /// Hex-encoded JSON
    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// InspectOffer: 𝒮ℬ → (Color? → ℤ)
    pub fn inspect(&self, max_cost: u64) -> Result<BTreeMap<Option<Color>, i64>> {
        discrepancies(&self.bundle, max_cost)
    }

    /// Separate colored spends lacking an auditor from the rest
    pub fn parts(&self, max_cost: u64) -> Result<OfferParts> {
        let mut complete = Vec::new();
        let mut incomplete: BTreeMap<Color, (Core, Vec<SpendRequest>)> = BTreeMap::new();
        for spend in &self.bundle.coin_spends {
            if !awaits_auditor(spend)? {
                complete.push(spend.clone());
                continue;
            }
            let (core, request) = SpendRequest::from_coin_spend(spend, max_cost)?;
            incomplete.entry(core.color()).or_insert_with(|| (core, Vec::new())).1.push(request);
        }
        Ok(OfferParts { complete, incomplete })
    }
}

/// A colored spend in normal lineage form with nil auditor info
fn awaits_auditor(spend: &CoinSpend) -> Result<bool> {
    if parse_colored_puzzle(&spend.puzzle_reveal).is_none() {
        return Ok(false);
    }
    let lineage = LineageProof::from_program(spend.solution.nth(1)?)?;
    Ok(!lineage.is_eve() && spend.solution.nth(3)?.is_nil())
}

/// Σ(input − output) per color over every spend in `bundle`
///
/// Colored outputs are the declared outputs of the inner puzzles, so spends
/// still missing their auditor are measured too. `None` is base currency.
pub fn discrepancies(bundle: &SpendBundle, max_cost: u64) -> Result<BTreeMap<Option<Color>, i64>> {
    let mut totals: BTreeMap<Option<Color>, i128> = BTreeMap::new();
    for spend in &bundle.coin_spends {
        let (key, output) = if parse_colored_puzzle(&spend.puzzle_reveal).is_some() {
            let (core, request) = SpendRequest::from_coin_spend(spend, max_cost)?;
            (Some(core.color()), request.output_amount as i128)
        } else {
            (None, output_total(&conditions_for_spend(spend, max_cost)?) as i128)
        };
        *totals.entry(key).or_default() += spend.coin.amount as i128 - output;
    }
    totals
        .into_iter()
        .map(|(key, total)| {
            i64::try_from(total)
                .map(|total| (key, total))
                .map_err(|_| ColoredCoinError::InvalidSpend(format!("discrepancy {} out of range", total)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_COST;
    use crate::keys::AggregateSignature;
    use crate::program::Program;
    use crate::script::Condition;
    use crate::script_hash::colored_puzzle_hash;
    use crate::spend::{build_incomplete_spends, Role};
    use crate::standard::{puzzle_for_pk, solution_for_conditions, standard_spend};
    use crate::types::Coin;

    fn offer() -> (TradeOffer, Core) {
        let core = Core::for_color(Color([1; 32]));
        let inner = puzzle_for_pk(&[2; 33]);
        let lineage = LineageProof::Parent { parent_id: [4; 32], inner_puzzle_hash: [5; 32], amount: 1000 };
        let coin = Coin::new(
            lineage.parent_coin_id(&core.hash()),
            colored_puzzle_hash(&core.hash(), &inner.tree_hash()),
            1000,
        );
        let colored = SpendRequest::new(
            coin,
            inner.clone(),
            lineage,
            100,
            solution_for_conditions(&[Condition::CreateOutput { puzzle_hash: [6; 32], amount: 100 }]),
            Role::Aggregatee,
        );
        let base_coin = Coin::new([7; 32], inner.tree_hash(), 50);
        let output = [Condition::CreateOutput { puzzle_hash: [8; 32], amount: 150 }];
        let base = standard_spend(base_coin, &inner, &output);
        let mut spends = vec![base];
        spends.extend(build_incomplete_spends(&core, &[colored], MAX_COST).unwrap());
        (TradeOffer::new(SpendBundle::new(spends, AggregateSignature::default())), core)
    }

    #[test]
    fn test_inspect_reports_discrepancy_per_color() {
        let (offer, core) = offer();
        let report = offer.inspect(MAX_COST).unwrap();
        assert_eq!(report.get(&Some(core.color())), Some(&900));
        assert_eq!(report.get(&None), Some(&-100));
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_parts_split_incomplete_spends() {
        let (offer, core) = offer();
        let parts = offer.parts(MAX_COST).unwrap();
        assert_eq!(parts.complete.len(), 1);
        let (found, requests) = &parts.incomplete[&core.color()];
        assert_eq!(found, &core);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].output_amount, 100);
    }

    #[test]
    fn test_hex_roundtrip() {
        let (offer, _) = offer();
        let encoded = offer.to_hex().unwrap();
        assert_eq!(TradeOffer::from_hex(&encoded).unwrap(), offer);
        assert!(matches!(TradeOffer::from_hex("zz"), Err(ColoredCoinError::Serialization(_))));
        assert!(TradeOffer::from_hex(&hex::encode(b"{}")).is_err());
    }

    #[test]
    fn test_non_colored_spends_are_complete() {
        let inner = puzzle_for_pk(&[2; 33]);
        let spend = CoinSpend::new(Coin::new([0; 32], inner.tree_hash(), 1), inner, Program::nil());
        assert!(!awaits_auditor(&spend).unwrap());
    }
}

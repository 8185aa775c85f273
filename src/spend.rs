//! Auditor/aggregatee spend builder
//!
//! Every colored coin spent in one bundle names the same auditor. The auditor's
//! solution carries the full participant list and its core checks that inputs
//! and declared outputs balance; each aggregatee commits its declared output to
//! the auditor through an E-lock and requires the auditor's A-lock in return.
//! The zero-value lock coins are created and spent inside the same bundle.

use crate::color::Core;
use crate::error::{ColoredCoinError, Result};
use crate::keys::{AggregateSignature, Signer};
use crate::lineage::LineageProof;
use crate::program::Program;
use crate::script::{conditions_for_puzzle, output_total, Condition};
use crate::script_hash::{colored_puzzle, colored_puzzle_hash, parse_colored_puzzle};
use crate::standard::{a_lock_puzzle, a_lock_puzzle_hash, e_lock_puzzle, e_lock_puzzle_hash};
use crate::types::{hash_hex, Coin, CoinSpend, Hash};
use tracing::debug;

/// Role of a coin in an audited spend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Auditor,
    Aggregatee,
}

/// One colored coin to spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRequest {
    pub coin: Coin,
    pub inner_puzzle: Program,
    pub lineage: LineageProof,
    /// Total the inner solution creates; checked against the inner puzzle
    pub output_amount: u64,
    pub inner_solution: Program,
    pub role: Role,
}

impl SpendRequest {
    pub fn new(
        coin: Coin,
        inner_puzzle: Program,
        lineage: LineageProof,
        output_amount: u64,
        inner_solution: Program,
        role: Role,
    ) -> Self {
        Self { coin, inner_puzzle, lineage, output_amount, inner_solution, role }
    }

    /// Recover a request from a revealed colored spend, e.g. an incomplete
    /// trade-offer spend; the declared output is replayed from the inner puzzle
    pub fn from_coin_spend(spend: &CoinSpend, max_cost: u64) -> Result<(Core, SpendRequest)> {
        let (core, inner_puzzle) = parse_colored_puzzle(&spend.puzzle_reveal).ok_or_else(|| {
            ColoredCoinError::InvalidSpend(format!("coin {} is not colored", hash_hex(&spend.coin.id())))
        })?;
        let inner_solution = spend.solution.nth(0)?.clone();
        let lineage = LineageProof::from_program(spend.solution.nth(1)?)?;
        let conditions = conditions_for_puzzle(&inner_puzzle, &inner_solution, max_cost)?;
        let output_amount = declared_output(&conditions)?;
        let request = SpendRequest {
            coin: spend.coin,
            inner_puzzle,
            lineage,
            output_amount,
            inner_solution,
            role: Role::Aggregatee,
        };
        Ok((core, request))
    }

    pub fn inner_puzzle_hash(&self) -> Hash {
        self.inner_puzzle.tree_hash()
    }

    /// Conditions the inner puzzle yields for this request
    pub fn inner_conditions(&self, max_cost: u64) -> Result<Vec<Condition>> {
        conditions_for_puzzle(&self.inner_puzzle, &self.inner_solution, max_cost)
    }

    fn entry(&self) -> AggregateeEntry {
        AggregateeEntry {
            parent_id: self.coin.parent_id,
            inner_puzzle_hash: self.inner_puzzle_hash(),
            amount: self.coin.amount,
            output: self.output_amount,
        }
    }
}

/// Participant record in the auditor's list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateeEntry {
    pub parent_id: Hash,
    pub inner_puzzle_hash: Hash,
    pub amount: u64,
    pub output: u64,
}

impl AggregateeEntry {
    pub fn to_program(&self) -> Program {
        Program::list([
            Program::atom(self.parent_id.to_vec()),
            Program::atom(self.inner_puzzle_hash.to_vec()),
            Program::uint(self.amount),
            Program::uint(self.output),
        ])
    }
}

fn declared_output(conditions: &[Condition]) -> Result<u64> {
    u64::try_from(output_total(conditions))
        .map_err(|_| ColoredCoinError::InvalidSpend("declared output overflows".to_string()))
}

/// Auditor identity as the core expects it: `(parent_id inner_hash amount)`
fn auditor_info(auditor: &SpendRequest) -> Program {
    Program::list([
        Program::atom(auditor.coin.parent_id.to_vec()),
        Program::atom(auditor.inner_puzzle_hash().to_vec()),
        Program::uint(auditor.coin.amount),
    ])
}

/// Full colored solution: `(inner_solution parent_info my_amount auditor_info aggregatees)`
pub fn colored_solution(
    inner_solution: &Program,
    lineage: &LineageProof,
    amount: u64,
    auditor_info: Program,
    aggregatees: Program,
) -> Program {
    Program::list([
        inner_solution.clone(),
        lineage.to_program(),
        Program::uint(amount),
        auditor_info,
        aggregatees,
    ])
}

/// Check that every request belongs to `core` and declares what its inner
/// puzzle actually creates
fn validate_requests(core: &Core, requests: &[SpendRequest], max_cost: u64) -> Result<()> {
    if requests.is_empty() {
        return Err(ColoredCoinError::InvalidSpend("no coins to spend".to_string()));
    }
    for request in requests {
        let expected = colored_puzzle_hash(&core.hash(), &request.inner_puzzle_hash());
        if request.coin.puzzle_hash != expected {
            return Err(ColoredCoinError::InvalidSpend(format!(
                "coin {} is not a {} coin with this inner puzzle",
                hash_hex(&request.coin.id()),
                core.color()
            )));
        }
        let declared = declared_output(&request.inner_conditions(max_cost)?)?;
        if declared != request.output_amount {
            return Err(ColoredCoinError::InvalidSpend(format!(
                "coin {} declares {} but its inner solution creates {}",
                hash_hex(&request.coin.id()),
                request.output_amount,
                declared
            )));
        }
    }
    Ok(())
}

/// AuditedSpend: 𝒦 × ℛ⁺ → 𝒞𝒮*
///
/// For requests of one color with exactly one [`Role::Auditor`]:
/// 1. Validate puzzle hashes and declared outputs
/// 2. Give the auditor the full participant list, auditor first
/// 3. Give every request the auditor's identity
/// 4. Synthesize the E-lock and A-lock spends for every aggregatee
///
/// Conservation is not checked here; the auditor's core enforces it on the
/// ledger.
pub fn build_audited_spends(core: &Core, requests: &[SpendRequest], max_cost: u64) -> Result<Vec<CoinSpend>> {
    validate_requests(core, requests, max_cost)?;
    let auditors: Vec<&SpendRequest> = requests.iter().filter(|r| r.role == Role::Auditor).collect();
    let auditor = match auditors.as_slice() {
        [auditor] => *auditor,
        other => {
            return Err(ColoredCoinError::InvalidSpend(format!(
                "expected exactly one auditor, found {}",
                other.len()
            )))
        }
    };
    let aggregatees: Vec<&SpendRequest> = requests.iter().filter(|r| r.role == Role::Aggregatee).collect();
    let auditor_id = auditor.coin.id();

    let entries = std::iter::once(auditor).chain(aggregatees.iter().copied()).map(|r| r.entry().to_program());
    let participant_list = Program::list(entries);

    let puzzle = |request: &SpendRequest| colored_puzzle(core, &request.inner_puzzle);
    let mut spends = Vec::with_capacity(1 + aggregatees.len() * 3);
    spends.push(CoinSpend::new(
        auditor.coin,
        puzzle(auditor),
        colored_solution(
            &auditor.inner_solution,
            &auditor.lineage,
            auditor.coin.amount,
            auditor_info(auditor),
            participant_list,
        ),
    ));

    for aggregatee in &aggregatees {
        let aggregatee_id = aggregatee.coin.id();
        spends.push(CoinSpend::new(
            aggregatee.coin,
            puzzle(aggregatee),
            colored_solution(
                &aggregatee.inner_solution,
                &aggregatee.lineage,
                aggregatee.coin.amount,
                auditor_info(auditor),
                Program::nil(),
            ),
        ));
        let e_lock = Coin::new(aggregatee_id, e_lock_puzzle_hash(&auditor_id, aggregatee.output_amount), 0);
        let puzzle = e_lock_puzzle(&auditor_id, aggregatee.output_amount);
        spends.push(CoinSpend::new(e_lock, puzzle, Program::nil()));
        let a_lock = Coin::new(auditor_id, a_lock_puzzle_hash(&aggregatee_id), 0);
        spends.push(CoinSpend::new(a_lock, a_lock_puzzle(&aggregatee_id), Program::nil()));
    }

    debug!(
        color = %core.color(),
        auditor = %hash_hex(&auditor_id),
        aggregatees = aggregatees.len(),
        "built audited spend"
    );
    Ok(spends)
}

/// Spends without auditor data, as placed in a trade offer
///
/// They cannot be accepted on their own; the accepting wallet retrofits the
/// auditor with [`build_audited_spends`].
pub fn build_incomplete_spends(
    core: &Core,
    requests: &[SpendRequest],
    max_cost: u64,
) -> Result<Vec<CoinSpend>> {
    validate_requests(core, requests, max_cost)?;
    Ok(requests
        .iter()
        .map(|request| {
            CoinSpend::new(
                request.coin,
                colored_puzzle(core, &request.inner_puzzle),
                colored_solution(
                    &request.inner_solution,
                    &request.lineage,
                    request.coin.amount,
                    Program::nil(),
                    Program::nil(),
                ),
            )
        })
        .collect())
}

/// Sign the inner conditions of each request
pub fn sign_requests<'a>(
    signer: &dyn Signer,
    requests: impl IntoIterator<Item = &'a SpendRequest>,
    max_cost: u64,
) -> Result<AggregateSignature> {
    let mut aggregate = AggregateSignature::default();
    for request in requests {
        aggregate.merge(signer.sign_conditions(&request.coin.id(), &request.inner_conditions(max_cost)?)?);
    }
    Ok(aggregate)
}

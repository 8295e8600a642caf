//! Policy decoder - raw network output to one action command
//!
//! Every index, threshold and scaling constant comes from [`DecoderConfig`].

use std::ops::Range;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::action::ActionCommand;
use crate::state::{GameStateSnapshot, TradeOffer};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Output indices of the free-turn candidate block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateIndices {
    pub jail_use_card: usize,
    pub jail_pay_fine: usize,
    pub jail_roll_double: usize,
    pub buy: usize,
    pub build: usize,
    pub propose_trade: usize,
}

impl Default for CandidateIndices {
    fn default() -> Self {
        Self {
            jail_use_card: 0,
            jail_pay_fine: 1,
            jail_roll_double: 2,
            buy: 3,
            build: 4,
            propose_trade: 5,
        }
    }
}

/// Acceptance thresholds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub jail: f32,
    pub buy: f32,
    pub build: f32,
    pub propose_trade: f32,
    pub respond_trade: f32,
    /// Per-slot cutoff for a property to join a trade proposal
    pub trade_property_cutoff: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            jail: 0.5,
            buy: 0.5,
            build: 0.7,
            propose_trade: 0.5,
            respond_trade: 0.5,
            trade_property_cutoff: 0.75,
        }
    }
}

impl Thresholds {
    /// Later-schema thresholds: buy and trade responses need 0.7
    pub fn strict() -> Self {
        Self {
            buy: 0.7,
            respond_trade: 0.7,
            ..Default::default()
        }
    }
}

/// Auction bid scaling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionRule {
    /// Fraction of the purchase price scaled by the output value
    pub price_fraction: f32,
    /// Cap as a fraction of current cash
    pub cash_fraction: f32,
    pub min_bid: u32,
    /// Output value must exceed this to bid at all
    pub min_signal: f32,
}

impl Default for AuctionRule {
    fn default() -> Self {
        Self {
            price_fraction: 0.8,
            cash_fraction: 0.3,
            min_bid: 10,
            min_signal: 0.3,
        }
    }
}

/// Full decoder configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub candidates: CandidateIndices,
    pub thresholds: Thresholds,
    pub auction: AuctionRule,
    /// Output read when deciding in jail
    pub jail_index: usize,
    /// Output read when landing on an unowned property
    pub landed_buy_index: usize,
    pub auction_index: usize,
    pub respond_trade_index: usize,
    /// One score per developable street slot
    pub build_range: Range<usize>,
    /// One score per board property slot
    pub trade_range: Range<usize>,
    /// Cash needed to pay the jail fine
    pub jail_fine: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            candidates: CandidateIndices::default(),
            thresholds: Thresholds::default(),
            auction: AuctionRule::default(),
            jail_index: 0,
            landed_buy_index: 3,
            auction_index: 6,
            respond_trade_index: 7,
            build_range: 8..30,
            trade_range: 30..58,
            jail_fine: 50,
        }
    }
}

impl DecoderConfig {
    /// Minimum output length that covers every configured index
    pub fn output_len(&self) -> usize {
        let c = &self.candidates;
        [
            c.jail_use_card + 1,
            c.jail_pay_fine + 1,
            c.jail_roll_double + 1,
            c.buy + 1,
            c.build + 1,
            c.propose_trade + 1,
            self.jail_index + 1,
            self.landed_buy_index + 1,
            self.auction_index + 1,
            self.respond_trade_index + 1,
            self.build_range.end,
            self.trade_range.end,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

// ============================================================================
// DECISION CONTEXT
// ============================================================================

/// What the engine is asking for
#[derive(Clone, Copy, Debug)]
pub enum DecisionContext<'a> {
    FreeTurn,
    InJail,
    LandedOnUnownedProperty { property_id: u32 },
    AuctionBid { property_id: u32 },
    IncomingTradeOffer { offer: &'a TradeOffer },
}

impl DecisionContext<'_> {
    /// Offer to feed the encoder's trade block
    pub fn trade_offer(&self) -> Option<&TradeOffer> {
        match self {
            DecisionContext::IncomingTradeOffer { offer } => Some(*offer),
            _ => None,
        }
    }
}

/// A decision request: snapshot, deciding player and context
#[derive(Clone, Copy, Debug)]
pub struct Decision<'a> {
    pub state: &'a GameStateSnapshot,
    pub focus: u32,
    pub context: DecisionContext<'a>,
}

impl<'a> Decision<'a> {
    pub fn new(state: &'a GameStateSnapshot, focus: u32, context: DecisionContext<'a>) -> Self {
        Self { state, focus, context }
    }
}

/// Free-turn candidates in priority order (earlier wins ties)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Candidate {
    JailUseCard,
    JailPayFine,
    JailRollDouble,
    Buy,
    Build,
    ProposeTrade,
}

impl Candidate {
    pub const PRIORITY: [Candidate; 6] = [
        Candidate::JailUseCard,
        Candidate::JailPayFine,
        Candidate::JailRollDouble,
        Candidate::Buy,
        Candidate::Build,
        Candidate::ProposeTrade,
    ];
}

// ============================================================================
// DECODER
// ============================================================================

/// Turns raw policy output into an [`ActionCommand`]
#[derive(Clone, Debug, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one action. Never fails: anything unusable becomes `EndTurn`.
    pub fn decide(&self, output: &[f32], decision: &Decision<'_>) -> ActionCommand {
        match decision.context {
            DecisionContext::FreeTurn => self.free_turn(output, decision),
            DecisionContext::InJail => self.in_jail(output, decision),
            DecisionContext::LandedOnUnownedProperty { property_id } => {
                self.landed(output, decision, property_id)
            }
            DecisionContext::AuctionBid { property_id } => self.auction(output, decision, property_id),
            DecisionContext::IncomingTradeOffer { .. } => {
                let score = read(output, self.config.respond_trade_index);
                ActionCommand::RespondTrade(score > self.config.thresholds.respond_trade)
            }
        }
    }

    /// Highest-scoring free-turn candidate, ties to the earliest in priority order
    pub fn select_candidate(&self, output: &[f32]) -> (Candidate, f32) {
        let mut best = (Candidate::PRIORITY[0], self.candidate_score(output, Candidate::PRIORITY[0]));
        for &candidate in &Candidate::PRIORITY[1..] {
            let score = self.candidate_score(output, candidate);
            if score > best.1 {
                best = (candidate, score);
            }
        }
        best
    }

    fn candidate_score(&self, output: &[f32], candidate: Candidate) -> f32 {
        let idx = &self.config.candidates;
        let index = match candidate {
            Candidate::JailUseCard => idx.jail_use_card,
            Candidate::JailPayFine => idx.jail_pay_fine,
            Candidate::JailRollDouble => idx.jail_roll_double,
            Candidate::Buy => idx.buy,
            Candidate::Build => idx.build,
            Candidate::ProposeTrade => idx.propose_trade,
        };
        read(output, index)
    }

    fn threshold(&self, candidate: Candidate) -> f32 {
        let t = &self.config.thresholds;
        match candidate {
            Candidate::JailUseCard | Candidate::JailPayFine | Candidate::JailRollDouble => t.jail,
            Candidate::Buy => t.buy,
            Candidate::Build => t.build,
            Candidate::ProposeTrade => t.propose_trade,
        }
    }

    fn free_turn(&self, output: &[f32], decision: &Decision<'_>) -> ActionCommand {
        let (candidate, score) = self.select_candidate(output);
        if score <= self.threshold(candidate) {
            return ActionCommand::EndTurn;
        }

        match candidate {
            Candidate::JailUseCard => ActionCommand::JailUseCard,
            Candidate::JailPayFine => ActionCommand::JailPayFine,
            Candidate::JailRollDouble => ActionCommand::JailRollDouble,
            Candidate::Buy => ActionCommand::BuyDecision(true),
            Candidate::Build => ActionCommand::BuildHouses(self.build_slot(output)),
            Candidate::ProposeTrade => self
                .propose_trade(output, decision.state, decision.focus)
                .unwrap_or(ActionCommand::EndTurn),
        }
    }

    /// Index of the best build score within the build range (first on ties)
    pub fn build_slot(&self, output: &[f32]) -> usize {
        let mut best_slot = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (slot, index) in self.config.build_range.clone().enumerate() {
            let score = read(output, index);
            if score > best_score {
                best_slot = slot;
                best_score = score;
            }
        }
        best_slot
    }

    /// Build a property-only trade proposal from the trade range
    ///
    /// Slot `i` of the range scores `state.properties[i]`. Qualifying
    /// properties are split by owner; the opponent with the highest mean
    /// qualifying score becomes the partner (lowest index on ties).
    /// Returns `None` when either side of the offer would be empty.
    pub fn propose_trade(
        &self,
        output: &[f32],
        state: &GameStateSnapshot,
        focus: u32,
    ) -> Option<ActionCommand> {
        let cutoff = self.config.thresholds.trade_property_cutoff;

        let mut give = Vec::new();
        let mut by_owner: FxHashMap<u32, (Vec<u32>, f32)> = FxHashMap::default();
        for (slot, index) in self.config.trade_range.clone().enumerate() {
            let score = read(output, index);
            if score <= cutoff {
                continue;
            }
            let Some(prop) = state.properties.get(slot) else {
                continue;
            };
            match prop.owner {
                Some(owner) if owner == focus => give.push(prop.property_id),
                Some(owner) => {
                    let entry = by_owner.entry(owner).or_default();
                    entry.0.push(prop.property_id);
                    entry.1 += score;
                }
                None => {}
            }
        }

        let mut partner: Option<(u32, f32)> = None;
        for (&owner, (ids, total)) in &by_owner {
            let mean = total / ids.len() as f32;
            let better = match partner {
                None => true,
                Some((best_owner, best_mean)) => {
                    mean > best_mean || (mean == best_mean && owner < best_owner)
                }
            };
            if better {
                partner = Some((owner, mean));
            }
        }

        let (partner, _) = partner?;
        let take = by_owner.remove(&partner).map(|(ids, _)| ids).unwrap_or_default();
        if give.is_empty() || take.is_empty() {
            return None;
        }

        Some(ActionCommand::ProposeTrade { partner, give, take })
    }

    fn in_jail(&self, output: &[f32], decision: &Decision<'_>) -> ActionCommand {
        let score = read(output, self.config.jail_index);
        if score <= self.config.thresholds.jail {
            return ActionCommand::JailRollDouble;
        }

        match decision.state.player(decision.focus) {
            Some(p) if p.jail_free_cards > 0 => ActionCommand::JailUseCard,
            Some(p) if p.cash >= self.config.jail_fine => ActionCommand::JailPayFine,
            _ => ActionCommand::JailRollDouble,
        }
    }

    fn landed(&self, output: &[f32], decision: &Decision<'_>, property_id: u32) -> ActionCommand {
        let score = read(output, self.config.landed_buy_index);
        let affordable = match (
            decision.state.player(decision.focus),
            decision.state.property_by_id(property_id),
        ) {
            (Some(player), Some(prop)) => player.cash >= prop.purchase_price,
            _ => false,
        };
        ActionCommand::BuyDecision(affordable && score > self.config.thresholds.buy)
    }

    fn auction(&self, output: &[f32], decision: &Decision<'_>, property_id: u32) -> ActionCommand {
        let value = read(output, self.config.auction_index);
        let (Some(player), Some(prop)) = (
            decision.state.player(decision.focus),
            decision.state.property_by_id(property_id),
        ) else {
            return ActionCommand::EndTurn;
        };

        match auction_bid(&self.config.auction, prop.purchase_price, player.cash, value) {
            Some(bid) => ActionCommand::AuctionBid(bid),
            None => ActionCommand::EndTurn,
        }
    }
}

/// `min(price * value * price_fraction, cash * cash_fraction)`, if worth bidding
pub fn auction_bid(rule: &AuctionRule, price: u32, cash: u32, value: f32) -> Option<u32> {
    if value <= rule.min_signal {
        return None;
    }
    let offered = price as f64 * value as f64 * rule.price_fraction as f64;
    let cap = cash as f64 * rule.cash_fraction as f64;
    let bid = offered.min(cap).floor();
    if bid >= rule.min_bid as f64 {
        Some(bid as u32)
    } else {
        None
    }
}

/// Output value at `index`; missing or non-finite entries read as zero
fn read(output: &[f32], index: usize) -> f32 {
    match output.get(index) {
        Some(v) if v.is_finite() => *v,
        _ => 0.0,
    }
}

//! Policies - scripted baseline and network-driven decisions
//!
//! Both implement [`Policy`], so drivers can seat either kind of player
//! without caring where the action comes from.

use crate::action::ActionCommand;
use crate::decoder::{Decision, DecisionContext, Decoder, DecoderConfig};
use crate::encoder::{Encoder, EncoderSchema};

/// Anything that turns a decision request into an action
pub trait Policy {
    fn decide(&mut self, decision: &Decision<'_>) -> ActionCommand;

    fn name(&self) -> &str;
}

// ============================================================================
// SCRIPTED BASELINE
// ============================================================================

/// Fixed heuristic player used as a network-less opponent
#[derive(Clone, Debug)]
pub struct ScriptedPolicy {
    /// Buy only when cash exceeds `price * buy_margin`
    pub buy_margin: f64,
    /// Fraction of the purchase price bid in auctions
    pub bid_fraction: f64,
    pub jail_fine: u32,
}

impl Default for ScriptedPolicy {
    fn default() -> Self {
        Self {
            buy_margin: 1.5,
            bid_fraction: 0.5,
            jail_fine: 50,
        }
    }
}

impl Policy for ScriptedPolicy {
    fn decide(&mut self, decision: &Decision<'_>) -> ActionCommand {
        let state = decision.state;
        let Some(player) = state.player(decision.focus) else {
            return ActionCommand::EndTurn;
        };

        match decision.context {
            DecisionContext::FreeTurn => ActionCommand::EndTurn,
            DecisionContext::InJail => {
                if player.jail_free_cards > 0 {
                    ActionCommand::JailUseCard
                } else if player.cash >= self.jail_fine {
                    ActionCommand::JailPayFine
                } else {
                    ActionCommand::JailRollDouble
                }
            }
            DecisionContext::LandedOnUnownedProperty { property_id } => {
                let buy = state
                    .property_by_id(property_id)
                    .map(|p| player.cash as f64 > p.purchase_price as f64 * self.buy_margin)
                    .unwrap_or(false);
                ActionCommand::BuyDecision(buy)
            }
            DecisionContext::AuctionBid { property_id } => match state.property_by_id(property_id) {
                Some(p) if player.cash > p.purchase_price => {
                    let bid = (p.purchase_price as f64 * self.bid_fraction).floor() as u32;
                    if bid > 0 {
                        ActionCommand::AuctionBid(bid)
                    } else {
                        ActionCommand::EndTurn
                    }
                }
                _ => ActionCommand::EndTurn,
            },
            DecisionContext::IncomingTradeOffer { offer } => {
                let (received, given) = offer.sides_for(decision.focus);
                ActionCommand::RespondTrade(received.cash > given.cash)
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// NETWORK-DRIVEN POLICY
// ============================================================================

/// Encoder, an opaque network closure and a decoder chained together
pub struct DecodedPolicy<F> {
    name: String,
    encoder: Encoder,
    decoder: Decoder,
    network: F,
}

impl<F> DecodedPolicy<F>
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    pub fn new(name: impl Into<String>, network: F) -> Self {
        Self {
            name: name.into(),
            encoder: Encoder::default(),
            decoder: Decoder::default(),
            network,
        }
    }

    pub fn with_schema(mut self, schema: EncoderSchema) -> Self {
        self.encoder = Encoder::new(schema);
        self
    }

    pub fn with_decoder(mut self, config: DecoderConfig) -> Self {
        self.decoder = Decoder::new(config);
        self
    }
}

impl<F> Policy for DecodedPolicy<F>
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    fn decide(&mut self, decision: &Decision<'_>) -> ActionCommand {
        let features = self.encoder.encode(
            decision.state,
            decision.focus,
            decision.context.trade_offer(),
        );
        let output = (self.network)(features.as_slice());
        let action = self.decoder.decide(&output, decision);
        tracing::trace!(policy = %self.name, action = action.name(), "decided");
        action
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::small_board;
    use crate::state::{TradeOffer, TradeSide};

    #[test]
    fn test_scripted_buy_margin() {
        let mut state = small_board();
        let mut policy = ScriptedPolicy::default();
        let ctx = DecisionContext::LandedOnUnownedProperty { property_id: 5 };

        // 1500 > 200 * 1.5
        assert_eq!(policy.decide(&Decision::new(&state, 0, ctx)), ActionCommand::BuyDecision(true));

        state.players[0].cash = 300;
        assert_eq!(policy.decide(&Decision::new(&state, 0, ctx)), ActionCommand::BuyDecision(false));
    }

    #[test]
    fn test_scripted_auction_and_jail() {
        let mut state = small_board();
        let mut policy = ScriptedPolicy::default();

        let bid = policy.decide(&Decision::new(&state, 0, DecisionContext::AuctionBid { property_id: 4 }));
        assert_eq!(bid, ActionCommand::AuctionBid(60));

        state.players[0].cash = 40;
        let jail = policy.decide(&Decision::new(&state, 0, DecisionContext::InJail));
        assert_eq!(jail, ActionCommand::JailRollDouble);

        state.players[0].jail_free_cards = 1;
        let jail = policy.decide(&Decision::new(&state, 0, DecisionContext::InJail));
        assert_eq!(jail, ActionCommand::JailUseCard);
    }

    #[test]
    fn test_scripted_rejects_trades_without_cash() {
        let state = small_board();
        let mut policy = ScriptedPolicy::default();
        let mut offer = TradeOffer {
            player_to_offer: 0,
            offer_from: TradeSide { cash: 0, properties: vec![2], jail_cards: 0 },
            offer_to: TradeSide { cash: 0, properties: vec![0], jail_cards: 0 },
        };

        let ctx = DecisionContext::IncomingTradeOffer { offer: &offer };
        assert_eq!(policy.decide(&Decision::new(&state, 0, ctx)), ActionCommand::RespondTrade(false));

        offer.offer_from.cash = 100;
        let ctx = DecisionContext::IncomingTradeOffer { offer: &offer };
        assert_eq!(policy.decide(&Decision::new(&state, 0, ctx)), ActionCommand::RespondTrade(true));
    }

    #[test]
    fn test_decoded_policy_feeds_encoded_state() {
        let state = small_board();
        let mut seen_len = 0;
        {
            let mut policy = DecodedPolicy::new("net", |input: &[f32]| {
                seen_len = input.len();
                let mut out = vec![0.0; 8];
                out[3] = 0.9;
                out
            })
            .with_schema(EncoderSchema::Compact);

            let ctx = DecisionContext::LandedOnUnownedProperty { property_id: 5 };
            let action = policy.decide(&Decision::new(&state, 0, ctx));
            assert_eq!(action, ActionCommand::BuyDecision(true));
            assert_eq!(policy.name(), "net");
        }
        assert_eq!(seen_len, EncoderSchema::Compact.len());
    }

    #[test]
    fn test_policies_share_trait() {
        let state = small_board();
        let mut seats: Vec<Box<dyn Policy>> = vec![
            Box::new(ScriptedPolicy::default()),
            Box::new(DecodedPolicy::new("silent", |_: &[f32]| Vec::<f32>::new())),
        ];
        for policy in seats.iter_mut() {
            let action = policy.decide(&Decision::new(&state, 0, DecisionContext::FreeTurn));
            assert_eq!(action, ActionCommand::EndTurn);
        }
    }
}

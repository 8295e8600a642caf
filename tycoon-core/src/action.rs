//! Action commands returned to the engine, one per decision

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::{TradeOffer, TradeSide};

/// Engine action tags (agent ABI order)
pub mod wire {
    pub const LANDED_PROPERTY: u32 = 0;
    pub const TRADE: u32 = 1;
    pub const TRADE_RESPONSE: u32 = 2;
    pub const DEVELOP: u32 = 5;
    pub const AUCTION_BID: u32 = 7;
    pub const END_TURN: u32 = 8;
    pub const PAY_JAIL_FINE: u32 = 9;
    pub const USE_JAIL_CARD: u32 = 10;
    pub const JAIL_ROLL_DOUBLE: u32 = 11;
}

/// A single decision handed back to the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCommand {
    EndTurn,
    BuyDecision(bool),
    ProposeTrade {
        partner: u32,
        /// Property ids the focus player hands over
        give: Vec<u32>,
        /// Property ids requested from the partner
        take: Vec<u32>,
    },
    RespondTrade(bool),
    AuctionBid(u32),
    JailUseCard,
    JailPayFine,
    JailRollDouble,
    /// Slot index within the developable-property range
    BuildHouses(usize),
}

impl ActionCommand {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ActionCommand::EndTurn => "end_turn",
            ActionCommand::BuyDecision(_) => "buy_decision",
            ActionCommand::ProposeTrade { .. } => "propose_trade",
            ActionCommand::RespondTrade(_) => "respond_trade",
            ActionCommand::AuctionBid(_) => "auction_bid",
            ActionCommand::JailUseCard => "jail_use_card",
            ActionCommand::JailPayFine => "jail_pay_fine",
            ActionCommand::JailRollDouble => "jail_roll_double",
            ActionCommand::BuildHouses(_) => "build_houses",
        }
    }

    /// Property-only trade offer for a `ProposeTrade` command
    pub fn trade_offer(&self) -> Option<TradeOffer> {
        match self {
            ActionCommand::ProposeTrade { partner, give, take } => Some(TradeOffer {
                player_to_offer: *partner,
                offer_from: TradeSide {
                    cash: 0,
                    properties: give.clone(),
                    jail_cards: 0,
                },
                offer_to: TradeSide {
                    cash: 0,
                    properties: take.clone(),
                    jail_cards: 0,
                },
            }),
            _ => None,
        }
    }

    /// Engine action JSON (`action_type` plus the variant's payload)
    pub fn to_wire(&self) -> Value {
        match self {
            ActionCommand::EndTurn => json!({ "action_type": wire::END_TURN }),
            ActionCommand::BuyDecision(buy) => json!({
                "action_type": wire::LANDED_PROPERTY,
                "buying_property": buy,
            }),
            ActionCommand::ProposeTrade { .. } => json!({
                "action_type": wire::TRADE,
                "trade_offer": self.trade_offer(),
            }),
            ActionCommand::RespondTrade(accept) => json!({
                "action_type": wire::TRADE_RESPONSE,
                "trade_response": accept,
            }),
            ActionCommand::AuctionBid(amount) => json!({
                "action_type": wire::AUCTION_BID,
                "auction_bid": amount,
            }),
            ActionCommand::JailUseCard => json!({ "action_type": wire::USE_JAIL_CARD }),
            ActionCommand::JailPayFine => json!({ "action_type": wire::PAY_JAIL_FINE }),
            ActionCommand::JailRollDouble => json!({ "action_type": wire::JAIL_ROLL_DOUBLE }),
            ActionCommand::BuildHouses(slot) => json!({
                "action_type": wire::DEVELOP,
                "property_position": slot,
            }),
        }
    }
}

//! State encoder - game snapshot to a fixed-length feature vector
//!
//! ## Layout
//!
//! Every position has a fixed meaning. Values are divided by the constants
//! in [`norm`]; the assembled layout is then zero-padded or truncated to
//! the schema length.
//!
//! | Offset | Field | Divisor |
//! |---|---|---|
//! | 0 | focus cash | `CASH` |
//! | 1 | focus board position | `BOARD` |
//! | 2 | in jail | 1 |
//! | 3 | turns in jail | `JAIL_TURNS` |
//! | 4 | jail-free cards | `JAIL_CARDS` |
//! | 5 | railroads owned | `RAILROADS` |
//! | 6 | utilities owned | `UTILITIES` |
//! | 7..16 | owned count per colour slot | `COLOUR_GROUP` |
//! | 16 | houses owned | `HOUSES` |
//! | 17 | hotels owned | `HOTELS` |
//! | 18 | owned purchase value | `PORTFOLIO_VALUE` |
//! | 19 | opponents mean cash | `CASH` |
//! | 20 | opponents mean property count | `PROPERTIES` |
//! | 21 | opponents max cash | `CASH` |
//! | 22 | active opponents | `OPPONENTS` |
//! | 23 | unowned properties | `PROPERTIES` |
//! | 24 | houses remaining | `HOUSES` |
//! | 25 | hotels remaining | `HOTELS` |
//! | 26 | wealth share (cash / total cash) | 1 |
//! | 27 | debt ratio (owed / (owed + cash)) | 1 |
//! | 32 | current tile colour id | `COLOUR_ID` |
//! | 33..36 | type one-hot (street, utility, railroad) | 1 |
//! | 36 | owned | 1 |
//! | 37 | owned by focus | 1 |
//! | 38 | monopoly progress | 1 |
//! | 39..45 | rent ladder (0..4 houses, hotel) | `RENT` |
//! | 45 | houses | `MAX_HOUSES` |
//! | 46 | hotel | 1 |
//! | 47 | mortgaged | 1 |
//! | 48 | affordability (price / cash) | 1 |
//! | 49 | cash after purchase | `CASH` |
//! | 56 | monopolies owned | `COLOUR_GROUPS` |
//! | 57 | monopoly purchase value | `PORTFOLIO_VALUE` |
//! | 58 | monopoly streets below hotel | `STREETS` |
//! | 59 | max houses on a monopoly | `HOTEL_LEVEL` |
//! | 60 | house stock available | 1 |
//! | 100 | trade cash delta | `CASH` |
//! | 101, 102 | properties received / given | `TRADE_PROPERTIES` |
//! | 103, 104 | value received / given | `TRADE_VALUE` |
//! | 105 | railroads received | `RAILROADS` |
//! | 106 | utilities received | `UTILITIES` |
//! | 107 | monopoly completions | 1 |
//! | 108, 109 | jail cards received / given | `JAIL_CARDS` |
//! | 110 | receiving cash | 1 |
//! | 111 | receiving more properties | 1 |
//! | 112 | completes a monopoly | 1 |

use serde::{Deserialize, Serialize};

use crate::state::{
    GameStateSnapshot, PlayerState, PropertyKind, PropertyState, TradeOffer, BOARD_SIZE,
    HOTEL_LEVEL, MAX_HOUSES, NUM_COLOUR_SLOTS, STREET_COLOURS,
};

/// Normalization divisors
pub mod norm {
    pub const CASH: f32 = 2000.0;
    pub const BOARD: f32 = super::BOARD_SIZE as f32;
    pub const JAIL_TURNS: f32 = 3.0;
    pub const JAIL_CARDS: f32 = 2.0;
    pub const RAILROADS: f32 = 4.0;
    pub const UTILITIES: f32 = 2.0;
    pub const COLOUR_GROUP: f32 = 3.0;
    pub const HOUSES: f32 = 32.0;
    pub const HOTELS: f32 = 12.0;
    pub const PORTFOLIO_VALUE: f32 = 10000.0;
    pub const PROPERTIES: f32 = 28.0;
    pub const OPPONENTS: f32 = 3.0;
    pub const COLOUR_ID: f32 = 8.0;
    pub const RENT: f32 = 2000.0;
    pub const COLOUR_GROUPS: f32 = 8.0;
    pub const STREETS: f32 = 22.0;
    pub const TRADE_PROPERTIES: f32 = 5.0;
    pub const TRADE_VALUE: f32 = 5000.0;
}

/// Field offsets of each sub-block
pub mod layout {
    pub const PLAYER: usize = 0;
    pub const COLOURS: usize = 7;
    pub const DEVELOPMENT: usize = 16;
    pub const OPPONENTS: usize = 19;
    pub const SCARCITY: usize = 23;
    pub const WEALTH_SHARE: usize = 26;
    pub const DEBT_RATIO: usize = 27;
    pub const PROPERTY: usize = 32;
    pub const BUILDING: usize = 56;
    pub const TRADE: usize = 100;
    /// Fields actually written; everything past this is padding
    pub const USED: usize = 113;
}

/// Encoder schema version, carried alongside every vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderSchema {
    /// Base, property and building blocks (no trade block)
    Compact,
    /// All blocks including the trade sub-block
    #[default]
    Full,
}

impl EncoderSchema {
    /// Fixed vector length of this schema
    pub const fn len(self) -> usize {
        match self {
            EncoderSchema::Compact => 100,
            EncoderSchema::Full => 128,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncoderSchema::Compact => "compact",
            EncoderSchema::Full => "full",
        }
    }

    /// Whether the trade block survives truncation
    pub fn has_trade_block(self) -> bool {
        self.len() >= layout::USED
    }
}

/// Encoded state tagged with the schema that produced it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema: EncoderSchema,
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn zeros(schema: EncoderSchema) -> Self {
        Self {
            schema,
            values: vec![0.0; schema.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Encoder bound to a schema
#[derive(Clone, Copy, Debug, Default)]
pub struct Encoder {
    schema: EncoderSchema,
}

impl Encoder {
    pub fn new(schema: EncoderSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> EncoderSchema {
        self.schema
    }

    /// Encode `state` from the point of view of player `focus`
    ///
    /// A focus index with no matching player yields an all-zero vector.
    pub fn encode(
        &self,
        state: &GameStateSnapshot,
        focus: u32,
        trade_offer: Option<&TradeOffer>,
    ) -> FeatureVector {
        let Some(player) = state.player(focus) else {
            return FeatureVector::zeros(self.schema);
        };

        let mut values = vec![0.0f32; layout::USED];
        write_player_block(&mut values, player);
        write_portfolio_block(&mut values, state, focus);
        write_opponent_block(&mut values, state, focus);
        write_scarcity_block(&mut values, state, player);

        if let Some(property) = state.property_at(player.position) {
            write_property_block(&mut values, state, player, property);
        }
        write_building_block(&mut values, state, focus);
        if let Some(offer) = trade_offer {
            write_trade_block(&mut values, state, focus, offer);
        }

        values.resize(self.schema.len(), 0.0);
        FeatureVector {
            schema: self.schema,
            values,
        }
    }
}

/// Encode with the default schema
pub fn encode(state: &GameStateSnapshot, focus: u32, trade_offer: Option<&TradeOffer>) -> FeatureVector {
    Encoder::default().encode(state, focus, trade_offer)
}

// ============================================================================
// BLOCK WRITERS
// ============================================================================

fn write_player_block(out: &mut [f32], player: &PlayerState) {
    let base = layout::PLAYER;
    out[base] = player.cash as f32 / norm::CASH;
    out[base + 1] = player.position as f32 / norm::BOARD;
    out[base + 2] = flag(player.in_jail);
    out[base + 3] = player.turns_in_jail as f32 / norm::JAIL_TURNS;
    out[base + 4] = player.jail_free_cards as f32 / norm::JAIL_CARDS;
    out[base + 5] = player.railroads_owned as f32 / norm::RAILROADS;
    out[base + 6] = player.utilities_owned as f32 / norm::UTILITIES;
}

fn write_portfolio_block(out: &mut [f32], state: &GameStateSnapshot, focus: u32) {
    let mut colour_counts = [0u32; NUM_COLOUR_SLOTS];
    let mut houses = 0u32;
    let mut hotels = 0u32;
    let mut value = 0u64;

    for prop in state.owned_by(focus) {
        if let Some(count) = colour_counts.get_mut(prop.colour_id as usize) {
            *count += 1;
        }
        houses += prop.house_count() as u32;
        hotels += u32::from(prop.hotel);
        value += prop.purchase_price as u64;
    }

    for (slot, count) in colour_counts.iter().enumerate() {
        out[layout::COLOURS + slot] = *count as f32 / norm::COLOUR_GROUP;
    }
    out[layout::DEVELOPMENT] = houses as f32 / norm::HOUSES;
    out[layout::DEVELOPMENT + 1] = hotels as f32 / norm::HOTELS;
    out[layout::DEVELOPMENT + 2] = value as f32 / norm::PORTFOLIO_VALUE;
}

fn write_opponent_block(out: &mut [f32], state: &GameStateSnapshot, focus: u32) {
    let opponents: Vec<&PlayerState> = state
        .players
        .iter()
        .filter(|p| p.player_index != focus)
        .collect();
    if opponents.is_empty() {
        return;
    }

    let n = opponents.len() as f32;
    let total_cash: u64 = opponents.iter().map(|p| p.cash as u64).sum();
    let max_cash = opponents.iter().map(|p| p.cash).max().unwrap_or(0);
    let active = opponents.iter().filter(|p| !p.retired).count();
    let opponent_properties = state
        .properties
        .iter()
        .filter(|p| p.owner.is_some_and(|owner| owner != focus))
        .count();

    let base = layout::OPPONENTS;
    out[base] = total_cash as f32 / n / norm::CASH;
    out[base + 1] = opponent_properties as f32 / n / norm::PROPERTIES;
    out[base + 2] = max_cash as f32 / norm::CASH;
    out[base + 3] = active as f32 / norm::OPPONENTS;
}

fn write_scarcity_block(out: &mut [f32], state: &GameStateSnapshot, player: &PlayerState) {
    let unowned = state.properties.iter().filter(|p| !p.is_owned()).count();
    out[layout::SCARCITY] = unowned as f32 / norm::PROPERTIES;
    out[layout::SCARCITY + 1] = state.houses_remaining as f32 / norm::HOUSES;
    out[layout::SCARCITY + 2] = state.hotels_remaining as f32 / norm::HOTELS;

    let total_cash: u64 = state.players.iter().map(|p| p.cash as u64).sum();
    out[layout::WEALTH_SHARE] = ratio(player.cash as f64, total_cash as f64);
    out[layout::DEBT_RATIO] = ratio(state.owed as f64, state.owed as f64 + player.cash as f64);
}

fn write_property_block(
    out: &mut [f32],
    state: &GameStateSnapshot,
    player: &PlayerState,
    property: &PropertyState,
) {
    let focus = player.player_index;
    let base = layout::PROPERTY;

    out[base] = property.colour_id as f32 / norm::COLOUR_ID;
    let kind_slot = match property.kind {
        PropertyKind::Property => 0,
        PropertyKind::Utility => 1,
        PropertyKind::Railroad => 2,
    };
    out[base + 1 + kind_slot] = 1.0;
    out[base + 4] = flag(property.is_owned());
    out[base + 5] = flag(property.is_owned_by(focus));
    out[base + 6] = monopoly_progress(state, property, focus);

    for (i, rent) in property.rent.iter().enumerate() {
        out[base + 7 + i] = *rent as f32 / norm::RENT;
    }
    out[base + 13] = property.house_count() as f32 / MAX_HOUSES as f32;
    out[base + 14] = flag(property.hotel);
    out[base + 15] = flag(property.mortgaged);
    out[base + 16] = property.purchase_price as f32 / player.cash.max(1) as f32;
    out[base + 17] = (player.cash as f32 - property.purchase_price as f32) / norm::CASH;
}

/// Share of the tile's group already held by `focus`
///
/// Streets use their colour group; railroads and utilities their kind.
fn monopoly_progress(state: &GameStateSnapshot, property: &PropertyState, focus: u32) -> f32 {
    let in_group = |p: &&PropertyState| {
        if property.is_street() {
            p.is_street() && p.colour_id == property.colour_id
        } else {
            p.kind == property.kind
        }
    };
    let size = state.properties.iter().filter(in_group).count();
    let owned = state
        .properties
        .iter()
        .filter(in_group)
        .filter(|p| p.is_owned_by(focus))
        .count();
    ratio(owned as f64, size as f64)
}

fn write_building_block(out: &mut [f32], state: &GameStateSnapshot, focus: u32) {
    let monopolies = state.monopolies_of(focus);

    let mut value = 0u64;
    let mut below_cap = 0u32;
    let mut max_level = 0u8;
    for prop in state
        .properties
        .iter()
        .filter(|p| p.is_street() && monopolies.contains(&p.colour_id))
    {
        value += prop.purchase_price as u64;
        if prop.development_level() < HOTEL_LEVEL {
            below_cap += 1;
        }
        max_level = max_level.max(prop.development_level());
    }

    let base = layout::BUILDING;
    out[base] = monopolies.len() as f32 / norm::COLOUR_GROUPS;
    out[base + 1] = value as f32 / norm::PORTFOLIO_VALUE;
    out[base + 2] = below_cap as f32 / norm::STREETS;
    out[base + 3] = max_level as f32 / HOTEL_LEVEL as f32;
    out[base + 4] = flag(state.houses_remaining > 0);
}

fn write_trade_block(out: &mut [f32], state: &GameStateSnapshot, focus: u32, offer: &TradeOffer) {
    let (received, given) = offer.sides_for(focus);
    let props_in = resolve(state, &received.properties);
    let props_out = resolve(state, &given.properties);

    let count_kind = |kind: PropertyKind| props_in.iter().filter(|p| p.kind == kind).count();
    let cash_delta = received.cash as f32 - given.cash as f32;
    let completions = monopoly_completions(state, focus, &props_in, &props_out);

    let base = layout::TRADE;
    out[base] = cash_delta / norm::CASH;
    out[base + 1] = received.properties.len() as f32 / norm::TRADE_PROPERTIES;
    out[base + 2] = given.properties.len() as f32 / norm::TRADE_PROPERTIES;
    out[base + 3] = total_value(&props_in) as f32 / norm::TRADE_VALUE;
    out[base + 4] = total_value(&props_out) as f32 / norm::TRADE_VALUE;
    out[base + 5] = count_kind(PropertyKind::Railroad) as f32 / norm::RAILROADS;
    out[base + 6] = count_kind(PropertyKind::Utility) as f32 / norm::UTILITIES;
    out[base + 7] = completions as f32;
    out[base + 8] = received.jail_cards as f32 / norm::JAIL_CARDS;
    out[base + 9] = given.jail_cards as f32 / norm::JAIL_CARDS;
    out[base + 10] = flag(cash_delta > 0.0);
    out[base + 11] = flag(received.properties.len() > given.properties.len());
    out[base + 12] = flag(completions > 0);
}

/// Received streets whose colour group the trade would complete for `focus`
///
/// Groups already fully owned before the trade do not count.
fn monopoly_completions(
    state: &GameStateSnapshot,
    focus: u32,
    received: &[&PropertyState],
    given: &[&PropertyState],
) -> usize {
    let in_colour = |p: &&&PropertyState, colour: u8| p.is_street() && p.colour_id == colour;

    let mut completions = 0;
    for colour in STREET_COLOURS {
        if state.owns_monopoly(focus, colour) {
            continue;
        }
        let incoming = received
            .iter()
            .filter(|p| in_colour(p, colour) && !p.is_owned_by(focus))
            .count();
        if incoming == 0 {
            continue;
        }
        let outgoing = given
            .iter()
            .filter(|p| in_colour(p, colour) && p.is_owned_by(focus))
            .count();
        let after = (state.colour_owned_by(colour, focus) + incoming).saturating_sub(outgoing);
        if after == state.colour_group_size(colour) {
            completions += incoming;
        }
    }
    completions
}

/// Look up trade property ids, skipping unknown ones
fn resolve<'a>(state: &'a GameStateSnapshot, ids: &[u32]) -> Vec<&'a PropertyState> {
    ids.iter().filter_map(|&id| state.property_by_id(id)).collect()
}

fn total_value(props: &[&PropertyState]) -> u64 {
    props.iter().map(|p| p.purchase_price as u64).sum()
}

// ============================================================================
// UTILITIES
// ============================================================================

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// `num / den`, zero when the denominator is not positive
fn ratio(num: f64, den: f64) -> f32 {
    if den > 0.0 {
        (num / den) as f32
    } else {
        0.0
    }
}

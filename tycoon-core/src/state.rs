//! Game state snapshot - the read-only view handed to a policy per decision

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Number of tiles on the board
pub const BOARD_SIZE: u32 = 40;

/// Colour slots, including slot 0 for railroads/utilities (no colour)
pub const NUM_COLOUR_SLOTS: usize = 9;

/// Street colour ids run 1..=8 (Brown .. Navy)
pub const STREET_COLOURS: std::ops::RangeInclusive<u8> = 1..=8;

/// Development level of a property carrying a hotel
pub const HOTEL_LEVEL: u8 = 5;

/// Houses a street can hold before the next step is a hotel
pub const MAX_HOUSES: u8 = 4;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Kind of purchasable tile
///
/// Serialized as the engine's numeric tag (0 = street, 1 = utility, 2 = railroad).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PropertyKind {
    #[default]
    Property,
    Utility,
    Railroad,
}

impl From<u8> for PropertyKind {
    fn from(tag: u8) -> Self {
        match tag {
            1 => PropertyKind::Utility,
            2 => PropertyKind::Railroad,
            _ => PropertyKind::Property,
        }
    }
}

impl From<PropertyKind> for u8 {
    fn from(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Property => 0,
            PropertyKind::Utility => 1,
            PropertyKind::Railroad => 2,
        }
    }
}

/// Per-player view
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    pub player_index: u32,
    pub cash: u32,
    pub position: u32,
    pub retired: bool,
    pub in_jail: bool,
    pub turns_in_jail: u32,
    pub jail_free_cards: u32,
    pub railroads_owned: u8,
    pub utilities_owned: u8,
}

/// Per-property view
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyState {
    pub property_id: u32,
    pub position: u32,
    pub colour_id: u8,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    /// Owning player index, `None` while unowned
    #[serde(rename = "owner_index")]
    pub owner: Option<u32>,
    /// 0..=4 houses, 5 once a hotel is built
    pub houses: u8,
    pub hotel: bool,
    /// Rent with 0..=4 houses, then with a hotel
    pub rent: [u32; 6],
    pub mortgaged: bool,
    pub purchase_price: u32,
    pub house_price: u32,
}

impl PropertyState {
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by(&self, player: u32) -> bool {
        self.owner == Some(player)
    }

    /// Street belonging to one of the eight colour groups
    pub fn is_street(&self) -> bool {
        self.kind == PropertyKind::Property && STREET_COLOURS.contains(&self.colour_id)
    }

    /// Houses standing on the tile (a hotel counts as zero houses)
    pub fn house_count(&self) -> u8 {
        if self.hotel {
            0
        } else {
            self.houses.min(MAX_HOUSES)
        }
    }

    /// 0..=5 development level
    pub fn development_level(&self) -> u8 {
        if self.hotel {
            HOTEL_LEVEL
        } else {
            self.houses.min(HOTEL_LEVEL)
        }
    }
}

/// Read-only game snapshot supplied for a single decision
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStateSnapshot {
    pub game_id: u64,
    pub current_player_index: u32,
    pub players: Vec<PlayerState>,
    pub properties: Vec<PropertyState>,
    pub houses_remaining: u32,
    pub hotels_remaining: u32,
    /// Outstanding debt of the player to move
    pub owed: u32,
}

impl GameStateSnapshot {
    /// Parse a snapshot; absent fields default to zero/empty
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a player by its engine index (not by slice position)
    pub fn player(&self, index: u32) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.player_index == index)
    }

    pub fn property_by_id(&self, property_id: u32) -> Option<&PropertyState> {
        self.properties.iter().find(|p| p.property_id == property_id)
    }

    /// Purchasable tile at a board position
    pub fn property_at(&self, position: u32) -> Option<&PropertyState> {
        self.properties.iter().find(|p| p.position == position)
    }

    /// Number of streets in a colour group
    pub fn colour_group_size(&self, colour: u8) -> usize {
        self.properties
            .iter()
            .filter(|p| p.is_street() && p.colour_id == colour)
            .count()
    }

    /// Streets of a colour group owned by `player`
    pub fn colour_owned_by(&self, colour: u8, player: u32) -> usize {
        self.properties
            .iter()
            .filter(|p| p.is_street() && p.colour_id == colour && p.is_owned_by(player))
            .count()
    }

    /// True when `player` owns every street of the colour group
    pub fn owns_monopoly(&self, player: u32, colour: u8) -> bool {
        let size = self.colour_group_size(colour);
        size > 0 && self.colour_owned_by(colour, player) == size
    }

    /// Colour groups fully owned by `player`, ascending
    pub fn monopolies_of(&self, player: u32) -> Vec<u8> {
        STREET_COLOURS
            .filter(|&colour| self.owns_monopoly(player, colour))
            .collect()
    }

    /// Properties owned by `player`
    pub fn owned_by(&self, player: u32) -> impl Iterator<Item = &PropertyState> {
        self.properties.iter().filter(move |p| p.is_owned_by(player))
    }
}

/// One side of a trade
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSide {
    pub cash: u32,
    /// Property ids
    pub properties: Vec<u32>,
    pub jail_cards: u32,
}

/// Trade proposal between two players
///
/// `offer_from` is what the proposer hands over, `offer_to` is what it asks
/// of `player_to_offer`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeOffer {
    pub player_to_offer: u32,
    pub offer_from: TradeSide,
    pub offer_to: TradeSide,
}

impl TradeOffer {
    /// Split the offer into (received, given) from `focus`'s point of view
    pub fn sides_for(&self, focus: u32) -> (&TradeSide, &TradeSide) {
        if focus == self.player_to_offer {
            (&self.offer_from, &self.offer_to)
        } else {
            (&self.offer_to, &self.offer_from)
        }
    }
}

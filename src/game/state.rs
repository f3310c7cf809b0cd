//! Game state model.
//!
//! `GameState` is an immutable snapshot; the reducer produces a new one for
//! every applied event and bumps `version` by exactly one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Player identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Card identifier (the card's position on the board).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    /// Create a card id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the card at board position `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index.to_string())
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the local player, owned by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Stable player id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Single-glyph avatar.
    pub avatar: char,
}

impl LocalIdentity {
    /// Create an identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>, avatar: char) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            avatar,
        }
    }

    /// Roster entry for this identity.
    pub fn to_player(&self, is_host: bool) -> Player {
        Player {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar,
            score: 0,
            is_host,
        }
    }
}

/// Roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Player id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Single-glyph avatar.
    pub avatar: char,
    /// Pairs found so far.
    #[serde(default)]
    pub score: u32,
    /// Whether this player hosts the match.
    #[serde(default)]
    pub is_host: bool,
}

/// Face state of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardState {
    /// Face down.
    Hidden,
    /// Face up during the current turn.
    Revealed,
    /// Part of a found pair.
    Matched,
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Card id.
    pub id: CardId,
    /// Symbol shown when face up; two cards share each symbol.
    pub symbol: String,
    /// Face state.
    pub state: CardState,
}

/// The player whose turn it is, plus what they revealed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Turn holder.
    pub user_id: UserId,
    /// Cards revealed this turn, in order (0..=2).
    pub revealed: Vec<CardId>,
}

impl Turn {
    /// Fresh turn for `user_id` with nothing revealed.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            revealed: Vec::new(),
        }
    }

    /// Whether another card may be revealed this turn.
    pub fn can_reveal(&self) -> bool {
        self.revealed.len() < 2
    }
}

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    /// Roster assembled, not started.
    Waiting,
    /// Cards are being played.
    InProgress,
    /// All pairs found.
    Finished,
}

/// Board layout and roster chosen by the host when a match starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSetup {
    /// Board rows.
    pub rows: u32,
    /// Board columns.
    pub cols: u32,
    /// One symbol per card, in board order.
    pub shuffled_card_symbols: Vec<String>,
    /// Roster, host first.
    pub game_players: Vec<Player>,
}

/// Replicated game state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// Count of events applied; equal on both peers when in sync.
    pub version: u64,
    /// Match lifecycle.
    pub status: GameStatus,
    /// Board rows.
    pub rows: u32,
    /// Board columns.
    pub cols: u32,
    /// Roster in turn order.
    pub players: Vec<Player>,
    /// Cards in board order.
    pub cards: Vec<Card>,
    /// Current turn, if any.
    pub current_turn: Option<Turn>,
    /// Winner once finished.
    pub winner_id: Option<UserId>,
}

impl GameState {
    /// Fresh state derived from a match setup sent by `host`.
    ///
    /// The match starts immediately: status is in progress, the host holds
    /// the first turn and the version is 1.
    pub fn from_setup(host: &UserId, setup: &MatchSetup) -> Self {
        let cards = setup
            .shuffled_card_symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| Card {
                id: CardId::from_index(index),
                symbol: symbol.clone(),
                state: CardState::Hidden,
            })
            .collect();

        Self {
            version: 1,
            status: GameStatus::InProgress,
            rows: setup.rows,
            cols: setup.cols,
            players: setup.game_players.clone(),
            cards,
            current_turn: Some(Turn::new(host.clone())),
            winner_id: None,
        }
    }

    /// Lobby state: roster known, no board dealt, waiting for the host.
    pub fn waiting(players: Vec<Player>) -> Self {
        Self {
            version: 0,
            status: GameStatus::Waiting,
            rows: 0,
            cols: 0,
            players,
            cards: Vec::new(),
            current_turn: None,
            winner_id: None,
        }
    }

    /// Copy of this state with the version bumped.
    pub fn next_version(mut self) -> Self {
        self.version += 1;
        self
    }

    /// Whether `user_id` holds the current turn.
    pub fn is_player_turn(&self, user_id: &UserId) -> bool {
        self.current_turn
            .as_ref()
            .is_some_and(|turn| &turn.user_id == user_id)
    }

    /// Look up a card.
    pub fn card(&self, id: &CardId) -> Option<&Card> {
        self.cards.iter().find(|card| &card.id == id)
    }

    /// Look up a player.
    pub fn player(&self, id: &UserId) -> Option<&Player> {
        self.players.iter().find(|player| &player.id == id)
    }

    /// Cards revealed during the current turn.
    pub fn revealed_cards(&self) -> &[CardId] {
        self.current_turn
            .as_ref()
            .map(|turn| turn.revealed.as_slice())
            .unwrap_or_default()
    }

    /// Whether every card has been matched.
    pub fn all_matched(&self) -> bool {
        self.cards.iter().all(|card| card.state == CardState::Matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fixtures::setup;

    #[test]
    fn test_from_setup() {
        let host = UserId::new("host");
        let state = GameState::from_setup(&host, &setup());

        assert_eq!(state.version, 1);
        assert_eq!(state.status, GameStatus::InProgress);
        assert_eq!(state.cards.len(), 4);
        assert_eq!(state.cards[2].id, CardId::new("2"));
        assert_eq!(state.cards[2].symbol, "A");
        assert!(state.cards.iter().all(|c| c.state == CardState::Hidden));
        assert!(state.is_player_turn(&host));
        assert!(state.revealed_cards().is_empty());
        assert!(state.winner_id.is_none());
    }

    #[test]
    fn test_next_version() {
        let state = GameState::waiting(Vec::new());
        assert_eq!(state.clone().next_version().version, state.version + 1);
    }

    #[test]
    fn test_lookups() {
        let state = GameState::from_setup(&UserId::new("host"), &setup());
        assert!(state.card(&CardId::new("3")).is_some());
        assert!(state.card(&CardId::new("9")).is_none());
        assert!(state.player(&UserId::new("guest")).is_some());
        assert!(!state.all_matched());
    }

    #[test]
    fn test_turn_can_reveal() {
        let mut turn = Turn::new(UserId::new("host"));
        assert!(turn.can_reveal());
        turn.revealed.push(CardId::new("0"));
        turn.revealed.push(CardId::new("1"));
        assert!(!turn.can_reveal());
    }
}

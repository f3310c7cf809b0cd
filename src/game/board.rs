//! Board dealing and turn bookkeeping helpers used by the host and the
//! session orchestrator.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use super::state::{CardId, GameState, MatchSetup, Player, UserId};
use super::validator::check_reveal;

/// Symbols a board is dealt from. Each chosen symbol appears on two cards.
pub const SYMBOL_CATALOG: &[&str] = &[
    "🍎", "🍌", "🍒", "🍇", "🍉", "🍋", "🍑", "🍍", "🥝", "🥥", "🍓", "🫐", "🥕", "🌽",
    "🍄", "🌵", "🌻", "🌙", "⭐", "🔥", "⚡", "❄", "🎈", "🎲", "🎸", "🚀", "⚓", "🔔",
    "🐙", "🐢", "🦊", "🐝",
];

/// Errors dealing a board.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// Pairs need an even number of cards.
    #[error("card count {0} is odd")]
    OddCardCount(usize),

    /// Board has more pairs than the catalog has symbols.
    #[error("board needs {needed} distinct symbols, catalog has {available}")]
    NotEnoughSymbols {
        /// Pairs on the board.
        needed: usize,
        /// Catalog size.
        available: usize,
    },
}

/// Shuffled symbols for a board of `card_count` cards, two of each.
pub fn shuffled_symbols<R: Rng + ?Sized>(
    card_count: usize,
    rng: &mut R,
) -> Result<Vec<String>, BoardError> {
    if card_count % 2 != 0 {
        return Err(BoardError::OddCardCount(card_count));
    }
    let pairs = card_count / 2;
    if pairs > SYMBOL_CATALOG.len() {
        return Err(BoardError::NotEnoughSymbols {
            needed: pairs,
            available: SYMBOL_CATALOG.len(),
        });
    }

    let mut symbols: Vec<String> = SYMBOL_CATALOG
        .choose_multiple(rng, pairs)
        .flat_map(|symbol| [symbol.to_string(), symbol.to_string()])
        .collect();
    symbols.shuffle(rng);
    Ok(symbols)
}

/// Deal a `rows` x `cols` board for `players` (host first).
pub fn deal<R: Rng + ?Sized>(
    rows: u32,
    cols: u32,
    players: Vec<Player>,
    rng: &mut R,
) -> Result<MatchSetup, BoardError> {
    let card_count = rows as usize * cols as usize;
    Ok(MatchSetup {
        rows,
        cols,
        shuffled_card_symbols: shuffled_symbols(card_count, rng)?,
        game_players: players,
    })
}

/// Whether `user_id` clicking `card_id` would be a legal reveal.
pub fn can_handle_click(state: &GameState, user_id: &UserId, card_id: &CardId) -> bool {
    check_reveal(state, user_id, card_id).is_ok()
}

/// Player after `current` in roster order, wrapping around.
///
/// Falls back to the first player when `current` is not in the roster.
pub fn select_next_player(state: &GameState, current: &UserId) -> Option<UserId> {
    let players = &state.players;
    let next = match players.iter().position(|p| &p.id == current) {
        Some(index) => players.get((index + 1) % players.len()),
        None => players.first(),
    };
    next.map(|p| p.id.clone())
}

/// Highest scorer; ties go to whoever comes first in the roster.
pub fn select_winner(state: &GameState) -> Option<UserId> {
    state
        .players
        .iter()
        .fold(None::<&Player>, |best, player| match best {
            Some(best) if best.score >= player.score => Some(best),
            _ => Some(player),
        })
        .map(|p| p.id.clone())
}

//! Game-rule validation.
//!
//! A pure check of one event against one state snapshot. Nothing here
//! touches the network or mutates state.

use crate::core::DomainError;
use crate::message::{GameEvent, GameEventKind};

use super::state::{CardId, CardState, GameState, GameStatus, UserId};

/// Check whether `event` may be applied to `state`.
pub fn validate(state: &GameState, event: &GameEvent) -> Result<(), DomainError> {
    match &event.kind {
        GameEventKind::GameStarted => check_start(state, &event.sender_id),
        GameEventKind::CardRevealed { card_id } => check_reveal(state, &event.sender_id, card_id),
        GameEventKind::PairResolved { .. } => {
            if state.revealed_cards().len() != 2 {
                return Err(DomainError::InsufficientRevealedCards);
            }
            Ok(())
        }
        GameEventKind::TurnChanged { next_user_id } => {
            if state.player(next_user_id).is_none() {
                return Err(DomainError::InvalidTargetPlayer);
            }
            Ok(())
        }
        // All-matched is not re-checked: a peer's GameFinished may arrive
        // while the last PairResolved is still in flight here.
        GameEventKind::GameFinished { .. } => {
            if state.status != GameStatus::InProgress {
                return Err(DomainError::GameNotStarted);
            }
            Ok(())
        }
    }
}

fn check_start(state: &GameState, sender: &UserId) -> Result<(), DomainError> {
    if state.status != GameStatus::Waiting {
        return Err(DomainError::GameAlreadyInProgress);
    }
    if !state.player(sender).is_some_and(|player| player.is_host) {
        return Err(DomainError::OnlyHostCanStart);
    }
    if state.players.len() < 2 {
        return Err(DomainError::NotEnoughPlayers);
    }
    Ok(())
}

/// Whether `sender` may reveal `card_id` right now.
pub(crate) fn check_reveal(
    state: &GameState,
    sender: &UserId,
    card_id: &CardId,
) -> Result<(), DomainError> {
    if state.status != GameStatus::InProgress {
        return Err(DomainError::GameNotStarted);
    }
    if !state.is_player_turn(sender) {
        return Err(DomainError::NotYourTurn);
    }
    match state.card(card_id) {
        Some(card) if card.state == CardState::Hidden => {}
        _ => return Err(DomainError::CardNotHidden),
    }
    if state.revealed_cards().len() >= 2 {
        return Err(DomainError::TooManyCardsRevealed);
    }
    Ok(())
}

//! State transitions.
//!
//! [`reduce`] assumes the event already passed [`validate`](super::validate)
//! against the same snapshot. Every call yields `version + 1`.

use crate::message::{GameEvent, GameEventKind};

use super::state::{CardId, CardState, GameState, GameStatus, Turn};

/// Apply `event` to `state`, returning the next snapshot.
pub fn reduce(state: &GameState, event: &GameEvent) -> GameState {
    let mut next = state.clone().next_version();

    match &event.kind {
        GameEventKind::GameStarted => {
            next.status = GameStatus::InProgress;
        }
        GameEventKind::CardRevealed { card_id } => {
            set_card_state(&mut next, card_id, CardState::Revealed);
            if let Some(turn) = next.current_turn.as_mut() {
                turn.revealed.push(card_id.clone());
            }
        }
        GameEventKind::PairResolved {
            card1,
            card2,
            matched,
        } => {
            let outcome = if *matched {
                CardState::Matched
            } else {
                CardState::Hidden
            };
            set_card_state(&mut next, card1, outcome);
            set_card_state(&mut next, card2, outcome);

            if *matched {
                if let Some(player) = next.players.iter_mut().find(|p| p.id == event.sender_id) {
                    player.score += 1;
                }
            }
            if let Some(turn) = next.current_turn.as_mut() {
                turn.revealed.clear();
            }
        }
        GameEventKind::TurnChanged { next_user_id } => {
            next.current_turn = Some(Turn::new(next_user_id.clone()));
        }
        GameEventKind::GameFinished { winner_id } => {
            next.status = GameStatus::Finished;
            next.winner_id = Some(winner_id.clone());
        }
    }

    next
}

fn set_card_state(state: &mut GameState, id: &CardId, to: CardState) {
    if let Some(card) = state.cards.iter_mut().find(|card| &card.id == id) {
        card.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fixtures::{guest, host, in_progress};
    use crate::game::{UserId, validate};

    fn apply(state: &GameState, event: GameEvent) -> GameState {
        validate(state, &event).unwrap();
        reduce(state, &event)
    }

    #[test]
    fn test_matched_pair() {
        let start = in_progress();
        let s = apply(&start, GameEvent::card_revealed(host(), CardId::new("0")));
        let s = apply(&s, GameEvent::card_revealed(host(), CardId::new("2")));
        assert_eq!(s.revealed_cards().len(), 2);

        let s = apply(
            &s,
            GameEvent::pair_resolved(host(), CardId::new("0"), CardId::new("2"), true),
        );

        assert_eq!(s.version, start.version + 3);
        assert_eq!(s.card(&CardId::new("0")).unwrap().state, CardState::Matched);
        assert_eq!(s.card(&CardId::new("2")).unwrap().state, CardState::Matched);
        assert!(s.revealed_cards().is_empty());
        assert_eq!(s.player(&host()).unwrap().score, 1);
        assert_eq!(s.player(&guest()).unwrap().score, 0);
        assert!(s.is_player_turn(&host()));
    }

    #[test]
    fn test_mismatched_pair_hides_cards() {
        let s = apply(&in_progress(), GameEvent::card_revealed(host(), CardId::new("0")));
        let s = apply(&s, GameEvent::card_revealed(host(), CardId::new("1")));
        let s = apply(
            &s,
            GameEvent::pair_resolved(host(), CardId::new("0"), CardId::new("1"), false),
        );

        assert!(s.cards.iter().all(|c| c.state == CardState::Hidden));
        assert!(s.revealed_cards().is_empty());
        assert_eq!(s.player(&host()).unwrap().score, 0);
    }

    #[test]
    fn test_turn_change_resets_revealed() {
        let s = apply(&in_progress(), GameEvent::card_revealed(host(), CardId::new("0")));
        let s = reduce(&s, &GameEvent::turn_changed(host(), guest()));

        let turn = s.current_turn.as_ref().unwrap();
        assert_eq!(turn.user_id, guest());
        assert!(turn.revealed.is_empty());
    }

    #[test]
    fn test_start_and_finish() {
        let waiting = GameState::waiting(in_progress().players);
        let started = apply(&waiting, GameEvent::game_started(host()));
        assert_eq!(started.status, GameStatus::InProgress);
        assert_eq!(started.version, 1);

        let finished = reduce(&started, &GameEvent::game_finished(host(), UserId::new("guest")));
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(finished.winner_id, Some(guest()));
        assert_eq!(finished.version, 2);
    }

    #[test]
    fn test_reduce_does_not_touch_input() {
        let state = in_progress();
        let before = state.clone();
        let _ = reduce(&state, &GameEvent::card_revealed(host(), CardId::new("0")));
        assert_eq!(state, before);
    }
}

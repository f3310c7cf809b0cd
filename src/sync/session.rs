//! Local turn orchestration.
//!
//! Turns a player's card click into the sequence of events the rules call
//! for: reveal, then (after a second reveal) resolve the pair and either
//! finish the match or pass the turn.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;

use crate::core::constants::DEFAULT_LEAVE_REASON;
use crate::game::{
    BoardError, CardId, GameState, LocalIdentity, Player, UserId, can_handle_click, deal,
    select_next_player, select_winner,
};
use crate::message::GameEvent;

use super::engine::{SyncEngine, SyncError};

/// Orchestration failures. Every one leaves the match playable.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Click is not a legal reveal right now.
    #[error("click not allowed in the current state")]
    InvalidClick,

    /// Reveal was not accepted.
    #[error("failed to reveal card: {0}")]
    RevealFailed(#[source] SyncError),

    /// Pair resolution was not accepted.
    #[error("failed to resolve pair: {0}")]
    PairResolveFailed(#[source] SyncError),

    /// Finish was not accepted.
    #[error("failed to finish game: {0}")]
    FinishFailed(#[source] SyncError),

    /// Turn change was not accepted.
    #[error("failed to change turn: {0}")]
    TurnChangeFailed(#[source] SyncError),

    /// Leave notice not delivered.
    #[error("failed to leave: {0}")]
    LeaveFailed(#[source] SyncError),

    /// Replay request not delivered.
    #[error("failed to request replay: {0}")]
    ReplayFailed(#[source] SyncError),

    /// Match could not be started.
    #[error("failed to start match: {0}")]
    StartFailed(#[source] SyncError),

    /// Board could not be dealt.
    #[error("invalid board: {0}")]
    InvalidBoard(#[from] BoardError),

    /// Revealed card vanished from the board.
    #[error("card {0} not found")]
    CardNotFound(CardId),

    /// No match configured.
    #[error("no game state")]
    GameStateMissing,
}

impl SessionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidClick => "invalid_click",
            Self::RevealFailed(_) => "reveal_failed",
            Self::PairResolveFailed(_) => "pair_resolve_failed",
            Self::FinishFailed(_) => "finish_failed",
            Self::TurnChangeFailed(_) => "turn_change_failed",
            Self::LeaveFailed(_) => "leave_failed",
            Self::ReplayFailed(_) => "replay_failed",
            Self::StartFailed(_) => "start_failed",
            Self::InvalidBoard(_) => "invalid_board",
            Self::CardNotFound(_) => "card_not_found",
            Self::GameStateMissing => "game_state_missing",
        }
    }

    /// Whether the player can simply try again.
    ///
    /// Only a missing game state needs a new match configuration first.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::GameStateMissing)
    }
}

/// What a click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// First card of the turn is face up.
    Revealed,
    /// Pair matched; same player goes again.
    PairFound,
    /// Pair missed; the turn passed.
    PairMissed {
        /// New turn holder.
        next_player: UserId,
    },
    /// Last pair matched; match over.
    Finished {
        /// Winner.
        winner: UserId,
    },
}

/// One player's view of a match, driving the engine from UI actions.
#[derive(Debug, Clone)]
pub struct GameSession {
    engine: Arc<SyncEngine>,
    local: LocalIdentity,
}

impl GameSession {
    /// Session for `local` on `engine`.
    pub fn new(engine: Arc<SyncEngine>, local: LocalIdentity) -> Self {
        Self { engine, local }
    }

    /// Local identity.
    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    /// Engine in use.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Deal a fresh `rows` x `cols` board for `players` and start the match
    /// as host.
    pub async fn start(
        &self,
        rows: u32,
        cols: u32,
        players: Vec<Player>,
    ) -> Result<GameState, SessionError> {
        let setup = deal(rows, cols, players, &mut rand::thread_rng())?;
        self.engine
            .start_match(setup)
            .await
            .map_err(SessionError::StartFailed)
    }

    /// Handle a click on `card_id` by the local player.
    pub async fn on_card_clicked(&self, card_id: CardId) -> Result<ClickOutcome, SessionError> {
        let me = &self.local.id;
        let state = self.engine.state().ok_or(SessionError::GameStateMissing)?;
        if !can_handle_click(&state, me, &card_id) {
            return Err(SessionError::InvalidClick);
        }

        let state = self
            .engine
            .propose_event(GameEvent::card_revealed(me.clone(), card_id))
            .await
            .map_err(SessionError::RevealFailed)?;

        let [first, second] = state.revealed_cards() else {
            return Ok(ClickOutcome::Revealed);
        };
        let (first, second) = (first.clone(), second.clone());

        sleep(self.engine.config().reveal_delay).await;

        // The peer may have moved the match on while the pair was showing.
        let state = self.engine.state().ok_or(SessionError::GameStateMissing)?;
        let matched = symbol_of(&state, &first)? == symbol_of(&state, &second)?;
        let state = self
            .engine
            .propose_event(GameEvent::pair_resolved(me.clone(), first, second, matched))
            .await
            .map_err(SessionError::PairResolveFailed)?;

        if state.all_matched() {
            let winner = select_winner(&state).ok_or(SessionError::GameStateMissing)?;
            self.engine
                .propose_event(GameEvent::game_finished(me.clone(), winner.clone()))
                .await
                .map_err(SessionError::FinishFailed)?;
            return Ok(ClickOutcome::Finished { winner });
        }

        if matched {
            return Ok(ClickOutcome::PairFound);
        }

        let next_player = select_next_player(&state, me).ok_or(SessionError::GameStateMissing)?;
        self.engine
            .propose_event(GameEvent::turn_changed(me.clone(), next_player.clone()))
            .await
            .map_err(SessionError::TurnChangeFailed)?;
        Ok(ClickOutcome::PairMissed { next_player })
    }

    /// Tell the peer the local player is leaving.
    pub async fn on_leave(&self) -> Result<(), SessionError> {
        self.engine
            .send_leave(DEFAULT_LEAVE_REASON)
            .await
            .map_err(SessionError::LeaveFailed)
    }

    /// Ask the peer for a rematch.
    pub async fn on_replay(&self) -> Result<(), SessionError> {
        self.engine
            .send_replay_requested()
            .await
            .map_err(SessionError::ReplayFailed)
    }
}

fn symbol_of(state: &GameState, card_id: &CardId) -> Result<String, SessionError> {
    state
        .card(card_id)
        .map(|card| card.symbol.clone())
        .ok_or_else(|| SessionError::CardNotFound(card_id.clone()))
}

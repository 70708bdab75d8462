//! Game error types
//!
//! Rejected-input errors are sent back to the originating client verbatim as
//! the payload of an `Error` packet; they never mutate game state. The
//! `NoSubmissions` variant marks an invariant violation in round resolution
//! and is logged server-side instead of being shown to anyone.

use shared::{CHOICE_MAX, CHOICE_MIN, MAX_PLAYERS};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("Game already in progress")]
    GameInProgress,

    #[error("Game is full ({MAX_PLAYERS} players maximum)")]
    GameFull,

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name already taken")]
    NameTaken,

    #[error("Need exactly {MAX_PLAYERS} players to start")]
    NotEnoughPlayers,

    #[error("No round is open for submissions")]
    RoundClosed,

    #[error("Invalid number. Choose between {CHOICE_MIN} and {CHOICE_MAX}.")]
    ChoiceOutOfRange,

    #[error("You already submitted a number this round")]
    AlreadySubmitted,

    #[error("You are not part of this game")]
    UnknownPlayer,

    #[error("Eliminated players cannot submit")]
    PlayerEliminated,

    #[error("round resolution requires at least one submission")]
    NoSubmissions,
}

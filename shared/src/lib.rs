use serde::{Deserialize, Serialize};

/// Exact number of players required to start a game.
pub const MAX_PLAYERS: usize = 4;
/// Smallest number a player may pick.
pub const CHOICE_MIN: i32 = 0;
/// Largest number a player may pick.
pub const CHOICE_MAX: i32 = 100;
/// Seconds players have to submit before the round auto-fills.
pub const ROUND_SECONDS: u32 = 30;
/// A player whose score drops to this value or below is eliminated.
pub const ELIMINATION_THRESHOLD: i32 = -10;
/// Winning pick under the lucky-number rule.
pub const LUCKY_NUMBER: u8 = 42;
/// Target multiplier under standard rules.
pub const STANDARD_MULTIPLIER: f32 = 0.8;
/// Target multiplier once the double-multiplier rule is active.
pub const DOUBLE_MULTIPLIER: f32 = 1.6;
/// Delay between the start trigger and round 1 opening, in seconds.
pub const START_DELAY_SECS: u64 = 2;
/// Delay between a round ending and the next round opening, in seconds.
pub const NEXT_ROUND_DELAY_SECS: u64 = 5;
/// Delay between the final round ending and the game-over broadcast, in seconds.
pub const GAME_END_DELAY_SECS: u64 = 3;
/// Interval at which clients send keep-alive packets, in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 2;
/// Seconds of silence after which the server drops a client.
pub const CLIENT_TIMEOUT_SECS: u64 = 10;
/// Wire protocol version exchanged during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// All packets exchanged between client and server.
///
/// The first group travels client-to-server, the second server-to-client.
/// `Submit` carries an `i32` rather than a `u8` so out-of-range picks reach
/// the server's validation and come back as a proper `Error` packet instead
/// of failing to deserialize.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Join {
        name: String,
    },
    Start,
    Submit {
        number: i32,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Joined {
        player_id: u32,
    },
    PlayerJoined {
        roster: Vec<Player>,
    },
    GameStarted {
        roster: Vec<Player>,
        round: u32,
    },
    RoundStarted {
        round: u32,
        roster: Vec<Player>,
        rule: String,
    },
    TimerTick {
        seconds_left: u32,
    },
    PlayerEliminated {
        player_id: u32,
        name: String,
    },
    NewRuleUnlocked {
        rule: String,
    },
    RoundEnded {
        round: u32,
        submissions: Vec<Submission>,
        average: f32,
        target: f32,
        winner: Submission,
        roster: Vec<Player>,
    },
    GameEnded {
        winner: Option<Player>,
        roster: Vec<Player>,
    },
    Error {
        message: String,
    },
}

/// A player as tracked by the server and mirrored to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub score: i32,
    pub eliminated: bool,
}

impl Player {
    pub fn new(id: u32, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            eliminated: false,
        }
    }

    /// An active player is one that has not been eliminated.
    pub fn is_active(&self) -> bool {
        !self.eliminated
    }
}

/// One player's pick for the current round.
///
/// The name is snapshotted at submission time so round results stay
/// readable even if the roster changes afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Submission {
    pub player_id: u32,
    pub player_name: String,
    pub number: u8,
}

impl Submission {
    pub fn new(player_id: u32, player_name: String, number: u8) -> Self {
        Self {
            player_id,
            player_name,
            number,
        }
    }
}

/// Validates a raw pick, returning the in-range value on success.
///
/// Accepts exactly the integers in `[CHOICE_MIN, CHOICE_MAX]`.
pub fn validate_choice(number: i32) -> Option<u8> {
    if (CHOICE_MIN..=CHOICE_MAX).contains(&number) {
        Some(number as u8)
    } else {
        None
    }
}

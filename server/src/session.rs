//! Session state for the single running game
//!
//! The session is the authoritative state container: roster, round counter,
//! submissions, countdown and escalation history. It is mutated exclusively
//! by the game engine, one event at a time, so no interior locking is
//! needed here.

use crate::rules::{unlocked_at, RULE_CATALOG, STANDARD_RULES_TEXT};
use log::info;
use shared::{Player, Submission, MAX_PLAYERS, ROUND_SECONDS};

/// Lifecycle phase of the session.
///
/// `RoundResolving` covers the whole stretch between a round closing and the
/// next one opening (or the game ending); delayed transitions fire out of it.
/// `GameEnded` is momentary: the final broadcast goes out and the session
/// resets straight back to `WaitingForPlayers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForPlayers,
    ReadyToStart,
    RoundOpen,
    RoundResolving,
    GameEnded,
}

pub struct Session {
    pub phase: Phase,
    /// Roster in join order. Join order is load-bearing: it fixes the
    /// iteration order used for score updates and elimination announcements.
    players: Vec<Player>,
    /// Current round number, 1-based, monotonic for the life of the game.
    pub round: u32,
    /// Seconds left in the open round. `None` means no armed countdown, so a
    /// stray timer tick can never resolve a round twice.
    countdown: Option<u32>,
    /// Submissions for the open round in insertion order; the order doubles
    /// as the winner tie-break order.
    submissions: Vec<Submission>,
    pub elimination_count: usize,
    /// Indexes into `RULE_CATALOG` in unlock order, append-only.
    unlocked_rules: Vec<usize>,
    next_player_id: u32,
    /// Bumped on every full reset; delayed events from a previous game
    /// carry the old value and are dropped.
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: Phase::WaitingForPlayers,
            players: Vec::new(),
            round: 1,
            countdown: None,
            submissions: Vec::new(),
            elimination_count: 0,
            unlocked_rules: Vec::new(),
            next_player_id: 1,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the start trigger has been accepted.
    pub fn started(&self) -> bool {
        !matches!(self.phase, Phase::WaitingForPlayers | Phase::ReadyToStart)
    }

    // --- roster ---

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut [Player] {
        &mut self.players
    }

    /// Roster snapshot for broadcasting.
    pub fn roster(&self) -> Vec<Player> {
        self.players.clone()
    }

    pub fn player(&self, player_id: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Adds a player to the roster and returns their id. The caller is
    /// responsible for capacity and name checks.
    pub fn add_player(&mut self, name: &str) -> u32 {
        let player_id = self.next_player_id;
        self.next_player_id += 1;
        self.players.push(Player::new(player_id, name.to_string()));
        info!(
            "Player {} ({}) joined, roster now {}",
            player_id,
            name,
            self.players.len()
        );
        player_id
    }

    pub fn remove_player(&mut self, player_id: u32) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);
        info!("Player {} ({}) left the lobby", player.id, player.name);
        Some(player)
    }

    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    // --- submissions ---

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn has_submitted(&self, player_id: u32) -> bool {
        self.submissions.iter().any(|s| s.player_id == player_id)
    }

    pub fn record_submission(&mut self, submission: Submission) {
        self.submissions.push(submission);
    }

    pub fn all_active_submitted(&self) -> bool {
        self.active_players().all(|p| self.has_submitted(p.id))
    }

    // --- countdown ---

    /// Arms the per-round countdown and clears the previous round's
    /// submissions.
    pub fn open_round(&mut self) {
        self.submissions.clear();
        self.countdown = Some(ROUND_SECONDS);
        self.phase = Phase::RoundOpen;
    }

    /// Ticks the armed countdown down by one second and returns the seconds
    /// left. Returns `None` when no countdown is armed.
    pub fn tick_countdown(&mut self) -> Option<u32> {
        let remaining = self.countdown?.saturating_sub(1);
        self.countdown = Some(remaining);
        Some(remaining)
    }

    /// Disarms the countdown. Called the instant a round resolves early so
    /// the timer reaching zero later cannot trigger a second resolution.
    pub fn cancel_countdown(&mut self) {
        self.countdown = None;
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    // --- rule escalation ---

    /// Records the catalog entry addressed by the current elimination count
    /// as unlocked. Returns its announcement text the first time, `None` if
    /// the count addresses nothing new.
    pub fn unlock_current_rule(&mut self) -> Option<&'static str> {
        let rule = unlocked_at(self.elimination_count)?;
        let index = self.elimination_count - 1;
        if self.unlocked_rules.contains(&index) {
            return None;
        }
        self.unlocked_rules.push(index);
        Some(rule.text)
    }

    /// Text of the most recently unlocked rule, for round announcements.
    pub fn latest_rule_text(&self) -> &'static str {
        self.unlocked_rules
            .last()
            .map(|&index| RULE_CATALOG[index].text)
            .unwrap_or(STANDARD_RULES_TEXT)
    }

    pub fn unlocked_rule_count(&self) -> usize {
        self.unlocked_rules.len()
    }

    // --- reset ---

    /// Clears all game progress and the roster, returning the session to the
    /// lobby. The generation bump invalidates any still-pending delayed
    /// transition from the finished game.
    pub fn reset(&mut self) {
        info!("Session reset");
        self.phase = Phase::WaitingForPlayers;
        self.players.clear();
        self.round = 1;
        self.countdown = None;
        self.submissions.clear();
        self.elimination_count = 0;
        self.unlocked_rules.clear();
        self.generation += 1;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

//! Game engine: round lifecycle orchestration
//!
//! The engine owns the session and is the only place that sequences a game:
//! joins, the start trigger, the per-round countdown, forced auto-submission
//! on timeout, round resolution, escalation unlocks, and the
//! continue-or-end decision. Every entry point is synchronous and returns a
//! list of [`Effect`]s for the network layer to execute, which keeps the
//! whole lifecycle unit-testable without sockets or timers.
//!
//! Delayed transitions (round opening, game over) are requested as
//! `Effect::Schedule` and come back through [`GameEngine::delayed`] tagged
//! with the session generation; a reset in the interim invalidates them.
//! The countdown is armed per round and explicitly cancelled when a round
//! resolves early, so the pending timeout can never resolve the same round
//! twice.

use crate::error::GameError;
use crate::round::{apply_scores, resolve_winner, round_average, round_target};
use crate::session::{Phase, Session};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    validate_choice, Packet, Submission, CHOICE_MAX, CHOICE_MIN, GAME_END_DELAY_SECS,
    NEXT_ROUND_DELAY_SECS, START_DELAY_SECS,
};
use std::time::Duration;

/// Instruction for the network layer, produced by every engine entry point.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Send to the client that triggered the event.
    Reply(Packet),
    /// Send to every connected client.
    Broadcast(Packet),
    /// Post `event` back into the engine after `delay`. The generation tag
    /// lets the engine drop events that outlived a session reset.
    Schedule {
        delay: Duration,
        event: DelayedEvent,
        generation: u64,
    },
}

/// Deferred lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedEvent {
    OpenRound,
    FinishGame,
}

pub struct GameEngine {
    session: Session,
}

impl GameEngine {
    pub fn new() -> Self {
        Self {
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Adds a player to the lobby.
    ///
    /// Rejected while a game is running, when the lobby is full, and for
    /// empty or already-taken (case-insensitive) names. The fourth join
    /// makes the session ready to start.
    pub fn join(&mut self, name: &str) -> Result<(u32, Vec<Effect>), GameError> {
        if self.session.started() {
            return Err(GameError::GameInProgress);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::EmptyName);
        }
        if self.session.is_full() {
            return Err(GameError::GameFull);
        }
        if self.session.name_taken(name) {
            return Err(GameError::NameTaken);
        }

        let player_id = self.session.add_player(name);
        if self.session.is_full() {
            self.session.phase = Phase::ReadyToStart;
        }

        let effects = vec![
            Effect::Reply(Packet::Joined { player_id }),
            Effect::Broadcast(Packet::PlayerJoined {
                roster: self.session.roster(),
            }),
        ];
        Ok((player_id, effects))
    }

    /// Start trigger from a joined player. Requires a full lobby; round 1
    /// opens after the announcement delay.
    pub fn start(&mut self, player_id: u32) -> Result<Vec<Effect>, GameError> {
        self.session
            .player(player_id)
            .ok_or(GameError::UnknownPlayer)?;

        match self.session.phase {
            Phase::ReadyToStart => {}
            Phase::WaitingForPlayers => return Err(GameError::NotEnoughPlayers),
            _ => return Err(GameError::GameInProgress),
        }

        self.session.phase = Phase::RoundResolving;
        info!("Game starting");

        Ok(vec![
            Effect::Broadcast(Packet::GameStarted {
                roster: self.session.roster(),
                round: self.session.round,
            }),
            self.schedule(START_DELAY_SECS, DelayedEvent::OpenRound),
        ])
    }

    /// Records one player's pick for the open round.
    ///
    /// Malformed or duplicate submissions are rejected without touching any
    /// state; the submitter can retry until the countdown runs out. The last
    /// active player to submit closes the round on the spot.
    pub fn submit(&mut self, player_id: u32, number: i32) -> Result<Vec<Effect>, GameError> {
        let player = self
            .session
            .player(player_id)
            .ok_or(GameError::UnknownPlayer)?;
        if player.eliminated {
            return Err(GameError::PlayerEliminated);
        }
        if self.session.phase != Phase::RoundOpen {
            return Err(GameError::RoundClosed);
        }

        let number = validate_choice(number).ok_or(GameError::ChoiceOutOfRange)?;
        if self.session.has_submitted(player_id) {
            return Err(GameError::AlreadySubmitted);
        }

        let player_name = player.name.clone();
        info!("{} chose {}", player_name, number);
        self.session
            .record_submission(Submission::new(player_id, player_name, number));

        if self.session.all_active_submitted() {
            // Disarm the timeout before resolving so the countdown reaching
            // zero later cannot resolve this round a second time.
            self.session.cancel_countdown();
            return Ok(self.resolve_round());
        }
        Ok(Vec::new())
    }

    /// One-second countdown tick from the server loop. Ignored outside an
    /// open round or when the countdown has been cancelled.
    pub fn timer_tick(&mut self) -> Vec<Effect> {
        if self.session.phase != Phase::RoundOpen {
            return Vec::new();
        }
        let Some(seconds_left) = self.session.tick_countdown() else {
            return Vec::new();
        };

        let mut effects = vec![Effect::Broadcast(Packet::TimerTick { seconds_left })];
        if seconds_left == 0 {
            self.session.cancel_countdown();
            self.auto_fill_missing();
            effects.extend(self.resolve_round());
        }
        effects
    }

    /// A scheduled transition coming due. Dropped when the session has been
    /// reset since it was scheduled, or when the phase moved on without it.
    pub fn delayed(&mut self, event: DelayedEvent, generation: u64) -> Vec<Effect> {
        if generation != self.session.generation() {
            debug!("Dropping stale delayed event {:?}", event);
            return Vec::new();
        }
        if self.session.phase != Phase::RoundResolving {
            debug!("Ignoring delayed event {:?} in {:?}", event, self.session.phase);
            return Vec::new();
        }

        match event {
            DelayedEvent::OpenRound => {
                self.session.open_round();
                info!("Round {} open", self.session.round);
                vec![Effect::Broadcast(Packet::RoundStarted {
                    round: self.session.round,
                    roster: self.session.roster(),
                    rule: self.session.latest_rule_text().to_string(),
                })]
            }
            DelayedEvent::FinishGame => {
                self.session.phase = Phase::GameEnded;
                let winner = self.session.active_players().next().cloned();
                match &winner {
                    Some(player) => info!("Game over, {} wins", player.name),
                    None => info!("Game over with no survivors"),
                }
                let effects = vec![Effect::Broadcast(Packet::GameEnded {
                    winner,
                    roster: self.session.roster(),
                })];
                self.session.reset();
                effects
            }
        }
    }

    /// Connection loss for a joined player.
    ///
    /// In the lobby the record is removed and the roster re-announced; once
    /// the game is running the record deliberately lingers so the round can
    /// still resolve. A lingering player can even win on a tie, and an
    /// abandoned game only ends through auto-filled rounds.
    pub fn disconnect(&mut self, player_id: u32) -> Vec<Effect> {
        if self.session.started() {
            if let Some(player) = self.session.player(player_id) {
                warn!(
                    "Player {} ({}) disconnected mid-game; record kept until the game ends",
                    player.id, player.name
                );
            }
            return Vec::new();
        }

        if self.session.remove_player(player_id).is_none() {
            return Vec::new();
        }
        self.session.phase = Phase::WaitingForPlayers;

        if self.session.players().is_empty() {
            self.session.reset();
            return Vec::new();
        }
        vec![Effect::Broadcast(Packet::PlayerJoined {
            roster: self.session.roster(),
        })]
    }

    /// Fills a random in-range pick for every active player that has not
    /// submitted, in roster order.
    fn auto_fill_missing(&mut self) {
        let missing: Vec<(u32, String)> = self
            .session
            .active_players()
            .filter(|p| !self.session.has_submitted(p.id))
            .map(|p| (p.id, p.name.clone()))
            .collect();

        let mut rng = rand::thread_rng();
        for (player_id, player_name) in missing {
            let number = rng.gen_range(CHOICE_MIN..=CHOICE_MAX) as u8;
            info!("Auto-submitting {} for {}", number, player_name);
            self.session
                .record_submission(Submission::new(player_id, player_name, number));
        }
    }

    /// Runs target → winner → scores over the closed round and decides
    /// whether the game continues.
    ///
    /// The elimination count is read once up front: all three stages of this
    /// resolution see the count as it stood when the round opened, even when
    /// the score update eliminates players mid-call.
    fn resolve_round(&mut self) -> Vec<Effect> {
        let eliminations = self.session.elimination_count;
        self.session.cancel_countdown();
        self.session.phase = Phase::RoundResolving;

        let submissions = self.session.submissions().to_vec();
        let average = match round_average(&submissions) {
            Ok(average) => average,
            Err(err) => {
                error!("Round {} resolution aborted: {}", self.session.round, err);
                return Vec::new();
            }
        };
        let target = round_target(average, eliminations);
        let Some(winner) = resolve_winner(&submissions, target, eliminations).cloned() else {
            error!("Round {} has no resolvable winner", self.session.round);
            return Vec::new();
        };

        info!(
            "Round {}: average {:.2}, target {:.2}, winner {}",
            self.session.round, average, target, winner.player_name
        );

        let newly_eliminated =
            apply_scores(self.session.players_mut(), winner.player_id, eliminations);

        let mut effects = Vec::new();
        for player_id in newly_eliminated {
            let name = self
                .session
                .player(player_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            info!("Player {} ({}) eliminated", player_id, name);
            effects.push(Effect::Broadcast(Packet::PlayerEliminated { player_id, name }));

            self.session.elimination_count += 1;
            if let Some(text) = self.session.unlock_current_rule() {
                info!("New rule unlocked: {}", text);
                effects.push(Effect::Broadcast(Packet::NewRuleUnlocked {
                    rule: text.to_string(),
                }));
            }
        }

        effects.push(Effect::Broadcast(Packet::RoundEnded {
            round: self.session.round,
            submissions,
            average,
            target,
            winner,
            roster: self.session.roster(),
        }));

        if self.session.active_count() <= 1 {
            effects.push(self.schedule(GAME_END_DELAY_SECS, DelayedEvent::FinishGame));
        } else {
            self.session.round += 1;
            effects.push(self.schedule(NEXT_ROUND_DELAY_SECS, DelayedEvent::OpenRound));
        }
        effects
    }

    fn schedule(&self, delay_secs: u64, event: DelayedEvent) -> Effect {
        Effect::Schedule {
            delay: Duration::from_secs(delay_secs),
            event,
            generation: self.session.generation(),
        }
    }
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::ROUND_SECONDS;

    fn broadcast_packets(effects: &[Effect]) -> Vec<&Packet> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Broadcast(packet) => Some(packet),
                _ => None,
            })
            .collect()
    }

    fn scheduled_events(effects: &[Effect]) -> Vec<DelayedEvent> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Schedule { event, .. } => Some(*event),
                _ => None,
            })
            .collect()
    }

    /// Joins four players, fires the start trigger and opens round 1.
    fn engine_in_round() -> GameEngine {
        let mut engine = GameEngine::new();
        for name in ["alice", "bob", "carol", "dave"] {
            engine.join(name).unwrap();
        }
        engine.start(1).unwrap();
        let generation = engine.session().generation();
        engine.delayed(DelayedEvent::OpenRound, generation);
        engine
    }

    fn submit_all(engine: &mut GameEngine, numbers: [i32; 4]) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (index, number) in numbers.iter().enumerate() {
            effects.extend(engine.submit(index as u32 + 1, *number).unwrap());
        }
        effects
    }

    #[test]
    fn test_join_fills_lobby_and_becomes_ready() {
        let mut engine = GameEngine::new();
        for (index, name) in ["alice", "bob", "carol"].iter().enumerate() {
            let (player_id, _) = engine.join(name).unwrap();
            assert_eq!(player_id, index as u32 + 1);
            assert_eq!(engine.session().phase, Phase::WaitingForPlayers);
        }

        let (_, effects) = engine.join("dave").unwrap();
        assert_eq!(engine.session().phase, Phase::ReadyToStart);

        let packets = broadcast_packets(&effects);
        assert!(matches!(
            packets.as_slice(),
            [Packet::PlayerJoined { roster }] if roster.len() == 4
        ));
    }

    #[test]
    fn test_join_rejections() {
        let mut engine = GameEngine::new();
        engine.join("alice").unwrap();

        assert_eq!(engine.join("  "), Err(GameError::EmptyName));
        assert_eq!(engine.join("ALICE"), Err(GameError::NameTaken));

        for name in ["bob", "carol", "dave"] {
            engine.join(name).unwrap();
        }
        assert_eq!(engine.join("erin"), Err(GameError::GameFull));

        engine.start(1).unwrap();
        assert_eq!(engine.join("erin"), Err(GameError::GameInProgress));
    }

    #[test]
    fn test_start_requires_full_lobby() {
        let mut engine = GameEngine::new();
        engine.join("alice").unwrap();
        assert_eq!(engine.start(1), Err(GameError::NotEnoughPlayers));
        assert_eq!(engine.start(99), Err(GameError::UnknownPlayer));

        for name in ["bob", "carol", "dave"] {
            engine.join(name).unwrap();
        }
        let effects = engine.start(1).unwrap();
        assert_eq!(scheduled_events(&effects), vec![DelayedEvent::OpenRound]);
        assert_eq!(engine.start(1), Err(GameError::GameInProgress));
    }

    #[test]
    fn test_round_opens_with_countdown_and_standard_rules() {
        let engine = engine_in_round();
        assert_eq!(engine.session().phase, Phase::RoundOpen);
        assert_eq!(engine.session().countdown(), Some(ROUND_SECONDS));
        assert_eq!(engine.session().latest_rule_text(), "Standard rules apply");
    }

    #[test]
    fn test_submit_validation() {
        let mut engine = engine_in_round();

        assert_eq!(engine.submit(99, 10), Err(GameError::UnknownPlayer));
        assert_eq!(engine.submit(1, 101), Err(GameError::ChoiceOutOfRange));
        assert_eq!(engine.submit(1, -1), Err(GameError::ChoiceOutOfRange));

        engine.submit(1, 50).unwrap();
        assert_eq!(engine.submit(1, 60), Err(GameError::AlreadySubmitted));
        // The rejected duplicate did not replace the original pick.
        assert_eq!(engine.session().submissions()[0].number, 50);
    }

    #[test]
    fn test_submit_outside_open_round_is_rejected() {
        let mut engine = GameEngine::new();
        for name in ["alice", "bob", "carol", "dave"] {
            engine.join(name).unwrap();
        }
        assert_eq!(engine.submit(1, 10), Err(GameError::RoundClosed));
    }

    #[test]
    fn test_full_round_resolution() {
        let mut engine = engine_in_round();
        let effects = submit_all(&mut engine, [20, 30, 40, 50]);

        let packets = broadcast_packets(&effects);
        let round_ended = packets
            .iter()
            .find_map(|packet| match packet {
                Packet::RoundEnded {
                    average,
                    target,
                    winner,
                    submissions,
                    ..
                } => Some((average, target, winner, submissions)),
                _ => None,
            })
            .expect("round should resolve once all four submitted");

        let (average, target, winner, submissions) = round_ended;
        assert_approx_eq!(*average, 35.0, 0.001);
        assert_approx_eq!(*target, 28.0, 0.001);
        assert_eq!(winner.player_id, 1);
        assert_eq!(submissions.len(), 4);

        // Losers dropped a point, the winner kept theirs.
        let scores: Vec<i32> = engine.session().players().iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![0, -1, -1, -1]);

        // Next round is scheduled, not ended.
        assert_eq!(scheduled_events(&effects), vec![DelayedEvent::OpenRound]);
        assert_eq!(engine.session().round, 2);
    }

    #[test]
    fn test_early_resolution_cancels_countdown() {
        let mut engine = engine_in_round();
        engine.timer_tick();
        let effects = submit_all(&mut engine, [20, 30, 40, 50]);
        assert!(!broadcast_packets(&effects).is_empty());

        // The countdown was cancelled at resolution; letting the old timer
        // run down must not resolve the round again.
        assert_eq!(engine.session().countdown(), None);
        for _ in 0..=ROUND_SECONDS {
            assert!(engine.timer_tick().is_empty());
        }
        assert_eq!(engine.session().round, 2);
    }

    #[test]
    fn test_timeout_auto_fills_missing_submissions() {
        let mut engine = engine_in_round();
        engine.submit(1, 25).unwrap();

        let mut resolved = Vec::new();
        for _ in 0..ROUND_SECONDS {
            resolved.extend(engine.timer_tick());
        }

        let packets = broadcast_packets(&resolved);
        let submissions = packets
            .iter()
            .find_map(|packet| match packet {
                Packet::RoundEnded { submissions, .. } => Some(submissions),
                _ => None,
            })
            .expect("timeout should force resolution");

        assert_eq!(submissions.len(), 4);
        assert_eq!(submissions[0].number, 25);
        // Auto-filled picks are always in range by construction (u8 from
        // gen_range(0..=100)); check ids instead of values.
        let ids: Vec<u32> = submissions.iter().map(|s| s.player_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        for submission in submissions.iter() {
            assert!(submission.number <= 100);
        }

        // A further tick after the timeout resolution does nothing.
        assert!(engine.timer_tick().is_empty());
    }

    #[test]
    fn test_timer_ticks_broadcast_remaining_seconds() {
        let mut engine = engine_in_round();
        let effects = engine.timer_tick();
        let packets = broadcast_packets(&effects);
        assert!(matches!(
            packets.as_slice(),
            [Packet::TimerTick { seconds_left }] if *seconds_left == ROUND_SECONDS - 1
        ));
    }

    #[test]
    fn test_elimination_unlocks_rule_and_next_round_announces_it() {
        let mut engine = engine_in_round();
        // Push bob to the brink, then have him lose the round.
        engine.session.players_mut()[1].score = -9;
        let effects = submit_all(&mut engine, [20, 30, 40, 50]);

        let packets = broadcast_packets(&effects);
        assert!(packets.iter().any(|packet| matches!(
            packet,
            Packet::PlayerEliminated { player_id: 2, name } if name == "bob"
        )));
        assert!(packets.iter().any(|packet| matches!(
            packet,
            Packet::NewRuleUnlocked { rule } if rule.contains("Double multiplier")
        )));
        assert_eq!(engine.session().elimination_count, 1);

        let generation = engine.session().generation();
        let started = engine.delayed(DelayedEvent::OpenRound, generation);
        let packets = broadcast_packets(&started);
        assert!(matches!(
            packets.as_slice(),
            [Packet::RoundStarted { round: 2, rule, .. }] if rule.contains("Double multiplier")
        ));
    }

    #[test]
    fn test_rules_use_count_frozen_at_round_start() {
        let mut engine = engine_in_round();
        // An elimination this round must not flip the round's own target
        // multiplier: it still resolves at ×0.8.
        engine.session.players_mut()[1].score = -9;
        let effects = submit_all(&mut engine, [20, 30, 40, 50]);

        let packets = broadcast_packets(&effects);
        let target = packets
            .iter()
            .find_map(|packet| match packet {
                Packet::RoundEnded { target, .. } => Some(*target),
                _ => None,
            })
            .unwrap();
        assert_approx_eq!(target, 28.0, 0.001);
        assert_eq!(engine.session().elimination_count, 1);
    }

    #[test]
    fn test_endgame_with_single_survivor() {
        let mut engine = engine_in_round();
        for player in engine.session.players_mut().iter_mut().skip(1) {
            player.score = -9;
        }
        let effects = submit_all(&mut engine, [20, 30, 40, 50]);

        assert_eq!(scheduled_events(&effects), vec![DelayedEvent::FinishGame]);
        assert_eq!(engine.session().active_count(), 1);
        assert_eq!(engine.session().elimination_count, 3);

        let generation = engine.session().generation();
        let ended = engine.delayed(DelayedEvent::FinishGame, generation);
        let packets = broadcast_packets(&ended);
        assert!(matches!(
            packets.as_slice(),
            [Packet::GameEnded { winner: Some(player), .. }] if player.name == "alice"
        ));

        // Full reset afterwards: fresh lobby, new generation.
        assert_eq!(engine.session().phase, Phase::WaitingForPlayers);
        assert!(engine.session().players().is_empty());
        assert_eq!(engine.session().generation(), generation + 1);
    }

    #[test]
    fn test_endgame_with_no_survivors() {
        let mut engine = engine_in_round();
        for player in engine.session.players_mut() {
            player.score = -10;
            player.eliminated = true;
        }
        engine.session.phase = Phase::RoundResolving;
        let generation = engine.session().generation();
        let ended = engine.delayed(DelayedEvent::FinishGame, generation);
        let packets = broadcast_packets(&ended);
        assert!(matches!(
            packets.as_slice(),
            [Packet::GameEnded { winner: None, .. }]
        ));
    }

    #[test]
    fn test_stale_delayed_events_are_dropped() {
        let mut engine = engine_in_round();
        let stale_generation = engine.session().generation();
        engine.session.reset();

        assert!(engine
            .delayed(DelayedEvent::OpenRound, stale_generation)
            .is_empty());
        assert!(engine
            .delayed(DelayedEvent::FinishGame, stale_generation)
            .is_empty());
        assert_eq!(engine.session().phase, Phase::WaitingForPlayers);
    }

    #[test]
    fn test_lobby_disconnect_frees_name_and_capacity() {
        let mut engine = GameEngine::new();
        for name in ["alice", "bob", "carol", "dave"] {
            engine.join(name).unwrap();
        }
        assert_eq!(engine.session().phase, Phase::ReadyToStart);

        let effects = engine.disconnect(2);
        assert_eq!(engine.session().phase, Phase::WaitingForPlayers);
        assert!(matches!(
            broadcast_packets(&effects).as_slice(),
            [Packet::PlayerJoined { roster }] if roster.len() == 3
        ));

        // The name is reusable and the lobby refills.
        let (player_id, _) = engine.join("bob").unwrap();
        assert_eq!(player_id, 5);
        assert_eq!(engine.session().phase, Phase::ReadyToStart);
    }

    #[test]
    fn test_midgame_disconnect_keeps_record() {
        let mut engine = engine_in_round();
        let effects = engine.disconnect(2);
        assert!(effects.is_empty());
        assert_eq!(engine.session().players().len(), 4);

        // The lingering player still blocks early resolution until the
        // countdown auto-fills for them.
        engine.submit(1, 20).unwrap();
        engine.submit(3, 40).unwrap();
        engine.submit(4, 50).unwrap();
        assert_eq!(engine.session().phase, Phase::RoundOpen);
    }

    #[test]
    fn test_empty_lobby_resets_session() {
        let mut engine = GameEngine::new();
        engine.join("alice").unwrap();
        let generation = engine.session().generation();

        engine.disconnect(1);
        assert!(engine.session().players().is_empty());
        assert_eq!(engine.session().generation(), generation + 1);
    }

    #[test]
    fn test_eliminated_player_cannot_submit() {
        let mut engine = engine_in_round();
        engine.session.players_mut()[2].eliminated = true;
        assert_eq!(engine.submit(3, 10), Err(GameError::PlayerEliminated));

        // The round closes without them.
        let effects = submit_all_except(&mut engine, [(1, 20), (2, 30), (4, 50)]);
        assert!(broadcast_packets(&effects)
            .iter()
            .any(|packet| matches!(packet, Packet::RoundEnded { .. })));
    }

    fn submit_all_except(engine: &mut GameEngine, picks: [(u32, i32); 3]) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (player_id, number) in picks {
            effects.extend(engine.submit(player_id, number).unwrap());
        }
        effects
    }
}

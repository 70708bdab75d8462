//! Round resolution: target computation, winner selection, score updates
//!
//! Everything here is a pure function over the submission list and roster so
//! resolution stays deterministic and directly testable. The elimination
//! count passed in is always the count as it stood when the round opened;
//! eliminations produced by a resolution never feed back into that same
//! round's rules.

use crate::error::GameError;
use crate::rules::{effect_active, RuleEffect};
use shared::{
    Player, Submission, DOUBLE_MULTIPLIER, ELIMINATION_THRESHOLD, LUCKY_NUMBER,
    STANDARD_MULTIPLIER,
};

/// Mean of all submitted numbers.
///
/// An empty submission list is a lifecycle bug, not a user error: rounds only
/// resolve after every active player has a submission (auto-filled on
/// timeout if need be), so the division by zero is surfaced as an explicit
/// error rather than produced silently.
pub fn round_average(submissions: &[Submission]) -> Result<f32, GameError> {
    if submissions.is_empty() {
        return Err(GameError::NoSubmissions);
    }

    let sum: u32 = submissions.iter().map(|s| u32::from(s.number)).sum();
    Ok(sum as f32 / submissions.len() as f32)
}

/// Derives the round target from the average.
///
/// The double-multiplier rule swaps the standard ×0.8 for ×1.6 once its
/// threshold is met; no other rule touches the target.
pub fn round_target(average: f32, eliminations: usize) -> f32 {
    if effect_active(RuleEffect::DoubleMultiplier, eliminations) {
        average * DOUBLE_MULTIPLIER
    } else {
        average * STANDARD_MULTIPLIER
    }
}

/// Picks the round winner from the submissions.
///
/// Selection policies are tried in strict priority order, first match wins:
///
/// 1. Reverse mode (≥2 eliminations): furthest pick from the target.
/// 2. Lucky number (≥3 eliminations): a pick of exactly 42 wins outright.
/// 3. Standard: closest pick to the target.
///
/// Reverse mode is deliberately checked before lucky number even though its
/// threshold is the lower of the two. Distance ties go to the earliest
/// submission; the caller keeps submissions in insertion order, which makes
/// tie-breaking deterministic.
pub fn resolve_winner<'a>(
    submissions: &'a [Submission],
    target: f32,
    eliminations: usize,
) -> Option<&'a Submission> {
    let (first, rest) = submissions.split_first()?;

    if effect_active(RuleEffect::ReverseWinner, eliminations) {
        let mut winner = first;
        let mut max_distance = distance_to(first, target);
        for submission in rest {
            let distance = distance_to(submission, target);
            if distance > max_distance {
                max_distance = distance;
                winner = submission;
            }
        }
        return Some(winner);
    }

    if effect_active(RuleEffect::LuckyNumber, eliminations) {
        if let Some(lucky) = submissions.iter().find(|s| s.number == LUCKY_NUMBER) {
            return Some(lucky);
        }
    }

    let mut winner = first;
    let mut min_distance = distance_to(first, target);
    for submission in rest {
        let distance = distance_to(submission, target);
        if distance < min_distance {
            min_distance = distance;
            winner = submission;
        }
    }
    Some(winner)
}

fn distance_to(submission: &Submission, target: f32) -> f32 {
    (f32::from(submission.number) - target).abs()
}

/// Applies the round's score deltas and flags fresh eliminations.
///
/// Every non-eliminated player is touched: the winner gains +1 under high
/// stakes (and nothing otherwise), every loser drops 2 under high stakes and
/// 1 otherwise. Players whose score falls to the elimination threshold are
/// marked eliminated; their ids are returned in roster order so the caller
/// can bump the elimination count once per player and announce each one.
pub fn apply_scores(players: &mut [Player], winner_id: u32, eliminations: usize) -> Vec<u32> {
    let high_stakes = effect_active(RuleEffect::HighStakes, eliminations);

    for player in players.iter_mut().filter(|p| p.is_active()) {
        if player.id == winner_id {
            if high_stakes {
                player.score += 1;
            }
        } else if high_stakes {
            player.score -= 2;
        } else {
            player.score -= 1;
        }
    }

    let mut newly_eliminated = Vec::new();
    for player in players.iter_mut() {
        if player.is_active() && player.score <= ELIMINATION_THRESHOLD {
            player.eliminated = true;
            newly_eliminated.push(player.id);
        }
    }
    newly_eliminated
}

//! Text rendering of server broadcasts.
//!
//! Each server packet becomes one printable line (or none for packets the
//! connection layer consumes silently). Kept free of I/O so formatting is
//! directly testable.

use shared::{Packet, Player};

/// Formats a server packet as a line of terminal output.
///
/// Returns `None` for packets that carry no user-facing information beyond
/// what the connection layer already acts on.
pub fn render(packet: &Packet) -> Option<String> {
    match packet {
        Packet::Joined { player_id } => Some(format!("You joined as player {}", player_id)),
        Packet::PlayerJoined { roster } => Some(format!(
            "Players in lobby: {}",
            roster
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        Packet::GameStarted { round, .. } => {
            Some(format!("Game started! Round {} begins shortly", round))
        }
        Packet::RoundStarted { round, rule, .. } => {
            Some(format!("--- Round {} --- rule: {}", round, rule))
        }
        Packet::TimerTick { seconds_left } => {
            // Only nag at the notable marks to keep the terminal readable.
            if *seconds_left <= 5 || seconds_left % 10 == 0 {
                Some(format!("{}s left", seconds_left))
            } else {
                None
            }
        }
        Packet::PlayerEliminated { name, .. } => Some(format!("{} has been eliminated!", name)),
        Packet::NewRuleUnlocked { rule } => Some(format!("NEW RULE: {}", rule)),
        Packet::RoundEnded {
            round,
            submissions,
            average,
            target,
            winner,
            roster,
        } => {
            let picks = submissions
                .iter()
                .map(|s| format!("{}={}", s.player_name, s.number))
                .collect::<Vec<_>>()
                .join(" ");
            Some(format!(
                "Round {} over: {} | average {:.2}, target {:.2} | winner: {} | {}",
                round,
                picks,
                average,
                target,
                winner.player_name,
                scoreboard(roster)
            ))
        }
        Packet::GameEnded { winner, roster } => {
            let headline = match winner {
                Some(player) => format!("GAME OVER: {} wins!", player.name),
                None => "GAME OVER: no winner".to_string(),
            };
            Some(format!("{} | final: {}", headline, scoreboard(roster)))
        }
        Packet::Error { message } => Some(format!("Error: {}", message)),
        _ => None,
    }
}

fn scoreboard(roster: &[Player]) -> String {
    roster
        .iter()
        .map(|player| {
            if player.eliminated {
                format!("{}: {} (out)", player.name, player.score)
            } else {
                format!("{}: {}", player.name, player.score)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

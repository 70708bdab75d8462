//! Escalating special-rule catalog
//!
//! Each elimination unlocks the next entry of a fixed catalog, but a rule's
//! effect stays active for every elimination count at or above its threshold.
//! That means several effects can apply to the same round at once: with four
//! eliminations on the board, the double multiplier, reverse winner,
//! lucky number and high stakes rules are all live simultaneously. Rule
//! applicability is therefore a per-effect threshold check, never an index
//! lookup of "the latest rule".

/// Behavioral override a catalog entry activates.
///
/// `PredictionTarget` is announced like the others but changes nothing in
/// round resolution; it exists only as a catalog descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    /// Target = average × 1.6 instead of × 0.8.
    DoubleMultiplier,
    /// Furthest pick from the target wins.
    ReverseWinner,
    /// A pick of exactly 42 wins outright.
    LuckyNumber,
    /// Winner gains +1, losers lose 2 instead of 1.
    HighStakes,
    /// Descriptor-only prediction rule.
    PredictionTarget,
}

/// One entry of the escalation catalog.
#[derive(Debug, Clone, Copy)]
pub struct SpecialRule {
    /// Minimum elimination count at which this rule's effect applies.
    pub threshold: usize,
    pub effect: RuleEffect,
    /// Announcement text broadcast when the rule unlocks.
    pub text: &'static str,
}

impl SpecialRule {
    /// True once the elimination count has reached this rule's threshold.
    pub fn is_active(&self, eliminations: usize) -> bool {
        eliminations >= self.threshold
    }
}

/// The full catalog in unlock order. Entry `n` unlocks at elimination `n + 1`.
pub const RULE_CATALOG: [SpecialRule; 5] = [
    SpecialRule {
        threshold: 1,
        effect: RuleEffect::DoubleMultiplier,
        text: "Double multiplier: Target = Average × 1.6 (instead of 0.8)",
    },
    SpecialRule {
        threshold: 2,
        effect: RuleEffect::ReverseWinner,
        text: "Reverse mode: Furthest from target wins",
    },
    SpecialRule {
        threshold: 3,
        effect: RuleEffect::LuckyNumber,
        text: "Lucky number: If you choose 42, you automatically win",
    },
    SpecialRule {
        threshold: 4,
        effect: RuleEffect::HighStakes,
        text: "High stakes: Winner gains +1 point, losers lose -2 points",
    },
    SpecialRule {
        threshold: 5,
        effect: RuleEffect::PredictionTarget,
        text: "Prediction mode: Target = Previous round's winner choice × 0.8",
    },
];

/// Rule text broadcast while no special rule has been unlocked yet.
pub const STANDARD_RULES_TEXT: &str = "Standard rules apply";

/// Whether the given effect applies at the given elimination count.
pub fn effect_active(effect: RuleEffect, eliminations: usize) -> bool {
    RULE_CATALOG
        .iter()
        .any(|rule| rule.effect == effect && rule.is_active(eliminations))
}

/// The catalog entry unlocked by reaching exactly `elimination_count`
/// eliminations, if the count addresses one.
///
/// Count 0 unlocks nothing, counts beyond the catalog return `None`.
pub fn unlocked_at(elimination_count: usize) -> Option<&'static SpecialRule> {
    elimination_count
        .checked_sub(1)
        .and_then(|index| RULE_CATALOG.get(index))
}

/// All rules whose threshold the elimination count has crossed, in catalog
/// order.
pub fn active_rules(eliminations: usize) -> impl Iterator<Item = &'static SpecialRule> {
    RULE_CATALOG
        .iter()
        .filter(move |rule| rule.is_active(eliminations))
}

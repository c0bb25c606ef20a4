//! Heuristic speaker attribution for interview transcripts.
//!
//! Transcripts carry no diarization, so each turn is labeled by an ordered list
//! of rules. The first rule that fires decides; a turn no rule claims belongs to
//! the guest. The rules favour labeling short ambiguous turns as the host's and
//! long ambiguous turns as the guest's.

use crate::types::Partition;

/// Turns inside this leading fraction of a transcript are the host's intro.
pub const INTRO_FRACTION: f64 = 0.05;

/// Interrogative turns shorter than this (in characters) are host prompts.
pub const SHORT_TURN_MAX_CHARS: usize = 200;

/// Phrases only the host says. Matched against the lowercased turn.
pub const HOST_SIGNATURES: &[&str] = &["welcome to the podcast", "i'm lenny", "today's guest"];

/// Which rule produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributionRule {
    Intro,
    HostSignature,
    ShortQuestion,
    Fallback,
}

impl AttributionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributionRule::Intro => "intro",
            AttributionRule::HostSignature => "host_signature",
            AttributionRule::ShortQuestion => "short_question",
            AttributionRule::Fallback => "fallback",
        }
    }
}

struct Turn<'a> {
    lowered: String,
    raw: &'a str,
    position_index: usize,
    total_segments: usize,
}

struct Rule {
    id: AttributionRule,
    label: Partition,
    applies: fn(&Turn<'_>) -> bool,
}

fn in_intro(turn: &Turn<'_>) -> bool {
    (turn.position_index as f64) < (turn.total_segments as f64) * INTRO_FRACTION
}

fn has_host_signature(turn: &Turn<'_>) -> bool {
    HOST_SIGNATURES.iter().any(|sig| turn.lowered.contains(sig))
}

fn is_short_question(turn: &Turn<'_>) -> bool {
    turn.raw.contains('?') && turn.raw.chars().count() < SHORT_TURN_MAX_CHARS
}

// Order is significant: earlier rules shadow later ones.
const RULES: [Rule; 3] = [
    Rule { id: AttributionRule::Intro, label: Partition::Subject, applies: in_intro },
    Rule { id: AttributionRule::HostSignature, label: Partition::Subject, applies: has_host_signature },
    Rule { id: AttributionRule::ShortQuestion, label: Partition::Subject, applies: is_short_question },
];

/// Labels one transcript turn. Total and deterministic.
pub fn classify(segment_text: &str, position_index: usize, total_segments: usize) -> Partition {
    explain(segment_text, position_index, total_segments).0
}

/// Like [`classify`], also reporting the rule that decided.
pub fn explain(segment_text: &str, position_index: usize, total_segments: usize) -> (Partition, AttributionRule) {
    let turn = Turn {
        lowered: segment_text.to_lowercase().replace('\u{2019}', "'"),
        raw: segment_text,
        position_index,
        total_segments,
    };
    RULES
        .iter()
        .find(|rule| (rule.applies)(&turn))
        .map(|rule| (rule.label, rule.id))
        .unwrap_or((Partition::Other, AttributionRule::Fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intro_boundary_is_exclusive() {
        // 5% of 100 is 5: positions 0..=4 are intro, 5 is not.
        let long = "a".repeat(300);
        assert_eq!(explain(&long, 4, 100).1, AttributionRule::Intro);
        assert_eq!(explain(&long, 5, 100).1, AttributionRule::Fallback);
    }

    #[test]
    fn curly_apostrophe_signature() {
        assert_eq!(explain("Hey everyone, I\u{2019}m Lenny and this is the show", 50, 100).1, AttributionRule::HostSignature);
    }

    #[test]
    fn question_length_counts_characters() {
        let q = format!("{}?", "é".repeat(198));
        assert_eq!(q.chars().count(), 199);
        assert_eq!(classify(&q, 90, 100), Partition::Subject);
        let q = format!("{}?", "é".repeat(199));
        assert_eq!(classify(&q, 90, 100), Partition::Other);
    }
}

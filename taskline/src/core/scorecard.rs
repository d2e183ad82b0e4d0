//! Scorecard model plus the deterministic parts of gatekeeper judgement.
//!
//! The total is never stored independently: it is always derived from the
//! five dimensions, which are range-checked on construction and on
//! deserialization.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::permission::PermissionLevel;
use crate::core::types::Decision;

/// Upper bound of a single dimension.
pub const MAX_DIMENSION: u8 = 5;
/// Upper bound of the total.
pub const MAX_TOTAL: u8 = 25;

/// Five-dimension quality evaluation, each dimension in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScorecard")]
pub struct Scorecard {
    correctness: u8,
    verification: u8,
    safety: u8,
    clarity: u8,
    autonomy: u8,
}

#[derive(Deserialize)]
struct RawScorecard {
    correctness: u8,
    verification: u8,
    safety: u8,
    clarity: u8,
    autonomy: u8,
}

impl TryFrom<RawScorecard> for Scorecard {
    type Error = String;

    fn try_from(raw: RawScorecard) -> Result<Self, Self::Error> {
        Scorecard::new(
            raw.correctness,
            raw.verification,
            raw.safety,
            raw.clarity,
            raw.autonomy,
        )
    }
}

impl Scorecard {
    /// Build a scorecard, rejecting any dimension above [`MAX_DIMENSION`].
    pub fn new(
        correctness: u8,
        verification: u8,
        safety: u8,
        clarity: u8,
        autonomy: u8,
    ) -> Result<Self, String> {
        let card = Self {
            correctness,
            verification,
            safety,
            clarity,
            autonomy,
        };
        for (name, value) in card.dimensions() {
            if value > MAX_DIMENSION {
                return Err(format!("{name} must be 0..={MAX_DIMENSION} (got {value})"));
            }
        }
        Ok(card)
    }

    /// Build a scorecard, clamping every dimension into range.
    pub fn clamped(
        correctness: u8,
        verification: u8,
        safety: u8,
        clarity: u8,
        autonomy: u8,
    ) -> Self {
        Self {
            correctness: correctness.min(MAX_DIMENSION),
            verification: verification.min(MAX_DIMENSION),
            safety: safety.min(MAX_DIMENSION),
            clarity: clarity.min(MAX_DIMENSION),
            autonomy: autonomy.min(MAX_DIMENSION),
        }
    }

    pub fn correctness(&self) -> u8 {
        self.correctness
    }

    pub fn verification(&self) -> u8 {
        self.verification
    }

    pub fn safety(&self) -> u8 {
        self.safety
    }

    pub fn clarity(&self) -> u8 {
        self.clarity
    }

    pub fn autonomy(&self) -> u8 {
        self.autonomy
    }

    pub fn total(&self) -> u8 {
        self.correctness + self.verification + self.safety + self.clarity + self.autonomy
    }

    /// Dimensions in canonical order, with their names.
    pub fn dimensions(&self) -> [(&'static str, u8); 5] {
        [
            ("correctness", self.correctness),
            ("verification", self.verification),
            ("safety", self.safety),
            ("clarity", self.clarity),
            ("autonomy", self.autonomy),
        ]
    }
}

/// Policy thresholds applied to the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    /// Candidate lessons are approved at or above this total.
    pub lesson_approval: u8,
    /// Permission promotion at or above this total.
    pub promotion: u8,
    /// Clone permission at or above this total.
    pub clone: u8,
    /// Minimum total for a portfolio entry to be retrieved as an example.
    pub example_min_score: u8,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            lesson_approval: 15,
            promotion: 20,
            clone: 22,
            example_min_score: 15,
        }
    }
}

/// Inputs of the deterministic fallback formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackInputs {
    pub total_actions: usize,
    pub blocked_actions: usize,
    pub plan_steps: usize,
    pub explanation_len: usize,
}

/// Deterministic scorecard used when the provider cannot judge the run.
pub fn fallback_scorecard(inputs: &FallbackInputs) -> Scorecard {
    let ratio = if inputs.total_actions == 0 {
        0.0
    } else {
        inputs.total_actions.saturating_sub(inputs.blocked_actions) as f64
            / inputs.total_actions as f64
    };
    let correctness = (ratio * 5.0).round() as u8;
    let verification = inputs.plan_steps.min(MAX_DIMENSION as usize) as u8;
    let safety = if inputs.blocked_actions == 0 {
        MAX_DIMENSION
    } else {
        MAX_DIMENSION
            .saturating_sub(inputs.blocked_actions.min(u8::MAX as usize) as u8)
            .max(1)
    };
    let clarity = if inputs.explanation_len >= 20 { 4 } else { 2 };
    let autonomy = 1 + (ratio * 4.0).round() as u8;
    Scorecard::clamped(correctness, verification, safety, clarity, autonomy)
}

static SCORE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\W*(correctness|verification|safety|clarity|autonomy)\W*[:=]\s*(-?\d+(?:\.\d+)?)",
    )
    .expect("score line regex should compile")
});

/// Parse `name: value` lines produced by the provider.
///
/// Values are rounded to the nearest integer and clamped into `0..=5`.
/// Returns `None` unless all five dimensions are present.
pub fn parse_provider_scores(text: &str) -> Option<Scorecard> {
    let mut values: [Option<u8>; 5] = [None; 5];
    for caps in SCORE_LINE_RE.captures_iter(text) {
        let name = caps.get(1)?.as_str().to_lowercase();
        let raw: f64 = caps.get(2)?.as_str().parse().ok()?;
        let value = raw.round().clamp(0.0, MAX_DIMENSION as f64) as u8;
        let slot = match name.as_str() {
            "correctness" => 0,
            "verification" => 1,
            "safety" => 2,
            "clarity" => 3,
            "autonomy" => 4,
            _ => continue,
        };
        if values[slot].is_none() {
            values[slot] = Some(value);
        }
    }
    let [c, v, s, cl, a] = values;
    Some(Scorecard::clamped(c?, v?, s?, cl?, a?))
}

/// Dimension score below which an improvement note is emitted.
const IMPROVEMENT_THRESHOLD: u8 = 4;

/// Canned improvement notes keyed to weak dimensions and safety risks.
pub fn improvement_notes(scorecard: &Scorecard, risk_count: usize) -> Vec<String> {
    let mut notes = Vec::new();
    for (name, value) in scorecard.dimensions() {
        if value >= IMPROVEMENT_THRESHOLD {
            continue;
        }
        let note = match name {
            "correctness" => {
                "Raise correctness: propose only actions the current permission level accepts."
            }
            "verification" => {
                "Raise verification: add an explicit check for every sub-problem in the plan."
            }
            "safety" => "Raise safety: avoid plan steps that trigger dangerous or blocked patterns.",
            "clarity" => "Raise clarity: explain what each action changes and why.",
            _ => "Raise autonomy: prefer actions that need no human approval.",
        };
        notes.push(note.to_string());
    }
    if risk_count > 0 {
        notes.push(format!(
            "Address the {risk_count} safety risk(s) reported before execution."
        ));
    }
    notes
}

/// Feedback text built from score-tier phrases and call-outs.
pub fn feedback(scorecard: &Scorecard, blocked_actions: usize) -> String {
    let total = scorecard.total();
    let mut parts = vec![match total {
        22.. => format!("Excellent run ({total}/{MAX_TOTAL})."),
        15..=21 => format!("Solid run ({total}/{MAX_TOTAL})."),
        10..=14 => format!("Acceptable run with gaps ({total}/{MAX_TOTAL})."),
        _ => format!("Weak run ({total}/{MAX_TOTAL})."),
    }];
    if blocked_actions > 0 {
        parts.push(format!(
            "{blocked_actions} action(s) were blocked by the permission policy."
        ));
    }
    if scorecard.safety() < 3 {
        parts.push("Safety needs attention.".to_string());
    }
    if scorecard.correctness() < 3 {
        parts.push("Correctness needs attention.".to_string());
    }
    parts.join(" ")
}

/// Apply the lesson, promotion and clone thresholds to a total.
pub fn decide(total: u8, thresholds: &ScoreThresholds, current: PermissionLevel) -> Decision {
    let promote = total >= thresholds.promotion;
    Decision {
        approve_lessons: total >= thresholds.lesson_approval,
        promote,
        new_level: promote.then(|| current.next()),
        allow_clone: total >= thresholds.clone,
    }
}

// ============================================================
// Layer 4 — Corpus Gatekeeper
// ============================================================
// Two independent, stateless checks:
//
//   validate_training_pair — may this (problem, solution) enter
//                            the trainable corpus?
//   score_prediction       — may this model output be shown?
//
// plus `estimate_confidence`, a heuristic score that ignores the
// model entirely and is used for corpus-side or rule-based figures.
//
// Every triggered issue is collected; callers get the full list.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::prediction::ValidationReport;

pub const MIN_PROBLEM_CHARS: usize = 10;
pub const MIN_SOLUTION_CHARS: usize = 5;
pub const MIN_PREDICTION_CHARS: usize = 3;
pub const INVALID_CONFIDENCE: f32 = 0.3;
pub const MODERATE_CONFIDENCE: f32 = 0.6;

/// A problem must mention at least one of these (case-insensitive).
const MATH_KEYWORDS: &[&str] = &[
    "solve", "calculate", "find", "derivative", "integral", "equation", "proof", "theorem",
];

const PLACEHOLDERS: &[&str] = &["your solution here", "answer", "fill in", "todo", "xxx"];

/// Denylist for corpus pairs: (label, pattern).
static PAIR_DENYLIST: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("undefined", r"(?i)undefined"),
        ("error", r"(?i)error"),
        ("cannot", r"(?i)cannot"),
        ("url", r"(?i)https?://"),
        ("mention", r"@[A-Za-z0-9_]+"),
        ("hashtag", r"#\w+"),
    ]
    .into_iter()
    .map(|(label, pat)| (label, Regex::new(pat).expect("static denylist pattern")))
    .collect()
});

/// Denylist for predictions, checked in order; the first hit wins.
static PREDICTION_DENYLIST: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["undefined", "error", "cannot", "nan", "infinity", "null", "none"]
        .into_iter()
        .map(|word| {
            let re = Regex::new(&format!("(?i){word}")).expect("static denylist pattern");
            (word, re)
        })
        .collect()
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*").expect("static number pattern"));
static SINGLE_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]\b").expect("static variable pattern"));
static WORDISH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]{2,}").expect("static word pattern"));
static OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=+\-*/<>]").expect("static operator pattern"));

// ─── Corpus side ──────────────────────────────────────────────────────────────

/// Outcome of `validate_training_pair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairVerdict {
    pub accepted: bool,
    pub issues: Vec<String>,
}

/// Decide whether a (problem, solution) pair may enter the corpus.
/// `accepted` is true iff no issue was raised.
pub fn validate_training_pair(problem: &str, solution: &str) -> PairVerdict {
    let problem_t = problem.trim();
    let solution_t = solution.trim();
    let mut issues = Vec::new();

    if problem_t.is_empty() {
        issues.push("Problem text is empty".to_string());
    }
    if solution_t.is_empty() {
        issues.push("Solution text is empty".to_string());
    }

    if problem_t.chars().count() < MIN_PROBLEM_CHARS {
        issues.push(format!(
            "Problem text is too short (minimum {MIN_PROBLEM_CHARS} characters)"
        ));
    }
    if solution_t.chars().count() < MIN_SOLUTION_CHARS {
        issues.push(format!(
            "Solution text is too short (minimum {MIN_SOLUTION_CHARS} characters)"
        ));
    }

    let problem_lower = problem_t.to_lowercase();
    if !MATH_KEYWORDS.iter().any(|k| problem_lower.contains(k)) {
        issues.push("Problem doesn't appear to be mathematical".to_string());
    }

    let problem_hits = denylist_hits(problem_t);
    if !problem_hits.is_empty() {
        issues.push(format!(
            "Problem contains invalid patterns: {}",
            problem_hits.join(", ")
        ));
    }
    let solution_hits = denylist_hits(solution_t);
    if !solution_hits.is_empty() {
        issues.push(format!(
            "Solution contains invalid patterns: {}",
            solution_hits.join(", ")
        ));
    }

    let solution_lower = solution_t.to_lowercase();
    if PLACEHOLDERS.iter().any(|p| solution_lower.contains(p)) {
        issues.push("Solution appears to contain placeholder text".to_string());
    }

    if solution_t.split_whitespace().count() < 3 && problem_t.split_whitespace().count() > 10 {
        issues.push("Solution seems too brief for the complexity of the problem".to_string());
    }

    PairVerdict {
        accepted: issues.is_empty(),
        issues,
    }
}

fn denylist_hits(text: &str) -> Vec<&'static str> {
    PAIR_DENYLIST
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(label, _)| *label)
        .collect()
}

// ─── Prediction side ──────────────────────────────────────────────────────────

/// Grade a pipeline prediction before it is shown.
pub fn score_prediction(problem: &str, prediction: &str, confidence: f32) -> ValidationReport {
    let mut report = ValidationReport::new(confidence);

    if confidence < INVALID_CONFIDENCE {
        report.reject(format!("Low confidence score (below {INVALID_CONFIDENCE})"));
    } else if confidence < MODERATE_CONFIDENCE {
        report
            .warnings
            .push(format!("Moderate confidence score (below {MODERATE_CONFIDENCE})"));
    }

    if prediction.trim().chars().count() < MIN_PREDICTION_CHARS {
        report.reject("Prediction too short or empty");
    }

    if let Some((word, _)) = PREDICTION_DENYLIST.iter().find(|(_, re)| re.is_match(prediction)) {
        report.reject(format!("Contains {word}"));
    }

    let problem_numbers: HashSet<&str> = NUMBER_RE.find_iter(problem).map(|m| m.as_str()).collect();
    let prediction_numbers: HashSet<&str> =
        NUMBER_RE.find_iter(prediction).map(|m| m.as_str()).collect();
    if !problem_numbers.is_empty() && problem_numbers.is_disjoint(&prediction_numbers) {
        report
            .suggestions
            .push("Prediction may not use numbers from the problem".to_string());
    }

    let problem_vars = single_letters(problem);
    let prediction_vars = single_letters(prediction);
    if !problem_vars.is_empty() && problem_vars.is_disjoint(&prediction_vars) {
        report
            .suggestions
            .push("Prediction may not use variables from the problem".to_string());
    }

    let p = problem.to_lowercase();
    let q = prediction.to_lowercase();
    if !q.is_empty() && !p.is_empty() && (p.contains(&q) || q.contains(&p)) {
        report
            .warnings
            .push("Prediction closely resembles the problem statement".to_string());
    }

    report
}

fn single_letters(text: &str) -> HashSet<String> {
    SINGLE_LETTER_RE
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

// ─── Heuristic confidence ─────────────────────────────────────────────────────

/// Model-independent confidence for a (problem, solution) pair, in
/// [0, 1], rounded to two decimals.
pub fn estimate_confidence(_problem: &str, solution: &str) -> f32 {
    let solution = solution.trim();
    let len = solution.chars().count();
    let mut confidence = 1.0f64;

    if len < 10 {
        confidence *= 0.7;
    }
    if len > 200 {
        confidence *= 0.9;
    }
    if len > 500 {
        confidence *= 0.8 / 0.9;
    }

    if WORDISH_RE.find_iter(solution).count() > 3 {
        confidence *= 0.9;
    }
    if solution.chars().any(|c| c.is_ascii_digit()) {
        confidence *= 1.1;
    }
    if OPERATOR_RE.is_match(solution) {
        confidence *= 1.05;
    }

    let clamped = confidence.clamp(0.0, 1.0);
    ((clamped * 100.0).round() / 100.0) as f32
}

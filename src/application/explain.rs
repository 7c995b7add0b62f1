// ============================================================
// Layer 2 — Explanation Tables
// ============================================================
// Table-driven decoration for a predicted solution. Nothing in
// here looks at the model; every function is a pure lookup over
// the problem text.
//
//   extract_concepts → top-3 concepts by keyword hits
//   generate_steps   → first matching step template, with the
//                      solution interpolated into the last step
//   explanation      → fixed outline plus one strategy line
//                      chosen by pattern
//   extract_variables→ single letters (optionally followed by a
//                      digit), sorted and deduplicated
//
// Tables are ordered; the first match wins and ties in concept
// scores keep table order.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

pub const GENERAL_MATHEMATICS: &str = "general mathematics";
const MAX_CONCEPTS: usize = 3;

// ─── Concepts ─────────────────────────────────────────────────────────────────

const CONCEPT_TABLE: &[(&str, &[&str])] = &[
    ("algebra", &[
        "solve", "equation", "variable", "x", "y", "z", "algebra", "polynomial", "quadratic", "linear",
    ]),
    ("calculus", &[
        "derivative", "integral", "limit", "differentiate", "calculus", "differentiation", "integration",
    ]),
    ("geometry", &[
        "area", "volume", "angle", "circle", "triangle", "geometry", "perimeter", "radius", "diameter",
        "pythagorean",
    ]),
    ("trigonometry", &[
        "sin", "cos", "tan", "trig", "angle", "trigonometry", "sine", "cosine", "tangent", "cotangent",
    ]),
    ("probability", &[
        "probability", "chance", "likely", "random", "stats", "odds", "expectation", "distribution",
    ]),
    ("statistics", &[
        "mean", "median", "mode", "standard deviation", "statistics", "variance", "correlation",
    ]),
    ("arithmetic", &[
        "add", "subtract", "multiply", "divide", "sum", "difference", "product", "quotient", "fraction",
        "decimal",
    ]),
];

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("static word pattern"));

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z][0-9]?\b").expect("static variable pattern"));

/// A keyword hits when it equals a word of the text, or when it is at
/// least five letters long and prefixes one ("derivatives", "angles").
/// Multi-word keywords match as a phrase.
fn keyword_hits(keyword: &str, words: &[&str], lowered: &str) -> bool {
    if keyword.contains(' ') {
        return lowered.contains(keyword);
    }
    words
        .iter()
        .any(|w| *w == keyword || (keyword.len() >= 5 && w.starts_with(keyword)))
}

/// Up to three concepts ranked by number of distinct keyword hits, or
/// `["general mathematics"]` when nothing matches.
pub fn extract_concepts(problem: &str) -> Vec<String> {
    let lowered = problem.to_lowercase();
    let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut scored: Vec<(&str, usize)> = CONCEPT_TABLE
        .iter()
        .map(|(concept, keywords)| {
            let hits = keywords.iter().filter(|k| keyword_hits(k, &words, &lowered)).count();
            (*concept, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .collect();
    // Stable: equal scores keep table order.
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    if scored.is_empty() {
        return vec![GENERAL_MATHEMATICS.to_string()];
    }
    scored.into_iter().take(MAX_CONCEPTS).map(|(c, _)| c.to_string()).collect()
}

// ─── Steps ────────────────────────────────────────────────────────────────────

struct StepTemplate {
    triggers: &'static [&'static str],
    steps:    &'static [&'static str],
    /// Prefix of the final step; the solution is appended.
    last:     &'static str,
}

const STEP_TEMPLATES: &[StepTemplate] = &[
    StepTemplate {
        triggers: &["solve for", "="],
        steps: &[
            "Step 1: Identify the equation and variables",
            "Step 2: Simplify both sides of the equation",
            "Step 3: Isolate the variable term",
            "Step 4: Solve for the variable",
        ],
        last: "Step 5: Verify the solution: ",
    },
    StepTemplate {
        triggers: &["derivative"],
        steps: &[
            "Step 1: Identify the function to differentiate",
            "Step 2: Apply differentiation rules (power rule, chain rule, etc.)",
            "Step 3: Simplify the derivative expression",
        ],
        last: "Step 4: Final derivative: ",
    },
    StepTemplate {
        triggers: &["integral", "∫"],
        steps: &[
            "Step 1: Identify the function to integrate",
            "Step 2: Find the antiderivative",
            "Step 3: Apply integration techniques (substitution, parts, etc.)",
            "Step 4: Add constant of integration if needed",
        ],
        last: "Step 5: Final integral: ",
    },
];

const GENERIC_STEPS: StepTemplate = StepTemplate {
    triggers: &[],
    steps: &[
        "Step 1: Understand the problem statement",
        "Step 2: Identify known values and variables",
        "Step 3: Apply appropriate mathematical operations",
        "Step 4: Simplify the solution",
    ],
    last: "Step 5: Final answer: ",
};

/// Steps of the first template whose trigger occurs in the problem.
pub fn generate_steps(problem: &str, solution: &str) -> Vec<String> {
    let lowered = problem.to_lowercase();
    let template = STEP_TEMPLATES
        .iter()
        .find(|t| t.triggers.iter().any(|trigger| lowered.contains(trigger)))
        .unwrap_or(&GENERIC_STEPS);

    let mut steps: Vec<String> = template.steps.iter().map(|s| s.to_string()).collect();
    steps.push(format!("{}{solution}", template.last));
    steps
}

// ─── Explanation ──────────────────────────────────────────────────────────────

const STRATEGIES: &[(&[&str], &str)] = &[
    (&["solve for", "="], "Isolated the variable and solved the equation"),
    (&["derivative"], "Applied differentiation rules and power rule"),
    (&["integral", "∫"], "Applied integration techniques and found antiderivative"),
    (&["limit"], "Evaluated the limit using appropriate methods"),
    (&["area", "volume"], "Used geometric formulas to calculate measurement"),
    (&["probability"], "Calculated probability using statistical methods"),
];

/// Outline of how the answer was reached, with a strategy line when
/// the problem matches one.
pub fn explanation(problem: &str, solution: &str) -> Vec<String> {
    let lowered = problem.to_lowercase();
    let mut lines = vec![
        format!("Analyzed the problem: '{problem}'"),
        "Identified mathematical concepts and patterns".to_string(),
        "Applied appropriate solution strategy".to_string(),
        format!("Arrived at solution: {solution}"),
    ];
    if let Some((_, strategy)) = STRATEGIES
        .iter()
        .find(|(triggers, _)| triggers.iter().any(|t| lowered.contains(t)))
    {
        lines.insert(2, strategy.to_string());
    }
    lines
}

// ─── Variables ────────────────────────────────────────────────────────────────

pub fn extract_variables(problem: &str) -> Vec<String> {
    VARIABLE_RE
        .find_iter(problem)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

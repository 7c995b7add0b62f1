// ============================================================
// Layer 4 — Text Normalizer
// ============================================================
// Canonicalises problem and solution text before it is
// vectorised or used as a label, so that "2 × 3" and "2*3"
// land on the same tokens.
//
// Steps (applied in order):
//   1. Lower-case
//   2. Literal notation substitution (LaTeX commands and the
//      matching Unicode symbols → spelled-out words / ASCII ops)
//   3. Replace every character outside the allow-list with a space
//   4. Collapse whitespace runs to one space and trim
//
// The output alphabet after step 3 contains no backslashes and
// none of the substituted symbols, so a second pass changes
// nothing: normalize(normalize(x)) == normalize(x).

use std::sync::LazyLock;

use regex::Regex;

/// Literal substitutions. Longer LaTeX commands come first so
/// `\infty` is not eaten by `\int`.
const NOTATION: &[(&str, &str)] = &[
    ("\\rightarrow", " approaches "),
    ("\\approx", " approximately "),
    ("\\infty", " infinity "),
    ("\\times", " * "),
    ("\\theta", " theta "),
    ("\\alpha", " alpha "),
    ("\\gamma", " gamma "),
    ("\\cdot", " * "),
    ("\\sqrt", " sqrt "),
    ("\\frac", " frac "),
    ("\\beta", " beta "),
    ("\\div", " / "),
    ("\\int", " integral "),
    ("\\sum", " sum "),
    ("\\neq", " not equal "),
    ("\\leq", " less than or equal "),
    ("\\geq", " greater than or equal "),
    ("\\pm", " plus minus "),
    ("\\pi", " pi "),
    ("×", " * "),
    ("·", " * "),
    ("÷", " / "),
    ("√", " sqrt "),
    ("π", " pi "),
    ("θ", " theta "),
    ("α", " alpha "),
    ("β", " beta "),
    ("γ", " gamma "),
    ("∫", " integral "),
    ("∑", " sum "),
    ("∞", " infinity "),
    ("±", " plus minus "),
    ("≈", " approximately "),
    ("≠", " not equal "),
    ("≤", " less than or equal "),
    ("≥", " greater than or equal "),
    ("→", " approaches "),
    ("−", "-"),
];

/// Symbols kept besides alphanumerics and whitespace.
const KEPT_SYMBOLS: &[char] = &['+', '-', '*', '/', '=', '<', '>', '(', ')', '.', '^'];

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]+").expect("static token pattern"));

/// Canonical form of `text`. Total over all inputs; "" maps to "".
pub fn normalize(text: &str) -> String {
    let mut s = text.to_lowercase();

    for (pattern, replacement) in NOTATION {
        if s.contains(pattern) {
            s = s.replace(pattern, replacement);
        }
    }

    let filtered: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || KEPT_SYMBOLS.contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token candidates of already-normalized text: word runs and
/// operator runs, in order. Mirrors the Whitespace pre-tokenizer
/// used by the vocabulary, so counts at fit time match ids at
/// transform time.
pub fn tokenize_candidates(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Display form: trimmed with whitespace collapsed, case kept.
pub fn display_form(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

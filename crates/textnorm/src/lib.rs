//! Converts math/scientific notation embedded in narration text into spoken
//! English before it is handed to a TTS backend — otherwise "$h$" comes out
//! as "dollar h dollar" and "x^2" as "x caret two".
//!
//! Pure, allocation-light, no network or filesystem dependency: the whole
//! module is testable with string fixtures.

mod latex;
mod numbers;

use once_cell::sync::Lazy;
use regex::Regex;

pub use numbers::number_to_words;

/// Runs the full normalization pipeline over `text`.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return text.to_string();
    }

    let mut result = convert_inline_math(text);
    result = latex::convert_structural(&result);
    result = handle_plain_text_math(&result);
    result = clean_remaining_latex(&result);
    result = handle_numbers(&result);
    collapse_whitespace(&result)
}

static INLINE_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([^$]+)\$").unwrap());

fn convert_inline_math(text: &str) -> String {
    INLINE_MATH
        .replace_all(text, |caps: &regex::Captures| latex::latex_to_words(&caps[1]))
        .into_owned()
}

static OP_PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9])\+([a-zA-Z0-9])").unwrap());
static OP_MINUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9])-([a-zA-Z0-9])").unwrap());
static OP_EQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9])=([a-zA-Z0-9])").unwrap());
static EQ_GENERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*=\s*").unwrap());
static PLUS_GENERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\+\s*").unwrap());
static POWER_2_STRICT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z])2(?![0-9])").unwrap());
static POWER_3_STRICT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z])3(?![0-9])").unwrap());
static DYDX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdydx\b").unwrap());
static DDX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bddx\b").unwrap());

const UNICODE_MAP: &[(&str, &str)] = &[
    ("−", "-"),
    ("±", " plus or minus "),
    ("×", " times "),
    ("÷", " divided by "),
    ("≤", " less than or equal to "),
    ("≥", " greater than or equal to "),
    ("≠", " not equal to "),
    ("≈", " approximately "),
    ("≡", " equivalent to "),
    ("∞", " infinity "),
    ("∫", " integral of "),
    ("√", " square root of "),
];

const GREEK_MAP: &[(&str, &str)] = &[
    ("α", "alpha"),
    ("β", "beta"),
    ("γ", "gamma"),
    ("δ", "delta"),
    ("ε", "epsilon"),
    ("θ", "theta"),
    ("λ", "lambda"),
    ("μ", "mu"),
    ("π", "pi"),
    ("σ", "sigma"),
    ("ω", "omega"),
    ("φ", "phi"),
    ("ψ", "psi"),
    ("ρ", "rho"),
    ("τ", "tau"),
    ("Δ", "Delta"),
    ("Σ", "Sigma"),
    ("Ω", "Omega"),
];

fn handle_plain_text_math(text: &str) -> String {
    let mut result = text.to_string();

    for (ch, replacement) in UNICODE_MAP {
        result = result.replace(ch, replacement);
    }
    for (ch, name) in GREEK_MAP {
        result = result.replace(ch, &format!(" {name} "));
    }

    result = OP_PLUS.replace_all(&result, "$1 plus $2").into_owned();
    result = OP_MINUS.replace_all(&result, "$1 minus $2").into_owned();
    result = OP_EQ.replace_all(&result, "$1 equals $2").into_owned();
    result = EQ_GENERIC.replace_all(&result, " equals ").into_owned();
    result = PLUS_GENERIC.replace_all(&result, " plus ").into_owned();

    result = POWER_2_STRICT.replace_all(&result, "$1 squared").into_owned();
    result = POWER_3_STRICT.replace_all(&result, "$1 cubed").into_owned();

    result = DYDX.replace_all(&result, "dy by dx").into_owned();
    result = DDX.replace_all(&result, "d by dx").into_owned();

    result
}

static LATEX_ENV: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\begin\{[^}]+\}|\\end\{[^}]+\}").unwrap());
static LATEX_CMD_WITH_ARG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[a-zA-Z]+\s*\{([^}]*)\}").unwrap());
static LATEX_BARE_CMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[a-zA-Z]+").unwrap());
static LATEX_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\[|\\\]").unwrap());
static BRACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[{}]").unwrap());

fn clean_remaining_latex(text: &str) -> String {
    let mut result = LATEX_BRACKETS.replace_all(text, "").into_owned();
    result = LATEX_ENV.replace_all(&result, "").into_owned();
    result = LATEX_CMD_WITH_ARG.replace_all(&result, "$1").into_owned();
    result = LATEX_BARE_CMD.replace_all(&result, "").into_owned();
    result = BRACES.replace_all(&result, "").into_owned();
    result
}

static DIGIT_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)([a-zA-Z])").unwrap());
static NUMBER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

fn handle_numbers(text: &str) -> String {
    let separated = DIGIT_LETTER.replace_all(text, "$1 $2").into_owned();
    NUMBER_RUN
        .replace_all(&separated, |caps: &regex::Captures| {
            let n: u64 = caps[0].parse().unwrap_or(0);
            number_to_words(n)
        })
        .into_owned()
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_passes_through() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn inline_math_power_becomes_squared() {
        assert_eq!(normalize("$x^2$"), "x squared");
    }

    #[test]
    fn common_fraction_shortcut() {
        assert_eq!(normalize(r"\frac{1}{2} of the total"), "one half of the total");
    }

    #[test]
    fn sqrt_is_spoken() {
        assert_eq!(normalize(r"\sqrt{x}"), "square root of x");
    }

    #[test]
    fn unicode_math_operators_are_replaced() {
        let out = normalize("a × b ÷ c");
        assert!(out.contains("times"));
        assert!(out.contains("divided by"));
    }

    #[test]
    fn greek_letters_are_named() {
        let out = normalize("α plus β");
        assert!(out.contains("alpha"));
        assert!(out.contains("beta"));
    }

    #[test]
    fn bare_numbers_become_words() {
        assert_eq!(normalize("there are 12 items"), "there are twelve items");
        assert_eq!(normalize("45 apples"), "forty-five apples");
    }

    #[test]
    fn already_normalized_text_is_a_no_op() {
        let first = normalize("the square root of x equals forty-five");
        let second = normalize(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(normalize("a   b\n\tc"), "a b c");
    }
}

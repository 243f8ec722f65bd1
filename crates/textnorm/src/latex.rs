//! Converts the content of a LaTeX-ish inline-math span (`$...$`) or a
//! `\frac`/`\sqrt` expression found elsewhere in the text to spoken words.

use once_cell::sync::Lazy;
use regex::Regex;

const COMMON_FRACTIONS: &[(&str, &str)] = &[
    ("1/2", "one half"),
    ("1/3", "one third"),
    ("2/3", "two thirds"),
    ("1/4", "one quarter"),
    ("3/4", "three quarters"),
    ("1/5", "one fifth"),
    ("1/6", "one sixth"),
    ("1/8", "one eighth"),
    ("1/10", "one tenth"),
];

const GREEK_LETTERS: &[(&str, &str)] = &[
    (r"\alpha", "alpha"),
    (r"\beta", "beta"),
    (r"\gamma", "gamma"),
    (r"\delta", "delta"),
    (r"\epsilon", "epsilon"),
    (r"\theta", "theta"),
    (r"\lambda", "lambda"),
    (r"\mu", "mu"),
    (r"\pi", "pi"),
    (r"\sigma", "sigma"),
    (r"\omega", "omega"),
    (r"\phi", "phi"),
    (r"\psi", "psi"),
    (r"\rho", "rho"),
    (r"\tau", "tau"),
    (r"\eta", "eta"),
    (r"\zeta", "zeta"),
    (r"\nu", "nu"),
    (r"\xi", "xi"),
    (r"\chi", "chi"),
    (r"\Delta", "Delta"),
    (r"\Sigma", "Sigma"),
    (r"\Pi", "Pi"),
    (r"\Omega", "Omega"),
];

const MATH_SYMBOLS: &[(&str, &str)] = &[
    (r"\times", " times "),
    (r"\cdot", " times "),
    (r"\div", " divided by "),
    (r"\pm", " plus or minus "),
    (r"\mp", " minus or plus "),
    (r"\leq", " less than or equal to "),
    (r"\geq", " greater than or equal to "),
    (r"\neq", " not equal to "),
    (r"\approx", " approximately "),
    (r"\equiv", " is equivalent to "),
    (r"\infty", " infinity "),
    (r"\sum", "sum of "),
    (r"\prod", "product of "),
    (r"\int", "integral of "),
    (r"\partial", "partial "),
    (r"\nabla", "del "),
    (r"\rightarrow", " goes to "),
    (r"\leftarrow", " from "),
    (r"\Rightarrow", " implies "),
    (r"\therefore", "therefore "),
    (r"\degree", " degrees"),
    (r"\circ", " degrees"),
];

static GENERAL_FRAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\frac\s*\{([^}]+)\}\s*\{([^}]+)\}").unwrap());
static POWER_BRACED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9]+)\s*\^\s*\{([^}]+)\}").unwrap());
static POWER_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9]+)\s*\^\s*([0-9])").unwrap());
static SQRT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\sqrt\s*\{([^}]+)\}").unwrap());
static BARE_COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[a-zA-Z]+").unwrap());
static BRACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[{}]").unwrap());

/// Converts unambiguous LaTeX structures (`\frac`, `x^2`, `\sqrt{}`, Greek
/// commands, math-symbol commands) to words wherever they appear — this is
/// safe to run over plain narration text too, since none of these patterns
/// occur outside deliberate math notation.
pub fn convert_structural(text: &str) -> String {
    let mut result = text.to_string();

    for (pattern, replacement) in COMMON_FRACTIONS {
        let needle = format!(r"\frac{{{}}}", pattern.replace('/', "}{"));
        result = result.replace(&needle, replacement);
    }

    result = GENERAL_FRAC
        .replace_all(&result, |caps: &regex::Captures| {
            let num = spoken_if_latex(caps[1].trim());
            let denom = spoken_if_latex(caps[2].trim());
            format!("{num} over {denom}")
        })
        .into_owned();

    result = POWER_BRACED
        .replace_all(&result, |caps: &regex::Captures| power_replacement(&caps[1], caps[2].trim()))
        .into_owned();
    result = POWER_BARE
        .replace_all(&result, |caps: &regex::Captures| power_replacement(&caps[1], &caps[2]))
        .into_owned();

    result = SQRT
        .replace_all(&result, |caps: &regex::Captures| {
            format!("square root of {}", spoken_if_latex(caps[1].trim()))
        })
        .into_owned();

    for (pattern, replacement) in GREEK_LETTERS {
        result = result.replace(pattern, replacement);
    }
    for (pattern, replacement) in MATH_SYMBOLS {
        result = result.replace(pattern, replacement);
    }

    result
}

/// Converts the content of an inline-math span (`$...$`) to words. Structural
/// conversion runs first, then any operator characters still present (this is
/// a math span, so `+`/`-`/`=`/`/` are unambiguously operators) are spelled
/// out and stray commands/braces are stripped.
pub fn latex_to_words(latex: &str) -> String {
    let mut result = convert_structural(latex.trim());

    result = result.replace('=', " equals ");
    result = result.replace('+', " plus ");
    result = result.replace('-', " minus ");
    result = result.replace('*', " times ");
    result = result.replace('/', " over ");
    result = result.replace('<', " less than ");
    result = result.replace('>', " greater than ");

    result = BARE_COMMAND.replace_all(&result, "").into_owned();
    result = BRACES.replace_all(&result, "").into_owned();

    result.trim().to_string()
}

fn spoken_if_latex(s: &str) -> String {
    if s.contains('\\') { convert_structural(s) } else { s.to_string() }
}

fn power_replacement(base: &str, exp: &str) -> String {
    let base_spoken = spoken_if_latex(base.trim());
    match exp {
        "2" => format!("{base_spoken} squared"),
        "3" => format!("{base_spoken} cubed"),
        other => format!("{base_spoken} to the power of {}", spoken_if_latex(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_fraction_shortcut() {
        assert_eq!(latex_to_words(r"\frac{1}{2}"), "one half");
    }

    #[test]
    fn general_fraction_falls_back_to_over() {
        assert_eq!(latex_to_words(r"\frac{3}{7}"), "3 over 7");
    }

    #[test]
    fn braced_power_squared() {
        assert_eq!(latex_to_words("x^{2}"), "x squared");
    }

    #[test]
    fn bare_power_cubed() {
        assert_eq!(latex_to_words("x^3"), "x cubed");
    }

    #[test]
    fn power_of_n_falls_back() {
        assert_eq!(latex_to_words("x^5"), "x to the power of 5");
    }

    #[test]
    fn sqrt_wraps_content() {
        assert_eq!(latex_to_words(r"\sqrt{x}"), "square root of x");
    }

    #[test]
    fn greek_letter_command() {
        assert_eq!(latex_to_words(r"\alpha"), "alpha");
    }
}

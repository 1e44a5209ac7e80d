//! Math-delimiter normalization for streamed answer text.

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};

lazy_static! {
    /// Ordered rewrite rules, display-math brackets before inline parens.
    static ref MATH_RULES: [(Regex, &'static str); 4] = [
        (Regex::new(r"\\\[\s*").unwrap(), "$$"),
        (Regex::new(r"\s*\\\]").unwrap(), "$$"),
        (Regex::new(r"\\\(\s*").unwrap(), "$"),
        (Regex::new(r"\s*\\\)").unwrap(), "$"),
    ];
}

/// Rewrites vendor math delimiters into plain dollar conventions.
///
/// `\[ x \]` becomes `$$x$$` and `\( x \)` becomes `$x$`, with whitespace
/// hugging the delimiters absorbed. Applied to each chunk as it is flushed,
/// so a delimiter split across two chunks passes through unchanged.
pub fn normalize_math(chunk: &str) -> String {
    let mut text = chunk.to_string();
    for (pattern, replacement) in MATH_RULES.iter() {
        text = pattern.replace_all(&text, NoExpand(replacement)).into_owned();
    }
    text
}

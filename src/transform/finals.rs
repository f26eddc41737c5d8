//! `final` modifier stripping
//!
//! Removes `final` where it modifies a class, method or class constant so
//! test doubles can extend or override the declaration. The keyword and
//! the whitespace directly after it are dropped; every other byte is kept.

use super::lexer::{next_significant, prev_significant, tokenize, Token, TokenKind};
use super::ModifierStripper;

/// Tokens that may follow a `final` modifier
const MODIFIED: &[&str] = &[
    "class",
    "abstract",
    "readonly",
    "public",
    "protected",
    "private",
    "static",
    "function",
    "const",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct FinalStripper;

impl FinalStripper {
    pub fn new() -> Self {
        FinalStripper
    }
}

fn is_modifier(tokens: &[Token<'_>], index: usize) -> bool {
    if !tokens[index].is_name("final") {
        return false;
    }

    if let Some(prev) = prev_significant(tokens, index) {
        let prev = &tokens[prev];
        if ["->", "?->", "::"].iter().any(|s| prev.is_symbol(s))
            || ["function", "const", "new"].iter().any(|n| prev.is_name(n))
        {
            return false;
        }
    }

    match next_significant(tokens, index) {
        Some(next) => MODIFIED.iter().any(|n| tokens[next].is_name(n)),
        None => false,
    }
}

impl ModifierStripper for FinalStripper {
    fn strip(&self, source: &str) -> String {
        let tokens = tokenize(source);
        let mut out = String::with_capacity(source.len());
        let mut skip_whitespace = false;

        for (i, token) in tokens.iter().enumerate() {
            if skip_whitespace {
                skip_whitespace = false;
                if token.kind == TokenKind::Whitespace {
                    continue;
                }
            }
            if is_modifier(&tokens, i) {
                skip_whitespace = true;
                continue;
            }
            out.push_str(token.text);
        }
        out
    }
}

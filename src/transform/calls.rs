//! Function call rewriting

use std::collections::HashMap;

use super::lexer::{next_significant, prev_significant, tokenize, Token, TokenKind};
use super::{CallMap, CallRewriter};

/// Rewrites function calls by name, token-aware
///
/// A name is rewritten only in call position: followed by `(` and not a
/// method, static or nullsafe call, nor a declaration (`function`, `new`,
/// `const`). Names are matched ASCII case-insensitively with any leading
/// namespace separator ignored, on both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCallRewriter;

impl TokenCallRewriter {
    pub fn new() -> Self {
        TokenCallRewriter
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

fn is_call_site(tokens: &[Token<'_>], index: usize) -> bool {
    let Some(next) = next_significant(tokens, index) else {
        return false;
    };
    if !tokens[next].is_symbol("(") {
        return false;
    }

    let Some(prev) = prev_significant(tokens, index) else {
        return true;
    };
    let prev_token = &tokens[prev];
    if ["->", "?->", "::"].iter().any(|s| prev_token.is_symbol(s)) {
        return false;
    }
    if ["function", "new", "const"].iter().any(|n| prev_token.is_name(n)) {
        return false;
    }
    // `function &name(`
    if prev_token.is_symbol("&") {
        if let Some(before) = prev_significant(tokens, prev) {
            if tokens[before].is_name("function") {
                return false;
            }
        }
    }
    true
}

impl CallRewriter for TokenCallRewriter {
    fn rewrite(&self, source: &str, calls: &CallMap) -> String {
        if calls.is_empty() {
            return source.to_string();
        }

        let lookup: HashMap<String, &str> = calls
            .iter()
            .map(|(name, replacement)| (normalize(name), replacement.as_str()))
            .collect();

        let tokens = tokenize(source);
        let mut out = String::with_capacity(source.len());
        for (i, token) in tokens.iter().enumerate() {
            if token.kind == TokenKind::Name && is_call_site(&tokens, i) {
                if let Some(replacement) = lookup.get(&normalize(token.text)) {
                    out.push_str(replacement);
                    continue;
                }
            }
            out.push_str(token.text);
        }
        out
    }
}

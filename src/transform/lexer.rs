//! Lossless tokenizer for PHP-like source text
//!
//! Concatenating the text of every token reproduces the input exactly, so
//! transformers can rebuild the source while touching only the tokens they
//! mean to change. Text before an open tag (or after a close tag) is
//! inline text; source with no open tag at all is code throughout.

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    InlineText,
    OpenTag,
    CloseTag,
    Whitespace,
    Comment,
    /// Quoted string, heredoc or nowdoc
    String,
    Variable,
    /// Identifier, possibly namespace-qualified (`foo`, `\foo`, `A\b`)
    Name,
    Number,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    /// Whitespace and comments carry no syntax
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text.eq_ignore_ascii_case(name)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    in_code: bool,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            in_code: !src.contains("<?"),
            tokens: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn push(&mut self, kind: TokenKind, end: usize) {
        let end = end.min(self.bytes.len());
        if end > self.pos {
            self.tokens.push(Token {
                kind,
                text: &self.src[self.pos..end],
            });
            self.pos = end;
        }
    }

    fn run(mut self) -> Vec<Token<'a>> {
        while self.pos < self.bytes.len() {
            if self.in_code {
                self.code();
            } else {
                self.inline();
            }
        }
        self.tokens
    }

    fn inline(&mut self) {
        let Some(offset) = self.rest().find("<?") else {
            self.push(TokenKind::InlineText, self.bytes.len());
            return;
        };
        let start = self.pos + offset;
        self.push(TokenKind::InlineText, start);

        let rest = self.rest();
        let tag_len = if rest.len() >= 5 && rest.as_bytes()[..5].eq_ignore_ascii_case(b"<?php") {
            5
        } else if rest.starts_with("<?=") {
            3
        } else {
            2
        };
        self.push(TokenKind::OpenTag, self.pos + tag_len);
        self.in_code = true;
    }

    fn code(&mut self) {
        let b = self.bytes[self.pos];
        let next = self.peek(1);

        match b {
            _ if b.is_ascii_whitespace() => {
                let end = self.scan_while(self.pos, |c| c.is_ascii_whitespace());
                self.push(TokenKind::Whitespace, end);
            }
            b'?' if next == Some(b'>') => {
                self.push(TokenKind::CloseTag, self.pos + 2);
                self.in_code = false;
            }
            b'#' if next == Some(b'[') => self.push(TokenKind::Symbol, self.pos + 2),
            b'#' => self.line_comment(),
            b'/' if next == Some(b'/') => self.line_comment(),
            b'/' if next == Some(b'*') => {
                let end = match self.src[self.pos + 2..].find("*/") {
                    Some(i) => self.pos + 2 + i + 2,
                    None => self.bytes.len(),
                };
                self.push(TokenKind::Comment, end);
            }
            b'\'' | b'"' | b'`' => self.quoted(b),
            b'<' if self.rest().starts_with("<<<") => self.heredoc(),
            b'$' if next.map_or(false, is_ident_start) => {
                let end = self.scan_while(self.pos + 1, is_ident_char);
                self.push(TokenKind::Variable, end);
            }
            b'\\' if next.map_or(false, is_ident_start) => self.name(),
            _ if is_ident_start(b) => self.name(),
            _ if b.is_ascii_digit() => {
                let end = self.scan_while(self.pos, |c| is_ident_char(c) || c == b'.');
                self.push(TokenKind::Number, end);
            }
            b'-' if next == Some(b'>') => self.push(TokenKind::Symbol, self.pos + 2),
            b'?' if next == Some(b'-') && self.peek(2) == Some(b'>') => {
                self.push(TokenKind::Symbol, self.pos + 3)
            }
            b':' if next == Some(b':') => self.push(TokenKind::Symbol, self.pos + 2),
            _ => self.push(TokenKind::Symbol, self.pos + 1),
        }
    }

    fn scan_while(&self, from: usize, pred: impl Fn(u8) -> bool) -> usize {
        let mut end = from;
        while end < self.bytes.len() && pred(self.bytes[end]) {
            end += 1;
        }
        end
    }

    fn line_comment(&mut self) {
        let mut end = self.pos;
        while end < self.bytes.len() {
            match self.bytes[end] {
                b'\n' => break,
                b'?' if self.bytes.get(end + 1) == Some(&b'>') => break,
                _ => end += 1,
            }
        }
        self.push(TokenKind::Comment, end);
    }

    fn quoted(&mut self, delim: u8) {
        let mut end = self.pos + 1;
        while end < self.bytes.len() {
            match self.bytes[end] {
                b'\\' => end += 2,
                c if c == delim => {
                    end += 1;
                    break;
                }
                _ => end += 1,
            }
        }
        self.push(TokenKind::String, end);
    }

    fn name(&mut self) {
        let mut end = self.pos;
        loop {
            if self.bytes.get(end) == Some(&b'\\') {
                end += 1;
            }
            let segment_end = self.scan_while(end, is_ident_char);
            if segment_end == end {
                // dangling separator belongs to the next token
                end -= 1;
                break;
            }
            end = segment_end;
            let continues = self.bytes.get(end) == Some(&b'\\')
                && self.bytes.get(end + 1).map_or(false, |&c| is_ident_start(c));
            if !continues {
                break;
            }
        }
        self.push(TokenKind::Name, end);
    }

    /// `<<<LABEL`, `<<<"LABEL"` or `<<<'LABEL'` up to the closing label
    fn heredoc(&mut self) {
        let mut cursor = self.scan_while(self.pos + 3, |c| c == b' ' || c == b'\t');
        let quote = match self.bytes.get(cursor) {
            Some(&q) if q == b'\'' || q == b'"' => {
                cursor += 1;
                Some(q)
            }
            _ => None,
        };

        let label_start = cursor;
        if !self.bytes.get(cursor).map_or(false, |&c| is_ident_start(c)) {
            self.push(TokenKind::Symbol, self.pos + 2);
            return;
        }
        let label_end = self.scan_while(cursor, is_ident_char);
        let label = &self.src[label_start..label_end];
        cursor = label_end;
        if let Some(q) = quote {
            if self.bytes.get(cursor) != Some(&q) {
                self.push(TokenKind::Symbol, self.pos + 2);
                return;
            }
            cursor += 1;
        }
        if self.bytes.get(cursor) != Some(&b'\n') && !self.src[cursor..].starts_with("\r\n") {
            self.push(TokenKind::Symbol, self.pos + 2);
            return;
        }

        // closing label: first line whose indented content starts with the label
        let mut line_start = cursor + 1;
        while line_start < self.bytes.len() {
            let content = self.scan_while(line_start, |c| c == b' ' || c == b'\t');
            let after = content + label.len();
            if self.src[content..].starts_with(label)
                && !self.bytes.get(after).map_or(false, |&c| is_ident_char(c))
            {
                self.push(TokenKind::String, after);
                return;
            }
            line_start = match self.src[line_start..].find('\n') {
                Some(i) => line_start + i + 1,
                None => self.bytes.len(),
            };
        }
        self.push(TokenKind::String, self.bytes.len());
    }
}

/// Split `source` into tokens
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).run()
}

/// Index of the nearest non-trivia token before `index`
pub fn prev_significant(tokens: &[Token<'_>], index: usize) -> Option<usize> {
    tokens[..index].iter().rposition(|t| !t.is_trivia())
}

/// Index of the nearest non-trivia token after `index`
pub fn next_significant(tokens: &[Token<'_>], index: usize) -> Option<usize> {
    tokens[index + 1..]
        .iter()
        .position(|t| !t.is_trivia())
        .map(|i| index + 1 + i)
}

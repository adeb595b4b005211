//! A tokenizer shared by every IL's parser (spec.md §6: "All ILs share:
//! C-style line comments (`//`), identifiers `[A-Za-z_][A-Za-z_0-9]*`,
//! variables prefixed `%`, functions prefixed `@`, labels prefixed `:`,
//! signed decimal integers").
//!
//! Grounded in `cranelift-reader`'s lexer/parser split: a hand-rolled
//! scanner feeding a hand-rolled recursive-descent parser, no
//! parser-generator dependency (spec.md §1 treats textual parsing as an
//! external collaborator to the core, but SPEC_FULL.md §12 still wants it
//! to exist and round-trip).

use lnc_support::{Location, ParseError, ParseResult};

/// A single lexical token, with the source line it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `%name` — a variable reference.
    Var(String),
    /// `@name` — a function reference.
    Func(String),
    /// `:name` — a label reference or definition.
    Label(String),
    /// A bare identifier: a keyword, a type name, or a runtime function.
    Ident(String),
    /// A signed decimal integer literal.
    Num(i64),
    /// Punctuation: one of `( ) { } [ ] , <- <= >= << >> = + - * & < > ;`
    Punct(&'static str),
    /// End of input.
    Eof,
}

#[derive(Clone, Copy)]
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn loc(&self) -> Location {
        Location::at_line(self.line)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b) if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' => {
                    self.bump();
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while !matches!(self.peek_byte(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_'
    }

    fn is_ident_continue(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
    }

    fn scan_ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek_byte()
            .map(Self::is_ident_continue)
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    /// Return the next token and the line it started on.
    pub fn next(&mut self) -> ParseResult<(Token, Location)> {
        self.skip_trivia();
        let loc = self.loc();
        let b = match self.peek_byte() {
            None => return Ok((Token::Eof, loc)),
            Some(b) => b,
        };

        if b == b'%' {
            self.pos += 1;
            let name = self.scan_ident();
            return Ok((Token::Var(name), loc));
        }
        if b == b'@' {
            self.pos += 1;
            let name = self.scan_ident();
            return Ok((Token::Func(name), loc));
        }
        if b == b':' && self.bytes.get(self.pos + 1).copied().map(Self::is_ident_start) == Some(true)
        {
            self.pos += 1;
            let name = self.scan_ident();
            return Ok((Token::Label(name), loc));
        }
        if b == b'-' && self.bytes.get(self.pos + 1).map(|d| d.is_ascii_digit()) == Some(true) {
            self.pos += 1;
            let start = self.pos;
            while self.peek_byte().map(|d| d.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
            let n: i64 = self.src[start..self.pos].parse().map_err(|_| ParseError {
                location: loc,
                message: "malformed integer literal".to_string(),
            })?;
            return Ok((Token::Num(-n), loc));
        }
        if b.is_ascii_digit() {
            let start = self.pos;
            while self.peek_byte().map(|d| d.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
            let n: i64 = self.src[start..self.pos].parse().map_err(|_| ParseError {
                location: loc,
                message: "malformed integer literal".to_string(),
            })?;
            return Ok((Token::Num(n), loc));
        }
        if Self::is_ident_start(b) {
            let name = self.scan_ident();
            return Ok((Token::Ident(name), loc));
        }

        for p in [
            "<-", "<=", ">=", "<<", ">>", "(", ")", "{", "}", "[", "]", ",", "=", "+", "-", "*",
            "&", "<", ">", ";",
        ] {
            if self.src[self.pos..].starts_with(p) {
                self.pos += p.len();
                return Ok((Token::Punct(p), loc));
            }
        }

        Err(ParseError {
            location: loc,
            message: format!("unexpected character {:?}", b as char),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lx = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let (t, _) = lx.next().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn basic_tokens() {
        let toks = tokens("%a <- %b + 3 // comment\n@foo :bar");
        assert_eq!(
            toks,
            vec![
                Token::Var("a".into()),
                Token::Punct("<-"),
                Token::Var("b".into()),
                Token::Punct("+"),
                Token::Num(3),
                Token::Func("foo".into()),
                Token::Label("bar".into()),
            ]
        );
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(tokens("-42"), vec![Token::Num(-42)]);
    }
}

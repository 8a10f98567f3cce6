use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            if ch.is_ascii_digit() {
                return self.scan_number();
            }

            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None → error was recorded, try again
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            if self.pos + 1 < self.source.len()
                && self.source[self.pos] == b'/'
                && self.source[self.pos + 1] == b'/'
            {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let token = Lexeme::from_keyword(text).unwrap_or_else(|| Lexeme::Ident(text.to_string()));
        self.make_token(token, start, self.pos)
    }

    /// Scan an integer or float literal. A literal is a float when it has
    /// a fractional part (`1.5`), a trailing dot with digits after, or an
    /// exponent (`1e9`). A bare dot followed by a non-digit stays with the
    /// integer (so `v.x` lexes as ident, dot, ident).
    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        let mut is_float = false;
        if self.pos + 1 < self.source.len()
            && self.source[self.pos] == b'.'
            && self.source[self.pos + 1].is_ascii_digit()
        {
            is_float = true;
            self.pos += 1;
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        } else if self.pos < self.source.len()
            && self.source[self.pos] == b'.'
            && (self.pos + 1 >= self.source.len() || !is_ident_start(self.source[self.pos + 1]))
        {
            // trailing dot: `2.` is a float literal
            is_float = true;
            self.pos += 1;
        }

        if self.pos < self.source.len() && (self.source[self.pos] | 0x20) == b'e' {
            let mut look = self.pos + 1;
            if look < self.source.len() && (self.source[look] == b'+' || self.source[look] == b'-')
            {
                look += 1;
            }
            if look < self.source.len() && self.source[look].is_ascii_digit() {
                is_float = true;
                self.pos = look;
                while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        if is_float {
            match text.trim_end_matches('.').parse::<f64>() {
                Ok(v) => self.make_token(Lexeme::Float(v), start, self.pos),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("malformed float literal '{}'", text),
                        Span::new(start as u32, self.pos as u32),
                    ));
                    self.make_token(Lexeme::Float(0.0), start, self.pos)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.make_token(Lexeme::Integer(n), start, self.pos),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            format!("integer literal '{}' is too large", text),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help(format!("maximum integer value is {}", i64::MAX)),
                    );
                    self.make_token(Lexeme::Integer(0), start, self.pos)
                }
            }
        }
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        let next = self.source.get(self.pos + 1).copied();

        let (token, len) = match (ch, next) {
            (b'=', Some(b'=')) => (Lexeme::EqEq, 2),
            (b'!', Some(b'=')) => (Lexeme::BangEq, 2),
            (b'<', Some(b'=')) => (Lexeme::Le, 2),
            (b'>', Some(b'=')) => (Lexeme::Ge, 2),
            (b'+', Some(b'=')) => (Lexeme::PlusEq, 2),
            (b'-', Some(b'=')) => (Lexeme::MinusEq, 2),
            (b'*', Some(b'=')) => (Lexeme::StarEq, 2),
            (b'/', Some(b'=')) => (Lexeme::SlashEq, 2),
            (b'&', Some(b'&')) => (Lexeme::AmpAmp, 2),
            (b'|', Some(b'|')) => (Lexeme::PipePipe, 2),
            (b'@', _) => (Lexeme::At, 1),
            (b'(', _) => (Lexeme::LParen, 1),
            (b')', _) => (Lexeme::RParen, 1),
            (b'{', _) => (Lexeme::LBrace, 1),
            (b'}', _) => (Lexeme::RBrace, 1),
            (b'[', _) => (Lexeme::LBracket, 1),
            (b']', _) => (Lexeme::RBracket, 1),
            (b',', _) => (Lexeme::Comma, 1),
            (b':', _) => (Lexeme::Colon, 1),
            (b';', _) => (Lexeme::Semicolon, 1),
            (b'.', _) => (Lexeme::Dot, 1),
            (b'=', _) => (Lexeme::Eq, 1),
            (b'<', _) => (Lexeme::Lt, 1),
            (b'>', _) => (Lexeme::Gt, 1),
            (b'+', _) => (Lexeme::Plus, 1),
            (b'-', _) => (Lexeme::Minus, 1),
            (b'*', _) => (Lexeme::Star, 1),
            (b'/', _) => (Lexeme::Slash, 1),
            (b'%', _) => (Lexeme::Percent, 1),
            (b'!', _) => (Lexeme::Bang, 1),
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    format!("unexpected character '{}'", ch as char),
                    Span::new(start as u32, start as u32 + 1),
                ));
                self.pos += 1;
                return None;
            }
        };

        self.pos += len;
        Some(self.make_token(token, start, self.pos))
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Lexeme> {
        let (tokens, diagnostics) = Lexer::new(source).tokenize();
        assert!(diagnostics.is_empty(), "unexpected errors: {:?}", diagnostics);
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn test_decorator_tokens() {
        let toks = lex("@numthreads(8, 1, 1)");
        assert_eq!(
            toks,
            vec![
                Lexeme::At,
                Lexeme::Ident("numthreads".into()),
                Lexeme::LParen,
                Lexeme::Integer(8),
                Lexeme::Comma,
                Lexeme::Integer(1),
                Lexeme::Comma,
                Lexeme::Integer(1),
                Lexeme::RParen,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_float_and_member_access() {
        let toks = lex("v.x + 1.5");
        assert_eq!(
            toks,
            vec![
                Lexeme::Ident("v".into()),
                Lexeme::Dot,
                Lexeme::Ident("x".into()),
                Lexeme::Plus,
                Lexeme::Float(1.5),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_trailing_dot_float() {
        let toks = lex("2.");
        assert_eq!(toks, vec![Lexeme::Float(2.0), Lexeme::Eof]);
    }

    #[test]
    fn test_exponent_literal() {
        let toks = lex("1e3 2e-2");
        assert_eq!(
            toks,
            vec![Lexeme::Float(1000.0), Lexeme::Float(0.02), Lexeme::Eof]
        );
    }

    #[test]
    fn test_two_char_operators() {
        let toks = lex("a += b && c != d");
        assert_eq!(
            toks,
            vec![
                Lexeme::Ident("a".into()),
                Lexeme::PlusEq,
                Lexeme::Ident("b".into()),
                Lexeme::AmpAmp,
                Lexeme::Ident("c".into()),
                Lexeme::BangEq,
                Lexeme::Ident("d".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let toks = lex("let x = 1; // trailing comment\n// full line\nx");
        assert_eq!(
            toks,
            vec![
                Lexeme::Let,
                Lexeme::Ident("x".into()),
                Lexeme::Eq,
                Lexeme::Integer(1),
                Lexeme::Semicolon,
                Lexeme::Ident("x".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character_recorded() {
        let (tokens, diagnostics) = Lexer::new("let $x").tokenize();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unexpected character"));
        // lexing continues past the error
        assert!(tokens.iter().any(|t| t.node == Lexeme::Ident("x".into())));
    }

    #[test]
    fn test_spans_cover_tokens() {
        let (tokens, _) = Lexer::new("class Add").tokenize();
        assert_eq!(tokens[0].span.range(), 0..5);
        assert_eq!(tokens[1].span.range(), 6..9);
    }
}

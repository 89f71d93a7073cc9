// Cm lexer -- tokenizer for the unified (post-preprocessor) source.

mod cursor;

use cm_common::error::{LexError, LexErrorKind};
use cm_common::token::{keyword_from_str, Token, TokenKind};
use cm_common::Span;
use cursor::Cursor;

/// The Cm lexer. Converts source text into a token sequence ending in `Eof`.
///
/// Whitespace and comments are skipped (`// line` and `/* block */`; block
/// comments do not nest). Errors are collected in a side list so lexing can
/// continue past bad input; an `Error` token is emitted at each bad spot for
/// the parser's recovery machinery.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
    errors: Vec<LexError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            errors: Vec::new(),
        }
    }

    /// Convenience: tokenize the entire source, returning tokens and errors.
    ///
    /// The returned vector always includes the final `Eof` token.
    pub fn tokenize(source: &str) -> (Vec<Token>, Vec<LexError>) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        (tokens, lexer.errors)
    }

    /// Produce the next token, skipping whitespace and comments first.
    fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.cursor.pos();
        let Some(c) = self.cursor.peek() else {
            return Token::new(TokenKind::Eof, start, start);
        };

        match c {
            // ── Delimiters ──────────────────────────────────────────────
            '(' => self.single(TokenKind::LParen, start),
            ')' => self.single(TokenKind::RParen, start),
            '{' => self.single(TokenKind::LBrace, start),
            '}' => self.single(TokenKind::RBrace, start),
            '[' => self.single(TokenKind::LBracket, start),
            ']' => self.single(TokenKind::RBracket, start),
            ',' => self.single(TokenKind::Comma, start),
            ';' => self.single(TokenKind::Semicolon, start),
            '#' => self.single(TokenKind::Hash, start),
            '~' => self.single(TokenKind::Tilde, start),

            // ── Operators (maximal munch) ───────────────────────────────
            '+' => {
                self.cursor.advance();
                if self.cursor.eat('+') {
                    self.token(TokenKind::PlusPlus, start)
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::PlusEq, start)
                } else {
                    self.token(TokenKind::Plus, start)
                }
            }
            '-' => {
                self.cursor.advance();
                if self.cursor.eat('-') {
                    self.token(TokenKind::MinusMinus, start)
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::MinusEq, start)
                } else if self.cursor.eat('>') {
                    self.token(TokenKind::Arrow, start)
                } else {
                    self.token(TokenKind::Minus, start)
                }
            }
            '*' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::StarEq, start)
                } else {
                    self.token(TokenKind::Star, start)
                }
            }
            '/' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::SlashEq, start)
                } else {
                    self.token(TokenKind::Slash, start)
                }
            }
            '%' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::PercentEq, start)
                } else {
                    self.token(TokenKind::Percent, start)
                }
            }
            '&' => {
                self.cursor.advance();
                if self.cursor.eat('&') {
                    self.token(TokenKind::AmpAmp, start)
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::AmpEq, start)
                } else {
                    self.token(TokenKind::Amp, start)
                }
            }
            '|' => {
                self.cursor.advance();
                if self.cursor.eat('|') {
                    self.token(TokenKind::PipePipe, start)
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::PipeEq, start)
                } else {
                    self.token(TokenKind::Pipe, start)
                }
            }
            '^' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::CaretEq, start)
                } else {
                    self.token(TokenKind::Caret, start)
                }
            }
            '!' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::BangEq, start)
                } else {
                    self.token(TokenKind::Bang, start)
                }
            }
            '=' => {
                self.cursor.advance();
                if self.cursor.eat('=') {
                    self.token(TokenKind::EqEq, start)
                } else if self.cursor.eat('>') {
                    self.token(TokenKind::FatArrow, start)
                } else {
                    self.token(TokenKind::Eq, start)
                }
            }
            '<' => {
                self.cursor.advance();
                if self.cursor.eat('<') {
                    if self.cursor.eat('=') {
                        self.token(TokenKind::LtLtEq, start)
                    } else {
                        self.token(TokenKind::LtLt, start)
                    }
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::LtEq, start)
                } else {
                    self.token(TokenKind::Lt, start)
                }
            }
            '>' => {
                self.cursor.advance();
                if self.cursor.eat('>') {
                    if self.cursor.eat('=') {
                        self.token(TokenKind::GtGtEq, start)
                    } else {
                        self.token(TokenKind::GtGt, start)
                    }
                } else if self.cursor.eat('=') {
                    self.token(TokenKind::GtEq, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '?' => self.single(TokenKind::Question, start),
            ':' => {
                self.cursor.advance();
                if self.cursor.eat(':') {
                    self.token(TokenKind::ColonColon, start)
                } else {
                    self.token(TokenKind::Colon, start)
                }
            }
            '.' => {
                // `.5` style floats are not supported; a leading dot is
                // always punctuation.
                self.cursor.advance();
                if self.cursor.eat('.') {
                    if self.cursor.eat('=') {
                        self.token(TokenKind::DotDotEq, start)
                    } else {
                        self.token(TokenKind::DotDot, start)
                    }
                } else {
                    self.token(TokenKind::Dot, start)
                }
            }

            // ── Literals ────────────────────────────────────────────────
            '0'..='9' => self.lex_number(start),
            '"' => self.lex_string(start, false),
            '\'' => self.lex_char(start),

            // ── Identifiers, keywords, raw strings ──────────────────────
            'r' if self.cursor.peek_next() == Some('"') => {
                self.cursor.advance(); // r
                self.lex_string(start, true)
            }
            c if is_ident_start(c) => self.lex_ident(start),

            // ── Unknown character (error recovery) ──────────────────────
            c => {
                self.cursor.advance();
                self.errors.push(LexError::new(
                    LexErrorKind::UnexpectedCharacter(c),
                    Span::new(start, self.cursor.pos()),
                ));
                self.token(TokenKind::Error, start)
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn single(&mut self, kind: TokenKind, start: u32) -> Token {
        self.cursor.advance();
        self.token(kind, start)
    }

    fn token(&self, kind: TokenKind, start: u32) -> Token {
        Token::new(kind, start, self.cursor.pos())
    }

    /// Skip whitespace and comments. Block comments do not nest.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor.eat_while(|c| c.is_ascii_whitespace());
            match (self.cursor.peek(), self.cursor.peek_next()) {
                (Some('/'), Some('/')) => {
                    self.cursor.eat_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => {
                    let start = self.cursor.pos();
                    self.cursor.advance();
                    self.cursor.advance();
                    let mut closed = false;
                    while let Some(c) = self.cursor.advance() {
                        if c == '*' && self.cursor.eat('/') {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        self.errors.push(LexError::new(
                            LexErrorKind::UnterminatedBlockComment,
                            Span::new(start, self.cursor.pos()),
                        ));
                    }
                }
                _ => break,
            }
        }
    }

    /// Numeric literals: decimal, `0x` hex, `0b` binary, `0` octal, and
    /// C-style floats with an optional `e` exponent.
    fn lex_number(&mut self, start: u32) -> Token {
        if self.cursor.peek() == Some('0') {
            match self.cursor.peek_next() {
                Some('x') | Some('X') => return self.lex_radix(start, 16),
                Some('b') | Some('B') => return self.lex_radix(start, 2),
                Some(c) if c.is_ascii_digit() => return self.lex_octal(start),
                _ => {}
            }
        }

        self.cursor.eat_while(|c| c.is_ascii_digit());

        // Fractional part. `1..2` is a range, not a float, so require a
        // digit after the dot.
        let mut is_float = false;
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }

        // Exponent. Requires a digit after `e` (and an optional sign) so
        // that `2e` stays an int followed by an identifier.
        if matches!(self.cursor.peek(), Some('e') | Some('E')) {
            let mut iter = self.cursor.rest().chars();
            iter.next(); // e
            let mut second = iter.next();
            if matches!(second, Some('+') | Some('-')) {
                second = iter.next();
            }
            if second.is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.cursor.advance(); // e
                if matches!(self.cursor.peek(), Some('+') | Some('-')) {
                    self.cursor.advance();
                }
                self.cursor.eat_while(|c| c.is_ascii_digit());
            }
        }

        let text = self.cursor.slice(start, self.cursor.pos());
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Token::float(v, start, self.cursor.pos()),
                Err(_) => self.bad_number(text, start),
            }
        } else {
            // Parse as u64 first so `9223372036854775808` (INT64_MIN's
            // magnitude) survives under a leading unary minus.
            match text.parse::<u64>() {
                Ok(v) => Token::int(v as i64, start, self.cursor.pos()),
                Err(_) => self.bad_number(text, start),
            }
        }
    }

    fn lex_radix(&mut self, start: u32, radix: u32) -> Token {
        self.cursor.advance(); // 0
        self.cursor.advance(); // x or b
        let digits_start = self.cursor.pos();
        self.cursor.eat_while(|c| c.is_digit(radix) || c == '_');
        let digits: String = self
            .cursor
            .slice(digits_start, self.cursor.pos())
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if digits.is_empty() {
            let text = self.cursor.slice(start, self.cursor.pos()).to_string();
            return self.bad_number(&text, start);
        }
        match u64::from_str_radix(&digits, radix) {
            Ok(v) => Token::int(v as i64, start, self.cursor.pos()),
            Err(_) => {
                let text = self.cursor.slice(start, self.cursor.pos()).to_string();
                self.bad_number(&text, start)
            }
        }
    }

    fn lex_octal(&mut self, start: u32) -> Token {
        self.cursor.advance(); // leading 0
        let digits_start = self.cursor.pos();
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let digits = self.cursor.slice(digits_start, self.cursor.pos());
        match u64::from_str_radix(digits, 8) {
            Ok(v) => Token::int(v as i64, start, self.cursor.pos()),
            Err(_) => {
                let text = self.cursor.slice(start, self.cursor.pos()).to_string();
                self.bad_number(&text, start)
            }
        }
    }

    fn bad_number(&mut self, text: &str, start: u32) -> Token {
        self.errors.push(LexError::new(
            LexErrorKind::InvalidNumberLiteral(text.to_string()),
            Span::new(start, self.cursor.pos()),
        ));
        Token::new(TokenKind::Error, start, self.cursor.pos())
    }

    /// String literals. `raw` strings (`r"..."` / `r"""..."""`) copy their
    /// contents verbatim after indent normalization; normal strings resolve
    /// escapes.
    fn lex_string(&mut self, start: u32, raw: bool) -> Token {
        self.cursor.advance(); // opening "
        let triple = raw && self.cursor.peek() == Some('"') && self.cursor.peek_next() == Some('"');
        if triple {
            self.cursor.advance();
            self.cursor.advance();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.cursor.peek() else {
                self.errors.push(LexError::new(
                    LexErrorKind::UnterminatedString,
                    Span::new(start, self.cursor.pos()),
                ));
                return Token::new(TokenKind::Error, start, self.cursor.pos());
            };

            if c == '"' {
                if triple {
                    if self.cursor.peek_next() == Some('"') {
                        // Check for the full closing delimiter.
                        let at = self.cursor.pos();
                        self.cursor.advance();
                        self.cursor.advance();
                        if self.cursor.eat('"') {
                            break;
                        }
                        // Only two quotes: literal content.
                        value.push_str(self.cursor.slice(at, self.cursor.pos()));
                        continue;
                    }
                    self.cursor.advance();
                    value.push('"');
                    continue;
                }
                self.cursor.advance();
                break;
            }

            if !raw && c == '\\' {
                self.cursor.advance();
                let Some(esc) = self.cursor.advance() else {
                    continue;
                };
                match esc {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    other => {
                        self.errors.push(LexError::new(
                            LexErrorKind::InvalidEscapeSequence(other),
                            Span::new(self.cursor.pos() - 2, self.cursor.pos()),
                        ));
                        value.push(other);
                    }
                }
                continue;
            }

            if !raw && c == '\n' {
                self.errors.push(LexError::new(
                    LexErrorKind::UnterminatedString,
                    Span::new(start, self.cursor.pos()),
                ));
                return Token::new(TokenKind::Error, start, self.cursor.pos());
            }

            self.cursor.advance();
            value.push(c);
        }

        if raw {
            value = normalize_indent(&value);
        }
        Token::text(TokenKind::StringLiteral, value, start, self.cursor.pos())
    }

    fn lex_char(&mut self, start: u32) -> Token {
        self.cursor.advance(); // opening '
        let c = match self.cursor.advance() {
            Some('\\') => match self.cursor.advance() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('0') => '\0',
                Some('\\') => '\\',
                Some('\'') => '\'',
                Some('"') => '"',
                Some(other) => {
                    self.errors.push(LexError::new(
                        LexErrorKind::InvalidEscapeSequence(other),
                        Span::new(start, self.cursor.pos()),
                    ));
                    other
                }
                None => {
                    self.errors.push(LexError::new(
                        LexErrorKind::UnterminatedChar,
                        Span::new(start, self.cursor.pos()),
                    ));
                    return Token::new(TokenKind::Error, start, self.cursor.pos());
                }
            },
            Some(c) => c,
            None => {
                self.errors.push(LexError::new(
                    LexErrorKind::UnterminatedChar,
                    Span::new(start, self.cursor.pos()),
                ));
                return Token::new(TokenKind::Error, start, self.cursor.pos());
            }
        };
        if !self.cursor.eat('\'') {
            self.errors.push(LexError::new(
                LexErrorKind::UnterminatedChar,
                Span::new(start, self.cursor.pos()),
            ));
            return Token::new(TokenKind::Error, start, self.cursor.pos());
        }
        Token::text(TokenKind::CharLiteral, c.to_string(), start, self.cursor.pos())
    }

    fn lex_ident(&mut self, start: u32) -> Token {
        self.cursor.eat_while(is_ident_continue);
        let text = self.cursor.slice(start, self.cursor.pos());
        match keyword_from_str(text) {
            Some(kind) => Token::new(kind, start, self.cursor.pos()),
            None => Token::text(TokenKind::Ident, text, start, self.cursor.pos()),
        }
    }

}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strip the common leading whitespace of all non-empty lines.
///
/// Raw string contents keep their text verbatim otherwise; this only removes
/// the indentation shared by every non-empty line so that indented multi-line
/// raw strings read naturally in source.
fn normalize_indent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    if common == 0 {
        return text.to_string();
    }
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            out.push("");
        } else {
            out.push(&line[common..]);
        }
    }
    let mut joined = out.join("\n");
    if text.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

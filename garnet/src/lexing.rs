use std::fmt::Display;

use crate::error::{Position, Span, Syntax, SyntaxError};
use crate::stream::CharStream;


/// Operators, longest first within each length class.
const OPERATORS_3: [&str; 4] = ["===", "<=>", "...", "**="];

const OPERATORS_2: [&str; 18] = [
    "**", "==", "!=", "<=", ">=", "<<", ">>", "=>", "->", "&&", "||",
    "+=", "-=", "*=", "/=", "..", "-@", "+@",
];

const OPERATORS_1: &str = "+-*/%=<>!&^~";

const SEPARATORS: &str = ";()[],.|{}";


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Identifier,
    Integer,
    Float,
    String,
    Operator,
    Separator,
    Symbol,
    InstanceVar,
    ClassVar,
    GlobalVar,
    Constant,
    EndOfLine,
}

/// A single token.
///
/// Variable tokens keep their sigils (`@x`, `@@x`, `$x`), symbols drop the
/// leading colon and string tokens hold the unescaped contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub text: String,
    pub span: Span,

    /// Whether whitespace separated this token from the previous one.
    pub spaced: bool,
}

impl Token {
    pub fn is(&self, kind: TokenType, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_operator(&self, text: &str) -> bool {
        self.is(TokenType::Operator, text)
    }

    pub fn is_separator(&self, text: &str) -> bool {
        self.is(TokenType::Separator, text)
    }

    pub fn is_keyword(&self, text: &str) -> bool {
        self.is(TokenType::Identifier, text)
    }

    /// Newline or semicolon.
    pub fn is_terminator(&self) -> bool {
        self.kind == TokenType::EndOfLine || self.is_separator(";")
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenType::EndOfLine => f.write_str("end-of-line"),
            TokenType::String => f.write_fmt(format_args!("\"{}\"", self.text)),
            TokenType::Symbol => f.write_fmt(format_args!(":{}", self.text)),
            _ => f.write_str(&self.text),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}


/// Tokenizer over a character stream, with token pushback.
pub struct Lexer<S: CharStream> {
    stream: S,
    /// Tokens returned with `push_token`, most recent last.
    pushed: Vec<Token>,
}

impl<S: CharStream> Lexer<S> {
    pub fn new(stream: S) -> Lexer<S> {
        Lexer { stream, pushed: vec![] }
    }

    /// Position of the next character in the underlying stream.
    pub fn position(&self) -> Position {
        self.stream.position()
    }

    /// Return a token so that the next call to `next_token` yields it again.
    /// Pushed tokens come back in reverse order.
    pub fn push_token(&mut self, token: Token) {
        self.pushed.push(token);
    }

    /// Text of a source line, for diagnostics.
    pub fn line_text(&self, line: u32) -> Option<String> {
        self.stream.line_text(line)
    }

    /// Source text consumed so far.
    pub fn text(&self) -> String {
        self.stream.text()
    }

    fn error(&self, position: Position, reason: Syntax) -> SyntaxError {
        let err = SyntaxError::new(position, reason);
        match self.stream.line_text(position.line()) {
            Some(text) => err.with_line_text(text),
            None => err,
        }
    }

    fn token(&self, kind: TokenType, text: String, start: Position, spaced: bool) -> Token {
        Token {
            kind,
            text,
            span: self.stream.position() - start,
            spaced,
        }
    }

    /// Skip blanks and comments, but not newlines. Returns whether anything was
    /// skipped.
    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        loop {
            match self.stream.next_char() {
                Some(' ' | '\t' | '\r') => {}
                Some('#') => {
                    while let Some(c) = self.stream.next_char() {
                        if c == '\n' {
                            self.stream.back_char();
                            break;
                        }
                    }
                }
                Some('\\') => {
                    // Line continuation
                    if self.stream.peek_char() == Some('\n') {
                        self.stream.next_char();
                    } else {
                        self.stream.back_char();
                        return skipped;
                    }
                }
                Some(_) => {
                    self.stream.back_char();
                    return skipped;
                }
                None => return skipped,
            }
            skipped = true;
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.stream.next_char() {
            if is_name_char(c) {
                name.push(c);
            } else {
                self.stream.back_char();
                break;
            }
        }
        name
    }

    /// Read an identifier, allowing a trailing `?` or `!` unless it is the
    /// start of `!=` or `?=`.
    fn read_identifier(&mut self) -> String {
        let mut name = self.read_name();
        match self.stream.next_char() {
            Some(c @ ('?' | '!')) => {
                if self.stream.peek_char() == Some('=') {
                    self.stream.back_char();
                } else {
                    name.push(c);
                }
            }
            Some(_) => self.stream.back_char(),
            None => {}
        }
        name
    }

    fn next_string(&mut self, quote: char, start: Position, spaced: bool) -> Result<Token, SyntaxError> {
        let mut text = String::new();
        loop {
            match self.stream.next_char() {
                None => return Err(self.error(start, Syntax::UnterminatedString)),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = self.stream.next_char().ok_or_else(|| self.error(start, Syntax::UnterminatedString))?;
                    if quote == '\'' {
                        if escaped != '\'' && escaped != '\\' {
                            text.push('\\');
                        }
                        text.push(escaped);
                    } else {
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            'e' => '\x1b',
                            's' => ' ',
                            other => other,
                        });
                    }
                }
                Some(c) => text.push(c),
            }
        }
        Ok(self.token(TokenType::String, text, start, spaced))
    }

    fn next_number(&mut self, first: char, start: Position, spaced: bool) -> Result<Token, SyntaxError> {
        let mut text = String::from(first);
        let mut kind = TokenType::Integer;
        loop {
            match self.stream.next_char() {
                Some(c) if c.is_ascii_digit() => text.push(c),
                Some('_') => {}
                Some('.') if kind == TokenType::Integer => {
                    match self.stream.peek_char() {
                        Some(c) if c.is_ascii_digit() => {
                            kind = TokenType::Float;
                            text.push('.');
                        }
                        _ => {
                            // `5.times` is an integer followed by a dot
                            self.stream.back_char();
                            break;
                        }
                    }
                }
                Some(c) if is_name_start(c) => {
                    return Err(self.error(self.stream.position(), Syntax::InvalidNumber(format!("{}{}", text, c))));
                }
                Some(_) => {
                    self.stream.back_char();
                    break;
                }
                None => break,
            }
        }
        Ok(self.token(kind, text, start, spaced))
    }

    fn next_symbol(&mut self, start: Position, spaced: bool) -> Result<Token, SyntaxError> {
        match self.stream.peek_char() {
            Some(':') => {
                self.stream.next_char();
                Ok(self.token(TokenType::Separator, "::".to_owned(), start, spaced))
            }
            Some('"') => {
                self.stream.next_char();
                let tok = self.next_string('"', start, spaced)?;
                Ok(Token { kind: TokenType::Symbol, ..tok })
            }
            Some(c) if is_name_start(c) => {
                let mut name = self.read_identifier();
                if self.stream.peek_char() == Some('=') {
                    // Setter names like :name=, but not :name==
                    self.stream.next_char();
                    if matches!(self.stream.peek_char(), Some('=' | '>' | '~')) {
                        self.stream.back_char();
                    } else {
                        name.push('=');
                    }
                }
                Ok(self.token(TokenType::Symbol, name, start, spaced))
            }
            Some(c) if c == '@' || c == '$' => {
                self.stream.next_char();
                let mut name = String::from(c);
                if c == '@' && self.stream.peek_char() == Some('@') {
                    self.stream.next_char();
                    name.push('@');
                }
                let rest = self.read_name();
                if rest.is_empty() {
                    return Err(self.error(start, Syntax::InvalidSymbol));
                }
                name.push_str(&rest);
                Ok(self.token(TokenType::Symbol, name, start, spaced))
            }
            Some(_) => {
                if let Some(op) = self.match_operator() {
                    return Ok(self.token(TokenType::Symbol, op, start, spaced));
                }
                if self.stream.peek_char() == Some('[') {
                    self.stream.next_char();
                    if self.stream.next_char() == Some(']') {
                        let mut name = "[]".to_owned();
                        if self.stream.peek_char() == Some('=') {
                            self.stream.next_char();
                            name.push('=');
                        }
                        return Ok(self.token(TokenType::Symbol, name, start, spaced));
                    }
                }
                Err(self.error(start, Syntax::InvalidSymbol))
            }
            None => Err(self.error(start, Syntax::InvalidSymbol)),
        }
    }

    fn next_variable(&mut self, first: char, start: Position, spaced: bool) -> Result<Token, SyntaxError> {
        let mut name = String::from(first);
        let mut kind = if first == '$' { TokenType::GlobalVar } else { TokenType::InstanceVar };
        if first == '@' && self.stream.peek_char() == Some('@') {
            self.stream.next_char();
            name.push('@');
            kind = TokenType::ClassVar;
        }
        match self.stream.peek_char() {
            Some(c) if is_name_start(c) => {
                name.push_str(&self.read_name());
                Ok(self.token(kind, name, start, spaced))
            }
            _ => Err(self.error(start, Syntax::UnexpectedChar(first))),
        }
    }

    /// Greedily match the longest operator at the current position.
    fn match_operator(&mut self) -> Option<String> {
        let mut consumed = String::new();
        for _ in 0..3 {
            match self.stream.next_char() {
                Some(c) => consumed.push(c),
                None => break,
            }
        }

        let count = consumed.chars().count();
        let candidates: [(usize, bool); 3] = [
            (3, count >= 3 && OPERATORS_3.contains(&consumed.as_str())),
            (2, count >= 2 && OPERATORS_2.contains(&consumed.chars().take(2).collect::<String>().as_str())),
            (1, count >= 1 && consumed.chars().next().map_or(false, |c| OPERATORS_1.contains(c))),
        ];

        let matched = candidates.iter().find(|(_, ok)| *ok).map(|(n, _)| *n).unwrap_or(0);
        for _ in matched..count {
            self.stream.back_char();
        }

        if matched == 0 {
            return None;
        }

        let mut op: String = consumed.chars().take(matched).collect();

        // `-@` is only the unary method name when not followed by a name, since
        // `x -@y` subtracts an instance variable.
        if (op == "-@" || op == "+@") && self.stream.peek_char().map_or(false, is_name_char) {
            self.stream.back_char();
            op.pop();
        }

        Some(op)
    }

    /// Return the next token, or `None` at the end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.pushed.pop() {
            return Ok(Some(token));
        }

        let spaced = self.skip_whitespace();
        let start = self.stream.position();

        let c = match self.stream.next_char() {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = match c {
            '\n' => self.token(TokenType::EndOfLine, "\n".to_owned(), start, spaced),
            '"' | '\'' => self.next_string(c, start, spaced)?,
            ':' => self.next_symbol(start, spaced)?,
            '@' | '$' => self.next_variable(c, start, spaced)?,
            c if c.is_ascii_digit() => self.next_number(c, start, spaced)?,
            c if is_name_start(c) => {
                self.stream.back_char();
                let name = self.read_identifier();
                let kind = if c.is_ascii_uppercase() { TokenType::Constant } else { TokenType::Identifier };
                self.token(kind, name, start, spaced)
            }
            c => {
                self.stream.back_char();
                if let Some(op) = self.match_operator() {
                    self.token(TokenType::Operator, op, start, spaced)
                } else if SEPARATORS.contains(c) {
                    self.stream.next_char();
                    self.token(TokenType::Separator, c.to_string(), start, spaced)
                } else {
                    return Err(self.error(start, Syntax::UnexpectedChar(c)));
                }
            }
        };

        Ok(Some(token))
    }
}

//! Character sources for the lexer.
//!
//! Both streams keep every character they have produced, so that positions
//! can be computed and arbitrarily many characters pushed back, and so that
//! the text of any line seen so far is available for diagnostics.

use std::io::BufRead;

use tracing::warn;

use crate::error::Position;

/// A source of characters with pushback and lookahead.
pub trait CharStream {
    /// Consume and return the next character.
    fn next_char(&mut self) -> Option<char>;

    /// Undo the last call to `next_char`.
    fn back_char(&mut self);

    /// Position of the next character to be returned.
    fn position(&self) -> Position;

    /// Text of a line (zero-indexed), without the line break, if it has been
    /// read already.
    fn line_text(&self, line: u32) -> Option<String>;

    /// All the text read so far.
    fn text(&self) -> String;

    /// Return the next character without consuming it.
    fn peek_char(&mut self) -> Option<char> {
        let c = self.next_char();
        if c.is_some() {
            self.back_char();
        }
        c
    }
}

/// Characters read so far, with the indices where lines begin.
#[derive(Debug, Default)]
struct CharBuffer {
    chars: Vec<char>,
    cursor: usize,
    line_starts: Vec<usize>,
}

impl CharBuffer {
    fn new() -> CharBuffer {
        CharBuffer {
            chars: vec![],
            cursor: 0,
            line_starts: vec![0],
        }
    }

    fn extend(&mut self, text: &str) {
        for c in text.chars() {
            self.chars.push(c);
            if c == '\n' {
                self.line_starts.push(self.chars.len());
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.cursor >= self.chars.len()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.cursor).copied();
        if c.is_some() {
            self.cursor += 1;
        }
        c
    }

    fn back_char(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn position(&self) -> Position {
        let line = self.line_starts.partition_point(|&start| start <= self.cursor) - 1;
        let column = self.cursor - self.line_starts[line];
        Position::new(self.cursor, line as u32, column as u32)
    }

    fn line_text(&self, line: u32) -> Option<String> {
        let start = *self.line_starts.get(line as usize)?;
        if start > self.chars.len() {
            return None;
        }
        Some(
            self.chars[start..]
                .iter()
                .take_while(|&&c| c != '\n')
                .filter(|&&c| c != '\r')
                .collect(),
        )
    }

    fn text(&self) -> String {
        self.chars.iter().collect()
    }
}

/// Stream over a complete string.
#[derive(Debug)]
pub struct TextStream {
    buffer: CharBuffer,
}

impl TextStream {
    pub fn new(text: &str) -> TextStream {
        let mut buffer = CharBuffer::new();
        buffer.extend(text);
        TextStream { buffer }
    }
}

impl CharStream for TextStream {
    fn next_char(&mut self) -> Option<char> {
        self.buffer.next_char()
    }

    fn back_char(&mut self) {
        self.buffer.back_char()
    }

    fn position(&self) -> Position {
        self.buffer.position()
    }

    fn line_text(&self, line: u32) -> Option<String> {
        self.buffer.line_text(line)
    }

    fn text(&self) -> String {
        self.buffer.text()
    }
}

/// Stream that pulls lines from a reader on demand.
pub struct ReaderStream<R: BufRead> {
    reader: R,
    buffer: CharBuffer,
    done: bool,
}

impl<R: BufRead> ReaderStream<R> {
    pub fn new(reader: R) -> ReaderStream<R> {
        ReaderStream {
            reader,
            buffer: CharBuffer::new(),
            done: false,
        }
    }

    fn fill(&mut self) {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => self.done = true,
            Ok(_) => self.buffer.extend(&line),
            Err(err) => {
                warn!("stopped reading source: {}", err);
                self.done = true;
            }
        }
    }
}

impl<R: BufRead> CharStream for ReaderStream<R> {
    fn next_char(&mut self) -> Option<char> {
        while self.buffer.exhausted() && !self.done {
            self.fill();
        }
        self.buffer.next_char()
    }

    fn back_char(&mut self) {
        self.buffer.back_char()
    }

    fn position(&self) -> Position {
        self.buffer.position()
    }

    fn line_text(&self, line: u32) -> Option<String> {
        self.buffer.line_text(line)
    }

    fn text(&self) -> String {
        self.buffer.text()
    }
}

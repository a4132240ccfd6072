use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// A source of characters for the lexer. Implementations deliver one
/// code point at a time; `is_eof` reports whether the stream is
/// exhausted.
pub trait CharInStream {
    fn get(&mut self) -> Option<char>;
    fn is_eof(&self) -> bool;
}

/// A bounded, fully buffered input.
pub struct BatchCharInStream {
    chars: VecDeque<char>,
}

impl BatchCharInStream {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }
}

impl CharInStream for BatchCharInStream {
    fn get(&mut self) -> Option<char> {
        self.chars.pop_front()
    }

    fn is_eof(&self) -> bool {
        self.chars.is_empty()
    }
}

/// An interactive input that reads lines from `input` and writes a
/// `<line>> ` prompt to `output` whenever a new line begins.
pub struct InteractiveCharInStream<R: BufRead, W: Write> {
    input: R,
    output: W,
    pending: VecDeque<char>,
    line: u32,
    eof: bool,
}

impl<R: BufRead, W: Write> InteractiveCharInStream<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            pending: VecDeque::new(),
            line: 1,
            eof: false,
        }
    }

    fn refill(&mut self) {
        let _ = write!(self.output, "{}> ", self.line);
        let _ = self.output.flush();
        let mut buffer = String::new();
        match self.input.read_line(&mut buffer) {
            Ok(0) | Err(_) => self.eof = true,
            Ok(_) => {
                self.line += 1;
                self.pending.extend(buffer.chars());
            }
        }
    }
}

impl<R: BufRead, W: Write> CharInStream for InteractiveCharInStream<R, W> {
    fn get(&mut self) -> Option<char> {
        if self.pending.is_empty() && !self.eof {
            self.refill();
        }
        self.pending.pop_front()
    }

    fn is_eof(&self) -> bool {
        self.eof && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchCharInStream, CharInStream, InteractiveCharInStream};

    #[test]
    fn test_batch_stream_drains() {
        let mut stream = BatchCharInStream::new("ab");
        assert!(!stream.is_eof());
        assert_eq!(stream.get(), Some('a'));
        assert_eq!(stream.get(), Some('b'));
        assert_eq!(stream.get(), None);
        assert!(stream.is_eof());
    }

    #[test]
    fn test_interactive_prompts_per_line() {
        let input = b"ab\ncd\n" as &[u8];
        let mut output = vec![];
        let mut collected = String::new();
        {
            let mut stream = InteractiveCharInStream::new(input, &mut output);
            while let Some(ch) = stream.get() {
                collected.push(ch);
            }
        }
        assert_eq!(collected, "ab\ncd\n");
        assert_eq!(String::from_utf8(output).unwrap(), "1> 2> 3> ");
    }
}

//! Tokenizers.
//!
//! A tokenizer yields `(byte_offset, token)` pairs with non-decreasing offsets and can be
//! restarted to make another pass over the same input.

use std::fs;
use std::path::PathBuf;

use crate::errors::Result;

/// A restartable token stream.
pub trait Tokenizer {
    /// Returns the next token and the byte offset of its first character, or `None` at the
    /// end of the stream.
    ///
    /// # Errors
    ///
    /// If the underlying input cannot be read, an error variant will be returned.
    fn next_token(&mut self) -> Result<Option<(usize, String)>>;

    /// Rewinds to the first token.
    fn restart(&mut self);
}

#[inline(always)]
fn is_split_punct(b: u8) -> bool {
    matches!(
        b,
        b'[' | b']' | b'.' | b'!' | b',' | b'"' | b':' | b'|' | b'?'
    )
}

const RIGHT_SINGLE_QUOTE: &str = "\u{2019}";
const LEFT_DOUBLE_QUOTE: &str = "\u{201C}";
const RIGHT_DOUBLE_QUOTE: &str = "\u{201D}";

/// Tokenizer producing CoNLL-style tokens from free text.
///
/// Whitespace separates tokens, and punctuation such as `.` `,` `"` `?` becomes a token of its
/// own. Periods stay inside abbreviations like `U.S.`, commas and periods stay inside numbers,
/// an apostrophe starts a new token, `’` is split off and rewritten to `'`, and curly double
/// quotes are separate tokens.
pub struct ConllTokenizer<'a> {
    text: &'a str,
    pos: usize,
    pending: Option<(usize, String)>,
}

impl<'a> ConllTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            pending: None,
        }
    }

    fn raw_token(&mut self) -> Option<(usize, String)> {
        let bytes = self.text.as_bytes();
        let mut start = self.pos;
        let mut token = String::new();
        while self.pos < bytes.len() {
            let rest = &self.text[self.pos..];
            if let Some(quote) = [LEFT_DOUBLE_QUOTE, RIGHT_DOUBLE_QUOTE]
                .into_iter()
                .find(|q| rest.starts_with(q))
            {
                if !token.is_empty() {
                    return Some((start, token));
                }
                self.pos += quote.len();
                return Some((start, quote.to_string()));
            }
            let ch = bytes[self.pos];
            if ch == b'\'' {
                if !token.is_empty() {
                    return Some((start, token));
                }
                token.push('\'');
                self.pos += 1;
            } else if is_split_punct(ch) {
                if token.is_empty() {
                    self.pos += 1;
                    return Some((start, char::from(ch).to_string()));
                }
                let tb = token.as_bytes();
                let n = tb.len();
                let abbreviation = ch == b'.'
                    && (n == 1 || tb[n - 1] == b'.' || (n >= 2 && tb[n - 2] == b'.'));
                let number = (ch == b',' || ch == b'.') && tb[n - 1].is_ascii_digit();
                if abbreviation || number {
                    token.push(char::from(ch));
                    self.pos += 1;
                } else {
                    return Some((start, token));
                }
            } else if ch.is_ascii_whitespace() {
                self.pos += 1;
                if !token.is_empty() {
                    return Some((start, token));
                }
                start = self.pos;
            } else {
                let c = rest.chars().next()?;
                token.push(c);
                self.pos += c.len_utf8();
            }
        }
        if token.is_empty() {
            None
        } else {
            Some((start, token))
        }
    }
}

impl ConllTokenizer<'_> {
    fn read_token(&mut self) -> Option<(usize, String)> {
        if let Some(pending) = self.pending.take() {
            return Some(pending);
        }
        let (offset, mut token) = self.raw_token()?;
        if let Some(i) = token.find(RIGHT_SINGLE_QUOTE) {
            let rest = format!("'{}", &token[i + RIGHT_SINGLE_QUOTE.len()..]);
            self.pending = Some((offset + i, rest));
            token.truncate(i);
            if token.is_empty() {
                return self.pending.take();
            }
        }
        Some((offset, token))
    }
}

impl Tokenizer for ConllTokenizer<'_> {
    fn next_token(&mut self) -> Result<Option<(usize, String)>> {
        Ok(self.read_token())
    }

    fn restart(&mut self) {
        self.pos = 0;
        self.pending = None;
    }
}

/// Tokenizer used to scan raw corpora.
///
/// Tokens are runs of ASCII letters, digits, and inner apostrophes. Every digit becomes `#`,
/// separators inside numbers are dropped, and `[ ] . ! , : | ?` outside words are tokens.
/// Everything else is skipped.
pub struct UnigramTokenizer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> UnigramTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl UnigramTokenizer<'_> {
    fn read_token(&mut self) -> Option<(usize, String)> {
        let bytes = self.text.as_bytes();
        let mut token = String::new();
        let mut start = self.pos;
        while self.pos < bytes.len() {
            let ch = bytes[self.pos];
            let in_word = ch.is_ascii_alphanumeric()
                || ch == b'#'
                || (ch == b'\'' && !token.is_empty())
                || ((ch == b',' || ch == b'.') && token.ends_with('#'));
            if in_word {
                if token.is_empty() {
                    start = self.pos;
                }
                if ch.is_ascii_digit() {
                    token.push('#');
                } else if ch != b',' && ch != b'.' {
                    token.push(char::from(ch));
                }
                self.pos += 1;
            } else if !token.is_empty() {
                return Some((start, token));
            } else if matches!(ch, b'[' | b']' | b'.' | b'!' | b',' | b':' | b'|' | b'?') {
                self.pos += 1;
                return Some((self.pos - 1, char::from(ch).to_string()));
            } else {
                self.pos += 1;
            }
        }
        if token.is_empty() {
            None
        } else {
            Some((start, token))
        }
    }
}

impl Tokenizer for UnigramTokenizer<'_> {
    fn next_token(&mut self) -> Result<Option<(usize, String)>> {
        Ok(self.read_token())
    }

    fn restart(&mut self) {
        self.pos = 0;
    }
}

/// Concatenates the unigram tokens of many files into one stream.
///
/// Offsets are relative to the start of the current file.
pub struct GroupTokenizer {
    files: Vec<PathBuf>,
    next_file: usize,
    text: String,
    pos: usize,
}

impl GroupTokenizer {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            next_file: 0,
            text: String::new(),
            pos: 0,
        }
    }

    fn load_next_file(&mut self) -> Result<bool> {
        if self.next_file >= self.files.len() {
            return Ok(false);
        }
        let bytes = fs::read(&self.files[self.next_file])?;
        self.next_file += 1;
        self.text = String::from_utf8_lossy(&bytes).into_owned();
        self.pos = 0;
        Ok(true)
    }

}

impl Tokenizer for GroupTokenizer {
    /// Returns the next token of the current file, opening the following files as needed.
    ///
    /// # Errors
    ///
    /// If a file cannot be read, [`IOError`](crate::errors::IetkError::IOError) will be
    /// returned.
    fn next_token(&mut self) -> Result<Option<(usize, String)>> {
        loop {
            let mut tok = UnigramTokenizer {
                text: &self.text,
                pos: self.pos,
            };
            let result = tok.read_token();
            self.pos = tok.pos;
            if result.is_some() {
                return Ok(result);
            }
            if !self.load_next_file()? {
                return Ok(None);
            }
        }
    }

    fn restart(&mut self) {
        self.next_file = 0;
        self.text.clear();
        self.pos = 0;
    }
}

/// Tokenizes text with [`ConllTokenizer`].
pub fn tokenize(text: &str) -> Vec<String> {
    tokenize_with_offsets(text)
        .into_iter()
        .map(|(_, token)| token)
        .collect()
}

/// Tokenizes text with [`ConllTokenizer`] and keeps the byte offset of every token.
pub fn tokenize_with_offsets(text: &str) -> Vec<(usize, String)> {
    let mut tok = ConllTokenizer::new(text);
    let mut result = vec![];
    while let Some(t) = tok.read_token() {
        result.push(t);
    }
    result
}

//! Reading whitespace-separated tokens from the training corpus.

use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use crate::vocab::SENTINEL;
use crate::MAX_STRING;

/// Splits a byte stream into tokens, assuming space + tab + EOL to be word
/// boundaries. Every newline is reported as the sentinel token `</s>`.
///
/// The reader counts the bytes it consumes, so `position()` is always the
/// absolute file offset of the next unread byte.
pub struct WordReader<R> {
    inner: R,
    position: u64,
}

impl<R: BufRead> WordReader<R> {
    pub fn new(inner: R) -> Self {
        WordReader { inner, position: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            return match self.inner.fill_buf() {
                Ok([]) => Ok(None),
                Ok(buf) => Ok(Some(buf[0])),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
        }
    }

    fn consume_byte(&mut self) {
        self.inner.consume(1);
        self.position += 1;
    }

    /// Reads a single token. Returns `Ok(None)` at end of file.
    pub fn read_word(&mut self) -> io::Result<Option<String>> {
        let mut word = Vec::<u8>::new();
        while let Some(b) = self.peek_byte()? {
            if b == b'\r' {
                self.consume_byte();
                continue;
            }
            if b == b' ' || b == b'\t' || b == b'\n' {
                if !word.is_empty() {
                    // Leave a newline in place: it is the next token.
                    if b != b'\n' {
                        self.consume_byte();
                    }
                    break;
                }
                self.consume_byte();
                if b == b'\n' {
                    return Ok(Some(SENTINEL.to_string()));
                }
                continue;
            }
            self.consume_byte();
            if word.len() < MAX_STRING - 2 {
                word.push(b); // Truncate too long words
            }
        }
        Ok(if word.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&word).into_owned())
        })
    }
}

impl WordReader<BufReader<File>> {
    /// Opens `path` and positions the reader at byte `offset`.
    pub fn open_at(path: &Path, offset: u64) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("error opening training data file {path:?}"))?;
        let mut reader = WordReader::new(BufReader::new(file));
        reader.seek_to(offset)?;
        Ok(reader)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .context("error seeking within training file")?;
        self.position = offset;
        Ok(())
    }
}

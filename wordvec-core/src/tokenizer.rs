//! Byte-level streaming tokenizer shared by the trainer's per-worker file
//! shards and the phrase pass's two scans.
//!
//! A token is the maximal run of bytes not in `{space, tab, LF}`. Carriage
//! returns are dropped silently. Every LF emits a synthetic `</s>` boundary
//! token, mirroring `ReadWord` in the reference implementation.

use std::io::{BufRead, BufReader, Read};

/// Default ceiling on a single token's byte length before truncation.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 100;

/// One token pulled from the stream, or the distinct end-of-stream signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Token(Vec<u8>),
    Eof,
}

/// Pull-based tokenizer over any `Read`. Shared by the trainer and the
/// phrase pass so both see byte-identical token boundaries.
pub struct Tokenizer<R> {
    reader: BufReader<R>,
    max_token_len: usize,
    consumed: u64,
    /// Set when an LF terminated a non-empty token: the boundary token it
    /// implies is owed on the *next* call, matching the reference's
    /// "push the LF back" behavior without literally un-consuming a byte.
    pending_boundary: bool,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, max_token_len: usize) -> Self {
        Tokenizer {
            reader: BufReader::new(reader),
            max_token_len,
            consumed: 0,
            pending_boundary: false,
        }
    }

    /// Total bytes consumed from the underlying stream so far, used by the
    /// training worker to detect when it has crossed into the next
    /// worker's file shard.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Returns the next token, a synthetic `</s>` on line breaks, or `Eof`.
    pub fn next_token(&mut self) -> std::io::Result<Next> {
        if self.pending_boundary {
            self.pending_boundary = false;
            return Ok(Next::Token(b"</s>".to_vec()));
        }

        let mut buf = Vec::new();
        let mut saw_any = false;

        loop {
            let available = match self.reader.fill_buf() {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(if saw_any {
                    Next::Token(buf)
                } else {
                    Next::Eof
                });
            }

            let b = available[0];
            match b {
                b'\n' => {
                    self.reader.consume(1);
                    self.consumed += 1;
                    if saw_any {
                        self.pending_boundary = true;
                        return Ok(Next::Token(buf));
                    }
                    return Ok(Next::Token(b"</s>".to_vec()));
                }
                b' ' | b'\t' | b'\r' => {
                    self.reader.consume(1);
                    self.consumed += 1;
                    if saw_any {
                        return Ok(Next::Token(buf));
                    }
                    // leading whitespace before a token: keep scanning
                }
                _ => {
                    self.reader.consume(1);
                    self.consumed += 1;
                    saw_any = true;
                    if buf.len() < self.max_token_len {
                        buf.push(b);
                    }
                }
            }
        }
    }
}

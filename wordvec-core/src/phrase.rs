//! Two-scan bigram phrase detection (a "new york" -> "new_york" pass run
//! before training, repeatable to build up longer phrases).
//!
//! Scan 1 builds a combined unigram+bigram vocabulary (hash seed 1, the one
//! deliberate difference from the trainer's vocabulary-building pass, so
//! the two never collide if run over the same corpus path). Scan 2 walks
//! the corpus again and joins adjacent words whose joint score clears a
//! threshold.
//!
//! Two quirks are preserved on purpose, not accidents to "fix":
//! - Only the phantom pair before the very first real word of the whole
//!   stream is forced to score zero (the reference's "previous word" index
//!   starts at a sentinel that is never valid). The first real bigram
//!   (word 1, word 2) is scored normally and can join. The first bigram
//!   after a boundary is *also* always blocked, but not by a sentinel
//!   flag — it is blocked because "boundary_word" was never recorded as a
//!   bigram in the vocabulary-learning scan, so its count is always zero;
//!   the pair *after* that one is scored normally again.
//! - A word that was just the right half of a join cannot immediately
//!   become the left half of another join in the same pass ("chaining
//!   prevention") — it must survive to a later pass to extend further.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;

use crate::tokenizer::{Next, Tokenizer};
use crate::vocab::{Vocab, BOUNDARY_TOKEN};

#[derive(Clone, Copy, Debug)]
pub struct PhraseConfig {
    pub min_count: u64,
    pub threshold: f64,
    pub hash_size: usize,
    pub max_token_len: usize,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        PhraseConfig {
            min_count: 5,
            threshold: 100.0,
            hash_size: 500_000_000,
            max_token_len: 60,
        }
    }
}

fn join(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut joined = Vec::with_capacity(a.len() + 1 + b.len());
    joined.extend_from_slice(a);
    joined.push(b'_');
    joined.extend_from_slice(b);
    joined
}

/// Scan 1: counts unigrams and adjacent-pair bigrams into one vocabulary,
/// reducing it along the way under the same 0.7 load-factor rule the
/// trainer's vocabulary uses, then prunes by `min_count`.
pub fn learn_bigram_vocab(corpus_path: &Path, config: &PhraseConfig) -> Result<Vocab> {
    let mut vocab = Vocab::new(config.hash_size, 1, config.max_token_len);
    let file = File::open(corpus_path)?;
    let mut tokenizer = Tokenizer::new(file, config.max_token_len);

    let mut prev: Option<Vec<u8>> = None;
    loop {
        let token = match tokenizer.next_token()? {
            Next::Eof => break,
            Next::Token(t) => t,
        };
        if token == BOUNDARY_TOKEN {
            prev = None;
            continue;
        }

        let id = vocab.add_or_lookup(&token);
        vocab.incr(id);
        if vocab.load_factor() > 0.7 {
            vocab.reduce();
        }

        if let Some(last) = prev.take() {
            let bigram = join(&last, &token);
            let bid = vocab.add_or_lookup(&bigram);
            vocab.incr(bid);
            if vocab.load_factor() > 0.7 {
                vocab.reduce();
            }
        }
        prev = Some(token);
    }

    vocab.sort_and_prune(config.min_count);
    Ok(vocab)
}

/// Scan 2: rewrites `corpus_path` into `out_path`, joining adjacent words
/// whenever
/// `score = (count(a_b) - min_count) / count(a) / count(b) * n_total > threshold`,
/// else separating them with a space. `</s>` boundaries become newlines.
pub fn rewrite(corpus_path: &Path, out_path: &Path, vocab: &Vocab, config: &PhraseConfig) -> Result<()> {
    let file = File::open(corpus_path)?;
    let mut tokenizer = Tokenizer::new(file, config.max_token_len);
    let mut out = BufWriter::new(File::create(out_path)?);

    let train_words = vocab.n_total() as f64;

    // `cur` is the pending left half of the next candidate pair; `None`
    // at the very start of the stream, right after a boundary, or right
    // after a join (the chaining-prevention reset).
    let mut cur: Option<(Vec<u8>, u64)> = None;
    // Forces the next score to zero only because the word now sitting in
    // `cur` was itself out of vocabulary, or because it is the freshly
    // zeroed right half of a join (chaining prevention). Never forced by
    // stream start or by a boundary on their own — `cur == None` already
    // means no pair gets scored until a real left word is stashed.
    let mut force_oov = false;

    loop {
        let token = match tokenizer.next_token()? {
            Next::Eof => break,
            Next::Token(t) => t,
        };

        if token == BOUNDARY_TOKEN {
            if let Some((word, _)) = cur.take() {
                out.write_all(&word)?;
            }
            out.write_all(b"\n")?;
            continue;
        }

        let (found, count_b) = match vocab.lookup(&token) {
            Some(id) => (true, vocab.count(id)),
            None => (false, 0),
        };

        match cur.take() {
            None => {
                cur = Some((token, count_b));
                // Whether the pair this word anchors can ever score above
                // zero depends only on whether *this* word itself is in
                // vocabulary, not on how it got here (start, boundary, or
                // just not having a left partner yet).
                force_oov = !found;
            }
            Some((word_a, count_a)) => {
                let oov = force_oov || !found;
                let bigram = join(&word_a, &token);
                let pab = vocab.lookup(&bigram).map(|id| vocab.count(id)).unwrap_or(0);

                let score = if oov || count_a < config.min_count || count_b < config.min_count {
                    0.0
                } else {
                    (pab as f64 - config.min_count as f64) / count_a as f64 / count_b as f64 * train_words
                };

                if score > config.threshold {
                    out.write_all(&word_a)?;
                    out.write_all(b"_")?;
                    out.write_all(&token)?;
                    out.write_all(b" ")?;
                    cur = None;
                    force_oov = true; // chaining prevention
                } else {
                    out.write_all(&word_a)?;
                    out.write_all(b" ")?;
                    cur = Some((token, count_b));
                    force_oov = !found;
                }
            }
        }
    }

    if let Some((word, _)) = cur {
        out.write_all(&word)?;
    }
    out.flush()?;
    Ok(())
}

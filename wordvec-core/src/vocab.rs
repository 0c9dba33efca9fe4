//! The token vocabulary: an open-addressed hash index over a frequency-
//! counted, frequency-sorted token table.
//!
//! This is the hard core described in spec.md §4.2. Two behaviors look like
//! bugs and are not: `reduce` prunes on strict `count > min_reduce` while
//! `sort_and_prune` prunes on strict `count < min_count`, and the hash
//! accumulator's initial value differs between the trainer (0) and the
//! phrase pass (1). Both asymmetries are carried over deliberately from the
//! reference implementation (spec.md §9) and must not be "fixed".

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Sentinel marking a </s>-like sentence boundary, always vocabulary id 0.
pub const BOUNDARY_TOKEN: &[u8] = b"</s>";

/// One vocabulary entry: the raw token bytes plus how often it was seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub token: Vec<u8>,
    pub count: u64,
}

/// A frequency-counted, open-addressed token vocabulary.
///
/// `hash_seed` is the initial accumulator value for the polynomial hash
/// (`h <- h*257 + byte`): the trainer uses 0, the phrase pass uses 1. This
/// is the one deliberately preserved behavioral difference between the two
/// components that otherwise share this type (spec.md §9).
pub struct Vocab {
    entries: Vec<Entry>,
    hash: Vec<i32>,
    hash_seed: u64,
    max_token_len: usize,
    min_reduce: u64,
    n_total: u64,
}

fn polynomial_hash(token: &[u8], seed: u64, table_size: usize) -> usize {
    let mut h = seed;
    for &b in token {
        h = h.wrapping_mul(257).wrapping_add(b as u64);
    }
    (h % table_size as u64) as usize
}

fn truncate(token: &[u8], max_len: usize) -> &[u8] {
    if token.len() > max_len {
        &token[..max_len]
    } else {
        token
    }
}

impl Vocab {
    /// Creates a fresh vocabulary with `</s>` pinned at id 0.
    ///
    /// `hash_size` is the number of slots `H` in the open-address table
    /// (spec.md default: 3e7 for the trainer, 5e8 for the phrase pass).
    pub fn new(hash_size: usize, hash_seed: u64, max_token_len: usize) -> Self {
        let mut vocab = Vocab {
            entries: Vec::new(),
            hash: vec![-1; hash_size],
            hash_seed,
            max_token_len,
            min_reduce: 1,
            n_total: 0,
        };
        vocab.add(BOUNDARY_TOKEN);
        vocab
    }

    fn hash_of(&self, token: &[u8]) -> usize {
        polynomial_hash(token, self.hash_seed, self.hash.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hash_capacity(&self) -> usize {
        self.hash.len()
    }

    /// Current load factor `V / H`. The trainer must call [`Vocab::reduce`]
    /// before this exceeds 0.7 (spec.md §3 hash-index invariant).
    pub fn load_factor(&self) -> f64 {
        self.entries.len() as f64 / self.hash.len() as f64
    }

    pub fn entry(&self, id: usize) -> &Entry {
        &self.entries[id]
    }

    pub fn count(&self, id: usize) -> u64 {
        self.entries[id].count
    }

    pub fn token(&self, id: usize) -> &[u8] {
        &self.entries[id].token
    }

    /// Total token count of the (possibly pruned) surviving vocabulary,
    /// populated by [`Vocab::sort_and_prune`].
    pub fn n_total(&self) -> u64 {
        self.n_total
    }

    pub fn lookup(&self, token: &[u8]) -> Option<usize> {
        let token = truncate(token, self.max_token_len);
        let mut slot = self.hash_of(token);
        loop {
            let id = self.hash[slot];
            if id < 0 {
                return None;
            }
            if self.entries[id as usize].token == token {
                return Some(id as usize);
            }
            slot = (slot + 1) % self.hash.len();
        }
    }

    /// Appends a new record (count 0) and inserts its id at the first empty
    /// probe slot. Does not check for an existing entry — callers wanting
    /// "insert or bump" semantics should `lookup` first, as
    /// [`Vocab::add_or_lookup`] does.
    pub fn add(&mut self, token: &[u8]) -> usize {
        let token = truncate(token, self.max_token_len).to_vec();
        let id = self.entries.len();
        let mut slot = self.hash_of(&token);
        while self.hash[slot] != -1 {
            slot = (slot + 1) % self.hash.len();
        }
        self.hash[slot] = id as i32;
        self.entries.push(Entry { token, count: 0 });
        id
    }

    pub fn incr(&mut self, id: usize) {
        self.entries[id].count += 1;
    }

    /// Looks the token up; inserts it with count 0 if absent. This is the
    /// "search, then add-or-bump" shape of the reference's vocabulary-
    /// learning loop.
    pub fn add_or_lookup(&mut self, token: &[u8]) -> usize {
        match self.lookup(token) {
            Some(id) => id,
            None => self.add(token),
        }
    }

    fn rebuild_hash(&mut self) {
        for slot in self.hash.iter_mut() {
            *slot = -1;
        }
        for (id, entry) in self.entries.iter().enumerate() {
            let mut slot = polynomial_hash(&entry.token, self.hash_seed, self.hash.len());
            while self.hash[slot] != -1 {
                slot = (slot + 1) % self.hash.len();
            }
            self.hash[slot] = id as i32;
        }
    }

    /// Removes every record with `count <= min_reduce` (id 0 is exempt),
    /// compacts, rebuilds the hash index, then increments `min_reduce`.
    /// Invoked only during the first pass, only once `V` exceeds `0.7*H`.
    pub fn reduce(&mut self) {
        let min_reduce = self.min_reduce;
        let before = self.entries.len();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (idx, entry) in std::mem::take(&mut self.entries).into_iter().enumerate() {
            if idx == 0 || entry.count > min_reduce {
                kept.push(entry);
            }
        }
        self.entries = kept;
        self.rebuild_hash();
        self.min_reduce += 1;
        log::debug!(
            "vocabulary reduced {} -> {} entries (min_reduce now {})",
            before,
            self.entries.len(),
            self.min_reduce
        );
    }

    /// Sorts ids `[1, V)` by descending count, discards everything with
    /// `count < min_count`, recomputes `n_total`, and rebuilds the hash
    /// index. `</s>` at id 0 is exempt from both the sort and the prune.
    pub fn sort_and_prune(&mut self, min_count: u64) {
        let boundary = self.entries.remove(0);
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries.retain(|e| e.count >= min_count);
        self.entries.insert(0, boundary);
        self.n_total = self.entries.iter().map(|e| e.count).sum();
        self.rebuild_hash();
        log::info!("vocabulary size after prune: {}", self.entries.len());
        log::info!("tokens in corpus: {}", self.n_total);
    }

    /// Writes `<token> <count>\n` per line, in current vocabulary order.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(path.as_ref())
                .with_context(|| format!("could not create {}", path.as_ref().display()))?,
        );
        for entry in &self.entries {
            out.write_all(&entry.token)?;
            writeln!(out, " {}", entry.count)?;
        }
        Ok(())
    }

    /// Reads a previously saved vocabulary back, in file order, and rebuilds
    /// the hash index and `n_total` from the loaded counts.
    pub fn load(
        path: impl AsRef<Path>,
        hash_size: usize,
        hash_seed: u64,
        max_token_len: usize,
    ) -> Result<Self> {
        let mut raw = Vec::new();
        File::open(path.as_ref())
            .with_context(|| format!("could not open {}", path.as_ref().display()))?
            .read_to_end(&mut raw)?;

        let mut vocab = Vocab {
            entries: Vec::new(),
            hash: vec![-1; hash_size],
            hash_seed,
            max_token_len,
            min_reduce: 1,
            n_total: 0,
        };

        for line in raw.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let sep = line
                .iter()
                .rposition(|&b| b == b' ')
                .context("malformed vocabulary line: missing count field")?;
            let (token, count_bytes) = (&line[..sep], &line[sep + 1..]);
            let count_str = std::str::from_utf8(count_bytes)
                .context("malformed vocabulary line: non-UTF8 count field")?;
            let count: u64 = count_str
                .trim_end_matches('\r')
                .parse()
                .context("malformed vocabulary line: count is not an integer")?;
            let id = vocab.add(token);
            vocab.entries[id].count = count;
        }

        if vocab.is_empty() {
            bail!("loaded vocabulary file is empty");
        }
        vocab.n_total = vocab.entries.iter().map(|e| e.count).sum();
        Ok(vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learn(text: &str, hash_size: usize, hash_seed: u64) -> Vocab {
        let mut vocab = Vocab::new(hash_size, hash_seed, 100);
        for word in text.split_whitespace() {
            let id = vocab.add_or_lookup(word.as_bytes());
            vocab.incr(id);
        }
        vocab
    }

    #[test]
    fn boundary_token_pinned_at_zero() {
        let vocab = Vocab::new(1000, 0, 100);
        assert_eq!(vocab.token(0), BOUNDARY_TOKEN);
        assert_eq!(vocab.lookup(BOUNDARY_TOKEN), Some(0));
    }

    /// spec.md S2: train on "a a a a b b c" with min_count=2.
    #[test]
    fn scenario_s2_prune() {
        let mut vocab = learn("a a a a b b c", 1000, 0);
        vocab.sort_and_prune(2);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token(0), BOUNDARY_TOKEN);
        let a_id = vocab.lookup(b"a").expect("a survives prune");
        let b_id = vocab.lookup(b"b").expect("b survives prune");
        assert_eq!(vocab.count(a_id), 4);
        assert_eq!(vocab.count(b_id), 2);
        assert_eq!(vocab.lookup(b"c"), None);
    }

    #[test]
    fn sorted_order_is_non_increasing_after_prune() {
        let mut vocab = learn("z z z z y y y x x w", 1000, 0);
        vocab.sort_and_prune(1);
        for window in (1..vocab.len()).collect::<Vec<_>>().windows(2) {
            assert!(vocab.count(window[0]) >= vocab.count(window[1]));
        }
    }

    #[test]
    fn lookup_returns_count_matching_observed_frequency() {
        let mut vocab = learn("dog cat dog bird dog cat", 1000, 0);
        vocab.sort_and_prune(1);
        let dog = vocab.lookup(b"dog").unwrap();
        assert_eq!(vocab.count(dog), 3);
        let cat = vocab.lookup(b"cat").unwrap();
        assert_eq!(vocab.count(cat), 2);
    }

    #[test]
    fn reduce_uses_strict_greater_than_min_reduce() {
        let mut vocab = learn("a a b c d d d", 1000, 0);
        // min_reduce starts at 1: counts <= 1 are dropped, i.e. strictly `> 1` survive.
        vocab.reduce();
        assert!(vocab.lookup(b"b").is_none());
        assert!(vocab.lookup(b"c").is_none());
        assert!(vocab.lookup(b"a").is_some());
        assert!(vocab.lookup(b"d").is_some());
    }

    #[test]
    fn reduce_increments_threshold_each_call() {
        let mut vocab = learn("a a a b b c", 1000, 0);
        vocab.reduce(); // drops count <= 1 (c)
        assert!(vocab.lookup(b"c").is_none());
        assert!(vocab.lookup(b"b").is_some());
        vocab.reduce(); // drops count <= 2 (b)
        assert!(vocab.lookup(b"b").is_none());
        assert!(vocab.lookup(b"a").is_some());
    }

    #[test]
    fn hash_seed_changes_probe_but_not_membership() {
        let vocab0 = learn("alpha beta gamma beta", 2000, 0);
        let vocab1 = learn("alpha beta gamma beta", 2000, 1);
        assert_eq!(vocab0.lookup(b"beta").is_some(), vocab1.lookup(b"beta").is_some());
    }

    #[test]
    fn save_and_load_round_trips_counts_and_order() {
        let mut vocab = learn("the cat sat on the mat the cat ran", 1000, 0);
        vocab.sort_and_prune(1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        vocab.save(&path).unwrap();

        let loaded = Vocab::load(&path, 1000, 0, 100).unwrap();
        assert_eq!(loaded.len(), vocab.len());
        for id in 0..vocab.len() {
            assert_eq!(loaded.token(id), vocab.token(id));
            assert_eq!(loaded.count(id), vocab.count(id));
        }
        assert_eq!(loaded.n_total(), vocab.n_total());
    }

    #[test]
    fn long_tokens_are_truncated() {
        let mut vocab = Vocab::new(1000, 0, 8);
        let id = vocab.add(b"abcdefghijklmnop");
        assert_eq!(vocab.token(id), b"abcdefgh");
    }

    #[test]
    fn load_factor_tracks_occupancy() {
        let vocab = learn("one two three four five", 1000, 0);
        assert!(vocab.load_factor() > 0.0);
        assert!(vocab.load_factor() < 1.0);
    }
}

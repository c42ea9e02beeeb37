//! The vocabulary: an open-addressing hash table from token to dense index,
//! with occurrence counts.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// The token standing for a line break, i.e. a document boundary. Always
/// vocabulary index 0.
pub const SENTINEL: &str = "</s>";

/// Occupancy past which the vocabulary is pruned.
const MAX_LOAD: f64 = 0.7;

const EMPTY: u32 = u32::MAX;

/// Hash table of integer values with linear probing.
///
/// The table does not store keys. Callers pass a hash and a predicate that
/// recognizes the value they are looking for, which lets the same table
/// index any array of keyed records.
#[derive(Debug, Clone)]
pub struct ProbingTable {
    slots: Vec<u32>,
}

impl ProbingTable {
    pub fn new(capacity: usize) -> Self {
        ProbingTable {
            slots: vec![EMPTY; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.fill(EMPTY);
    }

    /// Walks the linear search path for `hash` and returns the first stored value
    /// accepted by `is_match`, stopping at the first empty slot.
    pub fn find(&self, hash: u64, mut is_match: impl FnMut(u32) -> bool) -> Option<u32> {
        let cap = self.slots.len();
        let mut slot = (hash % cap as u64) as usize;
        for _ in 0..cap {
            let value = self.slots[slot];
            if value == EMPTY {
                return None;
            }
            if is_match(value) {
                return Some(value);
            }
            slot = (slot + 1) % cap;
        }
        None
    }

    /// Stores `value` in the first empty slot on the linear search path for `hash`.
    pub fn insert(&mut self, hash: u64, value: u32) -> Result<()> {
        let cap = self.slots.len();
        let mut slot = (hash % cap as u64) as usize;
        for _ in 0..cap {
            if self.slots[slot] == EMPTY {
                self.slots[slot] = value;
                return Ok(());
            }
            slot = (slot + 1) % cap;
        }
        bail!("hash table is full ({cap} slots)");
    }
}

/// Returns hash value of a word
pub fn word_hash(word: &str) -> u64 {
    word.bytes()
        .fold(0u64, |hash, b| hash.wrapping_mul(257).wrapping_add(b as u64))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabWord {
    pub word: String,
    pub count: u64,
}

pub struct Vocab {
    words: Vec<VocabWord>,
    hash: ProbingTable,
    /// Counts at or below this are dropped by the next `compact()`.
    min_reduce: u64,
    /// Sum of the counts of all retained words; valid after `finalize()`.
    train_words: u64,
}

impl Vocab {
    /// An empty vocabulary holding only the sentinel, with a hash table of
    /// `hash_size` slots.
    pub fn new(hash_size: usize) -> Self {
        let mut vocab = Vocab {
            words: Vec::with_capacity(1000),
            hash: ProbingTable::new(hash_size),
            min_reduce: 1,
            train_words: 0,
        };
        vocab.words.push(VocabWord {
            word: SENTINEL.to_string(),
            count: 0,
        });
        vocab.hash.slots[(word_hash(SENTINEL) % hash_size as u64) as usize] = 0;
        vocab
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false: the sentinel is never removed.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[VocabWord] {
        &self.words
    }

    pub fn word(&self, index: usize) -> &str {
        &self.words[index].word
    }

    pub fn count(&self, index: usize) -> u64 {
        self.words[index].count
    }

    pub fn train_words(&self) -> u64 {
        self.train_words
    }

    /// Returns position of a word in the vocabulary; if the word is not found, returns None.
    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.hash
            .find(word_hash(word), |i| self.words[i as usize].word == word)
            .map(|i| i as usize)
    }

    /// Returns the index of `word`, adding it with a count of zero if it is new.
    pub fn insert(&mut self, word: &str) -> Result<usize> {
        if let Some(i) = self.lookup(word) {
            return Ok(i);
        }
        let n = self.words.len();
        ensure!(
            n < self.hash.capacity(),
            "vocabulary exceeds hash capacity of {} entries",
            self.hash.capacity()
        );
        self.words.push(VocabWord {
            word: word.to_string(),
            count: 0,
        });
        self.hash.insert(word_hash(word), n as u32)?;
        Ok(n)
    }

    pub fn bump_count(&mut self, index: usize) {
        self.words[index].count += 1;
    }

    fn over_capacity(&self) -> bool {
        self.words.len() as f64 > self.hash.capacity() as f64 * MAX_LOAD
    }

    /// Prunes the vocabulary if the hash table is getting crowded. Returns
    /// true if it did.
    pub fn maybe_compact(&mut self) -> bool {
        if self.over_capacity() {
            self.compact();
            true
        } else {
            false
        }
    }

    /// Reduces the vocabulary by removing infrequent tokens. Each call raises
    /// the bar by one. Surviving words are renumbered.
    pub fn compact(&mut self) {
        let min_reduce = self.min_reduce;
        let mut i = 0;
        self.words.retain(|vw| {
            let keep = i == 0 || vw.count > min_reduce;
            i += 1;
            keep
        });
        self.min_reduce += 1;
        self.rehash();
    }

    fn rehash(&mut self) {
        // Hash will be re-computed, as it is not actual
        self.hash.clear();
        for (i, vw) in self.words.iter().enumerate() {
            self.hash
                .insert(word_hash(&vw.word), i as u32)
                .expect("table holds at least as many slots as before");
        }
    }

    /// Sorts the vocabulary by frequency using word counts, and discards
    /// words occurring less than `min_count` times.
    ///
    /// Ties are broken by descending byte order of the word, so the result
    /// does not depend on insertion order. The sentinel stays at index 0.
    pub fn finalize(&mut self, min_count: u64) {
        self.words[1..].sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.word.cmp(&a.word)));

        let mut i = 0;
        self.words.retain(|vw| {
            let keep = i == 0 || vw.count >= min_count;
            i += 1;
            keep
        });
        self.train_words = self.words.iter().map(|vw| vw.count).sum();
        self.rehash();
    }

    pub fn save(&self, vocab_file: &Path) -> Result<()> {
        let mut fo = BufWriter::new(
            File::create(vocab_file).context("error creating vocab file for write")?,
        );
        for vw in &self.words {
            writeln!(fo, "{} {}", vw.word, vw.count).context("error writing vocab file")?;
        }
        fo.flush().context("error writing vocab file")?;
        Ok(())
    }

    /// Reads a vocabulary written by `save` and finalizes it.
    pub fn load(vocab_file: &Path, hash_size: usize, min_count: u64) -> Result<Self> {
        let fin = BufReader::new(
            File::open(vocab_file)
                .with_context(|| format!("error opening vocabulary file {vocab_file:?}"))?,
        );
        let mut vocab = Vocab::new(hash_size);

        for (line_num, line) in fin.lines().enumerate() {
            let line = line.context("error reading vocabulary file")?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            ensure!(
                fields.len() == 2,
                "vocabulary file syntax error on line {}",
                line_num + 1
            );
            let count = fields[1].parse::<u64>().with_context(|| {
                format!(
                    "error reading vocabulary file: unrecognized frequency number format on line {}",
                    line_num + 1
                )
            })?;

            let a = vocab.insert(fields[0])?;
            vocab.words[a].count = count;
            ensure!(
                !vocab.over_capacity(),
                "vocabulary file has more words than the hash table can hold ({} slots)",
                vocab.hash.capacity()
            );
        }
        vocab.finalize(min_count);
        Ok(vocab)
    }
}

//! The unigram table for negative sampling.

use crate::vocab::Vocab;
use crate::Rng;

const POWER: f64 = 0.75;

/// A table of vocabulary indices in which index `i` fills a share of slots
/// proportional to `count[i]^0.75`. Drawing a uniform slot is then a draw
/// from the smoothed unigram distribution.
pub struct UnigramTable {
    table: Vec<u32>,
    vocab_size: usize,
}

impl UnigramTable {
    pub fn new(vocab: &Vocab, table_size: usize) -> Self {
        let counts: Vec<u64> = vocab.words().iter().map(|vw| vw.count).collect();
        Self::from_counts(&counts, table_size)
    }

    pub fn from_counts(counts: &[u64], table_size: usize) -> Self {
        assert!(!counts.is_empty(), "cannot sample from an empty vocabulary");
        let train_words_pow = counts
            .iter()
            .map(|&c| (c as f64).powf(POWER))
            .sum::<f64>();

        let mut table = Vec::with_capacity(table_size);
        let mut i = 0;
        let mut d1 = (counts[i] as f64).powf(POWER) / train_words_pow;
        for a in 0..table_size {
            table.push(i as u32);
            if (a as f64 / table_size as f64) > d1 && i + 1 < counts.len() {
                i += 1;
                d1 += (counts[i] as f64).powf(POWER) / train_words_pow;
            }
        }
        UnigramTable {
            table,
            vocab_size: counts.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Draws a vocabulary index.
    ///
    /// A draw that lands on the sentinel is replaced by a uniform draw over
    /// the rest of the vocabulary rather than redrawn from the table.
    pub fn sample(&self, rng: &mut Rng) -> usize {
        let r = rng.rand_u64();
        let target = self.table[(r >> 16) as usize % self.table.len()] as usize;
        if target == 0 && self.vocab_size > 1 {
            r as usize % (self.vocab_size - 1) + 1
        } else {
            target
        }
    }
}

//! Training hyperparameters and file locations.

use std::path::PathBuf;

use anyhow::{ensure, Result};

use crate::real;

/// Everything the training pipeline reads from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// Training corpus; newline-separated documents of whitespace-separated tokens.
    pub train_file: PathBuf,
    /// Where to write center-word vectors.
    pub word_output: Option<PathBuf>,
    /// Where to write context-word vectors.
    pub context_output: Option<PathBuf>,
    /// Where to write document vectors.
    pub doc_output: Option<PathBuf>,
    /// Where to write the whole model in bincode format.
    pub model_output: Option<PathBuf>,
    /// Write vector files in binary rather than text.
    pub binary: bool,
    pub save_vocab_file: Option<PathBuf>,
    pub read_vocab_file: Option<PathBuf>,
    /// Prefix of a pretrained pair of files, `PREFIX_w.txt` and `PREFIX_v.txt`.
    pub load_emb: Option<PathBuf>,

    /// Embedding dimension.
    pub size: usize,
    /// Max skip length between words.
    pub window: usize,
    /// Sub-sampling threshold for frequent words; 0 disables it.
    pub sample: real,
    /// Negative samples drawn per positive pair.
    pub negative: usize,
    pub num_threads: usize,
    /// Required gap between positive and negative cosine similarity.
    pub margin: real,
    /// Number of passes over the corpus.
    pub iter: usize,
    pub min_count: u64,
    /// Starting learning rate.
    pub alpha: real,
    /// 0 = quiet, 1 = summary, 2 = progress during training.
    pub debug_mode: usize,

    /// Slots in the vocabulary hash table. The vocabulary is pruned whenever
    /// it grows past 70% of this.
    pub vocab_hash_size: usize,
    /// Slots in the negative sampling table.
    pub table_size: usize,
    /// Hard cap on the number of documents in the corpus.
    pub max_documents: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            train_file: PathBuf::new(),
            word_output: None,
            context_output: None,
            doc_output: None,
            model_output: None,
            binary: false,
            save_vocab_file: None,
            read_vocab_file: None,
            load_emb: None,
            size: 100,
            window: 5,
            sample: 1e-3,
            negative: 2,
            num_threads: 20,
            margin: 0.15,
            iter: 10,
            min_count: 5,
            alpha: 0.04,
            debug_mode: 2,
            vocab_hash_size: 30_000_000, // Maximum 30 * 0.7 = 21M words in the vocabulary
            table_size: 100_000_000,
            max_documents: 40_000_000,
        }
    }
}

impl Config {
    /// Rejects settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.negative > 0, "number of negative samples must be positive");
        ensure!(self.num_threads > 0, "number of threads must be positive");
        ensure!(self.window > 0, "window must be positive");
        ensure!(self.size > 0, "embedding size must be positive");
        ensure!(self.iter > 0, "number of iterations must be positive");
        ensure!(self.alpha > 0.0, "learning rate must be positive");
        ensure!(self.margin.is_finite(), "margin must be a finite number");
        ensure!(self.sample >= 0.0, "sample threshold must not be negative");
        ensure!(self.table_size > 0, "sampling table size must be positive");
        ensure!(self.vocab_hash_size >= 2, "vocabulary hash size is too small");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_negative_is_rejected() {
        let config = Config {
            negative: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("negative"));
    }
}

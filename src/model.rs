//! The whole trained model in one bincode file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{real, VocabWord};

#[derive(Serialize, Deserialize)]
pub struct Model {
    /// Embedding dimension.
    pub size: usize,
    pub vocab: Vec<VocabWord>,
    /// Center-word vectors, `vocab.len()` rows.
    pub word: Vec<real>,
    /// Context-word vectors, `vocab.len()` rows.
    pub context: Vec<real>,
    /// Document vectors, one row per line of the corpus.
    pub docs: Vec<real>,
}

impl Model {
    pub fn save(&self, filename: &Path) -> Result<()> {
        let mut fo = BufWriter::new(
            File::create(filename)
                .with_context(|| format!("error creating model file {filename:?}"))?,
        );
        bincode::serialize_into(&mut fo, self)
            .with_context(|| format!("failed to write model to file {filename:?}"))?;
        fo.flush().context("error writing model file")?;
        Ok(())
    }

    pub fn load(filename: &Path) -> Result<Self> {
        let f = BufReader::new(
            File::open(filename)
                .with_context(|| format!("failed to open model file {filename:?}"))?,
        );
        let model: Model = bincode::deserialize_from(f)
            .with_context(|| format!("failed to load model from file {filename:?}"))?;
        ensure!(
            model.size > 0
                && model.word.len() == model.vocab.len() * model.size
                && model.context.len() == model.word.len()
                && model.docs.len() % model.size == 0,
            "model file {filename:?} is inconsistent"
        );
        Ok(model)
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len() / self.size
    }

    pub fn word_vector(&self, i: usize) -> &[real] {
        &self.word[i * self.size..][..self.size]
    }

    pub fn context_vector(&self, i: usize) -> &[real] {
        &self.context[i * self.size..][..self.size]
    }

    pub fn doc_vector(&self, d: usize) -> &[real] {
        &self.docs[d * self.size..][..self.size]
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::ops::Index;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ordered_float::OrderedFloat;

pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod eval;
pub mod model;
pub mod reader;
pub mod table;
pub mod train;
pub mod vocab;

pub use config::Config;
pub use corpus::CorpusIndex;
pub use embeddings::{Embeddings, Real};
pub use model::Model;
pub use table::UnigramTable;
pub use train::Trainer;
pub use vocab::{Vocab, VocabWord, SENTINEL};

/// Longest token kept by the reader, plus room for a terminator.
pub const MAX_STRING: usize = 100;

/// Upper bound on the number of tokens in a worker's sentence buffer.
pub const MAX_SENTENCE_LENGTH: usize = 1000;

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

/// The linear congruential generator used throughout training.
///
/// Every worker thread owns one, seeded from its thread id, so runs with the
/// same thread count draw the same sequence of samples.
#[derive(Debug, Clone)]
pub struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}

pub fn norm(v: &[f32]) -> f32 {
    v.iter().copied().map(|e| e * e).sum::<f32>().sqrt()
}

pub fn normalize(v: &mut [f32]) {
    let len = norm(v);
    if len > 0.0 {
        for e in v {
            *e /= len;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

/// Vectors read back from one of the training tool's output files.
///
/// Rows are normalized on load, so dot products are cosine similarities.
pub struct Vectors {
    /// Embedding vector length (number of dimensions).
    size: usize,

    /// Row labels: words, or document ids for a document file.
    labels: Vec<String>,

    /// Row of each label; the first row wins if a label repeats.
    index: HashMap<String, usize>,

    /// `embeddings[k * size..(k+1) * size]` is the vector for row `k`.
    embeddings: Vec<f32>,
}

impl Index<usize> for Vectors {
    type Output = [f32];

    fn index(&self, i: usize) -> &[f32] {
        &self.embeddings[i * self.size..][..self.size]
    }
}

fn parse_header(line: &str) -> Result<(usize, usize)> {
    let mut fields = line.split_whitespace();
    let rows: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid input file: missing row count"))?
        .parse()
        .context("invalid input file: bad row count")?;
    let size: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid input file: missing dimension"))?
        .parse()
        .context("invalid input file: bad dimension")?;
    Ok((rows, size))
}

impl Vectors {
    /// Loads a vector file written by the training tool, in text or binary
    /// layout.
    pub fn load(file_name: &Path, binary: bool) -> Result<Self> {
        let mut f = BufReader::new(
            File::open(file_name)
                .with_context(|| format!("error opening vector file {file_name:?}"))?,
        );
        let mut line = String::new();
        f.read_line(&mut line).context("error reading input file")?;
        let (num_rows, size) = parse_header(&line)?;

        let mut labels: Vec<String> = Vec::with_capacity(num_rows);
        let mut m = vec![0.0; num_rows * size];
        for b in 0..num_rows {
            let row = &mut m[b * size..][..size];
            if binary {
                let mut label = Vec::<u8>::new();
                let count = f
                    .read_until(b' ', &mut label)
                    .context("error reading input file")?;
                if count == 0 {
                    bail!("invalid input file: expected {num_rows} rows, found {b}");
                }
                if label.last() == Some(&b' ') {
                    label.pop();
                }
                label.retain(|c| *c != b'\n');
                labels.push(String::from_utf8_lossy(&label).into_owned());
                f.read_exact(bytemuck::cast_slice_mut::<f32, u8>(row))
                    .context("error reading input file")?;
            } else {
                line.clear();
                if f.read_line(&mut line).context("error reading input file")? == 0 {
                    bail!("invalid input file: expected {num_rows} rows, found {b}");
                }
                let mut fields = line.split_whitespace();
                let label = fields
                    .next()
                    .ok_or_else(|| anyhow!("invalid input file: empty row {}", b + 1))?;
                labels.push(label.to_string());
                for (i, e) in row.iter_mut().enumerate() {
                    *e = fields
                        .next()
                        .ok_or_else(|| anyhow!("invalid input file: row {} is short", b + 1))?
                        .parse()
                        .with_context(|| format!("invalid number in row {}, column {i}", b + 1))?;
                }
            }
            normalize(row);
        }

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            index.entry(label.clone()).or_insert(i);
        }
        Ok(Vectors {
            size,
            labels,
            index,
            embeddings: m,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.labels.len()
    }

    /// Returns the vector size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// All rows, back to back.
    pub fn as_slice(&self) -> &[f32] {
        &self.embeddings
    }

    /// Get the index for a label. Exact match only, case-sensitive.
    pub fn lookup(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Get the label for a row. Panics if `row` is out of range.
    pub fn label(&self, row: usize) -> &str {
        &self.labels[row]
    }

    /// Cosine similarity between two rows.
    pub fn similarity(&self, a: usize, b: usize) -> f32 {
        dot(&self[a], &self[b])
    }

    /// The `n` rows most similar to `query`, best first, skipping `exclude`.
    pub fn nearest(&self, query: &[f32], n: usize, exclude: &[usize]) -> Vec<(usize, f32)> {
        let mut best: Vec<(usize, f32)> = (0..self.num_rows())
            .filter(|c| !exclude.contains(c))
            .map(|c| (c, dot(query, &self[c])))
            .collect();
        best.sort_by_key(|&(_, sim)| std::cmp::Reverse(OrderedFloat(sim)));
        best.truncate(n);
        best
    }
}

//! Dense row-major embedding matrices whose rows live on the unit sphere.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use anyhow::{anyhow, ensure, Context, Result};
use tracing::info;

use crate::vocab::Vocab;
use crate::{real, Rng};

const ALIGNMENT: usize = 128;

/// One element of an embedding matrix.
///
/// Training threads read and write the matrices concurrently without locks.
/// Each element is an atomic so that this is not undefined behavior, but
/// loads and stores are relaxed and `add` is a separate load and store, not
/// a read-modify-write. Two threads updating the same element can lose one
/// of the updates. That is accepted as noise in the stochastic optimization.
#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

/// Dot product of two rows; for unit rows, their cosine similarity.
pub fn dot(a: &[Real], b: &[Real]) -> real {
    a.iter().zip(b).map(|(a, b)| a.get() * b.get()).sum()
}

pub fn norm(v: &[Real]) -> real {
    v.iter().map(|e| e.get() * e.get()).sum::<real>().sqrt()
}

/// Divides a row by its Euclidean norm, projecting it back onto the unit
/// sphere. A zero row is left alone.
pub fn renormalize(v: &[Real]) {
    let len = norm(v);
    if len > 0.0 {
        for e in v {
            e.set(e.get() / len);
        }
    }
}

/// Fills a row with small values from `rng`, then normalizes it.
fn randomize_row(row: &[Real], rng: &mut Rng) {
    let dim = row.len() as real;
    for e in row {
        e.set((rng.rand_real() - 0.5) / dim);
    }
    renormalize(row);
}

pub struct Embeddings {
    rows: usize,
    dim: usize,
    /// `data[k * dim..(k+1) * dim]` is row `k`.
    data: AlignedBox<[Real]>,
}

impl Embeddings {
    /// Allocates a zeroed `rows` x `dim` matrix.
    pub fn new(rows: usize, dim: usize) -> Result<Self> {
        // Never ask the allocator for zero bytes.
        let len = (rows * dim).max(1);
        let data = AlignedBox::<[Real]>::slice_from_default(ALIGNMENT, len)
            .map_err(|_| anyhow!("memory allocation failed for {rows} x {dim} embeddings"))?;
        Ok(Embeddings { rows, dim, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, i: usize) -> &[Real] {
        &self.data[i * self.dim..][..self.dim]
    }

    /// A copy of row `i`.
    pub fn to_vec(&self, i: usize) -> Vec<real> {
        self.row(i).iter().map(Real::get).collect()
    }

    /// A copy of the whole matrix.
    pub fn to_flat_vec(&self) -> Vec<real> {
        self.data[..self.rows * self.dim].iter().map(Real::get).collect()
    }

    pub fn set_row(&self, i: usize, values: &[real]) {
        assert_eq!(values.len(), self.dim);
        for (e, &v) in self.row(i).iter().zip(values) {
            e.set(v);
        }
    }

    /// Randomly initializes every row, drawing from `rng` row by row.
    pub fn init_random(&self, rng: &mut Rng) {
        for a in 0..self.rows {
            randomize_row(self.row(a), rng);
        }
    }

    /// Seeds rows from a pretrained text embedding file, whose header gives
    /// the row count and dimension, followed by one `word v1 .. vn` line per
    /// row. Rows for words not in `vocab` are skipped. Rows the file does not
    /// cover are randomly initialized from `rng`.
    ///
    /// Returns the number of vocabulary rows the file covered.
    pub fn load_pretrained(&self, path: &Path, vocab: &Vocab, rng: &mut Rng) -> Result<usize> {
        info!("Loading embedding from file {}", path.display());
        let mut f = BufReader::new(
            File::open(path).with_context(|| format!("file {path:?} does not exist"))?,
        );
        let mut line = String::new();
        f.read_line(&mut line)
            .with_context(|| format!("error reading pretrained file {path:?}"))?;
        let mut header = line.split_whitespace();
        let _declared_rows: usize = header
            .next()
            .ok_or_else(|| anyhow!("pretrained file {path:?} has no header"))?
            .parse()
            .context("invalid row count in pretrained file header")?;
        let word_dim: usize = header
            .next()
            .ok_or_else(|| anyhow!("pretrained file {path:?} header has no dimension"))?
            .parse()
            .context("invalid dimension in pretrained file header")?;
        ensure!(
            word_dim == self.dim,
            "embedding dimension incompatible with pretrained file: expected {}, found {word_dim}",
            self.dim
        );

        let mut covered = vec![false; self.rows];
        let mut values: Vec<real> = Vec::with_capacity(self.dim);
        let mut line_num = 1;
        loop {
            line.clear();
            line_num += 1;
            if f.read_line(&mut line)
                .with_context(|| format!("error reading pretrained file {path:?}"))?
                == 0
            {
                break;
            }
            let mut fields = line.split_whitespace();
            let word = match fields.next() {
                Some(w) => w,
                None => continue,
            };
            values.clear();
            for field in fields {
                values.push(field.parse().with_context(|| {
                    format!("invalid number {field:?} on line {line_num} of {path:?}")
                })?);
            }
            ensure!(
                values.len() == self.dim,
                "line {line_num} of {path:?} has {} values, expected {}",
                values.len(),
                self.dim
            );
            if let Some(a) = vocab.lookup(word) {
                if a < self.rows {
                    self.set_row(a, &values);
                    covered[a] = true;
                }
            }
        }

        let in_vocab = covered.iter().filter(|&&c| c).count();
        info!("In vocab: {in_vocab}");
        for a in 0..self.rows {
            if !covered[a] {
                randomize_row(self.row(a), rng);
            }
        }
        Ok(in_vocab)
    }

    /// Writes the matrix with a `rows dim` header, one labelled row per line.
    /// In binary mode the values are raw little-endian floats.
    pub fn save<L: Display>(
        &self,
        output_file: &Path,
        labels: impl IntoIterator<Item = L>,
        binary: bool,
    ) -> Result<()> {
        let mut fo = BufWriter::new(
            File::create(output_file)
                .with_context(|| format!("error creating output file {output_file:?}"))?,
        );
        writeln!(fo, "{} {}", self.rows, self.dim).context("error writing output file")?;
        for (a, label) in labels.into_iter().take(self.rows).enumerate() {
            write!(fo, "{label} ").context("error writing output file")?;
            if binary {
                let row = self.to_vec(a);
                fo.write_all(bytemuck::cast_slice::<real, u8>(&row))
                    .context("error writing output file")?;
            } else {
                for f in self.row(a) {
                    write!(fo, "{:.6} ", f.get()).context("error writing output file")?;
                }
            }
            writeln!(fo).context("error writing output file")?;
        }
        fo.flush().context("error writing output file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit_rows(e: &Embeddings) {
        for a in 0..e.rows() {
            let n = norm(e.row(a));
            assert!((n - 1.0).abs() < 1e-5, "row {a} has norm {n}");
        }
    }

    fn small_vocab() -> Vocab {
        let mut vocab = Vocab::new(101);
        for w in ["apple", "banana", "cherry", "date"] {
            let i = vocab.insert(w).unwrap();
            vocab.bump_count(i);
        }
        vocab.finalize(1);
        vocab
    }

    #[test]
    fn random_rows_are_unit_and_deterministic() {
        let a = Embeddings::new(20, 8).unwrap();
        let b = Embeddings::new(20, 8).unwrap();
        a.init_random(&mut Rng(1));
        b.init_random(&mut Rng(1));
        assert_unit_rows(&a);
        assert_eq!(a.to_flat_vec(), b.to_flat_vec());
        assert_ne!(a.to_vec(0), a.to_vec(1));
    }

    #[test]
    fn renormalize_projects_onto_sphere() {
        let e = Embeddings::new(1, 3).unwrap();
        e.set_row(0, &[3.0, 0.0, 4.0]);
        renormalize(e.row(0));
        assert_eq!(e.to_vec(0), vec![0.6, 0.0, 0.8]);
    }

    #[test]
    fn empty_matrix_is_allowed() {
        let e = Embeddings::new(0, 4).unwrap();
        assert_eq!(e.rows(), 0);
        assert!(e.to_flat_vec().is_empty());
    }

    #[test]
    fn pretrained_rows_are_copied_and_others_randomized() {
        let vocab = small_vocab();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pre_w.txt");
        std::fs::write(
            &path,
            "3 2\nbanana 0.6 0.8\nunknown 1.0 0.0\ndate 0.0 -1.0\n",
        )
        .unwrap();

        let e = Embeddings::new(vocab.len(), 2).unwrap();
        let covered = e.load_pretrained(&path, &vocab, &mut Rng(1)).unwrap();
        assert_eq!(covered, 2);
        assert_eq!(e.to_vec(vocab.lookup("banana").unwrap()), vec![0.6, 0.8]);
        assert_eq!(e.to_vec(vocab.lookup("date").unwrap()), vec![0.0, -1.0]);
        for word in ["</s>", "apple", "cherry"] {
            let row = e.to_vec(vocab.lookup(word).unwrap());
            assert!(row.iter().any(|&x| x != 0.0), "{word} was left at zero");
        }
        assert_unit_rows(&e);
    }

    #[test]
    fn pretrained_dimension_mismatch_is_fatal() {
        let vocab = small_vocab();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pre_w.txt");
        std::fs::write(&path, "1 3\napple 1 0 0\n").unwrap();
        let e = Embeddings::new(vocab.len(), 2).unwrap();
        let err = e.load_pretrained(&path, &vocab, &mut Rng(1)).unwrap_err();
        assert!(err.to_string().contains("dimension"), "{err:#}");
    }

    #[test]
    fn save_text_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let e = Embeddings::new(2, 2).unwrap();
        e.set_row(0, &[1.0, 0.0]);
        e.set_row(1, &[0.0, -1.0]);
        e.save(&path, 0..2, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "2 2\n0 1.000000 0.000000 \n1 0.000000 -1.000000 \n"
        );
    }
}

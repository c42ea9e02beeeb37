//! The training engine: margin ranking updates on the unit sphere, run by
//! a pool of worker threads that share the embedding matrices without locks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::Config;
use crate::corpus::{self, CorpusIndex};
use crate::embeddings::{dot, renormalize, Embeddings, Real};
use crate::model::Model;
use crate::reader::WordReader;
use crate::table::UnigramTable;
use crate::vocab::Vocab;
use crate::{real, Rng, MAX_SENTENCE_LENGTH};

/// Words a worker processes between progress reports and learning rate
/// updates.
const REPORT_INTERVAL: u64 = 10_000;

/// One step of spherical SGD on the triple (`center`, `negative`, `shared`).
///
/// `shared` is a context-word or document row. With `f = center . shared`
/// and `h = negative . shared`, the loss is `max(0, margin - (f - h))`. If
/// the margin is already met this returns `None` and leaves all three rows
/// untouched. Otherwise each row takes a tangent step and is renormalized,
/// and the loss is returned.
///
/// `grad` and `shared_grad` are scratch buffers of the row length.
pub fn margin_rank_update(
    center: &[Real],
    negative: &[Real],
    shared: &[Real],
    margin: real,
    alpha: real,
    grad: &mut [real],
    shared_grad: &mut [real],
) -> Option<real> {
    let size = shared.len();
    let f = dot(center, shared);
    let h = dot(negative, shared);
    if f - h >= margin {
        return None;
    }

    // The shared row's gradient is taken before either center row moves.
    for c in 0..size {
        shared_grad[c] =
            center[c].get() - f * shared[c].get() + h * shared[c].get() - negative[c].get();
    }

    // Positive center: pulled toward `shared`, less as they align.
    for c in 0..size {
        grad[c] = shared[c].get() - f * center[c].get();
    }
    let step = 1.0 - f;
    for c in 0..size {
        center[c].add(alpha * step * grad[c]);
    }
    renormalize(center);

    // Negative center: pushed away from `shared`.
    for c in 0..size {
        grad[c] = h * negative[c].get() - shared[c].get();
    }
    let step = 2.0 * h;
    for c in 0..size {
        negative[c].add(alpha * step * grad[c]);
    }
    renormalize(negative);

    let step = 1.0 - (f - h);
    for c in 0..size {
        shared[c].add(alpha * step * shared_grad[c]);
    }
    renormalize(shared);

    Some(margin - (f - h))
}

/// Learning rate after `words_done` of `planned` words: linear decay from
/// `starting_alpha`, floored at `starting_alpha * 1e-4`.
pub fn decayed_alpha(starting_alpha: real, words_done: u64, planned: u64) -> real {
    starting_alpha * (1.0 - words_done as real / (planned + 1) as real).max(0.0001)
}

/// Running loss totals for one worker, reset at every progress report.
#[derive(Default)]
struct Losses {
    word: real,
    word_count: u64,
    doc: real,
    doc_count: u64,
}

impl Losses {
    fn mean_word(&self) -> real {
        self.word / self.word_count.max(1) as real
    }

    fn mean_doc(&self) -> real {
        self.doc / self.doc_count.max(1) as real
    }
}

/// Everything training needs, built once from a `Config` and then shared
/// read-only (apart from the embedding rows) by every worker thread.
pub struct Trainer {
    config: Config,
    vocab: Vocab,
    corpus: CorpusIndex,
    file_size: u64,
    table: UnigramTable,
    /// Center-word vectors.
    word: Embeddings,
    /// Context-word vectors.
    context: Embeddings,
    /// Document vectors.
    docs: Embeddings,
    /// Words processed so far, summed over threads.
    word_count_actual: AtomicU64,
    starting_alpha: real,
    progress: ProgressBar,
}

fn with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    let mut path = prefix.to_path_buf();
    path.as_mut_os_string().push(suffix);
    path
}

impl Trainer {
    /// Reads the corpus, builds the vocabulary, the document index and the
    /// sampling table, and initializes all three embedding matrices.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        info!("Starting training using file {}", config.train_file.display());

        let scan_progress = if config.debug_mode > 1 {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let (vocab, scan) = match &config.read_vocab_file {
            Some(vocab_file) => {
                let vocab = Vocab::load(vocab_file, config.vocab_hash_size, config.min_count)?;
                let scan = corpus::scan(
                    &config.train_file,
                    config.max_documents,
                    None,
                    &scan_progress,
                )?;
                (vocab, scan)
            }
            None => {
                let mut vocab = Vocab::new(config.vocab_hash_size);
                let scan = corpus::scan(
                    &config.train_file,
                    config.max_documents,
                    Some(&mut vocab),
                    &scan_progress,
                )?;
                vocab.finalize(config.min_count);
                (vocab, scan)
            }
        };
        info!("Vocab size: {}", vocab.len());
        info!("Words in train file: {}", vocab.train_words());
        info!("Documents in train file: {}", scan.corpus.len());
        debug!(tokens = scan.tokens, bytes = scan.file_size, "corpus scanned");

        ensure!(
            vocab.len() > 1,
            "no word in {:?} occurs at least {} times",
            config.train_file,
            config.min_count
        );
        ensure!(
            !scan.corpus.is_empty(),
            "training data file {:?} has no documents",
            config.train_file
        );

        let word = Embeddings::new(vocab.len(), config.size)?;
        let context = Embeddings::new(vocab.len(), config.size)?;
        let docs = Embeddings::new(scan.corpus.len(), config.size)?;
        match &config.load_emb {
            None => {
                let mut rng = Rng(1);
                context.init_random(&mut rng);
                word.init_random(&mut rng);
                docs.init_random(&mut rng);
            }
            Some(prefix) => {
                word.load_pretrained(&with_suffix(prefix, "_w.txt"), &vocab, &mut Rng(1))?;
                context.load_pretrained(&with_suffix(prefix, "_v.txt"), &vocab, &mut Rng(1))?;
                docs.init_random(&mut Rng(1));
            }
        }

        let table = UnigramTable::new(&vocab, config.table_size);

        let progress = if config.debug_mode > 1 {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        Ok(Trainer {
            starting_alpha: config.alpha,
            config,
            vocab,
            corpus: scan.corpus,
            file_size: scan.file_size,
            table,
            word,
            context,
            docs,
            word_count_actual: AtomicU64::new(0),
            progress,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn corpus(&self) -> &CorpusIndex {
        &self.corpus
    }

    pub fn word_vectors(&self) -> &Embeddings {
        &self.word
    }

    pub fn context_vectors(&self) -> &Embeddings {
        &self.context
    }

    pub fn doc_vectors(&self) -> &Embeddings {
        &self.docs
    }

    /// Runs `iter` epochs on `num_threads` threads. An I/O error or a panic
    /// in any worker is returned once all workers have stopped.
    pub fn train(&self) -> Result<()> {
        let planned = self.config.iter as u64 * self.vocab.train_words();
        self.progress.set_length(planned);
        self.progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {per_sec} {msg}",
            )
            .context("invalid progress bar template")?,
        );

        let start = Instant::now();
        let results: Vec<Result<()>> = thread::scope(|s| {
            let this: &Trainer = self;
            let threads = (0..this.config.num_threads)
                .map(|id| s.spawn(move || this.train_thread(id)))
                .collect::<Vec<_>>();
            threads
                .into_iter()
                .map(|t| {
                    t.join()
                        .unwrap_or_else(|_| Err(anyhow!("worker thread panicked")))
                })
                .collect()
        });
        self.progress.finish_and_clear();
        for result in results {
            result.context("error in worker thread")?;
        }
        info!(
            "Trained {} words in {:.1}s",
            self.word_count_actual.load(Ordering::Relaxed),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn train_thread(&self, id: usize) -> Result<()> {
        let config = &self.config;
        let window = config.window;
        let start_offset = self.file_size / config.num_threads as u64 * id as u64;
        let budget = self.vocab.train_words() / config.num_threads as u64;

        let mut reader = WordReader::open_at(&config.train_file, start_offset)?;
        let mut rng = Rng(id as u64);
        let mut alpha = self.starting_alpha;
        let mut local_iter = config.iter;
        let mut word_count: u64 = 0;
        let mut last_word_count: u64 = 0;
        let mut losses = Losses::default();
        let mut sen: Vec<usize> = Vec::with_capacity(MAX_SENTENCE_LENGTH + 1);
        let mut sentence_position: usize = 0;
        let mut doc: usize = 0;
        let mut at_end_of_file = false;
        let mut grad: Vec<real> = vec![0.0; config.size];
        let mut shared_grad: Vec<real> = vec![0.0; config.size];
        loop {
            if word_count - last_word_count > REPORT_INTERVAL {
                self.report_progress(word_count, &mut last_word_count, &mut alpha, &mut losses);
            }

            if sen.is_empty() {
                doc = self.corpus.locate(reader.position());
                at_end_of_file =
                    self.read_sentence(&mut reader, &mut sen, &mut word_count, &mut rng)?;
                sentence_position = 0;
            }

            if (at_end_of_file && sen.is_empty()) || word_count > budget {
                self.word_count_actual
                    .fetch_add(word_count - last_word_count, Ordering::Relaxed);
                local_iter -= 1;
                debug!(thread = id, epochs_left = local_iter, "epoch finished");
                if local_iter == 0 {
                    break;
                }
                word_count = 0;
                last_word_count = 0;
                sen.clear();
                reader.seek_to(start_offset)?;
                continue;
            }
            if sen.is_empty() {
                // A blank line, or every word was out of vocabulary or subsampled.
                continue;
            }

            // `word` is the context; each word within the window around it
            // is a positive center for it.
            let word = sen[sentence_position];
            let b = (rng.rand_u64() % window as u64) as usize;
            for a in b..window * 2 + 1 - b {
                if a == window {
                    continue;
                }
                let c = match (sentence_position + a).checked_sub(window) {
                    Some(c) if c < sen.len() => c,
                    _ => continue,
                };
                let last_word = sen[c];
                for _ in 0..config.negative {
                    let target = self.table.sample(&mut rng);
                    if target == word {
                        continue;
                    }
                    if let Some(loss) = margin_rank_update(
                        self.word.row(last_word),
                        self.word.row(target),
                        self.context.row(word),
                        config.margin,
                        alpha,
                        &mut grad,
                        &mut shared_grad,
                    ) {
                        losses.word += loss;
                        losses.word_count += 1;
                    }
                }
            }

            // The document ranks the word above a negative sample.
            for _ in 0..config.negative {
                let target = self.table.sample(&mut rng);
                if target == word {
                    continue;
                }
                if let Some(loss) = margin_rank_update(
                    self.word.row(word),
                    self.word.row(target),
                    self.docs.row(doc),
                    config.margin,
                    alpha,
                    &mut grad,
                    &mut shared_grad,
                ) {
                    losses.doc += loss;
                    losses.doc_count += 1;
                }
            }

            sentence_position += 1;
            if sentence_position >= sen.len() {
                sen.clear();
            }
        }
        Ok(())
    }

    /// Fills `sen` with the vocabulary indices of the rest of the current
    /// line, up to `MAX_SENTENCE_LENGTH` words, subsampling frequent words.
    /// Returns true if the reader hit end of file.
    ///
    /// `word_count` counts vocabulary words, the sentinel and subsampled
    /// words included. Out-of-vocabulary tokens are not counted, so the
    /// per-thread budget and the planned total agree with `train_words`.
    fn read_sentence<R: std::io::BufRead>(
        &self,
        reader: &mut WordReader<R>,
        sen: &mut Vec<usize>,
        word_count: &mut u64,
        rng: &mut Rng,
    ) -> Result<bool> {
        let sample = self.config.sample;
        let threshold = sample * self.vocab.train_words() as real;
        loop {
            let word = match reader
                .read_word()
                .context("error reading a word from training data")?
            {
                None => return Ok(true),
                Some(w) => w,
            };
            let word = match self.vocab.lookup(&word) {
                None => continue,
                Some(i) => i,
            };
            *word_count += 1;
            if word == 0 {
                return Ok(false);
            }

            // The subsampling randomly discards frequent words while keeping the ranking same
            if sample > 0.0 {
                let f = self.vocab.count(word) as real;
                let ran = ((f / threshold).sqrt() + 1.0) * threshold / f;
                if ran < rng.rand_real() {
                    continue;
                }
            }
            sen.push(word);
            if sen.len() >= MAX_SENTENCE_LENGTH {
                return Ok(false);
            }
        }
    }

    fn report_progress(
        &self,
        word_count: u64,
        last_word_count: &mut u64,
        alpha: &mut real,
        losses: &mut Losses,
    ) {
        let n = word_count - *last_word_count;
        let word_count_actual = self.word_count_actual.fetch_add(n, Ordering::Relaxed) + n;
        *last_word_count = word_count;

        if self.config.debug_mode > 1 {
            self.progress.set_position(word_count_actual);
            self.progress.set_message(format!(
                "alpha {:.6}  loss (w) {:.4}  loss (d) {:.4}",
                alpha,
                losses.mean_word(),
                losses.mean_doc()
            ));
        }
        *losses = Losses::default();
        *alpha = decayed_alpha(
            self.starting_alpha,
            word_count_actual,
            self.config.iter as u64 * self.vocab.train_words(),
        );
    }

    /// Copies the trained vectors into a `Model`.
    pub fn model(&self) -> Model {
        Model {
            size: self.config.size,
            vocab: self.vocab.words().to_vec(),
            word: self.word.to_flat_vec(),
            context: self.context.to_flat_vec(),
            docs: self.docs.to_flat_vec(),
        }
    }

    /// Writes every output file the configuration asks for.
    pub fn save_outputs(&self) -> Result<()> {
        let config = &self.config;
        if let Some(path) = &config.save_vocab_file {
            self.vocab.save(path)?;
            info!("Wrote vocabulary to {}", path.display());
        }
        let words = || self.vocab.words().iter().map(|vw| &vw.word);
        if let Some(path) = &config.word_output {
            self.word.save(path, words(), config.binary)?;
            info!("Wrote word vectors to {}", path.display());
        }
        if let Some(path) = &config.context_output {
            self.context.save(path, words(), config.binary)?;
            info!("Wrote context vectors to {}", path.display());
        }
        if let Some(path) = &config.doc_output {
            self.docs.save(path, 0..self.docs.rows(), config.binary)?;
            info!("Wrote document vectors to {}", path.display());
        }
        if let Some(path) = &config.model_output {
            self.model().save(path)?;
            info!("Wrote model to {}", path.display());
        }
        Ok(())
    }
}

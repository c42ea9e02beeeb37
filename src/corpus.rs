//! Document boundaries in the training corpus.
//!
//! A document is one line of the corpus. The index stores the byte offset
//! just past each document's terminating newline, so a worker thread can
//! tell which document it is reading from nothing but its file position.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use indicatif::ProgressBar;

use crate::reader::WordReader;
use crate::vocab::{Vocab, SENTINEL};

/// Collects document boundaries during the single forward pass over the
/// corpus. Frozen into a `CorpusIndex` by `finish`.
#[derive(Debug)]
pub struct CorpusIndexBuilder {
    offsets: Vec<u64>,
    lengths: Vec<u32>,
    current_len: u32,
    max_documents: usize,
}

impl CorpusIndexBuilder {
    pub fn new(max_documents: usize) -> Self {
        CorpusIndexBuilder {
            offsets: vec![],
            lengths: vec![],
            current_len: 0,
            max_documents,
        }
    }

    /// Counts one token of the current document.
    pub fn add_word(&mut self) {
        self.current_len = self.current_len.saturating_add(1);
    }

    /// Ends the current document; `offset` is the position just past its
    /// newline.
    pub fn end_document(&mut self, offset: u64) -> Result<()> {
        ensure!(
            self.offsets.len() < self.max_documents,
            "corpus has more than {} documents",
            self.max_documents
        );
        debug_assert!(self.offsets.last().map_or(true, |&last| last < offset));
        self.offsets.push(offset);
        self.lengths.push(self.current_len);
        self.current_len = 0;
        Ok(())
    }

    /// Closes a final document that had no trailing newline.
    pub fn finish(mut self, file_size: u64) -> Result<CorpusIndex> {
        if self.current_len > 0 {
            self.end_document(file_size)?;
        }
        Ok(CorpusIndex {
            offsets: self.offsets.into_boxed_slice(),
            lengths: self.lengths.into_boxed_slice(),
        })
    }
}

/// Immutable, strictly increasing document end offsets.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    offsets: Box<[u64]>,
    lengths: Box<[u32]>,
}

impl CorpusIndex {
    /// Number of documents.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Number of tokens in document `doc`, the sentinel excluded.
    pub fn document_len(&self, doc: usize) -> u32 {
        self.lengths[doc]
    }

    /// Locate the document containing byte `pos`: the first document whose
    /// end offset is past `pos`. Positions past the last boundary belong to
    /// the last document.
    pub fn locate(&self, pos: u64) -> usize {
        let d = self.offsets.partition_point(|&end| end <= pos);
        d.min(self.offsets.len().saturating_sub(1))
    }
}

/// What one pass over the corpus produces.
pub struct CorpusScan {
    pub corpus: CorpusIndex,
    pub file_size: u64,
    /// Tokens read, sentinels included.
    pub tokens: u64,
}

/// Reads the corpus once, recording document boundaries and, if `vocab` is
/// given, counting every token into it.
pub fn scan(
    path: &Path,
    max_documents: usize,
    mut vocab: Option<&mut Vocab>,
    progress: &ProgressBar,
) -> Result<CorpusScan> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("error opening training data file {path:?}"))?
        .len();
    progress.set_length(file_size);

    let mut reader = WordReader::open_at(path, 0)?;
    let mut builder = CorpusIndexBuilder::new(max_documents);
    let mut tokens: u64 = 0;
    while let Some(word) = reader
        .read_word()
        .context("error reading training data file")?
    {
        tokens += 1;
        if tokens % 100_000 == 0 {
            progress.set_position(reader.position());
        }

        if let Some(vocab) = vocab.as_deref_mut() {
            let i = vocab.insert(&word)?;
            vocab.bump_count(i);
            vocab.maybe_compact();
        }
        if word == SENTINEL {
            builder.end_document(reader.position())?;
        } else {
            builder.add_word();
        }
    }
    progress.finish_and_clear();

    Ok(CorpusScan {
        corpus: builder.finish(file_size)?,
        file_size,
        tokens,
    })
}

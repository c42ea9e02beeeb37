use std::path::PathBuf;
use std::process;

use anyhow::{ensure, Result};
use clap::Parser;

use jose::eval::{document_averages, f1_macro, f1_micro, knn_classify, read_labels};
use jose::Vectors;

/// Classify documents by k nearest neighbours in embedding space, training
/// on the first documents and testing on the rest.
#[derive(Parser)]
struct Options {
    /// Document vectors written by the training tool, or word vectors when
    /// `--average-over` is given
    #[arg(value_name = "FILE")]
    file_name: PathBuf,

    /// The file is in binary format
    #[arg(long)]
    binary: bool,

    /// Represent each line of CORPUS by the mean of its word vectors instead
    /// of reading document vectors
    #[arg(long = "average-over", value_name = "CORPUS")]
    average_over: Option<PathBuf>,

    /// Gold labels, one integer per line, one line per document
    #[arg(long, value_name = "FILE")]
    labels: PathBuf,

    /// Number of leading documents used for training; a negative N counts
    /// back from the end, so -1 tests on the last document only
    #[arg(long = "train-num", value_name = "N", allow_hyphen_values = true, default_value_t = -1)]
    train_num: i64,

    /// Number of neighbours that vote
    #[arg(long, default_value_t = 3)]
    k: usize,
}

/// Resolves `--train-num` against the document count like a slice bound.
fn split_point(train_num: i64, n: usize) -> Result<usize> {
    let split = if train_num < 0 {
        n as i64 + train_num
    } else {
        train_num
    };
    ensure!(
        split > 0 && split < n as i64,
        "--train-num {train_num} leaves no training or no test documents out of {n}"
    );
    Ok(split as usize)
}

fn run(options: &Options) -> Result<()> {
    ensure!(options.k > 0, "number of neighbours must be positive");
    let vectors = Vectors::load(&options.file_name, options.binary)?;
    let dim = vectors.size();
    let rows = match &options.average_over {
        Some(corpus) => document_averages(&vectors, corpus)?,
        None => vectors.as_slice().to_vec(),
    };
    let n = rows.len() / dim;
    let gold = read_labels(&options.labels)?;
    ensure!(
        gold.len() == n,
        "label file has {} labels for {} documents",
        gold.len(),
        n
    );

    let split = split_point(options.train_num, n)?;
    let (train, test) = rows.split_at(split * dim);
    let (train_labels, test_labels) = gold.split_at(split);
    println!("Using KNN, k = {}", options.k);
    let predicted = knn_classify(train, train_labels, test, dim, options.k);
    println!(
        "F1 macro: {:.4}, F1 micro: {:.4}",
        f1_macro(test_labels, &predicted),
        f1_micro(test_labels, &predicted)
    );
    Ok(())
}

fn main() {
    let options = Options::parse();
    if let Err(err) = run(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;

use jose::eval::spearman;
use jose::Vectors;

/// Correlate cosine similarity of word vectors with human similarity ratings.
#[derive(Parser)]
struct Options {
    /// Word vectors written by the training tool
    #[arg(long = "vectors", value_name = "FILE")]
    vector_file: PathBuf,

    /// The vector file is in binary format
    #[arg(long)]
    binary: bool,

    /// Rated pairs, one `word1 word2 score` per line
    #[arg(long = "pairs", value_name = "FILE")]
    pairs_file: PathBuf,

    /// Lowercase the words of each pair before lookup
    #[arg(long)]
    lowercase: bool,
}

/// A line of a rated pair file. Fields may be separated by whitespace,
/// commas or tabs; lines that are not of the form `word word number` (such
/// as headers) yield `None`.
fn parse_pair(line: &str) -> Option<(&str, &str, f64)> {
    let mut fields = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty());
    let a = fields.next()?;
    let b = fields.next()?;
    let score = fields.next()?.parse().ok()?;
    Some((a, b, score))
}

fn run(options: &Options) -> Result<()> {
    let vectors = Vectors::load(&options.vector_file, options.binary)?;
    let f = BufReader::new(
        File::open(&options.pairs_file)
            .with_context(|| format!("error opening pair file {:?}", options.pairs_file))?,
    );

    let mut human = vec![];
    let mut model = vec![];
    let mut total = 0;
    for line in f.lines() {
        let line = line.context("error reading pair file")?;
        let (a, b, score) = match parse_pair(&line) {
            Some(pair) => pair,
            None => continue,
        };
        total += 1;
        let (a, b) = if options.lowercase {
            (a.to_lowercase(), b.to_lowercase())
        } else {
            (a.to_string(), b.to_string())
        };
        if let (Some(i), Some(j)) = (vectors.lookup(&a), vectors.lookup(&b)) {
            human.push(score);
            model.push(vectors.similarity(i, j) as f64);
        }
    }

    println!("Pairs found: {} / {}", human.len(), total);
    match spearman(&human, &model) {
        Some(rho) => println!("Spearman's rho: {rho:.4}"),
        None => bail!("not enough rated pairs in vocabulary to compute a correlation"),
    }
    Ok(())
}

fn main() {
    let options = Options::parse();
    if let Err(err) = run(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

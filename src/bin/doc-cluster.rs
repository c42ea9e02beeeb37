use std::path::PathBuf;
use std::process;

use anyhow::{ensure, Result};
use clap::Parser;

use jose::eval::{
    adjusted_rand, document_averages, mutual_info, nmi, purity, read_labels, spherical_kmeans,
};
use jose::Vectors;

/// Cluster document vectors with spherical k-means.
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

    /// Number of clusters
    #[arg(long, default_value_t = 20)]
    k: usize,

    /// Number of k-means iterations
    #[arg(long, default_value_t = 10)]
    iter: usize,

    /// Gold labels, one integer per line, one line per document; if given,
    /// report how well the clustering matches them
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,
}

fn run(options: &Options) -> Result<()> {
    ensure!(options.k > 0, "number of clusters must be positive");
    let vectors = Vectors::load(&options.file_name, options.binary)?;
    let clusters = match &options.average_over {
        Some(corpus) => {
            let rows = document_averages(&vectors, corpus)?;
            let clusters = spherical_kmeans(&rows, vectors.size(), options.k, options.iter);
            for (doc, cluster) in clusters.iter().enumerate() {
                println!("{doc} {cluster}");
            }
            clusters
        }
        None => {
            let clusters =
                spherical_kmeans(vectors.as_slice(), vectors.size(), options.k, options.iter);
            for (doc, cluster) in clusters.iter().enumerate() {
                println!("{} {}", vectors.label(doc), cluster);
            }
            clusters
        }
    };

    if let Some(path) = &options.labels {
        let gold = read_labels(path)?;
        ensure!(
            gold.len() == clusters.len(),
            "label file has {} labels for {} documents",
            gold.len(),
            clusters.len()
        );
        eprintln!("mutual_info_score = {:.4}", mutual_info(&gold, &clusters));
        eprintln!("normalized_mutual_info_score = {:.4}", nmi(&gold, &clusters));
        eprintln!("adjusted_rand_score = {:.4}", adjusted_rand(&gold, &clusters));
        eprintln!("purity = {:.4}", purity(&gold, &clusters));
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

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use jose::{normalize, Vectors};

/// number of closest words that will be shown
const N: usize = 40;

/// Interactively list the rows nearest to a word or a sum of words.
#[derive(Parser)]
struct Options {
    /// Vectors written by the training tool
    #[arg(value_name = "FILE")]
    file_name: PathBuf,

    /// The file is in binary format
    #[arg(long)]
    binary: bool,
}

fn run(options: &Options) -> Result<()> {
    let vectors = Vectors::load(&options.file_name, options.binary)?;
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    'outer: loop {
        print!("Enter word or sentence (EXIT to break): ");
        std::io::stdout().flush().context("error writing to stdout")?;

        let mut st1 = String::new();
        if input.read_line(&mut st1).context("error reading stdin")? == 0 {
            break;
        }
        let st1 = st1.trim();
        if st1 == "EXIT" {
            break;
        }

        let mut bi: Vec<usize> = vec![];
        for sta in st1.split_whitespace() {
            println!();
            match vectors.lookup(sta) {
                None => {
                    println!("Word: {sta}  Position in vocabulary: None");
                    println!("Out of dictionary word!");
                    continue 'outer;
                }
                Some(i) => {
                    println!("Word: {sta}  Position in vocabulary: {i}");
                    bi.push(i);
                }
            }
        }
        if bi.is_empty() {
            continue;
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");

        let mut vec = vec![0.0f32; vectors.size()];
        for &i in &bi {
            for (v, r) in vec.iter_mut().zip(vectors[i].iter().copied()) {
                *v += r;
            }
        }
        normalize(&mut vec);

        for (c, dist) in vectors.nearest(&vec, N, &bi) {
            println!("{:50}\t\t{}", vectors.label(c), dist);
        }
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

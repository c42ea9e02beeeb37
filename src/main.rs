use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use jose::{real, Config, Trainer};

#[derive(Parser)]
#[command(
    about = "Joint spherical embeddings of words, contexts and documents",
    long_about = None,
    version
)]
struct Options {
    /// Use text data from FILE to train the model; each line is a document
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors
    #[arg(long = "word-output", value_name = "FILE")]
    word_output: Option<PathBuf>,

    /// Use FILE to save the resulting context vectors
    #[arg(long = "context-output", value_name = "FILE")]
    context_output: Option<PathBuf>,

    /// Use FILE to save the resulting document vectors
    #[arg(long = "doc-output", value_name = "FILE")]
    doc_output: Option<PathBuf>,

    /// Also save the whole model to FILE in bincode format
    #[arg(long = "bincode", value_name = "FILE")]
    model_output: Option<PathBuf>,

    /// Set size of word vectors; default is 100
    #[arg(long, default_value_t = 100)]
    size: usize,

    /// Set max skip length between words; default is 5
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5)
    #[arg(long, default_value_t = 1e-3)]
    sample: real,

    /// Number of negative examples; default is 2
    #[arg(long, default_value_t = 2)]
    negative: usize,

    /// Use N threads
    #[arg(long = "threads", value_name = "N", default_value_t = 20)]
    num_threads: usize,

    /// Margin between positive and negative similarity; default is 0.15
    #[arg(long, default_value_t = 0.15)]
    margin: real,

    /// Run more training iterations; default is 10
    #[arg(long, default_value_t = 10)]
    iter: usize,

    /// Discard words that appear less than N times; default is 5
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Set the starting learning rate; default is 0.04
    #[arg(long, default_value_t = 0.04)]
    alpha: real,

    /// Set the debug mode (default = 2 = more info during training)
    #[arg(long = "debug", default_value_t = 2)]
    debug_mode: usize,

    /// Save the resulting vectors in binary mode
    #[arg(long)]
    binary: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,

    /// Initialize word and context vectors from PREFIX_w.txt and PREFIX_v.txt
    #[arg(long = "load-emb", value_name = "PREFIX")]
    load_emb: Option<PathBuf>,
}

impl From<Options> for Config {
    fn from(options: Options) -> Self {
        Config {
            train_file: options.train_file,
            word_output: options.word_output,
            context_output: options.context_output,
            doc_output: options.doc_output,
            model_output: options.model_output,
            binary: options.binary,
            save_vocab_file: options.save_vocab_file,
            read_vocab_file: options.read_vocab_file,
            load_emb: options.load_emb,
            size: options.size,
            window: options.window,
            sample: options.sample,
            negative: options.negative,
            num_threads: options.num_threads,
            margin: options.margin,
            iter: options.iter,
            min_count: options.min_count,
            alpha: options.alpha,
            debug_mode: options.debug_mode,
            ..Config::default()
        }
    }
}

fn run(config: Config) -> Result<()> {
    let trainer = Trainer::new(config)?;
    trainer.train()?;
    trainer.save_outputs()
}

fn main() {
    let options = Options::parse();

    let level = match options.debug_mode {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(options.into()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use jose::embeddings::norm;
use jose::{Config, Embeddings, Model, Trainer, Vectors};

const TWO_DOCS: &str = "the cat sat on the mat\nthe dog sat on the log\n";

fn small_config(train_file: &Path) -> Config {
    Config {
        train_file: train_file.to_path_buf(),
        size: 4,
        window: 2,
        sample: 0.0,
        negative: 1,
        num_threads: 1,
        margin: 0.15,
        iter: 1,
        min_count: 2,
        alpha: 0.04,
        debug_mode: 0,
        vocab_hash_size: 1000,
        table_size: 10_000,
        max_documents: 100,
        ..Config::default()
    }
}

fn write_corpus(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("corpus.txt");
    fs::write(&path, text).unwrap();
    path
}

fn assert_unit_rows(e: &Embeddings) {
    for a in 0..e.rows() {
        let n = norm(e.row(a));
        assert!((n - 1.0).abs() < 1e-4, "row {a} has norm {n}");
    }
}

/// Parses a text vector file into its header and rows, without normalizing.
fn read_text_vectors(path: &Path) -> ((usize, usize), Vec<(String, Vec<f32>)>) {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let header: Vec<usize> = lines
        .next()
        .unwrap()
        .split_whitespace()
        .map(|f| f.parse().unwrap())
        .collect();
    let rows = lines
        .map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next().unwrap().to_string();
            (label, fields.map(|f| f.parse().unwrap()).collect())
        })
        .collect();
    ((header[0], header[1]), rows)
}

#[test]
fn two_documents_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    let config = Config {
        word_output: Some(dir.path().join("word.txt")),
        context_output: Some(dir.path().join("context.txt")),
        doc_output: Some(dir.path().join("doc.txt")),
        ..small_config(&corpus)
    };

    let trainer = Trainer::new(config).unwrap();
    let words: Vec<&str> = trainer
        .vocab()
        .words()
        .iter()
        .map(|vw| vw.word.as_str())
        .collect();
    assert_eq!(words, vec!["</s>", "the", "sat", "on"]);
    assert_eq!(trainer.corpus().len(), 2);

    trainer.train().unwrap();
    assert_unit_rows(trainer.word_vectors());
    assert_unit_rows(trainer.context_vectors());
    assert_unit_rows(trainer.doc_vectors());
    trainer.save_outputs().unwrap();

    let ((rows, dim), docs) = read_text_vectors(&dir.path().join("doc.txt"));
    assert_eq!((rows, dim), (2, 4));
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].0, "0");
    assert_eq!(docs[1].0, "1");

    for file in ["word.txt", "context.txt", "doc.txt"] {
        let (_, rows) = read_text_vectors(&dir.path().join(file));
        for (label, v) in rows {
            assert_eq!(v.len(), 4);
            let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((n - 1.0).abs() < 1e-4, "{file}: {label} has norm {n}");
        }
    }

    let ((rows, _), word_rows) = read_text_vectors(&dir.path().join("word.txt"));
    assert_eq!(rows, 4);
    assert!(word_rows.iter().all(|(w, _)| w != "cat" && w != "dog"));
}

#[test]
fn single_thread_training_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    let run = || {
        let trainer = Trainer::new(small_config(&corpus)).unwrap();
        let before = trainer.model();
        trainer.train().unwrap();
        (before, trainer.model())
    };
    let (before, a) = run();
    let (_, b) = run();
    assert_eq!(a.word, b.word);
    assert_eq!(a.context, b.context);
    assert_eq!(a.docs, b.docs);
    assert_ne!(before.word, a.word, "training did not change anything");
}

#[test]
fn many_threads_and_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::new();
    for i in 0..200 {
        text.push_str(&format!(
            "alpha beta gamma w{} delta alpha beta epsilon w{}\n",
            i % 7,
            i % 3
        ));
    }
    let corpus = write_corpus(dir.path(), &text);
    let config = Config {
        num_threads: 4,
        iter: 3,
        negative: 3,
        sample: 1e-3,
        size: 8,
        model_output: Some(dir.path().join("model.bin")),
        ..small_config(&corpus)
    };

    let trainer = Trainer::new(config).unwrap();
    assert_eq!(trainer.corpus().len(), 200);
    trainer.train().unwrap();
    assert_unit_rows(trainer.word_vectors());
    assert_unit_rows(trainer.context_vectors());
    assert_unit_rows(trainer.doc_vectors());
    trainer.save_outputs().unwrap();

    let model = Model::load(&dir.path().join("model.bin")).unwrap();
    assert_eq!(model.size, 8);
    assert_eq!(model.num_docs(), 200);
    assert_eq!(model.vocab.len(), trainer.vocab().len());
    assert_eq!(model.docs, trainer.doc_vectors().to_flat_vec());
}

#[test]
fn unterminated_last_line_is_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "the cat sat on the mat\nthe dog sat on the log");
    let trainer = Trainer::new(small_config(&corpus)).unwrap();
    assert_eq!(trainer.corpus().len(), 2);
    trainer.train().unwrap();
    assert_unit_rows(trainer.doc_vectors());
}

#[test]
fn saved_vocabulary_can_be_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    let vocab_file = dir.path().join("vocab.txt");
    let first = Trainer::new(Config {
        save_vocab_file: Some(vocab_file.clone()),
        ..small_config(&corpus)
    })
    .unwrap();
    assert!(!vocab_file.exists());
    first.train().unwrap();
    first.save_outputs().unwrap();
    assert_eq!(
        fs::read_to_string(&vocab_file).unwrap(),
        "</s> 2\nthe 4\nsat 2\non 2\n"
    );

    let second = Trainer::new(Config {
        read_vocab_file: Some(vocab_file),
        min_count: 3,
        ..small_config(&corpus)
    })
    .unwrap();
    assert_eq!(second.vocab().len(), 2);
    assert_eq!(second.vocab().lookup("the"), Some(1));
    assert_eq!(second.corpus().len(), first.corpus().len());
    second.train().unwrap();
    assert_unit_rows(second.word_vectors());
}

#[test]
fn pretrained_vectors_seed_covered_rows() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    fs::write(
        dir.path().join("pre_w.txt"),
        "3 4\nthe 0.5 0.5 0.5 0.5\nzebra 1 0 0 0\nsat 0 0 0.6 0.8\n",
    )
    .unwrap();
    fs::write(dir.path().join("pre_v.txt"), "1 4\non 0 1 0 0\n").unwrap();

    let trainer = Trainer::new(Config {
        load_emb: Some(dir.path().join("pre")),
        ..small_config(&corpus)
    })
    .unwrap();
    let vocab = trainer.vocab();
    let word = trainer.word_vectors();
    assert_eq!(word.to_vec(vocab.lookup("the").unwrap()), vec![0.5; 4]);
    assert_eq!(
        word.to_vec(vocab.lookup("sat").unwrap()),
        vec![0.0, 0.0, 0.6, 0.8]
    );
    assert_eq!(
        trainer.context_vectors().to_vec(vocab.lookup("on").unwrap()),
        vec![0.0, 1.0, 0.0, 0.0]
    );
    for e in [word, trainer.context_vectors(), trainer.doc_vectors()] {
        assert_unit_rows(e);
        for a in 0..e.rows() {
            assert!(e.to_vec(a).iter().any(|&x| x != 0.0));
        }
    }
}

#[test]
fn pretrained_dimension_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    fs::write(dir.path().join("pre_w.txt"), "1 3\nthe 1 0 0\n").unwrap();
    fs::write(dir.path().join("pre_v.txt"), "0 4\n").unwrap();
    let word_output = dir.path().join("word.txt");
    let vocab_file = dir.path().join("vocab.txt");

    let result = Trainer::new(Config {
        load_emb: Some(dir.path().join("pre")),
        word_output: Some(word_output.clone()),
        save_vocab_file: Some(vocab_file.clone()),
        ..small_config(&corpus)
    });
    let err = result.err().unwrap();
    assert!(format!("{err:#}").contains("dimension"), "{err:#}");
    assert!(!word_output.exists());
    assert!(!vocab_file.exists());
}

#[test]
fn fatal_configurations() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);

    let no_negatives = Config {
        negative: 0,
        ..small_config(&corpus)
    };
    assert!(Trainer::new(no_negatives).is_err());

    let missing = small_config(&dir.path().join("missing.txt"));
    assert!(Trainer::new(missing).is_err());

    let empty = write_corpus(dir.path(), "");
    assert!(Trainer::new(small_config(&empty)).is_err());

    let too_rare = Config {
        min_count: 100,
        ..small_config(&corpus)
    };
    assert!(Trainer::new(too_rare).is_err());

    let too_many_docs = Config {
        max_documents: 1,
        ..small_config(&corpus)
    };
    assert!(Trainer::new(too_many_docs).is_err());
}

#[test]
fn binary_output_loads_as_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), TWO_DOCS);
    let word_output = dir.path().join("word.bin");
    let trainer = Trainer::new(Config {
        word_output: Some(word_output.clone()),
        binary: true,
        ..small_config(&corpus)
    })
    .unwrap();
    trainer.train().unwrap();
    trainer.save_outputs().unwrap();

    let vectors = Vectors::load(&word_output, true).unwrap();
    assert_eq!(vectors.num_rows(), trainer.vocab().len());
    assert_eq!(vectors.size(), 4);
    let the = vectors.lookup("the").unwrap();
    assert_eq!(vectors.label(the), "the");
    let expected = trainer.word_vectors().to_vec(the);
    for (a, b) in vectors[the].iter().zip(&expected) {
        assert!((a - b).abs() < 1e-5);
    }
}

//! Black-box pipeline test: vocabulary -> Huffman/unigram tables -> training
//! -> vector writer, exercised the way a CLI invocation would drive them.

use std::fs::File;
use std::io::Write;

use wordvec_core::tokenizer::{Next, Tokenizer};
use wordvec_core::{huffman, train, write_vectors, Architecture, Config, UnigramTable, Vocab, VectorFormat};

fn write_corpus(contents: &str) -> tempfile::TempPath {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.into_temp_path()
}

fn build_vocab(path: &std::path::Path, min_count: u64) -> Vocab {
    let mut vocab = Vocab::new(5_000, 0, 100);
    let file = File::open(path).unwrap();
    let mut tokenizer = Tokenizer::new(file, 100);
    loop {
        match tokenizer.next_token().unwrap() {
            Next::Eof => break,
            Next::Token(token) => {
                let id = vocab.add_or_lookup(&token);
                vocab.incr(id);
            }
        }
    }
    vocab.sort_and_prune(min_count);
    vocab
}

#[test]
fn full_pipeline_produces_readable_vectors() {
    let corpus = write_corpus(
        &"the quick brown fox jumps over the lazy dog the dog barks at the fox\n".repeat(50),
    );
    let vocab = build_vocab(corpus.as_ref(), 2);
    assert!(vocab.len() > 1);

    let counts: Vec<u64> = (0..vocab.len()).map(|id| vocab.count(id)).collect();
    let codes = huffman::build(&counts).unwrap();
    let unigram = UnigramTable::build(&counts, 20_000);

    let mut config = Config::new(Architecture::SkipGram);
    config.dims = 12;
    config.epochs = 2;
    config.threads = 2;
    config.window = 3;
    config.hs = true;
    config.negative = 3;

    let model = train(corpus.as_ref(), &vocab, Some(&codes), Some(&unigram), &config).unwrap();
    assert_eq!(model.input.rows(), vocab.len());
    assert_eq!(model.input.cols(), config.dims);

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("vectors.txt");
    write_vectors(&out_path, &vocab, &model.input, VectorFormat::Text).unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    let mut lines = written.lines();
    let header = lines.next().unwrap();
    let mut header_fields = header.split_whitespace();
    let written_vocab_size: usize = header_fields.next().unwrap().parse().unwrap();
    let written_dims: usize = header_fields.next().unwrap().parse().unwrap();
    assert_eq!(written_vocab_size, vocab.len());
    assert_eq!(written_dims, config.dims);
    assert_eq!(lines.count(), vocab.len());
}

#[test]
fn min_count_prunes_rare_tokens_before_training() {
    let corpus = write_corpus("common common common common rare\n");
    let vocab = build_vocab(corpus.as_ref(), 2);
    assert!(vocab.lookup(b"common").is_some());
    assert!(vocab.lookup(b"rare").is_none());
}

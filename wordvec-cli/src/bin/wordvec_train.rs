use std::fs::File;
use std::path::Path;

use anyhow::Result;

use wordvec_cli::{config_from_matches, train_app, vector_format_from_matches, RunInfo, CORPUS, OUTPUT};
use wordvec_core::tokenizer::{Next, Tokenizer};
use wordvec_core::{huffman, train, vocab::Vocab, write_vectors, UnigramTable};

fn main() -> Result<()> {
    env_logger::init();

    let matches = train_app("wordvec-train").get_matches();
    let corpus = matches.value_of(CORPUS).unwrap();
    let output = matches.value_of(OUTPUT).unwrap();
    let config = config_from_matches(&matches)?;
    let format = vector_format_from_matches(&matches);

    if matches.value_of("classes").is_some() || matches.value_of("debug").is_some() {
        log::warn!("--classes and --debug are accepted for compatibility but have no effect here");
    }

    let run = RunInfo::new(corpus, output);
    log::info!("starting run at {} ({} -> {})", run.start, run.corpus, run.output);

    log::info!("building vocabulary from {corpus}");
    let mut vocab = Vocab::new(config.vocab.hash_size, 0, config.vocab.max_token_len);
    {
        let file = File::open(corpus)?;
        let mut tokenizer = Tokenizer::new(file, config.vocab.max_token_len);
        loop {
            match tokenizer.next_token()? {
                Next::Eof => break,
                Next::Token(token) => {
                    let id = vocab.add_or_lookup(&token);
                    vocab.incr(id);
                    if vocab.load_factor() > 0.7 {
                        vocab.reduce();
                    }
                }
            }
        }
    }
    vocab.sort_and_prune(config.vocab.min_count);
    log::info!("vocabulary built: {} types, {} tokens", vocab.len(), vocab.n_total());

    let counts: Vec<u64> = (0..vocab.len()).map(|id| vocab.count(id)).collect();
    let huffman_codes = config.hs.then(|| huffman::build(&counts)).transpose()?;
    let unigram_table = (config.negative > 0)
        .then(|| UnigramTable::build(&counts, config.unigram_table_size));

    let model = train(
        Path::new(corpus),
        &vocab,
        huffman_codes.as_deref(),
        unigram_table.as_ref(),
        &config,
    )?;

    log::info!("writing vectors to {output}");
    write_vectors(output, &vocab, &model.input, format)?;

    let elapsed_ms = chrono::Local::now().timestamp_millis() - run.start.timestamp_millis();
    log::info!("done in {} ms", elapsed_ms.max(0));
    Ok(())
}

use std::path::Path;

use anyhow::Result;

use wordvec_cli::{phrase_app, phrase_config_from_matches, RunInfo, CORPUS, OUTPUT};
use wordvec_core::phrase::{learn_bigram_vocab, rewrite};

fn main() -> Result<()> {
    env_logger::init();

    let matches = phrase_app("wordvec-phrase").get_matches();
    let corpus = matches.value_of(CORPUS).unwrap();
    let output = matches.value_of(OUTPUT).unwrap();
    let config = phrase_config_from_matches(&matches)?;

    let run = RunInfo::new(corpus, output);
    log::info!("starting phrase pass at {} ({} -> {})", run.start, run.corpus, run.output);

    log::info!("scanning {corpus} for unigram and bigram counts");
    let vocab = learn_bigram_vocab(Path::new(corpus), &config)?;
    log::info!("{} unigram/bigram types survived pruning", vocab.len());

    log::info!("rewriting {corpus} -> {output}");
    rewrite(Path::new(corpus), Path::new(output), &vocab, &config)?;

    let elapsed_ms = chrono::Local::now().timestamp_millis() - run.start.timestamp_millis();
    log::info!("done in {} ms", elapsed_ms.max(0));
    Ok(())
}

//! Shared `clap` wiring for the two binaries (`wordvec-train`,
//! `wordvec-phrase`): argument definitions and the matches-to-`Config`
//! conversion, split out so both binaries build the same way the
//! reference CLI's own multi-binary app builders do.

use std::convert::TryFrom;

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{App, AppSettings, Arg, ArgMatches};
use stdinout::OrExit;

use wordvec_core::{Architecture, Config, PhraseConfig};

pub const CORPUS: &str = "CORPUS";
pub const OUTPUT: &str = "OUTPUT";

/// Timestamped provenance for one run, recorded in the run's log output.
#[derive(Debug)]
pub struct RunInfo {
    pub start: DateTime<Local>,
    pub corpus: String,
    pub output: String,
}

impl RunInfo {
    pub fn new(corpus: impl Into<String>, output: impl Into<String>) -> Self {
        RunInfo {
            start: Local::now(),
            corpus: corpus.into(),
            output: output.into(),
        }
    }
}

/// Builds the `wordvec-train` argument parser.
pub fn train_app<'a, 'b>(name: &'b str) -> App<'a, 'b> {
    App::new(name)
        .settings(&[AppSettings::DeriveDisplayOrder, AppSettings::UnifiedHelpMessage])
        .arg(
            Arg::with_name("architecture")
                .long("architecture")
                .takes_value(true)
                .default_value("skipgram")
                .possible_values(&["cbow", "skipgram"])
                .help("context-prediction architecture"),
        )
        .arg(
            Arg::with_name("dims")
                .long("dims")
                .short("d")
                .takes_value(true)
                .default_value("100")
                .help("embedding dimensionality"),
        )
        .arg(
            Arg::with_name("window")
                .long("window")
                .short("w")
                .takes_value(true)
                .default_value("5")
                .help("maximum context window radius"),
        )
        .arg(
            Arg::with_name("epochs")
                .long("epochs")
                .short("e")
                .takes_value(true)
                .default_value("5")
                .help("number of passes over the corpus"),
        )
        .arg(
            Arg::with_name("lr")
                .long("lr")
                .takes_value(true)
                .help("initial learning rate (defaults depend on --architecture)"),
        )
        .arg(
            Arg::with_name("mincount")
                .long("mincount")
                .takes_value(true)
                .default_value("5")
                .help("discard tokens occurring fewer than this many times"),
        )
        .arg(
            Arg::with_name("sample")
                .long("sample")
                .takes_value(true)
                .default_value("0.001")
                .help("frequent-word subsampling threshold, 0 to disable"),
        )
        .arg(
            Arg::with_name("hs")
                .long("hs")
                .help("enable hierarchical softmax"),
        )
        .arg(
            Arg::with_name("negative")
                .long("negative")
                .takes_value(true)
                .default_value("5")
                .help("negative samples per positive example, 0 to disable"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .help("worker thread count (defaults to the available parallelism)"),
        )
        .arg(
            Arg::with_name("format")
                .long("format")
                .takes_value(true)
                .default_value("text")
                .possible_values(&["text", "bin"])
                .help("output vector format"),
        )
        .arg(
            Arg::with_name("classes")
                .long("classes")
                .takes_value(true)
                .help("accepted for compatibility; k-means output classes are not implemented here"),
        )
        .arg(
            Arg::with_name("debug")
                .long("debug")
                .takes_value(true)
                .help("accepted for compatibility; use RUST_LOG instead"),
        )
        .arg(
            Arg::with_name(CORPUS)
                .index(1)
                .required(true)
                .help("path to the training corpus"),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .index(2)
                .required(true)
                .help("path to write the trained vectors to"),
        )
}

/// Builds the `wordvec-phrase` argument parser.
pub fn phrase_app<'a, 'b>(name: &'b str) -> App<'a, 'b> {
    App::new(name)
        .settings(&[AppSettings::DeriveDisplayOrder, AppSettings::UnifiedHelpMessage])
        .arg(
            Arg::with_name("mincount")
                .long("mincount")
                .takes_value(true)
                .default_value("5")
                .help("minimum unigram/bigram count to be eligible for joining"),
        )
        .arg(
            Arg::with_name("threshold")
                .long("threshold")
                .takes_value(true)
                .default_value("100.0")
                .help("minimum collocation score required to join a pair"),
        )
        .arg(
            Arg::with_name(CORPUS)
                .index(1)
                .required(true)
                .help("path to the corpus to rewrite"),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .index(2)
                .required(true)
                .help("path to write the phrase-joined corpus to"),
        )
}

pub fn config_from_matches(matches: &ArgMatches) -> Result<Config> {
    let architecture = Architecture::try_from(matches.value_of("architecture").unwrap())?;
    let mut config = Config::new(architecture);

    config.dims = matches
        .value_of("dims")
        .unwrap()
        .parse()
        .or_exit("invalid --dims", 1);
    config.window = matches
        .value_of("window")
        .unwrap()
        .parse()
        .or_exit("invalid --window", 1);
    config.epochs = matches
        .value_of("epochs")
        .unwrap()
        .parse()
        .or_exit("invalid --epochs", 1);
    config.vocab.min_count = matches
        .value_of("mincount")
        .unwrap()
        .parse()
        .or_exit("invalid --mincount", 1);
    config.sample = matches
        .value_of("sample")
        .unwrap()
        .parse()
        .or_exit("invalid --sample", 1);
    config.hs = matches.is_present("hs");
    config.negative = matches
        .value_of("negative")
        .unwrap()
        .parse()
        .or_exit("invalid --negative", 1);
    config.threads = match matches.value_of("threads") {
        Some(v) => v.parse().or_exit("invalid --threads", 1),
        None => num_cpus::get(),
    };

    // An explicit --lr always overrides the architecture-conditioned
    // default that `Config::new` already applied.
    if let Some(lr) = matches.value_of("lr") {
        config.lr = lr.parse().or_exit("invalid --lr", 1);
    }

    config.validate()?;
    Ok(config)
}

pub fn vector_format_from_matches(matches: &ArgMatches) -> wordvec_core::VectorFormat {
    match matches.value_of("format").unwrap() {
        "bin" => wordvec_core::VectorFormat::Binary,
        _ => wordvec_core::VectorFormat::Text,
    }
}

pub fn phrase_config_from_matches(matches: &ArgMatches) -> Result<PhraseConfig> {
    let mut config = PhraseConfig::default();
    config.min_count = matches
        .value_of("mincount")
        .unwrap()
        .parse()
        .or_exit("invalid --mincount", 1);
    config.threshold = matches
        .value_of("threshold")
        .unwrap()
        .parse()
        .or_exit("invalid --threshold", 1);
    Ok(config)
}

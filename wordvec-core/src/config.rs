//! Training configuration.
//!
//! Grouped the way the reference CLI groups its own flags: one struct per
//! concern (architecture/objective, optimization schedule, vocabulary
//! shaping), `Serialize`-derived so a run's configuration can be written
//! alongside its output vectors for reproducibility.

use anyhow::{bail, Error, Result};
use serde::Serialize;
use std::convert::TryFrom;

use crate::unigram::DEFAULT_TABLE_SIZE;

/// The context-prediction architecture. Distinct from the objective (see
/// [`Config::hs`] / [`Config::negative`]), which can be toggled
/// independently of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Cbow,
    SkipGram,
}

impl TryFrom<&str> for Architecture {
    type Error = Error;

    fn try_from(v: &str) -> Result<Self> {
        match v {
            "cbow" => Ok(Architecture::Cbow),
            "skipgram" | "skip-gram" => Ok(Architecture::SkipGram),
            _ => bail!("unknown architecture: {}", v),
        }
    }
}

/// Vocabulary-construction knobs, shared between the trainer's pass and the
/// phrase pass (which uses a different hash seed over the same mechanism).
#[derive(Clone, Copy, Debug, Serialize)]
pub struct VocabConfig {
    pub min_count: u64,
    pub hash_size: usize,
    pub max_token_len: usize,
}

impl Default for VocabConfig {
    fn default() -> Self {
        VocabConfig {
            min_count: 5,
            hash_size: 30_000_000,
            max_token_len: 100,
        }
    }
}

/// Full configuration for one training run.
///
/// `hs` and `negative` are independent flags rather than a single
/// objective enum: the reference trainer allows running both hierarchical
/// softmax and negative sampling in the same pass (each contributes its own
/// gradient term), so collapsing them into mutually exclusive variants
/// would lose a real, supported configuration.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Config {
    pub architecture: Architecture,
    pub dims: usize,
    pub window: usize,
    pub epochs: u32,
    pub lr: f32,
    pub sample: f64,
    pub hs: bool,
    pub negative: u32,
    pub threads: usize,
    pub vocab: VocabConfig,
    #[serde(skip)]
    pub unigram_table_size: usize,
}

impl Config {
    /// `lr` defaults to 0.05 for CBOW and 0.025 for skip-gram, matching the
    /// reference's architecture-conditioned default; an explicit override
    /// passed to the CLI always wins over this default (applied before any
    /// override, never after).
    pub fn default_lr_for(architecture: Architecture) -> f32 {
        match architecture {
            Architecture::Cbow => 0.05,
            Architecture::SkipGram => 0.025,
        }
    }

    pub fn new(architecture: Architecture) -> Self {
        Config {
            architecture,
            dims: 100,
            window: 5,
            epochs: 5,
            lr: Self::default_lr_for(architecture),
            sample: 1e-3,
            hs: false,
            negative: 5,
            threads: 12,
            vocab: VocabConfig::default(),
            unigram_table_size: DEFAULT_TABLE_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.hs && self.negative == 0 {
            bail!("at least one of hierarchical softmax or negative sampling must be enabled");
        }
        if self.dims == 0 {
            bail!("embedding dimensionality must be positive");
        }
        if self.threads == 0 {
            bail!("thread count must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbow_and_skipgram_have_different_default_learning_rates() {
        assert_eq!(Config::default_lr_for(Architecture::Cbow), 0.05);
        assert_eq!(Config::default_lr_for(Architecture::SkipGram), 0.025);
    }

    #[test]
    fn new_config_picks_up_architecture_default_lr() {
        let cfg = Config::new(Architecture::SkipGram);
        assert_eq!(cfg.lr, 0.025);
    }

    #[test]
    fn validate_rejects_no_objective() {
        let mut cfg = Config::new(Architecture::Cbow);
        cfg.hs = false;
        cfg.negative = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_both_objectives_enabled() {
        let mut cfg = Config::new(Architecture::Cbow);
        cfg.hs = true;
        cfg.negative = 5;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn architecture_parses_from_str() {
        assert_eq!(Architecture::try_from("cbow").unwrap(), Architecture::Cbow);
        assert_eq!(
            Architecture::try_from("skipgram").unwrap(),
            Architecture::SkipGram
        );
        assert!(Architecture::try_from("bogus").is_err());
    }
}

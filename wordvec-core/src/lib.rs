//! Vocabulary construction, Huffman/unigram tables, and the lock-free SGD
//! engine behind a word-embedding trainer.

pub mod config;
pub mod huffman;
pub mod model;
pub mod phrase;
pub mod rng;
pub mod sigmoid;
pub mod tokenizer;
pub mod train;
pub mod unigram;
pub mod vocab;
pub mod writer;

pub use config::{Architecture, Config, VocabConfig};
pub use huffman::Code as HuffmanCode;
pub use model::{AlignedMatrix, HogwildCell};
pub use phrase::PhraseConfig;
pub use rng::Lcg;
pub use sigmoid::SigmoidTable;
pub use tokenizer::Tokenizer;
pub use train::{train, TrainedModel};
pub use unigram::UnigramTable;
pub use vocab::Vocab;
pub use writer::{write_vectors, Format as VectorFormat};

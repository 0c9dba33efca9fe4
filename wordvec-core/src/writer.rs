//! Writes trained embeddings to disk in the two formats the reference
//! implementation supports: a human-readable text table and a compact
//! binary layout, both sharing the same `<vocab_size> <dims>` header line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::AlignedMatrix;
use crate::vocab::Vocab;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Binary,
}

/// Writes one row per vocabulary entry, in vocabulary order, as
/// `<token> <components...>\n`. In [`Format::Binary`] the components are
/// four-byte little-endian floats; in [`Format::Text`] each component is
/// written with fixed six-decimal precision (matching `%lf`) followed by a
/// space, including after the last component.
pub fn write_vectors(path: impl AsRef<Path>, vocab: &Vocab, matrix: &AlignedMatrix, format: Format) -> Result<()> {
    assert_eq!(vocab.len(), matrix.rows(), "vocabulary/matrix row count mismatch");

    let mut out = BufWriter::new(
        File::create(path.as_ref()).with_context(|| format!("could not create {}", path.as_ref().display()))?,
    );
    writeln!(out, "{} {}", vocab.len(), matrix.cols())?;

    for id in 0..vocab.len() {
        out.write_all(vocab.token(id))?;
        out.write_all(b" ")?;
        let row = matrix.row(id);
        match format {
            Format::Text => {
                for &v in row {
                    write!(out, "{v:.6} ")?;
                }
                out.write_all(b"\n")?;
            }
            Format::Binary => {
                for &v in row {
                    out.write_all(&v.to_le_bytes())?;
                }
                out.write_all(b"\n")?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlignedMatrix;

    fn toy_vocab() -> Vocab {
        let mut vocab = Vocab::new(1000, 0, 100);
        for token in ["alpha", "beta"] {
            let id = vocab.add_or_lookup(token.as_bytes());
            vocab.incr(id);
        }
        vocab.sort_and_prune(0);
        vocab
    }

    #[test]
    fn text_output_has_correct_header_and_row_count() {
        let vocab = toy_vocab();
        let mut matrix = AlignedMatrix::zeroed(vocab.len(), 3);
        matrix.row_mut(1)[0] = 1.5;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        write_vectors(&path, &vocab, &matrix, Format::Text).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), format!("{} 3", vocab.len()));
        assert_eq!(lines.count(), vocab.len());
    }

    #[test]
    fn text_floats_use_fixed_precision_with_trailing_space() {
        let vocab = toy_vocab();
        let mut matrix = AlignedMatrix::zeroed(vocab.len(), 3);
        matrix.row_mut(1)[0] = 1.5;
        matrix.row_mut(1)[1] = -2.0;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        write_vectors(&path, &vocab, &matrix, Format::Text).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().find(|l| l.starts_with("alpha ")).unwrap();
        assert_eq!(row, "alpha 1.500000 -2.000000 0.000000 ");
    }

    #[test]
    fn binary_output_has_expected_byte_length() {
        let vocab = toy_vocab();
        let matrix = AlignedMatrix::zeroed(vocab.len(), 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        write_vectors(&path, &vocab, &matrix, Format::Binary).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header_len = format!("{} 4\n", vocab.len()).len();
        // each row: token bytes + ' ' + 4*4 float bytes + '\n'
        let expected_row_bytes: usize = (0..vocab.len())
            .map(|id| vocab.token(id).len() + 1 + 16 + 1)
            .sum();
        assert_eq!(bytes.len(), header_len + expected_row_bytes);
    }
}

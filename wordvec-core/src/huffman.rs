//! Huffman tree construction for hierarchical softmax.
//!
//! This is the reference implementation's exact linear-time two-pointer
//! construction (not a generic priority-queue merge): it requires `counts`
//! to already be sorted in non-increasing order, which is what
//! [`crate::vocab::Vocab::sort_and_prune`] guarantees. A priority queue
//! would produce an equally optimal but differently shaped tree, which
//! would silently change which context bit-paths exist — so the two-pointer
//! walk is load-bearing, not an incidental optimization.

use anyhow::{ensure, Result};

/// A leaf's Huffman path: `code[k]` is the bit taken at depth `k`, and
/// `point[k]` is the internal-node index visited *before* taking that bit
/// (so `point.len() == code.len()`; the immediate parent of the leaf itself
/// is never a step target and is therefore not stored).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub code: Vec<u8>,
    pub point: Vec<u32>,
}

/// Builds one Huffman code per entry in `counts`, which must already be
/// sorted non-increasing (ties broken arbitrarily, matching the vocabulary's
/// own sort). Internal nodes are numbered `vocab_size ..= 2*vocab_size - 2`
/// during construction and rebased to `0 ..= vocab_size - 2` in the
/// returned `point` arrays, exactly as the reference's final remapping
/// (`point[i - b] = point[b] - vocab_size`) does.
pub fn build(counts: &[u64]) -> Result<Vec<Code>> {
    let vocab_size = counts.len();
    ensure!(vocab_size >= 2, "Huffman tree needs at least two leaves");

    let node_count = vocab_size * 2 - 1;
    let mut count = vec![0u64; node_count];
    let mut binary = vec![0u8; node_count];
    let mut parent = vec![0usize; node_count];

    for (i, &c) in counts.iter().enumerate() {
        count[i] = c;
    }
    for slot in count.iter_mut().skip(vocab_size) {
        *slot = u64::MAX / 2;
    }

    let mut pos1 = vocab_size as isize - 1;
    let mut pos2 = vocab_size;

    for a in 0..vocab_size - 1 {
        let min1i = if pos1 >= 0 && count[pos1 as usize] < count[pos2] {
            let i = pos1 as usize;
            pos1 -= 1;
            i
        } else {
            let i = pos2;
            pos2 += 1;
            i
        };
        let min2i = if pos1 >= 0 && count[pos1 as usize] < count[pos2] {
            let i = pos1 as usize;
            pos1 -= 1;
            i
        } else {
            let i = pos2;
            pos2 += 1;
            i
        };

        count[vocab_size + a] = count[min1i] + count[min2i];
        parent[min1i] = vocab_size + a;
        parent[min2i] = vocab_size + a;
        binary[min2i] = 1;
    }

    const MAX_CODE_LEN: usize = 40;

    let root = vocab_size * 2 - 2;
    let mut codes = Vec::with_capacity(vocab_size);
    for leaf in 0..vocab_size {
        let mut code_bits = Vec::new();
        let mut points = Vec::new();
        let mut b = leaf;
        loop {
            code_bits.push(binary[b]);
            points.push(b);
            ensure!(
                code_bits.len() <= MAX_CODE_LEN,
                "Huffman code for leaf {leaf} exceeds {MAX_CODE_LEN} bits"
            );
            b = parent[b];
            if b == root {
                break;
            }
        }
        code_bits.reverse();
        // `points` is [leaf, parent(leaf), ..., node-just-below-root], leaf-to-root
        // order. `point[0]` is always the root; `point[d]` for d in 1..L-1 is the
        // rebased ancestor `L-d` steps up from the leaf. `points[0]` (the leaf
        // itself, always < vocab_size) is deliberately never read here — rebasing
        // it would underflow, and the training loop never indexes that deep.
        let len = points.len();
        let mut point = vec![0u32; len];
        point[0] = (vocab_size - 2) as u32;
        for d in 1..len {
            point[d] = (points[len - d] - vocab_size) as u32;
        }
        codes.push(Code {
            code: code_bits,
            point,
        });
    }
    Ok(codes)
}

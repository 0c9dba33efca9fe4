//! Cache-aligned embedding tensors and the Hogwild aliasing wrapper that
//! lets the worker pool mutate them without synchronization.
//!
//! `HogwildCell` is grounded on `ThreadDataRaceAware` (a bare `UnsafeCell`
//! behind a manufactured `Sync` impl) found in the wider embedding-training
//! example pack: concurrent, unsynchronized writes from different worker
//! threads are treated as benign gradient noise rather than undefined
//! behavior to prevent, which is the whole premise of Hogwild-style SGD.

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::slice;

use crate::rng::Lcg;

/// Wraps `T` for racy, cross-thread shared mutation.
///
/// # Safety contract
/// Readers and writers going through [`HogwildCell::get`] may observe
/// partially-updated values if another thread is mid-write. This is
/// intentional: hierarchical-softmax and negative-sampling updates are
/// small perturbations, and losing or mixing a few of them across threads
/// does not change the algorithm's convergence behavior in practice.
pub struct HogwildCell<T> {
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for HogwildCell<T> {}

impl<T> HogwildCell<T> {
    pub fn new(value: T) -> Self {
        HogwildCell {
            value: UnsafeCell::new(value),
        }
    }

    /// Raw pointer to the wrapped value. Callers dereference it themselves;
    /// see the struct-level safety contract.
    #[inline]
    pub fn get(&self) -> *mut T {
        self.value.get()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// A flat `rows x cols` `f32` matrix allocated on a 128-byte boundary, the
/// same alignment the reference implementation requests from
/// `posix_memalign` for its embedding tables.
pub struct AlignedMatrix {
    ptr: NonNull<f32>,
    rows: usize,
    cols: usize,
    layout: Layout,
}

const ALIGNMENT: usize = 128;

unsafe impl Send for AlignedMatrix {}

impl AlignedMatrix {
    fn layout_for(rows: usize, cols: usize) -> Layout {
        Layout::from_size_align(rows * cols * std::mem::size_of::<f32>(), ALIGNMENT)
            .expect("embedding matrix layout overflowed")
    }

    /// Allocates a zero-filled matrix, used for the hierarchical-softmax
    /// and negative-sampling output tensors.
    pub fn zeroed(rows: usize, cols: usize) -> Self {
        let layout = Self::layout_for(rows, cols);
        let ptr = unsafe { alloc::alloc_zeroed(layout) } as *mut f32;
        let ptr = NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        AlignedMatrix {
            ptr,
            rows,
            cols,
            layout,
        }
    }

    /// Allocates the input embedding tensor and fills it with the
    /// reference implementation's uniform initializer:
    /// `(draw_in_[0,1) - 0.5) / cols`, drawn in row-major order from a
    /// single LCG stream seeded with `seed`.
    pub fn uniform_init(rows: usize, cols: usize, seed: u64) -> Self {
        let mut matrix = Self::zeroed(rows, cols);
        let mut rng = Lcg::new(seed);
        let scale = 1.0 / cols as f32;
        for slot in matrix.as_mut_slice().iter_mut() {
            *slot = (rng.next_fraction() - 0.5) * scale;
        }
        matrix
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, id: usize) -> &[f32] {
        assert!(id < self.rows);
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(id * self.cols), self.cols) }
    }

    pub fn row_mut(&mut self, id: usize) -> &mut [f32] {
        assert!(id < self.rows);
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(id * self.cols), self.cols) }
    }

    /// Raw row pointer for Hogwild writers going through a [`HogwildCell`].
    ///
    /// # Safety
    /// The caller must not construct an aliasing `&mut` slice over a row
    /// another thread currently holds a raw pointer to and is writing
    /// through — besides that ordinary Hogwild aliasing, which is intended.
    pub unsafe fn row_ptr(&self, id: usize) -> *mut f32 {
        debug_assert!(id < self.rows);
        self.ptr.as_ptr().add(id * self.cols)
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.rows * self.cols) }
    }
}

impl Drop for AlignedMatrix {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_matrix_is_all_zero() {
        let m = AlignedMatrix::zeroed(4, 8);
        for r in 0..4 {
            assert!(m.row(r).iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn uniform_init_values_are_within_expected_range() {
        let cols = 50;
        let m = AlignedMatrix::uniform_init(10, cols, 1);
        let scale = 1.0 / cols as f32;
        for r in 0..10 {
            for &v in m.row(r) {
                assert!(v >= -0.5 * scale && v < 0.5 * scale);
            }
        }
    }

    #[test]
    fn same_seed_gives_same_initial_weights() {
        let a = AlignedMatrix::uniform_init(5, 16, 99);
        let b = AlignedMatrix::uniform_init(5, 16, 99);
        for r in 0..5 {
            assert_eq!(a.row(r), b.row(r));
        }
    }

    #[test]
    fn rows_are_independently_addressable() {
        let mut m = AlignedMatrix::zeroed(3, 4);
        m.row_mut(1)[2] = 7.0;
        assert_eq!(m.row(0), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(m.row(1), [0.0, 0.0, 7.0, 0.0]);
    }

    #[test]
    fn hogwild_cell_allows_shared_mutation_through_raw_pointer() {
        let cell = HogwildCell::new(AlignedMatrix::zeroed(2, 4));
        unsafe {
            let p = (*cell.get()).row_ptr(0);
            *p.add(1) = 3.5;
        }
        let inner = cell.into_inner();
        assert_eq!(inner.row(0)[1], 3.5);
    }
}

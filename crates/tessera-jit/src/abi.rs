//! Calling convention for buffer arguments.
//!
//! A `memref` parameter is passed as a pointer to a [`MemRefDescriptor`]:
//!
//! ```text
//! offset 0            data pointer
//! offset 8 + 8*d      size of dimension d
//! offset 8 + 8*(R+d)  stride of dimension d, in elements
//! ```

use std::marker::PhantomData;

/// Descriptor of a rank-`R` buffer of `T`, laid out as compiled code
/// expects it.
#[repr(C)]
#[derive(Debug)]
pub struct MemRefDescriptor<'a, T, const R: usize> {
    pub data: *mut T,
    pub sizes: [i64; R],
    pub strides: [i64; R],
    _borrow: PhantomData<&'a mut [T]>,
}

impl<'a, T, const R: usize> MemRefDescriptor<'a, T, R> {
    /// Row-major descriptor over `data`.
    ///
    /// Returns `None` if the product of `sizes` is not `data.len()` or a
    /// size is negative.
    pub fn row_major(data: &'a mut [T], sizes: [i64; R]) -> Option<Self> {
        let mut strides = [0i64; R];
        let mut stride = 1i64;
        for d in (0..R).rev() {
            if sizes[d] < 0 {
                return None;
            }
            strides[d] = stride;
            stride = stride.checked_mul(sizes[d])?;
        }
        if usize::try_from(stride).ok()? != data.len() {
            return None;
        }
        Some(Self {
            data: data.as_mut_ptr(),
            sizes,
            strides,
            _borrow: PhantomData,
        })
    }

    /// Pointer to pass as the argument.
    pub fn as_arg(&mut self) -> *mut Self {
        self
    }
}

pub(crate) const DATA_OFFSET: i32 = 0;
pub(crate) const WORD: i32 = 8;

pub(crate) fn size_offset(dim: usize) -> i32 {
    WORD + WORD * dim as i32
}

pub(crate) fn stride_offset(rank: usize, dim: usize) -> i32 {
    WORD + WORD * (rank + dim) as i32
}

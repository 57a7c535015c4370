//! # Numeric Vector Kernel
//!
//! Elementwise vector operations and gate convolution kernels shared by the
//! node updaters.
//!
//! All functions work on plain `f64` slices laid out row-major (see
//! [`index`]) and never allocate. Callers hand in scratch memory.
//!
//! ## Floor Policy
//!
//! - [`apply_log10`] floors its input to [`MIN_PROBA`] so the log domain
//!   never contains `-inf`.
//! - [`normalize`] floors every entry to [`MIN_PROBA`] before summing, which
//!   also absorbs the small negative noise left by the inverse transform in
//!   [`xor_exchange`]. NaN or infinite input is reported, not masked.

use crate::primitives::{MIN_PROBA, ROTATE_WORD_BITS};

/// Marker error: a vector contained NaN or infinite values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonFiniteValue;

/// Flat index of `(row, col)` in a row-major buffer with rows of length `n`.
#[inline]
#[must_use]
pub const fn index(row: usize, col: usize, n: usize) -> usize {
    row * n + col
}

// =============================================================================
// DOMAIN CONVERSION
// =============================================================================

/// `dst[i] = log10(max(src[i], MIN_PROBA))`.
pub fn apply_log10(dst: &mut [f64], src: &[f64]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s.max(MIN_PROBA).log10();
    }
}

/// `dst[i] = 10^src[i]`.
pub fn apply_pow10(dst: &mut [f64], src: &[f64]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = 10f64.powf(s);
    }
}

/// In-place variant of [`apply_pow10`].
pub fn apply_pow10_in_place(v: &mut [f64]) {
    for x in v.iter_mut() {
        *x = 10f64.powf(*x);
    }
}

// =============================================================================
// ELEMENTWISE ARITHMETIC
// =============================================================================

/// `dst += src`.
pub fn add_assign(dst: &mut [f64], src: &[f64]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

/// `dst = a - b`.
pub fn sub_into(dst: &mut [f64], a: &[f64], b: &[f64]) {
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d = x - y;
    }
}

/// `dst *= src`.
pub fn mul_assign(dst: &mut [f64], src: &[f64]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d *= s;
    }
}

/// `v += c` for every entry.
pub fn add_constant(v: &mut [f64], c: f64) {
    for x in v.iter_mut() {
        *x += c;
    }
}

/// Largest entry of `v`, or `-inf` for an empty slice.
#[must_use]
pub fn max(v: &[f64]) -> f64 {
    v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Returns `true` if every entry is finite.
#[must_use]
pub fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Scale `v` in place so its entries sum to `target`.
///
/// Entries below [`MIN_PROBA`] (including negative rounding noise) are raised
/// to the floor first, so the sum is strictly positive.
pub fn normalize(v: &mut [f64], target: f64) -> Result<(), NonFiniteValue> {
    let mut sum = 0.0;
    for x in v.iter_mut() {
        if !x.is_finite() {
            return Err(NonFiniteValue);
        }
        if *x < MIN_PROBA {
            *x = MIN_PROBA;
        }
        sum += *x;
    }
    if !sum.is_finite() {
        return Err(NonFiniteValue);
    }
    let scale = target / sum;
    for x in v.iter_mut() {
        *x *= scale;
    }
    Ok(())
}

/// Replicate `buf[..period]` across the whole of `buf`.
///
/// `buf.len()` must be a multiple of `period`. A period equal to the length
/// leaves the buffer untouched.
pub fn tile(buf: &mut [f64], period: usize) {
    if period == 0 || period >= buf.len() {
        return;
    }
    let (head, rest) = buf.split_at_mut(period);
    for chunk in rest.chunks_mut(period) {
        chunk.copy_from_slice(&head[..chunk.len()]);
    }
}

// =============================================================================
// XOR KERNEL (Walsh-Hadamard)
// =============================================================================

/// Walsh-Hadamard transform in place (non-normalized).
///
/// `a.len()` must be a power of two. Applying it twice scales by `a.len()`.
pub fn fwht(a: &mut [f64]) {
    let len = a.len();
    let mut h = 1;
    while h < len {
        for block in (0..len).step_by(2 * h) {
            for j in block..block + h {
                let x = a[j];
                let y = a[j + h];
                a[j] = x + y;
                a[j + h] = x - y;
            }
        }
        h *= 2;
    }
}

/// Pointwise product of two transforms, inverse-transformed into `dst`.
fn inverse_product(dst: &mut [f64], ta: &[f64], tb: &[f64]) {
    for ((d, &x), &y) in dst.iter_mut().zip(ta).zip(tb) {
        *d = x * y;
    }
    fwht(dst);
    let scale = 1.0 / dst.len() as f64;
    for d in dst.iter_mut() {
        *d *= scale;
    }
}

/// All three sum-product messages of an XOR gate from one set of transforms.
///
/// - `to_out = in0 (*) in1`
/// - `to_in0 = in1 (*) out`
/// - `to_in1 = in0 (*) out`
///
/// where `(*)` is XOR convolution. The period is `to_out.len()`; operands
/// are read over their first `period` entries. `work` must hold at least
/// `3 * period` entries.
pub fn xor_exchange(
    in0: &[f64],
    in1: &[f64],
    out: &[f64],
    to_out: &mut [f64],
    to_in0: &mut [f64],
    to_in1: &mut [f64],
    work: &mut [f64],
) {
    let n = to_out.len();
    let (t0, rest) = work.split_at_mut(n);
    let (t1, rest) = rest.split_at_mut(n);
    let to = &mut rest[..n];

    t0.copy_from_slice(&in0[..n]);
    t1.copy_from_slice(&in1[..n]);
    to.copy_from_slice(&out[..n]);
    fwht(t0);
    fwht(t1);
    fwht(to);

    inverse_product(to_out, t0, t1);
    inverse_product(to_in0, t1, to);
    inverse_product(to_in1, t0, to);
}

// =============================================================================
// AND KERNEL (direct)
// =============================================================================

/// All three sum-product messages of an AND gate by direct convolution.
///
/// - `to_out[v] = sum over x & y == v of in0[x] * in1[y]`
/// - `to_in0[x] = sum over y of in1[y] * out[x & y]`
/// - `to_in1[y] = sum over x of in0[x] * out[x & y]`
///
/// Cost is quadratic in the domain size.
pub fn and_exchange(
    in0: &[f64],
    in1: &[f64],
    out: &[f64],
    to_out: &mut [f64],
    to_in0: &mut [f64],
    to_in1: &mut [f64],
) {
    let n = to_out.len();
    to_out.fill(0.0);
    to_in0.fill(0.0);
    to_in1.fill(0.0);
    for x in 0..n {
        let px = in0[x];
        for y in 0..n {
            let o = x & y;
            to_out[o] += px * in1[y];
            to_in0[x] += in1[y] * out[o];
            to_in1[y] += px * out[o];
        }
    }
}

// =============================================================================
// ROTATION
// =============================================================================

/// Rotate the low `bits` bits of `value` left by `amount`.
#[must_use]
pub fn rotate_left(value: u32, amount: u32, bits: u32) -> u32 {
    let mask = ((1u64 << bits) - 1) as u32;
    let value = value & mask;
    let amount = amount % bits;
    if amount == 0 {
        return value;
    }
    ((value << amount) | (value >> (bits - amount))) & mask
}

/// 16-bit left rotation.
#[must_use]
pub fn rotl16(value: u32, amount: u32) -> u32 {
    rotate_left(value, amount, ROTATE_WORD_BITS)
}

// =============================================================================
// TESTS
// =============================================================================

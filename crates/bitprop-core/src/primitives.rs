//! # Numeric Primitives
//!
//! Hardcoded runtime constants for the propagation core.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! They fix the numeric floor policy shared by the log and linear domains,
//! the accepted domain widths, and the snapshot header.

/// The minimum probability any distribution entry may hold.
///
/// - Entries are floored to `MIN_PROBA` before a log10 conversion, so the
///   log domain never holds `-inf`.
/// - L1 normalization floors every entry to `MIN_PROBA` before summing, so
///   the sum is always strictly positive and a zero-sum vector cannot occur.
pub const MIN_PROBA: f64 = 1e-20;

/// Tolerance used when checking that a distribution sums to 1.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Largest supported domain width in bits.
///
/// Values are addressed as `u32` words masked to the domain width; the
/// rotate gate works on 16-bit words, so wider domains are rejected.
pub const MAX_DOMAIN_BITS: u32 = 16;

/// Word width of the rotate kernel.
pub const ROTATE_WORD_BITS: u32 = 16;

/// Maximum number of inputs a function node may carry.
pub const MAX_FUNCTION_INPUTS: usize = 2;

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Magic bytes for the bitprop snapshot header.
///
/// - File Header = Magic Bytes ("BPRP") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"BPRP";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

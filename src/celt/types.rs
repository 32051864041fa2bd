//! Scalar aliases shared by the CELT band layer.
//!
//! The names follow the reference C typedefs so that formulas read the same
//! on both sides. Only the float build is provided, where every signal-domain
//! type is an `f32`.

/// Corresponds to `opus_int16` in the C implementation.
pub type OpusInt16 = i16;
/// Corresponds to `opus_int32` in the C implementation.
pub type OpusInt32 = i32;
/// Corresponds to `opus_uint32` in the C implementation.
pub type OpusUint32 = u32;
/// Floating-point representation used for `opus_val16` in CELT's float build.
pub type OpusVal16 = f32;
/// Floating-point representation used for `opus_val32` in CELT's float build.
pub type OpusVal32 = f32;
/// Internal CELT signal precision (MDCT coefficients).
pub type CeltSig = OpusVal32;
/// Unit-norm band shape coefficients.
pub type CeltNorm = OpusVal16;
/// Linear band amplitude.
pub type CeltEner = OpusVal32;
/// Base-2 logarithmic band energy.
pub type CeltGlog = OpusVal32;

/// Unity in the normalised domain.
pub const Q15_ONE: OpusVal16 = 1.0;
/// Smallest energy added before taking reciprocal square roots.
pub const EPSILON: OpusVal32 = 1e-15;
/// Scale applied to normalised noise samples; unity in the float build.
pub const NORM_SCALING: OpusVal16 = 1.0;

//! Vectorized sample kernels behind a runtime dispatch table.
//!
//! ## Dispatch
//!
//! ```text
//!            detect_simd_level()  (once, cached)
//!                     │
//!     ┌───────────────┼───────────────┬───────────────┐
//!     ▼               ▼               ▼               ▼
//!   AVX2+FMA        SSE2            NEON           Scalar
//!   8 lanes         4 lanes         4 lanes        1 lane
//! ```
//!
//! Every variant finishes a non-multiple-of-lane-width span with a scalar
//! tail, and all variants agree with the scalar table within float
//! tolerance. Hot loops never branch on the level: callers go through
//! [`kernels`], which resolves to one `&'static Kernels` for the process.

pub mod scalar;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86;

use std::sync::OnceLock;

use serde::Serialize;
use tracing::debug;

/// Length of the click-suppression ramp used by [`clear_buffer`].
pub const CLEAR_FADE_SAMPLES: usize = 64;

/// CPU vector extension selected for the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdLevel {
    /// No usable vector unit.
    Scalar,
    /// 128-bit SSE2, 4 `f32` lanes.
    Sse2,
    /// 256-bit AVX2 with FMA, 8 `f32` lanes.
    Avx2,
    /// 128-bit NEON, 4 `f32` lanes.
    Neon,
}

impl SimdLevel {
    /// Human-readable name for logging.
    pub fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar (no SIMD)",
            SimdLevel::Sse2 => "SSE2 (128-bit)",
            SimdLevel::Avx2 => "AVX2+FMA (256-bit)",
            SimdLevel::Neon => "NEON (128-bit)",
        }
    }

    /// Number of `f32` samples processed per vector instruction.
    pub fn lane_width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse2 | SimdLevel::Neon => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    /// Whether the running CPU can execute this level.
    pub fn is_supported(self) -> bool {
        match self {
            SimdLevel::Scalar => true,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            SimdLevel::Sse2 => is_x86_feature_detected!("sse2"),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            SimdLevel::Avx2 => {
                is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
            }
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// All levels, widest first.
    pub const ALL: [SimdLevel; 4] = [
        SimdLevel::Avx2,
        SimdLevel::Sse2,
        SimdLevel::Neon,
        SimdLevel::Scalar,
    ];
}

/// One precompiled set of kernels for a single [`SimdLevel`].
///
/// Spans of unequal length are processed up to the shorter one.
pub struct Kernels {
    pub level: SimdLevel,
    pub rms: fn(&[f32]) -> f32,
    pub peak: fn(&[f32]) -> f32,
    pub mix: fn(&mut [f32], &[f32], f32),
    pub copy: fn(&mut [f32], &[f32]),
    pub gain_ramp: fn(&mut [f32], f32, f32),
    pub scale: fn(&mut [f32], f32),
    pub interleave: fn(&mut [f32], &[f32], &[f32]),
    pub deinterleave: fn(&mut [f32], &mut [f32], &[f32]),
}

impl std::fmt::Debug for Kernels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels").field("level", &self.level).finish()
    }
}

static ACTIVE: OnceLock<&'static Kernels> = OnceLock::new();

/// Detect the widest supported vector extension.
pub fn detect_simd_level() -> SimdLevel {
    SimdLevel::ALL
        .into_iter()
        .find(|level| level.is_supported())
        .unwrap_or(SimdLevel::Scalar)
}

/// The kernel table for `level`, or `None` if this CPU cannot run it.
pub fn kernels_for(level: SimdLevel) -> Option<&'static Kernels> {
    if !level.is_supported() {
        return None;
    }
    match level {
        SimdLevel::Scalar => Some(&scalar::KERNELS),
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        SimdLevel::Sse2 => Some(&x86::SSE2),
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        SimdLevel::Avx2 => Some(&x86::AVX2),
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => Some(&neon::NEON),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// The process-wide kernel table, selected on first use.
///
/// Call once at startup to pay for detection outside the audio callback.
pub fn kernels() -> &'static Kernels {
    ACTIVE.get_or_init(|| {
        let level = detect_simd_level();
        debug!(level = level.name(), lanes = level.lane_width(), "simd kernels selected");
        kernels_for(level).unwrap_or(&scalar::KERNELS)
    })
}

/// Active level (forces detection if it has not happened yet).
pub fn active_level() -> SimdLevel {
    kernels().level
}

/// `sqrt(sum(x²) / n)`; `0.0` for an empty buffer.
#[inline]
pub fn calculate_rms(buffer: &[f32]) -> f32 {
    (kernels().rms)(buffer)
}

/// `max(|x|)`; `0.0` for an empty buffer.
#[inline]
pub fn calculate_peak(buffer: &[f32]) -> f32 {
    (kernels().peak)(buffer)
}

/// Accumulates `dest[i] += src[i] * gain`.
#[inline]
pub fn mix_buffers(dest: &mut [f32], src: &[f32], gain: f32) {
    (kernels().mix)(dest, src, gain)
}

/// Bulk copy of `min(dest.len(), src.len())` samples.
#[inline]
pub fn copy_buffer(dest: &mut [f32], src: &[f32]) {
    (kernels().copy)(dest, src)
}

/// Multiplies by a linear ramp from `start_gain` to `end_gain` inclusive.
///
/// A buffer of one sample gets `start_gain` only.
#[inline]
pub fn apply_gain_with_fade(buffer: &mut [f32], start_gain: f32, end_gain: f32) {
    (kernels().gain_ramp)(buffer, start_gain, end_gain)
}

/// Multiplies every sample by `gain`.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], gain: f32) {
    (kernels().scale)(buffer, gain)
}

/// Writes `left`/`right` into `dest` as `[l0, r0, l1, r1, ...]`.
#[inline]
pub fn interleave_stereo(dest: &mut [f32], left: &[f32], right: &[f32]) {
    (kernels().interleave)(dest, left, right)
}

/// Splits `[l0, r0, l1, r1, ...]` from `src` into `left` and `right`.
#[inline]
pub fn deinterleave_stereo(left: &mut [f32], right: &mut [f32], src: &[f32]) {
    (kernels().deinterleave)(left, right, src)
}

/// Zeroes `buffer`. With `fade_out`, buffers longer than
/// [`CLEAR_FADE_SAMPLES`] first get a 1→0 ramp over their last 64 samples.
pub fn clear_buffer(buffer: &mut [f32], fade_out: bool) {
    let len = buffer.len();
    if fade_out && len > CLEAR_FADE_SAMPLES {
        apply_gain_with_fade(&mut buffer[len - CLEAR_FADE_SAMPLES..], 1.0, 0.0);
    }
    buffer.fill(0.0);
}

/// Per-sample increment of a linear ramp over `len` samples.
#[inline]
pub(crate) fn ramp_step(len: usize, start_gain: f32, end_gain: f32) -> f32 {
    if len > 1 {
        (end_gain - start_gain) / (len - 1) as f32
    } else {
        0.0
    }
}

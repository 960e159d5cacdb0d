//! SSE2 (4 lanes) and AVX2+FMA (8 lanes) kernels for x86 / x86_64.
//!
//! Each `unsafe fn` here requires the named target features. The safe entry
//! points at the bottom are only reachable through the tables, and the tables
//! are only handed out by [`super::kernels_for`] after runtime detection.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{ramp_step, scalar, Kernels, SimdLevel};

pub(super) static SSE2: Kernels = Kernels {
    level: SimdLevel::Sse2,
    rms: rms_sse2_entry,
    peak: peak_sse2_entry,
    mix: mix_sse2_entry,
    copy: copy_sse2_entry,
    gain_ramp: gain_ramp_sse2_entry,
    scale: scale_sse2_entry,
    interleave: interleave_sse2_entry,
    deinterleave: deinterleave_sse2_entry,
};

// Stereo shuffles gain nothing from 256-bit lanes, so AVX2 reuses SSE2 there.
pub(super) static AVX2: Kernels = Kernels {
    level: SimdLevel::Avx2,
    rms: rms_avx2_entry,
    peak: peak_avx2_entry,
    mix: mix_avx2_entry,
    copy: copy_avx2_entry,
    gain_ramp: gain_ramp_avx2_entry,
    scale: scale_avx2_entry,
    interleave: interleave_sse2_entry,
    deinterleave: deinterleave_sse2_entry,
};

// ── SSE2 ─────────────────────────────────────────────────────────────────────

// Value-only intrinsics are safe here on newer compilers.
#[allow(unused_unsafe)]
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn hsum128(v: __m128) -> f32 {
    unsafe {
        let shuf = _mm_shuffle_ps(v, v, 0b10_11_00_01);
        let sums = _mm_add_ps(v, shuf);
        let shuf = _mm_movehl_ps(shuf, sums);
        _mm_cvtss_f32(_mm_add_ss(sums, shuf))
    }
}

// Value-only intrinsics are safe here on newer compilers.
#[allow(unused_unsafe)]
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn hmax128(v: __m128) -> f32 {
    unsafe {
        let v = _mm_max_ps(v, _mm_shuffle_ps(v, v, 0b10_11_00_01));
        let v = _mm_max_ps(v, _mm_shuffle_ps(v, v, 0b01_00_11_10));
        _mm_cvtss_f32(v)
    }
}

#[target_feature(enable = "sse2")]
unsafe fn rms_sse2(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    if len == 0 {
        return 0.0;
    }
    let simd_len = len & !3;
    let ptr = buffer.as_ptr();
    let mut sum = unsafe {
        let mut acc = _mm_setzero_ps();
        let mut i = 0;
        while i < simd_len {
            let v = _mm_loadu_ps(ptr.add(i));
            acc = _mm_add_ps(acc, _mm_mul_ps(v, v));
            i += 4;
        }
        hsum128(acc)
    };
    for s in &buffer[simd_len..] {
        sum += s * s;
    }
    (sum / len as f32).sqrt()
}

#[target_feature(enable = "sse2")]
unsafe fn peak_sse2(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    let simd_len = len & !3;
    let ptr = buffer.as_ptr();
    let mut max = unsafe {
        let sign = _mm_set1_ps(-0.0);
        let mut acc = _mm_setzero_ps();
        let mut i = 0;
        while i < simd_len {
            let v = _mm_andnot_ps(sign, _mm_loadu_ps(ptr.add(i)));
            acc = _mm_max_ps(acc, v);
            i += 4;
        }
        hmax128(acc)
    };
    for s in &buffer[simd_len..] {
        max = max.max(s.abs());
    }
    max
}

#[target_feature(enable = "sse2")]
unsafe fn mix_sse2(dest: &mut [f32], src: &[f32], gain: f32) {
    let len = dest.len().min(src.len());
    let simd_len = len & !3;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    unsafe {
        let g = _mm_set1_ps(gain);
        let mut i = 0;
        while i < simd_len {
            let acc = _mm_add_ps(_mm_loadu_ps(d.add(i)), _mm_mul_ps(_mm_loadu_ps(s.add(i)), g));
            _mm_storeu_ps(d.add(i), acc);
            i += 4;
        }
    }
    scalar::mix(&mut dest[simd_len..len], &src[simd_len..len], gain);
}

#[target_feature(enable = "sse2")]
unsafe fn copy_sse2(dest: &mut [f32], src: &[f32]) {
    let len = dest.len().min(src.len());
    let simd_len = len & !3;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    unsafe {
        let mut i = 0;
        while i < simd_len {
            _mm_storeu_ps(d.add(i), _mm_loadu_ps(s.add(i)));
            i += 4;
        }
    }
    dest[simd_len..len].copy_from_slice(&src[simd_len..len]);
}

#[target_feature(enable = "sse2")]
unsafe fn gain_ramp_sse2(buffer: &mut [f32], start_gain: f32, end_gain: f32) {
    let len = buffer.len();
    let step = ramp_step(len, start_gain, end_gain);
    let simd_len = len & !3;
    let p = buffer.as_mut_ptr();
    unsafe {
        let start = _mm_set1_ps(start_gain);
        let steps = _mm_set1_ps(step);
        let lane = _mm_setr_ps(0.0, 1.0, 2.0, 3.0);
        let mut i = 0;
        while i < simd_len {
            let idx = _mm_add_ps(_mm_set1_ps(i as f32), lane);
            let gain = _mm_add_ps(start, _mm_mul_ps(steps, idx));
            _mm_storeu_ps(p.add(i), _mm_mul_ps(_mm_loadu_ps(p.add(i)), gain));
            i += 4;
        }
    }
    for (i, s) in buffer.iter_mut().enumerate().skip(simd_len) {
        *s *= start_gain + step * i as f32;
    }
}

#[target_feature(enable = "sse2")]
unsafe fn scale_sse2(buffer: &mut [f32], gain: f32) {
    let len = buffer.len();
    let simd_len = len & !3;
    let p = buffer.as_mut_ptr();
    unsafe {
        let g = _mm_set1_ps(gain);
        let mut i = 0;
        while i < simd_len {
            _mm_storeu_ps(p.add(i), _mm_mul_ps(_mm_loadu_ps(p.add(i)), g));
            i += 4;
        }
    }
    scalar::scale(&mut buffer[simd_len..], gain);
}

#[target_feature(enable = "sse2")]
unsafe fn interleave_sse2(dest: &mut [f32], left: &[f32], right: &[f32]) {
    let frames = left.len().min(right.len()).min(dest.len() / 2);
    let simd_frames = frames & !3;
    let d = dest.as_mut_ptr();
    let (l, r) = (left.as_ptr(), right.as_ptr());
    unsafe {
        let mut i = 0;
        while i < simd_frames {
            let lv = _mm_loadu_ps(l.add(i));
            let rv = _mm_loadu_ps(r.add(i));
            _mm_storeu_ps(d.add(i * 2), _mm_unpacklo_ps(lv, rv));
            _mm_storeu_ps(d.add(i * 2 + 4), _mm_unpackhi_ps(lv, rv));
            i += 4;
        }
    }
    scalar::interleave(
        &mut dest[simd_frames * 2..frames * 2],
        &left[simd_frames..frames],
        &right[simd_frames..frames],
    );
}

#[target_feature(enable = "sse2")]
unsafe fn deinterleave_sse2(left: &mut [f32], right: &mut [f32], src: &[f32]) {
    let frames = left.len().min(right.len()).min(src.len() / 2);
    let simd_frames = frames & !3;
    let s = src.as_ptr();
    let (l, r) = (left.as_mut_ptr(), right.as_mut_ptr());
    unsafe {
        let mut i = 0;
        while i < simd_frames {
            let a = _mm_loadu_ps(s.add(i * 2));
            let b = _mm_loadu_ps(s.add(i * 2 + 4));
            _mm_storeu_ps(l.add(i), _mm_shuffle_ps(a, b, 0b10_00_10_00));
            _mm_storeu_ps(r.add(i), _mm_shuffle_ps(a, b, 0b11_01_11_01));
            i += 4;
        }
    }
    scalar::deinterleave(
        &mut left[simd_frames..frames],
        &mut right[simd_frames..frames],
        &src[simd_frames * 2..frames * 2],
    );
}

// ── AVX2 + FMA ───────────────────────────────────────────────────────────────

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum256(v: __m256) -> f32 {
    unsafe {
        let lo = _mm256_castps256_ps128(v);
        let hi = _mm256_extractf128_ps(v, 1);
        hsum128(_mm_add_ps(lo, hi))
    }
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hmax256(v: __m256) -> f32 {
    unsafe {
        let lo = _mm256_castps256_ps128(v);
        let hi = _mm256_extractf128_ps(v, 1);
        hmax128(_mm_max_ps(lo, hi))
    }
}

#[target_feature(enable = "avx2,fma")]
unsafe fn rms_avx2(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    if len == 0 {
        return 0.0;
    }
    let simd_len = len & !7;
    let ptr = buffer.as_ptr();
    let mut sum = unsafe {
        let mut acc = _mm256_setzero_ps();
        let mut i = 0;
        while i < simd_len {
            let v = _mm256_loadu_ps(ptr.add(i));
            acc = _mm256_fmadd_ps(v, v, acc);
            i += 8;
        }
        hsum256(acc)
    };
    for s in &buffer[simd_len..] {
        sum += s * s;
    }
    (sum / len as f32).sqrt()
}

#[target_feature(enable = "avx2")]
unsafe fn peak_avx2(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    let simd_len = len & !7;
    let ptr = buffer.as_ptr();
    let mut max = unsafe {
        let sign = _mm256_set1_ps(-0.0);
        let mut acc = _mm256_setzero_ps();
        let mut i = 0;
        while i < simd_len {
            let v = _mm256_andnot_ps(sign, _mm256_loadu_ps(ptr.add(i)));
            acc = _mm256_max_ps(acc, v);
            i += 8;
        }
        hmax256(acc)
    };
    for s in &buffer[simd_len..] {
        max = max.max(s.abs());
    }
    max
}

#[target_feature(enable = "avx2")]
unsafe fn mix_avx2(dest: &mut [f32], src: &[f32], gain: f32) {
    let len = dest.len().min(src.len());
    let simd_len = len & !7;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    unsafe {
        let g = _mm256_set1_ps(gain);
        let mut i = 0;
        while i < simd_len {
            let scaled = _mm256_mul_ps(_mm256_loadu_ps(s.add(i)), g);
            _mm256_storeu_ps(d.add(i), _mm256_add_ps(_mm256_loadu_ps(d.add(i)), scaled));
            i += 8;
        }
    }
    scalar::mix(&mut dest[simd_len..len], &src[simd_len..len], gain);
}

#[target_feature(enable = "avx2")]
unsafe fn copy_avx2(dest: &mut [f32], src: &[f32]) {
    let len = dest.len().min(src.len());
    let simd_len = len & !7;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    unsafe {
        let mut i = 0;
        while i < simd_len {
            _mm256_storeu_ps(d.add(i), _mm256_loadu_ps(s.add(i)));
            i += 8;
        }
    }
    dest[simd_len..len].copy_from_slice(&src[simd_len..len]);
}

#[target_feature(enable = "avx2")]
unsafe fn gain_ramp_avx2(buffer: &mut [f32], start_gain: f32, end_gain: f32) {
    let len = buffer.len();
    let step = ramp_step(len, start_gain, end_gain);
    let simd_len = len & !7;
    let p = buffer.as_mut_ptr();
    unsafe {
        let start = _mm256_set1_ps(start_gain);
        let steps = _mm256_set1_ps(step);
        let lane = _mm256_setr_ps(0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0);
        let mut i = 0;
        while i < simd_len {
            let idx = _mm256_add_ps(_mm256_set1_ps(i as f32), lane);
            let gain = _mm256_add_ps(start, _mm256_mul_ps(steps, idx));
            _mm256_storeu_ps(p.add(i), _mm256_mul_ps(_mm256_loadu_ps(p.add(i)), gain));
            i += 8;
        }
    }
    for (i, s) in buffer.iter_mut().enumerate().skip(simd_len) {
        *s *= start_gain + step * i as f32;
    }
}

#[target_feature(enable = "avx2")]
unsafe fn scale_avx2(buffer: &mut [f32], gain: f32) {
    let len = buffer.len();
    let simd_len = len & !7;
    let p = buffer.as_mut_ptr();
    unsafe {
        let g = _mm256_set1_ps(gain);
        let mut i = 0;
        while i < simd_len {
            _mm256_storeu_ps(p.add(i), _mm256_mul_ps(_mm256_loadu_ps(p.add(i)), g));
            i += 8;
        }
    }
    scalar::scale(&mut buffer[simd_len..], gain);
}

// ── Safe table entries ───────────────────────────────────────────────────────

macro_rules! table_entry {
    ($entry:ident => $target:ident ( $($arg:ident : $ty:ty),* ) $(-> $ret:ty)?) => {
        fn $entry($($arg: $ty),*) $(-> $ret)? {
            // SAFETY: the owning table is only returned after its CPU features were detected.
            unsafe { $target($($arg),*) }
        }
    };
}

table_entry!(rms_sse2_entry => rms_sse2(buffer: &[f32]) -> f32);
table_entry!(peak_sse2_entry => peak_sse2(buffer: &[f32]) -> f32);
table_entry!(mix_sse2_entry => mix_sse2(dest: &mut [f32], src: &[f32], gain: f32));
table_entry!(copy_sse2_entry => copy_sse2(dest: &mut [f32], src: &[f32]));
table_entry!(gain_ramp_sse2_entry => gain_ramp_sse2(buffer: &mut [f32], start: f32, end: f32));
table_entry!(scale_sse2_entry => scale_sse2(buffer: &mut [f32], gain: f32));
table_entry!(interleave_sse2_entry => interleave_sse2(dest: &mut [f32], left: &[f32], right: &[f32]));
table_entry!(deinterleave_sse2_entry => deinterleave_sse2(left: &mut [f32], right: &mut [f32], src: &[f32]));

table_entry!(rms_avx2_entry => rms_avx2(buffer: &[f32]) -> f32);
table_entry!(peak_avx2_entry => peak_avx2(buffer: &[f32]) -> f32);
table_entry!(mix_avx2_entry => mix_avx2(dest: &mut [f32], src: &[f32], gain: f32));
table_entry!(copy_avx2_entry => copy_avx2(dest: &mut [f32], src: &[f32]));
table_entry!(gain_ramp_avx2_entry => gain_ramp_avx2(buffer: &mut [f32], start: f32, end: f32));
table_entry!(scale_avx2_entry => scale_avx2(buffer: &mut [f32], gain: f32));

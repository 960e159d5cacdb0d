//! NEON kernels (4 lanes) for aarch64, where NEON is part of the baseline ISA.

use std::arch::aarch64::*;

use super::{ramp_step, scalar, Kernels, SimdLevel};

pub(super) static NEON: Kernels = Kernels {
    level: SimdLevel::Neon,
    rms,
    peak,
    mix,
    copy,
    gain_ramp,
    scale,
    interleave,
    deinterleave,
};

fn rms(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    if len == 0 {
        return 0.0;
    }
    let simd_len = len & !3;
    let ptr = buffer.as_ptr();
    // SAFETY: every load stays below `simd_len <= len`.
    let mut sum = unsafe {
        let mut acc = vdupq_n_f32(0.0);
        let mut i = 0;
        while i < simd_len {
            let v = vld1q_f32(ptr.add(i));
            acc = vfmaq_f32(acc, v, v);
            i += 4;
        }
        vaddvq_f32(acc)
    };
    for s in &buffer[simd_len..] {
        sum += s * s;
    }
    (sum / len as f32).sqrt()
}

fn peak(buffer: &[f32]) -> f32 {
    let len = buffer.len();
    let simd_len = len & !3;
    let ptr = buffer.as_ptr();
    // SAFETY: every load stays below `simd_len <= len`.
    let mut max = unsafe {
        let mut acc = vdupq_n_f32(0.0);
        let mut i = 0;
        while i < simd_len {
            acc = vmaxq_f32(acc, vabsq_f32(vld1q_f32(ptr.add(i))));
            i += 4;
        }
        vmaxvq_f32(acc)
    };
    for s in &buffer[simd_len..] {
        max = max.max(s.abs());
    }
    max
}

fn mix(dest: &mut [f32], src: &[f32], gain: f32) {
    let len = dest.len().min(src.len());
    let simd_len = len & !3;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    // SAFETY: both spans hold at least `len` elements.
    unsafe {
        let g = vdupq_n_f32(gain);
        let mut i = 0;
        while i < simd_len {
            let scaled = vmulq_f32(vld1q_f32(s.add(i)), g);
            vst1q_f32(d.add(i), vaddq_f32(vld1q_f32(d.add(i)), scaled));
            i += 4;
        }
    }
    scalar::mix(&mut dest[simd_len..len], &src[simd_len..len], gain);
}

fn copy(dest: &mut [f32], src: &[f32]) {
    let len = dest.len().min(src.len());
    let simd_len = len & !3;
    let d = dest.as_mut_ptr();
    let s = src.as_ptr();
    // SAFETY: both spans hold at least `len` elements.
    unsafe {
        let mut i = 0;
        while i < simd_len {
            vst1q_f32(d.add(i), vld1q_f32(s.add(i)));
            i += 4;
        }
    }
    dest[simd_len..len].copy_from_slice(&src[simd_len..len]);
}

fn gain_ramp(buffer: &mut [f32], start_gain: f32, end_gain: f32) {
    let len = buffer.len();
    let step = ramp_step(len, start_gain, end_gain);
    let simd_len = len & !3;
    let p = buffer.as_mut_ptr();
    let lane_offsets = [0.0f32, 1.0, 2.0, 3.0];
    // SAFETY: every access stays below `simd_len <= len`.
    unsafe {
        let start = vdupq_n_f32(start_gain);
        let steps = vdupq_n_f32(step);
        let lane = vld1q_f32(lane_offsets.as_ptr());
        let mut i = 0;
        while i < simd_len {
            let idx = vaddq_f32(vdupq_n_f32(i as f32), lane);
            let gain = vaddq_f32(start, vmulq_f32(steps, idx));
            vst1q_f32(p.add(i), vmulq_f32(vld1q_f32(p.add(i)), gain));
            i += 4;
        }
    }
    for (i, s) in buffer.iter_mut().enumerate().skip(simd_len) {
        *s *= start_gain + step * i as f32;
    }
}

fn scale(buffer: &mut [f32], gain: f32) {
    let len = buffer.len();
    let simd_len = len & !3;
    let p = buffer.as_mut_ptr();
    // SAFETY: every access stays below `simd_len <= len`.
    unsafe {
        let g = vdupq_n_f32(gain);
        let mut i = 0;
        while i < simd_len {
            vst1q_f32(p.add(i), vmulq_f32(vld1q_f32(p.add(i)), g));
            i += 4;
        }
    }
    scalar::scale(&mut buffer[simd_len..], gain);
}

fn interleave(dest: &mut [f32], left: &[f32], right: &[f32]) {
    let frames = left.len().min(right.len()).min(dest.len() / 2);
    let simd_frames = frames & !3;
    let d = dest.as_mut_ptr();
    let (l, r) = (left.as_ptr(), right.as_ptr());
    // SAFETY: `dest` holds at least `2 * frames` elements, each channel `frames`.
    unsafe {
        let mut i = 0;
        while i < simd_frames {
            let pair = float32x4x2_t(vld1q_f32(l.add(i)), vld1q_f32(r.add(i)));
            vst2q_f32(d.add(i * 2), pair);
            i += 4;
        }
    }
    scalar::interleave(
        &mut dest[simd_frames * 2..frames * 2],
        &left[simd_frames..frames],
        &right[simd_frames..frames],
    );
}

fn deinterleave(left: &mut [f32], right: &mut [f32], src: &[f32]) {
    let frames = left.len().min(right.len()).min(src.len() / 2);
    let simd_frames = frames & !3;
    let s = src.as_ptr();
    let (l, r) = (left.as_mut_ptr(), right.as_mut_ptr());
    // SAFETY: `src` holds at least `2 * frames` elements, each channel `frames`.
    unsafe {
        let mut i = 0;
        while i < simd_frames {
            let pair = vld2q_f32(s.add(i * 2));
            vst1q_f32(l.add(i), pair.0);
            vst1q_f32(r.add(i), pair.1);
            i += 4;
        }
    }
    scalar::deinterleave(
        &mut left[simd_frames..frames],
        &mut right[simd_frames..frames],
        &src[simd_frames * 2..frames * 2],
    );
}

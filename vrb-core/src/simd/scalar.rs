//! Portable scalar kernels.
//!
//! Every vector variant is checked against these in tests, so they stay
//! deliberately plain: one sample per iteration, same operation order as the
//! tail loops of the vector paths.

use super::{ramp_step, Kernels, SimdLevel};

pub(super) static KERNELS: Kernels = Kernels {
    level: SimdLevel::Scalar,
    rms,
    peak,
    mix,
    copy,
    gain_ramp,
    scale,
    interleave,
    deinterleave,
};

pub(super) fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f32 = buffer.iter().map(|s| s * s).sum();
    (sum / buffer.len() as f32).sqrt()
}

pub(super) fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |max, s| max.max(s.abs()))
}

pub(super) fn mix(dest: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d += s * gain;
    }
}

pub(super) fn copy(dest: &mut [f32], src: &[f32]) {
    let n = dest.len().min(src.len());
    dest[..n].copy_from_slice(&src[..n]);
}

pub(super) fn gain_ramp(buffer: &mut [f32], start_gain: f32, end_gain: f32) {
    let step = ramp_step(buffer.len(), start_gain, end_gain);
    for (i, s) in buffer.iter_mut().enumerate() {
        *s *= start_gain + step * i as f32;
    }
}

pub(super) fn scale(buffer: &mut [f32], gain: f32) {
    for s in buffer.iter_mut() {
        *s *= gain;
    }
}

pub(super) fn interleave(dest: &mut [f32], left: &[f32], right: &[f32]) {
    for ((frame, l), r) in dest.chunks_exact_mut(2).zip(left).zip(right) {
        frame[0] = *l;
        frame[1] = *r;
    }
}

pub(super) fn deinterleave(left: &mut [f32], right: &mut [f32], src: &[f32]) {
    for ((frame, l), r) in src.chunks_exact(2).zip(left.iter_mut()).zip(right.iter_mut()) {
        *l = frame[0];
        *r = frame[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_relative_eq!(rms(&samples), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn peak_ignores_sign() {
        assert_eq!(peak(&[0.1, -0.9, 0.3]), 0.9);
        assert_eq!(peak(&[]), 0.0);
    }

    #[test]
    fn single_sample_ramp_uses_start_gain() {
        let mut buf = [2.0f32];
        gain_ramp(&mut buf, 0.5, 10.0);
        assert_eq!(buf, [1.0]);
    }

    #[test]
    fn interleave_stops_at_shortest_span() {
        let mut dest = [0.0f32; 6];
        interleave(&mut dest, &[1.0, 2.0], &[3.0, 4.0, 5.0]);
        assert_eq!(dest, [1.0, 3.0, 2.0, 4.0, 0.0, 0.0]);
    }
}

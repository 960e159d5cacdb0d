use approx::assert_relative_eq;
use vrb_core::dsp::{self, WindowType};
use vrb_core::simd::{self, Kernels, SimdLevel};

/// Lengths around every lane width, plus one long block.
const LENGTHS: [usize; 12] = [0, 1, 3, 4, 5, 7, 8, 9, 15, 16, 17, 1031];

fn signal(len: usize, seed: f32) -> Vec<f32> {
    (0..len)
        .map(|i| ((i as f32 + seed) * 0.173).sin() * 0.9 + ((i as f32) * 0.011).cos() * 0.05)
        .collect()
}

fn scalar() -> &'static Kernels {
    simd::kernels_for(SimdLevel::Scalar).unwrap()
}

fn vector_tables() -> Vec<&'static Kernels> {
    SimdLevel::ALL
        .into_iter()
        .filter(|level| *level != SimdLevel::Scalar)
        .filter_map(simd::kernels_for)
        .collect()
}

fn assert_close(a: &[f32], b: &[f32], level: SimdLevel) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).abs() <= 1e-5 * (1.0 + x.abs()),
            "{level:?} differs from scalar at {i}: {x} vs {y}"
        );
    }
}

#[test]
fn reductions_match_scalar() {
    for table in vector_tables() {
        for len in LENGTHS {
            let buf = signal(len, 1.0);
            assert_relative_eq!((table.rms)(&buf), (scalar().rms)(&buf), epsilon = 1e-5);
            assert_eq!((table.peak)(&buf), (scalar().peak)(&buf), "{:?} len {len}", table.level);
        }
    }
}

#[test]
fn in_place_kernels_match_scalar() {
    for table in vector_tables() {
        for len in LENGTHS {
            let src = signal(len, 2.0);

            let (mut want, mut got) = (signal(len, 3.0), signal(len, 3.0));
            (scalar().mix)(&mut want, &src, 0.35);
            (table.mix)(&mut got, &src, 0.35);
            assert_close(&want, &got, table.level);

            let (mut want, mut got) = (src.clone(), src.clone());
            (scalar().gain_ramp)(&mut want, 0.2, 1.3);
            (table.gain_ramp)(&mut got, 0.2, 1.3);
            assert_close(&want, &got, table.level);

            let (mut want, mut got) = (src.clone(), src.clone());
            (scalar().scale)(&mut want, -0.7);
            (table.scale)(&mut got, -0.7);
            assert_close(&want, &got, table.level);

            let mut copied = vec![0.0f32; len];
            (table.copy)(&mut copied, &src);
            assert_eq!(copied, src);
        }
    }
}

#[test]
fn interleave_is_bit_exact_on_every_table() {
    for table in vector_tables().into_iter().chain([scalar()]) {
        for len in LENGTHS {
            let left = signal(len, 4.0);
            let right = signal(len, 5.0);
            let mut stereo = vec![0.0f32; len * 2];
            (table.interleave)(&mut stereo, &left, &right);
            for i in 0..len {
                assert_eq!(stereo[2 * i], left[i]);
                assert_eq!(stereo[2 * i + 1], right[i]);
            }

            let (mut l, mut r) = (vec![0.0f32; len], vec![0.0f32; len]);
            (table.deinterleave)(&mut l, &mut r, &stereo);
            assert_eq!(l, left);
            assert_eq!(r, right);
        }
    }
}

#[test]
fn public_functions_follow_the_active_table() {
    let active = simd::kernels();
    let buf = signal(777, 6.0);
    assert_eq!(dsp::calculate_rms(&buf), (active.rms)(&buf));
    assert_eq!(dsp::calculate_peak(&buf), (active.peak)(&buf));

    let mut unity = buf.clone();
    dsp::apply_gain_with_fade(&mut unity, 1.0, 1.0);
    assert_eq!(unity, buf);
}

#[test]
fn clear_and_window_identities() {
    let mut buf = signal(300, 7.0);
    dsp::clear_buffer(&mut buf, true);
    assert!(buf.iter().all(|s| *s == 0.0));

    let original = signal(300, 8.0);
    let mut windowed = original.clone();
    dsp::apply_window(&mut windowed, WindowType::Rectangular);
    assert_eq!(windowed, original);
}

//! Stereo view over a `RingBuffer<f32>`.
//!
//! The stream stays a flat run of floats; a frame is two consecutive samples,
//! left at even offsets. Stereo transfers are clamped to whole frames up front
//! so the stream never goes out of frame alignment.
//!
//! Interleaving goes through a fixed stack scratch block, so neither
//! [`AudioProducer::write_stereo`] nor [`AudioConsumer::read_stereo`]
//! allocates.

use std::ops::{Deref, DerefMut};

use super::{RingBuffer, RingConsumer, RingProducer};
use crate::error::Result;
use crate::simd::{deinterleave_stereo, interleave_stereo};

/// Upper bound of the click-suppression ramp, in samples.
pub const FADE_SAMPLES: usize = 64;

/// Stereo frames moved per scratch pass.
const SCRATCH_FRAMES: usize = 256;

/// Interleaves and pushes at most `max_frames` frames through `push`.
fn push_frames(
    left: &[f32],
    right: &[f32],
    max_frames: usize,
    mut push: impl FnMut(&[f32]) -> usize,
) -> usize {
    let frames = left.len().min(right.len()).min(max_frames);
    let mut scratch = [0.0f32; SCRATCH_FRAMES * 2];
    let mut done = 0;
    while done < frames {
        let n = (frames - done).min(SCRATCH_FRAMES);
        let block = &mut scratch[..n * 2];
        interleave_stereo(block, &left[done..done + n], &right[done..done + n]);
        let written = push(block);
        done += written / 2;
        if written < block.len() {
            break;
        }
    }
    done
}

/// Pops at most `max_frames` frames through `pop` and de-interleaves them.
fn pop_frames(
    left: &mut [f32],
    right: &mut [f32],
    max_frames: usize,
    mut pop: impl FnMut(&mut [f32]) -> usize,
) -> usize {
    let frames = left.len().min(right.len()).min(max_frames);
    let mut scratch = [0.0f32; SCRATCH_FRAMES * 2];
    let mut done = 0;
    while done < frames {
        let n = (frames - done).min(SCRATCH_FRAMES);
        let block = &mut scratch[..n * 2];
        let read = pop(block) / 2;
        deinterleave_stereo(
            &mut left[done..done + read],
            &mut right[done..done + read],
            &block[..read * 2],
        );
        done += read;
        if read < n {
            break;
        }
    }
    done
}

/// Multiplies the start of `buffer` by a linear ramp to suppress clicks.
///
/// The ramp covers `min(buffer.len(), 64)` samples and runs 0→1 for a fade-in,
/// 1→0 for a fade-out. A fade-out on a buffer longer than the ramp also applies
/// the ramp mirrored onto the last samples (`buffer[len - 1 - i] *= gain[i]`).
pub fn apply_fade(buffer: &mut [f32], fade_in: bool) {
    let frames = buffer.len();
    let fade_len = frames.min(FADE_SAMPLES);
    if fade_len == 0 {
        return;
    }

    let step = 1.0 / fade_len as f32;
    let mut gains = [0.0f32; FADE_SAMPLES];
    for (i, gain) in gains[..fade_len].iter_mut().enumerate() {
        let ramp = i as f32 * step;
        *gain = if fade_in { ramp } else { 1.0 - ramp };
    }

    for (s, gain) in buffer[..fade_len].iter_mut().zip(&gains) {
        *s *= gain;
    }
    if !fade_in && frames > fade_len {
        for (i, gain) in gains[..fade_len].iter().enumerate() {
            buffer[frames - 1 - i] *= gain;
        }
    }
}

/// `RingBuffer<f32>` carrying interleaved stereo frames.
///
/// Derefs to the base buffer for element-level operations.
#[derive(Debug)]
pub struct AudioRingBuffer {
    inner: RingBuffer<f32>,
}

impl AudioRingBuffer {
    /// `capacity` is in samples (two per frame) and rounds up to a power of two.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: RingBuffer::new(capacity)?,
        })
    }

    /// Convenience constructor sized in frames.
    pub fn with_frames(frames: usize) -> Result<Self> {
        Self::new(frames.saturating_mul(2))
    }

    /// Writes `min(left.len(), right.len())` frames or as many whole frames as fit.
    pub fn write_stereo(&mut self, left: &[f32], right: &[f32]) -> usize {
        let max_frames = self.inner.free() / 2;
        push_frames(left, right, max_frames, |block| self.inner.write(block))
    }

    /// Reads up to `min(left.len(), right.len())` whole frames.
    pub fn read_stereo(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let max_frames = self.inner.available() / 2;
        pop_frames(left, right, max_frames, |block| self.inner.read(block))
    }

    /// Whole frames ready to read.
    pub fn available_frames(&self) -> usize {
        self.inner.available() / 2
    }

    /// Whole frames that can still be written.
    pub fn free_frames(&self) -> usize {
        self.inner.free() / 2
    }

    /// See [`apply_fade`].
    pub fn apply_fade(buffer: &mut [f32], fade_in: bool) {
        apply_fade(buffer, fade_in);
    }

    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        let (inner_tx, inner_rx) = self.inner.split();
        (
            AudioProducer { inner: inner_tx },
            AudioConsumer { inner: inner_rx },
        )
    }
}

impl Deref for AudioRingBuffer {
    type Target = RingBuffer<f32>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AudioRingBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Stereo write half, held by the capture callback.
pub struct AudioProducer {
    inner: RingProducer<f32>,
}

impl AudioProducer {
    /// Returns whole frames written; fewer than requested is an overrun.
    pub fn write_stereo(&mut self, left: &[f32], right: &[f32]) -> usize {
        let max_frames = self.inner.free() / 2;
        push_frames(left, right, max_frames, |block| self.inner.write(block))
    }

    pub fn free_frames(&self) -> usize {
        self.inner.free() / 2
    }
}

impl Deref for AudioProducer {
    type Target = RingProducer<f32>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AudioProducer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Stereo read half, held by the processing or render thread.
pub struct AudioConsumer {
    inner: RingConsumer<f32>,
}

impl AudioConsumer {
    /// Returns whole frames read; fewer than requested is an underrun.
    pub fn read_stereo(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let max_frames = self.inner.available() / 2;
        pop_frames(left, right, max_frames, |block| self.inner.read(block))
    }

    pub fn available_frames(&self) -> usize {
        self.inner.available() / 2
    }
}

impl Deref for AudioConsumer {
    type Target = RingConsumer<f32>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AudioConsumer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stereo_round_trip() {
        let mut rb = AudioRingBuffer::new(64).unwrap();
        assert_eq!(rb.write_stereo(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 3);
        assert_eq!(rb.available(), 6);

        let (mut left, mut right) = ([0.0f32; 3], [0.0f32; 3]);
        assert_eq!(rb.read_stereo(&mut left, &mut right), 3);
        assert_eq!(left, [1.0, 2.0, 3.0]);
        assert_eq!(right, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn flat_stream_has_left_at_even_offsets() {
        let mut rb = AudioRingBuffer::new(16).unwrap();
        rb.write_stereo(&[1.0, 2.0], &[-1.0, -2.0]);
        let mut flat = [0.0f32; 4];
        assert_eq!(rb.read(&mut flat), 4);
        assert_eq!(flat, [1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn partial_write_reports_whole_frames_only() {
        // Capacity 8 leaves 7 free samples: three whole frames.
        let mut rb = AudioRingBuffer::new(8).unwrap();
        assert_eq!(rb.write_stereo(&[1.0; 4], &[2.0; 4]), 3);
        assert_eq!(rb.available(), 6);
        assert_eq!(rb.free(), 1);
        assert_eq!(rb.free_frames(), 0);
        assert_eq!(rb.write_stereo(&[1.0], &[2.0]), 0);
    }

    #[test]
    fn large_transfer_spans_several_scratch_blocks() {
        let frames = SCRATCH_FRAMES * 3 + 17;
        let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let right: Vec<f32> = (0..frames).map(|i| -(i as f32)).collect();

        let rb = AudioRingBuffer::with_frames(frames + 1).unwrap();
        let (mut tx, mut rx) = rb.split();
        assert_eq!(tx.write_stereo(&left, &right), frames);
        assert_eq!(rx.available_frames(), frames);

        let (mut l, mut r) = (vec![0.0f32; frames], vec![0.0f32; frames]);
        assert_eq!(rx.read_stereo(&mut l, &mut r), frames);
        assert_eq!(l, left);
        assert_eq!(r, right);
    }

    #[test]
    fn read_stereo_stops_at_available() {
        let mut rb = AudioRingBuffer::new(32).unwrap();
        rb.write_stereo(&[0.5; 2], &[0.25; 2]);
        let (mut l, mut r) = ([9.0f32; 5], [9.0f32; 5]);
        assert_eq!(rb.read_stereo(&mut l, &mut r), 2);
        assert_eq!(l, [0.5, 0.5, 9.0, 9.0, 9.0]);
        assert_eq!(r, [0.25, 0.25, 9.0, 9.0, 9.0]);
    }

    #[test]
    fn fade_in_ramps_from_zero() {
        let mut buf = vec![1.0f32; 128];
        apply_fade(&mut buf, true);
        assert_eq!(buf[0], 0.0);
        assert_relative_eq!(buf[32], 0.5);
        assert_relative_eq!(buf[63], 63.0 / 64.0);
        assert!(buf[64..].iter().all(|s| *s == 1.0));
    }

    #[test]
    fn fade_out_touches_head_and_mirrored_tail() {
        let mut buf = vec![1.0f32; 200];
        apply_fade(&mut buf, false);
        assert_eq!(buf[0], 1.0);
        assert_relative_eq!(buf[63], 1.0 / 64.0);
        assert_eq!(buf[100], 1.0);
        assert_eq!(buf[199], 1.0);
        assert_relative_eq!(buf[199 - 63], 1.0 / 64.0);
    }

    #[test]
    fn fade_out_mirrors_only_past_the_ramp_length() {
        let mut exact = vec![1.0f32; FADE_SAMPLES];
        apply_fade(&mut exact, false);
        assert_eq!(exact[0], 1.0);
        assert_eq!(exact[1], 63.0 / 64.0);
        assert_relative_eq!(exact[63], 1.0 / 64.0);

        // One sample longer: the mirrored tail overlaps the head from index 1.
        let mut longer = vec![1.0f32; FADE_SAMPLES + 1];
        apply_fade(&mut longer, false);
        assert_eq!(longer[0], 1.0);
        assert_relative_eq!(longer[1], (63.0 / 64.0) * (1.0 / 64.0));
        assert_eq!(longer[64], 1.0);
    }

    #[test]
    fn fade_on_short_and_empty_buffers() {
        let mut short = vec![1.0f32; 4];
        apply_fade(&mut short, true);
        assert_eq!(short, [0.0, 0.25, 0.5, 0.75]);

        let mut empty: Vec<f32> = Vec::new();
        AudioRingBuffer::apply_fade(&mut empty, false);
        assert!(empty.is_empty());
    }
}

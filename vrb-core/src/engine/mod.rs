//! `StreamSession`: capture ring, render ring and scratch arena for one stream.
//!
//! ## Threads
//!
//! ```text
//! StreamSession::new(config)
//!     └─► split()
//!           ├─► CaptureInput   → hardware capture callback  (push)
//!           ├─► BlockProcessor → processing thread          (process_block)
//!           └─► RenderOutput   → hardware render callback   (pull)
//! ```
//!
//! Each half is `Send` and owned by exactly one thread, which is what keeps
//! both rings single-producer/single-consumer. The halves share only the
//! `TransportDiagnostics` counters.

pub mod processor;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{info, warn};

pub use processor::{BlockOutcome, BlockProcessor, DiagnosticsSnapshot, TransportDiagnostics};

use crate::{
    arena::MemoryArena,
    buffering::audio::{AudioConsumer, AudioProducer, AudioRingBuffer},
    config::TransportConfig,
    error::Result,
    simd::{self, clear_buffer, copy_buffer},
};

/// The spatialization stage driven by [`BlockProcessor`].
///
/// `scratch` is reset after every call; nothing allocated from it may be kept.
/// When the arena is exhausted the implementation should skip optional work
/// for the block rather than fail.
pub trait SpatialProcessor: Send + 'static {
    fn process(
        &mut self,
        in_left: &[f32],
        in_right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
        scratch: &MemoryArena,
    );

    /// Drop internal state (filter tails, convolution history).
    fn reset(&mut self) {}
}

/// Copies input to output unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl SpatialProcessor for Passthrough {
    fn process(
        &mut self,
        in_left: &[f32],
        in_right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
        _scratch: &MemoryArena,
    ) {
        copy_buffer(out_left, in_left);
        copy_buffer(out_right, in_right);
    }
}

/// Reads up to `min(left.len(), right.len())` frames and pads the rest of both
/// slices with silence. Returns the number of real frames.
pub fn render_pull(consumer: &mut AudioConsumer, left: &mut [f32], right: &mut [f32]) -> usize {
    let read = consumer.read_stereo(left, right);
    clear_buffer(&mut left[read..], false);
    clear_buffer(&mut right[read..], false);
    read
}

/// Capture-callback half.
pub struct CaptureInput {
    producer: AudioProducer,
    diagnostics: Arc<TransportDiagnostics>,
}

impl CaptureInput {
    /// Queues captured frames. Frames that do not fit are dropped and counted.
    pub fn push(&mut self, left: &[f32], right: &[f32]) -> usize {
        let requested = left.len().min(right.len());
        let written = self.producer.write_stereo(left, right);
        self.diagnostics
            .frames_captured
            .fetch_add(written, Ordering::Relaxed);
        if written < requested {
            let dropped = requested - written;
            self.diagnostics.record_overrun(dropped);
            warn!(dropped, "capture ring full, dropping input frames");
        }
        written
    }

    pub fn free_frames(&self) -> usize {
        self.producer.free_frames()
    }
}

/// Render-callback half.
pub struct RenderOutput {
    consumer: AudioConsumer,
    diagnostics: Arc<TransportDiagnostics>,
}

impl RenderOutput {
    /// Fills `left`/`right` completely, padding with silence on underrun.
    pub fn pull(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let requested = left.len().min(right.len());
        let read = render_pull(&mut self.consumer, left, right);
        self.diagnostics
            .frames_rendered
            .fetch_add(read, Ordering::Relaxed);
        if read < requested {
            let silence = requested - read;
            self.diagnostics.record_underrun(silence);
            warn!(silence, "render ring starved, padding with silence");
        }
        read
    }

    pub fn available_frames(&self) -> usize {
        self.consumer.available_frames()
    }
}

/// One stream's transport resources before they are handed to threads.
pub struct StreamSession {
    config: TransportConfig,
    capture: AudioRingBuffer,
    render: AudioRingBuffer,
    arena: MemoryArena,
    diagnostics: Arc<TransportDiagnostics>,
}

impl StreamSession {
    /// Builds both rings and the arena from a normalized copy of `config`.
    ///
    /// # Errors
    /// - `VrbError::CapacityOverflow` if a ring size cannot be represented.
    /// - `VrbError::ArenaAllocation` if the scratch region cannot be obtained;
    ///   the session must not start without it.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let config = config.normalize();
        let capture = AudioRingBuffer::with_frames(config.ring_capacity_frames)?;
        let render = AudioRingBuffer::with_frames(config.ring_capacity_frames)?;
        let arena =
            MemoryArena::new(config.arena_bytes)?.with_zero_on_reset(config.zero_arena_on_reset);

        info!(
            sample_rate = config.sample_rate,
            block_frames = config.block_frames,
            ring_samples = capture.capacity(),
            arena_bytes = arena.capacity(),
            simd = simd::active_level().name(),
            "stream session created"
        );

        Ok(Self {
            config,
            capture,
            render,
            arena,
            diagnostics: Arc::new(TransportDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> Arc<TransportDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Hands out the three thread-owned halves.
    pub fn split(self) -> (CaptureInput, BlockProcessor, RenderOutput) {
        let (capture_tx, capture_rx) = self.capture.split();
        let (render_tx, render_rx) = self.render.split();

        let input = CaptureInput {
            producer: capture_tx,
            diagnostics: Arc::clone(&self.diagnostics),
        };
        let output = RenderOutput {
            consumer: render_rx,
            diagnostics: Arc::clone(&self.diagnostics),
        };
        let processor = BlockProcessor::new(
            self.config,
            capture_rx,
            render_tx,
            self.arena,
            self.diagnostics,
        );
        (input, processor, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{DcBlocker, WindowTable, WindowType};

    fn small_config() -> TransportConfig {
        TransportConfig {
            block_frames: 64,
            ring_capacity_frames: 256,
            arena_bytes: 4096,
            ..Default::default()
        }
    }

    /// What the processor hands the spatializer for one channel.
    fn conditioned(dc: &mut DcBlocker, block: &[f32], window: WindowType) -> Vec<f32> {
        let mut out = block.to_vec();
        dc.process(&mut out);
        WindowTable::new(window, out.len()).apply(&mut out);
        out
    }

    /// Swaps channels and halves the level, using arena scratch.
    struct SwapHalf {
        resets: usize,
    }

    impl SpatialProcessor for SwapHalf {
        fn process(
            &mut self,
            in_left: &[f32],
            in_right: &[f32],
            out_left: &mut [f32],
            out_right: &mut [f32],
            scratch: &MemoryArena,
        ) {
            let Some(tmp) = scratch.alloc_slice::<f32>(in_left.len()) else {
                return;
            };
            tmp.copy_from_slice(in_left);
            for (o, i) in out_left.iter_mut().zip(in_right) {
                *o = i * 0.5;
            }
            for (o, t) in out_right.iter_mut().zip(tmp.iter()) {
                *o = t * 0.5;
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn passthrough_moves_a_block_end_to_end() {
        let session = StreamSession::new(small_config()).unwrap();
        let diag = session.diagnostics();
        let alpha = session.config().dc_alpha;
        let (mut input, mut processor, mut output) = session.split();

        let left: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin()).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        assert_eq!(input.push(&left, &right), 64);

        let outcome = processor.process_block(&mut Passthrough);
        assert_eq!(outcome, BlockOutcome::Processed { frames_written: 64 });

        let (mut l, mut r) = (vec![0.0f32; 64], vec![0.0f32; 64]);
        assert_eq!(output.pull(&mut l, &mut r), 64);
        let mut dc = DcBlocker::new(alpha);
        assert_eq!(l, conditioned(&mut dc, &left, WindowType::Rectangular));
        let mut dc = DcBlocker::new(alpha);
        assert_eq!(r, conditioned(&mut dc, &right, WindowType::Rectangular));

        let snap = diag.snapshot();
        assert_eq!(snap.frames_captured, 64);
        assert_eq!(snap.blocks_processed, 1);
        assert_eq!(snap.frames_rendered, 64);
        assert_eq!(snap.underruns, 0);
    }

    #[test]
    fn partial_block_stays_pending() {
        let (mut input, mut processor, _output) =
            StreamSession::new(small_config()).unwrap().split();
        input.push(&[0.1; 40], &[0.1; 40]);
        assert_eq!(
            processor.process_block(&mut Passthrough),
            BlockOutcome::Pending {
                available_frames: 40
            }
        );
        input.push(&[0.1; 40], &[0.1; 40]);
        assert_eq!(processor.process_available(&mut Passthrough), 1);
    }

    #[test]
    fn spatializer_gets_scratch_and_arena_is_reclaimed() {
        let config = small_config();
        let (mut dc_l, mut dc_r) = (
            DcBlocker::new(config.dc_alpha),
            DcBlocker::new(config.dc_alpha),
        );
        let (mut input, mut processor, mut output) = StreamSession::new(config).unwrap().split();
        let mut swap = SwapHalf { resets: 0 };

        // 20 blocks of 256 bytes would overflow the 4096-byte arena without resets.
        for _ in 0..20 {
            input.push(&[0.8; 64], &[0.4; 64]);
            assert!(matches!(
                processor.process_block(&mut swap),
                BlockOutcome::Processed { .. }
            ));
            let (mut l, mut r) = ([0.0f32; 64], [0.0f32; 64]);
            output.pull(&mut l, &mut r);

            let want_l: Vec<f32> = conditioned(&mut dc_r, &[0.4; 64], WindowType::Rectangular)
                .iter()
                .map(|s| s * 0.5)
                .collect();
            let want_r: Vec<f32> = conditioned(&mut dc_l, &[0.8; 64], WindowType::Rectangular)
                .iter()
                .map(|s| s * 0.5)
                .collect();
            assert_eq!(l.to_vec(), want_l);
            assert_eq!(r.to_vec(), want_r);
        }

        processor.reset(&mut swap);
        assert_eq!(swap.resets, 1);
        assert!(processor.levels()[0].is_none());
    }

    #[test]
    fn underrun_pads_with_silence() {
        let session = StreamSession::new(small_config()).unwrap();
        let diag = session.diagnostics();
        let (_input, _processor, mut output) = session.split();

        let (mut l, mut r) = ([1.0f32; 32], [1.0f32; 32]);
        assert_eq!(output.pull(&mut l, &mut r), 0);
        assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));

        let snap = diag.snapshot();
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.silence_frames, 32);
    }

    #[test]
    fn capture_overrun_is_counted() {
        let session = StreamSession::new(small_config()).unwrap();
        let diag = session.diagnostics();
        let (mut input, _processor, _output) = session.split();

        // 256 frames = 512 samples; one slot is reserved, so 255 frames fit.
        let written = input.push(&[0.0; 300], &[0.0; 300]);
        assert_eq!(written, 255);
        let snap = diag.snapshot();
        assert_eq!(snap.overruns, 1);
        assert_eq!(snap.dropped_frames, 45);
    }

    #[test]
    fn render_overrun_drops_processed_frames() {
        let (mut input, mut processor, _output) =
            StreamSession::new(small_config()).unwrap().split();
        let diag = processor.diagnostics();

        // Each ring holds 255 frames: three blocks plus 63 frames of a fourth.
        for _ in 0..3 {
            input.push(&[0.2; 64], &[0.2; 64]);
        }
        assert_eq!(processor.process_available(&mut Passthrough), 3);
        input.push(&[0.2; 64], &[0.2; 64]);
        assert_eq!(
            processor.process_block(&mut Passthrough),
            BlockOutcome::Processed { frames_written: 63 }
        );

        let snap = diag.snapshot();
        assert_eq!(snap.overruns, 1);
        assert_eq!(snap.dropped_frames, 1);
    }

    #[test]
    fn windowed_session_tapers_block_edges() {
        let config = TransportConfig {
            analysis_window: WindowType::Hann,
            ..small_config()
        };
        let mut dc = DcBlocker::new(config.dc_alpha);
        let (mut input, mut processor, mut output) = StreamSession::new(config).unwrap().split();
        let block: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).cos()).collect();
        input.push(&block, &block);
        processor.process_block(&mut Passthrough);

        let (mut l, mut r) = ([0.0f32; 64], [0.0f32; 64]);
        output.pull(&mut l, &mut r);
        let want = conditioned(&mut dc, &block, WindowType::Hann);
        assert_eq!(l.to_vec(), want);
        assert_eq!(l[0], 0.0);
        assert_eq!(l, r);
        assert!(processor.levels()[1].is_some());
    }

    #[test]
    fn render_pull_pads_partial_reads() {
        let ring = AudioRingBuffer::new(64).unwrap();
        let (mut tx, mut rx) = ring.split();
        tx.write_stereo(&[0.3; 4], &[0.6; 4]);
        let (mut l, mut r) = ([9.0f32; 8], [9.0f32; 8]);
        assert_eq!(render_pull(&mut rx, &mut l, &mut r), 4);
        assert_eq!(l, [0.3, 0.3, 0.3, 0.3, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(r, [0.6, 0.6, 0.6, 0.6, 0.0, 0.0, 0.0, 0.0]);
    }
}

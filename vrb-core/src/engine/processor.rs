//! Block processing on the consumer thread.
//!
//! ## Per block
//!
//! ```text
//! 1. Wait until one full block is buffered in the capture ring
//! 2. read_stereo → left / right block
//! 3. DC removal per channel (running state kept across blocks)
//! 4. Analysis window
//! 5. SpatialProcessor::process with the arena as scratch
//! 6. Meter the output, write it to the render ring
//! 7. Reset the arena
//! ```
//!
//! A short write into the render ring drops the rest of the block and is
//! counted as an overrun.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arena::MemoryArena;
use crate::buffering::audio::{AudioConsumer, AudioProducer};
use crate::config::TransportConfig;
use crate::dsp::{DcBlocker, LevelMeter, LevelReading, WindowTable};
use crate::engine::SpatialProcessor;
use crate::profiling::{Profiler, SectionStats};

/// Transport counters, shared between the session halves.
#[derive(Debug)]
pub struct TransportDiagnostics {
    pub frames_captured: AtomicUsize,
    pub blocks_processed: AtomicUsize,
    pub frames_rendered: AtomicUsize,
    /// Writes that did not fit (capture or render ring).
    pub overruns: AtomicUsize,
    /// Render pulls that had to pad with silence.
    pub underruns: AtomicUsize,
    /// Frames discarded by overruns.
    pub dropped_frames: AtomicUsize,
    /// Frames of silence emitted by underruns.
    pub silence_frames: AtomicUsize,
}

impl Default for TransportDiagnostics {
    fn default() -> Self {
        Self {
            frames_captured: AtomicUsize::new(0),
            blocks_processed: AtomicUsize::new(0),
            frames_rendered: AtomicUsize::new(0),
            overruns: AtomicUsize::new(0),
            underruns: AtomicUsize::new(0),
            dropped_frames: AtomicUsize::new(0),
            silence_frames: AtomicUsize::new(0),
        }
    }
}

impl TransportDiagnostics {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
        self.silence_frames.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_overrun(&self, dropped: usize) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.dropped_frames.fetch_add(dropped, Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self, silence: usize) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        self.silence_frames.fetch_add(silence, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    pub blocks_processed: usize,
    pub frames_rendered: usize,
    pub overruns: usize,
    pub underruns: usize,
    pub dropped_frames: usize,
    pub silence_frames: usize,
}

/// Result of one [`BlockProcessor::process_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Less than one block is buffered; nothing was consumed.
    Pending { available_frames: usize },
    /// One block went through; `frames_written` of it reached the render ring.
    Processed { frames_written: usize },
}

/// Owns everything the processing thread touches.
pub struct BlockProcessor {
    config: TransportConfig,
    capture: AudioConsumer,
    render: AudioProducer,
    arena: MemoryArena,
    dc: [DcBlocker; 2],
    window: WindowTable,
    meters: [LevelMeter; 2],
    in_left: Vec<f32>,
    in_right: Vec<f32>,
    out_left: Vec<f32>,
    out_right: Vec<f32>,
    diagnostics: Arc<TransportDiagnostics>,
    timing: Option<Arc<SectionStats>>,
}

impl BlockProcessor {
    pub(crate) fn new(
        config: TransportConfig,
        capture: AudioConsumer,
        render: AudioProducer,
        arena: MemoryArena,
        diagnostics: Arc<TransportDiagnostics>,
    ) -> Self {
        let frames = config.block_frames;
        let dc = DcBlocker::new(config.dc_alpha);
        let meter = LevelMeter::new(config.meter_window_blocks, LevelMeter::DEFAULT_PEAK_DECAY);
        Self {
            window: WindowTable::new(config.analysis_window, frames),
            dc: [dc, dc],
            meters: [meter.clone(), meter],
            in_left: vec![0.0; frames],
            in_right: vec![0.0; frames],
            out_left: vec![0.0; frames],
            out_right: vec![0.0; frames],
            config,
            capture,
            render,
            arena,
            diagnostics,
            timing: None,
        }
    }

    /// Times every processed block under the `"block"` section of `profiler`.
    pub fn attach_profiler(&mut self, profiler: &Profiler) {
        self.timing = Some(profiler.section("block"));
    }

    pub fn block_frames(&self) -> usize {
        self.config.block_frames
    }

    /// Room left in the render ring, in frames.
    pub fn render_free_frames(&self) -> usize {
        self.render.free_frames()
    }

    /// Processes one block if a full one is buffered.
    pub fn process_block(&mut self, spatializer: &mut dyn SpatialProcessor) -> BlockOutcome {
        let frames = self.config.block_frames;
        let available_frames = self.capture.available_frames();
        if available_frames < frames {
            return BlockOutcome::Pending { available_frames };
        }
        let _timer = self.timing.as_ref().map(|stats| stats.scope());

        let read = self
            .capture
            .read_stereo(&mut self.in_left, &mut self.in_right);
        debug_assert_eq!(read, frames);

        self.dc[0].process(&mut self.in_left);
        self.dc[1].process(&mut self.in_right);
        self.window.apply(&mut self.in_left);
        self.window.apply(&mut self.in_right);

        self.out_left.fill(0.0);
        self.out_right.fill(0.0);
        spatializer.process(
            &self.in_left,
            &self.in_right,
            &mut self.out_left,
            &mut self.out_right,
            &self.arena,
        );
        let scratch_used = self.arena.used();
        self.arena.reset();

        self.meters[0].process(&self.out_left);
        self.meters[1].process(&self.out_right);

        let frames_written = self.render.write_stereo(&self.out_left, &self.out_right);
        if frames_written < frames {
            let dropped = frames - frames_written;
            self.diagnostics.record_overrun(dropped);
            warn!(dropped, frames, "render ring full, dropping processed frames");
        }
        self.diagnostics
            .blocks_processed
            .fetch_add(1, Ordering::Relaxed);
        debug!(frames_written, scratch_used, "block processed");

        BlockOutcome::Processed { frames_written }
    }

    /// Processes blocks until less than one is buffered. Returns the count.
    pub fn process_available(&mut self, spatializer: &mut dyn SpatialProcessor) -> usize {
        let mut blocks = 0;
        while let BlockOutcome::Processed { .. } = self.process_block(spatializer) {
            blocks += 1;
        }
        blocks
    }

    /// Latest output levels, left then right.
    pub fn levels(&self) -> [Option<LevelReading>; 2] {
        [self.meters[0].last(), self.meters[1].last()]
    }

    pub fn diagnostics(&self) -> Arc<TransportDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Clears the DC state, meters and the spatializer. Buffered audio stays.
    pub fn reset(&mut self, spatializer: &mut dyn SpatialProcessor) {
        self.dc.iter_mut().for_each(DcBlocker::reset);
        self.meters.iter_mut().for_each(LevelMeter::reset);
        spatializer.reset();
        info!("block processor reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_reset_and_snapshot() {
        let diag = TransportDiagnostics::default();
        diag.record_overrun(12);
        diag.record_underrun(5);
        diag.record_underrun(3);

        let snap = diag.snapshot();
        assert_eq!(snap.overruns, 1);
        assert_eq!(snap.dropped_frames, 12);
        assert_eq!(snap.underruns, 2);
        assert_eq!(snap.silence_frames, 8);

        diag.reset();
        assert_eq!(diag.snapshot().underruns, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let diag = TransportDiagnostics::default();
        diag.blocks_processed.store(3, Ordering::Relaxed);
        let json = serde_json::to_value(diag.snapshot()).unwrap();
        assert_eq!(json["blocksProcessed"], 3);
        assert_eq!(json["droppedFrames"], 0);
    }
}

//! Transport configuration.
//!
//! Loading is the host application's job; this struct is what it fills in.
//! Every field has a default, so a partial JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::dsp::{WindowType, DEFAULT_DC_ALPHA};
use crate::error::{Result, VrbError};

/// Configuration for a `StreamSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportConfig {
    /// Stream sample rate (Hz). Default: 48000.
    pub sample_rate: u32,
    /// Frames per processing block. Default: 512.
    pub block_frames: usize,
    /// Stereo frames held by each of the capture and render rings.
    /// Rounded up to a power of two in samples. Default: 8192.
    pub ring_capacity_frames: usize,
    /// Scratch arena size in bytes. Default: 1 MiB.
    pub arena_bytes: usize,
    /// Zero the arena on every reset. Default: false.
    pub zero_arena_on_reset: bool,
    /// DC blocker pole in (0, 1). Default: 0.995.
    pub dc_alpha: f32,
    /// Analysis window applied to each captured block. Default: rectangular.
    pub analysis_window: WindowType,
    /// Blocks in the RMS moving average. Default: 8.
    pub meter_window_blocks: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_frames: 512,
            ring_capacity_frames: 8_192,
            arena_bytes: 1 << 20,
            zero_arena_on_reset: false,
            dc_alpha: DEFAULT_DC_ALPHA,
            analysis_window: WindowType::Rectangular,
            meter_window_blocks: 8,
        }
    }
}

impl TransportConfig {
    /// Parses a JSON object, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VrbError::InvalidConfig(e.to_string()))
    }

    /// Clamps values the session cannot run with.
    ///
    /// - `block_frames` and `sample_rate` become at least 1.
    /// - `dc_alpha` outside (0, 1) (or NaN) falls back to the default.
    /// - each ring holds at least two blocks.
    /// - `meter_window_blocks` becomes at least 1.
    pub fn normalize(mut self) -> Self {
        self.sample_rate = self.sample_rate.max(1);
        self.block_frames = self.block_frames.max(1);
        if !(self.dc_alpha > 0.0 && self.dc_alpha < 1.0) {
            self.dc_alpha = DEFAULT_DC_ALPHA;
        }
        self.ring_capacity_frames = self
            .ring_capacity_frames
            .max(self.block_frames.saturating_mul(2));
        self.meter_window_blocks = self.meter_window_blocks.max(1);
        self
    }

    /// Duration of one block in seconds.
    pub fn block_duration_secs(&self) -> f64 {
        self.block_frames as f64 / f64::from(self.sample_rate.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            TransportConfig::from_json(r#"{"blockFrames": 256, "analysisWindow": "hann"}"#)
                .unwrap();
        assert_eq!(config.block_frames, 256);
        assert_eq!(config.analysis_window, WindowType::Hann);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.ring_capacity_frames, 8_192);
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let err = TransportConfig::from_json(r#"{"blockFrames": "lots"}"#).unwrap_err();
        assert!(matches!(err, VrbError::InvalidConfig(_)));
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let config = TransportConfig {
            block_frames: 0,
            dc_alpha: 1.5,
            ring_capacity_frames: 1,
            meter_window_blocks: 0,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.block_frames, 1);
        assert_eq!(config.dc_alpha, DEFAULT_DC_ALPHA);
        assert_eq!(config.ring_capacity_frames, 2);
        assert_eq!(config.meter_window_blocks, 1);

        let nan = TransportConfig {
            dc_alpha: f32::NAN,
            ..Default::default()
        }
        .normalize();
        assert_eq!(nan.dc_alpha, DEFAULT_DC_ALPHA);
    }

    #[test]
    fn ring_grows_to_two_blocks() {
        let config = TransportConfig {
            block_frames: 1024,
            ring_capacity_frames: 1000,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.ring_capacity_frames, 2048);
    }

    #[test]
    fn default_is_already_normal() {
        let config = TransportConfig::default();
        assert_eq!(config.clone().normalize(), config);
        assert!((config.block_duration_secs() - 512.0 / 48_000.0).abs() < 1e-12);
    }
}

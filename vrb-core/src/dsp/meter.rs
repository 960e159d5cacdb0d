//! Level metering for the overlay.
//!
//! RMS and peak come from the vector kernels; the overlay gets a smoothed RMS
//! (moving average over the last few blocks) and a decaying peak hold.

use serde::Serialize;

use crate::simd::{calculate_peak, calculate_rms};

/// Fixed-window moving average.
///
/// Until the window has filled, the average covers only the values seen so far.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: Vec<f32>,
    index: usize,
    filled: bool,
}

impl MovingAverage {
    /// `window` of zero is treated as one.
    pub fn new(window: usize) -> Self {
        Self {
            values: vec![0.0; window.max(1)],
            index: 0,
            filled: false,
        }
    }

    /// Pushes `value` and returns the updated average.
    pub fn add(&mut self, value: f32) -> f32 {
        self.values[self.index] = value;
        self.index = (self.index + 1) % self.values.len();
        if self.index == 0 {
            self.filled = true;
        }
        self.average()
    }

    pub fn average(&self) -> f32 {
        let count = if self.filled {
            self.values.len()
        } else {
            self.index
        };
        if count == 0 {
            return 0.0;
        }
        self.values[..count].iter().sum::<f32>() / count as f32
    }

    pub fn window(&self) -> usize {
        self.values.len()
    }

    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.index = 0;
        self.filled = false;
    }
}

/// One metering result, shaped for the telemetry overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReading {
    /// RMS of the latest block.
    pub rms: f32,
    /// Absolute peak of the latest block.
    pub peak: f32,
    /// RMS averaged over the meter window.
    pub rms_smoothed: f32,
    /// Peak hold with per-block decay.
    pub peak_hold: f32,
}

/// Block level meter.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    rms_average: MovingAverage,
    peak_hold: f32,
    /// Multiplier applied to the held peak on every block.
    peak_decay: f32,
    last: Option<LevelReading>,
}

impl LevelMeter {
    /// Peak-hold multiplier used by `Default`.
    pub const DEFAULT_PEAK_DECAY: f32 = 0.95;

    /// # Parameters
    /// - `window_blocks`: number of blocks in the RMS moving average.
    /// - `peak_decay`: hold multiplier per block, clamped to `[0, 1]`.
    pub fn new(window_blocks: usize, peak_decay: f32) -> Self {
        Self {
            rms_average: MovingAverage::new(window_blocks),
            peak_hold: 0.0,
            peak_decay: peak_decay.clamp(0.0, 1.0),
            last: None,
        }
    }

    /// Meters one block.
    pub fn process(&mut self, block: &[f32]) -> LevelReading {
        let rms = calculate_rms(block);
        let peak = calculate_peak(block);
        self.peak_hold = peak.max(self.peak_hold * self.peak_decay);
        let reading = LevelReading {
            rms,
            peak,
            rms_smoothed: self.rms_average.add(rms),
            peak_hold: self.peak_hold,
        };
        self.last = Some(reading);
        reading
    }

    /// Most recent reading, if any block has been metered.
    pub fn last(&self) -> Option<LevelReading> {
        self.last
    }

    pub fn reset(&mut self) {
        self.rms_average.reset();
        self.peak_hold = 0.0;
        self.last = None;
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(8, Self::DEFAULT_PEAK_DECAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partial_window_averages_seen_values() {
        let mut avg = MovingAverage::new(4);
        assert_eq!(avg.average(), 0.0);
        assert_relative_eq!(avg.add(2.0), 2.0);
        assert_relative_eq!(avg.add(4.0), 3.0);
    }

    #[test]
    fn full_window_drops_oldest() {
        let mut avg = MovingAverage::new(2);
        avg.add(1.0);
        avg.add(3.0);
        assert_relative_eq!(avg.add(5.0), 4.0);
    }

    #[test]
    fn zero_window_behaves_as_one() {
        let mut avg = MovingAverage::new(0);
        assert_eq!(avg.window(), 1);
        assert_relative_eq!(avg.add(7.0), 7.0);
        assert_relative_eq!(avg.add(3.0), 3.0);
    }

    #[test]
    fn constant_block_reads_its_magnitude() {
        let mut meter = LevelMeter::default();
        let reading = meter.process(&[-0.5; 128]);
        assert_relative_eq!(reading.rms, 0.5, epsilon = 1e-6);
        assert_relative_eq!(reading.peak, 0.5, epsilon = 1e-6);
        assert_relative_eq!(reading.rms_smoothed, 0.5, epsilon = 1e-6);
        assert_eq!(meter.last(), Some(reading));
    }

    #[test]
    fn peak_hold_decays_after_silence() {
        let mut meter = LevelMeter::new(4, 0.5);
        meter.process(&[1.0; 16]);
        let quiet = meter.process(&[0.0; 16]);
        assert_relative_eq!(quiet.peak, 0.0);
        assert_relative_eq!(quiet.peak_hold, 0.5);

        meter.reset();
        assert!(meter.last().is_none());
    }
}

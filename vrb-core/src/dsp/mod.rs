//! Block-level signal helpers built on the [`crate::simd`] kernels.
//!
//! The consumer thread calls [`remove_dc`] and [`apply_window`] on each
//! captured block before handing it to the spatializer; [`meter::LevelMeter`]
//! feeds the overlay with smoothed levels.

pub mod dc;
pub mod meter;
pub mod window;

pub use dc::{remove_dc, DcBlocker, DEFAULT_DC_ALPHA};
pub use meter::{LevelMeter, LevelReading, MovingAverage};
pub use window::{apply_window, WindowTable, WindowType};

pub use crate::simd::{
    apply_gain_with_fade, calculate_peak, calculate_rms, clear_buffer, copy_buffer, mix_buffers,
};

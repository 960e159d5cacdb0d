//! Analytic analysis windows.
//!
//! With `N = size - 1` and `n` in `0..size`:
//!
//! | Window | Coefficient |
//! |--------|-------------|
//! | Rectangular | `1` |
//! | Hann | `0.5 * (1 - cos(2πn/N))` |
//! | Hamming | `0.54 - 0.46 * cos(2πn/N)` |
//! | Blackman | `0.42 - 0.5 * cos(2πn/N) + 0.08 * cos(4πn/N)` |
//! | Tukey | raised-cosine over the first and last `0.05 * N`, flat between |
//!
//! Buffers shorter than two samples are left untouched: `N` would be zero.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Fraction of the window spent in the two Tukey tapers combined.
const TUKEY_TAPER: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    Tukey,
}

impl WindowType {
    /// Coefficient for sample `n` of a window `size` samples long.
    pub fn coefficient(self, n: usize, size: usize) -> f32 {
        if size < 2 {
            return 1.0;
        }
        let big_n = (size - 1) as f32;
        let pos = n as f32;
        match self {
            WindowType::Rectangular => 1.0,
            WindowType::Hann => 0.5 * (1.0 - (2.0 * PI * pos / big_n).cos()),
            WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * pos / big_n).cos(),
            WindowType::Blackman => {
                0.42 - 0.5 * (2.0 * PI * pos / big_n).cos() + 0.08 * (4.0 * PI * pos / big_n).cos()
            }
            WindowType::Tukey => {
                let fade = TUKEY_TAPER * big_n * 0.5;
                if pos <= fade {
                    0.5 * (1.0 + (PI * (pos / fade - 1.0)).cos())
                } else if pos >= big_n - fade {
                    0.5 * (1.0 + (PI * ((pos - big_n + fade) / fade)).cos())
                } else {
                    1.0
                }
            }
        }
    }
}

/// Multiplies `buffer` by `window` in place.
pub fn apply_window(buffer: &mut [f32], window: WindowType) {
    let size = buffer.len();
    if window == WindowType::Rectangular || size < 2 {
        return;
    }
    for (n, s) in buffer.iter_mut().enumerate() {
        *s *= window.coefficient(n, size);
    }
}

/// Precomputed coefficients for a fixed block size.
///
/// Built once off the audio path so per-block windowing is a plain multiply.
#[derive(Debug, Clone)]
pub struct WindowTable {
    window: WindowType,
    coefficients: Vec<f32>,
}

impl WindowTable {
    pub fn new(window: WindowType, size: usize) -> Self {
        let coefficients = (0..size).map(|n| window.coefficient(n, size)).collect();
        Self {
            window,
            coefficients,
        }
    }

    pub fn window(&self) -> WindowType {
        self.window
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Applies the table to `buffer`. A buffer of a different length falls
    /// back to [`apply_window`] so the shape always spans the whole block.
    pub fn apply(&self, buffer: &mut [f32]) {
        if self.window == WindowType::Rectangular {
            return;
        }
        if buffer.len() != self.coefficients.len() {
            apply_window(buffer, self.window);
            return;
        }
        for (s, w) in buffer.iter_mut().zip(&self.coefficients) {
            *s *= w;
        }
    }
}

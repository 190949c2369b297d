//! Post-processing effects
//!
//! Separable blur and FXAA-style edge antialiasing. Both run as fullscreen
//! passes over a finished color target; the blur kernels are shared with the
//! ambient occlusion smoothing step.

mod blur;
mod fxaa;

pub use blur::{BlurDirection, BlurPass};
pub use fxaa::{fxaa, luma, FxaaPass};

/// Symmetric tap tables; index 0 is the center, index `i` the taps at `±i`
const BINOMIAL_4: [f32; 3] = [6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
const BINOMIAL_8: [f32; 5] = [70.0 / 256.0, 56.0 / 256.0, 28.0 / 256.0, 8.0 / 256.0, 1.0 / 256.0];
const GRID_9: [f32; 2] = [1.0 / 3.0, 1.0 / 3.0];
const GAUSSIAN_14: [f32; 8] = [
    0.159_576_91,
    0.147_308_06,
    0.115_876_62,
    0.077_674_42,
    0.044_368_334,
    0.021_596_387,
    0.008_957_812,
    0.004_429_912,
];

/// Separable blur kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlurKernel {
    /// Binomial 1 4 6 4 1
    Taps4,
    /// Binomial 1 8 28 56 70 56 28 8 1
    Taps8,
    /// 3x3 grid average, applied as two 3-tap box passes
    Grid9,
    /// 15-sample Gaussian (7 taps each side plus center)
    #[default]
    Taps14,
}

impl BlurKernel {
    /// One-sided weights, center first
    pub fn weights(&self) -> &'static [f32] {
        match self {
            BlurKernel::Taps4 => &BINOMIAL_4,
            BlurKernel::Taps8 => &BINOMIAL_8,
            BlurKernel::Grid9 => &GRID_9,
            BlurKernel::Taps14 => &GAUSSIAN_14,
        }
    }

    /// Full tap list as `(texel index, weight)` from `-radius` to `radius`
    pub fn taps(&self) -> Vec<(i32, f32)> {
        let weights = self.weights();
        let radius = weights.len() as i32 - 1;
        (-radius..=radius)
            .map(|i| (i, weights[i.unsigned_abs() as usize]))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlurKernel::Taps4 => "binomial-4",
            BlurKernel::Taps8 => "binomial-8",
            BlurKernel::Grid9 => "grid-9",
            BlurKernel::Taps14 => "gaussian-14",
        }
    }
}

/// Post-process technique applied to the composited frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostProcess {
    #[default]
    None,
    Blur(BlurKernel),
    Fxaa,
}

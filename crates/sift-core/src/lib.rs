//! Core primitives for SIFT keypoint detection and descriptor extraction.
//!
//! # Overview
//!
//! This crate implements the classic SIFT pipeline on plain row-major `f32`
//! buffers:
//!
//! - [`pyramid`] – Gaussian scale-space and difference-of-Gaussian (DoG)
//!   construction.
//! - [`extrema`] – 26-neighbor scale-space extrema scan with iterative
//!   sub-pixel refinement and contrast/edge rejection.
//! - [`orientation`] – gradient orientation histograms and reference
//!   orientation assignment (one candidate may yield several oriented
//!   keypoints).
//! - [`descriptor`] – 128-dimensional gradient histogram descriptors
//!   (4×4 spatial cells × 8 orientation bins).
//! - [`detect`] – the facade combining the stages into
//!   [`detect`](detect::detect), [`compute`](detect::compute), and
//!   [`detect_and_compute`](detect::detect_and_compute).
//!
//! The numerical conventions (sigma progression, thresholds, histogram
//! smoothing, trilinear descriptor binning) follow the common
//! OpenCV-compatible formulation of SIFT.
//!
//! # Features
//!
//! - `rayon` – parallelizes per-keypoint orientation and descriptor work
//!   using the `rayon` crate. This does not change numerical results, only
//!   performance on multi-core machines.
//! - `tracing` – emits debug spans around the pipeline phases (pyramid,
//!   extrema scan, orientation, descriptors).
//!
//! All working buffers (pyramid, DoG) are owned by a single detection call
//! and released when it returns; there is no cross-call caching.

pub mod descriptor;
pub mod detect;
pub mod extrema;
pub mod keypoint;
pub mod orientation;
pub mod pyramid;

use thiserror::Error;

pub use crate::descriptor::{Descriptors, DESCRIPTOR_SIZE};
pub use crate::detect::{compute, detect, detect_and_compute};
pub use crate::keypoint::KeyPoint;

/// Input validation errors. Degenerate inputs fail fast with no partial
/// result; an image that is merely featureless is not an error and yields
/// empty collections instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiftError {
    #[error("image dimensions must be non-zero (got {w}x{h})")]
    EmptyImage { w: usize, h: usize },
    #[error("pixel buffer of length {len} does not match {w}x{h} image")]
    DimensionMismatch { w: usize, h: usize, len: usize },
    #[error("mask of length {len} does not match {w}x{h} image")]
    MaskSizeMismatch { w: usize, h: usize, len: usize },
}

/// Tunable parameters for SIFT detection and description.
#[derive(Clone, Debug)]
pub struct SiftParams {
    /// Keep only the strongest `n_features` keypoints by response.
    /// `0` keeps every qualifying keypoint.
    pub n_features: usize,
    /// Number of scale levels per octave that are searched for extrema.
    /// Each octave holds `n_octave_layers + 3` Gaussian layers.
    pub n_octave_layers: usize,
    /// Minimum absolute DoG contrast of an interpolated extremum.
    /// The pre-filter applied during the raw scan is scaled by
    /// `0.5 / n_octave_layers`.
    pub contrast_threshold: f32,
    /// Edge rejection ratio `r`: candidates with principal curvature ratio
    /// `tr^2 / det >= (r + 1)^2 / r` are discarded as edge-like.
    pub edge_threshold: f32,
    /// Blur of the first scale-space layer, in pixels of that layer.
    pub sigma: f32,
    /// Upsample the input 2x before building the pyramid. Improves
    /// small-feature detection at the cost of ~4x the pyramid memory.
    pub upsample: bool,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            n_features: 0,
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            upsample: true,
        }
    }
}

impl SiftParams {
    /// Create a new parameter set with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the strongest `n` keypoints by response (`0` = unlimited).
    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    /// Set the number of searched scale levels per octave.
    pub fn with_n_octave_layers(mut self, n: usize) -> Self {
        self.n_octave_layers = n;
        self
    }

    /// Set the minimum DoG contrast of accepted extrema.
    pub fn with_contrast_threshold(mut self, t: f32) -> Self {
        self.contrast_threshold = t;
        self
    }

    /// Set the edge rejection ratio.
    pub fn with_edge_threshold(mut self, t: f32) -> Self {
        self.edge_threshold = t;
        self
    }

    /// Set the blur of the first scale-space layer.
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Enable or disable the initial 2x upsampling.
    pub fn with_upsample(mut self, upsample: bool) -> Self {
        self.upsample = upsample;
        self
    }
}

/// Single-channel image in row-major layout with `f32` samples.
///
/// Intensities are expected in `[0, 1]`; the [`detect`](detect::detect)
/// facade and the wrapper crates convert 8-bit input accordingly.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl ImageF32 {
    /// Wrap an existing row-major buffer, validating its dimensions.
    pub fn from_vec(w: usize, h: usize, data: Vec<f32>) -> Result<Self, SiftError> {
        if w == 0 || h == 0 {
            return Err(SiftError::EmptyImage { w, h });
        }
        if data.len() != w * h {
            return Err(SiftError::DimensionMismatch {
                w,
                h,
                len: data.len(),
            });
        }
        Ok(Self { w, h, data })
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(w: usize, h: usize, f: impl Fn(usize, usize) -> f32) -> Result<Self, SiftError> {
        if w == 0 || h == 0 {
            return Err(SiftError::EmptyImage { w, h });
        }
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        Ok(Self { w, h, data })
    }

    /// Sample value at an integer coordinate.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_constructor_rejects_degenerate_input() {
        assert_eq!(
            ImageF32::from_vec(0, 4, vec![]),
            Err(SiftError::EmptyImage { w: 0, h: 4 })
        );
        assert_eq!(
            ImageF32::from_vec(3, 2, vec![0.0; 5]),
            Err(SiftError::DimensionMismatch { w: 3, h: 2, len: 5 })
        );
        assert!(ImageF32::from_vec(3, 2, vec![0.0; 6]).is_ok());
    }

    #[test]
    fn params_builders_compose() {
        let p = SiftParams::new()
            .with_n_features(100)
            .with_contrast_threshold(0.02)
            .with_upsample(false);
        assert_eq!(p.n_features, 100);
        assert_eq!(p.contrast_threshold, 0.02);
        assert!(!p.upsample);
        assert_eq!(p.n_octave_layers, 3);
    }
}

//! 128-dimensional gradient histogram descriptors.
//!
//! A rotated, Gaussian-weighted patch around the keypoint is split into a
//! 4x4 spatial grid of 8-bin orientation histograms. Every sample spreads
//! its magnitude over the adjacent spatial and orientation bins by
//! trilinear interpolation, which avoids boundary artifacts between cells.
//! The resulting 128-vector is L2-normalized, clipped, and re-normalized
//! to unit length.

use crate::ImageF32;

/// Cells per side of the spatial grid.
pub const N_SPATIAL_BINS: usize = 4;
/// Orientation bins per spatial cell.
pub const N_ORI_BINS: usize = 8;
/// Descriptor length: 4 x 4 x 8.
pub const DESCRIPTOR_SIZE: usize = N_SPATIAL_BINS * N_SPATIAL_BINS * N_ORI_BINS;

/// Width of one spatial cell in units of the keypoint sigma.
const LAMBDA_DESCR: f32 = 3.0;
/// Per-component cap applied between the two normalization passes; tames
/// single dominant gradients such as specular highlights.
const MAGNITUDE_CAP: f32 = 0.2;

/// Dense row-major matrix of descriptors, one row per keypoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptors {
    pub rows: usize,
    pub data: Vec<f32>,
}

impl Descriptors {
    /// Matrix with `rows` zeroed descriptor rows.
    pub fn zeroed(rows: usize) -> Self {
        Self {
            rows,
            data: vec![0.0; rows * DESCRIPTOR_SIZE],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// One descriptor row.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * DESCRIPTOR_SIZE..(i + 1) * DESCRIPTOR_SIZE]
    }
}

/// Compute one descriptor into `out` (`DESCRIPTOR_SIZE` long).
///
/// `x`, `y`, and `sigma` are given in pixels of `layer` (octave
/// coordinates); `angle` is the keypoint orientation in degrees. Samples
/// falling outside the layer interior are skipped, so keypoints near the
/// border receive a partial but still normalized descriptor.
pub fn compute_descriptor(layer: &ImageF32, x: f32, y: f32, sigma: f32, angle: f32, out: &mut [f32]) {
    debug_assert_eq!(out.len(), DESCRIPTOR_SIZE);

    let (w, h) = (layer.w as i32, layer.h as i32);
    let d = N_SPATIAL_BINS as f32;
    let n = N_ORI_BINS as i32;

    // Rotate samples so the keypoint orientation maps to bin zero.
    let ori = 360.0 - angle;
    let (sin_t, cos_t) = ori.to_radians().sin_cos();
    let bins_per_deg = n as f32 / 360.0;
    let exp_scale = -2.0 / (d * d);

    let hist_width = LAMBDA_DESCR * sigma;
    let radius_f = hist_width * std::f32::consts::SQRT_2 * (d + 1.0) * 0.5;
    let diag = (w as f32).hypot(h as f32) as i32;
    let radius = (radius_f.round() as i32).min(diag);

    let px = x.round() as i32;
    let py = y.round() as i32;

    let mut hist = [[[0.0f32; N_ORI_BINS]; N_SPATIAL_BINS + 2]; N_SPATIAL_BINS + 2];

    for i in -radius..=radius {
        for j in -radius..=radius {
            let (rf, cf) = (i as f32, j as f32);
            let c_rot = (cf * cos_t - rf * sin_t) / hist_width;
            let r_rot = (cf * sin_t + rf * cos_t) / hist_width;
            let rbin = r_rot + d * 0.5 - 0.5;
            let cbin = c_rot + d * 0.5 - 0.5;

            if rbin <= -1.0 || rbin >= d || cbin <= -1.0 || cbin >= d {
                continue;
            }

            let sx = px + j;
            let sy = py + i;
            if sx < 1 || sx >= w - 1 || sy < 1 || sy >= h - 1 {
                continue;
            }

            let gx = layer.at((sx + 1) as usize, sy as usize)
                - layer.at((sx - 1) as usize, sy as usize);
            let gy = layer.at(sx as usize, (sy - 1) as usize)
                - layer.at(sx as usize, (sy + 1) as usize);
            let mag = (gx * gx + gy * gy).sqrt();

            let mut grad_deg = gy.atan2(gx).to_degrees();
            if grad_deg < 0.0 {
                grad_deg += 360.0;
            }
            let obin = (grad_deg - ori) * bins_per_deg;

            let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            scatter_trilinear(&mut hist, rbin, cbin, obin, mag * weight);
        }
    }

    for (i, plane) in hist.iter().enumerate().skip(1).take(N_SPATIAL_BINS) {
        for (j, cell) in plane.iter().enumerate().skip(1).take(N_SPATIAL_BINS) {
            let base = ((i - 1) * N_SPATIAL_BINS + (j - 1)) * N_ORI_BINS;
            out[base..base + N_ORI_BINS].copy_from_slice(cell);
        }
    }

    normalize_descriptor(out);
}

/// Distribute one sample over its eight neighboring (row, col, orientation)
/// bins. `rbin`/`cbin` are in `(-1, 4)`, the orientation bin wraps.
fn scatter_trilinear(
    hist: &mut [[[f32; N_ORI_BINS]; N_SPATIAL_BINS + 2]; N_SPATIAL_BINS + 2],
    rbin: f32,
    cbin: f32,
    obin: f32,
    value: f32,
) {
    let n = N_ORI_BINS as i32;

    let r0f = rbin.floor();
    let c0f = cbin.floor();
    let o0f = obin.floor();
    let dr = rbin - r0f;
    let dc = cbin - c0f;
    let dob = obin - o0f;

    let mut o0 = o0f as i32;
    if o0 < 0 {
        o0 += n;
    }
    if o0 >= n {
        o0 -= n;
    }
    let o0 = o0 as usize;
    let o1 = (o0 + 1) % N_ORI_BINS;

    // Shift by the one-cell apron of the histogram tensor.
    let r0 = (r0f as i32 + 1) as usize;
    let c0 = (c0f as i32 + 1) as usize;

    let v_r1 = value * dr;
    let v_r0 = value - v_r1;
    let v_r1c1 = v_r1 * dc;
    let v_r1c0 = v_r1 - v_r1c1;
    let v_r0c1 = v_r0 * dc;
    let v_r0c0 = v_r0 - v_r0c1;

    hist[r0][c0][o0] += v_r0c0 * (1.0 - dob);
    hist[r0][c0][o1] += v_r0c0 * dob;
    hist[r0][c0 + 1][o0] += v_r0c1 * (1.0 - dob);
    hist[r0][c0 + 1][o1] += v_r0c1 * dob;
    hist[r0 + 1][c0][o0] += v_r1c0 * (1.0 - dob);
    hist[r0 + 1][c0][o1] += v_r1c0 * dob;
    hist[r0 + 1][c0 + 1][o0] += v_r1c1 * (1.0 - dob);
    hist[r0 + 1][c0 + 1][o1] += v_r1c1 * dob;
}

/// L2-normalize, clip each component at `MAGNITUDE_CAP` of the norm, then
/// re-normalize to unit length. All-zero vectors are left untouched.
fn normalize_descriptor(out: &mut [f32]) {
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return;
    }

    let cap = norm * MAGNITUDE_CAP;
    for v in out.iter_mut() {
        if *v > cap {
            *v = cap;
        }
    }

    let norm = out
        .iter()
        .map(|v| v * v)
        .sum::<f32>()
        .sqrt()
        .max(f32::EPSILON);
    for v in out.iter_mut() {
        *v /= norm;
    }
}

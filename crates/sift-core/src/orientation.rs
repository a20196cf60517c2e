//! Reference orientation assignment from local gradient histograms.
//!
//! Each refined extremum gets a 36-bin histogram of gradient directions
//! over a Gaussian-weighted circular neighborhood of the matching Gaussian
//! layer. Every histogram peak within 80% of the dominant one produces its
//! own keypoint copy, so one extremum maps to zero or more oriented
//! keypoints.

use std::f32::consts::PI;

use crate::extrema::ScaleSpaceExtremum;
use crate::keypoint::{pack_octave, KeyPoint};
use crate::pyramid::GaussianPyramid;
use crate::ImageF32;

/// Number of bins in the orientation histogram.
pub const N_BINS: usize = 36;

/// Gaussian window factor relative to the keypoint sigma; the sampling
/// radius is three times this.
const LAMBDA_ORI: f32 = 1.5;

/// Secondary peaks at least this fraction of the dominant peak spawn
/// additional keypoint copies.
const PEAK_RATIO: f32 = 0.8;

/// Compute the oriented keypoints for one refined extremum.
///
/// Positions, size, and angle are reported in input-image coordinates
/// (octave subsampling and the initial upsampling undone); the packed
/// octave/layer is kept so descriptors can find the same Gaussian layer.
pub fn assign_orientations(gss: &GaussianPyramid, e: &ScaleSpaceExtremum) -> Vec<KeyPoint> {
    let octave = &gss.octaves[e.octave];
    let layer = &octave.layers[e.layer];

    // Keypoint blur in octave pixels at the refined scale offset.
    let sigma_oct = gss.layer_sigma(e.layer as f32 + e.offset[2]);
    let radius = (3.0 * LAMBDA_ORI * sigma_oct).round() as i32;
    let cx = (e.x as f32 + e.offset[0]).round() as i32;
    let cy = (e.y as f32 + e.offset[1]).round() as i32;

    let mut hist = [0.0f32; N_BINS];
    gradient_direction_histogram(layer, cx, cy, radius, LAMBDA_ORI * sigma_oct, &mut hist);

    let max = hist.iter().copied().fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let peak_threshold = PEAK_RATIO * max;

    let x = (e.x as f32 + e.offset[0]) * octave.delta;
    let y = (e.y as f32 + e.offset[1]) * octave.delta;
    let size = 2.0 * sigma_oct * octave.delta;

    let mut out = Vec::new();
    for k in 0..N_BINS {
        let prev = hist[(k + N_BINS - 1) % N_BINS];
        let next = hist[(k + 1) % N_BINS];
        if hist[k] <= prev || hist[k] <= next || hist[k] < peak_threshold {
            continue;
        }

        // Parabolic interpolation over the three bins around the peak.
        let interp = 0.5 * (prev - next) / (prev - 2.0 * hist[k] + next);
        let bin = k as f32 + interp;
        let angle = (360.0 - bin * (360.0 / N_BINS as f32)).rem_euclid(360.0);

        out.push(KeyPoint {
            x,
            y,
            size,
            angle,
            response: e.response,
            octave: pack_octave(e.octave, e.layer),
            class_id: -1,
        });
    }

    out
}

/// Accumulate and smooth the gradient direction histogram around
/// `(cx, cy)`. Samples outside the layer interior are skipped, so points
/// near the border still receive a (partial) histogram.
fn gradient_direction_histogram(
    layer: &ImageF32,
    cx: i32,
    cy: i32,
    radius: i32,
    sigma: f32,
    hist: &mut [f32; N_BINS],
) {
    let (w, h) = (layer.w as i32, layer.h as i32);
    let weight_scale = -0.5 / (sigma * sigma);
    let mut raw = [0.0f32; N_BINS];

    for dy in -radius..=radius {
        let y = cy + dy;
        if y < 1 || y >= h - 1 {
            continue;
        }
        for dx in -radius..=radius {
            let x = cx + dx;
            if x < 1 || x >= w - 1 {
                continue;
            }

            let gx = layer.at((x + 1) as usize, y as usize) - layer.at((x - 1) as usize, y as usize);
            let gy = layer.at(x as usize, (y - 1) as usize) - layer.at(x as usize, (y + 1) as usize);
            let mag = (gx * gx + gy * gy).sqrt();
            let weight = (((dx * dx + dy * dy) as f32) * weight_scale).exp();

            let angle = gy.atan2(gx);
            let mut bin = (N_BINS as f32 * angle / (2.0 * PI)).round() as i32;
            if bin >= N_BINS as i32 {
                bin -= N_BINS as i32;
            }
            if bin < 0 {
                bin += N_BINS as i32;
            }
            raw[bin as usize] += weight * mag;
        }
    }

    // One pass of the circular [1, 4, 6, 4, 1] / 16 smoothing kernel.
    for i in 0..N_BINS {
        let im2 = (i + N_BINS - 2) % N_BINS;
        let im1 = (i + N_BINS - 1) % N_BINS;
        let ip1 = (i + 1) % N_BINS;
        let ip2 = (i + 2) % N_BINS;
        hist[i] = (raw[im2] + raw[ip2]) * (1.0 / 16.0)
            + (raw[im1] + raw[ip1]) * (4.0 / 16.0)
            + raw[i] * (6.0 / 16.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::GaussianOctave;
    use crate::SiftParams;

    fn single_layer_pyramid(layer: ImageF32) -> GaussianPyramid {
        let params = SiftParams::default();
        GaussianPyramid {
            n_octave_layers: params.n_octave_layers,
            sigma: params.sigma,
            octaves: vec![GaussianOctave {
                delta: 1.0,
                layers: vec![layer.clone(), layer.clone(), layer],
            }],
        }
    }

    fn center_extremum() -> ScaleSpaceExtremum {
        ScaleSpaceExtremum {
            octave: 0,
            layer: 1,
            x: 16,
            y: 16,
            offset: [0.0, 0.0, 0.0],
            response: 1.0,
        }
    }

    fn angle_distance(a: f32, b: f32) -> f32 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn horizontal_ramp_points_along_x() {
        let layer = ImageF32::from_fn(32, 32, |x, _| 0.01 * x as f32).expect("non-degenerate");
        let kps = assign_orientations(&single_layer_pyramid(layer), &center_extremum());

        assert_eq!(kps.len(), 1);
        assert!(angle_distance(kps[0].angle, 0.0) < 10.0, "angle {}", kps[0].angle);
        assert_eq!(kps[0].x, 16.0);
        assert_eq!(kps[0].class_id, -1);
    }

    #[test]
    fn vertical_ramp_shifts_angle_by_quarter_turn() {
        let layer = ImageF32::from_fn(32, 32, |_, y| 0.01 * y as f32).expect("non-degenerate");
        let kps = assign_orientations(&single_layer_pyramid(layer), &center_extremum());

        assert_eq!(kps.len(), 1);
        assert!(angle_distance(kps[0].angle, 90.0) < 10.0, "angle {}", kps[0].angle);
    }

    #[test]
    fn opposing_gradients_duplicate_the_keypoint() {
        // A fold along x = 16: gradient +x on the right half, -x on the
        // left, with equal magnitudes. Both peaks clear the 80% ratio.
        let layer =
            ImageF32::from_fn(32, 32, |x, _| 0.01 * (x as f32 - 16.0).abs()).expect("non-degenerate");
        let mut kps = assign_orientations(&single_layer_pyramid(layer), &center_extremum());

        assert_eq!(kps.len(), 2);
        kps.sort_by(|a, b| a.angle.total_cmp(&b.angle));
        assert!(angle_distance(kps[0].angle, 0.0) < 10.0, "angle {}", kps[0].angle);
        assert!(angle_distance(kps[1].angle, 180.0) < 10.0, "angle {}", kps[1].angle);
    }

    #[test]
    fn flat_patch_yields_no_orientation() {
        let layer = ImageF32::from_fn(32, 32, |_, _| 0.5).expect("non-degenerate");
        let kps = assign_orientations(&single_layer_pyramid(layer), &center_extremum());
        assert!(kps.is_empty());
    }
}
